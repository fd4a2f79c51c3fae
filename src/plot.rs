//! Age histogram rendering (PNG via plotters)

use std::error::Error;
use std::path::Path;

use plotters::prelude::*;

const BINS: usize = 30;

/// Overlaid 30-bin age histogram, raw counts per arm, no common normalization.
pub fn age_histogram(drug: &[f64], placebo: &[f64], path: &Path) -> Result<(), Box<dyn Error>> {
    let lo = drug
        .iter()
        .chain(placebo)
        .fold(f64::INFINITY, |m, &v| m.min(v));
    let hi = drug
        .iter()
        .chain(placebo)
        .fold(f64::NEG_INFINITY, |m, &v| m.max(v));
    if !lo.is_finite() || !hi.is_finite() {
        return Err("cannot plot histogram: no age values".into());
    }
    // Degenerate range (all ages equal) still needs nonzero bin width
    let (lo, hi) = if hi > lo { (lo, hi) } else { (lo - 0.5, hi + 0.5) };
    let width = (hi - lo) / BINS as f64;

    let counts = |xs: &[f64]| -> Vec<u32> {
        let mut c = vec![0u32; BINS];
        for &x in xs {
            let idx = (((x - lo) / width) as usize).min(BINS - 1);
            c[idx] += 1;
        }
        c
    };
    let drug_counts = counts(drug);
    let placebo_counts = counts(placebo);
    let y_max = drug_counts
        .iter()
        .chain(&placebo_counts)
        .copied()
        .max()
        .unwrap_or(1)
        .max(1);

    let root = BitMapBackend::new(path, (900, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Age distribution by treatment group", ("sans-serif", 26))
        .margin(15)
        .x_label_area_size(45)
        .y_label_area_size(55)
        .build_cartesian_2d(lo..hi, 0u32..(y_max + 1))?;

    chart
        .configure_mesh()
        .x_desc("Age")
        .y_desc("Count")
        .draw()?;

    for (series, color, name) in [
        (&drug_counts, BLUE, "Drug"),
        (&placebo_counts, RED, "Placebo"),
    ] {
        chart
            .draw_series(series.iter().enumerate().filter(|(_, &c)| c > 0).map(
                move |(i, &c)| {
                    let x0 = lo + i as f64 * width;
                    Rectangle::new([(x0, 0), (x0 + width, c)], color.mix(0.45).filled())
                },
            ))?
            .label(name)
            .legend(move |(x, y)| {
                Rectangle::new([(x, y - 5), (x + 12, y + 5)], color.mix(0.45).filled())
            });
    }

    chart
        .configure_series_labels()
        .border_style(BLACK)
        .background_style(WHITE.mix(0.85))
        .draw()?;
    root.present()?;
    Ok(())
}
