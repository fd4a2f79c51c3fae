//! Drug safety analysis: hypothesis tests, plot, and Markdown report

use std::error::Error;
use std::fs;
use std::path::Path;

use crate::dataset::{self, Arm, Dataset};
use crate::plot;
use crate::stats::{self, ChiSquareTest, MannWhitneyTest, ProportionTest, ShapiroWilkTest};
use crate::AnalyzeOptions;

/// All computed statistics for one run
#[derive(Debug)]
pub struct AnalysisResult {
    pub n_drug: usize,
    pub n_placebo: usize,
    pub adverse_drug: usize,
    pub adverse_placebo: usize,
    pub prop_drug: f64,
    pub prop_placebo: f64,
    pub proportion: ProportionTest,
    pub chi_square: ChiSquareTest,
    pub effect_levels: Vec<String>,
    pub shapiro_drug: ShapiroWilkTest,
    pub shapiro_placebo: ShapiroWilkTest,
    pub mann_whitney: MannWhitneyTest,
}

pub fn run_cli(opts: &AnalyzeOptions) -> Result<(), Box<dyn Error>> {
    println!("\n==========================================");
    println!("   DRUG SAFETY ANALYSIS");
    println!("==========================================\n");

    println!("Reading {}...", opts.csv_path);
    let data = dataset::read_csv(&opts.csv_path)?;
    if data.skipped > 0 {
        println!("  (Skipped {} rows with invalid values)", data.skipped);
    }
    if data.subjects.is_empty() {
        return Err(format!("no valid rows in {}", opts.csv_path).into());
    }

    println!("\n--- Data Summary ---");
    println!("Total subjects:     {}", data.subjects.len());
    for arm in [Arm::Drug, Arm::Placebo] {
        let n = data.arm_len(arm);
        let adverse = data.adverse_count(arm);
        println!(
            "{:<8} arm:       {} ({} with adverse effects, {:.1}%)",
            arm.label(),
            n,
            adverse,
            if n > 0 { adverse as f64 / n as f64 * 100.0 } else { 0.0 }
        );
    }

    let result = analyze(&data)?;
    print_results(&result);

    let hist_path = opts.figs_dir.join("age_hist_by_group.png");
    if opts.make_plot {
        fs::create_dir_all(&opts.figs_dir)?;
        plot::age_histogram(&data.ages(Arm::Drug), &data.ages(Arm::Placebo), &hist_path)?;
        println!("\n>> Histogram saved: {}", hist_path.display());
    }

    let report = build_markdown_report(
        &result,
        if opts.make_plot { Some(hist_path.as_path()) } else { None },
    );
    println!("\n{}", report);

    fs::create_dir_all(&opts.results_dir)?;
    let report_path = opts.results_dir.join("summary.md");
    fs::write(&report_path, report.trim())?;
    println!(">> Report saved: {}", report_path.display());

    println!("\n==========================================");
    Ok(())
}

/// Run every test on a loaded dataset. Fails when either arm is missing
/// or too small for the tests to be defined.
pub fn analyze(data: &Dataset) -> Result<AnalysisResult, Box<dyn Error>> {
    let n_drug = data.arm_len(Arm::Drug);
    let n_placebo = data.arm_len(Arm::Placebo);
    for (arm, n) in [(Arm::Drug, n_drug), (Arm::Placebo, n_placebo)] {
        if n == 0 {
            return Err(format!("no rows for group {}", arm.label()).into());
        }
    }

    let adverse_drug = data.adverse_count(Arm::Drug);
    let adverse_placebo = data.adverse_count(Arm::Placebo);

    let proportion = stats::two_proportion_z_test(adverse_drug, n_drug, adverse_placebo, n_placebo)
        .ok_or("proportion z-test undefined for these counts")?;

    let (effect_levels, table) = data.effect_contingency();
    let chi_square = stats::chi_square_independence(&table, effect_levels.len(), 2)
        .ok_or("chi-square test needs at least two num_effects levels with nonzero counts")?;

    let ages_drug = data.ages(Arm::Drug);
    let ages_placebo = data.ages(Arm::Placebo);

    // Normality is checked and reported but does not gate the comparison:
    // the Mann-Whitney test runs either way.
    let shapiro_drug = stats::shapiro_wilk(&ages_drug)
        .ok_or("Shapiro-Wilk undefined for Drug ages (n outside 3..=5000 or constant)")?;
    let shapiro_placebo = stats::shapiro_wilk(&ages_placebo)
        .ok_or("Shapiro-Wilk undefined for Placebo ages (n outside 3..=5000 or constant)")?;

    let mann_whitney = stats::mann_whitney_u(&ages_drug, &ages_placebo)
        .ok_or("Mann-Whitney test needs at least two ages per group")?;

    Ok(AnalysisResult {
        n_drug,
        n_placebo,
        adverse_drug,
        adverse_placebo,
        prop_drug: adverse_drug as f64 / n_drug as f64,
        prop_placebo: adverse_placebo as f64 / n_placebo as f64,
        proportion,
        chi_square,
        effect_levels,
        shapiro_drug,
        shapiro_placebo,
        mann_whitney,
    })
}

fn print_results(result: &AnalysisResult) {
    println!("\n--- Adverse Effect Proportions ---");
    println!(
        "Drug:               {:.3} ({}/{})",
        result.prop_drug, result.adverse_drug, result.n_drug
    );
    println!(
        "Placebo:            {:.3} ({}/{})",
        result.prop_placebo, result.adverse_placebo, result.n_placebo
    );
    println!(
        "z = {:.3}, p = {}",
        result.proportion.z,
        fmt_g(result.proportion.p_value, 4)
    );

    println!("\n--- Independence: num_effects vs trx ---");
    println!("Levels:             {}", result.effect_levels.join(", "));
    println!(
        "chi2 = {:.3} (df = {}), p = {}",
        result.chi_square.statistic,
        result.chi_square.df,
        fmt_g(result.chi_square.p_value, 4)
    );

    println!("\n--- Age by Group ---");
    println!(
        "Shapiro-Wilk Drug:    W = {:.4}, p = {}",
        result.shapiro_drug.w,
        fmt_g(result.shapiro_drug.p_value, 4)
    );
    println!(
        "Shapiro-Wilk Placebo: W = {:.4}, p = {}",
        result.shapiro_placebo.w,
        fmt_g(result.shapiro_placebo.p_value, 4)
    );
    println!(
        "Mann-Whitney U = {:.1}, p = {}",
        result.mann_whitney.u,
        fmt_g(result.mann_whitney.p_value, 4)
    );
}

pub fn build_markdown_report(result: &AnalysisResult, hist_path: Option<&Path>) -> String {
    let hist_line = match hist_path {
        Some(p) => format!("Histogram saved to: {}", p.display()),
        None => "Histogram skipped (--no-plot)".to_string(),
    };
    format!(
        r#"# Drug Safety – Hypothesis Tests

Generated: {}

## Proportion of adverse effects
- Drug:    {:.3}  ({}/{})
- Placebo: {:.3}  ({}/{})
- Two-sided z-test p-value: **{}**  (z = {:.3})

## Independence (num_effects vs trx)
- Chi-square p-value: **{}**

## Age differences by group
- Mann–Whitney U p-value: **{}**
- {}
"#,
        timestamp_utc(),
        result.prop_drug,
        result.adverse_drug,
        result.n_drug,
        result.prop_placebo,
        result.adverse_placebo,
        result.n_placebo,
        fmt_g(result.proportion.p_value, 4),
        result.proportion.z,
        fmt_g(result.chi_square.p_value, 4),
        fmt_g(result.mann_whitney.p_value, 4),
        hist_line,
    )
}

/// C `%g`-style formatting: `sig` significant digits, scientific notation
/// outside a readable exponent range, trailing zeros trimmed.
fn fmt_g(x: f64, sig: usize) -> String {
    if x == 0.0 {
        return "0".to_string();
    }
    if !x.is_finite() {
        return format!("{}", x);
    }
    let exp = x.abs().log10().floor() as i32;
    if exp < -4 || exp >= sig as i32 {
        let s = format!("{:.*e}", sig.saturating_sub(1), x);
        match s.split_once('e') {
            Some((mantissa, e)) => format!("{}e{}", trim_zeros(mantissa), e),
            None => s,
        }
    } else {
        let decimals = (sig as i32 - 1 - exp).max(0) as usize;
        trim_zeros(&format!("{:.*}", decimals, x))
    }
}

fn trim_zeros(s: &str) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s.to_string()
    }
}

/// UTC timestamp without a clock crate (days-to-civil per Hinnant)
fn timestamp_utc() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let (year, month, day) = civil_from_days((secs / 86400) as i64);
    format!(
        "{}-{:02}-{:02} {:02}:{:02} UTC",
        year,
        month,
        day,
        (secs % 86400) / 3600,
        (secs % 3600) / 60
    )
}

fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719468;
    let era = z.div_euclid(146097);
    let doe = z.rem_euclid(146097);
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = yoe + era * 400 + if month <= 2 { 1 } else { 0 };
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Subject;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn subject(arm: Arm, adverse: bool, num_effects: &str, age: f64) -> Subject {
        Subject {
            arm,
            adverse,
            num_effects: num_effects.to_string(),
            age,
        }
    }

    // Box-Muller normal ages from a seeded generator
    fn synthetic_ages(rng: &mut StdRng, n: usize, mean: f64, sd: f64) -> Vec<f64> {
        (0..n)
            .map(|_| {
                let u1: f64 = rng.gen_range(1e-10..1.0);
                let u2: f64 = rng.gen_range(0.0..1.0);
                let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
                mean + sd * z
            })
            .collect()
    }

    fn synthetic_dataset() -> Dataset {
        let mut rng = StdRng::seed_from_u64(7);
        let mut subjects = Vec::new();
        for (i, age) in synthetic_ages(&mut rng, 60, 62.0, 8.0).into_iter().enumerate() {
            subjects.push(subject(Arm::Drug, i % 10 < 8, if i % 3 == 0 { "2" } else { "1" }, age));
        }
        for (i, age) in synthetic_ages(&mut rng, 60, 62.0, 8.0).into_iter().enumerate() {
            subjects.push(subject(Arm::Placebo, i % 10 < 2, if i % 3 == 0 { "2" } else { "1" }, age));
        }
        Dataset { subjects, skipped: 0 }
    }

    #[test]
    fn test_analyze_known_proportions() {
        let result = analyze(&synthetic_dataset()).unwrap();
        assert!((result.prop_drug - 0.8).abs() < 1e-12);
        assert!((result.prop_placebo - 0.2).abs() < 1e-12);
        assert!(result.proportion.p_value < 0.05);
    }

    #[test]
    fn test_analyze_identical_groups_detect_nothing() {
        // Same ages, same effect levels in both arms
        let mut rng = StdRng::seed_from_u64(11);
        let ages = synthetic_ages(&mut rng, 50, 60.0, 10.0);
        let mut subjects = Vec::new();
        for arm in [Arm::Drug, Arm::Placebo] {
            for (i, &age) in ages.iter().enumerate() {
                subjects.push(subject(arm, i % 4 == 0, if i % 2 == 0 { "0" } else { "1" }, age));
            }
        }
        let result = analyze(&Dataset { subjects, skipped: 0 }).unwrap();
        assert!(result.mann_whitney.p_value > 0.5, "mwu p = {}", result.mann_whitney.p_value);
        assert!(result.chi_square.p_value > 0.5, "chi2 p = {}", result.chi_square.p_value);
    }

    #[test]
    fn test_analyze_missing_group_is_error() {
        let subjects = vec![
            subject(Arm::Drug, true, "1", 60.0),
            subject(Arm::Drug, false, "0", 55.0),
        ];
        let err = analyze(&Dataset { subjects, skipped: 0 }).unwrap_err();
        assert!(err.to_string().contains("Placebo"));
    }

    #[test]
    fn test_report_contains_all_labels() {
        let result = analyze(&synthetic_dataset()).unwrap();
        let report = build_markdown_report(&result, Some(Path::new("docs/age_hist_by_group.png")));
        assert!(report.contains("Drug"));
        assert!(report.contains("Placebo"));
        assert!(report.contains("z-test p-value"));
        assert!(report.contains("Chi-square p-value"));
        assert!(report.contains("Mann–Whitney U p-value"));
        assert!(report.contains("docs/age_hist_by_group.png"));
    }

    #[test]
    fn test_fmt_g() {
        assert_eq!(fmt_g(0.0, 4), "0");
        assert_eq!(fmt_g(0.5, 4), "0.5");
        assert_eq!(fmt_g(0.0073, 4), "0.0073");
        assert_eq!(fmt_g(0.000123456, 4), "0.0001235");
        assert_eq!(fmt_g(2.683e-7, 4), "2.683e-7");
        assert_eq!(fmt_g(1234.5, 4), "1234");
        assert_eq!(fmt_g(1.0, 4), "1");
    }

    #[test]
    fn test_civil_from_days() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(19723), (2024, 1, 1)); // 2024-01-01
        assert_eq!(civil_from_days(11016), (2000, 2, 29)); // leap day
    }
}
