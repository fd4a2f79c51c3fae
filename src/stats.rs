//! Hypothesis tests for two-arm trial data
//!
//! Degenerate inputs (empty samples, zero variance, bad table shapes) return
//! None; callers turn that into a data error with context.

use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};

/// Two-sided two-sample z-test on proportions
#[derive(Debug, Clone, Copy)]
pub struct ProportionTest {
    pub z: f64,
    pub p_value: f64,
}

/// Chi-square test of independence
#[derive(Debug, Clone, Copy)]
pub struct ChiSquareTest {
    pub statistic: f64,
    pub df: f64,
    pub p_value: f64,
}

/// Mann-Whitney U test (normal approximation, tie and continuity corrected)
#[derive(Debug, Clone, Copy)]
pub struct MannWhitneyTest {
    pub u: f64,
    pub p_value: f64,
}

/// Shapiro-Wilk normality test
#[derive(Debug, Clone, Copy)]
pub struct ShapiroWilkTest {
    pub w: f64,
    pub p_value: f64,
}

/// Pooled-variance z-test comparing event proportions between two arms.
pub fn two_proportion_z_test(
    events_a: usize,
    n_a: usize,
    events_b: usize,
    n_b: usize,
) -> Option<ProportionTest> {
    if n_a == 0 || n_b == 0 || events_a > n_a || events_b > n_b {
        return None;
    }
    let norm = Normal::new(0.0, 1.0).ok()?;

    let (x1, n1) = (events_a as f64, n_a as f64);
    let (x2, n2) = (events_b as f64, n_b as f64);
    let p1 = x1 / n1;
    let p2 = x2 / n2;

    let p_pool = (x1 + x2) / (n1 + n2);
    let se = (p_pool * (1.0 - p_pool) * (1.0 / n1 + 1.0 / n2)).sqrt();
    if se < 1e-300 {
        // All events or no events in both arms: no evidence of a difference
        return Some(ProportionTest { z: 0.0, p_value: 1.0 });
    }

    let z = (p1 - p2) / se;
    let p_value = 2.0 * (1.0 - norm.cdf(z.abs()));
    Some(ProportionTest {
        z,
        p_value: p_value.clamp(0.0, 1.0),
    })
}

/// Pearson chi-square test on a row-major `n_rows` x `n_cols` count table.
/// No sparse-cell correction is applied.
pub fn chi_square_independence(table: &[f64], n_rows: usize, n_cols: usize) -> Option<ChiSquareTest> {
    if n_rows < 2 || n_cols < 2 || table.len() != n_rows * n_cols {
        return None;
    }
    if table.iter().any(|&v| v < 0.0 || !v.is_finite()) {
        return None;
    }

    let mut row_sums = vec![0.0; n_rows];
    let mut col_sums = vec![0.0; n_cols];
    let mut total = 0.0;
    for i in 0..n_rows {
        for j in 0..n_cols {
            let v = table[i * n_cols + j];
            row_sums[i] += v;
            col_sums[j] += v;
            total += v;
        }
    }
    if total <= 0.0 || row_sums.iter().any(|&r| r <= 0.0) || col_sums.iter().any(|&c| c <= 0.0) {
        return None;
    }

    let mut statistic = 0.0;
    for i in 0..n_rows {
        for j in 0..n_cols {
            let expected = row_sums[i] * col_sums[j] / total;
            statistic += (table[i * n_cols + j] - expected).powi(2) / expected;
        }
    }

    let df = ((n_rows - 1) * (n_cols - 1)) as f64;
    let chi = ChiSquared::new(df).ok()?;
    Some(ChiSquareTest {
        statistic,
        df,
        p_value: (1.0 - chi.cdf(statistic)).clamp(0.0, 1.0),
    })
}

/// Two-sided Mann-Whitney U test between two independent samples.
pub fn mann_whitney_u(a: &[f64], b: &[f64]) -> Option<MannWhitneyTest> {
    let (n1, n2) = (a.len(), b.len());
    if n1 < 2 || n2 < 2 {
        return None;
    }
    if a.iter().chain(b.iter()).any(|v| !v.is_finite()) {
        return None;
    }
    let norm = Normal::new(0.0, 1.0).ok()?;

    let mut combined: Vec<(f64, u8)> = Vec::with_capacity(n1 + n2);
    combined.extend(a.iter().map(|&v| (v, 0)));
    combined.extend(b.iter().map(|&v| (v, 1)));
    combined.sort_by(|x, y| x.0.partial_cmp(&y.0).unwrap_or(std::cmp::Ordering::Equal));

    let ranks = average_ranks(&combined);
    let r1: f64 = combined
        .iter()
        .zip(&ranks)
        .filter(|((_, g), _)| *g == 0)
        .map(|(_, &r)| r)
        .sum();

    let (n1f, n2f) = (n1 as f64, n2 as f64);
    let nf = n1f + n2f;
    let u = r1 - n1f * (n1f + 1.0) / 2.0;

    let ties = tie_correction(&combined);
    let mu = n1f * n2f / 2.0;
    let sigma_sq = n1f * n2f / 12.0 * (nf + 1.0 - ties / (nf * (nf - 1.0)));
    if sigma_sq <= 0.0 {
        // Every observation tied across both samples
        return Some(MannWhitneyTest { u, p_value: 1.0 });
    }

    // Continuity-corrected normal approximation
    let z = ((u - mu).abs() - 0.5).max(0.0) / sigma_sq.sqrt();
    let p_value = 2.0 * (1.0 - norm.cdf(z));
    Some(MannWhitneyTest {
        u,
        p_value: p_value.clamp(0.0, 1.0),
    })
}

/// Average ranks (1-based) for a slice sorted by value, ties sharing the mean rank.
fn average_ranks(sorted: &[(f64, u8)]) -> Vec<f64> {
    let n = sorted.len();
    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && sorted[j + 1].0 == sorted[i].0 {
            j += 1;
        }
        let avg = (i + j + 2) as f64 / 2.0;
        for r in ranks.iter_mut().take(j + 1).skip(i) {
            *r = avg;
        }
        i = j + 1;
    }
    ranks
}

/// Tie correction term: sum over tie groups of t^3 - t.
fn tie_correction(sorted: &[(f64, u8)]) -> f64 {
    let n = sorted.len();
    let mut sum = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && sorted[j + 1].0 == sorted[i].0 {
            j += 1;
        }
        let t = (j - i + 1) as f64;
        sum += t * t * t - t;
        i = j + 1;
    }
    sum
}

// Royston (1992, 1995) polynomial coefficients for the W approximation
const SW_C1: [f64; 6] = [0.0, 0.221157, -0.147981, -2.07119, 4.434685, -2.706056];
const SW_C2: [f64; 6] = [0.0, 0.042981, -0.293762, -1.752461, 5.682633, -3.582633];
const SW_C3: [f64; 4] = [0.544, -0.39978, 0.025054, -6.714e-4];
const SW_C4: [f64; 4] = [1.3822, -0.77857, 0.062767, -0.0020322];
const SW_C5: [f64; 4] = [-1.5861, -0.31082, -0.083751, 0.0038915];
const SW_C6: [f64; 3] = [-0.4803, -0.082676, 0.0030302];
const SW_G: [f64; 2] = [-2.273, 0.459];

fn poly(c: &[f64], x: f64) -> f64 {
    c.iter().rev().fold(0.0, |acc, &ci| acc * x + ci)
}

/// Shapiro-Wilk W test via the Royston AS R94 approximation.
/// Supports n in 3..=5000; None outside that range, for non-finite input,
/// or when all values are identical.
pub fn shapiro_wilk(data: &[f64]) -> Option<ShapiroWilkTest> {
    let n = data.len();
    if !(3..=5000).contains(&n) || data.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let mut x = data.to_vec();
    x.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    if x[n - 1] - x[0] < 1e-300 {
        return None;
    }

    if n == 3 {
        return shapiro_wilk_n3(&x);
    }

    let norm = Normal::new(0.0, 1.0).ok()?;
    let half = n / 2;
    let nf = n as f64;

    // Expected normal order statistics (Blom approximation)
    let mut m = vec![0.0; half];
    let mut ssq_m = 0.0;
    for (i, mi) in m.iter_mut().enumerate() {
        *mi = norm.inverse_cdf((i as f64 + 1.0 - 0.375) / (nf + 0.25));
        ssq_m += *mi * *mi;
    }
    ssq_m *= 2.0;
    let rsn = 1.0 / nf.sqrt();

    // Royston-corrected coefficients
    let mut a = vec![0.0; half];
    let a1 = poly(&SW_C1, rsn) - m[0] / ssq_m.sqrt();
    if n <= 5 {
        let num = ssq_m - 2.0 * m[0] * m[0];
        let den = 1.0 - 2.0 * a1 * a1;
        if num <= 0.0 || den <= 0.0 {
            return None;
        }
        let fac = (num / den).sqrt();
        a[0] = a1;
        for i in 1..half {
            a[i] = -m[i] / fac;
        }
    } else {
        let a2 = -m[1] / ssq_m.sqrt() + poly(&SW_C2, rsn);
        let num = ssq_m - 2.0 * m[0] * m[0] - 2.0 * m[1] * m[1];
        let den = 1.0 - 2.0 * a1 * a1 - 2.0 * a2 * a2;
        if num <= 0.0 || den <= 0.0 {
            return None;
        }
        let fac = (num / den).sqrt();
        a[0] = a1;
        a[1] = a2;
        for i in 2..half {
            a[i] = -m[i] / fac;
        }
    }

    // W = (sum a_i (x_(n+1-i) - x_(i)))^2 / SS
    let mut sa = 0.0;
    for i in 0..half {
        sa += a[i] * (x[n - 1 - i] - x[i]);
    }
    let mean = x.iter().sum::<f64>() / nf;
    let ss: f64 = x.iter().map(|&v| (v - mean).powi(2)).sum();
    if ss < 1e-300 {
        return None;
    }
    let w = ((sa * sa) / ss).min(1.0);

    // Royston p-value transformation
    let w1 = 1.0 - w;
    if w1 <= 0.0 {
        return Some(ShapiroWilkTest { w, p_value: 1.0 });
    }
    let y = w1.ln();
    let p_value = if n <= 11 {
        let gamma = poly(&SW_G, nf);
        if y >= gamma {
            0.0
        } else {
            let y2 = -(gamma - y).ln();
            let mu = poly(&SW_C3, nf);
            let sigma = poly(&SW_C4, nf).exp();
            1.0 - norm.cdf((y2 - mu) / sigma)
        }
    } else {
        let ln_n = nf.ln();
        let mu = poly(&SW_C5, ln_n);
        let sigma = poly(&SW_C6, ln_n).exp();
        1.0 - norm.cdf((y - mu) / sigma)
    };

    Some(ShapiroWilkTest {
        w,
        p_value: p_value.clamp(0.0, 1.0),
    })
}

// n = 3 has a closed form: a = (1/sqrt(2), 0, -1/sqrt(2)), p from arccos
fn shapiro_wilk_n3(x: &[f64]) -> Option<ShapiroWilkTest> {
    let mean = (x[0] + x[1] + x[2]) / 3.0;
    let ss: f64 = x.iter().map(|&v| (v - mean).powi(2)).sum();
    if ss < 1e-300 {
        return None;
    }
    let num = std::f64::consts::FRAC_1_SQRT_2 * (x[2] - x[0]);
    let w = ((num * num) / ss).clamp(0.75, 1.0);
    let p = 1.0 - (6.0 / std::f64::consts::PI) * w.sqrt().acos();
    Some(ShapiroWilkTest {
        w,
        p_value: p.clamp(0.0, 1.0),
    })
}
