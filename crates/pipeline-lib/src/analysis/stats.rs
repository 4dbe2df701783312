//! Numeric helpers shared by the analyses

/// Arithmetic mean; 0 for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation around `mean`; 0 for an empty slice
pub fn population_std_dev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Whether `std_dev` is indistinguishable from zero at the scale of `mean`
pub fn is_degenerate_spread(std_dev: f64, mean: f64) -> bool {
    !std_dev.is_finite() || std_dev <= f64::EPSILON * mean.abs().max(1.0)
}

/// Pearson correlation of two equal-length series; 0 when either is flat
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return 0.0;
    }
    let (x, y) = (&x[..n], &y[..n]);
    let x_mean = mean(x);
    let y_mean = mean(y);

    let mut numerator = 0.0;
    let mut x_sq = 0.0;
    let mut y_sq = 0.0;
    for (xi, yi) in x.iter().zip(y) {
        let dx = xi - x_mean;
        let dy = yi - y_mean;
        numerator += dx * dy;
        x_sq += dx * dx;
        y_sq += dy * dy;
    }

    let denominator = (x_sq * y_sq).sqrt();
    if denominator == 0.0 || !denominator.is_finite() {
        return 0.0;
    }
    (numerator / denominator).clamp(-1.0, 1.0)
}

/// Two-tailed p-value of a Pearson coefficient `r` over `n` pairs
///
/// Uses t = r·sqrt(df / (1 − r²)) with df = n − 2 against Student's t,
/// evaluated through the regularized incomplete beta function.
pub fn correlation_p_value(r: f64, n: usize) -> f64 {
    if n < 3 || !r.is_finite() {
        return 1.0;
    }
    let r_sq = r * r;
    if r_sq >= 1.0 {
        return 0.0;
    }
    let df = (n - 2) as f64;
    let t_sq = r_sq * df / (1.0 - r_sq);
    regularized_incomplete_beta(df / 2.0, 0.5, df / (df + t_sq)).clamp(0.0, 1.0)
}

const LANCZOS_G: f64 = 7.0;
const LANCZOS_COEFFICIENTS: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

/// ln Γ(x) by the Lanczos approximation
pub fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        // Reflection formula
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let mut a = LANCZOS_COEFFICIENTS[0];
    let t = x + LANCZOS_G + 0.5;
    for (i, c) in LANCZOS_COEFFICIENTS.iter().enumerate().skip(1) {
        a += c / (x + i as f64);
    }
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + a.ln()
}

const BETA_MAX_ITERATIONS: usize = 200;
const BETA_EPSILON: f64 = 3e-14;
const BETA_FPMIN: f64 = 1e-300;

/// Regularized incomplete beta I_x(a, b)
pub fn regularized_incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }

    let ln_front = ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();

    // The continued fraction converges fastest on this side of the mode
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

/// Modified Lentz evaluation of the incomplete beta continued fraction
fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;

    let mut c = 1.0;
    let mut d = non_zero(1.0 - qab * x / qap).recip();
    let mut h = d;

    for m in 1..=BETA_MAX_ITERATIONS {
        let m = m as f64;
        let m2 = 2.0 * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = non_zero(1.0 + aa * d).recip();
        c = non_zero(1.0 + aa / c);
        h *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = non_zero(1.0 + aa * d).recip();
        c = non_zero(1.0 + aa / c);
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < BETA_EPSILON {
            break;
        }
    }
    h
}

fn non_zero(value: f64) -> f64 {
    if value.abs() < BETA_FPMIN {
        BETA_FPMIN
    } else {
        value
    }
}
