use super::special::beta_inc;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WelchResult {
    /// Sign follows `mean(b) - mean(a)`.
    pub t: f64,
    pub df: f64,
    /// Two-sided.
    pub p_value: f64,
}

pub fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Unbiased sample variance. Zero for fewer than two values.
pub fn variance(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() as f64 - 1.0)
}

/// Welch's unequal-variance t-test. Both samples need at least two values.
///
/// With zero variance in both samples the statistic is degenerate: equal
/// means give `t = 0, p = 1`, different means give an infinite `t` and
/// `p = 0`.
pub fn welch(a: &[f64], b: &[f64]) -> WelchResult {
    let (na, nb) = (a.len() as f64, b.len() as f64);
    let (ma, mb) = (mean(a), mean(b));
    let (va, vb) = (variance(a), variance(b));
    let (sa, sb) = (va / na, vb / nb);
    let se2 = sa + sb;
    let diff = mb - ma;

    if se2 == 0.0 {
        let df = na + nb - 2.0;
        return if diff == 0.0 {
            WelchResult {
                t: 0.0,
                df,
                p_value: 1.0,
            }
        } else {
            WelchResult {
                t: f64::INFINITY.copysign(diff),
                df,
                p_value: 0.0,
            }
        };
    }

    let t = diff / se2.sqrt();
    let df = se2.powi(2) / (sa.powi(2) / (na - 1.0) + sb.powi(2) / (nb - 1.0));
    let p_value = beta_inc(df / 2.0, 0.5, df / (df + t * t)).clamp(0.0, 1.0);
    WelchResult { t, df, p_value }
}
