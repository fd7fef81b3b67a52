use super::ttest::{mean, variance};

/// Cohen's d of `b` against `a` with the pooled standard deviation.
///
/// Identical constant samples give 0; different constant samples give an
/// infinite effect signed like the mean difference.
pub fn cohens_d(a: &[f64], b: &[f64]) -> f64 {
    let (na, nb) = (a.len() as f64, b.len() as f64);
    let diff = mean(b) - mean(a);
    let pooled = (((na - 1.0) * variance(a) + (nb - 1.0) * variance(b)) / (na + nb - 2.0)).sqrt();
    if pooled == 0.0 {
        if diff == 0.0 {
            return 0.0;
        }
        return f64::INFINITY.copysign(diff);
    }
    diff / pooled
}

/// Cramér's V from an uncorrected chi-square statistic.
pub fn cramers_v(chi2: f64, n: f64, rows: usize, cols: usize) -> f64 {
    let k = rows.min(cols);
    if k < 2 || n <= 0.0 {
        return 0.0;
    }
    (chi2 / (n * (k as f64 - 1.0))).sqrt().min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cohens_d_one_pooled_sd_apart() {
        let a = [1.0, 2.0, 3.0];
        let b = [2.0, 3.0, 4.0];
        // pooled sd = 1
        assert!((cohens_d(&a, &b) - 1.0).abs() < 1e-12);
        assert!((cohens_d(&b, &a) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_cohens_d_constant_samples() {
        assert_eq!(cohens_d(&[2.0; 4], &[2.0; 4]), 0.0);
        assert_eq!(cohens_d(&[2.0; 4], &[1.0; 4]), f64::NEG_INFINITY);
    }

    #[test]
    fn test_cramers_v_bounds() {
        assert_eq!(cramers_v(60.0, 60.0, 2, 2), 1.0);
        assert_eq!(cramers_v(0.0, 60.0, 2, 2), 0.0);
        assert_eq!(cramers_v(5.0, 60.0, 2, 1), 0.0);
    }
}
