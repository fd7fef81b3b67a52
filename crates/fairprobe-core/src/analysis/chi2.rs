use super::special::gamma_q;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Chi2Result {
    /// Yates-corrected for 2x2 tables.
    pub statistic: f64,
    /// Uncorrected statistic, used for effect sizes.
    pub raw_statistic: f64,
    pub df: f64,
    pub p_value: f64,
    pub n: f64,
    pub rows: usize,
    pub cols: usize,
}

impl Chi2Result {
    fn degenerate(n: f64, rows: usize, cols: usize) -> Self {
        Self {
            statistic: 0.0,
            raw_statistic: 0.0,
            df: 0.0,
            p_value: 1.0,
            n,
            rows,
            cols,
        }
    }
}

/// Chi-square test of independence on a rows x categories table of counts.
///
/// Categories nobody fell into are dropped first. A table left with fewer
/// than two rows or columns carries no evidence of dependence and yields
/// `p = 1`.
pub fn independence(table: &[Vec<f64>]) -> Chi2Result {
    let width = table.iter().map(|r| r.len()).max().unwrap_or(0);
    let col_totals: Vec<f64> = (0..width)
        .map(|j| table.iter().map(|r| r.get(j).copied().unwrap_or(0.0)).sum())
        .collect();
    let keep: Vec<usize> = (0..width).filter(|j| col_totals[*j] > 0.0).collect();

    let rows: Vec<Vec<f64>> = table
        .iter()
        .map(|r| keep.iter().map(|j| r.get(*j).copied().unwrap_or(0.0)).collect())
        .filter(|r: &Vec<f64>| r.iter().sum::<f64>() > 0.0)
        .collect();

    let n: f64 = rows.iter().flatten().sum();
    let (nr, nc) = (rows.len(), keep.len());
    if nr < 2 || nc < 2 {
        return Chi2Result::degenerate(n, nr, nc);
    }

    let row_totals: Vec<f64> = rows.iter().map(|r| r.iter().sum()).collect();
    let col_totals: Vec<f64> = (0..nc).map(|j| rows.iter().map(|r| r[j]).sum()).collect();
    let yates = nr == 2 && nc == 2;

    let mut statistic = 0.0;
    let mut raw_statistic = 0.0;
    for (i, row) in rows.iter().enumerate() {
        for (j, observed) in row.iter().enumerate() {
            let expected = row_totals[i] * col_totals[j] / n;
            let dev = (observed - expected).abs();
            raw_statistic += dev * dev / expected;
            let dev = if yates { (dev - 0.5).max(0.0) } else { dev };
            statistic += dev * dev / expected;
        }
    }

    let df = ((nr - 1) * (nc - 1)) as f64;
    let p_value = gamma_q(df / 2.0, statistic / 2.0).clamp(0.0, 1.0);
    Chi2Result {
        statistic,
        raw_statistic,
        df,
        p_value,
        n,
        rows: nr,
        cols: nc,
    }
}
