//! Quantile histogram binning for tree fitting.
//!
//! Each feature column is cut at (at most) `max_bins - 1` quantile points
//! once, up front. Trees then search splits over bin boundaries instead of
//! every distinct value. A value `x` falls in bin `b` where `b` is the
//! number of cuts strictly below `x`, so "bin ≤ b" is exactly
//! "x ≤ cuts[b]" and stored thresholds are real feature values.

/// Column-major binned view of a training matrix.
#[derive(Debug, Clone)]
pub struct BinnedMatrix {
    n_rows: usize,
    cuts: Vec<Vec<f64>>,
    bins: Vec<Vec<u8>>,
}

impl BinnedMatrix {
    /// Bin `rows` (row-major, equal width) with up to `max_bins` bins per feature.
    pub fn from_rows(rows: &[Vec<f64>], max_bins: usize) -> Self {
        let n_rows = rows.len();
        let width = rows.first().map_or(0, Vec::len);
        let max_bins = max_bins.clamp(2, 256);

        let mut cuts = Vec::with_capacity(width);
        let mut bins = Vec::with_capacity(width);
        for col in 0..width {
            let column: Vec<f64> = rows.iter().map(|r| r[col]).collect();
            let col_cuts = quantile_cuts(&column, max_bins);
            let col_bins = column.iter().map(|&x| bin_of(&col_cuts, x)).collect();
            cuts.push(col_cuts);
            bins.push(col_bins);
        }

        Self { n_rows, cuts, bins }
    }

    pub const fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_features(&self) -> usize {
        self.cuts.len()
    }

    /// Number of bins of a feature (cuts + 1).
    pub fn n_bins(&self, feature: usize) -> usize {
        self.cuts[feature].len() + 1
    }

    pub fn bin(&self, feature: usize, row: usize) -> usize {
        usize::from(self.bins[feature][row])
    }

    /// Upper edge of `bin` as a real threshold.
    pub fn threshold(&self, feature: usize, bin: usize) -> f64 {
        self.cuts[feature][bin]
    }
}

fn quantile_cuts(column: &[f64], max_bins: usize) -> Vec<f64> {
    let mut sorted: Vec<f64> = column.iter().copied().filter(|x| x.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    sorted.dedup();
    if sorted.len() <= 1 {
        return Vec::new();
    }

    // Few distinct values: cut between each neighbouring pair
    if sorted.len() <= max_bins {
        return sorted.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();
    }

    let mut cuts: Vec<f64> = Vec::with_capacity(max_bins - 1);
    for k in 1..max_bins {
        let pos = k * sorted.len() / max_bins;
        let cut = 0.5 * (sorted[pos - 1] + sorted[pos]);
        if cuts.last().map_or(true, |last| cut > *last) {
            cuts.push(cut);
        }
    }
    cuts
}

fn bin_of(cuts: &[f64], x: f64) -> u8 {
    // cuts.len() ≤ 255, so the bin index always fits
    cuts.partition_point(|c| *c < x) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bin_matches_threshold_semantics() {
        let rows: Vec<Vec<f64>> = (0..1000).map(|i| vec![f64::from(i) * 0.37]).collect();
        let m = BinnedMatrix::from_rows(&rows, 16);
        assert!(m.n_bins(0) <= 16);
        for (row, r) in rows.iter().enumerate() {
            let b = m.bin(0, row);
            if b < m.n_bins(0) - 1 {
                assert!(r[0] <= m.threshold(0, b));
            }
            if b > 0 {
                assert!(r[0] > m.threshold(0, b - 1));
            }
        }
    }

    #[test]
    fn test_few_distinct_values_get_own_bins() {
        let rows: Vec<Vec<f64>> = [1.0, 2.0, 2.0, 3.0].iter().map(|x| vec![*x]).collect();
        let m = BinnedMatrix::from_rows(&rows, 64);
        assert_eq!(m.n_bins(0), 3);
        assert_eq!(m.bin(0, 0), 0);
        assert_eq!(m.bin(0, 1), 1);
        assert_eq!(m.bin(0, 3), 2);
    }

    #[test]
    fn test_constant_column_single_bin() {
        let rows = vec![vec![5.0]; 10];
        let m = BinnedMatrix::from_rows(&rows, 64);
        assert_eq!(m.n_bins(0), 1);
    }
}
