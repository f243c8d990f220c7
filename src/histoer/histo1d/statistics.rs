use super::histogram1d::Histogram1D;

#[derive(Debug, Default, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Statistics1D {
    pub integral: f64,
    pub mean: f64,
    pub stdev: f64,
}

impl Histogram1D {
    // Calculate the statistics for the histogram within the specified x range.
    pub fn get_statistics(&self, start_x: f64, end_x: f64) -> Statistics1D {
        if start_x.is_nan() || end_x.is_nan() || start_x > end_x {
            return Statistics1D::default();
        }
        // entirely off the axis
        if end_x < self.axis.min() || start_x >= self.axis.max() {
            return Statistics1D::default();
        }

        // edges beyond the axis clamp to its first and last bin
        let start_bin = self.get_bin_index(start_x).unwrap_or(0);
        let end_bin = self
            .get_bin_index(end_x)
            .unwrap_or(self.bins().saturating_sub(1));

        let mut sum_product = 0.0;
        let mut total = 0.0;

        for bin in start_bin..=end_bin.min(self.bins() - 1) {
            let center = self.axis.center(bin);
            sum_product += self.contents[bin] * center;
            total += self.contents[bin];
        }

        if total == 0.0 {
            return Statistics1D::default();
        }

        let mean = sum_product / total;

        let mut sum_squared_diff = 0.0;
        for bin in start_bin..=end_bin.min(self.bins() - 1) {
            let diff = self.axis.center(bin) - mean;
            sum_squared_diff += self.contents[bin] * diff * diff;
        }

        Statistics1D {
            integral: total,
            mean,
            stdev: (sum_squared_diff / total).sqrt(),
        }
    }

    pub fn statistics(&self) -> Statistics1D {
        self.get_statistics(self.axis.min(), self.axis.max())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn statistics_over_full_range() {
        let mut hist = Histogram1D::uniform("h", 4, (0.0, 4.0)).unwrap();
        hist.fill(1.5);
        hist.fill(2.5);

        let stats = hist.statistics();
        assert_approx_eq!(f64, stats.integral, 2.0);
        assert_approx_eq!(f64, stats.mean, 2.0, epsilon = 1e-12);
        assert_approx_eq!(f64, stats.stdev, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn statistics_in_window_ignores_outside_bins() {
        let mut hist = Histogram1D::uniform("h", 4, (0.0, 4.0)).unwrap();
        hist.fill(0.5);
        hist.fill(3.5);
        hist.fill(3.5);

        let stats = hist.get_statistics(2.0, 3.9);
        assert_approx_eq!(f64, stats.integral, 2.0);
        assert_approx_eq!(f64, stats.mean, 3.5, epsilon = 1e-12);
        assert_approx_eq!(f64, stats.stdev, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn windows_off_the_axis_are_empty() {
        let mut hist = Histogram1D::uniform("h", 4, (0.0, 4.0)).unwrap();
        hist.fill(0.5);
        hist.fill(3.5);

        assert_eq!(hist.get_statistics(10.0, 20.0), Statistics1D::default());
        assert_eq!(hist.get_statistics(-5.0, -1.0), Statistics1D::default());
        assert_eq!(hist.get_statistics(3.0, 1.0), Statistics1D::default());
        assert_eq!(hist.get_statistics(f64::NAN, 2.0), Statistics1D::default());

        // partially overlapping windows clamp to the axis
        let stats = hist.get_statistics(3.0, 20.0);
        assert_approx_eq!(f64, stats.integral, 1.0);
        assert_approx_eq!(f64, stats.mean, 3.5, epsilon = 1e-12);
        let stats = hist.get_statistics(-5.0, 0.9);
        assert_approx_eq!(f64, stats.integral, 1.0);
        assert_approx_eq!(f64, stats.mean, 0.5, epsilon = 1e-12);
    }
}
