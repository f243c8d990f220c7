use super::histogram2d::Histogram2D;
use crate::error::Result;
use crate::histoer::axis::Axis;

impl Histogram2D {
    // Compute the possible rebin factors based on the number of x bins
    pub fn possible_x_rebin_factors(&self) -> Vec<usize> {
        self.x.rebin_factors()
    }

    // Compute the possible rebin factors based on the number of y bins
    pub fn possible_y_rebin_factors(&self) -> Vec<usize> {
        self.y.rebin_factors()
    }

    /// Merge groups of `x_factor` by `y_factor` bins.
    ///
    /// The new axes keep the original edges, so when a factor does not
    /// divide the number of bins the last group becomes a narrower bin.
    pub fn rebin(&self, x_factor: usize, y_factor: usize) -> Result<Self> {
        let new_x: Axis = self.x.merged(x_factor)?;
        let new_y: Axis = self.y.merged(y_factor)?;

        let mut rebinned = Self::new(&self.name, new_x, new_y);
        rebinned.overflow = self.overflow;
        rebinned.underflow = self.underflow;

        // Transfer counts to new bins
        for (&(old_x_index, old_y_index), bin) in &self.bins {
            let new_bin = rebinned
                .bins
                .entry((old_x_index / x_factor, old_y_index / y_factor))
                .or_default();
            new_bin.content += bin.content;
            new_bin.sumw2 += bin.sumw2;
        }

        log::debug!(
            "Rebinned {} from {}x{} to {}x{} bins",
            self.name,
            self.x.bins(),
            self.y.bins(),
            rebinned.x.bins(),
            rebinned.y.bins()
        );

        Ok(rebinned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FitError;
    use float_cmp::assert_approx_eq;

    #[test]
    fn rebin_preserves_integral_and_errors() {
        let mut hist = Histogram2D::uniform("h", (4, 3), ((0.0, 4.0), (0.0, 3.0))).unwrap();
        for x in 0..4 {
            for y in 0..3 {
                hist.fill_weighted(x as f64 + 0.5, y as f64 + 0.5, (x + y) as f64 + 1.0);
            }
        }

        let rebinned = hist.rebin(2, 2).unwrap();
        assert_eq!(rebinned.x.edges(), &[0.0, 2.0, 4.0]);
        assert_eq!(rebinned.y.edges(), &[0.0, 2.0, 3.0]);
        assert_approx_eq!(f64, rebinned.integral(), hist.integral(), epsilon = 1e-12);

        // x in {0,1}, y in {0,1}: weights 1, 2, 2, 3
        assert_approx_eq!(f64, rebinned.content(0, 0), 8.0);
        assert_approx_eq!(f64, rebinned.bin(0, 0).sumw2, 1.0 + 4.0 + 4.0 + 9.0);
        // trailing partial y group: x in {2,3}, y = 2
        assert_approx_eq!(f64, rebinned.content(1, 1), 5.0 + 6.0);
    }

    #[test]
    fn rebin_factors() {
        let hist = Histogram2D::uniform("h", (60, 50), ((0.0, 50.0), (-0.5, 0.5))).unwrap();
        assert_eq!(hist.possible_x_rebin_factors(), vec![1, 2, 4]);
        assert_eq!(hist.possible_y_rebin_factors(), vec![1, 2]);
        assert!(matches!(hist.rebin(0, 1), Err(FitError::InvalidBinning(_))));
    }
}
