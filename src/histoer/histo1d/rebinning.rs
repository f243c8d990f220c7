use super::histogram1d::Histogram1D;
use crate::error::Result;

impl Histogram1D {
    // Compute the possible rebin factors based on the number of bins
    pub fn possible_rebin_factors(&self) -> Vec<usize> {
        self.axis.rebin_factors()
    }

    // Merge every `factor` bins into one
    pub fn rebin(&self, factor: usize) -> Result<Self> {
        let axis = self.axis.merged(factor)?;
        let mut rebinned = Self::new(&self.name, axis);

        for i in 0..self.bins() {
            let new_index = i / factor;
            rebinned.contents[new_index] += self.contents[i];
            rebinned.sumw2[new_index] += self.sumw2[i];
        }
        rebinned.overflow = self.overflow;
        rebinned.underflow = self.underflow;

        Ok(rebinned)
    }
}
