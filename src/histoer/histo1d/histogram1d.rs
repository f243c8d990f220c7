use crate::error::{FitError, Result};
use crate::histoer::axis::Axis;

/// Weighted 1-D histogram.
///
/// Each bin keeps its content and the sum of squared weights, so the bin
/// error is `sqrt(sumw2)` (`sqrt(N)` for unweighted fills).
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(try_from = "RawHistogram1D")]
pub struct Histogram1D {
    pub name: String,
    pub axis: Axis,
    pub contents: Vec<f64>,
    pub sumw2: Vec<f64>,
    pub overflow: u64,
    pub underflow: u64,
}

#[derive(serde::Deserialize)]
struct RawHistogram1D {
    name: String,
    axis: Axis,
    contents: Vec<f64>,
    sumw2: Vec<f64>,
    overflow: u64,
    underflow: u64,
}

impl TryFrom<RawHistogram1D> for Histogram1D {
    type Error = FitError;

    fn try_from(raw: RawHistogram1D) -> Result<Self> {
        let bins = raw.axis.bins();
        if raw.contents.len() != bins || raw.sumw2.len() != bins {
            return Err(FitError::ShapeMismatch(format!(
                "'{}' has {} contents and {} sumw2 entries for {bins} bins",
                raw.name,
                raw.contents.len(),
                raw.sumw2.len()
            )));
        }

        Ok(Self {
            name: raw.name,
            axis: raw.axis,
            contents: raw.contents,
            sumw2: raw.sumw2,
            overflow: raw.overflow,
            underflow: raw.underflow,
        })
    }
}

impl Histogram1D {
    // Create a new Histogram with the given axis
    pub fn new(name: &str, axis: Axis) -> Self {
        let bins = axis.bins();
        Self {
            name: name.to_owned(),
            axis,
            contents: vec![0.0; bins],
            sumw2: vec![0.0; bins],
            overflow: 0,
            underflow: 0,
        }
    }

    pub fn uniform(name: &str, bins: usize, range: (f64, f64)) -> Result<Self> {
        Ok(Self::new(name, Axis::uniform(bins, range.0, range.1)?))
    }

    pub fn reset(&mut self) {
        self.contents.iter_mut().for_each(|c| *c = 0.0);
        self.sumw2.iter_mut().for_each(|w| *w = 0.0);
        self.overflow = 0;
        self.underflow = 0;
    }

    pub fn bins(&self) -> usize {
        self.contents.len()
    }

    pub fn error(&self, index: usize) -> f64 {
        self.sumw2[index].sqrt()
    }

    pub fn errors(&self) -> Vec<f64> {
        self.sumw2.iter().map(|w| w.sqrt()).collect()
    }

    // Set a bin directly, the error is given as a standard deviation
    pub fn set_bin(&mut self, index: usize, content: f64, error: f64) -> Result<()> {
        if index >= self.bins() {
            return Err(FitError::ShapeMismatch(format!(
                "bin {index} is outside of '{}' with {} bins",
                self.name,
                self.bins()
            )));
        }
        self.contents[index] = content;
        self.sumw2[index] = error * error;
        Ok(())
    }

    // Sum of the in-range contents, under/overflow are not included
    pub fn integral(&self) -> f64 {
        self.contents.iter().sum()
    }

    pub fn scale(&mut self, factor: f64) {
        for content in &mut self.contents {
            *content *= factor;
        }
        for w in &mut self.sumw2 {
            *w *= factor * factor;
        }
    }

    // Copy of the histogram scaled to unit integral
    pub fn normalized(&self) -> Result<Self> {
        let integral = self.integral();
        if !(integral.is_finite() && integral > 0.0) {
            return Err(FitError::EmptyHistogram {
                name: self.name.clone(),
                integral,
            });
        }

        let mut normalized = self.clone();
        normalized.scale(1.0 / integral);
        Ok(normalized)
    }

    /// Running sum of the contents from the first bin, errors accumulate in
    /// quadrature.
    ///
    /// Only in-range bins are summed. Underflow is kept as an entry count
    /// without weights, so it is not part of the sum, and the cumulative of
    /// a normalized histogram ends at exactly one.
    pub fn cumulative(&self) -> Self {
        let mut cumulative = Self::new(&format!("{}_cdf", self.name), self.axis.clone());

        let mut content = 0.0;
        let mut sumw2 = 0.0;
        for i in 0..self.bins() {
            content += self.contents[i];
            sumw2 += self.sumw2[i];
            cumulative.contents[i] = content;
            cumulative.sumw2[i] = sumw2;
        }

        cumulative
    }

    pub fn bin_centers(&self) -> Vec<f64> {
        self.axis.centers()
    }

    pub fn get_bin_index(&self, x: f64) -> Option<usize> {
        self.axis.find_bin(x)
    }
}
