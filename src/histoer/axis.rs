use crate::error::{FitError, Result};

/// Binning of one histogram axis, stored as strictly increasing edges.
///
/// Bins are half-open, `[low, high)`, so a value equal to the last edge is
/// overflow.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Axis {
    edges: Vec<f64>,
}

impl Axis {
    // Equal-width bins between min and max
    pub fn uniform(bins: usize, min: f64, max: f64) -> Result<Self> {
        if bins == 0 {
            return Err(FitError::InvalidBinning(
                "an axis needs at least one bin".to_owned(),
            ));
        }
        if !(min.is_finite() && max.is_finite() && min < max) {
            return Err(FitError::InvalidBinning(format!(
                "axis range [{min}, {max}) is empty or not finite"
            )));
        }

        let width = (max - min) / bins as f64;
        let mut edges: Vec<f64> = (0..bins).map(|i| min + i as f64 * width).collect();
        edges.push(max);

        Self::from_edges(edges)
    }

    pub fn from_edges(edges: Vec<f64>) -> Result<Self> {
        if edges.len() < 2 {
            return Err(FitError::InvalidBinning(format!(
                "an axis needs at least two edges, got {}",
                edges.len()
            )));
        }
        if edges.iter().any(|edge| !edge.is_finite()) {
            return Err(FitError::InvalidBinning(
                "axis edges must be finite".to_owned(),
            ));
        }
        if let Some(pair) = edges.windows(2).find(|pair| pair[0] >= pair[1]) {
            return Err(FitError::InvalidBinning(format!(
                "axis edges must be strictly increasing, found {} followed by {}",
                pair[0], pair[1]
            )));
        }

        Ok(Self { edges })
    }

    pub fn bins(&self) -> usize {
        self.edges.len() - 1
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    pub fn min(&self) -> f64 {
        self.edges[0]
    }

    pub fn max(&self) -> f64 {
        self.edges[self.edges.len() - 1]
    }

    pub fn low_edge(&self, index: usize) -> f64 {
        self.edges[index]
    }

    pub fn high_edge(&self, index: usize) -> f64 {
        self.edges[index + 1]
    }

    pub fn center(&self, index: usize) -> f64 {
        0.5 * (self.edges[index] + self.edges[index + 1])
    }

    pub fn width(&self, index: usize) -> f64 {
        self.edges[index + 1] - self.edges[index]
    }

    pub fn centers(&self) -> Vec<f64> {
        (0..self.bins()).map(|i| self.center(i)).collect()
    }

    // get the bin index for a given value, None for under/overflow and NaN
    pub fn find_bin(&self, value: f64) -> Option<usize> {
        if !(value >= self.min() && value < self.max()) {
            return None;
        }

        // at least the first edge is <= value here
        Some(self.edges.partition_point(|&edge| edge <= value) - 1)
    }

    // Indices of the bins whose centers lie in [min, max)
    pub fn bins_with_center_in(&self, min: f64, max: f64) -> Option<(usize, usize)> {
        let first = (0..self.bins()).find(|&i| self.center(i) >= min)?;
        let last = (0..self.bins()).rev().find(|&i| self.center(i) < max)?;
        (first <= last).then_some((first, last))
    }

    pub fn is_uniform(&self) -> bool {
        let reference = self.width(0);
        (0..self.bins()).all(|i| (self.width(i) - reference).abs() <= 1e-9 * reference.abs())
    }

    // Power-of-two merge factors that divide the number of bins, excluding the full axis
    pub fn rebin_factors(&self) -> Vec<usize> {
        let bins = self.bins();
        let mut factors = vec![1];
        let mut factor = 1;
        while bins.is_multiple_of(factor * 2) {
            factor *= 2;
            factors.push(factor);
        }

        if factors.last() == Some(&bins) {
            factors.pop();
        }
        factors
    }

    // Edges of the axis after merging every `factor` bins, a trailing partial group is kept
    pub fn merged(&self, factor: usize) -> Result<Self> {
        if factor == 0 {
            return Err(FitError::InvalidBinning(
                "rebin factor must be at least 1".to_owned(),
            ));
        }

        let mut edges: Vec<f64> = self.edges.iter().step_by(factor).copied().collect();
        if self.bins() % factor != 0 {
            edges.push(self.max());
        }

        Self::from_edges(edges)
    }
}

impl TryFrom<Vec<f64>> for Axis {
    type Error = FitError;

    fn try_from(edges: Vec<f64>) -> Result<Self> {
        Self::from_edges(edges)
    }
}

impl From<Axis> for Vec<f64> {
    fn from(axis: Axis) -> Self {
        axis.edges
    }
}
