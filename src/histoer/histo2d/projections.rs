use std::ops::RangeInclusive;

use super::histogram2d::Histogram2D;
use crate::error::{FitError, Result};
use crate::histoer::axis::Axis;
use crate::histoer::histo1d::histogram1d::Histogram1D;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ProjectionAxis {
    X,
    Y,
}

impl ProjectionAxis {
    pub fn other(self) -> Self {
        match self {
            Self::X => Self::Y,
            Self::Y => Self::X,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProjectionPoint {
    pub center: f64,
    pub width: f64,
    pub value: f64,
    pub error: f64,
}

/// One-dimensional projection of a [`Histogram2D`] onto one of its axes.
///
/// Values are the sums over the selected bins of the other axis; errors are
/// the quadrature sums of the contributing bin errors.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Projection1D {
    pub name: String,
    pub axis: ProjectionAxis,
    pub points: Vec<ProjectionPoint>,
}

impl Projection1D {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn centers(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.center).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn errors(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.error).collect()
    }

    pub fn integral(&self) -> f64 {
        self.points.iter().map(|p| p.value).sum()
    }

    // Point-by-point sum, errors add in quadrature
    pub fn add(&self, other: &Self) -> Result<Self> {
        let same_binning = self.axis == other.axis
            && self.len() == other.len()
            && self
                .points
                .iter()
                .zip(&other.points)
                .all(|(a, b)| a.center == b.center && a.width == b.width);
        if !same_binning {
            return Err(FitError::ShapeMismatch(format!(
                "cannot add projection '{}' to '{}'",
                other.name, self.name
            )));
        }

        let points = self
            .points
            .iter()
            .zip(&other.points)
            .map(|(a, b)| ProjectionPoint {
                value: a.value + b.value,
                error: a.error.hypot(b.error),
                ..*a
            })
            .collect();

        Ok(Self {
            name: self.name.clone(),
            axis: self.axis,
            points,
        })
    }

    // Copy of the projection as a 1-D histogram over the same edges
    pub fn to_histogram(&self) -> Result<Histogram1D> {
        let mut edges: Vec<f64> = self.points.iter().map(|p| p.center - 0.5 * p.width).collect();
        if let Some(last) = self.points.last() {
            edges.push(last.center + 0.5 * last.width);
        }

        let mut hist = Histogram1D::new(&self.name, Axis::from_edges(edges)?);
        for (i, point) in self.points.iter().enumerate() {
            hist.set_bin(i, point.value, point.error)?;
        }
        Ok(hist)
    }
}

impl Histogram2D {
    fn axis_of(&self, axis: ProjectionAxis) -> &Axis {
        match axis {
            ProjectionAxis::X => &self.x,
            ProjectionAxis::Y => &self.y,
        }
    }

    /// Project onto `axis`, summing the bins of the other axis whose index
    /// lies in `range` (inclusive). The range is clamped to the other axis.
    pub fn project_axis(&self, axis: ProjectionAxis, range: RangeInclusive<usize>) -> Projection1D {
        let target = self.axis_of(axis);
        let other_bins = self.axis_of(axis.other()).bins();

        let mut values = vec![0.0; target.bins()];
        let mut sumw2 = vec![0.0; target.bins()];

        let (first, last) = (*range.start(), (*range.end()).min(other_bins.saturating_sub(1)));
        if first <= last {
            for (&(x_index, y_index), bin) in &self.bins {
                let (index, other_index) = match axis {
                    ProjectionAxis::X => (x_index, y_index),
                    ProjectionAxis::Y => (y_index, x_index),
                };
                if other_index >= first && other_index <= last && index < values.len() {
                    values[index] += bin.content;
                    sumw2[index] += bin.sumw2;
                }
            }
        }

        let suffix = match axis {
            ProjectionAxis::X => "px",
            ProjectionAxis::Y => "py",
        };

        Projection1D {
            name: format!("{}_{suffix}", self.name),
            axis,
            points: (0..target.bins())
                .map(|i| ProjectionPoint {
                    center: target.center(i),
                    width: target.width(i),
                    value: values[i],
                    error: sumw2[i].sqrt(),
                })
                .collect(),
        }
    }

    // Projection onto x over the whole y axis
    pub fn x_projection_full(&self) -> Projection1D {
        self.project_axis(ProjectionAxis::X, 0..=self.y.bins() - 1)
    }

    // Projection onto y over the whole x axis
    pub fn y_projection_full(&self) -> Projection1D {
        self.project_axis(ProjectionAxis::Y, 0..=self.x.bins() - 1)
    }

    // Projection onto x using the y bins whose centers lie in [y_min, y_max)
    pub fn x_projection(&self, y_min: f64, y_max: f64) -> Projection1D {
        // an empty selection projects nothing
        let (first, last) = self.y.bins_with_center_in(y_min, y_max).unwrap_or((1, 0));
        self.project_axis(ProjectionAxis::X, first..=last)
    }

    // Projection onto y using the x bins whose centers lie in [x_min, x_max)
    pub fn y_projection(&self, x_min: f64, x_max: f64) -> Projection1D {
        let (first, last) = self.x.bins_with_center_in(x_min, x_max).unwrap_or((1, 0));
        self.project_axis(ProjectionAxis::Y, first..=last)
    }
}
