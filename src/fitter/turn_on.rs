use levenberg_marquardt::LeastSquaresProblem;
use nalgebra::storage::Owned;
use nalgebra::{DMatrix, DVector, Dyn};
use statrs::distribution::{Beta, ContinuousCDF};
use statrs::function::erf::erf;
use std::f64::consts::PI;

use super::common::{DataPoint, Value};
use super::minimizer::{FitStatus, LevMarSettings, clamp_to_bounds, minimize};
use crate::error::{FitError, Result};
use crate::histoer::histo1d::histogram1d::Histogram1D;

/// Central 1σ coverage, the usual confidence for efficiency error bars.
pub const ONE_SIGMA: f64 = 0.682689492137086;

/// Clopper–Pearson interval for `passed` successes out of `total` trials.
pub fn clopper_pearson(passed: f64, total: f64, confidence: f64) -> Result<(f64, f64)> {
    if !(confidence > 0.0 && confidence < 1.0) {
        return Err(FitError::InvalidEfficiency(format!(
            "confidence {confidence} is outside of (0, 1)"
        )));
    }
    if !(total > 0.0 && passed >= 0.0 && passed <= total) {
        return Err(FitError::InvalidEfficiency(format!(
            "{passed} passed out of {total}"
        )));
    }

    let alpha = 1.0 - confidence;
    let beta = |a: f64, b: f64| {
        Beta::new(a, b).map_err(|e| FitError::InvalidEfficiency(e.to_string()))
    };

    let lower = if passed == 0.0 {
        0.0
    } else {
        beta(passed, total - passed + 1.0)?.inverse_cdf(alpha / 2.0)
    };
    let upper = if passed == total {
        1.0
    } else {
        beta(passed + 1.0, total - passed)?.inverse_cdf(1.0 - alpha / 2.0)
    };

    Ok((lower, upper))
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct EfficiencyPoint {
    pub x: f64,
    pub y: f64,
    pub x_error_low: f64,
    pub x_error_high: f64,
    pub y_error_low: f64,
    pub y_error_high: f64,
}

impl EfficiencyPoint {
    pub fn data_point(&self) -> DataPoint {
        DataPoint {
            x: self.x,
            y: self.y,
            error_low: self.y_error_low,
            error_high: self.y_error_high,
        }
    }
}

/// Points with asymmetric errors, usually an efficiency versus some
/// reconstructed quantity.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct EfficiencyGraph {
    pub name: String,
    pub points: Vec<EfficiencyPoint>,
}

impl EfficiencyGraph {
    pub fn new(name: &str, points: Vec<EfficiencyPoint>) -> Self {
        Self {
            name: name.to_owned(),
            points,
        }
    }

    /// Ratio `pass / total` per bin with Clopper–Pearson errors at
    /// `confidence`. Bins without entries in `total` are skipped.
    pub fn from_ratio(pass: &Histogram1D, total: &Histogram1D, confidence: f64) -> Result<Self> {
        if pass.axis != total.axis {
            return Err(FitError::ShapeMismatch(format!(
                "'{}' and '{}' have different binning",
                pass.name, total.name
            )));
        }

        let mut points = Vec::new();
        for (i, (&passed, &all)) in pass.contents.iter().zip(&total.contents).enumerate() {
            if all <= 0.0 {
                continue;
            }
            if passed > all {
                return Err(FitError::InvalidEfficiency(format!(
                    "bin {i} of '{}' has {passed} entries, more than the {all} of '{}'",
                    pass.name, total.name
                )));
            }

            let efficiency = passed / all;
            let (lower, upper) = clopper_pearson(passed, all, confidence)?;
            let half_width = 0.5 * pass.axis.width(i);
            points.push(EfficiencyPoint {
                x: pass.axis.center(i),
                y: efficiency,
                x_error_low: half_width,
                x_error_high: half_width,
                y_error_low: efficiency - lower,
                y_error_high: upper - efficiency,
            });
        }

        log::debug!(
            "Efficiency {} / {}: {} points",
            pass.name,
            total.name,
            points.len()
        );

        Ok(Self::new(&format!("{}_over_{}", pass.name, total.name), points))
    }
}

/// `plateau/2 · (1 + erf((x − threshold) / (resolution · √x))) + slope · x`,
/// defined for positive x.
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(deny_unknown_fields)]
pub struct TurnOnParams {
    pub plateau: f64,
    pub threshold: f64,
    pub resolution: f64,
    pub slope: f64,
}

impl Default for TurnOnParams {
    fn default() -> Self {
        Self {
            plateau: 0.9,
            threshold: 2.0,
            resolution: 1.0,
            slope: 0.0,
        }
    }
}

impl TurnOnParams {
    fn from_vector(values: &DVector<f64>) -> Self {
        Self {
            plateau: values[0],
            threshold: values[1],
            resolution: values[2],
            slope: values[3],
        }
    }

    fn to_array(self) -> [f64; 4] {
        [self.plateau, self.threshold, self.resolution, self.slope]
    }

    fn argument(&self, x: f64) -> f64 {
        (x - self.threshold) / (self.resolution * x.sqrt())
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        0.5 * self.plateau * (1.0 + erf(self.argument(x))) + self.slope * x
    }

    // d/d(plateau, threshold, resolution, slope)
    fn gradient(&self, x: f64) -> [f64; 4] {
        let u = self.argument(x);
        let gauss = (-u * u).exp() / PI.sqrt();
        [
            0.5 * (1.0 + erf(u)),
            -self.plateau * gauss / (self.resolution * x.sqrt()),
            -self.plateau * gauss * u / self.resolution,
            x,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct TurnOnFit {
    pub params: TurnOnParams,
    pub uncertainties: Option<TurnOnParams>,
    pub chi2: f64,
    pub ndf: usize,
    pub evaluations: usize,
    pub status: FitStatus,
    pub range: (f64, f64),
}

impl TurnOnFit {
    pub fn converged(&self) -> bool {
        self.status.converged()
    }

    pub fn values(&self) -> Vec<(&'static str, Value)> {
        let errors = self
            .uncertainties
            .map(TurnOnParams::to_array)
            .unwrap_or([f64::NAN; 4]);
        ["plateau", "threshold", "resolution", "slope"]
            .into_iter()
            .zip(self.params.to_array().into_iter().zip(errors))
            .map(|(name, (value, uncertainty))| (name, Value::new(value, uncertainty)))
            .collect()
    }

    pub fn fit_line_points(&self, points: usize) -> Vec<[f64; 2]> {
        // the model is undefined at x <= 0
        let start = self.range.0.max(f64::EPSILON);
        let steps = points.max(2) - 1;
        let step = (self.range.1 - start) / steps as f64;
        (0..=steps)
            .map(|i| {
                let x = start + step * i as f64;
                [x, self.params.evaluate(x)]
            })
            .collect()
    }
}

// resolution stays positive, the model divides by it
const BOUNDS: [(f64, f64); 4] = [
    (f64::NEG_INFINITY, f64::INFINITY),
    (f64::NEG_INFINITY, f64::INFINITY),
    (f64::MIN_POSITIVE, f64::INFINITY),
    (f64::NEG_INFINITY, f64::INFINITY),
];

struct TurnOnProblem {
    points: Vec<DataPoint>,
    params: TurnOnParams,
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for TurnOnProblem {
    type ParameterStorage = Owned<f64, Dyn>;
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;

    fn set_params(&mut self, values: &DVector<f64>) {
        self.params = TurnOnParams::from_vector(&clamp_to_bounds(values, &BOUNDS));
    }

    fn params(&self) -> DVector<f64> {
        DVector::from_row_slice(&self.params.to_array())
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        Some(DVector::from_iterator(
            self.points.len(),
            self.points.iter().map(|p| {
                let model = self.params.evaluate(p.x);
                (p.y - model) / p.error_towards(model)
            }),
        ))
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let mut jacobian = DMatrix::zeros(self.points.len(), 4);
        for (row, p) in self.points.iter().enumerate() {
            let error = p.error_towards(self.params.evaluate(p.x));
            for (column, derivative) in self.params.gradient(p.x).into_iter().enumerate() {
                jacobian[(row, column)] = -derivative / error;
            }
        }
        Some(jacobian)
    }
}

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct TurnOnFitter {
    pub settings: LevMarSettings,
}

impl TurnOnFitter {
    pub fn new(settings: LevMarSettings) -> Self {
        Self { settings }
    }

    /// Fit the turn-on curve to the points of `graph` with x inside `range`.
    pub fn fit(
        &self,
        graph: &EfficiencyGraph,
        range: (f64, f64),
        seed: &TurnOnParams,
    ) -> Result<TurnOnFit> {
        if !(range.0.is_finite() && range.1.is_finite() && range.0 < range.1) {
            return Err(FitError::InvalidDomain(format!(
                "turn-on range [{}, {}] is empty or not finite",
                range.0, range.1
            )));
        }

        let points: Vec<DataPoint> = graph
            .points
            .iter()
            .map(EfficiencyPoint::data_point)
            .filter(|p| p.x > 0.0 && p.x >= range.0 && p.x <= range.1)
            .filter(|p| p.error_low > 0.0 || p.error_high > 0.0)
            .collect();

        if points.len() < 4 {
            return Err(FitError::InsufficientData {
                points: points.len(),
                parameters: 4,
            });
        }

        let ndf = points.len() - 4;
        let mut problem = TurnOnProblem {
            points,
            params: *seed,
        };
        problem.set_params(&DVector::from_row_slice(&seed.to_array()));
        let outcome = minimize(&self.settings, problem)?;

        let fit = TurnOnFit {
            params: outcome.problem.params,
            uncertainties: outcome
                .uncertainties()
                .map(|errors| TurnOnParams::from_vector(&DVector::from_vec(errors))),
            chi2: outcome.chi2,
            ndf,
            evaluations: outcome.evaluations,
            status: outcome.status,
            range,
        };

        if fit.converged() {
            log::info!(
                "Turn-on fit to {}: plateau {:.4}, threshold {:.4}, resolution {:.4}, chi2/ndf = {:.3}/{}",
                graph.name,
                fit.params.plateau,
                fit.params.threshold,
                fit.params.resolution,
                fit.chi2,
                fit.ndf
            );
        } else {
            log::warn!(
                "Turn-on fit to {} did not converge: {}",
                graph.name,
                fit.status
            );
        }

        Ok(fit)
    }
}
