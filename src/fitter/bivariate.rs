use levenberg_marquardt::LeastSquaresProblem;
use nalgebra::storage::Owned;
use nalgebra::{DMatrix, DVector, Dyn};
use statrs::distribution::{ChiSquared, ContinuousCDF};

use super::common::Value;
use super::minimizer::{FitStatus, LevMarSettings, clamp_to_bounds, minimize};
use crate::error::{FitError, Result};
use crate::histoer::histo2d::histogram2d::Histogram2D;

pub const PARAMETER_NAMES: [&str; 6] = [
    "amplitude",
    "mean_x",
    "precision_x",
    "mean_y",
    "precision_y",
    "covariance_term",
];

/// Parameters of
/// `A·exp(−p_x·(x−μ_x)² − p_y·(y−μ_y)² − 2·c·(x−μ_x)·(y−μ_y))`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct BivariateGaussianParams {
    pub amplitude: f64,
    pub mean_x: f64,
    pub precision_x: f64,
    pub mean_y: f64,
    pub precision_y: f64,
    pub covariance_term: f64,
}

impl BivariateGaussianParams {
    pub fn from_slice(values: &[f64; 6]) -> Self {
        Self {
            amplitude: values[0],
            mean_x: values[1],
            precision_x: values[2],
            mean_y: values[3],
            precision_y: values[4],
            covariance_term: values[5],
        }
    }

    pub fn to_array(&self) -> [f64; 6] {
        [
            self.amplitude,
            self.mean_x,
            self.precision_x,
            self.mean_y,
            self.precision_y,
            self.covariance_term,
        ]
    }

    // exponent of the surface, without the sign
    fn quadratic_form(&self, x: f64, y: f64) -> f64 {
        let dx = x - self.mean_x;
        let dy = y - self.mean_y;
        self.precision_x * dx * dx
            + self.precision_y * dy * dy
            + 2.0 * self.covariance_term * dx * dy
    }

    pub fn evaluate(&self, x: f64, y: f64) -> f64 {
        self.amplitude * (-self.quadratic_form(x, y)).exp()
    }

    // Partial derivatives of the surface in parameter order
    pub fn gradient(&self, x: f64, y: f64) -> [f64; 6] {
        let dx = x - self.mean_x;
        let dy = y - self.mean_y;
        let shape = (-self.quadratic_form(x, y)).exp();
        let f = self.amplitude * shape;
        [
            shape,
            f * (2.0 * self.precision_x * dx + 2.0 * self.covariance_term * dy),
            -f * dx * dx,
            f * (2.0 * self.precision_y * dy + 2.0 * self.covariance_term * dx),
            -f * dy * dy,
            -2.0 * f * dx * dy,
        ]
    }

    /// Checks that the parameters describe a normalizable surface: finite
    /// values, positive precisions and a positive definite precision matrix.
    pub fn validate(&self) -> Result<()> {
        if let Some((name, value)) = PARAMETER_NAMES
            .iter()
            .zip(self.to_array())
            .find(|(_, value)| !value.is_finite())
        {
            return Err(FitError::InvalidSurface(format!("{name} is {value}")));
        }
        if self.precision_x <= 0.0 {
            return Err(FitError::InvalidSurface(format!(
                "precision_x = {} is not positive",
                self.precision_x
            )));
        }
        if self.precision_y <= 0.0 {
            return Err(FitError::InvalidSurface(format!(
                "precision_y = {} is not positive",
                self.precision_y
            )));
        }
        let determinant = self.determinant();
        if determinant <= 0.0 {
            return Err(FitError::InvalidSurface(format!(
                "precision_x * precision_y - covariance_term^2 = {determinant} is not positive"
            )));
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    // p_x * p_y - c^2
    pub fn determinant(&self) -> f64 {
        self.precision_x * self.precision_y - self.covariance_term * self.covariance_term
    }

    /// Seed from content-weighted moments of `hist` inside the domain.
    ///
    /// The correlation is limited to |ρ| ≤ 0.95 so the seed is always a
    /// valid surface.
    pub fn from_moments(
        hist: &Histogram2D,
        domain_x: (f64, f64),
        domain_y: (f64, f64),
    ) -> Result<Self> {
        let stats = hist.get_statistics(domain_x.0, domain_x.1, domain_y.0, domain_y.1);
        // NaN widths come from negative weights
        if !(stats.integral > 0.0 && stats.stdev_x > 0.0 && stats.stdev_y > 0.0) {
            return Err(FitError::InsufficientData {
                points: hist.bins.len(),
                parameters: 6,
            });
        }

        let rho = stats.correlation().clamp(-0.95, 0.95);
        let one_minus_rho2 = 1.0 - rho * rho;
        let amplitude = hist
            .bins
            .iter()
            .filter(|((x_index, y_index), _)| {
                in_domain(hist.x.center(*x_index), domain_x)
                    && in_domain(hist.y.center(*y_index), domain_y)
            })
            .map(|(_, bin)| bin.content)
            .fold(0.0, f64::max);

        Ok(Self {
            amplitude,
            mean_x: stats.mean_x,
            precision_x: 1.0 / (2.0 * one_minus_rho2 * stats.stdev_x.powi(2)),
            mean_y: stats.mean_y,
            precision_y: 1.0 / (2.0 * one_minus_rho2 * stats.stdev_y.powi(2)),
            covariance_term: -rho / (2.0 * one_minus_rho2 * stats.stdev_x * stats.stdev_y),
        })
    }
}

fn in_domain(value: f64, domain: (f64, f64)) -> bool {
    value >= domain.0 && value <= domain.1
}

/// Result of a bivariate Gaussian fit. Also returned, with a non-converged
/// status, when the solver gave up; the parameters are then the ones it
/// stopped at.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct FittedSurface {
    pub params: BivariateGaussianParams,
    pub uncertainties: Option<BivariateGaussianParams>,
    pub chi2: f64,
    pub ndf: usize,
    pub evaluations: usize,
    pub status: FitStatus,
    pub domain_x: (f64, f64),
    pub domain_y: (f64, f64),
}

impl FittedSurface {
    pub fn converged(&self) -> bool {
        self.status.converged()
    }

    pub fn require_converged(self) -> Result<Self> {
        if self.converged() {
            Ok(self)
        } else {
            Err(FitError::FitNonConvergent(Box::new(self)))
        }
    }

    pub fn evaluate(&self, x: f64, y: f64) -> f64 {
        self.params.evaluate(x, y)
    }

    pub fn reduced_chi2(&self) -> Option<f64> {
        (self.ndf > 0).then(|| self.chi2 / self.ndf as f64)
    }

    // probability of a larger chi2 for ndf degrees of freedom
    pub fn p_value(&self) -> Option<f64> {
        if self.ndf == 0 {
            return None;
        }
        let distribution = ChiSquared::new(self.ndf as f64).ok()?;
        Some(1.0 - distribution.cdf(self.chi2))
    }

    pub fn values(&self) -> Vec<(&'static str, Value)> {
        let values = self.params.to_array();
        let errors = self
            .uncertainties
            .map(|u| u.to_array())
            .unwrap_or([f64::NAN; 6]);
        PARAMETER_NAMES
            .iter()
            .zip(values.into_iter().zip(errors))
            .map(|(name, (value, uncertainty))| (*name, Value::new(value, uncertainty)))
            .collect()
    }

    pub fn fit_report(&self) -> String {
        let mut report = format!(
            "status: {}\nevaluations: {}\nchi2/ndf: {:.4}/{}\n",
            self.status, self.evaluations, self.chi2, self.ndf
        );
        for (name, value) in self.values() {
            report.push_str(&format!("{name}: {value}\n"));
        }
        report
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct SurfacePoint {
    x: f64,
    y: f64,
    value: f64,
    error: f64,
}

struct SurfaceProblem {
    points: Vec<SurfacePoint>,
    bounds: [(f64, f64); 6],
    params: BivariateGaussianParams,
}

impl SurfaceProblem {
    fn new(
        points: Vec<SurfacePoint>,
        domain_x: (f64, f64),
        domain_y: (f64, f64),
        initial: &BivariateGaussianParams,
    ) -> Self {
        let mut problem = Self {
            points,
            bounds: [
                (0.0, f64::INFINITY),
                domain_x,
                (0.0, f64::INFINITY),
                domain_y,
                (0.0, f64::INFINITY),
                (f64::NEG_INFINITY, f64::INFINITY),
            ],
            params: *initial,
        };
        problem.set_params(&DVector::from_row_slice(&initial.to_array()));
        problem
    }
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for SurfaceProblem {
    type ParameterStorage = Owned<f64, Dyn>;
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;

    // means stay inside the domain, amplitude and precisions non-negative
    fn set_params(&mut self, values: &DVector<f64>) {
        let v = clamp_to_bounds(values, &self.bounds);
        self.params = BivariateGaussianParams::from_slice(&[v[0], v[1], v[2], v[3], v[4], v[5]]);
    }

    fn params(&self) -> DVector<f64> {
        DVector::from_row_slice(&self.params.to_array())
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        Some(DVector::from_iterator(
            self.points.len(),
            self.points
                .iter()
                .map(|p| (p.value - self.params.evaluate(p.x, p.y)) / p.error),
        ))
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let mut jacobian = DMatrix::zeros(self.points.len(), 6);
        for (row, p) in self.points.iter().enumerate() {
            for (column, derivative) in self.params.gradient(p.x, p.y).into_iter().enumerate() {
                jacobian[(row, column)] = -derivative / p.error;
            }
        }
        Some(jacobian)
    }
}

/// Fits a correlated 2-D Gaussian to the bins of a histogram whose centers
/// lie inside a rectangular domain.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct BivariateGaussianFitter {
    pub domain_x: (f64, f64),
    pub domain_y: (f64, f64),
    pub settings: LevMarSettings,
}

fn check_domain(name: &str, domain: (f64, f64)) -> Result<()> {
    if domain.0.is_finite() && domain.1.is_finite() && domain.0 < domain.1 {
        Ok(())
    } else {
        Err(FitError::InvalidDomain(format!(
            "{name} range [{}, {}] is empty or not finite",
            domain.0, domain.1
        )))
    }
}

impl BivariateGaussianFitter {
    pub fn new(domain_x: (f64, f64), domain_y: (f64, f64)) -> Self {
        Self {
            domain_x,
            domain_y,
            settings: LevMarSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: LevMarSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn initial_guess(&self, hist: &Histogram2D) -> Result<BivariateGaussianParams> {
        check_domain("x", self.domain_x)?;
        check_domain("y", self.domain_y)?;
        BivariateGaussianParams::from_moments(hist, self.domain_x, self.domain_y)
    }

    // Bins inside the domain that carry an error, ordered by (y, x) index
    fn collect_points(&self, hist: &Histogram2D) -> Vec<SurfacePoint> {
        let mut indexed: Vec<_> = hist
            .bins
            .iter()
            .filter(|(_, bin)| bin.sumw2 > 0.0)
            .map(|(&(x_index, y_index), bin)| {
                (
                    (y_index, x_index),
                    SurfacePoint {
                        x: hist.x.center(x_index),
                        y: hist.y.center(y_index),
                        value: bin.content,
                        error: bin.error(),
                    },
                )
            })
            .filter(|(_, p)| in_domain(p.x, self.domain_x) && in_domain(p.y, self.domain_y))
            .collect();
        indexed.sort_by_key(|(index, _)| *index);
        indexed.into_iter().map(|(_, point)| point).collect()
    }

    /// Weighted least-squares fit of the surface to `hist` starting from
    /// `initial`. A fit that does not converge is still returned; check
    /// [`FittedSurface::converged`] or use
    /// [`FittedSurface::require_converged`].
    pub fn fit(
        &self,
        hist: &Histogram2D,
        initial: &BivariateGaussianParams,
    ) -> Result<FittedSurface> {
        check_domain("x", self.domain_x)?;
        check_domain("y", self.domain_y)?;

        let points = self.collect_points(hist);
        if points.len() < PARAMETER_NAMES.len() {
            return Err(FitError::InsufficientData {
                points: points.len(),
                parameters: PARAMETER_NAMES.len(),
            });
        }

        let ndf = points.len() - PARAMETER_NAMES.len();
        let problem = SurfaceProblem::new(points, self.domain_x, self.domain_y, initial);
        let outcome = minimize(&self.settings, problem)?;

        let uncertainties = outcome.uncertainties().map(|errors| {
            BivariateGaussianParams::from_slice(&[
                errors[0], errors[1], errors[2], errors[3], errors[4], errors[5],
            ])
        });
        if uncertainties.is_none() {
            log::warn!("Covariance of the fit to {} is singular", hist.name);
        }

        let surface = FittedSurface {
            params: outcome.problem.params,
            uncertainties,
            chi2: outcome.chi2,
            ndf,
            evaluations: outcome.evaluations,
            status: outcome.status,
            domain_x: self.domain_x,
            domain_y: self.domain_y,
        };

        if surface.converged() {
            log::info!(
                "Bivariate Gaussian fit to {} converged after {} evaluations ({}), chi2/ndf = {:.4}/{}",
                hist.name,
                surface.evaluations,
                surface.status,
                surface.chi2,
                surface.ndf
            );
        } else {
            log::warn!(
                "Bivariate Gaussian fit to {} did not converge: {}",
                hist.name,
                surface.status
            );
        }

        Ok(surface)
    }
}
