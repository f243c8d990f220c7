use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt, TerminationReason};
use nalgebra::storage::Owned;
use nalgebra::{DMatrix, DVector, Dyn};
use std::fmt::Display;

use crate::error::{FitError, Result};

/// A weighted least-squares problem with dynamically sized parameters and
/// residuals, as the fitters in this crate build them.
pub trait DynProblem:
    LeastSquaresProblem<
        f64,
        Dyn,
        Dyn,
        ParameterStorage = Owned<f64, Dyn>,
        ResidualStorage = Owned<f64, Dyn>,
        JacobianStorage = Owned<f64, Dyn, Dyn>,
    >
{
}

impl<P> DynProblem for P where
    P: LeastSquaresProblem<
            f64,
            Dyn,
            Dyn,
            ParameterStorage = Owned<f64, Dyn>,
            ResidualStorage = Owned<f64, Dyn>,
            JacobianStorage = Owned<f64, Dyn, Dyn>,
        >
{
}

/// Clamp every parameter into its inclusive `(lower, upper)` bound.
pub fn clamp_to_bounds(params: &DVector<f64>, bounds: &[(f64, f64)]) -> DVector<f64> {
    DVector::from_iterator(
        params.len(),
        params
            .iter()
            .zip(bounds)
            .map(|(value, &(lower, upper))| value.clamp(lower, upper)),
    )
}

/// Configuration of [`LevenbergMarquardt`]. The defaults are the solver's own.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LevMarSettings {
    /// The solver gives up after `patience * (parameters + 1)` evaluations.
    pub patience: usize,
    pub ftol: f64,
    pub xtol: f64,
    pub gtol: f64,
    /// Factor for the initial step bound.
    pub stepbound: f64,
    pub scale_diag: bool,
}

impl Default for LevMarSettings {
    fn default() -> Self {
        Self {
            patience: 100,
            ftol: 1.49012e-8,
            xtol: 1.49012e-8,
            gtol: 0.0,
            stepbound: 100.0,
            scale_diag: true,
        }
    }
}

impl LevMarSettings {
    pub fn validate(&self) -> Result<()> {
        if self.patience == 0 {
            return Err(FitError::InvalidSettings("patience must be positive".to_owned()));
        }
        for (name, value) in [("ftol", self.ftol), ("xtol", self.xtol), ("gtol", self.gtol)] {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(FitError::InvalidSettings(format!(
                    "{name} = {value} is not a finite non-negative number"
                )));
            }
        }
        if !(self.stepbound > 0.0 && self.stepbound.is_finite()) {
            return Err(FitError::InvalidSettings(format!(
                "stepbound = {} is not positive",
                self.stepbound
            )));
        }
        Ok(())
    }

    pub fn solver(&self) -> Result<LevenbergMarquardt<f64>> {
        self.validate()?;
        Ok(LevenbergMarquardt::new()
            .with_patience(self.patience)
            .with_ftol(self.ftol)
            .with_xtol(self.xtol)
            .with_gtol(self.gtol)
            .with_stepbound(self.stepbound)
            .with_scale_diag(self.scale_diag))
    }
}

/// Why the solver stopped.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub enum FitStatus {
    Converged,
    ResidualsZero,
    Orthogonal,
    LostPatience,
    Failed(String),
}

impl FitStatus {
    pub fn converged(&self) -> bool {
        matches!(self, Self::Converged | Self::ResidualsZero | Self::Orthogonal)
    }
}

impl From<&TerminationReason> for FitStatus {
    fn from(reason: &TerminationReason) -> Self {
        match reason {
            TerminationReason::Converged { .. } => Self::Converged,
            TerminationReason::ResidualsZero => Self::ResidualsZero,
            TerminationReason::Orthogonal => Self::Orthogonal,
            TerminationReason::LostPatience => Self::LostPatience,
            other => Self::Failed(format!("{other:?}")),
        }
    }
}

impl Display for FitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Converged => write!(f, "converged"),
            Self::ResidualsZero => write!(f, "zero residuals"),
            Self::Orthogonal => write!(f, "residuals orthogonal to the Jacobian"),
            Self::LostPatience => write!(f, "evaluation budget exhausted"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

pub struct Minimization<P> {
    /// The problem at the parameters the solver stopped at, also when it
    /// did not converge.
    pub problem: P,
    pub chi2: f64,
    pub evaluations: usize,
    pub status: FitStatus,
    /// `(JᵀJ)⁻¹` at the final parameters, None when singular.
    pub covariance: Option<DMatrix<f64>>,
}

impl<P> Minimization<P> {
    pub fn uncertainties(&self) -> Option<Vec<f64>> {
        self.covariance
            .as_ref()
            .map(|cov| cov.diagonal().iter().map(|v| v.max(0.0).sqrt()).collect())
    }
}

pub fn minimize<P: DynProblem>(settings: &LevMarSettings, problem: P) -> Result<Minimization<P>> {
    let (problem, report) = settings.solver()?.minimize(problem);

    let chi2 = problem
        .residuals()
        .map(|residuals| residuals.norm_squared())
        .unwrap_or(f64::NAN);
    let covariance = if chi2.is_finite() {
        problem
            .jacobian()
            .and_then(|jacobian| jacobian.tr_mul(&jacobian).try_inverse())
    } else {
        None
    };

    log::trace!(
        "Levenberg-Marquardt stopped after {} evaluations: {:?}",
        report.number_of_evaluations,
        report.termination
    );

    Ok(Minimization {
        problem,
        chi2,
        evaluations: report.number_of_evaluations,
        status: FitStatus::from(&report.termination),
        covariance,
    })
}
