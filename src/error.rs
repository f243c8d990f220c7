use crate::fitter::bivariate::FittedSurface;
use polars::error::PolarsError;
use std::error::Error;
use std::fmt::Display;

#[derive(Debug)]
pub enum FitError {
    EmptyHistogram { name: String, integral: f64 },
    FitNonConvergent(Box<FittedSurface>),
    InvalidSurface(String),
    InvalidBinning(String),
    ShapeMismatch(String),
    InvalidDomain(String),
    InsufficientData { points: usize, parameters: usize },
    InvalidContourLevel(f64),
    InvalidEfficiency(String),
    InvalidSettings(String),
    DataFrame(PolarsError),
    Settings(serde_yaml::Error),
    Json(serde_json::Error),
    File(std::io::Error),
}

impl From<std::io::Error> for FitError {
    fn from(err: std::io::Error) -> Self {
        Self::File(err)
    }
}

impl From<PolarsError> for FitError {
    fn from(err: PolarsError) -> Self {
        Self::DataFrame(err)
    }
}

impl From<serde_yaml::Error> for FitError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Settings(err)
    }
}

impl From<serde_json::Error> for FitError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}

impl Display for FitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyHistogram { name, integral } => write!(
                f,
                "Histogram '{name}' has integral {integral} and cannot be normalized"
            ),
            Self::FitNonConvergent(surface) => write!(
                f,
                "Fit did not converge ({}) after {} evaluations, chi2 = {:.4}",
                surface.status, surface.evaluations, surface.chi2
            ),
            Self::InvalidSurface(reason) => {
                write!(f, "Fitted surface is not a valid bivariate Gaussian: {reason}")
            }
            Self::InvalidBinning(reason) => write!(f, "Invalid binning: {reason}"),
            Self::ShapeMismatch(reason) => write!(f, "Histogram shapes do not match: {reason}"),
            Self::InvalidDomain(reason) => write!(f, "Invalid fit domain: {reason}"),
            Self::InsufficientData { points, parameters } => write!(
                f,
                "Fit has {points} usable points for {parameters} free parameters"
            ),
            Self::InvalidContourLevel(level) => {
                write!(f, "Contour level {level} is outside of (0, 1]")
            }
            Self::InvalidEfficiency(reason) => write!(f, "Invalid efficiency input: {reason}"),
            Self::InvalidSettings(reason) => write!(f, "Invalid solver settings: {reason}"),
            Self::DataFrame(x) => write!(f, "Error using polars: {x}"),
            Self::Settings(x) => write!(f, "Error reading fit settings: {x}"),
            Self::Json(x) => write!(f, "Error (de)serializing JSON: {x}"),
            Self::File(x) => write!(f, "File I/O error: {x}"),
        }
    }
}

impl Error for FitError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::DataFrame(x) => Some(x),
            Self::Settings(x) => Some(x),
            Self::Json(x) => Some(x),
            Self::File(x) => Some(x),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, FitError>;
