#![warn(clippy::all, rust_2018_idioms)]

//! Numeric core of an e/γ trigger study: weighted histograms, the
//! delta-R decomposition with a correlated 2-D Gaussian fit, and efficiency
//! turn-on fits.
//!
//! ```no_run
//! use egfit::fitter::decomposition::decompose;
//! use egfit::fitter::fit_settings::FitSettings;
//! use egfit::histoer::histo2d::histogram2d::Histogram2D;
//!
//! # fn main() -> egfit::error::Result<()> {
//! let hist = Histogram2D::load(std::path::Path::new("deltaR.json"))?;
//! let result = decompose(&hist, &FitSettings::default())?;
//! println!("{}", result.surface.fit_report());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod fitter;
pub mod histoer;
