use std::path::Path;

use super::bivariate::{BivariateGaussianFitter, BivariateGaussianParams};
use super::minimizer::LevMarSettings;
use super::surface::DEFAULT_CONTOUR_LEVELS;
use super::turn_on::{ONE_SIGMA, TurnOnFitter, TurnOnParams};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct TurnOnSettings {
    pub range: (f64, f64),
    pub seed: TurnOnParams,
    pub confidence: f64,
}

impl Default for TurnOnSettings {
    fn default() -> Self {
        Self {
            range: (0.0, 50.0),
            seed: TurnOnParams::default(),
            confidence: ONE_SIGMA,
        }
    }
}

/// Settings of the delta-R decomposition and the turn-on fits.
///
/// Every field has a default, so a settings file only lists what it changes:
///
/// ```yaml
/// domain_x: [-0.1, 0.1]
/// auto_seed: true
/// levmar:
///   patience: 500
/// ```
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct FitSettings {
    pub domain_x: (f64, f64),
    pub domain_y: (f64, f64),
    pub seed: BivariateGaussianParams,
    /// Seed the fit from the histogram moments instead of `seed`.
    pub auto_seed: bool,
    pub contour_levels: Vec<f64>,
    pub levmar: LevMarSettings,
    pub turn_on: TurnOnSettings,
}

impl Default for FitSettings {
    fn default() -> Self {
        Self {
            domain_x: (-0.05, 0.05),
            domain_y: (-0.05, 0.05),
            seed: BivariateGaussianParams {
                amplitude: 0.003,
                mean_x: 0.0,
                precision_x: 3.769e4,
                mean_y: 0.0,
                precision_y: 4.215e4,
                covariance_term: -1.763e4,
            },
            auto_seed: false,
            contour_levels: DEFAULT_CONTOUR_LEVELS.to_vec(),
            levmar: LevMarSettings::default(),
            turn_on: TurnOnSettings::default(),
        }
    }
}

impl FitSettings {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let settings: Self = serde_yaml::from_str(yaml)?;
        settings.levmar.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        let settings = Self::from_yaml_str(&yaml)?;
        log::info!("Loaded fit settings from {}", path.display());
        Ok(settings)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_yaml()?)?;
        Ok(())
    }

    pub fn bivariate_fitter(&self) -> BivariateGaussianFitter {
        BivariateGaussianFitter::new(self.domain_x, self.domain_y).with_settings(self.levmar.clone())
    }

    pub fn turn_on_fitter(&self) -> TurnOnFitter {
        TurnOnFitter::new(self.levmar.clone())
    }
}
