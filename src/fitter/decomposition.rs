use std::time::Instant;

use super::bivariate::FittedSurface;
use super::fit_settings::FitSettings;
use super::surface::{MarginalCurve, SurfaceWidths};
use crate::error::Result;
use crate::histoer::histo1d::histogram1d::Histogram1D;
use crate::histoer::histo2d::histogram2d::Histogram2D;
use crate::histoer::histo2d::projections::Projection1D;

/// Everything a renderer needs to draw one delta-R map: the normalized
/// histogram, its projections, the fitted surface with its contour heights
/// and the analytic marginals.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct DeltaRDecomposition {
    pub normalized: Histogram2D,
    pub projection_x: Projection1D,
    pub projection_y: Projection1D,
    pub surface: FittedSurface,
    pub marginal_x: MarginalCurve,
    pub marginal_y: MarginalCurve,
    pub contour_levels: Vec<f64>,
    pub widths: SurfaceWidths,
}

impl DeltaRDecomposition {
    /// Marginal along x on the scale of `projection_x`, None when the y
    /// binning is not uniform.
    pub fn overlay_x(&self) -> Option<MarginalCurve> {
        let y = &self.normalized.y;
        y.is_uniform().then(|| self.marginal_x.per_bin(y.width(0)))
    }

    pub fn overlay_y(&self) -> Option<MarginalCurve> {
        let x = &self.normalized.x;
        x.is_uniform().then(|| self.marginal_y.per_bin(x.width(0)))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Normalize `hist`, project it, fit the surface and derive the marginals
/// and contour heights.
///
/// A fit that does not converge ends the pipeline with
/// [`FitError::FitNonConvergent`](crate::error::FitError::FitNonConvergent)
/// carrying the best surface found.
pub fn decompose(hist: &Histogram2D, settings: &FitSettings) -> Result<DeltaRDecomposition> {
    let start = Instant::now();

    let normalized = hist.normalized()?;
    let projection_x = normalized.x_projection_full();
    let projection_y = normalized.y_projection_full();

    let fitter = settings.bivariate_fitter();
    let seed = if settings.auto_seed {
        fitter.initial_guess(&normalized)?
    } else {
        settings.seed
    };

    let surface = fitter.fit(&normalized, &seed)?.require_converged()?;
    let marginal_x = surface.marginal_x()?;
    let marginal_y = surface.marginal_y()?;
    let widths = surface.widths()?;
    let contour_levels = surface.contour_levels(&settings.contour_levels)?;

    log::info!(
        "Decomposed {} in {:?}: sigma_x = {:.3e}, sigma_y = {:.3e}, correlation = {:.3}",
        hist.name,
        start.elapsed(),
        widths.marginal_sigma_x,
        widths.marginal_sigma_y,
        widths.correlation
    );

    Ok(DeltaRDecomposition {
        normalized,
        projection_x,
        projection_y,
        surface,
        marginal_x,
        marginal_y,
        contour_levels,
        widths,
    })
}

/// Unit-area copy of a 1-D distribution and its cumulative ("_cdf")
/// distribution.
pub fn distribution_with_cdf(hist: &Histogram1D) -> Result<(Histogram1D, Histogram1D)> {
    let normalized = hist.normalized()?;
    let cumulative = normalized.cumulative();
    Ok((normalized, cumulative))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FitError;
    use crate::fitter::bivariate::BivariateGaussianParams;
    use crate::fitter::minimizer::{FitStatus, LevMarSettings};
    use float_cmp::assert_approx_eq;

    fn delta_r_map(params: &BivariateGaussianParams) -> Histogram2D {
        let mut hist =
            Histogram2D::uniform("deltaR", (60, 60), ((-0.03, 0.03), (-0.03, 0.03))).unwrap();
        for ix in 0..60 {
            for iy in 0..60 {
                let content = params.evaluate(hist.x.center(ix), hist.y.center(iy));
                hist.set_bin(ix, iy, content, content.sqrt()).unwrap();
            }
        }
        hist
    }

    fn truth() -> BivariateGaussianParams {
        BivariateGaussianParams {
            amplitude: 1000.0,
            mean_x: 0.001,
            precision_x: 3.769e4,
            mean_y: -0.0005,
            precision_y: 4.215e4,
            covariance_term: -1.763e4,
        }
    }

    fn settings() -> FitSettings {
        FitSettings {
            domain_x: (-0.03, 0.03),
            domain_y: (-0.03, 0.03),
            auto_seed: true,
            ..Default::default()
        }
    }

    #[test]
    fn decomposes_exact_surface() {
        let hist = delta_r_map(&truth());
        let result = decompose(&hist, &settings()).unwrap();

        assert_approx_eq!(f64, result.normalized.integral(), 1.0, epsilon = 1e-12);
        assert_approx_eq!(f64, result.projection_x.integral(), 1.0, epsilon = 1e-12);
        assert_approx_eq!(f64, result.projection_y.integral(), 1.0, epsilon = 1e-12);

        let params = result.surface.params;
        assert_approx_eq!(f64, params.mean_x, 0.001, epsilon = 1e-6);
        assert_approx_eq!(f64, params.mean_y, -0.0005, epsilon = 1e-6);
        assert_approx_eq!(f64, params.precision_x, 3.769e4, epsilon = 1.0);
        assert_approx_eq!(f64, params.covariance_term, -1.763e4, epsilon = 1.0);

        assert_eq!(result.contour_levels.len(), 3);
        assert_approx_eq!(
            f64,
            result.contour_levels[2],
            params.amplitude * (-0.5_f64).exp(),
            ulps = 2
        );

        // the overlay follows the projection
        let overlay = result.overlay_x().unwrap();
        for point in &result.projection_x.points {
            assert_approx_eq!(f64, overlay.evaluate(point.center), point.value, epsilon = 1e-6);
        }
    }

    #[test]
    fn empty_histogram_is_rejected() {
        let hist = Histogram2D::uniform("empty", (10, 10), ((0.0, 1.0), (0.0, 1.0))).unwrap();
        assert!(matches!(
            decompose(&hist, &settings()),
            Err(FitError::EmptyHistogram { .. })
        ));
    }

    #[test]
    fn non_convergence_carries_best_surface() {
        let hist = delta_r_map(&truth());
        let settings = FitSettings {
            domain_x: (-0.03, 0.03),
            domain_y: (-0.03, 0.03),
            seed: BivariateGaussianParams {
                amplitude: 0.003,
                mean_x: 0.02,
                precision_x: 1e4,
                mean_y: -0.02,
                precision_y: 1e4,
                covariance_term: 0.0,
            },
            levmar: LevMarSettings {
                patience: 1,
                ..Default::default()
            },
            ..Default::default()
        };

        match decompose(&hist, &settings) {
            Err(FitError::FitNonConvergent(surface)) => {
                assert_eq!(surface.status, FitStatus::LostPatience);
                assert!(surface.evaluations > 0);
            }
            other => panic!("expected a non-convergent fit, got {other:?}"),
        }
    }

    #[test]
    fn json_round_trip() {
        let result = decompose(&delta_r_map(&truth()), &settings()).unwrap();
        let json = result.to_json().unwrap();
        assert!(json.contains("\"marginal_x\""));
        assert_eq!(DeltaRDecomposition::from_json(&json).unwrap(), result);
    }

    #[test]
    fn cumulative_ends_at_one() {
        let mut hist = Histogram1D::uniform("deltaR", 25, (0.0, 0.25)).unwrap();
        for i in 0..200 {
            hist.fill_weighted((i as f64 * 0.00113) % 0.25, 1.0 + (i % 3) as f64);
        }

        let (normalized, cumulative) = distribution_with_cdf(&hist).unwrap();
        assert_approx_eq!(f64, normalized.integral(), 1.0, epsilon = 1e-12);
        assert_eq!(cumulative.name, "deltaR_cdf");
        assert_approx_eq!(f64, *cumulative.contents.last().unwrap(), 1.0, epsilon = 1e-12);
        assert!(cumulative.contents.windows(2).all(|w| w[0] <= w[1]));
    }
}
