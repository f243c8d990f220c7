use nalgebra::Matrix2;
use std::f64::consts::PI;

use super::bivariate::{BivariateGaussianParams, FittedSurface};
use crate::error::{FitError, Result};
use crate::histoer::histo2d::projections::{Projection1D, ProjectionAxis};

/// exp(−4.5), exp(−2) and exp(−0.5): the iso-density contours drawn over
/// the delta-R maps. These are not confidence regions.
pub const DEFAULT_CONTOUR_LEVELS: [f64; 3] =
    [0.011108996538242306, 0.1353352832366127, 0.6065306597126334];

fn check_level(level: f64) -> Result<()> {
    if level.is_finite() && level > 0.0 && level <= 1.0 {
        Ok(())
    } else {
        Err(FitError::InvalidContourLevel(level))
    }
}

/// Absolute heights `amplitude · L` of the relative levels `L ∈ (0, 1]`.
pub fn derive_contour_levels(amplitude: f64, levels: &[f64]) -> Result<Vec<f64>> {
    levels
        .iter()
        .map(|&level| {
            check_level(level)?;
            Ok(amplitude * level)
        })
        .collect()
}

/// One-dimensional Gaussian `amplitude · exp(−precision · (t − mean)²)`
/// obtained by integrating a fitted surface over the other axis.
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct MarginalCurve {
    pub axis: ProjectionAxis,
    pub amplitude: f64,
    pub mean: f64,
    pub precision: f64,
}

impl MarginalCurve {
    pub fn evaluate(&self, t: f64) -> f64 {
        self.amplitude * (-self.precision * (t - self.mean).powi(2)).exp()
    }

    pub fn sigma(&self) -> f64 {
        (0.5 / self.precision).sqrt()
    }

    pub fn integral(&self) -> f64 {
        self.amplitude * (PI / self.precision).sqrt()
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            amplitude: self.amplitude * factor,
            ..*self
        }
    }

    /// The curve on the scale of a projection: a projection sums bins of
    /// width `orthogonal_width`, so it approximates the marginal divided by
    /// that width.
    pub fn per_bin(&self, orthogonal_width: f64) -> Self {
        self.scaled(1.0 / orthogonal_width)
    }

    pub fn line_points(&self, min: f64, max: f64, points: usize) -> Vec<[f64; 2]> {
        let steps = points.max(2) - 1;
        let step = (max - min) / steps as f64;
        (0..=steps)
            .map(|i| {
                let t = min + step * i as f64;
                [t, self.evaluate(t)]
            })
            .collect()
    }

    // Curve evaluated at the centers of a projection
    pub fn sample_like(&self, projection: &Projection1D) -> Vec<f64> {
        projection
            .points
            .iter()
            .map(|p| self.evaluate(p.center))
            .collect()
    }
}

/// Widths derived from the precision matrix `P = [[p_x, c], [c, p_y]]`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SurfaceWidths {
    /// `√(0.5 / p_x)`, the width along x at fixed y.
    pub sigma_xx: f64,
    /// `√(0.5 / p_y)`
    pub sigma_yy: f64,
    /// `√(−0.5 / c)`, only defined for a negative covariance term.
    pub sigma_xy: Option<f64>,
    pub marginal_sigma_x: f64,
    pub marginal_sigma_y: f64,
    pub correlation: f64,
}

impl BivariateGaussianParams {
    /// Closed-form marginal along `axis`. Fails with
    /// [`FitError::InvalidSurface`] when the surface cannot be integrated.
    pub fn marginal(&self, axis: ProjectionAxis) -> Result<MarginalCurve> {
        self.validate()?;
        let determinant = self.determinant();

        // precision of the axis that is integrated out
        let (mean, integrated) = match axis {
            ProjectionAxis::X => (self.mean_x, self.precision_y),
            ProjectionAxis::Y => (self.mean_y, self.precision_x),
        };

        Ok(MarginalCurve {
            axis,
            amplitude: self.amplitude * (PI / integrated).sqrt(),
            mean,
            precision: determinant / integrated,
        })
    }

    /// Covariance matrix of the surface viewed as a density, `(2P)⁻¹`.
    pub fn covariance_matrix(&self) -> Result<Matrix2<f64>> {
        self.validate()?;
        let scale = 1.0 / (2.0 * self.determinant());
        Ok(Matrix2::new(
            self.precision_y * scale,
            -self.covariance_term * scale,
            -self.covariance_term * scale,
            self.precision_x * scale,
        ))
    }

    pub fn widths(&self) -> Result<SurfaceWidths> {
        let covariance = self.covariance_matrix()?;
        Ok(SurfaceWidths {
            sigma_xx: (0.5 / self.precision_x).sqrt(),
            sigma_yy: (0.5 / self.precision_y).sqrt(),
            sigma_xy: (self.covariance_term < 0.0).then(|| (-0.5 / self.covariance_term).sqrt()),
            marginal_sigma_x: covariance[(0, 0)].sqrt(),
            marginal_sigma_y: covariance[(1, 1)].sqrt(),
            correlation: -self.covariance_term / (self.precision_x * self.precision_y).sqrt(),
        })
    }

    /// Closed polygon on which the surface equals `amplitude · level`.
    /// The first point is repeated at the end.
    pub fn contour_ellipse(&self, level: f64, points: usize) -> Result<Vec<[f64; 2]>> {
        self.validate()?;
        check_level(level)?;

        let target = -level.ln();
        let precision = Matrix2::new(
            self.precision_x,
            self.covariance_term,
            self.covariance_term,
            self.precision_y,
        );
        let eigen = precision.symmetric_eigen();
        let radii = eigen.eigenvalues.map(|lambda| (target / lambda).sqrt());

        let points = points.max(3);
        let mut ellipse: Vec<[f64; 2]> = (0..points)
            .map(|i| {
                let angle = 2.0 * PI * i as f64 / points as f64;
                let local = nalgebra::Vector2::new(radii[0] * angle.cos(), radii[1] * angle.sin());
                let offset = eigen.eigenvectors * local;
                [self.mean_x + offset[0], self.mean_y + offset[1]]
            })
            .collect();
        ellipse.push(ellipse[0]);
        Ok(ellipse)
    }
}

impl FittedSurface {
    pub fn contour_levels(&self, levels: &[f64]) -> Result<Vec<f64>> {
        derive_contour_levels(self.params.amplitude, levels)
    }

    pub fn default_contour_levels(&self) -> Vec<f64> {
        DEFAULT_CONTOUR_LEVELS
            .iter()
            .map(|level| self.params.amplitude * level)
            .collect()
    }

    pub fn contour_ellipse(&self, level: f64, points: usize) -> Result<Vec<[f64; 2]>> {
        self.params.contour_ellipse(level, points)
    }

    pub fn marginal_x(&self) -> Result<MarginalCurve> {
        self.params.marginal(ProjectionAxis::X)
    }

    pub fn marginal_y(&self) -> Result<MarginalCurve> {
        self.params.marginal(ProjectionAxis::Y)
    }

    pub fn widths(&self) -> Result<SurfaceWidths> {
        self.params.widths()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitter::minimizer::FitStatus;
    use crate::histoer::axis::Axis;
    use crate::histoer::histo2d::histogram2d::Histogram2D;
    use float_cmp::assert_approx_eq;

    const PARAMS: BivariateGaussianParams = BivariateGaussianParams {
        amplitude: 0.003,
        mean_x: 0.001,
        precision_x: 3.769e4,
        mean_y: -0.002,
        precision_y: 4.215e4,
        covariance_term: -1.763e4,
    };

    fn surface(params: BivariateGaussianParams) -> FittedSurface {
        FittedSurface {
            params,
            uncertainties: None,
            chi2: 0.0,
            ndf: 10,
            evaluations: 1,
            status: FitStatus::Converged,
            domain_x: (-0.05, 0.05),
            domain_y: (-0.05, 0.05),
        }
    }

    #[test]
    fn default_levels() {
        let expected = [(-4.5_f64).exp(), (-2.0_f64).exp(), (-0.5_f64).exp()];
        for (level, expected) in DEFAULT_CONTOUR_LEVELS.iter().zip(expected) {
            assert_approx_eq!(f64, *level, expected, ulps = 2);
        }

        let surface = surface(PARAMS);
        let heights = surface.default_contour_levels();
        assert_eq!(heights.len(), 3);
        assert_approx_eq!(f64, heights[2], 0.003 * (-0.5_f64).exp(), ulps = 2);
    }

    #[test]
    fn unit_level_is_amplitude() {
        let surface = surface(PARAMS);
        assert_eq!(surface.contour_levels(&[1.0]).unwrap(), vec![0.003]);
    }

    #[test]
    fn invalid_levels_are_rejected() {
        let surface = surface(PARAMS);
        for level in [0.0, -0.1, 1.5, f64::NAN] {
            assert!(matches!(
                surface.contour_levels(&[0.5, level]),
                Err(FitError::InvalidContourLevel(_))
            ));
        }
    }

    #[test]
    fn contour_points_lie_on_level() {
        let surface = surface(PARAMS);
        for level in DEFAULT_CONTOUR_LEVELS {
            let ellipse = surface.contour_ellipse(level, 64).unwrap();
            assert_eq!(ellipse.len(), 65);
            assert_eq!(ellipse[0], ellipse[64]);
            for [x, y] in ellipse {
                assert_approx_eq!(
                    f64,
                    surface.evaluate(x, y),
                    PARAMS.amplitude * level,
                    epsilon = 1e-12
                );
            }
        }
    }

    #[test]
    fn isotropic_marginals_are_identical_in_form() {
        let isotropic = BivariateGaussianParams {
            amplitude: 2.0,
            mean_x: 0.3,
            precision_x: 5.0,
            mean_y: 0.3,
            precision_y: 5.0,
            covariance_term: 0.0,
        };
        let surface = surface(isotropic);
        let mx = surface.marginal_x().unwrap();
        let my = surface.marginal_y().unwrap();

        assert_eq!(mx.amplitude, my.amplitude);
        assert_eq!(mx.precision, my.precision);
        assert_eq!(mx.precision, 5.0);
        for t in [-1.0, 0.0, 0.3, 0.7, 2.0] {
            assert_eq!(mx.evaluate(t), my.evaluate(t));
        }
    }

    #[test]
    fn marginal_integral_matches_surface_volume() {
        let surface = surface(PARAMS);
        let volume = PARAMS.amplitude * PI / PARAMS.determinant().sqrt();
        assert_approx_eq!(
            f64,
            surface.marginal_x().unwrap().integral(),
            volume,
            epsilon = 1e-15
        );
        assert_approx_eq!(
            f64,
            surface.marginal_y().unwrap().integral(),
            volume,
            epsilon = 1e-15
        );
    }

    #[test]
    fn marginal_matches_projection() {
        let params = BivariateGaussianParams {
            amplitude: 100.0,
            mean_x: 0.1,
            precision_x: 2.0,
            mean_y: -0.2,
            precision_y: 3.0,
            covariance_term: 0.5,
        };
        let axis = Axis::uniform(40, -3.0, 3.0).unwrap();
        let rows: Vec<Vec<f64>> = axis
            .centers()
            .iter()
            .map(|&y| axis.centers().iter().map(|&x| params.evaluate(x, y)).collect())
            .collect();
        let hist = Histogram2D::from_rows("surface", axis.clone(), axis.clone(), &rows).unwrap();

        let projection = hist.x_projection_full();
        let curve = params.marginal(ProjectionAxis::X).unwrap().per_bin(axis.width(0));
        for (value, expected) in projection.values().iter().zip(curve.sample_like(&projection)) {
            assert_approx_eq!(f64, *value, expected, epsilon = 1e-6 * expected.max(1.0));
        }
    }

    #[test]
    fn invalid_surface_never_yields_nan() {
        let degenerate = BivariateGaussianParams {
            covariance_term: 5e4,
            ..PARAMS
        };
        let surface = surface(degenerate);
        assert!(matches!(
            surface.marginal_x(),
            Err(FitError::InvalidSurface(_))
        ));
        assert!(matches!(
            surface.marginal_y(),
            Err(FitError::InvalidSurface(_))
        ));
        assert!(surface.widths().is_err());
        assert!(surface.contour_ellipse(0.5, 16).is_err());
    }

    #[test]
    fn widths_of_correlated_surface() {
        let widths = surface(PARAMS).widths().unwrap();
        assert_approx_eq!(f64, widths.sigma_xx, (0.5 / 3.769e4_f64).sqrt(), ulps = 2);
        assert_approx_eq!(f64, widths.sigma_yy, (0.5 / 4.215e4_f64).sqrt(), ulps = 2);
        assert_approx_eq!(
            f64,
            widths.sigma_xy.unwrap(),
            (0.5 / 1.763e4_f64).sqrt(),
            ulps = 2
        );
        // negative covariance term means positive correlation
        assert!(widths.correlation > 0.0 && widths.correlation < 1.0);
        assert!(widths.marginal_sigma_x > widths.sigma_xx);

        let positive = BivariateGaussianParams {
            covariance_term: 1.0e3,
            ..PARAMS
        };
        assert_eq!(positive.widths().unwrap().sigma_xy, None);
    }
}
