pub mod bivariate;
pub mod common;
pub mod decomposition;
pub mod fit_settings;
pub mod minimizer;
pub mod surface;
pub mod turn_on;
