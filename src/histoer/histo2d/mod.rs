pub mod filling;
pub mod histogram2d;
pub mod projections;
pub mod rebinning;
pub mod statistics;
