pub mod axis;
pub mod histo1d;
pub mod histo2d;
