use fnv::FnvHashMap;
use std::fs::File;
use std::io::{BufReader, Write as _};
use std::path::Path;

use crate::error::{FitError, Result};
use crate::histoer::axis::Axis;

/// Content of one 2-D bin: sum of weights and sum of squared weights.
#[derive(Debug, Default, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Bin {
    pub content: f64,
    pub sumw2: f64,
}

impl Bin {
    pub fn error(&self) -> f64 {
        self.sumw2.sqrt()
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(try_from = "RawHistogram2D")]
pub struct Histogram2D {
    pub name: String,
    pub x: Axis,
    pub y: Axis,
    // sparse: only bins that were touched are stored
    #[serde(serialize_with = "sparse_bins::serialize")]
    pub bins: FnvHashMap<(usize, usize), Bin>,
    pub overflow: (u64, u64),
    pub underflow: (u64, u64),
}

// Histogram as read from disk, before its bins are checked against the axes
#[derive(serde::Deserialize)]
struct RawHistogram2D {
    name: String,
    x: Axis,
    y: Axis,
    #[serde(deserialize_with = "sparse_bins::deserialize")]
    bins: FnvHashMap<(usize, usize), Bin>,
    overflow: (u64, u64),
    underflow: (u64, u64),
}

impl TryFrom<RawHistogram2D> for Histogram2D {
    type Error = FitError;

    fn try_from(raw: RawHistogram2D) -> Result<Self> {
        let (x_bins, y_bins) = (raw.x.bins(), raw.y.bins());
        if let Some((x_index, y_index)) = raw
            .bins
            .keys()
            .find(|(x_index, y_index)| *x_index >= x_bins || *y_index >= y_bins)
        {
            return Err(FitError::ShapeMismatch(format!(
                "bin ({x_index}, {y_index}) of '{}' is outside of its {x_bins}x{y_bins} bins",
                raw.name
            )));
        }

        Ok(Self {
            name: raw.name,
            x: raw.x,
            y: raw.y,
            bins: raw.bins,
            overflow: raw.overflow,
            underflow: raw.underflow,
        })
    }
}

impl Histogram2D {
    pub fn new(name: &str, x: Axis, y: Axis) -> Self {
        Self {
            name: name.to_owned(),
            x,
            y,
            bins: FnvHashMap::default(),
            overflow: (0, 0),
            underflow: (0, 0),
        }
    }

    // Create a new 2D Histogram with specified ranges and number of bins for each axis
    pub fn uniform(
        name: &str,
        bins: (usize, usize),
        range: ((f64, f64), (f64, f64)),
    ) -> Result<Self> {
        Ok(Self::new(
            name,
            Axis::uniform(bins.0, range.0.0, range.0.1)?,
            Axis::uniform(bins.1, range.1.0, range.1.1)?,
        ))
    }

    /// Build a histogram from a dense grid, `rows[iy][ix]`, assuming Poisson
    /// errors (`sumw2 == content`).
    pub fn from_rows(name: &str, x: Axis, y: Axis, rows: &[Vec<f64>]) -> Result<Self> {
        if rows.len() != y.bins() {
            return Err(FitError::ShapeMismatch(format!(
                "{} rows given for {} y bins",
                rows.len(),
                y.bins()
            )));
        }
        if let Some(row) = rows.iter().find(|row| row.len() != x.bins()) {
            return Err(FitError::ShapeMismatch(format!(
                "row of length {} given for {} x bins",
                row.len(),
                x.bins()
            )));
        }

        let mut hist = Self::new(name, x, y);
        for (y_index, row) in rows.iter().enumerate() {
            for (x_index, &content) in row.iter().enumerate() {
                if content != 0.0 {
                    hist.bins.insert(
                        (x_index, y_index),
                        Bin {
                            content,
                            sumw2: content.abs(),
                        },
                    );
                }
            }
        }

        Ok(hist)
    }

    pub fn reset(&mut self) {
        self.bins.clear();
        self.overflow = (0, 0);
        self.underflow = (0, 0);
    }

    pub fn fill(&mut self, x_value: f64, y_value: f64) {
        self.fill_weighted(x_value, y_value, 1.0);
    }

    pub fn fill_weighted(&mut self, x_value: f64, y_value: f64, weight: f64) {
        let Some(x_index) = self.x.find_bin(x_value) else {
            if x_value >= self.x.max() {
                self.overflow.0 += 1;
            } else {
                self.underflow.0 += 1;
            }
            return;
        };
        let Some(y_index) = self.y.find_bin(y_value) else {
            if y_value >= self.y.max() {
                self.overflow.1 += 1;
            } else {
                self.underflow.1 += 1;
            }
            return;
        };

        let bin = self.bins.entry((x_index, y_index)).or_default();
        bin.content += weight;
        bin.sumw2 += weight * weight;
    }

    // Set a bin directly, the error is given as a standard deviation
    pub fn set_bin(&mut self, x_index: usize, y_index: usize, content: f64, error: f64) -> Result<()> {
        if x_index >= self.x.bins() || y_index >= self.y.bins() {
            return Err(FitError::ShapeMismatch(format!(
                "bin ({x_index}, {y_index}) is outside of '{}' with {}x{} bins",
                self.name,
                self.x.bins(),
                self.y.bins()
            )));
        }
        self.bins.insert(
            (x_index, y_index),
            Bin {
                content,
                sumw2: error * error,
            },
        );
        Ok(())
    }

    pub fn bin(&self, x_index: usize, y_index: usize) -> Bin {
        self.bins
            .get(&(x_index, y_index))
            .copied()
            .unwrap_or_default()
    }

    pub fn content(&self, x_index: usize, y_index: usize) -> f64 {
        self.bin(x_index, y_index).content
    }

    pub fn error(&self, x_index: usize, y_index: usize) -> f64 {
        self.bin(x_index, y_index).error()
    }

    // Sum of the in-range contents, under/overflow are not included
    pub fn integral(&self) -> f64 {
        self.bins.values().map(|bin| bin.content).sum()
    }

    pub fn max_content(&self) -> f64 {
        self.bins
            .values()
            .map(|bin| bin.content)
            .fold(0.0, f64::max)
    }

    pub fn scale(&mut self, factor: f64) {
        for bin in self.bins.values_mut() {
            bin.content *= factor;
            bin.sumw2 *= factor * factor;
        }
    }

    /// Copy of the histogram divided by its integral.
    ///
    /// Errors scale with the contents. Fails with
    /// [`FitError::EmptyHistogram`] when the integral is not positive.
    pub fn normalized(&self) -> Result<Self> {
        let integral = self.integral();
        if !(integral.is_finite() && integral > 0.0) {
            return Err(FitError::EmptyHistogram {
                name: self.name.clone(),
                integral,
            });
        }

        let mut normalized = self.clone();
        normalized.scale(1.0 / integral);
        log::debug!("Normalized {} by integral {}", self.name, integral);
        Ok(normalized)
    }

    // Bin-by-bin sum, errors add in quadrature
    pub fn add(&mut self, other: &Self) -> Result<()> {
        if self.x != other.x || self.y != other.y {
            return Err(FitError::ShapeMismatch(format!(
                "cannot add '{}' to '{}' with different binning",
                other.name, self.name
            )));
        }

        for (&key, bin) in &other.bins {
            let entry = self.bins.entry(key).or_default();
            entry.content += bin.content;
            entry.sumw2 += bin.sumw2;
        }
        self.overflow.0 += other.overflow.0;
        self.overflow.1 += other.overflow.1;
        self.underflow.0 += other.underflow.0;
        self.underflow.1 += other.underflow.1;

        Ok(())
    }

    // get the bin index for a given x value
    pub fn get_bin_index_x(&self, x: f64) -> Option<usize> {
        self.x.find_bin(x)
    }

    // get the bin index for a given y value
    pub fn get_bin_index_y(&self, y: f64) -> Option<usize> {
        self.y.find_bin(y)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let serialized = serde_json::to_string(self)?;
        let mut file = File::create(path)?;
        file.write_all(serialized.as_bytes())?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let raw: RawHistogram2D = serde_json::from_reader(reader)?;
        let hist = Self::try_from(raw)?;
        log::info!(
            "Loaded histogram {} ({}x{} bins) from {}",
            hist.name,
            hist.x.bins(),
            hist.y.bins(),
            path.display()
        );
        Ok(hist)
    }
}

mod sparse_bins {
    use super::Bin;
    use fnv::FnvHashMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(serde::Serialize, serde::Deserialize)]
    struct SparseBin {
        x: usize,
        y: usize,
        content: f64,
        sumw2: f64,
    }

    // JSON maps need string keys, store the bins as a list sorted by index instead
    pub fn serialize<S: Serializer>(
        bins: &FnvHashMap<(usize, usize), Bin>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut list: Vec<SparseBin> = bins
            .iter()
            .map(|(&(x, y), bin)| SparseBin {
                x,
                y,
                content: bin.content,
                sumw2: bin.sumw2,
            })
            .collect();
        list.sort_by_key(|bin| (bin.y, bin.x));
        list.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<FnvHashMap<(usize, usize), Bin>, D::Error> {
        let list = Vec::<SparseBin>::deserialize(deserializer)?;
        Ok(list
            .into_iter()
            .map(|bin| {
                (
                    (bin.x, bin.y),
                    Bin {
                        content: bin.content,
                        sumw2: bin.sumw2,
                    },
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    fn cross() -> Histogram2D {
        let axis = Axis::uniform(3, -1.5, 1.5).unwrap();
        Histogram2D::from_rows(
            "cross",
            axis.clone(),
            axis,
            &[
                vec![0.0, 1.0, 0.0],
                vec![1.0, 4.0, 1.0],
                vec![0.0, 1.0, 0.0],
            ],
        )
        .unwrap()
    }

    #[test]
    fn fill_routes_out_of_range_values_per_axis() {
        let mut hist = Histogram2D::uniform("h", (2, 2), ((0.0, 1.0), (0.0, 1.0))).unwrap();
        hist.fill(0.1, 0.1);
        hist.fill(0.1, 0.1);
        hist.fill_weighted(0.9, 0.6, 0.5);
        hist.fill(1.2, 0.5);
        hist.fill(-0.2, 0.5);
        hist.fill(0.5, 1.0);

        assert_eq!(hist.content(0, 0), 2.0);
        assert_approx_eq!(f64, hist.error(0, 0), 2.0_f64.sqrt());
        assert_eq!(hist.bin(1, 1), Bin { content: 0.5, sumw2: 0.25 });
        assert_eq!(hist.overflow, (1, 1));
        assert_eq!(hist.underflow, (1, 0));
        assert_approx_eq!(f64, hist.integral(), 2.5);
    }

    #[test]
    fn normalized_has_unit_integral() {
        let normalized = cross().normalized().unwrap();

        assert_approx_eq!(f64, normalized.integral(), 1.0, epsilon = 1e-12);
        assert_approx_eq!(f64, normalized.content(1, 1), 0.5, epsilon = 1e-12);
        assert_approx_eq!(f64, normalized.error(1, 1), 2.0 / 8.0, epsilon = 1e-12);
    }

    #[test]
    fn zero_integral_raises_empty_histogram() {
        let axis = Axis::uniform(3, 0.0, 1.0).unwrap();
        let empty = Histogram2D::new("empty", axis.clone(), axis.clone());
        assert!(matches!(
            empty.normalized(),
            Err(FitError::EmptyHistogram { .. })
        ));

        // positive and negative weights cancelling out
        let mut cancelling = Histogram2D::new("cancelling", axis.clone(), axis);
        cancelling.fill_weighted(0.1, 0.1, 1.0);
        cancelling.fill_weighted(0.5, 0.5, -1.0);
        assert!(matches!(
            cancelling.normalized(),
            Err(FitError::EmptyHistogram { integral, .. }) if integral == 0.0
        ));
    }

    #[test]
    fn add_requires_identical_binning() {
        let mut sum = cross();
        sum.add(&cross()).unwrap();
        assert_eq!(sum.content(1, 1), 8.0);
        assert_eq!(sum.bin(1, 1).sumw2, 8.0);

        let other = Histogram2D::uniform("other", (3, 3), ((0.0, 1.0), (0.0, 1.0))).unwrap();
        assert!(matches!(sum.add(&other), Err(FitError::ShapeMismatch(_))));
    }

    #[test]
    fn from_rows_checks_shape() {
        let axis = Axis::uniform(2, 0.0, 1.0).unwrap();
        assert!(Histogram2D::from_rows("h", axis.clone(), axis.clone(), &[vec![1.0, 2.0]]).is_err());
        assert!(
            Histogram2D::from_rows("h", axis.clone(), axis, &[vec![1.0], vec![1.0, 2.0]]).is_err()
        );
    }

    #[test]
    fn saved_histogram_loads_back() {
        let hist = cross();
        let path = std::env::temp_dir().join(format!("egfit_cross_{}.json", std::process::id()));
        hist.save(&path).unwrap();
        let loaded = Histogram2D::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded, hist);
        assert!(matches!(
            Histogram2D::load(&path),
            Err(FitError::File(_))
        ));
    }

    #[test]
    fn bins_outside_the_axes_are_rejected() {
        let json = r#"{
            "name": "corrupt",
            "x": [0.0, 1.0, 2.0],
            "y": [0.0, 1.0, 2.0],
            "bins": [
                {"x": 1, "y": 1, "content": 2.0, "sumw2": 2.0},
                {"x": 7, "y": 0, "content": 8.0, "sumw2": 8.0}
            ],
            "overflow": [0, 0],
            "underflow": [0, 0]
        }"#;

        let err = serde_json::from_str::<Histogram2D>(json).unwrap_err();
        assert!(err.to_string().contains("bin (7, 0)"), "{err}");

        let path = std::env::temp_dir().join(format!("egfit_corrupt_{}.json", std::process::id()));
        std::fs::write(&path, json).unwrap();
        let loaded = Histogram2D::load(&path);
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(loaded, Err(FitError::ShapeMismatch(_))));

        let valid = json.replace("\"x\": 7", "\"x\": 0");
        let hist: Histogram2D = serde_json::from_str(&valid).unwrap();
        assert_approx_eq!(f64, hist.integral(), 10.0);
    }
}
