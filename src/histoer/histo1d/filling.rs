use super::histogram1d::Histogram1D;
use polars::prelude::*;
use std::time::Instant;

impl Histogram1D {
    pub fn fill(&mut self, value: f64) {
        self.fill_weighted(value, 1.0);
    }

    pub fn fill_weighted(&mut self, value: f64, weight: f64) {
        match self.axis.find_bin(value) {
            Some(index) => {
                self.contents[index] += weight;
                self.sumw2[index] += weight * weight;
            }
            None if value >= self.axis.max() => self.overflow += 1,
            // NaN lands here as well
            None => self.underflow += 1,
        }
    }

    // Fill with an expression evaluated on every row passing the selection
    pub fn fill_from_lazyframe(
        &mut self,
        lf: LazyFrame,
        value: Expr,
        selection: Option<Expr>,
    ) -> PolarsResult<()> {
        let start = Instant::now();

        let lf = match selection {
            Some(selection) => lf.filter(selection),
            None => lf,
        };

        let df = lf
            .select([value.cast(DataType::Float64).alias("value")])
            .collect()?;

        let values = df.column("value")?.f64()?;
        let mut filled = 0_usize;
        for value in values.into_iter().flatten() {
            self.fill(value);
            filled += 1;
        }

        log::info!(
            "Filled histogram {} with {} entries in {:?}",
            self.name,
            filled,
            start.elapsed()
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn fill_tracks_overflow_and_weights() {
        let mut hist = Histogram1D::uniform("h", 2, (0.0, 1.0)).unwrap();
        hist.fill(0.25);
        hist.fill_weighted(0.75, 2.0);
        hist.fill(1.0);
        hist.fill(-0.5);

        assert_eq!(hist.contents, vec![1.0, 2.0]);
        assert_eq!(hist.sumw2, vec![1.0, 4.0]);
        assert_eq!(hist.overflow, 1);
        assert_eq!(hist.underflow, 1);
    }

    #[test]
    fn fill_from_lazyframe_applies_selection() {
        let df = df!(
            "deltaR" => [0.01, 0.02, 0.07, 0.2],
            "gen_pt" => [25.0, 10.0, 30.0, 40.0],
            "passed" => [true, true, true, false],
        )
        .unwrap();

        let mut hist = Histogram1D::uniform("deltaR_ptcut", 5, (0.0, 0.25)).unwrap();
        hist.fill_from_lazyframe(
            df.lazy(),
            col("deltaR"),
            Some(col("passed").and(col("gen_pt").gt(lit(20.0)))),
        )
        .unwrap();

        assert_approx_eq!(f64, hist.integral(), 2.0);
        assert_eq!(hist.contents[0], 1.0);
        assert_eq!(hist.contents[1], 1.0);
    }
}
