use super::histogram2d::Histogram2D;
use polars::prelude::*;
use std::time::Instant;

impl Histogram2D {
    /// Fill with two expressions evaluated on every row passing `selection`,
    /// e.g. a relative resolution `(reco_pt - gen_pt) / gen_pt` against
    /// `gen_pt` for rows with `reco_pt > 0`. Rows where either value is null
    /// are skipped.
    pub fn fill_from_lazyframe(
        &mut self,
        lf: LazyFrame,
        x: Expr,
        y: Expr,
        selection: Option<Expr>,
    ) -> PolarsResult<()> {
        let start = Instant::now();

        let lf = match selection {
            Some(selection) => lf.filter(selection),
            None => lf,
        };

        let df = lf
            .select([
                x.cast(DataType::Float64).alias("x"),
                y.cast(DataType::Float64).alias("y"),
            ])
            .collect()?;

        let x_values = df.column("x")?.f64()?;
        let y_values = df.column("y")?.f64()?;

        let mut filled = 0_usize;
        for (x_opt, y_opt) in x_values.into_iter().zip(y_values) {
            if let (Some(x_value), Some(y_value)) = (x_opt, y_opt) {
                self.fill(x_value, y_value);
                filled += 1;
            }
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
