use super::histogram2d::Histogram2D;

/// Content-weighted moments of a 2-D histogram inside a window.
#[derive(Debug, Default, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Statistics2D {
    pub integral: f64,
    pub mean_x: f64,
    pub stdev_x: f64,
    pub mean_y: f64,
    pub stdev_y: f64,
    pub covariance: f64,
}

impl Statistics2D {
    pub fn correlation(&self) -> f64 {
        if self.stdev_x > 0.0 && self.stdev_y > 0.0 {
            self.covariance / (self.stdev_x * self.stdev_y)
        } else {
            0.0
        }
    }
}

impl Histogram2D {
    // Calculate statistics for a given range, bins are selected by their centers
    pub fn get_statistics(&self, start_x: f64, end_x: f64, start_y: f64, end_y: f64) -> Statistics2D {
        let inside = |x_index: usize, y_index: usize| {
            let center_x = self.x.center(x_index);
            let center_y = self.y.center(y_index);
            center_x >= start_x && center_x <= end_x && center_y >= start_y && center_y <= end_y
        };

        let mut total = 0.0;
        let mut sum_product_x = 0.0;
        let mut sum_product_y = 0.0;

        for (&(x_index, y_index), bin) in &self.bins {
            if inside(x_index, y_index) {
                total += bin.content;
                sum_product_x += bin.content * self.x.center(x_index);
                sum_product_y += bin.content * self.y.center(y_index);
            }
        }

        if total <= 0.0 {
            return Statistics2D::default();
        }

        let mean_x = sum_product_x / total;
        let mean_y = sum_product_y / total;

        let mut sum_squared_diff_x = 0.0;
        let mut sum_squared_diff_y = 0.0;
        let mut sum_cross = 0.0;

        for (&(x_index, y_index), bin) in &self.bins {
            if inside(x_index, y_index) {
                let diff_x = self.x.center(x_index) - mean_x;
                let diff_y = self.y.center(y_index) - mean_y;

                sum_squared_diff_x += bin.content * diff_x * diff_x;
                sum_squared_diff_y += bin.content * diff_y * diff_y;
                sum_cross += bin.content * diff_x * diff_y;
            }
        }

        Statistics2D {
            integral: total,
            mean_x,
            stdev_x: (sum_squared_diff_x / total).sqrt(),
            mean_y,
            stdev_y: (sum_squared_diff_y / total).sqrt(),
            covariance: sum_cross / total,
        }
    }

    pub fn statistics(&self) -> Statistics2D {
        self.get_statistics(self.x.min(), self.x.max(), self.y.min(), self.y.max())
    }
}
