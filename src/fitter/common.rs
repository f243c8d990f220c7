use std::fmt::Display;

#[derive(PartialEq, Default, Debug, Clone, Copy, serde::Deserialize, serde::Serialize)]
pub struct Value {
    pub value: f64,
    pub uncertainty: f64,
}

impl Value {
    pub fn new(value: f64, uncertainty: f64) -> Self {
        Self { value, uncertainty }
    }

    // uncertainty relative to the value, infinite for a zero value
    pub fn relative_uncertainty(&self) -> f64 {
        if self.value == 0.0 {
            f64::INFINITY
        } else {
            (self.uncertainty / self.value).abs()
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4e} ± {:.4e}", self.value, self.uncertainty)
    }
}

/// A fit point with asymmetric errors on the y value.
#[derive(PartialEq, Default, Debug, Clone, Copy, serde::Deserialize, serde::Serialize)]
pub struct DataPoint {
    pub x: f64,
    pub y: f64,
    pub error_low: f64,
    pub error_high: f64,
}

impl DataPoint {
    /// Error to weight a residual with: the upper error when the model lies
    /// above the point, the lower one otherwise. A zero error on the chosen
    /// side falls back to the other side.
    pub fn error_towards(&self, model: f64) -> f64 {
        let (chosen, other) = if model > self.y {
            (self.error_high, self.error_low)
        } else {
            (self.error_low, self.error_high)
        };
        if chosen > 0.0 { chosen } else { other }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asymmetric_error_side() {
        let point = DataPoint {
            x: 1.0,
            y: 0.5,
            error_low: 0.1,
            error_high: 0.2,
        };
        assert_eq!(point.error_towards(0.7), 0.2);
        assert_eq!(point.error_towards(0.3), 0.1);

        let at_plateau = DataPoint {
            error_high: 0.0,
            ..point
        };
        assert_eq!(at_plateau.error_towards(0.7), 0.1);
    }

    #[test]
    fn value_display() {
        let value = Value::new(1.5, 0.25);
        assert_eq!(value.to_string(), "1.5000e0 ± 2.5000e-1");
        assert_eq!(Value::new(0.0, 1.0).relative_uncertainty(), f64::INFINITY);
    }
}
