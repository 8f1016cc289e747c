//! Functions and utilities for working with [ndarray] objects.

use crate::error::SimStageError;

use ndarray::prelude::*;
use serde_json::Value;

/// A numeric element that can be rendered as JSON.
pub trait Element: Copy + Send + Sync + 'static {
    /// Render as a JSON value.
    fn to_json(self) -> Value;
}

macro_rules! impl_integer_element {
    ($($t:ty),*) => {
        $(
            impl Element for $t {
                fn to_json(self) -> Value {
                    Value::from(self)
                }
            }
        )*
    };
}

impl_integer_element!(i8, i16, i32);

/// JSON has no representation for non-finite numbers, so they are rendered as the strings
/// `"NaN"`, `"Infinity"` and `"-Infinity"`.
fn float_to_json(value: f64) -> Value {
    if value.is_nan() {
        Value::from("NaN")
    } else if value == f64::INFINITY {
        Value::from("Infinity")
    } else if value == f64::NEG_INFINITY {
        Value::from("-Infinity")
    } else {
        Value::from(value)
    }
}

impl Element for f32 {
    fn to_json(self) -> Value {
        // Widen through the shortest decimal form so 0.1_f32 renders as 0.1.
        match self.to_string().parse::<f64>() {
            Ok(value) => float_to_json(value),
            Err(_) => float_to_json(self as f64),
        }
    }
}

impl Element for f64 {
    fn to_json(self) -> Value {
        float_to_json(self)
    }
}

/// Build a row-major [ndarray::ArrayD] from a shape and its values.
///
/// # Arguments
///
/// * `shape`: Length of each dimension. An empty shape is a scalar.
/// * `data`: Values in row-major order
pub fn build_array<T>(shape: &[usize], data: Vec<T>) -> Result<ArrayD<T>, SimStageError> {
    ArrayD::from_shape_vec(IxDyn(shape), data).map_err(SimStageError::ShapeInvalid)
}

/// Render an array view as nested JSON arrays with the array's dimensionality.
///
/// A zero-dimensional array renders as a bare value.
pub fn to_nested_json<T: Element>(array: ArrayViewD<T>) -> Value {
    if array.ndim() == 0 {
        return array
            .iter()
            .next()
            .map(|value| value.to_json())
            .unwrap_or(Value::Null);
    }
    if array.ndim() == 1 {
        return Value::Array(array.iter().map(|value| value.to_json()).collect());
    }
    Value::Array(array.outer_iter().map(to_nested_json).collect())
}
