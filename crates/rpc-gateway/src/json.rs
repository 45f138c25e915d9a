//! Typed wrappers over loosely-typed JSON-RPC values.
//!
//! Generated facades marshal strongly-typed parameters and results through
//! the gateway's generic [`Value`] plumbing. [`FromJson`] is the seam: a
//! facade result type implements it, and [`crate::gateway::Gateway::request_as`]
//! parses through it. Enumerations are expressed as string↔variant tables.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{GatewayError, GatewayResult};

/// Conversion from a generic JSON value into a typed result.
///
/// Shape mismatches map to [`GatewayError::InvalidParams`].
pub trait FromJson: Sized {
    /// Parse `value` into `Self`.
    fn from_json(value: &Value) -> GatewayResult<Self>;
}

impl FromJson for Value {
    fn from_json(value: &Value) -> GatewayResult<Self> {
        Ok(value.clone())
    }
}

macro_rules! impl_from_json_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromJson for $ty {
                fn from_json(value: &Value) -> GatewayResult<Self> {
                    deserialize(value)
                }
            }
        )*
    };
}

impl_from_json_scalar!(bool, String, u32, i32, u64, i64, f32, f64);

impl<T: FromJson> FromJson for Vec<T> {
    /// Array wrapper: validates the outer shape and every element.
    fn from_json(value: &Value) -> GatewayResult<Self> {
        let items = value.as_array().ok_or(GatewayError::InvalidParams)?;
        items.iter().map(T::from_json).collect()
    }
}

impl<T: FromJson> FromJson for Option<T> {
    fn from_json(value: &Value) -> GatewayResult<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_json(value).map(Some)
        }
    }
}

fn deserialize<T: DeserializeOwned>(value: &Value) -> GatewayResult<T> {
    serde_json::from_value(value.clone()).map_err(|_| GatewayError::InvalidParams)
}

/// String↔variant mapping table for wire enumerations.
pub type EnumTable<T> = &'static [(&'static str, T)];

/// Resolve a wire string to its variant.
pub fn enum_from_str<T: Copy>(table: EnumTable<T>, tag: &str) -> GatewayResult<T> {
    table
        .iter()
        .find(|(name, _)| *name == tag)
        .map(|(_, variant)| *variant)
        .ok_or(GatewayError::InvalidParams)
}

/// Resolve a variant to its wire string.
pub fn enum_to_str<T: Copy + PartialEq>(table: EnumTable<T>, variant: T) -> Option<&'static str> {
    table
        .iter()
        .find(|(_, candidate)| *candidate == variant)
        .map(|(name, _)| *name)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_scalars() {
        assert_eq!(bool::from_json(&json!(true)), Ok(true));
        assert_eq!(u32::from_json(&json!(42)), Ok(42));
        assert_eq!(i64::from_json(&json!(-7)), Ok(-7));
        assert_eq!(
            String::from_json(&json!("hello")),
            Ok("hello".to_string())
        );
    }

    #[test]
    fn test_scalar_shape_mismatch() {
        assert_eq!(bool::from_json(&json!("yes")), Err(GatewayError::InvalidParams));
        assert_eq!(u32::from_json(&json!(-1)), Err(GatewayError::InvalidParams));
    }

    #[test]
    fn test_array_validates_elements() {
        assert_eq!(Vec::<u32>::from_json(&json!([1, 2, 3])), Ok(vec![1, 2, 3]));
        assert_eq!(
            Vec::<u32>::from_json(&json!([1, "two", 3])),
            Err(GatewayError::InvalidParams)
        );
        assert_eq!(
            Vec::<u32>::from_json(&json!({"not": "array"})),
            Err(GatewayError::InvalidParams)
        );
    }

    #[test]
    fn test_option_null() {
        assert_eq!(Option::<bool>::from_json(&Value::Null), Ok(None));
        assert_eq!(Option::<bool>::from_json(&json!(false)), Ok(Some(false)));
    }

    #[test]
    fn test_enum_table() {
        #[derive(Clone, Copy, Debug, PartialEq)]
        enum Mode {
            On,
            Off,
        }
        const MODES: EnumTable<Mode> = &[("on", Mode::On), ("off", Mode::Off)];

        assert_eq!(enum_from_str(MODES, "on"), Ok(Mode::On));
        assert_eq!(enum_from_str(MODES, "dim"), Err(GatewayError::InvalidParams));
        assert_eq!(enum_to_str(MODES, Mode::Off), Some("off"));
    }
}
