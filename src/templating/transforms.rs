//! Named transforms applied to a resolved placeholder value.
//!
//! A placeholder may end with `:<name>` to transform the value before it is
//! substituted, e.g. `{{user.username:upperCase}}`. The registry is closed: names
//! outside [`Transform::from_name`] are rejected.

use serde_json::Value;

use crate::core::DeployError;

/// The transforms a placeholder may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    Identity,
    UpperCase,
    LowerCase,
    UrlEncode,
}

impl Transform {
    /// Look up a transform by its placeholder name.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::UnknownTransform`] for names outside the registry.
    pub fn from_name(name: &str) -> Result<Self, DeployError> {
        match name {
            "" | "identity" => Ok(Self::Identity),
            "upperCase" | "uppercase" => Ok(Self::UpperCase),
            "lowerCase" | "lowercase" => Ok(Self::LowerCase),
            "urlEncode" | "urlencode" => Ok(Self::UrlEncode),
            other => Err(DeployError::UnknownTransform {
                name: other.to_string(),
            }),
        }
    }

    /// Apply the transform.
    ///
    /// `Identity` keeps the value's type; every other transform works on the value's
    /// string form and yields a string.
    pub fn apply(self, value: &Value) -> Value {
        match self {
            Self::Identity => value.clone(),
            Self::UpperCase => Value::String(value_to_string(value).to_uppercase()),
            Self::LowerCase => Value::String(value_to_string(value).to_lowercase()),
            Self::UrlEncode => {
                Value::String(urlencoding::encode(&value_to_string(value)).into_owned())
            }
        }
    }
}

/// String form used when a value is embedded in a larger string.
///
/// Strings are used as-is, scalars use their JSON form and containers are
/// serialized as compact JSON.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
