use std::collections::BTreeMap;

use crate::Error;

/// A payload value exchanged with the embedding runtime.
///
/// Mirrors what the runtime's standard message codec can carry.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Builds a [`Value::Map`] from key-value pairs.
    pub fn map<K: Into<String>, V: Into<Value>>(entries: impl IntoIterator<Item = (K, V)>) -> Self {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Looks up `key` if this is a map.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(map) => map.get(key),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Correlation tag matching an external result back to the request that triggered it.
///
/// Each capability channel reserves one fixed code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RequestCode(pub i32);

impl std::fmt::Display for RequestCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Status code delivered with an external (activity) result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResultStatus(pub i32);

impl ResultStatus {
    /// The platform's `RESULT_OK`.
    pub const OK: ResultStatus = ResultStatus(-1);
    /// The platform's `RESULT_CANCELED`.
    pub const CANCELED: ResultStatus = ResultStatus(0);

    pub fn is_ok(&self) -> bool {
        *self == Self::OK
    }
}

/// The single outcome a capture request is resolved with.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    /// Encoded image data.
    ImageBytes(Vec<u8>),
    /// The user or an external actor declined.
    Cancelled,
    /// The result was delivered without an extractable image.
    NoImage,
    /// Any other failure; see [`crate::ErrorKind`] for the category.
    Error(Error),
}

impl CaptureOutcome {
    /// Converts the outcome into the reply sent to the runtime:
    /// `{"imageBytes": <bytes>}` on success, an [`Error`] otherwise.
    pub fn into_reply(self) -> crate::Result<Value> {
        use crate::ErrorKind;
        match self {
            CaptureOutcome::ImageBytes(bytes) => Ok(Value::map([("imageBytes", bytes)])),
            CaptureOutcome::Cancelled => Err(Error::new(
                ErrorKind::Cancelled,
                "the user cancelled the capture",
            )),
            CaptureOutcome::NoImage => Err(Error::new(ErrorKind::NoImage, "no image was obtained")),
            CaptureOutcome::Error(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn map_lookup() {
        let v = Value::map([("hasCamera", true)]);
        assert_eq!(v.get("hasCamera").and_then(Value::as_bool), Some(true));
        assert_eq!(v.get("missing"), None);
        assert_eq!(Value::Null.get("hasCamera"), None);
    }

    #[test]
    fn outcome_replies() {
        let reply = CaptureOutcome::ImageBytes(vec![1, 2, 3]).into_reply().unwrap();
        assert_eq!(reply.get("imageBytes").and_then(Value::as_bytes), Some(&[1, 2, 3][..]));

        let err = CaptureOutcome::Cancelled.into_reply().unwrap_err();
        assert_eq!(err.code(), "CANCELLED");

        let err = CaptureOutcome::NoImage.into_reply().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoImage);
    }

    #[test]
    fn status_codes() {
        assert!(ResultStatus::OK.is_ok());
        assert!(!ResultStatus::CANCELED.is_ok());
        assert!(!ResultStatus(1).is_ok());
    }
}
