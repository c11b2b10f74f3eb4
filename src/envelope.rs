//! Standardized API response envelope.
//!
//! Every API response carries a [`Status`] tag, a human-readable message and
//! optional data, which is either the success payload or a list of
//! field-level [`ValidationError`]s.
//!
//! ```
//! use svckit::envelope::{Envelope, Status, ValidationError};
//!
//! let ok = Envelope::success("User created", serde_json::json!({"id": 7}));
//! assert_eq!(ok.status(), Status::Accepted);
//!
//! let rejected: Envelope = Envelope::with_validation_errors(
//!     "Validation failed",
//!     vec![ValidationError::new("email", "Required")],
//! );
//! assert_eq!(
//!     serde_json::to_string(&rejected).unwrap(),
//!     r#"{"status":"Rejected","message":"Validation failed","data":[{"field":"email","reason":"Required"}]}"#
//! );
//! ```

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome tag of an API response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// The operation succeeded.
    Accepted,
    /// The request was refused, typically because of invalid input.
    Rejected,
    /// The system failed while handling a valid request.
    Failed,
}

/// A field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Field name that failed validation
    pub field: String,
    /// Reason for the failure
    pub reason: String,
}

impl ValidationError {
    /// Creates a validation error for `field`.
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// The `data` member of an [`Envelope`].
///
/// Decoding picks the variant from the envelope status: only a `Rejected`
/// envelope whose data is a list of `{field, reason}` objects yields
/// `ValidationErrors`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload<T> {
    /// Validation errors attached to a rejected response.
    ValidationErrors(Vec<ValidationError>),
    /// Data returned by a successful response.
    Data(T),
}

/// A standardized API response.
///
/// Serializes as `{"status": ..., "message": ..., "data": ...}` with `message`
/// omitted when empty and `data` omitted when absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope<T = Value> {
    status: Status,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Payload<T>>,
}

impl<T> Envelope<T> {
    /// Creates an envelope with an explicit status.
    pub fn new(status: Status, message: impl Into<String>, data: Option<Payload<T>>) -> Self {
        Self {
            status,
            message: message.into(),
            data,
        }
    }

    /// Creates an `Accepted` envelope carrying `data`.
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self::new(Status::Accepted, message, Some(Payload::Data(data)))
    }

    /// Creates a `Rejected` envelope without data.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Status::Rejected, message, None)
    }

    /// Creates a `Rejected` envelope carrying validation errors in order.
    pub fn with_validation_errors(
        message: impl Into<String>,
        errors: impl IntoIterator<Item = ValidationError>,
    ) -> Self {
        let errors = errors.into_iter().collect();
        Self::new(
            Status::Rejected,
            message,
            Some(Payload::ValidationErrors(errors)),
        )
    }

    /// Creates a `Failed` envelope without data.
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(Status::Failed, message, None)
    }

    /// Returns the status tag.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Returns the message, empty if none was given.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the success data, if any.
    pub fn data(&self) -> Option<&T> {
        match &self.data {
            Some(Payload::Data(data)) => Some(data),
            _ => None,
        }
    }

    /// Returns the validation errors, if any.
    pub fn validation_errors(&self) -> Option<&[ValidationError]> {
        match &self.data {
            Some(Payload::ValidationErrors(errors)) => Some(errors),
            _ => None,
        }
    }

    /// Returns the raw payload.
    pub fn payload(&self) -> Option<&Payload<T>> {
        self.data.as_ref()
    }

    /// Returns `true` for `Accepted` envelopes.
    pub fn is_accepted(&self) -> bool {
        self.status == Status::Accepted
    }
}

impl<T: DeserializeOwned> Payload<T> {
    fn from_value(status: Status, value: Value) -> serde_json::Result<Self> {
        if status == Status::Rejected {
            if let Ok(errors) = Vec::<ValidationError>::deserialize(&value) {
                return Ok(Payload::ValidationErrors(errors));
            }
        }
        T::deserialize(value).map(Payload::Data)
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Envelope<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            status: Status,
            #[serde(default)]
            message: String,
            #[serde(default)]
            data: Option<Value>,
        }

        let raw = Raw::deserialize(deserializer)?;
        let data = raw
            .data
            .map(|value| Payload::from_value(raw.status, value))
            .transpose()
            .map_err(de::Error::custom)?;
        Ok(Self::new(raw.status, raw.message, data))
    }
}
