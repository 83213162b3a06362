//! Transport abstraction.
//!
//! A transport executes one named remote call with an ordered argument list
//! and hands back either the result value or the fault description. It knows
//! nothing about sessions, typed values or fault classification.

use async_trait::async_trait;

use crate::error::{Result, XenApiError};
use crate::wire::WireValue;

/// Outcome of one remote call as seen on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// The call succeeded with this value.
    Success(WireValue),
    /// The call failed. The first element is the fault name, the rest are
    /// its parameters.
    Failure(Vec<String>),
}

impl Envelope {
    /// Interpret an XML-RPC style status struct:
    /// `{Status: "Success", Value: ...}` or
    /// `{Status: "Failure", ErrorDescription: [...]}`.
    pub fn from_status_struct(response: &WireValue) -> Result<Self> {
        let status = response
            .get("Status")
            .and_then(WireValue::as_str)
            .ok_or_else(|| XenApiError::BadServerResponse(format!("Missing Status in {}", response)))?;

        match status {
            "Success" => Ok(Envelope::Success(
                response.get("Value").cloned().unwrap_or(WireValue::Nil),
            )),
            "Failure" => {
                let description = match response.get("ErrorDescription") {
                    Some(WireValue::Array(items)) => items.iter().map(|item| item.to_string()).collect(),
                    Some(other) => vec![other.to_string()],
                    None => Vec::new(),
                };
                Ok(Envelope::Failure(description))
            }
            other => Err(XenApiError::BadServerResponse(format!("Unknown Status '{}'", other))),
        }
    }

    /// Build the status struct form of this envelope.
    pub fn to_status_struct(&self) -> WireValue {
        match self {
            Envelope::Success(value) => WireValue::structure([
                ("Status", WireValue::from("Success")),
                ("Value", value.clone()),
            ]),
            Envelope::Failure(description) => WireValue::structure([
                ("Status", WireValue::from("Failure")),
                (
                    "ErrorDescription",
                    WireValue::Array(description.iter().map(|s| WireValue::from(s.as_str())).collect()),
                ),
            ]),
        }
    }
}

/// Executes remote calls.
///
/// Implementations must be shareable across tasks; the client never holds a
/// lock across a call.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute `method` with `args` (the session reference, when the method
    /// takes one, is already the first argument).
    async fn execute(&self, method: &str, args: Vec<WireValue>) -> Result<Envelope>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_status() {
        let response = WireValue::structure([
            ("Status", WireValue::from("Success")),
            ("Value", WireValue::from("OpaqueRef:abc")),
        ]);
        assert_eq!(
            Envelope::from_status_struct(&response).unwrap(),
            Envelope::Success(WireValue::from("OpaqueRef:abc"))
        );
    }

    #[test]
    fn test_failure_status() {
        let envelope = Envelope::Failure(vec!["HANDLE_INVALID".to_string(), "VM".to_string()]);
        let parsed = Envelope::from_status_struct(&envelope.to_status_struct()).unwrap();
        assert_eq!(parsed, envelope);
    }

    #[test]
    fn test_malformed_status() {
        let response = WireValue::structure([("Value", WireValue::Int(1))]);
        assert!(matches!(
            Envelope::from_status_struct(&response),
            Err(XenApiError::BadServerResponse(_))
        ));

        let response = WireValue::structure([("Status", WireValue::from("Maybe"))]);
        assert!(Envelope::from_status_struct(&response).is_err());
    }
}
