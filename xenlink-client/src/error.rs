//! Error types for the client.

use thiserror::Error;

use crate::codec::CodecError;
use crate::enums::WireEnum;

crate::wire_enum! {
    /// Server fault names the client knows how to classify.
    pub enum FaultCode: "fault" {
        HandleInvalid = "HANDLE_INVALID",
        UuidInvalid = "UUID_INVALID",
        SessionInvalid = "SESSION_INVALID",
        SessionAuthenticationFailed = "SESSION_AUTHENTICATION_FAILED",
        EventFromTokenParseFailure = "EVENT_FROM_TOKEN_PARSE_FAILURE",
        EventSubscriptionParseFailure = "EVENT_SUBSCRIPTION_PARSE_FAILURE",
        MessageMethodUnknown = "MESSAGE_METHOD_UNKNOWN",
        MessageParameterCountMismatch = "MESSAGE_PARAMETER_COUNT_MISMATCH",
        InternalError = "INTERNAL_ERROR",
        OperationNotAllowed = "OPERATION_NOT_ALLOWED",
        OtherOperationInProgress = "OTHER_OPERATION_IN_PROGRESS",
        PermissionDenied = "PERMISSION_DENIED",
        RbacPermissionDenied = "RBAC_PERMISSION_DENIED",
        HostIsSlave = "HOST_IS_SLAVE",
        TooBusy = "TOO_BUSY",
        TaskCancelled = "TASK_CANCELLED",
        VmBadPowerState = "VM_BAD_POWER_STATE",
        VmIsTemplate = "VM_IS_TEMPLATE",
        VmHvmRequired = "VM_HVM_REQUIRED",
        BootloaderFailed = "BOOTLOADER_FAILED",
        UnknownBootloader = "UNKNOWN_BOOTLOADER",
        NoHostsAvailable = "NO_HOSTS_AVAILABLE",
        LicenceRestriction = "LICENCE_RESTRICTION",
    }
}

/// Fault name for a session that never registered for events.
pub const SESSION_NOT_REGISTERED: &str = "SESSION_NOT_REGISTERED";

/// Fault name for an event history overflow.
pub const EVENTS_LOST: &str = "EVENTS_LOST";

/// Errors that can occur while talking to the server.
#[derive(Error, Debug)]
pub enum XenApiError {
    /// The transport could not deliver the call or read the reply.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The reply did not have the expected envelope shape.
    #[error("Bad server response: {0}")]
    BadServerResponse(String),

    /// A value could not be converted to or from its wire form.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// `event.next` was called on a session that never called `event.register`.
    #[error("Session is not registered for events")]
    SessionNotRegistered { params: Vec<String> },

    /// The server dropped events this session had not consumed yet.
    ///
    /// This is an unrecoverable gap: the caller must re-read the full state
    /// of every class it watches before consuming events again.
    #[error("Events lost, full resync required")]
    EventsLost { params: Vec<String> },

    /// A known server fault.
    #[error("Server fault {code}: {params:?}")]
    Failure { code: FaultCode, params: Vec<String> },

    /// A fault name outside the known vocabulary, passed through untouched.
    #[error("Unrecognized server fault {name}: {params:?}")]
    UnrecognizedFailure { name: String, params: Vec<String> },
}

impl XenApiError {
    /// Classify a fault from its error description (`[name, params...]`).
    pub fn from_description(description: Vec<String>) -> Self {
        let mut parts = description.into_iter();
        let name = match parts.next() {
            Some(name) => name,
            None => return XenApiError::BadServerResponse("Empty error description".to_string()),
        };
        let params: Vec<String> = parts.collect();

        if name == SESSION_NOT_REGISTERED {
            return XenApiError::SessionNotRegistered { params };
        }
        if name == EVENTS_LOST {
            return XenApiError::EventsLost { params };
        }

        match FaultCode::from_token(&name) {
            Some(code) => XenApiError::Failure { code, params },
            None => XenApiError::UnrecognizedFailure { name, params },
        }
    }

    /// The fault name as the server spelled it, if this is a server fault.
    pub fn fault_name(&self) -> Option<&str> {
        match self {
            XenApiError::SessionNotRegistered { .. } => Some(SESSION_NOT_REGISTERED),
            XenApiError::EventsLost { .. } => Some(EVENTS_LOST),
            XenApiError::Failure { code, .. } => Some(code.as_str()),
            XenApiError::UnrecognizedFailure { name, .. } => Some(name.as_str()),
            _ => None,
        }
    }

    /// The fault parameters, empty for non-fault errors.
    pub fn fault_params(&self) -> &[String] {
        match self {
            XenApiError::SessionNotRegistered { params }
            | XenApiError::EventsLost { params }
            | XenApiError::Failure { params, .. }
            | XenApiError::UnrecognizedFailure { params, .. } => params.as_slice(),
            _ => &[],
        }
    }

    /// Check for a specific known fault.
    pub fn is_fault(&self, code: FaultCode) -> bool {
        matches!(self, XenApiError::Failure { code: c, .. } if *c == code)
    }
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, XenApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_known_fault() {
        let err = XenApiError::from_description(desc(&["HANDLE_INVALID", "VM", "OpaqueRef:x"]));
        assert!(err.is_fault(FaultCode::HandleInvalid));
        assert_eq!(err.fault_params(), &["VM".to_string(), "OpaqueRef:x".to_string()]);
        assert_eq!(err.fault_name(), Some("HANDLE_INVALID"));
    }

    #[test]
    fn test_event_faults_get_dedicated_variants() {
        assert!(matches!(
            XenApiError::from_description(desc(&["SESSION_NOT_REGISTERED", "OpaqueRef:s"])),
            XenApiError::SessionNotRegistered { .. }
        ));
        assert!(matches!(
            XenApiError::from_description(desc(&["EVENTS_LOST"])),
            XenApiError::EventsLost { .. }
        ));
    }

    #[test]
    fn test_unknown_fault_passes_through() {
        let err = XenApiError::from_description(desc(&["SR_BACKEND_FAILURE_42", "a", "b"]));
        match err {
            XenApiError::UnrecognizedFailure { name, params } => {
                assert_eq!(name, "SR_BACKEND_FAILURE_42");
                assert_eq!(params, desc(&["a", "b"]));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_empty_description() {
        assert!(matches!(
            XenApiError::from_description(vec![]),
            XenApiError::BadServerResponse(_)
        ));
    }
}
