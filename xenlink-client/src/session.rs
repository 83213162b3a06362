//! Authenticated sessions and the call dispatcher.
//!
//! ```text
//!  typed args ──► Call/Action ──► Session::dispatch ──► Transport::execute
//!                                   │  prepends session ref
//!                                   │  maps faults to XenApiError
//!  typed result ◄── FromWire ◄──────┘
//! ```

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::codec::FromWire;
use crate::error::{Result, XenApiError};
use crate::transport::{Envelope, Transport};
use crate::wire::WireValue;

/// API version sent at login.
pub const API_VERSION: &str = "1.0";

/// Prefix turning a method name into its asynchronous form.
pub const ASYNC_PREFIX: &str = "Async.";

/// An authenticated session.
///
/// Cloning is cheap and clones share the transport. The session holds no
/// mutable state, so clones can dispatch concurrently.
#[derive(Clone)]
pub struct Session {
    transport: Arc<dyn Transport>,
    reference: String,
}

impl Session {
    /// Log in and open a new session.
    #[instrument(skip(transport, password))]
    pub async fn login_with_password(
        transport: Arc<dyn Transport>,
        username: &str,
        password: &str,
        originator: &str,
    ) -> Result<Self> {
        let args = vec![
            WireValue::from(username),
            WireValue::from(password),
            WireValue::from(API_VERSION),
            WireValue::from(originator),
        ];
        let value = unwrap_envelope(transport.execute("session.login_with_password", args).await?)?;
        let reference = String::from_wire(&value)?;

        info!(username = %username, "Session established");
        Ok(Self {
            transport,
            reference,
        })
    }

    /// Adopt a session reference obtained elsewhere.
    pub fn from_reference(transport: Arc<dyn Transport>, reference: impl Into<String>) -> Self {
        Self {
            transport,
            reference: reference.into(),
        }
    }

    /// The opaque session reference.
    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Close the session on the server.
    pub async fn logout(self) -> Result<()> {
        self.dispatch("session.logout", Vec::new()).await?;
        info!("Session closed");
        Ok(())
    }

    /// Send one call: the session reference is prepended to `args`, server
    /// faults come back as typed errors.
    #[instrument(skip_all, fields(method = %method, argc = args.len()))]
    pub async fn dispatch(&self, method: &str, args: Vec<WireValue>) -> Result<WireValue> {
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(WireValue::String(self.reference.clone()));
        full.extend(args);

        let envelope = self.transport.execute(method, full).await?;
        match unwrap_envelope(envelope) {
            Ok(value) => {
                debug!(result = value.kind(), "Call succeeded");
                Ok(value)
            }
            Err(e) => {
                warn!(error = %e, "Call failed");
                Err(e)
            }
        }
    }

    /// Dispatch and decode the result.
    pub async fn call<R: FromWire>(&self, method: &str, args: Vec<WireValue>) -> Result<R> {
        let value = self.dispatch(method, args).await?;
        Ok(R::from_wire(&value)?)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("reference", &self.reference)
            .finish_non_exhaustive()
    }
}

fn unwrap_envelope(envelope: Envelope) -> Result<WireValue> {
    match envelope {
        Envelope::Success(value) => Ok(value),
        Envelope::Failure(description) => Err(XenApiError::from_description(description)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockServer;

    #[tokio::test]
    async fn test_login_and_dispatch() {
        let server = Arc::new(MockServer::new().with_user("root", "secret"));
        let session = Session::login_with_password(server.clone(), "root", "secret", "tests")
            .await
            .unwrap();

        let refs: Vec<String> = session.call("VM.get_all", vec![]).await.unwrap();
        assert!(refs.is_empty());

        let calls = server.calls();
        let last = calls.last().unwrap();
        assert_eq!(last.method, "VM.get_all");
        assert_eq!(last.args, vec![WireValue::from(session.reference())]);
    }

    #[tokio::test]
    async fn test_bad_password() {
        let server = Arc::new(MockServer::new().with_user("root", "secret"));
        let err = Session::login_with_password(server, "root", "wrong", "tests")
            .await
            .unwrap_err();
        assert!(err.is_fault(crate::error::FaultCode::SessionAuthenticationFailed));
    }

    #[tokio::test]
    async fn test_logout_invalidates() {
        let server = Arc::new(MockServer::new().with_user("root", "secret"));
        let session = Session::login_with_password(server.clone(), "root", "secret", "tests")
            .await
            .unwrap();
        let stale = session.clone();
        session.logout().await.unwrap();

        let err = stale.dispatch("VM.get_all", vec![]).await.unwrap_err();
        assert!(err.is_fault(crate::error::FaultCode::SessionInvalid));
    }
}
