//! Typed call builders.
//!
//! [`Call`] is a read-only remote call. [`Action`] is a mutating call that
//! can be sent either synchronously (result decoded as `R`) or in its
//! `Async.` form, in which case the server answers immediately with a Task
//! handle. Both forms marshal the same argument list; only the method name
//! and the result shape differ.

use std::marker::PhantomData;

use crate::api::task::Task;
use crate::codec::{CodecError, FromWire, ToWire};
use crate::error::Result;
use crate::handle::Ref;
use crate::session::{Session, ASYNC_PREFIX};
use crate::wire::WireValue;

/// A remote call returning `R`.
///
/// Arguments are encoded as they are added; the first encode error is kept
/// and reported when the call is invoked.
#[must_use = "a call does nothing until it is invoked"]
pub struct Call<R> {
    method: String,
    args: Vec<WireValue>,
    error: Option<CodecError>,
    _result: PhantomData<fn() -> R>,
}

impl<R: FromWire> Call<R> {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            args: Vec::new(),
            error: None,
            _result: PhantomData,
        }
    }

    /// Append the next declared parameter.
    pub fn arg<T: ToWire + ?Sized>(mut self, value: &T) -> Self {
        if self.error.is_none() {
            match value.to_wire() {
                Ok(wire) => self.args.push(wire),
                Err(e) => self.error = Some(e),
            }
        }
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Encoded arguments, excluding the session reference.
    pub fn args(&self) -> &[WireValue] {
        &self.args
    }

    fn into_parts(self) -> Result<(String, Vec<WireValue>)> {
        match self.error {
            Some(e) => Err(e.into()),
            None => Ok((self.method, self.args)),
        }
    }

    /// Send the call and decode its result.
    pub async fn invoke(self, session: &Session) -> Result<R> {
        let (method, args) = self.into_parts()?;
        session.call(&method, args).await
    }
}

/// A mutating remote call with a synchronous and an asynchronous form.
#[must_use = "an action does nothing until it is invoked"]
pub struct Action<R> {
    call: Call<R>,
}

impl<R: FromWire> Action<R> {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            call: Call::new(method),
        }
    }

    pub fn arg<T: ToWire + ?Sized>(self, value: &T) -> Self {
        Self {
            call: self.call.arg(value),
        }
    }

    /// Method name of the synchronous form.
    pub fn method(&self) -> &str {
        self.call.method()
    }

    /// Method name of the asynchronous form.
    pub fn async_method(&self) -> String {
        format!("{}{}", ASYNC_PREFIX, self.call.method())
    }

    pub fn args(&self) -> &[WireValue] {
        self.call.args()
    }

    /// Run the operation and wait for its result.
    pub async fn invoke(self, session: &Session) -> Result<R> {
        self.call.invoke(session).await
    }

    /// Start the operation as a server-side task and return its handle
    /// without waiting.
    pub async fn invoke_async(self, session: &Session) -> Result<Ref<Task>> {
        let method = self.async_method();
        let (_, args) = self.call.into_parts()?;
        session.call(&method, args).await
    }
}
