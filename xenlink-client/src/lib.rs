//! # xenlink Client
//!
//! Typed client core for XenAPI-style hypervisor management services.
//!
//! Every remote call goes through a small set of generic pieces:
//! - **Value codec** - converts between strong types and [`WireValue`]
//! - **Call dispatcher** - [`Session`] prepends the session reference and
//!   turns server faults into [`XenApiError`]
//! - **Handles** - [`Ref<C>`] is a typed, opaque server reference
//! - **Sync/async duality** - every [`Action`] can also be started as a
//!   server-side task
//! - **Events** - long-poll change notification over [`event::Event::from`]
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │   api::{vm, host, pool, pci, vgpu, task}     │
//! │   typed Ref<C> methods, records, enums       │
//! └──────────────────────┬───────────────────────┘
//!                        │ Call<R> / Action<R>
//!                        ▼
//! ┌──────────────────────────────────────────────┐
//! │   Session::dispatch + codec (WireValue)      │
//! └──────────────────────┬───────────────────────┘
//!                        │ Transport trait
//!         ┌──────────────┴──────────────┐
//!         ▼                             ▼
//! ┌───────────────────┐       ┌───────────────────┐
//! │ JsonRpcTransport  │       │    MockServer     │
//! │  (HTTPS, reqwest) │       │   (in memory)     │
//! └───────────────────┘       └───────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use xenlink_client::prelude::*;
//! use xenlink_client::api::vm::Vm;
//!
//! #[tokio::main]
//! async fn main() -> xenlink_client::Result<()> {
//!     let transport = Arc::new(JsonRpcTransport::new(&ClientConfig::default())?);
//!     let session = Session::login_with_password(transport, "root", "secret", "demo").await?;
//!
//!     for (vm, record) in Vm::get_all_records().invoke(&session).await? {
//!         println!("{} {}", vm, record.name_label);
//!     }
//!
//!     let web = Vm::get_by_name_label("web-01").invoke(&session).await?;
//!     for vm in web {
//!         let task = vm.clean_reboot().invoke_async(&session).await?;
//!         println!("rebooting {} as {}", vm, task);
//!     }
//!     session.logout().await
//! }
//! ```

pub mod api;
pub mod call;
pub mod codec;
pub mod enums;
pub mod error;
pub mod event;
pub mod handle;
pub mod jsonrpc;
pub mod mock;
pub mod proxy;
pub mod record;
pub mod session;
pub mod transport;
pub mod wire;

pub use call::{Action, Call};
pub use codec::{decode, encode, CodecError, CodecResult, FromWire, ToWire, WireKey};
pub use enums::{EnumValue, WireEnum};
pub use error::{FaultCode, Result, XenApiError};
pub use event::{Event, EventBatch, EventOperation, EventPoller, EventRecord, EventToken};
pub use handle::{AnyRef, ApiClass, Ref, NULL_REF};
pub use jsonrpc::{ClientConfig, JsonRpcTransport};
pub use mock::MockServer;
pub use proxy::ClassCalls;
pub use record::{Entity, Record};
pub use session::Session;
pub use transport::{Envelope, Transport};
pub use wire::WireValue;

/// Everything needed to make calls.
pub mod prelude {
    pub use crate::call::{Action, Call};
    pub use crate::enums::EnumValue;
    pub use crate::error::{FaultCode, XenApiError};
    pub use crate::event::{Event, EventPoller, EventToken};
    pub use crate::handle::Ref;
    pub use crate::jsonrpc::{ClientConfig, JsonRpcTransport};
    pub use crate::proxy::ClassCalls;
    pub use crate::record::Record;
    pub use crate::session::Session;
    pub use crate::transport::Transport;
}
