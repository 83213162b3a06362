//! Event notification protocol.
//!
//! Two ways to learn about changes:
//!
//! - **Token based** ([`Event::from`]): the client holds a continuation token
//!   and long-polls with a timeout. Consecutive calls, each given the token
//!   returned by the previous one, deliver every event exactly once and in
//!   order. [`EventPoller`] wraps this loop.
//! - **Legacy** ([`Event::register`] + [`Event::next`]): the subscription
//!   lives on the server, attached to the session. Kept for older servers.
//!
//! In both modes an [`XenApiError::EventsLost`] fault means the server's
//! history overflowed before the client caught up. Anything derived from
//! events must then be rebuilt from a full read.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use futures::stream::{self, Stream};
use tracing::{debug, instrument, warn};

use crate::call::{Action, Call};
use crate::codec::{CodecError, CodecResult, FromWire, ToWire};
use crate::enums::EnumValue;
use crate::error::{Result, XenApiError};
use crate::handle::{AnyRef, ApiClass, Ref};
use crate::proxy::method_name;
use crate::record::Record;
use crate::session::Session;
use crate::wire::WireValue;

/// Class name matching every class in a subscription.
pub const WILDCARD: &str = "*";

/// Default long-poll timeout, in seconds.
pub const DEFAULT_TIMEOUT_SECS: f64 = 30.0;

crate::api_class! {
    /// Pseudo-class carrying the event calls.
    Event => "event",
}

crate::wire_enum! {
    /// Kind of change an event reports.
    pub enum EventOperation: "event_operation" {
        /// Object created
        Add = "add",
        /// Object destroyed
        Del = "del",
        /// Object modified
        Mod = "mod",
    }
}

crate::api_record! {
    /// One change to one object.
    pub struct EventRecord for Event {
        /// Sequence number, increasing in generation order
        id: i64 = "id",
        timestamp: DateTime<Utc> = "timestamp",
        /// Class of the changed object
        class: String = "class",
        operation: EnumValue<EventOperation> = "operation",
        /// Reference of the changed object
        reference: String = "ref",
        obj_uuid: String = "obj_uuid",
        /// Record of the object after the change. Absent for deletions.
        snapshot: Option<WireValue> = "snapshot",
    }
}

impl EventRecord {
    /// The changed object, with its class known only at runtime.
    pub fn object(&self) -> AnyRef {
        AnyRef::new(self.class.clone(), self.reference.clone())
    }

    /// The changed object as a typed handle, if it is of class `C`.
    pub fn object_ref<C: ApiClass>(&self) -> Option<Ref<C>> {
        self.object().downcast()
    }

    pub fn is(&self, operation: EventOperation) -> bool {
        self.operation.is(operation)
    }

    /// Decode the snapshot as the record type of the changed class.
    ///
    /// Returns `None` when the event carries no snapshot.
    pub fn snapshot_as<R: Record>(&self) -> Option<CodecResult<R>> {
        self.snapshot.as_ref().map(R::decode_record)
    }
}

/// Opaque position in the server's event history.
///
/// Tokens are only meaningful to the server that issued them. They are not
/// `Ord`: whether string order matches generation order is server specific,
/// so callers that know it does must say so with
/// [`EventToken::cmp_lexicographic`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct EventToken(String);

impl EventToken {
    /// The empty token: start of retained history.
    pub fn beginning() -> Self {
        Self(String::new())
    }

    /// Wrap a token previously returned by the server (e.g. one persisted
    /// across restarts).
    pub fn from_server(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_beginning(&self) -> bool {
        self.0.is_empty()
    }

    /// Compare as plain strings. Only valid for servers whose tokens are
    /// documented to sort in generation order.
    pub fn cmp_lexicographic(&self, other: &EventToken) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl fmt::Display for EventToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "<beginning>")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl ToWire for EventToken {
    fn to_wire_raw(&self) -> WireValue {
        WireValue::String(self.0.clone())
    }
}

impl FromWire for EventToken {
    fn from_wire(value: &WireValue) -> CodecResult<Self> {
        String::from_wire(value).map(EventToken)
    }
}

/// Result of one [`Event::from`] call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventBatch {
    /// Token to pass to the next call
    pub token: EventToken,
    /// Live object count per class, for spotting objects created and
    /// destroyed between two polls
    pub valid_ref_counts: BTreeMap<String, i64>,
    /// Events in generation order
    pub events: Vec<EventRecord>,
}

impl EventBatch {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl FromWire for EventBatch {
    fn from_wire(value: &WireValue) -> CodecResult<Self> {
        let fields = value
            .as_struct()
            .ok_or_else(|| CodecError::shape("struct", value))?;

        fn member<T: FromWire + Default>(
            fields: &BTreeMap<String, WireValue>,
            name: &str,
        ) -> CodecResult<T> {
            match fields.get(name) {
                Some(raw) if !raw.is_nil() => T::from_wire(raw).map_err(|e| e.in_field(name)),
                _ => Ok(T::default()),
            }
        }

        Ok(EventBatch {
            token: member(fields, "token")?,
            valid_ref_counts: member(fields, "valid_ref_counts")?,
            events: member(fields, "events")?,
        })
    }
}

impl ToWire for EventBatch {
    fn to_wire_raw(&self) -> WireValue {
        WireValue::structure([
            ("token", self.token.to_wire_raw()),
            ("valid_ref_counts", self.valid_ref_counts.to_wire_raw()),
            ("events", self.events.to_wire_raw()),
        ])
    }
}

// =============================================================================
// Event calls
// =============================================================================

impl Event {
    /// Add classes to this session's server-side subscription.
    #[deprecated(note = "use Event::from with a client-held token")]
    pub fn register(classes: &BTreeSet<String>) -> Action<()> {
        Action::new(method_name::<Event>("register")).arg(classes)
    }

    /// Remove classes from this session's server-side subscription.
    #[deprecated(note = "use Event::from with a client-held token")]
    pub fn unregister(classes: &BTreeSet<String>) -> Action<()> {
        Action::new(method_name::<Event>("unregister")).arg(classes)
    }

    /// Block until events matching the subscription are available.
    ///
    /// Fails with [`XenApiError::SessionNotRegistered`] without a prior
    /// `register`, and with [`XenApiError::EventsLost`] on overflow.
    #[deprecated(note = "use Event::from with a client-held token")]
    pub fn next() -> Call<Vec<EventRecord>> {
        Call::new(method_name::<Event>("next"))
    }

    /// Long-poll for events on `classes` after `token`, waiting at most
    /// `timeout_secs`.
    pub fn from(classes: &BTreeSet<String>, token: &EventToken, timeout_secs: f64) -> Call<EventBatch> {
        Call::new(method_name::<Event>("from"))
            .arg(classes)
            .arg(token)
            .arg(&timeout_secs)
    }

    /// Id the next generated event will get.
    pub fn get_current_id() -> Call<i64> {
        Call::new(method_name::<Event>("get_current_id"))
    }

    /// Generate a synthetic `mod` event for an existing object and return
    /// its token.
    pub fn inject(class: &str, reference: &str) -> Call<EventToken> {
        Call::new(method_name::<Event>("inject")).arg(class).arg(reference)
    }

    /// [`Event::inject`] for a typed handle.
    pub fn inject_ref<C: ApiClass>(object: &Ref<C>) -> Call<EventToken> {
        Self::inject(C::NAME, object.as_wire_str())
    }
}

/// Build a subscription set from class names.
pub fn subscription<I, S>(classes: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    classes.into_iter().map(Into::into).collect()
}

// =============================================================================
// Poller
// =============================================================================

/// Client-side cursor over [`Event::from`].
///
/// Keeps the continuation token between calls and checks that event ids keep
/// increasing across batches. After [`XenApiError::EventsLost`] the cursor
/// goes back to the beginning; the caller must resync before trusting any
/// cached state.
#[derive(Debug, Clone)]
pub struct EventPoller {
    session: Session,
    classes: BTreeSet<String>,
    token: EventToken,
    timeout_secs: f64,
    last_id: Option<i64>,
}

impl EventPoller {
    pub fn new<I, S>(session: Session, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            session,
            classes: subscription(classes),
            token: EventToken::beginning(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            last_id: None,
        }
    }

    pub fn with_timeout(mut self, timeout_secs: f64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Resume from a token saved earlier.
    pub fn starting_at(mut self, token: EventToken) -> Self {
        self.token = token;
        self
    }

    pub fn token(&self) -> &EventToken {
        &self.token
    }

    pub fn classes(&self) -> &BTreeSet<String> {
        &self.classes
    }

    /// Forget the token and start again from the beginning.
    pub fn reset(&mut self) {
        self.token = EventToken::beginning();
        self.last_id = None;
    }

    /// Fetch the next batch and advance the token.
    #[instrument(skip(self), fields(token = %self.token))]
    pub async fn poll(&mut self) -> Result<EventBatch> {
        let call = Event::from(&self.classes, &self.token, self.timeout_secs);
        let batch = match call.invoke(&self.session).await {
            Ok(batch) => batch,
            Err(e @ XenApiError::EventsLost { .. }) => {
                warn!("Event history overflowed, restarting from the beginning");
                self.reset();
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let mut previous = self.last_id;
        for event in &batch.events {
            if let Some(prev) = previous {
                if event.id <= prev {
                    return Err(XenApiError::BadServerResponse(format!(
                        "Event id {} after {} is not increasing",
                        event.id, prev
                    )));
                }
            }
            previous = Some(event.id);
        }

        debug!(
            events = batch.events.len(),
            next_token = %batch.token,
            "Event batch received"
        );
        self.last_id = previous;
        self.token = batch.token.clone();
        Ok(batch)
    }

    /// Turn the poller into an endless stream of batches. The stream ends
    /// after yielding the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<EventBatch>> {
        stream::try_unfold(self, |mut poller| async move {
            let batch = poller.poll().await?;
            Ok(Some((batch, poller)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::vm::{Vm, VmRecord};

    fn event_wire(id: i64, operation: &str, snapshot: Option<WireValue>) -> WireValue {
        let mut members = vec![
            ("id", WireValue::from(id.to_string())),
            ("timestamp", WireValue::from("20240131T08:15:00Z")),
            ("class", WireValue::from("VM")),
            ("operation", WireValue::from(operation)),
            ("ref", WireValue::from("OpaqueRef:vm1")),
            ("obj_uuid", WireValue::from("0f9c")),
        ];
        if let Some(snapshot) = snapshot {
            members.push(("snapshot", snapshot));
        }
        WireValue::structure(members)
    }

    #[test]
    fn test_event_record_decode() {
        let snapshot = WireValue::structure([("name_label", WireValue::from("web-01"))]);
        let event = EventRecord::from_wire(&event_wire(7, "add", Some(snapshot))).unwrap();

        assert_eq!(event.id, 7);
        assert!(event.is(EventOperation::Add));
        assert_eq!(event.object_ref::<Vm>().unwrap().as_wire_str(), "OpaqueRef:vm1");

        let record: VmRecord = event.snapshot_as().unwrap().unwrap();
        assert_eq!(record.name_label, "web-01");
    }

    #[test]
    fn test_delete_has_no_snapshot() {
        let event = EventRecord::from_wire(&event_wire(8, "del", None)).unwrap();
        assert!(event.snapshot.is_none());
        assert!(event.snapshot_as::<VmRecord>().is_none());
        assert!(event.is_defaulted("snapshot"));
    }

    #[test]
    fn test_unknown_operation_survives() {
        let event = EventRecord::from_wire(&event_wire(9, "teleport", None)).unwrap();
        assert_eq!(event.operation.as_raw(), "teleport");
        assert!(event.operation.is_unrecognized());
    }

    #[test]
    fn test_batch_decode() {
        let wire = WireValue::structure([
            ("token", WireValue::from("0000000000000009")),
            (
                "valid_ref_counts",
                WireValue::structure([("VM", WireValue::from("3"))]),
            ),
            ("events", WireValue::Array(vec![event_wire(9, "mod", None)])),
        ]);
        let batch = EventBatch::from_wire(&wire).unwrap();

        assert_eq!(batch.token.as_str(), "0000000000000009");
        assert_eq!(batch.valid_ref_counts.get("VM"), Some(&3));
        assert_eq!(batch.events.len(), 1);
    }

    #[test]
    fn test_from_arguments() {
        let call = Event::from(&subscription(["VM", "host"]), &EventToken::beginning(), 30.0);
        assert_eq!(call.method(), "event.from");
        assert_eq!(
            call.args(),
            &[
                WireValue::Array(vec!["VM".into(), "host".into()]),
                WireValue::from(""),
                WireValue::Double(30.0)
            ]
        );
    }

    #[test]
    fn test_token_ordering_is_explicit() {
        let a = EventToken::from_server("0000000000000002");
        let b = EventToken::from_server("0000000000000010");
        assert_eq!(a.cmp_lexicographic(&b), Ordering::Less);
        assert!(EventToken::beginning().is_beginning());
    }
}
