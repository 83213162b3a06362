//! In-memory server for tests and development.
//!
//! [`MockServer`] implements [`Transport`] directly, so a [`Session`] can be
//! opened against it without any network. It keeps a small object store,
//! answers the generic per-class calls for every class, simulates VM power
//! transitions, runs `Async.` calls as instantly finished tasks and
//! implements both event surfaces over a bounded history.
//!
//! [`Session`]: crate::session::Session

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{PoisonError, RwLock, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::codec::FromWire;
use crate::enums::WireEnum;
use crate::error::{FaultCode, Result, XenApiError, EVENTS_LOST, SESSION_NOT_REGISTERED};
use crate::event::WILDCARD;
use crate::handle::NULL_REF;
use crate::session::ASYNC_PREFIX;
use crate::transport::{Envelope, Transport};
use crate::wire::WireValue;

/// Events kept before the oldest ones are dropped.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// A call as received by the mock, session reference included.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: String,
    pub args: Vec<WireValue>,
}

/// Success value or fault description.
type Reply = std::result::Result<WireValue, Vec<String>>;

fn fault<I, S>(code: &str, params: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    std::iter::once(code.to_string())
        .chain(params.into_iter().map(Into::into))
        .collect()
}

fn new_ref() -> String {
    format!("OpaqueRef:{}", Uuid::new_v4())
}

fn token_for(id: u64) -> String {
    format!("{:016}", id)
}

fn subscribed(classes: &BTreeSet<String>, class: &str) -> bool {
    classes
        .iter()
        .any(|c| c == WILDCARD || c.eq_ignore_ascii_case(class))
}

struct MockObject {
    class: String,
    fields: BTreeMap<String, WireValue>,
}

impl MockObject {
    fn uuid(&self) -> String {
        self.fields
            .get("uuid")
            .and_then(WireValue::as_str)
            .unwrap_or_default()
            .to_string()
    }

    fn snapshot(&self) -> WireValue {
        WireValue::Struct(self.fields.clone())
    }

    fn str_field(&self, name: &str) -> &str {
        self.fields.get(name).and_then(WireValue::as_str).unwrap_or_default()
    }
}

struct StoredEvent {
    id: u64,
    timestamp: DateTime<Utc>,
    class: String,
    operation: &'static str,
    reference: String,
    obj_uuid: String,
    snapshot: Option<WireValue>,
}

impl StoredEvent {
    fn to_wire(&self) -> WireValue {
        let mut members = vec![
            ("id", WireValue::Int(self.id as i64)),
            ("timestamp", WireValue::DateTime(self.timestamp)),
            ("class", WireValue::from(self.class.as_str())),
            ("operation", WireValue::from(self.operation)),
            ("ref", WireValue::from(self.reference.as_str())),
            ("obj_uuid", WireValue::from(self.obj_uuid.as_str())),
        ];
        if let Some(snapshot) = &self.snapshot {
            members.push(("snapshot", snapshot.clone()));
        }
        WireValue::structure(members)
    }
}

/// Server-side subscription of the legacy event surface.
struct Subscription {
    classes: BTreeSet<String>,
    last_delivered: u64,
}

#[derive(Default)]
struct SessionState {
    subscription: Option<Subscription>,
}

struct State {
    users: HashMap<String, String>,
    sessions: HashMap<String, SessionState>,
    objects: BTreeMap<String, MockObject>,
    events: VecDeque<StoredEvent>,
    /// Id of the last generated event, 0 before the first one
    last_event_id: u64,
    history_capacity: usize,
    calls: Vec<RecordedCall>,
    failures: HashMap<String, Vec<String>>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            users: HashMap::new(),
            sessions: HashMap::new(),
            objects: BTreeMap::new(),
            events: VecDeque::new(),
            last_event_id: 0,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            calls: Vec::new(),
            failures: HashMap::new(),
        }
    }
}

/// In-memory API server.
///
/// Useful for:
/// - Unit and integration testing
/// - Development without a real pool
/// - Demo environments (`xenlink-watch --dev`)
pub struct MockServer {
    state: RwLock<State>,
    notify: Notify,
}

impl MockServer {
    /// Create an empty server. Without configured users any credentials are
    /// accepted.
    pub fn new() -> Self {
        info!("Creating mock API server");
        Self {
            state: RwLock::new(State::default()),
            notify: Notify::new(),
        }
    }

    /// Only accept this user (and any other added the same way).
    pub fn with_user(mut self, username: &str, password: &str) -> Self {
        self.state_mut()
            .users
            .insert(username.to_string(), password.to_string());
        self
    }

    /// Bound the event history. Sessions falling further behind get
    /// `EVENTS_LOST`.
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.state_mut().history_capacity = capacity.max(1);
        self
    }

    fn state_mut(&mut self) -> &mut State {
        self.state.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| XenApiError::Transport("Lock poisoned".to_string()))
    }

    // =========================================================================
    // Seeding and inspection
    // =========================================================================

    /// Insert an object and emit its `add` event. A `uuid` field is
    /// generated when missing. Returns the new reference.
    pub fn create_object<I, K>(&self, class: &str, fields: I) -> Result<String>
    where
        I: IntoIterator<Item = (K, WireValue)>,
        K: Into<String>,
    {
        let fields = fields.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let reference = self.lock()?.insert_object(class, fields);
        self.notify.notify_waiters();
        Ok(reference)
    }

    /// Overwrite one field and emit a `mod` event.
    pub fn set_field(&self, reference: &str, field: &str, value: WireValue) -> Result<()> {
        self.lock()?
            .update(reference, |object| {
                object.fields.insert(field.to_string(), value);
            })
            .map_err(XenApiError::from_description)?;
        self.notify.notify_waiters();
        Ok(())
    }

    /// Remove an object and emit its `del` event.
    pub fn destroy_object(&self, reference: &str) -> Result<()> {
        self.lock()?
            .remove_object(reference)
            .map_err(XenApiError::from_description)?;
        self.notify.notify_waiters();
        Ok(())
    }

    /// Current fields of an object.
    pub fn object(&self, reference: &str) -> Option<BTreeMap<String, WireValue>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.objects.get(reference).map(|o| o.fields.clone())
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.calls.clone()
    }

    pub fn clear_calls(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.calls.clear();
    }

    /// Make the next call to `method` (sync or async form) fail with the
    /// given fault description.
    pub fn fail_next(&self, method: &str, description: Vec<String>) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.failures.insert(method.to_string(), description);
    }

    pub fn session_count(&self) -> usize {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.sessions.len()
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    async fn dispatch(&self, method: &str, args: &[WireValue]) -> Result<Reply> {
        let (name, is_async) = match method.strip_prefix(ASYNC_PREFIX) {
            Some(name) => (name, true),
            None => (method, false),
        };
        let session = args
            .first()
            .and_then(WireValue::as_str)
            .unwrap_or_default()
            .to_string();
        let params = args.get(1..).unwrap_or_default();

        {
            let mut state = self.lock()?;
            if !state.sessions.contains_key(&session) {
                return Ok(Err(fault(FaultCode::SessionInvalid.as_str(), [session])));
            }
            if let Some(description) = state.failures.remove(name) {
                return Ok(Err(description));
            }
        }

        let reply = match name {
            "event.next" => self.event_next(&session).await?,
            "event.from" => self.event_from(&session, params).await?,
            _ => {
                let mut state = self.lock()?;
                state.handle(&session, name, params)
            }
        };

        let reply = if is_async {
            let mut state = self.lock()?;
            Ok(state.finish_task(name, reply))
        } else {
            reply
        };
        self.notify.notify_waiters();
        Ok(reply)
    }

    /// Legacy blocking read of the session's subscription.
    async fn event_next(&self, session: &str) -> Result<Reply> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock()?;
                let oldest = state.events.front().map(|e| e.id);
                let last_event_id = state.last_event_id;
                let Some(subscription) = state
                    .sessions
                    .get_mut(session)
                    .and_then(|s| s.subscription.as_mut())
                else {
                    return Ok(Err(fault(SESSION_NOT_REGISTERED, [session])));
                };

                if matches!(oldest, Some(oldest) if subscription.last_delivered + 1 < oldest) {
                    subscription.last_delivered = last_event_id;
                    return Ok(Err(fault::<_, String>(EVENTS_LOST, [])));
                }

                let after = subscription.last_delivered;
                let classes = subscription.classes.clone();
                let events: Vec<WireValue> = state
                    .events
                    .iter()
                    .filter(|e| e.id > after && subscribed(&classes, &e.class))
                    .map(StoredEvent::to_wire)
                    .collect();

                if !events.is_empty() {
                    if let Some(subscription) = state
                        .sessions
                        .get_mut(session)
                        .and_then(|s| s.subscription.as_mut())
                    {
                        subscription.last_delivered = last_event_id;
                    }
                    return Ok(Ok(WireValue::Array(events)));
                }
            }

            notified.await;
        }
    }

    /// Token based long poll.
    async fn event_from(&self, session: &str, params: &[WireValue]) -> Result<Reply> {
        let [classes, token, timeout] = params else {
            return Ok(Err(fault(
                FaultCode::MessageParameterCountMismatch.as_str(),
                ["event.from".to_string(), "3".to_string(), params.len().to_string()],
            )));
        };
        let Ok(classes) = BTreeSet::<String>::from_wire(classes) else {
            return Ok(Err(fault(
                FaultCode::EventSubscriptionParseFailure.as_str(),
                [classes.to_string()],
            )));
        };
        let token = token.as_str().unwrap_or_default().to_string();
        let after = if token.is_empty() {
            None
        } else {
            match token.parse::<u64>() {
                Ok(id) => Some(id),
                Err(_) => {
                    return Ok(Err(fault(
                        FaultCode::EventFromTokenParseFailure.as_str(),
                        [token],
                    )))
                }
            }
        };
        let timeout = f64::from_wire(timeout).unwrap_or(0.0);
        let deadline =
            Instant::now() + Duration::try_from_secs_f64(timeout).unwrap_or(Duration::ZERO);

        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = self.lock()?;
                if !state.sessions.contains_key(session) {
                    return Ok(Err(fault(FaultCode::SessionInvalid.as_str(), [session])));
                }
                match state.events_after(&classes, after) {
                    Err(description) => return Ok(Err(description)),
                    Ok(events) if !events.is_empty() => {
                        return Ok(Ok(state.batch(&classes, events)))
                    }
                    Ok(_) => {}
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                let state = self.lock()?;
                return Ok(Ok(state.batch(&classes, Vec::new())));
            }
        }
    }
}

impl Default for MockServer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockServer {
    #[instrument(skip_all, fields(method = %method))]
    async fn execute(&self, method: &str, args: Vec<WireValue>) -> Result<Envelope> {
        self.lock()?.calls.push(RecordedCall {
            method: method.to_string(),
            args: args.clone(),
        });

        let reply = if method == "session.login_with_password" {
            let mut state = self.lock()?;
            state.login(&args)
        } else {
            self.dispatch(method, &args).await?
        };

        Ok(match reply {
            Ok(value) => Envelope::Success(value),
            Err(description) => {
                debug!(fault = ?description, "Mock call failed");
                Envelope::Failure(description)
            }
        })
    }
}

// =============================================================================
// State handlers
// =============================================================================

impl State {
    fn login(&mut self, args: &[WireValue]) -> Reply {
        let username = args.first().and_then(WireValue::as_str).unwrap_or_default();
        let password = args.get(1).and_then(WireValue::as_str).unwrap_or_default();

        if !self.users.is_empty() && self.users.get(username).map(String::as_str) != Some(password) {
            return Err(fault(
                FaultCode::SessionAuthenticationFailed.as_str(),
                [username, "Authentication failure"],
            ));
        }

        let reference = new_ref();
        self.sessions.insert(reference.clone(), SessionState::default());
        debug!(username = %username, "Mock session opened");
        Ok(WireValue::String(reference))
    }

    fn handle(&mut self, session: &str, name: &str, params: &[WireValue]) -> Reply {
        match name {
            "session.logout" => {
                self.sessions.remove(session);
                Ok(WireValue::from(""))
            }
            "event.register" => self.register(session, params),
            "event.unregister" => self.unregister(session, params),
            "event.get_current_id" => Ok(WireValue::Int(self.last_event_id as i64 + 1)),
            "event.inject" => self.inject(params),
            _ => match name.split_once('.') {
                Some((class, operation)) => self.object_call(name, class, operation, params),
                None => Err(fault(FaultCode::MessageMethodUnknown.as_str(), [name])),
            },
        }
    }

    // -------------------------------------------------------------------------
    // Objects
    // -------------------------------------------------------------------------

    fn insert_object(&mut self, class: &str, mut fields: BTreeMap<String, WireValue>) -> String {
        let reference = new_ref();
        fields
            .entry("uuid".to_string())
            .or_insert_with(|| WireValue::String(Uuid::new_v4().to_string()));
        let object = MockObject {
            class: class.to_string(),
            fields,
        };
        let (uuid, snapshot) = (object.uuid(), object.snapshot());
        self.objects.insert(reference.clone(), object);
        self.emit(class, "add", &reference, uuid, Some(snapshot));
        reference
    }

    fn update<F>(&mut self, reference: &str, change: F) -> Reply
    where
        F: FnOnce(&mut MockObject),
    {
        let Some(object) = self.objects.get_mut(reference) else {
            return Err(fault(FaultCode::HandleInvalid.as_str(), ["", reference]));
        };
        change(object);
        let (class, uuid, snapshot) = (object.class.clone(), object.uuid(), object.snapshot());
        self.emit(&class, "mod", reference, uuid, Some(snapshot));
        Ok(WireValue::from(""))
    }

    fn remove_object(&mut self, reference: &str) -> Reply {
        let Some(object) = self.objects.remove(reference) else {
            return Err(fault(FaultCode::HandleInvalid.as_str(), ["", reference]));
        };
        self.emit(&object.class, "del", reference, object.uuid(), None);
        Ok(WireValue::from(""))
    }

    /// Resolve the first parameter as a handle of `class`.
    fn target<'a>(&'a self, class: &str, params: &[WireValue]) -> std::result::Result<(String, &'a MockObject), Vec<String>> {
        let reference = params.first().and_then(WireValue::as_str).unwrap_or_default();
        match self.objects.get(reference) {
            Some(object) if object.class.eq_ignore_ascii_case(class) => {
                Ok((reference.to_string(), object))
            }
            _ => Err(fault(FaultCode::HandleInvalid.as_str(), [class, reference])),
        }
    }

    fn object_call(&mut self, method: &str, class: &str, operation: &str, params: &[WireValue]) -> Reply {
        let of_class = |o: &&MockObject| o.class.eq_ignore_ascii_case(class);

        match operation {
            "get_all" => Ok(WireValue::Array(
                self.objects
                    .iter()
                    .filter(|(_, o)| of_class(o))
                    .map(|(r, _)| WireValue::from(r.as_str()))
                    .collect(),
            )),
            "get_all_records" => Ok(WireValue::Struct(
                self.objects
                    .iter()
                    .filter(|(_, o)| of_class(o))
                    .map(|(r, o)| (r.clone(), o.snapshot()))
                    .collect(),
            )),
            "get_record" => self.target(class, params).map(|(_, o)| o.snapshot()),
            "get_by_uuid" => {
                let uuid = params.first().and_then(WireValue::as_str).unwrap_or_default();
                self.objects
                    .iter()
                    .find(|(_, o)| of_class(o) && o.uuid() == uuid)
                    .map(|(r, _)| WireValue::from(r.as_str()))
                    .ok_or_else(|| fault(FaultCode::UuidInvalid.as_str(), [class, uuid]))
            }
            "get_by_name_label" => {
                let label = params.first().and_then(WireValue::as_str).unwrap_or_default();
                Ok(WireValue::Array(
                    self.objects
                        .iter()
                        .filter(|(_, o)| of_class(o) && o.str_field("name_label") == label)
                        .map(|(r, _)| WireValue::from(r.as_str()))
                        .collect(),
                ))
            }
            "create" => self.create(method, class, params),
            "destroy" => {
                let (reference, _) = self.target(class, params)?;
                self.remove_object(&reference)
            }
            "snapshot" | "clone" if class.eq_ignore_ascii_case("VM") => {
                self.copy_vm(operation == "snapshot", params)
            }
            "enable" | "disable" if class.eq_ignore_ascii_case("host") => {
                let (reference, _) = self.target(class, params)?;
                let enabled = operation == "enable";
                self.update(&reference, |o| {
                    o.fields.insert("enabled".to_string(), WireValue::Bool(enabled));
                })
            }
            "cancel" if class.eq_ignore_ascii_case("task") => {
                let (reference, task) = self.target(class, params)?;
                if task.str_field("status") != "pending" {
                    return Err(fault(
                        FaultCode::OperationNotAllowed.as_str(),
                        ["Task has already finished"],
                    ));
                }
                self.update(&reference, |o| {
                    o.fields.insert("status".to_string(), WireValue::from("cancelled"));
                })
            }
            _ if class.eq_ignore_ascii_case("VM") && VmTransition::for_operation(operation).is_some() => {
                self.vm_power(operation, params)
            }
            _ => self.field_call(method, class, operation, params),
        }
    }

    fn field_call(&mut self, method: &str, class: &str, operation: &str, params: &[WireValue]) -> Reply {
        let (reference, object) = self.target(class, params)?;

        if let Some(field) = operation.strip_prefix("get_") {
            return object
                .fields
                .get(field)
                .cloned()
                .ok_or_else(|| fault(FaultCode::MessageMethodUnknown.as_str(), [method]));
        }

        if let Some(field) = operation.strip_prefix("set_") {
            let value = params.get(1).cloned().unwrap_or(WireValue::Nil);
            return self.update(&reference, |o| {
                o.fields.insert(field.to_string(), value);
            });
        }

        let key = params.get(1).and_then(WireValue::as_str).unwrap_or_default().to_string();
        if let Some(field) = operation.strip_prefix("add_to_") {
            let value = params.get(2).cloned().unwrap_or(WireValue::Nil);
            return self.update(&reference, |o| {
                let entry = o
                    .fields
                    .entry(field.to_string())
                    .or_insert_with(|| WireValue::Struct(BTreeMap::new()));
                if let WireValue::Struct(map) = entry {
                    map.insert(key, value);
                }
            });
        }

        if let Some(field) = operation.strip_prefix("remove_from_") {
            return self.update(&reference, |o| {
                if let Some(WireValue::Struct(map)) = o.fields.get_mut(field) {
                    map.remove(&key);
                }
            });
        }

        Err(fault(FaultCode::MessageMethodUnknown.as_str(), [method]))
    }

    fn create(&mut self, method: &str, class: &str, params: &[WireValue]) -> Reply {
        let mut fields = match params {
            [WireValue::Struct(record)] => record.clone(),
            // VGPU.create takes its fields positionally
            [vm, group, device, other_config, rest @ ..] if class.eq_ignore_ascii_case("VGPU") => {
                let mut fields = BTreeMap::from([
                    ("VM".to_string(), vm.clone()),
                    ("GPU_group".to_string(), group.clone()),
                    ("device".to_string(), device.clone()),
                    ("other_config".to_string(), other_config.clone()),
                    ("currently_attached".to_string(), WireValue::Bool(false)),
                ]);
                if let Some(kind) = rest.first() {
                    fields.insert("type".to_string(), kind.clone());
                }
                fields
            }
            _ => {
                return Err(fault(
                    FaultCode::MessageParameterCountMismatch.as_str(),
                    [method.to_string(), "1".to_string(), params.len().to_string()],
                ))
            }
        };

        // The server always assigns identity and initial runtime state
        fields.insert("uuid".to_string(), WireValue::String(Uuid::new_v4().to_string()));
        if class.eq_ignore_ascii_case("VM") {
            fields.insert("power_state".to_string(), WireValue::from("Halted"));
            fields.insert("resident_on".to_string(), WireValue::from(NULL_REF));
        }

        let reference = self.insert_object(class, fields);
        Ok(WireValue::String(reference))
    }

    fn copy_vm(&mut self, is_snapshot: bool, params: &[WireValue]) -> Reply {
        let (source, vm) = self.target("VM", params)?;
        let name = params.get(1).and_then(WireValue::as_str).unwrap_or_default();

        let mut fields = vm.fields.clone();
        fields.remove("uuid");
        fields.insert("name_label".to_string(), WireValue::from(name));
        fields.insert("power_state".to_string(), WireValue::from("Halted"));
        fields.insert("resident_on".to_string(), WireValue::from(NULL_REF));
        fields.insert("is_a_snapshot".to_string(), WireValue::Bool(is_snapshot));
        let parent = if is_snapshot { source.as_str() } else { NULL_REF };
        fields.insert("snapshot_of".to_string(), WireValue::from(parent));

        Ok(WireValue::String(self.insert_object("VM", fields)))
    }

    fn vm_power(&mut self, operation: &str, params: &[WireValue]) -> Reply {
        let Some(transition) = VmTransition::for_operation(operation) else {
            return Err(fault(FaultCode::MessageMethodUnknown.as_str(), [format!("VM.{}", operation)]));
        };
        let (reference, vm) = self.target("VM", params)?;

        if transition.from.contains(&"Halted") && vm.fields.get("is_a_template") == Some(&WireValue::Bool(true)) {
            return Err(fault(FaultCode::VmIsTemplate.as_str(), [reference]));
        }

        let actual = vm.str_field("power_state").to_string();
        if !transition.from.iter().any(|state| *state == actual) {
            return Err(fault(
                FaultCode::VmBadPowerState.as_str(),
                [
                    reference,
                    transition.from[0].to_lowercase(),
                    actual.to_lowercase(),
                ],
            ));
        }

        // start, start_on and resume carry a start_paused flag after the target
        let paused_flag_at = if operation == "start_on" { 2 } else { 1 };
        let start_paused = transition.honours_start_paused
            && params.get(paused_flag_at) == Some(&WireValue::Bool(true));
        let target = if start_paused { "Paused" } else { transition.to };
        let resident_on = match (operation, target) {
            ("start_on", _) => params.get(1).cloned(),
            (_, "Halted") | (_, "Suspended") => Some(WireValue::from(NULL_REF)),
            _ => None,
        };

        self.update(&reference, |o| {
            o.fields.insert("power_state".to_string(), WireValue::from(target));
            if let Some(host) = resident_on {
                o.fields.insert("resident_on".to_string(), host);
            }
        })
    }

    // -------------------------------------------------------------------------
    // Tasks
    // -------------------------------------------------------------------------

    /// Record the outcome of an `Async.` call as a finished task.
    fn finish_task(&mut self, name: &str, reply: Reply) -> WireValue {
        let (status, result, error_info) = match reply {
            Ok(WireValue::String(s)) => ("success", s, Vec::new()),
            Ok(other) => ("success", other.to_string(), Vec::new()),
            Err(description) => ("failure", String::new(), description),
        };
        let now = Utc::now();
        let fields = BTreeMap::from([
            ("name_label".to_string(), WireValue::String(format!("{}{}", ASYNC_PREFIX, name))),
            ("name_description".to_string(), WireValue::from("")),
            ("created".to_string(), WireValue::DateTime(now)),
            ("finished".to_string(), WireValue::DateTime(now)),
            ("status".to_string(), WireValue::from(status)),
            ("resident_on".to_string(), WireValue::from(NULL_REF)),
            ("progress".to_string(), WireValue::Double(1.0)),
            ("result".to_string(), WireValue::String(result)),
            (
                "error_info".to_string(),
                WireValue::Array(error_info.into_iter().map(WireValue::String).collect()),
            ),
            ("other_config".to_string(), WireValue::Struct(BTreeMap::new())),
            ("subtask_of".to_string(), WireValue::from(NULL_REF)),
        ]);
        WireValue::String(self.insert_object("task", fields))
    }

    // -------------------------------------------------------------------------
    // Events
    // -------------------------------------------------------------------------

    fn emit(&mut self, class: &str, operation: &'static str, reference: &str, obj_uuid: String, snapshot: Option<WireValue>) {
        self.last_event_id += 1;
        self.events.push_back(StoredEvent {
            id: self.last_event_id,
            timestamp: Utc::now(),
            class: class.to_string(),
            operation,
            reference: reference.to_string(),
            obj_uuid,
            snapshot,
        });
        while self.events.len() > self.history_capacity {
            self.events.pop_front();
        }
    }

    fn register(&mut self, session: &str, params: &[WireValue]) -> Reply {
        let classes = parse_classes(params)?;
        let last_event_id = self.last_event_id;
        let state = self.sessions.entry(session.to_string()).or_default();
        state
            .subscription
            .get_or_insert_with(|| Subscription {
                classes: BTreeSet::new(),
                last_delivered: last_event_id,
            })
            .classes
            .extend(classes);
        Ok(WireValue::from(""))
    }

    fn unregister(&mut self, session: &str, params: &[WireValue]) -> Reply {
        let classes = parse_classes(params)?;
        if let Some(subscription) = self
            .sessions
            .get_mut(session)
            .and_then(|s| s.subscription.as_mut())
        {
            subscription.classes.retain(|c| !classes.contains(c));
        }
        Ok(WireValue::from(""))
    }

    fn inject(&mut self, params: &[WireValue]) -> Reply {
        let class = params.first().and_then(WireValue::as_str).unwrap_or_default();
        let (reference, _) = self.target(class, params.get(1..).unwrap_or_default())?;
        self.update(&reference, |_| {})?;
        Ok(WireValue::String(token_for(self.last_event_id)))
    }

    /// Retained events after `after` (everything retained for `None`).
    /// Tokens past the newest event were never issued and are refused.
    fn events_after(
        &self,
        classes: &BTreeSet<String>,
        after: Option<u64>,
    ) -> std::result::Result<Vec<WireValue>, Vec<String>> {
        if let Some(after) = after.filter(|after| *after > self.last_event_id) {
            return Err(fault(
                FaultCode::EventFromTokenParseFailure.as_str(),
                [token_for(after)],
            ));
        }
        if let (Some(after), Some(oldest)) = (after, self.events.front()) {
            if after + 1 < oldest.id {
                return Err(fault(EVENTS_LOST, [token_for(after)]));
            }
        }
        let after = after.unwrap_or(0);
        Ok(self
            .events
            .iter()
            .filter(|e| e.id > after && subscribed(classes, &e.class))
            .map(StoredEvent::to_wire)
            .collect())
    }

    fn batch(&self, classes: &BTreeSet<String>, events: Vec<WireValue>) -> WireValue {
        let mut counts: BTreeMap<String, WireValue> = BTreeMap::new();
        for object in self.objects.values().filter(|o| subscribed(classes, &o.class)) {
            let count = counts
                .entry(object.class.clone())
                .or_insert(WireValue::Int(0));
            if let WireValue::Int(n) = count {
                *n += 1;
            }
        }
        let token = token_for(self.last_event_id);
        WireValue::structure([
            ("events", WireValue::Array(events)),
            ("valid_ref_counts", WireValue::Struct(counts)),
            ("token", WireValue::String(token)),
        ])
    }
}

fn parse_classes(params: &[WireValue]) -> std::result::Result<BTreeSet<String>, Vec<String>> {
    params
        .first()
        .and_then(|p| BTreeSet::<String>::from_wire(p).ok())
        .ok_or_else(|| fault::<_, String>(FaultCode::EventSubscriptionParseFailure.as_str(), []))
}

/// Allowed VM power transition for one operation.
struct VmTransition {
    from: &'static [&'static str],
    to: &'static str,
    honours_start_paused: bool,
}

impl VmTransition {
    fn for_operation(operation: &str) -> Option<Self> {
        let (from, to, honours_start_paused): (&'static [&'static str], &'static str, bool) = match operation {
            "start" | "start_on" => (&["Halted"], "Running", true),
            "clean_shutdown" => (&["Running"], "Halted", false),
            "hard_shutdown" => (&["Running", "Paused", "Suspended"], "Halted", false),
            "clean_reboot" | "hard_reboot" => (&["Running"], "Running", false),
            "pause" => (&["Running"], "Paused", false),
            "unpause" => (&["Paused"], "Running", false),
            "suspend" => (&["Running"], "Suspended", false),
            "resume" => (&["Suspended"], "Running", true),
            _ => return None,
        };
        Some(Self {
            from,
            to,
            honours_start_paused,
        })
    }
}
