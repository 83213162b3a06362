//! Event watcher - keeps a local view of live objects from the event stream.
//!
//! - Long-polls `event.from` through an [`EventPoller`]
//! - Tracks the live references of every watched class
//! - Cross-checks its counts against `valid_ref_counts` and re-reads a class
//!   when they disagree (deletions it never saw)
//! - On `EVENTS_LOST`, drops everything and rebuilds from a full read

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};

use xenlink_client::event::{EventPoller, EventRecord, WILDCARD};
use xenlink_client::{EventOperation, Result, Session, XenApiError};

use crate::config::WatchConfig;

/// Pause before polling again after a transport failure.
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Change to the local view of one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectChange {
    /// Object appeared
    Created { class: String, reference: String },
    /// Object modified (or re-announced)
    Updated { class: String, reference: String },
    /// Object removed
    Deleted { class: String, reference: String },
}

impl ObjectChange {
    pub fn reference(&self) -> &str {
        match self {
            ObjectChange::Created { reference, .. }
            | ObjectChange::Updated { reference, .. }
            | ObjectChange::Deleted { reference, .. } => reference,
        }
    }
}

/// Live references per class. Class names are compared case-insensitively.
#[derive(Debug, Default)]
pub struct ObjectCache {
    live: BTreeMap<String, BTreeSet<String>>,
}

impl ObjectCache {
    fn key(class: &str) -> String {
        class.to_ascii_lowercase()
    }

    pub fn apply(&mut self, event: &EventRecord) -> Option<ObjectChange> {
        let refs = self.live.entry(Self::key(&event.class)).or_default();
        let class = event.class.clone();
        let reference = event.reference.clone();

        match event.operation.known() {
            Some(EventOperation::Add) | Some(EventOperation::Mod) => {
                if refs.insert(reference.clone()) && event.is(EventOperation::Add) {
                    Some(ObjectChange::Created { class, reference })
                } else {
                    Some(ObjectChange::Updated { class, reference })
                }
            }
            Some(EventOperation::Del) => {
                refs.remove(&reference);
                Some(ObjectChange::Deleted { class, reference })
            }
            None => {
                debug!(operation = %event.operation, "Ignoring event with unknown operation");
                None
            }
        }
    }

    pub fn count(&self, class: &str) -> usize {
        self.live.get(&Self::key(class)).map_or(0, BTreeSet::len)
    }

    pub fn contains(&self, class: &str, reference: &str) -> bool {
        self.live
            .get(&Self::key(class))
            .is_some_and(|refs| refs.contains(reference))
    }

    pub fn replace_class(&mut self, class: &str, refs: BTreeSet<String>) {
        self.live.insert(Self::key(class), refs);
    }

    pub fn clear(&mut self) {
        self.live.clear();
    }

    /// Classes whose cached count differs from the server's.
    pub fn drift(&self, valid_ref_counts: &BTreeMap<String, i64>) -> Vec<String> {
        valid_ref_counts
            .iter()
            .filter(|(class, count)| self.count(class) as i64 != **count)
            .map(|(class, _)| class.clone())
            .collect()
    }
}

/// Counters reported on shutdown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchStats {
    pub batches: u64,
    pub changes: u64,
    pub resyncs: u64,
}

/// Follows the event stream of one session.
pub struct EventWatcher {
    session: Session,
    poller: EventPoller,
    cache: ObjectCache,
    stats: WatchStats,
}

impl EventWatcher {
    pub fn new(session: Session, config: &WatchConfig) -> Self {
        let poller = EventPoller::new(session.clone(), config.classes.iter().cloned())
            .with_timeout(config.timeout_secs);
        Self {
            session,
            poller,
            cache: ObjectCache::default(),
            stats: WatchStats::default(),
        }
    }

    pub fn cache(&self) -> &ObjectCache {
        &self.cache
    }

    pub fn stats(&self) -> &WatchStats {
        &self.stats
    }

    /// Rebuild the cache from a full read of every named class.
    #[instrument(skip(self))]
    pub async fn resync(&mut self) -> Result<()> {
        self.cache.clear();
        let classes: Vec<String> = self.poller.classes().iter().cloned().collect();
        for class in classes {
            if class == WILDCARD {
                debug!("Wildcard subscription, cache fills from events");
                continue;
            }
            self.resync_class(&class).await?;
        }
        self.stats.resyncs += 1;
        Ok(())
    }

    async fn resync_class(&mut self, class: &str) -> Result<()> {
        let refs: BTreeSet<String> = self
            .session
            .call(&format!("{}.get_all", class), Vec::new())
            .await?;
        info!(class = %class, objects = refs.len(), "Class resynchronized");
        self.cache.replace_class(class, refs);
        Ok(())
    }

    /// One long poll: apply the batch and return what changed.
    pub async fn step(&mut self) -> Result<Vec<ObjectChange>> {
        let batch = match self.poller.poll().await {
            Ok(batch) => batch,
            Err(XenApiError::EventsLost { .. }) => {
                warn!("Events lost, rebuilding object cache");
                self.resync().await?;
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };
        self.stats.batches += 1;

        let mut changes = Vec::with_capacity(batch.events.len());
        for event in &batch.events {
            if let Some(change) = self.cache.apply(event) {
                let name = event
                    .snapshot
                    .as_ref()
                    .and_then(|s| s.get("name_label"))
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                info!(
                    id = event.id,
                    class = %event.class,
                    operation = %event.operation,
                    reference = %event.reference,
                    name = %name,
                    "Object changed"
                );
                changes.push(change);
            }
        }

        for class in self.cache.drift(&batch.valid_ref_counts) {
            warn!(
                class = %class,
                cached = self.cache.count(&class),
                server = batch.valid_ref_counts.get(&class).copied().unwrap_or_default(),
                "Object count drifted, re-reading class"
            );
            self.resync_class(&class).await?;
        }

        self.stats.changes += changes.len() as u64;
        Ok(changes)
    }

    /// Watch until `shutdown` resolves or a non-transient error occurs.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<WatchStats>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        self.resync().await?;
        info!(classes = ?self.poller.classes(), "Watching for events");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                result = self.step() => {
                    match result {
                        Ok(_) => {}
                        Err(XenApiError::Transport(e)) => {
                            warn!(error = %e, retry_secs = RETRY_DELAY.as_secs(), "Poll failed, retrying");
                            tokio::time::sleep(RETRY_DELAY).await;
                        }
                        Err(e) => {
                            error!(error = %e, "Event watch failed");
                            return Err(e);
                        }
                    }
                }
            }
        }

        Ok(self.stats.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use xenlink_client::{MockServer, WireValue};

    async fn watcher(server: &Arc<MockServer>, classes: &[&str]) -> EventWatcher {
        watcher_with_timeout(server, classes, 0.0).await
    }

    async fn watcher_with_timeout(server: &Arc<MockServer>, classes: &[&str], timeout_secs: f64) -> EventWatcher {
        let session = Session::login_with_password(server.clone(), "root", "", "tests")
            .await
            .unwrap();
        let config = WatchConfig {
            classes: classes.iter().map(|c| c.to_string()).collect(),
            timeout_secs,
        };
        EventWatcher::new(session, &config)
    }

    fn no_fields() -> Vec<(String, WireValue)> {
        Vec::new()
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracks_lifecycle() {
        let server = Arc::new(MockServer::new());
        let mut watcher = watcher(&server, &["VM"]).await;
        watcher.resync().await.unwrap();

        let vm = server.create_object("VM", no_fields()).unwrap();
        server.set_field(&vm, "name_label", WireValue::from("web")).unwrap();
        let changes = watcher.step().await.unwrap();
        assert_eq!(
            changes,
            vec![
                ObjectChange::Created { class: "VM".into(), reference: vm.clone() },
                ObjectChange::Updated { class: "VM".into(), reference: vm.clone() },
            ]
        );
        assert!(watcher.cache().contains("vm", &vm));

        server.destroy_object(&vm).unwrap();
        let changes = watcher.step().await.unwrap();
        assert_eq!(changes[0].reference(), vm);
        assert_eq!(watcher.cache().count("VM"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resync_reads_existing_objects() {
        let server = Arc::new(MockServer::new());
        server.create_object("host", no_fields()).unwrap();
        server.create_object("host", no_fields()).unwrap();
        let mut watcher = watcher(&server, &["host"]).await;

        watcher.resync().await.unwrap();
        assert_eq!(watcher.cache().count("host"), 2);
        assert_eq!(watcher.stats().resyncs, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_lost_rebuilds_cache() {
        let server = Arc::new(MockServer::new().with_history_capacity(2));
        let mut watcher = watcher(&server, &["VM"]).await;
        server.create_object("VM", no_fields()).unwrap();
        watcher.step().await.unwrap();

        for _ in 0..3 {
            server.create_object("VM", no_fields()).unwrap();
        }
        let changes = watcher.step().await.unwrap();
        assert!(changes.is_empty());
        assert_eq!(watcher.cache().count("VM"), 4);
        assert_eq!(watcher.stats().resyncs, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let server = Arc::new(MockServer::new());
        let mut watcher = watcher_with_timeout(&server, &["VM"], 30.0).await;
        let stats = watcher
            .run(tokio::time::sleep(Duration::from_secs(1)))
            .await
            .unwrap();
        assert_eq!(stats.resyncs, 1);
    }

    #[test]
    fn test_drift_detects_unseen_deletions() {
        let mut cache = ObjectCache::default();
        cache.replace_class("VM", ["OpaqueRef:a", "OpaqueRef:b"].map(String::from).into());
        let counts = BTreeMap::from([("VM".to_string(), 1), ("host".to_string(), 0)]);
        assert_eq!(cache.drift(&counts), vec!["VM".to_string()]);
    }
}
