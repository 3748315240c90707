//! Reconciliation of the known service table against the controller.

use crate::error::{SyncError, SyncResult};
use crate::queue::EventSender;
use crate::transport::ControllerTransport;
use ctlsync_protocol::{ChangeEvent, ServiceCredential, ServiceEndpoint, ServiceKey};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A service the engine has seen and obtained credentials for.
///
/// The credential is set once, when the record is created. Only the
/// annotations are refreshed in place afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    endpoint: ServiceEndpoint,
    credential: ServiceCredential,
}

impl ServiceRecord {
    fn new(endpoint: ServiceEndpoint, credential: ServiceCredential) -> Self {
        Self {
            endpoint,
            credential,
        }
    }

    /// Returns the endpoint as last reported.
    pub fn endpoint(&self) -> &ServiceEndpoint {
        &self.endpoint
    }

    /// Returns the credential issued when the service was discovered.
    pub fn credential(&self) -> &ServiceCredential {
        &self.credential
    }

    fn update_event(&self) -> ChangeEvent {
        ChangeEvent::update(&self.endpoint, &self.credential)
    }

    fn delete_event(&self) -> ChangeEvent {
        ChangeEvent::delete(&self.endpoint)
    }
}

/// Statistics about reconcile cycles.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Cycles that ran to completion.
    pub cycles_completed: u64,
    /// Cycles aborted by a remote failure.
    pub cycles_failed: u64,
    /// Events accepted by the queue, including those of failed cycles.
    pub events_emitted: u64,
    /// Services known at the end of the last cycle, failed or not.
    pub services_tracked: usize,
    /// Completion time of the last successful cycle.
    pub last_sync_time: Option<Instant>,
    /// Message of the last failure, cleared by a successful cycle.
    pub last_error: Option<String>,
}

/// Health and statistics shared between the worker and its observers.
///
/// Only the worker writes. Readers see the value of the last completed write.
#[derive(Debug)]
pub struct SyncMonitor {
    health: RwLock<Option<SyncError>>,
    stats: RwLock<SyncStats>,
}

impl SyncMonitor {
    /// Creates a monitor that reports "not yet synced".
    pub fn new() -> Self {
        Self {
            health: RwLock::new(Some(SyncError::NotYetSynced)),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Returns the outcome of the most recent reconcile attempt.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt, or
    /// [`SyncError::NotYetSynced`] before the first attempt has finished.
    pub fn check(&self) -> SyncResult<()> {
        match &*self.health.read() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Returns a snapshot of the statistics.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    fn set_healthy(&self) {
        *self.health.write() = None;
    }

    fn record_failure(&self, error: &SyncError, services_tracked: usize) {
        *self.health.write() = Some(error.clone());
        let mut stats = self.stats.write();
        stats.cycles_failed += 1;
        stats.services_tracked = services_tracked;
        stats.last_error = Some(error.to_string());
    }

    fn record_emitted(&self) {
        self.stats.write().events_emitted += 1;
    }

    fn record_success(&self, services_tracked: usize) {
        let mut stats = self.stats.write();
        stats.cycles_completed += 1;
        stats.services_tracked = services_tracked;
        stats.last_sync_time = Some(Instant::now());
        stats.last_error = None;
    }
}

impl Default for SyncMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a reconcile cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Services discovered and issued credentials.
    pub added: usize,
    /// Known services whose annotations changed.
    pub updated: usize,
    /// Services no longer reported.
    pub deleted: usize,
    /// Duration of the cycle.
    pub duration: Duration,
}

impl CycleSummary {
    /// Returns the number of events the cycle produced.
    pub fn events(&self) -> usize {
        self.added + self.updated + self.deleted
    }
}

/// Keeps the known service table in line with the controller.
///
/// The table is owned exclusively by the reconciler; nothing else reads or
/// writes it.
pub struct Reconciler<T: ControllerTransport> {
    transport: T,
    service_types: Vec<String>,
    services: BTreeMap<ServiceKey, ServiceRecord>,
    monitor: Arc<SyncMonitor>,
}

impl<T: ControllerTransport> Reconciler<T> {
    /// Creates a reconciler tracking services of the given types.
    pub fn new(transport: T, service_types: Vec<String>, monitor: Arc<SyncMonitor>) -> Self {
        Self {
            transport,
            service_types,
            services: BTreeMap::new(),
            monitor,
        }
    }

    /// Returns the shared monitor.
    pub fn monitor(&self) -> &Arc<SyncMonitor> {
        &self.monitor
    }

    /// Returns the tracked service types.
    pub fn service_types(&self) -> &[String] {
        &self.service_types
    }

    /// Returns the number of known services.
    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    /// Returns a known service.
    pub fn service(&self, key: &ServiceKey) -> Option<&ServiceRecord> {
        self.services.get(key)
    }

    /// Runs one poll-diff-publish cycle.
    ///
    /// New services get their credential exchanged and an `update` event;
    /// known services get an `update` event only when their annotations
    /// changed; services no longer listed get a `delete` event and are
    /// forgotten. Additions and updates are emitted before deletions.
    ///
    /// A failed listing leaves the table untouched. A failed credential
    /// exchange ends the cycle at that service: later additions and all
    /// deletions wait for the next cycle.
    ///
    /// # Errors
    ///
    /// Returns the remote failure that aborted the cycle; it is also
    /// recorded as the current health status.
    pub async fn reconcile(&mut self, events: &EventSender) -> SyncResult<CycleSummary> {
        let start = Instant::now();

        let listed = match self.transport.list_endpoints(&self.service_types).await {
            Ok(listed) => listed,
            Err(e) => {
                warn!(error = %e, "unable to list services from controller");
                self.monitor.record_failure(&e, self.services.len());
                return Err(e);
            }
        };
        self.monitor.set_healthy();

        let mut summary = CycleSummary::default();

        for (key, fetched) in &listed {
            if let Some(known) = self.services.get_mut(key) {
                if known.endpoint.annotations != fetched.annotations {
                    known.endpoint.annotations = fetched.annotations.clone();
                    debug!(service = %key, "annotations changed");
                    emit(events, &self.monitor, known.update_event()).await;
                    summary.updated += 1;
                }
                continue;
            }

            let credential = match self.transport.fetch_credential(fetched).await {
                Ok(credential) => credential,
                Err(e) => {
                    warn!(service = %key, error = %e, "unable to fetch service credentials from controller");
                    self.monitor.record_failure(&e, self.services.len());
                    return Err(e);
                }
            };
            let record = ServiceRecord::new(fetched.clone(), credential);
            info!(service = %key, "service added");
            emit(events, &self.monitor, record.update_event()).await;
            self.services.insert(key.clone(), record);
            summary.added += 1;
        }

        let gone: Vec<ServiceKey> = self
            .services
            .keys()
            .filter(|key| !listed.contains_key(*key))
            .cloned()
            .collect();
        for key in gone {
            if let Some(record) = self.services.remove(&key) {
                info!(service = %key, "service removed");
                emit(events, &self.monitor, record.delete_event()).await;
                summary.deleted += 1;
            }
        }

        summary.duration = start.elapsed();
        self.monitor.record_success(self.services.len());
        Ok(summary)
    }
}

async fn emit(events: &EventSender, monitor: &SyncMonitor, event: ChangeEvent) {
    if events.push(event).await {
        monitor.record_emitted();
    } else {
        debug!("event receiver dropped, change not delivered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{event_queue, EventReceiver, EVENT_QUEUE_CAPACITY};
    use crate::transport::MockTransport;
    use ctlsync_protocol::Operation;

    fn argo(agent: &str) -> ServiceEndpoint {
        ServiceEndpoint::new(agent, "argo", "argocd")
    }

    fn setup() -> (Arc<MockTransport>, Reconciler<Arc<MockTransport>>, EventSender, EventReceiver) {
        let transport = Arc::new(MockTransport::new());
        let reconciler = Reconciler::new(
            Arc::clone(&transport),
            vec!["argocd".to_string()],
            Arc::new(SyncMonitor::new()),
        );
        let (tx, rx) = event_queue(EVENT_QUEUE_CAPACITY);
        (transport, reconciler, tx, rx)
    }

    #[test]
    fn monitor_initial_state() {
        let monitor = SyncMonitor::new();
        assert_eq!(monitor.check(), Err(SyncError::NotYetSynced));
        assert_eq!(monitor.stats().cycles_completed, 0);
    }

    #[tokio::test]
    async fn new_services_are_added() {
        let (transport, mut reconciler, tx, mut rx) = setup();
        transport.set_endpoints([argo("a"), argo("b")]);

        let summary = reconciler.reconcile(&tx).await.unwrap();
        assert_eq!(summary.added, 2);
        assert_eq!(reconciler.service_count(), 2);

        let events = rx.drain_ready();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.operation == Operation::Update));
        assert_eq!(events[0].agent_name, "a");
        assert_eq!(events[0].token, MockTransport::default_credential(&argo("a")).token);
        assert_eq!(reconciler.monitor().check(), Ok(()));
    }

    #[tokio::test]
    async fn unchanged_services_emit_nothing() {
        let (transport, mut reconciler, tx, mut rx) = setup();
        transport.set_endpoints([argo("a")]);
        reconciler.reconcile(&tx).await.unwrap();
        rx.drain_ready();

        let summary = reconciler.reconcile(&tx).await.unwrap();
        assert_eq!(summary.events(), 0);
        assert!(rx.drain_ready().is_empty());
        assert_eq!(transport.credential_requests().len(), 1);
    }

    #[tokio::test]
    async fn removed_services_are_deleted() {
        let (transport, mut reconciler, tx, mut rx) = setup();
        transport.set_endpoints([argo("a")]);
        reconciler.reconcile(&tx).await.unwrap();
        rx.drain_ready();

        transport.set_endpoints([]);
        let summary = reconciler.reconcile(&tx).await.unwrap();
        assert_eq!(summary.deleted, 1);
        assert_eq!(reconciler.service_count(), 0);

        let events = rx.drain_ready();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0], ChangeEvent::delete(&argo("a")));
    }

    #[tokio::test]
    async fn annotation_change_reuses_credential() {
        let (transport, mut reconciler, tx, mut rx) = setup();
        transport.set_endpoints([argo("a")]);
        transport.set_credential(argo("a").key(), ServiceCredential::new("https://x", "tok"));
        reconciler.reconcile(&tx).await.unwrap();
        rx.drain_ready();

        transport.set_endpoints([argo("a").with_annotation("team", "blue")]);
        let summary = reconciler.reconcile(&tx).await.unwrap();
        assert_eq!(summary.updated, 1);

        let events = rx.drain_ready();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].operation, Operation::Update);
        assert_eq!(events[0].url, "https://x");
        assert_eq!(events[0].token, "tok");
        assert_eq!(events[0].annotations.get("team").map(String::as_str), Some("blue"));
        assert_eq!(transport.credential_requests().len(), 1);

        let record = reconciler.service(&argo("a").key()).unwrap();
        assert_eq!(record.credential().token, "tok");
        assert_eq!(record.endpoint().annotations.len(), 1);
    }

    #[tokio::test]
    async fn credential_failure_aborts_cycle() {
        let (transport, mut reconciler, tx, mut rx) = setup();
        transport.set_endpoints([argo("a"), argo("gone")]);
        reconciler.reconcile(&tx).await.unwrap();
        rx.drain_ready();

        // "b" fails, "c" sorts after it and "gone" disappears.
        transport.set_endpoints([argo("a"), argo("b"), argo("c")]);
        let failure = SyncError::remote_status("fetching service credentials", 500);
        transport.fail_credential(argo("b").key(), failure.clone());

        let err = reconciler.reconcile(&tx).await.unwrap_err();
        assert_eq!(err, failure);
        assert_eq!(reconciler.monitor().check(), Err(failure));
        assert!(rx.drain_ready().is_empty());
        assert_eq!(reconciler.service_count(), 2);
        assert!(reconciler.service(&argo("gone").key()).is_some());
        assert!(reconciler.service(&argo("c").key()).is_none());

        // The next cycle picks everything up.
        transport.reset_credential(&argo("b").key());
        let summary = reconciler.reconcile(&tx).await.unwrap();
        assert_eq!((summary.added, summary.deleted), (2, 1));
        assert_eq!(reconciler.monitor().check(), Ok(()));

        let ops: Vec<Operation> = rx.drain_ready().into_iter().map(|e| e.operation).collect();
        assert_eq!(ops, vec![Operation::Update, Operation::Update, Operation::Delete]);
    }

    #[tokio::test]
    async fn partial_cycle_counts_delivered_events() {
        let (transport, mut reconciler, tx, mut rx) = setup();
        transport.set_endpoints([argo("a"), argo("b")]);
        transport.fail_credential(argo("b").key(), SyncError::remote("credentials unavailable"));

        assert!(reconciler.reconcile(&tx).await.is_err());
        let delivered = rx.drain_ready().len();
        assert_eq!(delivered, 1);
        assert_eq!(reconciler.service_count(), 1);

        let stats = reconciler.monitor().stats();
        assert_eq!(stats.events_emitted, delivered as u64);
        assert_eq!(stats.services_tracked, reconciler.service_count());
        assert_eq!((stats.cycles_completed, stats.cycles_failed), (0, 1));
    }

    #[tokio::test]
    async fn undelivered_events_are_not_counted() {
        let (transport, mut reconciler, tx, rx) = setup();
        drop(rx);
        transport.set_endpoints([argo("a")]);
        reconciler.reconcile(&tx).await.unwrap();

        let stats = reconciler.monitor().stats();
        assert_eq!(stats.events_emitted, 0);
        assert_eq!(stats.services_tracked, 1);
    }

    #[tokio::test]
    async fn listing_failure_keeps_table() {
        let (transport, mut reconciler, tx, mut rx) = setup();
        transport.set_endpoints([argo("a")]);
        reconciler.reconcile(&tx).await.unwrap();
        rx.drain_ready();

        transport.fail_listing(SyncError::remote("connection refused"));
        let err = reconciler.reconcile(&tx).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(reconciler.service_count(), 1);
        assert!(rx.drain_ready().is_empty());
        assert_eq!(reconciler.monitor().check(), Err(err));

        let stats = reconciler.monitor().stats();
        assert_eq!(stats.cycles_completed, 1);
        assert_eq!(stats.cycles_failed, 1);
        assert!(stats.last_error.is_some());
    }

    #[tokio::test]
    async fn health_reflects_last_attempt_only() {
        let (transport, mut reconciler, tx, _rx) = setup();
        transport.fail_listing(SyncError::Decode("bad".into()));
        assert!(reconciler.reconcile(&tx).await.is_err());
        assert!(reconciler.monitor().check().is_err());

        transport.set_endpoints([]);
        reconciler.reconcile(&tx).await.unwrap();
        assert_eq!(reconciler.monitor().check(), Ok(()));
        assert!(reconciler.monitor().stats().last_error.is_none());
    }

    #[tokio::test]
    async fn untracked_types_are_ignored() {
        let (transport, mut reconciler, tx, mut rx) = setup();
        transport.set_endpoints([argo("a"), ServiceEndpoint::new("a", "ci", "jenkins")]);

        reconciler.reconcile(&tx).await.unwrap();
        assert_eq!(reconciler.service_count(), 1);
        assert_eq!(rx.drain_ready().len(), 1);
        assert_eq!(transport.credential_requests(), vec![argo("a").key()]);
    }

    #[tokio::test]
    async fn dropped_receiver_does_not_stall() {
        let (transport, mut reconciler, tx, rx) = setup();
        drop(rx);
        transport.set_endpoints([argo("a")]);
        let summary = reconciler.reconcile(&tx).await.unwrap();
        assert_eq!(summary.added, 1);
        assert_eq!(reconciler.service_count(), 1);
    }

    #[tokio::test]
    async fn stats_track_cycles() {
        let (transport, mut reconciler, tx, mut rx) = setup();
        transport.set_endpoints([argo("a"), argo("b")]);
        reconciler.reconcile(&tx).await.unwrap();
        transport.set_endpoints([argo("a")]);
        reconciler.reconcile(&tx).await.unwrap();
        rx.drain_ready();

        let stats = reconciler.monitor().stats();
        assert_eq!(stats.cycles_completed, 2);
        assert_eq!(stats.events_emitted, 3);
        assert_eq!(stats.services_tracked, 1);
        assert!(stats.last_sync_time.is_some());
    }
}
