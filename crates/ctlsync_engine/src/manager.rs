//! Lifecycle of the background sync worker.

use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::http::HttpTransport;
use crate::queue::{event_queue, EventReceiver, EventSender, EVENT_QUEUE_CAPACITY};
use crate::state::{Reconciler, SyncMonitor, SyncStats};
use crate::transport::ControllerTransport;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Polls the controller in the background and publishes service changes.
///
/// One worker task runs per manager. It reconciles once immediately, then
/// again every poll interval, measured from the end of the previous
/// reconcile. All service state lives on that task.
///
/// # Example
///
/// ```rust,ignore
/// let config = SyncConfig::new("https://controller:9003");
/// let (manager, mut events) = ControllerManager::start(config, vec!["argocd".into()])?;
///
/// while let Some(event) = events.recv().await {
///     println!("{} {}", event.operation.as_str(), event.key());
/// }
///
/// manager.shutdown().await;
/// ```
pub struct ControllerManager {
    config: SyncConfig,
    monitor: Arc<SyncMonitor>,
    shutdown: oneshot::Sender<()>,
    worker: JoinHandle<()>,
}

impl ControllerManager {
    /// Starts a manager talking to the configured controller over mutual TLS.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SyncError::Configuration`] if the URL is unusable or
    /// the TLS material cannot be loaded. Nothing is started in that case.
    pub fn start(
        config: SyncConfig,
        service_types: Vec<String>,
    ) -> SyncResult<(Self, EventReceiver)> {
        let config = config.with_defaults();
        let transport = HttpTransport::from_config(&config)?;
        Ok(Self::with_transport(config, service_types, transport))
    }

    /// Starts a manager using the given transport.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_transport<T>(
        config: SyncConfig,
        service_types: Vec<String>,
        transport: T,
    ) -> (Self, EventReceiver)
    where
        T: ControllerTransport + 'static,
    {
        let config = config.with_defaults();
        let monitor = Arc::new(SyncMonitor::new());
        let reconciler = Reconciler::new(transport, service_types, Arc::clone(&monitor));
        let (events, receiver) = event_queue(EVENT_QUEUE_CAPACITY);
        let (shutdown, shutdown_rx) = oneshot::channel();

        let interval = config.poll_interval();
        info!(url = %config.url, interval_secs = interval.as_secs(), "starting controller sync");
        let worker = tokio::spawn(run_worker(reconciler, events, interval, shutdown_rx));

        let manager = Self {
            config,
            monitor,
            shutdown,
            worker,
        };
        (manager, receiver)
    }

    /// Returns the effective configuration, defaults applied.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the error from the most recent reconcile, if any.
    ///
    /// # Errors
    ///
    /// Returns the last reconcile failure, or
    /// [`crate::SyncError::NotYetSynced`] before the first reconcile.
    pub fn check(&self) -> SyncResult<()> {
        self.monitor.check()
    }

    /// Returns a snapshot of the reconcile statistics.
    pub fn stats(&self) -> SyncStats {
        self.monitor.stats()
    }

    /// Returns a handle for observing health from elsewhere.
    pub fn monitor(&self) -> Arc<SyncMonitor> {
        Arc::clone(&self.monitor)
    }

    /// Stops the worker and waits for it to exit.
    ///
    /// A reconcile already in progress runs to completion first. When this
    /// returns, the worker is gone and the event queue has ended: the
    /// receiver yields any events still buffered, then `None`.
    ///
    /// The worker blocks while the queue is full, so the [`EventReceiver`]
    /// must keep being read until this returns. Awaiting `shutdown` while
    /// nothing drains a full queue never completes.
    pub async fn shutdown(self) {
        // The worker may already have stopped if its task panicked.
        let _ = self.shutdown.send(());
        if let Err(e) = self.worker.await {
            warn!(error = %e, "controller sync worker ended abnormally");
        }
        info!("controller sync stopped");
    }
}

async fn run_worker<T: ControllerTransport>(
    mut reconciler: Reconciler<T>,
    events: EventSender,
    interval: Duration,
    mut shutdown: oneshot::Receiver<()>,
) {
    reconcile_once(&mut reconciler, &events).await;

    loop {
        let timer = tokio::time::sleep(interval);
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = timer => reconcile_once(&mut reconciler, &events).await,
        }
    }
    debug!("controller sync worker exiting");
}

async fn reconcile_once<T: ControllerTransport>(reconciler: &mut Reconciler<T>, events: &EventSender) {
    match reconciler.reconcile(events).await {
        Ok(summary) if summary.events() > 0 => info!(
            added = summary.added,
            updated = summary.updated,
            deleted = summary.deleted,
            "controller sync complete"
        ),
        Ok(_) => debug!("controller sync complete, no changes"),
        // Already logged and recorded; the next tick retries.
        Err(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use crate::SyncError;
    use ctlsync_protocol::{Operation, ServiceEndpoint};

    fn argo(agent: &str) -> ServiceEndpoint {
        ServiceEndpoint::new(agent, "argo", "argocd")
    }

    fn start(transport: &Arc<MockTransport>) -> (ControllerManager, EventReceiver) {
        let config = SyncConfig::new("https://controller.test").with_update_frequency(1);
        ControllerManager::with_transport(config, vec!["argocd".into()], Arc::clone(transport))
    }

    #[tokio::test(start_paused = true)]
    async fn first_reconcile_is_immediate() {
        let transport = Arc::new(MockTransport::new());
        transport.set_endpoints([argo("a")]);
        let (manager, mut events) = start(&transport);

        let event = events.recv().await.unwrap();
        assert_eq!(event.operation, Operation::Update);
        assert_eq!(transport.list_calls(), 1);
        assert_eq!(manager.check(), Ok(()));

        manager.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn timer_drives_later_reconciles() {
        let transport = Arc::new(MockTransport::new());
        transport.set_endpoints([argo("a")]);
        let (manager, mut events) = start(&transport);
        events.recv().await.unwrap();

        transport.set_endpoints([]);
        let event = events.recv().await.unwrap();
        assert_eq!(event.operation, Operation::Delete);
        assert!(transport.list_calls() >= 2);

        manager.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_closes_queue_and_stops_polling() {
        let transport = Arc::new(MockTransport::new());
        transport.set_endpoints([argo("a")]);
        let (manager, mut events) = start(&transport);
        events.recv().await.unwrap();

        manager.shutdown().await;
        let calls = transport.list_calls();

        assert!(events.recv().await.is_none());
        assert!(events.is_finished());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(transport.list_calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_completes_while_draining_full_queue() {
        let transport = Arc::new(MockTransport::new());
        let agents: Vec<String> = (0..EVENT_QUEUE_CAPACITY + 2)
            .map(|i| format!("agent-{i:02}"))
            .collect();
        transport.set_endpoints(agents.iter().map(|a| argo(a)));
        let (manager, mut events) = start(&transport);

        // Let the worker fill the queue and block on the next push.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(events.len(), EVENT_QUEUE_CAPACITY);

        let stopping = manager.shutdown();
        tokio::pin!(stopping);
        let mut received = 0;
        loop {
            tokio::select! {
                biased;
                _ = &mut stopping => break,
                event = events.recv() => match event {
                    Some(_) => received += 1,
                    None => {
                        (&mut stopping).await;
                        break;
                    }
                },
            }
        }
        received += events.drain_ready().len();

        assert_eq!(received, agents.len());
        assert!(events.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn failures_surface_in_health() {
        let transport = Arc::new(MockTransport::new());
        transport.fail_listing(SyncError::remote("connection refused"));
        let (manager, _events) = start(&transport);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(matches!(manager.check(), Err(SyncError::Remote { .. })));
        assert_eq!(manager.stats().cycles_failed, 1);

        transport.set_endpoints([]);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(manager.check(), Ok(()));

        manager.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn defaults_applied_to_config() {
        let transport = Arc::new(MockTransport::new());
        let (manager, _events) = ControllerManager::with_transport(
            SyncConfig::new("https://controller.test"),
            vec!["argocd".into()],
            Arc::clone(&transport),
        );
        assert_eq!(manager.config().poll_interval(), Duration::from_secs(30));
        assert!(!manager.config().ca_path.as_os_str().is_empty());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn start_fails_on_missing_tls_material() {
        let config = SyncConfig::new("https://controller.test")
            .with_ca_path("/nonexistent/ca.crt")
            .with_certificate_path("/nonexistent/tls.crt")
            .with_key_path("/nonexistent/tls.key");
        let result = ControllerManager::start(config, vec!["argocd".into()]);
        assert!(matches!(result, Err(SyncError::Configuration(_))));
    }
}
