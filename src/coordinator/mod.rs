//! AlarmCoordinator: shared polling of one device's alarm status
//!
//! One coordinator per configuration entry. Every tick it refreshes the vendor
//! token if needed, fetches a fresh status snapshot and notifies all listening
//! entities, so the number of outbound calls does not grow with entity count.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::error::ApiError;
use crate::hikconnect::AlarmApi;
use crate::models::StatusSnapshot;

#[derive(Debug, Clone)]
struct CoordinatorState {
    data: Option<StatusSnapshot>,
    last_update_success: bool,
    last_error: Option<String>,
    last_updated: Option<DateTime<Utc>>,
}

pub struct AlarmCoordinator {
    api: Arc<dyn AlarmApi>,
    device_serial: String,
    update_interval: Duration,
    timeout: Duration,
    state: RwLock<CoordinatorState>,
    refresh_lock: Mutex<()>,
    notify: watch::Sender<u64>,
}

impl AlarmCoordinator {
    pub fn new(
        api: Arc<dyn AlarmApi>,
        device_serial: &str,
        update_interval: Duration,
        timeout: Duration,
    ) -> Self {
        let (notify, _) = watch::channel(0);
        Self {
            api,
            device_serial: device_serial.to_string(),
            update_interval,
            timeout,
            state: RwLock::new(CoordinatorState {
                data: None,
                last_update_success: true,
                last_error: None,
                last_updated: None,
            }),
            refresh_lock: Mutex::new(()),
            notify,
        }
    }

    pub fn device_serial(&self) -> &str {
        &self.device_serial
    }

    /// Initial refresh during entry setup; a failure aborts the setup
    pub async fn first_refresh(&self) -> Result<(), ApiError> {
        self.refresh().await
    }

    /// Fetch a fresh snapshot and notify listeners
    ///
    /// On failure the previous snapshot is kept and the coordinator is marked
    /// unsuccessful until the next good fetch.
    pub async fn refresh(&self) -> Result<(), ApiError> {
        let _guard = self.refresh_lock.lock().await;

        let result = match time::timeout(self.timeout, self.api.get_status(&self.device_serial)).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::CannotConnect(format!(
                "Timed out after {} sec",
                self.timeout.as_secs()
            ))),
        };

        {
            let mut state = self.state.write().await;
            match &result {
                Ok(snapshot) => {
                    if !state.last_update_success {
                        tracing::info!("[Coordinator] {} recovered", self.device_serial);
                    }
                    state.data = Some(snapshot.clone());
                    state.last_update_success = true;
                    state.last_error = None;
                    state.last_updated = Some(Utc::now());
                }
                Err(e) => {
                    if state.last_update_success {
                        tracing::warn!(
                            "[Coordinator] Error updating {}: {}",
                            self.device_serial,
                            e
                        );
                    } else {
                        tracing::debug!("[Coordinator] {} still failing: {}", self.device_serial, e);
                    }
                    state.last_update_success = false;
                    state.last_error = Some(e.to_string());
                }
            }
        }

        self.notify.send_modify(|generation| *generation += 1);
        result.map(|_| ())
    }

    /// On-demand refresh requested by an entity
    pub async fn request_refresh(&self) -> Result<(), ApiError> {
        tracing::debug!("[Coordinator] Refresh requested for {}", self.device_serial);
        self.refresh().await
    }

    /// Interval loop; runs until the task is aborted
    pub async fn run(self: Arc<Self>) {
        tracing::info!(
            "[Coordinator] Polling {} every {}s",
            self.device_serial,
            self.update_interval.as_secs()
        );

        let mut ticker = time::interval_at(Instant::now() + self.update_interval, self.update_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            // Failures are recorded in the coordinator state
            let _ = self.refresh().await;
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.notify.subscribe()
    }

    pub async fn data(&self) -> Option<StatusSnapshot> {
        self.state.read().await.data.clone()
    }

    pub async fn last_update_success(&self) -> bool {
        self.state.read().await.last_update_success
    }

    pub async fn last_error(&self) -> Option<String> {
        self.state.read().await.last_error.clone()
    }

    pub async fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.last_updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hikconnect::testing::{snapshot, FakeApi};
    use crate::models::ApiKind;
    use std::sync::atomic::Ordering;

    fn coordinator(api: Arc<FakeApi>) -> AlarmCoordinator {
        AlarmCoordinator::new(api, "Q1", Duration::from_secs(15), Duration::from_secs(10))
    }

    #[tokio::test]
    async fn test_success_replaces_snapshot() {
        let api = Arc::new(FakeApi::new(ApiKind::Cloud));
        api.push_status(Ok(snapshot(true)));
        let mut second = snapshot(false);
        second.device_model = None;
        api.push_status(Ok(second.clone()));

        let coordinator = coordinator(api);
        coordinator.refresh().await.unwrap();
        assert!(coordinator.data().await.unwrap().alarm_status);

        coordinator.refresh().await.unwrap();
        let data = coordinator.data().await.unwrap();
        assert_eq!(data, second);
        assert_eq!(data.device_model, None);
        assert!(coordinator.last_update_success().await);
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_snapshot() {
        let api = Arc::new(FakeApi::new(ApiKind::Cloud));
        api.push_status(Ok(snapshot(true)));
        api.push_status(Err(ApiError::CannotConnect("HTTP 500".into())));

        let coordinator = coordinator(api);
        coordinator.refresh().await.unwrap();
        let err = coordinator.refresh().await.unwrap_err();

        assert!(matches!(err, ApiError::CannotConnect(_)));
        assert!(!coordinator.last_update_success().await);
        assert!(coordinator.data().await.unwrap().alarm_status);
        assert!(coordinator.last_error().await.unwrap().contains("HTTP 500"));
    }

    #[tokio::test]
    async fn test_recovery_clears_error() {
        let api = Arc::new(FakeApi::new(ApiKind::Cloud));
        api.push_status(Err(ApiError::CannotConnect("down".into())));
        api.push_status(Ok(snapshot(false)));

        let coordinator = coordinator(api);
        assert!(coordinator.first_refresh().await.is_err());
        assert!(coordinator.data().await.is_none());

        coordinator.refresh().await.unwrap();
        assert!(coordinator.last_update_success().await);
        assert!(coordinator.last_error().await.is_none());
        assert!(coordinator.last_updated().await.is_some());
    }

    #[tokio::test]
    async fn test_listeners_notified_on_every_refresh() {
        let api = Arc::new(FakeApi::new(ApiKind::Cloud));
        api.push_status(Ok(snapshot(true)));
        api.push_status(Err(ApiError::Unknown("x".into())));

        let coordinator = coordinator(api);
        let mut rx = coordinator.subscribe();

        let _ = coordinator.refresh().await;
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), 1);

        let _ = coordinator.refresh().await;
        assert_eq!(*rx.borrow_and_update(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_polls_once_per_interval() {
        let api = Arc::new(FakeApi::new(ApiKind::Cloud));
        api.push_status(Ok(snapshot(false)));

        let coordinator = Arc::new(coordinator(api.clone()));
        let handle = tokio::spawn(coordinator.clone().run());

        time::sleep(Duration::from_secs(46)).await;
        handle.abort();

        assert_eq!(api.status_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetch_times_out_and_keeps_snapshot() {
        let api = Arc::new(FakeApi::new(ApiKind::Cloud));
        api.push_status(Ok(snapshot(true)));
        let coordinator = coordinator(api.clone());
        coordinator.first_refresh().await.unwrap();

        api.set_status_delay(Duration::from_secs(30));
        let err = coordinator.refresh().await.unwrap_err();

        assert!(matches!(err, ApiError::CannotConnect(ref msg) if msg.contains("Timed out")));
        assert!(!coordinator.last_update_success().await);
        assert!(coordinator.data().await.unwrap().alarm_status);
        assert_eq!(api.status_calls.load(Ordering::SeqCst), 2);
    }
}
