//! Event dispatch for a single worker instance.
//!
//! The host hands every event to `ServiceWorker::dispatch`, which routes it to
//! its handler and returns the outcome together with the event's keep-alive
//! set. Dispatch takes `&mut self`, so events on one instance never overlap.
//!
//! Background sync, push and periodic sync failures are logged and swallowed.
//! Install, activate, fetch and message failures are returned to the host.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::http::Request;
use crate::lifecycle::{KeepAlive, WorkerState};
use crate::manager::{FetchOutcome, OfflineCacheManager};
use crate::notify::{Clients, Notification, NotificationAction, Notifier, ACTION_CLOSE, ACTION_OPEN};

/// Message posted from a page to the worker.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageMessage {
    /// Take over from the previous instance immediately
    SkipWaiting,
    /// Store these URLs in the dynamic generation
    CacheUrls { urls: Vec<String> },
    #[serde(other)]
    Unknown,
}

impl PageMessage {
    pub fn parse(json: &str) -> Result<Self, WorkerError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Debug)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(Request),
    Sync { tag: String },
    PeriodicSync { tag: String },
    /// Push with its plain text payload, if any
    Push { data: Option<String> },
    NotificationClick {
        action: Option<String>,
        notification: Notification,
    },
    Message(PageMessage),
}

impl WorkerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerEvent::Install => "install",
            WorkerEvent::Activate => "activate",
            WorkerEvent::Fetch(_) => "fetch",
            WorkerEvent::Sync { .. } => "sync",
            WorkerEvent::PeriodicSync { .. } => "periodicsync",
            WorkerEvent::Push { .. } => "push",
            WorkerEvent::NotificationClick { .. } => "notificationclick",
            WorkerEvent::Message(_) => "message",
        }
    }
}

#[derive(Debug)]
pub enum EventOutcome {
    Installed,
    Activated { deleted: Vec<String> },
    Fetch(FetchOutcome),
    Handled,
}

/// Outcome of one event plus the work the host must let finish.
pub struct Dispatched {
    pub outcome: EventOutcome,
    pub keep_alive: KeepAlive,
}

impl Dispatched {
    /// Wait for the event's background work, then hand back the outcome.
    pub async fn settled(self) -> EventOutcome {
        self.keep_alive.settled().await;
        self.outcome
    }
}

pub struct ServiceWorker {
    config: WorkerConfig,
    manager: OfflineCacheManager,
    notifier: Arc<dyn Notifier>,
    clients: Arc<dyn Clients>,
    state: WorkerState,
    skip_waiting: bool,
    claimed: bool,
}

impl ServiceWorker {
    pub fn new(
        config: WorkerConfig,
        manager: OfflineCacheManager,
        notifier: Arc<dyn Notifier>,
        clients: Arc<dyn Clients>,
    ) -> Self {
        Self {
            config,
            manager,
            notifier,
            clients,
            state: WorkerState::Parsed,
            skip_waiting: false,
            claimed: false,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Whether this instance asked to supersede the previous one without waiting
    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting
    }

    /// Whether this instance took control of already-open pages
    pub fn has_claimed(&self) -> bool {
        self.claimed
    }

    pub fn manager(&self) -> &OfflineCacheManager {
        &self.manager
    }

    /// Mark an already-installed generation as active, e.g. when a host
    /// restarts a worker whose caches are on disk.
    pub fn resume_activated(&mut self) {
        self.state = WorkerState::Activated;
    }

    pub async fn dispatch(&mut self, event: WorkerEvent) -> Result<Dispatched, WorkerError> {
        debug!(event = event.kind(), state = %self.state, "Dispatching event");
        let mut keep_alive = KeepAlive::new();
        let outcome = match event {
            WorkerEvent::Install => self.on_install().await?,
            WorkerEvent::Activate => self.on_activate().await?,
            WorkerEvent::Fetch(request) => self.on_fetch(request, &mut keep_alive).await?,
            WorkerEvent::Sync { tag } => self.on_sync(&tag).await,
            WorkerEvent::PeriodicSync { tag } => self.on_periodic_sync(&tag).await,
            WorkerEvent::Push { data } => self.on_push(data).await,
            WorkerEvent::NotificationClick {
                action,
                notification,
            } => self.on_notification_click(action.as_deref(), &notification).await,
            WorkerEvent::Message(message) => self.on_message(message).await?,
        };
        Ok(Dispatched {
            outcome,
            keep_alive,
        })
    }

    async fn on_install(&mut self) -> Result<EventOutcome, WorkerError> {
        if self.state != WorkerState::Parsed {
            return Err(WorkerError::InvalidState {
                action: "install",
                state: self.state.to_string(),
            });
        }
        self.state = WorkerState::Installing;
        match self.manager.install().await {
            Ok(()) => {
                self.state = WorkerState::Installed;
                self.skip_waiting = true;
                Ok(EventOutcome::Installed)
            }
            Err(e) => {
                error!(error = %e, "Install failed, worker will not activate");
                self.state = WorkerState::Redundant;
                Err(e)
            }
        }
    }

    async fn on_activate(&mut self) -> Result<EventOutcome, WorkerError> {
        if self.state != WorkerState::Installed {
            return Err(WorkerError::InvalidState {
                action: "activate",
                state: self.state.to_string(),
            });
        }
        self.state = WorkerState::Activating;
        let deleted = match self.manager.activate().await {
            Ok(deleted) => deleted,
            Err(e) => {
                error!(error = %e, "Activate failed, worker is redundant");
                self.state = WorkerState::Redundant;
                return Err(e);
            }
        };
        if let Err(e) = self.clients.claim().await {
            error!(error = %e, "Failed to claim pages, worker is redundant");
            self.state = WorkerState::Redundant;
            return Err(e);
        }
        self.claimed = true;
        self.state = WorkerState::Activated;
        info!(deleted = deleted.len(), "Worker activated");
        Ok(EventOutcome::Activated { deleted })
    }

    async fn on_fetch(
        &self,
        request: Request,
        keep_alive: &mut KeepAlive,
    ) -> Result<EventOutcome, WorkerError> {
        // Pages are only controlled by an active worker
        if self.state != WorkerState::Activated {
            return Ok(EventOutcome::Fetch(FetchOutcome::Passthrough));
        }
        let outcome = self.manager.handle_fetch(request, keep_alive).await?;
        Ok(EventOutcome::Fetch(outcome))
    }

    async fn on_sync(&self, tag: &str) -> EventOutcome {
        if tag == self.config.answer_sync_tag {
            if let Err(e) = self.sync_answers().await {
                error!(tag, error = %e, "Background sync failed");
            }
        } else {
            debug!(tag, "Ignoring sync with unknown tag");
        }
        EventOutcome::Handled
    }

    /// Flush queued answers. No queue exists yet; this only opens the
    /// dynamic generation and logs.
    async fn sync_answers(&self) -> Result<(), WorkerError> {
        let storage = self.manager.storage();
        storage.open(self.manager.dynamic_cache()).await?;
        info!(cache = self.manager.dynamic_cache(), "Syncing answers");
        Ok(())
    }

    /// The notification shown for pushes and reminders, with `open` and
    /// `close` actions.
    pub fn build_notification(&self, body: String) -> Notification {
        Notification {
            title: self.config.app_title.clone(),
            body,
            icon: self.config.icon.clone(),
            badge: self.config.badge.clone(),
            vibrate: self.config.vibrate.clone(),
            tag: None,
            actions: vec![
                NotificationAction {
                    action: ACTION_OPEN.to_string(),
                    title: "Open".to_string(),
                    icon: self.config.open_action_icon.clone(),
                },
                NotificationAction {
                    action: ACTION_CLOSE.to_string(),
                    title: "Close".to_string(),
                    icon: self.config.close_action_icon.clone(),
                },
            ],
            data: serde_json::json!({
                "date_of_arrival": Utc::now().to_rfc3339(),
                "primary_key": 1,
            }),
        }
    }

    async fn on_push(&self, data: Option<String>) -> EventOutcome {
        let body = data
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| self.config.default_push_body.clone());
        let notification = self.build_notification(body);
        if let Err(e) = self.notifier.show(&notification).await {
            error!(error = %e, "Failed to show push notification");
        }
        EventOutcome::Handled
    }

    async fn on_notification_click(
        &self,
        action: Option<&str>,
        notification: &Notification,
    ) -> EventOutcome {
        if let Err(e) = self.notifier.close(notification).await {
            warn!(error = %e, "Failed to close notification");
        }
        if action == Some(ACTION_OPEN) {
            let opened = match self.manager.resolve("/") {
                Ok(root) => self.clients.focus_or_open(&root).await,
                Err(e) => Err(e),
            };
            if let Err(e) = opened {
                error!(error = %e, "Failed to open page from notification");
            }
        }
        EventOutcome::Handled
    }

    /// Time of the user's last visit. No visit store exists, so this is
    /// always now and the reminder never fires.
    fn last_visit(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn on_periodic_sync(&self, tag: &str) -> EventOutcome {
        if tag != self.config.reminder_tag {
            debug!(tag, "Ignoring periodic sync with unknown tag");
            return EventOutcome::Handled;
        }
        let elapsed = Utc::now() - self.last_visit();
        if elapsed > Duration::hours(self.config.reminder_threshold_hours) {
            let mut reminder = self.build_notification(self.config.reminder_body.clone());
            reminder.tag = Some(self.config.reminder_tag.clone());
            if let Err(e) = self.notifier.show(&reminder).await {
                error!(error = %e, "Failed to show reminder");
            }
        } else {
            debug!(elapsed_minutes = elapsed.num_minutes(), "Recent visit, no reminder");
        }
        EventOutcome::Handled
    }

    async fn on_message(&mut self, message: PageMessage) -> Result<EventOutcome, WorkerError> {
        match message {
            PageMessage::SkipWaiting => {
                info!("Page requested skip waiting");
                self.skip_waiting = true;
            }
            PageMessage::CacheUrls { urls } => {
                self.manager.cache_urls(&urls).await?;
            }
            PageMessage::Unknown => debug!("Ignoring unknown page message"),
        }
        Ok(EventOutcome::Handled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CacheStorage, MemoryStorage};
    use crate::testing::{
        url, BrokenClients, BrokenNotifier, FakeNetwork, RecordingClients, RecordingNotifier, ORIGIN,
    };
    use std::sync::atomic::Ordering;
    use url::Url;

    struct Fixture {
        worker: ServiceWorker,
        storage: Arc<MemoryStorage>,
        network: Arc<FakeNetwork>,
        notifier: Arc<RecordingNotifier>,
        clients: Arc<RecordingClients>,
    }

    fn fixture() -> Fixture {
        let config = WorkerConfig {
            origin: ORIGIN.to_string(),
            static_manifest: vec!["/".into(), "/offline.html".into()],
            ..WorkerConfig::default()
        };
        let storage = Arc::new(MemoryStorage::new());
        let network = Arc::new(FakeNetwork::new());
        network.route("/", 200, "home");
        network.route("/offline.html", 200, "offline");
        let notifier = Arc::new(RecordingNotifier::default());
        let clients = Arc::new(RecordingClients::default());
        let manager = OfflineCacheManager::new(
            &config,
            Url::parse(ORIGIN).unwrap(),
            storage.clone(),
            network.clone(),
        );
        let worker = ServiceWorker::new(config, manager, notifier.clone(), clients.clone());
        Fixture {
            worker,
            storage,
            network,
            notifier,
            clients,
        }
    }

    async fn run(worker: &mut ServiceWorker, event: WorkerEvent) -> EventOutcome {
        worker.dispatch(event).await.unwrap().settled().await
    }

    #[tokio::test]
    async fn test_install_then_activate_lifecycle() {
        let mut f = fixture();
        f.storage.open("quiz-static-v0").await.unwrap();

        assert!(matches!(run(&mut f.worker, WorkerEvent::Install).await, EventOutcome::Installed));
        assert_eq!(f.worker.state(), WorkerState::Installed);
        assert!(f.worker.skip_waiting_requested());

        match run(&mut f.worker, WorkerEvent::Activate).await {
            EventOutcome::Activated { deleted } => assert_eq!(deleted, vec!["quiz-static-v0"]),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(f.worker.state(), WorkerState::Activated);
        assert!(f.worker.has_claimed());
        assert_eq!(f.clients.claims.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_install_makes_worker_redundant() {
        let mut f = fixture();
        f.network.set_offline(true);

        assert!(f.worker.dispatch(WorkerEvent::Install).await.is_err());
        assert_eq!(f.worker.state(), WorkerState::Redundant);
        assert!(!f.worker.skip_waiting_requested());
        assert!(f.worker.dispatch(WorkerEvent::Activate).await.is_err());
    }

    #[tokio::test]
    async fn test_failed_claim_makes_worker_redundant() {
        let config = WorkerConfig {
            origin: ORIGIN.to_string(),
            static_manifest: vec!["/".into()],
            ..WorkerConfig::default()
        };
        let network = Arc::new(FakeNetwork::new());
        network.route("/", 200, "home");
        let manager = OfflineCacheManager::new(
            &config,
            Url::parse(ORIGIN).unwrap(),
            Arc::new(MemoryStorage::new()),
            network,
        );
        let mut worker = ServiceWorker::new(
            config,
            manager,
            Arc::new(RecordingNotifier::default()),
            Arc::new(BrokenClients),
        );

        run(&mut worker, WorkerEvent::Install).await;
        assert!(worker.dispatch(WorkerEvent::Activate).await.is_err());
        assert_eq!(worker.state(), WorkerState::Redundant);
        assert!(!worker.has_claimed());
    }

    #[tokio::test]
    async fn test_fetch_before_activation_is_not_intercepted() {
        let mut f = fixture();
        let outcome = run(&mut f.worker, WorkerEvent::Fetch(Request::get(url("/")))).await;
        assert!(matches!(outcome, EventOutcome::Fetch(FetchOutcome::Passthrough)));
        assert_eq!(f.network.calls(), 0);
    }

    #[tokio::test]
    async fn test_fetch_after_activation_is_cache_first() {
        let mut f = fixture();
        run(&mut f.worker, WorkerEvent::Install).await;
        run(&mut f.worker, WorkerEvent::Activate).await;
        let calls = f.network.calls();

        let outcome = run(&mut f.worker, WorkerEvent::Fetch(Request::navigate(url("/")))).await;
        match outcome {
            EventOutcome::Fetch(FetchOutcome::Responded(r)) => assert_eq!(r.text().unwrap(), "home"),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(f.network.calls(), calls);
    }

    #[tokio::test]
    async fn test_cache_urls_message() {
        let mut f = fixture();
        f.network.route("/a", 200, "A");
        f.network.route("/b", 200, "B");
        let message = PageMessage::parse(r#"{"type":"CACHE_URLS","urls":["/a","/b"]}"#).unwrap();

        run(&mut f.worker, WorkerEvent::Message(message)).await;
        for path in ["/a", "/b"] {
            assert!(f
                .storage
                .match_in("quiz-dynamic-v1", &Request::get(url(path)))
                .await
                .unwrap()
                .is_some());
        }
    }

    #[tokio::test]
    async fn test_skip_waiting_message() {
        let mut f = fixture();
        let message = PageMessage::parse(r#"{"type":"SKIP_WAITING"}"#).unwrap();
        run(&mut f.worker, WorkerEvent::Message(message)).await;
        assert!(f.worker.skip_waiting_requested());
    }

    #[test]
    fn test_parse_page_messages() {
        assert_eq!(
            PageMessage::parse(r#"{"type":"PING"}"#).unwrap(),
            PageMessage::Unknown
        );
        assert!(PageMessage::parse(r#"{"urls":[]}"#).is_err());
        assert!(PageMessage::parse(r#"{"type":"CACHE_URLS"}"#).is_err());
    }

    #[tokio::test]
    async fn test_push_uses_payload_or_default() {
        let mut f = fixture();
        run(&mut f.worker, WorkerEvent::Push { data: Some("Quiz 3 is live".into()) }).await;
        run(&mut f.worker, WorkerEvent::Push { data: None }).await;
        run(&mut f.worker, WorkerEvent::Push { data: Some(String::new()) }).await;

        let shown = f.notifier.shown.lock().unwrap();
        assert_eq!(shown.len(), 3);
        assert_eq!(shown[0].title, "Quiz App");
        assert_eq!(shown[0].body, "Quiz 3 is live");
        assert_eq!(shown[1].body, "New content available");
        assert_eq!(shown[2].body, "New content available");
        let actions: Vec<&str> = shown[0].actions.iter().map(|a| a.action.as_str()).collect();
        assert_eq!(actions, vec!["open", "close"]);
    }

    #[tokio::test]
    async fn test_push_failure_is_swallowed() {
        let config = WorkerConfig::default();
        let manager = OfflineCacheManager::new(
            &config,
            Url::parse(ORIGIN).unwrap(),
            Arc::new(MemoryStorage::new()),
            Arc::new(FakeNetwork::new()),
        );
        let mut worker = ServiceWorker::new(
            config,
            manager,
            Arc::new(BrokenNotifier),
            Arc::new(RecordingClients::default()),
        );
        let outcome = run(&mut worker, WorkerEvent::Push { data: None }).await;
        assert!(matches!(outcome, EventOutcome::Handled));
    }

    #[tokio::test]
    async fn test_notification_click_actions() {
        let mut f = fixture();
        let notification = f.worker.build_notification("hi".into());

        run(
            &mut f.worker,
            WorkerEvent::NotificationClick {
                action: Some("close".into()),
                notification: notification.clone(),
            },
        )
        .await;
        assert!(f.clients.opened.lock().unwrap().is_empty());

        run(
            &mut f.worker,
            WorkerEvent::NotificationClick {
                action: Some("open".into()),
                notification,
            },
        )
        .await;
        assert_eq!(*f.clients.opened.lock().unwrap(), vec![url("/")]);
        assert_eq!(f.notifier.closed.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_answer_sync_opens_dynamic_cache_only() {
        let mut f = fixture();
        run(&mut f.worker, WorkerEvent::Sync { tag: "sync-answers".into() }).await;
        assert_eq!(f.storage.keys().await.unwrap(), vec!["quiz-dynamic-v1"]);
        assert_eq!(f.network.calls(), 0);

        run(&mut f.worker, WorkerEvent::Sync { tag: "other".into() }).await;
        assert_eq!(f.storage.keys().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_daily_reminder_never_fires() {
        let mut f = fixture();
        run(&mut f.worker, WorkerEvent::PeriodicSync { tag: "daily-reminder".into() }).await;
        assert!(f.notifier.shown.lock().unwrap().is_empty());
    }

    #[test]
    fn test_event_kind_names() {
        assert_eq!(WorkerEvent::Install.kind(), "install");
        assert_eq!(WorkerEvent::Push { data: None }.kind(), "push");
    }
}
