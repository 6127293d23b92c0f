//! Notifications and page clients as seen from the worker.
//!
//! The hosting runtime supplies a `Notifier` to display notifications and a
//! `Clients` handle to focus, open or claim pages. `LogNotifier` and
//! `LogClients` are hosts that only record the request in the log.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use crate::error::WorkerError;

/// Action id that opens the app
pub const ACTION_OPEN: &str = "open";

/// Action id that only dismisses the notification
pub const ACTION_CLOSE: &str = "close";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub tag: Option<String>,
    pub actions: Vec<NotificationAction>,
    pub data: serde_json::Value,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn show(&self, notification: &Notification) -> Result<(), WorkerError>;

    /// Dismiss a displayed notification.
    async fn close(&self, notification: &Notification) -> Result<(), WorkerError>;
}

#[async_trait]
pub trait Clients: Send + Sync {
    /// Focus a page already showing `url`, or open a new one.
    async fn focus_or_open(&self, url: &Url) -> Result<(), WorkerError>;

    /// Take control of already-open pages.
    async fn claim(&self) -> Result<(), WorkerError>;
}

pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn show(&self, notification: &Notification) -> Result<(), WorkerError> {
        info!(title = %notification.title, body = %notification.body, "Showing notification");
        Ok(())
    }

    async fn close(&self, notification: &Notification) -> Result<(), WorkerError> {
        info!(title = %notification.title, "Closing notification");
        Ok(())
    }
}

pub struct LogClients;

#[async_trait]
impl Clients for LogClients {
    async fn focus_or_open(&self, url: &Url) -> Result<(), WorkerError> {
        info!(url = %url, "Focusing or opening page");
        Ok(())
    }

    async fn claim(&self) -> Result<(), WorkerError> {
        info!("Claiming open pages");
        Ok(())
    }
}
