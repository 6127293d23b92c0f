//! Fakes shared by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use url::Url;

use crate::error::{NetworkError, WorkerError};
use crate::http::{Request, Response};
use crate::network::Network;
use crate::notify::{Clients, Notification, Notifier};

pub const ORIGIN: &str = "https://quiz.example";

pub fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

/// Network serving canned routes and counting every call.
/// Unknown routes answer 404.
#[derive(Default)]
pub struct FakeNetwork {
    routes: Mutex<HashMap<String, (u16, String)>>,
    offline: AtomicBool,
    pub calls: AtomicU64,
}

impl FakeNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, path: &str, status: u16, body: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(url(path).to_string(), (status, body.to_string()));
    }

    pub fn route_url(&self, url: &str, status: u16, body: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), (status, body.to_string()));
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Network for FakeNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(NetworkError::Transport {
                url: request.url().to_string(),
                reason: "offline".to_string(),
            });
        }
        let routes = self.routes.lock().unwrap();
        Ok(match routes.get(request.url().as_str()) {
            Some((status, body)) => Response::new(*status, body.clone()),
            None => Response::new(404, "not found"),
        })
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub shown: Mutex<Vec<Notification>>,
    pub closed: Mutex<Vec<Notification>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn show(&self, notification: &Notification) -> Result<(), WorkerError> {
        self.shown.lock().unwrap().push(notification.clone());
        Ok(())
    }

    async fn close(&self, notification: &Notification) -> Result<(), WorkerError> {
        self.closed.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Notifier whose display always fails
pub struct BrokenNotifier;

#[async_trait]
impl Notifier for BrokenNotifier {
    async fn show(&self, _notification: &Notification) -> Result<(), WorkerError> {
        Err(WorkerError::Host("permission denied".to_string()))
    }

    async fn close(&self, _notification: &Notification) -> Result<(), WorkerError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingClients {
    pub opened: Mutex<Vec<Url>>,
    pub claims: AtomicU64,
}

#[async_trait]
impl Clients for RecordingClients {
    async fn focus_or_open(&self, url: &Url) -> Result<(), WorkerError> {
        self.opened.lock().unwrap().push(url.clone());
        Ok(())
    }

    async fn claim(&self) -> Result<(), WorkerError> {
        self.claims.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Clients whose claim always fails
pub struct BrokenClients;

#[async_trait]
impl Clients for BrokenClients {
    async fn focus_or_open(&self, _url: &Url) -> Result<(), WorkerError> {
        Ok(())
    }

    async fn claim(&self) -> Result<(), WorkerError> {
        Err(WorkerError::Host("claim rejected".to_string()))
    }
}
