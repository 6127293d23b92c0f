//! swcache core - offline caching for a progressive web app.
//!
//! This crate provides the pieces a host needs to run the offline cache
//! manager of a web app's worker:
//!
//! - `store`: named cache generations behind the `CacheStorage` trait
//! - `network`: the `Network` trait and a reqwest-backed implementation
//! - `manager`: install / activate / cache-first fetch policy
//! - `worker`: event dispatch, lifecycle and notification handling
//! - `config`: worker configuration loaded from JSON

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod manager;
pub mod network;
pub mod notify;
pub mod store;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use config::WorkerConfig;
pub use error::{CacheError, NetworkError, WorkerError};
pub use http::{Request, RequestKey, RequestMode, Response};
pub use lifecycle::{KeepAlive, WorkerState};
pub use manager::{FetchOutcome, OfflineCacheManager};
pub use network::{HttpNetwork, Network};
pub use notify::{Clients, LogClients, LogNotifier, Notification, Notifier};
pub use store::{CacheStorage, DiskStorage, MemoryStorage};
pub use worker::{Dispatched, EventOutcome, PageMessage, ServiceWorker, WorkerEvent};
