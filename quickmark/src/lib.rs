//! QuickMark Library
//!
//! Attendance relay for the QuickChex portal. Two halves share this crate:
//!
//! - the relay side (`relay`, `reframe`): a single `GET /api/mark-attendance`
//!   route that forwards credentials to the upstream automation API and
//!   re-frames its chunked progress output into Server-Sent Events;
//! - the client side (`consumer`, `subscription`, `run`, `store`): the
//!   subscription owner that drives one run through
//!   `Idle -> Processing -> Succeeded | Failed` and keeps the credential bundle
//!   (including rotating session cookies) in a key-value store.
//!
//! `progress` and `form` hold the derived view model used by front-ends.

pub mod config;
pub mod consumer;
pub mod error;
pub mod form;
pub mod progress;
pub mod reframe;
#[cfg(feature = "server")]
pub mod relay;
pub mod run;
pub mod store;
pub mod subscription;
pub mod types;

pub use config::{ClientConfig, RelayConfig};
pub use consumer::Consumer;
pub use error::{ClientError, ConfigError, RelayError, StoreError};
pub use run::RunState;
pub use store::{CredentialStore, FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
pub use types::{CredentialBundle, SessionCookies, StatusEvent, StatusTag};
