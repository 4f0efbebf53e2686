//! Pileup queue for an amateur radio station working many callers.
//!
//! Callers register their callsign, wait in a FIFO queue of bounded size,
//! and are promoted one at a time into the current-QSO slot. An
//! active/inactive switch gates registration and wipes the session on every
//! transition. Every change is pushed to subscribed listeners.
//!
//! # Examples
//!
//! Embedded runtime over the in-memory store:
//! ```
//! use pileup::{
//!     config::PileupConfig,
//!     runtime::handle::open_pileup,
//!     types::LookupInfo,
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let handle = open_pileup(PileupConfig::default()).expect("open");
//! handle.set_status(true, "admin").await.expect("activate");
//!
//! let entry = handle.register("k1abc", LookupInfo::default()).await.expect("register");
//! assert_eq!(entry.callsign.as_str(), "K1ABC");
//! assert_eq!(entry.position, 1);
//!
//! let advanced = handle.advance("admin").await.expect("advance");
//! assert_eq!(advanced.current.expect("current").callsign.as_str(), "K1ABC");
//! handle.shutdown().await.expect("shutdown");
//! # }
//! ```
//!
//! Durable storage:
//! ```no_run
//! use pileup::{
//!     config::{PileupConfig, StorageTarget},
//!     runtime::handle::open_pileup,
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config = PileupConfig {
//!     storage: StorageTarget::Sqlite("pileup.db".into()),
//!     ..PileupConfig::default()
//! };
//! let handle = open_pileup(config).expect("open sqlite");
//! let mut listener = handle.subscribe();
//! handle.set_status(true, "admin").await.expect("activate");
//! let event = listener.recv().await.expect("event");
//! print!("{}", event.to_sse().expect("encode"));
//! # }
//! ```
#![deny(missing_docs)]

/// Environment-driven runtime configuration.
pub mod config;
/// Queue engine, QSO coordinator, status gate and frequency board.
pub mod core;
/// Error taxonomy shared by every component.
pub mod error;
/// Tracing subscriber setup.
pub mod logging;
/// Store abstraction with memory and SQLite backends.
pub mod persist;
/// Queue, QSO and status records.
pub mod qso;
/// Single-writer runtime handle, broadcaster and events.
pub mod runtime;
/// Callsigns, lookup payloads and shared aliases.
pub mod types;
