//! # sync-relay
//!
//! Zero-knowledge replica server for notesync.
//!
//! This crate implements the server half of the sync protocol:
//! - Accepts one JSON sync request per client cycle over HTTP
//! - Keeps the newest signed envelope per note (last writer wins by
//!   timestamp), reporting equal-timestamp disagreements as conflicts
//! - Returns the owner's full snapshot in the same transaction
//! - Never sees plaintext (envelopes are opaque ciphertext)
//!
//! ## Architecture
//!
//! ```text
//! Device A ──┐                    ┌── Device B
//!            │   POST /api/sync   │
//!            ├───────────────────►│
//!            │                    │
//!        ┌───┴────────────────────┴───┐
//!        │        sync-relay          │
//!        │  ┌─────────────────────┐   │
//!        │  │ SQLite (envelopes)  │   │
//!        │  └─────────────────────┘   │
//!        └────────────────────────────┘
//! ```
//!
//! ## Endpoints
//!
//! - `POST /api/sync` → snapshot, updated ids, conflicting ids
//! - `GET /api/health` → service and store health
//! - `GET /metrics` → Prometheus text

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cleanup;
pub mod config;
pub mod error;
pub mod http;
pub mod limits;
pub mod server;
pub mod storage;

pub use config::Config;
pub use error::{ApiError, StorageError};
pub use http::build_router;
pub use server::SyncRelay;
pub use storage::{ReplicaStore, SqliteReplicaStore};
