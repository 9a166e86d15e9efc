//! # sync-types
//!
//! Wire format types for the notesync end-to-end encrypted note sync
//! protocol.
//!
//! This crate provides the foundational types shared by client and server:
//! - [`NoteId`], [`OwnerId`] - Identity types
//! - [`WireEnvelope`], [`Envelope`], [`Scheme`] - The encrypted note record
//!   and its canonical signable form
//! - [`SyncRequest`], [`SyncResponse`], [`HealthReport`] - HTTP bodies
//! - [`EnvelopeError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod envelope;
mod error;
mod ids;
mod messages;

pub use envelope::{Envelope, Scheme, WireEnvelope};
pub use error::EnvelopeError;
pub use ids::{NoteId, OwnerId};
pub use messages::{
    ClientVersion, ErrorBody, HealthReport, SyncRequest, SyncResponse, VERSION_REJECTED_CODE,
};
