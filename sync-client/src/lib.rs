//! # sync-client
//!
//! Client library for notesync end-to-end encrypted note sync.
//!
//! This is the main library that applications use to sync notes.
//!
//! ## Features
//!
//! - **One phrase, every key**: Argon2id + HKDF derive encryption, signing,
//!   post-quantum and owner-id material from a BIP-39 phrase
//! - **Hybrid encryption**: ML-KEM-768 self-encapsulation with
//!   XChaCha20-Poly1305, or classical XChaCha20-Poly1305 alone
//! - **Signed envelopes**: Ed25519 or ML-DSA-65, verified before decryption
//! - **Transport Abstraction**: Pluggable transport layer (HTTP, mock)
//! - **Pure State Machine**: Uses sync-core for merge and retry logic
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sync_client::{
//!     ClientConfig, DeriveOptions, FileNoteStore, KeyBundle, LocalNotes, SecretPhrase, SyncClient,
//! };
//!
//! let phrase = SecretPhrase::parse(&input)?;
//! let keys = Arc::new(KeyBundle::derive(&phrase, &DeriveOptions::default())?);
//! let notes = Arc::new(LocalNotes::new(FileNoteStore::new("notes.json")));
//! let client = SyncClient::with_http(keys, notes, ClientConfig::default())?;
//!
//! let report = client.sync().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cipher;
pub mod client;
pub mod crypto;
pub mod keys;
pub mod phrase;
pub mod pq;
pub mod signer;
pub mod store;
pub mod transport;

pub use cipher::{EncryptPolicy, Sealed};
pub use client::{now_ms, ClientConfig, ClientError, SyncClient, SyncReport};
pub use crypto::{CryptoError, KdfParams, SymmetricKey, KEY_SIZE, NONCE_SIZE};
pub use keys::{DeriveOptions, KeyBundle, PublicKeys};
pub use phrase::SecretPhrase;
pub use signer::{open, seal, Phase, SealError};
pub use store::{FileNoteStore, LocalNotes, MemoryNoteStore, NoteStore, StoreError};
pub use transport::{HttpTransport, MockTransport, SyncTransport, TransportError};
