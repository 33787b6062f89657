//! Core of a peer-to-peer "ding" messaging client built over a decentralized
//! record store. A ding is a short note addressed to another identifier;
//! sending one writes a typed record locally and forwards it to the
//! recipient's node, and a polling loop keeps the sent/received view
//! reconciled against the store.
//!
//! The store and the identity live behind the [`store::RecordStore`] and
//! [`store::IdentityProvider`] traits; [`store::memory::MemoryNetwork`] is
//! the in-process implementation used by tests.

pub mod client;
pub mod common;
pub mod config;
pub mod error;
pub mod store;

pub use client::{DingClient, InstallOutcome, spawn_client};
pub use common::{ClassifiedView, ClientCommand, ClientEvent, Did, Ding, SendStatus};
pub use config::AppConfig;
pub use error::{ConnectError, InstallError, SendError, SyncError};
pub use store::{IdentityProvider, RecordStore, Session};
