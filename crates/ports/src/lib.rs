//! External collaborators behind traits: deals API, notifications, chain RPC.
//!
//! Implementations are lazy: constructing a port performs no I/O until the
//! first method call, so worker processes can resolve them once at boot.

pub mod api;
pub mod chain;
pub mod error;
pub mod notify;

pub use api::{DealApi, FinalizePrepared, HttpDealApi, InMemoryDealApi};
pub use chain::{ChainRpc, HttpChainRpc, SignatureStatus};
pub use error::PortError;
pub use notify::{
    DialectNotifier, NoopNotifier, Notifier, PartyNote, RecordingNotifier, ReminderNote,
    ReviewerNote,
};
