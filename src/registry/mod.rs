//! Guest registry and broadcaster
//!
//! The registry tracks the observers of one session and routes backend output
//! to them. It uses `tokio::sync::broadcast` for fan-out, one receiver per
//! admitted guest.
//!
//! # Architecture
//!
//! ```text
//!                          GuestRegistry
//!                     ┌─────────────────────────┐
//!                     │ guests: HashMap<Id,     │
//!                     │   GuestEntry {          │
//!                     │     info,               │
//!                     │     outbound,           │
//!                     │   }                     │
//!                     │ >                       │
//!                     │ tx: broadcast::Tx       │
//!                     └───────────┬─────────────┘
//!                                 │
//!         ┌───────────────────────┼───────────────────────┐
//!         │                       │                       │
//!         ▼                       ▼                       ▼
//!   [backend task]           [guest task]            [guest task]
//!   registry.broadcast()     frames.recv()           frames.recv()
//!                                 │                       │
//!                                 ▼                       ▼
//!                           outbound.send()         outbound.send()
//! ```
//!
//! A guest whose connection fails, or that lags more than the configured
//! backlog, is removed so later broadcasts no longer reach for it.
//!
//! # Zero-Copy Design
//!
//! `bytes::Bytes` uses reference counting, so every guest shares the same
//! chunk allocation.

pub mod entry;
pub mod error;
pub mod guest;
pub mod store;

pub use entry::{GuestInfo, GuestOutbound};
pub use error::GuestError;
pub use guest::{Guest, GuestId, GuestSink, GuestStream};
pub use store::{GuestRegistry, Registration};
