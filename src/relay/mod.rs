//! Session relay
//!
//! Forwards an interactive byte stream between a backend and a frontend,
//! recording backend output and sharing it with guests.
//!
//! ```text
//!                 ┌──────────── record ──────────► transcript
//!                 │
//!   backend ──────┼──────────── broadcast ───────► guests ──┐
//!      ▲          │                                         │
//!      │          └──────────── forward ─────────► frontend │
//!      │                                              │     │
//!      └──────────── single write path ◄──────────────┴─────┘
//! ```
//!
//! Every successful transfer rearms the idle deadline. A transfer failure on
//! either principal side, the deadline firing, or [`Relay::close`] all end
//! in the same teardown.

pub mod config;
mod forward;
mod guests;
mod session;
mod shared;
pub mod state;

pub use config::RelayConfig;
pub use session::Relay;
pub use state::CloseReason;
