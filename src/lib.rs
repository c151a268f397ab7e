//! Recording, observable relay core for interactive remote sessions.
//!
//! A [`Relay`] owns one backend and one frontend connection and forwards
//! bytes between them. Backend output is optionally appended to a flat
//! transcript file and broadcast to any number of guests, who may also
//! inject input. The session tears itself down after a configurable period
//! of inactivity.
//!
//! Connection acceptance, authentication and transport security happen
//! upstream; the relay is handed ready connections.

pub mod error;
pub mod recording;
pub mod registry;
pub mod relay;
pub mod stats;
pub mod timer;

pub use error::{RelayError, Result, Side};
pub use registry::{Guest, GuestError, GuestId, GuestInfo};
pub use relay::{CloseReason, Relay, RelayConfig};
pub use stats::StatsSnapshot;
pub use timer::{IdleTimer, TimerState};
