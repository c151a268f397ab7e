//! Session transcript recording
//!
//! A transcript is the exact byte sequence the backend sent to the frontend,
//! appended to a flat file with no header or framing, suitable for offline
//! replay:
//!
//! ```text
//! <recording_root>/<recording_namespace>/<session_id>.session
//! ```

pub mod path;
pub mod sink;

pub use path::{sanitize_session_id, transcript_path, TRANSCRIPT_SUFFIX};
pub use sink::RecordingSink;
