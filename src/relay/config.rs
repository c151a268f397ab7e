//! Relay configuration

use std::path::PathBuf;
use std::time::Duration;

/// Default idle timeout before a silent session is torn down
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Default read buffer size for the principal connections
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Default number of chunks a guest may lag behind before it is dropped
pub const DEFAULT_GUEST_BACKLOG: usize = 1024;

/// Default directory under the recording root that holds transcripts
pub const DEFAULT_RECORDING_NAMESPACE: &str = "accessproxy/ssh";

/// Relay configuration options
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Inactivity period after which the session is torn down.
    /// Used both for the initial deadline and for every rearm.
    pub idle_timeout: Duration,

    /// Application-level read buffer size for backend and frontend reads
    pub read_buffer_size: usize,

    /// Root of the temporary storage (created by the caller)
    pub recording_root: PathBuf,

    /// Relative directory under `recording_root` holding transcripts
    pub recording_namespace: PathBuf,

    /// Maximum broadcast backlog per guest, in chunks
    pub guest_backlog: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            recording_root: std::env::temp_dir(),
            recording_namespace: PathBuf::from(DEFAULT_RECORDING_NAMESPACE),
            guest_backlog: DEFAULT_GUEST_BACKLOG,
        }
    }
}

impl RelayConfig {
    /// Create a new config recording under the given root
    pub fn with_recording_root(root: impl Into<PathBuf>) -> Self {
        Self {
            recording_root: root.into(),
            ..Default::default()
        }
    }

    /// Set idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set read buffer size (at least one byte)
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    /// Set the recording root
    pub fn recording_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.recording_root = root.into();
        self
    }

    /// Set the transcript directory relative to the recording root
    pub fn recording_namespace(mut self, namespace: impl Into<PathBuf>) -> Self {
        self.recording_namespace = namespace.into();
        self
    }

    /// Set the per-guest broadcast backlog (at least one chunk)
    pub fn guest_backlog(mut self, chunks: usize) -> Self {
        self.guest_backlog = chunks.max(1);
        self
    }

    /// Directory that holds this relay's transcripts
    pub fn recording_dir(&self) -> PathBuf {
        self.recording_root.join(&self.recording_namespace)
    }
}
