//! Transcript file naming

use std::path::{Path, PathBuf};

/// File suffix of session transcripts
pub const TRANSCRIPT_SUFFIX: &str = "session";

/// Make a session identifier safe to use as a single file name component.
///
/// ASCII alphanumerics, `-`, `_` and `.` are kept; anything else becomes `_`.
/// A name that is empty or made only of dots is replaced with underscores.
pub fn sanitize_session_id(session_id: &str) -> String {
    let name: String = session_id
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect();

    if name.chars().all(|c| c == '.') {
        "_".repeat(name.len().max(1))
    } else {
        name
    }
}

/// Transcript location for a session under the given directory
pub fn transcript_path(dir: &Path, session_id: &str) -> PathBuf {
    let mut file_name = sanitize_session_id(session_id);
    file_name.push('.');
    file_name.push_str(TRANSCRIPT_SUFFIX);
    dir.join(file_name)
}
