//! Forwarding loops between the principal connections
//!
//! There is exactly one path for backend output: record, broadcast, forward,
//! rearm. Any failure on either principal side tears the whole session down.

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::AsyncReadExt;

use crate::error::{RelayError, Side};

use super::shared::{wait_shutdown, BoxReader, Shared};
use super::state::CloseReason;

/// Outcome of one read on a principal connection
enum ReadOutcome {
    Data(usize),
    Eof,
    Failed(std::io::Error),
    Shutdown,
}

async fn read_chunk(shared: &Shared, reader: &mut BoxReader, buf: &mut [u8]) -> ReadOutcome {
    let mut shutdown = shared.shutdown_signal();

    tokio::select! {
        _ = wait_shutdown(&mut shutdown) => ReadOutcome::Shutdown,
        result = reader.read(buf) => match result {
            Ok(0) => ReadOutcome::Eof,
            Ok(n) => ReadOutcome::Data(n),
            Err(e) => ReadOutcome::Failed(e),
        },
    }
}

/// Backend -> (transcript, guests, frontend)
pub(crate) async fn backend_to_frontend(shared: Arc<Shared>, mut reader: BoxReader) {
    let mut buf = vec![0u8; shared.config.read_buffer_size.max(1)];

    loop {
        let n = match read_chunk(&shared, &mut reader, &mut buf).await {
            ReadOutcome::Data(n) => n,
            ReadOutcome::Eof => {
                tracing::debug!(session_id = %shared.session_id, "Backend EOF");
                let _ = shared.teardown(CloseReason::BackendClosed).await;
                return;
            }
            ReadOutcome::Failed(source) => {
                let err = RelayError::Transfer {
                    side: Side::Backend,
                    source,
                };
                tracing::debug!(session_id = %shared.session_id, error = %err, "Backend read failed");
                let _ = shared.teardown(CloseReason::BackendError).await;
                return;
            }
            ReadOutcome::Shutdown => return,
        };

        let chunk = Bytes::copy_from_slice(&buf[..n]);

        shared.record(&chunk).await;

        let guests = shared.registry.broadcast(chunk.clone());
        if guests > 0 {
            shared.stats.inc_chunks_broadcast();
        }

        if let Err(err) = shared.write_to(Side::Frontend, &chunk).await {
            tracing::debug!(session_id = %shared.session_id, error = %err, "Frontend write failed");
            let _ = shared.teardown(CloseReason::FrontendError).await;
            return;
        }

        tracing::trace!(session_id = %shared.session_id, bytes = n, guests, "backend->frontend");
        shared.stats.add_backend_bytes(n);
        shared.timer.rearm();
    }
}

/// Frontend -> backend
pub(crate) async fn frontend_to_backend(shared: Arc<Shared>, mut reader: BoxReader) {
    let mut buf = vec![0u8; shared.config.read_buffer_size.max(1)];

    loop {
        let n = match read_chunk(&shared, &mut reader, &mut buf).await {
            ReadOutcome::Data(n) => n,
            ReadOutcome::Eof => {
                tracing::debug!(session_id = %shared.session_id, "Frontend EOF");
                let _ = shared.teardown(CloseReason::FrontendClosed).await;
                return;
            }
            ReadOutcome::Failed(source) => {
                let err = RelayError::Transfer {
                    side: Side::Frontend,
                    source,
                };
                tracing::debug!(session_id = %shared.session_id, error = %err, "Frontend read failed");
                let _ = shared.teardown(CloseReason::FrontendError).await;
                return;
            }
            ReadOutcome::Shutdown => return,
        };

        if let Err(err) = shared.write_to(Side::Backend, &buf[..n]).await {
            tracing::debug!(session_id = %shared.session_id, error = %err, "Backend write failed");
            let _ = shared.teardown(CloseReason::BackendError).await;
            return;
        }

        tracing::trace!(session_id = %shared.session_id, bytes = n, "frontend->backend");
        shared.stats.add_frontend_bytes(n);
        shared.timer.rearm();
    }
}
