//! Guest connection types
//!
//! A guest is a message-oriented duplex connection (typically a WebSocket
//! delivered by the acceptance layer). Inbound messages are opaque input for
//! the backend; outbound messages are backend output chunks.

use std::fmt;
use std::io;
use std::pin::Pin;

use bytes::Bytes;
use futures::sink::{Sink, SinkExt};
use futures::stream::{BoxStream, Stream, StreamExt};

/// Inbound half of a guest connection
pub type GuestStream = BoxStream<'static, io::Result<Bytes>>;

/// Outbound half of a guest connection
pub type GuestSink = Pin<Box<dyn Sink<Bytes, Error = io::Error> + Send>>;

/// Per-session guest identifier, assigned at admission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GuestId(pub u64);

impl fmt::Display for GuestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A newly joined observer connection
pub struct Guest {
    identity: Option<String>,
    stream: GuestStream,
    sink: GuestSink,
}

impl Guest {
    /// Create a guest from separate inbound and outbound halves
    pub fn new<St, Si, E>(stream: St, sink: Si) -> Self
    where
        St: Stream<Item = Result<Bytes, E>> + Send + 'static,
        Si: Sink<Bytes, Error = E> + Send + 'static,
        E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
    {
        Self {
            identity: None,
            stream: stream.map(|item| item.map_err(io::Error::other)).boxed(),
            sink: Box::pin(sink.sink_map_err(io::Error::other)),
        }
    }

    /// Create a guest from a single duplex message transport
    pub fn from_transport<T, E>(transport: T) -> Self
    where
        T: Stream<Item = Result<Bytes, E>> + Sink<Bytes, Error = E> + Send + 'static,
        E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
    {
        let (sink, stream) = transport.split();
        Self::new(stream, sink)
    }

    /// Attach an identity (e.g. the observer's e-mail) for logging and the roster
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Identity supplied by the acceptance layer
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub(crate) fn into_parts(self) -> (Option<String>, GuestStream, GuestSink) {
        (self.identity, self.stream, self.sink)
    }

    /// Close a guest that will not be admitted
    pub(crate) async fn reject(self) {
        let mut sink = self.sink;
        if let Err(e) = sink.close().await {
            tracing::debug!(error = %e, "Failed to close rejected guest");
        }
    }
}

impl fmt::Debug for Guest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guest")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc;

    #[tokio::test]
    async fn test_halves_are_adapted() {
        let (in_tx, in_rx) = mpsc::unbounded::<Bytes>();
        let (out_tx, mut out_rx) = mpsc::unbounded::<Bytes>();

        let guest = Guest::new(in_rx.map(Ok::<_, mpsc::SendError>), out_tx)
            .with_identity("viewer@example.com");
        assert_eq!(guest.identity(), Some("viewer@example.com"));

        let (_, mut stream, mut sink) = guest.into_parts();

        in_tx.unbounded_send(Bytes::from_static(b"ls\n")).unwrap();
        let msg = stream.next().await.unwrap().unwrap();
        assert_eq!(msg, Bytes::from_static(b"ls\n"));

        sink.send(Bytes::from_static(b"output")).await.unwrap();
        assert_eq!(out_rx.next().await.unwrap(), Bytes::from_static(b"output"));
    }

    #[tokio::test]
    async fn test_closed_sink_reports_error() {
        let (_in_tx, in_rx) = mpsc::unbounded::<Bytes>();
        let (out_tx, out_rx) = mpsc::unbounded::<Bytes>();
        drop(out_rx);

        let guest = Guest::new(in_rx.map(Ok::<_, mpsc::SendError>), out_tx);
        let (_, _, mut sink) = guest.into_parts();

        assert!(sink.send(Bytes::from_static(b"x")).await.is_err());
    }

    /// Transport that yields what the peer sends and forwards what it receives
    struct Loopback {
        rx: mpsc::UnboundedReceiver<Bytes>,
        tx: mpsc::UnboundedSender<Bytes>,
    }

    impl Stream for Loopback {
        type Item = Result<Bytes, mpsc::SendError>;

        fn poll_next(
            mut self: Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Option<Self::Item>> {
            self.rx.poll_next_unpin(cx).map(|item| item.map(Ok))
        }
    }

    impl Sink<Bytes> for Loopback {
        type Error = mpsc::SendError;

        fn poll_ready(
            mut self: Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Result<(), Self::Error>> {
            self.tx.poll_ready_unpin(cx)
        }

        fn start_send(mut self: Pin<&mut Self>, item: Bytes) -> Result<(), Self::Error> {
            self.tx.start_send_unpin(item)
        }

        fn poll_flush(
            mut self: Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Result<(), Self::Error>> {
            self.tx.poll_flush_unpin(cx)
        }

        fn poll_close(
            mut self: Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Result<(), Self::Error>> {
            self.tx.poll_close_unpin(cx)
        }
    }

    #[tokio::test]
    async fn test_from_transport() {
        let (in_tx, rx) = mpsc::unbounded::<Bytes>();
        let (tx, mut out_rx) = mpsc::unbounded::<Bytes>();

        let guest = Guest::from_transport(Loopback { rx, tx });
        let (_, mut stream, mut sink) = guest.into_parts();

        in_tx.unbounded_send(Bytes::from_static(b"pwd\n")).unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), Bytes::from_static(b"pwd\n"));

        sink.send(Bytes::from_static(b"/root")).await.unwrap();
        assert_eq!(out_rx.next().await.unwrap(), Bytes::from_static(b"/root"));

        sink.close().await.unwrap();
        assert!(out_rx.next().await.is_none());
    }

    #[test]
    fn test_guest_id_display() {
        assert_eq!(GuestId(42).to_string(), "#42");
    }
}
