//! TCP session relay demo
//!
//! Run with: cargo run --example relay_server [LISTEN_ADDR] [BACKEND_ADDR] [GUEST_ADDR]
//!
//! Defaults:
//!   LISTEN_ADDR   127.0.0.1:2222   frontends connect here
//!   BACKEND_ADDR  127.0.0.1:22     every frontend is relayed to this backend
//!   GUEST_ADDR    127.0.0.1:2223   observers connect here
//!
//! Each frontend connection becomes a recorded session whose ID is printed
//! on startup. An observer connects to the guest port and sends the session
//! ID followed by a newline; from then on it sees the backend output and
//! anything it types goes to the backend.
//!
//! ```text
//!   ssh -p 2222 user@localhost        # frontend
//!   nc localhost 2223                 # observer, then type the session ID
//! ```
//!
//! Transcripts land in `$TMPDIR/accessproxy/ssh/<session>.session`.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::{sink, stream};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use session_relay::{Guest, Relay, RelayConfig};

/// Join queues of running sessions, by session ID
type Sessions = Arc<Mutex<HashMap<String, mpsc::Sender<Guest>>>>;

fn print_usage() {
    eprintln!("Usage: relay_server [LISTEN_ADDR] [BACKEND_ADDR] [GUEST_ADDR]");
}

fn parse_addr(arg: Option<&String>, default: &str) -> Result<SocketAddr, String> {
    let value = arg.map(String::as_str).unwrap_or(default);
    value
        .parse()
        .map_err(|e| format!("Invalid address '{}': {}", value, e))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let (listen_addr, backend_addr, guest_addr) = match (
        parse_addr(args.get(1), "127.0.0.1:2222"),
        parse_addr(args.get(2), "127.0.0.1:22"),
        parse_addr(args.get(3), "127.0.0.1:2223"),
    ) {
        (Ok(l), Ok(b), Ok(g)) => (l, b, g),
        (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
            eprintln!("Error: {}", e);
            print_usage();
            std::process::exit(1);
        }
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("session_relay=debug".parse()?),
        )
        .init();

    let config = RelayConfig::default().idle_timeout(Duration::from_secs(15 * 60));
    let sessions: Sessions = Arc::new(Mutex::new(HashMap::new()));

    let frontends = TcpListener::bind(listen_addr).await?;
    let guests = TcpListener::bind(guest_addr).await?;
    println!("Relaying {} -> {}", listen_addr, backend_addr);
    println!("Observers join on {}", guest_addr);

    tokio::select! {
        result = accept_frontends(frontends, backend_addr, config, Arc::clone(&sessions)) => {
            if let Err(e) = result {
                eprintln!("Frontend listener error: {}", e);
            }
        }
        result = accept_guests(guests, Arc::clone(&sessions)) => {
            if let Err(e) = result {
                eprintln!("Guest listener error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down...");
        }
    }

    Ok(())
}

async fn accept_frontends(
    listener: TcpListener,
    backend_addr: SocketAddr,
    config: RelayConfig,
    sessions: Sessions,
) -> io::Result<()> {
    let next_id = AtomicU64::new(1);

    loop {
        let (frontend, peer) = listener.accept().await?;
        let session_id = format!("demo-{}", next_id.fetch_add(1, Ordering::Relaxed));
        println!("[{}] Frontend connected from {}", session_id, peer);

        let config = config.clone();
        let sessions = Arc::clone(&sessions);
        tokio::spawn(async move {
            if let Err(e) = run_session(&session_id, frontend, backend_addr, config, &sessions).await {
                eprintln!("[{}] Session failed: {}", session_id, e);
            }
            sessions.lock().unwrap_or_else(|e| e.into_inner()).remove(&session_id);
        });
    }
}

async fn run_session(
    session_id: &str,
    frontend: TcpStream,
    backend_addr: SocketAddr,
    config: RelayConfig,
    sessions: &Sessions,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let backend = TcpStream::connect(backend_addr).await?;
    let (guest_tx, guest_rx) = mpsc::channel(16);

    let relay = Relay::new(session_id, true, backend, frontend, guest_rx, config).await?;
    sessions
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .insert(session_id.to_string(), guest_tx);

    if let Some(path) = relay.transcript_path() {
        println!("[{}] Recording to {}", session_id, path.display());
    }

    relay.start();
    relay.closed().await;

    let stats = relay.stats();
    println!(
        "[{}] Ended ({}): {} bytes out, {} bytes in, {} viewers",
        session_id,
        relay
            .close_reason()
            .map(|r| r.to_string())
            .unwrap_or_default(),
        stats.backend_to_frontend_bytes,
        stats.frontend_to_backend_bytes,
        stats.guests_admitted,
    );
    Ok(())
}

async fn accept_guests(listener: TcpListener, sessions: Sessions) -> io::Result<()> {
    loop {
        let (socket, peer) = listener.accept().await?;
        let sessions = Arc::clone(&sessions);

        tokio::spawn(async move {
            if let Err(e) = join_session(socket, peer, &sessions).await {
                eprintln!("Observer {} not admitted: {}", peer, e);
            }
        });
    }
}

async fn join_session(socket: TcpStream, peer: SocketAddr, sessions: &Sessions) -> io::Result<()> {
    let (read_half, mut write_half) = socket.into_split();
    let mut reader = BufReader::new(read_half);

    let mut line = String::new();
    reader.read_line(&mut line).await?;
    let session_id = line.trim().to_string();

    let queue = sessions
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .get(&session_id)
        .cloned();
    let Some(queue) = queue else {
        write_half.write_all(b"unknown session\n").await?;
        return Ok(());
    };

    // Raw TCP has no message framing: every read is one inbound message
    let inbound = stream::unfold(reader, |mut reader| async move {
        let mut buf = BytesMut::zeroed(4096);
        match reader.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(buf.freeze()), reader))
            }
            Err(e) => Some((Err(e), reader)),
        }
    });
    let outbound = sink::unfold(write_half, |mut writer, chunk: Bytes| async move {
        writer.write_all(&chunk).await?;
        Ok::<_, io::Error>(writer)
    });

    let guest = Guest::new(inbound, outbound).with_identity(peer.to_string());
    queue
        .send(guest)
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::NotConnected, "session ended"))?;
    println!("[{}] Observer {} joined", session_id, peer);
    Ok(())
}
