//! Demo host for the TLS network layer.
//!
//! A worker-per-thread static file server that performs all socket I/O
//! through the plugin's transport hooks.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────────┐
//!                  │                   DEMO HOST                      │
//!                  │                                                  │
//!  Client ────────▶│  TcpListener (shared, non-blocking)              │
//!                  │      │                                           │
//!                  │      ▼                                           │
//!                  │  worker-N thread ── ThreadContext (worker_init)  │
//!                  │      │                                           │
//!                  │      ▼                                           │
//!                  │  TlsTransport: read → write_vectored → send_file │
//!                  │      → close                                     │
//!                  │                                                  │
//!                  │  main thread: signals → Shutdown → plugin.exit() │
//!                  └──────────────────────────────────────────────────┘
//! ```

use std::fs::File;
use std::io::{self, IoSlice};
use std::net::TcpListener;
use std::os::fd::{IntoRawFd, RawFd};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;

use tls_netlayer::config;
use tls_netlayer::credentials::Fallback;
use tls_netlayer::lifecycle::{signals, Shutdown};
use tls_netlayer::net::{TlsTransport, Transfer};
use tls_netlayer::observability::{logging, metrics};
use tls_netlayer::plugin::{NetworkLayer, TlsPlugin};
use tls_netlayer::worker::ThreadContext;

const MAX_REQUEST: usize = 8 * 1024;
const READ_TIMEOUT: Duration = Duration::from_secs(5);
const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

#[derive(Parser)]
#[command(name = "tls-netlayer")]
#[command(about = "Static file server on the TLS network layer", long_about = None)]
struct Cli {
    /// Directory holding tls.toml and the credential files
    #[arg(short, long, default_value = "conf")]
    config_dir: PathBuf,

    #[arg(short, long, default_value = "127.0.0.1:2001")]
    listen: String,

    #[arg(short, long, default_value_t = 4)]
    workers: usize,

    /// Document root
    #[arg(short, long, default_value = ".")]
    root: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = config::load_from_dir(&cli.config_dir)?;
    logging::init(&config.observability.log_level);

    if let Some(addr) = &config.observability.metrics_address {
        match addr.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(metrics_address = %addr, "Failed to parse metrics address"),
        }
    }

    let plugin = Arc::new(TlsPlugin::from_config(
        config,
        &cli.config_dir,
        Fallback::builtin(),
    )?);

    let listener = TcpListener::bind(&cli.listen)?;
    listener.set_nonblocking(true)?;
    let listener = Arc::new(listener);
    let root = Arc::new(cli.root);
    let shutdown = Shutdown::new();

    tracing::info!(
        address = %listener.local_addr()?,
        workers = cli.workers,
        root = %root.display(),
        "Listening for connections"
    );

    let handles = (0..cli.workers)
        .map(|index| {
            let plugin = Arc::clone(&plugin);
            let listener = Arc::clone(&listener);
            let root = Arc::clone(&root);
            let shutdown = shutdown.clone();
            thread::Builder::new()
                .name(format!("worker-{index}"))
                .spawn(move || run_worker(&plugin, &listener, &root, &shutdown))
        })
        .collect::<Result<Vec<_>, _>>()?;

    signals::block_until_signal(&shutdown)?;
    plugin.exit();

    for handle in handles {
        if handle.join().is_err() {
            tracing::error!("Worker thread panicked");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn run_worker(plugin: &TlsPlugin, listener: &TcpListener, root: &Path, shutdown: &Shutdown) {
    let mut ctx = match plugin.worker_init() {
        Ok(ctx) => ctx,
        Err(e) => {
            tracing::error!(error = %e, "Worker aborted");
            return;
        }
    };
    let transport = plugin.transport();

    while !shutdown.is_triggered() && !ctx.is_retired() {
        match listener.accept() {
            Ok((stream, peer)) => {
                if let Err(e) = stream
                    .set_nonblocking(false)
                    .and_then(|()| stream.set_read_timeout(Some(READ_TIMEOUT)))
                {
                    tracing::warn!(%peer, error = %e, "Failed to configure connection");
                    continue;
                }
                let fd = stream.into_raw_fd();
                tracing::debug!(%peer, fd, "Accepted connection");
                serve(&transport, &mut ctx, fd, root);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_BACKOFF),
            Err(e) => tracing::warn!(error = %e, "Accept failed"),
        }
    }

    ctx.teardown();
}

/// Answer one request on `fd` and close it.
fn serve(transport: &TlsTransport, ctx: &mut ThreadContext, fd: RawFd, root: &Path) {
    match read_request(transport, ctx, fd) {
        Some(request) => respond(transport, ctx, fd, root, &request),
        None => tracing::debug!(fd, "No complete request"),
    }
    transport.close(ctx, fd);
}

fn read_request(transport: &TlsTransport, ctx: &mut ThreadContext, fd: RawFd) -> Option<Vec<u8>> {
    let mut request = Vec::new();
    let mut buf = vec![0u8; transport.buffer_size()];
    loop {
        match transport.read(ctx, fd, &mut buf) {
            Ok(Transfer::Ready(n)) => {
                request.extend_from_slice(&buf[..n]);
                if request.windows(4).any(|w| w == b"\r\n\r\n") {
                    return Some(request);
                }
                if request.len() > MAX_REQUEST {
                    return None;
                }
            }
            // Blocking socket: would-block means the read timeout expired.
            Ok(Transfer::WouldBlock | Transfer::Eof) => return None,
            Err(e) => {
                tracing::debug!(fd, error = %e, "Request read failed");
                return None;
            }
        }
    }
}

fn respond(transport: &TlsTransport, ctx: &mut ThreadContext, fd: RawFd, root: &Path, request: &[u8]) {
    let file = request_target(request)
        .and_then(|target| resolve(root, target))
        .and_then(|path| File::open(path).ok());
    let (file, len) = match file.and_then(|f| f.metadata().ok().map(|m| (f, m.len()))) {
        Some(found) => found,
        None => {
            let body = b"not found\n";
            let header = format!(
                "HTTP/1.1 404 Not Found\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = transport.write_vectored(
                ctx,
                fd,
                &[IoSlice::new(header.as_bytes()), IoSlice::new(body)],
            );
            return;
        }
    };

    let header = format!("HTTP/1.1 200 OK\r\nContent-Length: {len}\r\nConnection: close\r\n\r\n");
    if let Err(e) = transport.write_vectored(ctx, fd, &[IoSlice::new(header.as_bytes())]) {
        tracing::debug!(fd, error = %e, "Header write failed");
        return;
    }

    let mut offset = 0u64;
    while offset < len {
        match transport.send_file(ctx, fd, &file, &mut offset, 0) {
            Ok(Transfer::Ready(n)) if n > 0 => {}
            Ok(_) => break,
            Err(e) => {
                tracing::debug!(fd, offset, error = %e, "File send failed");
                break;
            }
        }
    }
}

/// Request target of an HTTP/1.x request line, without query string.
fn request_target(request: &[u8]) -> Option<&str> {
    let line = request.split(|&b| b == b'\r').next()?;
    let line = std::str::from_utf8(line).ok()?;
    let mut parts = line.split(' ');
    match (parts.next(), parts.next()) {
        (Some("GET"), Some(target)) => target.split('?').next(),
        _ => None,
    }
}

/// Map a request target onto `root`, refusing anything that escapes it.
fn resolve(root: &Path, target: &str) -> Option<PathBuf> {
    let relative = Path::new(target.trim_start_matches('/'));
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }
    let path = root.join(relative);
    if path.is_dir() {
        Some(path.join("index.html"))
    } else {
        Some(path)
    }
}
