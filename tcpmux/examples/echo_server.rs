//! Line echo server.
//!
//! Every line a client sends is written back to it. A client sending
//! `QUIT` stops the server.
//!
//! ```text
//! cargo run -p tcpmux --example echo_server -- 4001
//! ```

use tcpmux::{ListenMultiplexer, NetworkGuard, Timeout};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn main() -> tcpmux::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tcpmux=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let port = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(4001);

    let _net = NetworkGuard::new()?;

    let mut server = ListenMultiplexer::new(port)?;
    server.bind_and_listen(16)?;
    info!(port, "echo server listening");

    let mut running = true;
    while running {
        server.poll_readable(Timeout::Infinite)?;

        let mut finished = Vec::new();
        while let Some((id, conn)) = server.next_readable() {
            match conn.read_until(b"\n", Timeout::Immediate) {
                Ok(Some(line)) => {
                    if line.trim_ascii() == b"QUIT" {
                        info!(%id, "quit requested");
                        running = false;
                        continue;
                    }
                    if let Err(err) = conn.write(&line, Timeout::Infinite) {
                        warn!(%id, error = %err, "echo failed");
                        finished.push(id);
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    if let Ok(Some(tail)) = conn.read(Timeout::Immediate) {
                        info!(%id, bytes = tail.len(), "dropping unterminated tail");
                    }
                    info!(%id, reason = %err, "client gone");
                    finished.push(id);
                }
            }
        }

        for id in finished {
            server.close(id);
        }
        server.cleanup();
    }

    server.disconnect();
    Ok(())
}
