//! Line client for the echo server.
//!
//! Reads lines from standard input, sends each one and prints the reply.
//! Typing `QUIT` sends it and exits.
//!
//! ```text
//! cargo run -p tcpmux --example line_client -- localhost 4001
//! ```

use std::io::{self, BufRead, Write};
use std::time::Duration;

use tcpmux::{Endpoint, ListenMultiplexer, NetworkGuard, Timeout};
use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn main() -> tcpmux::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "127.0.0.1".to_owned());
    let port = args.next().and_then(|arg| arg.parse().ok()).unwrap_or(4001);

    let _net = NetworkGuard::new()?;

    let mut client = ListenMultiplexer::with_endpoint(Endpoint::resolve(&host, port)?)?;
    let id = client.connect()?;

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let Ok(line) = line else {
            break;
        };

        let Some(conn) = client.connection_mut(id) else {
            break;
        };

        conn.write(format!("{line}\n").as_bytes(), Timeout::Infinite)?;
        if line.trim() == "QUIT" {
            break;
        }

        match conn.read_until(b"\n", Timeout::After(Duration::from_secs(2)))? {
            Some(reply) => {
                let _ = stdout.write_all(&reply);
                let _ = stdout.flush();
            }
            None => warn!("no reply within two seconds"),
        }
    }

    client.disconnect();
    Ok(())
}
