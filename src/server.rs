use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::EnvFilter;

use crate::commands;
use crate::connection::Connection;
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Server settings.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// File the keyspace is loaded from on start and periodically dumped to.
    pub dump_path: Option<PathBuf>,
    /// How often the keyspace is dumped when `dump_path` is set.
    pub snapshot_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: crate::DEFAULT_PORT,
            dump_path: None,
            snapshot_interval: Duration::from_secs(300),
        }
    }
}

pub async fn run(config: Config) -> Result<(), Error> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
        .map_err(|e| debug!("Failed to initialize global tracing: {}", e));

    let listener = TcpListener::bind(("127.0.0.1", config.port)).await?;

    serve(listener, config).await
}

/// Serves clients on an already bound listener until accepting fails.
pub async fn serve(listener: TcpListener, config: Config) -> Result<(), Error> {
    let store = Store::new();

    if let Some(path) = &config.dump_path {
        if path.exists() {
            if let Err(e) = store.load(path) {
                warn!(path = %path.display(), "Failed to load dump: {}", e);
            }
        }

        tokio::spawn(snapshot(store.clone(), path.clone(), config.snapshot_interval));
    }

    info!("Redis server listening on {}", listener.local_addr()?);

    loop {
        let (socket, client_address) = listener.accept().await?;
        let store = store.clone();
        info!("Accepted connection from {:?}", client_address);

        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, client_address, store).await {
                error!("Connection failed: {}", e);
            }
        });
    }
}

/// Dumps the store to `path` every `period`.
async fn snapshot(store: Store, path: PathBuf, period: Duration) {
    let mut interval = tokio::time::interval(period);
    // The first tick completes immediately.
    interval.tick().await;

    loop {
        interval.tick().await;

        let store = store.clone();
        let target = path.clone();
        match tokio::task::spawn_blocking(move || store.dump(target)).await {
            Ok(Ok(())) => debug!(path = %path.display(), "Dumped keyspace"),
            Ok(Err(e)) => warn!(path = %path.display(), "Failed to dump keyspace: {}", e),
            Err(e) => error!("Snapshot task failed: {}", e),
        }
    }
}

#[instrument(
    name = "connection",
    skip(stream, store),
    fields(connection_id, client_address)
)]
async fn handle_connection(
    stream: TcpStream,
    client_address: SocketAddr,
    store: Store,
) -> Result<(), Error> {
    let mut conn = Connection::new(stream);

    tracing::Span::current()
        .record("connection_id", tracing::field::display(conn.id))
        .record("client_address", tracing::field::display(client_address));

    loop {
        let frame = match conn.read_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                // The rest of the stream cannot be trusted after a framing error.
                let reply = Frame::Error(format!("ERR Protocol error: {}", e));
                let _ = conn.write_frame(reply).await;
                return Err(e);
            }
        };

        debug!("Received frame from client: {:?}", frame);
        let res = commands::execute(frame, store.clone());
        debug!("Sending response to client: {:?}", res);

        conn.write_frame(res).await?;
    }

    info!("Connection closed");
    Ok(())
}
