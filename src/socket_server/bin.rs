//! Pinstream Daemon Binary
//!
//! Accepts client WebSockets, keeps the connection registry current and fans
//! change batches out to every registered connection.
//!
//! # Usage
//!
//! ```bash
//! pinstream-daemon --port 9847 --changes -
//! pinstream-daemon --config /etc/pinstream.toml --changes /var/log/pins.jsonl
//! tail -F pins.jsonl | pinstream-daemon --callback-endpoint https://ws.example.com/prod --changes -
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufRead, BufReader};
use tokio::net::TcpListener;

use pinstream::changelog::run_change_feed;
use pinstream::config::DaemonConfig;
use pinstream::delivery::{CallbackChannel, DeliveryChannel, SessionHub};
use pinstream::dispatcher::ChangeDispatcher;
use pinstream::registry::SqliteConnectionRegistry;
use pinstream::socket_server::{serve_until, DaemonContext};

/// Pinstream Push Daemon
#[derive(Parser, Debug)]
#[command(name = "pinstream-daemon")]
#[command(about = "Change-capture fan-out daemon for live pin maps")]
struct Args {
    /// TOML config file; flags and environment override its values
    #[arg(long, env = "PINSTREAM_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "PINSTREAM_PORT")]
    port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "PINSTREAM_HOST")]
    host: Option<String>,

    /// Connection registry database
    #[arg(long, env = "PINSTREAM_DB")]
    db: Option<PathBuf>,

    /// Largest envelope pushed to a client, in bytes
    #[arg(long, env = "PINSTREAM_MAX_PAYLOAD")]
    max_payload: Option<usize>,

    /// How long a push may wait on a full socket queue
    #[arg(long, env = "PINSTREAM_PUSH_TIMEOUT_MS")]
    push_timeout_ms: Option<u64>,

    /// Frames buffered per socket
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Push through a connection-management API instead of serving sockets
    #[arg(long, env = "PINSTREAM_CALLBACK_URL")]
    callback_endpoint: Option<String>,

    /// Change batches as JSON Lines: a file path, or "-" for stdin
    #[arg(long)]
    changes: Option<String>,

    /// Redeliveries of a batch whose dispatch failed
    #[arg(long)]
    max_redeliveries: Option<u32>,

    /// Pause between redeliveries
    #[arg(long)]
    redelivery_delay_ms: Option<u64>,

    /// Object-store base URL for signed image links
    #[arg(long, env = "PINSTREAM_LINK_BASE_URL")]
    link_base_url: Option<String>,

    /// Image bucket name
    #[arg(long, env = "PINSTREAM_IMAGE_BUCKET")]
    link_bucket: Option<String>,

    /// Key used to sign image links
    #[arg(long, env = "PINSTREAM_LINK_SECRET", hide_env_values = true)]
    link_secret: Option<String>,

    /// Lifetime of a signed link in seconds
    #[arg(long)]
    link_ttl_secs: Option<u64>,

    /// Unsigned local object store (development)
    #[arg(long, env = "PINSTREAM_S3_ENDPOINT")]
    link_local_endpoint: Option<String>,
}

impl Args {
    /// Layer flags over the config file over the defaults
    fn resolve(&self) -> pinstream::Result<DaemonConfig> {
        let mut config = match &self.config {
            Some(path) => DaemonConfig::load_from(path)?,
            None => DaemonConfig::default(),
        };

        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(db) = &self.db {
            config.db_path = db.clone();
        }
        if let Some(max_payload) = self.max_payload {
            config.max_payload_bytes = max_payload;
        }
        if let Some(timeout) = self.push_timeout_ms {
            config.push_timeout_ms = timeout;
        }
        if let Some(capacity) = self.queue_capacity {
            config.queue_capacity = capacity;
        }
        if let Some(endpoint) = &self.callback_endpoint {
            config.callback_endpoint = Some(endpoint.clone());
        }
        if let Some(max) = self.max_redeliveries {
            config.max_redeliveries = max;
        }
        if let Some(delay) = self.redelivery_delay_ms {
            config.redelivery_delay_ms = delay;
        }
        if let Some(base_url) = &self.link_base_url {
            config.links.base_url = Some(base_url.clone());
        }
        if let Some(bucket) = &self.link_bucket {
            config.links.bucket = Some(bucket.clone());
        }
        if let Some(secret) = &self.link_secret {
            config.links.secret = Some(secret.clone());
        }
        if let Some(ttl) = self.link_ttl_secs {
            config.links.ttl_secs = ttl;
        }
        if let Some(endpoint) = &self.link_local_endpoint {
            config.links.local_endpoint = Some(endpoint.clone());
        }

        config.validate()?;
        Ok(config)
    }
}

async fn open_changes(source: &str) -> std::io::Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    if source == "-" {
        return Ok(Box::new(BufReader::new(tokio::io::stdin())));
    }
    let file = tokio::fs::File::open(source).await?;
    Ok(Box::new(BufReader::new(file)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pinstream=info".parse()?)
                .add_directive("pinstream_daemon=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = args.resolve()?;

    let registry = Arc::new(SqliteConnectionRegistry::open(&config.db_path)?);
    tracing::info!("Connection registry at {}", config.db_path.display());

    let links = config.link_resolver()?;
    let hub = Arc::new(SessionHub::new(
        config.max_payload_bytes,
        config.push_timeout(),
        config.queue_capacity,
    ));

    let channel: Arc<dyn DeliveryChannel> = match &config.callback_endpoint {
        Some(endpoint) => {
            tracing::info!("Pushing through connection API at {}", endpoint);
            Arc::new(CallbackChannel::new(endpoint, config.push_timeout())?)
        }
        None => hub.clone(),
    };
    let dispatcher = Arc::new(ChangeDispatcher::new(registry.clone(), channel, links));

    // Change-log intake runs beside the socket server
    let feed = match &args.changes {
        Some(source) => {
            let reader = open_changes(source).await?;
            let dispatcher = Arc::clone(&dispatcher);
            let policy = config.redelivery();
            tracing::info!("Reading change batches from {}", source);
            Some(tokio::spawn(async move {
                if let Err(e) = run_change_feed(reader, &dispatcher, policy).await {
                    tracing::error!("Change feed stopped: {}", e);
                }
            }))
        }
        None => None,
    };

    if config.callback_endpoint.is_some() {
        // Sockets live behind the connection API; only the feed runs here
        let Some(mut feed) = feed else {
            anyhow::bail!("--callback-endpoint needs --changes");
        };
        tokio::select! {
            _ = &mut feed => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                feed.abort();
                let _ = feed.await;
            }
        }
    } else {
        let ctx = Arc::new(DaemonContext::new(registry.clone(), hub));
        let listener = TcpListener::bind(config.bind_addr()).await?;
        tracing::info!("Pinstream daemon listening on ws://{}", listener.local_addr()?);

        let interrupted = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Cannot listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Interrupted, shutting down");
        };
        // Returns once every connection task has stopped
        serve_until(listener, ctx, interrupted).await;

        if let Some(feed) = feed {
            feed.abort();
            let _ = feed.await;
        }
    }

    // Last handles: the SQLite connection closes here
    drop(dispatcher);
    drop(registry);
    tracing::info!("Pinstream daemon stopped");
    Ok(())
}
