use anyhow::Context;
use clap::{Parser, Subcommand};
use pagewatch_engine::channel::JsonLinesChannel;
use pagewatch_engine::config::{ConfigLoader, MonitorConfig};
use pagewatch_engine::dom::{DocumentSnapshot, ReadyState};
use pagewatch_engine::host::{Host, ParentChannel, SnapshotDocument, SystemClock};
use pagewatch_engine::monitor::Monitor;
use pagewatch_engine::scheduler::TokioScheduler;
use pagewatch_engine::transport::{HttpTransport, Request, RequestBody, Transport};
use pagewatch_h::HeadlessHost;
use pagewatch_r::WebSocketChannel;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pagewatch", version, about = "Page runtime monitor")]
struct Args {
    #[command(subcommand)]
    mode: Mode,

    /// Monitor config file (defaults to $PAGEWATCH_CONFIG, ./pagewatch.yaml, then ~/.pagewatch/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Mode {
    /// Watch a page in headless Chromium and relay its events
    Headless {
        #[arg(long)]
        url: String,
        /// Launch browser in visible mode (not headless)
        #[arg(long)]
        visible: bool,
        /// Relay envelopes to WebSocket parents on this port instead of stdout
        #[arg(long)]
        ws_port: Option<u16>,
        /// Stop after this many seconds (runs until Ctrl-C otherwise)
        #[arg(long)]
        duration_secs: Option<u64>,
    },
    /// Issue one request through the observed transport
    Fetch {
        #[arg(long)]
        url: String,
        #[arg(long)]
        method: Option<String>,
        #[arg(long)]
        body: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries JSON-lines envelopes
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => ConfigLoader::load_from(path)
            .await
            .with_context(|| format!("loading {}", path.display()))?,
        None => ConfigLoader::load_default().await?,
    };

    match args.mode {
        Mode::Headless {
            url,
            visible,
            ws_port,
            duration_secs,
        } => run_headless(config, &url, visible, ws_port, duration_secs).await,
        Mode::Fetch { url, method, body } => run_fetch(config, &url, method, body).await,
    }
}

async fn parent_channel(ws_port: Option<u16>) -> anyhow::Result<Arc<dyn ParentChannel>> {
    match ws_port {
        Some(port) => {
            let relay = WebSocketChannel::new(port);
            let addr = relay.start().await?;
            eprintln!("Relaying envelopes to WebSocket parents at ws://{}", addr);
            Ok(Arc::new(relay))
        }
        None => Ok(Arc::new(JsonLinesChannel::stdout())),
    }
}

async fn run_headless(
    config: MonitorConfig,
    url: &str,
    visible: bool,
    ws_port: Option<u16>,
    duration_secs: Option<u64>,
) -> anyhow::Result<()> {
    url::Url::parse(url).with_context(|| format!("invalid url: {}", url))?;
    let channel = parent_channel(ws_port).await?;

    let mut host = HeadlessHost::new(visible);
    host.launch(config, Some(channel))
        .await
        .context("Failed to launch headless host")?;
    let landed = host.navigate(url).await?;
    info!("Watching {}", landed);

    match duration_secs {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => {
            tokio::signal::ctrl_c().await?;
            info!("Interrupted");
        }
    }

    host.close().await?;
    Ok(())
}

async fn run_fetch(
    config: MonitorConfig,
    url: &str,
    method: Option<String>,
    body: Option<String>,
) -> anyhow::Result<()> {
    url::Url::parse(url).with_context(|| format!("invalid url: {}", url))?;

    let document = Arc::new(SnapshotDocument::new(DocumentSnapshot::new(
        url,
        ReadyState::Complete,
    )));
    let host = Host {
        document,
        channel: Some(Arc::new(JsonLinesChannel::stdout())),
        clock: Arc::new(SystemClock),
        scheduler: Arc::new(TokioScheduler::current()),
    };
    let mut monitor = Monitor::attach(config, host);
    let transport = monitor.instrument_transport(HttpTransport::new())?;

    let mut request = Request::get(url);
    request.method = method;
    if let Some(body) = body {
        request = request.with_body(RequestBody::Text(body));
    }

    let outcome = transport.send(request).await;
    monitor.shutdown();
    match outcome {
        Ok(response) => {
            eprintln!("{} {}", response.status, response.status_text);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
