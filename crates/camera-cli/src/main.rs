//! Remote camera CLI
//!
//! Connects to a camera host over TCP and runs one client operation. The
//! address defaults to `REMOTE_CAMERA_ADDR` or `127.0.0.1:8765`.

use anyhow::{Context, Result, bail};
use camera_bridge::TcpConfig;
use camera_client::{CameraClient, ErrorHandler, Scope};
use camera_core::CameraError;
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "remote-camera")]
#[command(about = "Talk to a remote camera host", long_about = None)]
struct Cli {
    /// Camera host address (HOST:PORT)
    #[arg(long)]
    addr: Option<String>,

    /// Per-request timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// MIME type hint for image reads; append `+lazy` to skip decoding
    #[arg(long)]
    mime: Option<String>,

    /// Camera resource name on the host
    camera: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print camera properties
    Properties,
    /// Save one image
    Image { path: PathBuf },
    /// List the images of one capture
    Images,
    /// Print point cloud statistics
    Pointcloud,
    /// Pull frames from a stream, then close
    Stream {
        count: usize,
        /// Give up after this many read failures in a row
        #[arg(long, default_value = "5")]
        max_errors: usize,
    },
    /// Run an arbitrary command given as a JSON object
    Do { json: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging on stderr so command output stays clean
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    let mut config = TcpConfig::from_env();
    if let Some(addr) = cli.addr {
        config.address = addr;
    }
    if let Some(ms) = cli.timeout_ms {
        config = config.with_timeout(Duration::from_millis(ms));
    }

    let connection = camera_bridge::connect(&config)
        .await
        .with_context(|| format!("connecting to {}", config.address))?;
    let client = CameraClient::new(cli.camera, Arc::new(connection));

    let mut scope = Scope::new();
    if let Some(hint) = cli.mime {
        scope = scope.with_mime_hint(hint);
    }

    let result = run(&client, &scope, cli.command).await;
    client.close().await;
    result
}

async fn run(client: &CameraClient, scope: &Scope, command: Commands) -> Result<()> {
    match command {
        Commands::Properties => {
            let props = client.properties(scope).await?;
            println!("mime types:   {}", props.mime_types.join(", "));
            println!("supports pcd: {}", props.supports_pcd);
            match &props.intrinsics {
                Some(i) => println!(
                    "intrinsics:   {}x{} fx={} fy={} ppx={} ppy={}",
                    i.width, i.height, i.fx, i.fy, i.ppx, i.ppy
                ),
                None => println!("intrinsics:   none"),
            }
            match &props.distortion {
                Some(d) => println!("distortion:   {} {:?}", d.model(), d.parameters()),
                None => println!("distortion:   none"),
            }
            if let Err(e) = props.projector() {
                warn!("No usable projector: {}", e);
            }
        }
        Commands::Image { path } => {
            let image = client.read(scope).await?;
            match image.encoded_bytes() {
                Some(bytes) => std::fs::write(&path, bytes)
                    .with_context(|| format!("writing {}", path.display()))?,
                None => image
                    .pixels()?
                    .save(&path)
                    .with_context(|| format!("writing {}", path.display()))?,
            }
            info!("Saved {} image to {}", image.mime_type(), path.display());
        }
        Commands::Images => {
            let (images, metadata) = client.images(scope).await?;
            if let Some(ms) = metadata.captured_at_ms {
                println!("captured at {} ms", ms);
            }
            for named in &images {
                let size = named
                    .image
                    .dimensions()
                    .map(|(w, h)| format!("{}x{}", w, h))
                    .unwrap_or_else(|e| format!("undecodable: {}", e));
                println!("{:<16} {:<20} {}", named.source_name, named.image.mime_type(), size);
            }
        }
        Commands::Pointcloud => {
            let cloud = client.next_point_cloud(scope).await?;
            println!("points: {} (color: {})", cloud.len(), cloud.has_color());
            if let Some((min, max)) = cloud.bounds() {
                println!("bounds: {:?} .. {:?}", min, max);
            }
        }
        Commands::Stream { count, max_errors } => {
            let on_error: ErrorHandler = Arc::new(|e: &CameraError| warn!("Stream read failed: {}", e));
            let mut stream = client.stream(scope, vec![on_error]).await?;
            let mut received = 0;
            let mut failures = 0;
            while received < count {
                match stream.next().await {
                    Some(Ok(frame)) => {
                        received += 1;
                        failures = 0;
                        println!("frame {}: {}", received, frame.mime_type());
                    }
                    Some(Err(e)) => {
                        failures += 1;
                        if failures >= max_errors.max(1) {
                            stream.close();
                            bail!("giving up after {} failed reads: {}", failures, e);
                        }
                    }
                    None => break,
                }
            }
            stream.close();
        }
        Commands::Do { json } => {
            let command: Map<String, Value> =
                serde_json::from_str(&json).context("command must be a JSON object")?;
            let result = client.do_command(scope, command).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }
    Ok(())
}
