//! Cobble - a streamed voxel world with authoritative edit sync
//!
//! This is the headless session runner. It hosts an authority (and a local
//! world attached to it) or joins a remote one, then streams chunks around a
//! slowly wandering viewer while edits replicate between peers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use cobble_core::{BlockCatalog, ChunkCoord, WorldConfig};
use cobble_net::{Authority, PeerClient, RemoteEdit};
use cobble_world::{ChunkSync, NullBackend, TerrainGenerator, World};

const DEFAULT_ADDR: &str = "127.0.0.1:4650";
const CONFIG_PATH: &str = "cobble.toml";
const SEED_TIMEOUT: Duration = Duration::from_secs(5);

enum Mode {
    Host { addr: String },
    Join { url: String },
}

fn parse_args() -> Result<Mode> {
    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("host") => Ok(Mode::Host {
            addr: args.next().unwrap_or_else(|| DEFAULT_ADDR.to_string()),
        }),
        Some("join") => match args.next() {
            Some(url) => Ok(Mode::Join { url }),
            None => bail!("usage: cobble join <ws://host:port>"),
        },
        _ => bail!("usage: cobble host [addr] | cobble join <ws://host:port>"),
    }
}

/// Read `cobble.toml` if present, otherwise fall back to defaults. Missing
/// keys in the file also fall back per-field.
fn load_config() -> Result<WorldConfig> {
    match std::fs::read_to_string(CONFIG_PATH) {
        Ok(text) => toml::from_str(&text).context("failed to parse cobble.toml"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(WorldConfig::default()),
        Err(err) => Err(err).context("failed to read cobble.toml"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")?;

    let mode = parse_args()?;
    let config = load_config()?;

    let (seed, sync, edits): (u32, Arc<dyn ChunkSync>, _) = match &mode {
        Mode::Host { addr } => {
            let seed = rand::random();
            let authority = Arc::new(Authority::new(seed, &config));
            let listener = TcpListener::bind(addr.as_str())
                .await
                .with_context(|| format!("failed to bind {addr}"))?;
            info!(addr, seed, "hosting session");
            tokio::spawn(authority.clone().serve(listener));
            let (peer, edits) = authority.local_peer();
            (seed, Arc::new(peer), edits)
        }
        Mode::Join { url } => {
            let (client, edits) = PeerClient::connect(url)
                .await
                .with_context(|| format!("failed to connect to {url}"))?;
            let seed = client
                .request_seed(SEED_TIMEOUT)
                .await
                .context("failed to fetch session seed")?;
            info!(url, seed, "joined session");
            (seed, Arc::new(client), edits)
        }
    };

    let world = Arc::new(World::new(
        config.clone(),
        Arc::new(BlockCatalog::builtin()),
        Arc::new(TerrainGenerator::new(seed, config.chunk_shape)),
        Arc::new(NullBackend),
        sync,
    ));

    world.init(ChunkCoord::new(0, 0)).await?;
    info!(chunks = world.resident_chunks().await.len(), "world ready");

    run_session(world, config, edits).await
}

/// Pump remote edits into the world and walk the viewer east one chunk per
/// update tick so streaming stays exercised.
async fn run_session(
    world: Arc<World>,
    config: WorldConfig,
    mut edits: tokio::sync::mpsc::UnboundedReceiver<RemoteEdit>,
) -> Result<()> {
    let edit_world = world.clone();
    tokio::spawn(async move {
        while let Some(edit) = edits.recv().await {
            edit_world
                .apply_remote_edit(edit.chunk, edit.local, edit.block, edit.seq)
                .await;
        }
        info!("edit stream closed");
    });

    let mut ticker = tokio::time::interval(config.update_interval());
    let mut center = ChunkCoord::new(0, 0);
    loop {
        ticker.tick().await;
        center = center.offset(1, 0);
        world.update(center).await?;
        info!(
            x = center.x,
            z = center.z,
            syncs = world.data_sync_count().await,
            "streamed to new center"
        );
    }
}
