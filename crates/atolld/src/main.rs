//! `atolld`: runs an in-process atoll cluster.
//!
//! Boots the configured number of localities on a loopback network, then
//! drives a distributed map through its lifecycle or measures it.
//!
//! # Usage
//!
//! ```text
//! atolld demo                    # walk through the map lifecycle
//! atolld demo -c atoll.toml      # with a config file
//! atolld bench -n 10000          # timed set/get/size
//! ```

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use atoll_map::UnorderedMap;
use atoll_rpc::{ComponentRegistry, Locality, LoopbackNetwork};
use atoll_types::DistributionPolicy;
use clap::{Parser, Subcommand};
use tracing::info;

use config::CliConfig;

type DemoMap = UnorderedMap<String, u64>;

const DEMO_NAME: &str = "atoll_demo";

// -----------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------

#[derive(Parser)]
#[command(
    name = "atolld",
    version,
    about = "In-process cluster runner for the atoll distributed map"
)]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create, register, connect, read, write, size and duplicate a map.
    Demo,

    /// Time set, get and size over the configured cluster.
    Bench {
        /// Number of keys to write and read.
        #[arg(short = 'n', long, default_value = "1000")]
        count: u64,
    },
}

// -----------------------------------------------------------------------
// Entrypoint
// -----------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.as_deref()).context("failed to load config")?;

    setup_tracing(&config.log.level);

    match cli.command {
        Commands::Demo => cmd_demo(&config).await,
        Commands::Bench { count } => cmd_bench(&config, count).await,
    }
}

/// Initialize the `tracing` subscriber with the given level filter.
///
/// Respects `RUST_LOG` env var if set, otherwise uses the config value.
fn setup_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Start every locality on one loopback network.
fn boot(config: &CliConfig) -> (Arc<LoopbackNetwork>, Vec<Arc<Locality>>) {
    let network = LoopbackNetwork::new()
        .latency(config.network.latency_min_ms, config.network.latency_max_ms)
        .seed(config.network.seed)
        .into_shared();
    let registry = ComponentRegistry::new().with_partition::<String, u64>();
    let localities = network.spawn_localities(config.localities(), registry);
    info!(
        localities = localities.len(),
        latency_min_ms = config.network.latency_min_ms,
        latency_max_ms = config.network.latency_max_ms,
        "cluster started"
    );
    (network, localities)
}

fn policy(config: &CliConfig, localities: &[Arc<Locality>]) -> DistributionPolicy {
    DistributionPolicy::new()
        .with_localities(localities.iter().map(|l| l.find_here()))
        .with_partitions(config.cluster.partitions)
}

// -----------------------------------------------------------------------
// atolld demo
// -----------------------------------------------------------------------

async fn cmd_demo(config: &CliConfig) -> Result<()> {
    let (network, localities) = boot(config);
    let creator = Arc::clone(&localities[0]);
    let viewer = Arc::clone(&localities[localities.len() - 1]);

    let mut map = DemoMap::create_with(
        creator,
        &policy(config, &localities),
        config.cluster.bucket_count,
        Default::default(),
    )
    .await
    .context("failed to create map")?;
    map.register_as(DEMO_NAME).await?;

    println!("atoll demo");
    println!("  localities: {}", localities.len());
    println!("  partitions: {}", map.num_partitions());
    for part in 0..map.num_partitions() {
        println!(
            "    #{part:<3} on {}{}",
            map.locality_of(part),
            if map.is_local(part) { " (local)" } else { "" }
        );
    }
    println!();

    let remote = DemoMap::connect_to(Arc::clone(&viewer), DEMO_NAME)
        .await
        .context("failed to connect from second locality")?;
    let local_there = (0..remote.num_partitions())
        .filter(|&p| remote.is_local(p))
        .count();
    println!(
        "Connected from {}: {} partitions, {local_there} local",
        viewer.find_here(),
        remote.num_partitions()
    );

    for i in 0..100u64 {
        map.set_value(format!("key-{i}"), i * i).await?;
    }
    println!("Wrote 100 keys from {}", map.locality().find_here());

    let seen = remote.get_value(&"key-7".to_string(), false).await?;
    println!("  key-7 read from {}: {seen:?}", viewer.find_here());
    println!("  size seen by writer: {}", map.size().await?);
    println!("  size seen by reader: {}", remote.size().await?);

    let taken = remote.get_value(&"key-0".to_string(), true).await?;
    let erased = remote.erase(&"key-1".to_string()).await?;
    println!("  took key-0 ({taken:?}), erased key-1 ({erased} removed)");

    map.at("answer".to_string()).set(42)?;
    println!("  answer via proxy: {:?}", map.at("answer".to_string()).get()?);

    let copy = map.duplicate().await.context("failed to duplicate map")?;
    copy.set_value("key-2".to_string(), 0).await?;
    println!(
        "Duplicated: original key-2 = {:?}, copy key-2 = {:?}",
        map.get_value(&"key-2".to_string(), false).await?,
        copy.get_value(&"key-2".to_string(), false).await?,
    );
    println!(
        "  original size {}, copy size {}",
        map.size().await?,
        copy.size().await?
    );

    println!();
    println!("Network calls: {}", network.call_count());
    Ok(())
}

// -----------------------------------------------------------------------
// atolld bench
// -----------------------------------------------------------------------

async fn cmd_bench(config: &CliConfig, count: u64) -> Result<()> {
    let (network, localities) = boot(config);
    let map = DemoMap::create_with(
        Arc::clone(&localities[0]),
        &policy(config, &localities),
        config.cluster.bucket_count,
        Default::default(),
    )
    .await
    .context("failed to create map")?;
    let local = (0..map.num_partitions())
        .filter(|&p| map.is_local(p))
        .count();

    println!("atoll benchmark");
    println!("  keys:       {count}");
    println!("  localities: {}", localities.len());
    println!("  partitions: {} ({local} local)", map.num_partitions());
    println!();

    print!("Setting {count} keys... ");
    let start = Instant::now();
    for i in 0..count {
        map.set_value(format!("key-{i}"), i).await?;
    }
    let set_dur = start.elapsed();
    let set_ops = count as f64 / set_dur.as_secs_f64();
    println!("{:.2}s ({set_ops:.0} ops/s)", set_dur.as_secs_f64());

    print!("Getting {count} keys... ");
    let start = Instant::now();
    for i in 0..count {
        let _ = map.get_value(&format!("key-{i}"), false).await?;
    }
    let get_dur = start.elapsed();
    let get_ops = count as f64 / get_dur.as_secs_f64();
    println!("{:.2}s ({get_ops:.0} ops/s)", get_dur.as_secs_f64());

    print!("Size... ");
    let start = Instant::now();
    let size = map.size().await?;
    println!("{size} in {:.2}ms", start.elapsed().as_secs_f64() * 1000.0);

    println!();
    println!("Summary:");
    println!("  Set throughput: {set_ops:.0} ops/s");
    println!("  Get throughput: {get_ops:.0} ops/s");
    println!("  Network calls:  {}", network.call_count());
    Ok(())
}
