//! gridscand — the gridscan daemon.
//!
//! Loads the node, farm, and gateway collections of an explorer directory
//! and reports aggregate grid capacity.
//!
//! # Usage
//!
//! ```text
//! gridscand --config gridscan.toml watch
//! gridscand --base-url http://explorer.local:8080/explorer summary
//! gridscand --fixture grid.json --mode progressive watch
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use gridscan_core::{CollectionKind, Farm, FetchMode, Gateway, GridscanConfig, Node};
use gridscan_scheduler::{Explorer, ExplorerSummary};
use gridscan_source::{CollectionSource, HttpSource, MemorySource};

const DEFAULT_FILTER: &str = "info,gridscan=debug,gridscand=debug";

#[derive(Parser)]
#[command(name = "gridscand", about = "gridscan explorer sync daemon")]
struct Cli {
    /// Path to gridscan.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Explorer API root; overrides `source.base_url`.
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Records per page; overrides `fetch.page_size`.
    #[arg(long, global = true)]
    page_size: Option<u32>,

    /// Fetch mode; overrides `fetch.mode`.
    #[arg(long, global = true, value_enum)]
    mode: Option<ModeArg>,

    /// Progressive poll interval (e.g. "750ms"); overrides `fetch.poll_interval`.
    #[arg(long, global = true)]
    poll_interval: Option<String>,

    /// Serve collections from a JSON file instead of the explorer.
    #[arg(long, global = true)]
    fixture: Option<PathBuf>,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load all collections and log progress until they are complete.
    Watch,
    /// Load all collections in bulk and print their summaries as JSON.
    Summary,
    /// Print the effective configuration as TOML.
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Bulk,
    Progressive,
}

impl From<ModeArg> for FetchMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Bulk => FetchMode::Bulk,
            ModeArg::Progressive => FetchMode::Progressive,
        }
    }
}

/// Offline collections, as served by `--fixture`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Fixture {
    nodes: Vec<Node>,
    farms: Vec<Farm>,
    gateways: Vec<Gateway>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let mut config = resolve_config(&cli)?;

    match cli.command {
        Command::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
        Command::Summary => {
            config.fetch.mode = FetchMode::Bulk;
            match &cli.fixture {
                Some(path) => summary(Explorer::from_config(load_fixture(path)?, &config)?).await,
                None => {
                    let source = HttpSource::from_config(&config.source)?;
                    summary(Explorer::from_config(source, &config)?).await
                }
            }
        }
        Command::Watch => match &cli.fixture {
            Some(path) => watch(Explorer::from_config(load_fixture(path)?, &config)?).await,
            None => {
                let source = HttpSource::from_config(&config.source)?;
                watch(Explorer::from_config(source, &config)?).await
            }
        },
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// File values first, then command-line overrides.
fn resolve_config(cli: &Cli) -> anyhow::Result<GridscanConfig> {
    let mut config = match &cli.config {
        Some(path) => GridscanConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => GridscanConfig::default(),
    };

    if let Some(base_url) = &cli.base_url {
        config.source.base_url = base_url.clone();
    }
    if let Some(page_size) = cli.page_size {
        config.fetch.page_size = page_size;
    }
    if let Some(mode) = cli.mode {
        config.fetch.mode = mode.into();
    }
    if let Some(interval) = &cli.poll_interval {
        config.fetch.poll_interval = interval.clone();
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn load_fixture(path: &Path) -> anyhow::Result<MemorySource> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading fixture {}", path.display()))?;
    let fixture: Fixture = serde_json::from_str(&content)
        .with_context(|| format!("parsing fixture {}", path.display()))?;
    info!(
        path = %path.display(),
        nodes = fixture.nodes.len(),
        farms = fixture.farms.len(),
        gateways = fixture.gateways.len(),
        "serving fixture collections"
    );
    Ok(MemorySource::new()
        .with_records(&fixture.nodes)
        .with_records(&fixture.farms)
        .with_records(&fixture.gateways))
}

async fn summary<S: CollectionSource>(explorer: Explorer<S>) -> anyhow::Result<()> {
    if let Err(e) = explorer.start_all().await {
        warn!(error = %e, "load incomplete, reporting partial summary");
    }
    let summary = explorer.summaries().await;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn watch<S: CollectionSource>(explorer: Explorer<S>) -> anyhow::Result<()> {
    let mut nodes = explorer.subscribe(CollectionKind::Nodes);
    let mut farms = explorer.subscribe(CollectionKind::Farms);
    let mut gateways = explorer.subscribe(CollectionKind::Gateways);

    if let Err(e) = explorer.start_all().await {
        error!(error = %e, "collection load failed");
    }

    loop {
        let summary = explorer.summaries().await;
        log_progress(&summary);
        if summary.all_settled() {
            info!("all collections loaded");
            break;
        }

        tokio::select! {
            changed = nodes.changed() => changed?,
            changed = farms.changed() => changed?,
            changed = gateways.changed() => changed?,
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                explorer.reset_all().await;
                break;
            }
        }
    }

    Ok(())
}

fn log_progress(summary: &ExplorerSummary) {
    let nodes = &summary.nodes.aggregate;
    let gateways = &summary.gateways.aggregate;
    info!(
        nodes = nodes.registered,
        nodes_online = nodes.online,
        countries = nodes.countries,
        cru = nodes.resources.cru,
        mru = nodes.resources.mru,
        sru = nodes.resources.sru,
        hru = nodes.resources.hru,
        farms = summary.farm_count(),
        gateways = gateways.registered,
        gateways_online = gateways.online,
        "grid capacity"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("gridscand").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn overrides_apply_over_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[fetch]
page_size = 100
poll_interval = "1s"
"#
        )
        .unwrap();
        let path = file.path().to_str().unwrap();

        let cli = parse(&["--config", path, "--mode", "bulk", "--page-size", "25", "summary"]);
        let config = resolve_config(&cli).unwrap();
        assert_eq!(config.fetch.page_size, 25);
        assert_eq!(config.fetch.mode, FetchMode::Bulk);
        assert_eq!(config.fetch.poll_interval, "1s");
    }

    #[test]
    fn invalid_override_is_rejected() {
        let cli = parse(&["--poll-interval", "soon", "watch"]);
        assert!(resolve_config(&cli).is_err());
    }

    #[test]
    fn fixture_file_loads() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"nodes": [{{"id": 1, "farm_id": 2}}], "farms": [{{"id": 2, "name": "freefarm"}}]}}"#
        )
        .unwrap();
        let source = load_fixture(file.path()).unwrap();
        assert_eq!(source.request_count(CollectionKind::Nodes), 0);
    }

    #[tokio::test]
    async fn fixture_summary_counts_collections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"nodes": [{{"id": 1, "farm_id": 2}}, {{"id": 2, "farm_id": 2}}], "farms": [{{"id": 2}}]}}"#
        )
        .unwrap();
        let mut config = GridscanConfig::default();
        config.fetch.mode = FetchMode::Bulk;

        let explorer = Explorer::from_config(load_fixture(file.path()).unwrap(), &config).unwrap();
        explorer.start_all().await.unwrap();
        let summary = explorer.summaries().await;

        assert_eq!(summary.nodes.aggregate.registered, 2);
        assert_eq!(summary.farm_count(), 1);
        assert!(summary.all_settled());
    }
}
