use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use vcga_bridge::BridgeClient;
use vcga_core::{
    classifier::classify,
    config::Config,
    controller::BotController,
    counters::{CounterReport, CounterStore},
    ports::{Clock, SystemClock},
    records::RecordCatalog,
    reply::{resolve, ReplyComposer},
};

#[derive(Parser)]
#[command(name = "vcga")]
#[command(about = "WhatsApp auto-responder for service-point lookups")]
struct Cli {
    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Poll the bridge and answer messages until Ctrl-C (default)
    Run,
    /// Print today's counters
    Report {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Compose the reply a message would get, without sending it
    Lookup {
        /// Message text, e.g. `123456789` or `/Y21C000000`
        text: String,
        /// Sender name used in the reply header
        #[arg(long, default_value = "Console")]
        sender: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    vcga_core::logging::init("vcga")?;
    let cli = Cli::parse();
    let cfg = Config::load().context("loading configuration")?;

    match cli.cmd.unwrap_or(Command::Run) {
        Command::Run => run(&cfg).await,
        Command::Report { json } => report(&cfg, json),
        Command::Lookup { text, sender } => lookup(&cfg, &text, &sender),
    }
}

async fn run(cfg: &Config) -> anyhow::Result<()> {
    let bridge = Arc::new(BridgeClient::new(cfg.bridge_url.clone(), cfg.bridge_timeout)?);
    let controller = BotController::from_config(cfg, bridge, Arc::new(SystemClock));

    controller
        .start()
        .await
        .with_context(|| format!("starting bot against {}", cfg.bridge_url))?;

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    info!("shutdown requested");

    let outcome = controller.stop().await?;
    let status = controller.status().await;
    info!(?outcome, cycles = status.cycles, "bot shut down");
    println!("{}", controller.report().render_text());
    Ok(())
}

fn report(cfg: &Config, json: bool) -> anyhow::Result<()> {
    let store = CounterStore::open(cfg.counters_file.clone(), SystemClock.now().date());
    let report = CounterReport::from(store.snapshot());
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.render_text());
    }
    Ok(())
}

fn lookup(cfg: &Config, text: &str, sender: &str) -> anyhow::Result<()> {
    let catalog = RecordCatalog::new(cfg.snapshot_files.clone());
    if let Err(e) = catalog.refresh() {
        warn!(error = %e, "no record snapshots loaded");
    }
    let intent = classify(text);
    let resolution = resolve(&intent, text, &catalog);
    let composer = ReplyComposer::from_config(cfg);
    println!("{}", composer.compose(&resolution, sender, SystemClock.now()));
    Ok(())
}
