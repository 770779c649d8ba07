//! Tollgrid Node - all services on one in-process bus
//!
//! Boots the plate-recognition responder, the pricing/ledger responder and
//! one toll-booth orchestrator per `--toll-id`, then idles until ctrl-c.
//!
//! # Usage
//!
//! ```bash
//! # Two booths, fares from a seed file, persistent ledger
//! tollgrid-node --toll-id MI_Ovest --toll-id TO_Sud \
//!     --fares fares.json --data-dir ./ledger-data
//!
//! # Scripted traffic: three telepass vehicles entry->exit
//! tollgrid-node --toll-id MI_Ovest --toll-id TO_Sud --demo 3
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use tollgrid_booth::{BoothConfig, TollBooth};
use tollgrid_camera::PlateRecognizer;
use tollgrid_core::messages::now_iso;
use tollgrid_core::topics::{commands_topic, filters, Channel, Direction};
use tollgrid_core::{MessageBus, SessionRegistry, QOS_AT_LEAST_ONCE};
use tollgrid_ledger::{FareTable, LedgerService, LedgerStore};

/// Simulation node for the tollgrid highway toll network
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Tollbooth id to run an orchestrator for (can be repeated)
    #[arg(long = "toll-id", default_value = "MI_Ovest")]
    toll_ids: Vec<String>,

    /// Fare seed file (JSON array of priced tollbooth pairs)
    #[arg(long)]
    fares: Option<String>,

    /// Ledger directory; without it the ledger stays in memory
    #[arg(long)]
    data_dir: Option<String>,

    /// Number of scripted telepass vehicles to drive through
    #[arg(long, default_value = "0")]
    demo: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║           Tollgrid Node - Highway Toll Network               ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Booths:   {:<50} ║", args.toll_ids.join(", "));
    println!("║  Ledger:   {:<50} ║", args.data_dir.as_deref().unwrap_or("(in memory)"));
    println!("║  Fares:    {:<50} ║", args.fares.as_deref().unwrap_or("(none)"));
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    let bus = MessageBus::new();

    // Pricing & ledger
    let store = match &args.data_dir {
        Some(dir) => LedgerStore::open(dir)?,
        None => LedgerStore::in_memory(),
    };
    let fares = FareTable::new();
    if let Some(path) = &args.fares {
        fares.load_json(path)?;
    } else {
        warn!("No fare file given; every crossing prices at zero");
    }
    let ledger = LedgerService::new(bus.clone(), Arc::new(store), fares);
    ledger.clone().spawn();

    // Plate recognition
    PlateRecognizer::new(bus.clone()).spawn();

    // One orchestrator per booth
    for toll_id in &args.toll_ids {
        let sessions = SessionRegistry::new();
        TollBooth::new(bus.clone(), sessions, BoothConfig::new(toll_id)).spawn();
    }

    // Observe state events for the operator console
    let mut state_rx = bus.subscribe(filters::STATE);
    tokio::spawn(async move {
        while let Some(delivery) = state_rx.recv().await {
            info!("[state] {} {}", delivery.topic, delivery.payload);
        }
    });

    if args.demo > 0 {
        run_demo(&bus, &args.toll_ids, args.demo, &ledger).await;
    }

    info!("Node running; ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    Ok(())
}

/// Drive scripted telepass vehicles entry-at-first-booth, exit-at-last
async fn run_demo(bus: &MessageBus, toll_ids: &[String], vehicles: u32, ledger: &LedgerService) {
    let entry_booth = &toll_ids[0];
    let exit_booth = toll_ids.last().unwrap_or(entry_booth);

    info!(
        "Demo: {} vehicle(s), {} -> {}",
        vehicles, entry_booth, exit_booth
    );

    for i in 1..=vehicles {
        let telepass_id = format!("TP-{:03}", i);

        let entry = serde_json::json!({
            "timestamp": now_iso(),
            "type": "ENTRY_TELEPASS_COMMAND",
            "telepassId": telepass_id,
        });
        bus.publish(
            &commands_topic(entry_booth, Direction::Entry, Channel::Telepass),
            entry.to_string(),
            QOS_AT_LEAST_ONCE,
        )
        .await;
        tokio::time::sleep(Duration::from_millis(300)).await;

        let exit = serde_json::json!({
            "timestamp": now_iso(),
            "type": "EXIT_TELEPASS_COMMAND",
            "telepassId": telepass_id,
        });
        bus.publish(
            &commands_topic(exit_booth, Direction::Exit, Channel::Telepass),
            exit.to_string(),
            QOS_AT_LEAST_ONCE,
        )
        .await;
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    tokio::time::sleep(Duration::from_millis(500)).await;
    let summary = ledger.summary();
    info!(
        "Demo done: open debt {} cents, collected {} cents",
        summary.open_debt_cents, summary.collected_cents
    );
}
