//! Workshare CLI
//!
//! Thin wrapper around workshare-core for command-line usage.
//!
//! ## Usage
//!
//! ```bash
//! # Show the identity this workstation announces
//! workshare identity
//!
//! # Announce a project and print peer and conflict events until Ctrl+C
//! workshare serve --project "Tower A" --guid 5f1c
//!
//! # Listen for a few seconds, then list the peers that were heard
//! workshare peers --project "Tower A" --wait 12
//!
//! # Run the predictor, advisor and hotspot analysis over a recorded scenario
//! workshare analyze scenario.json
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use workshare_core::{
    ActivityType, CollabEngine, DiscoveryEvent, DiscoveryService, ElementActivity, EngineConfig,
    LocalIdentity, MonitorConfig, MonitorEvent, PendingChange, ProjectInfo, UserId, WorksetInfo,
    WorkshareMonitor,
};

/// Workshare - LAN peer discovery and conflict prediction
#[derive(Parser)]
#[command(name = "workshare")]
#[command(version = "0.1.0")]
#[command(about = "Workshare - LAN peer discovery and conflict prediction")]
#[command(
    long_about = "Finds collaborators working on the same central model over UDP broadcast and warns about conflicting edits before anyone syncs."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Config file (default: <config dir>/workshare/config.json, if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the announced username
    #[arg(long, global = true)]
    username: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the local identity
    Identity,

    /// Announce a project and print events until Ctrl+C
    Serve {
        /// Project name to announce
        #[arg(short, long)]
        project: String,

        /// Project guid to announce
        #[arg(short, long, default_value = "")]
        guid: String,

        /// Discovery port (default from config, normally 51234)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Listen for announcements, then list discovered peers
    Peers {
        /// Project name to announce while listening
        #[arg(short, long)]
        project: String,

        /// Project guid to announce while listening
        #[arg(short, long, default_value = "")]
        guid: String,

        /// Seconds to listen before listing
        #[arg(short, long, default_value_t = 12)]
        wait: u64,

        /// Show peers from every project, not only this one
        #[arg(long)]
        all: bool,
    },

    /// Analyze a JSON scenario of activity and pending changes
    Analyze {
        /// Scenario file
        scenario: PathBuf,
    },
}

/// Offline input for `analyze`
#[derive(Debug, Deserialize)]
struct Scenario {
    /// Reference time; defaults to now
    #[serde(default)]
    now: Option<DateTime<Utc>>,
    #[serde(default)]
    activities: Vec<ScenarioActivity>,
    /// User id → pending changes
    #[serde(default)]
    pending: BTreeMap<String, Vec<PendingChange>>,
    #[serde(default)]
    worksets: Vec<WorksetInfo>,
}

#[derive(Debug, Deserialize)]
struct ScenarioActivity {
    element_id: String,
    #[serde(default)]
    element_name: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    level: String,
    user: String,
    #[serde(default)]
    username: Option<String>,
    activity: ActivityType,
    #[serde(default)]
    minutes_ago: i64,
}

fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();
}

/// Get the default config path (<config dir>/workshare/config.json)
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("workshare").join("config.json"))
}

/// Explicit config must exist; the default one is optional.
fn load_config(explicit: Option<&Path>) -> Result<EngineConfig> {
    if let Some(path) = explicit {
        return EngineConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()));
    }
    match default_config_path() {
        Some(path) if path.exists() => EngineConfig::load(&path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        _ => Ok(EngineConfig::default()),
    }
}

fn print_discovery_event(event: &DiscoveryEvent) {
    match event {
        DiscoveryEvent::PeerDiscovered(peer) => println!(
            "[+] {} on {} ({}) project '{}'",
            peer.username,
            peer.hostname,
            peer.ip_address,
            peer.project_name
        ),
        DiscoveryEvent::PeerUpdated(peer) => println!(
            "[~] {} on {} switched to project '{}'",
            peer.username, peer.hostname, peer.project_name
        ),
        DiscoveryEvent::PeerLost(peer) => {
            println!("[-] {} on {} went quiet", peer.username, peer.hostname)
        }
        DiscoveryEvent::ListenerFailed { message } => {
            println!("[!] Discovery listener stopped: {}", message)
        }
    }
}

fn print_monitor_event(event: &MonitorEvent) {
    match event {
        MonitorEvent::ConflictPredicted(prediction) => println!(
            "[conflict:{}] {} ({})",
            prediction.severity, prediction.description, prediction.resolution_suggestion
        ),
        MonitorEvent::SyncRecommended { user_id, text } => {
            println!("[advice] {}: {}", user_id, text)
        }
        MonitorEvent::HotspotDetected(hotspot) => println!(
            "[hotspot] {}: {} activities by {} users",
            hotspot.area_name,
            hotspot.activity_count,
            hotspot.active_users.len()
        ),
    }
}

fn analyze(scenario: Scenario, monitor_config: &MonitorConfig) -> Result<()> {
    let now = scenario.now.unwrap_or_else(Utc::now);
    let monitor = WorkshareMonitor::new(monitor_config);

    monitor.update_worksets(scenario.worksets);
    for (user, changes) in scenario.pending {
        monitor.set_pending_changes(&UserId::new(user), changes);
    }

    // The ledger expects activity in the order it happened
    let mut activities = scenario.activities;
    activities.sort_by(|a, b| b.minutes_ago.cmp(&a.minutes_ago));
    for a in activities {
        let timestamp = chrono::Duration::try_minutes(a.minutes_ago)
            .and_then(|ago| now.checked_sub_signed(ago))
            .ok_or_else(|| {
                anyhow!(
                    "Activity on {} by {}: minutes_ago {} is out of range",
                    a.element_id,
                    a.user,
                    a.minutes_ago
                )
            })?;
        let username = a.username.unwrap_or_else(|| a.user.clone());
        monitor.record_activity(
            ElementActivity::new(a.element_id.as_str(), a.user.as_str(), a.activity)
                .with_element_name(a.element_name)
                .with_category(a.category)
                .with_level(a.level)
                .with_username(username)
                .at(timestamp),
        );
    }

    let report = monitor.run_pass(now);

    let mut users: Vec<&UserId> = report.predictions.keys().collect();
    users.sort();
    for user in users {
        let predictions = &report.predictions[user];
        if predictions.is_empty() {
            println!("No predicted conflicts for {}.", user);
            continue;
        }
        println!("Predicted conflicts for {} ({}):", user, predictions.len());
        for p in predictions {
            println!(
                "  [{}] {:.0}% {}",
                p.severity,
                p.probability * 100.0,
                p.description
            );
            println!("      {}", p.resolution_suggestion);
        }
    }
    println!();

    if report.hotspots.is_empty() {
        println!("No activity hotspots.");
    } else {
        println!("Activity hotspots ({}):", report.hotspots.len());
        for h in &report.hotspots {
            let risk = if h.is_notable() { " HIGH RISK" } else { "" };
            println!(
                "  {}: {} activities, {} users{}",
                h.area_name,
                h.activity_count,
                h.active_users.len(),
                risk
            );
        }
    }
    println!();

    let worksets = monitor.worksets();
    if !worksets.is_empty() {
        println!("Worksets ({}):", worksets.len());
        for w in &worksets {
            let owner = monitor.workset_owner(&w.name).unwrap_or_else(|| "(available)".into());
            println!("  {}: {}", w.name, owner);
        }
        println!();
    }

    println!("Recommendations:");
    let mut recommendations: Vec<_> = report.recommendations.iter().collect();
    recommendations.sort();
    for (user, text) in recommendations {
        println!("  {}: {}", user, text);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let mut config = load_config(cli.config.as_deref())?;
    if cli.username.is_some() {
        config.username = cli.username;
    }

    match cli.command {
        Commands::Identity => {
            let identity = LocalIdentity::detect(config.username, config.hostname);
            println!("Identity:");
            println!("  Peer ID: {}", identity.peer_id);
            println!("  Username: {}", identity.username);
            println!("  Hostname: {}", identity.hostname);
            println!("Discovery port: {}", config.discovery.port);
        }

        Commands::Serve {
            project,
            guid,
            port,
        } => {
            if let Some(port) = port {
                config.discovery.port = port;
            }
            let engine = CollabEngine::new(config)?;
            let mut discovery_events = engine.subscribe_discovery();
            let mut monitor_events = engine.subscribe_monitor();

            println!("Starting Workshare...");
            println!();
            println!("Identity:");
            println!("  Peer ID: {}", engine.identity().peer_id);
            println!("  User: {}@{}", engine.identity().username, engine.identity().hostname);
            println!();

            engine.start(ProjectInfo::new(project.clone(), guid)).await?;
            if let Some(addr) = engine.discovery().local_addr() {
                println!("Listening on {}", addr);
            }
            println!("Announcing project: {}", project);
            println!();
            println!("Node is running. Press Ctrl+C to stop.");
            println!();

            let status_interval = Duration::from_secs(60);
            let mut status_tick = tokio::time::interval(status_interval);
            status_tick.tick().await;

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        println!();
                        println!("Received shutdown signal...");
                        break;
                    }
                    event = discovery_events.recv() => match event {
                        Ok(event) => print_discovery_event(&event),
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(skipped = n, "Discovery events lagged");
                        }
                        Err(_) => break,
                    },
                    event = monitor_events.recv() => match event {
                        Ok(event) => print_monitor_event(&event),
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(skipped = n, "Monitor events lagged");
                        }
                        Err(_) => break,
                    },
                    _ = status_tick.tick() => {
                        let info = engine.node_info();
                        println!(
                            "[Status] {}, {} peer(s), {} in project",
                            info.discovery_state,
                            info.peer_count,
                            engine.project_peers().len()
                        );
                    }
                }
            }

            println!("Shutting down...");
            engine.shutdown().await;
            println!("Goodbye.");
        }

        Commands::Peers {
            project,
            guid,
            wait,
            all,
        } => {
            config.validate()?;
            let identity = LocalIdentity::detect(config.username.clone(), config.hostname.clone());
            let service = DiscoveryService::new(config.discovery, identity);

            service.start(ProjectInfo::new(project, guid)).await?;
            println!("Listening for {} second(s)...", wait);
            tokio::time::sleep(Duration::from_secs(wait)).await;

            let mut peers = if all {
                service.registry().list()
            } else {
                service.project_peers()
            };
            service.stop().await;

            peers.sort_by(|a, b| a.username.cmp(&b.username));
            if peers.is_empty() {
                println!("No peers found.");
            } else {
                println!("Discovered peers ({}):", peers.len());
                for peer in &peers {
                    println!(
                        "  {} {}@{} {} project '{}'",
                        peer.peer_id.short(),
                        peer.username,
                        peer.hostname,
                        peer.service_addr(),
                        peer.project_name
                    );
                }
            }
        }

        Commands::Analyze { scenario } => {
            let raw = std::fs::read_to_string(&scenario)
                .with_context(|| format!("Failed to read scenario {}", scenario.display()))?;
            let scenario: Scenario = serde_json::from_str(&raw)
                .with_context(|| format!("Invalid scenario {}", scenario.display()))?;
            analyze(scenario, &config.monitor)?;
        }
    }

    Ok(())
}
