// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of Enpal Bridge.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

mod config;
mod entry;
mod state;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use config::AppConfig;
use entry::ConfigEntry;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use enpal_adapters::{
    HomeAssistantClient, HomeAssistantSink, InfluxClient, InfluxProber, JsonLinesSink,
    PublicIpClient,
};
use enpal_core::config_flow::DEFAULT_PORT;
use enpal_core::errors::FormErrorDisplay;
use enpal_core::{
    CATALOG, ConfigFlow, EntitySink, EntryData, FlowResult, MetricSource, Poller, SensorRegistry,
};
use enpal_types::MetricKey;

#[derive(Debug, Parser)]
#[command(
    name = "enpal-bridge",
    version,
    about = "Bridges Enpal solar gateway metrics into Home Assistant"
)]
struct Cli {
    /// Configuration file (TOML or JSON) instead of the default search
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Poll the gateway and publish sensor states (default)
    Run,
    /// Validate a gateway connection and store it as the config entry
    Setup {
        #[arg(long)]
        ip: String,
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u32,
        #[arg(long)]
        token: String,
    },
    /// Change the connection of the existing entry
    Options {
        #[arg(long)]
        ip: Option<String>,
        #[arg(long)]
        port: Option<u32>,
        #[arg(long)]
        token: Option<String>,
    },
    /// List the known sensors present in the database
    Discover,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, source) = match &cli.config {
        Some(path) => (
            AppConfig::load_from(path)?,
            config::ConfigSource::File(path.clone()),
        ),
        None => AppConfig::load()?,
    };
    init_tracing(&config.system.log_level)?;
    info!("✅ Loaded configuration from {}", source);
    for warning in &config.validate_detailed().warnings {
        warn!("⚠️ [CONFIG] {}", warning);
    }

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Setup { ip, port, token } => {
            setup(
                &config,
                EntryData {
                    host_ip: ip,
                    host_port: port,
                    token,
                },
            )
            .await
        }
        Command::Options { ip, port, token } => options(&config, ip, port, token).await,
        Command::Discover => discover(&config).await,
    }
}

/// `RUST_LOG` wins over the configured level. Logs go to stderr so dry-run
/// output on stdout stays clean.
fn init_tracing(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")
}

fn load_entry(config: &AppConfig) -> Result<ConfigEntry> {
    let path = &config.system.entry_path;
    ConfigEntry::load(path)?.with_context(|| {
        format!(
            "No config entry at {}, run `enpal-bridge setup` first",
            path.display()
        )
    })
}

fn influx_client(config: &AppConfig, data: &EntryData) -> Result<Arc<InfluxClient>> {
    let client =
        InfluxClient::for_host(&data.host_ip, data.host_port, &data.token, config.timeout())?
            .with_database(config.influx.org.clone(), config.influx.bucket.clone());
    Ok(Arc::new(client))
}

fn prober(config: &AppConfig) -> InfluxProber {
    InfluxProber::new(
        config.influx.org.clone(),
        config.influx.bucket.clone(),
        config.timeout(),
    )
}

async fn build_sink(config: &AppConfig) -> Result<Arc<dyn EntitySink>> {
    if config.system.dry_run || !config.home_assistant.enabled {
        info!("📝 Printing entity states as JSON lines");
        return Ok(Arc::new(JsonLinesSink::stdout()));
    }

    let client = HomeAssistantClient::from_config(
        config.home_assistant.base_url.clone(),
        config.home_assistant.token.clone(),
    )?;
    if !client.ping().await? {
        warn!("⚠️ [HA] Home Assistant did not answer the health check, continuing anyway");
    }
    Ok(Arc::new(HomeAssistantSink::new(client)))
}

/// Setup flow, user step
async fn setup(config: &AppConfig, input: EntryData) -> Result<()> {
    let prober = prober(config);
    match ConfigFlow::new(&prober).step_user(Some(input)).await {
        FlowResult::CreateEntry { title, data } => {
            let path = &config.system.entry_path;
            let entry = match ConfigEntry::load(path)? {
                Some(mut existing) => {
                    info!("📋 Replacing connection of entry {}", existing.entry_id);
                    existing.title = title;
                    existing.data = data;
                    existing.options = enpal_core::EntryOptions::default();
                    existing
                }
                None => ConfigEntry::new(title, data),
            };
            entry.save(path)?;
            info!("✅ Config entry saved to {}", path.display());
            Ok(())
        }
        FlowResult::ShowForm { error, .. } => reject(error),
    }
}

/// Options flow on the existing entry. Missing arguments keep their current value.
async fn options(
    config: &AppConfig,
    ip: Option<String>,
    port: Option<u32>,
    token: Option<String>,
) -> Result<()> {
    let mut entry = load_entry(config)?;
    let prober = prober(config);
    let flow = ConfigFlow::new(&prober);

    if ip.is_none() && port.is_none() && token.is_none() {
        if let FlowResult::ShowForm { defaults, .. } =
            flow.step_options(&entry.data, &entry.options, None).await
        {
            println!("enpal_host_ip:   {}", defaults.host_ip);
            println!("enpal_host_port: {}", defaults.host_port);
            println!(
                "enpal_token:     {}",
                if defaults.token.is_empty() { "(empty)" } else { "(set)" }
            );
        }
        return Ok(());
    }

    let current = entry.effective();
    let input = EntryData {
        host_ip: ip.unwrap_or(current.host_ip),
        host_port: port.unwrap_or(current.host_port),
        token: token.unwrap_or(current.token),
    };

    match flow
        .step_options(&entry.data, &entry.options, Some(input))
        .await
    {
        FlowResult::CreateEntry { data, .. } => {
            entry.set_options(data);
            entry.save(&config.system.entry_path)?;
            info!("✅ Options saved, send SIGHUP to a running bridge to apply them");
            Ok(())
        }
        FlowResult::ShowForm { error, .. } => reject(error),
    }
}

fn reject(error: Option<enpal_core::FormError>) -> Result<()> {
    match error {
        Some(error) => {
            error!("❌ [SETUP] {}", FormErrorDisplay(error));
            anyhow::bail!("Connection rejected: {}", error.code())
        }
        None => anyhow::bail!("Connection rejected"),
    }
}

async fn discover(config: &AppConfig) -> Result<()> {
    let entry = load_entry(config)?;
    let client = influx_client(config, &entry.effective())?;
    let keys = discover_series(config, client.as_ref()).await?;

    let mut known = 0;
    for catalog_entry in CATALOG.iter().filter(|e| keys.iter().any(|k| e.matches(k))) {
        known += 1;
        println!(
            "{:<48} {} [{}]",
            catalog_entry.key().unique_id(),
            catalog_entry.name,
            catalog_entry.unit
        );
    }
    info!(
        "📋 {} series in the last {}s, {} of them known",
        keys.len(),
        config.influx.discovery_window_secs,
        known
    );
    Ok(())
}

/// Health check followed by series discovery. An unhealthy gateway is only
/// reported, discovery decides whether startup can go on.
async fn discover_series(
    config: &AppConfig,
    source: &dyn MetricSource,
) -> Result<Vec<MetricKey>> {
    match source.health_check().await {
        Ok(true) => info!("✅ [INFLUX] {} is healthy", source.name()),
        Ok(false) => warn!("⚠️ [INFLUX] {} reports an unhealthy status", source.name()),
        Err(e) => warn!("⚠️ [INFLUX] Health check of {} failed: {e:#}", source.name()),
    }

    source
        .list_series(config.discovery_window())
        .await
        .context("Failed to discover series on the gateway")
}

/// Everything the poll loop owns
struct Bridge {
    config: AppConfig,
    entry: ConfigEntry,
    sink: Arc<dyn EntitySink>,
    poller: Poller,
    registry: SensorRegistry,
}

impl Bridge {
    async fn start(config: AppConfig) -> Result<Self> {
        let entry = load_entry(&config)?;
        let sink = build_sink(&config).await?;
        let now = Utc::now();

        let restored = state::restore(&entry.state, config.battery.max_capacity_kwh, now);
        if restored.is_none() {
            info!(
                "🔋 [BATTERY] No stored state, assuming {:.2} kWh",
                config.battery.initial_charge()
            );
        }

        let client = influx_client(&config, &entry.effective())?;
        let available = discover_series(&config, client.as_ref()).await?;
        let registry =
            SensorRegistry::discover(&available, &config.registry_options(restored, now))?;
        let poller = Self::poller(&config, client, Arc::clone(&sink))?;

        Ok(Self {
            config,
            entry,
            sink,
            poller,
            registry,
        })
    }

    fn poller(
        config: &AppConfig,
        source: Arc<InfluxClient>,
        sink: Arc<dyn EntitySink>,
    ) -> Result<Poller> {
        let mut poller = Poller::new(source, sink, config.scan_interval());
        if !config.public_ip_families().is_empty() {
            poller = poller.with_public_ip(Arc::new(PublicIpClient::new()?));
        }
        Ok(poller)
    }

    fn tick_period(&self) -> Duration {
        self.registry
            .tick_interval(self.config.scan_interval())
            .max(Duration::from_secs(1))
    }

    async fn poll(&mut self) {
        let report = self.poller.run_round(&mut self.registry, Utc::now()).await;
        if report.publish_failures > 0 && report.published == 0 {
            warn!("⚠️ [POLL] No state reached {}", self.sink.name());
        }
        self.persist();
    }

    /// Re-read the entry and rebuild the registry, keeping the battery state
    async fn reload(&mut self) -> Result<()> {
        let fresh = load_entry(&self.config)?;
        let client = influx_client(&self.config, &fresh.effective())?;
        let available = discover_series(&self.config, client.as_ref()).await?;

        let options = self.config.registry_options(None, Utc::now());
        self.registry = self.registry.rebuild(&available, &options)?;
        self.poller = Self::poller(&self.config, client, Arc::clone(&self.sink))?;
        self.entry.data = fresh.data;
        self.entry.options = fresh.options;
        info!("✅ Reloaded entry {}", self.entry.entry_id);
        Ok(())
    }

    fn persist(&mut self) {
        let Some(battery) = self.registry.battery_state() else {
            return;
        };
        let path = &self.config.system.entry_path;
        if let Err(e) = self
            .entry
            .save_state(path, |stored| state::store(stored, &battery))
        {
            error!("❌ Failed to persist battery state: {e:#}");
        }
    }
}

async fn run(config: AppConfig) -> Result<()> {
    info!("🚀 Starting Enpal Bridge v{}", enpal_types::VERSION);
    info!("📋 Configuration Summary:");
    info!("   Database: {}/{}", config.influx.org, config.influx.bucket);
    info!("   Scan interval: {}s", config.system.scan_interval_secs);
    info!("   Battery capacity: {} kWh", config.battery.max_capacity_kwh);
    info!("   Dry run: {}", config.system.dry_run);

    let mut bridge = Bridge::start(config).await?;
    info!(
        "📋 Host {}:{} with {} sensors",
        bridge.entry.effective().host_ip,
        bridge.entry.effective().host_port,
        bridge.registry.len()
    );

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?;
    let mut sighup = signal(SignalKind::hangup()).context("Failed to listen for SIGHUP")?;
    let mut ticker = tokio::time::interval(bridge.tick_period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => bridge.poll().await,
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("❌ Failed to listen for Ctrl-C: {e}");
                }
                info!("Shutdown signal received");
                break;
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received");
                break;
            }
            _ = sighup.recv() => {
                info!("SIGHUP received, reloading config entry");
                match bridge.reload().await {
                    Ok(()) => {
                        ticker = tokio::time::interval(bridge.tick_period());
                        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    }
                    Err(e) => error!("❌ Reload failed, keeping previous sensors: {e:#}"),
                }
            }
        }
    }

    bridge.persist();
    info!("Shutting down");
    Ok(())
}
