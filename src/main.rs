use std::fs::read_to_string;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::adapter::AdapterRegistry;
use crate::coordinator::Coordinator;
use crate::credentials::{CredentialProvider, LayeredCredentials};
use crate::error::NavError;
use crate::scheme::{from_string, Scheme};
use crate::source::mfapi::{MfApiClient, DEFAULT_BASE_URL};
use crate::source::rapidapi::{RapidApiClient, DEFAULT_HOST};
use crate::valuation::{load_snapshot, Snapshot};

use clap::{arg, value_parser, ArgMatches, Command};
use colored::Colorize;
use eyre::{eyre, Result, WrapErr};
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod adapter;
mod canonical;
mod coordinator;
mod credentials;
mod error;
mod format;
mod nearest;
mod normalize;
mod scheme;
mod source;
mod valuation;

const APP_NAME: &str = "mf_tracker";
const CONFIG_NAME: &str = "config";
const KEY_FILE: &str = "rapidapi.key";

#[derive(Serialize, Deserialize)]
struct Config {
    schemes_file: String,
    adapter: String,
    rapidapi_key: String,
    rapidapi_host: String,
    mfapi_base_url: String,
    watch_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schemes_file: String::new(),
            adapter: String::new(),
            rapidapi_key: String::new(),
            rapidapi_host: DEFAULT_HOST.to_string(),
            mfapi_base_url: DEFAULT_BASE_URL.to_string(),
            watch_interval_secs: 300,
        }
    }
}

fn non_empty(value: &str) -> Option<&str> {
    Some(value.trim()).filter(|v| !v.is_empty())
}

fn file_arg() -> clap::Arg {
    arg!(<FILE> "JSON file with your schemes")
        .required(false)
        .default_value("")
}

fn cli() -> Command {
    Command::new(APP_NAME)
        .about("A snapshot of your mutual fund holdings")
        .arg_required_else_help(true)
        .arg(
            arg!(--adapter <NAME> "Data adapter to fetch NAVs with")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(--"rapidapi-key" <KEY> "API key for the latest NAV provider")
                .required(false)
                .global(true),
        )
        .subcommand(Command::new("config").about("Print the path to the config file"))
        .subcommand(Command::new("adapters").about("List the available data adapters"))
        .subcommand(
            Command::new("snapshot")
                .about("Show the current value of your holdings")
                .arg(file_arg()),
        )
        .subcommand(
            Command::new("watch")
                .about("Refresh the snapshot on an interval")
                .arg(file_arg())
                .arg(
                    arg!(-i --interval <SECONDS> "Seconds between refreshes")
                        .required(false)
                        .value_parser(value_parser!(u64)),
                ),
        )
        .subcommand(
            Command::new("nav")
                .about("Print the canonical NAV series of one scheme as JSON")
                .arg(arg!(<CODE> "Scheme code").value_parser(value_parser!(u32))),
        )
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

// the scheme file named on the command line, else the one in the config
fn resolve_file(matches: &ArgMatches, cfg: &Config) -> Option<String> {
    let given = matches
        .try_get_one::<String>("FILE")
        .ok()
        .flatten()
        .and_then(|f| non_empty(f));
    given
        .or_else(|| non_empty(&cfg.schemes_file))
        .map(str::to_string)
}

fn read_schemes(filename: &str) -> Result<Vec<Scheme>> {
    let contents =
        read_to_string(filename).wrap_err_with(|| format!("Error reading file: {filename}"))?;
    let schemes =
        from_string(&contents).wrap_err_with(|| format!("Invalid scheme file: {filename}"))?;
    Ok(schemes)
}

// Sources in priority order; the first non-empty one wins.
fn credential_layers(
    build: Option<&str>,
    env: Option<String>,
    flag: Option<&String>,
    cfg: &Config,
    schemes_file: Option<&str>,
) -> LayeredCredentials {
    let layers = LayeredCredentials::new()
        .layer("build environment", build.map(str::to_string))
        .layer("RAPIDAPI_KEY", env)
        .layer("--rapidapi-key", flag.cloned())
        .layer("config file", Some(cfg.rapidapi_key.clone()));
    match schemes_file.and_then(|f| Path::new(f).parent()) {
        Some(dir) => layers.file_layer("key file", &dir.join(KEY_FILE)),
        None => layers,
    }
}

fn build_registry(cfg: &Config, credentials: Arc<dyn CredentialProvider>) -> AdapterRegistry {
    let history = MfApiClient::new(non_empty(&cfg.mfapi_base_url).unwrap_or(DEFAULT_BASE_URL));
    let latest = RapidApiClient::new(
        non_empty(&cfg.rapidapi_host).unwrap_or(DEFAULT_HOST),
        Arc::clone(&credentials),
    );
    let coordinator = Coordinator::new(Arc::new(history), Arc::new(latest));
    AdapterRegistry::standard(&coordinator, credentials)
}

fn pick_adapter(registry: &AdapterRegistry, matches: &ArgMatches, cfg: &Config) -> Result<String> {
    let preferred = matches
        .get_one::<String>("adapter")
        .map(String::as_str)
        .or_else(|| non_empty(&cfg.adapter));
    registry
        .default_adapter(preferred)
        .ok_or_else(|| eyre!("No data adapters are available"))
}

fn print_summary(snapshot: &Snapshot, adapter: &str) {
    let totals = &snapshot.totals;
    let as_of = snapshot
        .latest_date
        .map(|d| d.format("%d %b %Y").to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{} {}",
        "Personal MF Snapshot".bold(),
        format!("(as of {as_of}, via {adapter})").as_str().dimmed()
    );

    let profit = format!(
        "{} ({})",
        format::fmt_amount(Some(totals.profit)),
        format::fmt_pct(totals.profit_pct())
    );
    let day = format!(
        "{} ({})",
        format::fmt_amount(Some(totals.prev_delta)),
        format::fmt_pct(totals.prev_delta_pct())
    );
    println!(
        "Value {}  Invested {}  P&L {}  Day {}",
        format::fmt_round_up(Some(totals.market_value)).as_str().bold(),
        format::fmt_round_up(Some(totals.principal)),
        signed(profit, totals.profit),
        signed(day, totals.prev_delta),
    );
}

fn signed(text: String, value: f64) -> colored::ColoredString {
    let text = text.as_str();
    if value > 0.0 {
        text.green()
    } else if value < 0.0 {
        text.red()
    } else {
        text.normal()
    }
}

fn render(snapshot: &Snapshot, adapter: &str) {
    print_summary(snapshot, adapter);
    snapshot.print(true);
}

/// Which refresh was last put on screen. A result older than that arrived
/// late and is dropped.
#[derive(Debug, Default)]
struct RefreshGate {
    rendered: u64,
}

impl RefreshGate {
    fn accept(&mut self, generation: u64) -> bool {
        if generation > self.rendered {
            self.rendered = generation;
            true
        } else {
            false
        }
    }
}

async fn watch(
    registry: Arc<AdapterRegistry>,
    adapter: String,
    schemes: Arc<Vec<Scheme>>,
    interval: Duration,
) -> Result<()> {
    let (results_tx, mut results_rx) =
        mpsc::unbounded_channel::<(u64, Result<Snapshot, NavError>)>();
    let mut ticker = tokio::time::interval(interval);
    let mut generation = 0_u64;
    let mut gate = RefreshGate::default();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                generation += 1;
                debug!(generation, "starting refresh");
                let registry = Arc::clone(&registry);
                let adapter = adapter.clone();
                let schemes = Arc::clone(&schemes);
                let results_tx = results_tx.clone();
                tokio::spawn(async move {
                    let snapshot = load_snapshot(&registry, &adapter, &schemes).await;
                    // The receiver only goes away when the watch loop ends.
                    let _ = results_tx.send((generation, snapshot));
                });
            }
            Some((finished, snapshot)) = results_rx.recv() => {
                let snapshot = snapshot?;
                if gate.accept(finished) {
                    render(&snapshot, &adapter);
                } else {
                    debug!(generation = finished, "discarding stale refresh");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                return Ok(());
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cfg: Config =
        confy::load(APP_NAME, CONFIG_NAME).wrap_err("Could not load the configuration")?;

    let matches = cli().get_matches();
    let Some((subcommand, sub_matches)) = matches.subcommand() else {
        return Ok(());
    };

    if subcommand == "config" {
        let path = confy::get_configuration_file_path(APP_NAME, CONFIG_NAME)
            .wrap_err("Could not locate the config file")?;
        println!("Your config file is located here: \n{}", path.display());
        return Ok(());
    }

    let filename = resolve_file(sub_matches, &cfg);
    let credentials = credential_layers(
        option_env!("RAPIDAPI_KEY"),
        std::env::var("RAPIDAPI_KEY").ok(),
        sub_matches.get_one::<String>("rapidapi-key"),
        &cfg,
        filename.as_deref(),
    );
    let registry = build_registry(&cfg, Arc::new(credentials));
    let adapter = pick_adapter(&registry, sub_matches, &cfg)?;

    match subcommand {
        "adapters" => {
            for name in registry.available() {
                if name == adapter {
                    println!("{} {}", name.bold(), "(default)".dimmed());
                } else {
                    println!("{name}");
                }
            }
        }
        "nav" => {
            let code = sub_matches
                .get_one::<u32>("CODE")
                .copied()
                .ok_or_else(|| eyre!("A scheme code is required"))?;
            let payload = registry
                .fetch_scheme_data(&adapter, &Scheme::new(code, 0.0, 0.0))
                .await?;
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        "snapshot" | "watch" => {
            // if no argument and no config is given, print help
            let Some(filename) = filename else {
                cli().print_help()?;
                return Ok(());
            };
            let schemes = read_schemes(&filename)?;

            if subcommand == "snapshot" {
                let snapshot = load_snapshot(&registry, &adapter, &schemes).await?;
                render(&snapshot, &adapter);
            } else {
                let seconds = sub_matches
                    .get_one::<u64>("interval")
                    .copied()
                    .unwrap_or(cfg.watch_interval_secs)
                    .max(1);
                watch(
                    Arc::new(registry),
                    adapter,
                    Arc::new(schemes),
                    Duration::from_secs(seconds),
                )
                .await?;
            }
        }
        other => return Err(eyre!("Unknown command: {other}")),
    }
    Ok(())
}
