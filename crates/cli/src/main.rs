use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use tether_controller::Config;
use tether_core::shipwright::{TriggerType, WhenObjectRef};
use tether_core::Build;
use tether_inventory::{url, Inventory, SearchResult};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "tether", version, about = "Issues Shipwright BuildRuns for Tekton runs and pipeline runs")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Kubernetes namespace to watch (default: all namespaces)
    #[arg(long = "ns", global = true)]
    namespace: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the inventory watcher and the controllers
    Run {
        /// Concurrent reconciliations per custom-task kind
        #[arg(long = "custom-task-concurrency")]
        custom_task_concurrency: Option<usize>,
        /// Also reconcile legacy tekton.dev/v1alpha1 Runs
        #[arg(long = "legacy-runs", action = ArgAction::SetTrue)]
        legacy_runs: bool,
    },
    /// Check that the required resources are served by the cluster
    Check {
        /// Include the legacy Run kind
        #[arg(long = "legacy-runs", action = ArgAction::SetTrue)]
        legacy_runs: bool,
    },
    /// Print the canonical host/path form of a repository URL
    NormalizeUrl { url: String },
    /// Tell whether two repository URLs point at the same repository
    CompareUrls { a: String, b: String },
    /// Search Build manifests (JSON array or List) offline
    Search {
        /// File holding the Builds, e.g. `kubectl get builds -o json`
        #[arg(long = "builds")]
        builds: PathBuf,
        /// Pipeline name to match (Pipeline triggers)
        #[arg(long = "pipeline", conflicts_with = "repo")]
        pipeline: Option<String>,
        /// PipelineRun status, e.g. Succeeded
        #[arg(long = "status")]
        status: Option<String>,
        /// Label key=value of the PipelineRun, repeatable
        #[arg(long = "label", value_parser = parse_label)]
        labels: Vec<(String, String)>,
        /// Repository URL to match (GitHub triggers)
        #[arg(long = "repo", requires = "branch")]
        repo: Option<String>,
        /// Branch to match together with --repo
        #[arg(long = "branch")]
        branch: Option<String>,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BuildList {
    List { items: Vec<Build> },
    Array(Vec<Build>),
}

fn parse_label(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=').map(|(k, v)| (k.to_string(), v.to_string())).ok_or_else(|| format!("expected key=value, got {s}"))
}

fn init_tracing() {
    let env = std::env::var("TETHER_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("TETHER_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid TETHER_METRICS_ADDR; expected host:port");
        }
    }
}

fn load_inventory(path: &PathBuf) -> Result<Inventory> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let builds = match serde_json::from_str::<BuildList>(&raw).with_context(|| format!("decoding builds from {}", path.display()))? {
        BuildList::List { items } => items,
        BuildList::Array(items) => items,
    };
    let inventory = Inventory::new();
    for b in &builds {
        inventory.add_build(b);
    }
    Ok(inventory)
}

fn print_results(output: Output, results: &[SearchResult]) -> Result<()> {
    match output {
        Output::Human => {
            if results.is_empty() {
                println!("no matching builds");
            }
            for r in results {
                match &r.secret {
                    Some(secret) => println!("{} (secret {})", r.build, secret.name),
                    None => println!("{}", r.build),
                }
            }
        }
        Output::Json => println!("{}", serde_json::to_string_pretty(results)?),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { custom_task_concurrency, legacy_runs } => {
            init_metrics();
            let mut cfg = Config::from_env();
            if cli.namespace.is_some() {
                cfg.namespace = cli.namespace.clone();
            }
            if let Some(n) = custom_task_concurrency {
                cfg.custom_task_concurrency = n.max(1);
            }
            cfg.legacy_runs |= legacy_runs;
            info!(ns = ?cfg.namespace, concurrency = cfg.custom_task_concurrency, legacy_runs = cfg.legacy_runs, "run invoked");
            let client = tether_kubehub::client().await?;
            tether_controller::runtime::run(client, cfg).await?;
        }
        Commands::Check { legacy_runs } => {
            let cfg = Config { legacy_runs, ..Config::from_env() };
            let client = tether_kubehub::client().await?;
            let required = tether_controller::runtime::required_resources(&cfg);
            let missing = tether_kubehub::missing_resources(client, &required).await?;
            match cli.output {
                Output::Human => {
                    for r in &required {
                        let state = if missing.contains(r) { "missing" } else { "served" };
                        println!("{} • {}", r.gvk_key(), state);
                    }
                }
                Output::Json => {
                    let report: BTreeMap<String, bool> = required.iter().map(|r| (r.gvk_key(), !missing.contains(r))).collect();
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
            }
            if !missing.is_empty() {
                anyhow::bail!("{} required resource(s) not served", missing.len());
            }
        }
        Commands::NormalizeUrl { url: input } => match url::normalize(&input) {
            Ok(normalized) => match cli.output {
                Output::Human => println!("{normalized}"),
                Output::Json => println!("{}", serde_json::json!({ "url": input, "normalized": normalized })),
            },
            Err(e) => {
                error!(error = %e, "normalize-url failed");
                return Err(e.into());
            }
        },
        Commands::CompareUrls { a, b } => {
            let equivalent = url::equivalent(&a, &b);
            match cli.output {
                Output::Human => println!("{}", if equivalent { "equivalent" } else { "different" }),
                Output::Json => println!("{}", serde_json::json!({ "a": a, "b": b, "equivalent": equivalent })),
            }
        }
        Commands::Search { builds, pipeline, status, labels, repo, branch } => {
            let inventory = load_inventory(&builds)?;
            info!(builds = inventory.len(), "search invoked");
            let results = match (repo, branch) {
                (Some(repo), Some(branch)) => inventory.search_by_git(TriggerType::GitHub, &repo, &branch),
                _ => {
                    let query = WhenObjectRef {
                        name: pipeline.unwrap_or_default(),
                        status: status.into_iter().collect(),
                        selector: labels.into_iter().collect(),
                    };
                    inventory.search_by_object_ref(TriggerType::Pipeline, &query)
                }
            };
            print_results(cli.output, &results)?;
        }
    }
    Ok(())
}
