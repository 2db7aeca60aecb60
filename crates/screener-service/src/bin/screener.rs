//! Screener CLI
//!
//! Runs the screening service against an in-memory document store.
//!
//! Usage:
//!   screener screen --patients <file> --drug <name> [--tab eligible] [--page 1] [--page-size 50]
//!   screener trials --patients <file> [--sample-size 2000]
//!   screener upload --file <file.json> [--hospital <name>]
//!   screener train [--rounds 10] [--chain] [--interval-ms 500]
//!   screener hash --round <n> --accuracy <a> --model-hash <h> [--timestamp <t>]

use clap::{Parser, Subcommand};
use screener_audit::ledger::{SimulatedChain, KNOWN_INTERFACES};
use screener_audit::{scale_accuracy, ChainRpc, LedgerMetadata};
use screener_eligibility::Tab;
use screener_service::{JsonNormalizer, ScreenerService, ScreeningRequest, ServiceConfig, SimulatedEvaluator};
use screener_shared::time::unix_now;
use screener_shared::{collections, DocumentStore, InMemoryDocumentStore, PatientRecord};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Contract address used for the in-process simulated chain
const SIMULATED_CONTRACT: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";

#[derive(Parser)]
#[command(name = "screener")]
#[command(version = "0.1.0")]
#[command(about = "Federated clinical-trial eligibility screener", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format: json or compact
    #[arg(short, long, default_value = "json")]
    format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Screen a population for one drug
    Screen {
        /// JSON array of patient records
        #[arg(short, long)]
        patients: PathBuf,

        /// Drug name (or indication)
        #[arg(short, long)]
        drug: String,

        /// Hospital requesting the screening
        #[arg(long)]
        hospital: Option<String>,

        /// eligible or not_eligible
        #[arg(short, long, default_value = "eligible")]
        tab: String,

        #[arg(long, default_value = "1")]
        page: usize,

        #[arg(long, default_value = "50")]
        page_size: usize,
    },

    /// List trials with eligible estimates
    Trials {
        /// JSON array of patient records
        #[arg(short, long)]
        patients: PathBuf,

        /// Patients sampled per estimate
        #[arg(long)]
        sample_size: Option<usize>,
    },

    /// Normalize and store a JSON upload, then print the summary and dashboard
    Upload {
        #[arg(short, long)]
        file: PathBuf,

        /// Hospital for records that do not name one
        #[arg(long)]
        hospital: Option<String>,
    },

    /// Run a simulated training session and print the audit trail
    Train {
        #[arg(short, long, default_value = "10")]
        rounds: u64,

        /// Log rounds to an in-process simulated chain instead of the mock
        #[arg(long)]
        chain: bool,

        #[arg(long, default_value = "500")]
        interval_ms: u64,
    },

    /// Compute the metadata hash of a training round
    Hash {
        #[arg(long)]
        round: u64,

        #[arg(long)]
        accuracy: f64,

        #[arg(long)]
        model_hash: String,

        /// Unix seconds; defaults to now
        #[arg(long)]
        timestamp: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let result: serde_json::Value = match cli.command {
        Commands::Screen {
            patients,
            drug,
            hospital,
            tab,
            page,
            page_size,
        } => {
            let service = offline_service(ServiceConfig::from_env(), &patients).await?;
            let request = ScreeningRequest {
                drug_name: drug,
                hospital,
                page,
                page_size,
                tab: Tab::parse(&tab),
            };
            serde_json::to_value(service.eligible_patients_for_drug(&request)?)?
        }
        Commands::Trials { patients, sample_size } => {
            let mut config = ServiceConfig::from_env();
            if let Some(size) = sample_size {
                config.trial_sample_size = size;
            }
            let service = offline_service(config, &patients).await?;
            serde_json::json!({ "trials": service.list_trials()? })
        }
        Commands::Upload { file, hospital } => {
            let raw = fs::read(&file)?;
            let store = Arc::new(InMemoryDocumentStore::new()) as Arc<dyn DocumentStore>;
            let service =
                ScreenerService::connect(ServiceConfig::from_env(), store, None, Arc::new(SimulatedEvaluator::new()))
                    .await?;
            service.startup();
            let filename = file.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            let summary = service.upload_file(&JsonNormalizer, &raw, filename, hospital.as_deref())?;
            serde_json::json!({
                "upload": summary,
                "dashboard": service.dashboard_stats()?,
            })
        }
        Commands::Train {
            rounds,
            chain,
            interval_ms,
        } => run_training(rounds, chain, interval_ms).await?,
        Commands::Hash {
            round,
            accuracy,
            model_hash,
            timestamp,
        } => {
            let metadata = LedgerMetadata {
                round_number: round,
                accuracy_scaled: scale_accuracy(accuracy),
                model_hash,
                timestamp: timestamp.unwrap_or_else(unix_now),
            };
            serde_json::json!({
                "canonical": metadata.canonical_json(),
                "metadata_hash": metadata.digest(),
            })
        }
    };

    let output = match cli.format.as_str() {
        "compact" => serde_json::to_string(&result)?,
        _ => serde_json::to_string_pretty(&result)?,
    };
    println!("{}", output);

    Ok(())
}

fn load_population(path: &Path) -> Result<Vec<PatientRecord>, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Service over an in-memory store seeded from `patients`, audited by the mock ledger
async fn offline_service(
    config: ServiceConfig,
    patients: &Path,
) -> Result<ScreenerService, Box<dyn std::error::Error>> {
    let population = load_population(patients)?;
    let store = Arc::new(InMemoryDocumentStore::new());
    store.seed(collections::PATIENTS, &population)?;

    let service = ScreenerService::connect(
        config,
        store as Arc<dyn DocumentStore>,
        None,
        Arc::new(SimulatedEvaluator::new()),
    )
    .await?;
    service.startup();
    info!(patients = population.len(), "Population loaded");
    Ok(service)
}

async fn run_training(
    rounds: u64,
    use_chain: bool,
    interval_ms: u64,
) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let mut config = ServiceConfig::from_env();
    config.round_interval_ms = interval_ms;

    let rpc: Option<Arc<dyn ChainRpc>> = if use_chain {
        config.ledger.local = true;
        config.ledger.contract_address = Some(SIMULATED_CONTRACT.to_string());
        Some(Arc::new(SimulatedChain::new(KNOWN_INTERFACES[0])))
    } else {
        None
    };

    let store = Arc::new(InMemoryDocumentStore::new()) as Arc<dyn DocumentStore>;
    let service = ScreenerService::connect(config, store, rpc, Arc::new(SimulatedEvaluator::new())).await?;
    service.startup();

    service.start_training(rounds)?;
    service.training().wait().await;
    service.shutdown(Duration::from_secs(30)).await;

    Ok(serde_json::json!({
        "status": service.training_status(),
        "ledger_logs": service.training_logs(0, rounds).await,
        "audit_trail": service.audit_logs(None),
        "health": service.health(),
        "queue": service.ledger().queue_stats(),
    }))
}
