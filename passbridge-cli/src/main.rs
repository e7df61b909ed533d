mod prompt;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use passbridge_core::crypto::derive_client_state;
use passbridge_core::import_export::{convert_lastpass_csv, export_to_csv};
use passbridge_core::local::{
    find_login_data, ChromeLoginStore, CsvFile, LastPassExport, RecordSource,
};
use passbridge_core::platform::{check_supported_platform, default_config_path};
use passbridge_core::records::{CredentialRecord, RawLoginRow, SourceRows};
use passbridge_core::sync::retention::age_cutoff;
use passbridge_core::sync::SyncClient;
use passbridge_core::{
    current_time_millis, ConfirmationGate, KeyBundle, MasterSecret, PassbridgeConfig,
    ReconciliationEngine, RunSummary, SyncStorage,
};
use prompt::{secret_or_prompt, TerminalGate};
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Move browser passwords into a sync account
#[derive(Parser)]
#[command(name = "passbridge", version)]
#[command(about = "Move browser passwords into a sync account", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Answer yes to every confirmation
    #[arg(short, long, global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract saved logins from a Chrome `Login Data` database to CSV
    ExtractChrome {
        /// `Login Data` file; searched in the default profile paths if omitted
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// CSV file to write
        #[arg(short, long, default_value = "passwords.csv")]
        output: PathBuf,
    },

    /// Convert a LastPass CSV export to the passbridge CSV format
    ConvertLastpass {
        /// LastPass export
        #[arg(short, long)]
        input: PathBuf,

        /// CSV file to write
        #[arg(short, long, default_value = "passwords.csv")]
        output: PathBuf,
    },

    /// Encrypt and upload logins into the account's password collection
    Import {
        /// Source format
        #[arg(long, value_enum, default_value_t = SourceKind::Csv)]
        from: SourceKind,

        /// Source file (`Login Data` for chrome; searched if omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,

        #[command(flatten)]
        account: AccountArgs,
    },

    /// Delete logins created within the last hours from the account
    Prune {
        /// Override `prune.max_age_hours`
        #[arg(long)]
        max_age_hours: Option<u64>,

        #[command(flatten)]
        account: AccountArgs,
    },

    /// Download and decrypt the account's logins to CSV
    ExportRemote {
        /// CSV file to write
        #[arg(short, long, default_value = "remote-passwords.csv")]
        output: PathBuf,

        #[command(flatten)]
        account: AccountArgs,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceKind {
    Csv,
    Lastpass,
    Chrome,
}

#[derive(Args)]
struct AccountArgs {
    /// Signed account assertion for the token server
    #[arg(long, env = "PASSBRIDGE_ASSERTION", hide_env_values = true)]
    assertion: Option<String>,

    /// Account master secret, hex encoded
    #[arg(long, env = "PASSBRIDGE_MASTER_SECRET", hide_env_values = true)]
    master_secret: Option<String>,

    /// Override `sync.token_server_url`
    #[arg(long)]
    token_server: Option<String>,

    /// Override `sync.concurrency`
    #[arg(long)]
    concurrency: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.parse()?))
        .init();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut cfg = PassbridgeConfig::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let gate = TerminalGate::new(cli.yes);

    match cli.command {
        Commands::ExtractChrome { input, output } => {
            let rows = read_chrome(&cfg, input, &gate)?.rows;
            export_to_csv(&output, &rows)?;
            info!("{} passwords saved into {}", rows.len(), output.display());
        }
        Commands::ConvertLastpass { input, output } => {
            let file = std::fs::File::open(&input)
                .with_context(|| format!("opening {}", input.display()))?;
            let source = convert_lastpass_csv(file)?;
            export_to_csv(&output, &source.rows)?;
            info!(
                "{} passwords saved into {} ({} skipped)",
                source.rows.len(),
                output.display(),
                source.skipped
            );
        }
        Commands::Import {
            from,
            input,
            account,
        } => {
            let source = match (from, input) {
                (SourceKind::Chrome, input) => read_chrome(&cfg, input, &gate)?,
                (SourceKind::Csv, Some(path)) => CsvFile(path).read_rows()?,
                (SourceKind::Lastpass, Some(path)) => LastPassExport(path).read_rows()?,
                (_, None) => bail!("--input is required for CSV and LastPass sources"),
            };
            if source.rows.is_empty() {
                warn!("No logins to import ({} rows skipped)", source.skipped);
                return Ok(());
            }

            let cfg = &mut cfg;
            let outcome =
                confirm_then_import(&source, &gate, move || open_account(cfg, account)).await?;
            match outcome {
                Some(summary) => println!("Import finished: {}", summary),
                None => info!("Import cancelled"),
            }
        }
        Commands::Prune {
            max_age_hours,
            account,
        } => {
            let hours = max_age_hours.unwrap_or(cfg.prune.max_age_hours);
            let (engine, bundle) = open_account(&mut cfg, account).await?;
            let cutoff = age_cutoff(current_time_millis(), hours);
            let report = engine.prune(&bundle, cutoff, &gate).await?;
            println!("Prune finished: {} kept, {}", report.kept, report.summary);
        }
        Commands::ExportRemote { output, account } => {
            let (engine, bundle) = open_account(&mut cfg, account).await?;
            let mut rows = Vec::new();
            let mut skipped = 0;
            for fields in engine.fetch_all(&bundle).await? {
                match CredentialRecord::try_from(fields) {
                    Ok(record) => rows.push(RawLoginRow::from(&record)),
                    Err(e) => {
                        warn!("Skipping remote record: {}", e);
                        skipped += 1;
                    }
                }
            }
            export_to_csv(&output, &rows)?;
            println!(
                "Exported {} logins to {} ({} skipped)",
                rows.len(),
                output.display(),
                skipped
            );
        }
    }

    Ok(())
}

/// Read logins from `input`, or from the first `Login Data` the user picks.
fn read_chrome(
    cfg: &PassbridgeConfig,
    input: Option<PathBuf>,
    gate: &dyn ConfirmationGate,
) -> Result<SourceRows> {
    check_supported_platform()?;
    let path = match input {
        Some(path) => path,
        None => pick_login_data(&cfg.chrome.search_paths(), gate)?,
    };
    let store = ChromeLoginStore::open(&path, cfg.chrome.key_provider()?)?;
    Ok(store.read_rows()?)
}

fn pick_login_data(search_paths: &[PathBuf], gate: &dyn ConfirmationGate) -> Result<PathBuf> {
    for candidate in find_login_data(search_paths) {
        info!("Login Data found: {}", candidate.display());
        if gate.confirm(&format!("Extract passwords from {}?", display_dir(&candidate))) {
            return Ok(candidate);
        }
    }
    bail!("Login Data file not found, pass it with --input")
}

fn display_dir(path: &Path) -> String {
    path.parent().unwrap_or(path).display().to_string()
}

/// Ask before uploading `source`; `connect` only runs once approved.
///
/// Returns `None` when the gate declines.
async fn confirm_then_import<S, F, Fut>(
    source: &SourceRows,
    gate: &dyn ConfirmationGate,
    connect: F,
) -> Result<Option<RunSummary>>
where
    S: SyncStorage,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(ReconciliationEngine<S>, KeyBundle)>>,
{
    let prompt = format!("Upload {} logins to the sync account?", source.rows.len());
    if !gate.confirm(&prompt) {
        return Ok(None);
    }
    let (engine, bundle) = connect().await?;
    Ok(Some(engine.import_source(&bundle, source).await?))
}

/// Authenticate, then unwrap the password collection bundle.
async fn open_account(
    cfg: &mut PassbridgeConfig,
    account: AccountArgs,
) -> Result<(ReconciliationEngine<SyncClient>, KeyBundle)> {
    if let Some(url) = account.token_server {
        cfg.sync.token_server_url = url;
    }
    if let Some(concurrency) = account.concurrency {
        cfg.sync.concurrency = concurrency;
    }
    cfg.validate()?;

    let master_secret = secret_or_prompt(account.master_secret, "Master secret (hex): ")?;
    let master_secret = MasterSecret::from_hex(master_secret.trim())?;
    let assertion = secret_or_prompt(account.assertion, "Account assertion: ")?;

    let client = SyncClient::new(&cfg.sync, assertion, derive_client_state(&master_secret))?;
    let engine = ReconciliationEngine::new(client, cfg.sync.concurrency);
    let bundle = engine.open_collection(&master_secret).await?;
    Ok((engine, bundle))
}
