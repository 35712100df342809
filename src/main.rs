//! Evinit CLI Entry Point
//!
//! Thin input layer around the provisioning workflow: option parsing,
//! configuration-file loading, interactive credential prompting, logging
//! setup, and signal handling. All provisioning logic lives in the library.
//!
//! Exit codes: 0 success, 1 provisioning failure, 2 usage or configuration
//! error. Logs go to stderr.

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};

use evinit::config::{ConnectionParams, FileConfig};
use evinit::{
    ErrorKind, PgGateway, Provisioner, ProvisioningRequest, ProvisioningResult, SqlTemplates,
    TableType,
};

/// Provision and initialize a PostgreSQL event-store database
#[derive(Parser)]
#[command(name = "evinit")]
#[command(about = "Provision and initialize PostgreSQL event-store databases")]
#[command(version)]
struct Cli {
    /// Configuration file name (JSON)
    #[arg(short = 'c', long)]
    config_file: Option<PathBuf>,

    /// Database server host name
    #[arg(long)]
    host: Option<String>,

    /// Database user name; must have database creation privileges.
    /// Prompted for if missing and running interactively
    #[arg(long)]
    user: Option<String>,

    /// Database password. Prompted for if missing and running interactively
    #[arg(long)]
    password: Option<String>,

    /// Database connection timeout in milliseconds (default 15000)
    #[arg(long)]
    connect_timeout: Option<u64>,

    /// Name of database to create
    #[arg(short = 'n', long)]
    new_database: String,

    /// Type of events table to create in the new database:
    /// must be "source" or "destination"
    #[arg(short = 't', long)]
    table_type: String,

    /// Directory containing the SQL function templates
    #[arg(long, default_value = "sql")]
    sql_dir: PathBuf,

    /// Display run parameters and end without performing initialization
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() {
    init_tracing();
    install_signal_handlers();

    let cli = Cli::parse();
    let result = match run(cli).await {
        Ok(Some(result)) => result,
        Ok(None) => {
            info!("--dry-run specified, ending program");
            std::process::exit(0);
        }
        Err(err) => {
            error!("{err:#}");
            std::process::exit(2);
        }
    };

    if result.succeeded {
        info!("{}", result.message);
        std::process::exit(0);
    }

    error!("Processing ended with errors: {}", result.message);
    std::process::exit(exit_code(&result));
}

async fn run(cli: Cli) -> anyhow::Result<Option<ProvisioningResult>> {
    let table_type: TableType = cli.table_type.parse()?;

    let config = match &cli.config_file {
        Some(path) => {
            info!(config_file = %path.display(), "loading configuration");
            let config = FileConfig::load(path)?;
            config.validate()?;
            config
        }
        None => FileConfig::default(),
    };

    let overrides = ConnectionParams {
        host: cli.host.clone(),
        user: cli.user.clone(),
        password: cli.password.clone(),
    };
    let mut descriptor =
        config.resolve(&overrides, cli.connect_timeout, evinit::ADMIN_DATABASE)?;

    if descriptor.user.is_none() && std::io::stdin().is_terminal() {
        let user: String =
            dialoguer::Input::new().with_prompt("database user name").interact_text()?;
        descriptor.user = Some(user);
    }
    if descriptor.password.is_none() && std::io::stdin().is_terminal() {
        let password = dialoguer::Password::new().with_prompt("database password").interact()?;
        descriptor.password = Some(password);
    }

    info!(
        host = %descriptor.host,
        user = descriptor.user.as_deref().unwrap_or("<none>"),
        new_database = %cli.new_database,
        table_type = %table_type,
        connect_timeout_ms = ?descriptor.connect_timeout.map(|t| t.as_millis()),
        "run parameters"
    );

    if cli.dry_run {
        return Ok(None);
    }

    let templates = SqlTemplates::load(&cli.sql_dir)?;
    let provisioner = Provisioner::new(PgGateway, descriptor, templates);
    let request = ProvisioningRequest::new(&cli.new_database, table_type);

    Ok(Some(provisioner.run(&request).await))
}

const fn exit_code(result: &ProvisioningResult) -> i32 {
    match result.error_kind {
        Some(ErrorKind::Validation | ErrorKind::Config) => 2,
        _ => 1,
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Log and exit on termination signals; no compensating actions are taken
/// for a partially provisioned database.
fn install_signal_handlers() {
    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("SIGINT received");
            std::process::exit(130);
        }
    });

    #[cfg(unix)]
    tokio::spawn(async {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut term) = signal(SignalKind::terminate()) {
            term.recv().await;
            info!("SIGTERM received");
            std::process::exit(143);
        }
    });
}
