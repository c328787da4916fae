use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use logfetcher_core::app::{AppBuilder, DailySchedule, Scheduler};
use logfetcher_core::config::Config;
use logfetcher_core::domain::SetupError;
use logfetcher_core::impls::drive::DEFAULT_API_BASE;
use logfetcher_core::impls::oauth::{DRIVE_READONLY_SCOPE, random_state};
use logfetcher_core::impls::{ClientSecret, DriveStore, OAuthClient, OAuthTokenSource, StoredToken};
use logfetcher_core::ports::{Clock, SystemClock};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Mirror the newest remote log folder every day and prune old local copies.
#[derive(Debug, Parser)]
#[command(name = "logfetcher", version)]
struct Args {
    /// Remote root folder id.
    #[arg(long, env = "LOGFETCHER_FOLDER_ID")]
    folder_id: Option<String>,

    /// Retention interval: 3d, 7d, 14d or 30d.
    #[arg(long, env = "LOGFETCHER_RETENTION")]
    retention: Option<String>,

    /// Local mirror root (also the sweep root).
    #[arg(long, env = "LOGFETCHER_ROOT", default_value = ".")]
    root: PathBuf,

    #[arg(long, env = "LOGFETCHER_CREDENTIALS", default_value = "credentials.json")]
    credentials: PathBuf,

    #[arg(long, env = "LOGFETCHER_TOKEN", default_value = "token.json")]
    token: PathBuf,

    /// Daily fire time, HH:MM[:SS].
    #[arg(long, env = "LOGFETCHER_RUN_AT", default_value = "03:00")]
    run_at: String,

    /// Fixed UTC offset of --run-at, e.g. +07:00.
    #[arg(
        long,
        env = "LOGFETCHER_UTC_OFFSET",
        default_value = "+07:00",
        allow_hyphen_values = true
    )]
    utc_offset: String,

    #[arg(long, env = "LOGFETCHER_REQUEST_TIMEOUT_SECS", default_value_t = 60)]
    request_timeout_secs: u64,

    #[arg(long, env = "LOGFETCHER_PAGE_SIZE", default_value_t = 1000)]
    page_size: u32,

    #[arg(long, env = "LOGFETCHER_DOWNLOAD_CONCURRENCY", default_value_t = 4)]
    download_concurrency: usize,

    #[arg(long, env = "LOGFETCHER_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    /// Log what the sweep would delete without deleting it.
    #[arg(long, env = "LOGFETCHER_DRY_RUN_SWEEP")]
    dry_run_sweep: bool,

    #[arg(long, env = "LOGFETCHER_API_BASE", default_value = DEFAULT_API_BASE)]
    api_base: String,

    /// Run a single tick with downloads enabled, print its report as JSON and exit.
    #[arg(long)]
    once: bool,

    #[arg(long, env = "LOGFETCHER_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

impl Args {
    fn config(&self) -> Result<Config, SetupError> {
        let folder_id = self
            .folder_id
            .as_deref()
            .ok_or(SetupError::MissingConfig("LOGFETCHER_FOLDER_ID"))?;
        let mut config = Config::new(folder_id)?;
        config.local_root = self.root.clone();
        config.credentials_path = self.credentials.clone();
        config.token_path = self.token.clone();
        config.retention = Config::parse_retention(self.retention.as_deref())?;
        config.schedule = DailySchedule::parse(&self.run_at, &self.utc_offset)?;
        config.request_timeout = Duration::from_secs(self.request_timeout_secs);
        config.page_size = self.page_size;
        config.download_concurrency = self.download_concurrency;
        config.max_attempts = self.max_attempts;
        config.dry_run_sweep = self.dry_run_sweep;
        config.api_base = self.api_base.clone();
        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout は --once のレポート用
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.log_format);

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "setup failed");
            eprintln!("logfetcher: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode, SetupError> {
    let config = args.config()?;
    let http = config.http_client()?;

    let secret = ClientSecret::load(&config.credentials_path).await?;
    let oauth =
        OAuthClient::new(http.clone(), secret).with_request_timeout(config.request_timeout);
    let token = match StoredToken::load(&config.token_path).await? {
        Some(token) => token,
        None => authorize(&oauth, &config.token_path).await?,
    };
    let tokens = OAuthTokenSource::new(oauth, token).persist_to(config.token_path.clone());
    let store = DriveStore::new(http, &config.api_base, tokens)?
        .with_list_timeout(config.request_timeout);
    let store = Arc::new(store);

    tracing::info!(
        folder = %config.folder_id,
        root = %config.local_root.display(),
        retention = %config.retention,
        dry_run_sweep = config.dry_run_sweep,
        "logfetcher starting"
    );

    let mut orchestrator = AppBuilder::new(store)
        .config(&config)
        .skip_first_download(!args.once)
        .build()?;

    if args.once {
        return Ok(match orchestrator.tick().await {
            Ok(report) => match serde_json::to_string_pretty(&report) {
                Ok(json) => {
                    println!("{json}");
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    tracing::error!(error = %e, "unable to encode tick report");
                    ExitCode::FAILURE
                }
            },
            Err(e) => {
                tracing::error!(error = %e, "tick aborted");
                ExitCode::from(2)
            }
        });
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("shutdown signal received, finishing the current tick");
        let _ = shutdown_tx.send(true);
    });

    Scheduler::new(config.schedule)
        .run(&mut orchestrator, shutdown_rx)
        .await;
    Ok(ExitCode::SUCCESS)
}

/// Interactive consent flow for a first run without a cached token.
async fn authorize(oauth: &OAuthClient, token_path: &Path) -> Result<StoredToken, SetupError> {
    let url = oauth
        .secret()
        .authorization_url(DRIVE_READONLY_SCOPE, &random_state())?;
    eprintln!("Go to the following link in your browser, then type the authorization code:");
    eprintln!("{url}");

    let mut code = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut code)
        .await
        .map_err(|e| SetupError::Token(format!("unable to read authorization code: {e}")))?;
    if code.trim().is_empty() {
        return Err(SetupError::Token("no authorization code given".into()));
    }

    let token = oauth
        .exchange_code(&code, SystemClock.now())
        .await
        .map_err(|e| SetupError::Token(format!("unable to exchange authorization code: {e}")))?;
    token
        .save(token_path)
        .await
        .map_err(|e| SetupError::Token(format!("{}: {e}", token_path.display())))?;
    tracing::info!(path = %token_path.display(), "saved token");
    Ok(token)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "unable to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "unable to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
