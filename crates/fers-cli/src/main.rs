//! fers: encrypted file sync CLI
//!
//! Commands:
//!   upload <path>        - encrypt and upload a file or directory tree
//!   download <key>       - download and decrypt one object
//!   sync-down            - fetch every remote object missing locally
//!   sync-up              - push every local file missing remotely
//!   ls [<prefix>]        - list remote objects
//!   rm <path>            - delete a local file inside the working directory
//!   rm-remote <key>      - delete a remote object
//!   status               - store health and pending work in both directions
//!   config show          - display current configuration
//!
//! Local paths are relative to the configured working directory (absolute
//! paths are accepted but must lie inside it).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use fers_core::config::FersConfig;
use fers_core::ObjectKey;
use fers_crypto::CipherSuite;
use fers_storage::Credentials;
use fers_sync::{ProgressFn, SyncEngine, SyncReport, WorkingDirectory};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "fers",
    version,
    about = "Encrypted file sync against local or S3-compatible storage",
    long_about = "fers: encrypt files client-side and keep a working directory \
                  in sync with an object store"
)]
struct Cli {
    /// Path to fers.toml (default: ./fers.toml, then ~/.fers/config.toml)
    #[arg(long, short = 'c', env = "FERS_CONFIG")]
    config: Option<PathBuf>,

    /// Log level or filter directive (overrides [log] level)
    #[arg(long, env = "FERS_LOG")]
    log: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt and upload a file or a directory tree
    Upload {
        /// Local file or directory
        path: PathBuf,
        /// Object key for a single file (default: its path relative to the working directory)
        #[arg(long, short = 'k')]
        key: Option<String>,
    },

    /// Download and decrypt one object
    Download {
        /// Object key (e.g. docs/report.pdf)
        key: String,
        /// Local destination (default: the key's own path)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Download every remote object with no local counterpart
    #[command(name = "sync-down")]
    SyncDown,

    /// Upload every local file with no remote counterpart
    #[command(name = "sync-up")]
    SyncUp,

    /// List remote objects
    Ls {
        /// Only keys starting with this prefix
        #[arg(default_value = "")]
        prefix: String,
    },

    /// Delete a local file inside the working directory
    Rm {
        path: PathBuf,
    },

    /// Delete a remote object
    #[command(name = "rm-remote")]
    RmRemote {
        key: String,
    },

    /// Show store health and what a sync would transfer
    Status,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.as_deref());
    let mut config = load_config(&config_path).await?;
    apply_env_overrides(&mut config, |name| std::env::var(name).ok());

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    init_logging(&level, &config.log.format, config.log.file.as_deref())?;

    if config.config_file_mode_check && config_path.exists() {
        fers_core::config::warn_if_world_readable(&config_path);
    }

    if let Commands::Config { action: ConfigAction::Show } = cli.command {
        return cmd_config_show(&config, &config_path);
    }

    let engine = build_engine(&config)?;

    // Ctrl-C lets the in-flight transfer finish, then the operation stops
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received interrupt, cancelling");
            on_signal.cancel();
        }
    });

    match cli.command {
        Commands::Upload { path, key } => cmd_upload(engine, &cancel, &path, key.as_deref()).await,
        Commands::Download { key, output } => {
            cmd_download(&engine, &cancel, &key, output.as_deref()).await
        }
        Commands::SyncDown => cmd_sync_down(engine, &cancel).await,
        Commands::SyncUp => cmd_sync_up(engine, &cancel).await,
        Commands::Ls { prefix } => cmd_ls(&engine, &prefix).await,
        Commands::Rm { path } => cmd_rm(&engine, &path).await,
        Commands::RmRemote { key } => cmd_rm_remote(&engine, &key).await,
        Commands::Status => cmd_status(&engine, &cancel).await,
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &config_path),
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

/// Explicit path (flag or FERS_CONFIG) > ./fers.toml > ~/.fers/config.toml
fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let local = PathBuf::from("fers.toml");
    if local.exists() {
        return local;
    }
    expand_tilde(Path::new("~/.fers/config.toml"))
}

async fn load_config(path: &Path) -> Result<FersConfig> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config: {}", path.display()))?;
        FersConfig::from_toml_str(&content)
            .with_context(|| format!("parsing config: {}", path.display()))
    } else {
        Ok(FersConfig::default())
    }
}

/// Environment wins over the config file for secrets.
fn apply_env_overrides(config: &mut FersConfig, env: impl Fn(&str) -> Option<String>) {
    if let Some(passphrase) = env("FERS_PASSPHRASE").filter(|p| !p.is_empty()) {
        config.crypto.passphrase = Some(passphrase);
    }
    if let Some(id) = env("FERS_ACCESS_KEY_ID") {
        config.storage.s3.access_key_id = Some(id);
    }
    if let Some(secret) = env("FERS_SECRET_ACCESS_KEY") {
        config.storage.s3.secret_access_key = Some(secret);
    }
}

fn credentials(config: &FersConfig) -> Option<Credentials> {
    let s3 = &config.storage.s3;
    match (&s3.access_key_id, &s3.secret_access_key) {
        (Some(id), Some(secret)) => Some(Credentials {
            access_key_id: id.clone(),
            secret_access_key: secret.clone(),
        }),
        _ => None,
    }
}

/// Expand `~` in path to the user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_default();
        PathBuf::from(home).join(rest)
    } else {
        path.to_path_buf()
    }
}

fn build_engine(config: &FersConfig) -> Result<SyncEngine> {
    config.validate().context("invalid configuration")?;

    let root = expand_tilde(&config.working_dir);
    let workdir = WorkingDirectory::new(&root)
        .with_context(|| format!("opening working directory: {}", root.display()))?;

    let passphrase = SecretString::from(config.crypto.passphrase.clone().unwrap_or_default());
    let cipher = CipherSuite::from_passphrase(&passphrase).context("setting up cipher")?;

    let mut storage = config.storage.clone();
    storage.local.base_dir = expand_tilde(&storage.local.base_dir);
    let store = fers_storage::build_store(&storage, credentials(config).as_ref())
        .context("building object store")?;
    tracing::debug!(store = %store.describe(), root = %workdir.root().display(), "engine ready");

    Ok(SyncEngine::new(workdir, cipher, store)
        .with_exclude_patterns(&config.sync.exclude_patterns)
        .context("compiling sync.exclude_patterns")?)
}

// ── Logging ───────────────────────────────────────────────────────────────────

fn init_logging(level: &str, format: &str, file: Option<&Path>) -> Result<()> {
    use std::sync::Mutex;
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    match (format, file) {
        ("json", None) => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        (_, None) => registry.with(fmt::layer().with_writer(std::io::stderr)).init(),
        (format, Some(path)) => {
            let log_file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file: {}", path.display()))?;
            let writer = Mutex::new(log_file);
            if format == "json" {
                registry
                    .with(fmt::layer().json().with_ansi(false).with_writer(writer))
                    .init();
            } else {
                registry
                    .with(fmt::layer().with_ansi(false).with_writer(writer))
                    .init();
            }
        }
    }
    Ok(())
}

// ── Progress helpers ──────────────────────────────────────────────────────────

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{prefix:.bold} {spinner} {pos} {msg}") {
        pb.set_style(style);
    }
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn spinner_progress(pb: &ProgressBar) -> ProgressFn {
    let pb = pb.clone();
    Box::new(move |done, total, msg| {
        if total > 0 {
            pb.set_length(total);
        }
        pb.set_position(done);
        pb.set_message(msg.to_string());
    })
}

fn parse_key(raw: &str) -> Result<ObjectKey> {
    ObjectKey::parse(raw).with_context(|| format!("invalid object key: {raw:?}"))
}

fn print_report(verb: &str, report: &SyncReport) -> Result<()> {
    println!("{verb}: {} objects", report.transferred.len());
    for key in &report.transferred {
        println!("  {key}");
    }
    if !report.skipped.is_empty() {
        println!("skipped (local path taken): {} objects", report.skipped.len());
        for key in &report.skipped {
            println!("  {key}");
        }
    }
    if report.is_clean() {
        return Ok(());
    }
    println!("failed: {} objects", report.failed.len());
    for (item, err) in &report.failed {
        println!("  {item}: {err}");
    }
    let attempted = report.failed.len() + report.transferred.len();
    anyhow::bail!("{} of {attempted} objects failed", report.failed.len())
}

// ── `fers upload` ─────────────────────────────────────────────────────────────

async fn cmd_upload(
    engine: SyncEngine,
    cancel: &CancellationToken,
    path: &Path,
    key: Option<&str>,
) -> Result<()> {
    let resolved = engine.working_dir().resolve(path)?;
    let meta = tokio::fs::metadata(&resolved)
        .await
        .with_context(|| format!("path not found: {}", resolved.display()))?;

    if meta.is_file() {
        let key = match key {
            Some(raw) => parse_key(raw)?,
            None => engine.working_dir().key_for(&resolved)?,
        };
        let bytes = engine
            .encrypt_and_upload_file(&resolved, &key)
            .await
            .with_context(|| format!("uploading {}", resolved.display()))?;
        println!("uploaded {key} ({})", fmt_bytes(bytes));
        return Ok(());
    }

    if key.is_some() {
        anyhow::bail!("--key only applies to a single file");
    }
    let pb = make_spinner("upload");
    let engine = engine.with_progress(spinner_progress(&pb));
    let result = engine.encrypt_and_upload_directory(cancel, &resolved).await;
    pb.finish_and_clear();

    let uploaded = result.with_context(|| format!("uploading tree: {}", resolved.display()))?;
    println!("uploaded {uploaded} files from {}", resolved.display());
    Ok(())
}

// ── `fers download` ───────────────────────────────────────────────────────────

async fn cmd_download(
    engine: &SyncEngine,
    cancel: &CancellationToken,
    raw_key: &str,
    output: Option<&Path>,
) -> Result<()> {
    let key = parse_key(raw_key)?;
    let bytes = match output {
        Some(path) => engine.download_and_decrypt_file(&key, path).await,
        None => engine.download_specific_file(cancel, &key).await,
    }
    .with_context(|| format!("downloading {key}"))?;
    println!("downloaded {key} ({})", fmt_bytes(bytes));
    Ok(())
}

// ── `fers sync-down` / `fers sync-up` ─────────────────────────────────────────

async fn cmd_sync_down(engine: SyncEngine, cancel: &CancellationToken) -> Result<()> {
    let pb = make_spinner("sync-down");
    let engine = engine.with_progress(spinner_progress(&pb));
    let result = engine.sync_download(cancel).await;
    pb.finish_and_clear();
    print_report("downloaded", &result.context("sync down")?)
}

async fn cmd_sync_up(engine: SyncEngine, cancel: &CancellationToken) -> Result<()> {
    let pb = make_spinner("sync-up");
    let engine = engine.with_progress(spinner_progress(&pb));
    let result = engine.sync_upload(cancel).await;
    pb.finish_and_clear();
    print_report("uploaded", &result.context("sync up")?)
}

// ── `fers ls` / `fers rm` / `fers rm-remote` ──────────────────────────────────

async fn cmd_ls(engine: &SyncEngine, prefix: &str) -> Result<()> {
    let keys = engine
        .list_remote_files(prefix)
        .await
        .context("listing remote objects")?;
    for key in &keys {
        println!("{key}");
    }
    Ok(())
}

async fn cmd_rm(engine: &SyncEngine, path: &Path) -> Result<()> {
    engine
        .delete_local_file(path)
        .await
        .with_context(|| format!("deleting {}", path.display()))?;
    println!("deleted {}", path.display());
    Ok(())
}

async fn cmd_rm_remote(engine: &SyncEngine, raw_key: &str) -> Result<()> {
    let key = parse_key(raw_key)?;
    engine
        .delete_remote_file(&key)
        .await
        .with_context(|| format!("deleting remote {key}"))?;
    println!("deleted remote {key}");
    Ok(())
}

// ── `fers status` ─────────────────────────────────────────────────────────────

async fn cmd_status(engine: &SyncEngine, cancel: &CancellationToken) -> Result<()> {
    println!("fers v{}", env!("CARGO_PKG_VERSION"));
    println!("  working dir: {}", engine.working_dir().root().display());
    println!("  store:       {}", engine.store().describe());

    match fers_storage::check_health(engine.store()).await {
        Ok(count) => println!("  health:      ok ({count} objects)"),
        Err(e) => {
            println!("  health:      UNREACHABLE ({e})");
            return Err(e).context("store health check failed");
        }
    }

    let plan = engine.plan(cancel).await.context("computing sync plan")?;
    if plan.is_empty() {
        println!("  in sync");
        return Ok(());
    }
    println!("  to upload:   {}", plan.to_upload.len());
    for key in &plan.to_upload {
        println!("    + {key}");
    }
    println!("  to download: {}", plan.to_download.len());
    for key in &plan.to_download {
        println!("    - {key}");
    }
    Ok(())
}

// ── `fers config show` ────────────────────────────────────────────────────────

fn cmd_config_show(config: &FersConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
