//! savesync command-line client.
//!
//! Syncs the save stored in a local SQLite file with a private GitHub Gist.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use savesync_cli::{describe_outcome, describe_revision, describe_status, CliConfig};
use savesync_storage::{SqliteStore, StateStore};
use savesync_sync::{
    AccessToken, AutoSync, CredentialProvider, GistBackend, LabeledDocumentStore,
    ResolutionStrategy, SyncEngine, SyncOutcome,
};
use savesync_types::PersistedState;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "savesync")]
#[command(about = "Cloud save synchronization over GitHub Gists")]
struct Args {
    /// Local database holding the save and sync state
    #[arg(long, default_value = "savesync.db")]
    db: PathBuf,

    /// JSON config file with optional "sync" and "gist" sections
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// GitHub token with the gist scope
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Device name written into uploaded saves
    #[arg(long)]
    device: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show sign-in, document and sync status
    Status,
    /// Verify the token and remember the account
    Login,
    /// Forget the stored account
    Logout,
    /// Reconcile the local save with the cloud copy
    Sync {
        /// Settle a conflict with this strategy instead of stopping
        #[arg(long)]
        resolve: Option<ResolutionStrategy>,
    },
    /// Overwrite the cloud copy with the local save
    Push,
    /// Overwrite the local save with the cloud copy
    Pull,
    /// List recent revisions of the cloud copy
    History,
    /// Drop the cached cloud document id
    Forget,
    /// Replace the local save with a JSON file
    Import { path: PathBuf },
    /// Print the local save as JSON
    Export,
    /// Keep syncing on an interval until interrupted
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let config = CliConfig::load(args.config.as_deref())?.with_device_name(args.device.clone());

    let store = Arc::new(
        SqliteStore::open(&args.db)
            .with_context(|| format!("Failed to open database {}", args.db.display()))?,
    );
    let credentials = Arc::new(CredentialProvider::restore(store.clone()));
    let backend = GistBackend::new(config.gist.clone(), credentials.clone())
        .context("Failed to create GitHub client")?;

    match (&args.command, args.token.as_deref()) {
        (Command::Login, None) => bail!("login needs a token (--token or GITHUB_TOKEN)"),
        (Command::Logout, _) => {
            credentials.sign_out().context("Failed to sign out")?;
            println!("Signed out.");
            return Ok(());
        }
        (_, Some(token)) => sign_in(&backend, &credentials, token).await?,
        (_, None) => {}
    }

    let remote = Arc::new(LabeledDocumentStore::new(
        backend,
        store.clone(),
        config.sync.device_name.clone(),
    ));
    let engine = Arc::new(SyncEngine::new(
        config.sync.clone(),
        store.clone(),
        store.clone(),
        remote.clone(),
        credentials.clone(),
    ));

    match args.command {
        Command::Logout => {}
        Command::Login => {
            if let Some(identity) = credentials.current().identity() {
                println!("Signed in as {}.", identity.login);
            }
        }
        Command::Status => {
            match credentials.current().identity() {
                Some(identity) => println!("signed in as {}", identity.login),
                None => println!("not signed in"),
            }
            match remote.document_id().await {
                Some(id) => {
                    let url = remote.document_url().await.unwrap_or_default();
                    println!("cloud document: {id} {url}");
                }
                None => println!("cloud document: not yet known"),
            }
            println!("{}", describe_status(&engine.status()));
        }
        Command::Sync { resolve } => {
            let mut outcome = engine.sync_now(None).await;
            if let (SyncOutcome::Conflict, Some(strategy)) = (&outcome, resolve) {
                info!("Resolving conflict with {strategy}");
                outcome = engine.resolve_conflict(strategy).await;
            }
            report(&engine, outcome)?;
        }
        Command::Push => {
            let Some(doc) = store.load().context("Failed to read local save")? else {
                bail!("no local save to upload");
            };
            report(&engine, engine.force_upload(&doc).await)?;
        }
        Command::Pull => report(&engine, engine.force_download().await)?,
        Command::History => {
            let revisions = remote
                .history()
                .await
                .context("Failed to list revisions")?;
            if revisions.is_empty() {
                println!("no revisions");
            }
            for revision in &revisions {
                println!("{}", describe_revision(revision));
            }
        }
        Command::Forget => {
            remote.forget_document().await;
            println!("Cloud document id forgotten.");
        }
        Command::Import { path } => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let state = PersistedState::from_json(&raw)
                .with_context(|| format!("{} is not a valid save", path.display()))?;
            store.save(&state).context("Failed to store save")?;
            println!("Imported level {} save.", state.character.level);
        }
        Command::Export => {
            let Some(doc) = store.load().context("Failed to read local save")? else {
                bail!("no local save");
            };
            println!("{}", doc.to_json()?);
        }
        Command::Watch => watch(engine).await?,
    }

    Ok(())
}

/// Signs in with `token` unless the stored credential already uses it.
async fn sign_in(
    backend: &GistBackend,
    credentials: &CredentialProvider,
    token: &str,
) -> Result<()> {
    if credentials
        .token()
        .is_some_and(|current| current.expose() == token)
    {
        return Ok(());
    }

    let token = AccessToken::new(token);
    let identity = backend
        .fetch_identity(&token)
        .await
        .context("Failed to verify GitHub token")?;
    info!("Signed in as {}", identity.login);
    credentials
        .sign_in(identity, token)
        .context("Failed to store credential")?;
    Ok(())
}

fn report(engine: &SyncEngine, outcome: SyncOutcome) -> Result<()> {
    let message = describe_outcome(&outcome, &engine.status());
    match outcome {
        SyncOutcome::Synced | SyncOutcome::ReloadRequired => {
            println!("{message}");
            Ok(())
        }
        SyncOutcome::Conflict | SyncOutcome::Failed(_) => bail!(message),
    }
}

async fn watch(engine: Arc<SyncEngine>) -> Result<()> {
    if !engine.credentials().is_authenticated() {
        warn!("Not signed in; waiting for a credential before syncing");
    }

    let _subscription = engine.subscribe(|status| info!("{}", describe_status(status)));
    let auto = AutoSync::spawn(engine.clone());
    info!(
        "Auto-sync every {}s, press Ctrl-C to stop",
        engine.config().auto_sync_interval_secs
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    auto.stop().await;
    info!("Stopped");
    Ok(())
}
