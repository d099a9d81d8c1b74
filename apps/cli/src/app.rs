//! Command execution.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use tracing::{debug, info, warn};

use datameta_api::{ApiError, Client};
use datameta_protocol::ViewRequest;
use datameta_submit::error::{COMMIT_FAILURE_MESSAGE, deletion_failure_message};
use datameta_submit::{
    EntityKind, SampleSheetOrchestrator, SubmissionSession, SubmissionView, UploadOrchestrator,
    UploadQueue, scan_paths,
};

use crate::backend::ApiBackend;
use crate::config::Config;
use crate::render;
use crate::{Cli, Command, EntityArg, KeysAction};

pub async fn run(cli: Cli, mut config: Config) -> anyhow::Result<()> {
    if let Some(server) = cli.server {
        config.server_url = server;
    }
    if cli.token.is_some() {
        config.token = cli.token;
    }
    let config_path = cli.config;

    match cli.command {
        Command::Login {
            email,
            password,
            label,
        } => login(config, config_path.as_deref(), &email, password, label).await,
        Command::Logout { local } => logout(config, config_path.as_deref(), local).await,
        Command::Keys { action } => match action {
            KeysAction::List => list_keys(&config).await,
            KeysAction::Revoke { id } => revoke_key(config, config_path.as_deref(), &id).await,
        },
        Command::Password { current, new } => change_password(&config, current, new).await,
        Command::Upload { paths, retries } => upload(&config, &paths, retries).await,
        Command::Samplesheet { paths } => samplesheet(&config, &paths).await,
        Command::Pending { exclude } => pending(&config, &exclude).await,
        Command::Validate { exclude } => validate(&config, &exclude).await,
        Command::Submit { label, exclude } => submit(&config, label, &exclude).await,
        Command::Delete { kind, id } => delete(&config, kind, &id).await,
        Command::View {
            search,
            start,
            length,
            order,
            asc,
        } => {
            let request = ViewRequest {
                start,
                length,
                search,
                order_column: order,
                ascending: asc,
                ..ViewRequest::default()
            };
            view(&config, &request).await
        }
    }
}

/// Builds a client from the effective configuration.
fn client(config: &Config) -> anyhow::Result<Client> {
    if config.server_url.is_empty() {
        bail!("no server configured; pass --server or set DATAMETA_URL");
    }
    let client = Client::new(&config.server_url, config.token.clone())?
        .with_api_prefix(&config.api_prefix);
    Ok(client)
}

fn backend(config: &Config) -> anyhow::Result<ApiBackend> {
    if config.token.is_none() {
        bail!("not logged in; run `datameta login` or set DATAMETA_TOKEN");
    }
    Ok(ApiBackend::new(client(config)?, config.chunk_size))
}

async fn login(
    mut config: Config,
    config_path: Option<&Path>,
    email: &str,
    password: Option<String>,
    label: Option<String>,
) -> anyhow::Result<()> {
    let password = match password {
        Some(p) => p,
        None => read_secret("Password: ")?,
    };
    let label = label.unwrap_or_else(|| config.key_label.clone());

    let client = client(&config)?;
    let session = client
        .create_api_key(email, &password, &label)
        .await
        .context("creating the API key failed")?;

    config.token = Some(session.token);
    config.user_id = session.user_id;
    config.key_id = session.id.map(|id| id.uuid);
    let path = config.save(config_path)?;
    info!(email = %email, label = %label, "API key created");

    println!("Logged in as {email}. API key '{label}' stored in {}", path.display());
    if let Some(expires) = session.expires_at {
        println!("The key expires at {expires}.");
    }
    Ok(())
}

fn read_secret(prompt: &str) -> anyhow::Result<String> {
    eprint!("{prompt}");
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("reading the password from stdin")?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        bail!("no password given");
    }
    Ok(password)
}

/// Errors meaning the key is gone or no longer valid on the server.
fn already_revoked(e: &ApiError) -> bool {
    matches!(e, ApiError::NotFound | ApiError::Unauthenticated)
}

fn forget_key(config: &mut Config) {
    config.token = None;
    config.key_id = None;
    config.user_id = None;
}

async fn logout(mut config: Config, config_path: Option<&Path>, local: bool) -> anyhow::Result<()> {
    if !local && config.token.is_some() {
        match &config.key_id {
            Some(key_id) => match client(&config)?.delete_api_key(key_id).await {
                Ok(()) => info!(key = %key_id, "API key revoked"),
                Err(e) if already_revoked(&e) => {
                    debug!(key = %key_id, error = %e, "API key already revoked");
                }
                Err(e) => {
                    return Err(anyhow::Error::new(e).context(
                        "revoking the API key failed; `datameta logout --local` only forgets it",
                    ));
                }
            },
            None => warn!("the id of the stored key is unknown; it stays valid on the server"),
        }
    }

    forget_key(&mut config);
    let path = config.save(config_path)?;
    println!("API key removed from {}", path.display());
    Ok(())
}

/// The account the stored key belongs to.
fn account(config: &Config) -> anyhow::Result<&str> {
    if config.token.is_none() {
        bail!("not logged in; run `datameta login` or set DATAMETA_TOKEN");
    }
    config
        .user_id
        .as_deref()
        .context("the account of the stored key is unknown; run `datameta login` again")
}

async fn list_keys(config: &Config) -> anyhow::Result<()> {
    let user_id = account(config)?;
    let keys = client(config)?
        .list_api_keys(user_id)
        .await
        .context("listing the API keys failed")?;
    print!("{}", render::keys_table(&keys, config.key_id.as_deref()));
    Ok(())
}

async fn revoke_key(mut config: Config, config_path: Option<&Path>, id: &str) -> anyhow::Result<()> {
    if config.token.is_none() {
        bail!("not logged in; run `datameta login` or set DATAMETA_TOKEN");
    }
    client(&config)?
        .delete_api_key(id)
        .await
        .with_context(|| format!("revoking API key {id} failed"))?;
    println!("API key {id} revoked.");

    if config.key_id.as_deref() == Some(id) {
        forget_key(&mut config);
        let path = config.save(config_path)?;
        println!("It was the key in use and has been removed from {}", path.display());
    }
    Ok(())
}

/// User-facing message for a failed password change.
fn password_failure_message(e: &ApiError) -> String {
    match e {
        ApiError::Unauthenticated => "You have to be logged in to perform this action.".into(),
        ApiError::AccessDenied => "Wrong password.".into(),
        ApiError::Validation(entries) => entries
            .iter()
            .map(|entry| entry.message.as_str())
            .collect::<Vec<_>>()
            .join("; "),
        ApiError::Unknown { status: 400, .. } => {
            "Your password has to have at least 10 characters.".into()
        }
        _ => "An unknown error occurred. Please try again later.".into(),
    }
}

async fn change_password(
    config: &Config,
    current: Option<String>,
    new: Option<String>,
) -> anyhow::Result<()> {
    let user_id = account(config)?;
    let current = match current {
        Some(p) => p,
        None => read_secret("Current password: ")?,
    };
    let new = match new {
        Some(p) => p,
        None => read_secret("New password: ")?,
    };

    if let Err(e) = client(config)?.change_password(user_id, &current, &new).await {
        debug!(error = %e, "password change failed");
        bail!(password_failure_message(&e));
    }
    println!("Password changed.");
    Ok(())
}

async fn upload(config: &Config, paths: &[PathBuf], retries: u32) -> anyhow::Result<()> {
    let backend = backend(config)?;

    let files = scan_paths(paths)?;
    if files.is_empty() {
        println!("No files to upload.");
        return Ok(());
    }
    let mut queue = UploadQueue::new();
    queue.extend(files);
    debug!(files = queue.len(), "queue filled");

    let mut orchestrator = UploadOrchestrator::new()
        .with_chunk_size(config.chunk_size)
        .with_retries(retries);
    let events = orchestrator
        .take_events()
        .context("event receiver already taken")?;
    let printer = tokio::spawn(render::print_events(events));

    let summary = orchestrator.run(&mut queue, &backend).await;
    drop(orchestrator);
    printer.await?;

    println!(
        "{} file(s) uploaded, {} failed.",
        summary.done_count(),
        summary.failed.len()
    );
    if !summary.failed.is_empty() {
        bail!("{} upload(s) failed", summary.failed.len());
    }
    Ok(())
}

async fn samplesheet(config: &Config, paths: &[PathBuf]) -> anyhow::Result<()> {
    let backend = backend(config)?;

    let mut orchestrator = SampleSheetOrchestrator::new();
    let events = orchestrator
        .take_events()
        .context("event receiver already taken")?;
    let printer = tokio::spawn(render::print_events(events));

    let summary = orchestrator.run(paths, &backend).await;
    drop(orchestrator);
    printer.await?;

    let failed_sheets = summary.sheets.iter().filter(|s| s.error.is_some()).count();
    let rejected: usize = summary.sheets.iter().map(|s| s.rejected.len()).sum();
    println!(
        "{} record(s) added, {rejected} rejected, {failed_sheets} sheet(s) failed.",
        summary.added()
    );
    if failed_sheets > 0 || rejected > 0 {
        bail!("sample sheet import incomplete");
    }
    Ok(())
}

/// Finds the UUID of a staged entity given its UUID or site ID.
fn resolve_entity(view: &SubmissionView, id: &str) -> Option<String> {
    view.metadatasets()
        .iter()
        .map(|m| &m.id)
        .chain(view.files().iter().map(|f| &f.id))
        .find(|ident| ident.uuid == id || ident.site.as_deref() == Some(id))
        .map(|ident| ident.uuid.clone())
}

/// Refreshes the session and applies the exclusions.
async fn prepare(session: &mut SubmissionSession<'_>, exclude: &[String]) -> anyhow::Result<()> {
    session.refresh().await?;
    for id in exclude {
        let uuid = resolve_entity(session.view(), id)
            .with_context(|| format!("'{id}' is not staged"))?;
        session.set_selected(&uuid, false).await?;
    }
    Ok(())
}

async fn pending(config: &Config, exclude: &[String]) -> anyhow::Result<()> {
    let backend = backend(config)?;
    let mut session = SubmissionSession::new(&backend);
    prepare(&mut session, exclude).await?;

    print!("{}", render::staging_overview(session.view(), session.report()));
    let errors = session.report().error_count();
    if errors > 0 {
        println!("\n{errors} validation error(s); run `datameta validate` for details.");
    }
    Ok(())
}

async fn validate(config: &Config, exclude: &[String]) -> anyhow::Result<()> {
    let backend = backend(config)?;
    let mut session = SubmissionSession::new(&backend);
    prepare(&mut session, exclude).await?;

    let report = session.report();
    if report.commit_enabled() {
        println!("The selection is valid and ready to be submitted.");
        return Ok(());
    }
    if !session.view().has_selection() {
        println!("Nothing selected.");
        return Ok(());
    }
    print!("{}", render::validation_errors(session.view(), report));
    bail!("{} validation error(s)", report.error_count());
}

async fn submit(config: &Config, label: Option<String>, exclude: &[String]) -> anyhow::Result<()> {
    let backend = backend(config)?;
    let mut session = SubmissionSession::new(&backend);
    prepare(&mut session, exclude).await?;

    if !session.view().has_selection() {
        bail!("nothing staged to submit");
    }
    if !session.report().commit_enabled() {
        eprint!("{}", render::validation_errors(session.view(), session.report()));
        bail!("the selection is not valid");
    }

    match session.commit(label).await {
        Ok(submission) => {
            println!(
                "Submission {} created with {} record(s) and {} file(s).",
                submission.id,
                submission.metadataset_ids.len(),
                submission.file_ids.len()
            );
            Ok(())
        }
        Err(e) if e.entries().is_some() => {
            eprintln!("{COMMIT_FAILURE_MESSAGE}");
            eprint!("{}", render::validation_errors(session.view(), session.report()));
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

async fn delete(config: &Config, kind: EntityArg, id: &str) -> anyhow::Result<()> {
    let backend = backend(config)?;
    let mut session = SubmissionSession::new(&backend);

    let (entity, result) = match kind {
        EntityArg::File => (EntityKind::File, session.delete_file(id).await),
        EntityArg::Record => (EntityKind::Record, session.delete_metadataset(id).await),
    };
    if let Err(e) = result {
        bail!(deletion_failure_message(entity, &e));
    }
    println!("Deleted {id}.");
    Ok(())
}

async fn view(config: &Config, request: &ViewRequest) -> anyhow::Result<()> {
    let client = client(config)?;
    let page = client.view_page(request).await?;
    if let Some(error) = page.error {
        bail!(error);
    }
    print!("{}", render::view_table(&page));
    Ok(())
}
