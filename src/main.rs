mod args;
mod progress;

use crate::args::{Args, CheckArgs, Commands, Remote, SessionArgs, VerifyArgs};
use crate::progress::ProgressIndicator;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use itertools::Itertools;
use std::{collections::BTreeMap, fs, io, sync::Arc};
use thiserror::Error;
use verifier::{
    api::{ApiClient, ApiClientError},
    compiler::{CompileError, HttpCompiler, Severity},
    registry::{RegistryError, RegistryStore},
    resolver::{self, ImportResolver, SourceTree},
    session::{
        ContractTarget, RemoteVerificationSession, RoundOutcome, SessionFailure,
        StatelessVerification,
    },
    version::{CompilerIndex, IndexError},
    workflow::{VerificationWorkflow, WorkflowError},
};

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Api(#[from] ApiClientError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Resolver(#[from] resolver::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("[E050] Couldn't read {path}: {error}")]
    Io { path: Utf8PathBuf, error: io::Error },

    #[error("[E051] {0} is not a file")]
    NotAFile(Utf8PathBuf),

    #[error("[E052] No compiler release satisfies the pragma in {0}\n\nSuggestions:\n  • Check the `pragma solidity` line of the source\n  • Pick a compiler with --compiler-version")]
    NoCompiler(String),

    #[error("[E053] Compiler version {0} is not in the release index\n\nSuggestions:\n  • Use a released version such as 0.8.18\n  • Check --index-url points at the release list")]
    UnknownCompiler(String),

    #[error("[E054] Couldn't find the source of: {}\n\nSuggestions:\n  • Point --imports at the directory holding the imported files", .0.join(", "))]
    UnresolvedImports(Vec<String>),

    #[error("[E055] The deployed bytecode doesn't match any contract in {0}\n\nSuggestions:\n  • Check the compiler version and the imported sources\n  • Make sure the bytecode is the deployed (runtime) bytecode")]
    Mismatch(String),

    #[error("[E056] Verification server request failed: {0}")]
    Round(SessionFailure),

    #[error("[E057] Nothing to verify\n\nSuggestions:\n  • Pass the Solidity files or the directories holding them")]
    NoFiles,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Args { command } = Args::parse();
    match &command {
        Commands::Verify(args) => verify(args).await?,
        Commands::Session(args) => session(args).await?,
        Commands::Check(args) => check(args).await?,
    }
    Ok(())
}

fn read(path: &Utf8Path) -> Result<String, CliError> {
    fs::read_to_string(path).map_err(|error| CliError::Io {
        path: path.to_owned(),
        error,
    })
}

/// Reads every given file, and every Solidity file under the given
/// directories, keyed by the name they are uploaded under.
fn collect_files(paths: &[Utf8PathBuf]) -> Result<BTreeMap<String, String>, CliError> {
    let mut files = BTreeMap::new();
    for path in paths {
        if path.is_dir() {
            files.extend(SourceTree::load(path)?.to_file_map());
        } else {
            let name = path
                .file_name()
                .ok_or_else(|| CliError::NotAFile(path.clone()))?;
            files.insert(name.to_owned(), read(path)?);
        }
    }
    Ok(files)
}

fn ensure_applied(outcome: RoundOutcome, failure: Option<SessionFailure>) -> Result<(), CliError> {
    match outcome {
        RoundOutcome::Applied | RoundOutcome::Skipped => Ok(()),
        _ => Err(CliError::Round(failure.unwrap_or_else(|| SessionFailure {
            code: "E056",
            message: format!("round ended as {outcome:?}"),
        }))),
    }
}

fn target(remote: &Remote) -> ContractTarget {
    ContractTarget::new(remote.address.clone(), remote.chain.id.clone())
}

async fn verify(args: &VerifyArgs) -> Result<(), CliError> {
    let source = read(&args.source)?;
    let file_name = args
        .source
        .file_name()
        .ok_or_else(|| CliError::NotAFile(args.source.clone()))?;
    let imports_root = args
        .imports
        .clone()
        .or_else(|| args.source.parent().map(Utf8Path::to_owned))
        .unwrap_or_else(|| Utf8PathBuf::from("."));
    let tree = SourceTree::load(&imports_root)?;

    let http = reqwest::Client::new();
    let spinner = ProgressIndicator::new_spinner("Fetching compiler releases...");
    let index = CompilerIndex::fetch(&http, &args.index_url).await;
    spinner.finish_and_clear();
    let index = Arc::new(index?);

    let registry = match &args.registry {
        Some(path) => RegistryStore::at(path.clone())?,
        None => RegistryStore::new()?,
    };
    let workflow = VerificationWorkflow::new(
        HttpCompiler::new(args.compiler_url.clone())?,
        registry,
        Arc::clone(&index),
        ImportResolver::new(),
        args.contract_id.clone(),
        &args.bytecode,
    );

    // Step 1 -> 2
    workflow.set_source(file_name, Some(source));
    workflow.next().await?;

    if let Some(requested) = &args.compiler_version {
        if !index.contains(requested) {
            return Err(CliError::UnknownCompiler(requested.clone()));
        }
        workflow.set_compiler_version(Some(requested.clone()));
    }
    let version = workflow
        .snapshot()
        .compiler_version
        .ok_or_else(|| CliError::NoCompiler(file_name.to_owned()))?;
    println!("Using compiler {version}");

    // Step 2 -> 3
    workflow.next().await?;
    loop {
        let specs = workflow.snapshot().import_specs;
        let filled = tree.fill(&specs);
        if filled == specs {
            break;
        }
        workflow.replace_imports(&filled);
    }
    let missing = workflow
        .snapshot()
        .import_specs
        .into_iter()
        .filter(|spec| !spec.is_resolved())
        .map(|spec| spec.path)
        .collect_vec();
    if !missing.is_empty() {
        return Err(CliError::UnresolvedImports(missing));
    }

    // Step 3 -> 4
    let spinner = ProgressIndicator::new_spinner(&format!("Compiling {file_name}..."));
    let compiled = workflow.next().await;
    spinner.finish_and_clear();
    compiled?;

    if let Some(output) = workflow.snapshot().compile_output {
        for message in output
            .errors()
            .iter()
            .filter(|message| message.severity == Severity::Error)
        {
            eprintln!(
                "{}",
                message.formatted_message.as_deref().unwrap_or(&message.message)
            );
        }
    }
    let found = workflow
        .matched_contract()
        .filter(|found| found.kind.is_match())
        .ok_or_else(|| CliError::Mismatch(file_name.to_owned()))?;
    println!("{} is a {} of the deployed bytecode", found.contract_name, found.kind);

    // Step 4 -> 5
    workflow.next().await?;
    match &args.contract_id {
        Some(id) => println!("Registered {} as {id}", found.contract_name),
        None => println!("No --contract-id given, {} was not registered", found.contract_name),
    }
    Ok(())
}

async fn session(args: &SessionArgs) -> Result<(), CliError> {
    let client = ApiClient::new(args.remote.server.clone())?;
    let session = RemoteVerificationSession::new(client, Some(target(&args.remote)));

    let outcome = session.mount().await;
    ensure_applied(outcome, session.state().failure)?;

    if args.clear {
        let outcome = session.clear_session().await;
        ensure_applied(outcome, session.state().failure)?;
        println!("Session cleared");
    }

    let files = collect_files(&args.paths)?;
    if !files.is_empty() {
        let spinner = ProgressIndicator::new_spinner(&format!("Uploading {} files...", files.len()));
        let outcome = session.upload_files(&files).await;
        spinner.finish_and_clear();
        ensure_applied(outcome, session.state().failure)?;
    }

    let state = session.state();
    println!("Files in session: {}", state.item_count());
    for file in &state.uploaded_files {
        println!("  {file}");
    }
    if !state.unused_files.is_empty() {
        println!("Unused files: {}", state.unused_files.join(", "));
    }
    match state.resolved_match() {
        Some(resolved) => println!(
            "Verified {} ({})",
            resolved.contract_name(),
            resolved.contract.compiled_path.as_deref().unwrap_or_default()
        ),
        None => println!(
            "No contract verified yet, status: {}",
            state.status().unwrap_or_else(|| "none".to_owned())
        ),
    }
    session.dispose();
    Ok(())
}

async fn check(args: &CheckArgs) -> Result<(), CliError> {
    let files = collect_files(&args.paths)?;
    if files.is_empty() {
        return Err(CliError::NoFiles);
    }

    let client = ApiClient::new(args.remote.server.clone())?;
    let verification = StatelessVerification::new(client)
        .with_options(args.compiler_version.clone(), args.contract_name.clone());

    let spinner = ProgressIndicator::new_spinner(&format!("Verifying {} files...", files.len()));
    let outcome = verification.update(Some(target(&args.remote)), files).await;
    spinner.finish_and_clear();

    let state = verification.state();
    ensure_applied(outcome, state.failure.clone())?;
    if let Some(response) = &state.response {
        if let Some(error) = &response.error {
            println!("Server error: {error}");
        }
        for result in &response.result {
            println!("{} on chain {}: {}", result.address, result.chain_id, result.status);
        }
    }
    verification.dispose();
    Ok(())
}
