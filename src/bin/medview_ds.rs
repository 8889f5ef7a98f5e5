use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use medview_datasets::config::ConfigLoader;
use medview_datasets::datasets::DatasetStore;
use medview_datasets::error::DatasetError;
use medview_datasets::fs_util::read_source_files;
use medview_datasets::output::{JsonOutput, LoadReport, RestoreReport};
use medview_datasets::session::StateFile;

#[derive(Parser)]
#[command(name = "medview-ds")]
#[command(about = "Load medical datasets, pick a primary selection, and save or restore sessions")]
#[command(version, author)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Load files and archives, print per-file results")]
    Load(LoadArgs),
    #[command(about = "Print the manifest of a session archive")]
    Inspect(SessionArgs),
    #[command(about = "Restore a session archive into a fresh store")]
    Restore(RestoreArgs),
}

#[derive(Args)]
struct LoadArgs {
    #[arg(required = true)]
    files: Vec<Utf8PathBuf>,

    #[arg(long)]
    config: Option<String>,

    /// Make the first selectable result the primary selection.
    #[arg(long)]
    select_first: bool,

    /// Write a session archive after loading.
    #[arg(long)]
    session: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct SessionArgs {
    session: Utf8PathBuf,
}

#[derive(Args)]
struct RestoreArgs {
    session: Utf8PathBuf,

    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(report) = run().await {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<DatasetError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &DatasetError) -> u8 {
    match error {
        DatasetError::ConfigRead(_) | DatasetError::ConfigParse(_) => 2,
        DatasetError::InvalidStateFile(_) | DatasetError::ManifestParse(_) => 2,
        DatasetError::ArchiveCorrupt { .. }
        | DatasetError::ArchiveDepthExceeded { .. }
        | DatasetError::ArchiveTooManyEntries { .. }
        | DatasetError::ArchiveTooLarge { .. }
        | DatasetError::UnsafeArchivePath(_) => 3,
        _ => 1,
    }
}

async fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Load(args) => run_load(args).await,
        Commands::Inspect(args) => run_inspect(args),
        Commands::Restore(args) => run_restore(args).await,
    }
}

async fn run_load(args: LoadArgs) -> miette::Result<()> {
    let LoadArgs {
        files,
        config,
        select_first,
        session,
    } = args;

    let config = ConfigLoader::resolve(config.as_deref())?;
    let store = DatasetStore::in_memory(&config);
    let sources = read_source_files(&files)?;
    let results = store.load_files(sources).await?;

    if select_first {
        if let Some(selection) = results.iter().find_map(|result| result.to_selection()) {
            store.set_primary_selection(Some(selection)).await;
        }
    }

    if let Some(path) = &session {
        let mut state = StateFile::new();
        store.serialize(&mut state).await?;
        state.save(path)?;
    }

    let report = LoadReport {
        results,
        primary_selection: store.primary_selection(),
        messages: store.messages().messages(),
        session: session.map(|path| path.to_string()),
    };
    JsonOutput::print_load(&report).into_diagnostic()?;
    Ok(())
}

fn run_inspect(args: SessionArgs) -> miette::Result<()> {
    let state = StateFile::open(&args.session)?;
    JsonOutput::print_manifest(&state.manifest).into_diagnostic()?;
    Ok(())
}

async fn run_restore(args: RestoreArgs) -> miette::Result<()> {
    let config = ConfigLoader::resolve(args.config.as_deref())?;
    let state = StateFile::open(&args.session)?;
    let store = DatasetStore::in_memory(&config);
    let restored = store.restore(&state).await?;

    let report = RestoreReport {
        restored,
        messages: store.messages().messages(),
    };
    JsonOutput::print_restore(&report).into_diagnostic()?;
    Ok(())
}
