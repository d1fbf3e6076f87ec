//! sqldict command-line tool
//!
//! Inspects, checks and refreshes XML schema dictionaries.

mod error;
mod formatter;

use clap::{Parser, Subcommand};
use error::CliError;
use formatter::OutputFormat;
use sqldict_core::{
    load_from_xml, save_to_xml, Database, DictConfig, SchemaSnapshot, SchemaSync,
    TracingEventSink,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// sqldict schema dictionary tool
#[derive(Parser, Debug)]
#[command(name = "sqldict")]
#[command(version, about = "Schema dictionary tool")]
pub struct Args {
    /// Match table and field names case-insensitively
    #[arg(long, global = true)]
    pub case_insensitive: bool,

    /// Indentation width of written XML
    #[arg(long, global = true, default_value_t = sqldict_core::config::DEFAULT_XML_INDENT)]
    pub indent: usize,

    /// Output format
    #[arg(long, global = true, default_value = "text", value_enum)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the contents of a dictionary
    Show {
        /// Dictionary file
        xml: PathBuf,
    },
    /// Report constraints whose references cannot be bound
    Check {
        /// Dictionary file
        xml: PathBuf,
    },
    /// Reconcile a dictionary with an introspection snapshot
    Sync {
        /// Snapshot file (JSON)
        snapshot: PathBuf,

        /// Existing dictionary to update
        #[arg(long)]
        base: Option<PathBuf>,

        /// Where to write the result (stdout if absent)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Snapshot rows are untyped cell arrays
        #[arg(long)]
        raw: bool,

        /// Leave views untouched
        #[arg(long)]
        no_views: bool,
    },
    /// Check that saving a loaded dictionary reproduces it
    Roundtrip {
        /// Dictionary file
        xml: PathBuf,
    },
}

impl Args {
    /// Build the dictionary configuration from the flags.
    pub fn to_config(&self) -> DictConfig {
        let sync_views = !matches!(self.command, Command::Sync { no_views: true, .. });
        DictConfig::new()
            .with_case_insensitive_names(self.case_insensitive)
            .with_sync_views(sync_views)
            .with_xml_indent(self.indent)
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sqldict=info")),
        )
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), CliError> {
    let config = args.to_config();
    match &args.command {
        Command::Show { xml } => {
            let db = open(config, xml)?;
            print!("{}", db.dump());
            Ok(())
        }
        Command::Check { xml } => {
            let db = open(config, xml)?;
            let report = formatter::format_activation(&db, args.format)?;
            if !report.is_empty() {
                println!("{}", report);
            }
            match db.constraints().filter(|c| !c.is_active()).count() {
                0 => Ok(()),
                n => Err(CliError::Inactive(n)),
            }
        }
        Command::Sync {
            snapshot,
            base,
            output,
            raw,
            ..
        } => run_sync(config, snapshot, base.as_deref(), output.as_deref(), *raw, args.format),
        Command::Roundtrip { xml } => {
            let first = save_to_xml(&open(config.clone(), xml)?)?;
            let mut reloaded = Database::new(config);
            load_from_xml(&mut reloaded, &first)?;
            let second = save_to_xml(&reloaded)?;
            if first != second {
                return Err(CliError::Unstable(xml.display().to_string()));
            }
            info!(path = %xml.display(), "round trip is stable");
            Ok(())
        }
    }
}

fn read(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|e| CliError::io(path, e))
}

/// Load a dictionary file into a fresh database.
fn open(config: DictConfig, path: &Path) -> Result<Database, CliError> {
    let mut db = Database::new(config);
    load_from_xml(&mut db, &read(path)?)?;
    info!(
        path = %path.display(),
        tables = db.table_count(),
        constraints = db.constraint_count(),
        "dictionary loaded"
    );
    Ok(db)
}

fn run_sync(
    config: DictConfig,
    snapshot: &Path,
    base: Option<&Path>,
    output: Option<&Path>,
    raw: bool,
    format: OutputFormat,
) -> Result<(), CliError> {
    let json = read(snapshot)?;
    let source = if raw {
        SchemaSnapshot::from_raw_json(&json)?
    } else {
        SchemaSnapshot::from_json(&json)?
    };

    let mut db = match base {
        Some(path) => open(config, path)?,
        None => Database::new(config),
    };
    db.set_event_sink(Arc::new(TracingEventSink));

    let report = SchemaSync::new(&source).run(&mut db)?;
    let xml = save_to_xml(&db)?;
    match output {
        Some(path) => {
            std::fs::write(path, xml).map_err(|e| CliError::io(path, e))?;
            println!("{}", formatter::format_report(&report, format)?);
        }
        None => print!("{}", xml),
    }
    Ok(())
}
