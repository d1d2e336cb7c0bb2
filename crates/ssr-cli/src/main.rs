mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, registry::RegistrySubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "ssr",
    about = "Decode suspension reason codes and keep the encodings registry up to date",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .ssr/)
    #[arg(long, global = true, env = "SSR_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .ssr/config.yaml and the registry database
    Init,

    /// Show the suspension reason symbol table
    Symbols,

    /// Decode codes without touching the registry
    Decode {
        /// Encoded suspension reasons, e.g. AB
        #[arg(required = true)]
        codes: Vec<String>,

        /// Fail on characters missing from the symbol table instead of
        /// substituting "Unknown"
        #[arg(long)]
        strict: bool,
    },

    /// Reconcile codes into a namespace (reads stdin when no codes are given)
    Reconcile {
        /// Encoding table to reconcile into
        #[arg(long, short = 'n')]
        namespace: String,

        codes: Vec<String>,
    },

    /// Extract codes from JSON fixtures and reconcile them
    Scan {
        /// Fixture directory, fixture file, or code list
        path: PathBuf,

        /// Encoding table to reconcile into
        #[arg(long, short = 'n')]
        namespace: String,

        /// Write fixtures with dssr/dlsr fields added into this directory
        #[arg(long, value_name = "OUT_DIR")]
        annotate: Option<PathBuf>,
    },

    /// Inspect the encodings registry
    Registry {
        #[command(subcommand)]
        subcommand: RegistrySubcommand,
    },

    /// Run the configured job across every source and report the result
    Run {
        /// Run only this configured source
        #[arg(long)]
        source: Option<String>,
    },

    /// Show or validate the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Symbols => cmd::symbols::run(cli.json),
        Commands::Decode { codes, strict } => cmd::decode::run(&root, &codes, strict, cli.json),
        Commands::Reconcile { namespace, codes } => {
            cmd::reconcile::run(&root, &namespace, codes, cli.json)
        }
        Commands::Scan {
            path,
            namespace,
            annotate,
        } => cmd::scan::run(&root, &path, &namespace, annotate.as_deref(), cli.json),
        Commands::Registry { subcommand } => cmd::registry::run(&root, subcommand, cli.json),
        Commands::Run { source } => cmd::run::run(&root, source.as_deref(), cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
