//! Chartwright CLI - Inspect release values and rendered manifests

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod error;
mod exit_codes;

use commands::ValueArgs;

#[derive(Parser)]
#[command(name = "chartwright")]
#[command(author = "Chartwright Contributors")]
#[command(version)]
#[command(about = "Inspect composed release values and rendered Kubernetes manifests", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compose values and print them with sensitive paths hidden
    Values {
        #[command(flatten)]
        sources: ValueArgs,

        /// Print JSON instead of YAML
        #[arg(long)]
        json: bool,
    },

    /// Split a rendered manifest by template
    Manifests {
        /// Rendered manifest file, or '-' for stdin
        input: PathBuf,

        /// Show only templates matching a glob (repeatable)
        #[arg(short = 's', long = "show-only")]
        show_only: Vec<String>,

        /// Write one file per template into this directory
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Print resources as JSON keyed by namespace, kind, apiVersion and name
        #[arg(long, conflicts_with = "output_dir")]
        json: bool,

        /// Rendered hook documents to append
        #[arg(long)]
        hooks: Option<PathBuf>,

        /// CRD files to append (repeatable)
        #[arg(long = "crd")]
        crds: Vec<PathBuf>,

        /// Chart name used to qualify CRD file names
        #[arg(long, default_value = "chart")]
        chart_name: String,

        /// Leave out every hook
        #[arg(long)]
        no_hooks: bool,

        /// Leave out test hooks
        #[arg(long)]
        skip_tests: bool,

        #[command(flatten)]
        sources: ValueArgs,
    },
}

fn init_tracing(debug: bool) {
    let default_filter = if debug {
        "chartwright=debug"
    } else {
        "chartwright=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    let result = match cli.command {
        Commands::Values { sources, json } => commands::values::run(&sources, json),

        Commands::Manifests {
            input,
            show_only,
            output_dir,
            json,
            hooks,
            crds,
            chart_name,
            no_hooks,
            skip_tests,
            sources,
        } => commands::manifests::run(&commands::manifests::ManifestsArgs {
            input,
            show_only,
            output_dir,
            json,
            hooks,
            crds,
            chart_name,
            no_hooks,
            skip_tests,
            sources,
        }),
    };

    if let Err(err) = result {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}
