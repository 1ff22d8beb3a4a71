//! quizlink: link quiz questions to concepts, audit the links and fill coverage gaps.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use quizlink_core::engine::LinkMode;

mod commands;

#[derive(Parser)]
#[command(
    name = "quizlink",
    version,
    about = "Link quiz questions to concepts and rank confusable concepts"
)]
struct Cli {
    /// Config file path (default: ./quizlink.toml, then ~/.config/quizlink/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory holding chapter files (overrides the config)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Link questions to concepts and rank confusables for every chapter
    Build {
        /// Similarity strategy: tfidf or jaccard (default from config)
        #[arg(long)]
        strategy: Option<String>,

        /// Keep every stored primary concept, including cleared ones
        #[arg(long, conflicts_with = "reassign_primaries")]
        keep_primaries: bool,

        /// Discard stored primary concepts (and audit corrections) and reassign all
        #[arg(long)]
        reassign_primaries: bool,

        /// Max chapters processed concurrently
        #[arg(long)]
        parallelism: Option<usize>,

        /// Also write the build report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Ask a model to check every question's primary concept
    Audit {
        /// Provider name from the config
        #[arg(long)]
        provider: Option<String>,

        /// Model id (default from config)
        #[arg(long)]
        model: Option<String>,

        /// Only audit these chapters (comma-separated ids)
        #[arg(long, value_delimiter = ',')]
        chapters: Vec<String>,

        /// Questions per request
        #[arg(long)]
        batch_size: Option<usize>,

        /// Report path (default: <data-dir>/audit_report.json)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Apply an audit report's suggestions as primary concept corrections
    ApplyAudit {
        /// Audit report JSON (default: <data-dir>/audit_report.json)
        #[arg(long)]
        report: Option<PathBuf>,

        /// Show what would change without writing files
        #[arg(long)]
        dry_run: bool,
    },

    /// List concepts with no associated questions
    Gaps {
        /// Only these chapters (comma-separated ids)
        #[arg(long, value_delimiter = ',')]
        chapters: Vec<String>,

        /// Output format: table, json
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Generate questions for concepts with no questions
    Generate {
        /// Provider name from the config
        #[arg(long)]
        provider: Option<String>,

        /// Model id (default from config)
        #[arg(long)]
        model: Option<String>,

        /// Only these chapters (comma-separated ids)
        #[arg(long, value_delimiter = ',')]
        chapters: Vec<String>,

        /// Questions per missing concept
        #[arg(long)]
        per_concept: Option<usize>,

        /// Directory with <chapter_id>.md reference texts
        #[arg(long)]
        reference_dir: Option<PathBuf>,

        /// Directory for generated Markdown question files
        #[arg(long, default_value = "generated")]
        output: PathBuf,

        /// Append generated questions to the chapters and rebuild links
        #[arg(long)]
        merge: bool,
    },

    /// Check chapter files for problems
    Validate,

    /// Write an HTML coverage report and, if present, the audit report as Markdown
    Report {
        /// Output directory (default: the data directory)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Audit report JSON (default: <data-dir>/audit_report.json if it exists)
        #[arg(long)]
        audit: Option<PathBuf>,
    },

    /// List available models
    ListModels {
        /// Filter to specific provider
        #[arg(long)]
        provider: Option<String>,
    },

    /// Create a starter config and data directory
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("quizlink=info".parse().expect("static log directive")),
        )
        .init();

    let cli = Cli::parse();
    let global = commands::GlobalArgs {
        config: cli.config,
        data_dir: cli.data_dir,
    };

    let result = match cli.command {
        Commands::Build {
            strategy,
            keep_primaries,
            reassign_primaries,
            parallelism,
            report,
        } => {
            let mode = if keep_primaries {
                LinkMode::KeepPrimaries
            } else if reassign_primaries {
                LinkMode::Reassign
            } else {
                LinkMode::FillMissing
            };
            commands::build::execute(&global, strategy, mode, parallelism, report).await
        }
        Commands::Audit {
            provider,
            model,
            chapters,
            batch_size,
            output,
        } => {
            commands::audit::execute(&global, provider, model, chapters, batch_size, output).await
        }
        Commands::ApplyAudit { report, dry_run } => {
            commands::apply_audit::execute(&global, report, dry_run)
        }
        Commands::Gaps { chapters, format } => commands::gaps::execute(&global, chapters, format),
        Commands::Generate {
            provider,
            model,
            chapters,
            per_concept,
            reference_dir,
            output,
            merge,
        } => {
            commands::generate::execute(
                &global,
                commands::generate::GenerateArgs {
                    provider,
                    model,
                    chapters,
                    per_concept,
                    reference_dir,
                    output,
                    merge,
                },
            )
            .await
        }
        Commands::Validate => commands::validate::execute(&global),
        Commands::Report { output, audit } => commands::report::execute(&global, output, audit),
        Commands::ListModels { provider } => commands::list_models::execute(&global, provider),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
