//! ViewForge CLI - Render views from a directory
//!
//! Commands: render, list, check
//! Rendered HTML goes to stdout, reports are JSON
//! Returns non-zero when a view fails

use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use viewforge_core::{
    DirectoryLocator, EngineConfig, RenderError, RenderOutcome, ViewEngine, ViewModel,
    ENGINE_VERSION,
};

#[derive(Parser)]
#[command(name = "viewforge-cli")]
#[command(about = "ViewForge CLI - View Rendering Engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to views directory
    #[arg(short, long, default_value = "views")]
    views_dir: PathBuf,

    /// Path to a JSON settings file with a "views" section
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a view to stdout
    Render {
        /// Logical view name, e.g. home/index
        #[arg(long)]
        view: String,

        /// JSON model
        #[arg(short, long, default_value = "{}")]
        model: String,
    },

    /// List available views
    List {
        /// Only views directly under this directory
        #[arg(short, long)]
        prefix: Option<String>,
    },

    /// Compile every view and report failures
    Check,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match EngineConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!(r#"{{"error": "Failed to load settings: {}"}}"#, e);
            return ExitCode::FAILURE;
        }
    };

    let engine = ViewEngine::new(Arc::new(DirectoryLocator::new(&cli.views_dir)), config);

    match cli.command {
        Commands::Render { view, model } => {
            let model: serde_json::Value = match serde_json::from_str(&model) {
                Ok(m) => m,
                Err(e) => {
                    eprintln!(r#"{{"success": false, "error": "Invalid model: {}"}}"#, e);
                    return ExitCode::FAILURE;
                }
            };

            let stdout = io::stdout();
            let mut sink = stdout.lock();
            match engine.render(&view, &ViewModel::new(model), &mut sink) {
                Ok(RenderOutcome::Completed { .. }) => ExitCode::SUCCESS,
                Ok(RenderOutcome::DiagnosticPage(_)) => ExitCode::from(2),
                Err(RenderError::ViewNotFound(name)) => {
                    eprintln!(r#"{{"success": false, "error": "View not found: {}"}}"#, name);
                    ExitCode::from(3)
                }
                Err(e) => {
                    if let Err(flush_err) = sink.flush() {
                        warn!(error = %flush_err, "failed to flush partial output");
                    }
                    eprintln!(
                        "{}",
                        serde_json::json!({
                            "success": false,
                            "error": e.to_string(),
                            "partialOutput": e.is_partial_output(),
                        })
                    );
                    ExitCode::FAILURE
                }
            }
        }

        Commands::List { prefix } => {
            let views = match &prefix {
                Some(p) => engine.accessor().list_under(p),
                None => engine.accessor().list_all(),
            };
            match views {
                Ok(views) => {
                    let listing: Vec<_> = views
                        .iter()
                        .map(|v| serde_json::json!({
                            "view": v.logical_path(),
                            "file": v.full_name(),
                        }))
                        .collect();
                    print_json(&serde_json::json!(listing));
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!(r#"{{"error": "{}"}}"#, e);
                    ExitCode::FAILURE
                }
            }
        }

        Commands::Check => match engine.check_all() {
            Ok(failures) => {
                let report = serde_json::json!({
                    "engineVersion": ENGINE_VERSION,
                    "generatedAt": Utc::now(),
                    "valid": failures.is_empty(),
                    "failures": failures,
                });
                print_json(&report);
                if failures.is_empty() {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::from(2)
                }
            }
            Err(e) => {
                eprintln!(r#"{{"valid": false, "error": "{}"}}"#, e);
                ExitCode::FAILURE
            }
        },
    }
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!(r#"{{"error": "{}"}}"#, e),
    }
}
