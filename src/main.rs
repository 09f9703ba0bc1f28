//! cwlflow CLI
//!
//! Inspect, normalize, catalog and run CWL documents.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use cwlflow::runtime::load_config;
use cwlflow::{CwlRunner, Process, ProcessCatalog, ResolutionContext};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "cwlflow")]
#[command(about = "Build, inspect and run CWL workflows", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a document and print its inputs, outputs and steps
    Inspect {
        /// Path or URI of the CWL document
        document: String,
        /// Also load every process referenced by a workflow's steps
        #[arg(short, long)]
        recursive: bool,
    },
    /// Load a document and save it in canonical form
    Normalize {
        /// Path or URI of the CWL document
        document: String,
        /// Output directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
    /// Index the CWL documents of a directory by name and version
    Catalog {
        /// Root directory
        root: PathBuf,
    },
    /// Run a workflow with the external engine
    Run {
        /// Workflow document
        document: PathBuf,
        /// Config document with the workflow inputs
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Working directory of the engine
        #[arg(long)]
        cwd: Option<PathBuf>,
        /// Runner settings (TOML)
        #[arg(short, long, default_value = "cwlflow.toml")]
        settings: PathBuf,
        /// Extra engine flags
        #[arg(last = true)]
        extra: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "cwlflow=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect {
            document,
            recursive,
        } => cmd_inspect(&document, recursive),
        Commands::Normalize { document, out } => cmd_normalize(&document, out),
        Commands::Catalog { root } => cmd_catalog(root),
        Commands::Run {
            document,
            config,
            cwd,
            settings,
            extra,
        } => cmd_run(document, config, cwd, settings, extra),
    }
}

fn cmd_inspect(document: &str, recursive: bool) -> anyhow::Result<()> {
    let mut context = ResolutionContext::new();
    let process = Process::load(document, recursive, &mut context)
        .with_context(|| format!("Failed to load {}", document))?;

    println!("{} {}", process.class(), process.id());
    println!("  cwlVersion: {}", process.cwl_version());
    println!("  inputs:");
    for input in process.inputs() {
        println!("    {}: {}{}", input.id, input.cwl_type, optional_mark(input.optional));
    }
    println!("  outputs:");
    for output in process.outputs() {
        println!("    {}: {}{}", output.id, output.cwl_type, optional_mark(output.optional));
    }
    if let Some(workflow) = process.as_workflow() {
        println!("  steps:");
        for step in &workflow.steps {
            println!("    {} -> {}", step.id, step.run.id());
        }
    }
    if !process.requirements().is_empty() {
        println!("  requirements:");
        for requirement in process.requirements() {
            println!("    {}", requirement.class());
        }
    }
    if recursive && context.len() > 1 {
        println!("resolved {} processes:", context.len());
        for id in context.ids() {
            println!("  {}", id);
        }
    }
    Ok(())
}

fn optional_mark(optional: bool) -> &'static str {
    if optional {
        "?"
    } else {
        ""
    }
}

fn cmd_normalize(document: &str, out: PathBuf) -> anyhow::Result<()> {
    let mut context = ResolutionContext::new();
    let process = Process::load(document, false, &mut context)
        .with_context(|| format!("Failed to load {}", document))?;
    let path = process
        .save(&out)
        .with_context(|| format!("Failed to save into {}", out.display()))?;
    println!("{}", path.display());
    Ok(())
}

fn cmd_catalog(root: PathBuf) -> anyhow::Result<()> {
    let mut catalog = ProcessCatalog::new(root);
    let report = catalog.refresh()?;

    for name in catalog.names() {
        let versions = catalog
            .versions(name)
            .iter()
            .map(|version| version.to_string())
            .collect::<Vec<_>>();
        println!("{}: {}", name, versions.join(", "));
    }
    if !report.is_clean() {
        eprintln!("{} documents could not be indexed:", report.failures.len());
        for failure in &report.failures {
            eprintln!("  {}: {}", failure.path.display(), failure.error);
        }
    }
    Ok(())
}

fn cmd_run(
    document: PathBuf,
    config: Option<PathBuf>,
    cwd: Option<PathBuf>,
    settings: PathBuf,
    extra: Vec<String>,
) -> anyhow::Result<()> {
    let mut settings = load_config(&settings)
        .with_context(|| format!("Failed to load settings from {}", settings.display()))?;
    settings.extra_args.extend(extra);

    let runner = CwlRunner::new(settings);
    if let Err(e) = runner.run(&document, config.as_deref(), cwd.as_deref()) {
        bail!("Workflow {} failed: {}", document.display(), e);
    }
    Ok(())
}
