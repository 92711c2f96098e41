use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::debug;

use pairip_patcher::config::{PipelineConfig, DEFAULT_APK_EDITOR, DEFAULT_JAVA, DEFAULT_JAVA_HEAP, DEFAULT_SIGNER};
use pairip_patcher::pairip::REPLACEMENT_CORE;
use pairip_patcher::pipeline::{Pipeline, PipelineOutcome, Workspace};
use pairip_patcher::toolchain::JavaToolchain;

/// Removes PairIP license and integrity checks from a split-package bundle.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Input .apks bundle
    input: PathBuf,

    /// APKEditor jar
    #[arg(long, env = "PAIRIP_APK_EDITOR", default_value = DEFAULT_APK_EDITOR)]
    apk_editor: PathBuf,

    /// uber-apk-signer jar
    #[arg(long, env = "PAIRIP_SIGNER", default_value = DEFAULT_SIGNER)]
    signer: PathBuf,

    /// Java launcher
    #[arg(long, env = "PAIRIP_JAVA", default_value = DEFAULT_JAVA)]
    java: PathBuf,

    /// Maximum Java heap, ignored when _JAVA_OPTIONS is set
    #[arg(long, default_value = DEFAULT_JAVA_HEAP)]
    java_heap: String,

    /// Write the patch report as JSON
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        eprintln!("\nProcess cancelled by user.");
        std::process::exit(130);
    })
    .context("failed to set Ctrl+C handler")?;

    let cli = Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_module("pairip_patcher", level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();

    let workspace = Workspace::for_input(&cli.input);
    let config = PipelineConfig {
        java: cli.java,
        apk_editor_jar: cli.apk_editor,
        signer_jar: cli.signer,
        java_heap: cli.java_heap,
        replacement_library: PathBuf::from(REPLACEMENT_CORE),
    }
    .resolve(&workspace.dir);
    debug!("configuration: {}", serde_json::to_string(&config)?);

    let replacement = config.replacement_library.clone();
    let tools = JavaToolchain::new(config, workspace.dir.clone());
    let pipeline = Pipeline::new(workspace, replacement, tools);
    let outcome = pipeline
        .run()
        .with_context(|| format!("patching {} failed; intermediate files were kept", cli.input.display()))?;

    print_summary(&outcome);

    if let Some(path) = &cli.report {
        let json = serde_json::to_string_pretty(&outcome)?;
        fs::write(path, json).with_context(|| format!("failed to write report to {}", path.display()))?;
    }
    Ok(())
}

fn print_summary(outcome: &PipelineOutcome) {
    let report = &outcome.report;
    println!();
    println!("Output:    {}", outcome.output.display());
    println!("Size:      {:.2} MB", outcome.size as f64 / (1024.0 * 1024.0));
    println!("Signed:    {}", if outcome.signed { "yes" } else { "no (unsigned build)" });
    println!("Time:      {:.1}s", outcome.elapsed.as_secs_f64());
    println!("Manifest:  {} entries removed", report.manifest.occurrences);
    for (rule, summary) in &report.methods {
        println!(
            "Smali:     {rule}: {} of {} file(s) matched",
            summary.files_matched, summary.files_scanned
        );
    }
    println!(
        "Libraries: {} copied to {}",
        report.libraries.copied,
        if report.libraries.architectures.is_empty() {
            "no architectures".to_string()
        } else {
            report.libraries.architectures.join(", ")
        }
    );
    println!("Paths:     {} entries rewritten", report.file_paths.occurrences);
    if report.is_complete() {
        println!("All patches applied.");
    } else {
        println!("Completed with {} warning(s):", report.warnings.len());
        for w in &report.warnings {
            println!("  - {w}");
        }
    }
}
