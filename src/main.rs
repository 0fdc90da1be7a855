use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use gbschema::{Domain, Settings, Summary};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "gbschema")]
#[command(version, about = "Load a domain schema and summarize it", long_about = None)]
struct Args {
    /// Schema file, or a bare name looked up in the configured schema folder
    schema: String,

    /// Output the summary as JSON
    #[arg(long)]
    json: bool,

    /// Path to a settings file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let Args { schema, json, config } = Args::parse();

    let settings = match Settings::load(config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut domain = Domain::new();
    // bare names are looked up in the configured schema folder
    let is_file = schema.contains(['/', '\\']) || schema.ends_with(&format!(".{}", settings.extension));
    let loaded = if is_file {
        domain.load_file(&schema, &settings)
    } else {
        domain.load_named(&schema, &settings)
    };
    if let Err(e) = loaded {
        error!(schema = %schema, "{e}");
        return ExitCode::FAILURE;
    }

    let summary = domain.summary();
    if json {
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                error!("cannot render summary: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        print_summary(&summary);
    }
    ExitCode::SUCCESS
}

fn print_summary(summary: &Summary) {
    println!("domain: {}", summary.domain.as_deref().unwrap_or("-"));
    println!(
        "entities: {} top, {} sub",
        summary.top_entity_count, summary.sub_entity_count
    );
    for name in &summary.top_entities {
        println!("  {name}");
    }
    println!(
        "relationships: {} top, {} total, {} references",
        summary.top_relationship_count, summary.relationship_count, summary.reference_count
    );
    for name in &summary.top_relationships {
        println!("  {name}");
    }
    if !summary.unions.is_empty() {
        println!("unions: {}", summary.unions.join(", "));
    }
    if !summary.axioms.is_empty() {
        println!("axioms: {}", summary.axioms.join(", "));
    }
    if !summary.user_types.is_empty() {
        println!("user types: {}", summary.user_types.join(", "));
    }
    if !summary.removed_entities.is_empty() || !summary.removed_relationships.is_empty() {
        println!(
            "removed: {}",
            summary
                .removed_entities
                .iter()
                .chain(&summary.removed_relationships)
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    println!("files: {}", summary.imported_files.len());
}
