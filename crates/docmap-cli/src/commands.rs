use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use docmap_document::DocumentStore;
use docmap_loader::{classify_embeddings, Classification, DataLoader, LoadReport, RawRecordSet};
use docmap_schema::{MetadataSource, ReferenceTarget, Schema, TypeMetadata};
use docmap_store::InMemoryDocumentStore;
use serde_json::json;

use crate::cli::*;
use crate::config::DocmapConfig;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Load(args) => cmd_load(args, &cli.format),
        Command::Classify(args) => cmd_classify(args, &cli.format),
        Command::Schema(args) => cmd_schema(args, &cli.format),
    }
}

fn read_schema(path: &Path) -> anyhow::Result<Arc<dyn MetadataSource>> {
    let schema =
        Schema::from_path(path).with_context(|| format!("reading schema {}", path.display()))?;
    Ok(Arc::new(schema))
}

/// A finished `load`: the report plus the store it ran against.
pub(crate) struct LoadOutcome {
    pub report: LoadReport,
    pub restored: usize,
    pub store: Arc<InMemoryDocumentStore>,
}

pub(crate) fn load(args: &LoadArgs) -> anyhow::Result<LoadOutcome> {
    let mut config = match &args.config {
        Some(path) => DocmapConfig::from_path(path)?,
        None => DocmapConfig::default(),
    };
    if args.no_flush {
        config.loader.flush = false;
    }

    let schema = read_schema(&args.schema)?;
    let store = InMemoryDocumentStore::with_config(Arc::clone(&schema), config.store);
    let mut restored = 0;
    if let Some(path) = args.store.as_deref().filter(|path| path.exists()) {
        restored = store
            .restore_snapshot(path)
            .with_context(|| format!("restoring store {}", path.display()))?;
    }

    let data = RawRecordSet::from_path(&args.fixtures)
        .with_context(|| format!("reading fixtures {}", args.fixtures.display()))?;
    let loader = DataLoader::with_config(store.clone(), schema, config.loader);
    let report = loader.load(data, args.purge)?;

    if let Some(path) = &args.store {
        store
            .save_snapshot(path)
            .with_context(|| format!("writing store {}", path.display()))?;
    }

    Ok(LoadOutcome {
        report,
        restored,
        store,
    })
}

fn cmd_load(args: LoadArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let outcome = load(&args)?;
    let report = &outcome.report;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OutputFormat::Text => {
            println!("{} Loaded {} records", "✓".green().bold(), report.persisted.to_string().bold());
            match &report.flush {
                Some(flush) => println!(
                    "  Flushed: {} inserted, {} updated",
                    flush.inserted.to_string().green(),
                    flush.updated
                ),
                None => println!(
                    "  {} {} writes left queued",
                    "!".yellow().bold(),
                    outcome.store.pending_count()
                ),
            }
            if outcome.restored > 0 {
                println!("  Restored: {}", outcome.restored);
            }
            if args.purge {
                println!("  Purged: {}", report.purged.to_string().red());
            }
            if !report.promoted.is_empty() {
                println!("  Promoted: {}", report.promoted.join(", ").cyan());
            }
            if let Some(path) = &args.store {
                println!("  Store: {}", path.display().to_string().bold());
            }
        }
    }
    Ok(())
}

pub(crate) fn classify(args: &ClassifyArgs) -> anyhow::Result<Classification> {
    let schema = read_schema(&args.schema)?;
    let roots: Vec<String> = if args.roots.is_empty() {
        let mut roots = Vec::new();
        for name in schema.type_names() {
            if !schema.require(&name)?.embedded {
                roots.push(name);
            }
        }
        roots
    } else {
        args.roots.clone()
    };
    Ok(classify_embeddings(schema.as_ref(), roots.iter().map(String::as_str))?)
}

fn cmd_classify(args: ClassifyArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let classification = classify(&args)?;
    match format {
        OutputFormat::Json => {
            let entries: Vec<_> = classification
                .iter()
                .map(|(name, promoted)| json!({"type": name, "promoted": promoted}))
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        OutputFormat::Text => {
            if classification.is_empty() {
                println!("No embedded types reached.");
            }
            for (name, promoted) in classification.iter() {
                let status = if promoted {
                    "promoted".green()
                } else {
                    "plain".dimmed()
                };
                println!("  {:<24} {}", name.bold(), status);
            }
        }
    }
    Ok(())
}

fn describe_target(target: &ReferenceTarget) -> String {
    match target {
        ReferenceTarget::Single(type_name) => type_name.clone(),
        ReferenceTarget::Polymorphic {
            discriminator_field,
            aliases,
        } if aliases.is_empty() => format!("any document (by {discriminator_field})"),
        ReferenceTarget::Polymorphic {
            discriminator_field,
            aliases,
        } => {
            let choices: Vec<String> = aliases
                .iter()
                .map(|(alias, type_name)| format!("{alias}={type_name}"))
                .collect();
            format!("{} (by {discriminator_field})", choices.join(", "))
        }
    }
}

fn print_type(metadata: &TypeMetadata) {
    let kind = if metadata.embedded { "embedded" } else { "document" };
    match &metadata.inheritance {
        Some(parent) => println!("{} ({}, extends {})", metadata.name.bold(), kind, parent.yellow()),
        None => println!("{} ({})", metadata.name.bold(), kind),
    }
    for decl in &metadata.references_one {
        println!("  {} -> {}", decl.name, describe_target(&decl.target).cyan());
    }
    for decl in &metadata.references_many {
        println!("  {} -> [{}]", decl.name, describe_target(&decl.target).cyan());
    }
    for decl in &metadata.embeddeds_one {
        println!("  {} embeds {}", decl.name, decl.target.magenta());
    }
    for decl in &metadata.embeddeds_many {
        println!("  {} embeds [{}]", decl.name, decl.target.magenta());
    }
}

fn cmd_schema(args: SchemaArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let schema = read_schema(&args.schema)?;
    let mut types = Vec::new();
    for name in schema.type_names() {
        types.push(schema.require(&name)?);
    }

    match format {
        OutputFormat::Json => {
            let plain: Vec<&TypeMetadata> = types.iter().map(Arc::as_ref).collect();
            println!("{}", serde_json::to_string_pretty(&plain)?);
        }
        OutputFormat::Text => {
            for metadata in &types {
                print_type(metadata);
            }
        }
    }
    Ok(())
}
