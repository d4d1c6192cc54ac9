use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "docmap",
    about = "docmap: load fixture record graphs into a document store",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Load a raw record set, resolving references between records
    Load(LoadArgs),
    /// Show which embedded types are built as records of their own
    Classify(ClassifyArgs),
    /// Show the types declared by a schema file
    Schema(SchemaArgs),
}

#[derive(Args)]
pub struct LoadArgs {
    /// Raw record set (JSON)
    pub fixtures: PathBuf,
    /// Schema file (TOML, or JSON with a .json extension)
    #[arg(short, long)]
    pub schema: PathBuf,
    /// Store snapshot to start from and write back to
    #[arg(long)]
    pub store: Option<PathBuf>,
    /// Settings file with [loader] and [store] tables
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Drop every stored document before loading
    #[arg(long)]
    pub purge: bool,
    /// Build and queue, but do not flush
    #[arg(long)]
    pub no_flush: bool,
}

#[derive(Args)]
pub struct ClassifyArgs {
    #[arg(short, long)]
    pub schema: PathBuf,
    /// Types to start from; every document type when empty
    pub roots: Vec<String>,
}

#[derive(Args)]
pub struct SchemaArgs {
    #[arg(short, long)]
    pub schema: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_load() {
        let cli = Cli::try_parse_from(["docmap", "load", "fixtures.json", "-s", "schema.toml"]).unwrap();
        if let Command::Load(args) = cli.command {
            assert_eq!(args.fixtures, PathBuf::from("fixtures.json"));
            assert_eq!(args.schema, PathBuf::from("schema.toml"));
            assert!(!args.purge);
            assert!(!args.no_flush);
            assert!(args.store.is_none());
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_load_with_flags() {
        let cli = Cli::try_parse_from([
            "docmap", "load", "f.json", "--schema", "s.toml",
            "--purge", "--no-flush", "--store", "db.json", "--config", "docmap.toml",
        ]).unwrap();
        if let Command::Load(args) = cli.command {
            assert!(args.purge);
            assert!(args.no_flush);
            assert_eq!(args.store, Some(PathBuf::from("db.json")));
            assert_eq!(args.config, Some(PathBuf::from("docmap.toml")));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn load_requires_a_schema() {
        assert!(Cli::try_parse_from(["docmap", "load", "f.json"]).is_err());
    }

    #[test]
    fn parse_classify_roots() {
        let cli = Cli::try_parse_from(["docmap", "classify", "-s", "s.toml", "Article", "Page"]).unwrap();
        if let Command::Classify(args) = cli.command {
            assert_eq!(args.roots, vec!["Article", "Page"]);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_schema() {
        let cli = Cli::try_parse_from(["docmap", "schema", "--schema", "s.toml"]).unwrap();
        assert!(matches!(cli.command, Command::Schema(_)));
    }

    #[test]
    fn parse_verbose() {
        let cli = Cli::try_parse_from(["docmap", "--verbose", "schema", "-s", "s.toml"]).unwrap();
        assert!(cli.verbose);
    }

    #[test]
    fn parse_json_format() {
        let cli = Cli::try_parse_from(["docmap", "--format", "json", "schema", "-s", "s.toml"]).unwrap();
        assert!(matches!(cli.format, OutputFormat::Json));
    }
}
