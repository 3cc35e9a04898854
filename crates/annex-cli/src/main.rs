//! Annex CLI - inspect and maintain the persistent descriptor cache.
//!
//! Reports are printed to stdout as pretty JSON; logs go to stderr.

mod commands;

use annex_core::{platform, CacheSettings, RegistryConfig, SqliteCache};
use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "annex")]
#[command(about = "Inspect the attached-method descriptor cache")]
struct Args {
    /// Cache database (defaults to the platform config directory)
    #[arg(long)]
    cache_db: Option<PathBuf>,

    /// Cache namespace holding descriptors
    #[arg(long, default_value = RegistryConfig::CACHE_NAMESPACE)]
    namespace: String,

    /// Prefix in front of the type name in each cache key
    #[arg(long, default_value = RegistryConfig::DESCRIPTOR_KEY_PREFIX)]
    key_prefix: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show cache statistics
    Stats,
    /// List cached descriptors
    List,
    /// Show one type's cached descriptor
    Show {
        /// Stable type name, e.g. `billing.Invoice`
        type_name: String,
    },
    /// Remove one type's descriptor, or every descriptor in the namespace
    Purge { type_name: Option<String> },
    /// Remove expired entries
    Cleanup,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::WARN };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let db_path = match args.cache_db {
        Some(path) => path,
        None => platform::default_cache_db_path()?,
    };
    debug!("Opening descriptor cache at {}", db_path.display());
    let cache = SqliteCache::new(&db_path)?;

    let settings = CacheSettings {
        namespace: args.namespace,
        key_prefix: args.key_prefix,
        ..CacheSettings::default()
    };

    match args.command {
        Command::Stats => print_json(&commands::stats(&cache)?),
        Command::List => print_json(&commands::list(&cache, &settings)?),
        Command::Show { type_name } => print_json(&commands::show(&cache, &settings, &type_name)?),
        Command::Purge { type_name } => {
            print_json(&commands::purge(&cache, &settings, type_name.as_deref())?)
        }
        Command::Cleanup => print_json(&commands::cleanup(&cache)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_defaults_match_registry() {
        let args = Args::parse_from(["annex", "show", "blog.Post"]);
        assert_eq!(args.namespace, "attached-methods");
        assert_eq!(args.key_prefix, "descriptor:");
        assert!(matches!(args.command, Command::Show { ref type_name } if type_name == "blog.Post"));
    }

    #[test]
    fn test_purge_without_type() {
        let args = Args::parse_from(["annex", "--cache-db", "/tmp/x.sqlite", "purge"]);
        assert_eq!(args.cache_db, Some(PathBuf::from("/tmp/x.sqlite")));
        assert!(matches!(args.command, Command::Purge { type_name: None }));
    }
}
