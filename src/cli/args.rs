//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Basin - watershed context builder
///
/// Fetches, derives and catalogs the geospatial layers describing one
/// watershed, reusing everything a previous run already produced.
#[derive(Parser, Debug)]
#[command(name = "basin")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "BASIN_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the context project for one watershed
    Build(BuildArgs),

    /// List the datasets a project can contain
    Datasets(DatasetsArgs),

    /// Manage the shared download cache
    Cache(CacheArgs),

    /// Show or create configuration
    Config(ConfigArgs),
}

/// Arguments for the build command
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Watershed code (4, 8, 10 or 12 digits)
    pub region: String,

    /// Project output directory
    #[arg(short, long)]
    pub output: PathBuf,

    /// Download cache directory (defaults to the configured cache)
    #[arg(long)]
    pub download: Option<PathBuf>,

    /// Scratch directory for intermediate layers (defaults to <tmp>/basin)
    #[arg(long)]
    pub scratch: Option<PathBuf>,

    /// Re-download and rebuild everything
    #[arg(short, long)]
    pub force: bool,

    /// Use a per-run scratch directory so several builds can share a cache
    #[arg(long)]
    pub parallel: bool,

    /// Extra project metadata (key=value,key=value)
    #[arg(long)]
    pub meta: Option<String>,

    /// Directory holding the LANDFIRE vegetation rasters
    #[arg(long)]
    pub landfire: Option<PathBuf>,

    /// National land ownership polygons
    #[arg(long)]
    pub ownership: Option<PathBuf>,

    /// Fair market land value raster
    #[arg(long)]
    pub fair_market: Option<PathBuf>,

    /// National ecoregion polygons
    #[arg(long)]
    pub ecoregions: Option<PathBuf>,

    /// National state boundaries
    #[arg(long)]
    pub states: Option<PathBuf>,

    /// National county boundaries
    #[arg(long)]
    pub counties: Option<PathBuf>,

    /// National geology polygons
    #[arg(long)]
    pub geology: Option<PathBuf>,

    /// Directory holding the PRISM climate rasters (*.bil)
    #[arg(long)]
    pub climate: Option<PathBuf>,
}

/// Arguments for the datasets command
#[derive(Parser, Debug)]
pub struct DatasetsArgs {
    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for listings
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List cached downloads
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Remove old and interrupted downloads
    Gc {
        /// Remove entries older than N days (default: from config)
        #[arg(long)]
        days: Option<u32>,

        /// Dry run - show what would be removed
        #[arg(long)]
        dry_run: bool,
    },

    /// Remove every cached download and derived tile
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_build() {
        let cli = Cli::parse_from([
            "basin",
            "build",
            "1701020301",
            "--output",
            "/tmp/out",
            "--landfire",
            "/data/landfire",
            "--meta",
            "Operator=ci",
            "--parallel",
        ]);
        match cli.command {
            Commands::Build(args) => {
                assert_eq!(args.region, "1701020301");
                assert_eq!(args.output, PathBuf::from("/tmp/out"));
                assert_eq!(args.landfire, Some(PathBuf::from("/data/landfire")));
                assert_eq!(args.meta.as_deref(), Some("Operator=ci"));
                assert!(args.parallel);
                assert!(!args.force);
                assert!(args.geology.is_none());
            }
            _ => panic!("expected Build command"),
        }
    }

    #[test]
    fn build_requires_output() {
        assert!(Cli::try_parse_from(["basin", "build", "1701"]).is_err());
    }

    #[test]
    fn cli_parses_fair_market_flag() {
        let cli = Cli::parse_from(["basin", "build", "1701", "-o", "out", "--fair-market", "fmv.tif"]);
        match cli.command {
            Commands::Build(args) => assert_eq!(args.fair_market, Some(PathBuf::from("fmv.tif"))),
            _ => panic!("expected Build command"),
        }
    }

    #[test]
    fn cli_parses_cache_gc() {
        let cli = Cli::parse_from(["basin", "cache", "gc", "--days", "7", "--dry-run"]);
        match cli.command {
            Commands::Cache(CacheArgs {
                action: CacheAction::Gc { days, dry_run },
            }) => {
                assert_eq!(days, Some(7));
                assert!(dry_run);
            }
            _ => panic!("expected cache gc"),
        }
    }

    #[test]
    fn cli_parses_datasets_format() {
        let cli = Cli::parse_from(["basin", "datasets", "--format", "json"]);
        assert!(matches!(
            cli.command,
            Commands::Datasets(DatasetsArgs {
                format: OutputFormat::Json
            })
        ));
    }

    #[test]
    fn cli_verbose_levels() {
        let cli = Cli::parse_from(["basin", "datasets"]);
        assert_eq!(cli.verbose, 0);

        let cli = Cli::parse_from(["basin", "-v", "datasets"]);
        assert_eq!(cli.verbose, 1);

        let cli = Cli::parse_from(["basin", "-vv", "datasets"]);
        assert_eq!(cli.verbose, 2);
    }
}
