use std::path::PathBuf;

use clap::{Parser, Subcommand};
use modkit_primitives::{ResourceKey, ResourceType};

use crate::config::DEFAULT_CONFIG_FILE;

#[derive(Parser, Debug)]
#[command(name = "modkit")]
#[command(about = "Discover resource modules and dispatch resources through them")]
#[command(version)]
/// Command-line arguments.
pub struct Cli {
	/// Host configuration file
	#[arg(long, short = 'c', value_name = "PATH", default_value = DEFAULT_CONFIG_FILE, global = true)]
	pub config: PathBuf,

	/// Extra module directory (repeatable, added after the configured ones)
	#[arg(long = "module-path", short = 'm', value_name = "DIR", global = true)]
	pub module_paths: Vec<PathBuf>,

	/// Resource API version to request (overrides the config)
	#[arg(long, value_name = "N", global = true)]
	pub api_version: Option<u32>,

	/// Debug logging unless MODKIT_LOG is set
	#[arg(long, short = 'v', global = true)]
	pub verbose: bool,

	#[command(subcommand)]
	pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
	/// Load every module and print its lifecycle state
	Discover {
		/// Print module snapshots as JSON
		#[arg(long)]
		json: bool,
	},
	/// List resource types with their winning module
	Types,
	/// Resolve one key from the data directory
	Resolve {
		/// Key as TYPE-GROUP-INSTANCE in hex
		key: ResourceKey,
		/// Bypass modules and use the default wrapper
		#[arg(long)]
		fallback: bool,
		#[arg(long, value_name = "DIR")]
		data_dir: Option<PathBuf>,
	},
	/// Build an empty resource of a type
	Create {
		/// Type id in hex
		resource_type: ResourceType,
	},
	/// Resolve every key in the data directory and print timing statistics
	Stats {
		#[arg(long, value_name = "DIR")]
		data_dir: Option<PathBuf>,
	},
}
