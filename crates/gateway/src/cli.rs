//! Command-line interface for the gateway binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "browsergate", about = "Remote browser-automation gateway", version)]
pub struct Cli {
	/// Increase log verbosity (-v debug, -vv trace)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
	/// Run the HTTP dispatcher in the foreground
	Serve(ServeArgs),
	/// Launch and supervise the display and serving processes
	Supervise(ServeArgs),
	/// Probe gateway health and exit 0 (healthy) or 1 (unhealthy)
	Health(HealthArgs),
}

#[derive(Debug, Clone, Default, Args)]
pub struct ServeArgs {
	/// Listening port (env: GATEWAY_PORT)
	#[arg(long)]
	pub port: Option<u16>,

	/// Artifact root directory (env: ARTIFACTS_DIR)
	#[arg(long)]
	pub artifacts_dir: Option<PathBuf>,

	/// X display for the engine (env: DISPLAY)
	#[arg(long)]
	pub display: Option<String>,

	/// Directory for pid files (env: GATEWAY_RUN_DIR)
	#[arg(long)]
	pub run_dir: Option<PathBuf>,

	/// Browser executable override (env: BROWSERGATE_BROWSER)
	#[arg(long)]
	pub browser: Option<PathBuf>,

	/// Run the engine against the display instead of headless
	#[arg(long)]
	pub headed: bool,
}

#[derive(Debug, Clone, Default, Args)]
pub struct HealthArgs {
	/// Gateway port to probe (env: GATEWAY_PORT)
	#[arg(long)]
	pub port: Option<u16>,

	/// Directory holding the supervisor's pid files (env: GATEWAY_RUN_DIR)
	#[arg(long)]
	pub run_dir: Option<PathBuf>,
}
