//! Gateway configuration, read once at startup and never hot-reloaded.

use std::path::PathBuf;

use crate::cli::ServeArgs;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_ARTIFACTS_DIR: &str = "/artifacts";
const DEFAULT_DISPLAY: &str = ":99";
const DEFAULT_RUN_DIR: &str = "/tmp/browsergate";

#[derive(Debug, Clone)]
pub struct GatewayConfig {
	pub port: u16,
	pub artifacts_root: PathBuf,
	pub display: String,
	pub run_dir: PathBuf,
	pub browser: Option<PathBuf>,
	pub headless: bool,
}

impl GatewayConfig {
	/// Resolves flags over environment variables over defaults.
	pub fn resolve(args: &ServeArgs) -> Self {
		Self::from_sources(args, |name| std::env::var(name).ok().filter(|value| !value.is_empty()))
	}

	fn from_sources(args: &ServeArgs, env: impl Fn(&str) -> Option<String>) -> Self {
		Self {
			port: args.port.or_else(|| env("GATEWAY_PORT").and_then(|value| value.parse().ok())).unwrap_or(DEFAULT_PORT),
			artifacts_root: args
				.artifacts_dir
				.clone()
				.or_else(|| env("ARTIFACTS_DIR").map(PathBuf::from))
				.unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACTS_DIR)),
			display: args.display.clone().or_else(|| env("DISPLAY")).unwrap_or_else(|| DEFAULT_DISPLAY.to_string()),
			run_dir: args
				.run_dir
				.clone()
				.or_else(|| env("GATEWAY_RUN_DIR").map(PathBuf::from))
				.unwrap_or_else(|| PathBuf::from(DEFAULT_RUN_DIR)),
			browser: args.browser.clone().or_else(|| env("BROWSERGATE_BROWSER").map(PathBuf::from)),
			headless: !args.headed,
		}
	}
}
