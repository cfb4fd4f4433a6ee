//! Engine subprocess launch and debugging-endpoint discovery.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::{Child, Command};
use tracing::debug;

use crate::error::{EngineError, Result};

const PROBE_INTERVAL: Duration = Duration::from_millis(200);
const PROBE_REQUEST_TIMEOUT: Duration = Duration::from_millis(400);

const EXECUTABLE_CANDIDATES: &[&str] = &[
	"/usr/bin/chromium",
	"/usr/bin/chromium-browser",
	"/usr/bin/google-chrome",
	"/usr/bin/google-chrome-stable",
	"/opt/google/chrome/chrome",
];

/// Launch parameters for the engine subprocess.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
	/// Explicit executable path; overrides discovery.
	pub executable: Option<PathBuf>,
	pub headless: bool,
	/// X display handed to the engine when running headed.
	pub display: Option<String>,
	/// Bound on waiting for the debugging endpoint to come up.
	pub launch_timeout: Duration,
}

impl Default for LaunchConfig {
	fn default() -> Self {
		Self {
			executable: None,
			headless: true,
			display: None,
			launch_timeout: Duration::from_secs(30),
		}
	}
}

pub(crate) struct LaunchedEngine {
	pub child: Child,
	pub ws_url: String,
	pub identity: String,
	pub port: u16,
}

/// `/json/version` response subset from the engine's debugging endpoint.
#[derive(Debug, Deserialize)]
struct VersionInfo {
	#[serde(rename = "webSocketDebuggerUrl")]
	web_socket_debugger_url: String,
	#[serde(rename = "Browser")]
	browser: Option<String>,
}

/// Spawns the engine and waits for its debugging endpoint.
pub(crate) async fn launch(config: &LaunchConfig) -> Result<LaunchedEngine> {
	let executable = resolve_executable(config)?;
	let port = pick_port()?;

	let mut command = Command::new(&executable);
	command
		.arg(format!("--remote-debugging-port={port}"))
		.arg("--no-first-run")
		.arg("--no-default-browser-check")
		.arg("--disable-background-networking")
		.arg("--disable-dev-shm-usage");
	if config.headless {
		command.arg("--headless=new");
	}
	if let Some(display) = &config.display {
		command.env("DISPLAY", display);
	}
	command.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null()).kill_on_drop(true);

	let mut child = command
		.spawn()
		.map_err(|e| EngineError::Launch(format!("failed to spawn {}: {e}", executable.display())))?;

	let client = reqwest::Client::builder()
		.timeout(PROBE_REQUEST_TIMEOUT)
		.build()
		.map_err(|e| EngineError::Launch(format!("failed to create probe client: {e}")))?;

	let attempts = (config.launch_timeout.as_millis() / PROBE_INTERVAL.as_millis()).max(1);
	let mut last_error = "endpoint not reachable".to_string();
	for _ in 0..attempts {
		tokio::time::sleep(PROBE_INTERVAL).await;

		if let Ok(Some(status)) = child.try_wait() {
			return Err(EngineError::Launch(format!(
				"engine exited before the debugging endpoint became available (status: {status})"
			)));
		}

		match fetch_version(&client, port).await {
			Ok(info) => {
				debug!(target = "bg.engine", port, browser = ?info.browser, "engine endpoint ready");
				return Ok(LaunchedEngine {
					child,
					ws_url: info.web_socket_debugger_url,
					identity: info.browser.unwrap_or_else(|| "unknown".to_string()),
					port,
				});
			}
			Err(err) => last_error = err.to_string(),
		}
	}

	let _ = child.start_kill();
	Err(EngineError::Launch(format!(
		"engine debugging endpoint not available on port {port}: {last_error}"
	)))
}

async fn fetch_version(client: &reqwest::Client, port: u16) -> Result<VersionInfo> {
	let mut last_error = "no response".to_string();
	for url in [format!("http://127.0.0.1:{port}/json/version"), format!("http://localhost:{port}/json/version")] {
		let response = match client.get(&url).send().await {
			Ok(response) => response,
			Err(err) => {
				last_error = err.to_string();
				continue;
			}
		};
		if !response.status().is_success() {
			last_error = format!("unexpected status {}", response.status());
			continue;
		}
		return response
			.json::<VersionInfo>()
			.await
			.map_err(|e| EngineError::Launch(format!("failed to parse version response: {e}")));
	}
	Err(EngineError::Launch(format!("failed to reach debugging endpoint on port {port}: {last_error}")))
}

fn resolve_executable(config: &LaunchConfig) -> Result<PathBuf> {
	if let Some(executable) = &config.executable {
		return Ok(executable.clone());
	}
	if let Some(executable) = std::env::var_os("BROWSERGATE_BROWSER") {
		return Ok(PathBuf::from(executable));
	}
	EXECUTABLE_CANDIDATES
		.iter()
		.map(PathBuf::from)
		.find(|candidate| candidate.exists())
		.ok_or_else(|| EngineError::Launch("could not find a browser executable; set BROWSERGATE_BROWSER".to_string()))
}

fn pick_port() -> Result<u16> {
	let listener = std::net::TcpListener::bind(("127.0.0.1", 0))?;
	Ok(listener.local_addr()?.port())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn explicit_executable_wins() {
		let config = LaunchConfig {
			executable: Some(PathBuf::from("/opt/custom/browser")),
			..Default::default()
		};
		assert_eq!(resolve_executable(&config).unwrap(), PathBuf::from("/opt/custom/browser"));
	}

	#[test]
	fn picked_ports_are_nonzero_and_bindable() {
		let port = pick_port().unwrap();
		assert_ne!(port, 0);
		assert!(std::net::TcpListener::bind(("127.0.0.1", port)).is_ok());
	}

	#[test]
	fn version_response_parses() {
		let info: VersionInfo = serde_json::from_str(
			r#"{"Browser": "HeadlessChrome/124.0.6367.78", "webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/browser/abc"}"#,
		)
		.unwrap();
		assert_eq!(info.browser.as_deref(), Some("HeadlessChrome/124.0.6367.78"));
		assert!(info.web_socket_debugger_url.starts_with("ws://"));
	}
}
