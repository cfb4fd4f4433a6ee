//! Supervisor wiring for the display and serving processes.
//!
//! The display comes up first, then the gateway re-executes itself with the
//! `serve` subcommand as the serving process. Restart-on-failure belongs to
//! the outer orchestrator; the supervisor only guarantees the pair fails
//! together.

use std::time::Duration;

use anyhow::{Context, anyhow};
use bg_runtime::{ProcessSpec, Supervisor};
use tracing::{info, warn};

use crate::config::GatewayConfig;
use crate::error::Result;
use crate::health::{self, DISPLAY_PID_FILE, GATEWAY_PID_FILE};

const DISPLAY_SETTLE: Duration = Duration::from_secs(2);
const SERVER_SETTLE: Duration = Duration::from_secs(3);

pub async fn run(config: GatewayConfig) -> Result<i32> {
	let display_spec = ProcessSpec {
		name: "display",
		program: "Xvfb".into(),
		args: vec![
			config.display.clone(),
			"-screen".to_string(),
			"0".to_string(),
			"1920x1080x24".to_string(),
			"-nolisten".to_string(),
			"tcp".to_string(),
		],
		envs: Vec::new(),
		settle: DISPLAY_SETTLE,
		pid_file: Some(config.run_dir.join(DISPLAY_PID_FILE)),
	};

	let exe = std::env::current_exe().map_err(|e| anyhow!("failed to resolve current executable: {e}"))?;
	let server_spec = ProcessSpec {
		name: "gateway",
		program: exe,
		args: serve_args(&config),
		envs: vec![("DISPLAY".to_string(), config.display.clone())],
		settle: SERVER_SETTLE,
		pid_file: Some(config.run_dir.join(GATEWAY_PID_FILE)),
	};

	let supervisor = Supervisor::start(&display_spec, &server_spec)
		.await
		.context("supervised startup failed")?;

	// Best-effort: the serving process may still be launching its engine.
	match health::fetch_status(config.port).await {
		Some(payload) => info!(target = "bg.supervisor", status = %payload["status"], "initial health probe"),
		None => warn!(target = "bg.supervisor", port = config.port, "initial health probe failed; serving process may still be initializing"),
	}

	Ok(supervisor.run().await)
}

fn serve_args(config: &GatewayConfig) -> Vec<String> {
	let mut args = vec![
		"serve".to_string(),
		"--port".to_string(),
		config.port.to_string(),
		"--artifacts-dir".to_string(),
		config.artifacts_root.display().to_string(),
		"--display".to_string(),
		config.display.clone(),
		"--run-dir".to_string(),
		config.run_dir.display().to_string(),
	];
	if let Some(browser) = &config.browser {
		args.push("--browser".to_string());
		args.push(browser.display().to_string());
	}
	if !config.headless {
		args.push("--headed".to_string());
	}
	args
}
