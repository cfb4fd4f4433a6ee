//! Out-of-process health prober.
//!
//! Four independent sub-checks, ANDed: display process alive, serving
//! process alive (or its port reachable), status endpoint responsive within
//! the probe timeout, and the payload reporting itself healthy. Any single
//! failure marks the whole unit unhealthy.

use std::path::Path;
use std::time::Duration;

use bg_runtime::process::{pid_is_alive, port_reachable, read_pid_file};
use serde::Serialize;
use serde_json::Value;

pub const DISPLAY_PID_FILE: &str = "display.pid";
pub const GATEWAY_PID_FILE: &str = "gateway.pid";

const STATUS_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of one probe run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthVerdict {
	pub healthy: bool,
	pub display_alive: bool,
	pub server_alive: bool,
	pub endpoint_responsive: bool,
	pub reports_healthy: bool,
}

/// Runs all four sub-checks against a gateway on `port`.
pub async fn run_health_check(port: u16, run_dir: &Path) -> HealthVerdict {
	let display_alive = read_pid_file(&run_dir.join(DISPLAY_PID_FILE)).is_some_and(pid_is_alive);
	let server_alive = read_pid_file(&run_dir.join(GATEWAY_PID_FILE)).is_some_and(pid_is_alive) || port_reachable(port);

	let payload = fetch_status(port).await;
	let endpoint_responsive = payload.is_some();
	let reports_healthy = payload
		.as_ref()
		.and_then(|payload| payload.get("status"))
		.and_then(Value::as_str)
		.is_some_and(|status| status == "healthy");

	HealthVerdict {
		healthy: display_alive && server_alive && endpoint_responsive && reports_healthy,
		display_alive,
		server_alive,
		endpoint_responsive,
		reports_healthy,
	}
}

/// Fetches the dispatcher's status payload, if it answers in time.
pub async fn fetch_status(port: u16) -> Option<Value> {
	let client = reqwest::Client::builder().timeout(STATUS_TIMEOUT).build().ok()?;
	let response = client.get(format!("http://127.0.0.1:{port}/health")).send().await.ok()?;
	if !response.status().is_success() {
		return None;
	}
	response.json().await.ok()
}

#[cfg(test)]
mod tests {
	use bg_runtime::process::write_pid_file;

	use super::*;

	#[tokio::test]
	async fn all_checks_fail_without_a_gateway() {
		let run_dir = tempfile::TempDir::new().unwrap();
		// Nothing listening on a freshly bound-then-dropped port.
		let port = {
			let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
			listener.local_addr().unwrap().port()
		};

		let verdict = run_health_check(port, run_dir.path()).await;
		assert!(!verdict.healthy);
		assert!(!verdict.display_alive);
		assert!(!verdict.server_alive);
		assert!(!verdict.endpoint_responsive);
		assert!(!verdict.reports_healthy);
	}

	#[tokio::test]
	async fn one_failing_check_makes_the_unit_unhealthy() {
		let run_dir = tempfile::TempDir::new().unwrap();
		// Live display and server pids, but no status endpoint.
		write_pid_file(&run_dir.path().join(DISPLAY_PID_FILE), std::process::id()).unwrap();
		write_pid_file(&run_dir.path().join(GATEWAY_PID_FILE), std::process::id()).unwrap();
		let port = {
			let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
			listener.local_addr().unwrap().port()
		};

		let verdict = run_health_check(port, run_dir.path()).await;
		assert!(verdict.display_alive);
		assert!(verdict.server_alive);
		assert!(!verdict.endpoint_responsive);
		assert!(!verdict.healthy);
	}

	#[tokio::test]
	async fn dead_pid_files_fail_the_liveness_checks() {
		let run_dir = tempfile::TempDir::new().unwrap();
		write_pid_file(&run_dir.path().join(DISPLAY_PID_FILE), 0).unwrap();

		let verdict = run_health_check(1, run_dir.path()).await;
		assert!(!verdict.display_alive);
	}
}
