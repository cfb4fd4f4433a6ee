//! Sibling-process supervision for the display and serving processes.
//!
//! Each managed process walks `starting -> ready -> running -> exited`. The
//! supervisor launches the display first, then the serving process, and
//! waits on exit notifications rather than polling. An unexpected exit
//! tears down the sibling and surfaces a non-zero code so the outer
//! orchestrator restarts the whole unit; a termination signal stops the
//! processes in reverse dependency order.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::process;

const TERMINATE_GRACE: Duration = Duration::from_secs(10);

pub type Result<T> = std::result::Result<T, SupervisorError>;

#[derive(Debug, Error)]
pub enum SupervisorError {
	#[error("failed to spawn {name}: {source}")]
	Spawn { name: &'static str, source: std::io::Error },

	#[error("{name} exited during startup (status: {status})")]
	EarlyExit { name: &'static str, status: ExitStatus },

	#[error("{name} has no accessible pid")]
	NoPid { name: &'static str },

	#[error(transparent)]
	Io(#[from] std::io::Error),
}

/// Lifecycle of a supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
	Starting,
	Ready,
	Running,
	Exited,
}

/// Launch description for one supervised process.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
	pub name: &'static str,
	pub program: PathBuf,
	pub args: Vec<String>,
	pub envs: Vec<(String, String)>,
	/// Warm-up delay before the liveness check promotes `starting` to `ready`.
	pub settle: Duration,
	/// Where to record the pid for the out-of-process health prober.
	pub pid_file: Option<PathBuf>,
}

/// A spawned process that has settled but is not yet monitored.
#[derive(Debug)]
pub struct ManagedProcess {
	name: &'static str,
	pid: u32,
	started_at: Instant,
	state: ProcessState,
	child: Child,
}

struct ProcessExit {
	name: &'static str,
	status: Option<ExitStatus>,
}

impl ManagedProcess {
	/// Spawns the process, waits out the settle interval, and verifies it is
	/// still alive.
	pub async fn start(spec: &ProcessSpec) -> Result<Self> {
		let mut command = Command::new(&spec.program);
		command.args(&spec.args);
		for (key, value) in &spec.envs {
			command.env(key, value);
		}
		command
			.stdin(std::process::Stdio::null())
			.kill_on_drop(true);

		let mut child = command.spawn().map_err(|source| SupervisorError::Spawn { name: spec.name, source })?;
		let pid = child.id().ok_or(SupervisorError::NoPid { name: spec.name })?;
		if let Some(pid_file) = &spec.pid_file {
			process::write_pid_file(pid_file, pid)?;
		}
		info!(target = "bg.supervisor", process = spec.name, pid, "starting");

		let mut managed = Self {
			name: spec.name,
			pid,
			started_at: Instant::now(),
			state: ProcessState::Starting,
			child,
		};

		tokio::time::sleep(spec.settle).await;
		if let Ok(Some(status)) = managed.child.try_wait() {
			managed.state = ProcessState::Exited;
			return Err(SupervisorError::EarlyExit { name: spec.name, status });
		}
		managed.state = ProcessState::Ready;
		info!(target = "bg.supervisor", process = spec.name, pid, "ready");
		Ok(managed)
	}

	pub fn name(&self) -> &'static str {
		self.name
	}

	pub fn pid(&self) -> u32 {
		self.pid
	}

	pub fn state(&self) -> ProcessState {
		self.state
	}

	pub fn started_at(&self) -> Instant {
		self.started_at
	}

	/// Kills and reaps the process; used when a sibling fails during startup.
	pub async fn dispose(mut self) {
		let _ = self.child.start_kill();
		let _ = self.child.wait().await;
	}

	/// Moves the child into a background reaper that reports its exit.
	fn into_watcher(self, exit_tx: mpsc::Sender<ProcessExit>) -> SupervisedHandle {
		let Self { name, pid, mut child, .. } = self;
		tokio::spawn(async move {
			let status = child.wait().await;
			let _ = exit_tx.send(ProcessExit { name, status: status.ok() }).await;
		});
		SupervisedHandle {
			name,
			pid,
			state: ProcessState::Running,
		}
	}
}

/// Identity of a process under active monitoring.
#[derive(Debug, Clone)]
struct SupervisedHandle {
	name: &'static str,
	pid: u32,
	state: ProcessState,
}

enum Outcome {
	Exited(Option<(&'static str, Option<ExitStatus>)>),
	Signalled,
}

/// Runs the display and serving processes as a fail-together pair.
#[derive(Debug)]
pub struct Supervisor {
	display: SupervisedHandle,
	server: SupervisedHandle,
	exits: mpsc::Receiver<ProcessExit>,
	seen_exits: Vec<&'static str>,
}

impl Supervisor {
	/// Starts the display process, then the serving process.
	///
	/// A serving-process startup failure tears the display back down; no
	/// half-started pair is ever returned.
	pub async fn start(display_spec: &ProcessSpec, server_spec: &ProcessSpec) -> Result<Self> {
		let display = ManagedProcess::start(display_spec).await?;
		let server = match ManagedProcess::start(server_spec).await {
			Ok(server) => server,
			Err(err) => {
				warn!(target = "bg.supervisor", error = %err, "serving process failed to start; stopping display");
				display.dispose().await;
				return Err(err);
			}
		};

		let (exit_tx, exits) = mpsc::channel(2);
		Ok(Self {
			display: display.into_watcher(exit_tx.clone()),
			server: server.into_watcher(exit_tx),
			exits,
			seen_exits: Vec::new(),
		})
	}

	pub fn display_pid(&self) -> u32 {
		self.display.pid
	}

	pub fn server_pid(&self) -> u32 {
		self.server.pid
	}

	/// Monitors both processes until one exits or a signal arrives.
	///
	/// Returns the supervisor's exit code: non-zero for an unexpected child
	/// exit, zero for a signalled shutdown.
	pub async fn run(mut self) -> i32 {
		let outcome = tokio::select! {
			exit = self.exits.recv() => Outcome::Exited(exit.map(|exit| (exit.name, exit.status))),
			_ = process::termination_signal() => Outcome::Signalled,
		};

		match outcome {
			Outcome::Exited(None) => 1,
			Outcome::Exited(Some((name, status))) => {
				error!(target = "bg.supervisor", process = name, status = ?status, "supervised process exited unexpectedly");
				self.mark_exited(name);
				let survivor = if name == self.display.name { self.server.clone() } else { self.display.clone() };
				self.stop(&survivor).await;
				1
			}
			Outcome::Signalled => {
				info!(target = "bg.supervisor", "termination signal received; stopping serving process, then display");
				let server = self.server.clone();
				let display = self.display.clone();
				self.stop(&server).await;
				self.stop(&display).await;
				0
			}
		}
	}

	async fn stop(&mut self, handle: &SupervisedHandle) {
		if handle.state == ProcessState::Exited {
			return;
		}
		info!(target = "bg.supervisor", process = handle.name, pid = handle.pid, "stopping");
		process::signal_terminate(handle.pid);
		if self.await_exit(handle.name, TERMINATE_GRACE).await {
			return;
		}
		warn!(target = "bg.supervisor", process = handle.name, pid = handle.pid, "did not exit after SIGTERM; killing");
		process::signal_kill(handle.pid);
		self.await_exit(handle.name, TERMINATE_GRACE).await;
	}

	fn mark_exited(&mut self, name: &'static str) {
		if self.display.name == name {
			self.display.state = ProcessState::Exited;
		} else if self.server.name == name {
			self.server.state = ProcessState::Exited;
		}
	}

	/// Waits for `name` to exit, consuming (and remembering) other exits
	/// that arrive in the meantime.
	async fn await_exit(&mut self, name: &'static str, limit: Duration) -> bool {
		if let Some(position) = self.seen_exits.iter().position(|seen| *seen == name) {
			self.seen_exits.remove(position);
			return true;
		}

		let deadline = Instant::now() + limit;
		loop {
			let remaining = deadline.saturating_duration_since(Instant::now());
			if remaining.is_zero() {
				return false;
			}
			match tokio::time::timeout(remaining, self.exits.recv()).await {
				Ok(Some(exit)) if exit.name == name => {
					self.mark_exited(name);
					return true;
				}
				Ok(Some(exit)) => {
					self.mark_exited(exit.name);
					self.seen_exits.push(exit.name);
				}
				Ok(None) | Err(_) => return false,
			}
		}
	}
}

#[cfg(all(test, unix))]
mod tests {
	use super::*;
	use crate::process::pid_is_alive;

	fn sleep_spec(name: &'static str, pid_file: Option<PathBuf>) -> ProcessSpec {
		ProcessSpec {
			name,
			program: PathBuf::from("/bin/sh"),
			args: vec!["-c".to_string(), "sleep 30".to_string()],
			envs: Vec::new(),
			settle: Duration::from_millis(50),
			pid_file,
		}
	}

	#[tokio::test]
	async fn started_process_reaches_ready() {
		let managed = ManagedProcess::start(&sleep_spec("display", None)).await.unwrap();
		assert_eq!(managed.state(), ProcessState::Ready);
		assert!(pid_is_alive(managed.pid()));
		managed.dispose().await;
	}

	#[tokio::test]
	async fn early_exit_fails_startup() {
		let spec = ProcessSpec {
			name: "display",
			program: PathBuf::from("/bin/sh"),
			args: vec!["-c".to_string(), "exit 3".to_string()],
			envs: Vec::new(),
			settle: Duration::from_millis(100),
			pid_file: None,
		};
		let err = ManagedProcess::start(&spec).await.unwrap_err();
		assert!(matches!(err, SupervisorError::EarlyExit { name: "display", .. }));
	}

	#[tokio::test]
	async fn pid_file_is_written_for_the_prober() {
		let dir = tempfile::TempDir::new().unwrap();
		let pid_file = dir.path().join("display.pid");
		let managed = ManagedProcess::start(&sleep_spec("display", Some(pid_file.clone()))).await.unwrap();
		assert_eq!(crate::process::read_pid_file(&pid_file), Some(managed.pid()));
		managed.dispose().await;
	}

	#[tokio::test]
	async fn killing_one_process_tears_down_the_sibling() {
		let supervisor = Supervisor::start(&sleep_spec("display", None), &sleep_spec("gateway", None)).await.unwrap();
		let server_pid = supervisor.server_pid();

		process::signal_kill(supervisor.display_pid());
		let code = supervisor.run().await;

		assert_eq!(code, 1);
		assert!(!pid_is_alive(server_pid));
	}

	#[tokio::test]
	async fn failed_server_start_stops_the_display() {
		let display_spec = sleep_spec("display", None);
		let server_spec = ProcessSpec {
			name: "gateway",
			program: PathBuf::from("/bin/sh"),
			args: vec!["-c".to_string(), "exit 1".to_string()],
			envs: Vec::new(),
			settle: Duration::from_millis(100),
			pid_file: None,
		};

		let err = Supervisor::start(&display_spec, &server_spec).await.unwrap_err();
		assert!(matches!(err, SupervisorError::EarlyExit { name: "gateway", .. }));
	}
}
