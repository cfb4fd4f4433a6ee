//! Process, port, and signal helpers shared by the supervisor and prober.

use std::io;
use std::net::{SocketAddr, TcpStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

const PORT_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Returns `true` when a process with `pid` appears alive.
pub fn pid_is_alive(pid: u32) -> bool {
	if pid == 0 {
		return false;
	}

	if PathBuf::from("/proc").join(pid.to_string()).exists() {
		return true;
	}

	#[cfg(unix)]
	{
		// Signal 0 performs the permission/existence check without delivery.
		unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
	}

	#[cfg(not(unix))]
	{
		pid == std::process::id()
	}
}

/// Returns `true` when something is listening on `port` at localhost.
pub fn port_reachable(port: u16) -> bool {
	let address = SocketAddr::from(([127, 0, 0, 1], port));
	TcpStream::connect_timeout(&address, PORT_PROBE_TIMEOUT).is_ok()
}

/// Asks `pid` to terminate. No-op on platforms without signals.
pub fn signal_terminate(pid: u32) {
	#[cfg(unix)]
	unsafe {
		libc::kill(pid as libc::pid_t, libc::SIGTERM);
	}
	#[cfg(not(unix))]
	let _ = pid;
}

/// Forcibly kills `pid`. No-op on platforms without signals.
pub fn signal_kill(pid: u32) {
	#[cfg(unix)]
	unsafe {
		libc::kill(pid as libc::pid_t, libc::SIGKILL);
	}
	#[cfg(not(unix))]
	let _ = pid;
}

/// Reads a pid file written by [`write_pid_file`].
pub fn read_pid_file(path: &Path) -> Option<u32> {
	std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Writes `pid` to `path`, creating parent directories as needed.
pub fn write_pid_file(path: &Path, pid: u32) -> io::Result<()> {
	if let Some(parent) = path.parent() {
		std::fs::create_dir_all(parent)?;
	}
	std::fs::write(path, pid.to_string())
}

/// Resolves when the process receives a termination request.
pub async fn termination_signal() {
	#[cfg(unix)]
	{
		use tokio::signal::unix::{SignalKind, signal};

		let term = signal(SignalKind::terminate());
		let int = signal(SignalKind::interrupt());
		match (term, int) {
			(Ok(mut term), Ok(mut int)) => {
				tokio::select! {
					_ = term.recv() => {}
					_ = int.recv() => {}
				}
			}
			_ => {
				let _ = tokio::signal::ctrl_c().await;
			}
		}
	}

	#[cfg(not(unix))]
	{
		let _ = tokio::signal::ctrl_c().await;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn current_process_is_alive() {
		assert!(pid_is_alive(std::process::id()));
	}

	#[test]
	fn pid_zero_is_never_alive() {
		assert!(!pid_is_alive(0));
	}

	#[test]
	fn bound_port_is_reachable_and_free_port_is_not() {
		let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
		let port = listener.local_addr().unwrap().port();
		assert!(port_reachable(port));
		drop(listener);
		assert!(!port_reachable(port));
	}

	#[test]
	fn pid_files_round_trip() {
		let dir = tempfile::TempDir::new().unwrap();
		let path = dir.path().join("run/display.pid");
		write_pid_file(&path, 4242).unwrap();
		assert_eq!(read_pid_file(&path), Some(4242));
		assert_eq!(read_pid_file(&dir.path().join("missing.pid")), None);
	}
}
