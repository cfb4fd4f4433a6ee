//! Process supervision runtime for browsergate.
//!
//! Owns the typed state machine around the gateway's two sibling
//! subprocesses (virtual display and serving process) plus the liveness
//! helpers the health prober builds on.

/// Process, port, and signal helpers.
pub mod process;
/// Managed-process state machine and the fail-together supervisor.
pub mod supervisor;

pub use supervisor::{ManagedProcess, ProcessSpec, ProcessState, Supervisor, SupervisorError};
