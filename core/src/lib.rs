//! Core bootstrap logic for vessel, the container entrypoint.
//!
//! One process starts per container with a role token. Dispatch prepares the
//! environment for that role (backing-store readiness, recorded mode,
//! filesystem ownership, privilege level) and decides how the process ends:
//! replaced by the role's long-running command, or exiting with a code. The
//! pieces that touch the host are behind seams so every sequence is testable
//! without one.

pub mod accounts;
pub mod commands;
pub mod dispatch;
mod error;
pub mod launch;
pub mod layout;
pub mod mode_file;
pub mod privilege;
pub mod role;
pub mod system;

pub use error::BootstrapError;
pub use error::Result;
