use crate::privilege::GroupSpec;

/// Process image the dispatcher wants to become.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub command: Vec<String>,
    pub identity: LaunchIdentity,
    /// Environment overrides applied before the replace.
    pub env: Vec<(String, String)>,
}

impl LaunchSpec {
    /// Run `command` under the current identity with the environment as-is.
    pub fn current(command: Vec<String>) -> Self {
        Self {
            command,
            identity: LaunchIdentity::Current,
            env: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchIdentity {
    /// Keep the invoking identity.
    Current,
    /// Drop to `user` with `groups` before the replace.
    Switch { user: String, groups: GroupSpec },
}

/// What dispatch decided. Nothing here replaces the process or exits; the
/// caller owns both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Replace the process image with this spec.
    Exec(LaunchSpec),
    /// Exit with this code.
    Exit(i32),
    /// Run the health prober and exit with its mapped code.
    Probe,
}
