use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Role a container was started in. The first argv token selects one; any
/// other token falls through to the management passthrough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Server,
    Worker,
    Flower,
    Bash,
    Test,
    Healthcheck,
    DumpConfig,
}

impl Role {
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "server" => Some(Role::Server),
            "worker" => Some(Role::Worker),
            "flower" => Some(Role::Flower),
            "bash" => Some(Role::Bash),
            "test" => Some(Role::Test),
            "healthcheck" => Some(Role::Healthcheck),
            "dump_config" => Some(Role::DumpConfig),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Server => "server",
            Role::Worker => "worker",
            Role::Flower => "flower",
            Role::Bash => "bash",
            Role::Test => "test",
            Role::Healthcheck => "healthcheck",
            Role::DumpConfig => "dump_config",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified argv. An unknown or absent first token is not an error: the
/// whole argv is forwarded verbatim to the management entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleRequest {
    Role(Role),
    Fallback(Vec<String>),
}

impl RoleRequest {
    pub fn from_args(args: &[String]) -> Self {
        match args.first().map(String::as_str).and_then(Role::parse) {
            Some(role) => RoleRequest::Role(role),
            None => RoleRequest::Fallback(args.to_vec()),
        }
    }

    /// Token for logging; fallback requests have no role of their own.
    pub fn describe(&self) -> &str {
        match self {
            RoleRequest::Role(role) => role.as_str(),
            RoleRequest::Fallback(_) => "fallback",
        }
    }
}
