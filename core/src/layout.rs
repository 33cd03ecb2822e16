use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

/// Account the long-running services drop to when the container starts as
/// root.
pub const SERVICE_USER: &str = "vessel";
pub const SERVICE_GROUP: &str = "vessel";
pub const SERVICE_HOME: &str = "/vessel";

pub const MODE_FILE_ENV: &str = "VESSEL_MODE_FILE";
pub const CONTROL_SOCKET_ENV: &str = "VESSEL_CONTROL_SOCKET";
pub const MEDIA_DIR_ENV: &str = "VESSEL_MEDIA_DIR";
pub const CERTS_DIR_ENV: &str = "VESSEL_CERTS_DIR";
pub const TEST_REPORT_ENV: &str = "VESSEL_TEST_REPORT";
pub const MODE_MAX_AGE_ENV: &str = "VESSEL_MODE_MAX_AGE";

/// Well-known paths the bootstrap touches. Production values are fixed by
/// the container image; each can be overridden through the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Mode handoff record consumed by later health probes.
    pub mode_file: PathBuf,
    /// Container runtime control socket. Presence and group ownership drive
    /// the supplementary-group derivation.
    pub control_socket: PathBuf,
    pub media_dir: PathBuf,
    pub certs_dir: PathBuf,
    /// Results file produced by the test role.
    pub test_report: PathBuf,
    /// When set, probes treat a mode record older than this as unusable.
    pub mode_max_age: Option<Duration>,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            mode_file: PathBuf::from("/tmp/vessel-mode"),
            control_socket: PathBuf::from("/var/run/docker.sock"),
            media_dir: PathBuf::from("/media"),
            certs_dir: PathBuf::from("/certs"),
            test_report: PathBuf::from("/unittest.xml"),
            mode_max_age: None,
        }
    }
}

impl Layout {
    /// Production layout with any `VESSEL_*` environment overrides applied.
    pub fn from_env() -> Self {
        let mut layout = Layout::default();
        if let Ok(path) = env::var(MODE_FILE_ENV) {
            layout.mode_file = PathBuf::from(path);
        }
        if let Ok(path) = env::var(CONTROL_SOCKET_ENV) {
            layout.control_socket = PathBuf::from(path);
        }
        if let Ok(path) = env::var(MEDIA_DIR_ENV) {
            layout.media_dir = PathBuf::from(path);
        }
        if let Ok(path) = env::var(CERTS_DIR_ENV) {
            layout.certs_dir = PathBuf::from(path);
        }
        if let Ok(path) = env::var(TEST_REPORT_ENV) {
            layout.test_report = PathBuf::from(path);
        }
        if let Ok(value) = env::var(MODE_MAX_AGE_ENV) {
            layout.mode_max_age = parse_max_age(&value);
        }
        layout
    }
}

/// Whole seconds; a value that does not parse is dropped with a warning.
fn parse_max_age(value: &str) -> Option<Duration> {
    match value.parse::<u64>() {
        Ok(secs) => Some(Duration::from_secs(secs)),
        Err(_) => {
            warn!("ignoring unparseable {MODE_MAX_AGE_ENV}: {value:?}");
            None
        }
    }
}
