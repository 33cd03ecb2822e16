//! Health probes for a running container.
//!
//! This is the secondary entry path: an external supervisor invokes
//! `vessel healthcheck` repeatedly for the container's whole lifetime. What
//! gets probed is decided by the mode record the dispatcher wrote at
//! startup. A container without a readable, fresh record probes as
//! indeterminate; it must never read as healthy by default.

use std::time::Duration;

use chrono::Utc;
use gethostname::gethostname;
use tracing::info;
use tracing::warn;
use vessel_core::commands;
use vessel_core::layout::Layout;
use vessel_core::mode_file;
use vessel_core::role::Role;

/// Readiness endpoint served by the web server role.
pub const SERVER_READY_URL: &str = "http://localhost:8000/-/health/ready/";
/// Metrics endpoint served by the flower role.
pub const FLOWER_METRICS_URL: &str = "http://localhost:5555/metrics";

/// Bound on each probe: HTTP request timeout and the worker ping's own
/// timeout argument.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Identifying User-Agent, so probe traffic is attributable in server logs.
pub fn user_agent() -> String {
    format!("vessel-lifecycle/{} (healthcheck)", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Healthy,
    Unhealthy,
    /// No conclusion: the mode record is absent, unreadable, stale, or
    /// names a role that has no probe.
    Indeterminate,
}

impl ProbeOutcome {
    /// Supervisor-facing exit code. Indeterminate is non-zero like
    /// Unhealthy: health that cannot be established is not reported.
    pub fn exit_code(self) -> i32 {
        match self {
            ProbeOutcome::Healthy => 0,
            ProbeOutcome::Unhealthy | ProbeOutcome::Indeterminate => 1,
        }
    }
}

/// Probe targets. Production values point at the fixed local ports; tests
/// substitute their own.
#[derive(Debug, Clone)]
pub struct HealthProber {
    pub server_url: String,
    pub flower_url: String,
    /// Override for the worker ping argv; `None` builds the celery inspect
    /// ping addressed to this node.
    pub worker_ping: Option<Vec<String>>,
}

impl Default for HealthProber {
    fn default() -> Self {
        Self {
            server_url: SERVER_READY_URL.to_string(),
            flower_url: FLOWER_METRICS_URL.to_string(),
            worker_ping: None,
        }
    }
}

impl HealthProber {
    /// Probe whatever role the mode record says this container runs.
    pub async fn probe(&self, layout: &Layout) -> ProbeOutcome {
        let record = match mode_file::read(&layout.mode_file) {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!("no readable mode record; cannot determine what to probe");
                return ProbeOutcome::Indeterminate;
            }
            Err(err) => {
                warn!("failed to read mode record: {err}");
                return ProbeOutcome::Indeterminate;
            }
        };

        let age = record.age(Utc::now());
        if let Some(max_age) = layout.mode_max_age
            && age > max_age
        {
            warn!(
                mode = record.mode.as_str(),
                age_secs = age.as_secs(),
                "mode record is stale"
            );
            return ProbeOutcome::Indeterminate;
        }

        let outcome = match record.mode {
            Role::Server => probe_endpoint(&self.server_url).await,
            Role::Worker => {
                let argv = match &self.worker_ping {
                    Some(argv) => argv.clone(),
                    None => commands::worker_ping(&gethostname().to_string_lossy()),
                };
                probe_worker(&argv).await
            }
            Role::Flower => probe_endpoint(&self.flower_url).await,
            other => {
                warn!(mode = other.as_str(), "recorded mode has no probe");
                ProbeOutcome::Indeterminate
            }
        };
        info!(mode = record.mode.as_str(), outcome = ?outcome, "probe finished");
        outcome
    }
}

/// Probe with the production targets.
pub async fn run_probe(layout: &Layout) -> ProbeOutcome {
    HealthProber::default().probe(layout).await
}

/// GET `url`; any 2xx within the timeout is healthy.
pub async fn probe_endpoint(url: &str) -> ProbeOutcome {
    let client = match reqwest::Client::builder()
        .user_agent(user_agent())
        .timeout(PROBE_TIMEOUT)
        .build()
    {
        Ok(client) => client,
        Err(err) => {
            warn!("failed to build probe client: {err}");
            return ProbeOutcome::Unhealthy;
        }
    };
    match client.get(url).send().await {
        Ok(response) if response.status().is_success() => ProbeOutcome::Healthy,
        Ok(response) => {
            warn!(status = %response.status(), url, "endpoint not ready");
            ProbeOutcome::Unhealthy
        }
        Err(err) => {
            warn!(url, "probe request failed: {err}");
            ProbeOutcome::Unhealthy
        }
    }
}

/// Run the bounded worker ping; healthy only when it reports success. The
/// outer timeout guards against a ping that ignores its own bound.
pub async fn probe_worker(argv: &[String]) -> ProbeOutcome {
    let Some((program, args)) = argv.split_first() else {
        return ProbeOutcome::Unhealthy;
    };
    let mut command = tokio::process::Command::new(program);
    command
        .args(args)
        .stdout(std::process::Stdio::null())
        .kill_on_drop(true);
    match tokio::time::timeout(PROBE_TIMEOUT * 2, command.status()).await {
        Ok(Ok(status)) if status.success() => ProbeOutcome::Healthy,
        Ok(Ok(status)) => {
            warn!(code = status.code(), "worker ping failed");
            ProbeOutcome::Unhealthy
        }
        Ok(Err(err)) => {
            warn!("failed to run worker ping: {err}");
            ProbeOutcome::Unhealthy
        }
        Err(_) => {
            warn!("worker ping timed out");
            ProbeOutcome::Unhealthy
        }
    }
}
