//! The `vessel` binary: single entry point of the application container.
//!
//! Invoked once per container lifetime as `vessel <token> [args...]`. The
//! token selects a role; dispatch prepares the environment for it and this
//! crate then replaces the process image or exits. `vessel healthcheck` is
//! the one repeatable invocation, driven by the supervisor for the
//! container's whole lifetime.

mod exec;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;
use vessel_core::dispatch::Dispatcher;
use vessel_core::launch::DispatchOutcome;
use vessel_core::layout::Layout;
use vessel_core::privilege::PrivilegeContext;
use vessel_core::role::RoleRequest;
use vessel_core::system::Host;
use vessel_core::system::HostRunner;

#[derive(Debug, Parser)]
#[command(
    name = "vessel",
    about = "Container entrypoint: dispatches on a role token and replaces itself with that role's process"
)]
pub struct Cli {
    /// Role token followed by passthrough arguments. Unknown tokens are
    /// forwarded verbatim to the management entry point.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

pub async fn run_main(cli: Cli) -> i32 {
    init_logging();
    let layout = Layout::from_env();
    let request = RoleRequest::from_args(&cli.args);
    let privilege = PrivilegeContext::probe(&layout);
    let dispatcher = Dispatcher {
        layout: &layout,
        privilege,
        runner: &HostRunner,
        host: &Host,
    };
    match dispatcher.dispatch(&request) {
        Ok(DispatchOutcome::Exec(spec)) => exec::exec_launch_spec(spec),
        Ok(DispatchOutcome::Exit(code)) => code,
        Ok(DispatchOutcome::Probe) => vessel_healthcheck::run_probe(&layout).await.exit_code(),
        Err(err) => {
            let code = err.exit_code();
            match std::error::Error::source(&err) {
                Some(source) => error!(code, "bootstrap failed: {err}: {source}"),
                None => error!(code, "bootstrap failed: {err}"),
            }
            code
        }
    }
}

fn init_logging() {
    let default_level = "info";
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(default_level))
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use pretty_assertions::assert_eq;
    use vessel_core::role::Role;
    use vessel_core::role::RoleRequest;

    use super::*;

    fn parse(argv: &[&str]) -> Cli {
        let mut full = vec!["vessel"];
        full.extend_from_slice(argv);
        Cli::parse_from(full)
    }

    #[test]
    fn role_token_parses() {
        let cli = parse(&["server"]);
        assert_eq!(
            RoleRequest::from_args(&cli.args),
            RoleRequest::Role(Role::Server)
        );
    }

    #[test]
    fn hyphenated_passthrough_args_survive_parsing() {
        let cli = parse(&["makemigrations", "--dry-run", "-v", "2"]);
        assert_eq!(
            RoleRequest::from_args(&cli.args),
            RoleRequest::Fallback(vec![
                "makemigrations".to_string(),
                "--dry-run".to_string(),
                "-v".to_string(),
                "2".to_string(),
            ])
        );
    }

    #[test]
    fn bare_invocation_is_the_empty_fallback() {
        let cli = parse(&[]);
        assert_eq!(
            RoleRequest::from_args(&cli.args),
            RoleRequest::Fallback(Vec::new())
        );
    }
}
