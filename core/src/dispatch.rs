//! Role dispatch: one token per container lifetime, one sequence, then an
//! outcome the caller turns into a replaced process image or an exit.

use std::fs::OpenOptions;

use tracing::info;

use crate::commands;
use crate::error::BootstrapError;
use crate::error::Result;
use crate::launch::DispatchOutcome;
use crate::launch::LaunchSpec;
use crate::layout::Layout;
use crate::layout::SERVICE_GROUP;
use crate::layout::SERVICE_USER;
use crate::mode_file;
use crate::privilege;
use crate::privilege::PrivilegeContext;
use crate::role::Role;
use crate::role::RoleRequest;
use crate::system::CommandRunner;
use crate::system::HostOps;
use crate::system::exit_code;

pub struct Dispatcher<'a> {
    pub layout: &'a Layout,
    pub privilege: PrivilegeContext,
    pub runner: &'a dyn CommandRunner,
    pub host: &'a dyn HostOps,
}

impl Dispatcher<'_> {
    /// Run the bootstrap sequence for `request` up to its outcome.
    ///
    /// Fail-fast: the first failing step aborts the sequence and its exit
    /// code becomes the container's.
    pub fn dispatch(&self, request: &RoleRequest) -> Result<DispatchOutcome> {
        info!(
            role = request.describe(),
            root = self.privilege.is_root(),
            "dispatching"
        );
        match request {
            RoleRequest::Role(Role::Server) => self.server(),
            RoleRequest::Role(Role::Worker) => self.worker(),
            RoleRequest::Role(Role::Flower) => self.flower(),
            RoleRequest::Role(Role::Bash) => {
                Ok(DispatchOutcome::Exec(LaunchSpec::current(commands::shell())))
            }
            RoleRequest::Role(Role::Test) => self.test(),
            RoleRequest::Role(Role::Healthcheck) => Ok(DispatchOutcome::Probe),
            RoleRequest::Role(Role::DumpConfig) => self.dump_config(),
            RoleRequest::Fallback(args) => Ok(DispatchOutcome::Exec(LaunchSpec::current(
                commands::management(args),
            ))),
        }
    }

    fn server(&self) -> Result<DispatchOutcome> {
        self.wait_for_store()?;
        self.record_mode(Role::Server)?;
        self.run_step("migration", commands::migrate())?;
        Ok(DispatchOutcome::Exec(LaunchSpec::current(
            commands::server(),
        )))
    }

    fn worker(&self) -> Result<DispatchOutcome> {
        self.wait_for_store()?;
        self.record_mode(Role::Worker)?;
        let spec = privilege::prepare(commands::worker(), self.privilege, self.layout, self.host)?;
        Ok(DispatchOutcome::Exec(spec))
    }

    fn flower(&self) -> Result<DispatchOutcome> {
        self.record_mode(Role::Flower)?;
        Ok(DispatchOutcome::Exec(LaunchSpec::current(
            commands::flower(),
        )))
    }

    fn test(&self) -> Result<DispatchOutcome> {
        self.run_step("test dependency install", commands::install_test_deps())?;
        self.prepare_report_file()?;
        let spec = privilege::prepare(
            commands::test_runner(),
            self.privilege,
            self.layout,
            self.host,
        )?;
        Ok(DispatchOutcome::Exec(spec))
    }

    fn dump_config(&self) -> Result<DispatchOutcome> {
        let status = self.runner.status(&commands::dump_config()).map_err(|source| {
            BootstrapError::CollaboratorSpawn {
                step: "config dump",
                source,
            }
        })?;
        Ok(DispatchOutcome::Exit(exit_code(status)))
    }

    fn wait_for_store(&self) -> Result<()> {
        info!("waiting for backing store");
        let status = self
            .runner
            .status(&commands::wait_for_store())
            .map_err(|source| BootstrapError::CollaboratorSpawn {
                step: "readiness gate",
                source,
            })?;
        if !status.success() {
            return Err(BootstrapError::StoreUnavailable {
                code: exit_code(status),
            });
        }
        info!("backing store ready");
        Ok(())
    }

    fn record_mode(&self, role: Role) -> Result<()> {
        mode_file::record(&self.layout.mode_file, role).map_err(|source| {
            BootstrapError::RecordMode {
                role,
                path: self.layout.mode_file.clone(),
                source,
            }
        })?;
        info!(mode = role.as_str(), "recorded mode");
        Ok(())
    }

    fn run_step(&self, step: &'static str, argv: Vec<String>) -> Result<()> {
        let status = self
            .runner
            .status(&argv)
            .map_err(|source| BootstrapError::CollaboratorSpawn { step, source })?;
        if !status.success() {
            return Err(BootstrapError::CollaboratorFailed {
                step,
                code: exit_code(status),
            });
        }
        Ok(())
    }

    /// The test runner drops privileges before writing its results, so the
    /// file must exist and be writable by the service account beforehand.
    fn prepare_report_file(&self) -> Result<()> {
        let path = &self.layout.test_report;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| BootstrapError::ReportFile {
                path: path.clone(),
                source,
            })?;
        if self.privilege.is_root() {
            self.host
                .chown_recursive(path, SERVICE_USER, SERVICE_GROUP)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;
    use crate::launch::LaunchIdentity;
    use crate::system::fakes::FakeRunner;
    use crate::system::fakes::RecordingHost;

    fn layout_in(dir: &TempDir) -> Layout {
        Layout {
            mode_file: dir.path().join("mode"),
            control_socket: dir.path().join("docker.sock"),
            media_dir: dir.path().join("media"),
            certs_dir: dir.path().join("certs"),
            test_report: dir.path().join("unittest.xml"),
            mode_max_age: None,
        }
    }

    fn non_root() -> PrivilegeContext {
        PrivilegeContext {
            euid: 1000,
            control_socket_gid: None,
        }
    }

    fn root() -> PrivilegeContext {
        PrivilegeContext {
            euid: 0,
            control_socket_gid: None,
        }
    }

    fn recorded_mode(layout: &Layout) -> Option<Role> {
        mode_file::read(&layout.mode_file)
            .unwrap()
            .map(|record| record.mode)
    }

    fn dispatch(
        layout: &Layout,
        privilege: PrivilegeContext,
        runner: &FakeRunner,
        host: &RecordingHost,
        request: &RoleRequest,
    ) -> Result<DispatchOutcome> {
        Dispatcher {
            layout,
            privilege,
            runner,
            host,
        }
        .dispatch(request)
    }

    #[test]
    fn server_runs_gate_then_records_then_migrates() {
        let dir = TempDir::new().unwrap();
        let layout = layout_in(&dir);
        let runner = FakeRunner::default();
        let host = RecordingHost::default();
        let outcome = dispatch(
            &layout,
            non_root(),
            &runner,
            &host,
            &RoleRequest::Role(Role::Server),
        )
        .unwrap();

        let calls = runner.joined_calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].contains("wait_for_db"));
        assert!(calls[1].contains("migrate"));
        assert_eq!(recorded_mode(&layout), Some(Role::Server));
        let DispatchOutcome::Exec(spec) = outcome else {
            panic!("expected exec outcome");
        };
        assert_eq!(spec.command[0], "gunicorn");
        assert_eq!(spec.identity, LaunchIdentity::Current);
    }

    #[test]
    fn server_gate_failure_aborts_before_recording() {
        let dir = TempDir::new().unwrap();
        let layout = layout_in(&dir);
        let runner = FakeRunner::default().fail_on("wait_for_db", 3);
        let host = RecordingHost::default();
        let err = dispatch(
            &layout,
            non_root(),
            &runner,
            &host,
            &RoleRequest::Role(Role::Server),
        )
        .unwrap_err();

        assert_eq!(err.exit_code(), 3);
        assert_eq!(recorded_mode(&layout), None);
        assert_eq!(runner.calls.borrow().len(), 1);
    }

    #[test]
    fn server_migration_failure_propagates_after_record() {
        let dir = TempDir::new().unwrap();
        let layout = layout_in(&dir);
        let runner = FakeRunner::default().fail_on("migrate", 9);
        let host = RecordingHost::default();
        let err = dispatch(
            &layout,
            non_root(),
            &runner,
            &host,
            &RoleRequest::Role(Role::Server),
        )
        .unwrap_err();

        assert_eq!(err.exit_code(), 9);
        assert_eq!(recorded_mode(&layout), Some(Role::Server));
    }

    #[test]
    fn worker_records_mode_and_prepares_privileges() {
        let dir = TempDir::new().unwrap();
        let layout = layout_in(&dir);
        let runner = FakeRunner::default();
        let host = RecordingHost::default();
        let privilege = PrivilegeContext {
            euid: 0,
            control_socket_gid: Some(999),
        };
        let outcome = dispatch(
            &layout,
            privilege,
            &runner,
            &host,
            &RoleRequest::Role(Role::Worker),
        )
        .unwrap();

        assert_eq!(recorded_mode(&layout), Some(Role::Worker));
        assert_eq!(host.chowned.borrow().len(), 2);
        let DispatchOutcome::Exec(spec) = outcome else {
            panic!("expected exec outcome");
        };
        assert_eq!(spec.command[0], "celery");
        let LaunchIdentity::Switch { user, groups } = spec.identity else {
            panic!("expected identity switch");
        };
        assert_eq!(user, "vessel");
        assert_eq!(groups.to_string(), "vessel:docker");
    }

    #[test]
    fn worker_gate_failure_leaves_no_mode_record() {
        let dir = TempDir::new().unwrap();
        let layout = layout_in(&dir);
        let runner = FakeRunner::default().fail_on("wait_for_db", 4);
        let host = RecordingHost::default();
        let err = dispatch(
            &layout,
            root(),
            &runner,
            &host,
            &RoleRequest::Role(Role::Worker),
        )
        .unwrap_err();

        assert_eq!(err.exit_code(), 4);
        assert_eq!(recorded_mode(&layout), None);
        assert_eq!(host.mutation_count(), 0);
    }

    #[test]
    fn flower_records_mode_without_running_the_gate() {
        let dir = TempDir::new().unwrap();
        let layout = layout_in(&dir);
        let runner = FakeRunner::default();
        let host = RecordingHost::default();
        let outcome = dispatch(
            &layout,
            non_root(),
            &runner,
            &host,
            &RoleRequest::Role(Role::Flower),
        )
        .unwrap();

        assert!(runner.calls.borrow().is_empty());
        assert_eq!(recorded_mode(&layout), Some(Role::Flower));
        let DispatchOutcome::Exec(spec) = outcome else {
            panic!("expected exec outcome");
        };
        assert!(spec.command.contains(&"flower".to_string()));
        assert_eq!(spec.identity, LaunchIdentity::Current);
    }

    #[test]
    fn bash_is_a_pure_passthrough() {
        let dir = TempDir::new().unwrap();
        let layout = layout_in(&dir);
        let runner = FakeRunner::default();
        let host = RecordingHost::default();
        let outcome = dispatch(
            &layout,
            root(),
            &runner,
            &host,
            &RoleRequest::Role(Role::Bash),
        )
        .unwrap();

        assert!(runner.calls.borrow().is_empty());
        assert_eq!(host.mutation_count(), 0);
        assert_eq!(recorded_mode(&layout), None);
        assert_eq!(
            outcome,
            DispatchOutcome::Exec(LaunchSpec::current(vec!["/bin/bash".to_string()]))
        );
    }

    #[test]
    fn one_shot_roles_leave_prior_mode_untouched() {
        let dir = TempDir::new().unwrap();
        let layout = layout_in(&dir);
        mode_file::record(&layout.mode_file, Role::Server).unwrap();
        let runner = FakeRunner::default();
        let host = RecordingHost::default();

        for request in [
            RoleRequest::Role(Role::Bash),
            RoleRequest::Role(Role::Test),
            RoleRequest::Role(Role::Healthcheck),
            RoleRequest::Role(Role::DumpConfig),
            RoleRequest::Fallback(vec!["createsuperuser".to_string()]),
        ] {
            dispatch(&layout, non_root(), &runner, &host, &request).unwrap();
            assert_eq!(recorded_mode(&layout), Some(Role::Server), "{request:?}");
        }
    }

    #[test]
    fn test_role_installs_deps_and_prepares_report() {
        let dir = TempDir::new().unwrap();
        let layout = layout_in(&dir);
        let runner = FakeRunner::default();
        let host = RecordingHost::default();
        let outcome = dispatch(
            &layout,
            root(),
            &runner,
            &host,
            &RoleRequest::Role(Role::Test),
        )
        .unwrap();

        let calls = runner.joined_calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].contains("pip install"));
        assert!(layout.test_report.exists());
        assert!(
            host.chowned
                .borrow()
                .iter()
                .any(|(path, _, _)| path == &layout.test_report)
        );
        let DispatchOutcome::Exec(spec) = outcome else {
            panic!("expected exec outcome");
        };
        assert_eq!(spec.command, commands::test_runner());
    }

    #[test]
    fn test_role_skips_report_chown_when_unprivileged() {
        let dir = TempDir::new().unwrap();
        let layout = layout_in(&dir);
        let runner = FakeRunner::default();
        let host = RecordingHost::default();
        dispatch(
            &layout,
            non_root(),
            &runner,
            &host,
            &RoleRequest::Role(Role::Test),
        )
        .unwrap();

        assert!(layout.test_report.exists());
        assert_eq!(host.mutation_count(), 0);
    }

    #[test]
    fn dump_config_exits_with_collaborator_code() {
        let dir = TempDir::new().unwrap();
        let layout = layout_in(&dir);
        let runner = FakeRunner::default().fail_on("vessel.lib.config", 5);
        let host = RecordingHost::default();
        let outcome = dispatch(
            &layout,
            non_root(),
            &runner,
            &host,
            &RoleRequest::Role(Role::DumpConfig),
        )
        .unwrap();
        assert_eq!(outcome, DispatchOutcome::Exit(5));

        let runner = FakeRunner::default();
        let outcome = dispatch(
            &layout,
            non_root(),
            &runner,
            &host,
            &RoleRequest::Role(Role::DumpConfig),
        )
        .unwrap();
        assert_eq!(outcome, DispatchOutcome::Exit(0));
    }

    #[test]
    fn healthcheck_delegates_to_the_prober() {
        let dir = TempDir::new().unwrap();
        let layout = layout_in(&dir);
        let runner = FakeRunner::default();
        let host = RecordingHost::default();
        let outcome = dispatch(
            &layout,
            non_root(),
            &runner,
            &host,
            &RoleRequest::Role(Role::Healthcheck),
        )
        .unwrap();

        assert_eq!(outcome, DispatchOutcome::Probe);
        assert!(runner.calls.borrow().is_empty());
        assert_eq!(host.mutation_count(), 0);
    }

    #[test]
    fn fallback_forwards_argv_verbatim() {
        let dir = TempDir::new().unwrap();
        let layout = layout_in(&dir);
        let runner = FakeRunner::default();
        let host = RecordingHost::default();
        let args = vec![
            "changepassword".to_string(),
            "--username".to_string(),
            "admin".to_string(),
        ];
        let outcome = dispatch(
            &layout,
            root(),
            &runner,
            &host,
            &RoleRequest::Fallback(args.clone()),
        )
        .unwrap();

        assert!(runner.calls.borrow().is_empty());
        assert_eq!(host.mutation_count(), 0);
        let DispatchOutcome::Exec(spec) = outcome else {
            panic!("expected exec outcome");
        };
        assert_eq!(spec.command, commands::management(&args));
        assert_eq!(spec.identity, LaunchIdentity::Current);
    }
}
