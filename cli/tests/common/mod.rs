#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use anyhow::Result;
use chrono::TimeDelta;
use chrono::Utc;
use tempfile::TempDir;
use vessel_core::mode_file::RecordedMode;
use vessel_core::role::Role;

/// A tempdir layout plus a private bin dir of stub collaborators that
/// record their argv to a shared log.
pub struct Fixture {
    dir: TempDir,
}

impl Fixture {
    pub fn new() -> Result<Self> {
        let dir = TempDir::new()?;
        fs::create_dir(dir.path().join("bin"))?;
        fs::create_dir(dir.path().join("media"))?;
        fs::create_dir(dir.path().join("certs"))?;
        Ok(Self { dir })
    }

    /// The binary under test, pointed at this fixture's layout and PATH.
    pub fn vessel(&self) -> Result<assert_cmd::Command> {
        let mut cmd = assert_cmd::Command::cargo_bin("vessel")?;
        let path = match std::env::var("PATH") {
            Ok(existing) => format!("{}:{existing}", self.bin_dir().display()),
            Err(_) => self.bin_dir().display().to_string(),
        };
        cmd.env("PATH", path)
            .env("VESSEL_MODE_FILE", self.mode_file())
            .env("VESSEL_CONTROL_SOCKET", self.dir.path().join("docker.sock"))
            .env("VESSEL_MEDIA_DIR", self.dir.path().join("media"))
            .env("VESSEL_CERTS_DIR", self.dir.path().join("certs"))
            .env("VESSEL_TEST_REPORT", self.dir.path().join("unittest.xml"));
        Ok(cmd)
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.dir.path().join("bin")
    }

    pub fn mode_file(&self) -> PathBuf {
        self.dir.path().join("mode")
    }

    pub fn call_log(&self) -> PathBuf {
        self.dir.path().join("calls.log")
    }

    /// Install a stub that logs its argv and exits with `code`.
    pub fn stub(&self, name: &str, code: i32) -> Result<()> {
        let body = format!(
            "#!/bin/sh\necho \"{name} $@\" >> '{log}'\nexit {code}\n",
            log = self.call_log().display()
        );
        self.stub_script(name, &body)
    }

    /// Install a python3 stub whose exit code depends on the module run.
    pub fn python3(&self, wait_exit: i32, migrate_exit: i32) -> Result<()> {
        let body = format!(
            "#!/bin/sh\n\
             echo \"python3 $@\" >> '{log}'\n\
             case \"$2\" in\n\
             vessel.lifecycle.wait_for_db) exit {wait_exit} ;;\n\
             vessel.lifecycle.migrate) exit {migrate_exit} ;;\n\
             esac\n\
             exit 0\n",
            log = self.call_log().display()
        );
        self.stub_script("python3", &body)
    }

    pub fn stub_script(&self, name: &str, body: &str) -> Result<()> {
        let path = self.bin_dir().join(name);
        fs::write(&path, body)?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
        Ok(())
    }

    /// Argv lines recorded by the stubs, in call order.
    pub fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.call_log())
            .map(|contents| contents.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn write_mode(&self, mode: Role, age_secs: i64) -> Result<()> {
        let record = RecordedMode {
            mode,
            written_at: Utc::now() - TimeDelta::seconds(age_secs),
        };
        fs::write(self.mode_file(), serde_json::to_string(&record)?)?;
        Ok(())
    }

    /// Role token in the recorded mode file, if any.
    pub fn recorded_mode(&self) -> Option<String> {
        let contents = fs::read_to_string(self.mode_file()).ok()?;
        let value: serde_json::Value = serde_json::from_str(&contents).ok()?;
        value.get("mode")?.as_str().map(str::to_string)
    }
}

pub fn running_as_root() -> bool {
    // SAFETY: geteuid has no failure modes.
    unsafe { libc::geteuid() == 0 }
}
