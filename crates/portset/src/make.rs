use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

use crate::error::{Error, ErrorKind, Result};
use crate::port::PortRef;

pub const TARGET_SHOWCONFIG: &str = "showconfig";
pub const TARGET_CONFIG_CONDITIONAL: &str = "config-conditional";
pub const TARGET_CONFIG: &str = "config";

/// One `make -C <dir> VAR=value... <target>` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MakeRequest {
    pub port: PortRef,
    pub dir: PathBuf,
    pub target: &'static str,
    pub vars: BTreeMap<String, String>,
}

impl MakeRequest {
    pub fn new(port: &PortRef, ports_root: &Path, target: &'static str) -> Self {
        let mut vars = BTreeMap::new();
        if port.has_flavor() {
            vars.insert("FLAVOR".to_string(), port.flavor_value().to_string());
        }
        Self {
            port: port.clone(),
            dir: port.recipe_dir(ports_root),
            target,
            vars,
        }
    }

    pub fn with_db_dir(mut self, db_dir: &Path) -> Self {
        self.vars
            .insert("PORT_DBDIR".to_string(), db_dir.display().to_string());
        self
    }

    fn command(&self, program: &Path) -> Command {
        let mut cmd = Command::new(program);
        for (k, v) in &self.vars {
            cmd.arg(format!("{k}={v}"));
        }
        cmd.arg("-C").arg(&self.dir).arg(self.target);
        cmd
    }
}

#[derive(Debug, Clone, Default)]
pub struct MakeOutput {
    /// `None` when the process was killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl MakeOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// The ports tree build system.
///
/// `query` captures output and must not touch the terminal, so it is safe to call
/// from worker threads. `interactive` hands the controlling terminal to make and
/// must only be called from one thread at a time.
pub trait PortsMake: Send + Sync {
    fn query(&self, req: &MakeRequest) -> Result<MakeOutput>;
    fn interactive(&self, req: &MakeRequest) -> Result<i32>;
}

#[derive(Debug, Clone)]
pub struct SystemMake {
    program: PathBuf,
}

impl SystemMake {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for SystemMake {
    fn default() -> Self {
        Self::new("make")
    }
}

impl PortsMake for SystemMake {
    fn query(&self, req: &MakeRequest) -> Result<MakeOutput> {
        let mut cmd = req.command(&self.program);
        debug!(port = %req.port, target = req.target, "running {:?}", cmd);
        let out = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                Error::new(
                    ErrorKind::RecipeQuery,
                    format!("{}: failed to spawn make {}: {e}", req.port, req.target),
                )
            })?;
        Ok(MakeOutput {
            status: out.status.code(),
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        })
    }

    fn interactive(&self, req: &MakeRequest) -> Result<i32> {
        let mut cmd = req.command(&self.program);
        debug!(port = %req.port, target = req.target, "running {:?}", cmd);
        let status = cmd
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| {
                Error::new(
                    ErrorKind::RecipeQuery,
                    format!("{}: failed to spawn make {}: {e}", req.port, req.target),
                )
            })?;
        // Killed by a signal: report like a shell would.
        Ok(status.code().unwrap_or(128))
    }
}

/// Turns a finished query into an error unless make exited cleanly.
pub fn require_success(req: &MakeRequest, out: &MakeOutput) -> Result<()> {
    if out.success() {
        return Ok(());
    }
    let status = out
        .status
        .map(|c| c.to_string())
        .unwrap_or_else(|| "signal".into());
    let tail = out
        .stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
        .trim();
    Err(Error::new(
        ErrorKind::RecipeQuery,
        format!(
            "{}: make {} in {} exited with {status}{}{}",
            req.port,
            req.target,
            req.dir.display(),
            if tail.is_empty() { "" } else { ": " },
            tail
        ),
    ))
}


#[cfg(all(test, unix))]
mod process_tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn fake_make(dir: &Path, body: &str) -> SystemMake {
        let path = dir.join("make");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write fake make");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod fake make");
        SystemMake::new(path)
    }

    fn pcre2_request(ports_root: &Path) -> MakeRequest {
        let port = PortRef::parse("devel/pcre2@x", "").expect("port");
        MakeRequest::new(&port, ports_root, TARGET_SHOWCONFIG)
    }

    #[test]
    fn query_captures_output_and_passes_vars_first() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let make = fake_make(
            tmp.path(),
            r#"printf 'ARG %s\n' "$@"
echo '     DOCS=on: docs'
echo '     UTF16=off: utf16'
echo warn >&2"#,
        );
        let req = pcre2_request(&tmp.path().join("ports"));

        let out = make.query(&req).expect("query");
        assert!(out.success());
        let argv: Vec<&str> = out
            .stdout
            .lines()
            .filter_map(|l| l.strip_prefix("ARG "))
            .collect();
        let dir = req.dir.display().to_string();
        assert_eq!(argv, vec!["FLAVOR=x", "-C", dir.as_str(), "showconfig"]);
        assert_eq!(out.stderr, "warn\n");

        let opts = crate::options::parse_showconfig(&out.stdout);
        assert!(opts.contains("DOCS"));
        assert!(opts.contains("UTF16"));
    }

    #[test]
    fn query_reports_nonzero_exit() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let make = fake_make(tmp.path(), "echo 'no such target' >&2\nexit 2");
        let req = pcre2_request(tmp.path());

        let out = make.query(&req).expect("query");
        assert_eq!(out.status, Some(2));
        let err = require_success(&req, &out).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RecipeQuery);
        assert!(err.to_string().contains("no such target"));
    }

    #[test]
    fn interactive_returns_exit_code_unchanged() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let make = fake_make(tmp.path(), "exit 3");
        let req = pcre2_request(tmp.path());
        assert_eq!(make.interactive(&req).expect("interactive"), 3);
    }

    #[test]
    fn killed_by_signal() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let make = fake_make(tmp.path(), "kill -9 $$");
        let req = pcre2_request(tmp.path());

        assert_eq!(make.query(&req).expect("query").status, None);
        assert_eq!(make.interactive(&req).expect("interactive"), 128);
    }

    #[test]
    fn missing_program_is_a_recipe_query_error() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let make = SystemMake::new(tmp.path().join("nonexistent"));
        let req = pcre2_request(tmp.path());

        assert_eq!(make.query(&req).unwrap_err().kind(), ErrorKind::RecipeQuery);
        assert_eq!(
            make.interactive(&req).unwrap_err().kind(),
            ErrorKind::RecipeQuery
        );
    }
}
