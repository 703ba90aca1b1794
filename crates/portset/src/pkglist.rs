use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::BuildConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::port::PortRef;

#[derive(Debug, Clone, Serialize)]
pub struct RejectedLine {
    pub file: PathBuf,
    pub line: usize,
    pub text: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PackageLists {
    pub files: Vec<PathBuf>,
    pub ports: BTreeSet<PortRef>,
    pub rejected: Vec<RejectedLine>,
}

/// Strips a trailing `#` comment and surrounding whitespace.
pub fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(at) => line[..at].trim(),
        None => line.trim(),
    }
}

/// The list files a run should use, in file-name order.
pub fn list_files(cfg: &BuildConfig) -> Result<Vec<PathBuf>> {
    let dir = cfg.lists_dir();
    if !cfg.ports.sets.is_empty() {
        return cfg
            .ports
            .sets
            .iter()
            .map(|name| {
                let path = dir.join(name);
                if path.is_file() {
                    Ok(path)
                } else {
                    Err(Error::new(
                        ErrorKind::Config,
                        format!("package list '{name}' not found in {}", dir.display()),
                    ))
                }
            })
            .collect();
    }

    let entries = fs::read_dir(&dir).map_err(|e| {
        Error::new(
            ErrorKind::Config,
            format!("failed to read package list dir {}: {e}", dir.display()),
        )
    })?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn parse_list_into(path: &Path, text: &str, out: &mut PackageLists) {
    for (idx, raw) in text.lines().enumerate() {
        let line = strip_comment(raw);
        if line.is_empty() {
            continue;
        }
        match PortRef::parse(line, "") {
            Ok(port) => {
                out.ports.insert(port);
            }
            Err(e) => {
                warn!(file = %path.display(), line = idx + 1, error = %e, "rejecting package list line");
                out.rejected.push(RejectedLine {
                    file: path.to_path_buf(),
                    line: idx + 1,
                    text: line.to_string(),
                    error: e.to_string(),
                });
            }
        }
    }
}

pub fn load(cfg: &BuildConfig) -> Result<PackageLists> {
    let mut out = PackageLists {
        files: list_files(cfg)?,
        ..PackageLists::default()
    };
    for path in out.files.clone() {
        let text = fs::read_to_string(&path).map_err(|e| {
            Error::new(
                ErrorKind::Io,
                format!("failed to read {}: {e}", path.display()),
            )
        })?;
        parse_list_into(&path, &text, &mut out);
    }
    debug!(
        files = out.files.len(),
        ports = out.ports.len(),
        rejected = out.rejected.len(),
        "package lists loaded"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg_for(dir: &Path) -> BuildConfig {
        let mut cfg = BuildConfig::default();
        cfg.ports.lists = dir.display().to_string();
        cfg
    }

    #[test]
    fn comments_are_stripped() {
        assert_eq!(strip_comment("www/nginx   # web"), "www/nginx");
        assert_eq!(strip_comment("# whole line"), "");
        assert_eq!(strip_comment("  devel/git  "), "devel/git");
    }

    #[test]
    fn loads_every_list_in_name_order() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("b-server"),
            "# servers\nwww/nginx\n\ndatabases/postgresql15-server # db\n",
        )
        .unwrap();
        fs::write(tmp.path().join("a-desktop"), "x11/xterm\nwww/nginx\n").unwrap();
        fs::create_dir(tmp.path().join("not-a-list")).unwrap();

        let lists = load(&cfg_for(tmp.path())).unwrap();
        assert_eq!(lists.files.len(), 2);
        assert!(lists.files[0].ends_with("a-desktop"));
        let names: Vec<&str> = lists.ports.iter().map(|p| p.name()).collect();
        assert_eq!(
            names,
            vec!["databases/postgresql15-server", "www/nginx", "x11/xterm"]
        );
        assert!(lists.rejected.is_empty());
    }

    #[test]
    fn bad_lines_are_collected_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("main"), "devel/a@x@y\nwww/nginx\n").unwrap();

        let lists = load(&cfg_for(tmp.path())).unwrap();
        assert_eq!(lists.ports.len(), 1);
        assert_eq!(lists.rejected.len(), 1);
        assert_eq!(lists.rejected[0].line, 1);
    }

    #[test]
    fn sets_restrict_the_lists() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("server"), "www/nginx\n").unwrap();
        fs::write(tmp.path().join("desktop"), "x11/xterm\n").unwrap();

        let mut cfg = cfg_for(tmp.path());
        cfg.ports.sets = vec!["server".into()];
        let lists = load(&cfg).unwrap();
        assert_eq!(lists.ports.len(), 1);

        cfg.ports.sets = vec!["missing".into()];
        assert_eq!(load(&cfg).unwrap_err().kind(), ErrorKind::Config);
    }
}
