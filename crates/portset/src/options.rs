use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::error::{Error, ErrorKind, Result};
use crate::make::{MakeRequest, PortsMake, TARGET_SHOWCONFIG, require_success};
use crate::port::PortRef;

pub type OptionSet = BTreeSet<String>;

pub const OPTIONS_LIST_PREFIX: &str = "_FILE_COMPLETE_OPTIONS_LIST=";

static SHOWCONFIG_OPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z0-9_]+)=").expect("showconfig option regex must compile")
});

/// Extracts option names from `make showconfig` output.
///
/// ```text
/// ===> The following configuration options are available for pcre2-10.42:
///      DOCS=on: Build and/or install documentation
/// ===> Use 'make config' to modify these settings
/// ```
pub fn parse_showconfig(text: &str) -> OptionSet {
    text.lines()
        .filter(|line| !line.starts_with('='))
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match SHOWCONFIG_OPTION.captures(line) {
            Some(caps) => Some(caps[1].to_string()),
            None => {
                debug!(line, "ignoring showconfig line");
                None
            }
        })
        .collect()
}

/// Extracts the stored option names from a port's `options` file.
pub fn parse_options_file(text: &str, path: &Path) -> Result<OptionSet> {
    let Some(list) = text
        .lines()
        .find_map(|line| line.strip_prefix(OPTIONS_LIST_PREFIX))
    else {
        return Err(Error::new(
            ErrorKind::InvalidOptionsFile,
            format!(
                "{} is not a valid port options file (no {OPTIONS_LIST_PREFIX} line)",
                path.display()
            ),
        ));
    };
    Ok(list.split_whitespace().map(ToOwned::to_owned).collect())
}

pub fn options_file_path(port: &PortRef, db_root: &Path) -> PathBuf {
    db_root.join(port.db_dir_name()).join("options")
}

/// Options the port's Makefile exposes right now.
pub fn current_options(
    port: &PortRef,
    ports_root: &Path,
    make: &dyn PortsMake,
) -> Result<OptionSet> {
    let req = MakeRequest::new(port, ports_root, TARGET_SHOWCONFIG);
    if !req.dir.is_dir() {
        return Err(Error::new(
            ErrorKind::RecipeQuery,
            format!("{port}: no port directory at {}", req.dir.display()),
        ));
    }
    let out = make.query(&req)?;
    require_success(&req, &out)?;
    Ok(parse_showconfig(&out.stdout))
}

/// Options persisted for the port under the options database.
pub fn stored_options(port: &PortRef, db_root: &Path) -> Result<OptionSet> {
    let path = options_file_path(port, db_root);
    let text = fs::read_to_string(&path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            Error::new(
                ErrorKind::MissingOptionsFile,
                format!("{port}: no options file at {}", path.display()),
            )
        } else {
            Error::new(
                ErrorKind::Io,
                format!("{port}: failed to read {}: {e}", path.display()),
            )
        }
    })?;
    parse_options_file(&text, &path)
}
