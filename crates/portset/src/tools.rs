use std::path::PathBuf;

use crate::error::{Error, ErrorKind, Result};

pub const MAKE: &str = "make";
pub const POUDRIERE: &str = "poudriere";
pub const PORTSHAKER: &str = "portshaker";

pub fn find(tool: &str) -> Option<PathBuf> {
    which::which(tool).ok()
}

pub fn require(tool: &str) -> Result<PathBuf> {
    find(tool).ok_or_else(|| {
        Error::new(
            ErrorKind::MissingTool,
            format!("required tool '{tool}' was not found in PATH"),
        )
    })
}

/// Resolves every tool up front so a run fails before doing any work.
pub fn require_all(tools: &[&str]) -> Result<Vec<PathBuf>> {
    tools.iter().map(|t| require(t)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tool_is_missing() {
        let err = require("portset-no-such-tool-xyz").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingTool);
        assert!(err.to_string().contains("portset-no-such-tool-xyz"));
    }

    #[test]
    fn require_all_stops_at_first_missing() {
        let err = require_all(&["portset-no-such-tool-a", "portset-no-such-tool-b"]).unwrap_err();
        assert!(err.to_string().contains("tool-a"));
    }
}
