use std::path::Path;

use crate::config::BuildConfig;
use crate::error::Result;
use crate::make::{MakeRequest, PortsMake, TARGET_CONFIG_CONDITIONAL, require_success};
use crate::port::PortRef;

/// Turns one line of dependency output into a port reference.
///
/// Blank lines and `===>` banners yield `None`. Absolute paths under the ports
/// tree are reduced to `category/name`.
pub fn parse_dependency_line(line: &str, ports_root: &Path) -> Option<Result<PortRef>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('=') {
        return None;
    }
    let rel = Path::new(line)
        .strip_prefix(ports_root)
        .ok()
        .and_then(|p| p.to_str())
        .unwrap_or(line);
    Some(PortRef::parse(rel, ""))
}

/// Ports reachable from `port` through conditional configuration dependencies,
/// in the order make printed them. Duplicates are kept.
pub fn expand(
    port: &PortRef,
    cfg: &BuildConfig,
    make: &dyn PortsMake,
) -> Result<impl Iterator<Item = Result<PortRef>>> {
    let ports_root = cfg.ports_root();
    let req = MakeRequest::new(port, &ports_root, TARGET_CONFIG_CONDITIONAL)
        .with_db_dir(&cfg.ports_db());
    let out = make.query(&req)?;
    require_success(&req, &out)?;

    let lines: Vec<String> = out.stdout.lines().map(ToOwned::to_owned).collect();
    Ok(lines
        .into_iter()
        .filter_map(move |line| parse_dependency_line(&line, &ports_root)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn dependency_lines_parse_as_ports() {
        let root = Path::new("/usr/ports");
        let got = parse_dependency_line("devel/pcre2", root).unwrap().unwrap();
        assert_eq!(got.name(), "devel/pcre2");

        let got = parse_dependency_line("  devel/py-six@py311 ", root)
            .unwrap()
            .unwrap();
        assert_eq!(got.name(), "devel/py-six");
        assert_eq!(got.flavor(), "@py311");
    }

    #[test]
    fn absolute_paths_are_made_relative() {
        let got = parse_dependency_line("/usr/ports/security/openssl", Path::new("/usr/ports"))
            .unwrap()
            .unwrap();
        assert_eq!(got.name(), "security/openssl");
    }

    #[test]
    fn banners_and_blank_lines_are_skipped() {
        let root = Path::new("/usr/ports");
        assert!(parse_dependency_line("", root).is_none());
        assert!(parse_dependency_line("   ", root).is_none());
        assert!(parse_dependency_line("===> Setting user-specified options", root).is_none());
    }

    #[test]
    fn bad_lines_surface_as_item_errors() {
        let err = parse_dependency_line("@py311", Path::new("/usr/ports"))
            .unwrap()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPort);
    }
}
