use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{info, warn};

use crate::config::BuildConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::tools;

fn tree_args(cfg: &BuildConfig) -> Vec<String> {
    vec![
        "-j".into(),
        cfg.poudriere.jail.clone(),
        "-p".into(),
        cfg.poudriere.ports.clone(),
        "-z".into(),
        cfg.poudriere.set.clone(),
    ]
}

fn with_lists(mut args: Vec<String>, lists: &[PathBuf]) -> Vec<String> {
    for list in lists {
        args.push("-f".into());
        args.push(list.display().to_string());
    }
    args
}

pub fn bulk_args(cfg: &BuildConfig, lists: &[PathBuf]) -> Vec<String> {
    let mut args = vec!["bulk".to_string()];
    args.extend(tree_args(cfg));
    with_lists(args, lists)
}

pub fn pkgclean_args(cfg: &BuildConfig, lists: &[PathBuf]) -> Vec<String> {
    let mut args = vec!["pkgclean".to_string()];
    args.extend(tree_args(cfg));
    with_lists(args, lists)
}

pub fn jail_create_args(cfg: &BuildConfig) -> Vec<String> {
    vec![
        "jail".into(),
        "-c".into(),
        "-j".into(),
        cfg.poudriere.jail.clone(),
        "-v".into(),
        cfg.poudriere.version.clone(),
    ]
}

pub fn ports_create_args(cfg: &BuildConfig) -> Vec<String> {
    vec![
        "ports".into(),
        "-c".into(),
        "-p".into(),
        cfg.poudriere.ports.clone(),
    ]
}

pub fn ports_update_args(cfg: &BuildConfig) -> Vec<String> {
    vec![
        "ports".into(),
        "-u".into(),
        "-p".into(),
        cfg.poudriere.ports.clone(),
    ]
}

fn run(program: &Path, args: &[String]) -> Result<()> {
    info!("running {} {}", program.display(), args.join(" "));
    let status = Command::new(program).args(args).status().map_err(|e| {
        Error::new(
            ErrorKind::Poudriere,
            format!("failed to spawn {}: {e}", program.display()),
        )
    })?;
    if !status.success() {
        return Err(Error::new(
            ErrorKind::Poudriere,
            format!(
                "{} {} failed: {status}",
                program.display(),
                args.first().map(String::as_str).unwrap_or_default()
            ),
        ));
    }
    Ok(())
}

pub fn bulk(cfg: &BuildConfig, lists: &[PathBuf]) -> Result<()> {
    let poudriere = tools::require(tools::POUDRIERE)?;
    run(&poudriere, &bulk_args(cfg, lists))
}

pub fn pkgclean(cfg: &BuildConfig, lists: &[PathBuf]) -> Result<()> {
    let poudriere = tools::require(tools::POUDRIERE)?;
    run(&poudriere, &pkgclean_args(cfg, lists))
}

pub fn setup(cfg: &BuildConfig) -> Result<()> {
    let poudriere = tools::require(tools::POUDRIERE)?;
    run(&poudriere, &jail_create_args(cfg))?;
    run(&poudriere, &ports_create_args(cfg))
}

/// Refreshes the ports tree, then removes the configured leftovers.
pub fn update_ports(cfg: &BuildConfig) -> Result<()> {
    match tools::find(tools::PORTSHAKER) {
        Some(portshaker) => run(&portshaker, &[])?,
        None => {
            let poudriere = tools::require(tools::POUDRIERE)?;
            run(&poudriere, &ports_update_args(cfg))?;
        }
    }
    delete_paths(&cfg.ports.delete)
}

pub fn delete_paths(paths: &[String]) -> Result<()> {
    for raw in paths {
        let path = Path::new(raw.trim());
        if path.as_os_str().is_empty() {
            continue;
        }
        let res = if path.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        match res {
            Ok(()) => info!(path = %path.display(), "removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "already absent");
            }
            Err(e) => {
                return Err(Error::new(
                    ErrorKind::Io,
                    format!("failed to remove {}: {e}", path.display()),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> BuildConfig {
        let mut cfg = BuildConfig::default();
        cfg.poudriere.jail = "14amd64".into();
        cfg
    }

    #[test]
    fn bulk_passes_tree_and_every_list() {
        let lists = vec![PathBuf::from("/l/desktop"), PathBuf::from("/l/server")];
        assert_eq!(
            bulk_args(&cfg(), &lists),
            vec![
                "bulk", "-j", "14amd64", "-p", "default", "-z", "default", "-f", "/l/desktop",
                "-f", "/l/server"
            ]
        );
    }

    #[test]
    fn pkgclean_mirrors_bulk() {
        let lists = vec![PathBuf::from("/l/server")];
        let args = pkgclean_args(&cfg(), &lists);
        assert_eq!(args[0], "pkgclean");
        assert_eq!(&args[1..], &bulk_args(&cfg(), &lists)[1..]);
    }

    #[test]
    fn setup_uses_release_version() {
        assert_eq!(
            jail_create_args(&cfg()),
            vec!["jail", "-c", "-j", "14amd64", "-v", "12.1-RELEASE"]
        );
        assert_eq!(ports_create_args(&cfg()), vec!["ports", "-c", "-p", "default"]);
        assert_eq!(ports_update_args(&cfg()), vec!["ports", "-u", "-p", "default"]);
    }

    #[test]
    fn delete_removes_files_and_dirs_and_tolerates_absent() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("MOVED");
        let dir = tmp.path().join("distfiles");
        fs::write(&file, "x").unwrap();
        fs::create_dir_all(dir.join("sub")).unwrap();

        delete_paths(&[
            file.display().to_string(),
            dir.display().to_string(),
            tmp.path().join("gone").display().to_string(),
            "  ".into(),
        ])
        .unwrap();
        assert!(!file.exists());
        assert!(!dir.exists());
    }
}
