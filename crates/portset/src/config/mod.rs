use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde::de::DeserializeOwned;
use toml::Value;

use crate::error::{Error, ErrorKind, Result};

pub const DEFAULT_CONFIG_FILE: &str = "/usr/local/etc/ports/ports.toml";

fn default_ports_root() -> String {
    "/usr/ports".into()
}

fn default_ports_db() -> String {
    "/var/db/ports".into()
}

fn default_lists_dir() -> String {
    "/usr/local/etc/ports/pkglists".into()
}

fn default_jail() -> String {
    "12amd64".into()
}

fn default_named() -> String {
    "default".into()
}

fn default_version() -> String {
    "12.1-RELEASE".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PortsConfig {
    #[serde(default = "default_ports_root")]
    pub root: String,
    #[serde(default = "default_ports_db")]
    pub db: String,
    #[serde(default = "default_lists_dir")]
    pub lists: String,
    pub sets: Vec<String>,
    pub delete: Vec<String>,
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            root: default_ports_root(),
            db: default_ports_db(),
            lists: default_lists_dir(),
            sets: Vec::new(),
            delete: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoudriereConfig {
    #[serde(default = "default_jail")]
    pub jail: String,
    #[serde(default = "default_named")]
    pub ports: String,
    #[serde(default = "default_named")]
    pub set: String,
    #[serde(default = "default_version")]
    pub version: String,
}

impl Default for PoudriereConfig {
    fn default() -> Self {
        Self {
            jail: default_jail(),
            ports: default_named(),
            set: default_named(),
            version: default_version(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OptionsPassConfig {
    /// Worker count for the discovery phases (0 = CPU count).
    pub max_parallel: usize,
    pub include_seeds: bool,
}

#[derive(Debug, Clone, Default)]
pub struct BuildConfig {
    pub ports: PortsConfig,
    pub poudriere: PoudriereConfig,
    pub options: OptionsPassConfig,
}

impl BuildConfig {
    pub fn from_doc(doc: &ConfigDoc) -> Result<Self> {
        Ok(Self {
            ports: doc.deserialize_path("ports")?.unwrap_or_default(),
            poudriere: doc.deserialize_path("poudriere")?.unwrap_or_default(),
            options: doc.deserialize_path("options")?.unwrap_or_default(),
        })
    }

    pub fn ports_root(&self) -> PathBuf {
        PathBuf::from(&self.ports.root)
    }

    pub fn ports_db(&self) -> PathBuf {
        PathBuf::from(&self.ports.db)
    }

    pub fn lists_dir(&self) -> PathBuf {
        PathBuf::from(&self.ports.lists)
    }

    pub fn max_parallel(&self) -> usize {
        if self.options.max_parallel == 0 {
            num_cpus::get().max(1)
        } else {
            self.options.max_parallel
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigDoc {
    pub path: PathBuf,
    pub value: Value,
}

impl ConfigDoc {
    pub fn empty(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            value: Value::Table(Default::default()),
        }
    }

    pub fn value_path(&self, path: &str) -> Option<&Value> {
        let path = path.trim();
        if path.is_empty() {
            return Some(&self.value);
        }

        let mut cur = &self.value;
        for seg in path.split('.') {
            let tbl = cur.as_table()?;
            cur = tbl.get(seg)?;
        }
        Some(cur)
    }

    pub fn deserialize_path<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let Some(v) = self.value_path(path) else {
            return Ok(None);
        };
        let parsed = v.clone().try_into().map_err(|e| {
            Error::new(
                ErrorKind::Config,
                format!("invalid [{}] in {}: {e}", path, self.path.display()),
            )
        })?;
        Ok(Some(parsed))
    }
}

fn merge_values(base: &mut Value, child: Value) {
    match (base, child) {
        (Value::Table(base_tbl), Value::Table(child_tbl)) => {
            for (k, v) in child_tbl {
                match base_tbl.get_mut(&k) {
                    Some(existing) => merge_values(existing, v),
                    None => {
                        base_tbl.insert(k, v);
                    }
                }
            }
        }
        (base_slot, child_val) => {
            *base_slot = child_val;
        }
    }
}

fn resolve_ref_path(from_file: &Path, reference: &str) -> PathBuf {
    let p = PathBuf::from(reference);
    if p.is_absolute() {
        p
    } else {
        from_file.parent().unwrap_or_else(|| Path::new(".")).join(p)
    }
}

fn load_value_inner(path: &Path, stack: &mut HashSet<PathBuf>) -> Result<Value> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !stack.insert(canonical.clone()) {
        return Err(Error::new(
            ErrorKind::Config,
            format!("config extends cycle at {}", canonical.display()),
        ));
    }

    let data = fs::read_to_string(path).map_err(|e| {
        Error::new(
            ErrorKind::Config,
            format!("failed to read config {}: {e}", path.display()),
        )
    })?;
    let mut value: Value = toml::from_str(&data).map_err(|e| {
        Error::new(
            ErrorKind::Config,
            format!("TOML parse error in {}: {e}", path.display()),
        )
    })?;

    let mut out = Value::Table(Default::default());
    if let Some(ext) = value.get("extends").and_then(Value::as_str) {
        out = load_value_inner(&resolve_ref_path(path, ext), stack)?;
    }
    if let Some(tbl) = value.as_table_mut() {
        tbl.remove("extends");
    }
    merge_values(&mut out, value);

    stack.remove(&canonical);
    Ok(out)
}

pub fn load(path: &Path) -> Result<ConfigDoc> {
    let mut stack = HashSet::<PathBuf>::new();
    let value = load_value_inner(path, &mut stack)?;
    Ok(ConfigDoc {
        path: path.to_path_buf(),
        value,
    })
}

/// Loads the config named on the command line, or the default file when it exists.
pub fn load_build_config(explicit: Option<&Path>) -> Result<BuildConfig> {
    let doc = match explicit {
        Some(path) => load(path)?,
        None => {
            let path = Path::new(DEFAULT_CONFIG_FILE);
            if path.is_file() {
                load(path)?
            } else {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                ConfigDoc::empty(path)
            }
        }
    };
    BuildConfig::from_doc(&doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(raw: &str) -> ConfigDoc {
        ConfigDoc {
            path: PathBuf::from("<mem>"),
            value: toml::from_str(raw).unwrap(),
        }
    }

    #[test]
    fn empty_config_uses_documented_defaults() {
        let cfg = BuildConfig::from_doc(&doc("")).unwrap();
        assert_eq!(cfg.ports.root, "/usr/ports");
        assert_eq!(cfg.ports.db, "/var/db/ports");
        assert!(cfg.ports.sets.is_empty());
        assert!(cfg.ports.delete.is_empty());
        assert_eq!(cfg.poudriere.jail, "12amd64");
        assert_eq!(cfg.poudriere.ports, "default");
        assert_eq!(cfg.poudriere.set, "default");
        assert_eq!(cfg.poudriere.version, "12.1-RELEASE");
        assert_eq!(cfg.options.max_parallel, 0);
        assert!(!cfg.options.include_seeds);
        assert!(cfg.max_parallel() >= 1);
    }

    #[test]
    fn partial_tables_keep_defaults_for_missing_keys() {
        let cfg = BuildConfig::from_doc(&doc(
            r#"
[ports]
root = "/srv/ports"
delete = ["/srv/ports/UPDATING"]

[poudriere]
jail = "14amd64"

[options]
max_parallel = 3
"#,
        ))
        .unwrap();
        assert_eq!(cfg.ports.root, "/srv/ports");
        assert_eq!(cfg.ports.db, "/var/db/ports");
        assert_eq!(cfg.ports.delete, vec!["/srv/ports/UPDATING".to_string()]);
        assert_eq!(cfg.poudriere.jail, "14amd64");
        assert_eq!(cfg.poudriere.version, "12.1-RELEASE");
        assert_eq!(cfg.max_parallel(), 3);
    }

    #[test]
    fn wrong_type_is_a_config_error() {
        let err = BuildConfig::from_doc(&doc("[ports]\nroot = 7\n")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn extends_merges_base_under_child() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("base.toml"),
            "[ports]\nroot = \"/base/ports\"\ndb = \"/base/db\"\n",
        )
        .unwrap();
        let child = tmp.path().join("child.toml");
        fs::write(&child, "extends = \"base.toml\"\n[ports]\ndb = \"/child/db\"\n").unwrap();

        let cfg = load_build_config(Some(&child)).unwrap();
        assert_eq!(cfg.ports.root, "/base/ports");
        assert_eq!(cfg.ports.db, "/child/db");
    }

    #[test]
    fn extends_cycle_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a.toml");
        fs::write(&a, "extends = \"b.toml\"\n").unwrap();
        fs::write(tmp.path().join("b.toml"), "extends = \"a.toml\"\n").unwrap();

        let err = load(&a).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = load_build_config(Some(&tmp.path().join("nope.toml"))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
