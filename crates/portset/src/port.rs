use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{Error, ErrorKind, Result};

pub const FLAVOR_SEPARATOR: char = '@';

/// A port reference such as `devel/pcre2` or `devel/py-setuptools@py311`.
///
/// The flavor keeps its leading `@` when it came from the reference itself, so
/// `lang/foo@bar` and `("lang/foo", "bar")` are distinct identities. Use
/// [`PortRef::flavor_value`] when handing the flavor to make.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PortRef {
    name: String,
    flavor: String,
}

impl PortRef {
    pub fn parse(raw: &str, explicit_flavor: &str) -> Result<Self> {
        let raw = raw.trim();
        let explicit_flavor = explicit_flavor.trim();

        let (name, flavor) = match raw.find(FLAVOR_SEPARATOR) {
            Some(at) => {
                if !explicit_flavor.is_empty() {
                    return Err(Error::new(
                        ErrorKind::ConflictingFlavor,
                        format!(
                            "port '{raw}' already carries a flavor but '{explicit_flavor}' was also given"
                        ),
                    ));
                }
                let (name, flavor) = raw.split_at(at);
                if flavor[1..].contains(FLAVOR_SEPARATOR) {
                    return Err(Error::new(
                        ErrorKind::InvalidPort,
                        format!("port '{raw}' contains more than one '{FLAVOR_SEPARATOR}'"),
                    ));
                }
                if flavor.len() == FLAVOR_SEPARATOR.len_utf8() {
                    return Err(Error::new(
                        ErrorKind::InvalidPort,
                        format!("port '{raw}' has an empty flavor after '{FLAVOR_SEPARATOR}'"),
                    ));
                }
                (name, flavor)
            }
            None => (raw, explicit_flavor),
        };

        if name.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidPort,
                format!("port reference '{raw}' has an empty name"),
            ));
        }

        Ok(Self {
            name: name.to_string(),
            flavor: flavor.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flavor(&self) -> &str {
        &self.flavor
    }

    pub fn has_flavor(&self) -> bool {
        !self.flavor_value().is_empty()
    }

    pub fn flavor_value(&self) -> &str {
        self.flavor
            .strip_prefix(FLAVOR_SEPARATOR)
            .unwrap_or(&self.flavor)
    }

    pub fn db_dir_name(&self) -> String {
        self.name.replace('/', "_")
    }

    pub fn recipe_dir(&self, ports_root: &Path) -> PathBuf {
        ports_root.join(&self.name)
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_flavor() {
            write!(f, "{}{}{}", self.name, FLAVOR_SEPARATOR, self.flavor_value())
        } else {
            write!(f, "{}", self.name)
        }
    }
}
