use tracing::debug;

use crate::config::BuildConfig;
use crate::error::Result;
use crate::make::{MakeRequest, PortsMake, TARGET_CONFIG};
use crate::options::{OptionSet, current_options, stored_options};
use crate::port::PortRef;

/// How a port's stored options differ from what its Makefile exposes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Divergence {
    /// Exposed by the Makefile but never stored.
    pub added: OptionSet,
    /// Stored but no longer exposed.
    pub removed: OptionSet,
}

impl Divergence {
    pub fn between(stored: &OptionSet, current: &OptionSet) -> Self {
        Self {
            added: current.difference(stored).cloned().collect(),
            removed: stored.difference(current).cloned().collect(),
        }
    }

    pub fn is_dirty(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }
}

pub fn needs_update(stored: &OptionSet, current: &OptionSet) -> bool {
    stored.symmetric_difference(current).next().is_some()
}

pub fn reconcile(port: &PortRef, cfg: &BuildConfig, make: &dyn PortsMake) -> Result<Divergence> {
    let stored = stored_options(port, &cfg.ports_db())?;
    let current = current_options(port, &cfg.ports_root(), make)?;
    if !needs_update(&stored, &current) {
        return Ok(Divergence::default());
    }
    let div = Divergence::between(&stored, &current);
    debug!(%port, added = ?div.added, removed = ?div.removed, "options diverged");
    Ok(div)
}

/// Runs `make config` for the port on the controlling terminal and returns its
/// exit status unchanged.
pub fn apply_options(port: &PortRef, cfg: &BuildConfig, make: &dyn PortsMake) -> Result<i32> {
    let req = MakeRequest::new(port, &cfg.ports_root(), TARGET_CONFIG).with_db_dir(&cfg.ports_db());
    make.interactive(&req)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> OptionSet {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_sets_agree() {
        assert!(!needs_update(&set(&[]), &set(&[])));
    }

    #[test]
    fn stored_only_option_is_dirty() {
        assert!(needs_update(&set(&["A"]), &set(&[])));
        assert!(needs_update(&set(&[]), &set(&["A"])));
    }

    #[test]
    fn order_does_not_matter() {
        assert!(!needs_update(&set(&["A", "B"]), &set(&["B", "A"])));
    }

    #[test]
    fn divergence_splits_both_directions() {
        let div = Divergence::between(&set(&["DOCS", "NLS"]), &set(&["DOCS", "UTF16"]));
        assert_eq!(div.added, set(&["UTF16"]));
        assert_eq!(div.removed, set(&["NLS"]));
        assert!(div.is_dirty());
    }

    #[test]
    fn divergence_agrees_with_needs_update() {
        let cases = [
            (set(&[]), set(&[])),
            (set(&["A"]), set(&[])),
            (set(&["A", "B"]), set(&["B", "A"])),
            (set(&["A"]), set(&["B"])),
        ];
        for (stored, current) in cases {
            assert_eq!(
                Divergence::between(&stored, &current).is_dirty(),
                needs_update(&stored, &current)
            );
        }
    }
}
