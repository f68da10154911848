//! Module-state comparison.

use canopy_core::{Modstate, ModstateDelta, ModstateDiff, ModstateStatus, Revision};
use canopy_yang::YangSpec;

/// Compare a datastore's stored module-state against the running
/// schema.
///
/// `expect_modstate` is the configured module-state option: when set
/// and the datastore has no record at all, the result is `NoMatch`
/// (typically a copy/pasted datastore) rather than `None`.
pub fn modstate_diff(
    stored: Option<&Modstate>,
    spec: &YangSpec,
    expect_modstate: bool,
) -> ModstateDiff {
    let stored = match stored {
        Some(ms) => ms,
        None => {
            return ModstateDiff {
                entries: Vec::new(),
                status: if expect_modstate {
                    ModstateStatus::NoMatch
                } else {
                    ModstateStatus::None
                },
            }
        }
    };

    let mut entries = Vec::new();
    for module in spec.modules() {
        if let Some(rev) = stored.find(&module.namespace) {
            if rev.revision != module.revision {
                entries.push(ModstateDelta {
                    name: module.name.clone(),
                    namespace: module.namespace.clone(),
                    from: rev.revision,
                    to: module.revision,
                });
            }
        }
    }
    // Modules the content was authored against but the schema dropped.
    for rev in &stored.modules {
        if spec.module_by_namespace(&rev.namespace).is_none() {
            entries.push(ModstateDelta {
                name: rev.name.clone(),
                namespace: rev.namespace.clone(),
                from: rev.revision,
                to: Revision::NONE,
            });
        }
    }

    let status = if entries.is_empty() {
        ModstateStatus::None
    } else {
        ModstateStatus::Other
    };
    ModstateDiff { entries, status }
}
