// Tool enablement policy

use super::ToolId;
use std::collections::BTreeSet;

/// Resolved set of enabled tools.
///
/// A non-empty allow-list is authoritative; otherwise each tool's
/// default-enabled flag decides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPolicy {
    enabled: BTreeSet<ToolId>,
}

impl ToolPolicy {
    pub fn resolve<S: AsRef<str>>(allow_list: &[S]) -> Self {
        let names: Vec<&str> = allow_list
            .iter()
            .map(|name| name.as_ref().trim())
            .filter(|name| !name.is_empty())
            .collect();

        if names.is_empty() {
            return Self::defaults();
        }

        let mut enabled = BTreeSet::new();
        for name in names {
            match ToolId::from_name(name) {
                Some(id) => {
                    enabled.insert(id);
                }
                None => tracing::warn!(tool = name, "Ignoring unknown tool in allow-list"),
            }
        }

        Self { enabled }
    }

    pub fn defaults() -> Self {
        Self {
            enabled: ToolId::ALL
                .iter()
                .copied()
                .filter(|id| id.registration().default_enabled)
                .collect(),
        }
    }

    pub fn is_enabled(&self, id: ToolId) -> bool {
        self.enabled.contains(&id)
    }

    /// Enabled tools in catalogue order.
    pub fn enabled(&self) -> impl Iterator<Item = ToolId> + '_ {
        self.enabled.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.enabled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.enabled.is_empty()
    }
}

impl Default for ToolPolicy {
    fn default() -> Self {
        Self::defaults()
    }
}
