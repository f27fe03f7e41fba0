use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use serde_json::Value;

use crate::common::PresenceSet;

#[derive(Debug, Deserialize)]
struct Presence {
    #[serde(default)]
    metas: Vec<PresenceMeta>,
}

#[derive(Debug, Deserialize)]
struct PresenceMeta {
    phx_ref: String,
}

#[derive(Debug, Default, Deserialize)]
struct PresenceDiff {
    #[serde(default)]
    joins: HashMap<String, Presence>,
    #[serde(default)]
    leaves: HashMap<String, Presence>,
}

/// Folds `presence_state` / `presence_diff` pushes into the full online set.
/// A key stays online while at least one of its connections is tracked.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    /// presence key -> phx_refs of its tracked connections
    entries: BTreeMap<String, Vec<String>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// `presence_state` replaces everything known so far.
    pub fn replace_state(&mut self, payload: &Value) -> serde_json::Result<()> {
        let state: HashMap<String, Presence> = serde_json::from_value(payload.clone())?;
        self.entries = state
            .into_iter()
            .map(|(key, presence)| (key, refs(presence)))
            .filter(|(_, refs)| !refs.is_empty())
            .collect();
        Ok(())
    }

    pub fn apply_diff(&mut self, payload: &Value) -> serde_json::Result<()> {
        let diff: PresenceDiff = serde_json::from_value(payload.clone())?;

        for (key, presence) in diff.joins {
            let joined = refs(presence);
            if joined.is_empty() {
                continue;
            }
            let known = self.entries.entry(key).or_default();
            for phx_ref in joined {
                if !known.contains(&phx_ref) {
                    known.push(phx_ref);
                }
            }
        }

        for (key, presence) in diff.leaves {
            let left = refs(presence);
            if let Some(known) = self.entries.get_mut(&key) {
                known.retain(|phx_ref| !left.contains(phx_ref));
                if known.is_empty() {
                    self.entries.remove(&key);
                }
            }
        }

        Ok(())
    }

    pub fn online(&self) -> PresenceSet {
        PresenceSet::from_keys(self.entries.keys())
    }
}

fn refs(presence: Presence) -> Vec<String> {
    presence.metas.into_iter().map(|meta| meta.phx_ref).collect()
}
