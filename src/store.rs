//! Persisted relay state: source→targets pairs, filter words, admins,
//! the forwarding toggle and delivery stats.
//!
//! The JSON document on disk is the source of truth: every mutating
//! operation writes the file back before reporting success.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// How long delivery stats are kept before being pruned on append.
const STATS_HORIZON_MS: i64 = 24 * 60 * 60 * 1000;

/// Errors that can occur reading or writing the state document.
#[derive(Debug)]
pub enum StoreError {
    /// Failed to read the state file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Failed to write the state file.
    WriteFile { path: PathBuf, source: std::io::Error },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read state file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse state file '{}': {}", path.display(), source)
            }
            Self::WriteFile { path, source } => {
                write!(f, "failed to write state file '{}': {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::WriteFile { source, .. } => Some(source),
        }
    }
}

/// One source chat mapped to its relay targets. Targets are deduplicated
/// and keep insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pair {
    pub source: i64,
    #[serde(default)]
    pub targets: Vec<i64>,
}

/// One successful per-target delivery, for the rolling stats report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatRecord {
    pub source: i64,
    pub target: i64,
    /// Unix timestamp, milliseconds.
    pub time: i64,
}

/// The full persisted document. Every field is defensively defaulted so a
/// hand-edited or older file still loads.
#[derive(Debug, Serialize, Deserialize)]
pub struct RelayState {
    #[serde(default)]
    pub pairs: Vec<Pair>,
    #[serde(default = "default_filters")]
    pub filters: Vec<String>,
    #[serde(default)]
    pub admins: Vec<i64>,
    #[serde(default = "default_forwarding")]
    pub forwarding_enabled: bool,
    #[serde(default)]
    pub stats: Vec<StatRecord>,
}

impl Default for RelayState {
    fn default() -> Self {
        Self {
            pairs: Vec::new(),
            filters: default_filters(),
            admins: Vec::new(),
            forwarding_enabled: true,
            stats: Vec::new(),
        }
    }
}

fn default_filters() -> Vec<String> {
    ["цена", "срочно", "без посредников", "торг", "недорого"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn default_forwarding() -> bool {
    true
}

#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    state: RelayState,
}

impl Store {
    /// Loads the state document, creating it with defaults if absent.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| StoreError::ReadFile { path: path.clone(), source: e })?;
            serde_json::from_str(&content)
                .map_err(|e| StoreError::ParseJson { path: path.clone(), source: e })?
        } else {
            RelayState::default()
        };
        let store = Self { path, state };
        store.save()?;
        Ok(store)
    }

    fn save(&self) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(&self.state)
            .expect("relay state serializes to JSON");
        std::fs::write(&self.path, json)
            .map_err(|e| StoreError::WriteFile { path: self.path.clone(), source: e })
    }

    pub fn lookup(&self, source: i64) -> Option<&Pair> {
        self.state.pairs.iter().find(|p| p.source == source)
    }

    pub fn pairs(&self) -> &[Pair] {
        &self.state.pairs
    }

    /// Creates the pair if absent, otherwise unions `targets` into the
    /// existing set. Duplicates are skipped; new targets keep their order.
    pub fn upsert_targets(&mut self, source: i64, targets: &[i64]) -> Result<(), StoreError> {
        match self.state.pairs.iter_mut().find(|p| p.source == source) {
            Some(pair) => {
                for &t in targets {
                    if !pair.targets.contains(&t) {
                        pair.targets.push(t);
                    }
                }
            }
            None => {
                let mut deduped = Vec::new();
                for &t in targets {
                    if !deduped.contains(&t) {
                        deduped.push(t);
                    }
                }
                self.state.pairs.push(Pair { source, targets: deduped });
            }
        }
        self.save()
    }

    /// Removes one target; the pair itself is deleted when its set empties.
    /// Returns whether the target existed.
    pub fn remove_target(&mut self, source: i64, target: i64) -> Result<bool, StoreError> {
        let Some(pair) = self.state.pairs.iter_mut().find(|p| p.source == source) else {
            return Ok(false);
        };
        let before = pair.targets.len();
        pair.targets.retain(|&t| t != target);
        let removed = pair.targets.len() != before;
        if pair.targets.is_empty() {
            self.state.pairs.retain(|p| p.source != source);
        }
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    /// Deletes a pair unconditionally. Returns whether it existed.
    pub fn remove_pair(&mut self, source: i64) -> Result<bool, StoreError> {
        let before = self.state.pairs.len();
        self.state.pairs.retain(|p| p.source != source);
        let removed = self.state.pairs.len() != before;
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    pub fn filters(&self) -> &[String] {
        &self.state.filters
    }

    /// Adds a filter word (stored lowercase). Returns false if already present.
    pub fn add_filter(&mut self, word: &str) -> Result<bool, StoreError> {
        let word = word.trim().to_lowercase();
        if word.is_empty() || self.state.filters.contains(&word) {
            return Ok(false);
        }
        self.state.filters.push(word);
        self.save()?;
        Ok(true)
    }

    /// Removes a filter word. Returns whether it existed.
    pub fn remove_filter(&mut self, word: &str) -> Result<bool, StoreError> {
        let word = word.trim().to_lowercase();
        let before = self.state.filters.len();
        self.state.filters.retain(|w| w != &word);
        let removed = self.state.filters.len() != before;
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.state.admins.contains(&user_id)
    }

    /// Merges bootstrap admin ids from the config into the persisted list.
    pub fn ensure_admins(&mut self, ids: &[i64]) -> Result<(), StoreError> {
        let mut changed = false;
        for &id in ids {
            if !self.state.admins.contains(&id) {
                self.state.admins.push(id);
                changed = true;
            }
        }
        if changed {
            self.save()?;
        }
        Ok(())
    }

    pub fn forwarding_enabled(&self) -> bool {
        self.state.forwarding_enabled
    }

    pub fn set_forwarding(&mut self, enabled: bool) -> Result<(), StoreError> {
        self.state.forwarding_enabled = enabled;
        self.save()
    }

    /// Appends one successful delivery and prunes records older than the
    /// retention horizon.
    pub fn record_delivery(&mut self, source: i64, target: i64, now_ms: i64) -> Result<(), StoreError> {
        let cutoff = now_ms - STATS_HORIZON_MS;
        self.state.stats.retain(|s| s.time >= cutoff);
        self.state.stats.push(StatRecord { source, target, time: now_ms });
        self.save()
    }

    /// All deliveries at or after `cutoff_ms`, in append order.
    pub fn deliveries_since(&self, cutoff_ms: i64) -> Vec<StatRecord> {
        self.state
            .stats
            .iter()
            .filter(|s| s.time >= cutoff_ms)
            .cloned()
            .collect()
    }
}
