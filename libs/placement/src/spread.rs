//! Per-host replica spread.

use std::collections::HashMap;

use crate::model::Replica;

/// Replicas of one service on one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpreadEntry {
    pub host_id: String,
    pub hostname: String,
    /// Replica ids on this host, in the order they were observed.
    pub replica_ids: Vec<String>,
}

impl SpreadEntry {
    /// Number of replicas on this host.
    pub fn count(&self) -> usize {
        self.replica_ids.len()
    }
}

/// Distribution of a service's replicas across hosts.
///
/// Entries are kept in first-seen order; hosts without replicas of the
/// service never appear.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Spread {
    entries: Vec<SpreadEntry>,
    index: HashMap<String, usize>,
}

impl Spread {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a spread from resolved replicas.
    ///
    /// Replicas without an owning host are skipped.
    pub fn from_replicas<'a, I>(replicas: I) -> Self
    where
        I: IntoIterator<Item = &'a Replica>,
    {
        let mut spread = Self::new();
        for replica in replicas {
            if let Some(host_id) = replica.host_id.as_deref() {
                let hostname = replica.hostname.as_deref().unwrap_or(host_id);
                spread.record(&replica.id, host_id, hostname);
            }
        }
        spread
    }

    /// Record one replica on a host.
    pub fn record(&mut self, replica_id: &str, host_id: &str, hostname: &str) {
        match self.index.get(host_id) {
            Some(&position) => self.entries[position]
                .replica_ids
                .push(replica_id.to_string()),
            None => {
                self.index.insert(host_id.to_string(), self.entries.len());
                self.entries.push(SpreadEntry {
                    host_id: host_id.to_string(),
                    hostname: hostname.to_string(),
                    replica_ids: vec![replica_id.to_string()],
                });
            }
        }
    }

    pub fn entries(&self) -> &[SpreadEntry] {
        &self.entries
    }

    /// Number of distinct hosts holding at least one replica.
    pub fn host_count(&self) -> usize {
        self.entries.len()
    }

    /// Total replicas across all hosts.
    pub fn replica_count(&self) -> usize {
        self.entries.iter().map(SpreadEntry::count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
