//! Label selectors.
//!
//! Two forms are used:
//! - a single `key=value` pair selecting services (the operator's filter)
//! - a comma-separated list of pairs selecting hosts (a service's host
//!   affinity label value)

use std::fmt;
use std::str::FromStr;

use crate::error::LabelError;
use crate::model::Labels;

/// An exact `key=value` label match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelPair {
    pub key: String,
    pub value: String,
}

impl LabelPair {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Returns true if `labels` contains this exact pair.
    pub fn matches(&self, labels: &Labels) -> bool {
        labels.get(&self.key) == Some(&self.value)
    }
}

impl FromStr for LabelPair {
    type Err = LabelError;

    /// Parse `key=value`, splitting on the first `=`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, value) = s
            .split_once('=')
            .ok_or_else(|| LabelError::MissingSeparator(s.to_string()))?;

        let key = key.trim();
        if key.is_empty() {
            return Err(LabelError::EmptyKey(s.to_string()));
        }

        Ok(Self::new(key, value.trim()))
    }
}

impl fmt::Display for LabelPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Host selector derived from a service's affinity label value.
///
/// A host matches when it carries every pair. A selector with no pairs
/// matches nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSelector {
    pairs: Vec<LabelPair>,
}

impl HostSelector {
    /// Parse an affinity value such as `role=web,zone=a`.
    ///
    /// Malformed segments are dropped rather than rejected: the value comes
    /// from a service definition the rebalancer does not own.
    pub fn parse(value: &str) -> Self {
        let pairs = value
            .split(',')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .filter_map(|segment| segment.parse().ok())
            .collect();

        Self { pairs }
    }

    pub fn pairs(&self) -> &[LabelPair] {
        &self.pairs
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn matches(&self, labels: &Labels) -> bool {
        !self.pairs.is_empty() && self.pairs.iter().all(|pair| pair.matches(labels))
    }
}

impl fmt::Display for HostSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.pairs.iter().map(ToString::to_string).collect();
        write!(f, "{}", rendered.join(","))
    }
}
