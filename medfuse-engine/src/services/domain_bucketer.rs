//! Domain Bucketer
//!
//! Groups ranked condition labels into the statically configured clinical
//! domains. Every configured domain appears in the output, empty or not.

use crate::types::RankedCandidate;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Domain name → ranked labels belonging to it, in ranking order
pub type DomainBucketMap = BTreeMap<String, Vec<String>>;

/// Immutable domain → label-set table
#[derive(Debug, Clone)]
pub struct DomainBucketer {
    domains: BTreeMap<String, HashSet<String>>,
}

impl DomainBucketer {
    pub fn new(domains: &BTreeMap<String, Vec<String>>) -> Self {
        let domains = domains
            .iter()
            .map(|(name, labels)| (name.clone(), labels.iter().cloned().collect()))
            .collect();
        Self { domains }
    }

    /// Bucket a ranked list; a label may land in more than one domain
    pub fn bucket(&self, ranked: &[RankedCandidate]) -> DomainBucketMap {
        self.domains
            .iter()
            .map(|(name, members)| {
                let labels = ranked
                    .iter()
                    .filter(|c| members.contains(&c.condition))
                    .map(|c| c.condition.clone())
                    .collect();
                (name.clone(), labels)
            })
            .collect()
    }

    /// Sorted union of every domain's labels
    pub fn allowed_labels(&self) -> BTreeSet<String> {
        self.domains.values().flatten().cloned().collect()
    }
}
