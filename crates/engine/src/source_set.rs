//! Source status and the per-bucket source set: which hosts have
//! contributed data to a bucket.

use std::collections::HashMap;

/// The contribution status of one source (host) for a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    /// Not yet heard from.
    Unknown,
    /// Data has been received and merged.
    Available,
    /// Known never to contribute (e.g. decommissioned).
    Unavailable,
    /// Some but not all of this source's data has arrived.
    Partial,
}

impl SourceStatus {
    /// Decode the header's raw `i32` status code.
    pub fn from_i32(code: i32) -> Self {
        match code {
            1 => SourceStatus::Available,
            2 => SourceStatus::Unavailable,
            3 => SourceStatus::Partial,
            _ => SourceStatus::Unknown,
        }
    }

    /// Encode as the header's raw `i32` status code.
    pub fn to_i32(self) -> i32 {
        match self {
            SourceStatus::Unknown => 0,
            SourceStatus::Available => 1,
            SourceStatus::Unavailable => 2,
            SourceStatus::Partial => 3,
        }
    }

    /// Combine two observations of the same source's status. Commutative;
    /// `Partial` is absorbing.
    pub fn combine(self, other: SourceStatus) -> SourceStatus {
        use SourceStatus::*;
        match (self, other) {
            (Partial, _) | (_, Partial) => Partial,
            (Available, Available) => Available,
            (Unavailable, Unavailable) => Unavailable,
            (Unknown, Unknown) => Unknown,
            (Available, Unavailable) | (Unavailable, Available) => Partial,
            (Unknown, other) | (other, Unknown) => other,
        }
    }
}

/// A bucket's `source name -> status` map.
#[derive(Debug, Clone, Default)]
pub struct SourceSet {
    statuses: HashMap<String, SourceStatus>,
}

impl SourceSet {
    /// An empty source set.
    pub fn new() -> Self {
        SourceSet::default()
    }

    /// Record `status` for `name`, combining with any existing entry.
    pub fn set_status(&mut self, name: impl Into<String>, status: SourceStatus) {
        let name = name.into();
        let combined = match self.statuses.get(&name) {
            Some(&existing) => existing.combine(status),
            None => status,
        };
        self.statuses.insert(name, combined);
    }

    /// The status for `name`, or `Unknown` if never recorded.
    pub fn status_of(&self, name: &str) -> SourceStatus {
        self.statuses.get(name).copied().unwrap_or(SourceStatus::Unknown)
    }

    /// Names whose status is `Unknown`.
    pub fn pending_sources(&self) -> Vec<String> {
        self.statuses.iter().filter(|(_, s)| **s == SourceStatus::Unknown).map(|(name, _)| name.clone()).collect()
    }

    /// Number of sources with `Unknown` status.
    pub fn pending_count(&self) -> usize {
        self.statuses.values().filter(|s| **s == SourceStatus::Unknown).count()
    }

    /// Merge another source set's entries into this one (used when
    /// combining sibling buckets during compaction).
    pub fn merge_from(&mut self, other: &SourceSet) {
        for (name, status) in other.statuses.iter() {
            self.set_status(name.clone(), *status);
        }
    }

    /// All entries as `(name, status)` pairs, for header serialization.
    pub fn entries(&self) -> impl Iterator<Item = (&str, SourceStatus)> {
        self.statuses.iter().map(|(n, s)| (n.as_str(), *s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SourceStatus::*;

    #[test]
    fn combine_is_commutative() {
        let pairs = [
            (Unknown, Available),
            (Available, Unavailable),
            (Partial, Available),
            (Unavailable, Unavailable),
        ];
        for (a, b) in pairs {
            assert_eq!(a.combine(b), b.combine(a));
        }
    }

    #[test]
    fn partial_is_absorbing() {
        for s in [Unknown, Available, Unavailable, Partial] {
            assert_eq!(Partial.combine(s), Partial);
            assert_eq!(s.combine(Partial), Partial);
        }
    }

    #[test]
    fn pending_sources_tracks_unknowns() {
        let mut set = SourceSet::new();
        set.set_status("host-a", Unknown);
        set.set_status("host-b", Available);
        assert_eq!(set.pending_sources(), vec!["host-a".to_string()]);
    }

    #[test]
    fn set_status_combines_with_existing() {
        let mut set = SourceSet::new();
        set.set_status("host-a", Available);
        set.set_status("host-a", Unavailable);
        assert_eq!(set.status_of("host-a"), Partial);
    }
}
