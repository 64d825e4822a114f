use crate::addrs::types::{Address, Offset};
use crate::gossip::types::PeerName;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One token on the ring, delimiting the start of a range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// The start address of this range.
    pub token: Address,
    /// Who owns this range.
    pub peer: PeerName,
    /// Version of this entry; bumped on every change by the owner.
    pub version: u32,
    /// Number of free addresses in this range, as advertised by the owner.
    pub free: Offset,
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} (v{}, free {})",
            self.token, self.peer, self.version, self.free
        )
    }
}

/// The sorted token sequence. Thin wrapper so lookups that wrap around the
/// ring live in one place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entries(pub Vec<Entry>);

impl Entries {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entry> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Entry> {
        self.0.iter_mut()
    }

    /// Index with wrap-around, so `entry(i + 1)` on the last entry yields the
    /// first. Panics on an empty list.
    pub fn entry(&self, i: isize) -> &Entry {
        let n = self.0.len() as isize;
        let mut i = i % n;
        if i < 0 {
            i += n;
        }
        &self.0[i as usize]
    }

    /// Index of the first entry with `token >= target`, i.e. the insertion
    /// point that keeps the list sorted.
    pub fn insertion_point(&self, target: Address) -> usize {
        self.0.partition_point(|e| e.token < target)
    }

    /// The entry with exactly this token, if present.
    pub fn get(&self, token: Address) -> Option<usize> {
        let i = self.insertion_point(token);
        if i < self.0.len() && self.0[i].token == token {
            Some(i)
        } else {
            None
        }
    }

    /// Inserts a new entry. The token must not already be present.
    pub fn insert(&mut self, e: Entry) {
        let i = self.insertion_point(e.token);
        assert!(
            i >= self.0.len() || self.0[i].token != e.token,
            "inserting a token that already exists: {}",
            e.token
        );
        self.0.insert(i, e);
    }
}

impl fmt::Display for Entries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for e in &self.0 {
            writeln!(f, "  {}", e)?;
        }
        Ok(())
    }
}
