//! Weighted consistent-hash ring over instance names.

use std::hash::Hasher;

use twox_hash::XxHash64;

/// Ring points per unit of weight.
pub const VIRTUAL_NODES: usize = 64;

#[derive(Debug, Clone, Default)]
pub struct HashRing {
    points: Vec<(u64, String)>,
}

impl HashRing {
    /// Builds the ring from `(name, weight)` pairs. Weights `<= 0` count as 1.
    /// Input order does not matter: the same set always yields the same ring.
    pub fn new<I, S>(nodes: I) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        let mut points = Vec::new();
        for (name, weight) in nodes {
            let name = name.into();
            let replicas = usize::try_from(weight.max(1)).unwrap_or(1) * VIRTUAL_NODES;
            for i in 0..replicas {
                points.push((hash_key(&format!("{name}#{i}")), name.clone()));
            }
        }
        points.sort();
        Self { points }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Owner of `key`: the first point clockwise from the key's hash.
    pub fn locate(&self, key: &str) -> Option<&str> {
        if self.points.is_empty() {
            return None;
        }
        let h = hash_key(key);
        let at = self.points.partition_point(|(point, _)| *point < h);
        let (_, name) = &self.points[at % self.points.len()];
        Some(name.as_str())
    }
}

fn hash_key(key: &str) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(key.as_bytes());
    hasher.finish()
}
