//! Key-space construction and fixed-size bucketing.

use rand::Rng;

/// Number of contiguous entries per bucket.
pub const BUCKET_SIZE: usize = 1000;

/// The fixed universe of labels every workload loop operates on.
///
/// The same `value_<n>` labels serve both as point-operation keys and as
/// set members, so one backing vector carries both views; the key and value
/// bucket accessors slice it identically.
#[derive(Debug)]
pub struct KeySpace {
    entries: Vec<String>,
}

impl KeySpace {
    /// Build `count` labels, `value_1` through `value_<count>`.
    pub fn generate(count: usize) -> Self {
        let entries = (0..count).map(|i| format!("value_{}", i + 1)).collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All labels viewed as point-operation keys.
    pub fn keys(&self) -> &[String] {
        &self.entries
    }

    /// All labels viewed as set members.
    pub fn values(&self) -> &[String] {
        &self.entries
    }

    /// Number of complete buckets. A trailing partial bucket is dropped, so
    /// its labels are only reachable through the flat views.
    pub fn bucket_count(&self) -> usize {
        self.entries.len() / BUCKET_SIZE
    }

    /// Keys of bucket `index`, or `None` past the last complete bucket.
    pub fn key_bucket(&self, index: usize) -> Option<&[String]> {
        if index >= self.bucket_count() {
            return None;
        }
        let start = index * BUCKET_SIZE;
        Some(&self.entries[start..start + BUCKET_SIZE])
    }

    /// Set members of bucket `index`; slices identically to `key_bucket`.
    pub fn value_bucket(&self, index: usize) -> Option<&[String]> {
        self.key_bucket(index)
    }

    /// Uniformly random label, or `None` for an empty space.
    pub fn random_key<R: Rng>(&self, rng: &mut R) -> Option<&str> {
        if self.entries.is_empty() {
            return None;
        }
        let index = rng.gen_range(0..self.entries.len());
        Some(&self.entries[index])
    }
}
