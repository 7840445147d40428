//! Records of training metrics.
use std::collections::{hash_map::Iter, HashMap};

/// Represents a value in a [`Record`].
#[derive(Debug, Clone)]
pub enum RecordValue {
    /// A single floating-point value, typically a metric like loss or return.
    Scalar(f32),

    /// A text value.
    String(String),
}

/// A set of named metric values produced during training.
///
/// Components return a [`Record`] from their update methods and the trainer
/// aggregates and logs them at fixed intervals.
#[derive(Debug)]
pub struct Record(HashMap<String, RecordValue>);

impl Record {
    /// Creates a record containing a single scalar value.
    pub fn from_scalar(name: impl Into<String>, value: f32) -> Self {
        Self(HashMap::from([(name.into(), RecordValue::Scalar(value))]))
    }

    /// Creates a record from a slice of key-value pairs.
    pub fn from_slice<K: Into<String> + Clone>(s: &[(K, RecordValue)]) -> Self {
        Self(
            s.iter()
                .map(|(k, v)| (k.clone().into(), v.clone()))
                .collect(),
        )
    }

    /// Inserts a value.
    pub fn insert(&mut self, k: impl Into<String>, v: RecordValue) {
        self.0.insert(k.into(), v);
    }

    /// Returns an iterator over the entries.
    pub fn iter(&self) -> Iter<'_, String, RecordValue> {
        self.0.iter()
    }

    /// Merges two records, the entries of `other` taking precedence.
    pub fn merge(mut self, other: Record) -> Self {
        self.0.extend(other.0);
        self
    }

    /// Returns a scalar value if the key holds one.
    pub fn get_scalar(&self, k: &str) -> Option<f32> {
        match self.0.get(k) {
            Some(RecordValue::Scalar(v)) => Some(*v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_overwrites_and_extends() {
        let r1 = Record::from_scalar("loss", 1.0);
        let mut r2 = Record::from_scalar("loss", 0.5);
        r2.insert("return", RecordValue::Scalar(3.0));
        let merged = r1.merge(r2);
        assert_eq!(merged.get_scalar("loss"), Some(0.5));
        assert_eq!(merged.get_scalar("return"), Some(3.0));
    }
}
