//! Row type - a positional tuple of datums

use std::hash::{Hash, Hasher};

use super::datum::Datum;

/// A row of datums, positionally matching a table's columns
#[derive(Debug, Clone, Default)]
pub struct Row {
    values: Vec<Datum>,
}

impl Row {
    /// Create a new row with the given values
    pub fn new(values: Vec<Datum>) -> Self {
        Row { values }
    }

    /// Get the number of columns in this row
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row is empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a datum by index, returns None if out of bounds
    pub fn get(&self, index: usize) -> Option<&Datum> {
        self.values.get(index)
    }

    /// Get all values as a slice
    pub fn values(&self) -> &[Datum] {
        &self.values
    }

    /// Create an iterator over the datums
    pub fn iter(&self) -> impl Iterator<Item = &Datum> {
        self.values.iter()
    }
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

impl Eq for Row {}

impl Hash for Row {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for datum in &self.values {
            datum.hash(state);
        }
    }
}
