//! Partitions for window function evaluation.
//!
//! A partition holds the rows sharing a PARTITION BY key in query order,
//! each carrying its serialized ORDER BY key for tie detection.

use std::collections::HashMap;

/// One row's membership in a partition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartitionItem {
    /// Serialized ORDER BY comparison key; rows with equal keys tie.
    pub order_key: String,
    pub record_index: usize,
}

/// Ordered rows of one partition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partition {
    items: Vec<PartitionItem>,
}

impl Partition {
    pub fn push(&mut self, item: PartitionItem) {
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[PartitionItem] {
        &self.items
    }

    /// The partition with item order reversed, for functions that walk
    /// from the end (LAST_VALUE, LEAD).
    pub fn reversed(&self) -> Partition {
        let mut items = self.items.clone();
        items.reverse();
        Partition { items }
    }

    /// Record indices grouped by runs of equal order keys, in order.
    /// Rows with equal keys form one tie group.
    pub fn tie_groups(&self) -> Vec<Vec<usize>> {
        let mut groups: Vec<Vec<usize>> = Vec::new();
        let mut current_key: Option<&str> = None;
        for item in &self.items {
            if current_key != Some(item.order_key.as_str()) {
                groups.push(vec![item.record_index]);
                current_key = Some(item.order_key.as_str());
            } else if let Some(group) = groups.last_mut() {
                group.push(item.record_index);
            }
        }
        groups
    }
}

impl<'a> IntoIterator for &'a Partition {
    type Item = &'a PartitionItem;
    type IntoIter = std::slice::Iter<'a, PartitionItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl FromIterator<PartitionItem> for Partition {
    fn from_iter<T: IntoIterator<Item = PartitionItem>>(iter: T) -> Self {
        Partition {
            items: iter.into_iter().collect(),
        }
    }
}

/// Partitions keyed by serialized PARTITION BY key, with first-appearance
/// order preserved for deterministic evaluation scheduling.
#[derive(Debug, Default)]
pub struct PartitionList {
    partitions: HashMap<String, Partition>,
    keys: Vec<String>,
}

impl PartitionList {
    pub fn append(&mut self, key: String, item: PartitionItem) {
        match self.partitions.get_mut(&key) {
            Some(partition) => partition.push(item),
            None => {
                let mut partition = Partition::default();
                partition.push(item);
                self.partitions.insert(key.clone(), partition);
                self.keys.push(key);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Partitions in first-appearance order.
    pub fn ordered(&self) -> impl Iterator<Item = &Partition> {
        self.keys.iter().filter_map(|k| self.partitions.get(k))
    }

    pub fn get(&self, index: usize) -> Option<&Partition> {
        self.keys.get(index).and_then(|k| self.partitions.get(k))
    }
}
