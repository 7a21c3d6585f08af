use crate::{OperationType, SortedStatus};
use std::fmt;

/// One placement decision: a bitstream of a node's operation on a column range.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ScheduledModule {
    pub node_name: String,
    pub operation: OperationType,
    pub bitstream: String,
    /// First and last occupied column.
    pub position: (usize, usize),
    /// Sorted status of the processed table when the module got placed.
    pub processed_table_data: SortedStatus,
    /// Record count of the processed table when the module got placed.
    pub table_data_size: i64,
}

impl ScheduledModule {
    pub fn new(
        node_name: &str,
        operation: OperationType,
        bitstream: &str,
        position: (usize, usize),
    ) -> Self {
        ScheduledModule {
            node_name: node_name.to_string(),
            operation,
            bitstream: bitstream.to_string(),
            position,
            processed_table_data: SortedStatus::Unsorted,
            table_data_size: 0,
        }
    }

    pub fn start(&self) -> usize {
        self.position.0
    }

    pub fn end(&self) -> usize {
        self.position.1
    }

    /// Returns true if both modules occupy at least one common column.
    pub fn overlaps(&self, other: &ScheduledModule) -> bool {
        self.start() <= other.end() && other.start() <= self.end()
    }

    /// Returns true if the same hardware sits on the same columns, whatever node it serves.
    pub fn is_same_placement(&self, other: &ScheduledModule) -> bool {
        self.operation == other.operation
            && self.bitstream == other.bitstream
            && self.position == other.position
    }
}

impl fmt::Display for ScheduledModule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}: {} {} [{}, {}]",
            self.node_name,
            self.operation,
            self.bitstream,
            self.start(),
            self.end()
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_overlaps() {
        let a = ScheduledModule::new("a", OperationType::Filter, "f", (0, 1));
        let b = ScheduledModule::new("b", OperationType::Filter, "f", (1, 2));
        let c = ScheduledModule::new("c", OperationType::Filter, "f", (3, 3));
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_same_placement() {
        let a = ScheduledModule::new("a", OperationType::Filter, "f", (0, 0));
        let mut b = ScheduledModule::new("b", OperationType::Filter, "f", (0, 0));
        b.table_data_size = 10;
        assert!(a.is_same_placement(&b));
        assert_ne!(a, b);
        let c = ScheduledModule::new("a", OperationType::Filter, "g", (0, 0));
        assert!(!a.is_same_placement(&c));
    }
}
