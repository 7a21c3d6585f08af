use crate::{OperationType, SchedulerError};
use serde::de;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// One partial reconfiguration bitstream variant of an operation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PRModule {
    /// Capacity per dimension of the operation (e.g. comparators, buffer size).
    pub capacity: Vec<i64>,
    /// Columns the bitstream may start at.
    pub locations: Vec<usize>,
    /// Number of columns occupied.
    pub length: usize,
    /// Column type letters the bitstream covers.
    #[serde(default)]
    pub resource_string: String,
    /// Placement direction flag of the fabric floorplan.
    #[serde(default)]
    pub is_backwards: bool,
}

/// All bitstreams of one operation, indexed by start column.
#[derive(Clone, Debug, PartialEq)]
pub struct OperationPRModules {
    /// Bitstream name to module.
    pub bitstreams: BTreeMap<String, PRModule>,
    /// For every column the names of the bitstreams that can start there.
    pub start_locations: Vec<Vec<String>>,
}

impl OperationPRModules {
    /// Builds the per column start location index.
    ///
    /// # Arguments
    ///
    /// * `bitstreams` - Bitstreams of the operation.
    /// * `column_count` - Number of columns on the fabric.
    pub fn new(
        bitstreams: BTreeMap<String, PRModule>,
        column_count: usize,
    ) -> Result<Self, SchedulerError> {
        let mut start_locations = vec![Vec::new(); column_count];
        for (name, module) in bitstreams.iter() {
            for location in &module.locations {
                match start_locations.get_mut(*location) {
                    Some(names) => names.push(name.clone()),
                    None => {
                        return Err(SchedulerError::ValidationError(format!(
                            "Bitstream {} starts at column {} of {} columns",
                            name, location, column_count
                        )))
                    }
                }
            }
        }
        for names in start_locations.iter_mut() {
            names.sort();
        }
        Ok(OperationPRModules {
            bitstreams,
            start_locations,
        })
    }
}

/// Catalog of every PR bitstream available on the fabric.
#[derive(Clone, Debug, PartialEq)]
pub struct HwLibrary {
    column_count: usize,
    operations: BTreeMap<OperationType, OperationPRModules>,
}

#[derive(Serialize, Deserialize)]
struct RawHwLibrary {
    column_count: usize,
    operations: BTreeMap<OperationType, BTreeMap<String, PRModule>>,
}

impl Serialize for HwLibrary {
    /// Custom serialize to avoid serializing the start location index.
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let raw = RawHwLibrary {
            column_count: self.column_count,
            operations: self
                .operations
                .iter()
                .map(|(op, modules)| (*op, modules.bitstreams.clone()))
                .collect(),
        };
        raw.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for HwLibrary {
    /// Custom deserialize to rebuild the start location index.
    fn deserialize<D>(deserializer: D) -> Result<HwLibrary, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = RawHwLibrary::deserialize(deserializer)?;
        HwLibrary::new(raw.column_count, raw.operations).map_err(de::Error::custom)
    }
}

impl HwLibrary {
    /// Creates a catalog and checks every bitstream fits on the fabric.
    ///
    /// Capacities have to be positive, merge sorters have to merge at least two runs.
    ///
    /// # Arguments
    ///
    /// * `column_count` - Number of columns on the fabric.
    /// * `operations` - Bitstreams per operation.
    pub fn new(
        column_count: usize,
        operations: BTreeMap<OperationType, BTreeMap<String, PRModule>>,
    ) -> Result<Self, SchedulerError> {
        for (op, bitstreams) in operations.iter() {
            for (name, module) in bitstreams.iter() {
                if module.length == 0 {
                    return Err(SchedulerError::ValidationError(format!(
                        "Bitstream {} of {} has no columns",
                        name, op
                    )));
                }
                if module.capacity.iter().any(|c| *c <= 0) {
                    return Err(SchedulerError::ValidationError(format!(
                        "Bitstream {} of {} has capacity {:?}",
                        name, op, module.capacity
                    )));
                }
                if *op == OperationType::MergeSort && module.capacity.iter().any(|c| *c < 2) {
                    return Err(SchedulerError::ValidationError(format!(
                        "Merge sorter {} needs a capacity of at least 2",
                        name
                    )));
                }
                if let Some(location) = module
                    .locations
                    .iter()
                    .find(|l| **l + module.length > column_count)
                {
                    return Err(SchedulerError::ValidationError(format!(
                        "Bitstream {} of {} at column {} does not fit {} columns",
                        name, op, location, column_count
                    )));
                }
            }
        }
        let operations = operations
            .into_iter()
            .map(|(op, bitstreams)| Ok((op, OperationPRModules::new(bitstreams, column_count)?)))
            .collect::<Result<BTreeMap<_, _>, SchedulerError>>()?;
        Ok(HwLibrary {
            column_count,
            operations,
        })
    }

    /// Reads a catalog from its json representation.
    pub fn from_json(json: &str) -> Result<Self, SchedulerError> {
        serde_json::from_str(json)
            .map_err(|e| SchedulerError::ValidationError(format!("Malformed PR library: {}", e)))
    }

    pub fn column_count(&self) -> usize {
        self.column_count
    }

    /// Returns the bitstreams of an operation if the fabric supports it.
    pub fn get_operation(&self, op: OperationType) -> Option<&OperationPRModules> {
        self.operations.get(&op)
    }

    /// Returns a bitstream by operation and name.
    pub fn get_bitstream(&self, op: OperationType, bitstream: &str) -> Option<&PRModule> {
        self.operations
            .get(&op)
            .and_then(|modules| modules.bitstreams.get(bitstream))
    }

    /// Start location index of an operation, empty if the operation is unknown.
    pub fn start_locations(&self, op: OperationType) -> &[Vec<String>] {
        match self.operations.get(&op) {
            Some(modules) => &modules.start_locations,
            None => &[],
        }
    }

    /// Smallest capacity over the bitstreams of an operation.
    ///
    /// A bitstream replaces the current minimum only if it is not larger in any dimension.
    pub fn min_capacity(&self, op: OperationType) -> Result<Vec<i64>, SchedulerError> {
        let modules = self.operations.get(&op).ok_or_else(|| {
            SchedulerError::UnschedulableError(format!("No bitstreams for {}", op))
        })?;
        let mut min_capacity: Option<&Vec<i64>> = None;
        for module in modules.bitstreams.values() {
            min_capacity = match min_capacity {
                None => Some(&module.capacity),
                Some(current) => {
                    if current.len() == module.capacity.len()
                        && module
                            .capacity
                            .iter()
                            .zip(current.iter())
                            .all(|(new, old)| new <= old)
                    {
                        Some(&module.capacity)
                    } else {
                        Some(current)
                    }
                }
            };
        }
        min_capacity
            .cloned()
            .ok_or_else(|| SchedulerError::UnschedulableError(format!("No bitstreams for {}", op)))
    }
}
