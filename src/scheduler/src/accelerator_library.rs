use common::{
    OperationType, SchedulerError, SchedulingNode, SortedStatus, TableMetadata, Tables,
};
use std::collections::BTreeMap;

/// Properties attached to an operation that drive its scheduling rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decorator {
    /// Several modules can share the work of one node.
    Composable,
    /// Output can be smaller than the input.
    Reducing,
    /// Work is measured by the sorted state of the input table.
    Sorting,
    /// Sorts chunks of the module capacity in one pass.
    PartialSort,
    /// Merges sorted runs, needs the whole input before producing output.
    BlockingSort,
    /// Has to be the first module of the pipeline.
    FirstModule,
    /// Inputs have to be sorted.
    SortedInput,
    /// Output is the largest input.
    LargestInputIsOutput,
}

/// Operation specific knowledge the scheduler asks for.
pub trait AcceleratorLibrary {
    fn is_constrained_to_first_in_pipeline(&self, operation: OperationType) -> bool;

    fn is_operation_sorting(&self, operation: OperationType) -> bool;

    /// True if a node of the operation can be split over several modules.
    fn is_resource_elastic(&self, operation: OperationType) -> bool;

    fn is_reducing(&self, operation: OperationType) -> bool;

    /// True if the operation needs the real size of its input before it can be placed.
    fn is_data_sensitive(&self, operation: OperationType) -> bool;

    /// Smallest module capacity that fully processes the node in one go.
    fn get_min_requirements(
        &self,
        node: &SchedulingNode,
        tables: &Tables,
    ) -> Result<Vec<i64>, SchedulerError>;

    /// Adds the tables the node outputs if the smallest module gets used and returns their names.
    fn get_worst_case_processed_tables(
        &self,
        operation: OperationType,
        min_capacity: &[i64],
        input_tables: &[String],
        tables: &mut Tables,
    ) -> Result<Vec<String>, SchedulerError>;

    /// Applies one module of a sorting operation to its input table.
    ///
    /// Returns true if the node is fully processed.
    fn update_data_table(
        &self,
        operation: OperationType,
        capacity: &[i64],
        input_tables: &[String],
        tables: &mut Tables,
    ) -> Result<bool, SchedulerError>;

    /// Output tables of a fully processed node.
    fn get_resulting_tables(
        &self,
        operation: OperationType,
        input_tables: &[String],
        tables: &Tables,
    ) -> Result<Vec<String>, SchedulerError>;
}

/// Library for the operations of the stock fabric.
pub struct DefaultAcceleratorLibrary {
    decorators: BTreeMap<OperationType, Vec<Decorator>>,
}

impl Default for DefaultAcceleratorLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultAcceleratorLibrary {
    pub fn new() -> Self {
        let mut decorators = BTreeMap::new();
        for op in OperationType::all().iter() {
            let list = match op {
                OperationType::Filter => vec![Decorator::Composable, Decorator::Reducing],
                OperationType::LinearSort => vec![Decorator::Sorting, Decorator::PartialSort],
                OperationType::MergeSort => vec![
                    Decorator::Composable,
                    Decorator::BlockingSort,
                    Decorator::Sorting,
                    Decorator::FirstModule,
                ],
                OperationType::Join => vec![
                    Decorator::SortedInput,
                    Decorator::LargestInputIsOutput,
                    Decorator::Reducing,
                ],
                _ => vec![],
            };
            decorators.insert(*op, list);
        }
        Self { decorators }
    }

    /// Library with custom decorators, operations left out have none.
    pub fn with_decorators(decorators: BTreeMap<OperationType, Vec<Decorator>>) -> Self {
        Self { decorators }
    }

    fn has(&self, operation: OperationType, decorator: Decorator) -> bool {
        self.decorators
            .get(&operation)
            .map_or(false, |list| list.contains(&decorator))
    }

    fn single_sort_input<'a>(
        operation: OperationType,
        capacity: &[i64],
        input_tables: &'a [String],
    ) -> Result<&'a String, SchedulerError> {
        if input_tables.len() != 1 {
            return Err(SchedulerError::SchedulerError(format!(
                "{} sorts exactly one table, got {}",
                operation,
                input_tables.len()
            )));
        }
        if capacity.len() != 1 {
            return Err(SchedulerError::SchedulerError(format!(
                "{} needs one capacity value, got {:?}",
                operation, capacity
            )));
        }
        Ok(&input_tables[0])
    }

    fn largest_table(input_tables: &[String], tables: &Tables) -> Result<String, SchedulerError> {
        let mut max_table = String::new();
        let mut max_size = 0;
        for name in input_tables {
            let current = table(tables, name)?;
            if current.record_count >= max_size {
                max_table = name.clone();
                max_size = current.record_count;
            }
        }
        Ok(max_table)
    }
}

fn table<'a>(tables: &'a Tables, name: &str) -> Result<&'a TableMetadata, SchedulerError> {
    common::require(tables.get(name), &format!("Table {}", name))
}

/// Sorted status a linear sorter of the given capacity leaves behind.
pub fn linear_sorter_status(capacity: i64, record_count: i64) -> SortedStatus {
    if record_count <= capacity {
        SortedStatus::FullySorted(record_count)
    } else {
        SortedStatus::Sequences {
            start_offset: 0,
            sequence_count: (record_count + capacity - 1) / capacity - 1,
            sequence_length: capacity,
            stride: 1,
        }
    }
}

/// Applies one merge pass of the given capacity.
///
/// Returns true if the table ends up fully sorted.
pub fn merge_pass(capacity: i64, table: &mut TableMetadata) -> Result<bool, SchedulerError> {
    if table.is_sorted() {
        return Err(SchedulerError::SchedulerError(String::from(
            "Table is sorted already",
        )));
    }
    let (start_offset, sequence_count, sequence_length, stride) = match table.sorted_status {
        SortedStatus::Sequences {
            start_offset,
            sequence_count,
            sequence_length,
            stride,
        } => (start_offset, sequence_count, sequence_length, stride),
        _ => (0, table.record_count - 1, 1, 1),
    };
    if capacity >= sequence_count + 1 {
        table.sorted_status = SortedStatus::FullySorted(table.record_count);
        return Ok(true);
    }
    if capacity < 2 {
        return Err(SchedulerError::SchedulerError(format!(
            "Merge sort capacity {} can't merge sequences",
            capacity
        )));
    }
    table.sorted_status = SortedStatus::Sequences {
        start_offset: start_offset + (capacity - 1) * sequence_length,
        sequence_count: sequence_count - (capacity - 1),
        sequence_length,
        stride,
    };
    Ok(false)
}

/// Compares a module capacity with the outstanding node requirement.
///
/// Returns if the module covers every dimension and the requirement left per dimension.
pub fn find_missing_utility(
    bitstream_capacity: &[i64],
    node_cost: &[i64],
) -> Result<(bool, Vec<i64>), SchedulerError> {
    if bitstream_capacity.len() != node_cost.len() {
        return Err(SchedulerError::SchedulerError(format!(
            "Capacity parameters {:?} don't match requirement {:?}",
            bitstream_capacity, node_cost
        )));
    }
    let missing: Vec<i64> = node_cost
        .iter()
        .zip(bitstream_capacity.iter())
        .map(|(cost, cap)| cost - cap)
        .collect();
    let satisfied = missing.iter().all(|m| *m <= 0);
    Ok((satisfied, missing))
}

impl AcceleratorLibrary for DefaultAcceleratorLibrary {
    fn is_constrained_to_first_in_pipeline(&self, operation: OperationType) -> bool {
        self.has(operation, Decorator::FirstModule)
    }

    fn is_operation_sorting(&self, operation: OperationType) -> bool {
        self.has(operation, Decorator::Sorting)
    }

    fn is_resource_elastic(&self, operation: OperationType) -> bool {
        self.has(operation, Decorator::Composable) || self.has(operation, Decorator::Sorting)
    }

    fn is_reducing(&self, operation: OperationType) -> bool {
        self.has(operation, Decorator::Reducing)
    }

    fn is_data_sensitive(&self, operation: OperationType) -> bool {
        self.has(operation, Decorator::BlockingSort)
    }

    fn get_min_requirements(
        &self,
        node: &SchedulingNode,
        tables: &Tables,
    ) -> Result<Vec<i64>, SchedulerError> {
        if !self.has(node.operation, Decorator::Sorting) {
            return Ok(node.capacity.clone());
        }
        if node.data_tables.len() != 1 {
            return Err(SchedulerError::SchedulerError(format!(
                "{} sorts exactly one table",
                node.operation
            )));
        }
        let input = table(tables, &node.data_tables[0])?;
        if self.has(node.operation, Decorator::PartialSort) {
            return Ok(vec![input.record_count]);
        }
        if input.is_sorted() {
            return Ok(vec![0]);
        }
        match input.sorted_status {
            SortedStatus::Sequences { sequence_count, .. } => Ok(vec![sequence_count + 1]),
            _ => Ok(vec![input.record_count]),
        }
    }

    fn get_worst_case_processed_tables(
        &self,
        operation: OperationType,
        min_capacity: &[i64],
        input_tables: &[String],
        tables: &mut Tables,
    ) -> Result<Vec<String>, SchedulerError> {
        if input_tables.is_empty() {
            return Err(SchedulerError::SchedulerError(String::from(
                "No input data found",
            )));
        }
        if self.has(operation, Decorator::PartialSort) {
            let capacity = *common::require(min_capacity.first(), "Linear sort capacity")?;
            let mut resulting_tables = Vec::new();
            for name in input_tables {
                let mut new_table = table(tables, name)?.clone();
                new_table.sorted_status = linear_sorter_status(capacity, new_table.record_count);
                let new_name = if new_table.is_sorted() {
                    format!("{}_fully_sorted", name)
                } else {
                    format!("{}_half_sorted", name)
                };
                tables.insert(new_name.clone(), new_table);
                resulting_tables.push(new_name);
            }
            Ok(resulting_tables)
        } else if self.has(operation, Decorator::BlockingSort) {
            let mut resulting_tables = Vec::new();
            for name in input_tables {
                let current = table(tables, name)?;
                if current.is_sorted() {
                    resulting_tables.push(name.clone());
                } else {
                    let mut new_table = current.clone();
                    new_table.sorted_status = SortedStatus::FullySorted(new_table.record_count);
                    let new_name = format!("{}_fully_sorted", name);
                    tables.insert(new_name.clone(), new_table);
                    resulting_tables.push(new_name);
                }
            }
            Ok(resulting_tables)
        } else if self.has(operation, Decorator::LargestInputIsOutput) {
            Ok(vec![Self::largest_table(input_tables, tables)?])
        } else {
            Ok(input_tables.to_vec())
        }
    }

    fn update_data_table(
        &self,
        operation: OperationType,
        capacity: &[i64],
        input_tables: &[String],
        tables: &mut Tables,
    ) -> Result<bool, SchedulerError> {
        let name = Self::single_sort_input(operation, capacity, input_tables)?;
        let current = common::require(tables.get_mut(name), &format!("Table {}", name))?;
        if self.has(operation, Decorator::PartialSort) {
            current.sorted_status = linear_sorter_status(capacity[0], current.record_count);
            Ok(true)
        } else if self.has(operation, Decorator::BlockingSort) {
            merge_pass(capacity[0], current)
        } else {
            Err(SchedulerError::SchedulerError(format!(
                "{} does not update tables",
                operation
            )))
        }
    }

    fn get_resulting_tables(
        &self,
        operation: OperationType,
        input_tables: &[String],
        tables: &Tables,
    ) -> Result<Vec<String>, SchedulerError> {
        if input_tables.is_empty() {
            return Err(SchedulerError::SchedulerError(String::from(
                "No input data found",
            )));
        }
        if self.has(operation, Decorator::SortedInput) {
            for name in input_tables {
                if !table(tables, name)?.is_sorted() {
                    return Err(SchedulerError::SchedulerError(format!(
                        "Table {} should be sorted for {}",
                        name, operation
                    )));
                }
            }
        }
        if self.has(operation, Decorator::LargestInputIsOutput) {
            Ok(vec![Self::largest_table(input_tables, tables)?])
        } else {
            Ok(input_tables.to_vec())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use common::testutil::*;
    use common::StreamLink;

    fn sort_node(op: OperationType, table: &str) -> SchedulingNode {
        SchedulingNode::new(
            op,
            vec![StreamLink::boundary()],
            vec![StreamLink::boundary()],
            vec![table.to_string()],
            vec![],
        )
    }

    #[test]
    fn test_decorators() {
        let lib = DefaultAcceleratorLibrary::new();
        assert!(lib.is_constrained_to_first_in_pipeline(OperationType::MergeSort));
        assert!(!lib.is_constrained_to_first_in_pipeline(OperationType::LinearSort));
        assert!(lib.is_resource_elastic(OperationType::Filter));
        assert!(lib.is_resource_elastic(OperationType::LinearSort));
        assert!(!lib.is_resource_elastic(OperationType::Addition));
        assert!(lib.is_reducing(OperationType::Join));
        assert!(lib.is_data_sensitive(OperationType::MergeSort));
        assert!(!lib.is_operation_sorting(OperationType::Sobel));
    }

    #[test]
    fn test_min_requirements() {
        let lib = DefaultAcceleratorLibrary::new();
        let mut tables = single_table("t", 4, 1000);
        let merge = sort_node(OperationType::MergeSort, "t");
        let linear = sort_node(OperationType::LinearSort, "t");
        assert_eq!(lib.get_min_requirements(&merge, &tables).unwrap(), vec![1000]);
        assert_eq!(lib.get_min_requirements(&linear, &tables).unwrap(), vec![1000]);

        tables.get_mut("t").unwrap().sorted_status = linear_sorter_status(512, 1000);
        assert_eq!(lib.get_min_requirements(&merge, &tables).unwrap(), vec![2]);

        tables.get_mut("t").unwrap().sorted_status = SortedStatus::FullySorted(1000);
        assert_eq!(lib.get_min_requirements(&merge, &tables).unwrap(), vec![0]);

        let filter = SchedulingNode::new(
            OperationType::Filter,
            vec![StreamLink::boundary()],
            vec![StreamLink::boundary()],
            vec![String::from("t")],
            vec![3, 2],
        );
        assert_eq!(lib.get_min_requirements(&filter, &tables).unwrap(), vec![3, 2]);
        assert!(lib
            .get_min_requirements(&sort_node(OperationType::MergeSort, "missing"), &tables)
            .is_err());
    }

    #[test]
    fn test_linear_sorter_status() {
        assert_eq!(linear_sorter_status(1024, 1000), SortedStatus::FullySorted(1000));
        assert_eq!(
            linear_sorter_status(512, 1000),
            SortedStatus::Sequences {
                start_offset: 0,
                sequence_count: 1,
                sequence_length: 512,
                stride: 1
            }
        );
        assert_eq!(
            linear_sorter_status(100, 1000),
            SortedStatus::Sequences {
                start_offset: 0,
                sequence_count: 9,
                sequence_length: 100,
                stride: 1
            }
        );
    }

    #[test]
    fn test_merge_passes_cover_unsorted_span() {
        let mut table = TableMetadata::new(4, 1000, SortedStatus::Unsorted);
        let mut passes = 0;
        loop {
            passes += 1;
            if merge_pass(64, &mut table).unwrap() {
                break;
            }
            assert!(passes < 100);
        }
        assert_eq!(passes, 16);
        assert!(63 * passes >= 999);
        assert_eq!(table.sorted_status, SortedStatus::FullySorted(1000));
        assert!(merge_pass(64, &mut table).is_err());
    }

    #[test]
    fn test_update_data_table() {
        let lib = DefaultAcceleratorLibrary::new();
        let mut tables = single_table("t", 4, 1000);
        let inputs = vec![String::from("t")];
        assert!(lib
            .update_data_table(OperationType::LinearSort, &[512], &inputs, &mut tables)
            .unwrap());
        assert!(!tables["t"].is_sorted());
        assert!(lib
            .update_data_table(OperationType::MergeSort, &[2], &inputs, &mut tables)
            .unwrap());
        assert!(tables["t"].is_sorted());
        assert!(lib
            .update_data_table(OperationType::Filter, &[2], &inputs, &mut tables)
            .is_err());
        assert!(lib
            .update_data_table(OperationType::MergeSort, &[2, 1], &inputs, &mut tables)
            .is_err());
    }

    #[test]
    fn test_worst_case_tables() {
        let lib = DefaultAcceleratorLibrary::new();
        let mut tables = single_table("t", 4, 1000);
        let inputs = vec![String::from("t")];
        let linear = lib
            .get_worst_case_processed_tables(OperationType::LinearSort, &[512], &inputs, &mut tables)
            .unwrap();
        assert_eq!(linear, vec![String::from("t_half_sorted")]);
        let linear = lib
            .get_worst_case_processed_tables(OperationType::LinearSort, &[2048], &inputs, &mut tables)
            .unwrap();
        assert_eq!(linear, vec![String::from("t_fully_sorted")]);
        let merged = lib
            .get_worst_case_processed_tables(
                OperationType::MergeSort,
                &[64],
                &[String::from("t_half_sorted")],
                &mut tables,
            )
            .unwrap();
        assert_eq!(merged, vec![String::from("t_half_sorted_fully_sorted")]);
        assert!(tables["t_half_sorted_fully_sorted"].is_sorted());
        let forwarded = lib
            .get_worst_case_processed_tables(
                OperationType::MergeSort,
                &[64],
                &[String::from("t_fully_sorted")],
                &mut tables,
            )
            .unwrap();
        assert_eq!(forwarded, vec![String::from("t_fully_sorted")]);
        assert!(lib
            .get_worst_case_processed_tables(OperationType::Filter, &[1, 1], &[], &mut tables)
            .is_err());
    }

    #[test]
    fn test_resulting_tables() {
        let lib = DefaultAcceleratorLibrary::new();
        let mut tables = single_table("small", 4, 10);
        tables.insert(
            String::from("large"),
            TableMetadata::new(4, 100, SortedStatus::FullySorted(100)),
        );
        let inputs = vec![String::from("large"), String::from("small")];
        assert!(lib
            .get_resulting_tables(OperationType::Join, &inputs, &tables)
            .is_err());
        tables.get_mut("small").unwrap().sorted_status = SortedStatus::FullySorted(10);
        assert_eq!(
            lib.get_resulting_tables(OperationType::Join, &inputs, &tables)
                .unwrap(),
            vec![String::from("large")]
        );
        assert_eq!(
            lib.get_resulting_tables(OperationType::Filter, &inputs, &tables)
                .unwrap(),
            inputs
        );
    }

    #[test]
    fn test_find_missing_utility() {
        let (done, missing) = find_missing_utility(&[4, 2], &[3, 2]).unwrap();
        assert!(done);
        assert_eq!(missing, vec![-1, 0]);
        let (done, missing) = find_missing_utility(&[4, 2], &[6, 1]).unwrap();
        assert!(!done);
        assert_eq!(missing, vec![2, -1]);
        assert!(find_missing_utility(&[4], &[6, 1]).is_err());
    }
}
