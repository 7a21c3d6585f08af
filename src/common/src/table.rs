use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::fmt;

/// Table name to metadata map handed around by the scheduler.
pub type Tables = BTreeMap<String, TableMetadata>;

/// Compact description of how far a table got sorted.
///
/// Serialized as the integer list used by the table config files: `[]`,
/// `[record_count]` or `[start_offset, sequence_count, sequence_length, stride]`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(try_from = "Vec<i64>", into = "Vec<i64>")]
pub enum SortedStatus {
    /// Nothing is known about the order of the records.
    Unsorted,
    /// One sorted run covering the given number of records.
    FullySorted(i64),
    /// Interleaved sorted runs left behind by partial merge passes.
    Sequences {
        start_offset: i64,
        sequence_count: i64,
        sequence_length: i64,
        stride: i64,
    },
}

impl Default for SortedStatus {
    fn default() -> Self {
        SortedStatus::Unsorted
    }
}

impl TryFrom<Vec<i64>> for SortedStatus {
    type Error = String;

    fn try_from(values: Vec<i64>) -> Result<Self, Self::Error> {
        match values.as_slice() {
            [] => Ok(SortedStatus::Unsorted),
            [count] => Ok(SortedStatus::FullySorted(*count)),
            [start_offset, sequence_count, sequence_length, stride] => {
                Ok(SortedStatus::Sequences {
                    start_offset: *start_offset,
                    sequence_count: *sequence_count,
                    sequence_length: *sequence_length,
                    stride: *stride,
                })
            }
            _ => Err(format!(
                "Sorted status needs 0, 1 or 4 values, got {}",
                values.len()
            )),
        }
    }
}

impl From<SortedStatus> for Vec<i64> {
    fn from(status: SortedStatus) -> Self {
        match status {
            SortedStatus::Unsorted => Vec::new(),
            SortedStatus::FullySorted(count) => vec![count],
            SortedStatus::Sequences {
                start_offset,
                sequence_count,
                sequence_length,
                stride,
            } => vec![start_offset, sequence_count, sequence_length, stride],
        }
    }
}

impl fmt::Display for SortedStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let values: Vec<String> = Vec::from(self.clone())
            .iter()
            .map(|v| v.to_string())
            .collect();
        write!(f, "{{{}}}", values.join(","))
    }
}

/// Shape and sortedness of a named data table.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TableMetadata {
    /// Size of one record in 32 bit words.
    pub record_size: i64,
    /// Number of records, -1 if the table is not materialized yet.
    pub record_count: i64,
    #[serde(default)]
    pub sorted_status: SortedStatus,
}

impl TableMetadata {
    /// Creates table metadata.
    ///
    /// # Arguments
    ///
    /// * `record_size` - Record width in 32 bit words.
    /// * `record_count` - Number of records.
    /// * `sorted_status` - Sorted run encoding.
    pub fn new(record_size: i64, record_count: i64, sorted_status: SortedStatus) -> Self {
        TableMetadata {
            record_size,
            record_count,
            sorted_status,
        }
    }

    /// Returns true if one sorted run spans the whole table.
    pub fn is_sorted(&self) -> bool {
        if self.record_count == 0 {
            return true;
        }
        match self.sorted_status {
            SortedStatus::Unsorted => false,
            SortedStatus::FullySorted(count) => count == self.record_count,
            SortedStatus::Sequences {
                sequence_length, ..
            } => sequence_length == self.record_count,
        }
    }

    /// Number of bytes streamed when the whole table is read.
    pub fn size_in_bytes(&self) -> i64 {
        self.record_count.max(0) * self.record_size * 4
    }

    /// Fits the sorted run encoding to the actual record count after the table
    /// got materialized by hardware.
    pub fn crop_sorted_status(&mut self) {
        let record_count = self.record_count;
        self.sorted_status = match self.sorted_status {
            SortedStatus::Unsorted => SortedStatus::Unsorted,
            SortedStatus::FullySorted(_) => SortedStatus::FullySorted(record_count),
            SortedStatus::Sequences {
                start_offset,
                sequence_count,
                sequence_length,
                stride,
            } => {
                if sequence_length <= 0
                    || (sequence_count - 1) * sequence_length + start_offset <= record_count
                {
                    return;
                }
                if record_count < start_offset {
                    SortedStatus::FullySorted(record_count)
                } else {
                    let left_over_rows = record_count - start_offset;
                    let mut left_over_sequences = left_over_rows / sequence_length;
                    if left_over_sequences == 0 {
                        SortedStatus::Sequences {
                            start_offset,
                            sequence_count: 1,
                            sequence_length: left_over_rows,
                            stride,
                        }
                    } else {
                        if left_over_sequences * sequence_length != left_over_rows {
                            left_over_sequences += 1;
                        }
                        SortedStatus::Sequences {
                            start_offset,
                            sequence_count: left_over_sequences,
                            sequence_length,
                            stride,
                        }
                    }
                }
            }
        };
    }
}
