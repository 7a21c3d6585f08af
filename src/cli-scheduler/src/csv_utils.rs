use common::{SchedulerError, SortedStatus, TableMetadata, Tables};
use std::convert::TryFrom;
use std::fs::File;
use std::io::Read;
use std::path::Path;

fn parse_int(field: &str, what: &str, line: u64) -> Result<i64, SchedulerError> {
    field.trim().parse::<i64>().map_err(|_| {
        SchedulerError::ValidationError(format!("Bad {} {:?} in table row {}", what, field, line))
    })
}

/// Reads table metadata rows `name,record_size,record_count,sorted_status`.
///
/// The sorted status holds space separated integers, an empty field means unsorted.
///
/// # Arguments
///
/// * `reader` - Source of the csv data, no header row.
pub fn read_tables<R: Read>(reader: R) -> Result<Tables, SchedulerError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut tables = Tables::new();
    for (i, result) in rdr.records().enumerate() {
        let line = i as u64 + 1;
        let rec = result.map_err(|e| SchedulerError::IOError(e.to_string()))?;
        if rec.len() < 3 || rec.len() > 4 {
            return Err(SchedulerError::ValidationError(format!(
                "Table row {} has {} fields",
                line,
                rec.len()
            )));
        }
        let record_size = parse_int(&rec[1], "record size", line)?;
        let record_count = parse_int(&rec[2], "record count", line)?;
        let values = match rec.get(3) {
            Some(status) => status
                .split_whitespace()
                .map(|v| parse_int(v, "sorted status", line))
                .collect::<Result<Vec<i64>, SchedulerError>>()?,
            None => Vec::new(),
        };
        let sorted_status = SortedStatus::try_from(values).map_err(SchedulerError::ValidationError)?;
        debug!("cli_scheduler::csv_utils read table {}", &rec[0]);
        tables.insert(
            rec[0].to_string(),
            TableMetadata::new(record_size, record_count, sorted_status),
        );
    }
    info!("Num tables imported: {:?}", tables.len());
    Ok(tables)
}

/// Loads table metadata from a `.csv` file or a json map of table name to metadata.
pub fn import_tables(path: &str) -> Result<Tables, SchedulerError> {
    debug!("cli_scheduler::csv_utils trying to open file, path: {:?}", path);
    let is_csv = Path::new(path)
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("csv"));
    let mut file = File::open(path)?;
    if is_csv {
        read_tables(file)
    } else {
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        serde_json::from_str(&contents)
            .map_err(|e| SchedulerError::ValidationError(format!("Malformed tables: {}", e)))
    }
}
