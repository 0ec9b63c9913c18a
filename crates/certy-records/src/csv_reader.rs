//! CSV record reader

use std::io::Read;
use std::path::Path;

use certy_core::StudentRecord;

use crate::{records_from_rows, RecordError, Result};

/// Read records from any CSV source whose first row is the header
pub fn read_csv<R: Read>(reader: R) -> Result<Vec<StudentRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| RecordError::CsvError(e.to_string()))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for (line, row) in reader.records().enumerate() {
        let row = row.map_err(|e| RecordError::CsvError(format!("row {}: {e}", line + 2)))?;
        rows.push(row.iter().map(str::to_string).collect());
    }

    tracing::debug!("CSV has {} columns and {} rows", headers.len(), rows.len());
    records_from_rows(&headers, rows)
}

pub fn read_csv_file(path: &Path) -> Result<Vec<StudentRecord>> {
    let file = std::fs::File::open(path).map_err(|source| RecordError::IoError {
        path: path.display().to_string(),
        source,
    })?;
    read_csv(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_csv_with_synonyms() {
        let data = "Name,Email,Year of Study,Department\n\
                    Jane Doe,jane@example.com,3,CSE\n\
                    John Smith , john@example.com ,2, ECE\n";
        let records = read_csv(data.as_bytes()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(
            records[1],
            StudentRecord::new("John Smith", "john@example.com", "2", "ECE")
        );
    }

    #[test]
    fn test_read_csv_skips_empty_rows_and_pads_short_ones() {
        let data = "name,email,year,branch\n,,,\nJane Doe,jane@example.com\n";
        let records = read_csv(data.as_bytes()).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].year_of_study, "");
    }

    #[test]
    fn test_read_csv_missing_columns() {
        let data = "name,email\nJane Doe,jane@example.com\n";
        assert!(matches!(
            read_csv(data.as_bytes()),
            Err(RecordError::MissingColumns(_))
        ));
    }

    #[test]
    fn test_read_csv_file_not_found() {
        let err = read_csv_file(Path::new("/nonexistent/students.csv")).unwrap_err();
        assert!(matches!(err, RecordError::IoError { .. }));
    }
}
