//! Excel record reader using calamine
//!
//! Reads the first worksheet of an .xlsx or .xls workbook. The first row
//! is the header.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use certy_core::StudentRecord;

use crate::{records_from_rows, RecordError, Result};

/// Convert a cell to its display string
///
/// Integral floats drop their decimals so a year typed as 3 stays "3".
pub fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 {
                format!("{}", *f as i64)
            } else {
                format!("{f}")
            }
        }
        Data::Int(i) => format!("{i}"),
        Data::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Data::Error(e) => format!("#ERROR: {e:?}"),
        Data::DateTime(dt) => format!("{dt}"),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
    }
}

/// Split a worksheet into header row and data rows
pub fn sheet_rows(range: &calamine::Range<Data>) -> (Vec<String>, Vec<Vec<String>>) {
    let mut rows = range.rows();
    let headers = rows
        .next()
        .map(|row| row.iter().map(cell_to_string).collect())
        .unwrap_or_default();
    let data = rows
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect();
    (headers, data)
}

pub fn read_excel_file(path: &Path) -> Result<Vec<StudentRecord>> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| RecordError::ExcelError(e.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| RecordError::ExcelError("workbook has no worksheets".to_string()))?
        .map_err(|e| RecordError::ExcelError(e.to_string()))?;

    let (headers, rows) = sheet_rows(&range);
    tracing::debug!(
        "Worksheet has {} columns and {} rows",
        headers.len(),
        rows.len()
    );
    records_from_rows(&headers, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::Range;

    #[test]
    fn test_cell_to_string() {
        assert_eq!(cell_to_string(&Data::Empty), "");
        assert_eq!(cell_to_string(&Data::String(" CSE ".to_string())), "CSE");
        assert_eq!(cell_to_string(&Data::Int(42)), "42");
        assert_eq!(cell_to_string(&Data::Float(3.5)), "3.5");
        assert_eq!(cell_to_string(&Data::Float(3.0)), "3");
        assert_eq!(cell_to_string(&Data::Bool(true)), "TRUE");
    }

    #[test]
    fn test_sheet_rows_into_records() {
        let mut range = Range::new((0, 0), (2, 3));
        let cells = [
            ["Student Name", "Email Address", "Academic Year", "Course"],
            ["Jane Doe", "jane@example.com", "", "CSE"],
            ["", "", "", ""],
        ];
        for (r, row) in cells.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                if !value.is_empty() {
                    range.set_value((r as u32, c as u32), Data::String(value.to_string()));
                }
            }
        }
        range.set_value((1, 2), Data::Float(4.0));

        let (headers, rows) = sheet_rows(&range);
        let records = records_from_rows(&headers, rows).unwrap();

        assert_eq!(
            records,
            vec![StudentRecord::new("Jane Doe", "jane@example.com", "4", "CSE")]
        );
    }

    #[test]
    fn test_corrupt_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("students.xlsx");
        std::fs::write(&path, b"not a workbook").unwrap();

        assert!(matches!(
            read_excel_file(&path),
            Err(RecordError::ExcelError(_))
        ));
    }
}
