//! Certy Records - Student records from spreadsheets
//!
//! Reads CSV and Excel uploads into [`StudentRecord`]s. Column headers are
//! normalised and matched against a fixed synonym table, so "Student Name",
//! "full_name" and "name" all resolve to the name column.

use std::path::Path;

use certy_core::StudentRecord;
use thiserror::Error;

pub mod csv_reader;
pub mod excel_reader;

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised while validating or reading a record file
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("No Excel/CSV file uploaded. Please select a file.")]
    NoFile,

    #[error("Excel file must be .xlsx, .xls, or .csv format.")]
    UnsupportedFormat(String),

    #[error("Template file must be .png, .jpg, .jpeg, or .pdf format.")]
    UnsupportedTemplate(String),

    #[error("Uploaded file {0} is empty.")]
    EmptyFile(String),

    #[error("Missing required columns: {}. Accepted variations: {}", .0.join(", "), accepted_variations())]
    MissingColumns(Vec<String>),

    #[error("CSV parsing error: {0}")]
    CsvError(String),

    #[error("Excel parsing error: {0}")]
    ExcelError(String),

    #[error("IO error reading {path}: {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, RecordError>;

// ============================================================================
// File Types
// ============================================================================

/// Spreadsheet formats accepted for batch input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Csv,
    Xlsx,
    Xls,
    Unknown,
}

impl FileType {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "csv" => Self::Csv,
            "xlsx" => Self::Xlsx,
            "xls" => Self::Xls,
            _ => Self::Unknown,
        }
    }

    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Unknown)
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Csv => "text/csv",
            Self::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            Self::Xls => "application/vnd.ms-excel",
            Self::Unknown => "application/octet-stream",
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Csv => write!(f, "csv"),
            Self::Xlsx => write!(f, "xlsx"),
            Self::Xls => write!(f, "xls"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

// ============================================================================
// Upload Validation
// ============================================================================

/// Check a record upload's name and content before it is stored
pub fn validate_upload(file_name: Option<&str>, content: &[u8]) -> Result<FileType> {
    let name = match file_name.map(str::trim) {
        Some(name) if !name.is_empty() => name,
        _ => return Err(RecordError::NoFile),
    };

    let file_type = FileType::from_path(Path::new(name));
    if file_type == FileType::Unknown {
        return Err(RecordError::UnsupportedFormat(name.to_string()));
    }
    if content.is_empty() {
        return Err(RecordError::EmptyFile(name.to_string()));
    }

    Ok(file_type)
}

pub const TEMPLATE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "pdf"];

/// Check a template upload (image or PDF)
pub fn validate_template_upload(file_name: &str, content: &[u8]) -> Result<()> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    if !TEMPLATE_EXTENSIONS.contains(&ext.as_str()) {
        return Err(RecordError::UnsupportedTemplate(file_name.to_string()));
    }
    if content.is_empty() {
        return Err(RecordError::EmptyFile(file_name.to_string()));
    }
    Ok(())
}

// ============================================================================
// Column Resolution
// ============================================================================

/// Logical columns and the header spellings accepted for each
pub const COLUMN_SYNONYMS: &[(&str, &[&str])] = &[
    ("name", &["name", "student_name", "full_name"]),
    ("email", &["email", "email_id", "email_address"]),
    ("year_of_study", &["year_of_study", "year", "academic_year"]),
    ("branch", &["branch", "department", "course"]),
];

fn accepted_variations() -> String {
    COLUMN_SYNONYMS
        .iter()
        .map(|(column, variants)| format!("{column}: [{}]", variants.join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Lowercase, trim, and turn spaces into underscores
pub fn normalize_header(header: &str) -> String {
    header.trim().to_lowercase().replace(' ', "_")
}

/// Positions of the four logical columns within a header row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub name: usize,
    pub email: usize,
    pub year_of_study: usize,
    pub branch: usize,
}

impl ColumnMap {
    /// Build a record from one data row; missing cells become ""
    pub fn record(&self, row: &[String]) -> StudentRecord {
        let cell = |idx: usize| row.get(idx).map(|v| v.trim().to_string()).unwrap_or_default();
        StudentRecord::new(
            cell(self.name),
            cell(self.email),
            cell(self.year_of_study),
            cell(self.branch),
        )
    }
}

/// Match headers against the synonym table
///
/// For each logical column the first header, left to right, that matches
/// one of its spellings wins.
pub fn resolve_columns<S: AsRef<str>>(headers: &[S]) -> Result<ColumnMap> {
    let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h.as_ref())).collect();

    let mut positions = Vec::with_capacity(COLUMN_SYNONYMS.len());
    let mut missing = Vec::new();
    for (column, variants) in COLUMN_SYNONYMS {
        match normalized.iter().position(|h| variants.contains(&h.as_str())) {
            Some(idx) => positions.push(idx),
            None => {
                missing.push(column.to_string());
                positions.push(usize::MAX);
            }
        }
    }

    if !missing.is_empty() {
        return Err(RecordError::MissingColumns(missing));
    }

    Ok(ColumnMap {
        name: positions[0],
        email: positions[1],
        year_of_study: positions[2],
        branch: positions[3],
    })
}

/// Turn a header row and data rows into records, skipping blank rows
pub fn records_from_rows<I>(headers: &[String], rows: I) -> Result<Vec<StudentRecord>>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let columns = resolve_columns(headers)?;
    Ok(rows
        .into_iter()
        .filter(|row| !row.iter().all(|cell| cell.trim().is_empty()))
        .map(|row| columns.record(&row))
        .collect())
}

// ============================================================================
// Reading
// ============================================================================

/// Read every student record from a CSV or Excel file
pub fn read_records(path: &Path) -> Result<Vec<StudentRecord>> {
    let file_type = FileType::from_path(path);
    tracing::info!("Reading {} records from {}", file_type, path.display());

    let records = match file_type {
        FileType::Csv => csv_reader::read_csv_file(path)?,
        FileType::Xlsx | FileType::Xls => excel_reader::read_excel_file(path)?,
        FileType::Unknown => {
            return Err(RecordError::UnsupportedFormat(path.display().to_string()))
        }
    };

    tracing::info!("Parsed {} student records", records.len());
    Ok(records)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_file_type_from_extension() {
        assert_eq!(FileType::from_extension("csv"), FileType::Csv);
        assert_eq!(FileType::from_extension("XLSX"), FileType::Xlsx);
        assert_eq!(FileType::from_extension("xls"), FileType::Xls);
        assert_eq!(FileType::from_extension("pdf"), FileType::Unknown);
        assert_eq!(FileType::from_path(Path::new("a/b.csv")), FileType::Csv);
        assert_eq!(FileType::from_path(Path::new("noext")), FileType::Unknown);
    }

    #[test]
    fn test_validate_upload_messages() {
        assert_eq!(
            validate_upload(None, b"x").unwrap_err().to_string(),
            "No Excel/CSV file uploaded. Please select a file."
        );
        assert_eq!(
            validate_upload(Some("students.txt"), b"x")
                .unwrap_err()
                .to_string(),
            "Excel file must be .xlsx, .xls, or .csv format."
        );
        assert_eq!(
            validate_upload(Some("students.csv"), b"")
                .unwrap_err()
                .to_string(),
            "Uploaded file students.csv is empty."
        );
        assert_eq!(
            validate_upload(Some("students.xlsx"), b"PK").unwrap(),
            FileType::Xlsx
        );
    }

    #[test]
    fn test_validate_template_upload() {
        assert!(validate_template_upload("template.PNG", b"img").is_ok());
        assert!(validate_template_upload("template.jpeg", b"img").is_ok());
        assert!(validate_template_upload("template.Pdf", b"%PDF-1.4").is_ok());
        assert!(matches!(
            validate_template_upload("template.docx", b"img"),
            Err(RecordError::UnsupportedTemplate(_))
        ));
        assert!(matches!(
            validate_template_upload("template.jpg", b""),
            Err(RecordError::EmptyFile(_))
        ));
    }

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header(" Student Name "), "student_name");
        assert_eq!(normalize_header("EMAIL"), "email");
        assert_eq!(normalize_header("Academic Year"), "academic_year");
    }

    #[test]
    fn test_resolve_synonyms() {
        let headers = ["Full Name", "Email Address", "Year", "Department"];
        let map = resolve_columns(&headers).unwrap();
        assert_eq!(
            map,
            ColumnMap {
                name: 0,
                email: 1,
                year_of_study: 2,
                branch: 3
            }
        );
    }

    #[test]
    fn test_resolve_first_match_wins() {
        let headers = ["student_name", "name", "email", "year", "course"];
        assert_eq!(resolve_columns(&headers).unwrap().name, 0);
    }

    #[test]
    fn test_missing_columns_error() {
        let err = resolve_columns(&["name", "email"]).unwrap_err();
        match &err {
            RecordError::MissingColumns(missing) => {
                assert_eq!(missing, &vec!["year_of_study".to_string(), "branch".to_string()])
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err
            .to_string()
            .starts_with("Missing required columns: year_of_study, branch."));
    }

    #[test]
    fn test_records_from_rows_trims_and_skips_blank() {
        let headers: Vec<String> = ["Name", "Email", "Year", "Branch"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let rows = vec![
            vec![" Jane Doe ".into(), "jane@example.com".into(), "3".into(), "CSE".into()],
            vec!["".into(), " ".into(), "".into(), "".into()],
            vec!["John Smith".into(), "john@example.com".into()],
        ];

        let records = records_from_rows(&headers, rows).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "Jane Doe");
        assert_eq!(records[1].year_of_study, "");
        assert_eq!(records[1].branch, "");
    }

    #[test]
    fn test_read_records_dispatches_on_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("students.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "Student Name,Email ID,Academic Year,Course").unwrap();
        writeln!(file, "Mary Ann Clark,mary@example.com,2,ECE").unwrap();

        let records = read_records(&path).unwrap();
        assert_eq!(
            records,
            vec![StudentRecord::new("Mary Ann Clark", "mary@example.com", "2", "ECE")]
        );

        let other = dir.path().join("students.json");
        std::fs::write(&other, "{}").unwrap();
        assert!(matches!(
            read_records(&other),
            Err(RecordError::UnsupportedFormat(_))
        ));
    }
}
