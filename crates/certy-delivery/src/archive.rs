//! ZIP packaging of generated certificates

use std::collections::HashSet;
use std::io::{Cursor, Write};

use certy_render::batch::unique_file_name;
use certy_render::GeneratedCertificate;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::Result;

/// Deflated ZIP of the certificates, one entry per certificate
///
/// Entries are named by certificate file name; repeated names get `_2`,
/// `_3`, ... suffixes so no certificate is overwritten.
pub fn bundle(certificates: &[GeneratedCertificate]) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut taken = HashSet::new();

    for certificate in certificates {
        let entry = unique_file_name(&certificate.file_name, &taken);
        zip.start_file(entry.as_str(), options)?;
        zip.write_all(&certificate.png)?;
        taken.insert(entry);
    }

    let archive = zip.finish()?.into_inner();
    tracing::info!(
        "Bundled {} certificates into a {} byte archive",
        certificates.len(),
        archive.len()
    );
    Ok(archive)
}
