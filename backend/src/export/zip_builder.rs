use std::collections::HashMap;
use std::io::{Cursor, Write};

use shared::{ExportFolder, ImageResult};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::store::StoreSnapshot;

pub const ZIP_FILE_NAME: &str = "detection_results.zip";
pub const ZIP_CONTENT_TYPE: &str = "application/zip";
pub const JSON_FILE_NAME: &str = "detection_results.json";

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("No detection results to export")]
    NothingToExport,
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug)]
pub struct ExportArchive {
    pub bytes: Vec<u8>,
    pub file_name: &'static str,
    pub content_type: &'static str,
}

/// Filename up to its first dot: `a.b.jpg` -> `a`.
pub fn json_stem(filename: &str) -> &str {
    filename
        .split_once('.')
        .map_or(filename, |(stem, _)| stem)
}

/// One pretty-printed JSON document per log entry, keyed by archive path.
/// Entries whose filenames share a stem collapse into one member holding the
/// latest entry.
fn json_members(results: &[ImageResult]) -> Result<Vec<(String, String)>, ExportError> {
    let mut members: Vec<(String, String)> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for result in results {
        let path = ExportFolder::OutputJson.entry(&format!("{}.json", json_stem(&result.filename)));
        let body = serde_json::to_string_pretty(result)?;
        match positions.get(&path) {
            Some(&slot) => members[slot].1 = body,
            None => {
                positions.insert(path.clone(), members.len());
                members.push((path, body));
            }
        }
    }

    Ok(members)
}

pub fn build_zip(snapshot: &StoreSnapshot) -> Result<ExportArchive, ExportError> {
    if snapshot.results.is_empty() {
        return Err(ExportError::NothingToExport);
    }

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    for (path, body) in json_members(&snapshot.results)? {
        writer.start_file(path, options)?;
        writer.write_all(body.as_bytes())?;
    }

    for image in &snapshot.images {
        writer.start_file(ExportFolder::OutputImages.entry(&image.filename), options)?;
        writer.write_all(&image.png)?;
    }

    let bytes = writer.finish()?.into_inner();
    log::info!(
        "Built export archive: {} result(s), {} image(s), {} bytes",
        snapshot.results.len(),
        snapshot.images.len(),
        bytes.len()
    );

    Ok(ExportArchive {
        bytes,
        file_name: ZIP_FILE_NAME,
        content_type: ZIP_CONTENT_TYPE,
    })
}
