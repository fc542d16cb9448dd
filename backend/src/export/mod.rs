pub mod zip_builder;

pub use zip_builder::{ExportArchive, ExportError, JSON_FILE_NAME, build_zip, json_stem};
