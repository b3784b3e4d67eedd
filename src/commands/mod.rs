pub mod import;
pub mod import_csv;
pub mod merge;
pub mod status;
