mod files;
mod run;

pub use run::{build_import_manifest, import_directory, run};

use files::*;
