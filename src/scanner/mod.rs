pub mod attributes;
pub mod filter;
pub mod lines;
pub mod scan;

pub use scan::{analyze_directory, analyze_file, analyze_source, ScanError, SOURCE_EXTENSIONS};
