pub mod directory;
pub mod file_filter;
pub mod path_scanner;

pub use directory::DirectoryRef;
pub use file_filter::{ExtensionFilter, FileFilter};
pub use path_scanner::{format_bytes, PathScanner, ScanOutput, SearchResult};
