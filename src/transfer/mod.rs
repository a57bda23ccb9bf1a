pub mod file_ops;

pub use file_ops::{
    failure_reason, partial_path, write_atomic, FileOperations, NameAllocator,
};
