pub mod directory_mover;

pub use directory_mover::DirectoryMover;
