pub mod converter;
pub mod runner;

pub use converter::{CommandConverter, Converter};
pub use runner::ConversionRunner;
