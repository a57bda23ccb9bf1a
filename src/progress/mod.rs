pub mod emitter;

pub use emitter::{OperationProgress, ProgressEmitter, ProgressEvent, ProgressListener};
