pub mod chunk;
pub mod pipeline;
pub mod record;

pub use chunk::ChunkCleaner;
pub use pipeline::{CleanOutcome, CleanPipeline, CleanStats};
pub use record::{CleanRecord, RawRecord, RejectedRecord, RejectionReason};
