pub mod resolver;
pub mod vocabulary;

pub use resolver::Resolver;
pub use vocabulary::{UNKNOWN_REGION, Vocabulary};
