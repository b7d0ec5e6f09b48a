pub mod build;

pub use build::build_all_aggregations;
