pub mod clean_config;
pub mod settings;

pub use clean_config::CleanConfig;
pub use settings::DataDirs;
