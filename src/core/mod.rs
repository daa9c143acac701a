pub mod config;
pub mod errors;
pub mod scan_view;
pub mod types;
pub mod visualization;
