pub mod config;
pub mod context;
pub mod credentials;
pub mod json_extract;
pub mod logging;
