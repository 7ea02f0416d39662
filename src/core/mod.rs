pub mod config;
pub mod dispatch;
pub mod errors;
pub mod options;
pub mod session;
pub mod targets;
