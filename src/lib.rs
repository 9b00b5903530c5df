pub mod cli;
pub mod config;
pub mod dispatch;
pub mod output;
pub mod record;
pub mod registry;
pub mod source;
