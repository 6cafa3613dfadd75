pub mod cli;
pub mod fetch;
pub mod service;
pub mod sweeper;
