pub mod archive;
pub mod common;
pub mod env;
pub mod exec;
pub mod workspace;
