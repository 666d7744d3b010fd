pub mod archive;
pub mod bootstrap;
pub mod bulk;
pub mod cleanup;
pub mod config;
pub mod constants;
pub mod error;
pub mod fetcher;
pub mod file;
pub mod logger;
pub mod mixcloud;
pub mod server;
pub mod service;
pub mod storage;
pub mod sweeper;
pub mod tool;
pub mod types;
pub mod util;

#[cfg(test)]
mod test_support;
