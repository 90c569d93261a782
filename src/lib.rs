pub mod buildbot;
pub mod config;
pub mod error;
pub mod http;
pub mod request;
pub mod syncer;
pub mod triggerable;

#[cfg(test)]
mod testing;
