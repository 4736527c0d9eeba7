//! Relay core library: connector activities, engine client, turn dispatch, and the HTTP
//! gateway used by the CLI.

pub mod activity;
pub mod adapter;
pub mod bot;
pub mod chunker;
pub mod config;
pub mod connector;
pub mod engine;
pub mod gateway;
pub mod init;
pub mod normalize;
pub mod references;
pub mod state;

#[cfg(test)]
mod testing;
