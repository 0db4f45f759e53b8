//! Core, transport-agnostic machinery for running one match between
//! sandboxed player submissions and for maintaining ratings across many of
//! them. Binaries wire this together with a concrete [`container::ContainerEngine`]
//! and [`persistence::Persistence`] implementation.

pub mod config;
pub mod connection;
pub mod container;
pub mod error;
pub mod gamemode;
pub mod matchmaker;
pub mod middleware;
pub mod persistence;
pub mod rating;
pub mod result;
pub mod sandbox;
pub mod timed_connection;
pub mod turn_engine;
