//! Core types and pure logic for the Signalbox decision engine.
//!
//! This crate is deliberately free of async runtime, HTTP and database
//! dependencies. Conflict detection, recommendation scoring and simulation
//! projection are plain functions over a [`network::NetworkSnapshot`]; the
//! stateful services live in `signalbox-engine`.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod audit;
pub mod config;
pub mod conflict;
pub mod error;
pub mod network;
pub mod recommendation;
pub mod scoring;
pub mod simulation;

pub use error::{Error, Result};
