//! Desktop harness for the evolutionary robot engine: a file-backed store, a
//! simulated body, an asynchronous signal emitter and multi-seed benchmarks.

pub mod benchmark;
pub mod emitter;
pub mod file_store;
pub mod runner;
pub mod sim;
pub mod util;
