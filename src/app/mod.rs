// logfacts - app/mod.rs
//
// Application layer: the engine context, parse coordination, fact
// registration, write batching, log type catalog and project persistence.
// Dependencies: core, platform, util.

pub mod catalog;
pub mod coordinator;
pub mod engine;
pub mod progress;
pub mod projects;
pub mod registrar;
pub mod write_queue;
