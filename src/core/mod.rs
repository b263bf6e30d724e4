// logfacts - core/mod.rs
//
// Core business logic layer: log type model, matching, timestamp resolution,
// statement templating and partitioning.
// Must NOT depend on: app, platform.

pub mod discovery;
pub mod logtype;
pub mod matcher;
pub mod model;
pub mod partition;
pub mod store;
pub mod template;
pub mod timestamp;
