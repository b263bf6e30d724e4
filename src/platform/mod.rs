// logfacts - platform/mod.rs
//
// Platform abstraction layer: directories and config.toml, file reading,
// and the SQLite fact store.
// Must NOT depend on: app.

pub mod config;
pub mod fs;
pub mod sqlite;
