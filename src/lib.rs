// logfacts - lib.rs
//
// Library entry point. The `logfacts` binary is a thin front end over the
// `app::engine::Engine` exposed here.

pub mod app;
pub mod core;
pub mod platform;
pub mod util;
