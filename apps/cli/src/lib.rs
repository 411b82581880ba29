//! `dbview` command-line front end.
//!
//! Each invocation reopens the working file persisted by the previous one,
//! so `open` followed by `view`/`edit`/`export` behaves like one session
//! until the working file expires.

mod cli;
mod config;
mod render;

pub use cli::{run, run_with_io, Args};
pub use config::Config;
