//! Command handlers: build the engine from settings, run it, render output.

pub mod config_cmd;
pub mod devices;
pub mod run;
pub mod scan;
pub mod util;
