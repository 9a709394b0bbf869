//! Utility modules: file IO and logging.

pub mod io;
pub mod logging;
