//! Logging utilities for output and progress tracking

pub mod console;
pub mod log;
pub mod progress;

pub use self::log::{log_operation_complete, log_operation_start, log_stage, log_warning};
pub use console::{print_catalog, print_sample_rows, print_schema_info, print_table_summary};
pub use progress::{abandon_progress_bar, create_spinner, finish_progress_bar};
