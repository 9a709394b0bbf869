//! File input/output: parquet data files and atomically published JSON.

pub mod fs;
pub mod parquet;

pub use self::parquet::{
    DEFAULT_BATCH_SIZE, WriteStats, get_batch_size, read_parquet, read_parquet_files,
    write_parquet,
};
pub use self::fs::{publish_json_no_clobber, read_json, write_json_atomic};
