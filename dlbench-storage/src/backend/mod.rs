pub mod common;
pub mod in_memory;
pub mod local_fs;
pub mod s3_compatible;
