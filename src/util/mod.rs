mod format;
mod path;

pub use format::{format_size, format_timestamp, short_id};
pub use path::{blob_extension, dir_path, join_diff_path, path_parts};
