use std::path::{Path, PathBuf};

pub fn get_root_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("framespeak")
}

/// Get the default path of the provider configuration file
pub fn get_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("framespeak")
        .join("config.json")
}

/// Get the directory holding persisted videos and frames
pub fn get_db_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("db")
}

/// Get the file name for a frame written with `--output-dir`
pub fn get_frame_file_name(index: usize, timestamp: f64) -> String {
    format!("frame_{:03}_{:07.2}s.jpg", index + 1, timestamp)
}
