//! Runtime configuration resolved from the environment

use std::path::{Path, PathBuf};

const DATA_DIR_ENV: &str = "GLOSSA_DATA_DIR";
const DATASET_ENV: &str = "GLOSSA_DATASET";
const BIND_ENV: &str = "GLOSSA_BIND";

pub const DEFAULT_BIND: &str = "127.0.0.1:3000";
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;
const DATASET_FILE: &str = "dictionary.csv";
const SETTINGS_DB_FILE: &str = "settings.db";

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub dataset_path: PathBuf,
    pub settings_db_path: PathBuf,
    pub bind_addr: String,
    pub cache_capacity: usize,
}

impl Config {
    pub fn from_env() -> Self {
        let data_dir = std::env::var_os(DATA_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(get_data_dir);
        let dataset_path = std::env::var_os(DATASET_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join(DATASET_FILE));
        let bind_addr = std::env::var(BIND_ENV).unwrap_or_else(|_| DEFAULT_BIND.to_string());
        Self::new(data_dir, dataset_path, bind_addr)
    }

    pub fn new(data_dir: PathBuf, dataset_path: PathBuf, bind_addr: String) -> Self {
        let settings_db_path = data_dir.join(SETTINGS_DB_FILE);
        Self {
            data_dir,
            dataset_path,
            settings_db_path,
            bind_addr,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// Data directory: a `data/` folder holding the dataset in debug builds,
/// else the platform data directory, else the working directory.
pub fn get_data_dir() -> PathBuf {
    #[cfg(debug_assertions)]
    {
        let dev_paths = [PathBuf::from("data"), PathBuf::from("../data")];
        for path in &dev_paths {
            if path.join(DATASET_FILE).exists() {
                return path.canonicalize().unwrap_or_else(|_| path.clone());
            }
        }
    }

    dirs::data_dir()
        .map(|d| d.join("glossa"))
        .unwrap_or_else(|| Path::new(".").to_path_buf())
}
