use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Hemaguard";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the application data directory
/// ~/Hemaguard/ on all platforms, falling back to the working directory
/// when no home directory is known.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default SQLite database location
pub fn database_path() -> PathBuf {
    app_data_dir().join("hemaguard.db")
}

/// Default validation override file, read when present
pub fn validation_config_path() -> PathBuf {
    app_data_dir().join("validation.json")
}

/// Log filter used when `RUST_LOG` is not set
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "hemaguard=debug"
    } else {
        "hemaguard=info"
    }
}
