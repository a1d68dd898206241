use std::path::PathBuf;

/// Resolve the AutoModerator home directory.
///
/// Priority:
/// 1) AUTOMOD_HOME
/// 2) HOME/USERPROFILE
/// 3) ./.automod
pub fn automod_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("AUTOMOD_HOME") {
        return PathBuf::from(override_path);
    }
    if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
        return PathBuf::from(home).join(".automod");
    }
    PathBuf::from(".").join(".automod")
}

/// Default logs directory: ~/.automod/logs
pub fn default_logs_dir() -> PathBuf {
    automod_home().join("logs")
}
