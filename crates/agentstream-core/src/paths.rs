use std::env;
use std::path::PathBuf;

/// Directory name under the home directory for agentstream data.
pub const DATA_DIR_NAME: &str = ".agentstream";

/// Return the user's home directory path.
///
/// Uses HOME on Unix-like systems and USERPROFILE on Windows.
pub fn get_home_dir() -> Option<PathBuf> {
    ["HOME", "USERPROFILE"]
        .iter()
        .filter_map(|key| env::var(key).ok())
        .find(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Default directory for history and transcripts (`~/.agentstream`).
pub fn default_data_dir() -> Option<PathBuf> {
    get_home_dir().map(|home| home.join(DATA_DIR_NAME))
}

/// Default location of the conversation history file.
pub fn default_history_path() -> Option<PathBuf> {
    default_data_dir().map(|dir| dir.join("history.json"))
}
