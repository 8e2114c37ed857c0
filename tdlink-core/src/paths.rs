// ABOUTME: XDG Base Directory paths for configuration and client databases.
// ABOUTME: Falls back to relative directories when no home directory is known.

use directories::ProjectDirs;
use std::path::PathBuf;

const QUALIFIER: &str = "org";
const ORGANIZATION: &str = "tdlink";
const APPLICATION: &str = "tdlink";

pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
}

/// e.g., ~/.local/share/tdlink/
/// Falls back to ./data
pub fn data_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./data"))
}

/// Backend database directory, e.g., ~/.local/share/tdlink/database/
pub fn database_dir() -> PathBuf {
    data_dir().join("database")
}

/// Downloaded files, e.g., ~/.local/share/tdlink/files/
pub fn files_dir() -> PathBuf {
    data_dir().join("files")
}

/// e.g., ~/.config/tdlink/
/// Falls back to the current directory
pub fn config_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_subdirectories() {
        assert!(database_dir().starts_with(data_dir()));
        assert!(files_dir().starts_with(data_dir()));
    }

    #[test]
    fn test_config_file_name() {
        assert!(config_file().ends_with("config.toml"));
    }
}
