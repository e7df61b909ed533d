//! Platform-specific paths and support checks

use crate::{PassbridgeError, Result};
use std::path::{Path, PathBuf};

/// Get current platform as a string
pub fn get_platform() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "macos"
    } else if cfg!(target_os = "linux") {
        "linux"
    } else {
        "unknown"
    }
}

/// Fail unless the local Chrome store can be read on this platform.
///
/// Windows encrypts saved passwords with DPAPI, which is not supported.
pub fn check_supported_platform() -> Result<()> {
    check_platform(get_platform())
}

fn check_platform(platform: &str) -> Result<()> {
    match platform {
        "linux" | "macos" => Ok(()),
        other => Err(PassbridgeError::Configuration(format!(
            "reading the Chrome password store is not supported on {}",
            other
        ))),
    }
}

/// Directories searched for a Chrome `Login Data` file
///
/// Returns:
/// - macOS: ~/Library/Application Support/Google/Chrome, .../Google/Chromium
/// - Linux/Other: ~/.config/chromium, ~/.config/google-chrome
pub fn default_chrome_search_paths() -> Vec<PathBuf> {
    let Some(home) = dirs::home_dir() else {
        return Vec::new();
    };

    if cfg!(target_os = "macos") {
        let support = home.join("Library").join("Application Support").join("Google");
        vec![support.join("Chrome"), support.join("Chromium")]
    } else {
        let config = home.join(".config");
        vec![config.join("chromium"), config.join("google-chrome")]
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// Get the platform-specific config directory
///
/// Returns:
/// - Windows: %APPDATA%\passbridge
/// - macOS: ~/Library/Application Support/passbridge
/// - Linux/Other: ~/.config/passbridge
pub fn get_config_dir() -> PathBuf {
    let base = dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."));

    base.join("passbridge")
}

/// Get the default config file path
pub fn default_config_path() -> PathBuf {
    get_config_dir().join("passbridge.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_platform() {
        let platform = get_platform();
        assert!(
            platform == "windows"
                || platform == "macos"
                || platform == "linux"
                || platform == "unknown"
        );
    }

    #[test]
    fn test_check_platform() {
        assert!(check_platform("linux").is_ok());
        assert!(check_platform("macos").is_ok());
        assert!(matches!(
            check_platform("windows"),
            Err(PassbridgeError::Configuration(_))
        ));
        assert!(check_platform("unknown").is_err());
    }

    #[test]
    fn test_default_chrome_search_paths() {
        let paths = default_chrome_search_paths();
        if dirs::home_dir().is_some() {
            assert_eq!(paths.len(), 2);
        }
        for path in paths {
            let s = path.to_string_lossy().to_lowercase();
            assert!(s.contains("chrom"), "{s}");
        }
    }

    #[test]
    fn test_expand_home() {
        let plain = Path::new("/var/tmp/Login Data");
        assert_eq!(expand_home(plain), plain);

        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home(Path::new("~/.config")), home.join(".config"));
        }
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.to_string_lossy().ends_with("passbridge.toml"));
    }
}
