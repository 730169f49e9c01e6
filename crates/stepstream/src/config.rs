use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// File name of the canonical config file inside a config directory.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Tuning knobs for a [`StreamingEngine`](crate::StreamingEngine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Park the driver on the registration signal while no stepper is
    /// active, instead of spinning through empty ticks.
    pub park_when_idle: bool,

    /// Emit a debug event every `log_every_ticks` ticks. `0` disables it.
    /// Only has an effect with the `tracing` feature.
    pub log_every_ticks: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            park_when_idle: true,
            log_every_ticks: 0,
        }
    }
}

/// Resolves the canonical config file for `path`.
///
/// A directory resolves to the [`CONFIG_FILE_NAME`] inside it; an existing
/// file resolves to itself.
///
/// # Errors
///
/// Returns [`Error::ConfigNotFound`] if `path` does not exist or is a
/// directory without a [`CONFIG_FILE_NAME`].
pub fn detect_config(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();

    let candidate = if path.is_dir() {
        path.join(CONFIG_FILE_NAME)
    } else {
        path.to_path_buf()
    };

    if candidate.is_file() {
        #[cfg(feature = "tracing")]
        tracing::debug!("Resolved config file {}", candidate.display());
        Ok(candidate)
    } else {
        Err(Error::ConfigNotFound { path: candidate })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "stepstream-config-{name}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn resolves_directory_and_file_paths() {
        let dir = scratch_dir("resolve");
        let config = dir.join(CONFIG_FILE_NAME);
        fs::write(&config, "{}").unwrap();

        assert_eq!(detect_config(&dir).unwrap(), config);
        assert_eq!(detect_config(&config).unwrap(), config);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_paths_are_rejected() {
        assert!(matches!(
            detect_config("do/not/exist"),
            Err(Error::ConfigNotFound { .. })
        ));

        let dir = scratch_dir("empty");
        assert_eq!(
            detect_config(&dir),
            Err(Error::ConfigNotFound {
                path: dir.join(CONFIG_FILE_NAME)
            })
        );

        fs::remove_dir_all(&dir).unwrap();
    }
}
