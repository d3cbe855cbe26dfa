//! Loading a [MuxConfig] from a JSON file.

use std::path::{Path, PathBuf};

use media::config::MuxConfig;

/// Indicates that a config file couldn't be used.
#[derive(thiserror::Error, Debug)]
pub enum SettingsError {
    #[error("Couldn't read the config file `{path}`.")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("The config file `{path}` isn't valid.")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// The config in `path`, or the default config if there's no path. Settings
/// missing from the file keep their default.
pub fn load(path: Option<&Path>) -> Result<MuxConfig, SettingsError> {
    let Some(path) = path else {
        return Ok(MuxConfig::default());
    };

    let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = serde_json::from_str(&text).map_err(|source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    util::debug_log_info!("Loaded the config file `{}`.", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("muxgen-{}-{name}", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn no_path_means_defaults() {
        assert_eq!(load(None).unwrap(), MuxConfig::default());
    }

    #[test]
    fn files_override_some_settings() {
        let path = write_temp("override.json", r#"{ "frame_rate": 30, "gop": 1 }"#);
        let config = load(Some(&path)).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.frame_rate, 30);
        assert_eq!(config.gop, 1);
        assert_eq!(config.dimensions, MuxConfig::default().dimensions);
    }

    #[test]
    fn broken_files_are_reported() {
        let path = write_temp("broken.json", "{ frame_rate: ");
        let result = load(Some(&path));
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(result, Err(SettingsError::Parse { .. })));

        let missing = std::env::temp_dir().join("muxgen-this-file-does-not-exist.json");
        assert!(matches!(load(Some(&missing)), Err(SettingsError::Read { .. })));
    }
}
