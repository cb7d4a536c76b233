// SPDX-License-Identifier: MPL-2.0-only

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use crate::{EngineConfig, Settings};

/// Plain-text `KEY=VALUE` settings file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default location inside the user's config directory.
    #[must_use]
    pub fn default_path(config_dir: &Path) -> PathBuf {
        config_dir.join(crate::NAME).join("config.txt")
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every entry of the file.
    ///
    /// A missing file is not an error and yields an empty map.
    ///
    /// # Errors
    ///
    /// Fails if the file exists but cannot be read.
    pub fn load(&self) -> io::Result<Settings> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(parse(&contents)),
            Err(why) if why.kind() == io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no settings file, using defaults");
                Ok(Settings::new())
            }
            Err(why) => Err(why),
        }
    }

    /// Load the engine snapshot, falling back to defaults if the file is unreadable.
    pub fn load_engine_config(&self) -> EngineConfig {
        match self.load() {
            Ok(settings) => EngineConfig::from_settings(&settings),
            Err(why) => {
                tracing::warn!(?why, path = %self.path.display(), "settings unreadable, using defaults");
                EngineConfig::default()
            }
        }
    }

    /// Rewrite the whole file, one entry per line in key order.
    ///
    /// # Errors
    ///
    /// Fails if the parent directory cannot be created or the file cannot be written.
    pub fn save(&self, settings: &Settings) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut contents = String::new();
        for (key, value) in settings {
            contents.push_str(key);
            contents.push('=');
            contents.push_str(value);
            contents.push('\n');
        }

        fs::write(&self.path, contents)?;
        tracing::debug!(path = %self.path.display(), entries = settings.len(), "settings saved");
        Ok(())
    }

    /// Store an engine snapshot without disturbing keys owned by other components.
    ///
    /// # Errors
    ///
    /// Fails if the existing file cannot be read or the new one cannot be written.
    pub fn save_engine_config(&self, config: &EngineConfig) -> io::Result<()> {
        let mut settings = self.load()?;
        config.apply_to(&mut settings);
        self.save(&settings)
    }
}

fn parse(contents: &str) -> Settings {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_owned(), value.trim().to_owned()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_skips_comments_and_splits_on_first_equals() {
        let settings = parse("# comment\n\nCAM_FPS = 30\nREACTIVE_AUTH_COOKIE=a=b\nbroken line\n");

        assert_eq!(settings.len(), 2);
        assert_eq!(settings["CAM_FPS"], "30");
        assert_eq!(settings["REACTIVE_AUTH_COOKIE"], "a=b");
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = ConfigFile::new(dir.path().join("absent.txt"));

        assert!(file.load().unwrap().is_empty());
        assert_eq!(file.load_engine_config(), EngineConfig::default());
    }

    #[test]
    fn save_engine_config_preserves_foreign_entries() {
        let dir = tempfile::tempdir().unwrap();
        let file = ConfigFile::new(dir.path().join("nested").join("config.txt"));
        fs::create_dir_all(dir.path().join("nested")).unwrap();
        fs::write(file.path(), "SETUP_COMPLETE=True\nCAM_FPS=15\n").unwrap();

        let config = EngineConfig::default().cam_fps(30u32).bouncing_enabled(false);
        file.save_engine_config(&config).unwrap();

        let settings = file.load().unwrap();
        assert_eq!(settings["SETUP_COMPLETE"], "True");
        assert_eq!(settings["CAM_FPS"], "30");
        assert_eq!(file.load_engine_config(), config);
    }
}
