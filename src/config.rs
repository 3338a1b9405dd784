//! Interop Configuration
//!
//! Handles parsing and management of interop.toml configuration files.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name searched for by [`InteropConfig::find_and_load`]
pub const CONFIG_FILE_NAME: &str = "interop.toml";

/// Largest accepted `buffers.arena_slots`
pub const MAX_ARENA_SLOTS: usize = 4096;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Root configuration structure matching interop.toml.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct InteropConfig {
    /// Engine library location
    #[serde(default)]
    pub engine: EngineConfig,

    /// C symbol names of the engine queries
    #[serde(default)]
    pub symbols: SymbolConfig,

    /// Staging buffer arena
    #[serde(default)]
    pub buffers: BufferConfig,
}

impl InteropConfig {
    /// Load configuration from a file path.
    ///
    /// A relative engine library path is resolved against the file's
    /// directory.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&content)?;
        if let Some(base) = path.parent() {
            config.engine.resolve_relative_to(base);
        }
        Ok(config)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that parse but cannot be used.
    pub fn validate(&self) -> ConfigResult<()> {
        self.buffers.validate()
    }

    /// Load configuration from the current directory or parents.
    pub fn load_from_cwd() -> ConfigResult<Self> {
        let cwd = std::env::current_dir().map_err(ConfigError::Io)?;
        Self::find_and_load(&cwd)
    }

    /// Find and load configuration by searching up from the given directory.
    pub fn find_and_load(start_dir: &Path) -> ConfigResult<Self> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return Self::load(&config_path);
            }
            if !dir.pop() {
                // Reached root without finding config
                return Ok(Self::default());
            }
        }
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Engine library location.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct EngineConfig {
    /// Path to the engine shared library
    #[serde(default)]
    pub library: Option<PathBuf>,
}

impl EngineConfig {
    fn resolve_relative_to(&mut self, base: &Path) {
        if let Some(library) = &self.library {
            if library.is_relative() && library.components().count() > 1 {
                self.library = Some(base.join(library));
            }
        }
    }
}

/// C symbol names of the engine's liveness and accessor queries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SymbolConfig {
    /// `bool (uint32_t kind, void *raw)`
    #[serde(default = "default_is_alive")]
    pub is_alive: String,

    /// `int64_t (uint32_t kind, void *raw)`
    #[serde(default = "default_object_id")]
    pub object_id: String,

    /// `void (uint32_t kind, void *raw, char *out, size_t capacity)`
    #[serde(default = "default_object_name")]
    pub object_name: String,
}

fn default_is_alive() -> String {
    "engine_object_is_alive".to_string()
}

fn default_object_id() -> String {
    "engine_object_id".to_string()
}

fn default_object_name() -> String {
    "engine_object_name".to_string()
}

impl Default for SymbolConfig {
    fn default() -> Self {
        Self {
            is_alive: default_is_alive(),
            object_id: default_object_id(),
            object_name: default_object_name(),
        }
    }
}

/// Staging buffer arena sizing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BufferConfig {
    /// Number of pinned blocks to pre-allocate, one per concurrent context
    #[serde(default = "default_arena_slots")]
    pub arena_slots: usize,
}

fn default_arena_slots() -> usize {
    64
}

impl BufferConfig {
    /// Check that the arena size is within [`MAX_ARENA_SLOTS`]
    pub fn validate(&self) -> ConfigResult<()> {
        if self.arena_slots > MAX_ARENA_SLOTS {
            return Err(ConfigError::Invalid(format!(
                "buffers.arena_slots = {} exceeds the maximum of {}",
                self.arena_slots, MAX_ARENA_SLOTS
            )));
        }
        Ok(())
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            arena_slots: default_arena_slots(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = InteropConfig::default();
        assert_eq!(config.engine.library, None);
        assert_eq!(config.symbols.is_alive, "engine_object_is_alive");
        assert_eq!(config.buffers.arena_slots, 64);
    }

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
[engine]
library = "/opt/engine/libengine.so"

[symbols]
is_alive = "rt_alive"

[buffers]
arena_slots = 8
"#;
        let config = InteropConfig::parse(toml_str).unwrap();
        assert_eq!(
            config.engine.library.as_deref(),
            Some(Path::new("/opt/engine/libengine.so"))
        );
        assert_eq!(config.symbols.is_alive, "rt_alive");
        // Unset symbols keep their defaults
        assert_eq!(config.symbols.object_name, "engine_object_name");
        assert_eq!(config.buffers.arena_slots, 8);
    }

    #[test]
    fn test_parse_error() {
        let err = InteropConfig::parse("[buffers]\narena_slots = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_oversized_arena_rejected() {
        let err = InteropConfig::parse("[buffers]\narena_slots = 4503599627370496").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("arena_slots"));

        let at_limit = format!("[buffers]\narena_slots = {}", MAX_ARENA_SLOTS);
        assert_eq!(
            InteropConfig::parse(&at_limit).unwrap().buffers.arena_slots,
            MAX_ARENA_SLOTS
        );
    }

    #[test]
    fn test_load_rejects_oversized_arena() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[buffers]\narena_slots = 100000\n").unwrap();

        let err = InteropConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = InteropConfig::load(Path::new("/definitely/not/here/interop.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_save_and_find_from_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let mut config = InteropConfig::default();
        config.engine.library = Some(PathBuf::from("lib/libengine.so"));
        config.buffers.arena_slots = 4;
        config.save(&dir.path().join(CONFIG_FILE_NAME)).unwrap();

        let found = InteropConfig::find_and_load(&nested).unwrap();
        assert_eq!(found.buffers.arena_slots, 4);
        assert_eq!(
            found.engine.library,
            Some(dir.path().join("lib/libengine.so"))
        );
    }

    #[test]
    fn test_bare_library_name_left_for_search_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[engine]\nlibrary = \"libengine.so\"\n").unwrap();

        let config = InteropConfig::load(&path).unwrap();
        assert_eq!(config.engine.library, Some(PathBuf::from("libengine.so")));
    }
}
