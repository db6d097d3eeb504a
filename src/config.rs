//! Generator configuration, loaded from a TOML file.
//!
//! Replaces the original generator's global configuration dictionary
//! (`cbexigen.tools_config.CONFIG_PARAMS`) with a single immutable value
//! threaded explicitly through the pipeline.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Static,
    Converter,
    Decoder,
    Encoder,
}

/// One entry of `c_files_to_generate`: a (header, implementation) pair to
/// emit for a given schema/prefix/kind.
#[derive(Debug, Clone, Deserialize)]
pub struct FileSpec {
    pub schema: String,
    pub prefix: String,
    pub kind: FileKind,
    pub folder: String,
    pub header: String,
    pub source: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub add_debug_code: bool,
    pub apply_optimizations: bool,
    pub array_optimizations: HashMap<String, u32>,
    pub field_optimizations: HashMap<String, Vec<String>>,
    pub fragments: Vec<String>,
    pub root_struct_name: String,
    pub root_parameter_name: String,
    pub init_function_prefix: String,
    pub encode_function_prefix: String,
    pub decode_function_prefix: String,
    pub choice_sequence_prefix: String,
    pub array_define_addendum: String,
    pub char_define_addendum: String,
    pub byte_define_addendum: String,
    pub occurrence_limits: HashMap<String, u32>,
    pub files: Vec<FileSpec>,
    pub depth_limit: u32,
    pub cycle_attempt_limit: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            add_debug_code: false,
            apply_optimizations: false,
            array_optimizations: HashMap::new(),
            field_optimizations: HashMap::new(),
            fragments: Vec::new(),
            root_struct_name: "exiDocument".to_string(),
            root_parameter_name: "exiDoc".to_string(),
            init_function_prefix: "init_".to_string(),
            encode_function_prefix: "encode_".to_string(),
            decode_function_prefix: "decode_".to_string(),
            choice_sequence_prefix: "choice_seq_".to_string(),
            array_define_addendum: "_ARRAY_SIZE".to_string(),
            char_define_addendum: "_CHARACTERS_SIZE".to_string(),
            byte_define_addendum: "_BYTES_SIZE".to_string(),
            occurrence_limits: HashMap::new(),
            files: Vec::new(),
            depth_limit: 10,
            cycle_attempt_limit: 10_000,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks each `FileSpec` references one of the schemas passed on the
    /// command line. `known_schemas` is the `--schema` argument
    /// list; an empty list means the driver hasn't restricted schemas and
    /// every entry is accepted.
    pub fn validate_against(&self, known_schemas: &[String]) -> Result<(), ConfigError> {
        if known_schemas.is_empty() {
            return Ok(());
        }
        for entry in &self.files {
            if !known_schemas.iter().any(|s| s == &entry.schema) {
                return Err(ConfigError::UnknownSchema {
                    entry: entry.header.clone(),
                    schema: entry.schema.clone(),
                });
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.validate_against(&[])
    }

    /// Occurrence cap configured for a particle name, if any.
    pub fn occurrence_limit(&self, particle_name: &str) -> Option<u32> {
        self.occurrence_limits.get(particle_name).copied()
    }

    /// Per-type array occurrence cap for the optional optimization pass.
    pub fn array_optimization_cap(&self, type_name: &str) -> Option<u32> {
        if !self.apply_optimizations {
            return None;
        }
        self.array_optimizations.get(type_name).copied()
    }

    /// Whether `field_name` should be suppressed within `parent_type_name`
    /// (`field_optimizations`).
    pub fn field_is_suppressed(&self, field_name: &str, parent_type_name: &str) -> bool {
        self.field_optimizations
            .get(field_name)
            .map(|parents| parents.iter().any(|p| p == parent_type_name))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.depth_limit, 10);
        assert!(!config.apply_optimizations);
        assert!(config.files.is_empty());
    }

    #[test]
    fn load_missing_file_is_config_error() {
        let err = Config::load(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn parses_minimal_toml() {
        let dir = std::env::temp_dir();
        let path = dir.join("v2g_exi_codegen_test_config.toml");
        std::fs::write(
            &path,
            r#"
            add_debug_code = true
            apply_optimizations = true

            [array_optimizations]
            PMaxScheduleEntryType = 12

            [occurrence_limits]
            SalesTariffEntry = 5
            Reference = 4
            "#,
        )
        .unwrap();
        let config = Config::load(&path).unwrap();
        assert!(config.add_debug_code);
        assert_eq!(config.occurrence_limit("SalesTariffEntry"), Some(5));
        assert_eq!(config.array_optimization_cap("PMaxScheduleEntryType"), Some(12));
        std::fs::remove_file(&path).ok();
    }
}
