// ⚙️ Importer configuration (TOML)

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::decoder::SourceEncoding;
use crate::error::ConfigError;
use crate::importer::CsvOptions;
use crate::levels::{LevelScheme, DEFAULT_PREFIX};
use crate::parser::Delimiter;
use crate::resolver::CompetencyOptions;

/// Settings shared by every CLI subcommand. Flags override what is read here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImporterConfig {
    pub database: PathBuf,
    pub framework_prefix: String,
    pub encoding: SourceEncoding,
    pub delimiter: Delimiter,
    pub user_id: i64,
    pub overwrite: bool,
    pub create_missing_levels: bool,
}

impl Default for ImporterConfig {
    fn default() -> Self {
        ImporterConfig {
            database: PathBuf::from("competencies.db"),
            framework_prefix: DEFAULT_PREFIX.to_string(),
            encoding: SourceEncoding::utf8(),
            delimiter: Delimiter::Comma,
            user_id: 0,
            overwrite: false,
            create_missing_levels: true,
        }
    }
}

impl ImporterConfig {
    /// Load from `path`. No path, or a path that does not exist, gives defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(ImporterConfig::default());
        };

        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ImporterConfig::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn scheme(&self) -> LevelScheme {
        LevelScheme::new(&self.framework_prefix)
    }

    pub fn csv_options(&self) -> CsvOptions {
        CsvOptions {
            encoding: self.encoding,
            delimiter: self.delimiter,
        }
    }

    pub fn competency_options(&self) -> CompetencyOptions {
        CompetencyOptions {
            overwrite: self.overwrite,
            create_missing_levels: self.create_missing_levels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ImporterConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config, ImporterConfig::default());
        assert_eq!(ImporterConfig::load(None).unwrap(), ImporterConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "framework_prefix = \"CONOCER\"").unwrap();
        writeln!(file, "encoding = \"latin1\"").unwrap();
        writeln!(file, "delimiter = \"semicolon\"").unwrap();
        writeln!(file, "overwrite = true").unwrap();

        let config = ImporterConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.scheme().root_id(), "CONOCER-PRINCIPAL");
        assert_eq!(config.encoding.name(), "windows-1252");
        assert_eq!(config.delimiter, Delimiter::Semicolon);
        assert!(config.competency_options().overwrite);
        assert!(config.competency_options().create_missing_levels);
        assert_eq!(config.database, PathBuf::from("competencies.db"));
    }

    #[test]
    fn test_invalid_values_are_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "encoding = \"klingon\"").unwrap();
        let err = ImporterConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "delimiter = \"pipe\"").unwrap();
        assert!(ImporterConfig::load(Some(file.path())).is_err());
    }
}
