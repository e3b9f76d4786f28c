//! TOML configuration: logging plus one `[[families]]` table per router.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use intakekit_log::SpecLogConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::conf::C_DATA_DIR_APP_NAME;
use crate::router::{DispatchChain, ResultRouter};
use crate::spec::{RouterError, SpecImportFamily, SpecImportOptions};
use crate::util::{compile_accept_patterns, normalize_extension};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config field `{field}`: {reason}")]
    Invalid { field: String, reason: String },
    #[error(transparent)]
    Router(#[from] RouterError),
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field: field.into(),
        reason: reason.into(),
    }
}

fn default_true() -> bool {
    true
}

/// One request family; file order is dispatch priority.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpecFamilyConfig {
    pub name: String,
    pub token_base: u64,
    /// Defaults to `<data-local-dir>/intakekit/<name>`.
    #[serde(default)]
    pub dir_destination: Option<PathBuf>,
    #[serde(default)]
    pub ext_default: String,
    #[serde(default)]
    pub patterns_accept: Option<Vec<String>>,
    #[serde(default = "default_true")]
    pub if_preserve_mtime: bool,
    #[serde(default)]
    pub if_record_origin: bool,
}

impl SpecFamilyConfig {
    fn resolve_dir_destination(&self) -> Result<PathBuf, ConfigError> {
        if let Some(dir) = &self.dir_destination {
            return Ok(dir.clone());
        }
        let dir_data = dirs::data_local_dir().ok_or_else(|| {
            invalid(
                format!("families.{}.dir_destination", self.name),
                "no platform data directory; set it explicitly",
            )
        })?;
        Ok(dir_data.join(C_DATA_DIR_APP_NAME).join(&self.name))
    }

    /// Family spec with the destination resolved and the extension normalized.
    pub fn to_family(&self) -> Result<SpecImportFamily, ConfigError> {
        Ok(SpecImportFamily {
            name: self.name.clone(),
            token_base: self.token_base,
            dir_destination: self.resolve_dir_destination()?,
            spec_options: SpecImportOptions {
                ext_default: normalize_extension(&self.ext_default),
                patterns_accept: self.patterns_accept.clone(),
                if_preserve_mtime: self.if_preserve_mtime,
                if_record_origin: self.if_record_origin,
            },
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpecImportConfig {
    #[serde(default)]
    pub log: SpecLogConfig,
    #[serde(default)]
    pub families: Vec<SpecFamilyConfig>,
}

impl SpecImportConfig {
    /// Parse and validate.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let spec_config: Self = toml::from_str(content)?;
        spec_config.validate()?;
        Ok(spec_config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.families.is_empty() {
            return Err(invalid("families", "at least one family is required"));
        }

        let mut set_names = HashSet::new();
        let mut set_token_bases = HashSet::new();
        for spec_family in &self.families {
            let name = spec_family.name.trim();
            if name.is_empty() {
                return Err(invalid("families.name", "must not be empty"));
            }
            if !set_names.insert(name) {
                return Err(invalid(
                    "families.name",
                    format!("duplicate family `{name}`"),
                ));
            }
            if !set_token_bases.insert(spec_family.token_base) {
                return Err(invalid(
                    format!("families.{name}.token_base"),
                    format!("token base {} already used", spec_family.token_base),
                ));
            }
            compile_accept_patterns(spec_family.patterns_accept.as_deref())
                .map_err(|e| invalid(format!("families.{name}.patterns_accept"), e.to_string()))?;
        }
        Ok(())
    }

    /// One router per family, in file order.
    pub fn build_chain(&self) -> Result<DispatchChain, ConfigError> {
        let mut chain = DispatchChain::new();
        for spec_family in &self.families {
            chain.push_router(ResultRouter::new(spec_family.to_family()?))?;
        }
        Ok(chain)
    }
}

/// Read, parse and validate a TOML config file.
pub fn load_config(path_config: &Path) -> Result<SpecImportConfig, ConfigError> {
    let content = fs::read_to_string(path_config).map_err(|e| ConfigError::Read {
        path: path_config.to_path_buf(),
        source: e,
    })?;
    SpecImportConfig::from_toml_str(&content)
}

#[cfg(test)]
mod tests {
    use intakekit_log::EnumLogFormat;
    use tempfile::TempDir;

    use super::*;

    const C_CONFIG_TWO_FAMILIES: &str = r#"
[log]
level = "debug"
format = "json"

[[families]]
name = "document"
token_base = 9001
dir_destination = "/data/app/pdfs"
ext_default = "pdf"
patterns_accept = ["*.pdf"]

[[families]]
name = "package"
token_base = 9002
ext_default = ".snbx"
if_preserve_mtime = false
if_record_origin = true
"#;

    #[test]
    fn config_parses_families_in_order() {
        let spec_config = SpecImportConfig::from_toml_str(C_CONFIG_TWO_FAMILIES).expect("parse");
        assert_eq!(spec_config.log.level, "debug");
        assert_eq!(spec_config.log.format, EnumLogFormat::Json);
        assert_eq!(spec_config.families.len(), 2);

        let spec_doc = spec_config.families[0].to_family().expect("family");
        assert_eq!(spec_doc.dir_destination, PathBuf::from("/data/app/pdfs"));
        assert_eq!(spec_doc.spec_options.ext_default, ".pdf");
        assert!(spec_doc.spec_options.if_preserve_mtime);
        assert!(!spec_doc.spec_options.if_record_origin);

        let spec_pkg = &spec_config.families[1];
        assert!(!spec_pkg.if_preserve_mtime);
        assert!(spec_pkg.if_record_origin);
        assert_eq!(spec_pkg.patterns_accept, None);

        let chain = spec_config.build_chain().expect("chain");
        assert_eq!(chain.family_names(), vec!["document", "package"]);
    }

    #[test]
    fn config_defaults_destination_under_data_dir() {
        let spec_config = SpecImportConfig::from_toml_str(C_CONFIG_TWO_FAMILIES).expect("parse");
        if let Some(dir_data) = dirs::data_local_dir() {
            let spec_pkg = spec_config.families[1].to_family().expect("family");
            assert_eq!(
                spec_pkg.dir_destination,
                dir_data.join("intakekit").join("package")
            );
        }
    }

    #[test]
    fn config_rejects_invalid_families() {
        let l_cases = [
            "",
            "[[families]]\nname = \" \"\ntoken_base = 1\n",
            "[[families]]\nname = \"a\"\ntoken_base = 1\n[[families]]\nname = \"a\"\ntoken_base = 2\n",
            "[[families]]\nname = \"a\"\ntoken_base = 1\n[[families]]\nname = \"b\"\ntoken_base = 1\n",
            "[[families]]\nname = \"a\"\ntoken_base = 1\npatterns_accept = [\"[\"]\n",
        ];
        for content in l_cases {
            let err = SpecImportConfig::from_toml_str(content).expect_err(content);
            assert!(matches!(err, ConfigError::Invalid { .. }), "{content}: {err}");
        }
    }

    #[test]
    fn config_rejects_unknown_keys() {
        let err = SpecImportConfig::from_toml_str(
            "[[families]]\nname = \"a\"\ntoken_base = 1\ncolour = \"red\"\n",
        )
        .expect_err("unknown key");
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_config_reads_file_and_reports_missing() {
        let tmp = TempDir::new().expect("tempdir");
        let path_config = tmp.path().join("intakekit.toml");
        fs::write(&path_config, C_CONFIG_TWO_FAMILIES).expect("write");

        let spec_config = load_config(&path_config).expect("load");
        assert_eq!(spec_config.families[0].name, "document");

        let err = load_config(&tmp.path().join("missing.toml")).expect_err("missing");
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
