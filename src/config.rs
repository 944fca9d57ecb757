// src/config.rs

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Selector;
use serde::Deserialize;
use std::{
    collections::{BTreeMap, HashSet},
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::debug;
use url::Url;

use crate::error::ConfigError;
use crate::normalize::DEFAULT_DATE_FORMATS;
use crate::table::{default_columns, ColumnKind, ColumnSpec};

/// Config file looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "ukcovid.yaml";

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_DATA_PATH: &str = "data";
const DEFAULT_TABLE_SELECTOR: &str = "table";

static ENV_VAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Which extractor handles the response body.
#[derive(Debug, Deserialize, PartialEq, Clone, Copy, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// Decide from the content type, then from the body itself.
    #[default]
    Auto,
    Json,
    Html,
}

#[derive(Debug, Deserialize, PartialEq, Clone, Eq)]
#[serde(untagged)]
pub enum Credentials {
    Bearer {
        bearer_token: String,
    },
    Basic {
        username: String,
        #[serde(default)]
        password: Option<String>,
    },
}

/// The file as written; required keys are optional here so a missing one
/// is reported by name rather than as a YAML error.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    source_url: Option<String>,
    output_path: Option<PathBuf>,
    timeout_seconds: Option<u64>,
    verify_tls: Option<bool>,
    #[serde(default)]
    format: SourceFormat,
    #[serde(default)]
    query: BTreeMap<String, String>,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    user_agent: Option<String>,
    credentials: Option<Credentials>,
    data_path: Option<String>,
    table_selector: Option<String>,
    #[serde(default)]
    date_formats: Vec<String>,
    columns: Option<Vec<ColumnSpec>>,
}

/// Validated run settings; immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub source_url: Url,
    pub output_path: PathBuf,
    pub timeout: Duration,
    pub verify_tls: bool,
    pub format: SourceFormat,
    pub query: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    pub user_agent: String,
    pub credentials: Option<Credentials>,
    pub data_path: String,
    pub table_selector: String,
    pub date_formats: Vec<String>,
    pub columns: Vec<ColumnSpec>,
}

impl Config {
    /// Read, substitute `${VAR}` references, parse and validate `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), bytes = text.len(), "read config");
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let mut doc: serde_yaml::Value = serde_yaml::from_str(text)?;
        if doc.is_null() {
            doc = serde_yaml::Value::Mapping(Default::default());
        }
        substitute_env_vars(&mut doc)?;
        let raw: RawConfig = serde_yaml::from_value(doc)?;
        raw.validate()
    }

    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = path.into();
        self
    }
}

impl RawConfig {
    fn validate(self) -> Result<Config, ConfigError> {
        let source_url = self
            .source_url
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::MissingKey("source_url"))?;
        let source_url = Url::parse(source_url.trim()).map_err(|e| ConfigError::Invalid {
            key: "source_url",
            message: e.to_string(),
        })?;
        if !matches!(source_url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                key: "source_url",
                message: format!("unsupported scheme `{}`", source_url.scheme()),
            });
        }

        let output_path = self
            .output_path
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or(ConfigError::MissingKey("output_path"))?;

        let timeout_seconds = self.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS);
        if timeout_seconds == 0 {
            return Err(ConfigError::Invalid {
                key: "timeout_seconds",
                message: "must be greater than zero".into(),
            });
        }

        let table_selector = self
            .table_selector
            .unwrap_or_else(|| DEFAULT_TABLE_SELECTOR.to_string());
        Selector::parse(&table_selector).map_err(|e| ConfigError::Invalid {
            key: "table_selector",
            message: format!("{:?}", e),
        })?;

        if self.date_formats.iter().any(|f| f.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                key: "date_formats",
                message: "formats must not be empty".into(),
            });
        }

        let date_formats = if self.date_formats.is_empty() {
            DEFAULT_DATE_FORMATS.iter().map(|f| f.to_string()).collect()
        } else {
            self.date_formats
        };

        let columns = self.columns.unwrap_or_else(default_columns);
        validate_columns(&columns)?;

        Ok(Config {
            source_url,
            output_path,
            timeout: Duration::from_secs(timeout_seconds),
            verify_tls: self.verify_tls.unwrap_or(true),
            format: self.format,
            query: self.query,
            headers: self.headers,
            user_agent: self.user_agent.unwrap_or_else(|| {
                format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
            }),
            credentials: self.credentials,
            data_path: self
                .data_path
                .unwrap_or_else(|| DEFAULT_DATA_PATH.to_string()),
            table_selector,
            date_formats,
            columns,
        })
    }
}

fn validate_columns(columns: &[ColumnSpec]) -> Result<(), ConfigError> {
    let invalid = |message: String| ConfigError::Invalid {
        key: "columns",
        message,
    };

    if columns.is_empty() {
        return Err(invalid("at least one column is required".into()));
    }
    if let Some(c) = columns.iter().find(|c| c.source.trim().is_empty()) {
        return Err(invalid(format!("column `{}` has an empty source", c.output_name())));
    }

    let mut seen = HashSet::new();
    for c in columns {
        if !seen.insert(c.output_name()) {
            return Err(invalid(format!("duplicate column name `{}`", c.output_name())));
        }
    }

    for kind in [ColumnKind::Date, ColumnKind::Region] {
        let n = columns.iter().filter(|c| c.kind == kind).count();
        if n != 1 {
            return Err(invalid(format!(
                "expected exactly one {:?} column, found {}",
                kind, n
            )));
        }
    }
    Ok(())
}

/// Replace `${VAR_NAME}` references inside string values of a parsed
/// document. Keys, comments and non-string scalars are left alone, and a
/// substituted value can never change the document's structure.
pub fn substitute_env_vars(doc: &mut serde_yaml::Value) -> Result<(), ConfigError> {
    let mut missing = Vec::new();
    substitute_in(doc, &mut missing);
    if !missing.is_empty() {
        return Err(ConfigError::MissingEnv(missing.join(", ")));
    }
    Ok(())
}

fn substitute_in(value: &mut serde_yaml::Value, missing: &mut Vec<String>) {
    use serde_yaml::Value as Yaml;

    match value {
        Yaml::String(s) if ENV_VAR_RE.is_match(s.as_str()) => {
            let replaced = ENV_VAR_RE.replace_all(s.as_str(), |caps: &regex::Captures| {
                std::env::var(&caps[1]).unwrap_or_else(|_| {
                    missing.push(caps[1].to_string());
                    String::new()
                })
            });
            *s = replaced.into_owned();
        }
        Yaml::Sequence(items) => items.iter_mut().for_each(|v| substitute_in(v, missing)),
        Yaml::Mapping(map) => map.values_mut().for_each(|v| substitute_in(v, missing)),
        Yaml::Tagged(tagged) => substitute_in(&mut tagged.value, missing),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL: &str = "source_url: https://api.coronavirus.data.gov.uk/v1/data\n\
                           output_path: out/uk.csv\n";

    #[test]
    fn minimal_file_gets_defaults() -> Result<()> {
        let cfg = Config::from_yaml_str(MINIMAL)?;
        assert_eq!(cfg.source_url.host_str(), Some("api.coronavirus.data.gov.uk"));
        assert_eq!(cfg.output_path, PathBuf::from("out/uk.csv"));
        assert_eq!(cfg.timeout, Duration::from_secs(30));
        assert!(cfg.verify_tls);
        assert_eq!(cfg.format, SourceFormat::Auto);
        assert_eq!(cfg.data_path, "data");
        assert_eq!(cfg.table_selector, "table");
        assert_eq!(cfg.columns, default_columns());
        assert_eq!(cfg.date_formats.len(), DEFAULT_DATE_FORMATS.len());
        assert!(cfg.user_agent.starts_with("ukcovid/"));
        Ok(())
    }

    #[test]
    fn full_file_overrides_defaults() -> Result<()> {
        let yaml = r#"
source_url: https://example.org/stats
output_path: /tmp/stats.csv
timeout_seconds: 5
verify_tls: false
format: html
query:
  areaType: nation
headers:
  Accept: text/html
table_selector: "table#cases"
date_formats: ["%d %B %Y"]
columns:
  - { source: "Date", name: date, kind: date }
  - { source: "Nation", name: region, kind: region }
  - { source: "Cases", name: cases, kind: integer }
"#;
        let cfg = Config::from_yaml_str(yaml)?;
        assert_eq!(cfg.timeout, Duration::from_secs(5));
        assert!(!cfg.verify_tls);
        assert_eq!(cfg.format, SourceFormat::Html);
        assert_eq!(cfg.query.get("areaType").map(String::as_str), Some("nation"));
        assert_eq!(cfg.table_selector, "table#cases");
        assert_eq!(cfg.date_formats, vec!["%d %B %Y".to_string()]);
        assert_eq!(cfg.columns.len(), 3);
        Ok(())
    }

    #[test]
    fn missing_required_keys_are_named() {
        let err = Config::from_yaml_str("output_path: a.csv\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey("source_url")));

        let err = Config::from_yaml_str("source_url: https://x.org\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey("output_path")));

        let err =
            Config::from_yaml_str("source_url: \"  \"\noutput_path: a.csv\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey("source_url")));
    }

    #[test]
    fn rejects_bad_values() {
        let cases = [
            ("source_url: not a url\noutput_path: a.csv\n", "source_url"),
            ("source_url: ftp://x.org/f\noutput_path: a.csv\n", "source_url"),
            (
                "source_url: https://x.org\noutput_path: a.csv\ntimeout_seconds: 0\n",
                "timeout_seconds",
            ),
            (
                "source_url: https://x.org\noutput_path: a.csv\ntable_selector: \"<<\"\n",
                "table_selector",
            ),
            (
                "source_url: https://x.org\noutput_path: a.csv\ncolumns:\n  - { source: d, kind: date }\n",
                "columns",
            ),
        ];
        for (yaml, expected) in cases {
            match Config::from_yaml_str(yaml) {
                Err(ConfigError::Invalid { key, .. }) => assert_eq!(key, expected, "{}", yaml),
                other => panic!("expected invalid {}, got {:?}", expected, other),
            }
        }
    }

    #[test]
    fn duplicate_column_names_rejected() {
        let yaml = "source_url: https://x.org\noutput_path: a.csv\ncolumns:\n  \
                    - { source: d, kind: date }\n  - { source: r, name: d, kind: region }\n";
        let err = Config::from_yaml_str(yaml).unwrap_err();
        assert!(err.to_string().contains("columns"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Config::from_yaml_str(&format!("{}output: x\n", MINIMAL)).unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn env_vars_fill_credentials() -> Result<()> {
        std::env::set_var("UKCOVID_TEST_TOKEN", "s3cret");
        let yaml = format!("{}credentials:\n  bearer_token: ${{UKCOVID_TEST_TOKEN}}\n", MINIMAL);
        let cfg = Config::from_yaml_str(&yaml)?;
        std::env::remove_var("UKCOVID_TEST_TOKEN");
        assert_eq!(
            cfg.credentials,
            Some(Credentials::Bearer {
                bearer_token: "s3cret".into()
            })
        );
        Ok(())
    }

    #[test]
    fn comments_are_not_substituted() -> Result<()> {
        let yaml = format!(
            "# token: ${{UKCOVID_DEFINITELY_UNSET_VAR}}\n{}data_path: data # ${{UKCOVID_DEFINITELY_UNSET_VAR}}\n",
            MINIMAL
        );
        let cfg = Config::from_yaml_str(&yaml)?;
        assert_eq!(cfg.data_path, "data");
        Ok(())
    }

    #[test]
    fn substituted_values_keep_document_structure() -> Result<()> {
        std::env::set_var("UKCOVID_TEST_AWKWARD", "*a: b # c");
        let yaml = format!("{}user_agent: ${{UKCOVID_TEST_AWKWARD}}\n", MINIMAL);
        let cfg = Config::from_yaml_str(&yaml);
        std::env::remove_var("UKCOVID_TEST_AWKWARD");
        assert_eq!(cfg?.user_agent, "*a: b # c");
        Ok(())
    }

    #[test]
    fn missing_env_var_is_an_error() {
        let yaml = format!(
            "{}headers:\n  Authorization: \"Bearer ${{UKCOVID_DEFINITELY_UNSET_VAR}}\"\n",
            MINIMAL
        );
        let err = Config::from_yaml_str(&yaml).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv(v) if v == "UKCOVID_DEFINITELY_UNSET_VAR"));
    }

    #[test]
    fn example_config_is_valid() -> Result<()> {
        let cfg = Config::from_yaml_str(include_str!("../ukcovid.example.yaml"))?;
        assert_eq!(cfg.columns, default_columns());
        assert!(cfg.query.contains_key("structure"));
        Ok(())
    }

    #[test]
    fn load_reads_file_and_reports_missing_file() -> Result<()> {
        let mut f = NamedTempFile::new()?;
        f.write_all(MINIMAL.as_bytes())?;
        let cfg = Config::load(f.path())?;
        assert_eq!(cfg.output_path, PathBuf::from("out/uk.csv"));

        let err = Config::load(f.path().with_extension("absent")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        Ok(())
    }
}
