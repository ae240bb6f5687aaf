use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Dotenv-style file read from the working directory
pub const DEFAULT_ENV_FILE: &str = ".env";
/// Project id shipped in the sample `.env`
pub const PLACEHOLDER_PROJECT_ID: &str = "your-gcp-project-id";

/// Flat key/value settings, keys upper-cased
pub type Settings = HashMap<String, String>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Ensure {} are set", .0.join(", "))]
    Missing(Vec<&'static str>),
    #[error("Please update {0} in your .env file")]
    Placeholder(&'static str),
    #[error("Cannot read the env file at path {1}")]
    Read(#[source] std::io::Error, PathBuf),
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// Merge the optional env file with the process environment.
///
/// Environment values win over the file. A missing file is not an error,
/// values may come from the environment alone. `env` replaces the process
/// environment when given.
pub fn load_settings(path: &Path, env: Option<HashMap<String, String>>) -> Result<Settings, ConfigError> {
    let mut values = Settings::new();

    // Each layer is collected on its own so key casing can't make the merge ambiguous
    if path.is_file() {
        tracing::debug!("Loading settings from {}", path.display());
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Read(e, path.to_path_buf()))?;
        let mut file = config::Config::builder();
        for (key, value) in parse_env_file(&contents) {
            file = file.set_override(key, value)?;
        }
        values.extend(normalize(file.build()?.try_deserialize()?));
    } else {
        tracing::warn!("Could not load {} file, using process environment", path.display());
    }

    let mut environment = config::Environment::default();
    if let Some(vars) = env {
        environment = environment.source(Some(vars.into_iter().collect()));
    }
    let environment = config::Config::builder().add_source(environment).build()?;
    values.extend(normalize(environment.try_deserialize()?));

    Ok(values)
}

/// Upper-case keys, drop nested values (dotted env names parse as tables)
fn normalize(values: HashMap<String, config::Value>) -> impl Iterator<Item = (String, String)> {
    values.into_iter().filter_map(|(key, value)| {
        let value = value.into_string().ok()?;
        Some((key.to_uppercase(), value.trim().to_string()))
    })
}

/// Parse dotenv lines into key/value pairs.
///
/// Accepts an optional `export ` prefix. Unquoted values end at a ` #`
/// comment; single quotes are literal; double quotes expand `\n`, `\"`
/// and `\\`. Lines without `=` are skipped.
pub fn parse_env_file(contents: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();

    for (number, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);

        let Some((key, raw)) = line.split_once('=') else {
            tracing::warn!("Skipping line {} of env file, expected KEY=VALUE", number + 1);
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }

        pairs.push((key.to_string(), parse_env_value(raw.trim())));
    }

    pairs
}

fn parse_env_value(raw: &str) -> String {
    if let Some(rest) = raw.strip_prefix('\'') {
        return match rest.find('\'') {
            Some(end) => rest[..end].to_string(),
            None => rest.to_string(),
        };
    }

    if let Some(rest) = raw.strip_prefix('"') {
        let mut value = String::new();
        let mut chars = rest.chars();
        while let Some(c) = chars.next() {
            match c {
                '"' => break,
                '\\' => match chars.next() {
                    Some('n') => value.push('\n'),
                    Some(other) => value.push(other),
                    None => value.push('\\'),
                },
                _ => value.push(c),
            }
        }
        return value;
    }

    // Inline comments need whitespace before the '#'
    let end = raw
        .char_indices()
        .find(|(i, c)| *c == '#' && raw[..*i].ends_with(char::is_whitespace))
        .map(|(i, _)| i)
        .unwrap_or(raw.len());
    raw[..end].trim_end().to_string()
}

fn required(settings: &Settings, key: &'static str, missing: &mut Vec<&'static str>) -> String {
    match settings.get(key) {
        Some(value) if !value.is_empty() => value.clone(),
        _ => {
            missing.push(key);
            String::new()
        }
    }
}

fn check_project(project_id: &str) -> Result<(), ConfigError> {
    if project_id == PLACEHOLDER_PROJECT_ID {
        return Err(ConfigError::Placeholder("PROJECT_ID"));
    }
    Ok(())
}

/// Settings for the BigQuery example
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarehouseConfig {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
    pub insert_sample: bool,
}

impl WarehouseConfig {
    pub fn load(path: &Path, env: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        Self::from_settings(&load_settings(path, env)?)
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let mut missing = Vec::new();
        let config = Self {
            project_id: required(settings, "PROJECT_ID", &mut missing),
            dataset_id: required(settings, "BIG_QUERY_DATASET_ID", &mut missing),
            table_id: required(settings, "BIG_QUERY_TABLE_ID", &mut missing),
            insert_sample: settings
                .get("BIG_QUERY_INSERT_SAMPLE")
                .is_some_and(|v| v == "1"),
        };
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_project(&self.project_id)
    }

    /// Fully qualified, backtick-quoted table reference for SQL
    pub fn table_ref(&self) -> String {
        format!("`{}.{}.{}`", self.project_id, self.dataset_id, self.table_id)
    }
}

/// Settings for the Bigtable example
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WideColumnConfig {
    pub project_id: String,
    pub instance_id: String,
    pub table_id: String,
    pub column_family: String,
}

impl WideColumnConfig {
    pub fn load(path: &Path, env: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        Self::from_settings(&load_settings(path, env)?)
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let mut missing = Vec::new();
        let config = Self {
            project_id: required(settings, "PROJECT_ID", &mut missing),
            instance_id: required(settings, "INSTANCE_ID", &mut missing),
            table_id: required(settings, "TABLE_ID", &mut missing),
            column_family: required(settings, "COLUMN_FAMILY", &mut missing),
        };
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_project(&self.project_id)
    }
}
