//! JSON configuration for one generated module pair plus the tag
//! vocabulary. A config file describes where sources live, where the
//! generated `.cpp`/`.h` pair goes, the include search paths, and which
//! other configs this one depends on. `${name}` placeholders from the
//! `variables` table may appear in every path field.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::utils::paths::{normalize_path, relative_path};
use crate::utils::placeholders::{apply_placeholders, PlaceholderError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Placeholder(#[from] PlaceholderError),
    #[error("{field} still contains a placeholder after expansion: {value}")]
    UnresolvedPlaceholder { field: &'static str, value: String },
    #[error("dependency config {path} not loaded")]
    DependencyNotLoaded { path: PathBuf },
    #[error("could not resolve include {include}")]
    IncludeNotFound { include: String },
}

/// One type-level tag: the annotation name and the declaration kind label
/// it marks.
#[derive(Debug, Clone, Deserialize)]
pub struct TypeTag {
    pub name: String,
    #[serde(rename = "tag")]
    pub label: String,
}

fn tag_name<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Spelled {
        Plain(String),
        Named { name: String },
    }
    Ok(match Spelled::deserialize(deserializer)? {
        Spelled::Plain(name) => name,
        Spelled::Named { name } => name,
    })
}

/// The annotation vocabulary the scanner recognizes. Loadable from JSON so
/// a project can rename the markers without rebuilding.
#[derive(Debug, Clone, Deserialize)]
pub struct TagConfig {
    #[serde(deserialize_with = "tag_name")]
    pub module: String,
    pub types: Vec<TypeTag>,
    #[serde(rename = "properties", deserialize_with = "tag_name")]
    pub property: String,
    #[serde(rename = "functions", deserialize_with = "tag_name")]
    pub function: String,
    #[serde(rename = "operators", deserialize_with = "tag_name")]
    pub operator: String,
    #[serde(rename = "parameters", deserialize_with = "tag_name")]
    pub parameter: String,
}

impl Default for TagConfig {
    fn default() -> Self {
        Self {
            module: "MPyModule".to_string(),
            types: vec![
                TypeTag {
                    name: "MPyClass".to_string(),
                    label: "class".to_string(),
                },
                TypeTag {
                    name: "MPyStruct".to_string(),
                    label: "struct".to_string(),
                },
            ],
            property: "MPyProperty".to_string(),
            function: "MPyFunction".to_string(),
            operator: "MPyOperator".to_string(),
            parameter: "MPyParam".to_string(),
        }
    }
}

impl TagConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    variables: BTreeMap<String, String>,
    target_path: Option<String>,
    base_directory: Option<String>,
    #[serde(default)]
    include_paths: Vec<String>,
    #[serde(default)]
    dependencies: Vec<String>,
}

/// A loaded module config. Path fields are absolute and fully expanded.
#[derive(Debug, Clone)]
pub struct Config {
    source_path: PathBuf,
    target_path: Option<String>,
    base_directory: PathBuf,
    include_paths: Vec<PathBuf>,
    dependencies: Vec<PathBuf>,
    variables: BTreeMap<String, String>,
}

impl Config {
    /// Loads a config file. `seed` variables come from the caller (command
    /// line or a dependent config) and override the file's own `variables`
    /// table.
    pub fn load(path: &Path, seed: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ConfigFile =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let mut variables = file.variables;
        for (key, value) in seed {
            variables.insert(key.clone(), value.clone());
        }
        let expanded: Vec<(String, String)> = {
            let vars = var_slice(&variables);
            variables
                .iter()
                .map(|(key, value)| {
                    apply_placeholders(value, false, &vars).map(|v| (key.clone(), v))
                })
                .collect::<Result<_, _>>()?
        };
        let variables: BTreeMap<String, String> = expanded.into_iter().collect();
        let vars = var_slice(&variables);

        let source_dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();

        let base_directory = match &file.base_directory {
            Some(dir) => {
                let dir = apply_placeholders(dir, false, &vars)?;
                ensure_expanded("base_directory", &dir)?;
                let dir = PathBuf::from(dir);
                if dir.is_absolute() {
                    dir
                } else {
                    normalize_path(&source_dir.join(dir))
                }
            }
            None => source_dir.clone(),
        };

        let target_path = match &file.target_path {
            Some(raw) if raw == "-" => Some("-".to_string()),
            Some(raw) => {
                let raw = apply_placeholders(raw, false, &vars)?;
                ensure_expanded("target_path", &raw)?;
                let joined = PathBuf::from(&raw);
                let joined = if joined.is_absolute() {
                    joined
                } else {
                    normalize_path(&source_dir.join(joined))
                };
                Some(joined.display().to_string())
            }
            None => None,
        };

        let mut include_paths = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            include_paths.push(cwd);
        }
        include_paths.push(base_directory.clone());
        for raw in &file.include_paths {
            let raw = apply_placeholders(raw, false, &vars)?;
            ensure_expanded("include_paths", &raw)?;
            include_paths.push(join_base(&base_directory, &raw));
        }

        let mut dependencies = Vec::new();
        for raw in &file.dependencies {
            let raw = apply_placeholders(raw, false, &vars)?;
            ensure_expanded("dependencies", &raw)?;
            dependencies.push(join_base(&base_directory, &raw));
        }

        Ok(Self {
            source_path: path.to_path_buf(),
            target_path,
            base_directory,
            include_paths,
            dependencies,
            variables,
        })
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Directory scanned for annotated sources.
    pub fn base_directory(&self) -> &Path {
        &self.base_directory
    }

    pub fn include_paths(&self) -> &[PathBuf] {
        &self.include_paths
    }

    pub fn add_include_path(&mut self, path: PathBuf) {
        self.include_paths.push(path);
    }

    pub fn dependencies(&self) -> &[PathBuf] {
        &self.dependencies
    }

    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.variables
    }

    pub fn target_is_stdout(&self) -> bool {
        self.target_path.as_deref() == Some("-")
    }

    /// The extensionless output stem; `.cpp` and `.h` are appended at write
    /// time. Defaults to the config file path without its extension.
    pub fn target_path(&self) -> PathBuf {
        match &self.target_path {
            Some(path) => PathBuf::from(path),
            None => self.source_path.with_extension(""),
        }
    }

    pub fn set_target_path(&mut self, path: &str) {
        self.target_path = Some(path.to_string());
    }

    pub fn target_source_path(&self) -> Option<PathBuf> {
        if self.target_is_stdout() {
            None
        } else {
            Some(with_appended_extension(&self.target_path(), "cpp"))
        }
    }

    pub fn target_header_path(&self) -> Option<PathBuf> {
        if self.target_is_stdout() {
            None
        } else {
            Some(with_appended_extension(&self.target_path(), "h"))
        }
    }
}

fn var_slice(variables: &BTreeMap<String, String>) -> Vec<(&str, &str)> {
    variables
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect()
}

fn ensure_expanded(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.contains("${") {
        return Err(ConfigError::UnresolvedPlaceholder {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

fn join_base(base: &Path, raw: &str) -> PathBuf {
    let path = PathBuf::from(raw);
    if path.is_absolute() {
        path
    } else {
        normalize_path(&base.join(path))
    }
}

fn with_appended_extension(path: &Path, ext: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(".");
    s.push(ext);
    PathBuf::from(s)
}

/// Loaded dependency configs, keyed by normalized config path. Each config
/// file is loaded at most once no matter how many configs depend on it.
#[derive(Debug, Default)]
pub struct DependencyRegistry {
    configs: BTreeMap<PathBuf, Config>,
}

impl DependencyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the transitive dependency closure of `root`. Root variables
    /// seed each dependency and override its own table.
    pub fn load(&mut self, root: &Config) -> Result<(), ConfigError> {
        for path in root.dependencies() {
            let key = normalize_path(path);
            if self.configs.contains_key(&key) {
                continue;
            }
            let config = Config::load(&key, root.variables())?;
            self.configs.insert(key.clone(), config);
            let config = self.configs[&key].clone();
            self.load(&config)?;
        }
        Ok(())
    }

    pub fn get(&self, path: &Path) -> Option<&Config> {
        self.configs.get(&normalize_path(path))
    }

    pub fn configs(&self) -> impl Iterator<Item = (&PathBuf, &Config)> {
        self.configs.iter()
    }
}

const PROBE_EXTENSIONS: &[&str] = &["h", "hpp", "cpp", "c"];

/// Rewrites one include reference so the generated unit can use it.
/// Quoted includes are searched next to the declaring file first and come
/// back as a quoted path relative to the output location; includes found on
/// the configured search paths come back in angle form. An extensionless
/// include probes the common C/C++ extensions.
pub fn resolve_include_path(
    file_path: &Path,
    include: &str,
    config: &Config,
    local_first: bool,
) -> Result<String, ConfigError> {
    let has_extension = Path::new(include).extension().is_some();
    if !has_extension {
        for ext in PROBE_EXTENSIONS {
            let candidate = format!("{include}.{ext}");
            if let Ok(resolved) = resolve_include_path(file_path, &candidate, config, false) {
                return Ok(resolved);
            }
        }
        return Err(ConfigError::IncludeNotFound {
            include: include.to_string(),
        });
    }

    if local_first {
        let include_path = Path::new(include);
        if include_path.is_absolute() {
            if include_path.is_file() {
                return Ok(format!("\"{include}\""));
            }
            return Err(ConfigError::IncludeNotFound {
                include: include.to_string(),
            });
        }

        let local_dir = file_path.parent().unwrap_or(Path::new("."));
        if local_dir.join(include).is_file() {
            let target_dir = config.target_path();
            let target_dir = target_dir.parent().unwrap_or(Path::new("."));
            let local_dir = relative_path(local_dir, target_dir);
            let resolved = normalize_path(&local_dir.join(include));
            return Ok(format!("\"{}\"", resolved.display()));
        }
    }

    for search in config.include_paths() {
        if search.join(include).is_file() {
            return Ok(format!("<{include}>"));
        }
    }

    Err(ConfigError::IncludeNotFound {
        include: include.to_string(),
    })
}
