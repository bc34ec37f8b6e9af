use runme_engine::identity::Lifecycle;
use runme_engine::{LoadRequest, ParseOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {config_path}: {source}")]
    ConfigReadError {
        config_path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {config_path}: {source}")]
    ConfigParseError {
        config_path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Directory or single file to load; the working directory when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    pub respect_gitignore: bool,
    pub find_repo_upward: bool,
    /// Gitignore-style patterns skipped on top of the repository's own rules.
    pub ignore: Vec<String>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            root: None,
            respect_gitignore: true,
            find_repo_upward: true,
            ignore: vec!["node_modules".to_string(), ".venv".to_string()],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    pub identity: Lifecycle,
    /// Overrides `RUNME_AST_METADATA` when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ast_metadata: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub project: ProjectConfig,
    pub parser: ParserConfig,
}

impl Config {
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Option<Self>, ConfigError> {
        let config_path = config_path.as_ref();
        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(config_path).map_err(|source| {
            ConfigError::ConfigReadError {
                config_path: config_path.to_path_buf(),
                source,
            }
        })?;

        let mut config: Config =
            toml::from_str(&content).map_err(|source| ConfigError::ConfigParseError {
                config_path: config_path.to_path_buf(),
                source,
            })?;

        // Expand shell variables and tilde in the project root
        config.project.root = config
            .project
            .root
            .map(|root| Self::expand_path(&root).unwrap_or(root));

        Ok(Some(config))
    }

    pub fn load() -> Result<Option<Self>, ConfigError> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, config_path: P) -> anyhow::Result<()> {
        let config_path = config_path.as_ref();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        self.save_to_path(&config_path)
    }

    pub fn config_path() -> PathBuf {
        let config_dir = shellexpand::tilde("~/.config/runme");
        PathBuf::from(config_dir.as_ref()).join("config.toml")
    }

    fn expand_path(path: &Path) -> Option<PathBuf> {
        let path_str = path.to_string_lossy();
        match shellexpand::full(&path_str) {
            Ok(expanded) => Some(PathBuf::from(expanded.as_ref())),
            Err(_) => None,
        }
    }

    /// Project load request for the configured root, relative paths resolved
    /// against `cwd`.
    pub fn load_request(&self, cwd: &Path) -> LoadRequest {
        let root = match &self.project.root {
            Some(root) => cwd.join(root),
            None => cwd.to_path_buf(),
        };
        let mut request = if root.is_file() {
            LoadRequest::file(root)
        } else {
            let mut request = LoadRequest::directory(root);
            if let runme_engine::service::LoadRequestKind::Directory {
                respect_gitignore,
                ignore_file_patterns,
                find_repo_upward,
                ..
            } = &mut request.kind
            {
                *respect_gitignore = self.project.respect_gitignore;
                *find_repo_upward = self.project.find_repo_upward;
                ignore_file_patterns.clone_from(&self.project.ignore);
            }
            request
        };
        request.identity = Some(self.parser.identity);
        request
    }

    pub fn parse_options(&self) -> ParseOptions {
        let options = ParseOptions::default().with_lifecycle(self.parser.identity);
        match self.parser.ast_metadata {
            Some(enabled) => options.with_ast_metadata(enabled),
            None => options,
        }
    }
}
