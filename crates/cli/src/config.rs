//! Configuration loading from tether.toml and the environment.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use mcp::ServerConfig;
use runtime::{AgentOptions, OpenAiBackend, RouterOptions, SessionOptions};
use serde::Deserialize;

const CONFIG_FILE: &str = "tether.toml";
const FILESYSTEM_SERVER: &str = "@modelcontextprotocol/server-filesystem";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub model: ModelConfig,
    pub server: ServerSection,
    pub agent: AgentConfig,
    pub router: RouterConfig,
}

/// Model provider configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Base URL of an OpenAI-compatible API.
    pub base_url: String,
    pub model: String,
    /// Usually taken from `GROQ_API_KEY` or `OPENAI_API_KEY` instead.
    pub api_key: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: runtime::DEFAULT_BASE_URL.to_string(),
            model: runtime::DEFAULT_MODEL.to_string(),
            api_key: None,
            max_tokens: None,
            temperature: None,
        }
    }
}

/// Tool host configuration.
///
/// With `url` set the host is reached over HTTP. Otherwise `command` is
/// spawned; without a command the filesystem server is started on `root`.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub name: String,
    pub command: Option<String>,
    pub args: Vec<String>,
    pub root: PathBuf,
    pub cwd: Option<PathBuf>,
    pub url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            name: "filesystem".to_string(),
            command: None,
            args: Vec::new(),
            root: PathBuf::from("."),
            cwd: None,
            url: None,
            timeout_secs: mcp::DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

/// Which conversation loop drives the REPL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// The model calls tools itself.
    #[default]
    Tools,
    /// The model emits sentinels and the router calls tools.
    Router,
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tools" => Ok(Self::Tools),
            "router" => Ok(Self::Router),
            other => Err(ConfigError::InvalidMode(other.to_string())),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub mode: Mode,
    pub system_prompt: Option<String>,
    pub max_tool_rounds: usize,
    pub call_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            system_prompt: None,
            max_tool_rounds: AgentOptions::default().max_tool_rounds,
            call_timeout_secs: runtime::DEFAULT_CALL_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub list_tool: String,
    pub read_tool: String,
    pub path_argument: String,
    pub list_path: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        let options = RouterOptions::default();
        Self {
            list_tool: options.list_tool,
            read_tool: options.read_tool,
            path_argument: options.path_argument,
            list_path: options.list_path,
        }
    }
}

impl Config {
    /// Load `$TETHER_CONFIG` (or `./tether.toml` if present) and apply
    /// environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os("TETHER_CONFIG") {
            Some(path) => Self::load_file(path)?,
            None if Path::new(CONFIG_FILE).exists() => Self::load_file(CONFIG_FILE)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Environment variables win over the file. Empty values are ignored.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let var = |key: &str| var(key).filter(|value| !value.trim().is_empty());

        if let Some(key) = var("GROQ_API_KEY").or_else(|| var("OPENAI_API_KEY")) {
            self.model.api_key = Some(key);
        }
        if let Some(url) = var("TETHER_BASE_URL") {
            self.model.base_url = url;
        }
        if let Some(model) = var("TETHER_MODEL") {
            self.model.model = model;
        }
        if let Some(root) = var("TETHER_ROOT") {
            self.server.root = PathBuf::from(root);
        }
        if let Some(url) = var("TETHER_SERVER_URL") {
            self.server.url = Some(url);
        }
        if let Some(mode) = var("TETHER_MODE") {
            self.agent.mode = mode.parse()?;
        }
        Ok(())
    }

    pub fn api_key(&self) -> Result<&str, ConfigError> {
        self.model
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }

    pub fn backend(&self) -> Result<OpenAiBackend, ConfigError> {
        let mut builder =
            OpenAiBackend::builder(self.api_key()?, &self.model.model).base_url(&self.model.base_url);
        if let Some(max_tokens) = self.model.max_tokens {
            builder = builder.max_tokens(max_tokens);
        }
        if let Some(temperature) = self.model.temperature {
            builder = builder.temperature(temperature);
        }
        builder
            .build()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn server(&self) -> ServerConfig {
        let server = &self.server;
        let config = match (&server.url, &server.command) {
            (Some(url), _) => ServerConfig::http(&server.name, url),
            (None, Some(command)) => ServerConfig::stdio(&server.name, command, &server.args),
            (None, None) => ServerConfig::stdio(
                &server.name,
                "npx",
                [
                    "-y".to_string(),
                    FILESYSTEM_SERVER.to_string(),
                    server.root.display().to_string(),
                ],
            ),
        };
        let config = config.with_timeout(Duration::from_secs(server.timeout_secs));
        match &server.cwd {
            Some(cwd) => config.with_cwd(cwd),
            None => config,
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            call_timeout: Duration::from_secs(self.agent.call_timeout_secs),
        }
    }

    pub fn agent_options(&self) -> AgentOptions {
        AgentOptions {
            system_prompt: self.agent.system_prompt.clone(),
            max_tool_rounds: self.agent.max_tool_rounds,
        }
    }

    pub fn router_options(&self) -> RouterOptions {
        RouterOptions {
            list_tool: self.router.list_tool.clone(),
            read_tool: self.router.read_tool.clone(),
            path_argument: self.router.path_argument.clone(),
            list_path: self.router.list_path.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("no API key: set GROQ_API_KEY or OPENAI_API_KEY, or model.api_key in tether.toml")]
    MissingApiKey,

    #[error("unknown mode '{0}': expected 'tools' or 'router'")]
    InvalidMode(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
