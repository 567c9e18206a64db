use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub service: ServiceConfig,
    pub knowledge_base: KnowledgeBaseConfig,
    pub agent: AgentConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub base_url: String,
    #[serde(default = "default_upload_path")]
    pub upload_path: String,
    #[serde(default = "default_ingest_path")]
    pub ingest_path: String,
    #[serde(default = "default_query_path")]
    pub query_path: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Name of the environment variable holding a bearer token, if the
    /// service wants one.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

fn default_upload_path() -> String {
    "/v1/files".to_string()
}
fn default_ingest_path() -> String {
    "/v1/knowledge-bases/ingest".to_string()
}
fn default_query_path() -> String {
    "/v1/agents/query".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeBaseConfig {
    pub id: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub id: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,
    #[serde(default = "default_suggested_queries")]
    pub suggested_queries: Vec<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_query_chars: default_max_query_chars(),
            suggested_queries: default_suggested_queries(),
        }
    }
}

fn default_max_query_chars() -> usize {
    500
}

fn default_suggested_queries() -> Vec<String> {
    vec![
        "Summarize the key points of the uploaded documents".to_string(),
        "What are the main conclusions?".to_string(),
        "List any deadlines or dates mentioned".to_string(),
    ]
}

impl ServiceConfig {
    /// Resolve the bearer token from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|key| !key.is_empty())
    }
}

impl Config {
    /// Build a config in code, with defaults for everything but the endpoints
    /// and identifiers.
    pub fn new(base_url: &str, knowledge_base_id: &str, agent_id: &str) -> Self {
        Self {
            service: ServiceConfig {
                base_url: base_url.to_string(),
                upload_path: default_upload_path(),
                ingest_path: default_ingest_path(),
                query_path: default_query_path(),
                timeout_secs: default_timeout_secs(),
                api_key_env: None,
            },
            knowledge_base: KnowledgeBaseConfig {
                id: knowledge_base_id.to_string(),
            },
            agent: AgentConfig {
                id: agent_id.to_string(),
            },
            chat: ChatConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = parse_config(&content)?;
    validate(&config)?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate service
    let url = reqwest::Url::parse(&config.service.base_url).with_context(|| {
        format!(
            "service.base_url is not a valid URL: '{}'",
            config.service.base_url
        )
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        anyhow::bail!("service.base_url must use http or https");
    }
    if config.service.timeout_secs == 0 {
        anyhow::bail!("service.timeout_secs must be > 0");
    }

    // Validate identifiers
    if config.knowledge_base.id.trim().is_empty() {
        anyhow::bail!("knowledge_base.id must not be empty");
    }
    if config.agent.id.trim().is_empty() {
        anyhow::bail!("agent.id must not be empty");
    }

    // Validate chat
    if config.chat.max_query_chars == 0 {
        anyhow::bail!("chat.max_query_chars must be > 0");
    }

    Ok(())
}

/// Write an example config file. Refuses to overwrite an existing one.
pub fn scaffold_config(path: &Path) -> Result<()> {
    if path.exists() {
        anyhow::bail!("Config file already exists: {}", path.display());
    }
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }

    let template = r#"# kbchat configuration

[service]
base_url = "https://kb.example.com"
# upload_path = "/v1/files"
# ingest_path = "/v1/knowledge-bases/ingest"
# query_path = "/v1/agents/query"
# timeout_secs = 60
# api_key_env = "KBCHAT_API_KEY"

[knowledge_base]
id = "kb-main"

[agent]
id = "docs-agent"

[chat]
max_query_chars = 500
suggested_queries = [
    "Summarize the key points of the uploaded documents",
    "What are the main conclusions?",
]
"#;

    std::fs::write(path, template)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;
    println!("Created {}", path.display());
    Ok(())
}
