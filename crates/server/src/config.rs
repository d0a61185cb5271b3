use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use smartspend_classify::ZeroShotConfig;
use smartspend_import::{ColumnAliases, ParserConfig};
use smartspend_pipeline::PipelineConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" | "bunyan" => Ok(LogFormat::Json),
            other => anyhow::bail!("unknown log format '{other}'"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database_path: PathBuf,
    pub listen_addr: String,
    pub workers: usize,
    pub row_concurrency: usize,
    pub queue_capacity: usize,
    pub log_format: LogFormat,
    pub classifier: ZeroShotConfig,
    /// Extra header aliases, added to the built-in table.
    pub aliases: Option<ColumnAliases>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("smartspend.db"),
            listen_addr: "127.0.0.1:8080".to_string(),
            workers: 4,
            row_concurrency: 8,
            queue_capacity: 256,
            log_format: LogFormat::Pretty,
            classifier: ZeroShotConfig::default(),
            aliases: None,
        }
    }
}

impl Settings {
    /// File named by `SMARTSPEND_CONFIG` (or `smartspend.toml`), then the
    /// environment on top.
    pub fn load() -> anyhow::Result<Settings> {
        let path = std::env::var("SMARTSPEND_CONFIG").unwrap_or_else(|_| "smartspend.toml".into());
        let mut settings = Settings::from_file(Path::new(&path))?;
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// A missing file yields the defaults.
    pub fn from_file(path: &Path) -> anyhow::Result<Settings> {
        if !path.exists() {
            return Ok(Settings::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Settings::from_toml(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Settings> {
        Ok(toml::from_str(text)?)
    }

    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(v) = var("SMARTSPEND_DATABASE_PATH") {
            self.database_path = PathBuf::from(v);
        }
        if let Some(v) = var("SMARTSPEND_LISTEN_ADDR") {
            self.listen_addr = v;
        }
        if let Some(v) = var("SMARTSPEND_WORKERS") {
            self.workers = v.trim().parse().context("SMARTSPEND_WORKERS")?;
        }
        if let Some(v) = var("SMARTSPEND_ROW_CONCURRENCY") {
            self.row_concurrency = v.trim().parse().context("SMARTSPEND_ROW_CONCURRENCY")?;
        }
        if let Some(v) = var("SMARTSPEND_LOG_FORMAT") {
            self.log_format = v.parse()?;
        }
        if let Some(v) = var("HF_TOKEN") {
            self.classifier.token = v;
        }
        if let Some(v) = var("SMARTSPEND_CLASSIFIER_URL") {
            self.classifier.endpoint = v;
        }
        if let Some(v) = var("SMARTSPEND_CLASSIFIER_TIMEOUT_MS") {
            self.classifier.timeout_ms = v.trim().parse().context("SMARTSPEND_CLASSIFIER_TIMEOUT_MS")?;
        }
        Ok(())
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        let mut parser = ParserConfig::default();
        if let Some(extra) = &self.aliases {
            parser.aliases.extend(extra.clone());
        }
        PipelineConfig {
            workers: self.workers,
            row_concurrency: self.row_concurrency,
            queue_capacity: self.queue_capacity,
            parser,
        }
    }
}
