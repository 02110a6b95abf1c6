use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gatekeeper_models::config::{NetworkConfig, SourceKind, ValidationConfig};
use gatekeeper_models::opinion::{Opinion, OpinionReply, TradeContext};
use tracing::debug;

use crate::claude_cli::{invoke_cli, CliConfig};
use crate::error::OpinionError;
use crate::parser::{parse_opinion_reply, validate_reply};
use crate::prompts::{review_request, validator_prompt};

/// An independent validator of proposed trades. Mockable for testing.
#[async_trait]
pub trait OpinionSource: Send + Sync {
    fn name(&self) -> &str;

    async fn review(&self, ctx: &TradeContext) -> Result<Opinion, OpinionError>;
}

/// A validator backed by the model CLI.
pub struct CliOpinionSource {
    pub name: String,
    pub focus: String,
    pub cli_config: CliConfig,
}

impl CliOpinionSource {
    pub fn new(name: String, focus: String, model: String, timeout: Duration) -> Self {
        Self {
            name,
            focus,
            cli_config: CliConfig {
                model,
                timeout,
                ..CliConfig::default()
            },
        }
    }
}

#[async_trait]
impl OpinionSource for CliOpinionSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn review(&self, ctx: &TradeContext) -> Result<Opinion, OpinionError> {
        let system_prompt = validator_prompt(&self.focus).ok_or_else(|| {
            OpinionError::Config(format!("no prompt for validator focus: {}", self.focus))
        })?;
        let user_prompt = review_request(ctx)?;
        let raw = invoke_cli(&system_prompt, &user_prompt, &self.cli_config).await?;
        let reply = parse_opinion_reply(&raw)?;
        Ok(Opinion::from_reply(&self.name, reply))
    }
}

/// A validator reached over HTTP: the trade context is POSTed as JSON and an
/// `OpinionReply` is expected back.
pub struct HttpOpinionSource {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl HttpOpinionSource {
    pub fn new(name: String, url: String, timeout: Duration) -> Result<Self, OpinionError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { name, url, client })
    }
}

#[async_trait]
impl OpinionSource for HttpOpinionSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn review(&self, ctx: &TradeContext) -> Result<Opinion, OpinionError> {
        let reply: OpinionReply = self
            .client
            .post(&self.url)
            .json(ctx)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        validate_reply(&reply)?;
        debug!(source = %self.name, approve = reply.approve, "HTTP validator replied");
        Ok(Opinion::from_reply(&self.name, reply))
    }
}

/// Build every enabled source in `validation`.
pub fn build_sources(
    validation: &ValidationConfig,
    network: &NetworkConfig,
) -> Result<Vec<Arc<dyn OpinionSource>>, OpinionError> {
    let timeout = Duration::from_millis(network.request_timeout_ms);
    let mut sources: Vec<Arc<dyn OpinionSource>> = Vec::new();

    for source in validation.sources.iter().filter(|s| s.enabled) {
        match source.kind {
            SourceKind::Cli => {
                if validator_prompt(&source.focus).is_none() {
                    return Err(OpinionError::Config(format!(
                        "source {}: unknown focus {:?}",
                        source.name, source.focus
                    )));
                }
                let model = source
                    .model
                    .clone()
                    .unwrap_or_else(|| validation.cli_model.clone());
                sources.push(Arc::new(CliOpinionSource::new(
                    source.name.clone(),
                    source.focus.clone(),
                    model,
                    timeout,
                )));
            }
            SourceKind::Http => {
                let url = source.url.clone().ok_or_else(|| {
                    OpinionError::Config(format!("source {}: http source needs a url", source.name))
                })?;
                sources.push(Arc::new(HttpOpinionSource::new(
                    source.name.clone(),
                    url,
                    timeout,
                )?));
            }
        }
    }
    Ok(sources)
}
