//! Provider gateway: response cache in front, retry controller around the remote call.

use crate::cache::SharedCache;
use crate::error::ApiError;
use crate::provider::{ChatMessage, CompletionOptions, SharedProviderClient};
use crate::retry::Retrier;
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of one gateway call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayResponse {
    pub content: String,
    pub provider: String,
    pub model: String,
    pub cached: bool,
}

pub struct ProviderGateway {
    client: SharedProviderClient,
    cache: Option<SharedCache>,
    retrier: Retrier,
    default_options: CompletionOptions,
    cache_ttl: Option<Duration>,
}

impl ProviderGateway {
    pub fn new(client: SharedProviderClient, cache: Option<SharedCache>, retrier: Retrier) -> Self {
        Self {
            client,
            cache,
            retrier,
            default_options: CompletionOptions::default(),
            cache_ttl: None,
        }
    }

    pub fn with_default_options(mut self, options: CompletionOptions) -> Self {
        self.default_options = options;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn provider_name(&self) -> &str {
        self.client.provider_name()
    }

    pub fn model_name(&self) -> &str {
        self.client.model_name()
    }

    /// Complete `messages`, serving from the cache when `use_cache` allows it.
    ///
    /// Cache failures degrade to a miss; only a successful remote response is stored.
    pub async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        options: Option<CompletionOptions>,
        use_cache: bool,
    ) -> Result<GatewayResponse, ApiError> {
        let options = merge_options(&self.default_options, options);
        let cache = self.cache.as_ref().filter(|_| use_cache);
        let model_id = format!("{}/{}", self.client.provider_name(), self.client.model_name());
        let prompt = render_prompt(&messages);
        let params = options_params(&options);

        if let Some(cache) = cache {
            match cache.lookup(&prompt, &model_id, &params) {
                Ok(Some(content)) => {
                    debug!(model = %model_id, "response cache hit");
                    return Ok(self.response(content, true));
                }
                Ok(None) => debug!(model = %model_id, "response cache miss"),
                Err(e) => warn!(model = %model_id, error = %e, "response cache lookup failed"),
            }
        }

        let completion = self
            .retrier
            .run(&model_id, || {
                self.client.complete(messages.clone(), options.clone())
            })
            .await?;
        info!(
            model = %model_id,
            prompt_tokens = completion.usage.prompt_tokens,
            completion_tokens = completion.usage.completion_tokens,
            "provider completion received"
        );

        if let Some(cache) = cache {
            if let Err(e) = cache.store(&prompt, &model_id, &params, &completion.content, self.cache_ttl) {
                warn!(model = %model_id, error = %e, "failed to store response in cache");
            }
        }
        Ok(self.response(completion.content, false))
    }

    fn response(&self, content: String, cached: bool) -> GatewayResponse {
        GatewayResponse {
            content,
            provider: self.client.provider_name().to_string(),
            model: self.client.model_name().to_string(),
            cached,
        }
    }
}

fn merge_options(defaults: &CompletionOptions, overrides: Option<CompletionOptions>) -> CompletionOptions {
    let Some(overrides) = overrides else {
        return defaults.clone();
    };
    CompletionOptions {
        temperature: overrides.temperature.or(defaults.temperature),
        max_tokens: overrides.max_tokens.or(defaults.max_tokens),
        top_p: overrides.top_p.or(defaults.top_p),
        stop: overrides.stop.or_else(|| defaults.stop.clone()),
    }
}

fn render_prompt(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str(), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn options_params(options: &CompletionOptions) -> Map<String, Value> {
    match serde_json::to_value(options) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}
