//! Orchestrator - public entry point for one request.
//!
//! Owns tier gating, the direct-execution fallback, cancellation and the
//! streaming buffer policy: output from an attempt that might still be
//! retried is never forwarded to the caller.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::boost::auxiliary::build_auxiliary_request;
use crate::boost::cache::PlanningCache;
use crate::boost::controller::{
    ControllerSettings, ExecutionContent, LoopController, LoopOutcome, guarded_executor_call,
};
use crate::boost::request::BoostRequest;
use crate::boost::wrapper::WrapperTemplate;
use crate::config::GatewayConfig;
use crate::error::{BoostError, Result};
use crate::llm::{
    ClientPool, Endpoint, ExecutorClient, FinishReason, OpenAiClient, OpenAiConfig, PlanningClient, StreamChunk,
    StreamHandle, ToolCall, Usage, create_stream_channel,
};

/// Channel capacity for streams handed to the caller
const FORWARD_BUFFER: usize = 64;

/// Detail attached to exhausted results
pub const EXHAUSTED_DETAIL: &str = "maximum retry attempts reached";

/// Where the final content came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultSource {
    PlannedSummary,
    ExecutedWithTools,
    LoopExhausted,
    FallbackDirect,
}

impl fmt::Display for ResultSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResultSource::PlannedSummary => "PlannedSummary",
            ResultSource::ExecutedWithTools => "ExecutedWithTools",
            ResultSource::LoopExhausted => "LoopExhausted",
            ResultSource::FallbackDirect => "FallbackDirect",
        };
        f.write_str(name)
    }
}

/// Final content: whole text, or a stream for streaming requests
#[derive(Debug)]
pub enum ResultContent {
    Text(String),
    Stream(StreamHandle),
}

/// The single result produced for a request
#[derive(Debug)]
pub struct OrchestrationResult {
    pub content: ResultContent,
    pub source: ResultSource,
    /// Executor tool calls (batched mode); streams carry them in-band
    pub tool_calls: Vec<ToolCall>,
    pub detail: Option<String>,
    pub planning_attempts: u32,
    pub usage: Usage,
}

impl OrchestrationResult {
    fn new(content: ResultContent, source: ResultSource, planning_attempts: u32) -> Self {
        Self {
            content,
            source,
            tool_calls: Vec::new(),
            detail: None,
            planning_attempts,
            usage: Usage::default(),
        }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn is_stream(&self) -> bool {
        matches!(self.content, ResultContent::Stream(_))
    }

    /// Consume the result and return its text, draining a stream if needed
    pub async fn into_text(self) -> String {
        match self.content {
            ResultContent::Text(text) => text,
            ResultContent::Stream(mut handle) => handle.collect_text().await,
        }
    }
}

/// Stream of `text` as a complete reply
pub fn synthesize_stream(text: String) -> StreamHandle {
    let chunks = vec![
        StreamChunk::Text(text),
        StreamChunk::Finish(FinishReason::Stop),
        StreamChunk::Done,
    ];
    forward_stream(chunks, None, CancellationToken::new())
}

/// Replay `buffered`, then pipe the live `remainder` until it ends, the
/// caller drops the handle, or `cancel` fires.
pub fn forward_stream(
    buffered: Vec<StreamChunk>,
    remainder: Option<StreamHandle>,
    cancel: CancellationToken,
) -> StreamHandle {
    let (tx, handle) = create_stream_channel(FORWARD_BUFFER);

    tokio::spawn(async move {
        for chunk in buffered {
            if tx.send(chunk).await.is_err() {
                return;
            }
        }

        let Some(mut remainder) = remainder else {
            return;
        };
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    log::debug!("Stream forwarding cancelled");
                    break;
                }
                _ = tx.closed() => {
                    log::debug!("Stream receiver dropped");
                    break;
                }
                chunk = remainder.recv() => match chunk {
                    Some(chunk) => {
                        let terminal = chunk.is_terminal();
                        if tx.send(chunk).await.is_err() || terminal {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
    });

    handle
}

/// Orchestrates requests against one planning and one executor endpoint.
///
/// Shared across requests; each `execute` call is independent.
pub struct Orchestrator {
    config: GatewayConfig,
    planner: Option<Arc<dyn PlanningClient>>,
    executor: Arc<dyn ExecutorClient>,
    template: WrapperTemplate,
    cache: Option<PlanningCache>,
}

impl Orchestrator {
    /// Build from explicit clients. `planner` may be `None` when boost is off.
    pub fn new(
        config: GatewayConfig,
        planner: Option<Arc<dyn PlanningClient>>,
        executor: Arc<dyn ExecutorClient>,
    ) -> Result<Self> {
        let template = WrapperTemplate::from_config(config.boost.wrapper_template.as_deref())?;
        let cache = config.boost.cache.then(PlanningCache::default);
        Ok(Self {
            config,
            planner,
            executor,
            template,
            cache,
        })
    }

    /// Build OpenAI-compatible clients for both endpoints from configuration.
    pub fn from_config(config: GatewayConfig, pool: &ClientPool) -> Result<Self> {
        let executor_endpoint = Endpoint::new(
            config.executor.base_url.clone(),
            config.executor.api_key.clone().unwrap_or_default(),
            config.executor_timeout(),
        );
        let executor = OpenAiClient::new(pool, executor_endpoint, OpenAiConfig::default())?;

        let planner: Option<Arc<dyn PlanningClient>> = match (&config.boost.base_url, &config.boost.api_key) {
            (Some(url), Some(key)) if !config.boost.enabled_tiers.is_empty() => {
                let endpoint = Endpoint::new(url.clone(), key.clone(), config.planning_timeout());
                let planning_config = OpenAiConfig {
                    model: config.boost.model.clone(),
                    max_tokens: config.boost.max_tokens,
                    temperature: config.boost.temperature,
                };
                let client = OpenAiClient::new(pool, endpoint, planning_config)?;
                Some(Arc::new(client) as Arc<dyn PlanningClient>)
            }
            _ => None,
        };

        Self::new(config, planner, Arc::new(executor))
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn template(&self) -> &WrapperTemplate {
        &self.template
    }

    /// Run one request to its single result.
    ///
    /// Errors: `Cancelled` when `cancel` fires, `AuxiliaryFailure` when the
    /// executor fails with nothing left to fall back on.
    pub async fn execute(&self, request: BoostRequest, cancel: CancellationToken) -> Result<OrchestrationResult> {
        if cancel.is_cancelled() {
            return Err(BoostError::Cancelled);
        }

        let tier = request.tier(&self.config.executor.models);
        let executor_model = self.config.executor_model(tier).to_string();
        log::info!(
            "Orchestrating request for {} (tier {}, executor {}, {} tools, stream {})",
            request.model,
            tier,
            executor_model,
            request.tools.len(),
            request.stream
        );

        let planner = match self.planner.as_deref() {
            Some(planner) if self.config.is_boost_enabled(tier) && request.has_tools() => planner,
            _ => {
                let reason = if !self.config.is_boost_enabled(tier) {
                    format!("boost not enabled for {} tier", tier)
                } else if !request.has_tools() {
                    "request has no tools".to_string()
                } else {
                    "no planning client configured".to_string()
                };
                return self.direct(&request, &executor_model, &cancel, reason, 0).await;
            }
        };

        let settings = ControllerSettings {
            max_iterations: self.config.boost.max_iterations,
            planning_timeout: self.config.planning_timeout(),
            executor_timeout: self.config.executor_timeout(),
            executor_model: executor_model.clone(),
        };
        let mut controller =
            LoopController::new(planner, self.executor.as_ref(), &self.template, settings, cancel.clone());
        if let Some(cache) = &self.cache {
            controller = controller.with_cache(cache);
        }

        let outcome = controller.run(&request).await?;
        let attempts = outcome.planning_attempts();

        let result = match outcome {
            LoopOutcome::Summary { text, .. } => {
                let content = if request.stream {
                    ResultContent::Stream(synthesize_stream(text))
                } else {
                    ResultContent::Text(text)
                };
                OrchestrationResult::new(content, ResultSource::PlannedSummary, attempts)
            }
            LoopOutcome::Executed { outcome, .. } => {
                let mut result = OrchestrationResult::new(
                    release(outcome.content, request.stream, &cancel),
                    ResultSource::ExecutedWithTools,
                    attempts,
                );
                result.tool_calls = outcome.tool_calls;
                result.usage = outcome.usage;
                result
            }
            LoopOutcome::Exhausted { content, .. } => OrchestrationResult::new(
                release(content, request.stream, &cancel),
                ResultSource::LoopExhausted,
                attempts,
            )
            .with_detail(EXHAUSTED_DETAIL),
            LoopOutcome::BoostUnavailable { reason, .. } => {
                log::warn!("Boost unavailable, falling back to direct execution: {}", reason);
                let detail = format!("boost unavailable: {}", reason);
                return self.direct(&request, &executor_model, &cancel, detail, attempts).await;
            }
        };

        log::info!("Request finished: {} after {} planning attempt(s)", result.source, attempts);
        Ok(result)
    }

    /// One executor call with the original messages and tools.
    async fn direct(
        &self,
        request: &BoostRequest,
        executor_model: &str,
        cancel: &CancellationToken,
        detail: String,
        planning_attempts: u32,
    ) -> Result<OrchestrationResult> {
        log::info!("Direct execution on {}: {}", executor_model, detail);
        let aux = build_auxiliary_request(request, executor_model, None);
        let timeout = self.config.executor_timeout();

        let result = if aux.stream {
            let handle = guarded_executor_call(cancel, timeout, self.executor.stream(aux)).await?;
            OrchestrationResult::new(
                ResultContent::Stream(forward_stream(Vec::new(), Some(handle), cancel.clone())),
                ResultSource::FallbackDirect,
                planning_attempts,
            )
        } else {
            let response = guarded_executor_call(cancel, timeout, self.executor.complete(aux)).await?;
            let mut result = OrchestrationResult::new(
                ResultContent::Text(response.content),
                ResultSource::FallbackDirect,
                planning_attempts,
            );
            result.tool_calls = response.tool_calls;
            result.usage = response.usage;
            result
        };

        Ok(result.with_detail(detail))
    }
}

/// Turn controller output into caller-facing content.
fn release(content: ExecutionContent, stream: bool, cancel: &CancellationToken) -> ResultContent {
    match content {
        ExecutionContent::Text(text) if stream => ResultContent::Stream(synthesize_stream(text)),
        ExecutionContent::Text(text) => ResultContent::Text(text),
        ExecutionContent::Stream { buffered, remainder } => {
            ResultContent::Stream(forward_stream(buffered, remainder, cancel.clone()))
        }
    }
}
