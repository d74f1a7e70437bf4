//! Loop controller: the planning/execution state machine.
//!
//! ```text
//! Planning -> Parsed -> Completed | Executing | Retrying
//! Executing -> Completed | Retrying
//! Retrying -> Planning | Exhausted
//! ```
//!
//! Each step owns the [`LoopState`] and hands it to the next. The loop makes
//! at most `max_iterations` planning attempts.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::boost::auxiliary::{PlanGuidance, build_auxiliary_request};
use crate::boost::cache::PlanningCache;
use crate::boost::detector::{StreamResolution, resolve_stream, tools_used};
use crate::boost::request::BoostRequest;
use crate::boost::sections::{ClassifiedResponse, ResponseKind, classify};
use crate::boost::state::{LoopAttempt, LoopState, REASON_NO_SECTION, REASON_NOT_FOLLOWED, REASON_REPEATED};
use crate::boost::wrapper::{ATTEMPT_PREVIEW_CHARS, WrapperTemplate, preview};
use crate::error::{BoostError, Result};
use crate::llm::{ExecutorClient, LlmError, PlanningClient, StreamChunk, StreamHandle, ToolCall, Usage, collect_text};

/// Per-request knobs for one controller run
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub max_iterations: u32,
    pub planning_timeout: Duration,
    pub executor_timeout: Duration,
    /// Executor model for the request's tier
    pub executor_model: String,
}

/// Executor output: text, or stream chunks with an optional live tail
#[derive(Debug)]
pub enum ExecutionContent {
    Text(String),
    Stream {
        buffered: Vec<StreamChunk>,
        remainder: Option<StreamHandle>,
    },
}

/// One executor call that ended the loop
#[derive(Debug)]
pub struct ExecutionOutcome {
    pub content: ExecutionContent,
    pub used_tools: bool,
    /// Pass-through tool calls; empty for streams, where they travel in-band
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
}

/// Terminal result of a controller run
#[derive(Debug)]
pub enum LoopOutcome {
    /// Planner answered directly
    Summary { text: String, state: LoopState },
    /// Executor followed guidance and called tools
    Executed { outcome: ExecutionOutcome, state: LoopState },
    /// Cap reached; best available content
    Exhausted { content: ExecutionContent, state: LoopState },
    /// Planning endpoint failed; caller falls back to direct execution
    BoostUnavailable { reason: String, state: LoopState },
}

impl LoopOutcome {
    pub fn state(&self) -> &LoopState {
        match self {
            LoopOutcome::Summary { state, .. }
            | LoopOutcome::Executed { state, .. }
            | LoopOutcome::Exhausted { state, .. }
            | LoopOutcome::BoostUnavailable { state, .. } => state,
        }
    }

    /// Planning replies received (cached replies included)
    pub fn planning_attempts(&self) -> u32 {
        let state = self.state();
        match self {
            LoopOutcome::BoostUnavailable { .. } => state.iteration(),
            LoopOutcome::Exhausted { .. } => state.iteration(),
            _ => state.iteration() + 1,
        }
    }
}

enum Execution {
    Used(ExecutionOutcome),
    NotUsed(ExecutionContent),
}

enum Step {
    Planning(LoopState),
    Parsed {
        state: LoopState,
        raw: String,
    },
    Executing {
        state: LoopState,
        raw: String,
        plan: PlanGuidance,
        repeated: bool,
    },
    Retrying {
        state: LoopState,
        attempt: LoopAttempt,
    },
    Done(LoopOutcome),
}

impl Step {
    fn phase(&self) -> &'static str {
        match self {
            Step::Planning(_) => "planning",
            Step::Parsed { .. } => "parsed",
            Step::Executing { .. } => "executing",
            Step::Retrying { .. } => "retrying",
            Step::Done(_) => "done",
        }
    }
}

/// Best content seen so far, used when the loop is exhausted
#[derive(Default)]
struct Memory {
    last_plan: Option<String>,
    last_execution: Option<ExecutionContent>,
}

/// Retry reason carrying a preview of what the executor said instead.
fn not_followed_reason(content: &ExecutionContent) -> String {
    let text = match content {
        ExecutionContent::Text(text) => text.clone(),
        ExecutionContent::Stream { buffered, .. } => collect_text(buffered),
    };
    let text = text.trim();
    if text.is_empty() {
        return REASON_NOT_FOLLOWED.to_string();
    }
    format!(
        "{} (executor replied: {})",
        REASON_NOT_FOLLOWED,
        preview(text, ATTEMPT_PREVIEW_CHARS)
    )
}

/// Run an executor call under cancellation and a timeout.
pub(crate) async fn guarded_executor_call<T, F>(cancel: &CancellationToken, timeout: Duration, call: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, LlmError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(BoostError::Cancelled),
        result = tokio::time::timeout(timeout, call) => match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(BoostError::auxiliary(e)),
            Err(_) => Err(BoostError::auxiliary(LlmError::Timeout(timeout))),
        },
    }
}

/// Drives one request through the planning loop.
pub struct LoopController<'a> {
    planner: &'a dyn PlanningClient,
    executor: &'a dyn ExecutorClient,
    template: &'a WrapperTemplate,
    cache: Option<&'a PlanningCache>,
    settings: ControllerSettings,
    cancel: CancellationToken,
}

impl<'a> LoopController<'a> {
    pub fn new(
        planner: &'a dyn PlanningClient,
        executor: &'a dyn ExecutorClient,
        template: &'a WrapperTemplate,
        settings: ControllerSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            planner,
            executor,
            template,
            cache: None,
            settings,
            cancel,
        }
    }

    pub fn with_cache(mut self, cache: &'a PlanningCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Run the state machine to a terminal outcome.
    ///
    /// Errors are limited to cancellation and a failed executor call on the
    /// final iteration.
    pub async fn run(&self, request: &BoostRequest) -> Result<LoopOutcome> {
        let mut memory = Memory::default();
        let mut step = Step::Planning(LoopState::new(self.settings.max_iterations));

        loop {
            tracing::trace!(phase = step.phase(), "Loop transition");
            step = match step {
                Step::Planning(state) => self.planning(state, request).await?,
                Step::Parsed { state, raw } => self.parsed(state, raw),
                Step::Executing {
                    state,
                    raw,
                    plan,
                    repeated,
                } => self.executing(state, raw, plan, repeated, request, &mut memory).await?,
                Step::Retrying { state, attempt } => Self::retrying(state, attempt, &mut memory),
                Step::Done(outcome) => return Ok(outcome),
            };
        }
    }

    async fn planning(&self, state: LoopState, request: &BoostRequest) -> Result<Step> {
        tracing::info!(
            iteration = state.iteration(),
            max_iterations = state.max_iterations(),
            "Boost loop iteration"
        );

        let prompt = self.template.render(&state, request);
        match self.plan(&prompt).await {
            Ok(raw) => Ok(Step::Parsed { state, raw }),
            Err(BoostError::BoostUnavailable(reason)) => {
                tracing::warn!(iteration = state.iteration(), reason = %reason, "Boost model unavailable");
                Ok(Step::Done(LoopOutcome::BoostUnavailable { reason, state }))
            }
            Err(e) => Err(e),
        }
    }

    fn parsed(&self, state: LoopState, raw: String) -> Step {
        let classified = classify(&raw);
        tracing::info!(iteration = state.iteration(), kind = %classified.kind(), "Boost response classified");

        match classified {
            ClassifiedResponse::Summary(text) => Step::Done(LoopOutcome::Summary {
                text,
                state: state.finish(),
            }),
            ClassifiedResponse::Guidance { analysis, guidance } => {
                let (state, is_new) = state.register_guidance(&guidance);
                Step::Executing {
                    state,
                    raw,
                    plan: PlanGuidance::new(analysis, guidance),
                    repeated: !is_new,
                }
            }
            ClassifiedResponse::Other(_) => {
                let attempt = LoopAttempt::new(state.iteration(), raw, ResponseKind::Other, REASON_NO_SECTION);
                Step::Retrying { state, attempt }
            }
        }
    }

    async fn executing(
        &self,
        state: LoopState,
        raw: String,
        plan: PlanGuidance,
        repeated: bool,
        request: &BoostRequest,
        memory: &mut Memory,
    ) -> Result<Step> {
        let iteration = state.iteration();
        let mut attempt = match self.execute(request, &plan).await {
            Ok(Execution::Used(outcome)) => {
                tracing::info!(iteration, "Executor used tools");
                return Ok(Step::Done(LoopOutcome::Executed {
                    outcome,
                    state: state.finish(),
                }));
            }
            Ok(Execution::NotUsed(content)) => {
                tracing::warn!(iteration, "Executor answered without tools");
                let reason = not_followed_reason(&content);
                memory.last_execution = Some(content);
                LoopAttempt::new(iteration, raw, ResponseKind::Guidance, reason).with_tools_used(false)
            }
            Err(BoostError::Cancelled) => return Err(BoostError::Cancelled),
            Err(e) if state.is_final_iteration() => {
                tracing::error!(iteration, error = %e, "Executor failed on final iteration");
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(iteration, error = %e, "Executor failed, retrying");
                LoopAttempt::new(iteration, raw, ResponseKind::Guidance, format!("executor failed: {}", e))
            }
        };

        if repeated {
            attempt.reason = format!("{}; {}", attempt.reason, REASON_REPEATED);
        }
        Ok(Step::Retrying { state, attempt })
    }

    fn retrying(state: LoopState, attempt: LoopAttempt, memory: &mut Memory) -> Step {
        memory.last_plan = Some(attempt.raw_text.clone());
        let state = state.record(attempt);

        if !state.is_exhausted() {
            return Step::Planning(state);
        }

        tracing::warn!(max_iterations = state.max_iterations(), "Maximum retry attempts reached");
        let content = match memory.last_execution.take() {
            Some(content) => content,
            None => ExecutionContent::Text(memory.last_plan.take().unwrap_or_default()),
        };
        Step::Done(LoopOutcome::Exhausted {
            content,
            state: state.finish(),
        })
    }

    /// Planning call with cache, timeout and cancellation.
    async fn plan(&self, prompt: &str) -> Result<String> {
        let key = self
            .cache
            .map(|_| PlanningCache::fingerprint(self.planner.model(), prompt));

        if let (Some(cache), Some(key)) = (self.cache, key.as_deref())
            && let Some(hit) = cache.get(key).await
        {
            tracing::debug!("Planning cache hit");
            return Ok(hit);
        }

        let timeout = self.settings.planning_timeout;
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(BoostError::Cancelled),
            result = tokio::time::timeout(timeout, self.planner.plan(prompt)) => result,
        };

        match result {
            Ok(Ok(text)) => {
                if let (Some(cache), Some(key)) = (self.cache, key) {
                    cache.insert(key, text.clone()).await;
                }
                Ok(text)
            }
            Ok(Err(e)) => Err(BoostError::BoostUnavailable(e.to_string())),
            Err(_) => Err(BoostError::BoostUnavailable(LlmError::Timeout(timeout).to_string())),
        }
    }

    /// Executor call for one guidance, resolved to used/not-used.
    async fn execute(&self, request: &BoostRequest, plan: &PlanGuidance) -> Result<Execution> {
        let aux = build_auxiliary_request(request, &self.settings.executor_model, Some(plan));
        let timeout = self.settings.executor_timeout;

        if !aux.stream {
            let response = guarded_executor_call(&self.cancel, timeout, self.executor.complete(aux)).await?;
            if tools_used(&response) {
                return Ok(Execution::Used(ExecutionOutcome {
                    content: ExecutionContent::Text(response.content),
                    used_tools: true,
                    tool_calls: response.tool_calls,
                    usage: response.usage,
                }));
            }
            return Ok(Execution::NotUsed(ExecutionContent::Text(response.content)));
        }

        // The timeout spans opening the stream and reading it until tool use
        // resolves; dropping the handle on expiry closes the upstream.
        let streamed = async {
            let handle = self.executor.stream(aux).await?;
            Ok::<_, LlmError>(resolve_stream(handle).await)
        };
        let resolution = guarded_executor_call(&self.cancel, timeout, streamed).await?;

        match resolution {
            StreamResolution::ToolsUsed { buffered, remainder } => Ok(Execution::Used(ExecutionOutcome {
                content: ExecutionContent::Stream {
                    buffered,
                    remainder: Some(remainder),
                },
                used_tools: true,
                tool_calls: Vec::new(),
                usage: Usage::default(),
            })),
            StreamResolution::NoTools { chunks } => Ok(Execution::NotUsed(ExecutionContent::Stream {
                buffered: chunks,
                remainder: None,
            })),
            StreamResolution::Failed { message, .. } => Err(BoostError::AuxiliaryFailure { status: None, message }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{
        ChatResponse, MockExecution, MockExecutorClient, MockFailure, MockPlan, MockPlanningClient, ToolDescriptor,
    };
    use serde_json::json;

    fn settings() -> ControllerSettings {
        ControllerSettings {
            max_iterations: 3,
            planning_timeout: Duration::from_millis(200),
            executor_timeout: Duration::from_millis(200),
            executor_model: "gpt-4o".to_string(),
        }
    }

    fn request() -> BoostRequest {
        BoostRequest::new("claude-opus-4")
            .with_user_message("list the files")
            .with_tools(vec![ToolDescriptor::new("ls", "List files", json!({"type": "object"}))])
    }

    fn tool_response() -> ChatResponse {
        ChatResponse::with_tool_calls("", vec![ToolCall::new("call_1", "ls", json!({"path": "."}))])
    }

    async fn run(planner: &MockPlanningClient, executor: &MockExecutorClient) -> Result<LoopOutcome> {
        let template = WrapperTemplate::builtin();
        LoopController::new(planner, executor, &template, settings(), CancellationToken::new())
            .run(&request())
            .await
    }

    #[tokio::test]
    async fn test_summary_completes() {
        let planner = MockPlanningClient::replies(["SUMMARY:\nParis"]);
        let executor = MockExecutorClient::default();

        let outcome = run(&planner, &executor).await.unwrap();
        match outcome {
            LoopOutcome::Summary { ref text, ref state } => {
                assert_eq!(text, "Paris");
                assert!(state.is_terminal());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(executor.call_count(), 0);
    }

    #[tokio::test]
    async fn test_guidance_with_tools() {
        let planner = MockPlanningClient::replies(["ANALYSIS:\nneed ls\nGUIDANCE:\ncall ls"]);
        let executor = MockExecutorClient::new(vec![MockExecution::Response(tool_response())]);

        let outcome = run(&planner, &executor).await.unwrap();
        let LoopOutcome::Executed { outcome, .. } = outcome else {
            panic!("expected execution");
        };
        assert!(outcome.used_tools);
        assert_eq!(outcome.tool_calls.len(), 1);

        let sent = &executor.requests()[0];
        assert_eq!(sent.model, "gpt-4o");
        assert!(sent.messages[0].content.text().contains("GUIDANCE:\ncall ls"));
    }

    #[tokio::test]
    async fn test_always_unparseable_exhausts() {
        let planner = MockPlanningClient::always(MockPlan::Text("I am not sure.".to_string()));
        let executor = MockExecutorClient::default();

        let outcome = run(&planner, &executor).await.unwrap();
        assert_eq!(planner.call_count(), 3);
        assert_eq!(outcome.planning_attempts(), 3);
        match outcome {
            LoopOutcome::Exhausted {
                content: ExecutionContent::Text(text),
                state,
            } => {
                assert_eq!(text, "I am not sure.");
                assert_eq!(state.attempts().len(), 3);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_history_reaches_next_prompt() {
        let planner = MockPlanningClient::replies(["hmm", "SUMMARY:\nok"]);
        let executor = MockExecutorClient::default();

        run(&planner, &executor).await.unwrap();
        let prompts = planner.prompts();
        assert!(prompts[0].contains("Current ReAct Loop: 0"));
        assert!(prompts[0].contains("Previous Attempts: None"));
        assert!(prompts[1].contains("Current ReAct Loop: 1"));
        assert!(prompts[1].contains("[OTHER]: no SUMMARY or GUIDANCE section. Response: hmm"));
    }

    #[tokio::test]
    async fn test_exhausted_prefers_executor_output() {
        let planner = MockPlanningClient::always(MockPlan::Text("GUIDANCE:\ncall ls".to_string()));
        let executor = MockExecutorClient::new(vec![
            MockExecution::Response(ChatResponse::text("first")),
            MockExecution::Response(ChatResponse::text("second")),
            MockExecution::Response(ChatResponse::text("third")),
        ]);

        let outcome = run(&planner, &executor).await.unwrap();
        let LoopOutcome::Exhausted { content, state } = outcome else {
            panic!("expected exhaustion");
        };
        assert!(matches!(content, ExecutionContent::Text(ref t) if t == "third"));
        assert_eq!(executor.call_count(), 3);

        let reasons: Vec<&str> = state.attempts().iter().map(|a| a.reason.as_str()).collect();
        assert_eq!(reasons[0], "guidance not followed (executor replied: first)");
        assert!(reasons[1].starts_with("guidance not followed (executor replied: second)"));
        assert!(reasons[1].ends_with(REASON_REPEATED));
    }

    #[tokio::test]
    async fn test_stalled_stream_times_out_and_retries() {
        let planner = MockPlanningClient::always(MockPlan::Text("GUIDANCE:\ncall ls".to_string()));
        let executor = MockExecutorClient::new(vec![
            MockExecution::Stall(vec![StreamChunk::Text("thinking".to_string())]),
            MockExecution::Response(tool_response()),
        ]);
        let template = WrapperTemplate::builtin();

        let outcome = LoopController::new(&planner, &executor, &template, settings(), CancellationToken::new())
            .run(&request().with_stream(true))
            .await
            .unwrap();

        let LoopOutcome::Executed { outcome, state } = outcome else {
            panic!("expected execution after retry");
        };
        assert!(outcome.used_tools);
        assert_eq!(executor.call_count(), 2);
        let reason = &state.attempts()[0].reason;
        assert!(reason.starts_with("executor failed:"), "reason: {}", reason);
        assert!(reason.contains("Timed out"), "reason: {}", reason);
    }

    #[tokio::test]
    async fn test_not_followed_reason_shows_executor_reply() {
        let planner = MockPlanningClient::replies(["GUIDANCE:\ncall ls", "SUMMARY:\ndone"]);
        let executor = MockExecutorClient::new(vec![MockExecution::Stream(vec![
            StreamChunk::Text("I'd rather ".to_string()),
            StreamChunk::Text("not.".to_string()),
            StreamChunk::Done,
        ])]);
        let template = WrapperTemplate::builtin();

        LoopController::new(&planner, &executor, &template, settings(), CancellationToken::new())
            .run(&request().with_stream(true))
            .await
            .unwrap();

        assert!(planner.prompts()[1].contains("guidance not followed (executor replied: I'd rather not.)"));
    }

    #[test]
    fn test_not_followed_reason_truncates() {
        let long = "x".repeat(ATTEMPT_PREVIEW_CHARS + 10);
        let reason = not_followed_reason(&ExecutionContent::Text(long));
        assert!(reason.ends_with("...)"));
        assert_eq!(not_followed_reason(&ExecutionContent::Text("  ".to_string())), REASON_NOT_FOLLOWED);
    }

    #[tokio::test]
    async fn test_planning_failure_is_unavailable() {
        let planner = MockPlanningClient::new(vec![MockPlan::Fail(MockFailure::Status(503, "down".to_string()))]);
        let executor = MockExecutorClient::default();

        let outcome = run(&planner, &executor).await.unwrap();
        assert!(matches!(outcome, LoopOutcome::BoostUnavailable { .. }));
        assert_eq!(outcome.planning_attempts(), 0);
        assert_eq!(executor.call_count(), 0);
    }

    #[tokio::test]
    async fn test_planning_timeout_is_unavailable() {
        let planner = MockPlanningClient::new(vec![MockPlan::Hang]);
        let executor = MockExecutorClient::default();

        let outcome = run(&planner, &executor).await.unwrap();
        match outcome {
            LoopOutcome::BoostUnavailable { reason, .. } => assert!(reason.contains("Timed out")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_executor_failure_retried_then_final_surfaces() {
        let planner = MockPlanningClient::always(MockPlan::Text("GUIDANCE:\ncall ls".to_string()));
        let executor = MockExecutorClient::new(vec![
            MockExecution::Fail(MockFailure::Status(500, "boom".to_string())),
            MockExecution::Fail(MockFailure::Status(500, "boom".to_string())),
            MockExecution::Fail(MockFailure::Status(502, "bad gateway".to_string())),
        ]);

        let err = run(&planner, &executor).await.unwrap_err();
        match err {
            BoostError::AuxiliaryFailure { status, message } => {
                assert_eq!(status, Some(502));
                assert_eq!(message, "bad gateway");
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(planner.call_count(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_before_planning() {
        let planner = MockPlanningClient::replies(["SUMMARY:\nx"]);
        let executor = MockExecutorClient::default();
        let template = WrapperTemplate::builtin();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = LoopController::new(&planner, &executor, &template, settings(), cancel)
            .run(&request())
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_cache_hit_skips_planning() {
        let planner = MockPlanningClient::replies(["SUMMARY:\ncached"]);
        let executor = MockExecutorClient::default();
        let template = WrapperTemplate::builtin();
        let cache = PlanningCache::default();

        for _ in 0..2 {
            let outcome = LoopController::new(&planner, &executor, &template, settings(), CancellationToken::new())
                .with_cache(&cache)
                .run(&request())
                .await
                .unwrap();
            assert!(matches!(outcome, LoopOutcome::Summary { ref text, .. } if text == "cached"));
        }
        assert_eq!(planner.call_count(), 1);
    }
}
