//! Scripted clients for tests and offline runs
//!
//! Each mock pops the next scripted step per call and records what it was
//! asked, so tests can assert on call counts and request contents.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::client::{ExecutorClient, LlmError, PlanningClient};
use crate::llm::streaming::{StreamChunk, StreamHandle, assemble_tool_calls, collect_text, create_stream_channel};
use crate::llm::types::{ChatRequest, ChatResponse, FinishReason};

/// Failure a mock can be scripted to produce
#[derive(Debug, Clone, PartialEq)]
pub enum MockFailure {
    Timeout,
    Status(u16, String),
    Invalid(String),
}

impl MockFailure {
    fn to_error(&self) -> LlmError {
        match self {
            MockFailure::Timeout => LlmError::Timeout(Duration::from_secs(1)),
            MockFailure::Status(status, message) => LlmError::ApiError {
                status: *status,
                message: message.clone(),
            },
            MockFailure::Invalid(message) => LlmError::InvalidResponse(message.clone()),
        }
    }
}

/// One scripted planning reply
#[derive(Debug, Clone, PartialEq)]
pub enum MockPlan {
    Text(String),
    Fail(MockFailure),
    /// Reply after a delay
    Delayed(Duration, String),
    /// Never reply
    Hang,
}

/// Planning client that replays a script
pub struct MockPlanningClient {
    model: String,
    script: Mutex<VecDeque<MockPlan>>,
    repeat: Option<MockPlan>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl Default for MockPlanningClient {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl MockPlanningClient {
    pub fn new(script: Vec<MockPlan>) -> Self {
        Self {
            model: "mock-planner".to_string(),
            script: Mutex::new(script.into()),
            repeat: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Reply with the given texts in order
    pub fn replies<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(texts.into_iter().map(|t| MockPlan::Text(t.into())).collect())
    }

    /// Reply with the same step on every call
    pub fn always(step: MockPlan) -> Self {
        Self {
            repeat: Some(step),
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every prompt received, in order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn next_step(&self) -> Option<MockPlan> {
        let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        script.pop_front().or_else(|| self.repeat.clone())
    }
}

#[async_trait]
impl PlanningClient for MockPlanningClient {
    async fn plan(&self, prompt: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt.to_string());

        match self.next_step() {
            Some(MockPlan::Text(text)) => Ok(text),
            Some(MockPlan::Fail(failure)) => Err(failure.to_error()),
            Some(MockPlan::Delayed(delay, text)) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
            Some(MockPlan::Hang) => futures::future::pending().await,
            None => Err(LlmError::InvalidResponse("mock planning script exhausted".to_string())),
        }
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// One scripted executor reply
#[derive(Debug, Clone, PartialEq)]
pub enum MockExecution {
    Response(ChatResponse),
    Stream(Vec<StreamChunk>),
    Fail(MockFailure),
    Hang,
    /// Stream these chunks, then go quiet with the connection held open
    Stall(Vec<StreamChunk>),
}

/// Executor client that replays a script
#[derive(Default)]
pub struct MockExecutorClient {
    script: Mutex<VecDeque<MockExecution>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockExecutorClient {
    pub fn new(script: Vec<MockExecution>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request received, in order
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, request: ChatRequest) -> Option<MockExecution> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);
        self.script.lock().unwrap_or_else(|e| e.into_inner()).pop_front()
    }
}

/// Express a batched response as the chunk sequence a stream would carry
pub fn response_chunks(response: &ChatResponse) -> Vec<StreamChunk> {
    let mut chunks = Vec::new();
    if !response.content.is_empty() {
        chunks.push(StreamChunk::Text(response.content.clone()));
    }
    for (index, call) in response.tool_calls.iter().enumerate() {
        let index = index as u32;
        chunks.push(StreamChunk::ToolCallStart {
            index,
            id: call.id.clone(),
            name: call.name.clone(),
        });
        chunks.push(StreamChunk::ToolCallDelta {
            index,
            arguments: call.input.to_string(),
        });
    }
    chunks.push(StreamChunk::Finish(response.finish_reason));
    chunks.push(StreamChunk::Done);
    chunks
}

#[async_trait]
impl ExecutorClient for MockExecutorClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        match self.record(request) {
            Some(MockExecution::Response(response)) => Ok(response),
            Some(MockExecution::Stream(chunks)) => {
                let tool_calls = assemble_tool_calls(&chunks);
                Ok(ChatResponse {
                    content: collect_text(&chunks),
                    finish_reason: if tool_calls.is_empty() {
                        FinishReason::Stop
                    } else {
                        FinishReason::ToolCalls
                    },
                    tool_calls,
                    ..Default::default()
                })
            }
            Some(MockExecution::Fail(failure)) => Err(failure.to_error()),
            Some(MockExecution::Hang | MockExecution::Stall(_)) => futures::future::pending().await,
            None => Err(LlmError::InvalidResponse("mock executor script exhausted".to_string())),
        }
    }

    async fn stream(&self, request: ChatRequest) -> Result<StreamHandle, LlmError> {
        let (chunks, stall) = match self.record(request) {
            Some(MockExecution::Response(response)) => (response_chunks(&response), false),
            Some(MockExecution::Stream(chunks)) => (chunks, false),
            Some(MockExecution::Stall(chunks)) => (chunks, true),
            Some(MockExecution::Fail(failure)) => return Err(failure.to_error()),
            Some(MockExecution::Hang) => futures::future::pending().await,
            None => return Err(LlmError::InvalidResponse("mock executor script exhausted".to_string())),
        };

        let (tx, handle) = create_stream_channel(chunks.len().max(1));
        tokio::spawn(async move {
            for chunk in chunks {
                if tx.send(chunk).await.is_err() {
                    return;
                }
            }
            if stall {
                tx.closed().await;
            }
        });
        Ok(handle)
    }
}
