//! LLM Client Layer - OpenAI-compatible endpoints with streaming and pooling
//!
//! This module provides:
//! - Message, tool and completion types
//! - PlanningClient / ExecutorClient traits
//! - OpenAiClient implementation over a shared connection pool
//! - Streaming support
//! - Scripted mock clients

pub mod client;
pub mod mock;
pub mod openai;
pub mod pool;
pub mod streaming;
pub mod types;

pub use client::{ExecutorClient, LlmError, PlanningClient};
pub use mock::{MockExecution, MockExecutorClient, MockFailure, MockPlan, MockPlanningClient};
pub use openai::{OpenAiClient, OpenAiConfig, parse_completion};
pub use pool::{ClientPool, Endpoint};
pub use streaming::{
    ChatChunk, StreamChunk, StreamHandle, StreamParser, assemble_tool_calls, collect_text, create_stream_channel,
    parse_sse_event,
};
pub use types::{
    ChatMessage, ChatRequest, ChatResponse, ContentBlock, FinishReason, MessageContent, Role, ToolCall,
    ToolDescriptor, Usage,
};
