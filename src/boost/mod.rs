//! Boost-directed tool calling
//!
//! A text-only planning model reads the request and a textual tool catalog
//! and answers with SUMMARY (done), ANALYSIS + GUIDANCE (hand off to the
//! executor with the real tool schema), or anything else (retry). The
//! controller repeats this up to `max_iterations` times; the orchestrator
//! wraps it with tier gating, direct-execution fallback, cancellation and
//! stream buffering.

pub mod auxiliary;
pub mod cache;
pub mod controller;
pub mod detector;
pub mod orchestrator;
pub mod request;
pub mod sections;
pub mod state;
pub mod wrapper;

pub use auxiliary::{PlanGuidance, build_auxiliary_request, guidance_system_message};
pub use cache::{CacheStats, PlanningCache};
pub use controller::{ControllerSettings, ExecutionContent, ExecutionOutcome, LoopController, LoopOutcome};
pub use detector::{StreamResolution, ToolUsageDetector, resolve_stream, resolve_stream_with, tools_used};
pub use orchestrator::{
    EXHAUSTED_DETAIL, OrchestrationResult, Orchestrator, ResultContent, ResultSource, forward_stream,
    synthesize_stream,
};
pub use request::BoostRequest;
pub use sections::{ClassifiedResponse, ResponseKind, Sections, classify, parse_sections};
pub use state::{LoopAttempt, LoopState};
pub use wrapper::{DEFAULT_TEMPLATE, PLACEHOLDERS, WrapperTemplate, render_attempts, render_tools};
