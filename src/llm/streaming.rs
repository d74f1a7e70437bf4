//! Streaming support for LLM responses.
//!
//! Provides types for handling streaming responses from OpenAI-compatible
//! chat completion endpoints, including the raw SSE chunk shape, the chunks
//! emitted to consumers, and handles for reading a stream.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::llm::types::{FinishReason, ToolCall};

/// One `data:` payload of a chat completion stream.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: ChunkDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallFragment>,
}

/// Partial tool call; `id` and `name` arrive once, arguments in pieces
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ToolCallFragment {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<FunctionFragment>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FunctionFragment {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

/// Chunk types emitted to consumers during streaming.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// Text content delta
    Text(String),
    /// Tool call started
    ToolCallStart {
        /// Position of the call within the message
        index: u32,
        /// Unique tool call ID
        id: String,
        /// Name of the tool being called
        name: String,
    },
    /// Tool arguments JSON delta
    ToolCallDelta {
        /// Position of the call this fragment belongs to
        index: u32,
        /// Partial JSON arguments
        arguments: String,
    },
    /// Model reported why it stopped
    Finish(FinishReason),
    /// Stream completed successfully
    Done,
    /// Stream error
    Error(String),
}

impl StreamChunk {
    /// Whether this chunk ends the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamChunk::Done | StreamChunk::Error(_))
    }
}

/// Handle for receiving streaming chunks.
#[derive(Debug)]
pub struct StreamHandle {
    /// Receiver for stream chunks
    pub receiver: mpsc::Receiver<StreamChunk>,
}

impl StreamHandle {
    /// Create a new stream handle with the given receiver.
    pub fn new(receiver: mpsc::Receiver<StreamChunk>) -> Self {
        Self { receiver }
    }

    /// Receive the next chunk from the stream.
    pub async fn recv(&mut self) -> Option<StreamChunk> {
        self.receiver.recv().await
    }

    /// Collect every chunk up to and including the terminal one.
    pub async fn collect_all(&mut self) -> Vec<StreamChunk> {
        let mut chunks = Vec::new();
        while let Some(chunk) = self.recv().await {
            let terminal = chunk.is_terminal();
            chunks.push(chunk);
            if terminal {
                break;
            }
        }
        chunks
    }

    /// Collect all text from the stream into a single string.
    pub async fn collect_text(&mut self) -> String {
        collect_text(&self.collect_all().await)
    }
}

/// Builder for stream handle pairs (sender and handle).
pub fn create_stream_channel(buffer_size: usize) -> (mpsc::Sender<StreamChunk>, StreamHandle) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (tx, StreamHandle::new(rx))
}

/// Concatenate the text deltas of a chunk sequence.
pub fn collect_text(chunks: &[StreamChunk]) -> String {
    chunks
        .iter()
        .filter_map(|c| match c {
            StreamChunk::Text(t) => Some(t.as_str()),
            _ => None,
        })
        .collect()
}

/// Rebuild complete tool calls from a chunk sequence.
pub fn assemble_tool_calls(chunks: &[StreamChunk]) -> Vec<ToolCall> {
    let mut calls: BTreeMap<u32, (String, String, String)> = BTreeMap::new();
    for chunk in chunks {
        match chunk {
            StreamChunk::ToolCallStart { index, id, name } => {
                calls.insert(*index, (id.clone(), name.clone(), String::new()));
            }
            StreamChunk::ToolCallDelta { index, arguments } => {
                if let Some(entry) = calls.get_mut(index) {
                    entry.2.push_str(arguments);
                }
            }
            _ => {}
        }
    }

    calls
        .into_values()
        .map(|(id, name, args)| ToolCall::new(id, name, parse_arguments(&args)))
        .collect()
}

/// Tool arguments are a JSON string on the wire; keep the raw text if it is not valid JSON.
pub fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Parse a raw SSE `data:` payload into a ChatChunk.
///
/// OpenAI-compatible APIs use Server-Sent Events (SSE) format:
/// ```text
/// data: {"choices":[{"delta":{"content":"Hi"}}]}
/// data: [DONE]
/// ```
pub fn parse_sse_event(data: &str) -> Option<ChatChunk> {
    if data.is_empty() || data == "[DONE]" {
        return None;
    }

    serde_json::from_str(data).ok()
}

/// State tracker for turning raw chunks into consumer chunks.
#[derive(Debug, Default)]
pub struct StreamParser {
    /// Tool call indices already announced
    started: Vec<u32>,
    /// Accumulated text content
    pub text_content: String,
    /// Set once a finish reason or end marker was seen
    pub finished: bool,
}

impl StreamParser {
    /// Create a new stream parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one raw chunk and emit consumer chunks.
    pub fn process_chunk(&mut self, chunk: ChatChunk) -> Vec<StreamChunk> {
        let mut out = Vec::new();

        for choice in chunk.choices {
            if let Some(text) = choice.delta.content
                && !text.is_empty()
            {
                self.text_content.push_str(&text);
                out.push(StreamChunk::Text(text));
            }

            for fragment in choice.delta.tool_calls {
                let function = fragment.function.unwrap_or_default();
                if !self.started.contains(&fragment.index) {
                    self.started.push(fragment.index);
                    out.push(StreamChunk::ToolCallStart {
                        index: fragment.index,
                        id: fragment.id.unwrap_or_default(),
                        name: function.name.unwrap_or_default(),
                    });
                }
                if let Some(arguments) = function.arguments
                    && !arguments.is_empty()
                {
                    out.push(StreamChunk::ToolCallDelta {
                        index: fragment.index,
                        arguments,
                    });
                }
            }

            if let Some(reason) = choice.finish_reason {
                out.push(StreamChunk::Finish(FinishReason::parse(&reason)));
            }
        }

        out
    }

    /// Process a raw `data:` payload, including the `[DONE]` marker.
    pub fn process_data(&mut self, data: &str) -> Vec<StreamChunk> {
        if data.trim() == "[DONE]" {
            return self.finish();
        }
        match parse_sse_event(data) {
            Some(chunk) => self.process_chunk(chunk),
            None => Vec::new(),
        }
    }

    /// Emit the end-of-stream marker once.
    pub fn finish(&mut self) -> Vec<StreamChunk> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;
        vec![StreamChunk::Done]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_delta() {
        let mut parser = StreamParser::new();
        let chunks = parser.process_data(r#"{"choices":[{"delta":{"content":"Hello"}}]}"#);

        assert_eq!(chunks, vec![StreamChunk::Text("Hello".to_string())]);
        assert_eq!(parser.text_content, "Hello");
    }

    #[test]
    fn test_tool_call_start_then_arguments() {
        let mut parser = StreamParser::new();

        let first = parser.process_data(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"read_file","arguments":""}}]}}]}"#,
        );
        assert_eq!(
            first,
            vec![StreamChunk::ToolCallStart {
                index: 0,
                id: "call_1".to_string(),
                name: "read_file".to_string(),
            }]
        );

        let second = parser.process_data(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"path\":"}}]}}]}"#,
        );
        assert_eq!(
            second,
            vec![StreamChunk::ToolCallDelta {
                index: 0,
                arguments: r#"{"path":"#.to_string(),
            }]
        );
    }

    #[test]
    fn test_second_tool_call_gets_its_own_start() {
        let mut parser = StreamParser::new();
        parser.process_data(r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"a","function":{"name":"x"}}]}}]}"#);
        let chunks =
            parser.process_data(r#"{"choices":[{"delta":{"tool_calls":[{"index":1,"id":"b","function":{"name":"y"}}]}}]}"#);
        assert!(matches!(chunks[0], StreamChunk::ToolCallStart { index: 1, .. }));
    }

    #[test]
    fn test_finish_reason() {
        let mut parser = StreamParser::new();
        let chunks = parser.process_data(r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#);
        assert_eq!(chunks, vec![StreamChunk::Finish(FinishReason::ToolCalls)]);
    }

    #[test]
    fn test_done_marker_emitted_once() {
        let mut parser = StreamParser::new();
        assert_eq!(parser.process_data("[DONE]"), vec![StreamChunk::Done]);
        assert!(parser.finish().is_empty());
    }

    #[test]
    fn test_parse_sse_event_invalid() {
        assert!(parse_sse_event("not json").is_none());
        assert!(parse_sse_event("").is_none());
        assert!(parse_sse_event("[DONE]").is_none());
    }

    #[test]
    fn test_assemble_tool_calls() {
        let chunks = vec![
            StreamChunk::Text("Reading".to_string()),
            StreamChunk::ToolCallStart {
                index: 0,
                id: "call_1".to_string(),
                name: "read_file".to_string(),
            },
            StreamChunk::ToolCallDelta {
                index: 0,
                arguments: r#"{"path":"#.to_string(),
            },
            StreamChunk::ToolCallDelta {
                index: 0,
                arguments: r#""a.txt"}"#.to_string(),
            },
            StreamChunk::Done,
        ];

        let calls = assemble_tool_calls(&chunks);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "read_file");
        assert_eq!(calls[0].input["path"], "a.txt");
        assert_eq!(collect_text(&chunks), "Reading");
    }

    #[test]
    fn test_parse_arguments_keeps_invalid_json() {
        assert_eq!(parse_arguments("{oops"), Value::String("{oops".to_string()));
        assert!(parse_arguments("").is_object());
    }

    #[tokio::test]
    async fn test_stream_handle_collect_stops_at_done() {
        let (tx, mut handle) = create_stream_channel(10);

        tx.send(StreamChunk::Text("Hello ".to_string())).await.unwrap();
        tx.send(StreamChunk::Text("World".to_string())).await.unwrap();
        tx.send(StreamChunk::Done).await.unwrap();
        tx.send(StreamChunk::Text("ignored".to_string())).await.unwrap();

        let text = handle.collect_text().await;
        assert_eq!(text, "Hello World");
    }

    #[tokio::test]
    async fn test_stream_handle_collect_until_closed() {
        let (tx, mut handle) = create_stream_channel(10);
        tx.send(StreamChunk::Text("partial".to_string())).await.unwrap();
        drop(tx);

        let chunks = handle.collect_all().await;
        assert_eq!(chunks, vec![StreamChunk::Text("partial".to_string())]);
    }

    #[test]
    fn test_create_stream_channel() {
        let (tx, handle) = create_stream_channel(10);
        drop(tx);
        assert!(handle.receiver.is_closed());
    }
}
