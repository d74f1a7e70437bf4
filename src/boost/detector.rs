//! Tool-usage detection for batched and streamed executor replies.

use tokio::sync::watch;

use crate::llm::{ChatResponse, StreamChunk, StreamHandle, ToolCall, assemble_tool_calls, collect_text};

/// Batched replies: tools were used if any call came back.
pub fn tools_used(response: &ChatResponse) -> bool {
    !response.tool_calls.is_empty()
}

/// Watches a chunk sequence and raises a flag on the first tool call start.
#[derive(Debug)]
pub struct ToolUsageDetector {
    flag: watch::Sender<bool>,
}

impl Default for ToolUsageDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolUsageDetector {
    pub fn new() -> Self {
        let (flag, _) = watch::channel(false);
        Self { flag }
    }

    /// Receiver that flips to `true` as soon as a tool call starts
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.flag.subscribe()
    }

    pub fn observe(&self, chunk: &StreamChunk) {
        if matches!(chunk, StreamChunk::ToolCallStart { .. }) && !*self.flag.borrow() {
            log::debug!("Tool call detected in executor stream");
            self.flag.send_replace(true);
        }
    }

    pub fn used(&self) -> bool {
        *self.flag.borrow()
    }
}

/// Outcome of reading a stream until tool usage is known.
#[derive(Debug)]
pub enum StreamResolution {
    /// A tool call started; `buffered` ends with its start chunk and
    /// `remainder` carries the rest of the live stream.
    ToolsUsed {
        buffered: Vec<StreamChunk>,
        remainder: StreamHandle,
    },
    /// Stream ended without a tool call
    NoTools { chunks: Vec<StreamChunk> },
    /// Stream reported an error before any tool call
    Failed { buffered: Vec<StreamChunk>, message: String },
}

impl StreamResolution {
    pub fn used_tools(&self) -> bool {
        matches!(self, StreamResolution::ToolsUsed { .. })
    }

    /// Text seen so far
    pub fn text(&self) -> String {
        match self {
            StreamResolution::ToolsUsed { buffered, .. } => collect_text(buffered),
            StreamResolution::NoTools { chunks } => collect_text(chunks),
            StreamResolution::Failed { buffered, .. } => collect_text(buffered),
        }
    }

    /// Tool calls assembled from the buffered chunks
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        match self {
            StreamResolution::ToolsUsed { buffered, .. } => assemble_tool_calls(buffered),
            _ => Vec::new(),
        }
    }
}

/// Buffer a stream until tool usage resolves.
pub async fn resolve_stream(handle: StreamHandle) -> StreamResolution {
    resolve_stream_with(handle, &ToolUsageDetector::new()).await
}

/// Like [`resolve_stream`], reporting through a caller-owned detector.
pub async fn resolve_stream_with(mut handle: StreamHandle, detector: &ToolUsageDetector) -> StreamResolution {
    let mut buffered = Vec::new();

    while let Some(chunk) = handle.recv().await {
        detector.observe(&chunk);
        let error = match &chunk {
            StreamChunk::Error(message) => Some(message.clone()),
            _ => None,
        };
        let done = chunk == StreamChunk::Done;
        buffered.push(chunk);

        if detector.used() {
            return StreamResolution::ToolsUsed {
                buffered,
                remainder: handle,
            };
        }
        if let Some(message) = error {
            return StreamResolution::Failed { buffered, message };
        }
        if done {
            break;
        }
    }

    StreamResolution::NoTools { chunks: buffered }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{FinishReason, create_stream_channel};
    use serde_json::json;

    fn tool_start() -> StreamChunk {
        StreamChunk::ToolCallStart {
            index: 0,
            id: "call_1".to_string(),
            name: "ls".to_string(),
        }
    }

    #[test]
    fn test_batched_detection() {
        assert!(!tools_used(&ChatResponse::text("hello")));
        let response = ChatResponse::with_tool_calls("", vec![ToolCall::new("c", "ls", json!({}))]);
        assert!(tools_used(&response));
    }

    #[test]
    fn test_detector_flag() {
        let detector = ToolUsageDetector::new();
        let rx = detector.subscribe();
        detector.observe(&StreamChunk::Text("hi".to_string()));
        assert!(!*rx.borrow());
        detector.observe(&tool_start());
        assert!(*rx.borrow());
        assert!(detector.used());
    }

    #[tokio::test]
    async fn test_resolves_before_stream_end() {
        let (tx, handle) = create_stream_channel(16);
        tx.send(StreamChunk::Text("Let me look.".to_string())).await.unwrap();
        tx.send(tool_start()).await.unwrap();

        // The producer is still open, so resolution must not wait for Done
        let resolution = resolve_stream(handle).await;
        let StreamResolution::ToolsUsed { buffered, mut remainder } = resolution else {
            panic!("expected tool use");
        };
        assert_eq!(buffered.len(), 2);

        tx.send(StreamChunk::ToolCallDelta {
            index: 0,
            arguments: "{}".to_string(),
        })
        .await
        .unwrap();
        tx.send(StreamChunk::Done).await.unwrap();
        let rest = remainder.collect_all().await;
        assert_eq!(rest.len(), 2);
    }

    #[tokio::test]
    async fn test_no_tools() {
        let (tx, handle) = create_stream_channel(16);
        tx.send(StreamChunk::Text("plain".to_string())).await.unwrap();
        tx.send(StreamChunk::Finish(FinishReason::Stop)).await.unwrap();
        tx.send(StreamChunk::Done).await.unwrap();

        let resolution = resolve_stream(handle).await;
        assert!(!resolution.used_tools());
        assert_eq!(resolution.text(), "plain");
    }

    #[tokio::test]
    async fn test_closed_without_done() {
        let (tx, handle) = create_stream_channel(4);
        tx.send(StreamChunk::Text("cut".to_string())).await.unwrap();
        drop(tx);

        let resolution = resolve_stream(handle).await;
        assert!(matches!(resolution, StreamResolution::NoTools { ref chunks } if chunks.len() == 1));
    }

    #[tokio::test]
    async fn test_stream_error() {
        let (tx, handle) = create_stream_channel(4);
        tx.send(StreamChunk::Text("par".to_string())).await.unwrap();
        tx.send(StreamChunk::Error("connection reset".to_string())).await.unwrap();

        match resolve_stream(handle).await {
            StreamResolution::Failed { buffered, message } => {
                assert_eq!(message, "connection reset");
                assert_eq!(buffered.len(), 2);
            }
            other => panic!("unexpected resolution: {:?}", other),
        }
    }
}
