//! Offline replay of captured SSE responses.

use agstream_core::{
    frame_stream, AgentBuilder, AgentConfig, AgentResult, ByteStream, LoggingMiddleware,
    Transport, TransportRequest,
};
use agstream_protocol::{Event, Message, RunAgentParams};
use anyhow::Context;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Transport that serves a file's bytes in fixed-size chunks.
pub struct FileTransport {
    path: PathBuf,
    chunk_size: usize,
}

impl FileTransport {
    pub fn new(path: impl Into<PathBuf>, chunk_size: usize) -> Self {
        Self {
            path: path.into(),
            chunk_size: chunk_size.max(1),
        }
    }
}

#[async_trait]
impl Transport for FileTransport {
    async fn open(&self, request: TransportRequest) -> AgentResult<ByteStream> {
        debug!(url = %request.url, path = %self.path.display(), "Opening capture");
        let bytes = tokio::fs::read(&self.path).await?;
        let chunks: Vec<AgentResult<Vec<u8>>> = bytes
            .chunks(self.chunk_size)
            .map(|chunk| Ok(chunk.to_vec()))
            .collect();
        Ok(futures::stream::iter(chunks).boxed())
    }
}

async fn load_config(path: Option<&Path>) -> anyhow::Result<AgentConfig> {
    let mut config = match path {
        Some(path) => AgentConfig::load_file(path)
            .await
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => AgentConfig::default(),
    };
    config.apply_env_overrides()?;
    Ok(config)
}

/// Replay `file` through a fresh agent session and print the outcome.
pub async fn run_replay(
    file: &Path,
    chunk_size: usize,
    config: Option<&Path>,
    json_output: bool,
) -> anyhow::Result<()> {
    let config = load_config(config).await?;
    let mut builder = AgentBuilder::from_config(&config);
    if config.url.is_none() {
        builder = builder.url(format!("file://{}", file.display()));
    }
    let mut agent = builder.build()?;
    agent.use_middleware(Arc::new(LoggingMiddleware));

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let transport = FileTransport::new(file, chunk_size);
    let outcome = agent
        .run(RunAgentParams::new(), &transport, cancel)
        .await?;
    let Some(result) = outcome else {
        info!("Replay failure suppressed by middleware");
        return Ok(());
    };

    if json_output {
        let doc = json!({
            "threadId": result.thread_id,
            "runId": result.run_id,
            "messages": agent.messages().iter().map(Message::to_value).collect::<Vec<_>>(),
            "state": agent.state(),
            "result": result.result,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else {
        print_summary(agent.messages(), agent.state(), &result.result);
    }
    Ok(())
}

fn print_summary(messages: &[Message], state: &Value, result: &Value) {
    println!("Messages ({}):", messages.len());
    for message in messages {
        println!("  [{}] {}: {}", message.role, message.id, message.content);
        for tool_call in &message.tool_calls {
            println!(
                "      -> {}({}) [{}]",
                tool_call.function.name, tool_call.function.arguments, tool_call.id
            );
        }
    }
    println!("State: {state}");
    if !result.is_null() {
        println!("Result: {result}");
    }
}

/// Print one line per framed payload: its event type or why it failed.
pub async fn run_decode(file: &Path) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;

    let payloads = frame_stream(futures::stream::iter([AgentResult::Ok(bytes)]));
    futures::pin_mut!(payloads);

    let mut index = 0usize;
    while let Some(payload) = payloads.next().await {
        let payload = payload?;
        match Event::decode_str(&payload) {
            Ok(event) => println!("{index:>4} {}", event.event_type()),
            Err(e) => println!("{index:>4} <malformed: {e}>"),
        }
        index += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_file_transport_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.sse");
        std::fs::write(&path, b"data: {\"type\":\"RUN_STARTED\"}\n\n").unwrap();

        let transport = FileTransport::new(&path, 4);
        let request = TransportRequest {
            url: "file://capture".to_string(),
            headers: Default::default(),
            timeout: Duration::from_secs(1),
            body: Value::Null,
        };
        let chunks: Vec<Vec<u8>> = transport
            .open(request)
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert!(chunks.iter().all(|c| c.len() <= 4));
        assert_eq!(chunks.concat(), b"data: {\"type\":\"RUN_STARTED\"}\n\n");
    }

    #[tokio::test]
    async fn test_replay_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.sse");
        std::fs::write(
            &path,
            concat!(
                "data: {\"type\":\"TEXT_MESSAGE_START\",\"messageId\":\"m1\",\"role\":\"assistant\"}\n\n",
                "data: {\"type\":\"TEXT_MESSAGE_CONTENT\",\"messageId\":\"m1\",\"delta\":\"hi\"}\n\n",
                "data: {\"type\":\"TEXT_MESSAGE_END\",\"messageId\":\"m1\"}\n\n",
            ),
        )
        .unwrap();

        run_replay(&path, 7, None, true).await.unwrap();
        run_decode(&path).await.unwrap();
    }
}
