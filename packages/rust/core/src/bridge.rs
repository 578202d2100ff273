//! Text generation through a JSON-lines bridge subprocess.
//!
//! The bridge (by default `bun run bridge/summarize.ts`) talks to the hosted
//! model. One request per line on stdin, one response per line on stdout:
//!
//! ```text
//! <- {"type":"ready"}
//! -> {"type":"generate","id":"req-1","request":{...}}
//! <- {"type":"result","id":"req-1","result":{"text":...}}
//! -> {"type":"shutdown"}
//! ```

use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use jobsignal_shared::{JobSignalError, Result, SummarySection};

use crate::summary::{GenerationRequest, TextGenerator};

fn gen_err(msg: impl Into<String>) -> JobSignalError {
    JobSignalError::Generation(msg.into())
}

// ---------------------------------------------------------------------------
// Protocol
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RequestMessage<'a> {
    Generate {
        id: String,
        request: &'a GenerationRequest,
    },
    Shutdown,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseMessage {
    Ready,
    Result { id: String, result: BridgeResult },
    Error {
        #[allow(dead_code)]
        id: Option<String>,
        error: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeResult {
    pub text: String,
    #[serde(default)]
    pub tokens_in: u64,
    #[serde(default)]
    pub tokens_out: u64,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub latency_ms: u64,
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// How to launch the bridge process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl From<&SummarySection> for BridgeConfig {
    fn from(section: &SummarySection) -> Self {
        Self {
            program: section.bridge_cmd.clone(),
            args: vec!["run".to_string(), section.bridge_script.clone()],
            working_dir: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Process handle
// ---------------------------------------------------------------------------

struct BridgeHandle {
    child: Child,
    stdin: std::process::ChildStdin,
    reader: BufReader<std::process::ChildStdout>,
    request_counter: u64,
}

impl BridgeHandle {
    fn spawn(config: &BridgeConfig) -> Result<Self> {
        info!(program = %config.program, args = ?config.args, "spawning generation bridge");

        let mut command = Command::new(&config.program);
        command
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if let Some(dir) = &config.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| {
            gen_err(format!(
                "failed to spawn bridge: {e}. Is `{}` installed?",
                config.program
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| gen_err("failed to capture bridge stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| gen_err("failed to capture bridge stdout"))?;

        let mut handle = Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            request_counter: 0,
        };
        handle.wait_for_ready()?;
        Ok(handle)
    }

    fn read_message(&mut self) -> Result<ResponseMessage> {
        let mut line = String::new();
        self.reader
            .read_line(&mut line)
            .map_err(|e| gen_err(format!("bridge read error: {e}")))?;
        if line.is_empty() {
            return Err(gen_err("bridge closed stdout unexpectedly"));
        }
        serde_json::from_str(line.trim()).map_err(|e| {
            gen_err(format!(
                "invalid bridge message: {e} (got: {})",
                line.chars().take(200).collect::<String>()
            ))
        })
    }

    fn wait_for_ready(&mut self) -> Result<()> {
        match self.read_message()? {
            ResponseMessage::Ready => {
                info!("bridge is ready");
                Ok(())
            }
            other => Err(gen_err(format!("expected ready message, got {other:?}"))),
        }
    }

    fn send(&mut self, message: &RequestMessage<'_>) -> Result<()> {
        let json = serde_json::to_string(message)
            .map_err(|e| gen_err(format!("failed to serialize request: {e}")))?;
        writeln!(self.stdin, "{json}")
            .map_err(|e| gen_err(format!("failed to write to bridge stdin: {e}")))?;
        self.stdin
            .flush()
            .map_err(|e| gen_err(format!("failed to flush bridge stdin: {e}")))
    }

    fn generate(&mut self, request: &GenerationRequest) -> Result<BridgeResult> {
        self.request_counter += 1;
        let id = format!("req-{}", self.request_counter);
        self.send(&RequestMessage::Generate {
            id: id.clone(),
            request,
        })?;

        match self.read_message()? {
            ResponseMessage::Result { id: resp_id, result } if resp_id == id => Ok(result),
            ResponseMessage::Result { id: resp_id, .. } => Err(gen_err(format!(
                "bridge answered {resp_id}, expected {id}"
            ))),
            ResponseMessage::Error { error, .. } => Err(gen_err(error)),
            ResponseMessage::Ready => Err(gen_err("unexpected ready message during generation")),
        }
    }

    fn shutdown(mut self) {
        let _ = self.send(&RequestMessage::Shutdown);
        match self.child.wait() {
            Ok(status) => info!(?status, "bridge exited"),
            Err(e) => warn!("bridge wait error: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

/// [`TextGenerator`] backed by a lazily spawned bridge process.
///
/// Requests are serialized over the single process. A failed exchange drops
/// the process so the next request starts a fresh one.
#[derive(Clone)]
pub struct BridgeGenerator {
    config: BridgeConfig,
    handle: Arc<Mutex<Option<BridgeHandle>>>,
}

impl BridgeGenerator {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Stop the bridge process if it is running.
    pub fn shutdown(&self) {
        let taken = self
            .handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = taken {
            handle.shutdown();
        }
    }

    fn generate_blocking(
        config: &BridgeConfig,
        slot: &Mutex<Option<BridgeHandle>>,
        request: &GenerationRequest,
    ) -> Result<String> {
        let mut guard = slot.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_none() {
            *guard = Some(BridgeHandle::spawn(config)?);
        }
        let handle = guard
            .as_mut()
            .ok_or_else(|| gen_err("bridge not running"))?;

        match handle.generate(request) {
            Ok(result) => {
                debug!(
                    model = %result.model,
                    tokens_in = result.tokens_in,
                    tokens_out = result.tokens_out,
                    latency_ms = result.latency_ms,
                    "bridge generation finished"
                );
                Ok(result.text)
            }
            Err(e) => {
                if let Some(broken) = guard.take() {
                    broken.shutdown();
                }
                Err(e)
            }
        }
    }
}

impl TextGenerator for BridgeGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let config = self.config.clone();
        let slot = Arc::clone(&self.handle);
        let request = request.clone();
        tokio::task::spawn_blocking(move || Self::generate_blocking(&config, &slot, &request))
            .await
            .map_err(|e| gen_err(format!("bridge task panicked: {e}")))?
    }
}
