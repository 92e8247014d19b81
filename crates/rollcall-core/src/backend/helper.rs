//! Out-of-process recognition helper speaking line-delimited JSON.
//!
//! Every request is one JSON header line. Detection requests are followed by
//! exactly `width * height` raw grayscale bytes. The helper answers each
//! request with one JSON line:
//!
//! ```text
//! -> {"op":"detect_all","width":640,"height":360}\n<230400 bytes>
//! <- {"ok":true,"detections":[{"box":{...},"embedding":[...]}]}
//! <- {"ok":false,"error":"model not loaded"}
//! ```

use super::{frame_bytes, BackendError, FaceBackend};
use crate::types::Detection;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Request {
    LoadModels,
    DetectAll { width: u32, height: u32 },
    DetectSingle { width: u32, height: u32 },
}

#[derive(Debug, Deserialize)]
struct Response {
    ok: bool,
    #[serde(default)]
    detections: Vec<Detection>,
    #[serde(default)]
    error: Option<String>,
}

/// Request/response framing over any reader/writer pair.
pub struct HelperChannel<R, W> {
    reader: R,
    writer: W,
    line: String,
}

impl<R: BufRead, W: Write> HelperChannel<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            line: String::new(),
        }
    }

    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }

    fn call(&mut self, request: &Request, payload: Option<&[u8]>) -> Result<Vec<Detection>, BackendError> {
        serde_json::to_writer(&mut self.writer, request)
            .map_err(|e| BackendError::Protocol(format!("encode {request:?}: {e}")))?;
        self.writer.write_all(b"\n")?;
        if let Some(bytes) = payload {
            self.writer.write_all(bytes)?;
        }
        self.writer.flush()?;

        self.line.clear();
        if self.reader.read_line(&mut self.line)? == 0 {
            return Err(BackendError::Closed);
        }

        let response: Response = serde_json::from_str(self.line.trim_end())
            .map_err(|e| BackendError::Protocol(format!("decode response: {e}")))?;

        if !response.ok {
            return Err(BackendError::Remote(
                response.error.unwrap_or_else(|| "unspecified error".to_string()),
            ));
        }

        Ok(response.detections)
    }
}

impl<R: BufRead + Send, W: Write + Send> FaceBackend for HelperChannel<R, W> {
    fn load_models(&mut self) -> Result<(), BackendError> {
        self.call(&Request::LoadModels, None).map(|_| ())
    }

    fn detect_all(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<Detection>, BackendError> {
        let bytes = frame_bytes(pixels, width, height)?;
        self.call(&Request::DetectAll { width, height }, Some(bytes))
    }

    fn detect_single(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Option<Detection>, BackendError> {
        let bytes = frame_bytes(pixels, width, height)?;
        let detections = self.call(&Request::DetectSingle { width, height }, Some(bytes))?;
        Ok(detections.into_iter().next())
    }
}

/// A spawned helper process. The process is killed when this is dropped.
pub struct HelperBackend {
    child: Child,
    channel: HelperChannel<BufReader<ChildStdout>, ChildStdin>,
    program: String,
}

impl HelperBackend {
    /// Spawn the helper with piped stdin/stdout; its stderr is inherited.
    pub fn spawn(program: &str, args: &[String]) -> Result<Self, BackendError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| BackendError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            return Err(BackendError::Protocol("helper stdio not captured".into()));
        };

        tracing::info!(program, pid = child.id(), "recognition helper started");

        Ok(Self {
            child,
            channel: HelperChannel::new(BufReader::new(stdout), stdin),
            program: program.to_string(),
        })
    }
}

impl FaceBackend for HelperBackend {
    fn load_models(&mut self) -> Result<(), BackendError> {
        self.channel.load_models()
    }

    fn detect_all(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<Detection>, BackendError> {
        self.channel.detect_all(pixels, width, height)
    }

    fn detect_single(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Option<Detection>, BackendError> {
        self.channel.detect_single(pixels, width, height)
    }
}

impl Drop for HelperBackend {
    fn drop(&mut self) {
        if let Err(err) = self.child.kill() {
            tracing::debug!(program = %self.program, error = %err, "helper already exited");
        }
        let _ = self.child.wait();
        tracing::info!(program = %self.program, "recognition helper stopped");
    }
}
