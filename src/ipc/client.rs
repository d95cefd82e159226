//! Typed IPC client
//!
//! The caller side of the daemon socket, used by client programs and the
//! integration suite: one JSON request per line, one JSON response back.

use std::path::Path;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{
    unix::{OwnedReadHalf, OwnedWriteHalf},
    UnixStream,
};

use crate::ipc::protocol::{Request, Response};
use crate::{DevtoolsError, Result};

pub struct IpcClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl IpcClient {
    /// Connect to the daemon socket
    pub async fn connect(path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(path).await.map_err(|e| {
            DevtoolsError::transport(format!("connect {}: {e}", path.display()))
        })?;
        let (read_half, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer,
        })
    }

    /// Send one request and read its response
    pub async fn request(&mut self, request: &Request) -> Result<Response> {
        let mut line = serde_json::to_string(request)
            .map_err(|e| DevtoolsError::transport(format!("encode request: {e}")))?;
        line.push('\n');
        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| DevtoolsError::transport(format!("write request: {e}")))?;

        let mut buf = String::new();
        let n = self
            .reader
            .read_line(&mut buf)
            .await
            .map_err(|e| DevtoolsError::transport(format!("read response: {e}")))?;
        if n == 0 {
            return Err(DevtoolsError::transport("daemon closed the connection"));
        }
        serde_json::from_str(&buf)
            .map_err(|e| DevtoolsError::transport(format!("decode response: {e}")))
    }

    /// Send a raw line and read one response line back. Exists so tests
    /// can exercise the server's malformed-input handling.
    pub async fn request_raw(&mut self, line: &str) -> Result<Response> {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .await
            .map_err(|e| DevtoolsError::transport(format!("write request: {e}")))?;

        let mut buf = String::new();
        let n = self
            .reader
            .read_line(&mut buf)
            .await
            .map_err(|e| DevtoolsError::transport(format!("read response: {e}")))?;
        if n == 0 {
            return Err(DevtoolsError::transport("daemon closed the connection"));
        }
        serde_json::from_str(&buf)
            .map_err(|e| DevtoolsError::transport(format!("decode response: {e}")))
    }
}
