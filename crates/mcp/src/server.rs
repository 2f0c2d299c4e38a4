// MCP server over stdio: one JSON-RPC envelope per line

use crate::error::TransportError;
use crate::handler::{decode_request, McpHandler};
use crate::protocol::{JsonRpcError, JsonRpcResponse};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};

/// Longest accepted input line
const MAX_LINE_LENGTH: usize = 8 * 1024 * 1024;

pub struct McpServer {
    handler: Arc<McpHandler>,
}

impl McpServer {
    pub fn new(handler: Arc<McpHandler>) -> Self {
        Self { handler }
    }

    /// Serve on the process's stdin/stdout until stdin closes
    pub async fn start(&self) -> Result<(), TransportError> {
        tracing::info!("MCP server listening on stdio");
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve requests from `reader`, writing responses to `writer`.
    ///
    /// Requests are handled one at a time in arrival order. Malformed lines
    /// get a parse error response and the loop carries on.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<(), TransportError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
        let mut out = FramedWrite::new(writer, LinesCodec::new());

        while let Some(line) = lines.next().await {
            let line = match line {
                Ok(line) => line,
                Err(LinesCodecError::MaxLineLengthExceeded) => {
                    tracing::warn!("Dropping oversized line");
                    let response = JsonRpcResponse::error(
                        Value::Null,
                        JsonRpcError::parse_error("line too long"),
                    );
                    out.send(serde_json::to_string(&response)?).await?;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if line.trim().is_empty() {
                continue;
            }

            let response = match decode_request(line.as_bytes()) {
                Ok(request) => self.handler.handle(request).await,
                Err(response) => {
                    tracing::warn!("Rejected malformed message");
                    Some(response)
                }
            };

            if let Some(response) = response {
                out.send(serde_json::to_string(&response)?).await?;
            }
        }

        tracing::info!("stdin closed, shutting down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::builtin_handler;
    use std::io::Cursor;

    async fn run(input: &str) -> Vec<Value> {
        let server = McpServer::new(Arc::new(builtin_handler(None).unwrap()));
        let mut output = Vec::new();
        server
            .serve(Cursor::new(input.as_bytes().to_vec()), &mut output)
            .await
            .unwrap();

        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_requests_answered_in_order() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"health_check","arguments":{}}}"#,
            "\n",
        );

        let responses = run(input).await;
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[1]["id"], 2);
        assert_eq!(responses[1]["result"]["content"][0]["text"], "OK");
    }

    #[tokio::test]
    async fn test_malformed_line_keeps_connection_open() {
        let input = concat!(
            "not json\n",
            "\n",
            r#"{"jsonrpc":"2.0","id":"after","method":"ping"}"#,
            "\n",
        );

        let responses = run(input).await;
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["error"]["code"], -32700);
        assert!(responses[0]["id"].is_null());
        assert_eq!(responses[1]["id"], "after");
        assert!(responses[1]["result"].is_object());
    }

    #[tokio::test]
    async fn test_final_line_without_newline() {
        let responses = run(r#"{"jsonrpc":"2.0","id":9,"method":"ping"}"#).await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["id"], 9);
    }

    #[tokio::test]
    async fn test_empty_input() {
        assert!(run("").await.is_empty());
    }
}
