use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::mcp::{
    errors::{MCPError, MCPResult, TransportError},
    protocol::{MCPMessage, MessageParser},
};

/// Abstract transport trait for MCP communication
#[async_trait]
pub trait MCPTransport: Send + Sync {
    /// Send a message through the transport
    async fn send(&mut self, message: MCPMessage) -> MCPResult<()>;

    /// Next inbound message. Fails with `TransportError::Closed` once the
    /// peer has hung up. Safe to use as a `select!` branch.
    async fn receive(&mut self) -> MCPResult<MCPMessage>;

    /// Flush pending output and stop the background tasks
    async fn close(&mut self) -> MCPResult<()>;

    fn is_connected(&self) -> bool;
}

/// Newline-delimited JSON over any reader/writer pair.
///
/// A reader task parses inbound lines and a writer task serializes outbound
/// messages, each connected to the transport through a channel. Unparseable
/// lines are logged and skipped.
pub struct LineTransport {
    sender: Option<mpsc::UnboundedSender<MCPMessage>>,
    receiver: mpsc::UnboundedReceiver<MCPMessage>,
    writer_task: Option<JoinHandle<()>>,
    reader_task: JoinHandle<()>,
    is_connected: Arc<AtomicBool>,
}

impl LineTransport {
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (msg_sender, msg_receiver) = mpsc::unbounded_channel();
        let (response_sender, mut response_receiver) = mpsc::unbounded_channel::<MCPMessage>();
        let is_connected = Arc::new(AtomicBool::new(true));

        let writer_connected = is_connected.clone();
        let writer_task = tokio::spawn(async move {
            let mut writer = writer;
            while let Some(message) = response_receiver.recv().await {
                let mut line = match MessageParser::serialize_message(&message) {
                    Ok(data) => data,
                    Err(e) => {
                        error!("Failed to serialize message: {}", e);
                        continue;
                    }
                };
                line.push(b'\n');

                if let Err(e) = write_line(&mut writer, &line).await {
                    error!("Failed to write message: {}", e);
                    writer_connected.store(false, Ordering::SeqCst);
                    break;
                }
            }
        });

        let reader_connected = is_connected.clone();
        let reader_task = tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }

                        match MessageParser::parse_message(line.as_bytes()) {
                            Ok(message) => {
                                if msg_sender.send(message).is_err() {
                                    debug!("Receiver dropped, stopping reader");
                                    break;
                                }
                            }
                            Err(e) => warn!("Skipping unparseable message: {}", e),
                        }
                    }
                    Ok(None) => {
                        debug!("Input closed");
                        break;
                    }
                    Err(e) => {
                        error!("Failed to read input: {}", e);
                        break;
                    }
                }
            }

            reader_connected.store(false, Ordering::SeqCst);
        });

        Self {
            sender: Some(response_sender),
            receiver: msg_receiver,
            writer_task: Some(writer_task),
            reader_task,
            is_connected,
        }
    }

    /// Transport over the process's stdin and stdout
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &[u8]) -> std::io::Result<()> {
    writer.write_all(line).await?;
    writer.flush().await
}

#[async_trait]
impl MCPTransport for LineTransport {
    async fn send(&mut self, message: MCPMessage) -> MCPResult<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or(MCPError::Transport(TransportError::Closed))?;

        sender.send(message).map_err(|_| {
            MCPError::Transport(TransportError::ConnectionLost(
                "Output channel closed".to_string(),
            ))
        })
    }

    async fn receive(&mut self) -> MCPResult<MCPMessage> {
        self.receiver
            .recv()
            .await
            .ok_or(MCPError::Transport(TransportError::Closed))
    }

    async fn close(&mut self) -> MCPResult<()> {
        // Dropping the sender lets the writer drain and exit
        self.sender.take();
        if let Some(task) = self.writer_task.take() {
            if let Err(e) = task.await {
                warn!("Writer task ended abnormally: {}", e);
            }
        }
        self.reader_task.abort();
        self.is_connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.is_connected.load(Ordering::SeqCst)
    }
}
