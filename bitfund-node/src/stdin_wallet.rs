//! Line-oriented wallet bridge for the CLI.
//!
//! The unsigned call is written as one JSON line; the operator signs it in
//! their wallet and answers with the resulting transaction id. An empty line
//! (or end of input) cancels.
#![forbid(unsafe_code)]

use async_trait::async_trait;
use bitfund_core::wallet::{WalletBridge, WalletCallRequest, WalletError, WalletOutcome};
use bitfund_core::TxId;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

pub struct LineWallet<R, W> {
    io: Mutex<(R, W)>,
}

impl<R, W> LineWallet<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            io: Mutex::new((reader, writer)),
        }
    }
}

impl LineWallet<BufReader<tokio::io::Stdin>, tokio::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

#[async_trait]
impl<R, W> WalletBridge for LineWallet<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn request_approval(
        &self,
        request: WalletCallRequest,
    ) -> Result<WalletOutcome, WalletError> {
        let mut line = serde_json::to_string(&serde_json::json!({
            "wallet_request": request,
            "reply": "approved tx id, or empty line to cancel",
        }))
        .map_err(|e| WalletError::Unavailable(format!("encode request: {e}")))?;
        line.push('\n');

        let mut io = self.io.lock().await;
        let (reader, writer) = &mut *io;
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| WalletError::Unavailable(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| WalletError::Unavailable(e.to_string()))?;

        let mut answer = String::new();
        reader
            .read_line(&mut answer)
            .await
            .map_err(|e| WalletError::Unavailable(e.to_string()))?;
        let answer = answer.trim();
        if answer.is_empty() {
            return Ok(WalletOutcome::Canceled);
        }
        TxId::parse(answer)
            .map(WalletOutcome::Approved)
            .ok_or_else(|| WalletError::InvalidTxId(answer.to_string()))
    }
}
