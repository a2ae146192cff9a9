use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use asr_protocol::audio::{unpaced_block_size, AudioPayload, LayoutError};
use asr_protocol::messages::RecognitionResponse;
use asr_protocol::{EOF_SENTINEL, RESULT_ACK};

use super::{close, connect, read_frame, read_response, send_binary, send_handshake, send_text, Exchange, ExchangeSession, ExchangeSettings, WsStream};
use crate::error::ExchangeError;

/// Sends the whole payload as fast as the service acknowledges it, then
/// `eof`, reads one consolidated result and acknowledges it with `OK`.
/// Latency covers the full call, connect included.
pub struct UnpacedExchange {
    settings: ExchangeSettings,
}

impl UnpacedExchange {
    pub fn new(settings: ExchangeSettings) -> Self {
        Self { settings }
    }

    async fn stream(
        &self,
        ws: &mut WsStream,
        payload: &AudioPayload,
        block: usize,
        start: Instant,
    ) -> Result<(RecognitionResponse, Duration, u32), ExchangeError> {
        let timeout = self.settings.io_timeout;
        let mut sent = 0u32;

        for chunk in payload.bytes.chunks(block) {
            send_binary(ws, chunk, timeout).await?;
            sent += 1;
            // Interim reply, content unused
            read_frame(ws, timeout).await?;
        }

        send_text(ws, EOF_SENTINEL, timeout).await?;
        let response = read_response(ws, timeout).await?;
        let elapsed = start.elapsed();
        send_text(ws, RESULT_ACK, timeout).await?;

        Ok((response, elapsed, sent))
    }
}

#[async_trait]
impl ExchangeSession for UnpacedExchange {
    fn name(&self) -> &'static str {
        "unpaced"
    }

    async fn run(&self, payload: &AudioPayload) -> Result<Exchange, ExchangeError> {
        let sample_rate = self.settings.config.sample_rate;
        let block = unpaced_block_size(sample_rate);
        if block == 0 {
            return Err(LayoutError::ZeroChunk(sample_rate).into());
        }

        let start = Instant::now();
        let mut ws = connect(&self.settings).await?;

        if let Err(e) = send_handshake(&mut ws, &self.settings).await {
            close(ws, false, self.settings.io_timeout).await;
            return Err(e);
        }

        match self.stream(&mut ws, payload, block, start).await {
            Ok((response, elapsed, chunks_sent)) => {
                close(ws, true, self.settings.io_timeout).await;
                Ok(Exchange {
                    response,
                    elapsed,
                    chunks_sent,
                })
            }
            Err(e) => {
                close(ws, false, self.settings.io_timeout).await;
                Err(e)
            }
        }
    }
}
