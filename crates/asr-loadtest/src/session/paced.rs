use async_trait::async_trait;
use tracing::debug;

use asr_protocol::audio::{AudioPayload, ChunkLayout};
use asr_protocol::messages::RecognitionResponse;

use super::{close, connect, read_response, send_binary, send_handshake, Exchange, ExchangeSession, ExchangeSettings, WsStream};
use crate::error::ExchangeError;
use crate::pacer::ChunkPacer;

/// Streams 250 ms chunks no faster than real time and reads one incremental
/// response per chunk. The reported latency is the pacer's tail timer: time
/// from the last chunk's scheduled arrival to the final response.
pub struct PacedExchange {
    settings: ExchangeSettings,
}

impl PacedExchange {
    pub fn new(settings: ExchangeSettings) -> Self {
        Self { settings }
    }

    async fn stream(
        &self,
        ws: &mut WsStream,
        pacer: &mut ChunkPacer,
        payload: &AudioPayload,
        layout: ChunkLayout,
    ) -> Result<(RecognitionResponse, u32), ExchangeError> {
        let timeout = self.settings.io_timeout;
        let total = layout.chunk_count();
        let mut sent = 0u32;

        for chunk in layout.chunks(&payload.bytes) {
            let index = pacer
                .next_permit()
                .await
                .ok_or_else(|| ExchangeError::Transport("pacer ended before the last chunk".into()))?;

            send_binary(ws, chunk, timeout).await?;
            sent += 1;
            let response = read_response(ws, timeout).await?;

            if index < total {
                continue;
            }

            if response.status.is_final() {
                return Ok((response, sent));
            }

            // Service still reports partial after the last chunk: resend it
            // once and take whatever comes back as final.
            debug!(payload = %payload.name, "Final chunk answered as partial, resending");
            send_binary(ws, chunk, timeout).await?;
            sent += 1;
            let response = read_response(ws, timeout).await?;
            return Ok((response, sent));
        }

        Err(ExchangeError::Transport("stream ended before the last chunk".into()))
    }
}

#[async_trait]
impl ExchangeSession for PacedExchange {
    fn name(&self) -> &'static str {
        "paced"
    }

    async fn run(&self, payload: &AudioPayload) -> Result<Exchange, ExchangeError> {
        // Checked before any I/O or pacing
        let layout = ChunkLayout::for_payload(payload, self.settings.config.sample_rate)?;

        let mut pacer = ChunkPacer::start(layout.chunk_count(), self.settings.step);

        let mut ws = match connect(&self.settings).await {
            Ok(ws) => ws,
            Err(e) => {
                pacer.stop();
                return Err(e);
            }
        };

        if let Err(e) = send_handshake(&mut ws, &self.settings).await {
            pacer.stop();
            close(ws, false, self.settings.io_timeout).await;
            return Err(e);
        }

        match self.stream(&mut ws, &mut pacer, payload, layout).await {
            Ok((response, chunks_sent)) => {
                let elapsed = pacer.finish().await;
                close(ws, true, self.settings.io_timeout).await;
                let elapsed = elapsed
                    .ok_or_else(|| ExchangeError::Transport("pacer exited without reporting".into()))?;
                Ok(Exchange {
                    response,
                    elapsed,
                    chunks_sent,
                })
            }
            Err(e) => {
                pacer.stop();
                close(ws, false, self.settings.io_timeout).await;
                Err(e)
            }
        }
    }
}
