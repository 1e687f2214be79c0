use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::Toxic;
use crate::stage::{Stage, StageEvent, ToxicState};

/// Closes the stream once `bytes` bytes have passed, truncating the chunk
/// that crosses the limit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitData {
    pub bytes: u64,
}

/// Bytes already let through by this attachment.
#[derive(Debug, Default)]
pub struct LimitDataState {
    pub transmitted: u64,
}

#[async_trait]
impl Toxic for LimitData {
    async fn pipe(&self, stage: &mut Stage) {
        let mut transmitted = stage
            .state_mut::<LimitDataState>()
            .map_or(0, |state| state.transmitted);

        loop {
            let mut chunk = match stage.next().await {
                StageEvent::Interrupted => return,
                StageEvent::Eof => return stage.close(),
                StageEvent::Chunk(chunk) => chunk,
            };

            let remaining = self.bytes.saturating_sub(transmitted) as usize;
            if chunk.len() > remaining {
                chunk = chunk.slice(0..remaining);
            }

            if !chunk.is_empty() {
                transmitted += chunk.len() as u64;
                if let Some(state) = stage.state_mut::<LimitDataState>() {
                    state.transmitted = transmitted;
                }
                if !stage.forward(chunk).await {
                    return;
                }
            }

            if transmitted >= self.bytes {
                return stage.close();
            }
        }
    }

    fn new_state(&self) -> Option<ToxicState> {
        Some(Box::new(LimitDataState::default()))
    }
}
