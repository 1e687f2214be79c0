use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::Toxic;
use crate::stage::{Stage, StageEvent, ToxicState};

/// Delays the first chunk of a connection by `delay` milliseconds, standing
/// in for a slow handshake that `latency` does not cover.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SlowOpen {
    pub delay: u64,
}

/// Set once the first chunk went through.
#[derive(Debug, Default)]
pub struct SlowOpenState {
    pub warm: bool,
}

#[async_trait]
impl Toxic for SlowOpen {
    async fn pipe(&self, stage: &mut Stage) {
        loop {
            let mut chunk = match stage.next().await {
                StageEvent::Interrupted => return,
                StageEvent::Eof => return stage.close(),
                StageEvent::Chunk(chunk) => chunk,
            };

            let warm = match stage.state_mut::<SlowOpenState>() {
                Some(state) => std::mem::replace(&mut state.warm, true),
                None => true,
            };
            if warm {
                if !stage.forward(chunk).await {
                    return;
                }
                continue;
            }

            let delay = Duration::from_millis(self.delay);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    chunk.timestamp += delay;
                    if !stage.forward(chunk).await {
                        return;
                    }
                }
                _ = stage.interrupted() => {
                    stage.forward(chunk).await;
                    return;
                }
            }
        }
    }

    fn new_state(&self) -> Option<ToxicState> {
        Some(Box::new(SlowOpenState::default()))
    }
}
