use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::Toxic;
use crate::stage::{Stage, StageEvent};

/// Delays each chunk by `latency ± jitter` milliseconds.
///
/// The delay counts from the chunk's timestamp, so time a chunk already
/// spent queued behind others is not added twice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Latency {
    pub latency: u64,
    pub jitter: u64,
}

impl Latency {
    fn delay(&self) -> Duration {
        let mut delay = self.latency as i64;
        let jitter = self.jitter as i64;
        if jitter > 0 {
            delay += rand::thread_rng().gen_range(-jitter..jitter);
        }
        Duration::from_millis(delay.max(0) as u64)
    }
}

#[async_trait]
impl Toxic for Latency {
    async fn pipe(&self, stage: &mut Stage) {
        loop {
            match stage.next().await {
                StageEvent::Interrupted => return,
                StageEvent::Eof => return stage.close(),
                StageEvent::Chunk(mut chunk) => {
                    let deadline = chunk.timestamp + self.delay();
                    tokio::select! {
                        _ = tokio::time::sleep_until(deadline) => {
                            chunk.timestamp = deadline;
                            if !stage.forward(chunk).await {
                                return;
                            }
                        }
                        _ = stage.interrupted() => {
                            // Exit fast without applying latency, but keep the chunk.
                            stage.forward(chunk).await;
                            return;
                        }
                    }
                }
            }
        }
    }
}
