use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::Toxic;
use crate::stage::{Stage, StageEvent};

/// Holds the stream open for `delay` milliseconds after the source closes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SlowClose {
    pub delay: u64,
}

#[async_trait]
impl Toxic for SlowClose {
    async fn pipe(&self, stage: &mut Stage) {
        loop {
            match stage.next().await {
                StageEvent::Interrupted => return,
                StageEvent::Chunk(chunk) => {
                    if !stage.forward(chunk).await {
                        return;
                    }
                }
                StageEvent::Eof => {
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_millis(self.delay)) => {
                            return stage.close();
                        }
                        _ = stage.interrupted() => return,
                    }
                }
            }
        }
    }
}
