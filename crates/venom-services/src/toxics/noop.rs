use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::Toxic;
use crate::stage::{Stage, StageEvent};

/// Passes all data through without any toxic effects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Noop {}

#[async_trait]
impl Toxic for Noop {
    async fn pipe(&self, stage: &mut Stage) {
        loop {
            match stage.next().await {
                StageEvent::Interrupted => return,
                StageEvent::Eof => return stage.close(),
                StageEvent::Chunk(chunk) => {
                    if !stage.forward(chunk).await {
                        return;
                    }
                }
            }
        }
    }
}
