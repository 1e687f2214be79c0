use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::Toxic;
use crate::stage::{Stage, StageEvent};

/// Swallows all data and closes the stream after `timeout` milliseconds.
/// With a timeout of 0 the stream is held open, silent, until the toxic is
/// removed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeout {
    pub timeout: u64,
}

#[async_trait]
impl Toxic for Timeout {
    async fn pipe(&self, stage: &mut Stage) {
        let timer = async {
            if self.timeout > 0 {
                tokio::time::sleep(Duration::from_millis(self.timeout)).await;
            } else {
                std::future::pending::<()>().await;
            }
        };
        tokio::pin!(timer);

        loop {
            tokio::select! {
                _ = &mut timer => return stage.close(),
                event = stage.next() => match event {
                    StageEvent::Interrupted => return,
                    // Dropped on the floor.
                    StageEvent::Chunk(_) => {}
                    // Keep the far end hanging until the timer fires.
                    StageEvent::Eof => {
                        tokio::select! {
                            _ = &mut timer => return stage.close(),
                            _ = stage.interrupted() => return,
                        }
                    }
                },
            }
        }
    }

    /// Removing a timeout must not leave the connection half-dead.
    fn cleanup(&self, stage: &mut Stage) {
        stage.close();
    }
}
