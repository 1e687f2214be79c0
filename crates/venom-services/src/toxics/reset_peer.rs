use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::Toxic;
use crate::stage::{Stage, StageEvent};

/// Resets the connection `timeout` milliseconds after data first shows up.
///
/// The reset is abortive: both sockets are closed with linger 0, so the
/// peers see a TCP RST instead of a FIN and unsent data is discarded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResetPeer {
    pub timeout: u64,
}

#[async_trait]
impl Toxic for ResetPeer {
    async fn pipe(&self, stage: &mut Stage) {
        let pending = match stage.next().await {
            StageEvent::Interrupted => return,
            StageEvent::Eof => None,
            StageEvent::Chunk(chunk) => Some(chunk),
        };

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(self.timeout)) => {
                tracing::debug!(timeout_ms = self.timeout, "resetting peer");
                stage.reset_peer();
            }
            _ = stage.interrupted() => {
                if let Some(chunk) = pending {
                    stage.forward(chunk).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Chunk;
    use crate::hangup::HangupState;
    use crate::toxics::harness;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn resets_after_the_timeout() {
        let (mut h, stage) = harness::stage(16);
        let task = harness::spawn(ResetPeer { timeout: 100 }, stage);

        let start = Instant::now();
        h.input.send(Chunk::new(&b"payload"[..])).await.unwrap();
        assert_eq!(h.hangup.hung_up().await, HangupState::Reset);
        assert!(start.elapsed() >= Duration::from_millis(100));

        assert!(task.await.unwrap().is_closed());
        assert!(harness::collect(&mut h.output).await.is_empty());
    }

    #[tokio::test]
    async fn idle_stage_is_left_alone() {
        let (h, stage) = harness::stage(16);
        let task = harness::spawn(ResetPeer { timeout: 0 }, stage);

        tokio::task::yield_now().await;
        h.interrupt.send(()).await.unwrap();
        assert!(!task.await.unwrap().is_closed());
        assert_eq!(h.hangup.state(), HangupState::Live);
    }
}
