use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::Toxic;
use crate::stage::{Stage, StageEvent, ToxicState};

/// Closes the stream after it has been live for `time` milliseconds.
///
/// Only time spent running counts; the clock stops while the stage is
/// interrupted and picks up where it left off.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitTime {
    pub time: u64,
}

#[derive(Debug, Default)]
pub struct LimitTimeState {
    pub elapsed: Duration,
}

#[async_trait]
impl Toxic for LimitTime {
    async fn pipe(&self, stage: &mut Stage) {
        let limit = Duration::from_millis(self.time);
        let elapsed = stage
            .state_mut::<LimitTimeState>()
            .map_or(Duration::ZERO, |state| state.elapsed);
        if elapsed >= limit {
            return stage.close();
        }

        let start = Instant::now();
        let deadline = start + (limit - elapsed);
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return stage.close(),
                event = stage.next() => match event {
                    StageEvent::Interrupted => {
                        if let Some(state) = stage.state_mut::<LimitTimeState>() {
                            state.elapsed += start.elapsed();
                        }
                        return;
                    }
                    StageEvent::Eof => return stage.close(),
                    StageEvent::Chunk(chunk) => {
                        if !stage.forward(chunk).await {
                            return;
                        }
                    }
                },
            }
        }
    }

    fn new_state(&self) -> Option<ToxicState> {
        Some(Box::new(LimitTimeState::default()))
    }
}
