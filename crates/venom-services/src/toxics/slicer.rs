use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::Toxic;
use crate::stage::{Stage, StageEvent};

/// Slices chunks into smaller pieces to simulate real-world TCP
/// segmentation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Slicer {
    /// Average number of bytes per piece.
    pub average_size: usize,
    /// +/- bytes to vary piece sizes by. Should be below `average_size`.
    pub size_variation: usize,
    /// Microseconds to wait after each piece.
    pub delay: u64,
}

impl Slicer {
    /// Piece boundaries for `start..end`, split roughly in half recursively
    /// so small and large pieces are spread evenly.
    fn pieces(&self, start: usize, end: usize, out: &mut Vec<(usize, usize)>) {
        let size = end - start;
        if size <= self.average_size.saturating_add(self.size_variation) || size < 2 {
            out.push((start, end));
            return;
        }

        let variation = self.size_variation as i64;
        let offset = if variation > 0 {
            rand::thread_rng().gen_range(-variation..variation)
        } else {
            0
        };
        let mid = (start + size / 2) as i64 + offset;
        let mid = mid.clamp(start as i64 + 1, end as i64 - 1) as usize;

        self.pieces(start, mid, out);
        self.pieces(mid, end, out);
    }
}

#[async_trait]
impl Toxic for Slicer {
    async fn pipe(&self, stage: &mut Stage) {
        let delay = Duration::from_micros(self.delay);
        loop {
            let chunk = match stage.next().await {
                StageEvent::Interrupted => return,
                StageEvent::Eof => return stage.close(),
                StageEvent::Chunk(chunk) => chunk,
            };

            let mut pieces = Vec::new();
            self.pieces(0, chunk.len(), &mut pieces);
            for (start, end) in pieces {
                if !stage.forward(chunk.slice(start..end)).await {
                    return;
                }
                if delay.is_zero() {
                    continue;
                }
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = stage.interrupted() => {
                        if end < chunk.len() {
                            stage.forward(chunk.slice(end..chunk.len())).await;
                        }
                        return;
                    }
                }
            }
        }
    }
}
