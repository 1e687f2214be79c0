use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::Toxic;
use crate::stage::{Stage, StageEvent};

const SLICE_INTERVAL: Duration = Duration::from_millis(100);

/// Passes data through at `rate` KB/s.
///
/// Chunks holding more than 100ms worth of data are sent in 100ms slices.
/// Sleep time owed or overslept carries over from chunk to chunk within a
/// run. A rate of 0 or less leaves the stream unthrottled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Bandwidth {
    pub rate: i64,
}

#[async_trait]
impl Toxic for Bandwidth {
    async fn pipe(&self, stage: &mut Stage) {
        // Nanoseconds still to sleep; negative after oversleeping.
        let mut debt: i64 = 0;
        loop {
            let mut chunk = match stage.next().await {
                StageEvent::Interrupted => return,
                StageEvent::Eof => return stage.close(),
                StageEvent::Chunk(chunk) => chunk,
            };

            if self.rate <= 0 {
                if !stage.forward(chunk).await {
                    return;
                }
                continue;
            }

            // rate KB/s == rate bytes/ms
            let rate = self.rate as u64;
            debt += (chunk.len() as u64 * 1_000_000 / rate) as i64;

            let slice = usize::try_from(rate.saturating_mul(100)).unwrap_or(usize::MAX);
            while chunk.len() > slice {
                tokio::select! {
                    _ = tokio::time::sleep(SLICE_INTERVAL) => {
                        let piece = chunk.slice(0..slice);
                        chunk = chunk.slice(slice..chunk.len());
                        if !stage.forward(piece).await {
                            return;
                        }
                        debt -= SLICE_INTERVAL.as_nanos() as i64;
                    }
                    _ = stage.interrupted() => {
                        stage.forward(chunk).await;
                        return;
                    }
                }
            }

            let start = Instant::now();
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_nanos(debt.max(0) as u64)) => {
                    // Timers are coarse; offset the next sleep by the error.
                    debt -= start.elapsed().as_nanos() as i64;
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Chunk;
    use crate::toxics::harness;

    #[tokio::test(start_paused = true)]
    async fn paces_at_the_configured_rate() {
        let (mut h, stage) = harness::stage(1024);
        // 10 KB/s, 5 KB → 500ms
        let _task = harness::spawn(Bandwidth { rate: 10 }, stage);

        let start = Instant::now();
        h.input.send(Chunk::new(vec![7u8; 5000])).await.unwrap();
        drop(h.input);

        let data = harness::collect(&mut h.output).await;
        assert_eq!(data.len(), 5000);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(490), "{elapsed:?}");
        assert!(elapsed <= Duration::from_millis(520), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn large_chunks_are_sliced() {
        let (mut h, stage) = harness::stage(1024);
        let _task = harness::spawn(Bandwidth { rate: 1 }, stage);

        h.input.send(Chunk::new(vec![1u8; 350])).await.unwrap();
        drop(h.input);

        let mut sizes = Vec::new();
        while let Some(chunk) = h.output.recv().await {
            sizes.push(chunk.len());
        }
        assert_eq!(sizes, vec![100, 100, 100, 50]);
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_keeps_the_rest_of_the_chunk() {
        let (mut h, stage) = harness::stage(1024);
        let task = harness::spawn(Bandwidth { rate: 1 }, stage);

        h.input.send(Chunk::new(vec![2u8; 1000])).await.unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        h.interrupt.send(()).await.unwrap();
        let stage = task.await.unwrap();
        assert!(!stage.is_closed());

        drop(stage);
        let data = harness::collect(&mut h.output).await;
        assert_eq!(data.len(), 1000);
    }

    #[tokio::test]
    async fn huge_rate_passes_chunks_whole() {
        let (mut h, stage) = harness::stage(16);
        let task = harness::spawn(Bandwidth { rate: i64::MAX }, stage);

        h.input.send(Chunk::new(vec![3u8; 4096])).await.unwrap();
        drop(h.input);
        assert_eq!(h.output.recv().await.unwrap().len(), 4096);
        assert!(task.await.unwrap().is_closed());
    }

    #[tokio::test]
    async fn zero_rate_is_unthrottled() {
        let (mut h, stage) = harness::stage(16);
        let _task = harness::spawn(Bandwidth { rate: 0 }, stage);

        h.input.send(Chunk::new(&b"fast"[..])).await.unwrap();
        drop(h.input);
        assert_eq!(harness::collect(&mut h.output).await, b"fast");
    }
}
