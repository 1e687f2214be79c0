use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;

use super::Toxic;
use crate::chunk::Chunk;
use crate::stage::Stage;
use crate::stream::ChunkReader;

const READ_SIZE: usize = 32 * 1024;
/// Recursion depth of the mask construction.
const MASK_ROUNDS: u32 = 10;
const MASK_TOLERANCE: f64 = 0.001;

/// Flips every bit of the stream with the given probability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Corrupt {
    pub probability: f64,
}

/// Random mask whose bits are each set with probability `p`.
///
/// A uniform random byte has every bit set with probability 1/2. OR-ing two
/// masks of probabilities a and 1/2 gives (1+a)/2, AND-ing gives a/2, so `p`
/// is reached by recursing on the binary expansion of `p` for `rounds` steps.
fn mask(len: usize, p: f64, rounds: u32) -> Vec<u8> {
    if p <= 0.0 {
        return vec![0; len];
    }
    if p >= 1.0 {
        return vec![0xff; len];
    }
    let mut x = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut x);
    if rounds == 0 {
        return x;
    }
    if p > 0.5 + MASK_TOLERANCE {
        let y = mask(len, 2.0 * p - 1.0, rounds - 1);
        x.iter_mut().zip(y).for_each(|(a, b)| *a |= b);
    } else if p < 0.5 - MASK_TOLERANCE {
        let y = mask(len, 2.0 * p, rounds - 1);
        x.iter_mut().zip(y).for_each(|(a, b)| *a &= b);
    }
    x
}

impl Corrupt {
    fn corrupt(&self, data: &mut [u8]) {
        let mask = mask(data.len(), self.probability, MASK_ROUNDS);
        data.iter_mut().zip(mask).for_each(|(byte, m)| *byte ^= m);
    }
}

#[async_trait]
impl Toxic for Corrupt {
    async fn pipe(&self, stage: &mut Stage) {
        let mut buf = vec![0u8; READ_SIZE];
        let Some(output) = stage.output.clone() else {
            return stage.close();
        };
        let mut reader = ChunkReader::with_interrupt(&mut stage.input, &mut stage.interrupt);

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => return,
                Err(e) => {
                    tracing::debug!(error = %e, "corrupt read failed");
                    break;
                }
            };
            self.corrupt(&mut buf[..n]);
            if output
                .send(Chunk::new(Bytes::copy_from_slice(&buf[..n])))
                .await
                .is_err()
            {
                break;
            }
        }
        drop(reader);
        stage.close();
    }
}
