//! Stage: the runtime slot one toxic attachment executes in.
//!
//! A stage owns its input queue, the sender of its output queue, the
//! receiving end of its interrupt channel and the toxic's per-connection
//! state. While a toxic runs, the stage is owned by that toxic's task; the
//! link gets it back by interrupting the task and awaiting its exit.

use std::any::Any;

use tokio::sync::mpsc;

use crate::chunk::Chunk;
use crate::hangup::Hangup;
use crate::toxics::{Noop, Toxic, ToxicSpec};

/// Opaque per-attachment state, created by `Toxic::new_state`.
pub type ToxicState = Box<dyn Any + Send>;

/// What a toxic sees when it waits on its stage.
#[derive(Debug)]
pub enum StageEvent {
    Chunk(Chunk),
    /// The link wants the stage back. Return without closing anything.
    Interrupted,
    /// The input queue was closed and drained.
    Eof,
}

/// The output of a closed stage is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageClosed;

#[derive(Debug)]
pub struct Stage {
    pub(crate) input: mpsc::Receiver<Chunk>,
    pub(crate) output: Option<mpsc::Sender<Chunk>>,
    pub(crate) interrupt: mpsc::Receiver<()>,
    state: Option<ToxicState>,
    hangup: Hangup,
    closed: bool,
}

impl Stage {
    pub fn new(
        input: mpsc::Receiver<Chunk>,
        output: mpsc::Sender<Chunk>,
        interrupt: mpsc::Receiver<()>,
        hangup: Hangup,
    ) -> Self {
        Self {
            input,
            output: Some(output),
            interrupt,
            state: None,
            hangup,
            closed: false,
        }
    }

    /// A stage with no output yet. The chain wires one in before running it.
    pub(crate) fn detached(
        input: mpsc::Receiver<Chunk>,
        interrupt: mpsc::Receiver<()>,
        hangup: Hangup,
    ) -> Self {
        Self {
            input,
            output: None,
            interrupt,
            state: None,
            hangup,
            closed: false,
        }
    }

    /// Wait for the next chunk, end of input, or an interrupt. Interrupts
    /// take priority over queued chunks.
    pub async fn next(&mut self) -> StageEvent {
        tokio::select! {
            biased;
            _ = self.interrupt.recv() => StageEvent::Interrupted,
            chunk = self.input.recv() => match chunk {
                Some(chunk) => StageEvent::Chunk(chunk),
                None => StageEvent::Eof,
            },
        }
    }

    /// Resolves when the link interrupts this stage, or drops it. Toxics race
    /// this against their timers.
    pub async fn interrupted(&mut self) {
        let _ = self.interrupt.recv().await;
    }

    pub async fn send(&mut self, chunk: Chunk) -> Result<(), StageClosed> {
        match &self.output {
            Some(output) => output.send(chunk).await.map_err(|_| StageClosed),
            None => Err(StageClosed),
        }
    }

    /// Send downstream; if downstream is gone, close the stage. Returns
    /// whether the toxic may keep going.
    pub async fn forward(&mut self, chunk: Chunk) -> bool {
        if self.send(chunk).await.is_err() {
            self.close();
            return false;
        }
        true
    }

    /// Close the output. Downstream sees end of input once it drains what
    /// was already sent; upstream can no longer send to this stage.
    /// Idempotent.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.output = None;
            self.input.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Close this stage and ask the connection to tear both ends down
    /// abortively.
    pub fn reset_peer(&mut self) {
        self.hangup.reset();
        self.close();
    }

    pub fn set_state(&mut self, state: Option<ToxicState>) {
        self.state = state;
    }

    pub fn state_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.state.as_mut()?.downcast_mut::<T>()
    }

    /// Run one toxic period on this stage and hand the stage back when the
    /// toxic returns (interrupted or closed).
    ///
    /// Toxicity is rolled once per run, not per chunk: a run either applies
    /// the toxic for its whole duration or passes data through untouched.
    pub async fn run(mut self, spec: ToxicSpec) -> Stage {
        if rand::random::<f32>() < spec.toxicity {
            spec.toxic.pipe(&mut self).await;
        } else {
            Noop::default().pipe(&mut self).await;
        }
        self
    }
}
