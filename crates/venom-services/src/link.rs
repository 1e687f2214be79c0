//! Chain: one direction of one proxied connection, as a series of stages.
//!
//! ```text
//!                 head          toxic 1        toxic 2
//! ChunkWriter ─► [ Noop ] ─q─► [ Latency ] ─q─► [ Slicer ] ─q─► ChunkReader
//! ```
//!
//! Each queue feeding a stage is sized by that stage's toxic kind. The head
//! never changes; it gives the first real toxic a neighbour to interrupt
//! when it is removed.
//!
//! Every mutation first takes a stage back from its task (interrupt, then
//! await the task), rewires queues while nothing runs, and restarts what it
//! took. A stage that closed in the meantime is never restarted.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use venom_core::Direction;

use crate::chunk::Chunk;
use crate::hangup::Hangup;
use crate::stage::Stage;
use crate::stream;
use crate::toxics::ToxicSpec;

enum Runner {
    Running(JoinHandle<Stage>),
    /// The toxic closed the stage. Kept so its queues stay owned until the
    /// chain goes away.
    Stopped(Stage),
    /// The toxic task panicked.
    Gone,
}

struct Slot {
    spec: ToxicSpec,
    interrupt: mpsc::Sender<()>,
    runner: Runner,
}

impl Slot {
    fn spawn(spec: ToxicSpec, interrupt: mpsc::Sender<()>, stage: Stage) -> Self {
        let handle = tokio::spawn(stage.run(spec.clone()));
        Self {
            spec,
            interrupt,
            runner: Runner::Running(handle),
        }
    }

    /// Take the stage back from its task. `None` if the stage is closed;
    /// a closed stage is never handed out again.
    async fn interrupt(&mut self) -> Option<Stage> {
        let handle = match std::mem::replace(&mut self.runner, Runner::Gone) {
            Runner::Running(handle) => handle,
            Runner::Stopped(stage) => {
                self.runner = Runner::Stopped(stage);
                return None;
            }
            Runner::Gone => return None,
        };

        // A token left over from an earlier interrupt is just as good.
        let _ = self.interrupt.try_send(());
        match handle.await {
            Ok(stage) if stage.is_closed() => {
                self.runner = Runner::Stopped(stage);
                None
            }
            Ok(stage) => Some(stage),
            Err(e) => {
                tracing::warn!(toxic = %self.spec.name, error = %e, "toxic task failed");
                None
            }
        }
    }

    fn resume(&mut self, stage: Stage) {
        let handle = tokio::spawn(stage.run(self.spec.clone()));
        self.runner = Runner::Running(handle);
    }
}

pub(crate) struct Chain {
    name: String,
    direction: Direction,
    hangup: Hangup,
    slots: Vec<Slot>,
}

impl Chain {
    /// Wire and start a stage per spec. Returns the chain, the sender feeding
    /// its head, and the receiver its last stage writes to.
    pub(crate) fn start(
        name: impl Into<String>,
        direction: Direction,
        specs: &[ToxicSpec],
        hangup: Hangup,
    ) -> (Self, mpsc::Sender<Chunk>, mpsc::Receiver<Chunk>) {
        let (input, mut rx) = stream::queue(specs.first().map_or(0, |spec| spec.buffer_size));
        let mut slots = Vec::with_capacity(specs.len());

        for (i, spec) in specs.iter().enumerate() {
            let capacity = specs.get(i + 1).map_or(0, |next| next.buffer_size);
            let (tx, next_rx) = stream::queue(capacity);
            let (interrupt_tx, interrupt_rx) = mpsc::channel(1);

            let mut stage = Stage::new(rx, tx, interrupt_rx, hangup.clone());
            stage.set_state(spec.toxic.new_state());
            slots.push(Slot::spawn(spec.clone(), interrupt_tx, stage));
            rx = next_rx;
        }

        let chain = Self {
            name: name.into(),
            direction,
            hangup,
            slots,
        };
        (chain, input, rx)
    }

    pub(crate) fn direction(&self) -> Direction {
        self.direction
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// Append `spec` after the current last stage.
    pub(crate) async fn add_toxic(&mut self, spec: &ToxicSpec) {
        let (tx, rx) = stream::queue(spec.buffer_size);
        let (interrupt_tx, interrupt_rx) = mpsc::channel(1);
        let mut stage = Stage::detached(rx, interrupt_rx, self.hangup.clone());

        let Some(last) = self.slots.last_mut() else {
            return;
        };
        match last.interrupt().await {
            Some(mut prev) => {
                stage.output = prev.output.replace(tx);
                stage.set_state(spec.toxic.new_state());
                last.resume(prev);
                self.slots
                    .push(Slot::spawn(spec.clone(), interrupt_tx, stage));
            }
            None => {
                // The chain is already closing; keep it aligned, but dead.
                drop(tx);
                stage.close();
                self.slots.push(Slot {
                    spec: spec.clone(),
                    interrupt: interrupt_tx,
                    runner: Runner::Stopped(stage),
                });
            }
        }
        tracing::debug!(
            link = %self.name,
            direction = %self.direction,
            toxic = %spec.name,
            "toxic added to link"
        );
    }

    /// Restart the stage at `spec.index` with new parameters. Its state is
    /// kept.
    pub(crate) async fn update_toxic(&mut self, spec: &ToxicSpec) {
        let Some(slot) = self.slots.get_mut(spec.index) else {
            return;
        };
        let stage = slot.interrupt().await;
        slot.spec = spec.clone();
        if let Some(stage) = stage {
            slot.resume(stage);
        }
    }

    /// Splice the stage at `index` out of the chain without losing any chunk
    /// already queued for it.
    pub(crate) async fn remove_toxic(&mut self, index: usize) {
        if index == 0 || index >= self.slots.len() {
            return;
        }

        let Some(mut stage) = self.slots[index].interrupt().await else {
            self.drop_slot(index);
            return;
        };
        self.slots[index].spec.toxic.cleanup(&mut stage);
        if stage.is_closed() {
            self.drop_slot(index);
            return;
        }

        // The previous stage may be blocked sending into our input. Keep
        // draining until it has seen its interrupt.
        let prev = {
            let prev_slot = &mut self.slots[index - 1];
            let interrupt_prev = prev_slot.interrupt();
            tokio::pin!(interrupt_prev);
            let mut prev_closed = false;

            loop {
                tokio::select! {
                    prev = &mut interrupt_prev, if !prev_closed => match prev {
                        Some(prev) => break Some(prev),
                        // Keep draining until the closed stage's last chunk.
                        None => prev_closed = true,
                    },
                    chunk = stage.input.recv() => match chunk {
                        Some(chunk) => {
                            stage.forward(chunk).await;
                        }
                        None => break None,
                    },
                }
            }
        };

        let Some(mut prev) = prev else {
            // Input ended mid-splice: the chain is finishing.
            stage.close();
            self.drop_slot(index);
            return;
        };

        while let Ok(chunk) = stage.input.try_recv() {
            stage.forward(chunk).await;
        }
        prev.output = stage.output.take();
        drop(stage);

        self.drop_slot(index);
        self.slots[index - 1].resume(prev);
    }

    fn drop_slot(&mut self, index: usize) {
        let slot = self.slots.remove(index);
        tracing::debug!(
            link = %self.name,
            direction = %self.direction,
            toxic = %slot.spec.name,
            "toxic removed from link"
        );
        for (i, slot) in self.slots.iter_mut().enumerate().skip(index) {
            slot.spec.index = i;
        }
    }
}
