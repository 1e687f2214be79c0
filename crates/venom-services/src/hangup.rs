//! Connection-wide hangup signal shared by both links of one proxied
//! connection, and the destination teardown it drives.

use std::sync::Arc;
use std::time::Duration;

use socket2::SockRef;
use tokio::io::AsyncWrite;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::watch;

/// How far a connection has gone towards closing. States only ever move
/// forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HangupState {
    Live,
    /// One direction finished. Stop reading sources and let the chains
    /// deliver what they already hold.
    Draining,
    /// Stop copying and close both ends gracefully (proxy stopped).
    Closed,
    /// Stop copying and tear both ends down abortively.
    Reset,
}

impl HangupState {
    /// Whether link writers should abandon whatever is still queued.
    pub fn is_torn_down(self) -> bool {
        self >= HangupState::Closed
    }
}

#[derive(Debug, Clone)]
pub struct Hangup {
    state: Arc<watch::Sender<HangupState>>,
}

impl Default for Hangup {
    fn default() -> Self {
        Self::new()
    }
}

impl Hangup {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(HangupState::Live);
        Self {
            state: Arc::new(tx),
        }
    }

    pub fn drain(&self) {
        self.escalate(HangupState::Draining);
    }

    pub fn close(&self) {
        self.escalate(HangupState::Closed);
    }

    pub fn reset(&self) {
        self.escalate(HangupState::Reset);
    }

    fn escalate(&self, to: HangupState) {
        self.state.send_if_modified(|state| {
            if *state < to {
                *state = to;
                true
            } else {
                false
            }
        });
    }

    pub fn state(&self) -> HangupState {
        *self.state.borrow()
    }

    /// Resolves once the connection is no longer live.
    pub async fn hung_up(&self) -> HangupState {
        self.wait_for(|state| state != HangupState::Live).await
    }

    /// Resolves once the connection is closed or reset.
    pub async fn torn_down(&self) -> HangupState {
        self.wait_for(HangupState::is_torn_down).await
    }

    async fn wait_for(&self, f: impl Fn(HangupState) -> bool) -> HangupState {
        let mut rx = self.state.subscribe();
        let state = match rx.wait_for(|s| f(*s)).await {
            Ok(state) => *state,
            Err(_) => HangupState::Closed,
        };
        state
    }
}

/// A link destination that can be released without a graceful shutdown.
pub trait Teardown: AsyncWrite + Send + Unpin + 'static {
    /// Drop the destination, discarding unsent data and resetting the peer
    /// where the transport supports it.
    fn abort(self);
}

impl Teardown for OwnedWriteHalf {
    fn abort(self) {
        if let Err(e) = SockRef::from(self.as_ref()).set_linger(Some(Duration::ZERO)) {
            tracing::debug!(error = %e, "failed to set linger before reset");
        }
        // No FIN: the socket closes (with RST) once the read half goes too.
        self.forget();
    }
}

impl<T> Teardown for tokio::io::WriteHalf<T>
where
    T: tokio::io::AsyncRead + AsyncWrite + Send + 'static,
{
    fn abort(self) {}
}
