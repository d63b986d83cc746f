//! One-shot completion signals between the transmit and receive sides.
//!
//! Raising consumes the [`Completion`], so a signal can fire at most once.
//! The listener can poll it from a blocking thread or await it from async
//! code. A value rides along with the signal, which is how the frozen sent
//! log reaches the receiver.

use tokio::sync::oneshot;

/// Raising half of a completion signal.
#[derive(Debug)]
pub struct Completion<T> {
    sender: oneshot::Sender<T>,
}

/// Observing half of a completion signal.
#[derive(Debug)]
pub struct CompletionListener<T> {
    receiver: oneshot::Receiver<T>,
    state: ListenState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListenState {
    Waiting,
    Taken,
    Abandoned,
}

/// Creates a linked raiser/listener pair.
///
/// # Examples
///
/// ```
/// use uartperf::signal::completion;
///
/// let (done, mut listener) = completion::<u32>();
/// assert!(listener.try_take().is_none());
///
/// done.raise(7);
/// assert_eq!(listener.try_take(), Some(7));
/// assert!(listener.is_raised());
/// ```
pub fn completion<T>() -> (Completion<T>, CompletionListener<T>) {
    let (sender, receiver) = oneshot::channel();
    (
        Completion { sender },
        CompletionListener {
            receiver,
            state: ListenState::Waiting,
        },
    )
}

impl<T> Completion<T> {
    /// Raises the signal. Returns `false` if nobody is listening anymore.
    pub fn raise(self, value: T) -> bool {
        self.sender.send(value).is_ok()
    }
}

impl<T> CompletionListener<T> {
    /// Takes the value if the signal has been raised since the last call.
    ///
    /// Never blocks. Returns the value at most once.
    pub fn try_take(&mut self) -> Option<T> {
        if self.state != ListenState::Waiting {
            return None;
        }
        match self.receiver.try_recv() {
            Ok(value) => {
                self.state = ListenState::Taken;
                Some(value)
            }
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                self.state = ListenState::Abandoned;
                None
            }
        }
    }

    /// True once the value has been taken through [`try_take`](Self::try_take).
    pub fn is_raised(&self) -> bool {
        self.state == ListenState::Taken
    }

    /// True if the raising side was dropped without raising.
    pub fn is_abandoned(&self) -> bool {
        self.state == ListenState::Abandoned
    }

    /// Waits for the signal. Resolves to `None` if the raiser was dropped.
    pub async fn wait(self) -> Option<T> {
        self.receiver.await.ok()
    }
}
