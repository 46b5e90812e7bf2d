//! Flat scheduling of follow-up effect runs.
//!
//! A dispatch cascade is everything one `dispatch` call sets in motion: the
//! effects of the action itself, the actions effectors answer with, the
//! effects of those actions, and so on until a cycle produces nothing.
//!
//! Follow-up actions are issued immediately (their reducers run and their
//! state is committed before the issuing effector's task returns), but the
//! effect runs they produce are not awaited by whoever issued them. They
//! are pushed onto the [`Cascade`] and polled side by side by the future
//! returned from [`Cascade::settle`]. A cascade of any length therefore
//! polls at constant stack depth.
//!
//! ```text
//! settle(start)
//!     │ start(&cascade): reduce, push run ──┐
//!     ▼                                     ▼
//! FuturesUnordered ◄── push ── run ── effector ── issue follow-up
//!     │
//!     ▼ quiet
//! first error (if any), after every run settled
//! ```

use std::fmt;
use std::task::Poll;

use anyhow::Result;
use futures::channel::mpsc;
use futures::future::{self, BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, trace};

/// An in-flight effect run.
pub type EffectRun = BoxFuture<'static, Result<()>>;

/// Handle for pushing effect runs onto the cascade they belong to.
///
/// Cloning is cheap; every clone feeds the same cascade.
#[derive(Clone)]
pub struct Cascade {
    runs: mpsc::UnboundedSender<EffectRun>,
}

impl Cascade {
    /// Call `start` with a fresh cascade and settle everything it pushes,
    /// directly or through the runs it pushes.
    ///
    /// `start` runs before this returns. The returned future resolves once
    /// no run is left. A failure never cancels the other runs: the future
    /// keeps polling until the cascade is quiet, then reports the first
    /// error observed (an error from `start` itself comes first).
    pub fn settle<F>(start: F) -> EffectRun
    where
        F: FnOnce(&Cascade) -> Result<()>,
    {
        let (runs, mut incoming) = mpsc::unbounded();
        let mut first_error = start(&Cascade { runs }).err();
        let mut running = FuturesUnordered::new();

        future::poll_fn(move |cx| loop {
            while let Poll::Ready(Some(run)) = incoming.poll_next_unpin(cx) {
                running.push(run);
            }

            match running.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(()))) => {}
                Poll::Ready(Some(Err(e))) => match first_error {
                    None => first_error = Some(e),
                    Some(_) => debug!(error = ?e, "further failure in cascade"),
                },
                Poll::Ready(None) => {
                    return Poll::Ready(first_error.take().map_or(Ok(()), Err));
                }
                Poll::Pending => return Poll::Pending,
            }
        })
        .boxed()
    }

    /// Schedule `run` on this cascade.
    ///
    /// Runs pushed after the settling future was dropped are dropped too.
    pub fn push(&self, run: EffectRun) {
        if self.runs.unbounded_send(run).is_err() {
            trace!("cascade already dropped, discarding effect run");
        }
    }
}

impl fmt::Debug for Cascade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cascade")
            .field("closed", &self.runs.is_closed())
            .finish()
    }
}
