//! Testing utilities for sidefx stores and effectors.
//!
//! # Quick Start
//!
//! ## Recording what reached the chain
//!
//! ```ignore
//! use sidefx_testing::RecordingEffector;
//!
//! let recorder = RecordingEffector::new();
//! let store = SideEffects::new()
//!     .with_effector(recorder.clone())
//!     .enhance(create_store, reducer, initial);
//!
//! store.dispatch(action).await?;
//! assert_eq!(recorder.tags(), vec!["save"]);
//! ```
//!
//! ## Timed effects
//!
//! ```ignore
//! use sidefx_testing::{wait, DelayEffector};
//!
//! let delays = DelayEffector::new();
//! // reducer returns SideEffect::multiple([wait(300), wait(150)], true)
//! store.dispatch(trigger).await?;
//! assert_eq!(delays.completed(), vec![300, 150]);
//! ```
//!
//! ## Using `EffectLatch` for fan-out tests
//!
//! ```ignore
//! let latch = shared_latch(3);
//! let recorder = RecordingEffector::only("notify").with_latch(latch.clone());
//!
//! tokio::spawn(store.dispatch(trigger));
//! latch.await_all().await;
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use sidefx::{Action, CustomEffect, Effector, FollowUp, Opaque, SideEffect};
use tokio::sync::watch;

/// Tag handled by [`DelayEffector`].
pub const WAIT_TAG: &str = "wait";

/// A `wait` effect for [`DelayEffector`]: `{"type": "wait", "ms": ms}`.
pub fn wait<A>(ms: u64) -> SideEffect<A> {
    SideEffect::custom(Opaque::new(WAIT_TAG).with("ms", ms))
}

// =============================================================================
// Recording
// =============================================================================

/// Records every effect it is handed and answers with nothing.
///
/// Clones share the same recording.
pub struct RecordingEffector<A, E = Opaque> {
    seen: Arc<Mutex<Vec<SideEffect<A, E>>>>,
    only: Option<String>,
    latch: Option<SharedEffectLatch>,
}

impl<A: Action, E: CustomEffect> RecordingEffector<A, E> {
    /// Record every effect.
    pub fn new() -> Self {
        Self {
            seen: Arc::new(Mutex::new(Vec::new())),
            only: None,
            latch: None,
        }
    }

    /// Record only effects tagged `tag`.
    pub fn only(tag: impl Into<String>) -> Self {
        Self {
            only: Some(tag.into()),
            ..Self::new()
        }
    }

    /// Decrement `latch` for every recorded effect.
    pub fn with_latch(mut self, latch: SharedEffectLatch) -> Self {
        self.latch = Some(latch);
        self
    }

    /// Recorded effects, in the order they arrived.
    pub fn effects(&self) -> Vec<SideEffect<A, E>> {
        self.lock().clone()
    }

    /// Tags of the recorded effects, in the order they arrived.
    pub fn tags(&self) -> Vec<String> {
        self.lock().iter().map(|e| e.tag().to_string()).collect()
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    pub fn count_tag(&self, tag: &str) -> usize {
        self.lock().iter().filter(|e| e.has_tag(tag)).count()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<SideEffect<A, E>>> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<A: Action, E: CustomEffect> Default for RecordingEffector<A, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, E> Clone for RecordingEffector<A, E> {
    fn clone(&self) -> Self {
        Self {
            seen: Arc::clone(&self.seen),
            only: self.only.clone(),
            latch: self.latch.clone(),
        }
    }
}

#[async_trait]
impl<A: Action, E: CustomEffect> Effector<A, E> for RecordingEffector<A, E> {
    async fn apply(&self, effect: &SideEffect<A, E>) -> Result<FollowUp<A>> {
        if self.only.as_deref().is_some_and(|tag| !effect.has_tag(tag)) {
            return Ok(FollowUp::None);
        }
        self.lock().push(effect.clone());
        if let Some(latch) = &self.latch {
            latch.arrive();
        }
        Ok(FollowUp::None)
    }

    fn name(&self) -> &'static str {
        "RecordingEffector"
    }
}

// =============================================================================
// Replies and failures
// =============================================================================

/// Answers every effect tagged `tag` with a fixed set of follow-up actions.
#[derive(Debug, Clone)]
pub struct ReplyEffector<A> {
    tag: String,
    reply: Vec<A>,
}

impl<A: Action> ReplyEffector<A> {
    pub fn on(tag: impl Into<String>, reply: impl IntoIterator<Item = A>) -> Self {
        Self {
            tag: tag.into(),
            reply: reply.into_iter().collect(),
        }
    }
}

#[async_trait]
impl<A: Action, E: CustomEffect> Effector<A, E> for ReplyEffector<A> {
    async fn apply(&self, effect: &SideEffect<A, E>) -> Result<FollowUp<A>> {
        if effect.has_tag(&self.tag) {
            Ok(FollowUp::Actions(self.reply.clone()))
        } else {
            Ok(FollowUp::None)
        }
    }

    fn name(&self) -> &'static str {
        "ReplyEffector"
    }
}

/// Fails on every effect tagged `tag`.
///
/// Clones share the call counter.
#[derive(Debug, Clone)]
pub struct FailingEffector {
    tag: String,
    message: String,
    failures: Arc<AtomicUsize>,
}

impl FailingEffector {
    pub fn on(tag: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            message: message.into(),
            failures: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// How many times this effector has failed.
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::Acquire)
    }
}

#[async_trait]
impl<A: Action, E: CustomEffect> Effector<A, E> for FailingEffector {
    async fn apply(&self, effect: &SideEffect<A, E>) -> Result<FollowUp<A>> {
        if !effect.has_tag(&self.tag) {
            return Ok(FollowUp::None);
        }
        self.failures.fetch_add(1, Ordering::AcqRel);
        Err(anyhow!("{}", self.message))
    }

    fn name(&self) -> &'static str {
        "FailingEffector"
    }
}

// =============================================================================
// Delays
// =============================================================================

type ReplyFn<A> = Arc<dyn Fn(u64) -> Option<A> + Send + Sync>;

/// Performs `wait` effects: sleeps `ms` milliseconds, then records `ms`.
///
/// [`completed`](Self::completed) gives the finishing order, which is how
/// serial and parallel batches are told apart. Clones share the recording.
pub struct DelayEffector<A> {
    completed: Arc<Mutex<Vec<u64>>>,
    reply: Option<ReplyFn<A>>,
}

impl<A: Action> DelayEffector<A> {
    pub fn new() -> Self {
        Self {
            completed: Arc::new(Mutex::new(Vec::new())),
            reply: None,
        }
    }

    /// Answer each finished wait with the action `f` returns.
    pub fn with_reply<F>(mut self, f: F) -> Self
    where
        F: Fn(u64) -> Option<A> + Send + Sync + 'static,
    {
        self.reply = Some(Arc::new(f));
        self
    }

    /// Finished waits, in completion order.
    pub fn completed(&self) -> Vec<u64> {
        self.completed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<A: Action> Default for DelayEffector<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> Clone for DelayEffector<A> {
    fn clone(&self) -> Self {
        Self {
            completed: Arc::clone(&self.completed),
            reply: self.reply.clone(),
        }
    }
}

#[async_trait]
impl<A: Action> Effector<A> for DelayEffector<A> {
    async fn apply(&self, effect: &SideEffect<A>) -> Result<FollowUp<A>> {
        let Some(ms) = effect
            .as_custom()
            .filter(|e| e.tag() == WAIT_TAG)
            .and_then(|e| e.get("ms"))
            .and_then(Value::as_u64)
        else {
            return Ok(FollowUp::None);
        };

        tokio::time::sleep(Duration::from_millis(ms)).await;
        self.completed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ms);

        Ok(self.reply.as_ref().and_then(|f| f(ms)).into())
    }

    fn name(&self) -> &'static str {
        "DelayEffector"
    }
}

// =============================================================================
// Effect Latch
// =============================================================================

/// Counts effect arrivals down to zero so a test can wait for an exact
/// number of effects (or listener calls) instead of sleeping.
///
/// The count lives in a [`watch`] channel: arrivals update it, waiters
/// resolve as soon as they observe zero, however late they start waiting.
///
/// ```ignore
/// assert!(latch.await_all_within(Duration::from_secs(5)).await, "effects missing");
/// ```
#[derive(Debug)]
pub struct EffectLatch {
    remaining: watch::Sender<usize>,
}

impl EffectLatch {
    /// Create a latch expecting `expected` arrivals.
    pub fn new(expected: usize) -> Self {
        Self {
            remaining: watch::Sender::new(expected),
        }
    }

    /// Record one arrival.
    ///
    /// # Panics
    ///
    /// Panics on more arrivals than expected: the test under-counted.
    pub fn arrive(&self) {
        self.remaining.send_modify(|remaining| {
            *remaining = match remaining.checked_sub(1) {
                Some(left) => left,
                None => panic!("EffectLatch: more arrivals than expected"),
            };
        });
    }

    /// Wait until every expected arrival happened.
    pub async fn await_all(&self) {
        let mut remaining = self.remaining.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = remaining.wait_for(|n| *n == 0).await;
    }

    /// Like [`await_all`](Self::await_all) with a deadline. Returns `false`
    /// if arrivals are still missing when it passes.
    pub async fn await_all_within(&self, limit: Duration) -> bool {
        tokio::time::timeout(limit, self.await_all()).await.is_ok()
    }

    pub fn remaining(&self) -> usize {
        *self.remaining.borrow()
    }

    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }
}

/// Arc-wrapped [`EffectLatch`] for sharing with effectors.
pub type SharedEffectLatch = Arc<EffectLatch>;

/// Convenience for `Arc::new(EffectLatch::new(expected))`.
pub fn shared_latch(expected: usize) -> SharedEffectLatch {
    Arc::new(EffectLatch::new(expected))
}
