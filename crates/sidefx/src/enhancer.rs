//! The store enhancer: wires effect capture, dispatch and the effector chain.
//!
//! ```text
//! dispatch(action)
//!     │
//!     ▼
//! base store ── wrapped reducer ── commits state, queues effect
//!     │
//!     ▼ take_all()
//! EffectQueue ──► aggregate effect ──► EffectorChain::run
//!     ▲                                        │
//!     └──────────── follow-up actions ◄────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use sidefx::{create_store, install_side_effects};
//!
//! let store = install_side_effects([Arc::new(TimerEffector) as Arc<dyn Effector<Value>>])
//!     .named("todos")
//!     .enhance(create_store, root_reducer, json!({}));
//!
//! // The reducer has already run here; awaiting drives the effects.
//! store.dispatch(json!({"type": "ADD_TODO", "text": "hello"})).await?;
//! ```
//!
//! # Guarantees
//!
//! - The reducer runs (and its state is committed) synchronously inside
//!   `dispatch`, before the returned future is first polled.
//! - Every captured effect is delivered to the chain exactly once, even when
//!   dispatches interleave.
//! - The returned future resolves only after every follow-up dispatch it
//!   caused has resolved. Follow-up runs are scheduled flat on the
//!   dispatch's [`Cascade`], so arbitrarily long feedback loops do not grow
//!   the stack.

use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use anyhow::Result;
use smallvec::SmallVec;
use tracing::debug;

use crate::cascade::{Cascade, EffectRun};
use crate::core::{Action, CustomEffect, FollowUp, Opaque};
use crate::effect::SideEffect;
use crate::effector::{DispatchFn, Effector, EffectorChain};
use crate::error::SideFxError;
use crate::reducer::{BaseReducer, Reducer};
use crate::store::{BasicStore, Listener, Store, SubscriptionId};

const DEFAULT_NAME: &str = "store";

// =============================================================================
// Effect Queue
// =============================================================================

/// Effects captured by the wrapped reducer, waiting for the next drain.
pub struct EffectQueue<A, E = Opaque> {
    effects: Mutex<SmallVec<[SideEffect<A, E>; 4]>>,
}

impl<A, E> EffectQueue<A, E> {
    pub fn new() -> Self {
        Self {
            effects: Mutex::new(SmallVec::new()),
        }
    }

    pub fn push(&self, effect: SideEffect<A, E>) {
        self.lock().push(effect);
    }

    /// Remove and return every queued effect, in capture order.
    pub fn take_all(&self) -> Vec<SideEffect<A, E>> {
        mem::take(&mut *self.lock()).into_vec()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SmallVec<[SideEffect<A, E>; 4]>> {
        self.effects.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<A, E> Default for EffectQueue<A, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, E> fmt::Debug for EffectQueue<A, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectQueue")
            .field("len", &self.len())
            .finish()
    }
}

/// Turn an effect-returning reducer into a plain one that queues its effects.
fn wrap<S, A, E>(reducer: Reducer<S, A, E>, queue: Arc<EffectQueue<A, E>>) -> BaseReducer<S, A>
where
    S: 'static,
    A: Action,
    E: CustomEffect,
{
    Arc::new(move |state: &S, action: &A| {
        let (state, effect) = reducer(state, action).into_parts();
        if let Some(effect) = effect {
            queue.push(effect);
        }
        state
    })
}

// =============================================================================
// Builder
// =============================================================================

/// The side-effect enhancer.
///
/// Collects effectors (run in registration order) and then wraps a store
/// factory with [`enhance`](Self::enhance).
///
/// ```ignore
/// let store = SideEffects::new()
///     .with_effector(HttpEffector::new(client))
///     .with_effector(effector_fn(|effect: SideEffect<Value>| async move {
///         tracing::info!(effect = effect.tag(), "saw effect");
///         Ok(FollowUp::None)
///     }))
///     .named("app")
///     .enhance(create_store, reducer, initial);
/// ```
pub struct SideEffects<A, E = Opaque> {
    effectors: Vec<Arc<dyn Effector<A, E>>>,
    name: Cow<'static, str>,
}

/// Create the enhancer from a list of effectors.
pub fn install_side_effects<A, E, I>(effectors: I) -> SideEffects<A, E>
where
    A: Action,
    E: CustomEffect,
    I: IntoIterator<Item = Arc<dyn Effector<A, E>>>,
{
    SideEffects {
        effectors: effectors.into_iter().collect(),
        name: Cow::Borrowed(DEFAULT_NAME),
    }
}

impl<A: Action, E: CustomEffect> SideEffects<A, E> {
    /// An enhancer with no effectors. Only the built-in `Multiple` and
    /// `DispatchAction` handling applies.
    pub fn new() -> Self {
        install_side_effects(Vec::new())
    }

    /// Register an effector after the ones already registered.
    pub fn with_effector<T>(self, effector: T) -> Self
    where
        T: Effector<A, E>,
    {
        self.with_shared_effector(Arc::new(effector))
    }

    /// Register an effector that is shared with other stores.
    pub fn with_shared_effector(mut self, effector: Arc<dyn Effector<A, E>>) -> Self {
        self.effectors.push(effector);
        self
    }

    /// Label for tracing output.
    pub fn named(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    pub fn effector_count(&self) -> usize {
        self.effectors.len()
    }

    /// Build the base store through `create` and wrap it.
    ///
    /// `create` receives the wrapped reducer (which queues effects instead
    /// of returning them) and the initial state.
    pub fn enhance<S, St, C>(
        self,
        create: C,
        reducer: Reducer<S, A, E>,
        initial: S,
    ) -> EffectStore<S, A, E, St>
    where
        S: Send + 'static,
        St: Store<S, A>,
        C: FnOnce(BaseReducer<S, A>, S) -> St,
    {
        let queue = Arc::new(EffectQueue::new());
        let base = create(wrap(reducer, Arc::clone(&queue)), initial);
        let name = self.name;
        let effectors = self.effectors;

        let inner = Arc::new_cyclic(|weak: &Weak<Inner<S, A, E, St>>| {
            let weak = weak.clone();
            let dispatch: DispatchFn<A> = Arc::new(
                move |follow_up: FollowUp<A>, cascade: &Cascade| match weak.upgrade() {
                    Some(inner) => inner.issue_follow_up(follow_up, cascade),
                    None if follow_up.is_empty() => Ok(()),
                    None => Err(SideFxError::StoreDropped.into()),
                },
            );

            Inner {
                name,
                base,
                queue,
                chain: EffectorChain::new(effectors, dispatch),
                _state: PhantomData,
            }
        });

        debug!(store = %inner.name, effectors = inner.chain.len(), "side effects installed");
        EffectStore { inner }
    }
}

impl<A: Action, E: CustomEffect> Default for SideEffects<A, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, E> fmt::Debug for SideEffects<A, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SideEffects")
            .field("name", &self.name)
            .field("effector_count", &self.effectors.len())
            .finish()
    }
}

// =============================================================================
// Enhanced Store
// =============================================================================

/// A store with side effects installed.
///
/// Cloning is cheap; every clone drives the same store. Dropping the last
/// clone tears the store down, and any cascade still in flight fails with
/// [`SideFxError::StoreDropped`] when it next tries to dispatch.
pub struct EffectStore<S, A, E = Opaque, St = BasicStore<S, A>> {
    inner: Arc<Inner<S, A, E, St>>,
}

struct Inner<S, A, E, St> {
    name: Cow<'static, str>,
    base: St,
    queue: Arc<EffectQueue<A, E>>,
    chain: EffectorChain<A, E>,
    _state: PhantomData<fn(S) -> S>,
}

impl<S, A, E, St> Clone for EffectStore<S, A, E, St> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, A, E, St> EffectStore<S, A, E, St>
where
    S: Send + 'static,
    A: Action,
    E: CustomEffect,
    St: Store<S, A>,
{
    /// Dispatch an action.
    ///
    /// The reducer runs and its state is committed before this returns. The
    /// returned future runs the captured effects and resolves once they and
    /// every follow-up dispatch they caused have settled. A failing effect
    /// does not cancel the rest of the cascade; the future reports the first
    /// error once everything has settled. A base store error is returned
    /// through the future, and effects the failed dispatch captured are
    /// discarded.
    ///
    /// The queue is shared by the whole store. When dispatches from several
    /// threads (or from a listener inside the base store's `dispatch`)
    /// interleave, one dispatch may drain an effect another one captured; the
    /// effect still runs exactly once, but on the draining dispatch's
    /// cascade, so the other future can resolve before it.
    pub fn dispatch(&self, action: A) -> EffectRun {
        let inner = &self.inner;
        Cascade::settle(|cascade| inner.issue(action, cascade))
    }

    /// Dispatch the actions an effector answered with.
    ///
    /// The actions are issued in order, each reduced before the next, and
    /// the future resolves once everything they set off has settled. The
    /// first action the base store rejects stops the rest from being issued.
    pub fn dispatch_follow_up(&self, follow_up: FollowUp<A>) -> EffectRun {
        let inner = &self.inner;
        Cascade::settle(|cascade| inner.issue_follow_up(follow_up, cascade))
    }

    /// Swap the reducer. Effects returned by the new reducer are captured
    /// like before.
    pub fn replace_reducer(&self, reducer: Reducer<S, A, E>) {
        debug!(store = %self.inner.name, "replacing reducer");
        self.inner
            .base
            .replace_reducer(wrap(reducer, Arc::clone(&self.inner.queue)));
    }

    pub fn state(&self) -> S {
        self.inner.base.state()
    }

    pub fn subscribe(&self, listener: Listener) -> SubscriptionId {
        self.inner.base.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.base.unsubscribe(id)
    }

    /// The underlying store.
    pub fn base_store(&self) -> &St {
        &self.inner.base
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Effects captured but not yet handed to the chain.
    pub fn pending_effects(&self) -> usize {
        self.inner.queue.len()
    }
}

impl<S, A, E, St> Inner<S, A, E, St>
where
    S: Send + 'static,
    A: Action,
    E: CustomEffect,
    St: Store<S, A>,
{
    /// Reduce `action` and schedule the effects it captured on `cascade`.
    fn issue(&self, action: A, cascade: &Cascade) -> Result<()> {
        debug!(store = %self.name, action = action.action_type(), "dispatching action");

        if let Err(e) = self.base.dispatch(action) {
            let discarded = self.queue.take_all();
            if !discarded.is_empty() {
                debug!(
                    store = %self.name,
                    effects = discarded.len(),
                    "discarding effects of a failed dispatch"
                );
            }
            return Err(e);
        }

        let effects = self.queue.take_all();
        if effects.is_empty() {
            return Ok(());
        }

        debug!(store = %self.name, effects = effects.len(), "running captured effects");
        cascade.push(self.chain.run(SideEffect::multiple(effects, false), cascade));
        Ok(())
    }

    fn issue_follow_up(&self, follow_up: FollowUp<A>, cascade: &Cascade) -> Result<()> {
        for action in follow_up.into_actions() {
            self.issue(action, cascade)?;
        }
        Ok(())
    }
}

impl<S, A: Action, E: CustomEffect, St> fmt::Debug for EffectStore<S, A, E, St> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectStore")
            .field("name", &self.inner.name)
            .field("effector_count", &self.inner.chain.len())
            .field("pending_effects", &self.inner.queue.len())
            .finish_non_exhaustive()
    }
}
