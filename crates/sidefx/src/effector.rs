//! Effectors and the effector chain.
//!
//! Effectors are the only place where work happens. They receive every
//! effect that reaches the chain, perform whatever they recognize and answer
//! with [`FollowUp`] actions.
//!
//! # Key Properties
//!
//! - **Every effector sees every effect**: there is no routing table; an
//!   effector ignores what it doesn't understand by returning
//!   `FollowUp::None`.
//! - **Registration order**: effectors run one after another. Each
//!   effector's follow-up actions are issued (reduced and committed) before
//!   the next effector starts; the effects those actions produce run on the
//!   [`Cascade`] without holding up the chain. The effect's own `serial`
//!   flag never changes this.
//! - **Built-in decomposition**: after the registered effectors, the chain
//!   runs its own step that re-runs the whole chain for every child of a
//!   `Multiple` (honoring the batch's `serial` flag) and re-dispatches the
//!   actions of a `DispatchAction`.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::{self, BoxFuture, FutureExt};
use tracing::{error, trace};

use crate::cascade::{Cascade, EffectRun};
use crate::core::{Action, CustomEffect, FollowUp, Opaque};
use crate::effect::SideEffect;
use crate::task::{Task, TaskList};

/// A handler that performs the work described by a [`SideEffect`].
///
/// # Example
///
/// ```ignore
/// struct HttpEffector {
///     client: reqwest::Client,
/// }
///
/// #[async_trait]
/// impl Effector<AppAction> for HttpEffector {
///     async fn apply(&self, effect: &SideEffect<AppAction>) -> Result<FollowUp<AppAction>> {
///         let Some(fetch) = effect.as_custom().filter(|e| e.tag() == "fetch") else {
///             return Ok(FollowUp::None);
///         };
///         let url = fetch.get("url").and_then(|v| v.as_str()).unwrap_or_default();
///         let body = self.client.get(url).send().await?.text().await?;
///         Ok(FollowUp::Action(AppAction::Fetched { body }))
///     }
/// }
/// ```
#[async_trait]
pub trait Effector<A, E = Opaque>: Send + Sync + 'static
where
    A: Action,
    E: CustomEffect,
{
    /// Perform `effect` (or ignore it) and return the follow-up actions.
    async fn apply(&self, effect: &SideEffect<A, E>) -> Result<FollowUp<A>>;

    /// Human-readable name for logging.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// An [`Effector`] backed by an async closure.
///
/// Created with [`effector_fn`].
#[derive(Clone)]
pub struct FnEffector<F> {
    f: F,
    name: &'static str,
}

/// Turn an async closure into an [`Effector`].
///
/// The closure receives its own clone of the effect.
///
/// ```ignore
/// let log = effector_fn(|effect: SideEffect<Value>| async move {
///     tracing::info!(tag = effect.tag(), "effect");
///     Ok(FollowUp::None)
/// });
/// ```
pub fn effector_fn<A, E, F, Fut>(f: F) -> FnEffector<F>
where
    A: Action,
    E: CustomEffect,
    F: Fn(SideEffect<A, E>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<FollowUp<A>>> + Send + 'static,
{
    FnEffector {
        f,
        name: std::any::type_name::<F>(),
    }
}

impl<F> FnEffector<F> {
    /// Override the logged name.
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

impl<F> fmt::Debug for FnEffector<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnEffector").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<A, E, F, Fut> Effector<A, E> for FnEffector<F>
where
    A: Action,
    E: CustomEffect,
    F: Fn(SideEffect<A, E>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<FollowUp<A>>> + Send + 'static,
{
    async fn apply(&self, effect: &SideEffect<A, E>) -> Result<FollowUp<A>> {
        (self.f)(effect.clone()).await
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Where the chain sends follow-up actions.
///
/// Issues the actions in order: each one is reduced and committed before
/// this returns, and the effects it produces are pushed onto `cascade`.
pub type DispatchFn<A> = Arc<dyn Fn(FollowUp<A>, &Cascade) -> Result<()> + Send + Sync>;

/// Every registered effector composed into one, plus the built-in
/// decomposition step.
///
/// Cloning is cheap; clones share the effector list and dispatch target.
pub struct EffectorChain<A, E = Opaque> {
    effectors: Arc<[Arc<dyn Effector<A, E>>]>,
    dispatch: DispatchFn<A>,
}

impl<A, E> Clone for EffectorChain<A, E> {
    fn clone(&self) -> Self {
        Self {
            effectors: Arc::clone(&self.effectors),
            dispatch: Arc::clone(&self.dispatch),
        }
    }
}

impl<A: Action, E: CustomEffect> EffectorChain<A, E> {
    /// Compose `effectors` (in registration order) with `dispatch` as the
    /// target for their follow-up actions.
    pub fn new(effectors: Vec<Arc<dyn Effector<A, E>>>, dispatch: DispatchFn<A>) -> Self {
        Self {
            effectors: effectors.into(),
            dispatch,
        }
    }

    /// Number of registered effectors (not counting the built-in step).
    pub fn len(&self) -> usize {
        self.effectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effectors.is_empty()
    }

    /// Run every effector over `effect`.
    ///
    /// Resolves once every effector and every recursive run over `Multiple`
    /// children has settled, or with the first error. Follow-up actions are
    /// issued through `cascade`; the runs they produce are not awaited here.
    pub fn run(&self, effect: SideEffect<A, E>, cascade: &Cascade) -> EffectRun {
        let effect = Arc::new(effect);

        let mut tasks: Vec<Task<FollowUp<A>>> = self
            .effectors
            .iter()
            .map(|effector| {
                let effector = Arc::clone(effector);
                let effect = Arc::clone(&effect);
                Task::new(move || async move {
                    trace!(effector = effector.name(), effect = effect.tag(), "applying effect");
                    effector.apply(&effect).await.inspect_err(|e| {
                        error!(effector = effector.name(), effect = effect.tag(), error = ?e, "effector failed");
                    })
                })
            })
            .collect();

        let chain = self.clone();
        let children = cascade.clone();
        tasks.push(Task::new(move || chain.decompose(effect, children)));

        let dispatch = Arc::clone(&self.dispatch);
        let cascade = cascade.clone();
        let run = TaskList::serial(tasks)
            .and_then(move |follow_up| future::ready((*dispatch)(follow_up, &cascade)))
            .run();

        async move { run.await.map(|_| ()) }.boxed()
    }

    /// Run `effect` on a fresh cascade and settle everything it sets off.
    pub fn settle(&self, effect: SideEffect<A, E>) -> EffectRun {
        Cascade::settle(|cascade| {
            cascade.push(self.run(effect, cascade));
            Ok(())
        })
    }

    /// The built-in trailing effector.
    fn decompose(
        &self,
        effect: Arc<SideEffect<A, E>>,
        cascade: Cascade,
    ) -> BoxFuture<'static, Result<FollowUp<A>>> {
        match &*effect {
            SideEffect::Multiple(batch) => {
                let tasks = batch
                    .iter()
                    .cloned()
                    .map(|child| {
                        let chain = self.clone();
                        let cascade = cascade.clone();
                        Task::new(move || chain.run(child, &cascade))
                    })
                    .collect();
                let children = TaskList::new(tasks, batch.is_serial());
                trace!(
                    children = children.len(),
                    serial = children.is_serial(),
                    "running batch"
                );

                async move {
                    children.run().await?;
                    Ok(FollowUp::None)
                }
                .boxed()
            }
            SideEffect::DispatchAction(actions) => {
                future::ready(Ok(FollowUp::Actions(actions.clone()))).boxed()
            }
            SideEffect::None | SideEffect::Custom(_) => future::ready(Ok(FollowUp::None)).boxed(),
        }
    }
}

impl<A, E> fmt::Debug for EffectorChain<A, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectorChain")
            .field("effector_count", &self.effectors.len())
            .finish_non_exhaustive()
    }
}
