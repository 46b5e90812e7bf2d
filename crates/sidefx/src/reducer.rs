//! Reducers that may return side effects.
//!
//! A reducer computes the next state from the current state and an action.
//! With sidefx it may also describe work to perform afterwards by returning
//! [`ReducerResult::WithEffect`]. Reducers stay pure: they never run the
//! effect, they only describe it.

use std::sync::Arc;

use crate::core::Opaque;
use crate::effect::SideEffect;

/// The result of a reducer: either a bare state or a state plus an effect.
#[derive(Debug, Clone, PartialEq)]
pub enum ReducerResult<S, A, E = Opaque> {
    /// New state, no effect.
    State(S),
    /// New state and an effect to run once it is committed.
    WithEffect(S, SideEffect<A, E>),
}

impl<S, A, E> ReducerResult<S, A, E> {
    /// Borrow the new state.
    pub fn state(&self) -> &S {
        match self {
            ReducerResult::State(state) | ReducerResult::WithEffect(state, _) => state,
        }
    }

    /// Borrow the effect, if any.
    pub fn effect(&self) -> Option<&SideEffect<A, E>> {
        match self {
            ReducerResult::State(_) => None,
            ReducerResult::WithEffect(_, effect) => Some(effect),
        }
    }

    pub fn has_effect(&self) -> bool {
        matches!(self, ReducerResult::WithEffect(..))
    }

    pub fn into_parts(self) -> (S, Option<SideEffect<A, E>>) {
        match self {
            ReducerResult::State(state) => (state, None),
            ReducerResult::WithEffect(state, effect) => (state, Some(effect)),
        }
    }

    /// Keep the state, pushing the effect (if any) onto `effects`.
    pub fn strip_into(self, effects: &mut impl Extend<SideEffect<A, E>>) -> S {
        let (state, effect) = self.into_parts();
        effects.extend(effect);
        state
    }
}

/// A reducer that may return side effects.
pub type Reducer<S, A, E = Opaque> = Arc<dyn Fn(&S, &A) -> ReducerResult<S, A, E> + Send + Sync>;

/// A plain reducer, as the underlying store sees it.
pub type BaseReducer<S, A> = Arc<dyn Fn(&S, &A) -> S + Send + Sync>;

/// Box a closure as a [`Reducer`].
pub fn reducer<S, A, E, F>(f: F) -> Reducer<S, A, E>
where
    F: Fn(&S, &A) -> ReducerResult<S, A, E> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Lift a reducer that never returns effects.
pub fn plain_reducer<S, A, E, F>(f: F) -> Reducer<S, A, E>
where
    S: 'static,
    A: 'static,
    E: 'static,
    F: Fn(&S, &A) -> S + Send + Sync + 'static,
{
    Arc::new(move |state: &S, action: &A| ReducerResult::State(f(state, action)))
}
