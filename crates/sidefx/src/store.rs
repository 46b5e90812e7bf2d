//! The state container surface and a minimal reference store.
//!
//! sidefx enhances any container that implements [`Store`]. [`BasicStore`]
//! is a small synchronous implementation: dispatch runs the reducer under a
//! lock, commits the result and then notifies listeners with no lock held.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use uuid::Uuid;

use crate::core::Action;
use crate::reducer::BaseReducer;

/// Identifies a listener registered with [`Store::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Called after every committed state transition.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// A unidirectional state container.
///
/// `dispatch` must run the reducer and commit its result before returning.
pub trait Store<S, A>: Send + Sync + 'static {
    /// Reduce `action` into the current state and commit the result.
    fn dispatch(&self, action: A) -> Result<()>;

    /// Snapshot of the current state.
    fn state(&self) -> S;

    /// Swap the reducer used for subsequent dispatches.
    fn replace_reducer(&self, reducer: BaseReducer<S, A>);

    /// Register a listener for committed transitions.
    fn subscribe(&self, listener: Listener) -> SubscriptionId;

    /// Remove a listener. Returns `false` if it was not registered.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

/// Reference [`Store`] implementation.
pub struct BasicStore<S, A> {
    state: Mutex<S>,
    reducer: Mutex<BaseReducer<S, A>>,
    listeners: Mutex<Vec<(SubscriptionId, Listener)>>,
}

/// Create a [`BasicStore`]. This is the factory [`SideEffects::enhance`](crate::SideEffects::enhance)
/// expects.
pub fn create_store<S, A>(reducer: BaseReducer<S, A>, initial: S) -> BasicStore<S, A> {
    BasicStore {
        state: Mutex::new(initial),
        reducer: Mutex::new(reducer),
        listeners: Mutex::new(Vec::new()),
    }
}

impl<S, A> BasicStore<S, A> {
    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn notify(&self) {
        // Snapshot so listeners can subscribe or dispatch re-entrantly.
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            listener();
        }
    }
}

impl<S, A> Store<S, A> for BasicStore<S, A>
where
    S: Clone + Send + 'static,
    A: Action,
{
    fn dispatch(&self, action: A) -> Result<()> {
        let reducer = Arc::clone(&*self.reducer.lock().unwrap_or_else(PoisonError::into_inner));
        {
            // A panicking reducer leaves the previous state in place.
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let next = reducer(&*state, &action);
            *state = next;
        }
        self.notify();
        Ok(())
    }

    fn state(&self) -> S {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace_reducer(&self, reducer: BaseReducer<S, A>) {
        *self.reducer.lock().unwrap_or_else(PoisonError::into_inner) = reducer;
    }

    fn subscribe(&self, listener: Listener) -> SubscriptionId {
        let id = SubscriptionId::new();
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }
}

impl<S: fmt::Debug, A> fmt::Debug for BasicStore<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicStore")
            .field("state", &self.state)
            .field("listener_count", &self.listener_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> BasicStore<i64, &'static str> {
        create_store(
            Arc::new(|state: &i64, action: &&'static str| match *action {
                "inc" => state + 1,
                "dec" => state - 1,
                _ => *state,
            }),
            0,
        )
    }

    #[test]
    fn test_dispatch_commits_state() {
        let store = counter();
        store.dispatch("inc").unwrap();
        store.dispatch("inc").unwrap();
        store.dispatch("dec").unwrap();
        assert_eq!(store.state(), 1);
    }

    #[test]
    fn test_listeners_see_committed_state() {
        let store = Arc::new(counter());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let id = store.subscribe({
            let store = Arc::clone(&store);
            let seen = Arc::clone(&seen);
            Arc::new(move || seen.lock().unwrap().push(store.state()))
        });

        store.dispatch("inc").unwrap();
        store.dispatch("inc").unwrap();
        assert!(store.unsubscribe(id));
        store.dispatch("inc").unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
        assert!(!store.unsubscribe(id));
    }

    #[test]
    fn test_listener_can_dispatch() {
        let store = Arc::new(counter());
        let calls = Arc::new(AtomicUsize::new(0));

        store.subscribe({
            let store = Arc::clone(&store);
            let calls = Arc::clone(&calls);
            Arc::new(move || {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    store.dispatch("inc").unwrap();
                }
            })
        });

        store.dispatch("inc").unwrap();

        assert_eq!(store.state(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_replace_reducer() {
        let store = counter();
        store.dispatch("inc").unwrap();
        store.replace_reducer(Arc::new(|state: &i64, _: &&'static str| state * 10));
        store.dispatch("inc").unwrap();
        assert_eq!(store.state(), 10);
    }

    #[test]
    fn test_panicking_reducer_keeps_state() {
        let store = counter();
        store.dispatch("inc").unwrap();
        store.replace_reducer(Arc::new(|_: &i64, _: &&'static str| -> i64 { panic!("reducer bug") }));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            store.dispatch("inc")
        }));

        assert!(result.is_err());
        assert_eq!(store.state(), 1);
    }
}
