//! Effect-aware reducer composition.
//!
//! [`combine_reducers`] splits a JSON-object state into slices, hands each
//! slice to its own reducer and gathers every effect the slice reducers
//! return into one (non-serial) `Multiple`. Maps nest: a map inside a map
//! reduces a nested object, and a list inside a map is itself combined with
//! [`combine_reducers`].
//!
//! ```ignore
//! let root = combine_reducers(vec![reducer_map! {
//!     "todos" => todos_reducer,
//!     "timer" => reducer_map! {
//!         "elapsed" => elapsed_reducer,
//!     },
//! }
//! .into()]);
//! ```

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::core::{Action, CustomEffect, Opaque};
use crate::effect::SideEffect;
use crate::reducer::{Reducer, ReducerResult};

/// A node in a reducer mapping.
pub enum ReducerTree<A, E = Opaque> {
    /// Reduces one slice directly.
    Reducer(Reducer<Value, A, E>),
    /// Reduces a nested object, key by key.
    Map(ReducerMap<A, E>),
    /// Several trees folded over the same slice, left to right.
    List(Vec<ReducerTree<A, E>>),
}

impl<A, E> From<Reducer<Value, A, E>> for ReducerTree<A, E> {
    fn from(reducer: Reducer<Value, A, E>) -> Self {
        ReducerTree::Reducer(reducer)
    }
}

impl<A, E> From<ReducerMap<A, E>> for ReducerTree<A, E> {
    fn from(map: ReducerMap<A, E>) -> Self {
        ReducerTree::Map(map)
    }
}

impl<A, E> From<Vec<ReducerTree<A, E>>> for ReducerTree<A, E> {
    fn from(list: Vec<ReducerTree<A, E>>) -> Self {
        ReducerTree::List(list)
    }
}

impl<A, E> fmt::Debug for ReducerTree<A, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReducerTree::Reducer(_) => f.write_str("Reducer"),
            ReducerTree::Map(map) => map.fmt(f),
            ReducerTree::List(list) => f.debug_list().entries(list).finish(),
        }
    }
}

/// Ordered key → [`ReducerTree`] mapping.
///
/// Slices are reduced in insertion order. Re-inserting an existing key
/// replaces its tree but keeps the original position.
pub struct ReducerMap<A, E = Opaque> {
    entries: Vec<(String, ReducerTree<A, E>)>,
}

impl<A, E> ReducerMap<A, E> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Insert or replace the tree for `key`.
    pub fn insert(&mut self, key: impl Into<String>, tree: impl Into<ReducerTree<A, E>>) {
        let key = key.into();
        let tree = tree.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = tree,
            None => self.entries.push((key, tree)),
        }
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, tree: impl Into<ReducerTree<A, E>>) -> Self {
        self.insert(key, tree);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in reduction order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

impl<A, E> Default for ReducerMap<A, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, E> fmt::Debug for ReducerMap<A, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(k, v)| (k, v)))
            .finish()
    }
}

/// Combine reducer trees into one reducer over a JSON-object state.
///
/// Each tree is applied in turn to the state the previous one produced and
/// every effect is collected into `SideEffect::multiple(effects, false)`.
/// A single tree is returned as its own reducer, unwrapped.
pub fn combine_reducers<A, E>(trees: Vec<ReducerTree<A, E>>) -> Reducer<Value, A, E>
where
    A: Action,
    E: CustomEffect,
{
    let mut reducers: Vec<Reducer<Value, A, E>> = trees.into_iter().map(into_reducer).collect();

    if reducers.len() == 1 {
        if let Some(reducer) = reducers.pop() {
            return reducer;
        }
    }

    Arc::new(move |state: &Value, action: &A| {
        let mut effects = Vec::new();
        let mut state = state.clone();
        for reducer in &reducers {
            state = reducer(&state, action).strip_into(&mut effects);
        }
        ReducerResult::WithEffect(state, SideEffect::multiple(effects, false))
    })
}

fn into_reducer<A, E>(tree: ReducerTree<A, E>) -> Reducer<Value, A, E>
where
    A: Action,
    E: CustomEffect,
{
    match tree {
        ReducerTree::Reducer(reducer) => reducer,
        ReducerTree::Map(map) => combine_map(map),
        ReducerTree::List(list) => combine_reducers(list),
    }
}

fn combine_map<A, E>(map: ReducerMap<A, E>) -> Reducer<Value, A, E>
where
    A: Action,
    E: CustomEffect,
{
    let slices: Vec<(String, Reducer<Value, A, E>)> = map
        .entries
        .into_iter()
        .map(|(key, tree)| (key, into_reducer(tree)))
        .collect();

    Arc::new(move |state: &Value, action: &A| {
        // Keys without a reducer are carried over untouched.
        let mut next = match state {
            Value::Object(object) => object.clone(),
            _ => Map::new(),
        };
        let mut effects = Vec::new();

        for (key, reducer) in &slices {
            let slice = state.get(key).unwrap_or(&Value::Null);
            let value = reducer(slice, action).strip_into(&mut effects);
            next.insert(key.clone(), value);
        }

        ReducerResult::WithEffect(Value::Object(next), SideEffect::multiple(effects, false))
    })
}
