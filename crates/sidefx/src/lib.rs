//! # sidefx
//!
//! A side-effect algebra for reducer-driven stores.
//!
//! ## Core Concepts
//!
//! sidefx separates **state transitions** from **work**:
//! - Reducers are pure. Besides the new state they may return a
//!   [`SideEffect`]: a description of work to perform.
//! - [`Effector`]s perform that work and answer with [`FollowUp`] actions,
//!   which are dispatched again.
//!
//! ## Architecture
//!
//! ```text
//! dispatch(action)
//!     │
//!     ▼
//! Reducer ─► (state, effect) ─► state committed, effect queued
//!                                     │
//!                                     ▼ take_all()
//!                               EffectorChain
//!                                     │
//!     ├─► Effector A.apply() ─► FollowUp ──► dispatch ─┐
//!     │                                                │
//!     ├─► Effector B.apply() ─► FollowUp ──► dispatch ─┤
//!     │                                                │
//!     └─► built-in: Multiple ─► chain per child        │
//!                   DispatchAction ─► its actions ─────┤
//!                                                      ▼
//!                                               (loop until quiet)
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Reducers never perform work** - they only describe it
//! 2. **State first** - an effect runs only after the state transition that
//!    produced it is committed
//! 3. **Registration order** - effectors run one after another; follow-up
//!    actions are reduced before the next effector starts, their effects run
//!    alongside on the dispatch's cascade
//! 4. **Exactly once** - every captured effect reaches the chain once
//! 5. **No rollback** - a failing effect never undoes committed state
//!
//! ## Example
//!
//! ```ignore
//! use sidefx::{
//!     combine_reducers, create_store, effector_fn, install_side_effects, reducer, reducer_map,
//!     Effector, FollowUp, Opaque, ReducerResult, SideEffect,
//! };
//! use serde_json::{json, Value};
//! use std::sync::Arc;
//!
//! // 1. Reducers return state, optionally with an effect
//! let todos = reducer(|state: &Value, action: &Value| match action["type"].as_str() {
//!     Some("ADD_TODO") => {
//!         let mut todos = state.as_array().cloned().unwrap_or_default();
//!         todos.push(action["text"].clone());
//!         ReducerResult::WithEffect(Value::Array(todos), SideEffect::custom(Opaque::new("save")))
//!     }
//!     _ => ReducerResult::State(state.clone()),
//! });
//! let root = combine_reducers(vec![reducer_map! { "todos" => todos }.into()]);
//!
//! // 2. Effectors perform the work and answer with follow-up actions
//! let save = effector_fn(|effect: SideEffect<Value>| async move {
//!     if effect.has_tag("save") {
//!         return Ok(FollowUp::Action(json!({"type": "SAVED"})));
//!     }
//!     Ok(FollowUp::None)
//! });
//!
//! // 3. Enhance a store
//! let store = install_side_effects([Arc::new(save) as Arc<dyn Effector<Value>>])
//!     .enhance(create_store, root, json!({}));
//!
//! // 4. Dispatch; awaiting drives every effect and follow-up to completion
//! store.dispatch(json!({"type": "ADD_TODO", "text": "hello"})).await?;
//! ```
//!
//! ## What This Is Not
//!
//! sidefx does **not** persist effects, retry them, schedule or throttle
//! them, or make the state commit and the effect atomic.

// Core modules
mod cascade;
mod combine;
mod core;
mod effect;
mod effector;
mod enhancer;
mod error;
mod reducer;
mod reducer_macro;
mod store;
mod task;

// Wire format
pub mod wire;

// Testing utilities are in the separate sidefx-testing crate



// Re-export core traits
pub use crate::core::{Action, CustomEffect, FollowUp, Opaque};

// Re-export effect types
pub use effect::{EffectBatch, SideEffect, DISPATCH_ACTION_TAG, MULTIPLE_TAG, NONE_TAG};

// Re-export error types
pub use crate::error::SideFxError;

// Re-export task runner types
pub use task::{Task, TaskFuture, TaskList};

// Re-export cascade scheduling
pub use cascade::{Cascade, EffectRun};

// Re-export effector types
pub use effector::{effector_fn, DispatchFn, Effector, EffectorChain, FnEffector};

// Re-export reducer types
pub use reducer::{plain_reducer, reducer, BaseReducer, Reducer, ReducerResult};
pub use combine::{combine_reducers, ReducerMap, ReducerTree};

// Re-export store types
pub use store::{create_store, BasicStore, Listener, Store, SubscriptionId};

// Re-export enhancer types (primary entry point)
pub use enhancer::{install_side_effects, EffectQueue, EffectStore, SideEffects};

// Re-export commonly used external types
pub use async_trait::async_trait;
