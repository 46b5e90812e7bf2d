//! Core traits for the sidefx effect algebra.
//!
//! # Overview
//!
//! sidefx separates **state transitions** from **work**:
//! - [`Action`] = a request to change state, handled by pure reducers
//! - [`SideEffect`](crate::SideEffect) = a description of work a reducer wants done
//!
//! Reducers never perform the work themselves. They return the new state and,
//! optionally, an effect. Effectors perform the effect and answer with
//! [`FollowUp`] actions, which flow back into `dispatch`.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An application-defined command value submitted to `dispatch`.
///
/// Every action carries a string discriminator. sidefx only reads it for
/// logging; routing on it is the reducers' business.
///
/// # Example
///
/// ```ignore
/// #[derive(Debug, Clone)]
/// enum TodoAction {
///     Add { text: String },
///     Clear,
/// }
///
/// impl Action for TodoAction {
///     fn action_type(&self) -> &str {
///         match self {
///             TodoAction::Add { .. } => "ADD_TODO",
///             TodoAction::Clear => "CLEAR",
///         }
///     }
/// }
/// ```
pub trait Action: Clone + fmt::Debug + Send + Sync + 'static {
    /// The string discriminator of this action.
    fn action_type(&self) -> &str;
}

/// JSON actions are discriminated by their `"type"` field.
///
/// A value without a string `"type"` field reports an empty discriminator.
impl Action for Value {
    fn action_type(&self) -> &str {
        self.get("type").and_then(Value::as_str).unwrap_or("")
    }
}

/// A bare string action is its own discriminator.
impl Action for String {
    fn action_type(&self) -> &str {
        self
    }
}

impl Action for &'static str {
    fn action_type(&self) -> &str {
        self
    }
}

/// An application-defined effect carried by [`SideEffect::Custom`](crate::SideEffect::Custom).
///
/// The built-in machinery never interprets custom effects; they are inert
/// until an application effector recognizes them by tag or by matching on
/// the concrete type.
pub trait CustomEffect: Clone + fmt::Debug + Send + Sync + 'static {
    /// The wire tag of this effect. Must not collide with the built-in tags
    /// `"none"`, `"dispatchAction"` or `"multiple"`.
    fn tag(&self) -> &str;
}

/// A dynamically shaped custom effect: a tag plus arbitrary JSON payload.
///
/// This is the default custom effect type. It serializes as
/// `{"type": tag, ...payload}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opaque {
    #[serde(rename = "type")]
    tag: Cow<'static, str>,
    #[serde(flatten)]
    payload: Map<String, Value>,
}

impl Opaque {
    /// Create an opaque effect with an empty payload.
    pub fn new(tag: impl Into<Cow<'static, str>>) -> Self {
        Self {
            tag: tag.into(),
            payload: Map::new(),
        }
    }

    /// Add a payload field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Get a payload field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// The full payload (everything except the tag).
    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }
}

impl CustomEffect for Opaque {
    fn tag(&self) -> &str {
        &self.tag
    }
}

/// The actions an effector answers with.
///
/// Mirrors the effector contract: nothing, one action, or an ordered
/// sequence of actions. Every yielded action re-enters `dispatch`.
#[derive(Debug, Clone, PartialEq)]
pub enum FollowUp<A> {
    /// No follow-up.
    None,
    /// Dispatch a single action.
    Action(A),
    /// Dispatch these actions in order.
    Actions(Vec<A>),
}

impl<A> FollowUp<A> {
    /// Returns `true` if there is nothing to dispatch.
    pub fn is_empty(&self) -> bool {
        match self {
            FollowUp::None => true,
            FollowUp::Action(_) => false,
            FollowUp::Actions(actions) => actions.is_empty(),
        }
    }

    /// Number of actions that will be dispatched.
    pub fn len(&self) -> usize {
        match self {
            FollowUp::None => 0,
            FollowUp::Action(_) => 1,
            FollowUp::Actions(actions) => actions.len(),
        }
    }

    /// Flatten into an ordered list of actions.
    pub fn into_actions(self) -> Vec<A> {
        match self {
            FollowUp::None => Vec::new(),
            FollowUp::Action(action) => vec![action],
            FollowUp::Actions(actions) => actions,
        }
    }
}

impl<A> Default for FollowUp<A> {
    fn default() -> Self {
        FollowUp::None
    }
}

impl<A> From<Option<A>> for FollowUp<A> {
    fn from(action: Option<A>) -> Self {
        match action {
            Some(action) => FollowUp::Action(action),
            None => FollowUp::None,
        }
    }
}

impl<A> From<Vec<A>> for FollowUp<A> {
    fn from(actions: Vec<A>) -> Self {
        FollowUp::Actions(actions)
    }
}
