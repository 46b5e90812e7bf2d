//! The effect model.
//!
//! A [`SideEffect`] describes work to perform outside a pure state
//! transition. Three variants are built in and interpreted by the engine
//! itself; everything else is a [`SideEffect::Custom`] effect that only
//! application effectors understand.
//!
//! # Collapsing
//!
//! [`SideEffect::multiple`] never produces a `Multiple` of zero or one
//! effect: an empty list collapses to `None`, a singleton to the effect
//! itself. [`EffectBatch`] has no public constructor, so every `Multiple`
//! in the system went through that collapse.

use std::slice;

use crate::core::{CustomEffect, Opaque};

/// Wire tag of [`SideEffect::None`].
pub const NONE_TAG: &str = "none";
/// Wire tag of [`SideEffect::DispatchAction`].
pub const DISPATCH_ACTION_TAG: &str = "dispatchAction";
/// Wire tag of [`SideEffect::Multiple`].
pub const MULTIPLE_TAG: &str = "multiple";

/// A tagged description of work to perform outside a state transition.
#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect<A, E = Opaque> {
    /// Explicit absence of an effect.
    None,
    /// Re-dispatch these actions, in order.
    DispatchAction(Vec<A>),
    /// Run each child effect, serially or concurrently.
    Multiple(EffectBatch<A, E>),
    /// Application-defined effect.
    Custom(E),
}

/// Two or more effects plus the ordering mode for running them.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectBatch<A, E = Opaque> {
    effects: Vec<SideEffect<A, E>>,
    serial: bool,
}

impl<A, E> EffectBatch<A, E> {
    /// The child effects in their original order.
    pub fn effects(&self) -> &[SideEffect<A, E>] {
        &self.effects
    }

    /// `true` if the children must run one after another.
    pub fn is_serial(&self) -> bool {
        self.serial
    }

    /// Number of child effects (always at least two).
    pub fn len(&self) -> usize {
        self.effects.len()
    }

    /// `true` if there are no child effects. A batch built through
    /// [`SideEffect::multiple`] never is.
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Iterate over the child effects in order.
    pub fn iter(&self) -> slice::Iter<'_, SideEffect<A, E>> {
        self.effects.iter()
    }

    /// Split into the child effects and the serial flag.
    pub fn into_parts(self) -> (Vec<SideEffect<A, E>>, bool) {
        (self.effects, self.serial)
    }
}

impl<'a, A, E> IntoIterator for &'a EffectBatch<A, E> {
    type Item = &'a SideEffect<A, E>;
    type IntoIter = slice::Iter<'a, SideEffect<A, E>>;

    fn into_iter(self) -> Self::IntoIter {
        self.effects.iter()
    }
}

impl<A, E> SideEffect<A, E> {
    /// The "no effect" effect.
    pub fn none() -> Self {
        SideEffect::None
    }

    /// An effect that re-dispatches `actions` in order.
    pub fn dispatch_action(actions: impl IntoIterator<Item = A>) -> Self {
        SideEffect::DispatchAction(actions.into_iter().collect())
    }

    /// Combine effects, collapsing empty and singleton lists.
    ///
    /// `serial` only matters when two or more effects remain.
    pub fn multiple(effects: impl IntoIterator<Item = SideEffect<A, E>>, serial: bool) -> Self {
        let mut effects: Vec<_> = effects.into_iter().collect();
        match effects.len() {
            0 => SideEffect::None,
            1 => effects.pop().unwrap_or(SideEffect::None),
            _ => SideEffect::Multiple(EffectBatch { effects, serial }),
        }
    }

    /// Wrap an application-defined effect.
    pub fn custom(effect: E) -> Self {
        SideEffect::Custom(effect)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, SideEffect::None)
    }

    pub fn is_dispatch_action(&self) -> bool {
        matches!(self, SideEffect::DispatchAction(_))
    }

    pub fn is_multiple(&self) -> bool {
        matches!(self, SideEffect::Multiple(_))
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, SideEffect::Custom(_))
    }

    /// The custom payload, if this is a custom effect.
    pub fn as_custom(&self) -> Option<&E> {
        match self {
            SideEffect::Custom(effect) => Some(effect),
            _ => None,
        }
    }
}

impl<A, E: CustomEffect> SideEffect<A, E> {
    /// The wire tag of this effect.
    pub fn tag(&self) -> &str {
        match self {
            SideEffect::None => NONE_TAG,
            SideEffect::DispatchAction(_) => DISPATCH_ACTION_TAG,
            SideEffect::Multiple(_) => MULTIPLE_TAG,
            SideEffect::Custom(effect) => effect.tag(),
        }
    }

    /// `true` if this effect carries `tag`.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tag() == tag
    }
}

impl<A, E> Default for SideEffect<A, E> {
    fn default() -> Self {
        SideEffect::None
    }
}
