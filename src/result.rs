// Predicate function results
//
// A match result carries its boolean value plus whether that value is known
// to hold for every descendant of the tested path.

use std::ops::Not;

/// Whether a result holds for all descendants of the tested object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Constancy {
    ConstantOverDescendants,
    MayVaryOverDescendants,
}

/// The value of a predicate or pattern match, plus its constancy.
///
/// Callers doing a traversal may skip a whole subtree when a result is
/// constant; a non-constant result says nothing about descendants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PredicateFunctionResult {
    value: bool,
    constancy: Constancy,
}

impl Default for PredicateFunctionResult {
    fn default() -> Self {
        PredicateFunctionResult::make_varying(false)
    }
}

impl PredicateFunctionResult {
    pub const fn new(value: bool, constancy: Constancy) -> Self {
        PredicateFunctionResult { value, constancy }
    }

    pub const fn make_constant(value: bool) -> Self {
        Self::new(value, Constancy::ConstantOverDescendants)
    }

    pub const fn make_varying(value: bool) -> Self {
        Self::new(value, Constancy::MayVaryOverDescendants)
    }

    #[inline]
    pub fn value(&self) -> bool {
        self.value
    }

    #[inline]
    pub fn constancy(&self) -> Constancy {
        self.constancy
    }

    #[inline]
    pub fn is_constant(&self) -> bool {
        self.constancy == Constancy::ConstantOverDescendants
    }

    /// Take `other`'s value; stay constant only if both were constant.
    pub fn set_and_propagate_constancy(&mut self, other: PredicateFunctionResult) {
        self.value = other.value;
        if other.constancy == Constancy::MayVaryOverDescendants {
            self.constancy = Constancy::MayVaryOverDescendants;
        }
    }
}

impl Not for PredicateFunctionResult {
    type Output = PredicateFunctionResult;

    fn not(self) -> Self::Output {
        PredicateFunctionResult::new(!self.value, self.constancy)
    }
}

impl From<bool> for PredicateFunctionResult {
    fn from(value: bool) -> Self {
        PredicateFunctionResult::make_varying(value)
    }
}

impl PartialEq<bool> for PredicateFunctionResult {
    fn eq(&self, other: &bool) -> bool {
        self.value == *other
    }
}
