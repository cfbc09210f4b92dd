//! Step traces of declaration checking.
//!
//! Tracing is opt-in via [`CheckerOptions::tracing`](crate::CheckerOptions)
//! and read back with `TypeChecker::check_trace()`. Nothing is recorded (and
//! no detail strings are built) when it is disabled.

use serde::Serialize;

use crate::decl::PassState;

/// A single step taken while checking a declaration.
#[derive(Debug, Clone, Serialize)]
pub struct CheckStep {
    pub step: usize,
    /// Index of the declaration in its module.
    pub decl: u32,
    /// Declaration kind, e.g. `struct` or `pattern_binding`.
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass: Option<PassState>,
    pub action: CheckAction,
    pub detail: String,
}

/// What the checker did during a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckAction {
    /// Entered a declaration visitor.
    Dispatch,
    ResolveInheritance,
    AssignArchetypes,
    GatherConformances,
    PropagateInterop,
    ValidateAttributes,
    /// Synthesized a default initializer for a pattern binding.
    DefaultInitialize,
    AddImplicitConstructors,
    DefineDefaultConstructor,
    /// A default constructor was not synthesized.
    SkipDefaultConstructor,
}
