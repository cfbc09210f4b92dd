//! Declaration-level semantic analysis for Wren.
//!
//! This crate checks every kind of declaration in a [`Module`]:
//! - Inheritance clause resolution (superclass, protocols, fix-its)
//! - Generic parameter lists and archetype assignment
//! - Declaration types for functions, constructors, enum cases, subscripts
//! - Attribute validation and native-interop propagation
//! - Implicit memberwise and default constructors for structs
//!
//! Checking runs in up to two passes over module-scope declarations so that
//! forward references resolve. The collaborators that check written types,
//! patterns, expressions, and conformances are behind the traits in
//! [`services`]; [`ScopeServices`] is the default implementation.

pub mod attrs;
pub mod conformance;
pub mod decl;
pub mod driver;
pub mod generics;
pub mod implicit;
pub mod inheritance;
pub mod services;
pub mod trace;

use std::collections::BTreeMap;

use indexmap::IndexSet;
use wren_ast::{DeclContext, Expr, Module, Pattern, TypeLoc};
use wren_types::{ArchetypeTable, ConformanceId, ConformanceTable, DeclId, Type};

pub use decl::PassState;
pub use driver::{check_module, CheckReport};
pub use services::{
    ConformanceChecker, ConstructorLookup, ExprChecker, PatternChecker, ScopeServices,
    ServiceView, Services, TypeValidator,
};
pub use wren_diag::{Category, Diagnostic, DiagnosticError, FixIt, SourceLocation};

use crate::trace::{CheckAction, CheckStep};

// ---------------------------------------------------------------------------
// Options and session state
// ---------------------------------------------------------------------------

/// Knobs for a checking session.
#[derive(Debug, Clone, Copy)]
pub struct CheckerOptions {
    /// Record a [`CheckStep`] trace of every visitor step.
    pub tracing: bool,
    /// How deep associated types of associated types are expanded when
    /// building nested archetypes.
    pub max_nested_archetype_depth: usize,
}

impl Default for CheckerOptions {
    fn default() -> Self {
        Self {
            tracing: false,
            // Deep enough for `T.Element.Index.Element` chains while still
            // cutting off self-referential associated types.
            max_nested_archetype_depth: 8,
        }
    }
}

/// State shared by every declaration checked in one session.
#[derive(Debug, Default)]
pub struct CheckerSession {
    pub options: CheckerOptions,
    pub archetypes: ArchetypeTable,
    pub conformances: ConformanceTable,
    /// Successful conformances, keyed by `(protocol, conforming decl)`.
    conformance_cache: BTreeMap<(DeclId, DeclId), ConformanceId>,
    /// Structs whose default constructor is still to be defined.
    pending_default_ctors: IndexSet<DeclId>,
    /// Every struct ever queued for a default constructor, in queue order.
    structs_with_implicit_default_ctor: Vec<DeclId>,
    /// Implicit declarations whose bodies were synthesized.
    pub implicitly_defined: Vec<DeclId>,
    /// Synthesized declarations that belong to imported types.
    pub external_definitions: Vec<DeclId>,
    pub diagnostics: Vec<Diagnostic>,
    trace: Option<Vec<CheckStep>>,
}

impl CheckerSession {
    pub fn new(options: CheckerOptions) -> Self {
        Self {
            options,
            trace: options.tracing.then(Vec::new),
            ..Self::default()
        }
    }

    /// The recorded conformance of `decl` to `protocol`, if it succeeded.
    pub fn recorded_conformance(&self, protocol: DeclId, decl: DeclId) -> Option<ConformanceId> {
        self.conformance_cache.get(&(protocol, decl)).copied()
    }

    pub(crate) fn record_conformance(
        &mut self,
        protocol: DeclId,
        decl: DeclId,
        conformance: ConformanceId,
    ) {
        self.conformance_cache.insert((protocol, decl), conformance);
    }

    pub fn is_pending_default_constructor(&self, strukt: DeclId) -> bool {
        self.pending_default_ctors.contains(&strukt)
    }

    pub fn pending_default_constructors(&self) -> impl Iterator<Item = DeclId> + '_ {
        self.pending_default_ctors.iter().copied()
    }

    pub(crate) fn queue_default_constructor(&mut self, strukt: DeclId) {
        if self.pending_default_ctors.insert(strukt) {
            self.structs_with_implicit_default_ctor.push(strukt);
        }
    }

    /// Remove `strukt` from the pending set; false if it was not pending.
    pub(crate) fn take_pending_default_constructor(&mut self, strukt: DeclId) -> bool {
        self.pending_default_ctors.shift_remove(&strukt)
    }

    pub(crate) fn queued_default_constructors(&self) -> Vec<DeclId> {
        self.structs_with_implicit_default_ctor.clone()
    }
}

// ---------------------------------------------------------------------------
// Checker
// ---------------------------------------------------------------------------

/// The declaration checker: a module, its services, and session state.
pub struct TypeChecker<S = ScopeServices> {
    module: Module,
    services: S,
    session: CheckerSession,
}

impl TypeChecker<ScopeServices> {
    pub fn new(module: Module) -> Self {
        Self::with_options(module, ScopeServices, CheckerOptions::default())
    }
}

impl<S: Services> TypeChecker<S> {
    pub fn with_options(module: Module, services: S, options: CheckerOptions) -> Self {
        Self {
            module,
            services,
            session: CheckerSession::new(options),
        }
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn module_mut(&mut self) -> &mut Module {
        &mut self.module
    }

    pub fn into_module(self) -> Module {
        self.module
    }

    pub fn into_parts(self) -> (Module, CheckerSession) {
        (self.module, self.session)
    }

    pub fn session(&self) -> &CheckerSession {
        &self.session
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.session.diagnostics
    }

    /// The recorded step trace. Empty unless tracing was enabled.
    pub fn check_trace(&self) -> &[CheckStep] {
        self.session.trace.as_deref().unwrap_or(&[])
    }

    pub(crate) fn view(&self) -> ServiceView<'_> {
        ServiceView {
            module: &self.module,
            archetypes: &self.session.archetypes,
            conformances: &self.session.conformances,
        }
    }

    pub(crate) fn diagnose(&mut self, diag: Diagnostic) {
        self.session.diagnostics.push(diag);
    }

    /// Append a trace step. `detail` is only evaluated when tracing.
    pub(crate) fn record(
        &mut self,
        id: DeclId,
        pass: Option<PassState>,
        action: CheckAction,
        detail: impl FnOnce() -> String,
    ) {
        if self.session.trace.is_none() {
            return;
        }
        let kind = self.module.decl(id).kind_name();
        if let Some(trace) = self.session.trace.as_mut() {
            trace.push(CheckStep {
                step: trace.len(),
                decl: id.0,
                kind,
                pass,
                action,
                detail: detail(),
            });
        }
    }

    // -- service wrappers ---------------------------------------------------
    //
    // Each wrapper reports a failure as a diagnostic and answers whether the
    // operation succeeded.

    /// Validate a written type. An already-invalid location fails silently.
    pub(crate) fn validate_type(&mut self, scope: DeclContext, loc: &mut TypeLoc) -> bool {
        if loc.invalid {
            return false;
        }
        let result = self.services.validate_type(&self.view(), scope, loc);
        match result {
            Ok(()) => true,
            Err(diag) => {
                loc.set_invalid();
                self.diagnose(diag);
                false
            }
        }
    }

    pub(crate) fn type_check_pattern(
        &mut self,
        scope: DeclContext,
        pattern: &mut Pattern,
        allow_unknown: bool,
    ) -> bool {
        let result = self
            .services
            .type_check_pattern(&self.view(), pattern, scope, allow_unknown);
        self.report(result)
    }

    pub(crate) fn coerce_pattern(
        &mut self,
        scope: DeclContext,
        pattern: &mut Pattern,
        ty: &Type,
    ) -> bool {
        let result = self
            .services
            .coerce_pattern_to_type(&self.view(), pattern, scope, ty);
        self.report(result)
    }

    /// Type-check `expr`, returning the failure instead of reporting it so
    /// callers can attach notes.
    pub(crate) fn type_check_expr(
        &mut self,
        scope: DeclContext,
        expr: &mut Expr,
        expected: Option<&Type>,
    ) -> Result<(), Diagnostic> {
        self.services
            .type_check_expr(&self.view(), expr, scope, expected)
    }

    fn report(&mut self, result: Result<(), Diagnostic>) -> bool {
        match result {
            Ok(()) => true,
            Err(diag) => {
                self.diagnose(diag);
                false
            }
        }
    }
}

#[cfg(test)]
mod decl_tests;
