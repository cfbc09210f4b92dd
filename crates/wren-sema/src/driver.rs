//! Whole-module checking.

use wren_ast::{DeclKind, Module};
use wren_diag::{Diagnostic, DiagnosticError};
use wren_types::DeclId;

use crate::{CheckerOptions, Services, TypeChecker};

/// The outcome of checking a module.
#[derive(Debug, Clone, Default)]
pub struct CheckReport {
    pub diagnostics: Vec<Diagnostic>,
    /// Synthesized declarations whose bodies still have to be generated.
    pub implicitly_defined: Vec<DeclId>,
    /// Synthesized declarations belonging to imported types.
    pub external_definitions: Vec<DeclId>,
}

impl CheckReport {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    /// The diagnostics if none is an error; otherwise the errors alone.
    pub fn into_result(self) -> Result<Vec<Diagnostic>, DiagnosticError> {
        if !self.has_errors() {
            return Ok(self.diagnostics);
        }
        let errors = self
            .diagnostics
            .into_iter()
            .filter(Diagnostic::is_error)
            .collect();
        Err(DiagnosticError::multiple(errors))
    }
}

impl<S: Services> TypeChecker<S> {
    /// Check every module-scope declaration in two passes, then define the
    /// pending implicit constructors.
    pub fn check_module(&mut self) -> CheckReport {
        let decls: Vec<DeclId> = self
            .module
            .top_level
            .iter()
            .copied()
            .filter(|id| !matches!(self.module.decl(*id).kind, DeclKind::TopLevelCode))
            .collect();
        tracing::debug!(module = %self.module.name, decls = decls.len(), "checking module");

        for &id in &decls {
            self.typecheck_decl(id, true);
        }
        for &id in &decls {
            self.typecheck_decl(id, false);
        }
        self.define_pending_implicit_decls();

        let report = CheckReport {
            diagnostics: self.session.diagnostics.clone(),
            implicitly_defined: self.session.implicitly_defined.clone(),
            external_definitions: self.session.external_definitions.clone(),
        };
        tracing::debug!(
            diagnostics = report.diagnostics.len(),
            implicit = report.implicitly_defined.len(),
            "module checked"
        );
        report
    }
}

/// Check `module` with `services` and hand back the annotated module.
pub fn check_module<S: Services>(
    module: Module,
    services: S,
    options: CheckerOptions,
) -> (Module, CheckReport) {
    let mut checker = TypeChecker::with_options(module, services, options);
    let report = checker.check_module();
    (checker.into_module(), report)
}
