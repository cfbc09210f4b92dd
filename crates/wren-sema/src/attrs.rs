//! Attribute validation.
//!
//! Every attribute is checked by one entry of [`RULES`], evaluated in table
//! order. A rejected attribute is diagnosed and cleared, so later phases
//! only ever see attributes that are valid for their declaration.

use wren_ast::{Decl, DeclAttributes, DeclContext, DeclKind, Module};
use wren_diag::{Category, Diagnostic, SourceLocation};
use wren_types::{ArchetypeTable, DeclId, Type};

use crate::trace::CheckAction;
use crate::{Services, TypeChecker};

/// What a rule gets to look at.
struct AttrSubject<'a> {
    module: &'a Module,
    archetypes: &'a ArchetypeTable,
    decl: &'a Decl,
    location: SourceLocation,
}

impl AttrSubject<'_> {
    fn reject(&self, category: Category, message: impl Into<String>) -> Result<(), Diagnostic> {
        Err(Diagnostic::error(category, message).at(self.location))
    }

    fn is_func(&self) -> bool {
        matches!(self.decl.kind, DeclKind::Func(_))
    }

    fn is_var(&self) -> bool {
        matches!(self.decl.kind, DeclKind::Var(_))
    }

    fn in_type_context(&self) -> bool {
        self.module.is_type_context(self.decl.context)
    }

    fn in_class_context(&self) -> bool {
        self.module.class_of_context(self.decl.context).is_some()
    }

    fn is_operator_func(&self) -> bool {
        self.is_func() && self.decl.is_operator()
    }

    /// Parameter count of an operator function, skipping the receiver.
    fn operator_arity(&self) -> usize {
        let DeclKind::Func(func) = &self.decl.kind else {
            return 0;
        };
        let receivers = usize::from(self.in_type_context());
        func.arg_patterns.get(receivers).map_or(0, |pattern| pattern.arity())
    }

    fn ty(&self) -> Type {
        self.decl.ty.clone().unwrap_or(Type::Error)
    }

    /// Whether a weak/unowned reference to `ty` makes sense.
    fn allows_ownership(&self, ty: &Type) -> bool {
        if ty.class_decl().is_some() {
            return true;
        }
        if let Some(protocols) = ty.existential_protocols() {
            return protocols
                .iter()
                .all(|protocol| self.module.decl(protocol.decl).attrs.class_protocol);
        }
        if let Some(archetype) = ty.archetype() {
            return self.archetypes.get(archetype.id).requires_class;
        }
        false
    }
}

/// One attribute and how to validate it.
struct AttributeRule {
    name: &'static str,
    present: fn(&DeclAttributes) -> bool,
    check: fn(&AttrSubject<'_>) -> Result<(), Diagnostic>,
    clear: fn(&mut DeclAttributes),
    /// Applied to the declaration when the attribute is accepted.
    on_accept: Option<fn(&mut Decl)>,
}

const RULES: &[AttributeRule] = &[
    AttributeRule {
        name: "interop",
        present: |attrs| attrs.interop,
        check: check_interop,
        clear: |attrs| attrs.interop = false,
        on_accept: None,
    },
    AttributeRule {
        name: "ownership",
        present: |attrs| attrs.ownership.is_some(),
        check: check_ownership,
        clear: |attrs| attrs.ownership = None,
        on_accept: Some(wrap_in_reference_storage),
    },
    AttributeRule {
        name: "outlet",
        present: |attrs| attrs.outlet,
        check: check_outlet,
        clear: |attrs| attrs.outlet = false,
        on_accept: None,
    },
    AttributeRule {
        name: "action",
        present: |attrs| attrs.action,
        check: check_action,
        clear: |attrs| attrs.action = false,
        on_accept: None,
    },
    AttributeRule {
        name: "infix",
        present: |attrs| attrs.infix,
        check: |subject| check_fixity(subject, "infix", 2),
        clear: |attrs| attrs.infix = false,
        on_accept: None,
    },
    AttributeRule {
        name: "postfix",
        present: |attrs| attrs.postfix,
        check: |subject| check_fixity(subject, "postfix", 1),
        clear: |attrs| attrs.postfix = false,
        on_accept: None,
    },
    AttributeRule {
        name: "prefix",
        present: |attrs| attrs.prefix,
        check: |subject| check_fixity(subject, "prefix", 1),
        clear: |attrs| attrs.prefix = false,
        on_accept: None,
    },
    AttributeRule {
        name: "assignment",
        present: |attrs| attrs.assignment,
        check: check_assignment,
        clear: |attrs| attrs.assignment = false,
        on_accept: None,
    },
    AttributeRule {
        name: "conversion",
        present: |attrs| attrs.conversion,
        check: check_conversion,
        clear: |attrs| attrs.conversion = false,
        on_accept: None,
    },
    AttributeRule {
        name: "inline_always",
        present: |attrs| attrs.inline_always,
        check: check_inline_always,
        clear: |attrs| attrs.inline_always = false,
        on_accept: None,
    },
    AttributeRule {
        name: "byref",
        present: |attrs| attrs.byref,
        check: |subject| reject_everywhere(subject, "byref"),
        clear: |attrs| attrs.byref = false,
        on_accept: None,
    },
    AttributeRule {
        name: "autoclosure",
        present: |attrs| attrs.autoclosure,
        check: |subject| reject_everywhere(subject, "auto_closure"),
        clear: |attrs| attrs.autoclosure = false,
        on_accept: None,
    },
    AttributeRule {
        name: "interop_block",
        present: |attrs| attrs.interop_block,
        check: |subject| reject_everywhere(subject, "interop_block"),
        clear: |attrs| attrs.interop_block = false,
        on_accept: None,
    },
    AttributeRule {
        name: "class_protocol",
        present: |attrs| attrs.class_protocol,
        check: check_class_protocol,
        clear: |attrs| attrs.class_protocol = false,
        on_accept: None,
    },
    AttributeRule {
        name: "calling_convention",
        present: |attrs| attrs.calling_convention.is_some(),
        check: |subject| reject_everywhere(subject, "cc"),
        clear: |attrs| attrs.calling_convention = None,
        on_accept: None,
    },
    AttributeRule {
        name: "thin",
        present: |attrs| attrs.thin,
        check: |subject| reject_everywhere(subject, "thin"),
        clear: |attrs| attrs.thin = false,
        on_accept: None,
    },
    AttributeRule {
        name: "no_return",
        present: |attrs| attrs.no_return,
        check: |subject| reject_everywhere(subject, "noreturn"),
        clear: |attrs| attrs.no_return = false,
        on_accept: None,
    },
];

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

fn check_interop(subject: &AttrSubject<'_>) -> Result<(), Diagnostic> {
    match &subject.decl.kind {
        DeclKind::Class(_) => Ok(()),
        DeclKind::Func(_) if subject.in_class_context() && !subject.decl.is_operator() => Ok(()),
        DeclKind::Var(_) if subject.in_class_context() => Ok(()),
        DeclKind::Protocol(_) if subject.decl.attrs.class_protocol => Ok(()),
        DeclKind::Protocol(_) => subject.reject(
            Category::InteropAttribute,
            "only class protocols can be declared `interop`",
        ),
        _ => subject.reject(
            Category::InteropAttribute,
            "`interop` attribute only applies to classes, class members, and class protocols",
        ),
    }
}

fn check_ownership(subject: &AttrSubject<'_>) -> Result<(), Diagnostic> {
    let ownership = subject
        .decl
        .attrs
        .ownership
        .map_or("weak", |ownership| ownership.as_str());
    if !subject.is_var() {
        return subject.reject(
            Category::OwnershipAttribute,
            format!("`{ownership}` attribute only applies to variables"),
        );
    }
    let ty = subject.ty();
    if ty.is_error() || subject.allows_ownership(&ty) {
        return Ok(());
    }
    if ty.is_existential() || ty.archetype().is_some() {
        subject.reject(
            Category::OwnershipAttribute,
            format!("`{ownership}` cannot be applied to `{ty}`, which is not class-bound"),
        )
    } else {
        subject.reject(
            Category::OwnershipAttribute,
            format!("`{ownership}` cannot be applied to non-class type `{ty}`"),
        )
    }
}

fn wrap_in_reference_storage(decl: &mut Decl) {
    let (Some(ownership), Some(ty)) = (decl.attrs.ownership, decl.ty.as_ref()) else {
        return;
    };
    if ty.is_error() || matches!(ty, Type::ReferenceStorage { .. }) {
        return;
    }
    decl.ty = Some(Type::ReferenceStorage {
        ownership,
        referent: Box::new(ty.clone()),
    });
}

fn check_outlet(subject: &AttrSubject<'_>) -> Result<(), Diagnostic> {
    if subject.is_var() && subject.in_class_context() {
        return Ok(());
    }
    subject.reject(
        Category::InterfaceAttribute,
        "`outlet` attribute only applies to class variables",
    )
}

fn check_action(subject: &AttrSubject<'_>) -> Result<(), Diagnostic> {
    let DeclKind::Func(func) = &subject.decl.kind else {
        return subject.reject(
            Category::InterfaceAttribute,
            "`action` attribute only applies to methods",
        );
    };
    let in_class = matches!(
        subject.decl.context,
        DeclContext::Decl(owner) if matches!(subject.module.decl(owner).kind, DeclKind::Class(_))
    );
    if !in_class || func.is_static || func.accessor_for.is_some() {
        return subject.reject(
            Category::InterfaceAttribute,
            "`action` attribute only applies to instance methods declared in a class",
        );
    }
    let ty = subject.ty();
    if ty.is_error() {
        return Ok(());
    }
    let returns_unit = ty
        .function_result()
        .and_then(|bound| bound.function_result())
        .is_some_and(|result| result.is_unit());
    if returns_unit {
        Ok(())
    } else {
        subject.reject(
            Category::InterfaceAttribute,
            "`action` methods must return `()`",
        )
    }
}

fn check_fixity(subject: &AttrSubject<'_>, name: &str, arity: usize) -> Result<(), Diagnostic> {
    if !subject.is_operator_func() {
        return subject.reject(
            Category::OperatorAttribute,
            format!("`{name}` attribute only applies to operator functions"),
        );
    }
    if subject.operator_arity() != arity {
        let kind = if arity == 2 { "binary" } else { "unary" };
        return subject.reject(
            Category::OperatorAttribute,
            format!("`{name}` attribute requires a {kind} operator"),
        );
    }
    Ok(())
}

fn check_assignment(subject: &AttrSubject<'_>) -> Result<(), Diagnostic> {
    if !subject.is_operator_func() {
        return subject.reject(
            Category::OperatorAttribute,
            "`assignment` attribute only applies to operator functions",
        );
    }
    let mut ty = subject.ty();
    if ty.is_error() {
        return Ok(());
    }
    if subject.decl.is_static() && subject.in_type_context() {
        ty = ty.function_result().unwrap_or(Type::Error);
    }
    let params = match ty.function_parts() {
        Some((input, _)) => input
            .tuple_elements()
            .map(|elements| elements.into_iter().map(|element| element.ty).collect())
            .unwrap_or_else(|| vec![input]),
        None => Vec::new(),
    };
    match params.first() {
        None => subject.reject(
            Category::OperatorAttribute,
            "`assignment` operator must have at least one parameter",
        ),
        Some(first) if matches!(first.canonical(), Type::LValue(_)) => Ok(()),
        Some(_) => subject.reject(
            Category::OperatorAttribute,
            "first parameter of an `assignment` operator must be by-reference",
        ),
    }
}

fn check_conversion(subject: &AttrSubject<'_>) -> Result<(), Diagnostic> {
    if !subject.is_func() || !subject.in_type_context() || subject.decl.is_static() {
        return subject.reject(
            Category::ConversionAttribute,
            "`conversion` attribute only applies to instance methods",
        );
    }
    let ty = subject.ty();
    if ty.is_error() {
        return Ok(());
    }
    let callable_without_args = ty
        .function_result()
        .and_then(|bound| bound.function_parts())
        .and_then(|(input, _)| input.tuple_elements())
        .is_some_and(|params| params.iter().all(|param| param.has_default));
    if callable_without_args {
        Ok(())
    } else {
        subject.reject(
            Category::ConversionAttribute,
            "conversion function must be callable with no arguments",
        )
    }
}

fn check_inline_always(subject: &AttrSubject<'_>) -> Result<(), Diagnostic> {
    let DeclKind::Func(func) = &subject.decl.kind else {
        return subject.reject(
            Category::InlineAttribute,
            "`inline(always)` attribute only applies to functions",
        );
    };
    let receivers = usize::from(subject.in_type_context());
    if func.arg_patterns.len() > receivers + 1 {
        return subject.reject(
            Category::InlineAttribute,
            "`inline(always)` is not supported on curried functions",
        );
    }
    if func.generic_params.is_some() {
        return subject.reject(
            Category::InlineAttribute,
            "`inline(always)` is not supported on generic functions",
        );
    }
    Ok(())
}

fn check_class_protocol(subject: &AttrSubject<'_>) -> Result<(), Diagnostic> {
    if matches!(subject.decl.kind, DeclKind::Protocol(_)) {
        return Ok(());
    }
    subject.reject(
        Category::InvalidAttribute,
        "`class_protocol` attribute only applies to protocols",
    )
}

fn reject_everywhere(subject: &AttrSubject<'_>, spelling: &str) -> Result<(), Diagnostic> {
    subject.reject(
        Category::InvalidAttribute,
        format!(
            "`{spelling}` attribute is not allowed on {} declarations",
            subject.decl.kind_name()
        ),
    )
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

impl<S: Services> TypeChecker<S> {
    pub(crate) fn attribute_location(&self, id: DeclId) -> SourceLocation {
        let decl = self.module.decl(id);
        decl.attrs.span.unwrap_or(decl.span).location()
    }

    /// Validate the attributes of `id`. Runs once per declaration.
    pub fn validate_attributes(&mut self, id: DeclId) {
        if self.module.decl(id).attrs_validated {
            return;
        }
        self.module.decl_mut(id).attrs_validated = true;

        let decl = self.module.decl(id);
        let location = self.attribute_location(id);
        if decl.is_value() && decl.is_operator() {
            if !matches!(decl.kind, DeclKind::Func(_)) {
                let diag = Diagnostic::error(
                    Category::OperatorAttribute,
                    format!(
                        "operator `{}` must be declared as a function",
                        decl.name().unwrap_or("_")
                    ),
                )
                .at(location);
                self.diagnose(diag);
                self.module.decl_mut(id).invalid = true;
                return;
            }
            let subject = self.attr_subject(id);
            let reserved = decl.name() == Some("&")
                && subject.operator_arity() == 1
                && !decl.attrs.postfix;
            if reserved {
                let diag = Diagnostic::error(
                    Category::OperatorAttribute,
                    "cannot declare a custom unary `&` operator",
                )
                .at(location);
                self.diagnose(diag);
                self.module.decl_mut(id).invalid = true;
                return;
            }
        }
        if self.module.decl(id).attrs.is_empty() {
            return;
        }

        let mut rejected = Vec::new();
        for rule in RULES {
            if !(rule.present)(&self.module.decl(id).attrs) {
                continue;
            }
            let result = (rule.check)(&self.attr_subject(id));
            match result {
                Ok(()) => {
                    if let Some(accept) = rule.on_accept {
                        accept(self.module.decl_mut(id));
                    }
                }
                Err(diag) => {
                    self.diagnose(diag);
                    (rule.clear)(&mut self.module.decl_mut(id).attrs);
                    rejected.push(rule.name);
                }
            }
        }
        self.record(id, None, CheckAction::ValidateAttributes, || {
            if rejected.is_empty() {
                "all attributes accepted".to_string()
            } else {
                format!("rejected [{}]", rejected.join(", "))
            }
        });
    }

    fn attr_subject(&self, id: DeclId) -> AttrSubject<'_> {
        AttrSubject {
            module: &self.module,
            archetypes: &self.session.archetypes,
            decl: self.module.decl(id),
            location: self.attribute_location(id),
        }
    }
}
