//! Error reporting and diagnostics for Wren.
//!
//! This crate provides structured diagnostics with source location tracking.
//! Diagnostics are created by the declaration checker and its collaborating
//! services and rendered here for display. Fix-its are carried as data; the
//! checker never consults them for control flow.

use std::fmt;

// ---------------------------------------------------------------------------
// Diagnostic severity and categories
// ---------------------------------------------------------------------------

/// How severe a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
    /// Attached context such as "protocol declared here".
    Note,
}

/// Broad category for diagnostics. Used for filtering and grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// The same type appears twice in one inheritance clause.
    DuplicateInheritance,
    /// More than one class appears in an inheritance clause.
    MultipleInheritance,
    /// A superclass is written after another inheritance entry.
    SuperclassNotFirst,
    /// A declaration that cannot have a superclass names a class.
    NonClassInheritance,
    /// An inheritance entry is neither a protocol nor a class.
    InheritanceFromNonProtocol,
    /// A generic requirement is malformed or unsupported.
    InvalidRequirement,
    /// An extension targets something other than a struct, class, or enum.
    NonNominalExtension,
    /// An attribute is not permitted on this declaration.
    InvalidAttribute,
    /// A native-interop attribute is misplaced.
    InteropAttribute,
    /// A weak/unowned attribute is misplaced or applied to a value type.
    OwnershipAttribute,
    /// An outlet/action attribute is misplaced or has the wrong shape.
    InterfaceAttribute,
    /// An operator fixity or assignment attribute is misapplied.
    OperatorAttribute,
    /// A conversion attribute is applied to an incompatible declaration.
    ConversionAttribute,
    /// An inlining hint is applied to an unsupported function.
    InlineAttribute,
    /// A variable has no initializer and its type cannot be default-initialized.
    NoDefaultInitializer,
    /// An initializer cannot be converted to the declared variable type.
    InitializerMismatch,
    /// A variable or payload has a non-materializable type.
    NotMaterializable,
    /// A native-interop protocol refines a protocol that is not interop.
    InteropProtocolInheritance,
    /// A written type name does not resolve.
    UnresolvedType,
    /// A type does not satisfy a protocol it claims to conform to.
    ProtocolConformance,
    /// General type error.
    TypeError,
}

impl Category {
    pub const ALL: [Category; 21] = [
        Category::DuplicateInheritance,
        Category::MultipleInheritance,
        Category::SuperclassNotFirst,
        Category::NonClassInheritance,
        Category::InheritanceFromNonProtocol,
        Category::InvalidRequirement,
        Category::NonNominalExtension,
        Category::InvalidAttribute,
        Category::InteropAttribute,
        Category::OwnershipAttribute,
        Category::InterfaceAttribute,
        Category::OperatorAttribute,
        Category::ConversionAttribute,
        Category::InlineAttribute,
        Category::NoDefaultInitializer,
        Category::InitializerMismatch,
        Category::NotMaterializable,
        Category::InteropProtocolInheritance,
        Category::UnresolvedType,
        Category::ProtocolConformance,
        Category::TypeError,
    ];

    pub fn all() -> &'static [Category] {
        &Self::ALL
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::DuplicateInheritance => "duplicate_inheritance",
            Category::MultipleInheritance => "multiple_inheritance",
            Category::SuperclassNotFirst => "superclass_not_first",
            Category::NonClassInheritance => "non_class_inheritance",
            Category::InheritanceFromNonProtocol => "inheritance_from_non_protocol",
            Category::InvalidRequirement => "invalid_requirement",
            Category::NonNominalExtension => "non_nominal_extension",
            Category::InvalidAttribute => "invalid_attribute",
            Category::InteropAttribute => "interop_attribute",
            Category::OwnershipAttribute => "ownership_attribute",
            Category::InterfaceAttribute => "interface_attribute",
            Category::OperatorAttribute => "operator_attribute",
            Category::ConversionAttribute => "conversion_attribute",
            Category::InlineAttribute => "inline_attribute",
            Category::NoDefaultInitializer => "no_default_initializer",
            Category::InitializerMismatch => "initializer_mismatch",
            Category::NotMaterializable => "not_materializable",
            Category::InteropProtocolInheritance => "interop_protocol_inheritance",
            Category::UnresolvedType => "unresolved_type",
            Category::ProtocolConformance => "protocol_conformance",
            Category::TypeError => "type_error",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Category::DuplicateInheritance => "E0101",
            Category::MultipleInheritance => "E0102",
            Category::SuperclassNotFirst => "E0103",
            Category::NonClassInheritance => "E0104",
            Category::InheritanceFromNonProtocol => "E0105",
            Category::InvalidRequirement => "E0106",
            Category::NonNominalExtension => "E0107",
            Category::InvalidAttribute => "E0201",
            Category::InteropAttribute => "E0202",
            Category::OwnershipAttribute => "E0203",
            Category::InterfaceAttribute => "E0204",
            Category::OperatorAttribute => "E0205",
            Category::ConversionAttribute => "E0206",
            Category::InlineAttribute => "E0207",
            Category::NoDefaultInitializer => "E0301",
            Category::InitializerMismatch => "E0302",
            Category::NotMaterializable => "E0303",
            Category::InteropProtocolInheritance => "E0401",
            Category::UnresolvedType => "E0402",
            Category::ProtocolConformance => "E0403",
            Category::TypeError => "E0012",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Category::DuplicateInheritance => "A type is listed twice in an inheritance clause.",
            Category::MultipleInheritance => "A class can inherit from at most one superclass.",
            Category::SuperclassNotFirst => {
                "The superclass must be the first entry of an inheritance clause."
            }
            Category::NonClassInheritance => "Only classes can inherit from a class.",
            Category::InheritanceFromNonProtocol => {
                "Inheritance clauses may only name protocols (and, for classes, a superclass)."
            }
            Category::InvalidRequirement => "A generic requirement cannot be satisfied as written.",
            Category::NonNominalExtension => "Only structs, classes, and enums can be extended.",
            Category::InvalidAttribute => "The attribute is not allowed on this declaration.",
            Category::InteropAttribute => "The interop attribute is not valid here.",
            Category::OwnershipAttribute => "Ownership attributes require a reference-typed variable.",
            Category::InterfaceAttribute => "Outlet and action attributes require class members.",
            Category::OperatorAttribute => "The operator attribute does not match the declaration.",
            Category::ConversionAttribute => {
                "Conversions must be instance methods callable with no arguments."
            }
            Category::InlineAttribute => "Inlining hints require a plain, non-generic function.",
            Category::NoDefaultInitializer => "The variable's type has no default initializer.",
            Category::InitializerMismatch => "The initializer does not match the declared type.",
            Category::NotMaterializable => "The type cannot be stored in a variable.",
            Category::InteropProtocolInheritance => {
                "An interop protocol may only refine interop protocols."
            }
            Category::UnresolvedType => "A type name could not be resolved.",
            Category::ProtocolConformance => "The type does not conform to a listed protocol.",
            Category::TypeError => "General type checking error.",
        }
    }

    pub fn example_fix(self) -> &'static str {
        match self {
            Category::DuplicateInheritance => "Remove the repeated entry.",
            Category::MultipleInheritance => "Keep one superclass and use protocols for the rest.",
            Category::SuperclassNotFirst => "Move the superclass to the front of the clause.",
            Category::NonClassInheritance => "Make the declaration a class or drop the class entry.",
            Category::InheritanceFromNonProtocol => "Replace the entry with a protocol.",
            Category::InvalidRequirement => "Constrain the parameter with a protocol or class.",
            Category::NonNominalExtension => "Extend the nominal type the alias refers to.",
            Category::InvalidAttribute => "Remove the attribute.",
            Category::InteropAttribute => "Move the declaration into an interop class.",
            Category::OwnershipAttribute => "Use a class type or add a class bound.",
            Category::InterfaceAttribute => "Declare the member on a class.",
            Category::OperatorAttribute => "Adjust the operator's parameter list.",
            Category::ConversionAttribute => "Give every parameter a default value.",
            Category::InlineAttribute => "Remove the hint from curried or generic functions.",
            Category::NoDefaultInitializer => "Add an initializer expression.",
            Category::InitializerMismatch => "Convert the initializer or change the annotation.",
            Category::NotMaterializable => "Store the value rather than a reference to it.",
            Category::InteropProtocolInheritance => "Mark the refined protocol as interop.",
            Category::UnresolvedType => "Declare or import the missing type.",
            Category::ProtocolConformance => "Implement the missing protocol requirements.",
            Category::TypeError => "Follow the labeled spans to align the involved types.",
        }
    }
}

// ---------------------------------------------------------------------------
// Source locations (independent of wren-ast's Span)
// ---------------------------------------------------------------------------

/// A source location for diagnostics.
///
/// Uses byte offsets. Callers convert from `wren-ast` spans to this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub file_id: u32,
    pub start: u32,
    pub end: u32,
}

impl SourceLocation {
    /// The zero-width location at the start of `self`.
    pub fn start_point(self) -> Self {
        Self {
            end: self.start,
            ..self
        }
    }
}

// ---------------------------------------------------------------------------
// Fix-its
// ---------------------------------------------------------------------------

/// A mechanical source edit suggested alongside a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixIt {
    /// Delete the text covered by `range`.
    Remove { range: SourceLocation },
    /// Insert `text` at the start of `at`.
    Insert { at: SourceLocation, text: String },
}

// ---------------------------------------------------------------------------
// Diagnostic
// ---------------------------------------------------------------------------

/// A structured diagnostic message.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Stable diagnostic code (e.g. E0101).
    pub code: Option<String>,
    pub severity: Severity,
    pub category: Category,
    /// Primary message: what went wrong.
    pub message: String,
    /// Where it went wrong.
    pub location: Option<SourceLocation>,
    /// Additional labeled spans (e.g., "first listed here").
    pub labels: Vec<DiagLabel>,
    /// Suggested fix, if any.
    pub help: Option<String>,
    /// Mechanical edits that would resolve the problem.
    pub fix_its: Vec<FixIt>,
}

/// A labeled source span within a diagnostic.
#[derive(Debug, Clone)]
pub struct DiagLabel {
    pub location: SourceLocation,
    pub message: String,
}

impl Diagnostic {
    fn new(severity: Severity, category: Category, message: impl Into<String>) -> Self {
        Self {
            code: Some(category.code().to_string()),
            severity,
            category,
            message: message.into(),
            location: None,
            labels: Vec::new(),
            help: None,
            fix_its: Vec::new(),
        }
    }

    pub fn error(category: Category, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, category, message)
    }

    pub fn warning(category: Category, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, category, message)
    }

    /// A note attached to a preceding diagnostic. Notes carry no code.
    pub fn note(category: Category, message: impl Into<String>) -> Self {
        Self {
            code: None,
            ..Self::new(Severity::Note, category, message)
        }
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_label(mut self, location: SourceLocation, message: impl Into<String>) -> Self {
        self.labels.push(DiagLabel {
            location,
            message: message.into(),
        });
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn with_fix_it(mut self, fix_it: FixIt) -> Self {
        self.fix_its.push(fix_it);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
        };
        if let Some(code) = &self.code {
            write!(f, "{prefix}[{code}]: {}", self.message)?;
        } else {
            write!(f, "{prefix}: {}", self.message)?;
        }
        for label in &self.labels {
            write!(
                f,
                "\n  --> {}:{}..{}: {}",
                label.location.file_id, label.location.start, label.location.end, label.message
            )?;
        }
        for fix_it in &self.fix_its {
            match fix_it {
                FixIt::Remove { range } => {
                    write!(f, "\n  fix: remove {}..{}", range.start, range.end)?
                }
                FixIt::Insert { at, text } => write!(f, "\n  fix: insert `{text}` at {}", at.start)?,
            }
        }
        if let Some(help) = &self.help {
            write!(f, "\n  help: {help}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Error type for crates that produce diagnostics
// ---------------------------------------------------------------------------

/// Error type wrapping one or more diagnostics.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}", .0.first().map(|d| d.to_string()).unwrap_or_default())]
pub struct DiagnosticError(pub Vec<Diagnostic>);

impl DiagnosticError {
    pub fn single(diag: Diagnostic) -> Self {
        Self(vec![diag])
    }

    pub fn multiple(diags: Vec<Diagnostic>) -> Self {
        Self(diags)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.0
    }
}
