//! Declaration tree and source spans for Wren.
//!
//! This crate defines the declaration tree handed to the declaration checker.
//! Declarations live in a flat [`Module`] table and refer to each other by
//! [`DeclId`]; the enclosing scope is an upward id, never an owning pointer.
//! Slots the checker fills in (resolved types, inheritance, archetypes) start
//! out empty.

use wren_diag::SourceLocation;
use wren_types::{
    ArchetypeRef, ConformanceId, NominalKind, NominalType, Ownership, ProtocolRef, Type,
};

pub use wren_types::DeclId;

/// Identifies a source file in the compilation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub u32);

/// A byte offset range within a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Span {
    pub file: FileId,
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(file: FileId, start: u32, end: u32) -> Self {
        Self { file, start, end }
    }

    /// Create a span that covers both `self` and `other`.
    pub fn merge(self, other: Span) -> Span {
        debug_assert_eq!(
            self.file, other.file,
            "cannot merge spans from different files"
        );
        Span {
            file: self.file,
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// A synthetic span for compiler-generated nodes.
    pub fn synthetic() -> Self {
        Self {
            file: FileId(u32::MAX),
            start: 0,
            end: 0,
        }
    }

    pub fn is_synthetic(self) -> bool {
        self.file == FileId(u32::MAX)
    }

    pub fn location(self) -> SourceLocation {
        SourceLocation {
            file_id: self.file.0,
            start: self.start,
            end: self.end,
        }
    }
}

// ---------------------------------------------------------------------------
// Written type references
// ---------------------------------------------------------------------------

/// A type as written in source, before name lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeRepr {
    /// `Name` or `Name<Args>`.
    Named { name: String, args: Vec<TypeRepr> },
    /// `Base.Name`, e.g. an associated type of a generic parameter.
    Member { base: Box<TypeRepr>, name: String },
    Tuple(Vec<TupleReprElement>),
    Function {
        input: Box<TypeRepr>,
        result: Box<TypeRepr>,
    },
    /// `protocol<P, Q>`.
    Composition(Vec<TypeRepr>),
    Array { element: Box<TypeRepr>, size: u64 },
    /// A by-reference parameter type.
    InOut(Box<TypeRepr>),
    Metatype(Box<TypeRepr>),
    /// A type supplied by the compiler rather than written by the user.
    Resolved(Type),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TupleReprElement {
    pub name: Option<String>,
    pub repr: TypeRepr,
}

impl TypeRepr {
    pub fn named(name: impl Into<String>) -> Self {
        TypeRepr::Named {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn member(base: TypeRepr, name: impl Into<String>) -> Self {
        TypeRepr::Member {
            base: Box::new(base),
            name: name.into(),
        }
    }

    /// The dotted identifier path (`T.Element` → `["T", "Element"]`) for
    /// plain named references without generic arguments.
    pub fn identifier_path(&self) -> Option<Vec<String>> {
        match self {
            TypeRepr::Named { name, args } if args.is_empty() => Some(vec![name.clone()]),
            TypeRepr::Member { base, name } => {
                let mut path = base.identifier_path()?;
                path.push(name.clone());
                Some(path)
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for TypeRepr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeRepr::Named { name, args } => {
                write!(f, "{name}")?;
                if !args.is_empty() {
                    write!(f, "<")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{arg}")?;
                    }
                    write!(f, ">")?;
                }
                Ok(())
            }
            TypeRepr::Member { base, name } => write!(f, "{base}.{name}"),
            TypeRepr::Tuple(elems) => {
                write!(f, "(")?;
                for (i, elem) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    if let Some(name) = &elem.name {
                        write!(f, "{name}: ")?;
                    }
                    write!(f, "{}", elem.repr)?;
                }
                write!(f, ")")
            }
            TypeRepr::Function { input, result } => write!(f, "{input} -> {result}"),
            TypeRepr::Composition(protocols) => {
                write!(f, "protocol<")?;
                for (i, protocol) in protocols.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{protocol}")?;
                }
                write!(f, ">")
            }
            TypeRepr::Array { element, size } => write!(f, "{element}[{size}]"),
            TypeRepr::InOut(inner) => write!(f, "[byref] {inner}"),
            TypeRepr::Metatype(inner) => write!(f, "{inner}.metatype"),
            TypeRepr::Resolved(ty) => write!(f, "{ty}"),
        }
    }
}

/// A written type reference together with its resolution slot.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeLoc {
    pub repr: TypeRepr,
    pub span: Span,
    /// The resolved type, once validated.
    pub ty: Option<Type>,
    /// Set when validation failed; `ty` then holds the error type.
    pub invalid: bool,
}

impl TypeLoc {
    pub fn new(repr: TypeRepr, span: Span) -> Self {
        Self {
            repr,
            span,
            ty: None,
            invalid: false,
        }
    }

    /// A compiler-supplied, already resolved type with no source location.
    pub fn without_loc(ty: Type) -> Self {
        Self {
            repr: TypeRepr::Resolved(ty.clone()),
            span: Span::synthetic(),
            ty: Some(ty),
            invalid: false,
        }
    }

    pub fn set_invalid(&mut self) {
        self.ty = Some(Type::Error);
        self.invalid = true;
    }

    pub fn is_resolved(&self) -> bool {
        self.ty.is_some()
    }
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

/// The slice of the expression language this layer creates or forwards to
/// the expression checker.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    /// Set by the expression checker (or at synthesis time).
    pub ty: Option<Type>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    IntLiteral(i64),
    FloatLiteral(f64),
    /// Reference to a named value.
    NameRef(String),
    /// The all-zero value of the expression's type.
    ZeroValue,
    Tuple {
        elements: Vec<Expr>,
        names: Vec<Option<String>>,
    },
    Call { callee: Box<Expr>, arg: Box<Expr> },
    /// A reference to a type used as a value; the type is `Metatype(T)`.
    TypeRef,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self {
            kind,
            span,
            ty: None,
        }
    }

    pub fn zero_value(ty: Type) -> Self {
        Self {
            kind: ExprKind::ZeroValue,
            span: Span::synthetic(),
            ty: Some(ty),
        }
    }

    pub fn tuple(elements: Vec<Expr>, names: Vec<Option<String>>) -> Self {
        Self::new(ExprKind::Tuple { elements, names }, Span::synthetic())
    }

    /// `T()`: a call of `T`'s zero-argument constructor.
    pub fn construct(ty: Type) -> Self {
        let callee = Expr {
            kind: ExprKind::TypeRef,
            span: Span::synthetic(),
            ty: Some(Type::metatype(ty)),
        };
        Self::new(
            ExprKind::Call {
                callee: Box::new(callee),
                arg: Box::new(Expr::tuple(Vec::new(), Vec::new())),
            },
            Span::synthetic(),
        )
    }
}

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub kind: PatternKind,
    pub span: Span,
    /// Set by the pattern checker.
    pub ty: Option<Type>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatternKind {
    /// Binds the variable declaration `DeclId`.
    Named(DeclId),
    /// `_`.
    Any,
    Typed {
        sub: Box<Pattern>,
        annotation: TypeLoc,
    },
    Paren(Box<Pattern>),
    Tuple(Vec<TuplePatternElement>),
    /// `var` introducer.
    Var(Box<Pattern>),
    NominalType {
        sub: Box<Pattern>,
        annotation: TypeLoc,
    },
    EnumElement {
        name: String,
        sub: Option<Box<Pattern>>,
    },
    Isa(TypeLoc),
    Expr(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TuplePatternElement {
    pub pattern: Pattern,
    /// Default argument, for parameter tuples.
    pub default: Option<Expr>,
}

impl Pattern {
    pub fn new(kind: PatternKind, span: Span) -> Self {
        Self {
            kind,
            span,
            ty: None,
        }
    }

    pub fn named(var: DeclId, span: Span) -> Self {
        Self::new(PatternKind::Named(var), span)
    }

    pub fn typed(sub: Pattern, annotation: TypeLoc) -> Self {
        let span = sub.span;
        Self::new(
            PatternKind::Typed {
                sub: Box::new(sub),
                annotation,
            },
            span,
        )
    }

    pub fn tuple(elements: Vec<TuplePatternElement>, span: Span) -> Self {
        Self::new(PatternKind::Tuple(elements), span)
    }

    /// Look through parentheses and `var` introducers.
    pub fn semantics_providing(&self) -> &Pattern {
        match &self.kind {
            PatternKind::Paren(sub) | PatternKind::Var(sub) => sub.semantics_providing(),
            _ => self,
        }
    }

    pub fn is_typed(&self) -> bool {
        matches!(self.kind, PatternKind::Typed { .. })
    }

    /// The variable bound when the pattern is a single (possibly typed) name.
    pub fn single_var(&self) -> Option<DeclId> {
        match &self.semantics_providing().kind {
            PatternKind::Named(var) => Some(*var),
            PatternKind::Typed { sub, .. } => sub.single_var(),
            _ => None,
        }
    }

    /// Every variable bound by the pattern, left to right.
    pub fn collect_variables(&self, out: &mut Vec<DeclId>) {
        match &self.kind {
            PatternKind::Named(var) => out.push(*var),
            PatternKind::Typed { sub, .. }
            | PatternKind::NominalType { sub, .. }
            | PatternKind::Paren(sub)
            | PatternKind::Var(sub) => sub.collect_variables(out),
            PatternKind::Tuple(elements) => {
                for element in elements {
                    element.pattern.collect_variables(out);
                }
            }
            PatternKind::EnumElement { sub, .. } => {
                if let Some(sub) = sub {
                    sub.collect_variables(out);
                }
            }
            PatternKind::Any | PatternKind::Isa(_) | PatternKind::Expr(_) => {}
        }
    }

    /// Number of elements for tuple patterns (looking through parentheses),
    /// 1 for anything else.
    pub fn arity(&self) -> usize {
        match &self.semantics_providing().kind {
            PatternKind::Tuple(elements) => elements.len(),
            PatternKind::Typed { sub, .. } => sub.arity(),
            _ => 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

/// Attributes written on a declaration, e.g. `[interop, weak]`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeclAttributes {
    /// Location of the attribute list, when written.
    pub span: Option<Span>,
    pub interop: bool,
    pub ownership: Option<Ownership>,
    pub outlet: bool,
    pub action: bool,
    pub infix: bool,
    pub prefix: bool,
    pub postfix: bool,
    pub assignment: bool,
    pub conversion: bool,
    pub inline_always: bool,
    pub byref: bool,
    pub autoclosure: bool,
    pub interop_block: bool,
    pub class_protocol: bool,
    pub thin: bool,
    pub no_return: bool,
    pub calling_convention: Option<String>,
}

impl DeclAttributes {
    pub fn is_empty(&self) -> bool {
        *self
            == DeclAttributes {
                span: self.span,
                ..DeclAttributes::default()
            }
    }
}

// ---------------------------------------------------------------------------
// Generic parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum RequirementKind {
    /// `subject : constraint`.
    Conformance { subject: TypeLoc, constraint: TypeLoc },
    /// `first == second`.
    SameType { first: TypeLoc, second: TypeLoc },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Requirement {
    pub kind: RequirementKind,
    pub invalid: bool,
}

impl Requirement {
    pub fn conformance(subject: TypeLoc, constraint: TypeLoc) -> Self {
        Self {
            kind: RequirementKind::Conformance {
                subject,
                constraint,
            },
            invalid: false,
        }
    }

    pub fn same_type(first: TypeLoc, second: TypeLoc) -> Self {
        Self {
            kind: RequirementKind::SameType { first, second },
            invalid: false,
        }
    }
}

/// `<T : P, U where T.Element == U>`.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericParamList {
    /// Type-alias declarations flagged as generic parameters.
    pub params: Vec<DeclId>,
    pub requirements: Vec<Requirement>,
    pub where_span: Span,
    /// Owner of the enclosing generic parameter list, if any.
    pub outer: Option<DeclId>,
    /// Own archetypes followed by the outer list's.
    pub all_archetypes: Vec<ArchetypeRef>,
    /// Set once archetypes have been assigned.
    pub archetypes_assigned: bool,
}

impl GenericParamList {
    pub fn new(params: Vec<DeclId>, requirements: Vec<Requirement>, where_span: Span) -> Self {
        Self {
            params,
            requirements,
            where_span,
            outer: None,
            all_archetypes: Vec::new(),
            archetypes_assigned: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Inheritance
// ---------------------------------------------------------------------------

/// The written inheritance clause and what it resolved to.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InheritanceInfo {
    pub inherited: Vec<TypeLoc>,
    /// Set once the clause has been resolved, even if it resolved to nothing.
    pub resolved: bool,
    pub superclass: Option<Type>,
    /// Ordered by first occurrence, deduplicated.
    pub protocols: Vec<ProtocolRef>,
    /// Parallel to `protocols`. `None` inside means "conformance not known".
    pub conformances: Option<Vec<Option<ConformanceId>>>,
}

impl InheritanceInfo {
    pub fn new(inherited: Vec<TypeLoc>) -> Self {
        Self {
            inherited,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

/// The enclosing scope of a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclContext {
    Module,
    Decl(DeclId),
}

/// Translation unit flavour; selects how module-scope bindings are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnitKind {
    #[default]
    Library,
    /// A script-like unit whose module-scope bindings run in order.
    Main,
    Sil,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decl {
    pub kind: DeclKind,
    pub span: Span,
    pub context: DeclContext,
    /// The resolved type, once checked.
    pub ty: Option<Type>,
    pub attrs: DeclAttributes,
    pub invalid: bool,
    /// Synthesized by the checker.
    pub implicit: bool,
    /// Requires native interop.
    pub interop: bool,
    /// Set once attribute validation ran.
    pub attrs_validated: bool,
}

impl Decl {
    pub fn new(kind: DeclKind, span: Span, context: DeclContext) -> Self {
        Self {
            kind,
            span,
            context,
            ty: None,
            attrs: DeclAttributes::default(),
            invalid: false,
            implicit: false,
            interop: false,
            attrs_validated: false,
        }
    }

    pub fn with_attrs(mut self, attrs: DeclAttributes) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            DeclKind::Var(var) => Some(&var.name),
            DeclKind::Func(func) => Some(&func.name),
            DeclKind::TypeAlias(alias) => Some(&alias.name),
            DeclKind::Struct(nominal)
            | DeclKind::Class(nominal)
            | DeclKind::Enum(nominal)
            | DeclKind::Protocol(nominal) => Some(&nominal.name),
            DeclKind::EnumCase(case) => Some(&case.name),
            DeclKind::Constructor(_) => Some("constructor"),
            DeclKind::Destructor(_) => Some("destructor"),
            DeclKind::Subscript(_) => Some("subscript"),
            DeclKind::Import(_)
            | DeclKind::PatternBinding(_)
            | DeclKind::Extension(_)
            | DeclKind::TopLevelCode => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            DeclKind::Import(_) => "import",
            DeclKind::PatternBinding(_) => "pattern_binding",
            DeclKind::Var(_) => "var",
            DeclKind::Func(_) => "func",
            DeclKind::Constructor(_) => "constructor",
            DeclKind::Destructor(_) => "destructor",
            DeclKind::Subscript(_) => "subscript",
            DeclKind::TypeAlias(_) => "typealias",
            DeclKind::Struct(_) => "struct",
            DeclKind::Class(_) => "class",
            DeclKind::Enum(_) => "enum",
            DeclKind::EnumCase(_) => "enum_case",
            DeclKind::Protocol(_) => "protocol",
            DeclKind::Extension(_) => "extension",
            DeclKind::TopLevelCode => "top_level_code",
        }
    }

    /// Whether this is a value declaration (one that attributes apply to).
    pub fn is_value(&self) -> bool {
        !matches!(
            self.kind,
            DeclKind::Import(_)
                | DeclKind::PatternBinding(_)
                | DeclKind::Extension(_)
                | DeclKind::TopLevelCode
        )
    }

    /// Operator functions and variables are named with operator characters.
    pub fn is_operator(&self) -> bool {
        self.name().is_some_and(is_operator_name)
    }

    pub fn is_static(&self) -> bool {
        match &self.kind {
            DeclKind::Func(func) => func.is_static,
            DeclKind::Var(var) => var.is_static,
            _ => false,
        }
    }

    pub fn nominal(&self) -> Option<&NominalDecl> {
        match &self.kind {
            DeclKind::Struct(nominal)
            | DeclKind::Class(nominal)
            | DeclKind::Enum(nominal)
            | DeclKind::Protocol(nominal) => Some(nominal),
            _ => None,
        }
    }

    pub fn nominal_mut(&mut self) -> Option<&mut NominalDecl> {
        match &mut self.kind {
            DeclKind::Struct(nominal)
            | DeclKind::Class(nominal)
            | DeclKind::Enum(nominal)
            | DeclKind::Protocol(nominal) => Some(nominal),
            _ => None,
        }
    }

    /// Struct, class, or enum flavour; `None` for protocols and non-nominals.
    pub fn nominal_kind(&self) -> Option<NominalKind> {
        match &self.kind {
            DeclKind::Struct(_) => Some(NominalKind::Struct),
            DeclKind::Class(_) => Some(NominalKind::Class),
            DeclKind::Enum(_) => Some(NominalKind::Enum),
            _ => None,
        }
    }

    pub fn members(&self) -> &[DeclId] {
        match &self.kind {
            DeclKind::Extension(ext) => &ext.members,
            _ => self.nominal().map_or(&[], |nominal| &nominal.members),
        }
    }

    pub fn inheritance(&self) -> Option<&InheritanceInfo> {
        match &self.kind {
            DeclKind::TypeAlias(alias) => Some(&alias.inheritance),
            DeclKind::Extension(ext) => Some(&ext.inheritance),
            _ => self.nominal().map(|nominal| &nominal.inheritance),
        }
    }

    pub fn inheritance_mut(&mut self) -> Option<&mut InheritanceInfo> {
        match &mut self.kind {
            DeclKind::TypeAlias(alias) => Some(&mut alias.inheritance),
            DeclKind::Extension(ext) => Some(&mut ext.inheritance),
            DeclKind::Struct(nominal)
            | DeclKind::Class(nominal)
            | DeclKind::Enum(nominal)
            | DeclKind::Protocol(nominal) => Some(&mut nominal.inheritance),
            _ => None,
        }
    }

    pub fn generic_params(&self) -> Option<&GenericParamList> {
        match &self.kind {
            DeclKind::Func(func) => func.generic_params.as_ref(),
            DeclKind::Constructor(ctor) => ctor.generic_params.as_ref(),
            _ => self
                .nominal()
                .and_then(|nominal| nominal.generic_params.as_ref()),
        }
    }

    pub fn generic_params_mut(&mut self) -> Option<&mut GenericParamList> {
        match &mut self.kind {
            DeclKind::Func(func) => func.generic_params.as_mut(),
            DeclKind::Constructor(ctor) => ctor.generic_params.as_mut(),
            DeclKind::Struct(nominal)
            | DeclKind::Class(nominal)
            | DeclKind::Enum(nominal)
            | DeclKind::Protocol(nominal) => nominal.generic_params.as_mut(),
            _ => None,
        }
    }

    pub fn type_alias(&self) -> Option<&TypeAliasDecl> {
        match &self.kind {
            DeclKind::TypeAlias(alias) => Some(alias),
            _ => None,
        }
    }
}

/// Characters that make up operator names.
pub fn is_operator_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| "/=-+*%<>!&|^~.?".contains(c))
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeclKind {
    Import(ImportDecl),
    PatternBinding(PatternBindingDecl),
    Var(VarDecl),
    Func(FuncDecl),
    Constructor(ConstructorDecl),
    Destructor(DestructorDecl),
    Subscript(SubscriptDecl),
    TypeAlias(TypeAliasDecl),
    Struct(NominalDecl),
    Class(NominalDecl),
    Enum(NominalDecl),
    EnumCase(EnumCaseDecl),
    Protocol(NominalDecl),
    Extension(ExtensionDecl),
    /// Statements at module scope; checked by the driver, never by the
    /// declaration checker.
    TopLevelCode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    pub path: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternBindingDecl {
    pub pattern: Pattern,
    pub init: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub name: String,
    /// Computed properties have accessors instead of storage.
    pub computed: bool,
    pub is_static: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncDecl {
    pub name: String,
    pub generic_params: Option<GenericParamList>,
    /// Curried parameter clauses. Methods start with the implicit receiver.
    pub arg_patterns: Vec<Pattern>,
    pub result: Option<TypeLoc>,
    pub is_static: bool,
    /// The property this function is a getter or setter of.
    pub accessor_for: Option<DeclId>,
}

/// Which implicit constructor the checker synthesized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImplicitConstructorKind {
    /// Default-initializes every stored field.
    Default,
    /// One parameter per stored field.
    Memberwise,
}

/// An (empty, for synthesized constructors) statement body.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BraceStmt {
    pub elements: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstructorDecl {
    pub generic_params: Option<GenericParamList>,
    pub arguments: Pattern,
    /// Type of the implicit `self` parameter.
    pub self_type: Option<Type>,
    /// `Self -> Args -> Self`; the declaration type is the allocating form.
    pub initializer_type: Option<Type>,
    pub implicit_kind: Option<ImplicitConstructorKind>,
    pub body: Option<BraceStmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DestructorDecl {
    pub self_type: Option<Type>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptDecl {
    pub indices: Pattern,
    pub element: TypeLoc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeAliasDecl {
    pub name: String,
    /// For generic parameters and associated types, the archetype.
    pub underlying: TypeLoc,
    pub generic_param: bool,
    pub inheritance: InheritanceInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumCaseDecl {
    pub name: String,
    pub argument: Option<TypeLoc>,
    pub result: Option<TypeLoc>,
}

/// Shared shape of struct, class, enum, and protocol declarations.
#[derive(Debug, Clone, PartialEq)]
pub struct NominalDecl {
    pub name: String,
    pub generic_params: Option<GenericParamList>,
    pub inheritance: InheritanceInfo,
    pub members: Vec<DeclId>,
    /// Extensions registered against this declaration.
    pub extensions: Vec<DeclId>,
    /// Declared in a foreign module and imported.
    pub imported: bool,
    /// The canonical declared type in context, once checked.
    pub declared_type_in_context: Option<Type>,
    /// Set once implicit constructors have been considered.
    pub implicit_constructors_added: bool,
}

impl NominalDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            generic_params: None,
            inheritance: InheritanceInfo::default(),
            members: Vec::new(),
            extensions: Vec::new(),
            imported: false,
            declared_type_in_context: None,
            implicit_constructors_added: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionDecl {
    pub extended: TypeLoc,
    pub inheritance: InheritanceInfo,
    pub members: Vec<DeclId>,
}

// ---------------------------------------------------------------------------
// Module
// ---------------------------------------------------------------------------

/// A translation unit: the flat declaration table plus top-level order.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub name: String,
    pub kind: UnitKind,
    decls: Vec<Decl>,
    pub top_level: Vec<DeclId>,
}

impl Module {
    pub fn new(name: impl Into<String>, kind: UnitKind) -> Self {
        Self {
            name: name.into(),
            kind,
            decls: Vec::new(),
            top_level: Vec::new(),
        }
    }

    pub fn add_decl(&mut self, decl: Decl) -> DeclId {
        let id = DeclId(self.decls.len() as u32);
        self.decls.push(decl);
        id
    }

    pub fn decl(&self, id: DeclId) -> &Decl {
        &self.decls[id.index()]
    }

    pub fn decl_mut(&mut self, id: DeclId) -> &mut Decl {
        &mut self.decls[id.index()]
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    pub fn decl_ids(&self) -> impl Iterator<Item = DeclId> {
        (0..self.decls.len() as u32).map(DeclId)
    }

    pub fn is_module_context(&self, context: DeclContext) -> bool {
        matches!(context, DeclContext::Module)
    }

    /// Nominal types, protocols, and extensions are type contexts.
    pub fn is_type_context(&self, context: DeclContext) -> bool {
        match context {
            DeclContext::Module => false,
            DeclContext::Decl(id) => {
                let decl = self.decl(id);
                decl.nominal().is_some() || matches!(decl.kind, DeclKind::Extension(_))
            }
        }
    }

    /// The nominal declaration a type context extends or declares.
    pub fn nominal_of_context(&self, context: DeclContext) -> Option<DeclId> {
        let DeclContext::Decl(id) = context else {
            return None;
        };
        let decl = self.decl(id);
        match &decl.kind {
            DeclKind::Extension(ext) => ext.extended.ty.as_ref().and_then(Type::any_nominal),
            _ if decl.nominal().is_some() => Some(id),
            _ => None,
        }
    }

    /// The class declaration a member's context belongs to, if any.
    pub fn class_of_context(&self, context: DeclContext) -> Option<DeclId> {
        self.nominal_of_context(context)
            .filter(|nominal| matches!(self.decl(*nominal).kind, DeclKind::Class(_)))
    }

    /// Owner of the innermost generic parameter list visible from `context`.
    pub fn generic_params_of_context(&self, context: DeclContext) -> Option<DeclId> {
        let mut current = context;
        while let DeclContext::Decl(id) = current {
            let decl = self.decl(id);
            if decl.generic_params().is_some() {
                return Some(id);
            }
            if let DeclKind::Extension(_) = decl.kind {
                if let Some(nominal) = self.nominal_of_context(current) {
                    return self.generic_params_of_context(DeclContext::Decl(nominal));
                }
                return None;
            }
            current = decl.context;
        }
        None
    }

    /// The declared type of a nominal, as seen from outside it: unbound for
    /// generic declarations.
    pub fn declared_type(&self, id: DeclId) -> Option<Type> {
        let decl = self.decl(id);
        let nominal = decl.nominal()?;
        if let DeclKind::Protocol(_) = decl.kind {
            return Some(Type::Protocol(ProtocolRef::new(id, nominal.name.clone())));
        }
        let kind = decl.nominal_kind()?;
        if nominal.generic_params.is_some() {
            return Some(Type::UnboundGeneric {
                kind,
                decl: id,
                name: nominal.name.clone(),
            });
        }
        Some(Type::Nominal(NominalType {
            kind,
            decl: id,
            name: nominal.name.clone(),
            args: Vec::new(),
        }))
    }

    /// The declared type as seen from inside the declaration: generic
    /// parameters are replaced by their archetypes, and a protocol's type is
    /// its `Self` archetype.
    pub fn declared_type_in_context(&self, id: DeclId) -> Option<Type> {
        let decl = self.decl(id);
        let nominal = decl.nominal()?;
        if let Some(ty) = &nominal.declared_type_in_context {
            return Some(ty.clone());
        }
        if let DeclKind::Protocol(_) = decl.kind {
            return self
                .protocol_self_decl(id)
                .and_then(|self_decl| self.decl(self_decl).type_alias())
                .and_then(|alias| alias.underlying.ty.clone());
        }
        let kind = decl.nominal_kind()?;
        let mut args = Vec::new();
        if let Some(params) = &nominal.generic_params {
            for param in &params.params {
                let arg = self
                    .decl(*param)
                    .type_alias()
                    .and_then(|alias| alias.underlying.ty.clone())
                    .unwrap_or(Type::Error);
                args.push(arg);
            }
        }
        Some(Type::Nominal(NominalType {
            kind,
            decl: id,
            name: nominal.name.clone(),
            args,
        }))
    }

    /// The `Self` associated type of a protocol.
    pub fn protocol_self_decl(&self, protocol: DeclId) -> Option<DeclId> {
        self.decl(protocol).members().iter().copied().find(|member| {
            self.decl(*member)
                .type_alias()
                .is_some_and(|alias| alias.name == "Self")
        })
    }

    /// Members of a nominal plus the members of its registered extensions.
    pub fn all_members(&self, nominal: DeclId) -> Vec<DeclId> {
        let decl = self.decl(nominal);
        let mut members = decl.members().to_vec();
        if let Some(info) = decl.nominal() {
            for ext in &info.extensions {
                members.extend_from_slice(self.decl(*ext).members());
            }
        }
        members
    }

    /// Look up a module-scope declaration by name.
    pub fn lookup_top_level(&self, name: &str) -> Option<DeclId> {
        self.top_level
            .iter()
            .copied()
            .find(|id| self.decl(*id).name() == Some(name))
    }
}
