//! Collaborator interfaces consumed by the declaration checker.
//!
//! Type validation, pattern and expression checking, conformance checking,
//! and constructor lookup live outside the declaration checker. The checker
//! reaches them through the traits below, handing each a read-only
//! [`ServiceView`] of the session. Failures come back as a [`Diagnostic`];
//! the checker decides what to poison and whether to keep going.
//!
//! [`ScopeServices`] is a small lexical-scope implementation of every
//! service. It is what the driver uses by default.

use std::collections::BTreeSet;

use wren_ast::{
    DeclContext, DeclKind, Expr, ExprKind, Module, Pattern, PatternKind, Span, TypeLoc, TypeRepr,
};
use wren_diag::{Category, Diagnostic, SourceLocation};
use wren_types::{
    ArchetypeId, ArchetypeTable, BuiltinType, Conformance, ConformanceTable, DeclId, NominalType,
    ProtocolRef, TupleElement, Type, Witness,
};

/// Read-only view of the session handed to every service call.
#[derive(Clone, Copy)]
pub struct ServiceView<'a> {
    pub module: &'a Module,
    pub archetypes: &'a ArchetypeTable,
    pub conformances: &'a ConformanceTable,
}

/// Name lookup and generic substitution for written types.
pub trait TypeValidator {
    /// Resolve `loc` in `scope`, filling in `loc.ty` on success. Already
    /// resolved locations are left alone.
    fn validate_type(
        &self,
        view: &ServiceView<'_>,
        scope: DeclContext,
        loc: &mut TypeLoc,
    ) -> Result<(), Diagnostic>;
}

pub trait PatternChecker {
    /// Assign types to `pattern` and its sub-patterns from their annotations.
    ///
    /// With `allow_unknown`, unannotated names are left untyped instead of
    /// being rejected.
    fn type_check_pattern(
        &self,
        view: &ServiceView<'_>,
        pattern: &mut Pattern,
        scope: DeclContext,
        allow_unknown: bool,
    ) -> Result<(), Diagnostic>;

    /// Push `ty` down into an (untyped or compatibly typed) pattern.
    fn coerce_pattern_to_type(
        &self,
        view: &ServiceView<'_>,
        pattern: &mut Pattern,
        scope: DeclContext,
        ty: &Type,
    ) -> Result<(), Diagnostic>;
}

pub trait ExprChecker {
    /// Type-check `expr`, converting to `expected` when given. May rewrite
    /// the expression.
    fn type_check_expr(
        &self,
        view: &ServiceView<'_>,
        expr: &mut Expr,
        scope: DeclContext,
        expected: Option<&Type>,
    ) -> Result<(), Diagnostic>;
}

pub trait ConformanceChecker {
    /// Produce the witness record proving `ty` conforms to `protocol`.
    fn conforms_to_protocol(
        &self,
        view: &ServiceView<'_>,
        ty: &Type,
        protocol: &ProtocolRef,
        scope: DeclContext,
    ) -> Result<Conformance, Diagnostic>;
}

pub trait ConstructorLookup {
    /// Constructors reachable on `ty`, or `None` when `ty` has no
    /// constructors to look up.
    fn lookup_constructors(&self, view: &ServiceView<'_>, ty: &Type) -> Option<Vec<DeclId>>;
}

/// Everything the declaration checker needs from the outside.
pub trait Services:
    TypeValidator + PatternChecker + ExprChecker + ConformanceChecker + ConstructorLookup
{
}

impl<T> Services for T where
    T: TypeValidator + PatternChecker + ExprChecker + ConformanceChecker + ConstructorLookup
{
}

// ---------------------------------------------------------------------------
// Lexical-scope implementation
// ---------------------------------------------------------------------------

/// Services backed by lexical lookup over the module's declaration table.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScopeServices;

const MAX_ALIAS_DEPTH: usize = 32;

fn builtin_named(name: &str) -> Option<BuiltinType> {
    let builtin = match name {
        "Int" | "Int64" => BuiltinType::Int(64),
        "Int32" => BuiltinType::Int(32),
        "Int16" => BuiltinType::Int(16),
        "Int8" => BuiltinType::Int(8),
        "Bool" => BuiltinType::Int(1),
        "Float" => BuiltinType::Float(32),
        "Double" => BuiltinType::Float(64),
        "RawPointer" => BuiltinType::RawPointer,
        "ObjectPointer" => BuiltinType::ObjectPointer,
        "InteropPointer" => BuiltinType::InteropPointer,
        _ => return None,
    };
    Some(builtin)
}

fn is_type_decl(module: &Module, id: DeclId) -> bool {
    let decl = module.decl(id);
    decl.nominal().is_some() || decl.type_alias().is_some()
}

fn member_type_decl(module: &Module, owner: DeclId, name: &str) -> Option<DeclId> {
    module
        .decl(owner)
        .members()
        .iter()
        .copied()
        .find(|member| is_type_decl(module, *member) && module.decl(*member).name() == Some(name))
}

fn lookup_in_decl(module: &Module, id: DeclId, name: &str) -> Option<DeclId> {
    let decl = module.decl(id);
    if let Some(params) = decl.generic_params() {
        let param = params
            .params
            .iter()
            .copied()
            .find(|param| module.decl(*param).name() == Some(name));
        if param.is_some() {
            return param;
        }
    }
    if let Some(member) = member_type_decl(module, id, name) {
        return Some(member);
    }
    if let DeclKind::Extension(_) = decl.kind {
        let nominal = module.nominal_of_context(DeclContext::Decl(id))?;
        return lookup_in_decl(module, nominal, name);
    }
    None
}

fn lookup_type_decl(module: &Module, scope: DeclContext, name: &str) -> Option<DeclId> {
    let mut current = scope;
    while let DeclContext::Decl(id) = current {
        if let Some(found) = lookup_in_decl(module, id, name) {
            return Some(found);
        }
        current = module.decl(id).context;
    }
    module
        .top_level
        .iter()
        .copied()
        .find(|id| is_type_decl(module, *id) && module.decl(*id).name() == Some(name))
}

fn type_of_decl(
    view: &ServiceView<'_>,
    id: DeclId,
    args: Vec<Type>,
    depth: usize,
) -> Result<Type, String> {
    let decl = view.module.decl(id);
    if let Some(alias) = decl.type_alias() {
        if !args.is_empty() {
            return Err(format!("type alias `{}` takes no generic arguments", alias.name));
        }
        let in_protocol = matches!(
            decl.context,
            DeclContext::Decl(owner) if matches!(view.module.decl(owner).kind, DeclKind::Protocol(_))
        );
        let underlying = match &alias.underlying.ty {
            Some(ty) => ty.clone(),
            None if alias.generic_param || in_protocol => {
                return Err(format!(
                    "type `{}` is used before its archetype is assigned",
                    alias.name
                ));
            }
            None => resolve_repr(view, decl.context, &alias.underlying.repr, depth + 1)?,
        };
        return Ok(Type::Alias {
            decl: id,
            name: alias.name.clone(),
            underlying: Box::new(underlying),
        });
    }

    let declared = view
        .module
        .declared_type(id)
        .ok_or_else(|| format!("`{}` is not a type", decl.name().unwrap_or("_")))?;
    if args.is_empty() {
        return Ok(declared);
    }
    match declared {
        Type::UnboundGeneric { kind, decl: generic, name } => {
            let expected = decl.generic_params().map_or(0, |params| params.params.len());
            if expected != args.len() {
                return Err(format!(
                    "`{name}` expects {expected} generic argument(s), found {}",
                    args.len()
                ));
            }
            Ok(Type::Nominal(NominalType {
                kind,
                decl: generic,
                name,
                args,
            }))
        }
        other => Err(format!("`{other}` is not generic")),
    }
}

fn resolve_repr(
    view: &ServiceView<'_>,
    scope: DeclContext,
    repr: &TypeRepr,
    depth: usize,
) -> Result<Type, String> {
    if depth > MAX_ALIAS_DEPTH {
        return Err("type alias refers to itself".to_string());
    }
    match repr {
        TypeRepr::Named { name, args } => {
            let args = args
                .iter()
                .map(|arg| resolve_repr(view, scope, arg, depth))
                .collect::<Result<Vec<_>, _>>()?;
            if let Some(found) = lookup_type_decl(view.module, scope, name) {
                return type_of_decl(view, found, args, depth);
            }
            if args.is_empty() {
                if let Some(builtin) = builtin_named(name) {
                    return Ok(Type::Builtin(builtin));
                }
            }
            Err(format!("cannot find type `{name}` in scope"))
        }
        TypeRepr::Member { base, name } => {
            let base_ty = resolve_repr(view, scope, base, depth)?;
            if let Some(archetype) = base_ty.archetype() {
                return view
                    .archetypes
                    .nested_type(archetype.id, name)
                    .map(Type::Archetype)
                    .ok_or_else(|| format!("`{base_ty}` has no associated type `{name}`"));
            }
            if let Some(owner) = base_ty.any_nominal() {
                if let Some(member) = member_type_decl(view.module, owner, name) {
                    return type_of_decl(view, member, Vec::new(), depth);
                }
            }
            Err(format!("`{base_ty}` has no member type `{name}`"))
        }
        TypeRepr::Tuple(elems) => {
            let mut resolved = Vec::with_capacity(elems.len());
            for elem in elems {
                resolved.push(TupleElement {
                    name: elem.name.clone(),
                    ty: resolve_repr(view, scope, &elem.repr, depth)?,
                    has_default: false,
                });
            }
            Ok(Type::Tuple(resolved))
        }
        TypeRepr::Function { input, result } => Ok(Type::function(
            resolve_repr(view, scope, input, depth)?,
            resolve_repr(view, scope, result, depth)?,
        )),
        TypeRepr::Composition(reprs) => {
            let mut protocols: Vec<ProtocolRef> = Vec::new();
            for repr in reprs {
                let ty = resolve_repr(view, scope, repr, depth)?;
                let Some(found) = ty.existential_protocols() else {
                    return Err(format!(
                        "non-protocol type `{ty}` cannot be used within `protocol<...>`"
                    ));
                };
                for protocol in found {
                    if !protocols.contains(&protocol) {
                        protocols.push(protocol);
                    }
                }
            }
            Ok(Type::Composition(protocols).canonical())
        }
        TypeRepr::Array { element, size } => Ok(Type::Array {
            element: Box::new(resolve_repr(view, scope, element, depth)?),
            size: *size,
        }),
        TypeRepr::InOut(inner) => Ok(Type::LValue(Box::new(resolve_repr(
            view, scope, inner, depth,
        )?))),
        TypeRepr::Metatype(inner) => Ok(Type::metatype(resolve_repr(view, scope, inner, depth)?)),
        TypeRepr::Resolved(ty) => Ok(ty.clone()),
    }
}

fn scope_location(view: &ServiceView<'_>, scope: DeclContext) -> Option<SourceLocation> {
    match scope {
        DeclContext::Decl(id) => Some(view.module.decl(id).span.location()),
        DeclContext::Module => None,
    }
}

fn with_location(diag: Diagnostic, location: Option<SourceLocation>) -> Diagnostic {
    match location {
        Some(location) => diag.at(location),
        None => diag,
    }
}

impl TypeValidator for ScopeServices {
    fn validate_type(
        &self,
        view: &ServiceView<'_>,
        scope: DeclContext,
        loc: &mut TypeLoc,
    ) -> Result<(), Diagnostic> {
        if loc.ty.is_some() {
            return Ok(());
        }
        let ty = resolve_repr(view, scope, &loc.repr, 0).map_err(|message| {
            Diagnostic::error(Category::UnresolvedType, message).at(loc.span.location())
        })?;
        loc.ty = Some(ty);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

fn refutable_pattern(span: Span) -> Diagnostic {
    Diagnostic::error(
        Category::TypeError,
        "refutable pattern cannot appear in a declaration",
    )
    .at(span.location())
}

fn element_name(view: &ServiceView<'_>, pattern: &Pattern) -> Option<String> {
    pattern
        .single_var()
        .and_then(|var| view.module.decl(var).name())
        .map(str::to_string)
}

/// Give every still-untyped node the error type.
fn poison_pattern(pattern: &mut Pattern) {
    if pattern.ty.is_none() {
        pattern.ty = Some(Type::Error);
    }
    match &mut pattern.kind {
        PatternKind::Typed { sub, .. }
        | PatternKind::NominalType { sub, .. }
        | PatternKind::Paren(sub)
        | PatternKind::Var(sub) => poison_pattern(sub),
        PatternKind::Tuple(elements) => {
            for element in elements {
                poison_pattern(&mut element.pattern);
            }
        }
        PatternKind::EnumElement { sub: Some(sub), .. } => poison_pattern(sub),
        PatternKind::EnumElement { sub: None, .. }
        | PatternKind::Named(_)
        | PatternKind::Any
        | PatternKind::Isa(_)
        | PatternKind::Expr(_) => {}
    }
}

impl ScopeServices {
    fn check_pattern(
        &self,
        view: &ServiceView<'_>,
        pattern: &mut Pattern,
        scope: DeclContext,
        allow_unknown: bool,
    ) -> Result<(), Diagnostic> {
        let span = pattern.span;
        let ty = match &mut pattern.kind {
            PatternKind::Named(_) | PatternKind::Any => {
                if !allow_unknown {
                    return Err(Diagnostic::error(
                        Category::TypeError,
                        "pattern needs a type annotation",
                    )
                    .at(span.location()));
                }
                None
            }
            PatternKind::Typed { sub, annotation } => {
                if let Err(diag) = self.validate_type(view, scope, annotation) {
                    annotation.set_invalid();
                    return Err(diag);
                }
                let ty = annotation.ty.clone().unwrap_or(Type::Error);
                self.coerce_pattern_to_type(view, sub, scope, &ty)?;
                Some(ty)
            }
            PatternKind::Paren(sub) | PatternKind::Var(sub) => {
                self.check_pattern(view, sub, scope, allow_unknown)?;
                sub.ty.clone()
            }
            PatternKind::Tuple(elements) => {
                let mut first_error = None;
                let mut fields = Some(Vec::with_capacity(elements.len()));
                for element in elements.iter_mut() {
                    if let Err(diag) =
                        self.check_pattern(view, &mut element.pattern, scope, allow_unknown)
                    {
                        first_error.get_or_insert(diag);
                    }
                    match element.pattern.ty.clone() {
                        Some(ty) => {
                            if let Some(fields) = fields.as_mut() {
                                fields.push(TupleElement {
                                    name: element_name(view, &element.pattern),
                                    ty,
                                    has_default: element.default.is_some(),
                                });
                            }
                        }
                        None => fields = None,
                    }
                }
                if let Some(diag) = first_error {
                    return Err(diag);
                }
                fields.map(Type::Tuple)
            }
            PatternKind::NominalType { .. }
            | PatternKind::EnumElement { .. }
            | PatternKind::Isa(_)
            | PatternKind::Expr(_) => return Err(refutable_pattern(span)),
        };
        pattern.ty = ty;
        Ok(())
    }
}

impl PatternChecker for ScopeServices {
    fn type_check_pattern(
        &self,
        view: &ServiceView<'_>,
        pattern: &mut Pattern,
        scope: DeclContext,
        allow_unknown: bool,
    ) -> Result<(), Diagnostic> {
        self.check_pattern(view, pattern, scope, allow_unknown)
            .inspect_err(|_| poison_pattern(pattern))
    }

    fn coerce_pattern_to_type(
        &self,
        view: &ServiceView<'_>,
        pattern: &mut Pattern,
        scope: DeclContext,
        ty: &Type,
    ) -> Result<(), Diagnostic> {
        let span = pattern.span;
        match &mut pattern.kind {
            PatternKind::Named(_) | PatternKind::Any => {}
            PatternKind::Typed { sub, annotation } => {
                if let Err(diag) = self.validate_type(view, scope, annotation) {
                    annotation.set_invalid();
                    return Err(diag);
                }
                let written = annotation.ty.clone().unwrap_or(Type::Error);
                if !types_compatible(&written, ty) {
                    return Err(Diagnostic::error(
                        Category::InitializerMismatch,
                        format!("pattern of type `{written}` cannot match a value of type `{ty}`"),
                    )
                    .at(span.location()));
                }
                self.coerce_pattern_to_type(view, sub, scope, &written)?;
                pattern.ty = Some(written);
                return Ok(());
            }
            PatternKind::Paren(sub) | PatternKind::Var(sub) => {
                self.coerce_pattern_to_type(view, sub, scope, ty)?;
            }
            PatternKind::Tuple(elements) => {
                if ty.is_error() {
                    for element in elements.iter_mut() {
                        self.coerce_pattern_to_type(view, &mut element.pattern, scope, ty)?;
                    }
                } else {
                    let fields = ty
                        .tuple_elements()
                        .filter(|fields| fields.len() == elements.len())
                        .ok_or_else(|| {
                            Diagnostic::error(
                                Category::InitializerMismatch,
                                format!(
                                    "tuple pattern of {} elements cannot match `{ty}`",
                                    elements.len()
                                ),
                            )
                            .at(span.location())
                        })?;
                    for (element, field) in elements.iter_mut().zip(fields) {
                        self.coerce_pattern_to_type(view, &mut element.pattern, scope, &field.ty)?;
                    }
                }
            }
            PatternKind::NominalType { .. }
            | PatternKind::EnumElement { .. }
            | PatternKind::Isa(_)
            | PatternKind::Expr(_) => return Err(refutable_pattern(span)),
        }
        pattern.ty = Some(ty.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

/// Whether a value of type `actual` can initialize storage of type `expected`.
fn types_compatible(expected: &Type, actual: &Type) -> bool {
    let expected = expected.canonical();
    let actual = actual.canonical();
    if expected == actual || matches!(expected, Type::Error) || matches!(actual, Type::Error) {
        return true;
    }
    match (&expected, &actual) {
        (Type::ReferenceStorage { referent, .. }, _) | (Type::LValue(referent), _) => {
            types_compatible(referent, &actual)
        }
        (_, Type::LValue(inner)) => types_compatible(&expected, inner),
        _ => false,
    }
}

fn constructor_is_nullary(module: &Module, ctor: DeclId) -> bool {
    let DeclKind::Constructor(ctor) = &module.decl(ctor).kind else {
        return false;
    };
    ctor.arguments
        .ty
        .as_ref()
        .and_then(Type::tuple_elements)
        .is_some_and(|fields| fields.iter().all(|field| field.has_default))
}

fn mismatch(actual: &Type, expected: &Type, expr: &Expr) -> Diagnostic {
    Diagnostic::error(
        Category::InitializerMismatch,
        format!("cannot convert value of type `{actual}` to `{expected}`"),
    )
    .at(expr.span.location())
}

impl ScopeServices {
    fn infer_expr(
        &self,
        view: &ServiceView<'_>,
        expr: &mut Expr,
        scope: DeclContext,
        expected: Option<&Type>,
    ) -> Result<Type, Diagnostic> {
        let span = expr.span;
        match &mut expr.kind {
            ExprKind::IntLiteral(_) => Ok(match expected.map(Type::canonical) {
                Some(ty @ Type::Builtin(BuiltinType::Int(_) | BuiltinType::Float(_))) => ty,
                _ => Type::Builtin(BuiltinType::Int(64)),
            }),
            ExprKind::FloatLiteral(_) => Ok(match expected.map(Type::canonical) {
                Some(ty @ Type::Builtin(BuiltinType::Float(_))) => ty,
                _ => Type::Builtin(BuiltinType::Float(64)),
            }),
            ExprKind::NameRef(name) => {
                let found = view.module.decl_ids().find(|id| {
                    let decl = view.module.decl(*id);
                    matches!(&decl.kind, DeclKind::Var(var) if var.name == *name)
                        && (decl.context == scope || decl.context == DeclContext::Module)
                });
                let Some(found) = found else {
                    return Err(Diagnostic::error(
                        Category::TypeError,
                        format!("cannot find `{name}` in scope"),
                    )
                    .at(span.location()));
                };
                view.module.decl(found).ty.clone().ok_or_else(|| {
                    Diagnostic::error(
                        Category::TypeError,
                        format!("`{name}` is used before its type is known"),
                    )
                    .at(span.location())
                })
            }
            ExprKind::ZeroValue | ExprKind::TypeRef => expr.ty.clone().ok_or_else(|| {
                Diagnostic::error(Category::TypeError, "expression has no type").at(span.location())
            }),
            ExprKind::Tuple { elements, names } => {
                let expected_fields = expected
                    .and_then(Type::tuple_elements)
                    .filter(|fields| fields.len() == elements.len());
                let mut fields = Vec::with_capacity(elements.len());
                for (i, element) in elements.iter_mut().enumerate() {
                    let field_expected = expected_fields.as_ref().map(|fields| &fields[i].ty);
                    self.type_check_expr(view, element, scope, field_expected)?;
                    fields.push(TupleElement {
                        name: names.get(i).cloned().flatten(),
                        ty: element.ty.clone().unwrap_or(Type::Error),
                        has_default: false,
                    });
                }
                Ok(Type::Tuple(fields))
            }
            ExprKind::Call { callee, arg } => {
                self.type_check_expr(view, arg, scope, None)?;
                let instance = match (&callee.kind, callee.ty.as_ref().map(Type::canonical)) {
                    (ExprKind::TypeRef, Some(Type::Metatype(instance))) => *instance,
                    _ => {
                        return Err(Diagnostic::error(
                            Category::TypeError,
                            "only constructor calls are supported here",
                        )
                        .at(span.location()));
                    }
                };
                let ctors = self.lookup_constructors(view, &instance).unwrap_or_default();
                let nullary = ctors
                    .iter()
                    .filter(|ctor| constructor_is_nullary(view.module, **ctor))
                    .count();
                if nullary != 1 {
                    return Err(Diagnostic::error(
                        Category::TypeError,
                        format!("no unique zero-argument constructor for `{instance}`"),
                    )
                    .at(span.location()));
                }
                Ok(instance)
            }
        }
    }
}

impl ExprChecker for ScopeServices {
    fn type_check_expr(
        &self,
        view: &ServiceView<'_>,
        expr: &mut Expr,
        scope: DeclContext,
        expected: Option<&Type>,
    ) -> Result<(), Diagnostic> {
        let actual = self.infer_expr(view, expr, scope, expected)?;
        if let Some(expected) = expected {
            if !types_compatible(expected, &actual) {
                return Err(mismatch(&actual, expected, expr));
            }
        }
        expr.ty = Some(actual);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Conformances
// ---------------------------------------------------------------------------

/// The protocols `protocol` directly refines.
pub(crate) fn protocol_parents(module: &Module, protocol: DeclId) -> Vec<ProtocolRef> {
    let Some(info) = module.decl(protocol).inheritance() else {
        return Vec::new();
    };
    if info.resolved {
        return info.protocols.clone();
    }
    info.inherited
        .iter()
        .filter_map(|loc| loc.ty.as_ref().and_then(Type::existential_protocols))
        .flatten()
        .collect()
}

/// Whether `from` is `target` or refines it, transitively.
pub(crate) fn protocol_implies(module: &Module, from: DeclId, target: DeclId) -> bool {
    let mut visited = BTreeSet::new();
    let mut stack = vec![from];
    while let Some(current) = stack.pop() {
        if current == target {
            return true;
        }
        if visited.insert(current) {
            stack.extend(protocol_parents(module, current).into_iter().map(|p| p.decl));
        }
    }
    false
}

fn archetype_protocols(view: &ServiceView<'_>, id: ArchetypeId) -> Vec<ProtocolRef> {
    view.archetypes.get(id).conforms_to.clone()
}

/// Members visible on a nominal: its own, its extensions', and those
/// inherited from superclasses.
fn visible_members(module: &Module, nominal: DeclId) -> Vec<DeclId> {
    let mut members = Vec::new();
    let mut visited = BTreeSet::new();
    let mut current = Some(nominal);
    while let Some(decl) = current {
        if !visited.insert(decl) {
            break;
        }
        members.extend(module.all_members(decl));
        current = module
            .decl(decl)
            .inheritance()
            .and_then(|info| info.superclass.as_ref())
            .and_then(Type::class_decl);
    }
    members
}

impl ScopeServices {
    fn structural_conformance(
        &self,
        view: &ServiceView<'_>,
        nominal: DeclId,
        ty: &Type,
        protocol: &ProtocolRef,
        scope: DeclContext,
    ) -> Result<Conformance, Diagnostic> {
        let module = view.module;
        let members = visible_members(module, nominal);
        let mut witnesses = Vec::new();
        let mut missing = Vec::new();
        for requirement in module.decl(protocol.decl).members().iter().copied() {
            let required = module.decl(requirement);
            if required.type_alias().is_some()
                || matches!(required.kind, DeclKind::PatternBinding(_))
            {
                continue;
            }
            let Some(name) = required.name() else {
                continue;
            };
            let witness = members.iter().copied().find(|member| {
                let candidate = module.decl(*member);
                candidate.kind_name() == required.kind_name() && candidate.name() == Some(name)
            });
            match witness {
                Some(witness) => witnesses.push(Witness {
                    requirement,
                    witness,
                }),
                None => missing.push(format!("`{name}`")),
            }
        }
        if !missing.is_empty() {
            let diag = Diagnostic::error(
                Category::ProtocolConformance,
                format!("type `{ty}` does not conform to protocol `{}`", protocol.name),
            )
            .with_help(format!("add the missing requirement(s): {}", missing.join(", ")));
            return Err(with_location(diag, scope_location(view, scope)));
        }

        let mut inherited = Vec::new();
        for parent in protocol_parents(module, protocol.decl) {
            inherited.push(self.conforms_to_protocol(view, ty, &parent, scope)?);
        }
        Ok(Conformance {
            protocol: protocol.clone(),
            ty: ty.clone(),
            witnesses,
            inherited,
        })
    }
}

impl ConformanceChecker for ScopeServices {
    fn conforms_to_protocol(
        &self,
        view: &ServiceView<'_>,
        ty: &Type,
        protocol: &ProtocolRef,
        scope: DeclContext,
    ) -> Result<Conformance, Diagnostic> {
        let trivially = || Conformance {
            protocol: protocol.clone(),
            ty: ty.clone(),
            witnesses: Vec::new(),
            inherited: Vec::new(),
        };
        let not_conforming = || {
            let diag = Diagnostic::error(
                Category::ProtocolConformance,
                format!("type `{ty}` does not conform to protocol `{}`", protocol.name),
            );
            with_location(diag, scope_location(view, scope))
        };
        match ty.canonical() {
            // Already diagnosed; conforming keeps it from being reported twice.
            Type::Error => Ok(trivially()),
            Type::Archetype(archetype) => {
                let conforms = archetype_protocols(view, archetype.id)
                    .iter()
                    .any(|p| protocol_implies(view.module, p.decl, protocol.decl));
                if conforms {
                    Ok(trivially())
                } else {
                    Err(not_conforming())
                }
            }
            Type::Protocol(_) | Type::Composition(_) => {
                let conforms = ty
                    .existential_protocols()
                    .unwrap_or_default()
                    .iter()
                    .any(|p| protocol_implies(view.module, p.decl, protocol.decl));
                if conforms {
                    Ok(trivially())
                } else {
                    Err(not_conforming())
                }
            }
            Type::Nominal(NominalType { decl, .. }) | Type::UnboundGeneric { decl, .. } => {
                self.structural_conformance(view, decl, ty, protocol, scope)
            }
            _ => Err(not_conforming()),
        }
    }
}

impl ConstructorLookup for ScopeServices {
    fn lookup_constructors(&self, view: &ServiceView<'_>, ty: &Type) -> Option<Vec<DeclId>> {
        let module = view.module;
        let is_ctor = |id: &DeclId| matches!(module.decl(*id).kind, DeclKind::Constructor(_));
        match ty.canonical() {
            Type::Nominal(NominalType { decl, .. }) | Type::UnboundGeneric { decl, .. } => {
                Some(module.all_members(decl).into_iter().filter(is_ctor).collect())
            }
            Type::Archetype(archetype) => {
                let mut ctors = Vec::new();
                let mut visited = BTreeSet::new();
                let mut stack: Vec<DeclId> = archetype_protocols(view, archetype.id)
                    .into_iter()
                    .map(|p| p.decl)
                    .collect();
                while let Some(protocol) = stack.pop() {
                    if !visited.insert(protocol) {
                        continue;
                    }
                    ctors.extend(module.decl(protocol).members().iter().copied().filter(is_ctor));
                    stack.extend(protocol_parents(module, protocol).into_iter().map(|p| p.decl));
                }
                Some(ctors)
            }
            _ => None,
        }
    }
}
