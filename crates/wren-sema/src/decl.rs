//! The declaration visitor.
//!
//! [`TypeChecker::typecheck_decl`] dispatches on the declaration kind and
//! checks it for one pass. Module-scope declarations are visited twice: the
//! first pass resolves signatures so that later declarations can refer to
//! earlier ones in any order, the second runs the checks that need those
//! signatures (initializers, conformances, implicit constructors). Anything
//! else is visited once with [`PassState::Single`].

use serde::Serialize;
use wren_ast::{
    Decl, DeclContext, DeclKind, Expr, InheritanceInfo, Pattern, PatternKind, Span,
    TypeAliasDecl, TypeLoc, TypeRepr, UnitKind,
};
use wren_diag::{Category, Diagnostic, SourceLocation};
use wren_types::{DeclId, ExtInfo, FunctionType, NominalKind, PolyFunctionType, Type};

use crate::trace::CheckAction;
use crate::{Services, TypeChecker};

/// Which pass a declaration is being checked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassState {
    /// Signature pass over module-scope declarations.
    First,
    /// Body pass over module-scope declarations.
    Second,
    /// Everything at once, for declarations below module scope.
    Single,
}

impl PassState {
    fn is_first(self) -> bool {
        self == PassState::First
    }

    fn is_second(self) -> bool {
        self == PassState::Second
    }
}

// ---------------------------------------------------------------------------
// Pattern helpers
// ---------------------------------------------------------------------------

/// `(variable, type)` for every named node of `pattern` that has a type.
fn bound_var_types(pattern: &Pattern, out: &mut Vec<(DeclId, Type)>) {
    match &pattern.kind {
        PatternKind::Named(var) => {
            if let Some(ty) = &pattern.ty {
                out.push((*var, ty.clone()));
            }
        }
        PatternKind::Typed { sub, .. }
        | PatternKind::NominalType { sub, .. }
        | PatternKind::Paren(sub)
        | PatternKind::Var(sub) => bound_var_types(sub, out),
        PatternKind::Tuple(elements) => {
            for element in elements {
                bound_var_types(&element.pattern, out);
            }
        }
        PatternKind::EnumElement { sub, .. } => {
            if let Some(sub) = sub {
                bound_var_types(sub, out);
            }
        }
        PatternKind::Any | PatternKind::Isa(_) | PatternKind::Expr(_) => {}
    }
}

/// Give the receiver pattern (and whatever it wraps) the receiver type.
fn bind_receiver(pattern: &mut Pattern, ty: &Type) {
    pattern.ty = Some(ty.clone());
    match &mut pattern.kind {
        PatternKind::Typed { sub, .. } | PatternKind::Paren(sub) | PatternKind::Var(sub) => {
            bind_receiver(sub, ty)
        }
        _ => {}
    }
}

fn strip_lvalue(ty: Type) -> Type {
    match ty.canonical() {
        Type::LValue(inner) => *inner,
        _ => ty,
    }
}

fn converting_note(dest: &Type, location: SourceLocation) -> Diagnostic {
    Diagnostic::note(
        Category::InitializerMismatch,
        format!("while converting initializer to `{dest}`"),
    )
    .at(location)
}

// ---------------------------------------------------------------------------
// Visitor
// ---------------------------------------------------------------------------

impl<S: Services> TypeChecker<S> {
    /// Check one declaration. `is_first_pass` requests the signature pass;
    /// otherwise module-scope declarations get their second pass and
    /// everything else is checked in one go.
    pub fn typecheck_decl(&mut self, id: DeclId, is_first_pass: bool) {
        let pass = if is_first_pass {
            PassState::First
        } else if self.module.is_module_context(self.module.decl(id).context) {
            PassState::Second
        } else {
            PassState::Single
        };
        self.visit_decl(id, pass);
    }

    fn visit_decl(&mut self, id: DeclId, pass: PassState) {
        let kind = self.module.decl(id).kind_name();
        tracing::trace!(decl = id.0, kind, ?pass, "checking declaration");
        self.record(id, Some(pass), CheckAction::Dispatch, || kind.to_string());

        match &self.module.decl(id).kind {
            DeclKind::Import(_) | DeclKind::Var(_) => {}
            DeclKind::PatternBinding(_) => self.visit_pattern_binding(id, pass),
            DeclKind::Func(_) => self.visit_func(id, pass),
            DeclKind::Constructor(_) => self.visit_constructor(id, pass),
            DeclKind::Destructor(_) => self.visit_destructor(id, pass),
            DeclKind::Subscript(_) => self.visit_subscript(id, pass),
            DeclKind::TypeAlias(_) => self.visit_type_alias(id, pass),
            DeclKind::Struct(_) | DeclKind::Class(_) | DeclKind::Enum(_) => {
                self.visit_nominal(id, pass)
            }
            DeclKind::EnumCase(_) => self.visit_enum_case(id, pass),
            DeclKind::Protocol(_) => self.visit_protocol(id, pass),
            DeclKind::Extension(_) => self.visit_extension(id, pass),
            DeclKind::TopLevelCode => unreachable!("top-level code is checked by the driver"),
        }
    }

    fn visit_members(&mut self, id: DeclId, pass: PassState) {
        let members = self.module.decl(id).members().to_vec();
        for member in members {
            self.visit_decl(member, pass);
        }
    }

    // -- shared helpers -----------------------------------------------------

    fn bind_pattern_types(&mut self, pattern: &Pattern) {
        let mut bound = Vec::new();
        bound_var_types(pattern, &mut bound);
        for (var, ty) in bound {
            self.module.decl_mut(var).ty = Some(ty);
        }
    }

    fn set_bound_vars_error(&mut self, pattern: &Pattern) {
        let mut vars = Vec::new();
        pattern.collect_variables(&mut vars);
        for var in vars {
            let decl = self.module.decl_mut(var);
            if decl.ty.is_none() {
                decl.ty = Some(Type::Error);
            }
        }
    }

    /// The type of the implicit receiver of a member function, constructor,
    /// or destructor. `None` outside type contexts.
    fn compute_self_type(&self, id: DeclId) -> Option<Type> {
        let decl = self.module.decl(id);
        let nominal = self.module.nominal_of_context(decl.context)?;
        let declared = self.module.declared_type_in_context(nominal)?;
        let in_class = matches!(self.module.decl(nominal).kind, DeclKind::Class(_));
        Some(match &decl.kind {
            DeclKind::Func(func) if func.is_static => Type::metatype(declared),
            DeclKind::Func(_) if in_class => declared,
            DeclKind::Func(_) => Type::LValue(Box::new(declared)),
            _ => declared,
        })
    }

    /// One level of a curried function type, polymorphic over the generic
    /// parameters of `owner` when given.
    fn function_level(
        &self,
        input: Type,
        result: Type,
        owner: Option<DeclId>,
        ext: ExtInfo,
    ) -> Type {
        if let Some(owner) = owner {
            if let Some(params) = self.module.decl(owner).generic_params() {
                return Type::PolymorphicFunction(PolyFunctionType {
                    input: Box::new(input),
                    result: Box::new(result),
                    generic_owner: owner,
                    archetypes: params.all_archetypes.clone(),
                    ext,
                });
            }
        }
        Type::Function(FunctionType {
            input: Box::new(input),
            result: Box::new(result),
            ext,
        })
    }

    /// Move the function-type attributes of a function into its ext-info,
    /// rejecting the ones functions cannot carry.
    fn consume_function_type_attributes(&mut self, id: DeclId) -> ExtInfo {
        let location = self.attribute_location(id);
        let attrs = &mut self.module.decl_mut(id).attrs;
        let mut rejected = Vec::new();
        if attrs.calling_convention.take().is_some() {
            rejected.push("cc");
        }
        if std::mem::take(&mut attrs.thin) {
            rejected.push("thin");
        }
        let ext = ExtInfo {
            no_return: std::mem::take(&mut attrs.no_return),
        };
        if std::mem::take(&mut attrs.autoclosure) {
            rejected.push("auto_closure");
        }
        if std::mem::take(&mut attrs.interop_block) {
            rejected.push("interop_block");
        }
        for spelling in rejected {
            let diag = Diagnostic::error(
                Category::InvalidAttribute,
                format!("`{spelling}` attribute is not allowed on func declarations"),
            )
            .at(location);
            self.diagnose(diag);
        }
        ext
    }

    /// Whether members of `context` inherit interop from their class.
    fn context_class_interop(&self, context: DeclContext) -> bool {
        self.module
            .class_of_context(context)
            .is_some_and(|class| self.module.decl(class).interop)
    }

    fn set_member_interop(&mut self, id: DeclId) {
        let context = self.module.decl(id).context;
        if !self.module.is_type_context(context) {
            return;
        }
        let interop = self.module.decl(id).attrs.interop || self.context_class_interop(context);
        self.module.decl_mut(id).interop = interop;
    }

    // -- pattern bindings ---------------------------------------------------

    fn visit_pattern_binding(&mut self, id: DeclId, pass: PassState) {
        let decl = self.module.decl(id);
        let context = decl.context;
        let location = decl.span.location();
        let DeclKind::PatternBinding(binding) = &decl.kind else {
            return;
        };
        let mut pattern = binding.pattern.clone();
        let mut init = binding.init.clone();
        let delay =
            self.module.kind == UnitKind::Main && self.module.is_module_context(context);

        if pass.is_second() && !delay {
            if let (Some(mut expr), Some(dest)) = (init.clone(), pattern.ty.clone()) {
                match self.type_check_expr(context, &mut expr, Some(&dest)) {
                    Ok(()) => self.store_binding(id, pattern, Some(expr)),
                    Err(diag) => {
                        self.diagnose(diag);
                        self.diagnose(converting_note(&dest, location));
                    }
                }
                return;
            }
            // Only bindings whose type comes from their initializer are left.
            if init.is_none() || pattern.is_typed() {
                return;
            }
        }

        let first = pass.is_first();
        if init.is_none() && !first && pattern.is_typed() && !self.module.is_type_context(context)
        {
            if !self.type_check_pattern(context, &mut pattern, false) {
                self.bind_pattern_types(&pattern);
                self.store_binding(id, pattern, init);
                return;
            }
            self.bind_pattern_types(&pattern);
            let ty = pattern.ty.clone().unwrap_or(Type::Error);
            let is_property = pattern.single_var().is_some_and(|var| {
                matches!(&self.module.decl(var).kind, DeclKind::Var(var) if var.computed)
            });
            if is_property {
                // Computed properties have no storage to initialize.
            } else if let Some(mut expr) = self.default_initializer(&ty) {
                if let Err(diag) = self.type_check_expr(context, &mut expr, Some(&ty)) {
                    self.diagnose(diag);
                    self.diagnose(converting_note(&ty, location));
                    self.store_binding(id, pattern, init);
                    return;
                }
                init = Some(expr);
                self.record(id, Some(pass), CheckAction::DefaultInitialize, || {
                    format!("default value of {ty}")
                });
            } else {
                let diag = Diagnostic::error(
                    Category::NoDefaultInitializer,
                    format!("variable of type `{ty}` has no default value"),
                )
                .at(location)
                .with_help("add an initializer");
                self.diagnose(diag);
                self.module.decl_mut(id).invalid = true;
            }
        } else if let (Some(mut expr), false) = (init.clone(), first) {
            let mut dest = None;
            if pattern.is_typed() {
                if !self.type_check_pattern(context, &mut pattern, false) {
                    self.bind_pattern_types(&pattern);
                    self.store_binding(id, pattern, init);
                    return;
                }
                dest = pattern.ty.clone();
            }
            if let Err(diag) = self.type_check_expr(context, &mut expr, dest.as_ref()) {
                self.diagnose(diag);
                if let Some(dest) = &dest {
                    self.diagnose(converting_note(dest, location));
                }
                self.set_bound_vars_error(&pattern);
                self.store_binding(id, pattern, init);
                return;
            }
            if dest.is_none() {
                let ty = strip_lvalue(expr.ty.clone().unwrap_or(Type::Error));
                if !self.coerce_pattern(context, &mut pattern, &ty) {
                    self.set_bound_vars_error(&pattern);
                    self.store_binding(id, pattern, Some(expr));
                    return;
                }
            }
            init = Some(expr);
            self.bind_pattern_types(&pattern);
        } else if !first || !delay {
            if init.is_some() && !pattern.is_typed() {
                // Inferred from the initializer in a later pass.
                self.store_binding(id, pattern, init);
                return;
            }
            let ok = self.type_check_pattern(context, &mut pattern, false);
            self.bind_pattern_types(&pattern);
            if !ok {
                self.store_binding(id, pattern, init);
                return;
            }
        }

        let mut vars = Vec::new();
        pattern.collect_variables(&mut vars);
        self.store_binding(id, pattern, init);
        self.visit_bound_vars(&vars);
    }

    fn store_binding(&mut self, id: DeclId, pattern: Pattern, init: Option<Expr>) {
        if let DeclKind::PatternBinding(binding) = &mut self.module.decl_mut(id).kind {
            binding.pattern = pattern;
            binding.init = init;
        }
    }

    /// Materializability, attributes, and interop of freshly typed variables.
    /// Variables whose type is still unknown are left for a later pass.
    fn visit_bound_vars(&mut self, vars: &[DeclId]) {
        for &var in vars {
            let Some(ty) = self.module.decl(var).ty.clone() else {
                continue;
            };
            if !ty.is_materializable() {
                let diag = Diagnostic::error(
                    Category::NotMaterializable,
                    format!("variable cannot have non-materializable type `{ty}`"),
                )
                .at(self.module.decl(var).span.location());
                self.diagnose(diag);
                self.module.decl_mut(var).ty = Some(Type::Error);
            }
            self.validate_attributes(var);
            self.set_member_interop(var);
        }
    }

    // -- functions ----------------------------------------------------------

    fn visit_func(&mut self, id: DeclId, pass: PassState) {
        if pass.is_second() {
            return;
        }
        let decl = self.module.decl(id);
        let context = decl.context;
        let DeclKind::Func(func) = &decl.kind else {
            return;
        };
        let mut patterns = func.arg_patterns.clone();
        let mut result = func.result.clone();
        let generic = func.generic_params.is_some();
        let accessor_for = func.accessor_for;
        let scope = DeclContext::Decl(id);
        let receivers = usize::from(self.module.is_type_context(context));
        let outer = self.module.generic_params_of_context(context);

        if receivers == 1 {
            if let (Some(self_ty), Some(receiver)) =
                (self.compute_self_type(id), patterns.first_mut())
            {
                if receiver.ty.is_none() {
                    bind_receiver(receiver, &self_ty);
                }
            }
        }
        if generic {
            self.check_generic_params(id, outer);
        }
        let ext = self.consume_function_type_attributes(id);

        let mut bad = false;
        if let Some(result) = result.as_mut() {
            bad |= !self.validate_type(scope, result);
        }
        for pattern in &mut patterns {
            if pattern.ty.is_some() {
                continue;
            }
            bad |= !self.type_check_pattern(scope, pattern, false);
        }
        for pattern in &patterns {
            self.bind_pattern_types(pattern);
        }

        let ty = if bad {
            Type::Error
        } else {
            let mut ty = result
                .as_ref()
                .and_then(|result| result.ty.clone())
                .unwrap_or_else(Type::unit);
            // The innermost level carries the ext-info.
            let mut level_ext = ext;
            for (level, pattern) in patterns.iter().enumerate().rev() {
                let input = pattern.ty.clone().unwrap_or(Type::Error);
                let owner = if level == receivers && generic {
                    Some(id)
                } else if level == 0 && receivers == 1 {
                    outer
                } else {
                    None
                };
                ty = self.function_level(input, ty, owner, level_ext);
                level_ext = ExtInfo::default();
            }
            ty
        };

        let decl = self.module.decl_mut(id);
        decl.ty = Some(ty);
        if let DeclKind::Func(func) = &mut decl.kind {
            func.arg_patterns = patterns;
            func.result = result;
        }

        self.validate_attributes(id);

        if receivers == 1 {
            let mut interop =
                self.module.decl(id).attrs.interop || self.context_class_interop(context);
            if !interop {
                if let Some(property) = accessor_for {
                    let attrs = &self.module.decl(property).attrs;
                    interop = attrs.interop || attrs.outlet;
                }
            }
            self.module.decl_mut(id).interop = interop;
        }
    }

    fn visit_constructor(&mut self, id: DeclId, pass: PassState) {
        if pass.is_second() {
            return;
        }
        let decl = self.module.decl(id);
        let context = decl.context;
        let DeclKind::Constructor(ctor) = &decl.kind else {
            return;
        };
        let mut arguments = ctor.arguments.clone();
        let generic = ctor.generic_params.is_some();
        let self_ty = self.compute_self_type(id).unwrap_or(Type::Error);
        let outer = self.module.generic_params_of_context(context);

        if generic {
            self.check_generic_params(id, outer);
        }
        let ok = self.type_check_pattern(DeclContext::Decl(id), &mut arguments, false);
        self.bind_pattern_types(&arguments);

        let (ty, initializer_type) = if ok {
            let input = arguments.ty.clone().unwrap_or(Type::Error);
            let owner = generic.then_some(id);
            let fn_ty = self.function_level(input, self_ty.clone(), owner, ExtInfo::default());
            let allocating = self.function_level(
                Type::metatype(self_ty.clone()),
                fn_ty.clone(),
                outer,
                ExtInfo::default(),
            );
            let initializing =
                self.function_level(self_ty.clone(), fn_ty, outer, ExtInfo::default());
            (allocating, Some(initializing))
        } else {
            (Type::Error, None)
        };

        let decl = self.module.decl_mut(id);
        decl.ty = Some(ty);
        if let DeclKind::Constructor(ctor) = &mut decl.kind {
            ctor.arguments = arguments;
            ctor.self_type = Some(self_ty);
            ctor.initializer_type = initializer_type;
        }
        self.validate_attributes(id);
        self.set_member_interop(id);
    }

    fn visit_destructor(&mut self, id: DeclId, pass: PassState) {
        if pass.is_second() {
            return;
        }
        let context = self.module.decl(id).context;
        let self_ty = self.compute_self_type(id).unwrap_or(Type::Error);
        let outer = self.module.generic_params_of_context(context);
        let ty = self.function_level(self_ty.clone(), Type::unit(), outer, ExtInfo::default());

        let decl = self.module.decl_mut(id);
        decl.ty = Some(ty);
        if let DeclKind::Destructor(dtor) = &mut decl.kind {
            dtor.self_type = Some(self_ty);
        }
        self.validate_attributes(id);
        self.set_member_interop(id);
    }

    fn visit_subscript(&mut self, id: DeclId, pass: PassState) {
        if pass.is_second() {
            return;
        }
        let decl = self.module.decl(id);
        let scope = decl.context;
        let DeclKind::Subscript(subscript) = &decl.kind else {
            return;
        };
        let mut element = subscript.element.clone();
        let mut indices = subscript.indices.clone();

        let element_ok = self.validate_type(scope, &mut element);
        let indices_ok = self.type_check_pattern(scope, &mut indices, false);
        self.bind_pattern_types(&indices);
        let ty = match (&indices.ty, &element.ty) {
            (Some(input), Some(result)) if element_ok && indices_ok => {
                Type::function(input.clone(), result.clone())
            }
            _ => Type::Error,
        };

        let decl = self.module.decl_mut(id);
        decl.ty = Some(ty);
        if let DeclKind::Subscript(subscript) = &mut decl.kind {
            subscript.element = element;
            subscript.indices = indices;
        }
    }

    // -- type declarations --------------------------------------------------

    fn in_protocol_context(&self, context: DeclContext) -> bool {
        matches!(
            context,
            DeclContext::Decl(owner) if matches!(self.module.decl(owner).kind, DeclKind::Protocol(_))
        )
    }

    fn visit_type_alias(&mut self, id: DeclId, pass: PassState) {
        let context = self.module.decl(id).context;
        let in_protocol = self.in_protocol_context(context);

        if !pass.is_second() {
            let Some(alias) = self.module.decl(id).type_alias() else {
                return;
            };
            if alias.underlying.ty.is_none() {
                let mut underlying = alias.underlying.clone();
                self.validate_type(context, &mut underlying);
                if let DeclKind::TypeAlias(alias) = &mut self.module.decl_mut(id).kind {
                    alias.underlying = underlying;
                }
            }
            if !in_protocol {
                self.check_inheritance_clause(id);
            }
        }

        if !pass.is_first() && !in_protocol {
            let Some(alias) = self.module.decl(id).type_alias() else {
                return;
            };
            let ty = Type::Alias {
                decl: id,
                name: alias.name.clone(),
                underlying: Box::new(alias.underlying.ty.clone().unwrap_or(Type::Error)),
            };
            self.gather_explicit_conformances(id, ty);
        }
    }

    fn visit_nominal(&mut self, id: DeclId, pass: PassState) {
        let decl = self.module.decl(id);
        let context = decl.context;
        let kind = decl.nominal_kind();

        if !pass.is_second() {
            if decl.generic_params().is_some() {
                let outer = self.module.generic_params_of_context(context);
                self.check_generic_params(id, outer);
            }
            let declared = self.module.declared_type(id).map(|ty| ty.canonical());
            let in_context = self
                .module
                .declared_type_in_context(id)
                .map(|ty| ty.canonical());
            let decl = self.module.decl_mut(id);
            decl.ty = declared.map(Type::metatype);
            if let Some(nominal) = decl.nominal_mut() {
                nominal.declared_type_in_context = in_context;
            }

            self.validate_attributes(id);
            self.check_inheritance_clause(id);

            if kind == Some(NominalKind::Class) {
                let superclass_interop = self
                    .module
                    .decl(id)
                    .inheritance()
                    .and_then(|info| info.superclass.as_ref())
                    .and_then(Type::class_decl)
                    .is_some_and(|superclass| self.module.decl(superclass).interop);
                let decl = self.module.decl_mut(id);
                decl.interop = decl.attrs.interop || superclass_interop;
            }
        }

        self.visit_members(id, pass);

        if !pass.is_first() {
            let ty = self
                .module
                .declared_type_in_context(id)
                .unwrap_or(Type::Error);
            self.gather_explicit_conformances(id, ty);
            match kind {
                Some(NominalKind::Class) => self.check_interop_conformances(id),
                Some(NominalKind::Struct) => self.add_implicit_constructors(id),
                _ => {}
            }
        }
    }

    fn visit_enum_case(&mut self, id: DeclId, pass: PassState) {
        if pass.is_second() {
            return;
        }
        let decl = self.module.decl(id);
        let scope = decl.context;
        let location = decl.span.location();
        let DeclKind::EnumCase(case) = &decl.kind else {
            return;
        };
        let mut argument = case.argument.clone();
        let mut result = case.result.clone();
        let Some(elem) = self
            .module
            .nominal_of_context(scope)
            .and_then(|owner| self.module.declared_type_in_context(owner))
        else {
            self.module.decl_mut(id).ty = Some(Type::Error);
            return;
        };

        let mut valid = true;
        if let Some(loc) = argument.as_mut() {
            valid = self.validate_type(scope, loc);
        }
        if valid {
            if let Some(loc) = result.as_mut() {
                valid = self.validate_type(scope, loc);
            }
        }
        let payload = argument.as_ref().and_then(|loc| loc.ty.clone());
        if let DeclKind::EnumCase(case) = &mut self.module.decl_mut(id).kind {
            case.argument = argument;
            case.result = result;
        }
        if !valid {
            self.module.decl_mut(id).ty = Some(Type::Error);
            return;
        }

        let outer = self.module.generic_params_of_context(scope);
        let meta = Type::metatype(elem.clone());
        let ty = match payload {
            None => self.function_level(meta, elem, outer, ExtInfo::default()),
            Some(payload) if !payload.is_materializable() => {
                let diag = Diagnostic::error(
                    Category::NotMaterializable,
                    format!("enum case payload `{payload}` must be materializable"),
                )
                .at(location);
                self.diagnose(diag);
                Type::Error
            }
            Some(payload) => {
                let ctor = Type::function(payload, elem);
                self.function_level(meta, ctor, outer, ExtInfo::default())
            }
        };
        self.module.decl_mut(id).ty = Some(ty);
    }

    fn visit_protocol(&mut self, id: DeclId, pass: PassState) {
        if pass.is_second() {
            return;
        }
        self.check_inheritance_clause(id);

        let decl = self.module.decl(id);
        if decl.attrs.interop {
            let name = decl.name().unwrap_or("_").to_string();
            let location = decl.span.location();
            let parents = decl
                .inheritance()
                .map(|info| info.protocols.clone())
                .unwrap_or_default();
            let mut interop = true;
            for parent in parents {
                let parent_decl = self.module.decl(parent.decl);
                if parent_decl.attrs.interop {
                    continue;
                }
                let parent_location = parent_decl.span.location();
                self.diagnose(
                    Diagnostic::error(
                        Category::InteropProtocolInheritance,
                        format!(
                            "interop protocol `{name}` cannot refine non-interop protocol `{}`",
                            parent.name
                        ),
                    )
                    .at(location),
                );
                self.diagnose(
                    Diagnostic::note(Category::InteropProtocolInheritance, "protocol declared here")
                        .at(parent_location),
                );
                interop = false;
            }
            self.module.decl_mut(id).interop = interop;
        }

        let self_decl = match self.module.protocol_self_decl(id) {
            Some(self_decl) => self_decl,
            None => self.synthesize_protocol_self(id),
        };
        self.assign_protocol_archetypes(id, self_decl);

        self.visit_members(id, pass);
        self.validate_attributes(id);
        let decl = self.module.decl_mut(id);
        decl.interop &= decl.attrs.interop;
    }

    /// Add the implicit `Self` associated type at the front of the members.
    fn synthesize_protocol_self(&mut self, protocol: DeclId) -> DeclId {
        let span = self.module.decl(protocol).span;
        let mut alias = Decl::new(
            DeclKind::TypeAlias(TypeAliasDecl {
                name: "Self".to_string(),
                underlying: TypeLoc::new(TypeRepr::named("Self"), Span::synthetic()),
                generic_param: false,
                inheritance: InheritanceInfo::default(),
            }),
            span,
            DeclContext::Decl(protocol),
        );
        alias.implicit = true;
        let self_decl = self.module.add_decl(alias);
        if let Some(nominal) = self.module.decl_mut(protocol).nominal_mut() {
            nominal.members.insert(0, self_decl);
        }
        self_decl
    }

    fn visit_extension(&mut self, id: DeclId, pass: PassState) {
        let decl = self.module.decl(id);
        if decl.invalid {
            self.invalidate_members(id);
            return;
        }
        let context = decl.context;

        if !pass.is_second() {
            let DeclKind::Extension(ext) = &decl.kind else {
                return;
            };
            let location = decl.span.location();
            let mut extended = ext.extended.clone();
            self.validate_type(context, &mut extended);
            let mut ty = extended.ty.clone().unwrap_or(Type::Error).canonical();
            if let Type::UnboundGeneric { decl: nominal, .. } = ty {
                if let Some(bound) = self.module.declared_type_in_context(nominal) {
                    ty = bound.canonical();
                    extended = TypeLoc::without_loc(bound);
                }
            }
            let rejection = match &ty {
                Type::Nominal(_) | Type::Error => None,
                Type::Protocol(_) | Type::Composition(_) => {
                    Some(format!("cannot extend protocol type `{ty}`"))
                }
                _ => Some(format!("non-nominal type `{ty}` cannot be extended")),
            };
            if let DeclKind::Extension(ext) = &mut self.module.decl_mut(id).kind {
                ext.extended = extended;
            }
            if let Some(message) = rejection {
                self.diagnose(
                    Diagnostic::error(Category::NonNominalExtension, message).at(location),
                );
                self.module.decl_mut(id).invalid = true;
                self.invalidate_members(id);
                return;
            }
            if let Some(nominal) = ty.any_nominal() {
                if let Some(nominal) = self.module.decl_mut(nominal).nominal_mut() {
                    if !nominal.extensions.contains(&id) {
                        nominal.extensions.push(id);
                    }
                }
            }
            self.check_inheritance_clause(id);
        }

        self.visit_members(id, pass);

        if !pass.is_first() {
            let ty = match &self.module.decl(id).kind {
                DeclKind::Extension(ext) => ext.extended.ty.clone().unwrap_or(Type::Error),
                _ => Type::Error,
            };
            self.gather_explicit_conformances(id, ty);
            self.check_interop_conformances(id);
        }
    }

    fn invalidate_members(&mut self, id: DeclId) {
        let members = self.module.decl(id).members().to_vec();
        for member in members {
            self.module.decl_mut(member).invalid = true;
        }
    }
}
