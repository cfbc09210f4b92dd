//! Default initialization and implicit struct constructors.
//!
//! Every struct without a user-written constructor gets a memberwise
//! constructor as soon as its members are known. If it has stored fields it
//! is also queued for a default constructor, which is only defined once all
//! declarations have been checked, because whether a field can be
//! default-initialized may depend on types checked later.

use wren_ast::{
    BraceStmt, ConstructorDecl, Decl, DeclContext, DeclKind, Expr, ImplicitConstructorKind,
    Pattern, TuplePatternElement, TypeLoc, VarDecl,
};
use wren_types::{DeclId, NominalKind, NominalType, Type};

use crate::trace::CheckAction;
use crate::{Services, TypeChecker};

/// The type a value of `ty` has when read: no lvalue or weak/unowned storage.
fn rvalue_type(ty: &Type) -> Type {
    match ty.canonical() {
        Type::LValue(inner) => rvalue_type(&inner),
        Type::ReferenceStorage { referent, .. } => *referent,
        _ => ty.clone(),
    }
}

impl<S: Services> TypeChecker<S> {
    // -- default initialization ---------------------------------------------

    /// The expression that default-initializes a value of `ty`, if there is
    /// exactly one way to do so.
    pub fn default_initializer(&self, ty: &Type) -> Option<Expr> {
        match ty.canonical() {
            Type::Archetype(_)
            | Type::Nominal(NominalType {
                kind: NominalKind::Struct | NominalKind::Enum,
                ..
            })
            | Type::UnboundGeneric {
                kind: NominalKind::Struct | NominalKind::Enum,
                ..
            } => self
                .has_unique_default_constructor(ty)
                .then(|| Expr::construct(ty.clone())),
            Type::Nominal(NominalType {
                kind: NominalKind::Class,
                ..
            })
            | Type::UnboundGeneric {
                kind: NominalKind::Class,
                ..
            }
            | Type::Builtin(_) => Some(Expr::zero_value(ty.clone())),
            Type::Tuple(elements) => {
                let mut inits = Vec::with_capacity(elements.len());
                for element in &elements {
                    inits.push(self.default_initializer(&element.ty)?);
                }
                if elements.len() == 1 && elements[0].name.is_none() {
                    return inits.pop();
                }
                let names = elements.into_iter().map(|element| element.name).collect();
                Some(Expr::tuple(inits, names))
            }
            Type::ReferenceStorage { referent, .. } => self.default_initializer(&referent),
            Type::Array { .. }
            | Type::Protocol(_)
            | Type::Composition(_)
            | Type::Function(_)
            | Type::PolymorphicFunction(_)
            | Type::Metatype(_)
            | Type::Module(_)
            | Type::LValue(_)
            | Type::Error => None,
            Type::Alias { .. } => unreachable!("canonical types carry no alias sugar"),
        }
    }

    pub fn is_default_initializable(&self, ty: &Type) -> bool {
        self.default_initializer(ty).is_some()
    }

    /// Exactly one constructor of `ty` can be called with no arguments.
    fn has_unique_default_constructor(&self, ty: &Type) -> bool {
        let Some(ctors) = self.services.lookup_constructors(&self.view(), ty) else {
            return false;
        };
        let mut found = 0;
        for ctor in ctors {
            let DeclKind::Constructor(ctor) = &self.module.decl(ctor).kind else {
                continue;
            };
            let Some(params) = ctor.arguments.ty.as_ref().and_then(Type::tuple_elements) else {
                continue;
            };
            if params.iter().all(|param| param.has_default) {
                found += 1;
                if found > 1 {
                    return false;
                }
            }
        }
        found == 1
    }

    // -- implicit constructors ----------------------------------------------

    fn stored_fields(&self, strukt: DeclId) -> Vec<DeclId> {
        self.module
            .decl(strukt)
            .members()
            .iter()
            .copied()
            .filter(|member| {
                matches!(
                    &self.module.decl(*member).kind,
                    DeclKind::Var(var) if !var.computed && !var.is_static
                )
            })
            .collect()
    }

    /// Synthesize the memberwise constructor of `strukt` and queue its
    /// default constructor. Does nothing if the struct declares its own
    /// constructors or was already handled.
    pub fn add_implicit_constructors(&mut self, strukt: DeclId) {
        let decl = self.module.decl(strukt);
        let Some(nominal) = decl.nominal() else {
            return;
        };
        if decl.nominal_kind() != Some(NominalKind::Struct) || nominal.implicit_constructors_added {
            return;
        }
        let imported = nominal.imported;
        // Constructors declared in extensions do not count.
        let has_user_constructor = decl
            .members()
            .iter()
            .any(|member| matches!(self.module.decl(*member).kind, DeclKind::Constructor(_)));
        if let Some(nominal) = self.module.decl_mut(strukt).nominal_mut() {
            nominal.implicit_constructors_added = true;
        }
        if has_user_constructor {
            return;
        }

        let fields = self.stored_fields(strukt);
        let ctor =
            self.create_implicit_constructor(strukt, ImplicitConstructorKind::Memberwise, &fields);
        if imported {
            self.session.external_definitions.push(ctor);
        }
        if !fields.is_empty() {
            self.session.queue_default_constructor(strukt);
        }
        self.record(strukt, None, CheckAction::AddImplicitConstructors, || {
            format!("memberwise constructor with {} parameter(s)", fields.len())
        });
    }

    /// Create an implicit constructor on `strukt`, append it to the struct's
    /// members, and check it. Memberwise constructors take one parameter per
    /// field in `fields`.
    fn create_implicit_constructor(
        &mut self,
        strukt: DeclId,
        kind: ImplicitConstructorKind,
        fields: &[DeclId],
    ) -> DeclId {
        let span = self.module.decl(strukt).span;
        let mut ctor = Decl::new(
            DeclKind::Constructor(ConstructorDecl {
                generic_params: None,
                arguments: Pattern::tuple(Vec::new(), span),
                self_type: None,
                initializer_type: None,
                implicit_kind: Some(kind),
                body: None,
            }),
            span,
            DeclContext::Decl(strukt),
        );
        ctor.implicit = true;
        let ctor = self.module.add_decl(ctor);

        let mut elements = Vec::with_capacity(fields.len());
        for field in fields {
            let field = self.module.decl(*field);
            let name = field.name().unwrap_or("_").to_string();
            let ty = field.ty.as_ref().map(rvalue_type).unwrap_or(Type::Error);
            let mut param = Decl::new(
                DeclKind::Var(VarDecl {
                    name,
                    computed: false,
                    is_static: false,
                }),
                span,
                DeclContext::Decl(ctor),
            );
            param.implicit = true;
            let param = self.module.add_decl(param);
            elements.push(TuplePatternElement {
                pattern: Pattern::typed(Pattern::named(param, span), TypeLoc::without_loc(ty)),
                default: None,
            });
        }
        if let DeclKind::Constructor(decl) = &mut self.module.decl_mut(ctor).kind {
            decl.arguments = Pattern::tuple(elements, span);
        }
        if let Some(nominal) = self.module.decl_mut(strukt).nominal_mut() {
            nominal.members.push(ctor);
        }
        self.typecheck_decl(ctor, true);
        ctor
    }

    /// Define the default constructor of a queued struct, provided every
    /// stored field without an initializer can be default-initialized.
    /// Queued structs used as field types are defined first.
    pub fn define_default_constructor(&mut self, strukt: DeclId) {
        if !self.session.take_pending_default_constructor(strukt) {
            return;
        }
        let members = self.module.decl(strukt).members().to_vec();
        for member in members {
            let DeclKind::PatternBinding(binding) = &self.module.decl(member).kind else {
                continue;
            };
            if binding.init.is_some() {
                continue;
            }
            let mut vars = Vec::new();
            binding.pattern.collect_variables(&mut vars);
            for var in vars {
                let decl = self.module.decl(var);
                if matches!(&decl.kind, DeclKind::Var(var) if var.computed) {
                    continue;
                }
                let ty = decl.ty.clone().unwrap_or(Type::Error);
                if let Some(field_struct) = rvalue_type(&ty).any_nominal() {
                    if self.session.is_pending_default_constructor(field_struct) {
                        self.define_default_constructor(field_struct);
                    }
                }
                if !self.is_default_initializable(&ty) {
                    self.record(strukt, None, CheckAction::SkipDefaultConstructor, || {
                        format!("field of type {ty} has no default value")
                    });
                    return;
                }
            }
        }

        let ctor = self.create_implicit_constructor(strukt, ImplicitConstructorKind::Default, &[]);
        if let DeclKind::Constructor(decl) = &mut self.module.decl_mut(ctor).kind {
            decl.body = Some(BraceStmt::default());
        }
        self.session.implicitly_defined.push(ctor);
        self.record(strukt, None, CheckAction::DefineDefaultConstructor, || {
            format!("default constructor #{}", ctor.0)
        });
    }

    /// Define every queued default constructor that is still pending.
    pub fn define_pending_implicit_decls(&mut self) {
        let queued = self.session.queued_default_constructors();
        tracing::debug!(queued = queued.len(), "defining pending implicit declarations");
        for strukt in queued {
            if self.session.is_pending_default_constructor(strukt) {
                self.define_default_constructor(strukt);
            }
        }
    }
}
