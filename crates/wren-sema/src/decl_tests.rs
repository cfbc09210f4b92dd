//! Declaration checking tests over hand-built module trees.

use wren_ast::{
    ConstructorDecl, Decl, DeclAttributes, DeclContext, DeclKind, EnumCaseDecl, Expr, ExprKind,
    ExtensionDecl, FileId, FuncDecl, GenericParamList, ImplicitConstructorKind, InheritanceInfo,
    Module, NominalDecl, Pattern, PatternBindingDecl, Requirement, Span, TuplePatternElement,
    TypeAliasDecl, TypeLoc, TypeRepr, UnitKind, VarDecl,
};
use wren_diag::{Category, FixIt, Severity};
use wren_types::{BuiltinType, DeclId, Ownership, ProtocolRef, TupleElement, Type};

use crate::trace::CheckAction;
use crate::{CheckerOptions, PassState, ScopeServices, TypeChecker};

fn s() -> Span {
    Span::new(FileId(0), 0, 1)
}

fn sp(start: u32, end: u32) -> Span {
    Span::new(FileId(0), start, end)
}

fn named(name: &str) -> TypeLoc {
    TypeLoc::new(TypeRepr::named(name), s())
}

fn named_at(name: &str, span: Span) -> TypeLoc {
    TypeLoc::new(TypeRepr::named(name), span)
}

fn int() -> Type {
    Type::Builtin(BuiltinType::Int(64))
}

// ---------------------------------------------------------------------------
// Tree builder
// ---------------------------------------------------------------------------

/// Builds a module the way the parser would: members are registered on
/// their parent, module-scope declarations in `top_level`.
struct Tree {
    module: Module,
}

impl Tree {
    fn new(kind: UnitKind) -> Self {
        Self {
            module: Module::new("test", kind),
        }
    }

    fn library() -> Self {
        Self::new(UnitKind::Library)
    }

    /// Add a declaration that is not a member of its context, such as a
    /// parameter variable or generic parameter.
    fn detached(&mut self, kind: DeclKind, context: DeclContext) -> DeclId {
        self.module.add_decl(Decl::new(kind, s(), context))
    }

    fn add(&mut self, decl: Decl) -> DeclId {
        let context = decl.context;
        let id = self.module.add_decl(decl);
        match context {
            DeclContext::Module => self.module.top_level.push(id),
            DeclContext::Decl(owner) => {
                let owner = self.module.decl_mut(owner);
                if let DeclKind::Extension(ext) = &mut owner.kind {
                    ext.members.push(id);
                } else if let Some(nominal) = owner.nominal_mut() {
                    nominal.members.push(id);
                }
            }
        }
        id
    }

    fn add_kind(&mut self, kind: DeclKind, context: DeclContext) -> DeclId {
        self.add(Decl::new(kind, s(), context))
    }

    fn nominal(
        &mut self,
        make: fn(NominalDecl) -> DeclKind,
        name: &str,
        inherited: Vec<TypeLoc>,
    ) -> DeclId {
        let mut nominal = NominalDecl::new(name);
        nominal.inheritance = InheritanceInfo::new(inherited);
        self.add_kind(make(nominal), DeclContext::Module)
    }

    fn strukt(&mut self, name: &str) -> DeclId {
        self.nominal(DeclKind::Struct, name, Vec::new())
    }

    fn class(&mut self, name: &str) -> DeclId {
        self.nominal(DeclKind::Class, name, Vec::new())
    }

    fn protocol(&mut self, name: &str) -> DeclId {
        self.nominal(DeclKind::Protocol, name, Vec::new())
    }

    fn var_decl(name: &str) -> DeclKind {
        DeclKind::Var(VarDecl {
            name: name.to_string(),
            computed: false,
            is_static: false,
        })
    }

    /// `var name: ty = init` in `context`. Returns `(var, binding)`.
    fn binding(
        &mut self,
        context: DeclContext,
        name: &str,
        ty: Option<&str>,
        init: Option<Expr>,
    ) -> (DeclId, DeclId) {
        self.binding_with_attrs(context, name, ty, init, DeclAttributes::default())
    }

    fn binding_with_attrs(
        &mut self,
        context: DeclContext,
        name: &str,
        ty: Option<&str>,
        init: Option<Expr>,
        attrs: DeclAttributes,
    ) -> (DeclId, DeclId) {
        let var = self.add(Decl::new(Self::var_decl(name), s(), context).with_attrs(attrs));
        let mut pattern = Pattern::named(var, s());
        if let Some(ty) = ty {
            pattern = Pattern::typed(pattern, named(ty));
        }
        let binding = self.add_kind(
            DeclKind::PatternBinding(PatternBindingDecl { pattern, init }),
            context,
        );
        (var, binding)
    }

    fn field(&mut self, owner: DeclId, name: &str, ty: &str) -> DeclId {
        self.binding(DeclContext::Decl(owner), name, Some(ty), None).0
    }

    /// A function with a single parameter clause of typed names.
    fn func(
        &mut self,
        context: DeclContext,
        name: &str,
        params: &[(&str, &str)],
        result: Option<&str>,
    ) -> DeclId {
        let func = self.add_kind(
            DeclKind::Func(FuncDecl {
                name: name.to_string(),
                generic_params: None,
                arg_patterns: Vec::new(),
                result: result.map(named),
                is_static: false,
                accessor_for: None,
            }),
            context,
        );
        let mut patterns = Vec::new();
        if self.module.is_type_context(context) {
            let receiver = self.detached(Self::var_decl("self"), DeclContext::Decl(func));
            patterns.push(Pattern::named(receiver, s()));
        }
        patterns.push(self.param_tuple(func, params));
        if let DeclKind::Func(decl) = &mut self.module.decl_mut(func).kind {
            decl.arg_patterns = patterns;
        }
        func
    }

    fn param_tuple(&mut self, owner: DeclId, params: &[(&str, &str)]) -> Pattern {
        let elements = params
            .iter()
            .map(|(name, ty)| {
                let var = self.detached(Self::var_decl(name), DeclContext::Decl(owner));
                TuplePatternElement {
                    pattern: Pattern::typed(Pattern::named(var, s()), named(ty)),
                    default: None,
                }
            })
            .collect();
        Pattern::tuple(elements, s())
    }

    fn constructor(&mut self, owner: DeclId, params: &[(&str, &str)]) -> DeclId {
        let ctor = self.add_kind(
            DeclKind::Constructor(ConstructorDecl {
                generic_params: None,
                arguments: Pattern::tuple(Vec::new(), s()),
                self_type: None,
                initializer_type: None,
                implicit_kind: None,
                body: None,
            }),
            DeclContext::Decl(owner),
        );
        let arguments = self.param_tuple(ctor, params);
        if let DeclKind::Constructor(decl) = &mut self.module.decl_mut(ctor).kind {
            decl.arguments = arguments;
        }
        ctor
    }

    /// A generic parameter `name : inherited` owned by `owner`.
    fn generic_param(&mut self, owner: DeclId, name: &str, inherited: Vec<TypeLoc>) -> DeclId {
        self.detached(
            DeclKind::TypeAlias(TypeAliasDecl {
                name: name.to_string(),
                underlying: named(name),
                generic_param: true,
                inheritance: InheritanceInfo::new(inherited),
            }),
            DeclContext::Decl(owner),
        )
    }

    fn set_attrs(&mut self, id: DeclId, attrs: DeclAttributes) {
        self.module.decl_mut(id).attrs = attrs;
    }

    fn checker(self) -> TypeChecker {
        TypeChecker::new(self.module)
    }

    fn traced_checker(self) -> TypeChecker {
        let options = CheckerOptions {
            tracing: true,
            ..CheckerOptions::default()
        };
        TypeChecker::with_options(self.module, ScopeServices, options)
    }
}

fn ty_of(checker: &TypeChecker, id: DeclId) -> String {
    checker
        .module()
        .decl(id)
        .ty
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default()
}

fn messages(checker: &TypeChecker) -> Vec<String> {
    checker
        .diagnostics()
        .iter()
        .map(|diag| diag.message.clone())
        .collect()
}

fn implicit_ctors(checker: &TypeChecker, strukt: DeclId) -> Vec<(DeclId, ImplicitConstructorKind)> {
    checker
        .module()
        .decl(strukt)
        .members()
        .iter()
        .filter_map(|member| match &checker.module().decl(*member).kind {
            DeclKind::Constructor(ConstructorDecl {
                implicit_kind: Some(kind),
                ..
            }) => Some((*member, *kind)),
            _ => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Inheritance clauses
// ---------------------------------------------------------------------------

#[test]
fn superclass_out_of_place_is_moved_first() {
    let mut tree = Tree::library();
    let base = tree.class("Base");
    tree.protocol("P1");
    tree.protocol("P2");
    let c = tree.nominal(
        DeclKind::Class,
        "C",
        vec![
            named_at("P1", sp(10, 12)),
            named_at("Base", sp(14, 18)),
            named_at("P2", sp(20, 22)),
        ],
    );
    let mut checker = tree.checker();
    checker.check_inheritance_clause(c);

    let info = checker.module().decl(c).inheritance().unwrap().clone();
    assert!(info.resolved);
    assert_eq!(info.superclass.as_ref().and_then(Type::class_decl), Some(base));
    let names: Vec<&str> = info.protocols.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["P1", "P2"]);

    let diags = checker.diagnostics();
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].category, Category::SuperclassNotFirst);
    insta::assert_snapshot!(diags[0].to_string(), @r"
    error[E0103]: superclass `Base` must appear first in the inheritance clause
      fix: remove 12..18
      fix: insert `Base, ` at 10
    ");
}

#[test]
fn second_class_is_multiple_inheritance() {
    let mut tree = Tree::library();
    let a = tree.class("A");
    tree.class("B");
    let c = tree.nominal(DeclKind::Class, "C", vec![named("A"), named("B")]);
    let mut checker = tree.checker();
    checker.check_inheritance_clause(c);

    let info = checker.module().decl(c).inheritance().unwrap();
    assert_eq!(info.superclass.as_ref().and_then(Type::class_decl), Some(a));
    assert_eq!(checker.diagnostics().len(), 1);
    assert_eq!(checker.diagnostics()[0].category, Category::MultipleInheritance);
    assert_eq!(
        checker.diagnostics()[0].message,
        "multiple inheritance from classes `A` and `B`"
    );
}

#[test]
fn duplicate_protocol_is_dropped_with_fix_it() {
    let mut tree = Tree::library();
    tree.protocol("P");
    let st = tree.nominal(
        DeclKind::Struct,
        "S",
        vec![named_at("P", sp(10, 11)), named_at("P", sp(13, 14))],
    );
    let mut checker = tree.checker();
    checker.check_inheritance_clause(st);

    let info = checker.module().decl(st).inheritance().unwrap();
    assert_eq!(info.protocols.len(), 1);
    assert!(!info.inherited[0].invalid);
    assert!(info.inherited[1].invalid);

    let diag = &checker.diagnostics()[0];
    assert_eq!(diag.category, Category::DuplicateInheritance);
    assert_eq!(diag.labels.len(), 1);
    let FixIt::Remove { range } = &diag.fix_its[0] else {
        panic!("expected a removal, got {:?}", diag.fix_its);
    };
    assert_eq!((range.start, range.end), (11, 14));
}

#[test]
fn struct_cannot_inherit_from_class() {
    let mut tree = Tree::library();
    tree.class("Base");
    let st = tree.nominal(DeclKind::Struct, "S", vec![named("Base")]);
    let mut checker = tree.checker();
    checker.check_inheritance_clause(st);

    assert!(checker.module().decl(st).inheritance().unwrap().superclass.is_none());
    assert_eq!(
        messages(&checker),
        ["non-class struct `S` cannot inherit from class `Base`"]
    );
    assert_eq!(checker.diagnostics()[0].category, Category::NonClassInheritance);
}

#[test]
fn non_protocol_wording_depends_on_class_ability() {
    let mut tree = Tree::library();
    let st = tree.nominal(DeclKind::Struct, "S", vec![named("Int")]);
    let c = tree.nominal(DeclKind::Class, "C", vec![named("Int")]);
    let mut checker = tree.checker();
    checker.check_inheritance_clause(st);
    checker.check_inheritance_clause(c);

    assert_eq!(
        messages(&checker),
        [
            "inheritance from non-protocol type `Builtin.Int64`",
            "inheritance from non-protocol, non-class type `Builtin.Int64`",
        ]
    );
    assert!(checker
        .diagnostics()
        .iter()
        .all(|diag| diag.category == Category::InheritanceFromNonProtocol));
}

#[test]
fn unresolved_entry_does_not_stop_the_clause() {
    let mut tree = Tree::library();
    tree.protocol("P");
    let st = tree.nominal(DeclKind::Struct, "S", vec![named("Missing"), named("P")]);
    let mut checker = tree.checker();
    checker.check_inheritance_clause(st);

    let info = checker.module().decl(st).inheritance().unwrap();
    assert!(info.inherited[0].invalid);
    assert_eq!(info.protocols.len(), 1);
    assert_eq!(checker.diagnostics()[0].category, Category::UnresolvedType);
}

#[test]
fn inheritance_is_resolved_once() {
    let mut tree = Tree::library();
    tree.class("A");
    tree.class("B");
    let c = tree.nominal(DeclKind::Class, "C", vec![named("A"), named("B")]);
    let mut checker = tree.checker();
    checker.check_inheritance_clause(c);
    checker.check_inheritance_clause(c);
    assert_eq!(checker.diagnostics().len(), 1);
}

#[test]
fn direct_conforms_to_resolves_on_demand() {
    let mut tree = Tree::library();
    let p = tree.protocol("P");
    let q = tree.protocol("Q");
    let st = tree.nominal(DeclKind::Struct, "S", vec![named("Q"), named("P")]);
    let mut checker = tree.checker();

    let protocols = checker.direct_conforms_to(st);
    assert_eq!(
        protocols,
        vec![ProtocolRef::new(q, "Q"), ProtocolRef::new(p, "P")]
    );
}

#[test]
fn protocol_clause_records_unknown_conformances() {
    let mut tree = Tree::library();
    tree.protocol("Base");
    let derived = tree.nominal(DeclKind::Protocol, "Derived", vec![named("Base")]);
    let mut checker = tree.checker();
    checker.check_inheritance_clause(derived);

    let info = checker.module().decl(derived).inheritance().unwrap();
    assert_eq!(info.conformances, Some(vec![None]));
}

// ---------------------------------------------------------------------------
// Generic parameters
// ---------------------------------------------------------------------------

#[test]
fn generic_struct_parameters_get_archetypes() {
    let mut tree = Tree::library();
    let p = tree.protocol("P");
    let boxed = tree.strukt("Box");
    let t = tree.generic_param(boxed, "T", vec![named("P")]);
    if let Some(nominal) = tree.module.decl_mut(boxed).nominal_mut() {
        nominal.generic_params = Some(GenericParamList::new(vec![t], Vec::new(), s()));
    }
    let mut checker = tree.checker();
    checker.check_generic_params(boxed, None);

    let params = checker.module().decl(boxed).generic_params().unwrap().clone();
    assert!(params.archetypes_assigned);
    assert_eq!(params.all_archetypes.len(), 1);
    let archetype = &params.all_archetypes[0];
    assert_eq!(archetype.name, "T");
    let stored = checker.session().archetypes.get(archetype.id);
    assert_eq!(stored.index, Some(0));
    assert_eq!(stored.conforms_to, vec![ProtocolRef::new(p, "P")]);

    let alias = checker.module().decl(t).type_alias().unwrap();
    assert_eq!(alias.underlying.ty, Some(Type::Archetype(archetype.clone())));

    // A second request leaves the table untouched.
    let allocated = checker.session().archetypes.len();
    checker.check_generic_params(boxed, None);
    assert_eq!(checker.session().archetypes.len(), allocated);
}

#[test]
fn conformance_to_concrete_type_is_an_invalid_requirement() {
    let mut tree = Tree::library();
    let boxed = tree.strukt("Box");
    let t = tree.generic_param(boxed, "T", Vec::new());
    let requirement = Requirement::conformance(named("T"), named("Int"));
    if let Some(nominal) = tree.module.decl_mut(boxed).nominal_mut() {
        nominal.generic_params = Some(GenericParamList::new(vec![t], vec![requirement], sp(5, 9)));
    }
    let mut checker = tree.checker();
    checker.check_generic_params(boxed, None);

    assert_eq!(
        messages(&checker),
        ["type `T` constrained to non-protocol type `Builtin.Int64`"]
    );
    assert_eq!(checker.diagnostics()[0].category, Category::InvalidRequirement);
    let params = checker.module().decl(boxed).generic_params().unwrap();
    assert!(params.requirements[0].invalid);
    assert_eq!(params.all_archetypes.len(), 1);
}

#[test]
fn associated_types_become_nested_archetypes() {
    let mut tree = Tree::library();
    let container = tree.protocol("Container");
    let element = tree.add_kind(
        DeclKind::TypeAlias(TypeAliasDecl {
            name: "Element".to_string(),
            underlying: named("Element"),
            generic_param: false,
            inheritance: InheritanceInfo::default(),
        }),
        DeclContext::Decl(container),
    );
    let first = tree.add_kind(
        DeclKind::Func(FuncDecl {
            name: "first".to_string(),
            generic_params: None,
            arg_patterns: Vec::new(),
            result: Some(TypeLoc::new(
                TypeRepr::member(TypeRepr::named("C"), "Element"),
                s(),
            )),
            is_static: false,
            accessor_for: None,
        }),
        DeclContext::Module,
    );
    let c = tree.generic_param(first, "C", vec![named("Container")]);
    let arguments = tree.param_tuple(first, &[("c", "C")]);
    if let DeclKind::Func(func) = &mut tree.module.decl_mut(first).kind {
        func.generic_params = Some(GenericParamList::new(vec![c], Vec::new(), s()));
        func.arg_patterns = vec![arguments];
    }
    let mut checker = tree.checker();
    checker.check_module();

    assert!(checker.diagnostics().is_empty(), "{:?}", messages(&checker));
    let members = checker.module().decl(container).members().to_vec();
    assert_eq!(checker.module().decl(members[0]).name(), Some("Self"));
    assert!(checker.module().decl(members[0]).implicit);
    let alias = checker.module().decl(element).type_alias().unwrap();
    assert_eq!(
        alias.underlying.ty.as_ref().and_then(Type::archetype).map(|a| a.name),
        Some("Self.Element".to_string())
    );
    assert_eq!(ty_of(&checker, first), "<C> (c: C) -> C.Element");
}

/// `Container` with an `Element` associated type.
fn container_protocol(tree: &mut Tree) -> DeclId {
    let container = tree.protocol("Container");
    tree.add_kind(
        DeclKind::TypeAlias(TypeAliasDecl {
            name: "Element".to_string(),
            underlying: named("Element"),
            generic_param: false,
            inheritance: InheritanceInfo::default(),
        }),
        DeclContext::Decl(container),
    );
    container
}

fn member(base: &str, name: &str) -> TypeLoc {
    TypeLoc::new(TypeRepr::member(TypeRepr::named(base), name), s())
}

fn set_generic_params(
    tree: &mut Tree,
    owner: DeclId,
    params: Vec<DeclId>,
    requirements: Vec<Requirement>,
) {
    if let Some(nominal) = tree.module.decl_mut(owner).nominal_mut() {
        nominal.generic_params = Some(GenericParamList::new(params, requirements, sp(5, 9)));
    }
}

#[test]
fn same_type_requirement_unifies_nested_archetypes() {
    let mut tree = Tree::library();
    container_protocol(&mut tree);
    let pair = tree.strukt("Pair");
    let t = tree.generic_param(pair, "T", vec![named("Container")]);
    let u = tree.generic_param(pair, "U", vec![named("Container")]);
    let requirement = Requirement::same_type(member("T", "Element"), member("U", "Element"));
    set_generic_params(&mut tree, pair, vec![t, u], vec![requirement]);
    let mut checker = tree.checker();
    checker.check_generic_params(pair, None);

    assert!(checker.diagnostics().is_empty(), "{:?}", messages(&checker));
    let params = checker.module().decl(pair).generic_params().unwrap().clone();
    assert_eq!(params.all_archetypes.len(), 2);
    assert!(!params.requirements[0].invalid);
    let table = &checker.session().archetypes;
    let t_element = table.nested_type(params.all_archetypes[0].id, "Element").unwrap();
    let u_element = table.nested_type(params.all_archetypes[1].id, "Element").unwrap();
    assert_eq!(t_element.id, u_element.id);
    assert_eq!(t_element.name, "T.Element");
    assert_ne!(params.all_archetypes[0].id, params.all_archetypes[1].id);
}

#[test]
fn same_type_requirement_to_concrete_type_is_rejected() {
    let mut tree = Tree::library();
    container_protocol(&mut tree);
    let boxed = tree.strukt("Box");
    let t = tree.generic_param(boxed, "T", vec![named("Container")]);
    let requirement = Requirement::same_type(member("T", "Element"), named("Int"));
    set_generic_params(&mut tree, boxed, vec![t], vec![requirement]);
    let mut checker = tree.checker();
    checker.check_generic_params(boxed, None);

    assert_eq!(
        messages(&checker),
        ["same-type requirement `T.Element == Int` to a concrete type is not supported"]
    );
    assert_eq!(checker.diagnostics()[0].category, Category::InvalidRequirement);
    let params = checker.module().decl(boxed).generic_params().unwrap();
    assert!(params.requirements[0].invalid);
    assert_eq!(params.all_archetypes.len(), 1);
}

#[test]
fn same_type_requirement_with_conflicting_superclasses_is_rejected() {
    let mut tree = Tree::library();
    tree.class("A");
    tree.class("B");
    let pair = tree.strukt("Pair");
    let t = tree.generic_param(pair, "T", vec![named("A")]);
    let u = tree.generic_param(pair, "U", vec![named("B")]);
    let requirement = Requirement::same_type(named("T"), named("U"));
    set_generic_params(&mut tree, pair, vec![t, u], vec![requirement]);
    let mut checker = tree.checker();
    checker.check_generic_params(pair, None);

    assert_eq!(
        messages(&checker),
        ["`T` and `U` have conflicting superclasses `A` and `B`"]
    );
    let params = checker.module().decl(pair).generic_params().unwrap();
    assert!(params.requirements[0].invalid);
    assert_eq!(params.all_archetypes.len(), 2);
}

// ---------------------------------------------------------------------------
// Declaration types
// ---------------------------------------------------------------------------

#[test]
fn generic_function_is_polymorphic_over_its_parameters() {
    let mut tree = Tree::library();
    let id = tree.func(DeclContext::Module, "identity", &[], Some("T"));
    let t = tree.generic_param(id, "T", Vec::new());
    let arguments = tree.param_tuple(id, &[("x", "T")]);
    if let DeclKind::Func(func) = &mut tree.module.decl_mut(id).kind {
        func.generic_params = Some(GenericParamList::new(vec![t], Vec::new(), s()));
        func.arg_patterns = vec![arguments];
    }
    let mut checker = tree.checker();
    checker.check_module();

    assert!(checker.diagnostics().is_empty(), "{:?}", messages(&checker));
    assert_eq!(ty_of(&checker, id), "<T> (x: T) -> T");
    let Some(Type::PolymorphicFunction(poly)) = &checker.module().decl(id).ty else {
        panic!("expected a polymorphic function type");
    };
    assert_eq!(poly.generic_owner, id);
    assert_eq!(poly.archetypes.len(), 1);
}

#[test]
fn struct_method_receives_lvalue_self() {
    let mut tree = Tree::library();
    let st = tree.strukt("S");
    let get = tree.func(DeclContext::Decl(st), "get", &[], Some("Int"));
    let mut checker = tree.checker();
    checker.check_module();

    assert_eq!(ty_of(&checker, get), "@lvalue S -> () -> Builtin.Int64");
    let DeclKind::Func(func) = &checker.module().decl(get).kind else {
        unreachable!();
    };
    let receiver = func.arg_patterns[0].single_var().unwrap();
    assert_eq!(ty_of(&checker, receiver), "@lvalue S");
}

#[test]
fn class_method_receives_self_by_value() {
    let mut tree = Tree::library();
    let c = tree.class("C");
    let run = tree.func(DeclContext::Decl(c), "run", &[], None);
    let mut checker = tree.checker();
    checker.check_module();
    assert_eq!(ty_of(&checker, run), "C -> () -> ()");
}

#[test]
fn no_return_moves_to_the_innermost_level() {
    let mut tree = Tree::library();
    let c = tree.class("C");
    let fail = tree.func(DeclContext::Decl(c), "fail", &[], None);
    tree.set_attrs(
        fail,
        DeclAttributes {
            no_return: true,
            ..DeclAttributes::default()
        },
    );
    let mut checker = tree.checker();
    checker.check_module();

    let decl = checker.module().decl(fail);
    assert!(!decl.attrs.no_return);
    let Some(Type::Function(outer)) = &decl.ty else {
        panic!("expected a function type");
    };
    assert!(!outer.ext.no_return);
    let Type::Function(inner) = outer.result.as_ref() else {
        panic!("expected a curried function type");
    };
    assert!(inner.ext.no_return);
}

#[test]
fn enum_cases_construct_the_enum() {
    let mut tree = Tree::library();
    let e = tree.nominal(DeclKind::Enum, "E", Vec::new());
    let case = |name: &str, argument: Option<TypeLoc>| {
        DeclKind::EnumCase(EnumCaseDecl {
            name: name.to_string(),
            argument,
            result: None,
        })
    };
    let a = tree.add_kind(case("a", None), DeclContext::Decl(e));
    let b = tree.add_kind(case("b", Some(named("Int"))), DeclContext::Decl(e));
    let mut checker = tree.checker();
    checker.check_module();

    assert_eq!(ty_of(&checker, a), "E.Type -> E");
    assert_eq!(ty_of(&checker, b), "E.Type -> Builtin.Int64 -> E");
}

#[test]
fn constructor_has_allocating_and_initializing_types() {
    let mut tree = Tree::library();
    let st = tree.strukt("S");
    let ctor = tree.constructor(st, &[("x", "Int")]);
    let mut checker = tree.checker();
    let report = checker.check_module();

    assert_eq!(ty_of(&checker, ctor), "S.Type -> (x: Builtin.Int64) -> S");
    let DeclKind::Constructor(decl) = &checker.module().decl(ctor).kind else {
        unreachable!();
    };
    assert_eq!(
        decl.initializer_type.as_ref().map(ToString::to_string).as_deref(),
        Some("S -> (x: Builtin.Int64) -> S")
    );
    assert_eq!(decl.self_type.as_ref().map(ToString::to_string).as_deref(), Some("S"));

    // A written constructor suppresses the implicit ones.
    assert!(implicit_ctors(&checker, st).is_empty());
    assert!(!checker.session().is_pending_default_constructor(st));
    assert!(report.implicitly_defined.is_empty());
}

#[test]
fn subscript_maps_indices_to_element() {
    let mut tree = Tree::library();
    let st = tree.strukt("Grid");
    let subscript = tree.add_kind(
        DeclKind::Subscript(wren_ast::SubscriptDecl {
            indices: Pattern::tuple(Vec::new(), s()),
            element: named("Double"),
        }),
        DeclContext::Decl(st),
    );
    let index = tree.detached(Tree::var_decl("i"), DeclContext::Decl(subscript));
    if let DeclKind::Subscript(decl) = &mut tree.module.decl_mut(subscript).kind {
        decl.indices = Pattern::tuple(
            vec![TuplePatternElement {
                pattern: Pattern::typed(Pattern::named(index, s()), named("Int")),
                default: None,
            }],
            s(),
        );
    }
    let mut checker = tree.checker();
    checker.check_module();
    assert_eq!(ty_of(&checker, subscript), "(i: Builtin.Int64) -> Builtin.Float64");
}

#[test]
fn nominal_type_is_its_metatype() {
    let mut tree = Tree::library();
    let st = tree.strukt("S");
    let mut checker = tree.checker();
    checker.check_module();
    assert_eq!(ty_of(&checker, st), "S.Type");
}

// ---------------------------------------------------------------------------
// Implicit constructors
// ---------------------------------------------------------------------------

#[test]
fn struct_gets_memberwise_and_default_constructors() {
    let mut tree = Tree::library();
    let point = tree.strukt("Point");
    tree.field(point, "x", "Int");
    tree.field(point, "y", "Int");
    let mut checker = tree.checker();
    let report = checker.check_module();

    assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
    let ctors = implicit_ctors(&checker, point);
    let kinds: Vec<_> = ctors.iter().map(|(_, kind)| *kind).collect();
    assert_eq!(
        kinds,
        [ImplicitConstructorKind::Memberwise, ImplicitConstructorKind::Default]
    );

    let DeclKind::Constructor(memberwise) = &checker.module().decl(ctors[0].0).kind else {
        unreachable!();
    };
    assert_eq!(
        memberwise.arguments.ty.as_ref().map(ToString::to_string).as_deref(),
        Some("(x: Builtin.Int64, y: Builtin.Int64)")
    );
    assert!(memberwise.body.is_none());

    let DeclKind::Constructor(default) = &checker.module().decl(ctors[1].0).kind else {
        unreachable!();
    };
    assert!(default.body.is_some());
    assert!(checker.module().decl(ctors[1].0).implicit);
    assert_eq!(report.implicitly_defined, vec![ctors[1].0]);

    let ty = checker.module().declared_type(point).unwrap();
    assert!(checker.is_default_initializable(&ty));
}

#[test]
fn existential_field_blocks_the_default_constructor() {
    let mut tree = Tree::library();
    tree.protocol("P");
    let holder = tree.strukt("Holder");
    tree.field(holder, "p", "P");
    let mut checker = tree.traced_checker();
    let report = checker.check_module();

    let kinds: Vec<_> = implicit_ctors(&checker, holder)
        .into_iter()
        .map(|(_, kind)| kind)
        .collect();
    assert_eq!(kinds, [ImplicitConstructorKind::Memberwise]);
    assert!(report.implicitly_defined.is_empty());
    assert!(checker
        .check_trace()
        .iter()
        .any(|step| step.action == CheckAction::SkipDefaultConstructor && step.decl == holder.0));
}

#[test]
fn field_structs_are_defined_first() {
    let mut tree = Tree::library();
    let outer = tree.strukt("Outer");
    tree.field(outer, "inner", "Inner");
    let inner = tree.strukt("Inner");
    tree.field(inner, "x", "Int");
    let mut checker = tree.checker();
    let report = checker.check_module();

    assert_eq!(report.implicitly_defined.len(), 2);
    let owners: Vec<DeclContext> = report
        .implicitly_defined
        .iter()
        .map(|ctor| checker.module().decl(*ctor).context)
        .collect();
    assert_eq!(owners, [DeclContext::Decl(inner), DeclContext::Decl(outer)]);
    assert_eq!(checker.session().pending_default_constructors().count(), 0);
}

#[test]
fn empty_struct_gets_only_a_nullary_memberwise_constructor() {
    let mut tree = Tree::library();
    let unit = tree.strukt("Unit");
    let mut checker = tree.checker();
    let report = checker.check_module();

    let kinds: Vec<_> = implicit_ctors(&checker, unit)
        .into_iter()
        .map(|(_, kind)| kind)
        .collect();
    assert_eq!(kinds, [ImplicitConstructorKind::Memberwise]);
    assert!(report.implicitly_defined.is_empty());
    let ty = checker.module().declared_type(unit).unwrap();
    assert!(checker.is_default_initializable(&ty));
}

#[test]
fn ambiguous_nullary_constructors_are_not_a_default() {
    let mut tree = Tree::library();
    let twice = tree.strukt("Twice");
    tree.constructor(twice, &[]);
    tree.constructor(twice, &[]);
    let once = tree.strukt("Once");
    tree.constructor(once, &[]);
    let mut checker = tree.checker();
    checker.check_module();

    let twice = checker.module().declared_type(twice).unwrap();
    let once = checker.module().declared_type(once).unwrap();
    assert_eq!(checker.default_initializer(&twice), None);
    let Some(Expr {
        kind: ExprKind::Call { callee, .. },
        ..
    }) = checker.default_initializer(&once)
    else {
        panic!("expected a constructor call");
    };
    assert_eq!(callee.ty, Some(Type::metatype(once)));
}

#[test]
fn tuple_default_value_is_elementwise() {
    let checker = Tree::library().checker();
    let pair = Type::Tuple(vec![
        TupleElement::named("x", int()),
        TupleElement::named("y", Type::Builtin(BuiltinType::Float(64))),
    ]);
    let Some(Expr {
        kind: ExprKind::Tuple { elements, names },
        ..
    }) = checker.default_initializer(&pair)
    else {
        panic!("expected a tuple expression");
    };
    assert_eq!(names, [Some("x".to_string()), Some("y".to_string())]);
    assert!(elements.iter().all(|e| e.kind == ExprKind::ZeroValue));

    let single = Type::Tuple(vec![TupleElement::unnamed(int())]);
    assert_eq!(checker.default_initializer(&single), Some(Expr::zero_value(int())));

    let existential = Type::Protocol(ProtocolRef::new(DeclId(0), "P"));
    let mixed = Type::Tuple(vec![TupleElement::unnamed(int()), TupleElement::unnamed(existential)]);
    assert!(!checker.is_default_initializable(&mixed));

    let array = Type::Array {
        element: Box::new(int()),
        size: 4,
    };
    assert!(!checker.is_default_initializable(&array));
}

#[test]
fn extension_constructor_keeps_the_memberwise_constructor() {
    let mut tree = Tree::library();
    let st = tree.strukt("S");
    tree.field(st, "x", "Int");
    let ext = tree.add_kind(extension("S"), DeclContext::Module);
    tree.constructor(ext, &[("a", "Int")]);
    let mut checker = tree.checker();
    let report = checker.check_module();

    assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
    let kinds: Vec<_> = implicit_ctors(&checker, st)
        .into_iter()
        .map(|(_, kind)| kind)
        .collect();
    assert_eq!(
        kinds,
        [ImplicitConstructorKind::Memberwise, ImplicitConstructorKind::Default]
    );
}

#[test]
fn imported_struct_constructors_are_external_definitions() {
    let mut tree = Tree::library();
    let st = tree.strukt("Imported");
    tree.field(st, "x", "Int");
    if let Some(nominal) = tree.module.decl_mut(st).nominal_mut() {
        nominal.imported = true;
    }
    let mut checker = tree.checker();
    let report = checker.check_module();

    let ctors = implicit_ctors(&checker, st);
    assert_eq!(ctors[0].1, ImplicitConstructorKind::Memberwise);
    assert_eq!(report.external_definitions, vec![ctors[0].0]);
}

#[test]
fn local_struct_constructors_are_not_external() {
    let mut tree = Tree::library();
    let st = tree.strukt("Local");
    tree.field(st, "x", "Int");
    let mut checker = tree.checker();
    let report = checker.check_module();
    assert!(report.external_definitions.is_empty());
}

// ---------------------------------------------------------------------------
// Pattern bindings
// ---------------------------------------------------------------------------

#[test]
fn main_unit_default_initializes_module_variables() {
    let mut tree = Tree::new(UnitKind::Main);
    tree.protocol("P");
    let (n, n_binding) = tree.binding(DeclContext::Module, "n", Some("Int"), None);
    let (_, p_binding) = tree.binding(DeclContext::Module, "p", Some("P"), None);
    let mut checker = tree.checker();
    let report = checker.check_module();

    assert_eq!(ty_of(&checker, n), "Builtin.Int64");
    let DeclKind::PatternBinding(binding) = &checker.module().decl(n_binding).kind else {
        unreachable!();
    };
    assert_eq!(binding.init, Some(Expr::zero_value(int())));

    assert_eq!(report.diagnostics.len(), 1);
    let diag = &report.diagnostics[0];
    assert_eq!(diag.category, Category::NoDefaultInitializer);
    assert_eq!(diag.message, "variable of type `P` has no default value");
    assert_eq!(diag.help.as_deref(), Some("add an initializer"));
    assert!(checker.module().decl(p_binding).invalid);
}

#[test]
fn library_module_variables_are_not_default_initialized() {
    let mut tree = Tree::library();
    let (n, binding) = tree.binding(DeclContext::Module, "n", Some("Int"), None);
    let mut checker = tree.checker();
    checker.check_module();

    assert_eq!(ty_of(&checker, n), "Builtin.Int64");
    let DeclKind::PatternBinding(binding) = &checker.module().decl(binding).kind else {
        unreachable!();
    };
    assert_eq!(binding.init, None);
}

#[test]
fn untyped_binding_takes_its_initializer_type() {
    let mut tree = Tree::library();
    let literal = Expr::new(ExprKind::IntLiteral(1), s());
    let (x, _) = tree.binding(DeclContext::Module, "x", None, Some(literal));
    let reference = Expr::new(ExprKind::NameRef("x".to_string()), s());
    let (y, _) = tree.binding(DeclContext::Module, "y", Some("Int"), Some(reference));
    let mut checker = tree.checker();
    let report = checker.check_module();

    assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
    assert_eq!(ty_of(&checker, x), "Builtin.Int64");
    assert_eq!(ty_of(&checker, y), "Builtin.Int64");
}

#[test]
fn mismatched_initializer_gets_a_converting_note() {
    let mut tree = Tree::library();
    let init = Expr::new(ExprKind::FloatLiteral(1.5), s());
    tree.binding(DeclContext::Module, "d", Some("Int"), Some(init));
    let mut checker = tree.checker();
    let report = checker.check_module();

    let diags = &report.diagnostics;
    assert_eq!(diags.len(), 2);
    assert_eq!(diags[0].category, Category::InitializerMismatch);
    assert_eq!(
        diags[0].message,
        "cannot convert value of type `Builtin.Float64` to `Builtin.Int64`"
    );
    assert_eq!(diags[1].severity, Severity::Note);
    assert_eq!(diags[1].message, "while converting initializer to `Builtin.Int64`");

    let err = report.into_result().unwrap_err();
    assert_eq!(err.diagnostics().len(), 1);
}

#[test]
fn clean_report_converts_to_ok() {
    let mut tree = Tree::library();
    tree.strukt("S");
    let mut checker = tree.checker();
    let report = checker.check_module();
    assert!(!report.has_errors());
    assert!(report.into_result().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

fn weak() -> DeclAttributes {
    DeclAttributes {
        ownership: Some(Ownership::Weak),
        ..DeclAttributes::default()
    }
}

#[test]
fn weak_class_reference_becomes_reference_storage() {
    let mut tree = Tree::library();
    let c = tree.class("C");
    let (var, _) =
        tree.binding_with_attrs(DeclContext::Module, "c", Some("C"), None, weak());
    let mut checker = tree.checker();
    checker.check_module();

    assert!(checker.diagnostics().is_empty(), "{:?}", messages(&checker));
    let Some(Type::ReferenceStorage {
        ownership,
        referent,
    }) = &checker.module().decl(var).ty
    else {
        panic!("expected reference storage");
    };
    assert_eq!(*ownership, Ownership::Weak);
    assert_eq!(referent.class_decl(), Some(c));
    assert_eq!(ty_of(&checker, var), "@weak C");
}

#[test]
fn weak_value_type_is_rejected_and_cleared() {
    let mut tree = Tree::library();
    let (var, _) =
        tree.binding_with_attrs(DeclContext::Module, "n", Some("Int"), None, weak());
    let mut checker = tree.checker();
    checker.check_module();

    assert_eq!(
        messages(&checker),
        ["`weak` cannot be applied to non-class type `Builtin.Int64`"]
    );
    assert_eq!(checker.diagnostics()[0].category, Category::OwnershipAttribute);
    assert_eq!(checker.module().decl(var).attrs.ownership, None);
    assert_eq!(ty_of(&checker, var), "Builtin.Int64");
}

#[test]
fn infix_requires_two_operands() {
    let mut tree = Tree::library();
    let plus = tree.func(DeclContext::Module, "+", &[("a", "Int")], Some("Int"));
    tree.set_attrs(
        plus,
        DeclAttributes {
            infix: true,
            ..DeclAttributes::default()
        },
    );
    let mut checker = tree.checker();
    checker.check_module();

    assert_eq!(messages(&checker), ["`infix` attribute requires a binary operator"]);
    assert!(!checker.module().decl(plus).attrs.infix);
}

#[test]
fn binary_infix_operator_is_accepted() {
    let mut tree = Tree::library();
    let plus = tree.func(DeclContext::Module, "+", &[("a", "Int"), ("b", "Int")], Some("Int"));
    tree.set_attrs(
        plus,
        DeclAttributes {
            infix: true,
            ..DeclAttributes::default()
        },
    );
    let mut checker = tree.checker();
    checker.check_module();

    assert!(checker.diagnostics().is_empty(), "{:?}", messages(&checker));
    assert!(checker.module().decl(plus).attrs.infix);
}

#[test]
fn unary_ampersand_is_reserved() {
    let mut tree = Tree::library();
    let amp = tree.func(DeclContext::Module, "&", &[("a", "Int")], Some("Int"));
    let mut checker = tree.checker();
    checker.check_module();

    assert_eq!(messages(&checker), ["cannot declare a custom unary `&` operator"]);
    assert_eq!(checker.diagnostics()[0].category, Category::OperatorAttribute);
    assert!(checker.module().decl(amp).invalid);
}

#[test]
fn operator_named_variable_is_rejected() {
    let mut tree = Tree::library();
    let (var, _) = tree.binding(DeclContext::Module, "+", Some("Int"), None);
    let mut checker = tree.checker();
    checker.check_module();

    assert_eq!(messages(&checker), ["operator `+` must be declared as a function"]);
    assert!(checker.module().decl(var).invalid);
}

#[test]
fn function_type_attributes_are_rejected_on_funcs() {
    let mut tree = Tree::library();
    let f = tree.func(DeclContext::Module, "f", &[], None);
    tree.set_attrs(
        f,
        DeclAttributes {
            thin: true,
            byref: true,
            ..DeclAttributes::default()
        },
    );
    let mut checker = tree.checker();
    checker.check_module();

    assert_eq!(
        messages(&checker),
        [
            "`thin` attribute is not allowed on func declarations",
            "`byref` attribute is not allowed on func declarations",
        ]
    );
    assert!(checker
        .diagnostics()
        .iter()
        .all(|diag| diag.category == Category::InvalidAttribute));
    assert!(checker.module().decl(f).attrs.is_empty());
}

#[test]
fn interop_on_struct_is_rejected() {
    let mut tree = Tree::library();
    let st = tree.strukt("S");
    tree.set_attrs(
        st,
        DeclAttributes {
            interop: true,
            ..DeclAttributes::default()
        },
    );
    let mut checker = tree.checker();
    checker.check_module();

    assert_eq!(checker.diagnostics()[0].category, Category::InteropAttribute);
    assert!(!checker.module().decl(st).attrs.interop);
    assert!(!checker.module().decl(st).interop);
}

#[test]
fn unowned_class_reference_becomes_reference_storage() {
    let mut tree = Tree::library();
    tree.class("C");
    let attrs = DeclAttributes {
        ownership: Some(Ownership::Unowned),
        ..DeclAttributes::default()
    };
    let (var, _) = tree.binding_with_attrs(DeclContext::Module, "c", Some("C"), None, attrs);
    let mut checker = tree.checker();
    checker.check_module();

    assert!(checker.diagnostics().is_empty(), "{:?}", messages(&checker));
    assert_eq!(ty_of(&checker, var), "@unowned C");
}

#[test]
fn ownership_on_a_function_is_cleared_without_touching_its_type() {
    let mut tree = Tree::library();
    let f = tree.func(DeclContext::Module, "f", &[], None);
    tree.set_attrs(f, weak());
    let mut checker = tree.checker();
    checker.check_module();

    assert_eq!(messages(&checker), ["`weak` attribute only applies to variables"]);
    assert_eq!(checker.diagnostics()[0].category, Category::OwnershipAttribute);
    assert_eq!(checker.module().decl(f).attrs.ownership, None);
    assert_eq!(ty_of(&checker, f), "() -> ()");
}

fn outlet() -> DeclAttributes {
    DeclAttributes {
        outlet: true,
        ..DeclAttributes::default()
    }
}

#[test]
fn outlet_only_applies_to_class_variables() {
    let mut tree = Tree::library();
    let c = tree.class("C");
    let (kept, _) =
        tree.binding_with_attrs(DeclContext::Decl(c), "view", Some("Int"), None, outlet());
    let st = tree.strukt("S");
    let (dropped, _) =
        tree.binding_with_attrs(DeclContext::Decl(st), "view", Some("Int"), None, outlet());
    let mut checker = tree.checker();
    checker.check_module();

    assert_eq!(
        messages(&checker),
        ["`outlet` attribute only applies to class variables"]
    );
    assert_eq!(checker.diagnostics()[0].category, Category::InterfaceAttribute);
    assert!(checker.module().decl(kept).attrs.outlet);
    assert!(!checker.module().decl(dropped).attrs.outlet);
}

fn action() -> DeclAttributes {
    DeclAttributes {
        action: true,
        ..DeclAttributes::default()
    }
}

#[test]
fn action_method_must_return_unit() {
    let mut tree = Tree::library();
    let c = tree.class("C");
    let tap = tree.func(DeclContext::Decl(c), "tap", &[], None);
    tree.set_attrs(tap, action());
    let count = tree.func(DeclContext::Decl(c), "count", &[], Some("Int"));
    tree.set_attrs(count, action());
    let mut checker = tree.checker();
    checker.check_module();

    assert_eq!(messages(&checker), ["`action` methods must return `()`"]);
    assert!(checker.module().decl(tap).attrs.action);
    assert!(!checker.module().decl(count).attrs.action);
}

#[test]
fn action_requires_a_class_method() {
    let mut tree = Tree::library();
    let f = tree.func(DeclContext::Module, "tap", &[], None);
    tree.set_attrs(f, action());
    let mut checker = tree.checker();
    checker.check_module();

    assert_eq!(
        messages(&checker),
        ["`action` attribute only applies to instance methods declared in a class"]
    );
    assert!(!checker.module().decl(f).attrs.action);
}

fn assignment() -> DeclAttributes {
    DeclAttributes {
        assignment: true,
        ..DeclAttributes::default()
    }
}

#[test]
fn assignment_operator_takes_its_target_by_reference() {
    let mut tree = Tree::library();
    let add_assign = tree.func(DeclContext::Module, "+=", &[], None);
    let target = tree.detached(Tree::var_decl("a"), DeclContext::Decl(add_assign));
    let value = tree.detached(Tree::var_decl("b"), DeclContext::Decl(add_assign));
    let byref = TypeLoc::new(TypeRepr::InOut(Box::new(TypeRepr::named("Int"))), s());
    let params = Pattern::tuple(
        vec![
            TuplePatternElement {
                pattern: Pattern::typed(Pattern::named(target, s()), byref),
                default: None,
            },
            TuplePatternElement {
                pattern: Pattern::typed(Pattern::named(value, s()), named("Int")),
                default: None,
            },
        ],
        s(),
    );
    if let DeclKind::Func(func) = &mut tree.module.decl_mut(add_assign).kind {
        func.arg_patterns = vec![params];
    }
    tree.set_attrs(add_assign, assignment());
    let mut checker = tree.checker();
    checker.check_module();

    assert!(checker.diagnostics().is_empty(), "{:?}", messages(&checker));
    assert!(checker.module().decl(add_assign).attrs.assignment);
}

#[test]
fn assignment_operator_by_value_is_rejected() {
    let mut tree = Tree::library();
    let add_assign =
        tree.func(DeclContext::Module, "+=", &[("a", "Int"), ("b", "Int")], None);
    tree.set_attrs(add_assign, assignment());
    let mut checker = tree.checker();
    checker.check_module();

    assert_eq!(
        messages(&checker),
        ["first parameter of an `assignment` operator must be by-reference"]
    );
    assert_eq!(checker.diagnostics()[0].category, Category::OperatorAttribute);
    assert!(!checker.module().decl(add_assign).attrs.assignment);
}

fn conversion() -> DeclAttributes {
    DeclAttributes {
        conversion: true,
        ..DeclAttributes::default()
    }
}

#[test]
fn conversion_must_be_callable_without_arguments() {
    let mut tree = Tree::library();
    let st = tree.strukt("S");
    let nullary = tree.func(DeclContext::Decl(st), "asInt", &[], Some("Int"));
    tree.set_attrs(nullary, conversion());
    let unary = tree.func(DeclContext::Decl(st), "scaled", &[("by", "Int")], Some("Int"));
    tree.set_attrs(unary, conversion());
    let mut checker = tree.checker();
    checker.check_module();

    assert_eq!(
        messages(&checker),
        ["conversion function must be callable with no arguments"]
    );
    assert_eq!(checker.diagnostics()[0].category, Category::ConversionAttribute);
    assert!(checker.module().decl(nullary).attrs.conversion);
    assert!(!checker.module().decl(unary).attrs.conversion);
}

#[test]
fn conversion_on_a_free_function_is_rejected() {
    let mut tree = Tree::library();
    let f = tree.func(DeclContext::Module, "asInt", &[], Some("Int"));
    tree.set_attrs(f, conversion());
    let mut checker = tree.checker();
    checker.check_module();

    assert_eq!(
        messages(&checker),
        ["`conversion` attribute only applies to instance methods"]
    );
}

fn inline_always() -> DeclAttributes {
    DeclAttributes {
        inline_always: true,
        ..DeclAttributes::default()
    }
}

#[test]
fn inline_always_rejects_curried_functions() {
    let mut tree = Tree::library();
    let method = tree.func(DeclContext::Module, "plain", &[("x", "Int")], Some("Int"));
    tree.set_attrs(method, inline_always());
    let curried = tree.func(DeclContext::Module, "curried", &[("x", "Int")], Some("Int"));
    let second = tree.param_tuple(curried, &[("y", "Int")]);
    if let DeclKind::Func(func) = &mut tree.module.decl_mut(curried).kind {
        func.arg_patterns.push(second);
    }
    tree.set_attrs(curried, inline_always());
    let mut checker = tree.checker();
    checker.check_module();

    assert_eq!(
        messages(&checker),
        ["`inline(always)` is not supported on curried functions"]
    );
    assert_eq!(checker.diagnostics()[0].category, Category::InlineAttribute);
    assert!(checker.module().decl(method).attrs.inline_always);
    assert!(!checker.module().decl(curried).attrs.inline_always);
}

#[test]
fn inline_always_counts_levels_after_the_receiver() {
    let mut tree = Tree::library();
    let st = tree.strukt("S");
    let method = tree.func(DeclContext::Decl(st), "get", &[], Some("Int"));
    tree.set_attrs(method, inline_always());
    let mut checker = tree.checker();
    checker.check_module();

    assert!(checker.diagnostics().is_empty(), "{:?}", messages(&checker));
    assert!(checker.module().decl(method).attrs.inline_always);
}

#[test]
fn inline_always_rejects_generic_functions() {
    let mut tree = Tree::library();
    let f = tree.func(DeclContext::Module, "id", &[], None);
    let t = tree.generic_param(f, "T", Vec::new());
    if let DeclKind::Func(func) = &mut tree.module.decl_mut(f).kind {
        func.generic_params = Some(GenericParamList::new(vec![t], Vec::new(), s()));
    }
    tree.set_attrs(f, inline_always());
    let mut checker = tree.checker();
    checker.check_module();

    assert_eq!(
        messages(&checker),
        ["`inline(always)` is not supported on generic functions"]
    );
    assert!(!checker.module().decl(f).attrs.inline_always);
}

#[test]
fn attributes_are_validated_once() {
    let mut tree = Tree::library();
    let st = tree.strukt("S");
    tree.set_attrs(
        st,
        DeclAttributes {
            class_protocol: true,
            ..DeclAttributes::default()
        },
    );
    let mut checker = tree.checker();
    checker.validate_attributes(st);
    checker.validate_attributes(st);
    assert_eq!(checker.diagnostics().len(), 1);
    assert_eq!(checker.diagnostics()[0].category, Category::InvalidAttribute);
}

// ---------------------------------------------------------------------------
// Interop
// ---------------------------------------------------------------------------

fn interop_protocol() -> DeclAttributes {
    DeclAttributes {
        interop: true,
        class_protocol: true,
        ..DeclAttributes::default()
    }
}

#[test]
fn class_members_inherit_interop() {
    let mut tree = Tree::library();
    let c = tree.class("C");
    tree.set_attrs(
        c,
        DeclAttributes {
            interop: true,
            ..DeclAttributes::default()
        },
    );
    let run = tree.func(DeclContext::Decl(c), "run", &[], None);
    let sub = tree.nominal(DeclKind::Class, "D", vec![named("C")]);
    let mut checker = tree.checker();
    checker.check_module();

    assert!(checker.module().decl(c).interop);
    assert!(checker.module().decl(run).interop);
    assert!(checker.module().decl(sub).interop);
}

#[test]
fn interop_protocol_witnesses_become_interop() {
    let mut tree = Tree::library();
    let p = tree.protocol("P");
    tree.set_attrs(p, interop_protocol());
    tree.func(DeclContext::Decl(p), "f", &[], None);
    let q = tree.nominal(DeclKind::Protocol, "Q", vec![named("P")]);
    let direct = tree.nominal(DeclKind::Class, "Direct", vec![named("P")]);
    let direct_f = tree.func(DeclContext::Decl(direct), "f", &[], None);
    let refined = tree.nominal(DeclKind::Class, "Refined", vec![named("Q")]);
    let refined_f = tree.func(DeclContext::Decl(refined), "f", &[], None);
    let mut checker = tree.checker();
    let report = checker.check_module();

    assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
    assert!(checker.module().decl(p).interop);
    assert!(!checker.module().decl(q).interop);
    assert!(!checker.module().decl(direct).interop);
    assert!(checker.module().decl(direct_f).interop);
    assert!(checker.module().decl(refined_f).interop);
    assert!(checker.session().recorded_conformance(p, direct).is_some());
    assert!(checker.session().recorded_conformance(q, refined).is_some());
}

#[test]
fn interop_protocol_cannot_refine_plain_protocol() {
    let mut tree = Tree::library();
    tree.protocol("Base");
    let derived = tree.nominal(DeclKind::Protocol, "Derived", vec![named("Base")]);
    tree.set_attrs(derived, interop_protocol());
    let mut checker = tree.checker();
    checker.check_module();

    let diags = checker.diagnostics();
    assert_eq!(diags.len(), 2);
    assert_eq!(diags[0].category, Category::InteropProtocolInheritance);
    assert_eq!(
        diags[0].message,
        "interop protocol `Derived` cannot refine non-interop protocol `Base`"
    );
    assert_eq!(diags[1].severity, Severity::Note);
    assert!(!checker.module().decl(derived).interop);
}

#[test]
fn missing_requirement_is_a_conformance_error() {
    let mut tree = Tree::library();
    let p = tree.protocol("P");
    tree.func(DeclContext::Decl(p), "f", &[], None);
    let st = tree.nominal(DeclKind::Struct, "S", vec![named("P")]);
    let mut checker = tree.checker();
    checker.check_module();

    let diag = &checker.diagnostics()[0];
    assert_eq!(diag.category, Category::ProtocolConformance);
    assert_eq!(diag.help.as_deref(), Some("add the missing requirement(s): `f`"));
    let info = checker.module().decl(st).inheritance().unwrap();
    assert_eq!(info.conformances, Some(vec![None]));
    assert!(checker.session().recorded_conformance(p, st).is_none());
}

// ---------------------------------------------------------------------------
// Extensions
// ---------------------------------------------------------------------------

fn extension(extended: &str) -> DeclKind {
    DeclKind::Extension(ExtensionDecl {
        extended: named(extended),
        inheritance: InheritanceInfo::default(),
        members: Vec::new(),
    })
}

#[test]
fn extension_registers_on_its_nominal() {
    let mut tree = Tree::library();
    let p = tree.protocol("P");
    tree.func(DeclContext::Decl(p), "f", &[], None);
    let st = tree.strukt("S");
    let ext = tree.add_kind(extension("S"), DeclContext::Module);
    if let Some(info) = tree.module.decl_mut(ext).inheritance_mut() {
        info.inherited = vec![named("P")];
    }
    let f = tree.func(DeclContext::Decl(ext), "f", &[], None);
    let mut checker = tree.checker();
    checker.check_module();

    assert!(checker.diagnostics().is_empty(), "{:?}", messages(&checker));
    assert_eq!(checker.module().decl(st).nominal().unwrap().extensions, [ext]);
    assert_eq!(ty_of(&checker, f), "@lvalue S -> () -> ()");
    assert!(checker.session().recorded_conformance(p, st).is_some());
}

#[test]
fn extending_a_protocol_invalidates_the_extension() {
    let mut tree = Tree::library();
    tree.protocol("P");
    let ext = tree.add_kind(extension("P"), DeclContext::Module);
    let member = tree.func(DeclContext::Decl(ext), "f", &[], None);
    let mut checker = tree.checker();
    checker.check_module();

    assert_eq!(messages(&checker), ["cannot extend protocol type `P`"]);
    assert_eq!(checker.diagnostics()[0].category, Category::NonNominalExtension);
    assert!(checker.module().decl(ext).invalid);
    assert!(checker.module().decl(member).invalid);
}

#[test]
fn extending_a_builtin_is_rejected() {
    let mut tree = Tree::library();
    let ext = tree.add_kind(extension("Int"), DeclContext::Module);
    let mut checker = tree.checker();
    checker.check_module();

    assert_eq!(
        messages(&checker),
        ["non-nominal type `Builtin.Int64` cannot be extended"]
    );
    assert!(checker.module().decl(ext).invalid);
}

#[test]
fn extension_cannot_add_a_superclass() {
    let mut tree = Tree::library();
    tree.class("Base");
    tree.strukt("S");
    let ext = tree.add_kind(extension("S"), DeclContext::Module);
    if let Some(info) = tree.module.decl_mut(ext).inheritance_mut() {
        info.inherited = vec![named("Base")];
    }
    let mut checker = tree.checker();
    checker.check_module();

    assert_eq!(
        messages(&checker),
        ["extension of `S` cannot add a superclass `Base`"]
    );
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

#[test]
#[should_panic(expected = "top-level code is checked by the driver")]
fn top_level_code_is_not_a_declaration_to_check() {
    let mut tree = Tree::library();
    let code = tree.add_kind(DeclKind::TopLevelCode, DeclContext::Module);
    let mut checker = tree.checker();
    checker.typecheck_decl(code, true);
}

#[test]
fn driver_skips_top_level_code() {
    let mut tree = Tree::library();
    tree.add_kind(DeclKind::TopLevelCode, DeclContext::Module);
    tree.strukt("S");
    let (module, report) =
        crate::check_module(tree.module, ScopeServices, CheckerOptions::default());
    assert!(!report.has_errors());
    assert_eq!(module.top_level.len(), 2);
}

#[test]
fn trace_records_both_passes_and_serializes() {
    let mut tree = Tree::library();
    let st = tree.strukt("S");
    tree.field(st, "x", "Int");
    let mut checker = tree.traced_checker();
    checker.check_module();

    let trace = checker.check_trace();
    let dispatches: Vec<Option<PassState>> = trace
        .iter()
        .filter(|step| step.decl == st.0 && step.action == CheckAction::Dispatch)
        .map(|step| step.pass)
        .collect();
    assert_eq!(dispatches, [Some(PassState::First), Some(PassState::Second)]);
    assert!(trace.iter().enumerate().all(|(i, step)| step.step == i));
    assert!(trace
        .iter()
        .any(|step| step.action == CheckAction::DefineDefaultConstructor));

    let json = serde_json::to_value(&trace[0]).unwrap();
    assert_eq!(json["kind"], "struct");
    assert_eq!(json["pass"], "first");
    assert_eq!(json["action"], "dispatch");
}

#[test]
fn trace_is_empty_unless_enabled() {
    let mut tree = Tree::library();
    tree.strukt("S");
    let mut checker = tree.checker();
    checker.check_module();
    assert!(checker.check_trace().is_empty());
}
