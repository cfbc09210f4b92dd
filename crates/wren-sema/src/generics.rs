//! Generic parameter lists and archetype assignment.
//!
//! An [`ArchetypeBuilder`] collects one potential archetype per generic
//! parameter, applies conformance and same-type requirements to them, and
//! then allocates the final archetypes in the session table in one batch.
//! Associated types reachable through a parameter's protocols become nested
//! potential archetypes (`T.Element`), expanded up to a fixed depth.

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexSet;
use wren_ast::{DeclContext, DeclKind, Module, Requirement, RequirementKind, TypeLoc};
use wren_diag::{Category, Diagnostic};
use wren_types::{Archetype, ArchetypeId, ArchetypeRef, ArchetypeTable, DeclId, ProtocolRef, Type};

use crate::services::protocol_parents;
use crate::trace::CheckAction;
use crate::{Services, TypeChecker};

// ---------------------------------------------------------------------------
// Archetype builder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct PotentialArchetype {
    name: String,
    index: Option<u32>,
    conforms_to: IndexSet<ProtocolRef>,
    superclass: Option<Type>,
    nested: BTreeMap<String, usize>,
    /// Union-find link; points at itself for representatives.
    representative: usize,
    depth: usize,
    archetype: Option<ArchetypeId>,
}

/// Builds the archetypes of one generic parameter list.
pub(crate) struct ArchetypeBuilder<'a> {
    module: &'a Module,
    potentials: Vec<PotentialArchetype>,
    /// Primary potential archetypes, in parameter order.
    primaries: Vec<usize>,
    by_decl: BTreeMap<DeclId, usize>,
    max_depth: usize,
}

/// Associated types declared by `protocol` and every protocol it refines.
fn associated_types(module: &Module, protocol: DeclId) -> Vec<DeclId> {
    let mut out = Vec::new();
    let mut visited = BTreeSet::new();
    let mut stack = vec![protocol];
    while let Some(current) = stack.pop() {
        if !visited.insert(current) {
            continue;
        }
        out.extend(module.decl(current).members().iter().copied().filter(|member| {
            module
                .decl(*member)
                .type_alias()
                .is_some_and(|alias| alias.name != "Self")
        }));
        stack.extend(protocol_parents(module, current).into_iter().map(|p| p.decl));
    }
    out
}

impl<'a> ArchetypeBuilder<'a> {
    pub(crate) fn new(module: &'a Module, max_depth: usize) -> Self {
        Self {
            module,
            potentials: Vec::new(),
            primaries: Vec::new(),
            by_decl: BTreeMap::new(),
            max_depth,
        }
    }

    fn find(&self, mut pa: usize) -> usize {
        while self.potentials[pa].representative != pa {
            pa = self.potentials[pa].representative;
        }
        pa
    }

    fn push(&mut self, name: String, parent: Option<usize>, index: Option<u32>) -> usize {
        let id = self.potentials.len();
        let depth = parent.map_or(0, |parent| self.potentials[parent].depth + 1);
        self.potentials.push(PotentialArchetype {
            name,
            index,
            conforms_to: IndexSet::new(),
            superclass: None,
            nested: BTreeMap::new(),
            representative: id,
            depth,
            archetype: None,
        });
        id
    }

    /// Register the generic parameter declared by `decl` at `index`.
    pub(crate) fn add_generic_parameter(&mut self, decl: DeclId, index: u32) -> usize {
        let module = self.module;
        let param = module.decl(decl);
        let name = param.name().unwrap_or("_").to_string();
        let pa = self.push(name, None, Some(index));
        self.primaries.push(pa);
        self.by_decl.insert(decl, pa);
        if let Some(info) = param.inheritance() {
            if let Some(superclass) = &info.superclass {
                self.potentials[pa].superclass = Some(superclass.clone());
            }
            for protocol in info.protocols.clone() {
                self.add_conformance(pa, protocol);
            }
        }
        pa
    }

    /// Conformance that holds by construction, such as a protocol's `Self`
    /// conforming to the protocol.
    pub(crate) fn add_implicit_conformance(&mut self, pa: usize, protocol: ProtocolRef) {
        self.add_conformance(pa, protocol);
    }

    fn add_conformance(&mut self, pa: usize, protocol: ProtocolRef) {
        let module = self.module;
        let rep = self.find(pa);
        let protocol_decl = protocol.decl;
        if !self.potentials[rep].conforms_to.insert(protocol) {
            return;
        }
        if self.potentials[rep].depth >= self.max_depth {
            return;
        }
        for assoc in associated_types(module, protocol_decl) {
            let Some(alias) = module.decl(assoc).type_alias() else {
                continue;
            };
            if self.potentials[rep].nested.contains_key(&alias.name) {
                continue;
            }
            let name = format!("{}.{}", self.potentials[rep].name, alias.name);
            let child = self.push(name, Some(rep), None);
            self.potentials[rep].nested.insert(alias.name.clone(), child);
            if let Some(superclass) = &alias.inheritance.superclass {
                self.potentials[child].superclass = Some(superclass.clone());
            }
            for protocol in alias.inheritance.protocols.clone() {
                self.add_conformance(child, protocol);
            }
        }
    }

    /// Merge two equivalence classes, unifying their nested types by name.
    fn union(&mut self, a: usize, b: usize) -> Result<(), String> {
        let (a, b) = (self.find(a), self.find(b));
        if a == b {
            return Ok(());
        }
        match (&self.potentials[a].superclass, &self.potentials[b].superclass) {
            (Some(left), Some(right)) if left.canonical() != right.canonical() => {
                return Err(format!(
                    "`{}` and `{}` have conflicting superclasses `{left}` and `{right}`",
                    self.potentials[a].name, self.potentials[b].name
                ));
            }
            _ => {}
        }
        self.potentials[b].representative = a;
        if self.potentials[a].superclass.is_none() {
            self.potentials[a].superclass = self.potentials[b].superclass.take();
        }
        let nested = std::mem::take(&mut self.potentials[b].nested);
        for (name, child) in nested {
            match self.potentials[a].nested.get(&name).copied() {
                Some(existing) => self.union(existing, child)?,
                None => {
                    self.potentials[a].nested.insert(name, child);
                }
            }
        }
        let protocols: Vec<ProtocolRef> = self.potentials[b].conforms_to.drain(..).collect();
        for protocol in protocols {
            self.add_conformance(a, protocol);
        }
        Ok(())
    }

    /// The potential archetype a dotted path such as `T.Element` names.
    fn resolve_path(&self, loc: &TypeLoc) -> Result<usize, String> {
        let path = loc
            .repr
            .identifier_path()
            .ok_or_else(|| format!("`{}` does not name a generic parameter", loc.repr))?;
        let (first, rest) = path
            .split_first()
            .ok_or_else(|| "empty requirement subject".to_string())?;
        let mut pa = self
            .primaries
            .iter()
            .copied()
            .find(|pa| self.potentials[*pa].name == *first)
            .map(|pa| self.find(pa))
            .ok_or_else(|| format!("`{first}` is not a generic parameter of this list"))?;
        for component in rest {
            let child = self.potentials[pa].nested.get(component).copied().ok_or_else(|| {
                format!(
                    "`{}` has no associated type `{component}`",
                    self.potentials[pa].name
                )
            })?;
            pa = self.find(child);
        }
        Ok(pa)
    }

    /// Apply one requirement. Conformance constraints must already be
    /// validated.
    pub(crate) fn add_requirement(&mut self, requirement: &Requirement) -> Result<(), String> {
        match &requirement.kind {
            RequirementKind::Conformance {
                subject,
                constraint,
            } => {
                let pa = self.resolve_path(subject)?;
                let ty = constraint.ty.clone().unwrap_or(Type::Error);
                if let Some(protocols) = ty.existential_protocols() {
                    for protocol in protocols {
                        self.add_conformance(pa, protocol);
                    }
                    return Ok(());
                }
                if ty.class_decl().is_some() {
                    let rep = self.find(pa);
                    if let Some(existing) = &self.potentials[rep].superclass {
                        if existing.canonical() != ty.canonical() {
                            return Err(format!(
                                "`{}` cannot be constrained to both `{existing}` and `{ty}`",
                                self.potentials[rep].name
                            ));
                        }
                    }
                    self.potentials[rep].superclass = Some(ty);
                    return Ok(());
                }
                Err(format!("`{ty}` is neither a protocol nor a class"))
            }
            RequirementKind::SameType { first, second } => {
                let left = self.resolve_path(first);
                let right = self.resolve_path(second);
                match (left, right) {
                    (Ok(left), Ok(right)) => self.union(left, right),
                    (Ok(_), Err(_)) | (Err(_), Ok(_)) => Err(format!(
                        "same-type requirement `{} == {}` to a concrete type is not supported",
                        first.repr, second.repr
                    )),
                    (Err(message), Err(_)) => Err(message),
                }
            }
        }
    }

    /// Allocate archetypes for every potential archetype, parents first.
    pub(crate) fn assign_archetypes(&mut self, table: &mut ArchetypeTable) {
        for pa in self.primaries.clone() {
            self.allocate(pa, None, table);
        }
    }

    fn allocate(
        &mut self,
        pa: usize,
        parent: Option<ArchetypeId>,
        table: &mut ArchetypeTable,
    ) -> ArchetypeId {
        let rep = self.find(pa);
        if let Some(id) = self.potentials[rep].archetype {
            return id;
        }
        let potential = &self.potentials[rep];
        let conforms_to: Vec<ProtocolRef> = potential.conforms_to.iter().cloned().collect();
        let requires_class = potential.superclass.is_some()
            || conforms_to
                .iter()
                .any(|protocol| self.module.decl(protocol.decl).attrs.class_protocol);
        let id = table.alloc(Archetype {
            name: potential.name.clone(),
            index: potential.index,
            parent,
            conforms_to,
            superclass: potential.superclass.clone(),
            nested: BTreeMap::new(),
            requires_class,
        });
        self.potentials[rep].archetype = Some(id);
        for (name, child) in self.potentials[rep].nested.clone() {
            let nested = self.allocate(child, Some(id), table);
            table.get_mut(id).nested.insert(name, nested);
        }
        id
    }

    /// The archetype assigned to the parameter declared by `decl`.
    pub(crate) fn archetype_for(&self, decl: DeclId, table: &ArchetypeTable) -> Option<ArchetypeRef> {
        let pa = self.find(*self.by_decl.get(&decl)?);
        self.potentials[pa].archetype.map(|id| table.reference(id))
    }
}

// ---------------------------------------------------------------------------
// Checker entry points
// ---------------------------------------------------------------------------

impl<S: Services> TypeChecker<S> {
    /// Resolve the inheritance of every protocol reachable from `roots`,
    /// including the bounds of their associated types.
    fn pre_check_protocol_closure(&mut self, roots: Vec<DeclId>) {
        let mut visited = BTreeSet::new();
        let mut worklist = roots;
        while let Some(protocol) = worklist.pop() {
            if !visited.insert(protocol) {
                continue;
            }
            if !matches!(self.module.decl(protocol).kind, DeclKind::Protocol(_)) {
                continue;
            }
            self.pre_check_protocol(protocol);
            worklist.extend(self.direct_conforms_to(protocol).into_iter().map(|p| p.decl));
            for assoc in associated_types(&self.module, protocol) {
                if let Some(info) = self.module.decl(assoc).inheritance() {
                    worklist.extend(info.protocols.iter().map(|p| p.decl));
                }
            }
        }
    }

    /// Check the generic parameter list owned by `owner` and assign its
    /// archetypes. `outer` owns the enclosing list, if any. A list whose
    /// archetypes are already assigned is left alone.
    pub fn check_generic_params(&mut self, owner: DeclId, outer: Option<DeclId>) {
        let Some(params) = self.module.decl(owner).generic_params() else {
            return;
        };
        if params.archetypes_assigned {
            return;
        }
        let param_ids = params.params.clone();
        let mut requirements = params.requirements.clone();
        let where_span = params.where_span;
        let scope = DeclContext::Decl(owner);

        for param in &param_ids {
            self.check_inheritance_clause(*param);
        }

        for requirement in &mut requirements {
            if requirement.invalid {
                continue;
            }
            let RequirementKind::Conformance {
                subject,
                constraint,
            } = &mut requirement.kind
            else {
                continue;
            };
            if !self.validate_type(scope, constraint) {
                requirement.invalid = true;
                continue;
            }
            let ty = constraint.ty.clone().unwrap_or(Type::Error);
            if !ty.is_existential() && ty.class_decl().is_none() {
                let diag = Diagnostic::error(
                    Category::InvalidRequirement,
                    format!(
                        "type `{}` constrained to non-protocol type `{ty}`",
                        subject.repr
                    ),
                )
                .at(where_span.location());
                self.diagnose(diag);
                constraint.set_invalid();
                requirement.invalid = true;
            }
        }

        let mut roots = Vec::new();
        for param in &param_ids {
            if let Some(info) = self.module.decl(*param).inheritance() {
                roots.extend(info.protocols.iter().map(|p| p.decl));
            }
        }
        for requirement in &requirements {
            if let RequirementKind::Conformance { constraint, .. } = &requirement.kind {
                if let Some(protocols) = constraint.ty.as_ref().and_then(Type::existential_protocols)
                {
                    roots.extend(protocols.into_iter().map(|p| p.decl));
                }
            }
        }
        self.pre_check_protocol_closure(roots);

        let max_depth = self.session.options.max_nested_archetype_depth;
        let mut builder = ArchetypeBuilder::new(&self.module, max_depth);
        for (index, param) in param_ids.iter().enumerate() {
            builder.add_generic_parameter(*param, index as u32);
        }
        let mut failures = Vec::new();
        for (i, requirement) in requirements.iter().enumerate() {
            if requirement.invalid {
                continue;
            }
            if let Err(message) = builder.add_requirement(requirement) {
                failures.push((i, message));
            }
        }
        builder.assign_archetypes(&mut self.session.archetypes);
        let assigned: Vec<Option<ArchetypeRef>> = param_ids
            .iter()
            .map(|param| builder.archetype_for(*param, &self.session.archetypes))
            .collect();

        for (i, message) in failures {
            requirements[i].invalid = true;
            self.diagnose(
                Diagnostic::error(Category::InvalidRequirement, message).at(where_span.location()),
            );
        }

        let mut all_archetypes = Vec::new();
        for (param, archetype) in param_ids.iter().zip(assigned) {
            let ty = match &archetype {
                Some(archetype) => Type::Archetype(archetype.clone()),
                None => Type::Error,
            };
            if let DeclKind::TypeAlias(alias) = &mut self.module.decl_mut(*param).kind {
                alias.underlying = TypeLoc::without_loc(ty);
            }
            all_archetypes.extend(archetype);
        }
        if let Some(outer) = outer.and_then(|outer| self.module.decl(outer).generic_params()) {
            all_archetypes.extend(outer.all_archetypes.iter().cloned());
        }

        for requirement in &mut requirements {
            if requirement.invalid {
                continue;
            }
            match &mut requirement.kind {
                RequirementKind::Conformance { subject, .. } => {
                    self.validate_type(scope, subject);
                }
                RequirementKind::SameType { first, second } => {
                    self.validate_type(scope, first);
                    self.validate_type(scope, second);
                }
            }
        }

        let names: Vec<String> = all_archetypes.iter().map(|a| a.name.clone()).collect();
        tracing::debug!(owner = owner.0, archetypes = ?names, "assigned archetypes");
        self.record(owner, None, CheckAction::AssignArchetypes, || {
            format!("[{}]", names.join(", "))
        });

        if let Some(params) = self.module.decl_mut(owner).generic_params_mut() {
            params.requirements = requirements;
            params.outer = outer;
            params.all_archetypes = all_archetypes;
            params.archetypes_assigned = true;
        }
    }

    /// Build the `Self` archetype of `protocol` and rewrite its associated
    /// types to the nested archetypes of `Self`.
    pub(crate) fn assign_protocol_archetypes(&mut self, protocol: DeclId, self_decl: DeclId) {
        let already = self
            .module
            .decl(self_decl)
            .type_alias()
            .is_some_and(|alias| alias.underlying.ty.is_some());
        if already {
            return;
        }
        self.pre_check_protocol_closure(vec![protocol]);
        let name = self.module.decl(protocol).name().unwrap_or("_").to_string();

        let max_depth = self.session.options.max_nested_archetype_depth;
        let mut builder = ArchetypeBuilder::new(&self.module, max_depth);
        let pa = builder.add_generic_parameter(self_decl, 0);
        builder.add_implicit_conformance(pa, ProtocolRef::new(protocol, name));
        builder.assign_archetypes(&mut self.session.archetypes);
        let self_archetype = builder.archetype_for(self_decl, &self.session.archetypes);

        let Some(self_archetype) = self_archetype else {
            return;
        };
        let members = self.module.decl(protocol).members().to_vec();
        for member in members {
            let nested = match self.module.decl(member).type_alias() {
                Some(_) if member == self_decl => Some(Type::Archetype(self_archetype.clone())),
                Some(alias) => Some(
                    self.session
                        .archetypes
                        .nested_type(self_archetype.id, &alias.name)
                        .map(Type::Archetype)
                        .unwrap_or(Type::Error),
                ),
                None => None,
            };
            if let (Some(ty), DeclKind::TypeAlias(alias)) =
                (nested, &mut self.module.decl_mut(member).kind)
            {
                alias.underlying = TypeLoc::without_loc(ty);
            }
        }
        self.record(protocol, None, CheckAction::AssignArchetypes, || {
            format!("[{}]", self_archetype.name)
        });
    }
}
