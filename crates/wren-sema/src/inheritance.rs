//! Inheritance clause resolution.
//!
//! Turns the written entries of an inheritance clause into an optional
//! superclass plus a deduplicated protocol list ordered by first occurrence.
//! Bad entries are diagnosed and dropped; the rest of the clause still
//! resolves.

use indexmap::{IndexMap, IndexSet};
use wren_ast::{DeclContext, DeclKind, Span, TypeLoc};
use wren_diag::{Category, Diagnostic, FixIt};
use wren_types::{DeclId, ProtocolRef, Type};

use crate::trace::CheckAction;
use crate::{Services, TypeChecker};

/// The source range that removes entry `i` together with its leading comma.
fn removal_range(entries: &[TypeLoc], i: usize) -> Span {
    let entry = entries[i].span;
    match i.checked_sub(1) {
        Some(prev) => Span::new(entry.file, entries[prev].span.end, entry.end),
        None => entry,
    }
}

impl<S: Services> TypeChecker<S> {
    /// Resolve the inheritance clause of a nominal, extension, generic
    /// parameter, or associated type. Runs at most once per declaration.
    pub fn check_inheritance_clause(&mut self, id: DeclId) {
        let decl = self.module.decl(id);
        let Some(info) = decl.inheritance() else {
            return;
        };
        if info.resolved {
            return;
        }
        let mut entries = info.inherited.clone();
        let scope = match decl.kind {
            DeclKind::TypeAlias(_) => decl.context,
            _ => DeclContext::Decl(id),
        };
        let (can_inherit_class, records_null_conformances) = match &decl.kind {
            DeclKind::Class(_) => (true, false),
            DeclKind::Protocol(_) => (false, true),
            DeclKind::TypeAlias(alias) => {
                let associated = matches!(
                    decl.context,
                    DeclContext::Decl(owner)
                        if matches!(self.module.decl(owner).kind, DeclKind::Protocol(_))
                );
                (alias.generic_param, alias.generic_param || associated)
            }
            _ => (false, false),
        };
        let subject = match &decl.kind {
            DeclKind::Extension(ext) => format!(
                "extension of `{}`",
                ext.extended.ty.as_ref().unwrap_or(&Type::Error)
            ),
            _ => format!("{} `{}`", decl.kind_name(), decl.name().unwrap_or("_")),
        };
        let is_extension = matches!(decl.kind, DeclKind::Extension(_));
        let decl_span = decl.span;

        let mut protocols: IndexSet<ProtocolRef> = IndexSet::new();
        // Canonical type -> index of the entry that first named it.
        let mut seen: IndexMap<Type, usize> = IndexMap::new();
        let mut superclass: Option<(Type, usize)> = None;

        for i in 0..entries.len() {
            if entries[i].invalid {
                continue;
            }
            let mut entry = entries[i].clone();
            let valid = self.validate_type(scope, &mut entry);
            entries[i] = entry;
            if !valid {
                continue;
            }
            let ty = entries[i].ty.clone().unwrap_or(Type::Error);
            let canonical = ty.canonical();

            if let Some(&first) = seen.get(&canonical) {
                let diag = Diagnostic::error(
                    Category::DuplicateInheritance,
                    format!("duplicate inheritance from `{ty}`"),
                )
                .at(entries[i].span.location())
                .with_label(entries[first].span.location(), "first listed here")
                .with_fix_it(FixIt::Remove {
                    range: removal_range(&entries, i).location(),
                });
                self.diagnose(diag);
                // Conformance gathering skips invalid entries, so the
                // duplicate is never checked twice.
                entries[i].set_invalid();
                continue;
            }
            seen.insert(canonical.clone(), i);

            if let Some(found) = canonical.existential_protocols() {
                protocols.extend(found);
                continue;
            }

            if canonical.class_decl().is_some() {
                if let Some((first_ty, first)) = &superclass {
                    let diag = Diagnostic::error(
                        Category::MultipleInheritance,
                        format!("multiple inheritance from classes `{first_ty}` and `{ty}`"),
                    )
                    .at(entries[i].span.location())
                    .with_label(entries[*first].span.location(), "superclass listed here");
                    self.diagnose(diag);
                    continue;
                }
                if !can_inherit_class {
                    let message = if is_extension {
                        format!("{subject} cannot add a superclass `{ty}`")
                    } else {
                        format!("non-class {subject} cannot inherit from class `{ty}`")
                    };
                    let diag = Diagnostic::error(Category::NonClassInheritance, message)
                        .at(decl_span.location())
                        .with_label(entries[i].span.location(), "class listed here");
                    self.diagnose(diag);
                    continue;
                }
                if i > 0 {
                    let diag = Diagnostic::error(
                        Category::SuperclassNotFirst,
                        format!("superclass `{ty}` must appear first in the inheritance clause"),
                    )
                    .at(entries[i].span.location())
                    .with_fix_it(FixIt::Remove {
                        range: removal_range(&entries, i).location(),
                    })
                    .with_fix_it(FixIt::Insert {
                        at: entries[0].span.location().start_point(),
                        text: format!("{ty}, "),
                    });
                    self.diagnose(diag);
                }
                superclass = Some((ty, i));
                continue;
            }

            if canonical.is_error() {
                continue;
            }

            let message = if can_inherit_class {
                format!("inheritance from non-protocol, non-class type `{ty}`")
            } else {
                format!("inheritance from non-protocol type `{ty}`")
            };
            let diag = Diagnostic::error(Category::InheritanceFromNonProtocol, message)
                .at(entries[i].span.location());
            self.diagnose(diag);
        }

        let protocols: Vec<ProtocolRef> = protocols.into_iter().collect();
        let superclass = superclass.map(|(ty, _)| ty);
        self.record(id, None, CheckAction::ResolveInheritance, || {
            let names: Vec<&str> = protocols.iter().map(|p| p.name.as_str()).collect();
            match &superclass {
                Some(ty) => format!("superclass {ty}; protocols [{}]", names.join(", ")),
                None => format!("protocols [{}]", names.join(", ")),
            }
        });

        let Some(info) = self.module.decl_mut(id).inheritance_mut() else {
            return;
        };
        info.inherited = entries;
        info.resolved = true;
        info.superclass = superclass;
        if records_null_conformances {
            info.conformances = Some(vec![None; protocols.len()]);
        }
        info.protocols = protocols;
    }

    /// The protocols a nominal type or extension directly conforms to,
    /// resolving its inheritance clause first if needed.
    pub fn direct_conforms_to(&mut self, id: DeclId) -> Vec<ProtocolRef> {
        self.check_inheritance_clause(id);
        self.module
            .decl(id)
            .inheritance()
            .map(|info| info.protocols.clone())
            .unwrap_or_default()
    }

    /// Resolve the inheritance of a protocol and of its associated types, so
    /// that protocol refinement is known before any archetype is built.
    pub fn pre_check_protocol(&mut self, id: DeclId) {
        self.check_inheritance_clause(id);
        let associated: Vec<DeclId> = self
            .module
            .decl(id)
            .members()
            .iter()
            .copied()
            .filter(|member| self.module.decl(*member).type_alias().is_some())
            .collect();
        for member in associated {
            self.check_inheritance_clause(member);
        }
    }
}
