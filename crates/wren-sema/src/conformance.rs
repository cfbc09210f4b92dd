//! Conformance gathering and native-interop propagation.

use indexmap::IndexSet;
use wren_ast::{DeclContext, DeclKind};
use wren_types::{Conformance, DeclId, ProtocolRef, Type};

use crate::trace::CheckAction;
use crate::{Services, TypeChecker};

impl<S: Services> TypeChecker<S> {
    /// Check `ty` against every protocol written in the inheritance clause of
    /// `id` and record the results on the declaration.
    ///
    /// Failed conformances are diagnosed by the conformance service and
    /// recorded as `None` so later queries do not repeat the work.
    pub(crate) fn gather_explicit_conformances(&mut self, id: DeclId, ty: Type) {
        let decl = self.module.decl(id);
        let Some(info) = decl.inheritance() else {
            return;
        };
        let entries = info.inherited.clone();
        let existing = info.protocols.clone();
        let cached = decl.nominal().is_some() || matches!(decl.kind, DeclKind::Extension(_));
        let cache_key = ty.any_nominal().unwrap_or(id);
        let scope = DeclContext::Decl(id);

        let mut known: IndexSet<ProtocolRef> = IndexSet::new();
        let mut conformances = Vec::new();
        for entry in entries.iter().filter(|entry| !entry.invalid) {
            let Some(found) = entry.ty.as_ref().and_then(Type::existential_protocols) else {
                continue;
            };
            for protocol in found {
                if !known.insert(protocol.clone()) {
                    continue;
                }
                let result = self
                    .services
                    .conforms_to_protocol(&self.view(), &ty, &protocol, scope);
                match result {
                    Ok(conformance) => {
                        let conformance = self.session.conformances.alloc(conformance);
                        if cached {
                            self.session
                                .record_conformance(protocol.decl, cache_key, conformance);
                        }
                        conformances.push(Some(conformance));
                    }
                    Err(diag) => {
                        self.diagnose(diag);
                        conformances.push(None);
                    }
                }
            }
        }

        let protocols: Vec<ProtocolRef> = known.into_iter().collect();
        self.record(id, None, CheckAction::GatherConformances, || {
            let resolved = conformances.iter().filter(|c| c.is_some()).count();
            format!("{resolved}/{} conformances of {ty}", protocols.len())
        });

        let Some(info) = self.module.decl_mut(id).inheritance_mut() else {
            return;
        };
        if protocols.len() == existing.len() {
            debug_assert_eq!(protocols, existing, "protocol list changed order");
        } else {
            info.protocols = protocols;
        }
        info.conformances = Some(conformances);
    }

    /// Mark every witness of an interop protocol as requiring native
    /// interop, following inherited conformances.
    pub(crate) fn check_interop_conformances(&mut self, id: DeclId) {
        let Some(ids) = self
            .module
            .decl(id)
            .inheritance()
            .and_then(|info| info.conformances.clone())
        else {
            return;
        };
        let mut witnesses = Vec::new();
        for conformance in ids.into_iter().flatten() {
            self.collect_interop_witnesses(self.session.conformances.get(conformance), &mut witnesses);
        }
        if witnesses.is_empty() {
            return;
        }
        self.record(id, None, CheckAction::PropagateInterop, || {
            format!("{} witness(es)", witnesses.len())
        });
        for witness in witnesses {
            self.module.decl_mut(witness).interop = true;
        }
    }

    fn collect_interop_witnesses(&self, conformance: &Conformance, out: &mut Vec<DeclId>) {
        if self.module.decl(conformance.protocol.decl).interop {
            out.extend(conformance.witnesses.iter().map(|w| w.witness));
        }
        for inherited in &conformance.inherited {
            self.collect_interop_witnesses(inherited, out);
        }
    }
}
