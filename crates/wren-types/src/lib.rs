//! Type representations for Wren.
//!
//! This crate defines the semantic types used by the declaration checker:
//! nominal types, existentials, archetypes, tuples, and function types.
//! These are distinct from syntactic type references (which live in
//! `wren-ast`). Declarations are referred to by [`DeclId`]; archetypes live in
//! an [`ArchetypeTable`] and are referred to by index handle.

use std::collections::BTreeMap;
use std::fmt;

use la_arena::{Arena, Idx};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Index of a declaration in its module's declaration table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DeclId(pub u32);

impl DeclId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle to an archetype allocated in an [`ArchetypeTable`].
pub type ArchetypeId = Idx<Archetype>;

/// A reference to a protocol declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProtocolRef {
    pub decl: DeclId,
    pub name: String,
}

impl ProtocolRef {
    pub fn new(decl: DeclId, name: impl Into<String>) -> Self {
        Self {
            decl,
            name: name.into(),
        }
    }
}

/// A reference to an archetype, carrying its display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchetypeRef {
    pub id: ArchetypeId,
    pub name: String,
}

// ---------------------------------------------------------------------------
// Type components
// ---------------------------------------------------------------------------

/// Which flavour of nominal declaration a nominal type names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NominalKind {
    Struct,
    Class,
    Enum,
}

/// Reference-storage ownership for `weak`/`unowned` variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Ownership {
    Weak,
    Unowned,
}

impl Ownership {
    pub fn as_str(self) -> &'static str {
        match self {
            Ownership::Weak => "weak",
            Ownership::Unowned => "unowned",
        }
    }
}

/// Compiler-provided primitive types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BuiltinType {
    Int(u16),
    Float(u16),
    RawPointer,
    ObjectPointer,
    InteropPointer,
    Vector { element: Box<BuiltinType>, count: u32 },
}

/// A struct, class, or enum type, possibly with generic arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NominalType {
    pub kind: NominalKind,
    pub decl: DeclId,
    pub name: String,
    /// Generic arguments. Empty for non-generic declarations.
    pub args: Vec<Type>,
}

/// One element of a tuple type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TupleElement {
    pub name: Option<String>,
    pub ty: Type,
    /// Whether the element has a default value (parameter tuples only).
    pub has_default: bool,
}

impl TupleElement {
    pub fn unnamed(ty: Type) -> Self {
        Self {
            name: None,
            ty,
            has_default: false,
        }
    }

    pub fn named(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: Some(name.into()),
            ty,
            has_default: false,
        }
    }
}

/// Extra bits carried by function types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ExtInfo {
    pub no_return: bool,
}

/// A monomorphic function type `input -> result`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionType {
    pub input: Box<Type>,
    pub result: Box<Type>,
    pub ext: ExtInfo,
}

/// A function type that introduces the generic parameters of `generic_owner`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PolyFunctionType {
    pub input: Box<Type>,
    pub result: Box<Type>,
    /// Declaration whose generic parameter list this level introduces.
    pub generic_owner: DeclId,
    /// The archetypes of that list, own parameters first.
    pub archetypes: Vec<ArchetypeRef>,
    pub ext: ExtInfo,
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A semantic type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// Marker for an already-diagnosed failure. Never re-diagnosed.
    Error,
    Builtin(BuiltinType),
    Nominal(NominalType),
    /// A generic nominal named without arguments (`Array` rather than `Array<T>`).
    UnboundGeneric {
        kind: NominalKind,
        decl: DeclId,
        name: String,
    },
    /// Existential for a single protocol.
    Protocol(ProtocolRef),
    /// Existential for a protocol composition, already flattened.
    Composition(Vec<ProtocolRef>),
    Archetype(ArchetypeRef),
    Tuple(Vec<TupleElement>),
    Function(FunctionType),
    PolymorphicFunction(PolyFunctionType),
    Metatype(Box<Type>),
    Module(String),
    /// A by-reference (assignable) location.
    LValue(Box<Type>),
    /// `weak`/`unowned` storage of a reference type.
    ReferenceStorage {
        ownership: Ownership,
        referent: Box<Type>,
    },
    Array {
        element: Box<Type>,
        size: u64,
    },
    /// Sugar: a type alias name standing for `underlying`.
    Alias {
        decl: DeclId,
        name: String,
        underlying: Box<Type>,
    },
}

impl Type {
    /// The empty tuple `()`.
    pub fn unit() -> Type {
        Type::Tuple(Vec::new())
    }

    pub fn function(input: Type, result: Type) -> Type {
        Type::Function(FunctionType {
            input: Box::new(input),
            result: Box::new(result),
            ext: ExtInfo::default(),
        })
    }

    pub fn metatype(instance: Type) -> Type {
        Type::Metatype(Box::new(instance))
    }

    pub fn is_error(&self) -> bool {
        matches!(self.canonical(), Type::Error)
    }

    pub fn is_unit(&self) -> bool {
        matches!(self.canonical(), Type::Tuple(elems) if elems.is_empty())
    }

    /// Strip all alias sugar, recursively.
    ///
    /// Two types are the same type iff their canonical forms are equal.
    pub fn canonical(&self) -> Type {
        match self {
            Type::Alias { underlying, .. } => underlying.canonical(),
            Type::Error
            | Type::Builtin(_)
            | Type::UnboundGeneric { .. }
            | Type::Protocol(_)
            | Type::Archetype(_)
            | Type::Module(_) => self.clone(),
            Type::Nominal(nominal) => Type::Nominal(NominalType {
                args: nominal.args.iter().map(Type::canonical).collect(),
                ..nominal.clone()
            }),
            Type::Composition(protocols) => {
                // A single-protocol composition is the protocol itself.
                if protocols.len() == 1 {
                    Type::Protocol(protocols[0].clone())
                } else {
                    Type::Composition(protocols.clone())
                }
            }
            Type::Tuple(elems) => Type::Tuple(
                elems
                    .iter()
                    .map(|elem| TupleElement {
                        name: elem.name.clone(),
                        ty: elem.ty.canonical(),
                        has_default: elem.has_default,
                    })
                    .collect(),
            ),
            Type::Function(ft) => Type::Function(FunctionType {
                input: Box::new(ft.input.canonical()),
                result: Box::new(ft.result.canonical()),
                ext: ft.ext,
            }),
            Type::PolymorphicFunction(pft) => Type::PolymorphicFunction(PolyFunctionType {
                input: Box::new(pft.input.canonical()),
                result: Box::new(pft.result.canonical()),
                generic_owner: pft.generic_owner,
                archetypes: pft.archetypes.clone(),
                ext: pft.ext,
            }),
            Type::Metatype(inner) => Type::Metatype(Box::new(inner.canonical())),
            Type::LValue(inner) => Type::LValue(Box::new(inner.canonical())),
            Type::ReferenceStorage {
                ownership,
                referent,
            } => Type::ReferenceStorage {
                ownership: *ownership,
                referent: Box::new(referent.canonical()),
            },
            Type::Array { element, size } => Type::Array {
                element: Box::new(element.canonical()),
                size: *size,
            },
        }
    }

    /// The protocols of an existential type, flattened, or `None` when the
    /// type is not existential.
    pub fn existential_protocols(&self) -> Option<Vec<ProtocolRef>> {
        match self.canonical() {
            Type::Protocol(protocol) => Some(vec![protocol]),
            Type::Composition(protocols) => Some(protocols),
            _ => None,
        }
    }

    pub fn is_existential(&self) -> bool {
        self.existential_protocols().is_some()
    }

    /// The class declaration for class and bound generic class types.
    pub fn class_decl(&self) -> Option<DeclId> {
        match self.canonical() {
            Type::Nominal(NominalType {
                kind: NominalKind::Class,
                decl,
                ..
            }) => Some(decl),
            _ => None,
        }
    }

    /// The nominal (or protocol) declaration this type names, if any.
    pub fn any_nominal(&self) -> Option<DeclId> {
        match self.canonical() {
            Type::Nominal(nominal) => Some(nominal.decl),
            Type::UnboundGeneric { decl, .. } => Some(decl),
            Type::Protocol(protocol) => Some(protocol.decl),
            _ => None,
        }
    }

    pub fn archetype(&self) -> Option<ArchetypeRef> {
        match self.canonical() {
            Type::Archetype(archetype) => Some(archetype),
            _ => None,
        }
    }

    /// Whether a value of this type can be stored in a variable.
    pub fn is_materializable(&self) -> bool {
        match self.canonical() {
            Type::LValue(_) => false,
            Type::Tuple(elems) => elems.iter().all(|elem| elem.ty.is_materializable()),
            _ => true,
        }
    }

    /// `(input, result)` for monomorphic and polymorphic function types.
    pub fn function_parts(&self) -> Option<(Type, Type)> {
        match self.canonical() {
            Type::Function(ft) => Some((*ft.input, *ft.result)),
            Type::PolymorphicFunction(pft) => Some((*pft.input, *pft.result)),
            _ => None,
        }
    }

    /// The result of a function type, looking through one curried level.
    pub fn function_result(&self) -> Option<Type> {
        self.function_parts().map(|(_, result)| result)
    }

    /// Tuple elements of the canonical type, if it is a tuple.
    pub fn tuple_elements(&self) -> Option<Vec<TupleElement>> {
        match self.canonical() {
            Type::Tuple(elems) => Some(elems),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Display for Type (user-facing Wren syntax)
// ---------------------------------------------------------------------------

impl fmt::Display for BuiltinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuiltinType::Int(bits) => write!(f, "Builtin.Int{bits}"),
            BuiltinType::Float(bits) => write!(f, "Builtin.Float{bits}"),
            BuiltinType::RawPointer => write!(f, "Builtin.RawPointer"),
            BuiltinType::ObjectPointer => write!(f, "Builtin.ObjectPointer"),
            BuiltinType::InteropPointer => write!(f, "Builtin.InteropPointer"),
            BuiltinType::Vector { element, count } => write!(f, "Builtin.Vec{count}x{element}"),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Type]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Error => write!(f, "<<error type>>"),
            Type::Builtin(builtin) => write!(f, "{builtin}"),
            Type::Nominal(nominal) => {
                write!(f, "{}", nominal.name)?;
                if !nominal.args.is_empty() {
                    write!(f, "<")?;
                    write_list(f, &nominal.args)?;
                    write!(f, ">")?;
                }
                Ok(())
            }
            Type::UnboundGeneric { name, .. } => write!(f, "{name}"),
            Type::Protocol(protocol) => write!(f, "{}", protocol.name),
            Type::Composition(protocols) => {
                write!(f, "protocol<")?;
                for (i, protocol) in protocols.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", protocol.name)?;
                }
                write!(f, ">")
            }
            Type::Archetype(archetype) => write!(f, "{}", archetype.name),
            Type::Tuple(elems) => {
                write!(f, "(")?;
                for (i, elem) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    if let Some(name) = &elem.name {
                        write!(f, "{name}: ")?;
                    }
                    write!(f, "{}", elem.ty)?;
                    if elem.has_default {
                        write!(f, " = default")?;
                    }
                }
                write!(f, ")")
            }
            Type::Function(ft) => write!(f, "{} -> {}", ft.input, ft.result),
            Type::PolymorphicFunction(pft) => {
                write!(f, "<")?;
                for (i, archetype) in pft.archetypes.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", archetype.name)?;
                }
                write!(f, "> {} -> {}", pft.input, pft.result)
            }
            Type::Metatype(inner) => write!(f, "{inner}.Type"),
            Type::Module(name) => write!(f, "module<{name}>"),
            Type::LValue(inner) => write!(f, "@lvalue {inner}"),
            Type::ReferenceStorage {
                ownership,
                referent,
            } => write!(f, "@{} {referent}", ownership.as_str()),
            Type::Array { element, size } => write!(f, "{element}[{size}]"),
            Type::Alias { name, .. } => write!(f, "{name}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Archetypes
// ---------------------------------------------------------------------------

/// "Some type satisfying these constraints."
///
/// Produced once per generic parameter (or protocol `Self`) by the archetype
/// builder. Nested archetypes stand for associated types reached through
/// the parent's protocol conformances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archetype {
    /// Display name: `T` for primaries, `T.Element` for nested archetypes.
    pub name: String,
    /// Position in the generic parameter list, for primary archetypes.
    pub index: Option<u32>,
    pub parent: Option<ArchetypeId>,
    pub conforms_to: Vec<ProtocolRef>,
    pub superclass: Option<Type>,
    pub nested: BTreeMap<String, ArchetypeId>,
    /// Constrained to class types (superclass or class-only protocol).
    pub requires_class: bool,
}

impl Archetype {
    pub fn is_primary(&self) -> bool {
        self.parent.is_none()
    }
}

/// Owner of every archetype created during one checking session.
#[derive(Debug, Default)]
pub struct ArchetypeTable {
    arena: Arena<Archetype>,
}

impl ArchetypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, archetype: Archetype) -> ArchetypeId {
        self.arena.alloc(archetype)
    }

    pub fn get(&self, id: ArchetypeId) -> &Archetype {
        &self.arena[id]
    }

    pub fn get_mut(&mut self, id: ArchetypeId) -> &mut Archetype {
        &mut self.arena[id]
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn reference(&self, id: ArchetypeId) -> ArchetypeRef {
        ArchetypeRef {
            id,
            name: self.arena[id].name.clone(),
        }
    }

    /// The archetype for associated type `name` of archetype `id`.
    pub fn nested_type(&self, id: ArchetypeId, name: &str) -> Option<ArchetypeRef> {
        self.arena[id]
            .nested
            .get(name)
            .map(|nested| self.reference(*nested))
    }
}

// ---------------------------------------------------------------------------
// Conformances
// ---------------------------------------------------------------------------

/// One requirement → implementation pair of a conformance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Witness {
    pub requirement: DeclId,
    pub witness: DeclId,
}

/// Evidence that `ty` satisfies `protocol`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conformance {
    pub protocol: ProtocolRef,
    pub ty: Type,
    pub witnesses: Vec<Witness>,
    /// Conformances to the protocols `protocol` refines.
    pub inherited: Vec<Conformance>,
}

/// Handle to a conformance stored in a [`ConformanceTable`].
pub type ConformanceId = Idx<Conformance>;

/// Owner of every successful conformance produced during one session.
#[derive(Debug, Default)]
pub struct ConformanceTable {
    arena: Arena<Conformance>,
}

impl ConformanceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, conformance: Conformance) -> ConformanceId {
        self.arena.alloc(conformance)
    }

    pub fn get(&self, id: ConformanceId) -> &Conformance {
        &self.arena[id]
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }
}
