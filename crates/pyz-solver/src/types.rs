//! The type model.
//!
//! Types are a tagged sum (`TypeKey`) interned into `TypeId` handles by the
//! `TypeInterner`. Every variant that can appear on a control-flow edge
//! carries an `is_instantiable` bit (class-qua-class vs instance) and, where
//! narrowing residues need provenance, a list of `TypeCondition`s naming the
//! constrained-TypeVar constraint that produced it.

use bitflags::bitflags;
use pyz_common::interner::Atom;

/// Handle of an interned type. Equality of handles is structural equality of
/// the underlying types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

impl TypeId {
    /// The gradual "anything" type.
    pub const ANY: TypeId = TypeId(0);
    /// Like `Any`, but arising from inference failure rather than from an
    /// explicit annotation.
    pub const UNKNOWN: TypeId = TypeId(1);
    /// The bottom type.
    pub const NEVER: TypeId = TypeId(2);
    /// The type of `None`.
    pub const NONE: TypeId = TypeId(3);
    /// The instantiable form of `None` (what `None` denotes in an
    /// `isinstance` filter or annotation position).
    pub const NONE_TYPE: TypeId = TypeId(4);
}

/// Identity of a type-variable definition site (function or class).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeVarScopeId(pub u32);

/// A literal value carried by a class instance.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LiteralValue {
    Bool(bool),
    Int(i64),
    Str(Atom),
    Bytes(Atom),
    /// An enum member, named within its class.
    EnumMember(Atom),
}

/// Declared variance of a type variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Variance {
    Invariant,
    Covariant,
    Contravariant,
}

/// Provenance annotation tying a type to the constrained-TypeVar constraint
/// that produced it. Conditions flow through narrowing so that post-branch
/// types remember their origin.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeCondition {
    pub type_var: Atom,
    pub constraint_index: u32,
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ClassFlags: u16 {
        const BUILTIN = 1 << 0;
        const FINAL = 1 << 1;
        const PROTOCOL = 1 << 2;
        const TYPED_DICT = 1 << 3;
        const TUPLE = 1 << 4;
        const ENUM = 1 << 5;
        const SYNTHESIZED = 1 << 6;
        /// The class derives from an unresolved base; subclass relations
        /// involving it are indeterminate.
        const DERIVES_FROM_UNKNOWN = 1 << 7;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct FunctionFlags: u16 {
        const SYNTHESIZED = 1 << 0;
        /// A property getter; member narrowing treats its return type as the
        /// attribute type.
        const PROPERTY = 1 << 1;
        const OVERLOAD = 1 << 2;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct TypeVarFlags: u16 {
        const PARAM_SPEC = 1 << 0;
        const VARIADIC = 1 << 1;
        const SYNTHESIZED = 1 << 2;
        /// The synthesized `Self` type variable; its bound may itself bind
        /// other type variables from the ambient context.
        const SYNTHESIZED_SELF = 1 << 3;
    }
}

/// One element of a tuple specialization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TupleArg {
    pub ty: TypeId,
    /// `tuple[int, ...]`: a single unbounded element, exclusive with
    /// fixed-length narrowing.
    pub is_unbounded: bool,
}

/// A declared TypedDict entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypedDictEntry {
    pub value_type: TypeId,
    pub is_required: bool,
}

/// A narrowing delta over a declared TypedDict entry. A key absent from the
/// narrowed map inherits declared required-ness.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NarrowedEntry {
    pub is_provided: bool,
}

/// The view of one TypedDict key after merging declared entries with the
/// narrowed deltas.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TypedDictMember {
    pub value_type: TypeId,
    pub is_required: bool,
    pub is_provided: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClassType {
    /// Fully qualified name, e.g. `builtins.int`.
    pub name: Atom,
    pub flags: ClassFlags,
    /// Declared type parameters (TypeVar type ids, carrying declared
    /// variance).
    pub type_params: Vec<TypeId>,
    /// Explicit specialization, when present.
    pub type_args: Option<Vec<TypeId>>,
    /// Tuple specialization; `Some` only for tuple classes.
    pub tuple_args: Option<Vec<TupleArg>>,
    /// Literal value; implies `is_instantiable == false`.
    pub literal: Option<LiteralValue>,
    /// Declared TypedDict entries, sorted by key atom.
    pub td_entries: Vec<(Atom, TypedDictEntry)>,
    /// Narrowing deltas over `td_entries`, sorted by key atom.
    pub narrowed_entries: Vec<(Atom, NarrowedEntry)>,
    /// `type[C]` in a filter position matches subclasses too.
    pub include_subclasses: bool,
    pub conditions: Vec<TypeCondition>,
    /// Linearised proper ancestors, nearest first, each entry an
    /// instantiable (and, where generic, specialized) class.
    pub mro: Vec<TypeId>,
    /// Flattened declared members, sorted by name atom.
    pub fields: Vec<(Atom, TypeId)>,
    /// Class-qua-class (`true`) vs instance (`false`).
    pub is_instantiable: bool,
}

impl ClassType {
    /// A bare instance of a class with the given fully qualified name.
    pub fn named(name: Atom) -> Self {
        Self {
            name,
            flags: ClassFlags::empty(),
            type_params: Vec::new(),
            type_args: None,
            tuple_args: None,
            literal: None,
            td_entries: Vec::new(),
            narrowed_entries: Vec::new(),
            include_subclasses: false,
            conditions: Vec::new(),
            mro: Vec::new(),
            fields: Vec::new(),
            is_instantiable: false,
        }
    }

    pub fn is_protocol(&self) -> bool {
        self.flags.contains(ClassFlags::PROTOCOL)
    }

    pub fn is_typed_dict(&self) -> bool {
        self.flags.contains(ClassFlags::TYPED_DICT)
    }

    pub fn is_final(&self) -> bool {
        self.flags.contains(ClassFlags::FINAL)
    }

    pub fn is_enum(&self) -> bool {
        self.flags.contains(ClassFlags::ENUM)
    }

    pub fn is_tuple(&self) -> bool {
        self.flags.contains(ClassFlags::TUPLE)
    }

    /// Look up a declared member, on this class or along its MRO. The caller
    /// resolves MRO entries through the interner.
    pub fn own_field(&self, name: Atom) -> Option<TypeId> {
        self.fields
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, ty)| *ty)
    }

    pub fn declared_entry(&self, key: Atom) -> Option<TypedDictEntry> {
        self.td_entries
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, entry)| *entry)
    }

    pub fn narrowed_entry(&self, key: Atom) -> Option<NarrowedEntry> {
        self.narrowed_entries
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, entry)| *entry)
    }
}

/// Category of a function parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamCategory {
    Simple,
    VarPositional,
    VarKeyword,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ParamInfo {
    pub category: ParamCategory,
    pub name: Option<Atom>,
    pub ty: TypeId,
    pub has_default: bool,
}

impl ParamInfo {
    pub fn positional(name: Option<Atom>, ty: TypeId) -> Self {
        Self {
            category: ParamCategory::Simple,
            name,
            ty,
            has_default: false,
        }
    }
}

/// A declared type-guard return annotation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypeGuardInfo {
    pub guarded: TypeId,
    /// Strict guards narrow both branches.
    pub is_strict: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FunctionType {
    pub name: Atom,
    pub params: Vec<ParamInfo>,
    pub return_type: TypeId,
    pub flags: FunctionFlags,
    pub type_guard: Option<TypeGuardInfo>,
    /// The ParamSpec this function's parameter list came from, if any.
    pub param_spec: Option<TypeId>,
}

impl FunctionType {
    pub fn new(name: Atom, params: Vec<ParamInfo>, return_type: TypeId) -> Self {
        Self {
            name,
            params,
            return_type,
            flags: FunctionFlags::empty(),
            type_guard: None,
            param_spec: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeVarType {
    pub name: Atom,
    /// Definition site. A TypeVar without a scope is out of scope everywhere
    /// and never bound.
    pub scope_id: Option<TypeVarScopeId>,
    pub bound: Option<TypeId>,
    /// Non-empty for constrained TypeVars; solutions are drawn from this
    /// closed set.
    pub constraints: Vec<TypeId>,
    pub variance: Variance,
    pub flags: TypeVarFlags,
    /// Position of a synthesized TypeVar within the synthesized set it
    /// belongs to.
    pub synthesized_index: Option<u32>,
    pub is_instantiable: bool,
}

impl TypeVarType {
    pub fn named(name: Atom) -> Self {
        Self {
            name,
            scope_id: None,
            bound: None,
            constraints: Vec::new(),
            variance: Variance::Invariant,
            flags: TypeVarFlags::empty(),
            synthesized_index: None,
            is_instantiable: false,
        }
    }

    pub fn is_param_spec(&self) -> bool {
        self.flags.contains(TypeVarFlags::PARAM_SPEC)
    }

    pub fn is_variadic(&self) -> bool {
        self.flags.contains(TypeVarFlags::VARIADIC)
    }

    pub fn is_synthesized(&self) -> bool {
        self.flags.contains(TypeVarFlags::SYNTHESIZED)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NoneType {
    pub is_instantiable: bool,
    pub conditions: Vec<TypeCondition>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ModuleType {
    pub name: Atom,
}

/// Placeholder for a recursive type alias. The target is registered in an
/// interner side table once known and resolved lazily at the evaluator
/// boundary.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AliasType {
    pub name: Atom,
    pub alias_id: u32,
}

/// The tagged sum of type categories.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeKey {
    Any,
    Unknown,
    Never,
    None(NoneType),
    Module(ModuleType),
    Class(ClassType),
    Function(FunctionType),
    Overloaded(Vec<TypeId>),
    TypeVar(TypeVarType),
    /// Non-empty, flat: no member is itself a union.
    Union(Vec<TypeId>),
    Alias(AliasType),
}

impl TypeKey {
    pub fn as_class(&self) -> Option<&ClassType> {
        match self {
            TypeKey::Class(class) => Some(class),
            _ => None,
        }
    }

    pub fn as_type_var(&self) -> Option<&TypeVarType> {
        match self {
            TypeKey::TypeVar(tv) => Some(tv),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionType> {
        match self {
            TypeKey::Function(func) => Some(func),
            _ => None,
        }
    }
}
