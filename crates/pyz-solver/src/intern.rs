//! Type interning.
//!
//! Structural interning makes type equality an id comparison and gives
//! synthesized classes (intersections, narrowed TypedDicts) deterministic
//! identity: interning the same shape twice yields the same `TypeId`, which
//! the surrounding checker relies on for caching.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use pyz_common::interner::{Atom, StringInterner};
use rustc_hash::FxBuildHasher;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use crate::types::*;

/// Base of the scope-id range reserved for synthesized type variables.
const SYNTHETIC_SCOPE_BASE: u32 = 1 << 30;

/// An interned builtin class in both of its forms.
#[derive(Clone, Copy, Debug)]
pub struct BuiltinClass {
    pub name: Atom,
    /// The instantiable (class-qua-class) form.
    pub class: TypeId,
    /// The instance form.
    pub instance: TypeId,
}

impl BuiltinClass {
    const fn placeholder() -> Self {
        Self {
            name: Atom(u32::MAX),
            class: TypeId::ANY,
            instance: TypeId::ANY,
        }
    }
}

/// The built-in lookup table. Registered once at interner construction; this
/// is the capability through which the solver and the narrowing engine reach
/// `object`, `type`, the container classes, and the literal-bearing scalar
/// classes.
#[derive(Clone, Copy, Debug)]
pub struct Builtins {
    pub object: BuiltinClass,
    pub r#type: BuiltinClass,
    pub bool: BuiltinClass,
    pub int: BuiltinClass,
    pub str: BuiltinClass,
    pub bytes: BuiltinClass,
    pub tuple: BuiltinClass,
    pub list: BuiltinClass,
    pub set: BuiltinClass,
    pub frozenset: BuiltinClass,
    pub deque: BuiltinClass,
    pub dict: BuiltinClass,
    pub defaultdict: BuiltinClass,
    pub ordered_dict: BuiltinClass,
}

impl Builtins {
    const fn placeholder() -> Self {
        Self {
            object: BuiltinClass::placeholder(),
            r#type: BuiltinClass::placeholder(),
            bool: BuiltinClass::placeholder(),
            int: BuiltinClass::placeholder(),
            str: BuiltinClass::placeholder(),
            bytes: BuiltinClass::placeholder(),
            tuple: BuiltinClass::placeholder(),
            list: BuiltinClass::placeholder(),
            set: BuiltinClass::placeholder(),
            frozenset: BuiltinClass::placeholder(),
            deque: BuiltinClass::placeholder(),
            dict: BuiltinClass::placeholder(),
            defaultdict: BuiltinClass::placeholder(),
            ordered_dict: BuiltinClass::placeholder(),
        }
    }

    /// Container classes whose element type drives `in` narrowing.
    pub fn container_classes(&self) -> [&BuiltinClass; 8] {
        [
            &self.list,
            &self.set,
            &self.frozenset,
            &self.deque,
            &self.tuple,
            &self.dict,
            &self.defaultdict,
            &self.ordered_dict,
        ]
    }
}

pub struct TypeInterner {
    strings: Arc<StringInterner>,
    map: DashMap<TypeKey, TypeId, FxBuildHasher>,
    types: RwLock<Vec<TypeKey>>,
    alias_targets: DashMap<u32, TypeId, FxBuildHasher>,
    next_alias_id: AtomicU32,
    next_scope_id: AtomicU32,
    builtins: Builtins,
}

impl TypeInterner {
    pub fn new() -> Self {
        Self::with_strings(Arc::new(StringInterner::new()))
    }

    /// Build an interner sharing a string interner with the parse-tree
    /// arena, so name atoms unify across the two.
    pub fn with_strings(strings: Arc<StringInterner>) -> Self {
        let mut interner = Self {
            strings,
            map: DashMap::with_hasher(FxBuildHasher),
            types: RwLock::new(Vec::new()),
            alias_targets: DashMap::with_hasher(FxBuildHasher),
            next_alias_id: AtomicU32::new(0),
            next_scope_id: AtomicU32::new(SYNTHETIC_SCOPE_BASE),
            builtins: Builtins::placeholder(),
        };
        interner.register_intrinsics();
        interner.builtins = interner.register_builtins();
        interner
    }

    fn register_intrinsics(&self) {
        let any = self.intern(TypeKey::Any);
        let unknown = self.intern(TypeKey::Unknown);
        let never = self.intern(TypeKey::Never);
        let none = self.intern(TypeKey::None(NoneType {
            is_instantiable: false,
            conditions: Vec::new(),
        }));
        let none_type = self.intern(TypeKey::None(NoneType {
            is_instantiable: true,
            conditions: Vec::new(),
        }));
        debug_assert_eq!(any, TypeId::ANY);
        debug_assert_eq!(unknown, TypeId::UNKNOWN);
        debug_assert_eq!(never, TypeId::NEVER);
        debug_assert_eq!(none, TypeId::NONE);
        debug_assert_eq!(none_type, TypeId::NONE_TYPE);
    }

    fn register_builtin(&self, name: &str, flags: ClassFlags, mro: Vec<TypeId>) -> BuiltinClass {
        let name = self.atom(name);
        let mut class = ClassType::named(name);
        class.flags = flags | ClassFlags::BUILTIN;
        class.mro = mro;
        class.is_instantiable = true;
        let class_id = self.intern(TypeKey::Class(class.clone()));
        class.is_instantiable = false;
        let instance_id = self.intern(TypeKey::Class(class));
        BuiltinClass {
            name,
            class: class_id,
            instance: instance_id,
        }
    }

    fn register_builtins(&self) -> Builtins {
        let object = self.register_builtin("builtins.object", ClassFlags::empty(), Vec::new());
        let object_mro = vec![object.class];
        let r#type = self.register_builtin("builtins.type", ClassFlags::empty(), object_mro.clone());
        let int = self.register_builtin("builtins.int", ClassFlags::empty(), object_mro.clone());
        let bool = self.register_builtin(
            "builtins.bool",
            ClassFlags::empty(),
            vec![int.class, object.class],
        );
        let str = self.register_builtin("builtins.str", ClassFlags::empty(), object_mro.clone());
        let bytes = self.register_builtin("builtins.bytes", ClassFlags::empty(), object_mro.clone());
        let tuple =
            self.register_builtin("builtins.tuple", ClassFlags::TUPLE, object_mro.clone());
        let list = self.register_builtin("builtins.list", ClassFlags::empty(), object_mro.clone());
        let set = self.register_builtin("builtins.set", ClassFlags::empty(), object_mro.clone());
        let frozenset =
            self.register_builtin("builtins.frozenset", ClassFlags::empty(), object_mro.clone());
        let deque =
            self.register_builtin("collections.deque", ClassFlags::empty(), object_mro.clone());
        let dict = self.register_builtin("builtins.dict", ClassFlags::empty(), object_mro.clone());
        let defaultdict = self.register_builtin(
            "collections.defaultdict",
            ClassFlags::empty(),
            vec![dict.class, object.class],
        );
        let ordered_dict = self.register_builtin(
            "collections.OrderedDict",
            ClassFlags::empty(),
            vec![dict.class, object.class],
        );
        Builtins {
            object,
            r#type,
            bool,
            int,
            str,
            bytes,
            tuple,
            list,
            set,
            frozenset,
            deque,
            dict,
            defaultdict,
            ordered_dict,
        }
    }

    pub fn builtins(&self) -> &Builtins {
        &self.builtins
    }

    pub fn strings(&self) -> &Arc<StringInterner> {
        &self.strings
    }

    pub fn atom(&self, text: &str) -> Atom {
        self.strings.intern(text)
    }

    pub fn resolve_atom(&self, atom: Atom) -> Arc<str> {
        self.strings.resolve(atom)
    }

    /// A fresh definition-site id for synthesized type variables.
    pub fn fresh_type_var_scope(&self) -> TypeVarScopeId {
        TypeVarScopeId(self.next_scope_id.fetch_add(1, Ordering::Relaxed))
    }

    // =========================================================================
    // Interning
    // =========================================================================

    pub fn intern(&self, key: TypeKey) -> TypeId {
        if let Some(id) = self.map.get(&key) {
            return *id;
        }
        // Hold the storage lock across the map insert so the assigned id
        // always matches the push position, even under racing interns.
        let mut types = self.types.write().expect("type storage poisoned");
        match self.map.entry(key.clone()) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let id = TypeId(types.len() as u32);
                types.push(key);
                entry.insert(id);
                id
            }
        }
    }

    pub fn lookup(&self, id: TypeId) -> Option<TypeKey> {
        let types = self.types.read().expect("type storage poisoned");
        types.get(id.0 as usize).cloned()
    }

    pub fn class_of(&self, id: TypeId) -> Option<ClassType> {
        match self.lookup(id)? {
            TypeKey::Class(class) => Some(class),
            _ => None,
        }
    }

    pub fn type_var_of(&self, id: TypeId) -> Option<TypeVarType> {
        match self.lookup(id)? {
            TypeKey::TypeVar(tv) => Some(tv),
            _ => None,
        }
    }

    pub fn function_of(&self, id: TypeId) -> Option<FunctionType> {
        match self.lookup(id)? {
            TypeKey::Function(func) => Some(func),
            _ => None,
        }
    }

    pub fn is_union(&self, id: TypeId) -> bool {
        matches!(self.lookup(id), Some(TypeKey::Union(_)))
    }

    pub fn is_any_or_unknown(&self, id: TypeId) -> bool {
        id == TypeId::ANY || id == TypeId::UNKNOWN
    }

    pub fn is_none_instance(&self, id: TypeId) -> bool {
        matches!(
            self.lookup(id),
            Some(TypeKey::None(none)) if !none.is_instantiable
        )
    }

    /// The members of a union, or the type itself as a singleton list.
    pub fn subtypes_of(&self, id: TypeId) -> Vec<TypeId> {
        match self.lookup(id) {
            Some(TypeKey::Union(members)) => members,
            _ => vec![id],
        }
    }

    // =========================================================================
    // Union construction
    // =========================================================================

    /// Build a union, maintaining the flattening invariant: members that are
    /// themselves unions are inlined, duplicates are dropped, `Never` is the
    /// identity, `Any`/`Unknown` dominate, and a singleton collapses to its
    /// only member.
    pub fn union(&self, members: Vec<TypeId>) -> TypeId {
        let mut flat: Vec<TypeId> = Vec::with_capacity(members.len());
        let mut saw_unknown = false;
        for member in members {
            if member == TypeId::ANY {
                return TypeId::ANY;
            }
            if member == TypeId::UNKNOWN {
                saw_unknown = true;
                continue;
            }
            if member == TypeId::NEVER {
                continue;
            }
            match self.lookup(member) {
                Some(TypeKey::Union(inner)) => {
                    for inner_member in inner {
                        if !flat.contains(&inner_member) {
                            flat.push(inner_member);
                        }
                    }
                }
                _ => {
                    if !flat.contains(&member) {
                        flat.push(member);
                    }
                }
            }
        }
        if saw_unknown {
            return TypeId::UNKNOWN;
        }
        match flat.len() {
            0 => TypeId::NEVER,
            1 => flat[0],
            _ => self.intern(TypeKey::Union(flat)),
        }
    }

    pub fn union2(&self, a: TypeId, b: TypeId) -> TypeId {
        self.union(vec![a, b])
    }

    pub fn union3(&self, a: TypeId, b: TypeId, c: TypeId) -> TypeId {
        self.union(vec![a, b, c])
    }

    // =========================================================================
    // Literals
    // =========================================================================

    fn literal_of(&self, base: &BuiltinClass, literal: LiteralValue) -> TypeId {
        let Some(mut class) = self.class_of(base.instance) else {
            return base.instance;
        };
        class.literal = Some(literal);
        class.is_instantiable = false;
        self.intern(TypeKey::Class(class))
    }

    pub fn literal_int(&self, value: i64) -> TypeId {
        self.literal_of(&self.builtins.int, LiteralValue::Int(value))
    }

    pub fn literal_bool(&self, value: bool) -> TypeId {
        self.literal_of(&self.builtins.bool, LiteralValue::Bool(value))
    }

    pub fn literal_str(&self, value: &str) -> TypeId {
        let value = self.atom(value);
        self.literal_of(&self.builtins.str, LiteralValue::Str(value))
    }

    pub fn literal_bytes(&self, value: &str) -> TypeId {
        let value = self.atom(value);
        self.literal_of(&self.builtins.bytes, LiteralValue::Bytes(value))
    }

    // =========================================================================
    // Tuples
    // =========================================================================

    /// A fixed-length tuple instance.
    pub fn tuple_of(&self, elements: &[TypeId]) -> TypeId {
        let args = elements
            .iter()
            .map(|&ty| TupleArg {
                ty,
                is_unbounded: false,
            })
            .collect();
        self.tuple_with_args(args)
    }

    /// `tuple[elem, ...]`: a homogeneous unbounded tuple instance.
    pub fn unbounded_tuple(&self, element: TypeId) -> TypeId {
        self.tuple_with_args(vec![TupleArg {
            ty: element,
            is_unbounded: true,
        }])
    }

    pub fn tuple_with_args(&self, args: Vec<TupleArg>) -> TypeId {
        let base = &self.builtins.tuple;
        let Some(mut class) = self.class_of(base.instance) else {
            return base.instance;
        };
        class.tuple_args = Some(args);
        self.intern(TypeKey::Class(class))
    }

    // =========================================================================
    // Instantiable / instance conversion
    // =========================================================================

    /// Convert a type to its instance form, when it has one.
    pub fn to_instance(&self, id: TypeId) -> TypeId {
        match self.lookup(id) {
            Some(TypeKey::Class(mut class)) if class.is_instantiable => {
                class.is_instantiable = false;
                self.intern(TypeKey::Class(class))
            }
            Some(TypeKey::None(mut none)) if none.is_instantiable => {
                none.is_instantiable = false;
                self.intern(TypeKey::None(none))
            }
            Some(TypeKey::TypeVar(mut tv)) if tv.is_instantiable => {
                tv.is_instantiable = false;
                self.intern(TypeKey::TypeVar(tv))
            }
            Some(TypeKey::Union(members)) => {
                let converted = members.into_iter().map(|m| self.to_instance(m)).collect();
                self.union(converted)
            }
            _ => id,
        }
    }

    /// Convert a type to its instantiable form. Literal instances convert to
    /// their class. Returns `None` for types with no instantiable form
    /// (functions, modules).
    pub fn to_instantiable(&self, id: TypeId) -> Option<TypeId> {
        match self.lookup(id)? {
            TypeKey::Any | TypeKey::Unknown | TypeKey::Never => Some(id),
            TypeKey::Class(mut class) => {
                class.literal = None;
                class.is_instantiable = true;
                Some(self.intern(TypeKey::Class(class)))
            }
            TypeKey::None(mut none) => {
                none.is_instantiable = true;
                Some(self.intern(TypeKey::None(none)))
            }
            TypeKey::TypeVar(mut tv) => {
                tv.is_instantiable = true;
                Some(self.intern(TypeKey::TypeVar(tv)))
            }
            TypeKey::Union(members) => {
                let mut converted = Vec::with_capacity(members.len());
                for member in members {
                    converted.push(self.to_instantiable(member)?);
                }
                Some(self.union(converted))
            }
            _ => None,
        }
    }

    // =========================================================================
    // Conditions
    // =========================================================================

    /// Tag a type with constraint-provenance conditions. Conditions merge,
    /// deduplicate, and sort, so tagging is order-insensitive.
    pub fn with_conditions(&self, id: TypeId, conditions: &[TypeCondition]) -> TypeId {
        if conditions.is_empty() {
            return id;
        }
        fn merge(existing: &mut Vec<TypeCondition>, added: &[TypeCondition]) {
            existing.extend_from_slice(added);
            existing.sort();
            existing.dedup();
        }
        match self.lookup(id) {
            Some(TypeKey::Class(mut class)) => {
                merge(&mut class.conditions, conditions);
                self.intern(TypeKey::Class(class))
            }
            Some(TypeKey::None(mut none)) => {
                merge(&mut none.conditions, conditions);
                self.intern(TypeKey::None(none))
            }
            Some(TypeKey::Union(members)) => {
                let tagged = members
                    .into_iter()
                    .map(|m| self.with_conditions(m, conditions))
                    .collect();
                self.union(tagged)
            }
            _ => id,
        }
    }

    pub fn condition_set(&self, id: TypeId) -> Vec<TypeCondition> {
        match self.lookup(id) {
            Some(TypeKey::Class(class)) => class.conditions,
            Some(TypeKey::None(none)) => none.conditions,
            _ => Vec::new(),
        }
    }

    // =========================================================================
    // Recursive aliases
    // =========================================================================

    /// Create a fresh alias placeholder. The target is registered later with
    /// `set_alias_target` (possibly referring back to the alias itself).
    pub fn alias(&self, name: Atom) -> TypeId {
        let alias_id = self.next_alias_id.fetch_add(1, Ordering::Relaxed);
        self.intern(TypeKey::Alias(AliasType { name, alias_id }))
    }

    pub fn set_alias_target(&self, alias: TypeId, target: TypeId) {
        if let Some(TypeKey::Alias(data)) = self.lookup(alias) {
            self.alias_targets.insert(data.alias_id, target);
        }
    }

    pub fn alias_target(&self, id: TypeId) -> Option<TypeId> {
        match self.lookup(id)? {
            TypeKey::Alias(data) => self.alias_targets.get(&data.alias_id).map(|t| *t),
            _ => None,
        }
    }
}
