//! Type lattice and overload resolution
//!
//! Types form a lattice rooted at `object` with an `any` sentinel on top.
//! Primitives use a small-integer promotion order over type ids; classes use
//! their ancestor chain. `unify` is the assignability test, `intersect` the
//! most-derived common supertype (used to type ternary expressions).
//!
//! Overloaded callables sharing one name live in an [`OverloadTree`]: a trie
//! keyed by parameter types whose paths end in the chosen declaration.
//! Dispatch walks the trie with the actual argument types, preferring the
//! edge with the smallest `id(arg) - id(param)` derivation distance.

mod overload;

pub use overload::{OverloadEntry, OverloadError, OverloadTarget, OverloadTree, MAX_PARAMS};

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Numeric type identity; drives primitive promotion and dispatch distance
pub type TypeId = u64;

/// `any` accepts everything
pub const TYPE_ID_ANY: TypeId = 1;
/// `void` accepts nothing
pub const TYPE_ID_VOID: TypeId = 2;
/// Root of the object lattice
pub const TYPE_ID_OBJECT: TypeId = 3;
/// `nil`: smallest primitive id, so nil is assignable to every primitive
pub const TYPE_ID_NIL: TypeId = 4;
/// `boolean`
pub const TYPE_ID_BOOLEAN: TypeId = 5;
/// `integer`
pub const TYPE_ID_INTEGER: TypeId = 6;
/// `floating`; integers promote upward to floating
pub const TYPE_ID_FLOATING: TypeId = 7;
/// `string` behaves primitively for `+` but is a class in the lattice
pub const TYPE_ID_STRING: TypeId = 8;
/// `list` specialization base id
pub const TYPE_ID_LIST: TypeId = 9;
/// `map` specialization base id
pub const TYPE_ID_MAP: TypeId = 10;
/// Callables share one lattice id; their structure carries the detail
pub const TYPE_ID_CALLABLE: TypeId = 11;
/// User class ids are assigned from here upward
pub const TYPE_ID_CLASS_BASE: TypeId = 128;

/// Shared, interiorly-mutable class type: the resolver defines the class name
/// before walking members so methods can refer to the class recursively.
pub type ClassRef = Rc<RefCell<ClassType>>;

/// A resolved class: fields in slot order, methods as overload sets
#[derive(Debug)]
pub struct ClassType {
    /// Class name
    pub name: String,
    /// Lattice id
    pub id: TypeId,
    /// Direct base class, if any
    pub super_class: Option<ClassRef>,
    /// Distance from the lattice root
    pub depth: u64,
    /// Fields in declaration order; the index is the runtime field slot
    pub fields: Vec<(String, LoxType)>,
    /// Methods by name; each name is an overload set
    pub methods: HashMap<String, OverloadTree>,
}

impl ClassType {
    /// Slot index of a field, searching the ancestor chain
    pub fn field_index(&self, name: &str) -> Option<usize> {
        // Base class fields occupy the leading slots.
        if let Some(super_class) = &self.super_class {
            let base = super_class.borrow();
            if let Some(idx) = base.field_index(name) {
                return Some(idx);
            }
            let offset = base.total_field_count();
            if let Some(pos) = self.fields.iter().position(|(n, _)| n == name) {
                return Some(offset + pos);
            }
            return None;
        }
        self.fields.iter().position(|(n, _)| n == name)
    }

    /// Declared type of a field, searching the ancestor chain
    pub fn field_type(&self, name: &str) -> Option<LoxType> {
        if let Some((_, ty)) = self.fields.iter().find(|(n, _)| n == name) {
            return Some(ty.clone());
        }
        self.super_class
            .as_ref()
            .and_then(|s| s.borrow().field_type(name))
    }

    /// Total number of field slots including inherited ones
    pub fn total_field_count(&self) -> usize {
        let inherited = self
            .super_class
            .as_ref()
            .map(|s| s.borrow().total_field_count())
            .unwrap_or(0);
        inherited + self.fields.len()
    }

    /// Find a method overload set, searching the ancestor chain
    pub fn find_method(&self, name: &str) -> Option<OverloadTree> {
        if let Some(tree) = self.methods.get(name) {
            return Some(tree.clone());
        }
        self.super_class
            .as_ref()
            .and_then(|s| s.borrow().find_method(name))
    }

    /// Dispatch a method call: the nearest class in the chain whose overload
    /// set resolves the argument types wins
    pub fn resolve_method(&self, name: &str, args: &[LoxType]) -> Option<OverloadEntry> {
        if let Some(tree) = self.methods.get(name) {
            if let Some(entry) = tree.resolve(args) {
                return Some(entry.clone());
            }
        }
        self.super_class
            .as_ref()
            .and_then(|s| s.borrow().resolve_method(name, args))
    }

    /// Find a method whose parameter list matches exactly (override check)
    pub fn find_method_exact(&self, name: &str, params: &[LoxType]) -> Option<OverloadEntry> {
        if let Some(tree) = self.methods.get(name) {
            if let Some(entry) = tree
                .entries()
                .into_iter()
                .find(|e| params_eq(&e.callable.params, params))
            {
                return Some(entry.clone());
            }
        }
        self.super_class
            .as_ref()
            .and_then(|s| s.borrow().find_method_exact(name, params))
    }

    /// The sole overload of a method name, when unambiguous.
    ///
    /// The nearest class in the chain that declares the name decides; a
    /// class declaring several overloads makes the bare name ambiguous.
    pub fn single_method(&self, name: &str) -> Option<OverloadEntry> {
        if let Some(tree) = self.methods.get(name) {
            let entries = tree.entries();
            return if entries.len() == 1 {
                Some(entries[0].clone())
            } else {
                None
            };
        }
        self.super_class
            .as_ref()
            .and_then(|s| s.borrow().single_method(name))
    }

    /// True when `ancestor_id` appears in this class's ancestor chain
    pub fn has_ancestor(&self, ancestor_id: TypeId) -> bool {
        if self.id == ancestor_id {
            return true;
        }
        self.super_class
            .as_ref()
            .map(|s| s.borrow().has_ancestor(ancestor_id))
            .unwrap_or(false)
    }
}

/// A deferred-return callable signature
#[derive(Debug)]
pub struct CallableType {
    /// Parameter types, in order
    pub params: Vec<LoxType>,
    /// Return type; deferred inference writes it after the body resolves
    pub return_type: RefCell<LoxType>,
}

impl CallableType {
    /// Create a callable type with a known return type
    pub fn new(params: Vec<LoxType>, return_type: LoxType) -> Rc<Self> {
        Rc::new(Self {
            params,
            return_type: RefCell::new(return_type),
        })
    }
}

/// A type in the lattice
#[derive(Debug, Clone)]
pub enum LoxType {
    /// Accepts everything; also the error-recovery placeholder's type
    Any,
    /// Accepts nothing; the type of value-less returns
    Void,
    /// The lattice root
    Object,
    /// `nil`
    Nil,
    /// `boolean`
    Boolean,
    /// `integer`
    Integer,
    /// `floating`
    Floating,
    /// `string`
    String,
    /// `list<T>`
    List(Rc<LoxType>),
    /// `map<K, V>`
    Map(Rc<(LoxType, LoxType)>),
    /// A callable signature
    Callable(Rc<CallableType>),
    /// An overload set sharing one name
    Overloaded(Rc<RefCell<OverloadTree>>),
    /// The class itself (the value you get from the class name)
    Class(ClassRef),
    /// A value of the class (what a constructor returns)
    Instance(ClassRef),
    /// Flat set of alternatives
    Union(Rc<Vec<LoxType>>),
}

impl LoxType {
    /// Lattice id of this type
    pub fn id(&self) -> TypeId {
        match self {
            LoxType::Any => TYPE_ID_ANY,
            LoxType::Void => TYPE_ID_VOID,
            LoxType::Object => TYPE_ID_OBJECT,
            LoxType::Nil => TYPE_ID_NIL,
            LoxType::Boolean => TYPE_ID_BOOLEAN,
            LoxType::Integer => TYPE_ID_INTEGER,
            LoxType::Floating => TYPE_ID_FLOATING,
            LoxType::String => TYPE_ID_STRING,
            LoxType::List(_) => TYPE_ID_LIST,
            LoxType::Map(_) => TYPE_ID_MAP,
            LoxType::Callable(_) => TYPE_ID_CALLABLE,
            LoxType::Overloaded(_) => TYPE_ID_CALLABLE,
            LoxType::Class(c) | LoxType::Instance(c) => c.borrow().id,
            LoxType::Union(_) => TYPE_ID_ANY,
        }
    }

    /// True for the promotion-ordered primitives
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            LoxType::Nil | LoxType::Boolean | LoxType::Integer | LoxType::Floating
        )
    }

    /// True for integer or floating
    pub fn is_numeric(&self) -> bool {
        matches!(self, LoxType::Integer | LoxType::Floating | LoxType::Any)
    }

    /// True for the `any` sentinel
    pub fn is_any(&self) -> bool {
        matches!(self, LoxType::Any)
    }

    /// Unwrap an instance type to its class, if this is one
    pub fn as_instance(&self) -> Option<ClassRef> {
        match self {
            LoxType::Instance(c) => Some(Rc::clone(c)),
            _ => None,
        }
    }

    /// Unwrap a class type, if this is one
    pub fn as_class(&self) -> Option<ClassRef> {
        match self {
            LoxType::Class(c) => Some(Rc::clone(c)),
            _ => None,
        }
    }

    /// Structural subtype test: `self` usable where `base` is expected.
    ///
    /// This is the `derived < base` half of `unify`; call [`unify`] instead
    /// to get the `any`/`void`/instance unwrapping on top.
    fn is_subtype_of(&self, base: &LoxType) -> bool {
        // Identical ids are always compatible.
        if self.id() == base.id() {
            return match (self, base) {
                (LoxType::List(a), LoxType::List(b)) => unify(b, a) && unify(a, b),
                (LoxType::Map(a), LoxType::Map(b)) => {
                    unify(&a.0, &b.0) && unify(&b.0, &a.0) && unify(&a.1, &b.1) && unify(&b.1, &a.1)
                }
                (LoxType::Callable(a), LoxType::Callable(b)) => callable_eq(a, b),
                _ => true,
            };
        }

        // Primitive promotion order: id(derived) <= id(base).
        if self.is_primitive() && base.is_primitive() {
            return self.id() <= base.id();
        }

        // Class chain: derived's ancestors must contain base's id.
        match (self, base) {
            (LoxType::Class(c) | LoxType::Instance(c), _) => {
                c.borrow().has_ancestor(base.id())
            }
            // Every non-any, non-void type sits under object.
            (_, LoxType::Object) => true,
            _ => false,
        }
    }
}

impl fmt::Display for LoxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoxType::Any => write!(f, "<any>"),
            LoxType::Void => write!(f, "<void>"),
            LoxType::Object => write!(f, "<class object>"),
            LoxType::Nil => write!(f, "<nil type>"),
            LoxType::Boolean => write!(f, "<boolean>"),
            LoxType::Integer => write!(f, "<integer>"),
            LoxType::Floating => write!(f, "<floating>"),
            LoxType::String => write!(f, "<string>"),
            LoxType::List(el) => write!(f, "<list of {}>", el),
            LoxType::Map(kv) => write!(f, "<map of {} to {}>", kv.0, kv.1),
            LoxType::Callable(c) => {
                write!(f, "<callable (")?;
                for (i, p) in c.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ") -> {}>", c.return_type.borrow())
            }
            LoxType::Overloaded(tree) => {
                write!(f, "<overloaded fn {}>", tree.borrow().name())
            }
            LoxType::Class(c) => write!(f, "<class {}>", c.borrow().name),
            LoxType::Instance(c) => write!(f, "<instance of {}>", c.borrow().name),
            LoxType::Union(variants) => {
                for (i, v) in variants.iter().enumerate() {
                    if i > 0 {
                        write!(f, " or ")?;
                    }
                    write!(f, "{}", v)?;
                }
                Ok(())
            }
        }
    }
}

fn callable_eq(a: &Rc<CallableType>, b: &Rc<CallableType>) -> bool {
    if a.params.len() != b.params.len() {
        return false;
    }
    a.params
        .iter()
        .zip(b.params.iter())
        .all(|(x, y)| type_eq(x, y))
        && type_eq(&a.return_type.borrow(), &b.return_type.borrow())
}

/// Structural equality of two parameter lists
pub fn params_eq(a: &[LoxType], b: &[LoxType]) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| type_eq(x, y))
}

/// Structural type equality (used for overload signature identity)
pub fn type_eq(a: &LoxType, b: &LoxType) -> bool {
    match (a, b) {
        (LoxType::List(x), LoxType::List(y)) => type_eq(x, y),
        (LoxType::Map(x), LoxType::Map(y)) => type_eq(&x.0, &y.0) && type_eq(&x.1, &y.1),
        (LoxType::Callable(x), LoxType::Callable(y)) => callable_eq(x, y),
        (LoxType::Union(x), LoxType::Union(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(p, q)| type_eq(p, q))
        }
        _ => a.id() == b.id(),
    }
}

/// Assignability: true iff `derived` is usable where `base` is expected
pub fn unify(base: &LoxType, derived: &LoxType) -> bool {
    // Instance types unwrap on both sides.
    if let Some(class) = base.as_instance() {
        return unify(&LoxType::Class(class), derived);
    }
    if let Some(class) = derived.as_instance() {
        return unify(base, &LoxType::Class(class));
    }

    if base.is_any() || derived.is_any() {
        return !matches!(base, LoxType::Void);
    }

    if matches!(base, LoxType::Void) {
        return false;
    }

    // Union handling: every branch of a union derived must fit; a non-union
    // derived must fit some branch of a union base.
    if let LoxType::Union(variants) = derived {
        return variants.iter().all(|v| unify(base, v));
    }
    if let LoxType::Union(variants) = base {
        return variants.iter().any(|v| unify(v, derived));
    }

    derived.is_subtype_of(base)
}

/// Most-derived common supertype of two types; `any` when either is `any`
pub fn intersect(t1: &LoxType, t2: &LoxType) -> LoxType {
    if t1.is_any() || t2.is_any() {
        return LoxType::Any;
    }

    if t1.is_primitive() && t2.is_primitive() {
        return if t1.id() >= t2.id() {
            t1.clone()
        } else {
            t2.clone()
        };
    }

    if unify(t2, t1) {
        return t2.clone();
    }
    if unify(t1, t2) {
        return t1.clone();
    }

    // Climb the class chains to a common ancestor.
    if let (Some(c1), Some(c2)) = (
        t1.as_instance().or_else(|| t1.as_class()),
        t2.as_instance().or_else(|| t2.as_class()),
    ) {
        let mut a = Some(c1);
        while let Some(current) = a {
            if c2.borrow().has_ancestor(current.borrow().id) {
                return LoxType::Instance(current);
            }
            let parent = current.borrow().super_class.clone();
            a = parent;
        }
    }

    LoxType::Object
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(name: &str, id: TypeId, super_class: Option<ClassRef>) -> ClassRef {
        let depth = super_class
            .as_ref()
            .map(|s| s.borrow().depth + 1)
            .unwrap_or(1);
        Rc::new(RefCell::new(ClassType {
            name: name.into(),
            id,
            super_class,
            depth,
            fields: Vec::new(),
            methods: HashMap::new(),
        }))
    }

    #[test]
    fn test_primitive_promotion() {
        assert!(unify(&LoxType::Floating, &LoxType::Integer));
        assert!(!unify(&LoxType::Integer, &LoxType::Floating));
        assert!(unify(&LoxType::Integer, &LoxType::Nil));
        assert!(!unify(&LoxType::Integer, &LoxType::String));
    }

    #[test]
    fn test_any_and_void() {
        assert!(unify(&LoxType::Any, &LoxType::String));
        assert!(unify(&LoxType::Integer, &LoxType::Any));
        assert!(!unify(&LoxType::Void, &LoxType::Integer));
    }

    #[test]
    fn test_class_chain() {
        let a = class("A", TYPE_ID_CLASS_BASE, None);
        let b = class("B", TYPE_ID_CLASS_BASE + 1, Some(Rc::clone(&a)));
        assert!(unify(
            &LoxType::Instance(Rc::clone(&a)),
            &LoxType::Instance(Rc::clone(&b))
        ));
        assert!(!unify(
            &LoxType::Instance(Rc::clone(&b)),
            &LoxType::Instance(a)
        ));
    }

    #[test]
    fn test_union_rules() {
        let u = LoxType::Union(Rc::new(vec![LoxType::Integer, LoxType::String]));
        assert!(unify(&u, &LoxType::Integer));
        assert!(unify(&u, &LoxType::String));
        assert!(!unify(&u, &LoxType::Boolean));
        // A union derived fits only when every branch fits.
        assert!(!unify(&LoxType::Integer, &u));
    }

    #[test]
    fn test_intersect_primitives() {
        let t = intersect(&LoxType::Integer, &LoxType::Floating);
        assert_eq!(t.id(), TYPE_ID_FLOATING);
    }

    #[test]
    fn test_intersect_classes() {
        let a = class("A", TYPE_ID_CLASS_BASE, None);
        let b = class("B", TYPE_ID_CLASS_BASE + 1, Some(Rc::clone(&a)));
        let c = class("C", TYPE_ID_CLASS_BASE + 2, Some(Rc::clone(&a)));
        let t = intersect(
            &LoxType::Instance(b),
            &LoxType::Instance(c),
        );
        assert_eq!(t.id(), a.borrow().id);
    }

    #[test]
    fn test_field_slots_include_base() {
        let a = class("A", TYPE_ID_CLASS_BASE, None);
        a.borrow_mut()
            .fields
            .push(("x".into(), LoxType::Integer));
        let b = class("B", TYPE_ID_CLASS_BASE + 1, Some(Rc::clone(&a)));
        b.borrow_mut()
            .fields
            .push(("y".into(), LoxType::Integer));
        assert_eq!(b.borrow().field_index("x"), Some(0));
        assert_eq!(b.borrow().field_index("y"), Some(1));
        assert_eq!(b.borrow().total_field_count(), 2);
    }
}
