//! The document model: a tagged value tree with `Rc`-based reference counting,
//! an insertion-ordered object map, and implicit-array sibling chains for
//! duplicate keys.
//!
//! `Value::clone` *is* `ref`; the last `Drop` of a node's `Rc` *is* `unref`, and
//! recursive child teardown is exactly what `Rc`'s own drop glue already does -
//! there is no destructor to hand-write. `Node::ref_count`/`Value::ref_count`
//! expose `Rc::strong_count` for hosts that want to observe the invariant
//! directly (see the `tests` module below for the round-trip check).

use indexmap::IndexMap;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

/// Insertion-ordered key -> value map, as used throughout the parser and emitter.
/// Carried over in name and intent from the teacher's `ObjectMap<K, V> = IndexMap<K, V>`
/// alias, widened into a thin wrapper so the map itself can offer a case-insensitive
/// construction mode rather than relying on callers to pre-fold keys.
#[derive(Debug, Clone, Default)]
pub struct ObjectMap {
    inner: IndexMap<String, Value>,
    case_insensitive: bool,
}

impl ObjectMap {
    pub fn new() -> Self {
        ObjectMap {
            inner: IndexMap::new(),
            case_insensitive: false,
        }
    }

    /// Keys are folded to lowercase on both insert and lookup, so `"Foo"` and
    /// `"foo"` address the same entry. Original key casing is not preserved.
    pub fn new_case_insensitive() -> Self {
        ObjectMap {
            inner: IndexMap::new(),
            case_insensitive: true,
        }
    }

    pub fn is_case_insensitive(&self) -> bool {
        self.case_insensitive
    }

    fn fold<'a>(&self, key: &'a str) -> std::borrow::Cow<'a, str> {
        if self.case_insensitive {
            std::borrow::Cow::Owned(key.to_lowercase())
        } else {
            std::borrow::Cow::Borrowed(key)
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.inner.get(self.fold(key).as_ref())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.contains_key(self.fold(key).as_ref())
    }

    pub fn insert(&mut self, key: String, value: Value) -> Option<Value> {
        let key = self.fold(&key).into_owned();
        self.inner.insert(key, value)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, Value> {
        self.inner.iter()
    }

    pub fn keys(&self) -> indexmap::map::Keys<'_, String, Value> {
        self.inner.keys()
    }
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Flags: u8 {
        const KEY_ALLOCATED    = 1 << 0;
        const VALUE_ALLOCATED  = 1 << 1;
        const KEY_NEEDS_ESCAPE = 1 << 2;
        const EPHEMERAL        = 1 << 3;
        const MULTILINE        = 1 << 4;
    }
}

#[derive(Debug)]
pub enum ValueData {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Numerically a float; kept as a distinct tag per the spec's `Time` variant.
    Time(f64),
    String(String),
    Array(Vec<Value>),
    Object(ObjectMap),
    /// Opaque host payload. The emitter hook renders it; there is no structural
    /// comparison or schema validation defined for it.
    Userdata(Rc<dyn std::any::Any>),
}

#[derive(Debug)]
struct Node {
    data: RefCell<ValueData>,
    key: RefCell<Option<String>>,
    priority: std::cell::Cell<u8>,
    flags: std::cell::Cell<Flags>,
    /// Next value in the implicit-array chain for this key, in insertion order.
    next: RefCell<Option<Value>>,
    /// Chunk-stack depth at the time this value was inserted as an object-map
    /// head. Used by the parser to tell an ordinary duplicate key (same chunk,
    /// still chains) apart from an `.include` boundary collision (different
    /// chunk, priority-merges instead).
    origin_depth: std::cell::Cell<usize>,
}

/// A value in the document tree. Cheap to clone (an `Rc` bump); see the module
/// doc comment for how this maps onto the spec's ref/unref lifecycle.
#[derive(Debug, Clone)]
pub struct Value(Rc<Node>);

impl Value {
    fn new(data: ValueData) -> Self {
        Value(Rc::new(Node {
            data: RefCell::new(data),
            key: RefCell::new(None),
            priority: std::cell::Cell::new(0),
            flags: std::cell::Cell::new(Flags::empty()),
            next: RefCell::new(None),
            origin_depth: std::cell::Cell::new(0),
        }))
    }

    pub fn null() -> Self {
        Value::new(ValueData::Null)
    }
    pub fn bool(b: bool) -> Self {
        Value::new(ValueData::Bool(b))
    }
    pub fn int(i: i64) -> Self {
        Value::new(ValueData::Int(i))
    }
    pub fn float(f: f64) -> Self {
        Value::new(ValueData::Float(f))
    }
    pub fn time(seconds: f64) -> Self {
        Value::new(ValueData::Time(seconds))
    }
    pub fn string(s: impl Into<String>) -> Self {
        let v = Value::new(ValueData::String(s.into()));
        v.set_flag(Flags::VALUE_ALLOCATED, true);
        v
    }

    /// Like [`Value::string`], but leaves `VALUE_ALLOCATED` unset. Used by the
    /// parser under `ParserFlags::ZERO_COPY`, where the host has opted out of
    /// tracking a flag whose only purpose is bookkeeping for an allocation that
    /// is dropped along with the rest of the tree anyway.
    pub fn string_unflagged(s: impl Into<String>) -> Self {
        Value::new(ValueData::String(s.into()))
    }
    pub fn array(items: Vec<Value>) -> Self {
        Value::new(ValueData::Array(items))
    }
    pub fn object(map: ObjectMap) -> Self {
        Value::new(ValueData::Object(map))
    }
    pub fn empty_object() -> Self {
        Value::new(ValueData::Object(ObjectMap::new()))
    }
    pub fn empty_object_case_insensitive() -> Self {
        Value::new(ValueData::Object(ObjectMap::new_case_insensitive()))
    }
    pub fn empty_array() -> Self {
        Value::new(ValueData::Array(Vec::new()))
    }

    pub fn key(&self) -> Option<String> {
        self.0.key.borrow().clone()
    }

    pub fn set_key(&self, key: impl Into<String>) {
        *self.0.key.borrow_mut() = Some(key.into());
    }

    pub fn priority(&self) -> u8 {
        self.0.priority.get()
    }

    pub fn set_priority(&self, p: u8) {
        self.0.priority.set(p.min(15));
    }

    pub fn origin_depth(&self) -> usize {
        self.0.origin_depth.get()
    }

    pub fn set_origin_depth(&self, depth: usize) {
        self.0.origin_depth.set(depth);
    }

    pub fn flags(&self) -> Flags {
        self.0.flags.get()
    }

    pub fn set_flag(&self, flag: Flags, on: bool) {
        let mut f = self.0.flags.get();
        f.set(flag, on);
        self.0.flags.set(f);
    }

    /// `Rc::strong_count` - the spec's reference count. `Value::clone` is `ref`;
    /// letting a clone drop is `unref`.
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    /// Next value in this key's implicit-array chain, if this is not the last one.
    pub fn next_sibling(&self) -> Option<Value> {
        self.0.next.borrow().clone()
    }

    pub fn append_sibling(&self, next: Value) {
        let mut slot = self.0.next.borrow_mut();
        match slot.as_ref() {
            Some(existing) => existing.append_sibling(next),
            None => *slot = Some(next),
        }
    }

    /// The head-to-tail chain length, i.e. the implicit-array length for this key.
    pub fn chain_len(&self) -> usize {
        let mut n = 1;
        let mut cur = self.next_sibling();
        while let Some(v) = cur {
            n += 1;
            cur = v.next_sibling();
        }
        n
    }

    /// Visit every value in this key's implicit-array chain, head first (expanded mode).
    pub fn chain_iter(&self) -> impl Iterator<Item = Value> {
        let mut cur = Some(self.clone());
        std::iter::from_fn(move || {
            let v = cur.take()?;
            cur = v.next_sibling();
            Some(v)
        })
    }

    pub fn is_null(&self) -> bool {
        matches!(&*self.0.data.borrow(), ValueData::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match &*self.0.data.borrow() {
            ValueData::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match &*self.0.data.borrow() {
            ValueData::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match &*self.0.data.borrow() {
            ValueData::Float(f) => Some(*f),
            ValueData::Time(t) => Some(*t),
            ValueData::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<f64> {
        match &*self.0.data.borrow() {
            ValueData::Time(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<String> {
        match &*self.0.data.borrow() {
            ValueData::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(&*self.0.data.borrow(), ValueData::Array(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(&*self.0.data.borrow(), ValueData::Object(_))
    }

    pub fn is_number(&self) -> bool {
        matches!(
            &*self.0.data.borrow(),
            ValueData::Int(_) | ValueData::Float(_) | ValueData::Time(_)
        )
    }

    pub fn with_array<R>(&self, f: impl FnOnce(&Vec<Value>) -> R) -> Option<R> {
        match &*self.0.data.borrow() {
            ValueData::Array(a) => Some(f(a)),
            _ => None,
        }
    }

    pub fn with_array_mut<R>(&self, f: impl FnOnce(&mut Vec<Value>) -> R) -> Option<R> {
        match &mut *self.0.data.borrow_mut() {
            ValueData::Array(a) => Some(f(a)),
            _ => None,
        }
    }

    pub fn with_object<R>(&self, f: impl FnOnce(&ObjectMap) -> R) -> Option<R> {
        match &*self.0.data.borrow() {
            ValueData::Object(o) => Some(f(o)),
            _ => None,
        }
    }

    pub fn with_object_mut<R>(&self, f: impl FnOnce(&mut ObjectMap) -> R) -> Option<R> {
        match &mut *self.0.data.borrow_mut() {
            ValueData::Object(o) => Some(f(o)),
            _ => None,
        }
    }

    /// `length` per the spec: string byte length, array element count (collapsed,
    /// i.e. not counting implicit-array siblings), or object distinct-key count.
    pub fn length(&self) -> usize {
        match &*self.0.data.borrow() {
            ValueData::String(s) => s.len(),
            ValueData::Array(a) => a.len(),
            ValueData::Object(o) => o.len(),
            _ => 0,
        }
    }

    /// Insert `value` under `key`. If `key` already exists, `value` is appended
    /// to the existing entry's implicit-array chain rather than overwriting it.
    pub fn object_insert(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        value.set_key(key.clone());
        self.with_object_mut(|o| {
            if let Some(existing) = o.get(&key) {
                existing.append_sibling(value);
            } else {
                o.insert(key, value);
            }
        });
    }

    /// Dot-path lookup (`a.b.c`), per spec's "no general JSON Pointer, dot-path only" non-goal.
    /// Traverses object heads only (collapsed view); arrays are not indexable this way.
    pub fn get_path(&self, path: &str) -> Option<Value> {
        let mut cur = self.clone();
        for segment in path.split('.') {
            if segment.is_empty() {
                continue;
            }
            let next = cur.with_object(|o| o.get(segment).cloned())??;
            cur = next;
        }
        Some(cur)
    }

    /// Deep structural equality, used by `enum`/`uniqueItems` in the schema
    /// validator. Int/Float/Time compare numerically; everything else compares
    /// by tag, then length, then content.
    pub fn deep_eq(&self, other: &Value) -> bool {
        use ValueData::*;
        let a = self.0.data.borrow();
        let b = other.0.data.borrow();
        match (&*a, &*b) {
            (Null, Null) => true,
            (Bool(x), Bool(y)) => x == y,
            (Int(_) | Float(_) | Time(_), Int(_) | Float(_) | Time(_)) => {
                numeric_value(&a) == numeric_value(&b)
            }
            (String(x), String(y)) => x == y,
            (Array(x), Array(y)) => {
                x.len() == y.len() && x.iter().zip(y.iter()).all(|(p, q)| p.deep_eq(q))
            }
            (Object(x), Object(y)) => {
                if x.len() != y.len() {
                    return false;
                }
                x.iter().all(|(k, v)| match y.get(k) {
                    Some(w) => v.deep_eq(w),
                    None => false,
                })
            }
            _ => false,
        }
    }

    pub fn tag_name(&self) -> &'static str {
        match &*self.0.data.borrow() {
            ValueData::Null => "null",
            ValueData::Bool(_) => "boolean",
            ValueData::Int(_) => "integer",
            ValueData::Float(_) => "number",
            ValueData::Time(_) => "number",
            ValueData::String(_) => "string",
            ValueData::Array(_) => "array",
            ValueData::Object(_) => "object",
            ValueData::Userdata(_) => "userdata",
        }
    }

    pub(crate) fn borrow_data(&self) -> std::cell::Ref<'_, ValueData> {
        self.0.data.borrow()
    }
}

fn numeric_value(data: &ValueData) -> f64 {
    match data {
        ValueData::Int(i) => *i as f64,
        ValueData::Float(f) => *f,
        ValueData::Time(t) => *t,
        _ => f64::NAN,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.deep_eq(other)
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.as_float(), other.as_float()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}
impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::string(s)
    }
}
impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::int(i)
    }
}
impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::float(f)
    }
}
impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_unref_roundtrip_is_identity() {
        let v = Value::int(42);
        let before = v.ref_count();
        let cloned = v.clone(); // ref
        assert_eq!(v.ref_count(), before + 1);
        drop(cloned); // unref
        assert_eq!(v.ref_count(), before);
    }

    #[test]
    fn object_insert_duplicate_key_forms_implicit_array() {
        let obj = Value::empty_object();
        obj.object_insert("a", Value::int(1));
        obj.object_insert("a", Value::int(2));
        obj.object_insert("a", Value::int(3));
        assert_eq!(obj.length(), 1); // one distinct key
        let head = obj.with_object(|o| o.get("a").cloned()).unwrap().unwrap();
        assert_eq!(head.chain_len(), 3);
        let vals: Vec<i64> = head.chain_iter().map(|v| v.as_int().unwrap()).collect();
        assert_eq!(vals, vec![1, 2, 3]);
    }

    #[test]
    fn length_is_distinct_key_count_not_chain_length() {
        let obj = Value::empty_object();
        obj.object_insert("a", Value::int(1));
        obj.object_insert("a", Value::int(2));
        obj.object_insert("b", Value::int(3));
        assert_eq!(obj.length(), 2);
    }

    #[test]
    fn deep_eq_compares_int_and_float_numerically() {
        assert!(Value::int(1).deep_eq(&Value::float(1.0)));
        assert!(!Value::int(1).deep_eq(&Value::float(1.5)));
    }

    #[test]
    fn deep_eq_objects_ignore_insertion_order() {
        let a = Value::empty_object();
        a.object_insert("x", Value::int(1));
        a.object_insert("y", Value::int(2));
        let b = Value::empty_object();
        b.object_insert("y", Value::int(2));
        b.object_insert("x", Value::int(1));
        assert!(a.deep_eq(&b));
    }

    #[test]
    fn string_sets_value_allocated_flag() {
        let v = Value::string("hi");
        assert!(v.flags().contains(Flags::VALUE_ALLOCATED));
    }

    #[test]
    fn string_unflagged_skips_value_allocated_flag() {
        let v = Value::string_unflagged("hi");
        assert!(!v.flags().contains(Flags::VALUE_ALLOCATED));
        assert_eq!(v.as_str().unwrap(), "hi");
    }

    #[test]
    fn case_insensitive_object_map_folds_keys() {
        let obj = Value::empty_object_case_insensitive();
        obj.object_insert("Foo", Value::int(1));
        assert_eq!(
            obj.with_object(|o| o.get("foo").cloned()).unwrap().unwrap().as_int(),
            Some(1)
        );
        assert_eq!(
            obj.with_object(|o| o.get("FOO").cloned()).unwrap().unwrap().as_int(),
            Some(1)
        );
    }

    #[test]
    fn case_sensitive_object_map_keeps_keys_distinct() {
        let obj = Value::empty_object();
        obj.object_insert("Foo", Value::int(1));
        obj.object_insert("foo", Value::int(2));
        assert_eq!(obj.length(), 2);
    }

    #[test]
    fn get_path_traverses_nested_objects() {
        let leaf = Value::string("deep");
        let mid = Value::empty_object();
        mid.object_insert("c", leaf);
        let root = Value::empty_object();
        root.object_insert("b", mid);
        assert_eq!(root.get_path("b.c").unwrap().as_str().unwrap(), "deep");
        assert!(root.get_path("b.missing").is_none());
    }
}
