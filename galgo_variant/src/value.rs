#![forbid(unsafe_code)]

use std::cell::{Ref, RefCell, RefMut};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use galgo_ids::ActorId;
use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};

/// 2D vector used throughout the engine core.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    #[inline]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }
}

impl fmt::Display for Vec2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Handle to a typed (non-table) component: physics body or particle emitter.
#[derive(Clone, Debug, PartialEq)]
pub struct ComponentRef {
    pub actor: ActorId,
    pub kind: Arc<str>,
    pub key: Arc<str>,
}

pub type Table = BTreeMap<Arc<str>, Value>;

/// Shared mutable table. Tables alias by reference, exactly like the dynamic
/// object model they replace; equality is identity, not structure.
#[derive(Clone)]
pub struct TableRef(Rc<RefCell<Table>>);

impl TableRef {
    #[inline]
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(Table::new())))
    }

    #[inline]
    pub fn from_table(table: Table) -> Self {
        Self(Rc::new(RefCell::new(table)))
    }

    #[inline]
    pub fn borrow(&self) -> Ref<'_, Table> {
        self.0.borrow()
    }

    #[inline]
    pub fn borrow_mut(&self) -> RefMut<'_, Table> {
        self.0.borrow_mut()
    }

    #[inline]
    pub fn ptr_eq(&self, other: &TableRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Stable address of the backing allocation, for identity maps.
    #[inline]
    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    /// Clone of the value stored at `key`, `Nil` when absent.
    pub fn get(&self, key: &str) -> Value {
        self.0.borrow().get(key).cloned().unwrap_or(Value::Nil)
    }

    pub fn set(&self, key: impl Into<Arc<str>>, value: Value) {
        self.0.borrow_mut().insert(key.into(), value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.borrow().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}

impl Default for TableRef {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for TableRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(table) => f.debug_map().entries(table.iter()).finish(),
            Err(_) => write!(f, "{{<borrowed>}}"),
        }
    }
}

/// Tagged dynamic value for scripted component state and save data.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Value {
    #[default]
    Nil,
    Int(i64),
    Float(f32),
    Bool(bool),
    Str(Arc<str>),
    Vec2(Vec2),
    Table(TableRef),
    /// Live reference to an actor.
    Actor(ActorId),
    /// Live reference to a typed component on an actor.
    Component(ComponentRef),
}

impl Value {
    #[inline]
    pub fn string<S: AsRef<str>>(s: S) -> Self {
        Value::Str(Arc::<str>::from(s.as_ref()))
    }

    #[inline]
    pub fn table() -> Self {
        Value::Table(TableRef::new())
    }

    #[inline]
    pub const fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match *self {
            Value::Int(v) => Some(v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_float(&self) -> Option<f32> {
        match *self {
            Value::Float(v) => Some(v),
            _ => None,
        }
    }

    /// Numeric coercion: ints widen to f32. Scene-file fields use this.
    #[inline]
    pub fn as_number(&self) -> Option<f32> {
        match *self {
            Value::Int(v) => Some(v as f32),
            Value::Float(v) => Some(v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(v) => Some(v),
            _ => None,
        }
    }

    /// Truthiness in the scripting sense: nil and false are falsy.
    #[inline]
    pub fn truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_vec2(&self) -> Option<Vec2> {
        match *self {
            Value::Vec2(v) => Some(v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_table(&self) -> Option<&TableRef> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    #[inline]
    pub fn as_actor(&self) -> Option<ActorId> {
        match *self {
            Value::Actor(id) => Some(id),
            _ => None,
        }
    }

    #[inline]
    pub fn as_component(&self) -> Option<&ComponentRef> {
        match self {
            Value::Component(c) => Some(c),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{:?}", v.as_ref()),
            Value::Vec2(v) => write!(f, "{v}"),
            Value::Table(t) => write!(f, "{t:?}"),
            Value::Actor(id) => write!(f, "<actor {id}>"),
            Value::Component(c) => write!(f, "<{} {}:{}>", c.kind, c.actor, c.key),
        }
    }
}

// -------------------- From impls (ergonomic construction) --------------------

impl From<i64> for Value {
    #[inline]
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}
impl From<i32> for Value {
    #[inline]
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}
impl From<f32> for Value {
    #[inline]
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}
impl From<bool> for Value {
    #[inline]
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
impl From<&str> for Value {
    #[inline]
    fn from(v: &str) -> Self {
        Value::Str(Arc::<str>::from(v))
    }
}
impl From<String> for Value {
    #[inline]
    fn from(v: String) -> Self {
        Value::Str(Arc::<str>::from(v))
    }
}
impl From<Arc<str>> for Value {
    #[inline]
    fn from(v: Arc<str>) -> Self {
        Value::Str(v)
    }
}
impl From<Vec2> for Value {
    #[inline]
    fn from(v: Vec2) -> Self {
        Value::Vec2(v)
    }
}
impl From<TableRef> for Value {
    #[inline]
    fn from(v: TableRef) -> Self {
        Value::Table(v)
    }
}
impl From<ActorId> for Value {
    #[inline]
    fn from(v: ActorId) -> Self {
        Value::Actor(v)
    }
}
impl From<ComponentRef> for Value {
    #[inline]
    fn from(v: ComponentRef) -> Self {
        Value::Component(v)
    }
}

// -------------------- Deep clone --------------------

/// Recursive clone of a value graph. Aliasing between distinct tables is
/// severed; cycles are preserved by identity through the visited map, so the
/// clone of a cyclic graph is itself a valid cyclic graph.
pub fn deep_clone(value: &Value) -> Value {
    let mut seen: HashMap<usize, TableRef> = HashMap::new();
    clone_value(value, &mut seen)
}

/// Deep clone rooted at a table. See [`deep_clone`].
pub fn deep_clone_table(table: &TableRef) -> TableRef {
    let mut seen: HashMap<usize, TableRef> = HashMap::new();
    clone_table(table, &mut seen)
}

fn clone_value(value: &Value, seen: &mut HashMap<usize, TableRef>) -> Value {
    match value {
        Value::Table(t) => Value::Table(clone_table(t, seen)),
        other => other.clone(),
    }
}

fn clone_table(source: &TableRef, seen: &mut HashMap<usize, TableRef>) -> TableRef {
    if let Some(existing) = seen.get(&source.addr()) {
        return existing.clone();
    }
    let clone = TableRef::new();
    seen.insert(source.addr(), clone.clone());
    let entries: Vec<(Arc<str>, Value)> = source
        .borrow()
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    for (key, value) in entries {
        let cloned = clone_value(&value, seen);
        clone.borrow_mut().insert(key, cloned);
    }
    clone
}

// -------------------- JSON conversion --------------------

impl Value {
    /// Scene and config files are JSON; arrays become tables with 1-based
    /// decimal keys, matching the sequence convention of the scripted tables.
    pub fn from_json_value(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => Value::Nil,
            JsonValue::Bool(v) => Value::Bool(*v),
            JsonValue::Number(v) => {
                if let Some(i) = v.as_i64() {
                    Value::Int(i)
                } else if let Some(f) = v.as_f64() {
                    Value::Float(f as f32)
                } else {
                    Value::Nil
                }
            }
            JsonValue::String(v) => Value::string(v),
            JsonValue::Array(values) => {
                let table = TableRef::new();
                for (i, v) in values.iter().enumerate() {
                    table.set(format!("{}", i + 1), Value::from_json_value(v));
                }
                Value::Table(table)
            }
            JsonValue::Object(object) => {
                let table = TableRef::new();
                for (k, v) in object {
                    table.set(k.as_str(), Value::from_json_value(v));
                }
                Value::Table(table)
            }
        }
    }

    /// Lossy JSON view for display (save previews, debugging). References
    /// degrade to descriptive strings; cyclic tables are cut at revisits.
    pub fn to_json_value(&self) -> JsonValue {
        let mut seen = Vec::new();
        self.to_json_inner(&mut seen)
    }

    fn to_json_inner(&self, seen: &mut Vec<usize>) -> JsonValue {
        match self {
            Value::Nil => JsonValue::Null,
            Value::Int(v) => JsonValue::Number(JsonNumber::from(*v)),
            Value::Float(v) => match JsonNumber::from_f64(*v as f64) {
                Some(n) => JsonValue::Number(n),
                None => JsonValue::Null,
            },
            Value::Bool(v) => JsonValue::Bool(*v),
            Value::Str(v) => JsonValue::String(v.as_ref().to_string()),
            Value::Vec2(v) => {
                let mut map = JsonMap::new();
                map.insert("x".to_string(), float_to_json(v.x));
                map.insert("y".to_string(), float_to_json(v.y));
                JsonValue::Object(map)
            }
            Value::Table(t) => {
                if seen.contains(&t.addr()) {
                    return JsonValue::String("<cycle>".to_string());
                }
                seen.push(t.addr());
                let mut map = JsonMap::new();
                for (k, v) in t.borrow().iter() {
                    map.insert(k.as_ref().to_string(), v.to_json_inner(seen));
                }
                seen.pop();
                JsonValue::Object(map)
            }
            Value::Actor(id) => JsonValue::String(format!("<actor {id}>")),
            Value::Component(c) => {
                JsonValue::String(format!("<{} {}:{}>", c.kind, c.actor, c.key))
            }
        }
    }
}

fn float_to_json(value: f32) -> JsonValue {
    match JsonNumber::from_f64(value as f64) {
        Some(v) => JsonValue::Number(v),
        None => JsonValue::Null,
    }
}
