//! The closed tagged union stored in cell properties.
//!
//! Payloads up to two machine words live inline in the enum. Wider payloads
//! (strings, opaque values, callbacks) are kept behind an `Arc`, which also
//! makes cloning a `Value` cheap. Neither choice is visible to callers.

use crate::geometry::{Color, Coord, CoordF, Direction};
use crate::id::PartId;
use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Tags and errors
// ---------------------------------------------------------------------------

/// Discriminant of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueTag {
    Bool,
    Int,
    UInt,
    Double,
    Str,
    Coord,
    CoordF,
    Dir,
    Color,
    Any,
    Callback,
    Type,
}

impl ValueTag {
    pub fn name(&self) -> &'static str {
        match self {
            ValueTag::Bool => "bool",
            ValueTag::Int => "int",
            ValueTag::UInt => "uint",
            ValueTag::Double => "double",
            ValueTag::Str => "str",
            ValueTag::Coord => "coord",
            ValueTag::CoordF => "coordf",
            ValueTag::Dir => "dir",
            ValueTag::Color => "color",
            ValueTag::Any => "any",
            ValueTag::Callback => "callback",
            ValueTag::Type => "type",
        }
    }

    pub fn from_name(name: &str) -> Option<ValueTag> {
        let tag = match name {
            "bool" => ValueTag::Bool,
            "int" => ValueTag::Int,
            "uint" => ValueTag::UInt,
            "double" => ValueTag::Double,
            "str" => ValueTag::Str,
            "coord" => ValueTag::Coord,
            "coordf" => ValueTag::CoordF,
            "dir" => ValueTag::Dir,
            "color" => ValueTag::Color,
            "any" => ValueTag::Any,
            "callback" => ValueTag::Callback,
            "type" => ValueTag::Type,
            _ => return None,
        };
        Some(tag)
    }
}

impl fmt::Display for ValueTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors raised by value access and the value text codec.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    #[error("datatype mismatch: expected {expected}, found {actual}")]
    DatatypeMismatch { expected: ValueTag, actual: ValueTag },
    #[error("malformed value text {text:?}: {reason}")]
    Malformed { text: String, reason: String },
    #[error("property {0} is not set")]
    Unset(u32),
}

// ---------------------------------------------------------------------------
// Shared payloads
// ---------------------------------------------------------------------------

/// An opaque payload. Compared by identity.
#[derive(Clone)]
pub struct AnyValue {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl AnyValue {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.inner).downcast::<T>().ok()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

/// A shared callable payload. Compared by identity.
#[derive(Clone)]
pub struct Callback(Arc<dyn Fn(&Value) -> Value + Send + Sync>);

impl Callback {
    pub fn new(f: impl Fn(&Value) -> Value + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self, arg: &Value) -> Value {
        (self.0)(arg)
    }

    pub fn same_as(&self, other: &Callback) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback(<fn>)")
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A property payload. Exactly one variant is active.
#[derive(Clone)]
pub enum Value {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Double(f64),
    Str(Arc<str>),
    Coord(Coord),
    CoordF(CoordF),
    Dir(Direction),
    Color(Color),
    Any(AnyValue),
    Callback(Callback),
    Type(PartId),
}

impl Value {
    pub fn tag(&self) -> ValueTag {
        match self {
            Value::Bool(_) => ValueTag::Bool,
            Value::Int(_) => ValueTag::Int,
            Value::UInt(_) => ValueTag::UInt,
            Value::Double(_) => ValueTag::Double,
            Value::Str(_) => ValueTag::Str,
            Value::Coord(_) => ValueTag::Coord,
            Value::CoordF(_) => ValueTag::CoordF,
            Value::Dir(_) => ValueTag::Dir,
            Value::Color(_) => ValueTag::Color,
            Value::Any(_) => ValueTag::Any,
            Value::Callback(_) => ValueTag::Callback,
            Value::Type(_) => ValueTag::Type,
        }
    }

    /// Wrap an opaque payload.
    pub fn any<T: Any + Send + Sync>(value: T) -> Self {
        Value::Any(AnyValue::new(value))
    }

    pub fn callback(f: impl Fn(&Value) -> Value + Send + Sync + 'static) -> Self {
        Value::Callback(Callback::new(f))
    }

    /// Read as a concrete type.
    ///
    /// # Examples
    ///
    /// ```
    /// use gridworks_core::value::{Value, ValueError, ValueTag};
    ///
    /// let v = Value::from(7i64);
    /// assert_eq!(v.get::<i64>(), Ok(7));
    /// assert_eq!(
    ///     v.get::<bool>(),
    ///     Err(ValueError::DatatypeMismatch { expected: ValueTag::Bool, actual: ValueTag::Int })
    /// );
    /// ```
    pub fn get<T: ValueType>(&self) -> Result<T, ValueError> {
        T::from_value(self).ok_or(ValueError::DatatypeMismatch {
            expected: T::TAG,
            actual: self.tag(),
        })
    }

    /// Read an opaque payload back as its dynamic type.
    pub fn get_any<T: Any + Send + Sync>(&self) -> Result<Arc<T>, ValueError> {
        match self {
            Value::Any(any) => any.downcast::<T>().ok_or(ValueError::DatatypeMismatch {
                expected: ValueTag::Any,
                actual: ValueTag::Any,
            }),
            other => Err(ValueError::DatatypeMismatch {
                expected: ValueTag::Any,
                actual: other.tag(),
            }),
        }
    }

    /// Whether this value can be written to a saved model.
    pub fn is_persistable(&self) -> bool {
        !matches!(self, Value::Any(_) | Value::Callback(_))
    }

    /// Render as `tag:payload`. `None` for opaque payloads, callbacks and
    /// part handles the name table does not know.
    pub fn to_text(&self, names: &dyn PartNames) -> Option<String> {
        let payload = match self {
            Value::Bool(v) => v.to_string(),
            Value::Int(v) => v.to_string(),
            Value::UInt(v) => v.to_string(),
            Value::Double(v) => v.to_string(),
            Value::Str(v) => quote(v),
            Value::Coord(v) => v.to_string(),
            Value::CoordF(v) => v.to_string(),
            Value::Dir(v) => v.to_string(),
            Value::Color(v) => v.to_string(),
            Value::Type(id) => names.part_name(*id)?.to_string(),
            Value::Any(_) | Value::Callback(_) => return None,
        };
        Some(format!("{}:{}", self.tag(), payload))
    }

    /// Parse the `tag:payload` form produced by [`Value::to_text`].
    pub fn parse(text: &str, names: &dyn PartNames) -> Result<Value, ValueError> {
        let malformed = |reason: &str| ValueError::Malformed {
            text: text.to_string(),
            reason: reason.to_string(),
        };
        let (tag, payload) = text.split_once(':').ok_or_else(|| malformed("missing tag"))?;
        let tag = ValueTag::from_name(tag).ok_or_else(|| malformed("unknown tag"))?;
        let value = match tag {
            ValueTag::Bool => Value::Bool(payload.parse().map_err(|_| malformed("bad bool"))?),
            ValueTag::Int => Value::Int(payload.parse().map_err(|_| malformed("bad int"))?),
            ValueTag::UInt => Value::UInt(payload.parse().map_err(|_| malformed("bad uint"))?),
            ValueTag::Double => {
                Value::Double(payload.parse().map_err(|_| malformed("bad double"))?)
            }
            ValueTag::Str => {
                Value::Str(unquote(payload).ok_or_else(|| malformed("bad string"))?.into())
            }
            ValueTag::Coord => {
                let (x, y) = split_pair(payload).ok_or_else(|| malformed("bad coord"))?;
                Value::Coord(Coord::new(x, y))
            }
            ValueTag::CoordF => {
                let (x, y) = split_pair(payload).ok_or_else(|| malformed("bad coordf"))?;
                Value::CoordF(CoordF::new(x, y))
            }
            ValueTag::Dir => {
                Value::Dir(Direction::from_name(payload).ok_or_else(|| malformed("bad dir"))?)
            }
            ValueTag::Color => {
                Value::Color(Color::from_hex(payload).ok_or_else(|| malformed("bad color"))?)
            }
            ValueTag::Type => {
                Value::Type(names.part_id(payload).ok_or_else(|| malformed("unknown part"))?)
            }
            ValueTag::Any | ValueTag::Callback => return Err(malformed("not persistable")),
        };
        Ok(value)
    }
}

/// Name lookups the text codec needs for part handles.
pub trait PartNames {
    fn part_name(&self, id: PartId) -> Option<&str>;
    fn part_id(&self, name: &str) -> Option<PartId>;
}

/// A name table that knows no parts.
impl PartNames for () {
    fn part_name(&self, _id: PartId) -> Option<&str> {
        None
    }

    fn part_id(&self, _name: &str) -> Option<PartId> {
        None
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::UInt(a), Value::UInt(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Coord(a), Value::Coord(b)) => a == b,
            (Value::CoordF(a), Value::CoordF(b)) => a == b,
            (Value::Dir(a), Value::Dir(b)) => a == b,
            (Value::Color(a), Value::Color(b)) => a == b,
            (Value::Any(a), Value::Any(b)) => Arc::ptr_eq(&a.inner, &b.inner),
            (Value::Callback(a), Value::Callback(b)) => a.same_as(b),
            (Value::Type(a), Value::Type(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Value {
    /// Ordering is only defined between values of the same tag.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
            (Value::UInt(a), Value::UInt(b)) => a.partial_cmp(b),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
            (Value::Coord(a), Value::Coord(b)) => a.partial_cmp(b),
            (Value::CoordF(a), Value::CoordF(b)) => a.partial_cmp(b),
            (Value::Dir(a), Value::Dir(b)) => a.partial_cmp(b),
            (Value::Color(a), Value::Color(b)) => a.partial_cmp(b),
            (Value::Type(a), Value::Type(b)) => a.partial_cmp(b),
            _ if self == other => Some(Ordering::Equal),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "Bool({v})"),
            Value::Int(v) => write!(f, "Int({v})"),
            Value::UInt(v) => write!(f, "UInt({v})"),
            Value::Double(v) => write!(f, "Double({v})"),
            Value::Str(v) => write!(f, "Str({v:?})"),
            Value::Coord(v) => write!(f, "Coord({v})"),
            Value::CoordF(v) => write!(f, "CoordF({v})"),
            Value::Dir(v) => write!(f, "Dir({v})"),
            Value::Color(v) => write!(f, "Color({v})"),
            Value::Any(v) => write!(f, "Any(<{}>)", v.type_name()),
            Value::Callback(_) => write!(f, "Callback(<fn>)"),
            Value::Type(v) => write!(f, "Type({})", v.0),
        }
    }
}

// ---------------------------------------------------------------------------
// Typed access
// ---------------------------------------------------------------------------

/// A Rust type that maps onto exactly one [`ValueTag`].
pub trait ValueType: Sized {
    const TAG: ValueTag;

    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! value_type {
    ($ty:ty, $variant:ident) => {
        impl ValueType for $ty {
            const TAG: ValueTag = ValueTag::$variant;

            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }
        }

        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v)
            }
        }
    };
}

value_type!(bool, Bool);
value_type!(i64, Int);
value_type!(u64, UInt);
value_type!(f64, Double);
value_type!(Arc<str>, Str);
value_type!(Coord, Coord);
value_type!(CoordF, CoordF);
value_type!(Direction, Dir);
value_type!(Color, Color);
value_type!(Callback, Callback);
value_type!(PartId, Type);

impl ValueType for String {
    const TAG: ValueTag = ValueTag::Str;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Str(v) => Some(v.to_string()),
            _ => None,
        }
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v.into())
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.into())
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::UInt(v.into())
    }
}

// ---------------------------------------------------------------------------
// Text helpers
// ---------------------------------------------------------------------------

/// Quote a string with `\\`, `\"`, `\n` and `\t` escapes.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Inverse of [`quote`]. The whole input must be one quoted string.
pub fn unquote(s: &str) -> Option<String> {
    let inner = s.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next()? {
                '\\' => out.push('\\'),
                '"' => out.push('"'),
                'n' => out.push('\n'),
                't' => out.push('\t'),
                _ => return None,
            },
            '"' => return None,
            c => out.push(c),
        }
    }
    Some(out)
}

fn split_pair<T: std::str::FromStr>(s: &str) -> Option<(T, T)> {
    let (a, b) = s.split_once(',')?;
    Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
}
