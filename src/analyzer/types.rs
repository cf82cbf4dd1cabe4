// src/analyzer/types.rs

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// The closed set of Pascal-level types.
///
/// Descriptors are immutable once built and cheap to clone: composite
/// payloads sit behind `Arc`. Equality is structural, with two deliberate
/// quirks: every `String` equals every other `String`, and records compare by
/// their field lists only (the declared name is for display).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Integer { width: u32 },
    Boolean,
    Float { width: u32 },
    String,
    Array(Arc<ArrayType>),
    Record(Arc<RecordType>),
    /// `None` is the untyped `pointer` (and the type of `nil`).
    Pointer(Option<Arc<Type>>),
    /// `None` is an untyped `file`/`text` handle.
    File(Option<Arc<Type>>),
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArrayType {
    pub element: Type,
    /// Inclusive `(low, high)`; `None` for dynamic arrays, whose size only
    /// exists at run time.
    pub bounds: Option<(i64, i64)>,
}

#[derive(Debug, Clone)]
pub struct RecordType {
    pub name: String,
    pub fields: Vec<(String, Type)>,
}

impl PartialEq for RecordType {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}
impl Eq for RecordType {}

impl Hash for RecordType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fields.hash(state);
    }
}

impl RecordType {
    /// Positional index of `field`, the value used for struct GEPs.
    pub fn field_index(&self, field: &str) -> Option<usize> {
        self.fields.iter().position(|(name, _)| name == field)
    }

    pub fn field_type(&self, field: &str) -> Option<&Type> {
        self.fields.iter().find(|(name, _)| name == field).map(|(_, ty)| ty)
    }
}

impl Type {
    pub fn integer(width: u32) -> Self {
        Type::Integer { width }
    }

    /// The default `integer` type.
    pub fn int32() -> Self {
        Type::Integer { width: 32 }
    }

    pub fn float64() -> Self {
        Type::Float { width: 64 }
    }

    pub fn pointer_to(ty: Type) -> Self {
        Type::Pointer(Some(Arc::new(ty)))
    }

    /// `pchar`: a pointer to 8-bit characters.
    pub fn pchar() -> Self {
        Type::pointer_to(Type::integer(8))
    }

    pub fn fixed_array(element: Type, low: i64, high: i64) -> Self {
        Type::Array(Arc::new(ArrayType { element, bounds: Some((low, high)) }))
    }

    pub fn dynamic_array(element: Type) -> Self {
        Type::Array(Arc::new(ArrayType { element, bounds: None }))
    }

    pub fn record(name: impl Into<String>, fields: Vec<(String, Type)>) -> Self {
        Type::Record(Arc::new(RecordType { name: name.into(), fields }))
    }

    /// Simple values live in registers; arrays, records and strings are
    /// aggregates and are always handled through their address.
    pub fn is_simple(&self) -> bool {
        !matches!(self, Type::Array(_) | Type::Record(_) | Type::String)
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::Integer { .. })
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Integer { .. } | Type::Float { .. })
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Type::Unknown)
    }

    pub fn integer_width(&self) -> Option<u32> {
        match self {
            Type::Integer { width } => Some(*width),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayType> {
        match self {
            Type::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&RecordType> {
        match self {
            Type::Record(record) => Some(record),
            _ => None,
        }
    }

    /// The pointee of a typed pointer.
    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Pointer(Some(inner)) => Some(inner),
            _ => None,
        }
    }

    /// Whether a value of type `source` may be stored into a slot of this type.
    ///
    /// Integers of any width are compatible with each other (the lowering
    /// engine extends or truncates), integers widen into floats, and the
    /// untyped pointer converts to and from every pointer.
    pub fn accepts(&self, source: &Type) -> bool {
        match (self, source) {
            (Type::Integer { .. }, Type::Integer { .. }) => true,
            (Type::Float { .. }, Type::Integer { .. } | Type::Float { .. }) => true,
            (Type::Pointer(None), Type::Pointer(_)) | (Type::Pointer(_), Type::Pointer(None)) => true,
            _ => self == source,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Integer { width } => write!(f, "Integer{}", width),
            Type::Boolean => write!(f, "Boolean"),
            Type::Float { width } => write!(f, "Float{}", width),
            Type::String => write!(f, "String"),
            Type::Array(array) => match array.bounds {
                Some((low, high)) => write!(f, "array[{}..{}] of {}", low, high, array.element),
                None => write!(f, "array of {}", array.element),
            },
            Type::Record(record) => write!(f, "record {}", record.name),
            Type::Pointer(Some(inner)) => write!(f, "^{}", inner),
            Type::Pointer(None) => write!(f, "Pointer"),
            Type::File(Some(inner)) => write!(f, "file of {}", inner),
            Type::File(None) => write!(f, "File"),
            Type::Unknown => write!(f, "Unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_always_compare_equal() {
        assert_eq!(Type::String, Type::String);
        assert!(!Type::String.is_simple());
    }

    #[test]
    fn records_compare_structurally() {
        let a = Type::record("a", vec![("x".into(), Type::int32())]);
        let b = Type::record("b", vec![("x".into(), Type::int32())]);
        let c = Type::record("a", vec![("x".into(), Type::integer(64))]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn integer_widths_are_distinct_but_compatible() {
        assert_ne!(Type::integer(8), Type::integer(64));
        assert!(Type::integer(8).accepts(&Type::integer(64)));
        assert!(!Type::int32().accepts(&Type::Boolean));
    }

    #[test]
    fn array_display_includes_bounds() {
        let fixed = Type::fixed_array(Type::int32(), 1, 3);
        assert_eq!(fixed.to_string(), "array[1..3] of Integer32");
        assert_eq!(Type::dynamic_array(Type::String).to_string(), "array of String");
    }
}
