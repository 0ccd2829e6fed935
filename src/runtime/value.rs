use crate::language::{symbols::DeclId, types::CollectionKind};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

pub type ListRef = Rc<RefCell<ListValue>>;
pub type ObjectRef = Rc<RefCell<ObjectValue>>;

/// Runtime value. Primitives copy; lists and objects are shared handles.
#[derive(Clone, Debug)]
pub enum Value {
    Void,
    Bool(bool),
    Char(char),
    Int(i64),
    Real(f64),
    Str(String),
    Enum(EnumValue),
    List(ListRef),
    Object(ObjectRef),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnumValue {
    pub enum_name: String,
    pub ordinal: usize,
    pub label: String,
}

/// Arrays and lists share one representation; multi-dimensional
/// collections nest one list per dimension.
#[derive(Clone, Debug)]
pub struct ListValue {
    pub kind: CollectionKind,
    pub items: Vec<Value>,
}

#[derive(Clone, Debug)]
pub struct ObjectValue {
    pub class: DeclId,
    pub class_name: String,
    pub fields: BTreeMap<DeclId, Value>,
}

impl Value {
    pub fn list(kind: CollectionKind, items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(ListValue { kind, items })))
    }

    pub fn object(class: DeclId, class_name: impl Into<String>) -> ObjectRef {
        Rc::new(RefCell::new(ObjectValue {
            class,
            class_name: class_name.into(),
            fields: BTreeMap::new(),
        }))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Void => "void",
            Value::Bool(_) => "Bool",
            Value::Char(_) => "Char",
            Value::Int(_) => "Int",
            Value::Real(_) => "Real",
            Value::Str(_) => "String",
            Value::Enum(_) => "enum",
            Value::List(_) => "collection",
            Value::Object(_) => "object",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Values compare by content; lists and objects by identity.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Void, Value::Void) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Real(a), Value::Real(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Enum(a), Value::Enum(b)) => a.enum_name == b.enum_name && a.ordinal == b.ordinal,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Char(a), Value::Char(b)) => Some(a.cmp(b)),
            (Value::Real(a), Value::Real(b)) => a.partial_cmp(b),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Enum(a), Value::Enum(b)) => Some(a.ordinal.cmp(&b.ordinal)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => write!(f, "void"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Char(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Real(v) if v.is_finite() && v.fract() == 0.0 => write!(f, "{v:.1}"),
            Value::Real(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{v}"),
            Value::Enum(value) => write!(f, "{}", value.label),
            Value::List(list) => {
                write!(f, "[")?;
                for (idx, value) in list.borrow().items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, "]")
            }
            Value::Object(object) => write!(f, "{}", object.borrow().class_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn displays_lists_and_reals() {
        let list = Value::list(
            CollectionKind::List,
            vec![Value::Int(3), Value::Int(4)],
        );
        assert_eq!(list.to_string(), "[3, 4]");
        assert_eq!(Value::Real(2.0).to_string(), "2.0");
        assert_eq!(Value::Real(2.5).to_string(), "2.5");
    }

    #[test]
    fn lists_compare_by_identity() {
        let a = Value::list(CollectionKind::List, vec![Value::Int(1)]);
        let b = Value::list(CollectionKind::List, vec![Value::Int(1)]);
        assert!(a.same(&a.clone()));
        assert!(!a.same(&b));
        assert!(Value::Str("x".into()).same(&Value::Str("x".into())));
    }
}
