use crate::host::{HostValue, TypeHandle};
use crate::types::ValueType;

/// Index of an instance in the interpreter's heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(pub usize);

/// A runtime value. Instances are referenced by id, never owned.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Void,
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(String),
    Object(InstanceId),
    Host(HostValue),
    HostType(TypeHandle),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Void => ValueType::Void,
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Double(_) => ValueType::Double,
            Value::Str(_) => ValueType::Str,
            Value::Object(_) => ValueType::Object,
            Value::Host(_) => ValueType::Host,
            Value::HostType(_) => ValueType::HostType,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.value_type().name()
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(value) => Some(*value as f64),
            Value::Double(value) => Some(*value),
            _ => None,
        }
    }
}

/// A named, possibly constant slot.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableMember {
    pub name: String,
    pub constant: bool,
    pub value: Value,
}

impl VariableMember {
    pub fn new(name: impl Into<String>, constant: bool, value: Value) -> Self {
        VariableMember {
            name: name.into(),
            constant,
            value,
        }
    }
}
