//! Runtime value types and numeric promotion.
//!
//! W is dynamically typed: every value carries one of these types and
//! operators decide what to do from the pair of operand types.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// `null` and uninitialized slots.
    Void,
    Bool,
    Int,
    Double,
    Str,
    /// Instance of a script class.
    Object,
    /// Opaque value owned by the host bridge.
    Host,
    /// Host type used as a static receiver, e.g. `Math.max(..)`.
    HostType,
}

impl ValueType {
    /// Name used in fault messages and for matching primitive throws.
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Void => "void",
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Double => "double",
            ValueType::Str => "string",
            ValueType::Object => "object",
            ValueType::Host => "host value",
            ValueType::HostType => "host type",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, ValueType::Int | ValueType::Double)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Common numeric type of two operands, if both are numeric.
///
/// * promote(Int, Int)       = Int
/// * promote(Int, Double)    = Double
/// * promote(Double, _)      = Double
///
/// Returns None when either side is not a number.
pub fn numeric_supertype(a: ValueType, b: ValueType) -> Option<ValueType> {
    use ValueType::*;

    match (a, b) {
        (Int, Int) => Some(Int),
        (Int, Double) | (Double, Int) | (Double, Double) => Some(Double),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotes_mixed_numbers_to_double() {
        assert_eq!(
            numeric_supertype(ValueType::Int, ValueType::Double),
            Some(ValueType::Double)
        );
        assert_eq!(
            numeric_supertype(ValueType::Double, ValueType::Int),
            Some(ValueType::Double)
        );
        assert_eq!(
            numeric_supertype(ValueType::Int, ValueType::Int),
            Some(ValueType::Int)
        );
    }

    #[test]
    fn non_numbers_have_no_supertype() {
        assert_eq!(numeric_supertype(ValueType::Str, ValueType::Int), None);
        assert_eq!(numeric_supertype(ValueType::Bool, ValueType::Bool), None);
        assert_eq!(numeric_supertype(ValueType::Void, ValueType::Double), None);
    }

    #[test]
    fn names_primitive_types() {
        assert_eq!(ValueType::Str.to_string(), "string");
        assert!(ValueType::Double.is_numeric());
        assert!(!ValueType::Object.is_numeric());
    }
}
