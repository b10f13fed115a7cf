//! Column data type definitions

use std::fmt;

/// The closed set of data types a column (or an expression result) can have.
///
/// `Null` is the type of an untyped NULL literal; columns themselves are never
/// of type `Null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataType {
    Int32,
    Int64,
    Float,
    Double,
    String,
    Null,
}

impl DataType {
    /// Whether values of this type support arithmetic (and range filters).
    pub fn is_arithmetic(&self) -> bool {
        matches!(self, DataType::Int32 | DataType::Int64 | DataType::Float | DataType::Double)
    }

    /// Whether this is a floating point type.
    pub fn is_floating_point(&self) -> bool {
        matches!(self, DataType::Float | DataType::Double)
    }

    /// The common type two arithmetic operands promote to.
    ///
    /// Promotion follows the usual SQL widening order
    /// Int32 < Int64 < Float < Double. `Null` promotes to the other operand's
    /// type. Returns `None` for combinations without a numeric common type
    /// (e.g. String + Int32).
    pub fn common_arithmetic_type(self, other: DataType) -> Option<DataType> {
        match (self, other) {
            (DataType::Null, other) => Some(other),
            (this, DataType::Null) => Some(this),
            (DataType::String, _) | (_, DataType::String) => None,
            (a, b) => {
                debug_assert!(a.is_arithmetic() && b.is_arithmetic());
                Some(a.max(b))
            }
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Int32 => "int",
            DataType::Int64 => "long",
            DataType::Float => "float",
            DataType::Double => "double",
            DataType::String => "string",
            DataType::Null => "null",
        };
        write!(f, "{}", name)
    }
}

/// Expand `$body` once with `$ty` bound to the Rust type for `$data_type`.
///
/// This is the match-over-the-type-tag helper used wherever an algorithm is
/// specialized per column type (segment construction, statistics, scans).
/// `DataType::Null` deliberately has no arm; dispatching on it is a
/// programmer error.
#[macro_export]
macro_rules! dispatch_on_data_type {
    ($data_type:expr, |$ty:ident| $body:expr) => {
        match $data_type {
            $crate::DataType::Int32 => {
                #[allow(dead_code)]
                type $ty = i32;
                $body
            }
            $crate::DataType::Int64 => {
                #[allow(dead_code)]
                type $ty = i64;
                $body
            }
            $crate::DataType::Float => {
                #[allow(dead_code)]
                type $ty = f32;
                $body
            }
            $crate::DataType::Double => {
                #[allow(dead_code)]
                type $ty = f64;
                $body
            }
            $crate::DataType::String => {
                #[allow(dead_code)]
                type $ty = String;
                $body
            }
            $crate::DataType::Null => {
                panic!("cannot dispatch on DataType::Null")
            }
        }
    };
}
