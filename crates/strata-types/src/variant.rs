//! The tagged variant value carried between segments, expressions and
//! operators

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::DataType;

/// A single value of any column data type, or NULL.
///
/// Comparison and hashing are total so the variant can serve as a sort key,
/// a group-by key and a join key:
/// - NULL orders before every non-NULL value and is equal to itself
///   (three-valued comparison semantics live in the expression evaluator,
///   not here),
/// - floats use their IEEE total order, so NaN is ordered after all numbers
///   and hashes consistently with equality,
/// - values of different data types order by type tag; operators that need
///   cross-width numeric comparison promote explicitly first.
#[derive(Debug, Clone)]
pub enum AllTypeVariant {
    Int32(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    String(String),
    Null,
}

impl AllTypeVariant {
    pub fn data_type(&self) -> DataType {
        match self {
            AllTypeVariant::Int32(_) => DataType::Int32,
            AllTypeVariant::Int64(_) => DataType::Int64,
            AllTypeVariant::Float(_) => DataType::Float,
            AllTypeVariant::Double(_) => DataType::Double,
            AllTypeVariant::String(_) => DataType::String,
            AllTypeVariant::Null => DataType::Null,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AllTypeVariant::Null)
    }

    /// Convert the value into `target` if the conversion is lossless enough
    /// for predicate evaluation (integer widening, int-to-float, float
    /// widening). NULL converts to NULL. Returns `None` for conversions that
    /// do not make sense (String to Int32 and the like) or would silently
    /// truncate (Int64 to Int32 out of range).
    pub fn coerce_to(&self, target: DataType) -> Option<AllTypeVariant> {
        if self.is_null() {
            return Some(AllTypeVariant::Null);
        }
        if self.data_type() == target {
            return Some(self.clone());
        }
        match (self, target) {
            (AllTypeVariant::Int32(v), DataType::Int64) => Some(AllTypeVariant::Int64(*v as i64)),
            (AllTypeVariant::Int32(v), DataType::Float) => Some(AllTypeVariant::Float(*v as f32)),
            (AllTypeVariant::Int32(v), DataType::Double) => Some(AllTypeVariant::Double(*v as f64)),
            (AllTypeVariant::Int64(v), DataType::Int32) => {
                i32::try_from(*v).ok().map(AllTypeVariant::Int32)
            }
            (AllTypeVariant::Int64(v), DataType::Float) => Some(AllTypeVariant::Float(*v as f32)),
            (AllTypeVariant::Int64(v), DataType::Double) => Some(AllTypeVariant::Double(*v as f64)),
            (AllTypeVariant::Float(v), DataType::Double) => Some(AllTypeVariant::Double(*v as f64)),
            _ => None,
        }
    }

    /// The value as f64, if it is numeric. Used by AVG/STDDEV accumulators.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            AllTypeVariant::Int32(v) => Some(*v as f64),
            AllTypeVariant::Int64(v) => Some(*v as f64),
            AllTypeVariant::Float(v) => Some(*v as f64),
            AllTypeVariant::Double(v) => Some(*v),
            _ => None,
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            AllTypeVariant::Null => 0,
            AllTypeVariant::Int32(_) => 1,
            AllTypeVariant::Int64(_) => 2,
            AllTypeVariant::Float(_) => 3,
            AllTypeVariant::Double(_) => 4,
            AllTypeVariant::String(_) => 5,
        }
    }
}

impl PartialEq for AllTypeVariant {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for AllTypeVariant {}

impl PartialOrd for AllTypeVariant {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AllTypeVariant {
    fn cmp(&self, other: &Self) -> Ordering {
        use AllTypeVariant::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Int32(a), Int32(b)) => a.cmp(b),
            (Int64(a), Int64(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Double(a), Double(b)) => a.total_cmp(b),
            (String(a), String(b)) => a.cmp(b),
            (a, b) => a.type_rank().cmp(&b.type_rank()),
        }
    }
}

impl Hash for AllTypeVariant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_rank().hash(state);
        match self {
            AllTypeVariant::Int32(v) => v.hash(state),
            AllTypeVariant::Int64(v) => v.hash(state),
            AllTypeVariant::Float(v) => v.to_bits().hash(state),
            AllTypeVariant::Double(v) => v.to_bits().hash(state),
            AllTypeVariant::String(v) => v.hash(state),
            AllTypeVariant::Null => {}
        }
    }
}

impl fmt::Display for AllTypeVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllTypeVariant::Int32(v) => write!(f, "{}", v),
            AllTypeVariant::Int64(v) => write!(f, "{}", v),
            AllTypeVariant::Float(v) => write!(f, "{}", v),
            AllTypeVariant::Double(v) => write!(f, "{}", v),
            AllTypeVariant::String(v) => write!(f, "{}", v),
            AllTypeVariant::Null => write!(f, "NULL"),
        }
    }
}

impl From<i32> for AllTypeVariant {
    fn from(v: i32) -> Self {
        AllTypeVariant::Int32(v)
    }
}

impl From<i64> for AllTypeVariant {
    fn from(v: i64) -> Self {
        AllTypeVariant::Int64(v)
    }
}

impl From<f32> for AllTypeVariant {
    fn from(v: f32) -> Self {
        AllTypeVariant::Float(v)
    }
}

impl From<f64> for AllTypeVariant {
    fn from(v: f64) -> Self {
        AllTypeVariant::Double(v)
    }
}

impl From<&str> for AllTypeVariant {
    fn from(v: &str) -> Self {
        AllTypeVariant::String(v.to_string())
    }
}

impl From<String> for AllTypeVariant {
    fn from(v: String) -> Self {
        AllTypeVariant::String(v)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::hash_map::DefaultHasher;

    use super::*;

    fn hash_of(value: &AllTypeVariant) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_null_orders_first() {
        assert!(AllTypeVariant::Null < AllTypeVariant::Int32(i32::MIN));
        assert!(AllTypeVariant::Null < AllTypeVariant::String(String::new()));
        assert_eq!(AllTypeVariant::Null, AllTypeVariant::Null);
    }

    #[test]
    fn test_float_total_order() {
        let nan = AllTypeVariant::Double(f64::NAN);
        let inf = AllTypeVariant::Double(f64::INFINITY);
        assert!(inf < nan);
        assert_eq!(nan, AllTypeVariant::Double(f64::NAN));
        assert_eq!(hash_of(&nan), hash_of(&AllTypeVariant::Double(f64::NAN)));
    }

    #[test]
    fn test_hash_consistent_with_eq() {
        let a = AllTypeVariant::Int64(42);
        let b = AllTypeVariant::Int64(42);
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn test_coercion() {
        assert_eq!(
            AllTypeVariant::Int32(7).coerce_to(DataType::Int64),
            Some(AllTypeVariant::Int64(7))
        );
        assert_eq!(
            AllTypeVariant::Int64(7).coerce_to(DataType::Int32),
            Some(AllTypeVariant::Int32(7))
        );
        assert_eq!(AllTypeVariant::Int64(i64::MAX).coerce_to(DataType::Int32), None);
        assert_eq!(AllTypeVariant::String("x".into()).coerce_to(DataType::Int32), None);
        assert_eq!(AllTypeVariant::Null.coerce_to(DataType::Int32), Some(AllTypeVariant::Null));
    }

    #[test]
    fn test_display() {
        assert_eq!(AllTypeVariant::Int32(5).to_string(), "5");
        assert_eq!(AllTypeVariant::Null.to_string(), "NULL");
    }
}
