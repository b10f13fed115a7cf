//! Shared enums for predicate conditions, join modes and orderings

use std::fmt;

/// Condition of a scan or join predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredicateCondition {
    Equals,
    NotEquals,
    LessThan,
    LessThanEquals,
    GreaterThan,
    GreaterThanEquals,
    BetweenInclusive,
    IsNull,
    IsNotNull,
}

impl PredicateCondition {
    /// Number of value arguments the condition takes besides the column.
    pub fn value_count(&self) -> usize {
        match self {
            PredicateCondition::IsNull | PredicateCondition::IsNotNull => 0,
            PredicateCondition::BetweenInclusive => 2,
            _ => 1,
        }
    }

    /// The condition with operand sides swapped (`a < b` becomes `b > a`).
    pub fn flipped(&self) -> PredicateCondition {
        match self {
            PredicateCondition::LessThan => PredicateCondition::GreaterThan,
            PredicateCondition::LessThanEquals => PredicateCondition::GreaterThanEquals,
            PredicateCondition::GreaterThan => PredicateCondition::LessThan,
            PredicateCondition::GreaterThanEquals => PredicateCondition::LessThanEquals,
            other => *other,
        }
    }
}

impl fmt::Display for PredicateCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            PredicateCondition::Equals => "=",
            PredicateCondition::NotEquals => "!=",
            PredicateCondition::LessThan => "<",
            PredicateCondition::LessThanEquals => "<=",
            PredicateCondition::GreaterThan => ">",
            PredicateCondition::GreaterThanEquals => ">=",
            PredicateCondition::BetweenInclusive => "BETWEEN",
            PredicateCondition::IsNull => "IS NULL",
            PredicateCondition::IsNotNull => "IS NOT NULL",
        };
        write!(f, "{}", symbol)
    }
}

/// Join mode of a join node or operator.
///
/// Semi and the two Anti modes emit only left columns. The Anti modes differ
/// in how a NULL join key on the left side is treated: `AntiNullAsTrue`
/// rejects such rows from the anti result, `AntiNullAsFalse` keeps them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinMode {
    Inner,
    Left,
    Right,
    FullOuter,
    Cross,
    Semi,
    AntiNullAsTrue,
    AntiNullAsFalse,
}

impl JoinMode {
    /// Whether only the left input's columns appear in the output.
    pub fn is_semi_or_anti(&self) -> bool {
        matches!(self, JoinMode::Semi | JoinMode::AntiNullAsTrue | JoinMode::AntiNullAsFalse)
    }
}

impl fmt::Display for JoinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Sort mode of one sort definition (and of a chunk's `ordered_by` entry).
///
/// `Ascending` and `Descending` place NULLs first; the `*NullsLast` variants
/// place them last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortMode {
    Ascending,
    Descending,
    AscendingNullsLast,
    DescendingNullsLast,
}

impl SortMode {
    pub fn is_ascending(&self) -> bool {
        matches!(self, SortMode::Ascending | SortMode::AscendingNullsLast)
    }

    pub fn nulls_first(&self) -> bool {
        matches!(self, SortMode::Ascending | SortMode::Descending)
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Mode of a set-operation (union) node or operator.
///
/// `Positions` unions the row positions of two reference tables over the same
/// originals; `All` concatenates the inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetOperationMode {
    Positions,
    All,
}

impl fmt::Display for SetOperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flipped_condition() {
        assert_eq!(PredicateCondition::LessThan.flipped(), PredicateCondition::GreaterThan);
        assert_eq!(
            PredicateCondition::GreaterThanEquals.flipped(),
            PredicateCondition::LessThanEquals
        );
        assert_eq!(PredicateCondition::Equals.flipped(), PredicateCondition::Equals);
    }

    #[test]
    fn test_sort_mode_null_placement() {
        assert!(SortMode::Ascending.nulls_first());
        assert!(SortMode::Descending.nulls_first());
        assert!(!SortMode::AscendingNullsLast.nulls_first());
        assert!(!SortMode::DescendingNullsLast.nulls_first());
    }

    #[test]
    fn test_value_count() {
        assert_eq!(PredicateCondition::Equals.value_count(), 1);
        assert_eq!(PredicateCondition::BetweenInclusive.value_count(), 2);
        assert_eq!(PredicateCondition::IsNull.value_count(), 0);
    }
}
