//! Per-segment pruning statistics
//!
//! Every finalized segment carries a small filter structure answering one
//! conservative question: "can a scan with this predicate possibly match
//! anything in the segment?". Arithmetic columns get a range filter (a set of
//! disjoint value ranges derived from the gaps in the value universe);
//! string columns get a plain min/max filter.

use strata_types::{AllTypeVariant, PredicateCondition};

use crate::segment::Segment;
use crate::typed_values::TypedValues;

/// Maximum number of disjoint ranges kept by a range filter.
const MAX_RANGES: usize = 10;

/// Min/max filter over a segment's non-NULL values.
#[derive(Debug, Clone, PartialEq)]
pub struct MinMaxFilter {
    pub min: AllTypeVariant,
    pub max: AllTypeVariant,
}

impl MinMaxFilter {
    pub fn can_prune(
        &self,
        condition: PredicateCondition,
        value: &AllTypeVariant,
        value2: Option<&AllTypeVariant>,
    ) -> bool {
        if value.is_null() {
            return false;
        }
        match condition {
            PredicateCondition::Equals => *value < self.min || *value > self.max,
            PredicateCondition::LessThan => *value <= self.min,
            PredicateCondition::LessThanEquals => *value < self.min,
            PredicateCondition::GreaterThan => *value >= self.max,
            PredicateCondition::GreaterThanEquals => *value > self.max,
            PredicateCondition::BetweenInclusive => match value2 {
                Some(upper) => *upper < self.min || *value > self.max,
                None => false,
            },
            // NotEquals can only be pruned knowing the full value universe;
            // the range filter handles that case.
            _ => false,
        }
    }
}

/// Range filter over an arithmetic segment: disjoint `[low, high]` ranges
/// covering the value universe, split at the largest gaps.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeFilter {
    pub ranges: Vec<(AllTypeVariant, AllTypeVariant)>,
}

impl RangeFilter {
    /// Build from a sorted, deduplicated value universe. Returns `None` for
    /// an empty universe or a non-arithmetic type.
    pub fn build(dictionary: &TypedValues) -> Option<RangeFilter> {
        if dictionary.is_empty() || !dictionary.data_type().is_arithmetic() {
            return None;
        }

        let count = dictionary.len();
        if count <= MAX_RANGES {
            let ranges =
                (0..count).map(|i| (dictionary.get(i), dictionary.get(i))).collect();
            return Some(RangeFilter { ranges });
        }

        // Rank the gaps between neighbors; the largest MAX_RANGES - 1 gaps
        // become the split points.
        let mut gaps: Vec<(f64, usize)> = (0..count - 1)
            .map(|i| {
                let low = dictionary.get(i).to_f64().expect("arithmetic type");
                let high = dictionary.get(i + 1).to_f64().expect("arithmetic type");
                (high - low, i)
            })
            .collect();
        gaps.sort_by(|a, b| b.0.total_cmp(&a.0));
        let mut split_after: Vec<usize> =
            gaps.iter().take(MAX_RANGES - 1).map(|&(_, i)| i).collect();
        split_after.sort_unstable();

        let mut ranges = Vec::with_capacity(MAX_RANGES);
        let mut start = 0;
        for split in split_after {
            ranges.push((dictionary.get(start), dictionary.get(split)));
            start = split + 1;
        }
        ranges.push((dictionary.get(start), dictionary.get(count - 1)));
        Some(RangeFilter { ranges })
    }

    fn covers(&self, value: &AllTypeVariant) -> bool {
        self.ranges.iter().any(|(low, high)| value >= low && value <= high)
    }

    pub fn can_prune(
        &self,
        condition: PredicateCondition,
        value: &AllTypeVariant,
        value2: Option<&AllTypeVariant>,
    ) -> bool {
        if value.is_null() || self.ranges.is_empty() {
            return false;
        }
        let min = &self.ranges.first().expect("non-empty").0;
        let max = &self.ranges.last().expect("non-empty").1;
        match condition {
            PredicateCondition::Equals => !self.covers(value),
            PredicateCondition::NotEquals => {
                // Prunable only when the universe is exactly {value}.
                self.ranges.len() == 1 && min == value && max == value
            }
            PredicateCondition::LessThan => value <= min,
            PredicateCondition::LessThanEquals => value < min,
            PredicateCondition::GreaterThan => value >= max,
            PredicateCondition::GreaterThanEquals => value > max,
            PredicateCondition::BetweenInclusive => match value2 {
                Some(upper) => {
                    if upper < value {
                        return true;
                    }
                    // Prunable when [value, upper] falls entirely into a gap.
                    !self.ranges.iter().any(|(low, high)| value <= high && upper >= low)
                }
                None => false,
            },
            _ => false,
        }
    }
}

/// The filters attached to one segment at chunk finalization.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentStatistics {
    min_max: Option<MinMaxFilter>,
    range: Option<RangeFilter>,
}

impl SegmentStatistics {
    /// Derive statistics from a segment's value universe. Dictionary-encoded
    /// segments donate their (already sorted) dictionary; other encodings are
    /// scanned. Returns `None` for reference segments and all-NULL segments.
    pub fn build(segment: &Segment) -> Option<SegmentStatistics> {
        if segment.is_reference() {
            return None;
        }

        let dictionary = match segment {
            Segment::Dictionary(s) => s.dictionary().clone(),
            _ => {
                let mut values = TypedValues::new(segment.data_type());
                segment.for_each(None, |_, value| {
                    if !value.is_null() {
                        values.push(value).expect("segment values match segment type");
                    }
                });
                values.sorted_dedup()
            }
        };
        if dictionary.is_empty() {
            return None;
        }

        if dictionary.data_type().is_arithmetic() {
            Some(SegmentStatistics { min_max: None, range: RangeFilter::build(&dictionary) })
        } else {
            Some(SegmentStatistics {
                min_max: Some(MinMaxFilter {
                    min: dictionary.get(0),
                    max: dictionary.get(dictionary.len() - 1),
                }),
                range: None,
            })
        }
    }

    /// Whether a scan with the given predicate cannot match anything in the
    /// segment. Conservative: `false` means "must scan".
    pub fn can_prune(
        &self,
        condition: PredicateCondition,
        value: &AllTypeVariant,
        value2: Option<&AllTypeVariant>,
    ) -> bool {
        if let Some(filter) = &self.range {
            if filter.can_prune(condition, value, value2) {
                return true;
            }
        }
        if let Some(filter) = &self.min_max {
            if filter.can_prune(condition, value, value2) {
                return true;
            }
        }
        false
    }
}
