//! Column statistics
//!
//! The `{colNames, colStats: [{min, max, nullCount}]}` shape shared by key
//! stats, value stats and manifest-list partition stats. The engine only
//! computes and ships these; predicate evaluation belongs to the caller.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::datum::Datum;

/// Min/max/null count of one column
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ColumnStats {
    #[serde(default)]
    pub min: Option<Datum>,
    #[serde(default)]
    pub max: Option<Datum>,
    #[serde(rename = "nullCount")]
    pub null_count: u64,
}

/// Stats for a list of columns
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SimpleStats {
    #[serde(rename = "colNames")]
    pub col_names: Vec<String>,
    #[serde(rename = "colStats")]
    pub col_stats: Vec<ColumnStats>,
}

impl SimpleStats {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Stats of the named column, if collected
    pub fn column(&self, name: &str) -> Option<&ColumnStats> {
        self.col_names
            .iter()
            .position(|n| n == name)
            .and_then(|i| self.col_stats.get(i))
    }

    /// Widen these stats to also cover `other` (same column list expected)
    pub fn merge(&mut self, other: &SimpleStats) {
        if self.col_names.is_empty() && self.col_stats.is_empty() {
            *self = other.clone();
            return;
        }
        for (mine, theirs) in self.col_stats.iter_mut().zip(other.col_stats.iter()) {
            mine.null_count += theirs.null_count;
            mine.min = pick(mine.min.take(), theirs.min.clone(), Ordering::Less);
            mine.max = pick(mine.max.take(), theirs.max.clone(), Ordering::Greater);
        }
    }
}

fn pick(a: Option<Datum>, b: Option<Datum>, want: Ordering) -> Option<Datum> {
    match (a, b) {
        (Some(a), Some(b)) => {
            if b.total_cmp(&a) == want {
                Some(b)
            } else {
                Some(a)
            }
        }
        (a, None) => a,
        (None, b) => b,
    }
}

/// Accumulates [`SimpleStats`] over rows for a fixed set of column indexes
#[derive(Debug, Clone)]
pub struct StatsCollector {
    names: Vec<String>,
    indexes: Vec<usize>,
    stats: Vec<ColumnStats>,
}

impl StatsCollector {
    pub fn new(names: Vec<String>, indexes: Vec<usize>) -> Self {
        let stats = vec![ColumnStats::default(); indexes.len()];
        Self {
            names,
            indexes,
            stats,
        }
    }

    /// Fold one row into the running stats
    pub fn update(&mut self, row: &[Datum]) {
        for (slot, &idx) in self.stats.iter_mut().zip(self.indexes.iter()) {
            let value = match row.get(idx) {
                Some(v) => v,
                None => continue,
            };
            if value.is_null() {
                slot.null_count += 1;
                continue;
            }
            slot.min = pick(slot.min.take(), Some(value.clone()), Ordering::Less);
            slot.max = pick(slot.max.take(), Some(value.clone()), Ordering::Greater);
        }
    }

    pub fn finish(self) -> SimpleStats {
        SimpleStats {
            col_names: self.names,
            col_stats: self.stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_tracks_min_max_and_nulls() {
        let mut collector = StatsCollector::new(vec!["age".into()], vec![1]);
        collector.update(&[Datum::Long(1), Datum::Int(30)]);
        collector.update(&[Datum::Long(2), Datum::Null]);
        collector.update(&[Datum::Long(3), Datum::Int(25)]);

        let stats = collector.finish();
        let age = stats.column("age").unwrap();
        assert_eq!(age.min, Some(Datum::Int(25)));
        assert_eq!(age.max, Some(Datum::Int(30)));
        assert_eq!(age.null_count, 1);
    }

    #[test]
    fn test_merge_widens_range() {
        let mut a = SimpleStats {
            col_names: vec!["k".into()],
            col_stats: vec![ColumnStats {
                min: Some(Datum::Long(5)),
                max: Some(Datum::Long(9)),
                null_count: 0,
            }],
        };
        let b = SimpleStats {
            col_names: vec!["k".into()],
            col_stats: vec![ColumnStats {
                min: Some(Datum::Long(1)),
                max: Some(Datum::Long(6)),
                null_count: 2,
            }],
        };
        a.merge(&b);
        assert_eq!(a.col_stats[0].min, Some(Datum::Long(1)));
        assert_eq!(a.col_stats[0].max, Some(Datum::Long(9)));
        assert_eq!(a.col_stats[0].null_count, 2);
    }
}
