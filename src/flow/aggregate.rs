//! Grouping aggregates and their merge step.
//!
//! Workers build partial aggregates over disjoint slices of records; partials
//! are combined with `merge`, which is associative and commutative (sums of
//! counts, sums of squared errors plus a separate count), so the final table
//! does not depend on how records were partitioned.

use std::collections::HashMap;

use serde::Serialize;

use crate::domain::{Record, Value};

/// One confusion-matrix cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfusionRow {
    pub expected: String,
    pub predicted: String,
    pub count: u64,
}

/// Counts of (expected, predicted) label pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfusionMatrix {
    counts: HashMap<(String, String), u64>,
}

impl ConfusionMatrix {
    pub fn observe(&mut self, expected: String, predicted: String) {
        *self.counts.entry((expected, predicted)).or_insert(0) += 1;
    }

    pub fn merge(mut self, other: ConfusionMatrix) -> ConfusionMatrix {
        for (key, n) in other.counts {
            *self.counts.entry(key).or_insert(0) += n;
        }
        self
    }

    pub fn count(&self, expected: &str, predicted: &str) -> u64 {
        self.counts
            .get(&(expected.to_string(), predicted.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Number of records observed.
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Fraction of records on the diagonal.
    pub fn accuracy(&self) -> Option<f64> {
        let total = self.total();
        if total == 0 {
            return None;
        }
        let hits: u64 = self
            .counts
            .iter()
            .filter(|((e, p), _)| e == p)
            .map(|(_, n)| *n)
            .sum();
        Some(hits as f64 / total as f64)
    }

    /// Cells sorted by (expected, predicted) for stable output.
    pub fn rows(&self) -> Vec<ConfusionRow> {
        let mut rows: Vec<ConfusionRow> = self
            .counts
            .iter()
            .map(|((expected, predicted), count)| ConfusionRow {
                expected: expected.clone(),
                predicted: predicted.clone(),
                count: *count,
            })
            .collect();
        rows.sort_by(|a, b| (&a.expected, &a.predicted).cmp(&(&b.expected, &b.predicted)));
        rows
    }
}

/// Running squared-error sum for one group.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ErrorSum {
    pub sum_sq: f64,
    pub count: u64,
}

impl ErrorSum {
    pub fn merge(self, other: ErrorSum) -> ErrorSum {
        ErrorSum {
            sum_sq: self.sum_sq + other.sum_sq,
            count: self.count + other.count,
        }
    }

    pub fn rmse(&self) -> f64 {
        (self.sum_sq / self.count as f64).sqrt()
    }
}

/// RMSE for one group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RmseRow {
    pub group: String,
    pub rmse: f64,
    pub count: u64,
}

/// Squared-error sums keyed by group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RmseAggregate {
    groups: HashMap<String, ErrorSum>,
}

impl RmseAggregate {
    pub fn observe(&mut self, group: String, squared_error: f64) {
        let entry = self.groups.entry(group).or_default();
        entry.sum_sq += squared_error;
        entry.count += 1;
    }

    pub fn merge(mut self, other: RmseAggregate) -> RmseAggregate {
        for (group, sum) in other.groups {
            let entry = self.groups.entry(group).or_default();
            *entry = entry.merge(sum);
        }
        self
    }

    pub fn total(&self) -> u64 {
        self.groups.values().map(|g| g.count).sum()
    }

    /// Groups sorted by key. Only groups with at least one member exist.
    pub fn rows(&self) -> Vec<RmseRow> {
        let mut rows: Vec<RmseRow> = self
            .groups
            .iter()
            .map(|(group, sum)| RmseRow {
                group: group.clone(),
                rmse: sum.rmse(),
                count: sum.count,
            })
            .collect();
        rows.sort_by(|a, b| a.group.cmp(&b.group));
        rows
    }
}

/// One record's contribution to the measure branch.
#[derive(Debug, Clone, PartialEq)]
pub enum Contribution {
    Confusion { expected: String, predicted: String },
    SquaredError { group: String, value: f64 },
}

/// The aggregate of whichever measure branch the flow has.
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregate {
    Confusion(ConfusionMatrix),
    Rmse(RmseAggregate),
}

impl Aggregate {
    /// Fold one contribution in. Contributions of the other kind are ignored;
    /// a flow only ever produces one kind.
    pub fn observe(&mut self, contribution: &Contribution) {
        match (self, contribution) {
            (Aggregate::Confusion(m), Contribution::Confusion { expected, predicted }) => {
                m.observe(expected.clone(), predicted.clone())
            }
            (Aggregate::Rmse(r), Contribution::SquaredError { group, value }) => {
                r.observe(group.clone(), *value)
            }
            _ => {}
        }
    }

    pub fn merge(self, other: Aggregate) -> Aggregate {
        match (self, other) {
            (Aggregate::Confusion(a), Aggregate::Confusion(b)) => Aggregate::Confusion(a.merge(b)),
            (Aggregate::Rmse(a), Aggregate::Rmse(b)) => Aggregate::Rmse(a.merge(b)),
            (a, _) => a,
        }
    }

    /// An empty aggregate of the same kind.
    pub fn empty_like(&self) -> Aggregate {
        match self {
            Aggregate::Confusion(_) => Aggregate::Confusion(ConfusionMatrix::default()),
            Aggregate::Rmse(_) => Aggregate::Rmse(RmseAggregate::default()),
        }
    }

    /// Records that reached the aggregation stage.
    pub fn total(&self) -> u64 {
        match self {
            Aggregate::Confusion(m) => m.total(),
            Aggregate::Rmse(r) => r.total(),
        }
    }

    /// Output rows, aligned with the stage's output schema.
    pub fn to_records(&self) -> Vec<Record> {
        match self {
            Aggregate::Confusion(m) => m
                .rows()
                .into_iter()
                .map(|r| {
                    Record::new(vec![
                        Value::Text(r.expected),
                        Value::Text(r.predicted),
                        Value::Number(r.count as f64),
                    ])
                })
                .collect(),
            Aggregate::Rmse(agg) => agg
                .rows()
                .into_iter()
                .map(|r| {
                    Record::new(vec![
                        Value::Text(r.group),
                        Value::Number(r.rmse),
                        Value::Number(r.count as f64),
                    ])
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;

    fn pairs() -> Vec<(String, String)> {
        let raw = [("A", "A"), ("A", "B"), ("B", "B"), ("A", "A"), ("C", "B"), ("B", "B"), ("a", "A")];
        raw.iter().map(|(e, p)| (e.to_string(), p.to_string())).collect()
    }

    fn matrix(pairs: &[(String, String)]) -> ConfusionMatrix {
        let mut m = ConfusionMatrix::default();
        for (e, p) in pairs {
            m.observe(e.clone(), p.clone());
        }
        m
    }

    #[test]
    fn confusion_is_order_and_partition_independent() {
        let base = pairs();
        let whole = matrix(&base);
        assert_eq!(whole.total(), base.len() as u64);
        assert_eq!(whole.count("A", "A"), 2);
        assert_eq!(whole.count("a", "A"), 1);

        let mut rng = StdRng::seed_from_u64(7);
        for split in 0..=base.len() {
            let mut shuffled = base.clone();
            shuffled.shuffle(&mut rng);
            let (left, right) = shuffled.split_at(split);
            assert_eq!(matrix(left).merge(matrix(right)), whole);
            assert_eq!(matrix(right).merge(matrix(left)), whole);
        }
    }

    #[test]
    fn rows_list_each_pair_once() {
        let rows = matrix(&pairs()).rows();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows.iter().map(|r| r.count).sum::<u64>(), 7);
    }

    #[test]
    fn exact_predictions_give_zero_rmse() {
        let mut agg = RmseAggregate::default();
        for _ in 0..3 {
            agg.observe("seg".to_string(), 0.0);
        }
        let rows = agg.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].rmse, 0.0);
    }

    #[test]
    fn rmse_merge_matches_single_pass() {
        let errors = [("x", 0.0), ("x", 0.0), ("x", 4.0), ("y", 1.0)];
        let mut whole = RmseAggregate::default();
        let mut left = RmseAggregate::default();
        let mut right = RmseAggregate::default();
        for (i, (g, e)) in errors.iter().enumerate() {
            whole.observe(g.to_string(), *e);
            if i % 2 == 0 {
                left.observe(g.to_string(), *e);
            } else {
                right.observe(g.to_string(), *e);
            }
        }
        let merged = left.merge(right);
        assert_eq!(merged, whole);
        let x = &merged.rows()[0];
        assert!((x.rmse - (4.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert_eq!(x.count, 3);
    }
}
