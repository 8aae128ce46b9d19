use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    geometry::Point,
    types::{BranchId, Series},
};

/// Coefficients recorded for one branch, one entry per step.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesRecord {
    pub a1: Vec<f64>,
    pub a2: Vec<f64>,
    pub a3: Vec<f64>,
}

impl SeriesRecord {
    /// Number of recorded steps.
    pub fn len(&self) -> usize {
        self.a1.len()
    }

    pub fn is_empty(&self) -> bool {
        self.a1.is_empty()
    }

    /// Most recent coefficients, if any.
    pub fn last(&self) -> Option<Series> {
        Some([*self.a1.last()?, *self.a2.last()?, *self.a3.last()?])
    }

    fn push(&mut self, a: &Series) {
        self.a1.push(a[0]);
        self.a2.push(a[1]);
        self.a3.push(a[2]);
    }

    fn pop(&mut self) -> Option<Series> {
        Some([self.a1.pop()?, self.a2.pop()?, self.a3.pop()?])
    }
}

/// What a backward step observed for one tip: the coefficients before
/// shrinking and where the tip was before, after shrinking, and after
/// growing forward again.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BackwardRecord {
    pub series: SeriesRecord,
    pub init: Vec<Point>,
    pub backward: Vec<Point>,
    pub backward_forward: Vec<Point>,
    /// Length difference of the two children when a fork of this branch
    /// was retracted during a shrink step.
    pub branch_length_diff: Option<f64>,
}

/// Per-branch history of the series coefficients seen during a run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesHistory {
    records: BTreeMap<BranchId, SeriesRecord>,
    backward: BTreeMap<BranchId, BackwardRecord>,
}

impl SeriesHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the coefficients of one step.
    ///
    /// ### Parameters
    /// - `series` - Coefficients keyed by tip id. Ids seen for the first
    ///   time get a fresh [`SeriesRecord`].
    pub fn record(&mut self, series: &BTreeMap<BranchId, Series>) {
        for (id, a) in series {
            self.records.entry(*id).or_default().push(a);
        }
    }

    /// Drops the most recent entry of each listed branch.
    ///
    /// Used when a step is reverted. Branches without a record are skipped.
    ///
    /// ### Returns
    /// The coefficients that were removed, keyed by branch id.
    pub fn pop_last(&mut self, ids: &[BranchId]) -> BTreeMap<BranchId, Series> {
        ids.iter()
            .filter_map(|id| Some((*id, self.records.get_mut(id)?.pop()?)))
            .collect()
    }

    /// Stores the child length difference of a retracted fork.
    pub fn record_length_diff(&mut self, id: BranchId, diff: f64) {
        self.backward.entry(id).or_default().branch_length_diff = Some(diff);
    }

    /// Stores the outcome of one backward step.
    ///
    /// ### Parameters
    /// - `series` - Coefficients of the first shrink of the step.
    /// - `init`, `backward`, `backward_forward` - Tip positions before
    ///   shrinking, after shrinking and after regrowing. A tip is recorded
    ///   only when it appears in all three.
    pub fn record_backward(
        &mut self,
        series: &BTreeMap<BranchId, Series>,
        init: &BTreeMap<BranchId, Point>,
        backward: &BTreeMap<BranchId, Point>,
        backward_forward: &BTreeMap<BranchId, Point>,
    ) {
        for (id, a) in series {
            self.backward.entry(*id).or_default().series.push(a);
        }
        for (id, p) in init {
            if let (Some(b), Some(f)) = (backward.get(id), backward_forward.get(id)) {
                let record = self.backward.entry(*id).or_default();
                record.init.push(*p);
                record.backward.push(*b);
                record.backward_forward.push(*f);
            }
        }
    }

    pub fn backward(&self, id: BranchId) -> Option<&BackwardRecord> {
        self.backward.get(&id)
    }

    pub fn get(&self, id: BranchId) -> Option<&SeriesRecord> {
        self.records.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (BranchId, &SeriesRecord)> + '_ {
        self.records.iter().map(|(id, r)| (*id, r))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.backward.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(entries: &[(BranchId, Series)]) -> BTreeMap<BranchId, Series> {
        entries.iter().copied().collect()
    }

    #[test]
    fn record_appends_per_branch() {
        let mut h = SeriesHistory::new();
        h.record(&step(&[(1, [1.0, 2.0, 3.0])]));
        h.record(&step(&[(1, [4.0, 5.0, 6.0]), (2, [7.0, 8.0, 9.0])]));

        assert_eq!(h.len(), 2);
        let r1 = h.get(1).unwrap();
        assert_eq!(r1.a1, vec![1.0, 4.0]);
        assert_eq!(r1.a2, vec![2.0, 5.0]);
        assert_eq!(r1.a3, vec![3.0, 6.0]);
        assert_eq!(r1.last(), Some([4.0, 5.0, 6.0]));
        assert_eq!(h.get(2).unwrap().len(), 1);
    }

    #[test]
    fn pop_last_reverts_only_listed_branches() {
        let mut h = SeriesHistory::new();
        h.record(&step(&[(1, [1.0, 0.0, 0.0]), (2, [2.0, 0.0, 0.0])]));
        h.record(&step(&[(1, [3.0, 0.0, 0.0]), (2, [4.0, 0.0, 0.0])]));

        let popped = h.pop_last(&[1, 9]);
        assert_eq!(popped, step(&[(1, [3.0, 0.0, 0.0])]));
        assert_eq!(h.get(1).unwrap().a1, vec![1.0]);
        assert_eq!(h.get(2).unwrap().a1, vec![2.0, 4.0]);
    }

    #[test]
    fn pop_last_skips_unknown_branches() {
        let mut h = SeriesHistory::new();
        h.record_length_diff(3, 0.25);
        assert!(h.pop_last(&[3]).is_empty());
        assert!(h.get(3).is_none());
        assert_eq!(h.backward(3).unwrap().branch_length_diff, Some(0.25));
    }

    #[test]
    fn backward_points_need_all_three_positions() {
        let mut h = SeriesHistory::new();
        let p = |y| Point::new(0.0, y);
        h.record_backward(
            &step(&[(1, [1.0, 0.0, 0.0])]),
            &BTreeMap::from([(1, p(1.0)), (2, p(2.0))]),
            &BTreeMap::from([(1, p(0.5)), (2, p(1.5))]),
            &BTreeMap::from([(1, p(0.9))]),
        );

        let r = h.backward(1).unwrap();
        assert_eq!(r.series.a1, vec![1.0]);
        assert_eq!(r.init, vec![p(1.0)]);
        assert_eq!(r.backward, vec![p(0.5)]);
        assert_eq!(r.backward_forward, vec![p(0.9)]);
        assert!(h.backward(2).is_none());
    }

    #[test]
    fn history_serializes_with_json() {
        let mut h = SeriesHistory::new();
        h.record(&step(&[(1, [1.0, 2.0, 3.0])]));
        let text = serde_json::to_string(&h).unwrap();
        let back: SeriesHistory = serde_json::from_str(&text).unwrap();
        assert_eq!(back, h);
    }
}
