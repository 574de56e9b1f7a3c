//! Reconstruction of the optimal edit mapping after a distance
//! computation, by backtracing forest-distance tables over `delta`.

use crate::cost::CostModel;
use crate::ted::apted::Apted;
use crate::ted::{OperationExecutor, TedError};

impl<C: CostModel> Apted<C> {
    /// Backtraces `delta` into the minimum-cost edit mapping. Pairs are
    /// 1-based left-to-right postorder ids; a `0` marks the deleted
    /// (second = 0) or inserted (first = 0) side. Must be called after
    /// a distance computation.
    pub fn compute_edit_mapping(&self) -> Result<Vec<(usize, usize)>, TedError> {
        if self.distance.is_none() {
            return Err(TedError::PreconditionViolated);
        }
        let it1 = self.it1.as_ref().unwrap();
        let it2 = self.it2.as_ref().unwrap();
        let size1 = it1.size();
        let size2 = it2.size();

        let mut forestdist = vec![vec![0.0f64; size2 + 1]; size1 + 1];
        let mut mapping: Vec<(usize, usize)> = Vec::new();
        let mut tree_pairs = vec![(size1, size2)];

        while let Some((last_row, last_col)) = tree_pairs.pop() {
            self.forest_dist(last_row, last_col, &mut forestdist);

            let first_row = it1.postl_to_lld_[last_row - 1];
            let first_col = it2.postl_to_lld_[last_col - 1];
            let mut row = last_row;
            let mut col = last_col;
            while row > first_row || col > first_col {
                if row > first_row {
                    let row_del = self.costs.del(it1.postl_to_label(row - 1));
                    if forestdist[row - 1][col] + row_del == forestdist[row][col] {
                        // Node row is deleted from the left-hand tree.
                        mapping.push((row, 0));
                        row -= 1;
                        continue;
                    }
                }
                if col > first_col {
                    let col_ins = self.costs.ins(it2.postl_to_label(col - 1));
                    if forestdist[row][col - 1] + col_ins == forestdist[row][col] {
                        // Node col is inserted into the right-hand tree.
                        mapping.push((0, col));
                        col -= 1;
                        continue;
                    }
                }
                if it1.postl_to_lld_[row - 1] == it1.postl_to_lld_[last_row - 1]
                    && it2.postl_to_lld_[col - 1] == it2.postl_to_lld_[last_col - 1]
                {
                    // Both subforests are subtrees: the roots map.
                    mapping.push((row, col));
                    row -= 1;
                    col -= 1;
                } else {
                    // Jump over the subtree pair and revisit it later.
                    tree_pairs.push((row, col));
                    row = it1.postl_to_lld_[row - 1];
                    col = it2.postl_to_lld_[col - 1];
                }
            }
        }
        mapping.reverse();
        Ok(mapping)
    }

    /// Zhang-Shasha forest distances over the postL ranges of the
    /// subtree pair `(i, j)` (1-based), reading subtree distances from
    /// `delta`.
    fn forest_dist(&self, i: usize, j: usize, forestdist: &mut [Vec<f64>]) {
        let it1 = self.it1.as_ref().unwrap();
        let it2 = self.it2.as_ref().unwrap();
        let lld_i = it1.postl_to_lld_[i - 1];
        let lld_j = it2.postl_to_lld_[j - 1];

        forestdist[lld_i][lld_j] = 0.0;
        for di in lld_i + 1..=i {
            let del_di = self.costs.del(it1.postl_to_label(di - 1));
            forestdist[di][lld_j] = forestdist[di - 1][lld_j] + del_di;
            for dj in lld_j + 1..=j {
                let ins_dj = self.costs.ins(it2.postl_to_label(dj - 1));
                forestdist[lld_i][dj] = forestdist[lld_i][dj - 1] + ins_dj;
                let ren =
                    self.costs.ren(it1.postl_to_label(di - 1), it2.postl_to_label(dj - 1));
                let da = forestdist[di - 1][dj] + del_di;
                let db = forestdist[di][dj - 1] + ins_dj;
                let dc = if it1.postl_to_lld_[di - 1] == lld_i && it2.postl_to_lld_[dj - 1] == lld_j
                {
                    forestdist[di - 1][dj - 1] + ren
                } else {
                    forestdist[it1.postl_to_lld_[di - 1]][it2.postl_to_lld_[dj - 1]]
                        + self.delta.get(
                            false,
                            it1.postl_to_prel_[di - 1],
                            it2.postl_to_prel_[dj - 1],
                        )
                        + ren
                };
                forestdist[di][dj] = da.min(db).min(dc);
            }
        }
    }

    /// Re-prices a mapping under the instance's cost model.
    pub fn mapping_cost(&self, mapping: &[(usize, usize)]) -> Result<f64, TedError> {
        if self.distance.is_none() {
            return Err(TedError::PreconditionViolated);
        }
        let it1 = self.it1.as_ref().unwrap();
        let it2 = self.it2.as_ref().unwrap();
        let mut cost = 0.0;
        for &pair in mapping {
            cost += match pair {
                (0, 0) => 0.0,
                (0, b) => self.costs.ins(it2.postl_to_label(b - 1)),
                (a, 0) => self.costs.del(it1.postl_to_label(a - 1)),
                (a, b) => self
                    .costs
                    .ren(it1.postl_to_label(a - 1), it2.postl_to_label(b - 1)),
            };
        }
        Ok(cost)
    }

    /// Replays the implied operation sequence against an executor, in
    /// mapping order.
    pub fn execute_operations(
        &self,
        mapping: &[(usize, usize)],
        executor: &mut impl OperationExecutor,
    ) -> Result<(), TedError> {
        if self.distance.is_none() {
            return Err(TedError::PreconditionViolated);
        }
        let it1 = self.it1.as_ref().unwrap();
        let it2 = self.it2.as_ref().unwrap();
        for &pair in mapping {
            match pair {
                (0, 0) => {}
                (0, b) => executor.insert(it2.postl_to_label(b - 1)),
                (a, 0) => executor.delete(it1.postl_to_label(a - 1)),
                (a, b) => {
                    executor.update(it1.postl_to_label(a - 1), it2.postl_to_label(b - 1))
                }
            }
        }
        Ok(())
    }

    /// Replays the operation sequence back to front.
    pub fn execute_operations_in_reverse(
        &self,
        mapping: &[(usize, usize)],
        executor: &mut impl OperationExecutor,
    ) -> Result<(), TedError> {
        if self.distance.is_none() {
            return Err(TedError::PreconditionViolated);
        }
        let it1 = self.it1.as_ref().unwrap();
        let it2 = self.it2.as_ref().unwrap();
        for &pair in mapping.iter().rev() {
            match pair {
                (0, 0) => {}
                (0, b) => executor.insert(it2.postl_to_label(b - 1)),
                (a, 0) => executor.delete(it1.postl_to_label(a - 1)),
                (a, b) => {
                    executor.update(it1.postl_to_label(a - 1), it2.postl_to_label(b - 1))
                }
            }
        }
        Ok(())
    }
}
