// The MIT License (MIT)
// Copyright (c) 2017 Mateusz Pawlik.
//

/*! Implements the state-of-the-art tree edit distance algorithm APTED+ by
 Pawlik and Augsten [1,2,3,4].

 [1] M.Pawlik and N.Augsten. RTED: A Robust Algorithm for the Tree Edit
     Distance. PVLDB. 2011.

 [2] M.Pawlik and N.Augsten. A Memory-Efficient Tree Edit Distance Algorithm.
     DEXA. 2014.

 [3] M. Pawlik and N. Augsten. Efficient Computation of the Tree Edit
     Distance. ACM Transactions on Database Systems (TODS). 2015.

 [4] M. Pawlik and N. Augsten. Tree edit distance: Robust and
     memory-efficient. Information Systems. 2016.
!*/

use crate::cost::{is_valid_cost, CostModel};
use crate::indexing::AptedIndex;
use crate::parsing::{LabelId, ParsedTree};
use crate::ted::TedError;
use rustc_hash::FxHashSet;

/// Which single-path function a forced-strategy run exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpfKind {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathType {
    Left,
    Right,
    Inner,
}

/// Subtree-pair distances without the root mapping contribution, stored
/// flat in the orientation of the original inputs. The `swapped` flag
/// transposes accesses for callers that exchanged their arguments.
#[derive(Debug, Default)]
pub(crate) struct DeltaMatrix {
    pub(crate) v: Vec<f64>,
    pub(crate) cols: usize,
}

impl DeltaMatrix {
    fn new(rows: usize, cols: usize) -> Self {
        DeltaMatrix {
            v: vec![0.0; rows * cols],
            cols,
        }
    }

    #[inline(always)]
    pub(crate) fn get(&self, swapped: bool, f: usize, g: usize) -> f64 {
        if swapped {
            self.v[g * self.cols + f]
        } else {
            self.v[f * self.cols + g]
        }
    }

    #[inline(always)]
    fn set(&mut self, swapped: bool, f: usize, g: usize, value: f64) {
        if swapped {
            self.v[g * self.cols + f] = value;
        } else {
            self.v[f * self.cols + g] = value;
        }
    }
}

/// Sentinel for inner-path cost rows so the tracked minimum is always a
/// real descendant path. Large enough to never win, small enough to not
/// overflow when path weights are added.
const INNER_INIT: i64 = i64::MAX >> 2;

/// One distance computation over a pair of trees. Holds the indexes,
/// the `delta` matrix and scratch arrays; a single instance must not be
/// shared between threads, independent instances may run in parallel.
pub struct Apted<C: CostModel> {
    pub(crate) costs: C,
    pub(crate) it1: Option<AptedIndex>,
    pub(crate) it2: Option<AptedIndex>,
    pub(crate) delta: DeltaMatrix,
    q: Vec<f64>,
    pub(crate) distance: Option<f64>,
}

impl<C: CostModel> Apted<C> {
    pub fn new(costs: C) -> Self {
        Apted {
            costs,
            it1: None,
            it2: None,
            delta: DeltaMatrix::default(),
            q: Vec::new(),
            distance: None,
        }
    }

    /// Full pipeline: index both trees, pick a path strategy, run the
    /// decomposition and return the tree edit distance.
    pub fn compute_edit_distance(
        &mut self,
        t1: &ParsedTree,
        t2: &ParsedTree,
    ) -> Result<f64, TedError> {
        self.init(t1, t2)?;
        let it1 = self.it1.as_ref().unwrap();
        let it2 = self.it2.as_ref().unwrap();
        let strategy = if it1.lchl < it1.rchl {
            compute_opt_strategy_post_l(it1, it2)
        } else {
            compute_opt_strategy_post_r(it1, it2)
        };
        self.ted_init();
        let distance = self.gted(&strategy);
        self.distance = Some(distance);
        Ok(distance)
    }

    /// Bypasses the strategy computer and forces the leftmost or
    /// rightmost leaf path of the corresponding left-hand subtree into
    /// every cell. Exercises `spf_l`/`spf_r` deterministically.
    pub fn compute_edit_distance_spf_test(
        &mut self,
        t1: &ParsedTree,
        t2: &ParsedTree,
        kind: SpfKind,
    ) -> Result<f64, TedError> {
        self.init(t1, t2)?;
        let it1 = self.it1.as_ref().unwrap();
        let it2 = self.it2.as_ref().unwrap();
        let size1 = it1.size();
        let size2 = it2.size();
        let mut strategy = vec![0i64; size1 * size2];
        for i in 0..size1 {
            // Left paths carry the negative encoding so the driver
            // dispatches spf_l; right paths decode by their leaf id.
            let path = match kind {
                SpfKind::Left => -(it1.prel_to_lld(i) as i64 + 1),
                SpfKind::Right => it1.prel_to_rld(i) as i64 + 1,
            };
            strategy[i * size2..(i + 1) * size2].fill(path);
        }
        self.ted_init();
        let distance = self.gted(&strategy);
        self.distance = Some(distance);
        Ok(distance)
    }

    fn init(&mut self, t1: &ParsedTree, t2: &ParsedTree) -> Result<(), TedError> {
        self.distance = None;
        self.it1 = Some(AptedIndex::index_tree(t1, &self.costs)?);
        self.it2 = Some(AptedIndex::index_tree(t2, &self.costs)?);
        self.validate_ren_costs()
    }

    /// Rename costs are probed over the cross product of the distinct
    /// label sets of the two inputs, bounded by the size of `delta`.
    fn validate_ren_costs(&self) -> Result<(), TedError> {
        let labels1: FxHashSet<LabelId> = self
            .it1
            .as_ref()
            .unwrap()
            .prel_to_label_
            .iter()
            .copied()
            .collect();
        let labels2: FxHashSet<LabelId> = self
            .it2
            .as_ref()
            .unwrap()
            .prel_to_label_
            .iter()
            .copied()
            .collect();
        for &l1 in &labels1 {
            for &l2 in &labels2 {
                let ren = self.costs.ren(l1, l2);
                if !is_valid_cost(ren) {
                    return Err(TedError::InvalidCostModel(ren));
                }
            }
        }
        Ok(())
    }

    /// Allocates `delta` and scratch, and prefills the rows and columns
    /// where one subtree is a single node: those distances are plain
    /// insertion or deletion sums without the root contribution.
    fn ted_init(&mut self) {
        let it1 = self.it1.as_ref().unwrap();
        let it2 = self.it2.as_ref().unwrap();
        let size1 = it1.size();
        let size2 = it2.size();
        let mut delta = DeltaMatrix::new(size1, size2);
        for x in 0..size1 {
            for y in 0..size2 {
                match (it1.prel_to_size_[x], it2.prel_to_size_[y]) {
                    (1, 1) => {}
                    (1, _) => {
                        delta.v[x * size2 + y] = it2.prel_to_sum_ins_cost_[y]
                            - self.costs.ins(it2.prel_to_label_[y]);
                    }
                    (_, 1) => {
                        delta.v[x * size2 + y] = it1.prel_to_sum_del_cost_[x]
                            - self.costs.del(it1.prel_to_label_[x]);
                    }
                    _ => {}
                }
            }
        }
        self.delta = delta;
        self.q = vec![0.0; size1.max(size2) + 1];
    }

    /// The GTED recursion as an explicit work stack: a `Visit` frame
    /// recurses into the off-path subtrees, the matching `Run` frame
    /// executes the single-path function once they are done. The last
    /// frame executed belongs to the root pair.
    fn gted(&mut self, strategy: &[i64]) -> f64 {
        enum Frame {
            Visit { x: usize, y: usize },
            Run { x: usize, y: usize, path_id: i64 },
        }

        let it1 = self.it1.as_ref().unwrap();
        let it2 = self.it2.as_ref().unwrap();
        let size2 = it2.size();
        let offset = it1.size() as i64;
        let mut result = 0.0;
        let mut stack = vec![Frame::Visit { x: 0, y: 0 }];

        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Visit { x, y } => {
                    if it1.prel_to_size_[x] == 1 || it2.prel_to_size_[y] == 1 {
                        result = spf1(it1, x, it2, y, &self.costs);
                        continue;
                    }
                    let path_id = strategy[x * size2 + y];
                    stack.push(Frame::Run { x, y, path_id });
                    let abs = path_id.abs() - 1;
                    if abs < offset {
                        let mut path_node = abs as usize;
                        loop {
                            let parent = it1.prel_to_parent_[path_node];
                            if parent < x as i64 {
                                break;
                            }
                            for &child in &it1.prel_to_children_[parent as usize] {
                                if child != path_node {
                                    stack.push(Frame::Visit { x: child, y });
                                }
                            }
                            path_node = parent as usize;
                        }
                    } else {
                        let mut path_node = (abs - offset) as usize;
                        loop {
                            let parent = it2.prel_to_parent_[path_node];
                            if parent < y as i64 {
                                break;
                            }
                            for &child in &it2.prel_to_children_[parent as usize] {
                                if child != path_node {
                                    stack.push(Frame::Visit { x, y: child });
                                }
                            }
                            path_node = parent as usize;
                        }
                    }
                }
                Frame::Run { x, y, path_id } => {
                    let abs = path_id.abs() - 1;
                    result = if abs < offset {
                        let leaf = abs as usize;
                        match strategy_path_type(path_id, offset, x, it1.prel_to_size_[x]) {
                            PathType::Left => {
                                spf_l(it1, it2, x, y, false, &mut self.delta, &self.costs)
                            }
                            PathType::Right => {
                                spf_r(it1, it2, x, y, false, &mut self.delta, &self.costs)
                            }
                            PathType::Inner => spf_a(
                                it1,
                                it2,
                                x,
                                y,
                                leaf,
                                false,
                                &mut self.delta,
                                &mut self.q,
                                &self.costs,
                            ),
                        }
                    } else {
                        let leaf = (abs - offset) as usize;
                        match strategy_path_type(path_id, offset, y, it2.prel_to_size_[y]) {
                            PathType::Left => {
                                spf_l(it2, it1, y, x, true, &mut self.delta, &self.costs)
                            }
                            PathType::Right => {
                                spf_r(it2, it1, y, x, true, &mut self.delta, &self.costs)
                            }
                            PathType::Inner => spf_a(
                                it2,
                                it1,
                                y,
                                x,
                                leaf,
                                true,
                                &mut self.delta,
                                &mut self.q,
                                &self.costs,
                            ),
                        }
                    };
                }
            }
        }
        result
    }
}

fn strategy_path_type(path_id: i64, offset: i64, subtree_root: usize, subtree_size: usize) -> PathType {
    if path_id < 0 {
        return PathType::Left;
    }
    let mut pid = path_id.abs() - 1;
    if pid >= offset {
        pid -= offset;
    }
    if pid as usize == subtree_root + subtree_size - 1 {
        return PathType::Right;
    }
    PathType::Inner
}

/// Distance when one of the subtrees is a single node. The minimum with
/// delete-plus-insert caps cost models where a rename may be dearer
/// than replacing the node.
fn spf1<C: CostModel>(
    it1: &AptedIndex,
    x: usize,
    it2: &AptedIndex,
    y: usize,
    costs: &C,
) -> f64 {
    let size1 = it1.prel_to_size_[x];
    let size2 = it2.prel_to_size_[y];
    if size1 == 1 && size2 == 1 {
        let n1 = it1.prel_to_label_[x];
        let n2 = it2.prel_to_label_[y];
        let max_cost = costs.del(n1) + costs.ins(n2);
        return costs.ren(n1, n2).min(max_cost);
    }
    if size1 == 1 {
        let n1 = it1.prel_to_label_[x];
        let cost = it2.prel_to_sum_ins_cost_[y];
        let max_cost = cost + costs.del(n1);
        let mut min_ren_minus_ins = f64::INFINITY;
        for i in y..y + size2 {
            let n2 = it2.prel_to_label_[i];
            let ren_minus_ins = costs.ren(n1, n2) - costs.ins(n2);
            if ren_minus_ins < min_ren_minus_ins {
                min_ren_minus_ins = ren_minus_ins;
            }
        }
        return (cost + min_ren_minus_ins).min(max_cost);
    }
    // size2 == 1
    let n2 = it2.prel_to_label_[y];
    let cost = it1.prel_to_sum_del_cost_[x];
    let max_cost = cost + costs.ins(n2);
    let mut min_ren_minus_del = f64::INFINITY;
    for i in x..x + size1 {
        let n1 = it1.prel_to_label_[i];
        let ren_minus_del = costs.ren(n1, n2) - costs.del(n1);
        if ren_minus_del < min_ren_minus_del {
            min_ren_minus_del = ren_minus_del;
        }
    }
    (cost + min_ren_minus_del).min(max_cost)
}

/// Strategy computation iterating both trees in left-to-right postorder.
/// Returns the flat `size1 x size2` matrix of encoded path ids.
fn compute_opt_strategy_post_l(it1: &AptedIndex, it2: &AptedIndex) -> Vec<i64> {
    let size1 = it1.size();
    let size2 = it2.size();
    let path_id_offset = size1 as i64;
    let mut strategy = vec![0i64; size1 * size2];

    // Cumulative cost rows per T1 node, indexed by postL id. Leaves
    // share the implicit zero row (None); parent rows are recycled
    // through the spare stack once a node is finished.
    let mut cost1_l: Vec<Option<Box<[i64]>>> = (0..size1).map(|_| None).collect();
    let mut cost1_r: Vec<Option<Box<[i64]>>> = (0..size1).map(|_| None).collect();
    let mut cost1_i: Vec<Option<Box<[i64]>>> = (0..size1).map(|_| None).collect();
    let mut spare_rows: Vec<(Box<[i64]>, Box<[i64]>, Box<[i64]>)> = Vec::new();

    let mut cost2_l = vec![0i64; size2];
    let mut cost2_r = vec![0i64; size2];
    let mut cost2_i = vec![0i64; size2];
    let mut cost2_path = vec![0i64; size2];

    let row_get = |rows: &[Option<Box<[i64]>>], idx: usize, w: usize| -> i64 {
        rows[idx].as_deref().map_or(0, |r| r[w])
    };

    for v in 0..size1 {
        let v_in_prel = it1.postl_to_prel_[v];
        let is_v_leaf = it1.is_leaf(v_in_prel);
        let parent_v_prel = it1.prel_to_parent_[v_in_prel];
        let size_v = it1.prel_to_size_[v_in_prel] as i64;
        let left_path_v = -(it1.prel_to_lld(v_in_prel) as i64 + 1);
        let right_path_v = it1.prel_to_rld(v_in_prel) as i64 + 1;
        let kr_sum_v = it1.prel_to_cost_left_[v_in_prel] as i64;
        let rev_kr_sum_v = it1.prel_to_cost_right_[v_in_prel] as i64;
        let desc_sum_v = it1.prel_to_cost_all_[v_in_prel] as i64;

        if is_v_leaf {
            // Bootstrap the inner-path tracking with the leaf itself.
            strategy[v_in_prel * size2..(v_in_prel + 1) * size2].fill(v_in_prel as i64);
        }

        let parent_v_postl = if parent_v_prel >= 0 {
            it1.prel_to_postl_[parent_v_prel as usize]
        } else {
            usize::MAX
        };
        if parent_v_prel >= 0 && cost1_l[parent_v_postl].is_none() {
            let (l, r, i) = spare_rows.pop().unwrap_or_else(|| {
                (
                    vec![0i64; size2].into_boxed_slice(),
                    vec![0i64; size2].into_boxed_slice(),
                    vec![INNER_INIT; size2].into_boxed_slice(),
                )
            });
            cost1_l[parent_v_postl] = Some(l);
            cost1_r[parent_v_postl] = Some(r);
            cost1_i[parent_v_postl] = Some(i);
        }

        cost2_l.fill(0);
        cost2_r.fill(0);
        cost2_i.fill(INNER_INIT);
        cost2_path.fill(0);

        for w in 0..size2 {
            let w_in_prel = it2.postl_to_prel_[w];
            let parent_w_prel = it2.prel_to_parent_[w_in_prel];
            let parent_w_postl = if parent_w_prel >= 0 {
                it2.prel_to_postl_[parent_w_prel as usize]
            } else {
                usize::MAX
            };
            let size_w = it2.prel_to_size_[w_in_prel] as i64;
            if it2.is_leaf(w_in_prel) {
                cost2_l[w] = 0;
                cost2_r[w] = 0;
                cost2_i[w] = 0;
                cost2_path[w] = w_in_prel as i64;
            }

            let mut min_cost = i64::MAX;
            let mut strategy_path = -1i64;
            if size_v <= 1 || size_w <= 1 {
                min_cost = size_v.max(size_w);
            } else {
                let mut tmp =
                    size_v * it2.prel_to_cost_left_[w_in_prel] as i64 + row_get(&cost1_l, v, w);
                if tmp < min_cost {
                    min_cost = tmp;
                    strategy_path = left_path_v;
                }
                tmp = size_v * it2.prel_to_cost_right_[w_in_prel] as i64 + row_get(&cost1_r, v, w);
                if tmp < min_cost {
                    min_cost = tmp;
                    strategy_path = right_path_v;
                }
                tmp = size_v * it2.prel_to_cost_all_[w_in_prel] as i64 + row_get(&cost1_i, v, w);
                if tmp < min_cost {
                    min_cost = tmp;
                    strategy_path = strategy[v_in_prel * size2 + w_in_prel] + 1;
                }
                tmp = size_w * kr_sum_v + cost2_l[w];
                if tmp < min_cost {
                    min_cost = tmp;
                    strategy_path = -(it2.prel_to_lld(w_in_prel) as i64 + path_id_offset + 1);
                }
                tmp = size_w * rev_kr_sum_v + cost2_r[w];
                if tmp < min_cost {
                    min_cost = tmp;
                    strategy_path = it2.prel_to_rld(w_in_prel) as i64 + path_id_offset + 1;
                }
                tmp = size_w * desc_sum_v + cost2_i[w];
                if tmp < min_cost {
                    min_cost = tmp;
                    strategy_path = cost2_path[w] + path_id_offset + 1;
                }
            }

            if parent_v_prel >= 0 {
                let cost_l_v_w = row_get(&cost1_l, v, w);
                let cost_r_v_w = row_get(&cost1_r, v, w);
                let cost_i_v_w = row_get(&cost1_i, v, w);
                let pr = cost1_r[parent_v_postl].as_deref_mut().unwrap();
                pr[w] += min_cost;
                let parent_r_w = pr[w];
                let pi = cost1_i[parent_v_postl].as_deref_mut().unwrap();
                let tmp = -min_cost + cost_i_v_w;
                if tmp < pi[w] {
                    pi[w] = tmp;
                    strategy[parent_v_prel as usize * size2 + w_in_prel] =
                        strategy[v_in_prel * size2 + w_in_prel];
                }
                if it1.prel_to_type_right_[v_in_prel] {
                    let pi = cost1_i[parent_v_postl].as_deref_mut().unwrap();
                    pi[w] += parent_r_w;
                    let pr = cost1_r[parent_v_postl].as_deref_mut().unwrap();
                    pr[w] += cost_r_v_w - min_cost;
                }
                let pl = cost1_l[parent_v_postl].as_deref_mut().unwrap();
                if it1.prel_to_type_left_[v_in_prel] {
                    pl[w] += cost_l_v_w;
                } else {
                    pl[w] += min_cost;
                }
            }
            if parent_w_prel >= 0 {
                cost2_r[parent_w_postl] += min_cost;
                let tmp = -min_cost + cost2_i[w];
                if tmp < cost2_i[parent_w_postl] {
                    cost2_i[parent_w_postl] = tmp;
                    cost2_path[parent_w_postl] = cost2_path[w];
                }
                if it2.prel_to_type_right_[w_in_prel] {
                    cost2_i[parent_w_postl] += cost2_r[parent_w_postl];
                    cost2_r[parent_w_postl] += cost2_r[w] - min_cost;
                }
                if it2.prel_to_type_left_[w_in_prel] {
                    cost2_l[parent_w_postl] += cost2_l[w];
                } else {
                    cost2_l[parent_w_postl] += min_cost;
                }
            }
            strategy[v_in_prel * size2 + w_in_prel] = strategy_path;
        }

        if !is_v_leaf {
            let mut l = cost1_l[v].take().unwrap();
            let mut r = cost1_r[v].take().unwrap();
            let mut i = cost1_i[v].take().unwrap();
            l.fill(0);
            r.fill(0);
            i.fill(INNER_INIT);
            spare_rows.push((l, r, i));
        }
    }
    strategy
}

/// Dual of `compute_opt_strategy_post_l` iterating right-to-left
/// postorder; the accumulation roles of the left and right paths swap.
fn compute_opt_strategy_post_r(it1: &AptedIndex, it2: &AptedIndex) -> Vec<i64> {
    let size1 = it1.size();
    let size2 = it2.size();
    let path_id_offset = size1 as i64;
    let mut strategy = vec![0i64; size1 * size2];

    let mut cost1_l: Vec<Option<Box<[i64]>>> = (0..size1).map(|_| None).collect();
    let mut cost1_r: Vec<Option<Box<[i64]>>> = (0..size1).map(|_| None).collect();
    let mut cost1_i: Vec<Option<Box<[i64]>>> = (0..size1).map(|_| None).collect();
    let mut spare_rows: Vec<(Box<[i64]>, Box<[i64]>, Box<[i64]>)> = Vec::new();

    let mut cost2_l = vec![0i64; size2];
    let mut cost2_r = vec![0i64; size2];
    let mut cost2_i = vec![0i64; size2];
    let mut cost2_path = vec![0i64; size2];

    let row_get = |rows: &[Option<Box<[i64]>>], idx: usize, w: usize| -> i64 {
        rows[idx].as_deref().map_or(0, |r| r[w])
    };

    for v in 0..size1 {
        let v_in_prel = it1.postr_to_prel_[v];
        let is_v_leaf = it1.is_leaf(v_in_prel);
        let parent_v_prel = it1.prel_to_parent_[v_in_prel];
        let size_v = it1.prel_to_size_[v_in_prel] as i64;
        let left_path_v = -(it1.prel_to_lld(v_in_prel) as i64 + 1);
        let right_path_v = it1.prel_to_rld(v_in_prel) as i64 + 1;
        let kr_sum_v = it1.prel_to_cost_left_[v_in_prel] as i64;
        let rev_kr_sum_v = it1.prel_to_cost_right_[v_in_prel] as i64;
        let desc_sum_v = it1.prel_to_cost_all_[v_in_prel] as i64;

        if is_v_leaf {
            strategy[v_in_prel * size2..(v_in_prel + 1) * size2].fill(v_in_prel as i64);
        }

        let parent_v_postr = if parent_v_prel >= 0 {
            it1.prel_to_postr_[parent_v_prel as usize]
        } else {
            usize::MAX
        };
        if parent_v_prel >= 0 && cost1_l[parent_v_postr].is_none() {
            let (l, r, i) = spare_rows.pop().unwrap_or_else(|| {
                (
                    vec![0i64; size2].into_boxed_slice(),
                    vec![0i64; size2].into_boxed_slice(),
                    vec![INNER_INIT; size2].into_boxed_slice(),
                )
            });
            cost1_l[parent_v_postr] = Some(l);
            cost1_r[parent_v_postr] = Some(r);
            cost1_i[parent_v_postr] = Some(i);
        }

        cost2_l.fill(0);
        cost2_r.fill(0);
        cost2_i.fill(INNER_INIT);
        cost2_path.fill(0);

        for w in 0..size2 {
            let w_in_prel = it2.postr_to_prel_[w];
            let parent_w_prel = it2.prel_to_parent_[w_in_prel];
            let parent_w_postr = if parent_w_prel >= 0 {
                it2.prel_to_postr_[parent_w_prel as usize]
            } else {
                usize::MAX
            };
            let size_w = it2.prel_to_size_[w_in_prel] as i64;
            if it2.is_leaf(w_in_prel) {
                cost2_l[w] = 0;
                cost2_r[w] = 0;
                cost2_i[w] = 0;
                cost2_path[w] = w_in_prel as i64;
            }

            let mut min_cost = i64::MAX;
            let mut strategy_path = -1i64;
            if size_v <= 1 || size_w <= 1 {
                min_cost = size_v.max(size_w);
            } else {
                let mut tmp =
                    size_v * it2.prel_to_cost_left_[w_in_prel] as i64 + row_get(&cost1_l, v, w);
                if tmp < min_cost {
                    min_cost = tmp;
                    strategy_path = left_path_v;
                }
                tmp = size_v * it2.prel_to_cost_right_[w_in_prel] as i64 + row_get(&cost1_r, v, w);
                if tmp < min_cost {
                    min_cost = tmp;
                    strategy_path = right_path_v;
                }
                tmp = size_v * it2.prel_to_cost_all_[w_in_prel] as i64 + row_get(&cost1_i, v, w);
                if tmp < min_cost {
                    min_cost = tmp;
                    strategy_path = strategy[v_in_prel * size2 + w_in_prel] + 1;
                }
                tmp = size_w * kr_sum_v + cost2_l[w];
                if tmp < min_cost {
                    min_cost = tmp;
                    strategy_path = -(it2.prel_to_lld(w_in_prel) as i64 + path_id_offset + 1);
                }
                tmp = size_w * rev_kr_sum_v + cost2_r[w];
                if tmp < min_cost {
                    min_cost = tmp;
                    strategy_path = it2.prel_to_rld(w_in_prel) as i64 + path_id_offset + 1;
                }
                tmp = size_w * desc_sum_v + cost2_i[w];
                if tmp < min_cost {
                    min_cost = tmp;
                    strategy_path = cost2_path[w] + path_id_offset + 1;
                }
            }

            if parent_v_prel >= 0 {
                let cost_l_v_w = row_get(&cost1_l, v, w);
                let cost_r_v_w = row_get(&cost1_r, v, w);
                let cost_i_v_w = row_get(&cost1_i, v, w);
                let pl = cost1_l[parent_v_postr].as_deref_mut().unwrap();
                pl[w] += min_cost;
                let parent_l_w = pl[w];
                let pi = cost1_i[parent_v_postr].as_deref_mut().unwrap();
                let tmp = -min_cost + cost_i_v_w;
                if tmp < pi[w] {
                    pi[w] = tmp;
                    strategy[parent_v_prel as usize * size2 + w_in_prel] =
                        strategy[v_in_prel * size2 + w_in_prel];
                }
                if it1.prel_to_type_left_[v_in_prel] {
                    let pi = cost1_i[parent_v_postr].as_deref_mut().unwrap();
                    pi[w] += parent_l_w;
                    let pl = cost1_l[parent_v_postr].as_deref_mut().unwrap();
                    pl[w] += cost_l_v_w - min_cost;
                }
                let pr = cost1_r[parent_v_postr].as_deref_mut().unwrap();
                if it1.prel_to_type_right_[v_in_prel] {
                    pr[w] += cost_r_v_w;
                } else {
                    pr[w] += min_cost;
                }
            }
            if parent_w_prel >= 0 {
                cost2_l[parent_w_postr] += min_cost;
                let tmp = -min_cost + cost2_i[w];
                if tmp < cost2_i[parent_w_postr] {
                    cost2_i[parent_w_postr] = tmp;
                    cost2_path[parent_w_postr] = cost2_path[w];
                }
                if it2.prel_to_type_left_[w_in_prel] {
                    cost2_i[parent_w_postr] += cost2_l[parent_w_postr];
                    cost2_l[parent_w_postr] += cost2_l[w] - min_cost;
                }
                if it2.prel_to_type_right_[w_in_prel] {
                    cost2_r[parent_w_postr] += cost2_r[w];
                } else {
                    cost2_r[parent_w_postr] += min_cost;
                }
            }
            strategy[v_in_prel * size2 + w_in_prel] = strategy_path;
        }

        if !is_v_leaf {
            let mut l = cost1_l[v].take().unwrap();
            let mut r = cost1_r[v].take().unwrap();
            let mut i = cost1_i[v].take().unwrap();
            l.fill(0);
            r.fill(0);
            i.fill(INNER_INIT);
            spare_rows.push((l, r, i));
        }
    }
    strategy
}

/// Left-path single path function: Zhang-Shasha over the keyroots of
/// the right-hand subtree. The left-hand subtree contributes only its
/// root because its off-path subtrees were handled by the recursion.
fn spf_l<C: CostModel>(
    f: &AptedIndex,
    g: &AptedIndex,
    froot: usize,
    groot: usize,
    swapped: bool,
    delta: &mut DeltaMatrix,
    costs: &C,
) -> f64 {
    let gsize = g.prel_to_size_[groot];
    let mut key_roots = vec![0usize; gsize];
    let first_key_root = compute_key_roots(g, groot, g.prel_to_lld(groot), &mut key_roots, 0);
    let fsize = f.prel_to_size_[froot];
    let mut forestdist = vec![vec![0.0f64; gsize + 1]; fsize + 1];
    let mut dist = 0.0;
    for i in (0..first_key_root).rev() {
        dist = tree_edit_dist(f, g, froot, key_roots[i], &mut forestdist, swapped, delta, costs);
    }
    dist
}

/// Collects the keyroots of the subtree: the root plus every node
/// hanging off a left path, recursively. Smaller keyroots end up later
/// in the array and are processed first.
fn compute_key_roots(
    g: &AptedIndex,
    subtree_root: usize,
    path_leaf: usize,
    key_roots: &mut [usize],
    mut index: usize,
) -> usize {
    key_roots[index] = subtree_root;
    index += 1;
    let mut path_node = path_leaf;
    while path_node > subtree_root {
        let parent = g.prel_to_parent_[path_node] as usize;
        for &child in &g.prel_to_children_[parent] {
            if child != path_node {
                index = compute_key_roots(g, child, g.prel_to_lld(child), key_roots, index);
            }
        }
        path_node = parent;
    }
    index
}

/// One forest-distance table between the left-hand subtree and one
/// keyroot subtree, postL indexed. Both-subtree cells park their value
/// in `delta` before the rename contribution is added.
#[allow(clippy::too_many_arguments)]
fn tree_edit_dist<C: CostModel>(
    f: &AptedIndex,
    g: &AptedIndex,
    fsub: usize,
    gsub: usize,
    forestdist: &mut [Vec<f64>],
    swapped: bool,
    delta: &mut DeltaMatrix,
    costs: &C,
) -> f64 {
    let i = f.prel_to_postl_[fsub];
    let j = g.prel_to_postl_[gsub];
    // Offsets shift the subtree's postL range into table coordinates.
    let ioff = f.postl_to_lld_[i] as i64 - 1;
    let joff = g.postl_to_lld_[j] as i64 - 1;
    let rows = (i as i64 - ioff) as usize;
    let cols = (j as i64 - joff) as usize;

    forestdist[0][0] = 0.0;
    for i1 in 1..=rows {
        let node = f.postl_to_label((i1 as i64 + ioff) as usize);
        forestdist[i1][0] = forestdist[i1 - 1][0]
            + if swapped { costs.ins(node) } else { costs.del(node) };
    }
    for j1 in 1..=cols {
        let node = g.postl_to_label((j1 as i64 + joff) as usize);
        forestdist[0][j1] = forestdist[0][j1 - 1]
            + if swapped { costs.del(node) } else { costs.ins(node) };
    }
    for i1 in 1..=rows {
        let fi = (i1 as i64 + ioff) as usize;
        let fnode = f.postl_to_label(fi);
        for j1 in 1..=cols {
            let gj = (j1 as i64 + joff) as usize;
            let gnode = g.postl_to_label(gj);
            let u = if swapped {
                costs.ren(gnode, fnode)
            } else {
                costs.ren(fnode, gnode)
            };
            let da = forestdist[i1 - 1][j1]
                + if swapped { costs.ins(fnode) } else { costs.del(fnode) };
            let db = forestdist[i1][j1 - 1]
                + if swapped { costs.del(gnode) } else { costs.ins(gnode) };
            let dc;
            if f.postl_to_lld_[fi] == f.postl_to_lld_[i] && g.postl_to_lld_[gj] == g.postl_to_lld_[j]
            {
                dc = forestdist[i1 - 1][j1 - 1] + u;
                delta.set(
                    swapped,
                    f.postl_to_prel_[fi],
                    g.postl_to_prel_[gj],
                    forestdist[i1 - 1][j1 - 1],
                );
            } else {
                dc = forestdist[(f.postl_to_lld_[fi] as i64 - 1 - ioff) as usize]
                    [(g.postl_to_lld_[gj] as i64 - 1 - joff) as usize]
                    + delta.get(swapped, f.postl_to_prel_[fi], g.postl_to_prel_[gj])
                    + u;
            }
            forestdist[i1][j1] = da.min(db).min(dc);
        }
    }
    forestdist[rows][cols]
}

/// Right-path mirror of `spf_l`, working in postR ids with rightmost
/// leaf descendants.
fn spf_r<C: CostModel>(
    f: &AptedIndex,
    g: &AptedIndex,
    froot: usize,
    groot: usize,
    swapped: bool,
    delta: &mut DeltaMatrix,
    costs: &C,
) -> f64 {
    let gsize = g.prel_to_size_[groot];
    let mut key_roots = vec![0usize; gsize];
    let first_key_root = compute_rev_key_roots(g, groot, g.prel_to_rld(groot), &mut key_roots, 0);
    let fsize = f.prel_to_size_[froot];
    let mut forestdist = vec![vec![0.0f64; gsize + 1]; fsize + 1];
    let mut dist = 0.0;
    for i in (0..first_key_root).rev() {
        dist = rev_tree_edit_dist(f, g, froot, key_roots[i], &mut forestdist, swapped, delta, costs);
    }
    dist
}

fn compute_rev_key_roots(
    g: &AptedIndex,
    subtree_root: usize,
    path_leaf: usize,
    key_roots: &mut [usize],
    mut index: usize,
) -> usize {
    key_roots[index] = subtree_root;
    index += 1;
    let mut path_node = path_leaf;
    while path_node > subtree_root {
        let parent = g.prel_to_parent_[path_node] as usize;
        for &child in &g.prel_to_children_[parent] {
            if child != path_node {
                index = compute_rev_key_roots(g, child, g.prel_to_rld(child), key_roots, index);
            }
        }
        path_node = parent;
    }
    index
}

#[allow(clippy::too_many_arguments)]
fn rev_tree_edit_dist<C: CostModel>(
    f: &AptedIndex,
    g: &AptedIndex,
    fsub: usize,
    gsub: usize,
    forestdist: &mut [Vec<f64>],
    swapped: bool,
    delta: &mut DeltaMatrix,
    costs: &C,
) -> f64 {
    let i = f.prel_to_postr_[fsub];
    let j = g.prel_to_postr_[gsub];
    let ioff = f.postr_to_rld_[i] as i64 - 1;
    let joff = g.postr_to_rld_[j] as i64 - 1;
    let rows = (i as i64 - ioff) as usize;
    let cols = (j as i64 - joff) as usize;

    forestdist[0][0] = 0.0;
    for i1 in 1..=rows {
        let node = f.postr_to_label((i1 as i64 + ioff) as usize);
        forestdist[i1][0] = forestdist[i1 - 1][0]
            + if swapped { costs.ins(node) } else { costs.del(node) };
    }
    for j1 in 1..=cols {
        let node = g.postr_to_label((j1 as i64 + joff) as usize);
        forestdist[0][j1] = forestdist[0][j1 - 1]
            + if swapped { costs.del(node) } else { costs.ins(node) };
    }
    for i1 in 1..=rows {
        let fi = (i1 as i64 + ioff) as usize;
        let fnode = f.postr_to_label(fi);
        for j1 in 1..=cols {
            let gj = (j1 as i64 + joff) as usize;
            let gnode = g.postr_to_label(gj);
            let u = if swapped {
                costs.ren(gnode, fnode)
            } else {
                costs.ren(fnode, gnode)
            };
            let da = forestdist[i1 - 1][j1]
                + if swapped { costs.ins(fnode) } else { costs.del(fnode) };
            let db = forestdist[i1][j1 - 1]
                + if swapped { costs.del(gnode) } else { costs.ins(gnode) };
            let dc;
            if f.postr_to_rld_[fi] == f.postr_to_rld_[i] && g.postr_to_rld_[gj] == g.postr_to_rld_[j]
            {
                dc = forestdist[i1 - 1][j1 - 1] + u;
                delta.set(
                    swapped,
                    f.postr_to_prel_[fi],
                    g.postr_to_prel_[gj],
                    forestdist[i1 - 1][j1 - 1],
                );
            } else {
                dc = forestdist[(f.postr_to_rld_[fi] as i64 - 1 - ioff) as usize]
                    [(g.postr_to_rld_[gj] as i64 - 1 - joff) as usize]
                    + delta.get(swapped, f.postr_to_prel_[fi], g.postr_to_prel_[gj])
                    + u;
            }
            forestdist[i1][j1] = da.min(db).min(dc);
        }
    }
    forestdist[rows][cols]
}

/// Inner-path single path function. Climbs the strategy path; per step
/// a left block grows the forest with nodes left of the path (columns
/// are right boundaries of G in preR) and a mirrored right block with
/// nodes right of the path (columns are left boundaries in preL). The
/// `t_read` table carries distances of the previous forest milestone to
/// every G forest; each block writes the next milestone into `t_write`
/// and the tables swap, so subtree-jump reads never see a half-updated
/// milestone. `q` bridges adjacent G columns at parent boundaries.
/// Boundary ids whose node lies outside the scanned forest are skipped
/// by a direct scan; `next_real` resolves subtree jumps to the
/// canonical visited cell.
#[allow(clippy::too_many_arguments)]
fn spf_a<C: CostModel>(
    f: &AptedIndex,
    g: &AptedIndex,
    froot: usize,
    groot: usize,
    path_leaf: usize,
    swapped: bool,
    delta: &mut DeltaMatrix,
    q: &mut [f64],
    costs: &C,
) -> f64 {
    let fsub = f.prel_to_size_[froot];
    let gsub = g.prel_to_size_[groot];
    let g0 = groot;
    let gr0 = g.prel_to_prer_[groot];

    let del_op = |n: LabelId| if swapped { costs.ins(n) } else { costs.del(n) };
    let ins_op = |n: LabelId| if swapped { costs.del(n) } else { costs.ins(n) };
    let ren_op = |fn_: LabelId, gn: LabelId| {
        if swapped {
            costs.ren(gn, fn_)
        } else {
            costs.ren(fn_, gn)
        }
    };
    let sum_del_f = |i: usize| {
        if swapped {
            f.prel_to_sum_ins_cost_[i]
        } else {
            f.prel_to_sum_del_cost_[i]
        }
    };
    let sum_ins_g = |i: usize| {
        if swapped {
            g.prel_to_sum_del_cost_[i]
        } else {
            g.prel_to_sum_ins_cost_[i]
        }
    };

    let mut s = vec![vec![0.0f64; gsub + 1]; fsub + 1];
    let mut t_read = vec![vec![0.0f64; gsub + 1]; gsub + 1];
    let mut t_write = vec![vec![0.0f64; gsub + 1]; gsub + 1];
    let mut next_real = vec![0usize; gsub + 2];

    let mut start_path_node: i64 = -1;
    let mut end_path_node = path_leaf as i64;
    // Delete-cost of the forest accumulated below the current path node.
    let mut forest_cost = 0.0f64;

    while end_path_node >= froot as i64 {
        let e = end_path_node as usize;
        let e_in_prer = f.prel_to_prer_[e];
        let start_in_prer = if start_path_node >= 0 {
            f.prel_to_prer_[start_path_node as usize] as i64
        } else {
            i64::MAX
        };
        let left_part = start_path_node - end_path_node > 1;
        let right_part = start_path_node >= 0 && start_in_prer - e_in_prer as i64 > 1;

        // Nodes to the left of the path; owns the tree row when no
        // right part exists for this step.
        if left_part {
            let lf_first = start_path_node - 1;
            let lf_last = if right_part {
                end_path_node + 1
            } else {
                end_path_node
            };
            let base_cost = forest_cost;

            for rg in (gr0..gr0 + gsub).rev() {
                let rg_in_prel = g.prer_to_prel_[rg];
                let lg_first = rg_in_prel;
                let lg_last = if lg_first == g0 { g0 } else { g0 + 1 };
                let parent_rg = g.prel_to_parent_[rg_in_prel];
                let parent_boundary =
                    rg > gr0 && parent_rg >= 0 && g.prer_to_prel_[rg - 1] == parent_rg as usize;

                next_real[lg_first - g0] = lg_first;
                for x in (lg_last..lg_first).rev() {
                    next_real[x - g0] = if g.prel_to_prer_[x] >= rg {
                        x
                    } else {
                        next_real[x + 1 - g0]
                    };
                }

                let mut cost1 = base_cost;
                let mut row_lf = lf_first;
                while row_lf >= lf_last {
                    let row_node = row_lf as usize;
                    let row_is_tree = row_lf == end_path_node;
                    let row_idx = (row_lf - end_path_node) as usize;
                    let fl = f.prel_to_label_[row_node];
                    cost1 += del_op(fl);

                    let mut cost2 = sum_ins_g(lg_first) - ins_op(g.prel_to_label_[lg_first]);
                    let mut lg = lg_first as i64;
                    while lg >= lg_last as i64 {
                        let lgu = lg as usize;
                        if lgu != lg_first && g.prel_to_prer_[lgu] < rg {
                            lg -= 1;
                            continue;
                        }
                        let gl = g.prel_to_label_[lgu];
                        cost2 += ins_op(gl);
                        let col = lgu - g0;
                        let rcol = rg - gr0;

                        let sp1_base = if row_lf + 1 == start_path_node {
                            t_read[col][rcol]
                        } else {
                            s[row_idx + 1][col]
                        };
                        let sp2_base = if lgu == lg_first {
                            if g.prel_to_size_[lgu] == 1 {
                                cost1
                            } else {
                                q[row_node]
                            }
                        } else {
                            s[row_idx][next_real[lgu + 1 - g0] - g0]
                        };
                        let sp3_forest = if row_is_tree {
                            cost2 - sum_ins_g(lgu)
                        } else if lgu == lg_first {
                            cost1 - sum_del_f(row_node)
                        } else {
                            let jump = next_real[lgu + g.prel_to_size_[lgu] - g0] - g0;
                            if row_lf + f.prel_to_size_[row_node] as i64 == start_path_node {
                                t_read[jump][rcol]
                            } else {
                                s[row_idx + f.prel_to_size_[row_node]][jump]
                            }
                        };
                        let sp1 = sp1_base + del_op(fl);
                        let sp2 = sp2_base + ins_op(gl);
                        let sp3 = sp3_forest + delta.get(swapped, row_node, lgu) + ren_op(fl, gl);
                        let cell = sp1.min(sp2).min(sp3);
                        s[row_idx][col] = cell;

                        if parent_boundary && lgu == parent_rg as usize + 1 {
                            q[row_node] = cell;
                            if row_is_tree {
                                delta.set(swapped, e, parent_rg as usize, sp1_base);
                            }
                        }
                        if row_lf == lf_last {
                            t_write[col][rcol] = cell;
                        }
                        lg -= 1;
                    }
                    row_lf -= 1;
                }
            }
            std::mem::swap(&mut t_read, &mut t_write);
        }

        // Nodes to the right of the path plus the path node itself;
        // also the sole block for leaf and only-child steps.
        if right_part || !left_part {
            let rf_first = if start_path_node < 0 {
                e_in_prer as i64
            } else {
                start_in_prer - 1
            };
            let rf_last = e_in_prer as i64;
            let mut base_cost = forest_cost;
            if left_part {
                for lf in (e + 1)..start_path_node as usize {
                    base_cost += del_op(f.prel_to_label_[lf]);
                }
            }

            for lg_col in (g0..g0 + gsub).rev() {
                let rg_first = g.prel_to_prer_[lg_col];
                let rg_last = if lg_col == g0 { gr0 } else { gr0 + 1 };
                let parent_lg = g.prel_to_parent_[lg_col];
                let parent_boundary = lg_col > g0 && parent_lg >= 0 && lg_col - 1 == parent_lg as usize;

                next_real[rg_first - gr0] = rg_first;
                for x in (rg_last..rg_first).rev() {
                    next_real[x - gr0] = if g.prer_to_prel_[x] >= lg_col {
                        x
                    } else {
                        next_real[x + 1 - gr0]
                    };
                }

                let mut cost1 = base_cost;
                let mut row_rf = rf_first;
                while row_rf >= rf_last {
                    let row_node = f.prer_to_prel_[row_rf as usize];
                    let row_is_tree = row_rf == rf_last;
                    let row_idx = (row_rf - rf_last) as usize;
                    let fl = f.prel_to_label_[row_node];
                    cost1 += del_op(fl);

                    let mut cost2 = sum_ins_g(lg_col) - ins_op(g.prel_to_label_[lg_col]);
                    let mut rg = rg_first as i64;
                    while rg >= rg_last as i64 {
                        let rgu = rg as usize;
                        let rg_node = g.prer_to_prel_[rgu];
                        if rgu != rg_first && rg_node < lg_col {
                            rg -= 1;
                            continue;
                        }
                        let gl = g.prel_to_label_[rg_node];
                        cost2 += ins_op(gl);
                        let col = lg_col - g0;
                        let rcol = rgu - gr0;

                        let sp1_base = if row_rf + 1 == start_in_prer {
                            t_read[col][rcol]
                        } else if start_path_node < 0 {
                            cost2
                        } else {
                            s[row_idx + 1][rcol]
                        };
                        let sp2_base = if rgu == rg_first {
                            if g.prel_to_size_[lg_col] == 1 {
                                cost1
                            } else {
                                q[row_rf as usize]
                            }
                        } else {
                            s[row_idx][next_real[rgu + 1 - gr0] - gr0]
                        };
                        let sp3_forest = if row_is_tree {
                            cost2 - sum_ins_g(rg_node)
                        } else if rgu == rg_first {
                            cost1 - sum_del_f(row_node)
                        } else {
                            let jump = next_real[rgu + g.prel_to_size_[rg_node] - gr0] - gr0;
                            if row_rf + f.prel_to_size_[row_node] as i64 == start_in_prer {
                                t_read[col][jump]
                            } else {
                                s[row_idx + f.prel_to_size_[row_node]][jump]
                            }
                        };
                        let sp1 = sp1_base + del_op(fl);
                        let sp2 = sp2_base + ins_op(gl);
                        let sp3 = sp3_forest + delta.get(swapped, row_node, rg_node) + ren_op(fl, gl);
                        let cell = sp1.min(sp2).min(sp3);
                        s[row_idx][rcol] = cell;

                        if parent_boundary && rgu == g.prel_to_prer_[parent_lg as usize] + 1 {
                            q[row_rf as usize] = cell;
                            if row_is_tree {
                                delta.set(swapped, e, parent_lg as usize, sp1_base);
                            }
                        }
                        if row_is_tree {
                            t_write[col][rcol] = cell;
                        }
                        rg -= 1;
                    }
                    row_rf -= 1;
                }
            }
            std::mem::swap(&mut t_read, &mut t_write);
        }

        forest_cost = sum_del_f(e);
        start_path_node = end_path_node;
        end_path_node = f.prel_to_parent_[e];
    }

    t_read[0][0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::{FixedCostModel, UnitCostModel};
    use crate::parsing::{parse_single, LabelDict};
    use crate::ted::all_mappings::AllMappingsTed;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn unit_ted(s1: &str, s2: &str) -> f64 {
        let mut ld = LabelDict::default();
        let t1 = parse_single(s1.to_owned(), &mut ld);
        let t2 = parse_single(s2.to_owned(), &mut ld);
        Apted::new(UnitCostModel)
            .compute_edit_distance(&t1, &t2)
            .unwrap()
    }

    fn grow(rng: &mut Xoshiro256PlusPlus, remaining: &mut usize, alphabet: u8, out: &mut String) {
        *remaining -= 1;
        out.push('{');
        out.push((b'a' + rng.gen_range(0..alphabet)) as char);
        while *remaining > 0 && rng.gen_bool(0.6) {
            grow(rng, remaining, alphabet, out);
        }
        out.push('}');
    }

    fn random_tree(rng: &mut Xoshiro256PlusPlus, max_nodes: usize, alphabet: u8) -> String {
        let mut remaining = rng.gen_range(1..=max_nodes);
        let mut out = String::new();
        grow(rng, &mut remaining, alphabet, &mut out);
        out
    }

    #[test]
    fn test_known_distances() {
        assert_eq!(unit_ted("{a}", "{a}"), 0.0);
        assert_eq!(unit_ted("{a}", "{b}"), 1.0);
        // Sibling order matters: a swap costs two renames.
        assert_eq!(unit_ted("{a{b}{c}}", "{a{c}{b}}"), 2.0);
        assert_eq!(unit_ted("{f{d{a}{c{b}}}{e}}", "{f{c{d{a}{b}}}{e}}"), 2.0);
        // Pulling c out of b needs a delete and an insert.
        assert_eq!(unit_ted("{a{b{c}}}", "{a{b}{c}}"), 2.0);
        assert_eq!(unit_ted("{r{a}{b}{c}{d}}", "{r}"), 4.0);
    }

    #[test]
    fn test_asymmetric_sizes() {
        assert_eq!(unit_ted("{a}", "{a{b}{c}}"), 2.0);
        assert_eq!(unit_ted("{a{b}{c}}", "{a}"), 2.0);
        assert_eq!(unit_ted("{x}", "{a{b}{c}}"), 3.0);
    }

    #[test]
    fn test_spine_trees() {
        let depth = 60;
        let spine: String = "{a".repeat(depth) + &"}".repeat(depth);
        assert_eq!(unit_ted(&spine, &spine), 0.0);
        let other: String = "{b".repeat(depth) + &"}".repeat(depth);
        assert_eq!(unit_ted(&spine, &other), depth as f64);
    }

    #[test]
    fn test_empty_tree_is_rejected() {
        let mut ld = LabelDict::default();
        let t1 = parse_single("{a}".to_owned(), &mut ld);
        let empty = ParsedTree::new();
        assert!(matches!(
            Apted::new(UnitCostModel).compute_edit_distance(&t1, &empty),
            Err(TedError::EmptyTree)
        ));
    }

    #[test]
    fn test_invalid_ren_cost_is_rejected() {
        struct BadRen;
        impl CostModel for BadRen {
            fn del(&self, _n: LabelId) -> f64 {
                1.0
            }
            fn ins(&self, _n: LabelId) -> f64 {
                1.0
            }
            fn ren(&self, n1: LabelId, n2: LabelId) -> f64 {
                if n1 == n2 {
                    0.0
                } else {
                    f64::NAN
                }
            }
        }
        let mut ld = LabelDict::default();
        let t1 = parse_single("{a{b}}".to_owned(), &mut ld);
        let t2 = parse_single("{a{c}}".to_owned(), &mut ld);
        assert!(matches!(
            Apted::new(BadRen).compute_edit_distance(&t1, &t2),
            Err(TedError::InvalidCostModel(_))
        ));
    }

    #[test]
    fn test_fixed_cost_classical_example() {
        let mut ld = LabelDict::default();
        let t1 = parse_single("{f{d{a}{c{b}}}{e}}".to_owned(), &mut ld);
        let t2 = parse_single("{f{c{d{a}{b}}}{e}}".to_owned(), &mut ld);
        let costs = FixedCostModel::new(0.4, 0.4, 0.6);
        let dist = Apted::new(costs).compute_edit_distance(&t1, &t2).unwrap();
        let oracle = AllMappingsTed::default().ted(&t1, &t2, &costs).unwrap();
        assert!((dist - oracle).abs() < 1e-4, "apted {dist} vs oracle {oracle}");
        assert!((dist - 0.8).abs() < 1e-4);
    }

    #[test]
    fn test_single_node_tree_with_expensive_renames() {
        // Renames dearer than the other subtree's whole insert sum: the
        // best mapping still pays one rename plus the leftover inserts,
        // never less.
        let mut ld = LabelDict::default();
        let single = parse_single("{a}".to_owned(), &mut ld);
        let pair = parse_single("{p{q}}".to_owned(), &mut ld);

        let costs = FixedCostModel::new(1.0, 0.1, 0.5);
        let dist = Apted::new(costs).compute_edit_distance(&single, &pair).unwrap();
        let oracle = AllMappingsTed::default().ted(&single, &pair, &costs).unwrap();
        assert!((dist - 0.6).abs() < 1e-9, "got {dist}");
        assert!((dist - oracle).abs() < 1e-9);

        let costs = FixedCostModel::new(0.1, 1.0, 0.5);
        let dist = Apted::new(costs).compute_edit_distance(&pair, &single).unwrap();
        let oracle = AllMappingsTed::default().ted(&pair, &single, &costs).unwrap();
        assert!((dist - 0.6).abs() < 1e-9, "got {dist}");
        assert!((dist - oracle).abs() < 1e-9);
    }

    #[test]
    fn test_forced_spf_matches_full_computation() {
        let cases = [
            ("{f{d{a}{c{b}}}{e}}", "{f{c{d{a}{b}}}{e}}"),
            ("{a{b}{c}}", "{a{c}{b}}"),
            ("{r{a}{m{b{x}{y}}{c{u}{v}}{d}}{z}}", "{r{m{b{x}{v}}{c{u}}{d{w}}}{z{q}}}"),
            ("{a{b{d}{e}{f}}{c}}", "{x{b{d}{f}}{c{g}}}"),
        ];
        for (s1, s2) in cases {
            let mut ld = LabelDict::default();
            let t1 = parse_single(s1.to_owned(), &mut ld);
            let t2 = parse_single(s2.to_owned(), &mut ld);
            let mut apted = Apted::new(UnitCostModel);
            let full = apted.compute_edit_distance(&t1, &t2).unwrap();
            let left = apted
                .compute_edit_distance_spf_test(&t1, &t2, SpfKind::Left)
                .unwrap();
            let right = apted
                .compute_edit_distance_spf_test(&t1, &t2, SpfKind::Right)
                .unwrap();
            assert_eq!(full, left, "left spf mismatch for {s1} vs {s2}");
            assert_eq!(full, right, "right spf mismatch for {s1} vs {s2}");
        }
    }

    #[test]
    fn test_forced_spf_matches_full_computation_random() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0x5eed);
        for _ in 0..120 {
            let s1 = random_tree(&mut rng, 25, 4);
            let s2 = random_tree(&mut rng, 25, 4);
            let mut ld = LabelDict::default();
            let t1 = parse_single(s1.clone(), &mut ld);
            let t2 = parse_single(s2.clone(), &mut ld);
            let mut apted = Apted::new(UnitCostModel);
            let full = apted.compute_edit_distance(&t1, &t2).unwrap();
            let left = apted
                .compute_edit_distance_spf_test(&t1, &t2, SpfKind::Left)
                .unwrap();
            let right = apted
                .compute_edit_distance_spf_test(&t1, &t2, SpfKind::Right)
                .unwrap();
            assert_eq!(full, left, "left spf mismatch for {s1} vs {s2}");
            assert_eq!(full, right, "right spf mismatch for {s1} vs {s2}");
        }
    }

    #[test]
    fn test_oracle_agreement_on_small_trees() {
        let oracle = AllMappingsTed::default();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0xdead);
        for round in 0..80 {
            let s1 = random_tree(&mut rng, 7, 3);
            let s2 = random_tree(&mut rng, 7, 3);
            let mut ld = LabelDict::default();
            let t1 = parse_single(s1.clone(), &mut ld);
            let t2 = parse_single(s2.clone(), &mut ld);

            let unit = Apted::new(UnitCostModel)
                .compute_edit_distance(&t1, &t2)
                .unwrap();
            let unit_oracle = oracle.ted(&t1, &t2, &UnitCostModel).unwrap();
            assert_eq!(unit, unit_oracle, "round {round}: {s1} vs {s2}");

            let costs = FixedCostModel::new(0.4, 0.7, 0.6);
            let fixed = Apted::new(costs).compute_edit_distance(&t1, &t2).unwrap();
            let fixed_oracle = oracle.ted(&t1, &t2, &costs).unwrap();
            assert!(
                (fixed - fixed_oracle).abs() < 1e-4,
                "round {round}: {s1} vs {s2}: {fixed} vs {fixed_oracle}"
            );
        }
    }

    #[test]
    fn test_distance_properties() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        for _ in 0..60 {
            let s1 = random_tree(&mut rng, 14, 3);
            let s2 = random_tree(&mut rng, 14, 3);
            let mut ld = LabelDict::default();
            let t1 = parse_single(s1.clone(), &mut ld);
            let t2 = parse_single(s2.clone(), &mut ld);

            let forward = Apted::new(UnitCostModel)
                .compute_edit_distance(&t1, &t2)
                .unwrap();
            assert!(forward >= 0.0);
            let backward = Apted::new(UnitCostModel)
                .compute_edit_distance(&t2, &t1)
                .unwrap();
            assert_eq!(forward, backward, "unit symmetry for {s1} vs {s2}");

            let identity = Apted::new(UnitCostModel)
                .compute_edit_distance(&t1, &t1)
                .unwrap();
            assert_eq!(identity, 0.0);
        }
    }

    #[test]
    fn test_cost_swap_symmetry() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        for _ in 0..40 {
            let s1 = random_tree(&mut rng, 12, 3);
            let s2 = random_tree(&mut rng, 12, 3);
            let mut ld = LabelDict::default();
            let t1 = parse_single(s1.clone(), &mut ld);
            let t2 = parse_single(s2.clone(), &mut ld);

            let forward = Apted::new(FixedCostModel::new(0.3, 0.7, 0.5))
                .compute_edit_distance(&t1, &t2)
                .unwrap();
            let swapped = Apted::new(FixedCostModel::new(0.7, 0.3, 0.5))
                .compute_edit_distance(&t2, &t1)
                .unwrap();
            assert!(
                (forward - swapped).abs() < 1e-9,
                "cost swap symmetry for {s1} vs {s2}"
            );
        }
    }
}
