use crate::cost::{is_valid_cost, CostModel};
use crate::parsing::{LabelId, ParsedTree};
use crate::ted::TedError;
use indextree::NodeId;

#[derive(Debug)]
pub struct ConstantsIndex {
    pub tree_size: usize,
}

/// Flat index battery for one input tree, addressed by left-to-right
/// preorder ids with bijections into the three other traversals. Every
/// query the distance computation needs is O(1) array access.
///
/// Naming: `prel` = left-to-right preorder, `prer` = right-to-left
/// preorder, `postl` = left-to-right postorder, `postr` = right-to-left
/// postorder.
#[derive(Debug)]
pub struct AptedIndex {
    pub c: ConstantsIndex,
    pub prel_to_label_: Vec<LabelId>,
    pub prel_to_size_: Vec<usize>,
    /// Parent preL id, -1 at the root.
    pub prel_to_parent_: Vec<i64>,
    pub prel_to_children_: Vec<Vec<usize>>,
    /// True iff the node is the first child of its parent.
    pub prel_to_type_left_: Vec<bool>,
    /// True iff the node is the last child of its parent.
    pub prel_to_type_right_: Vec<bool>,
    pub prel_to_prer_: Vec<usize>,
    pub prer_to_prel_: Vec<usize>,
    pub prel_to_postl_: Vec<usize>,
    pub postl_to_prel_: Vec<usize>,
    pub prel_to_postr_: Vec<usize>,
    pub postr_to_prel_: Vec<usize>,
    /// postL id of the leftmost leaf descendant, indexed by postL id.
    pub postl_to_lld_: Vec<usize>,
    /// postR id of the rightmost leaf descendant, indexed by postR id.
    pub postr_to_rld_: Vec<usize>,
    /// First leaf to the left in preL order, -1 when there is none.
    pub prel_to_ln_: Vec<i64>,
    /// First leaf to the left in preR order, -1 when there is none.
    pub prer_to_ln_: Vec<i64>,
    /// Path-weight sum for left-path decomposition (krSum).
    pub prel_to_cost_left_: Vec<usize>,
    /// Path-weight sum for right-path decomposition (revKrSum).
    pub prel_to_cost_right_: Vec<usize>,
    /// Path-weight sum for inner-path decomposition (descSum).
    pub prel_to_cost_all_: Vec<usize>,
    pub prel_to_sum_del_cost_: Vec<f64>,
    pub prel_to_sum_ins_cost_: Vec<f64>,
    /// Number of leaves that are first children.
    pub lchl: usize,
    /// Number of leaves that are last children.
    pub rchl: usize,
}

struct SubtreeSummary {
    size: usize,
    /// Sum of subtree sizes over all nodes of this subtree.
    desc_sizes: usize,
    kr_sum: usize,
    rev_kr_sum: usize,
}

impl AptedIndex {
    pub fn index_tree(tree: &ParsedTree, costs: &impl CostModel) -> Result<Self, TedError> {
        let n = tree.count();
        if n == 0 {
            return Err(TedError::EmptyTree);
        }
        let Some(root) = tree.iter().next() else {
            return Err(TedError::EmptyTree);
        };
        let root_id = tree.get_node_id(root).unwrap();

        let mut idx = AptedIndex {
            c: ConstantsIndex { tree_size: n },
            prel_to_label_: vec![0; n],
            prel_to_size_: vec![0; n],
            prel_to_parent_: vec![-1; n],
            prel_to_children_: vec![Vec::new(); n],
            prel_to_type_left_: vec![false; n],
            prel_to_type_right_: vec![false; n],
            prel_to_prer_: vec![0; n],
            prer_to_prel_: vec![0; n],
            prel_to_postl_: vec![0; n],
            postl_to_prel_: vec![0; n],
            prel_to_postr_: vec![0; n],
            postr_to_prel_: vec![0; n],
            postl_to_lld_: vec![0; n],
            postr_to_rld_: vec![0; n],
            prel_to_ln_: vec![-1; n],
            prer_to_ln_: vec![-1; n],
            prel_to_cost_left_: vec![0; n],
            prel_to_cost_right_: vec![0; n],
            prel_to_cost_all_: vec![0; n],
            prel_to_sum_del_cost_: vec![0.0; n],
            prel_to_sum_ins_cost_: vec![0.0; n],
            lchl: 0,
            rchl: 0,
        };

        let mut next_prel = 0usize;
        let mut next_postl = 0usize;
        index_nodes(root_id, tree, &mut idx, &mut next_prel, &mut next_postl);
        idx.post_traversal_indexing(costs)?;

        Ok(idx)
    }

    /// Fills the arrays that need completed preorder ids: leaf
    /// descendants, leaf-to-the-left links, leaf-kind counters and the
    /// bottom-up cost sums. Cost validity is checked here, on first
    /// observation of each node's delete and insert cost.
    fn post_traversal_indexing(&mut self, costs: &impl CostModel) -> Result<(), TedError> {
        let n = self.c.tree_size;

        for j in 0..n {
            let i = self.postl_to_prel_[j];
            self.postl_to_lld_[j] = if self.is_leaf(i) {
                j
            } else {
                self.postl_to_lld_[self.prel_to_postl_[self.prel_to_children_[i][0]]]
            };
        }
        for j in 0..n {
            let i = self.postr_to_prel_[j];
            self.postr_to_rld_[j] = if self.is_leaf(i) {
                j
            } else {
                self.postr_to_rld_[self.prel_to_postr_[*self.prel_to_children_[i].last().unwrap()]]
            };
        }

        let mut current_leaf = -1i64;
        for i in 0..n {
            self.prel_to_ln_[i] = current_leaf;
            if self.is_leaf(i) {
                current_leaf = i as i64;
            }
        }
        current_leaf = -1;
        for i in 0..n {
            self.prer_to_ln_[i] = current_leaf;
            if self.is_leaf(self.prer_to_prel_[i]) {
                current_leaf = i as i64;
            }
        }

        for i in 0..n {
            let parent = self.prel_to_parent_[i];
            if self.is_leaf(i) && parent >= 0 {
                let parent = parent as usize;
                if i == parent + 1 {
                    self.lchl += 1;
                }
                if self.prel_to_prer_[i] == self.prel_to_prer_[parent] + 1 {
                    self.rchl += 1;
                }
            }
        }

        for x in (0..n).rev() {
            let del = costs.del(self.prel_to_label_[x]);
            let ins = costs.ins(self.prel_to_label_[x]);
            if !is_valid_cost(del) {
                return Err(TedError::InvalidCostModel(del));
            }
            if !is_valid_cost(ins) {
                return Err(TedError::InvalidCostModel(ins));
            }
            self.prel_to_sum_del_cost_[x] += del;
            self.prel_to_sum_ins_cost_[x] += ins;
            let parent = self.prel_to_parent_[x];
            if parent >= 0 {
                self.prel_to_sum_del_cost_[parent as usize] += self.prel_to_sum_del_cost_[x];
                self.prel_to_sum_ins_cost_[parent as usize] += self.prel_to_sum_ins_cost_[x];
            }
        }

        Ok(())
    }

    pub fn size(&self) -> usize {
        self.c.tree_size
    }

    pub fn is_leaf(&self, prel: usize) -> bool {
        self.prel_to_size_[prel] == 1
    }

    /// preL id of the leftmost leaf descendant of `prel`.
    pub fn prel_to_lld(&self, prel: usize) -> usize {
        self.prer_to_prel_[self.prel_to_prer_[prel] + self.prel_to_size_[prel] - 1]
    }

    /// preL id of the rightmost leaf descendant of `prel`.
    pub fn prel_to_rld(&self, prel: usize) -> usize {
        prel + self.prel_to_size_[prel] - 1
    }

    pub fn postl_to_label(&self, postl: usize) -> LabelId {
        self.prel_to_label_[self.postl_to_prel_[postl]]
    }

    pub fn postr_to_label(&self, postr: usize) -> LabelId {
        self.prel_to_label_[self.postr_to_prel_[postr]]
    }
}

fn index_nodes(
    nid: NodeId,
    tree: &ParsedTree,
    idx: &mut AptedIndex,
    next_prel: &mut usize,
    next_postl: &mut usize,
) -> SubtreeSummary {
    let n = idx.c.tree_size;
    let prel = *next_prel;
    *next_prel += 1;
    idx.prel_to_label_[prel] = *tree.get(nid).unwrap().get();

    let mut size = 1usize;
    let mut desc_sizes = 0usize;
    let mut kr_sum = 0usize;
    let mut rev_kr_sum = 0usize;

    let children: Vec<NodeId> = nid.children(tree).collect();
    for (pos, cnid) in children.iter().enumerate() {
        let child_prel = *next_prel;
        idx.prel_to_parent_[child_prel] = prel as i64;
        idx.prel_to_children_[prel].push(child_prel);
        let summary = index_nodes(*cnid, tree, idx, next_prel, next_postl);

        size += summary.size;
        desc_sizes += summary.desc_sizes;
        // A non-first child starts a fresh left path, a non-last child a
        // fresh right path; their whole subtrees count into the sums.
        if pos == 0 {
            idx.prel_to_type_left_[child_prel] = true;
            kr_sum += summary.kr_sum - summary.size;
        } else {
            kr_sum += summary.kr_sum;
        }
        if pos == children.len() - 1 {
            idx.prel_to_type_right_[child_prel] = true;
            rev_kr_sum += summary.rev_kr_sum - summary.size;
        } else {
            rev_kr_sum += summary.rev_kr_sum;
        }
    }

    let postl = *next_postl;
    *next_postl += 1;

    idx.prel_to_size_[prel] = size;
    idx.prel_to_postl_[prel] = postl;
    idx.postl_to_prel_[postl] = prel;
    let prer = n - 1 - postl;
    idx.prel_to_prer_[prel] = prer;
    idx.prer_to_prel_[prer] = prel;
    let postr = n - 1 - prel;
    idx.prel_to_postr_[prel] = postr;
    idx.postr_to_prel_[postr] = prel;

    let desc_sizes = desc_sizes + size;
    idx.prel_to_cost_all_[prel] = (size * (size + 3)) / 2 - desc_sizes;
    idx.prel_to_cost_left_[prel] = kr_sum + size;
    idx.prel_to_cost_right_[prel] = rev_kr_sum + size;

    SubtreeSummary {
        size,
        desc_sizes,
        kr_sum: kr_sum + size,
        rev_kr_sum: rev_kr_sum + size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::UnitCostModel;
    use crate::parsing::{parse_single, LabelDict};

    fn index(input: &str) -> AptedIndex {
        let mut ld = LabelDict::default();
        let tree = parse_single(input.to_owned(), &mut ld);
        AptedIndex::index_tree(&tree, &UnitCostModel).unwrap()
    }

    #[test]
    fn test_basic_arrays() {
        // 1 has children 2, 3, 4; 2 -> (5, 6); 3 -> (7); 4 -> (8, 9).
        let idx = index("{1{2{5}{6}}{3{7}}{4{8}{9}}}");

        assert_eq!(idx.size(), 9);
        assert_eq!(idx.prel_to_size_, vec![9, 3, 1, 1, 2, 1, 3, 1, 1]);
        assert_eq!(idx.prel_to_parent_, vec![-1, 0, 1, 1, 0, 4, 0, 6, 6]);
        assert_eq!(idx.prel_to_children_[0], vec![1, 4, 6]);
        assert_eq!(idx.prel_to_children_[1], vec![2, 3]);
        assert_eq!(idx.prel_to_postl_, vec![8, 2, 0, 1, 4, 3, 7, 5, 6]);
        assert_eq!(idx.prel_to_prer_, vec![0, 6, 8, 7, 4, 5, 1, 3, 2]);
        assert_eq!(idx.prel_to_postr_, vec![8, 7, 6, 5, 4, 3, 2, 1, 0]);
    }

    #[test]
    fn test_node_types() {
        let idx = index("{1{2{5}{6}}{3{7}}{4{8}{9}}}");
        let left: Vec<usize> = (0..9).filter(|i| idx.prel_to_type_left_[*i]).collect();
        let right: Vec<usize> = (0..9).filter(|i| idx.prel_to_type_right_[*i]).collect();
        assert_eq!(left, vec![1, 2, 5, 7]);
        assert_eq!(right, vec![3, 5, 6, 8]);
    }

    #[test]
    fn test_leaf_descendants() {
        let idx = index("{1{2{5}{6}}{3{7}}{4{8}{9}}}");
        assert_eq!(idx.postl_to_lld_, vec![0, 1, 0, 3, 3, 5, 6, 5, 0]);
        assert_eq!(idx.postr_to_rld_, vec![0, 1, 0, 3, 3, 5, 6, 5, 0]);
        // Leftmost/rightmost leaves straight from preL ids.
        assert_eq!(idx.prel_to_lld(0), 2);
        assert_eq!(idx.prel_to_rld(0), 8);
        assert_eq!(idx.prel_to_lld(6), 7);
        assert_eq!(idx.prel_to_rld(6), 8);
    }

    #[test]
    fn test_leaf_to_the_left_links() {
        let idx = index("{1{2{5}{6}}{3{7}}{4{8}{9}}}");
        assert_eq!(idx.prel_to_ln_, vec![-1, -1, -1, 2, 3, 3, 5, 5, 7]);
        // preR order is 1, 4, 9, 8, 3, 7, 2, 6, 5.
        assert_eq!(idx.prer_to_ln_, vec![-1, -1, -1, 2, 3, 3, 5, 5, 7]);
    }

    #[test]
    fn test_strategy_weights() {
        let idx = index("{1{2{5}{6}}{3{7}}{4{8}{9}}}");
        assert_eq!(idx.prel_to_cost_left_, vec![16, 4, 1, 1, 2, 1, 4, 1, 1]);
        assert_eq!(idx.prel_to_cost_right_, vec![16, 4, 1, 1, 2, 1, 4, 1, 1]);
        assert_eq!(idx.prel_to_cost_all_, vec![32, 4, 1, 1, 2, 1, 4, 1, 1]);
    }

    #[test]
    fn test_leaf_kind_counters() {
        let idx = index("{1{2{5}{6}}{3{7}}{4{8}{9}}}");
        assert_eq!(idx.lchl, 3);
        assert_eq!(idx.rchl, 3);

        let spine = index("{a{b{c{d}}}}");
        assert_eq!(spine.lchl, 1);
        assert_eq!(spine.rchl, 1);
    }

    #[test]
    fn test_cost_sums() {
        let idx = index("{1{2{5}{6}}{3{7}}{4{8}{9}}}");
        for i in 0..idx.size() {
            assert_eq!(idx.prel_to_sum_del_cost_[i], idx.prel_to_size_[i] as f64);
            assert_eq!(idx.prel_to_sum_ins_cost_[i], idx.prel_to_size_[i] as f64);
        }
    }

    #[test]
    fn test_traversal_bijections() {
        for input in ["{a}", "{f{d{a}{c{b}}}{e}}", "{1{2{5}{6}}{3{7}}{4{8}{9}}}"] {
            let idx = index(input);
            let n = idx.size();
            for i in 0..n {
                assert_eq!(idx.prer_to_prel_[idx.prel_to_prer_[i]], i);
                assert_eq!(idx.postl_to_prel_[idx.prel_to_postl_[i]], i);
                assert_eq!(idx.postr_to_prel_[idx.prel_to_postr_[i]], i);
                assert_eq!(idx.prel_to_prer_[i], n - 1 - idx.prel_to_postl_[i]);
                assert_eq!(idx.prel_to_postr_[i], n - 1 - i);
            }
        }
    }

    #[test]
    fn test_size_one_iff_leaf_and_root_spans_tree() {
        let idx = index("{f{d{a}{c{b}}}{e}}");
        assert_eq!(idx.prel_to_size_[0], idx.size());
        for i in 0..idx.size() {
            assert_eq!(idx.is_leaf(i), idx.prel_to_children_[i].is_empty());
        }
    }

    #[test]
    fn test_negative_cost_is_rejected() {
        struct BrokenCosts;
        impl CostModel for BrokenCosts {
            fn del(&self, _n: LabelId) -> f64 {
                -1.0
            }
            fn ins(&self, _n: LabelId) -> f64 {
                1.0
            }
            fn ren(&self, _n1: LabelId, _n2: LabelId) -> f64 {
                1.0
            }
        }
        let mut ld = LabelDict::default();
        let tree = parse_single("{a{b}}".to_owned(), &mut ld);
        assert!(matches!(
            AptedIndex::index_tree(&tree, &BrokenCosts),
            Err(TedError::InvalidCostModel(_))
        ));
    }
}
