//! Exponential baseline: enumerate every valid edit mapping and keep
//! the cheapest. Test oracle only, bounded to tiny trees.

use crate::cost::CostModel;
use crate::indexing::AptedIndex;
use crate::parsing::ParsedTree;
use crate::ted::TedError;

pub const DEFAULT_NODE_LIMIT: usize = 8;

pub struct AllMappingsTed {
    node_limit: usize,
}

impl Default for AllMappingsTed {
    fn default() -> Self {
        AllMappingsTed {
            node_limit: DEFAULT_NODE_LIMIT,
        }
    }
}

impl AllMappingsTed {
    pub fn new(node_limit: usize) -> Self {
        AllMappingsTed { node_limit }
    }

    /// Minimum mapping cost over all one-to-one partial mappings that
    /// preserve ancestor-descendant and sibling order.
    pub fn ted(
        &self,
        t1: &ParsedTree,
        t2: &ParsedTree,
        costs: &impl CostModel,
    ) -> Result<f64, TedError> {
        let it1 = AptedIndex::index_tree(t1, costs)?;
        let it2 = AptedIndex::index_tree(t2, costs)?;
        for size in [it1.size(), it2.size()] {
            if size > self.node_limit {
                return Err(TedError::ResourceExceeded {
                    size,
                    limit: self.node_limit,
                });
            }
        }

        // Start from the empty mapping: delete everything, insert
        // everything. Each mapped pair replaces a delete and an insert
        // by a rename.
        let base = it1.prel_to_sum_del_cost_[0] + it2.prel_to_sum_ins_cost_[0];
        let mut best = base;
        let mut used = vec![false; it2.size()];
        let mut pairs: Vec<(usize, usize)> = Vec::new();
        enumerate(0, &it1, &it2, costs, &mut used, &mut pairs, base, &mut best);
        Ok(best)
    }
}

/// A new pair is admissible when it keeps both the preL and the preR
/// order against every pair already chosen. Together these encode
/// ancestor-descendant and left-to-right sibling preservation.
fn order_compatible(
    it1: &AptedIndex,
    it2: &AptedIndex,
    pairs: &[(usize, usize)],
    a2: usize,
    b2: usize,
) -> bool {
    for &(a1, b1) in pairs {
        if (a1 < a2) != (b1 < b2) {
            return false;
        }
        if (it1.prel_to_prer_[a1] < it1.prel_to_prer_[a2])
            != (it2.prel_to_prer_[b1] < it2.prel_to_prer_[b2])
        {
            return false;
        }
    }
    true
}

#[allow(clippy::too_many_arguments)]
fn enumerate(
    x: usize,
    it1: &AptedIndex,
    it2: &AptedIndex,
    costs: &impl CostModel,
    used: &mut [bool],
    pairs: &mut Vec<(usize, usize)>,
    current: f64,
    best: &mut f64,
) {
    if x == it1.size() {
        if current < *best {
            *best = current;
        }
        return;
    }
    // Leave x unmapped (deleted).
    enumerate(x + 1, it1, it2, costs, used, pairs, current, best);
    // Map x to every still-free, order-compatible node of the other tree.
    let l1 = it1.prel_to_label_[x];
    for y in 0..it2.size() {
        if used[y] || !order_compatible(it1, it2, pairs, x, y) {
            continue;
        }
        let l2 = it2.prel_to_label_[y];
        let gain = costs.ren(l1, l2) - costs.del(l1) - costs.ins(l2);
        used[y] = true;
        pairs.push((x, y));
        enumerate(x + 1, it1, it2, costs, used, pairs, current + gain, best);
        pairs.pop();
        used[y] = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::{FixedCostModel, UnitCostModel};
    use crate::parsing::{parse_single, LabelDict};

    fn oracle(t1: &str, t2: &str) -> f64 {
        let mut ld = LabelDict::default();
        let t1 = parse_single(t1.to_owned(), &mut ld);
        let t2 = parse_single(t2.to_owned(), &mut ld);
        AllMappingsTed::default()
            .ted(&t1, &t2, &UnitCostModel)
            .unwrap()
    }

    #[test]
    fn test_unit_cost_scenarios() {
        assert_eq!(oracle("{a}", "{a}"), 0.0);
        assert_eq!(oracle("{a}", "{b}"), 1.0);
        assert_eq!(oracle("{a{b}{c}}", "{a{c}{b}}"), 2.0);
        assert_eq!(oracle("{a{b{c}}}", "{a{b}{c}}"), 2.0);
        assert_eq!(oracle("{r{a}{b}{c}{d}}", "{r}"), 4.0);
    }

    #[test]
    fn test_sibling_order_is_preserved() {
        // Mapping b and c across a swap would invert sibling order, so
        // the oracle has to pay two renames instead.
        assert_eq!(oracle("{a{b}{c}}", "{a{c}{b}}"), 2.0);
    }

    #[test]
    fn test_fixed_cost_classical_example() {
        let mut ld = LabelDict::default();
        let t1 = parse_single("{f{d{a}{c{b}}}{e}}".to_owned(), &mut ld);
        let t2 = parse_single("{f{c{d{a}{b}}}{e}}".to_owned(), &mut ld);
        let costs = FixedCostModel::new(0.4, 0.4, 0.6);
        let dist = AllMappingsTed::default().ted(&t1, &t2, &costs).unwrap();
        // One delete plus one insert of the shuffled inner node.
        assert!((dist - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_size_limit() {
        let mut ld = LabelDict::default();
        let big = parse_single("{r{a}{b}{c}{d}{e}{f}{g}{h}}".to_owned(), &mut ld);
        let small = parse_single("{r}".to_owned(), &mut ld);
        assert!(matches!(
            AllMappingsTed::default().ted(&big, &small, &UnitCostModel),
            Err(TedError::ResourceExceeded { size: 9, limit: 8 })
        ));
        assert!(AllMappingsTed::new(16)
            .ted(&big, &small, &UnitCostModel)
            .is_ok());
    }
}
