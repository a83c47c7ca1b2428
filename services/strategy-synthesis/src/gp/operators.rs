//! Selection and variation operators
//!
//! Every operator returns `None` instead of an offspring that breaks the tree
//! limits; the caller regenerates.

use rand::seq::SliceRandom;
use rand::Rng;

use super::GpIndividual;
use crate::tree::{random_tree, NodeType, StrategyNode, TreeLimits};

/// Sample `k` individuals uniformly and keep the one with the best adjusted fitness
pub fn tournament_select<'a, R: Rng + ?Sized>(
    population: &'a [GpIndividual],
    k: usize,
    rng: &mut R,
) -> Option<&'a GpIndividual> {
    (0..k.max(1))
        .filter_map(|_| population.choose(rng))
        .max_by(|a, b| a.adjusted_fitness.total_cmp(&b.adjusted_fitness))
}

/// Swap a random subtree of `a` for a same-typed random subtree of `b`
pub fn crossover<R: Rng + ?Sized>(
    a: &StrategyNode,
    b: &StrategyNode,
    limits: &TreeLimits,
    rng: &mut R,
) -> Option<StrategyNode> {
    let target = rng.gen_range(0..a.node_count());
    let node_type = a.subtree(target)?.output_type();
    let donor_index = *b.indices_of_type(node_type).choose(rng)?;
    let donor = b.subtree(donor_index)?.clone();

    let child = a.replace_subtree(target, donor)?;
    child.within(limits).then_some(child)
}

/// Constant perturbation when the tree has constants (half the time),
/// otherwise replacement of a random subtree with a freshly grown one
pub fn mutate<R: Rng + ?Sized>(
    tree: &StrategyNode,
    limits: &TreeLimits,
    grow_depth: usize,
    rng: &mut R,
) -> Option<StrategyNode> {
    let constants = tree.constant_indices();
    let child = if !constants.is_empty() && rng.gen_bool(0.5) {
        perturb_constant(tree, &constants, rng)?
    } else {
        replace_random_subtree(tree, grow_depth, rng)?
    };
    child.within(limits).then_some(child)
}

fn perturb_constant<R: Rng + ?Sized>(tree: &StrategyNode, constants: &[usize], rng: &mut R) -> Option<StrategyNode> {
    let index = *constants.choose(rng)?;
    let StrategyNode::Constant { value } = tree.subtree(index)? else {
        return None;
    };
    let scale = value.abs().max(0.1);
    let perturbed = value + scale * rng.gen_range(-0.2..0.2);
    tree.replace_subtree(index, StrategyNode::constant((perturbed * 1000.0).round() / 1000.0))
}

fn replace_random_subtree<R: Rng + ?Sized>(tree: &StrategyNode, grow_depth: usize, rng: &mut R) -> Option<StrategyNode> {
    let index = rng.gen_range(0..tree.node_count());
    let node_type = tree.subtree(index)?.output_type();
    let depth = match node_type {
        NodeType::Boolean => grow_depth.max(2),
        _ => grow_depth.max(1),
    };
    let grown_depth = rng.gen_range(1..=depth);
    let fresh = random_tree(rng, node_type, grown_depth);
    tree.replace_subtree(index, fresh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::random_strategy;

    #[test]
    fn test_offspring_respect_limits() {
        let mut rng = rand::thread_rng();
        let limits = TreeLimits {
            max_depth: 6,
            max_nodes: 30,
        };

        for _ in 0..300 {
            let a = random_strategy(&mut rng, 5);
            let b = random_strategy(&mut rng, 5);

            if let Some(child) = crossover(&a, &b, &limits, &mut rng) {
                assert!(child.depth() <= limits.max_depth);
                assert!(child.node_count() <= limits.max_nodes);
                assert_eq!(child.output_type(), NodeType::Action);
            }
            if let Some(child) = mutate(&a, &limits, 3, &mut rng) {
                assert!(child.depth() <= limits.max_depth);
                assert!(child.node_count() <= limits.max_nodes);
                assert_eq!(child.output_type(), NodeType::Action);
            }
        }
    }

    #[test]
    fn test_constant_perturbation_keeps_shape() {
        let mut rng = rand::thread_rng();
        let tree = StrategyNode::conditional(
            StrategyNode::threshold(crate::tree::IndicatorKind::Rsi, crate::tree::Comparator::Lt, 30.0),
            StrategyNode::action(crate::tree::Action::Buy),
            StrategyNode::action(crate::tree::Action::Hold),
        );
        let child = perturb_constant(&tree, &tree.constant_indices(), &mut rng).unwrap();
        assert_eq!(child.node_count(), tree.node_count());
        let value = child.constants()[0];
        assert!((24.0..=36.0).contains(&value));
    }
}
