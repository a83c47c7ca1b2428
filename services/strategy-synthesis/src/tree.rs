//! Typed strategy expression trees
//!
//! A tree produces one of three output types. Numeric nodes read indicators,
//! hold constants or combine numbers; boolean nodes compare numbers or combine
//! booleans; action nodes are leaves (`BUY`/`SELL`/`HOLD`) or if/then/else
//! conditionals. Genetic operators only ever swap subtrees of the same output
//! type, so every tree stays well-typed.
//!
//! Nodes are addressed by pre-order index (root = 0).

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::IndicatorSnapshot;

/// Indicator inputs a tree can read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    Rsi,
    MacdHistogram,
    AtrPct,
    BollingerPosition,
    VolumeRatio,
    TrendStrength,
    Volatility,
    Price,
    RegimeCode,
}

impl IndicatorKind {
    pub const ALL: [IndicatorKind; 9] = [
        IndicatorKind::Rsi,
        IndicatorKind::MacdHistogram,
        IndicatorKind::AtrPct,
        IndicatorKind::BollingerPosition,
        IndicatorKind::VolumeRatio,
        IndicatorKind::TrendStrength,
        IndicatorKind::Volatility,
        IndicatorKind::Price,
        IndicatorKind::RegimeCode,
    ];

    pub fn read(&self, snapshot: &IndicatorSnapshot) -> f64 {
        match self {
            IndicatorKind::Rsi => snapshot.rsi,
            IndicatorKind::MacdHistogram => snapshot.macd_histogram,
            IndicatorKind::AtrPct => snapshot.atr_pct,
            IndicatorKind::BollingerPosition => snapshot.bollinger_position,
            IndicatorKind::VolumeRatio => snapshot.volume_ratio,
            IndicatorKind::TrendStrength => snapshot.trend_strength,
            IndicatorKind::Volatility => snapshot.volatility,
            IndicatorKind::Price => snapshot.price,
            IndicatorKind::RegimeCode => snapshot.regime.code(),
        }
    }

    /// Plausible value range, used to draw meaningful comparison constants
    pub fn typical_range(&self) -> (f64, f64) {
        match self {
            IndicatorKind::Rsi => (10.0, 90.0),
            IndicatorKind::MacdHistogram => (-2.0, 2.0),
            IndicatorKind::AtrPct => (0.2, 5.0),
            IndicatorKind::BollingerPosition => (0.0, 1.0),
            IndicatorKind::VolumeRatio => (0.3, 3.0),
            IndicatorKind::TrendStrength => (-1.0, 1.0),
            IndicatorKind::Volatility => (0.001, 0.08),
            IndicatorKind::Price => (1.0, 100_000.0),
            IndicatorKind::RegimeCode => (0.0, 5.0),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            IndicatorKind::Rsi => "RSI",
            IndicatorKind::MacdHistogram => "MACD_HIST",
            IndicatorKind::AtrPct => "ATR_PCT",
            IndicatorKind::BollingerPosition => "BB_POS",
            IndicatorKind::VolumeRatio => "VOL_RATIO",
            IndicatorKind::TrendStrength => "TREND",
            IndicatorKind::Volatility => "VOLATILITY",
            IndicatorKind::Price => "PRICE",
            IndicatorKind::RegimeCode => "REGIME",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    /// Protected division: a near-zero divisor yields 1.0
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Gt,
    Lt,
    Gte,
    Lte,
    /// Equal within half a unit, so regime codes compare exactly
    Eq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Logic {
    And,
    Or,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

/// Output type of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Numeric,
    Boolean,
    Action,
}

/// Shape bounds enforced on every tree the engines admit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeLimits {
    pub max_depth: usize,
    pub max_nodes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum StrategyNode {
    Indicator {
        kind: IndicatorKind,
    },
    Constant {
        value: f64,
    },
    Arithmetic {
        op: ArithOp,
        left: Box<StrategyNode>,
        right: Box<StrategyNode>,
    },
    Compare {
        op: Comparator,
        left: Box<StrategyNode>,
        right: Box<StrategyNode>,
    },
    Logical {
        op: Logic,
        children: Vec<StrategyNode>,
    },
    Conditional {
        condition: Box<StrategyNode>,
        then_branch: Box<StrategyNode>,
        else_branch: Box<StrategyNode>,
    },
    Action {
        action: Action,
    },
}

impl StrategyNode {
    pub fn indicator(kind: IndicatorKind) -> Self {
        StrategyNode::Indicator { kind }
    }

    pub fn constant(value: f64) -> Self {
        StrategyNode::Constant { value }
    }

    pub fn action(action: Action) -> Self {
        StrategyNode::Action { action }
    }

    pub fn arithmetic(op: ArithOp, left: StrategyNode, right: StrategyNode) -> Self {
        StrategyNode::Arithmetic {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn compare(op: Comparator, left: StrategyNode, right: StrategyNode) -> Self {
        StrategyNode::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// `indicator <op> constant`, the most common boolean leaf shape
    pub fn threshold(kind: IndicatorKind, op: Comparator, value: f64) -> Self {
        Self::compare(op, Self::indicator(kind), Self::constant(value))
    }

    /// Conjunction of the given conditions. A single condition is returned as-is.
    pub fn all_of(mut conditions: Vec<StrategyNode>) -> Self {
        if conditions.len() == 1 {
            return conditions.remove(0);
        }
        StrategyNode::Logical {
            op: Logic::And,
            children: conditions,
        }
    }

    pub fn not(condition: StrategyNode) -> Self {
        StrategyNode::Logical {
            op: Logic::Not,
            children: vec![condition],
        }
    }

    pub fn conditional(condition: StrategyNode, then_branch: StrategyNode, else_branch: StrategyNode) -> Self {
        StrategyNode::Conditional {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        }
    }

    pub fn output_type(&self) -> NodeType {
        match self {
            StrategyNode::Indicator { .. } | StrategyNode::Constant { .. } | StrategyNode::Arithmetic { .. } => {
                NodeType::Numeric
            }
            StrategyNode::Compare { .. } | StrategyNode::Logical { .. } => NodeType::Boolean,
            StrategyNode::Conditional { .. } | StrategyNode::Action { .. } => NodeType::Action,
        }
    }

    pub fn children(&self) -> Vec<&StrategyNode> {
        match self {
            StrategyNode::Indicator { .. } | StrategyNode::Constant { .. } | StrategyNode::Action { .. } => vec![],
            StrategyNode::Arithmetic { left, right, .. } | StrategyNode::Compare { left, right, .. } => {
                vec![left.as_ref(), right.as_ref()]
            }
            StrategyNode::Logical { children, .. } => children.iter().collect(),
            StrategyNode::Conditional {
                condition,
                then_branch,
                else_branch,
            } => vec![condition.as_ref(), then_branch.as_ref(), else_branch.as_ref()],
        }
    }

    fn children_mut(&mut self) -> Vec<&mut StrategyNode> {
        match self {
            StrategyNode::Indicator { .. } | StrategyNode::Constant { .. } | StrategyNode::Action { .. } => vec![],
            StrategyNode::Arithmetic { left, right, .. } | StrategyNode::Compare { left, right, .. } => {
                vec![left.as_mut(), right.as_mut()]
            }
            StrategyNode::Logical { children, .. } => children.iter_mut().collect(),
            StrategyNode::Conditional {
                condition,
                then_branch,
                else_branch,
            } => vec![condition.as_mut(), then_branch.as_mut(), else_branch.as_mut()],
        }
    }

    /// Longest root-to-leaf path, a single leaf has depth 1
    pub fn depth(&self) -> usize {
        1 + self.children().iter().map(|c| c.depth()).max().unwrap_or(0)
    }

    pub fn node_count(&self) -> usize {
        1 + self.children().iter().map(|c| c.node_count()).sum::<usize>()
    }

    pub fn within(&self, limits: &TreeLimits) -> bool {
        self.depth() <= limits.max_depth && self.node_count() <= limits.max_nodes
    }

    /// Node at pre-order index `index`
    pub fn subtree(&self, index: usize) -> Option<&StrategyNode> {
        fn walk<'a>(node: &'a StrategyNode, remaining: &mut usize) -> Option<&'a StrategyNode> {
            if *remaining == 0 {
                return Some(node);
            }
            *remaining -= 1;
            for child in node.children() {
                if let Some(found) = walk(child, remaining) {
                    return Some(found);
                }
            }
            None
        }
        let mut remaining = index;
        walk(self, &mut remaining)
    }

    fn subtree_mut(&mut self, index: usize) -> Option<&mut StrategyNode> {
        fn walk<'a>(node: &'a mut StrategyNode, remaining: &mut usize) -> Option<&'a mut StrategyNode> {
            if *remaining == 0 {
                return Some(node);
            }
            *remaining -= 1;
            for child in node.children_mut() {
                if let Some(found) = walk(child, remaining) {
                    return Some(found);
                }
            }
            None
        }
        let mut remaining = index;
        walk(self, &mut remaining)
    }

    /// Copy of this tree with the node at `index` replaced.
    /// Returns `None` when the index is out of range.
    pub fn replace_subtree(&self, index: usize, replacement: StrategyNode) -> Option<StrategyNode> {
        let mut tree = self.clone();
        let slot = tree.subtree_mut(index)?;
        *slot = replacement;
        Some(tree)
    }

    /// Pre-order indices of every node producing `node_type`
    pub fn indices_of_type(&self, node_type: NodeType) -> Vec<usize> {
        self.preorder()
            .into_iter()
            .enumerate()
            .filter(|(_, node)| node.output_type() == node_type)
            .map(|(i, _)| i)
            .collect()
    }

    /// Pre-order indices of constant leaves
    pub fn constant_indices(&self) -> Vec<usize> {
        self.preorder()
            .into_iter()
            .enumerate()
            .filter(|(_, node)| matches!(node, StrategyNode::Constant { .. }))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn constants(&self) -> Vec<f64> {
        self.preorder()
            .into_iter()
            .filter_map(|node| match node {
                StrategyNode::Constant { value } => Some(*value),
                _ => None,
            })
            .collect()
    }

    /// Indicators read anywhere in the tree, in pre-order
    pub fn indicators(&self) -> Vec<IndicatorKind> {
        self.preorder()
            .into_iter()
            .filter_map(|node| match node {
                StrategyNode::Indicator { kind } => Some(*kind),
                _ => None,
            })
            .collect()
    }

    fn preorder(&self) -> Vec<&StrategyNode> {
        let mut out = Vec::with_capacity(self.node_count());
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node);
            let children = node.children();
            stack.extend(children.into_iter().rev());
        }
        out
    }

    /// Numeric evaluation. Booleans map to 1/0, actions to +1/-1/0.
    pub fn value(&self, snapshot: &IndicatorSnapshot) -> f64 {
        let v = match self {
            StrategyNode::Indicator { kind } => kind.read(snapshot),
            StrategyNode::Constant { value } => *value,
            StrategyNode::Arithmetic { op, left, right } => {
                let l = left.value(snapshot);
                let r = right.value(snapshot);
                match op {
                    ArithOp::Add => l + r,
                    ArithOp::Sub => l - r,
                    ArithOp::Mul => l * r,
                    ArithOp::Div => {
                        if r.abs() < 1e-9 {
                            1.0
                        } else {
                            l / r
                        }
                    }
                }
            }
            StrategyNode::Compare { .. } | StrategyNode::Logical { .. } => {
                if self.truth(snapshot) {
                    1.0
                } else {
                    0.0
                }
            }
            StrategyNode::Conditional { .. } | StrategyNode::Action { .. } => match self.decide(snapshot) {
                Action::Buy => 1.0,
                Action::Sell => -1.0,
                Action::Hold => 0.0,
            },
        };
        if v.is_finite() {
            v
        } else {
            0.0
        }
    }

    /// Boolean evaluation. Numbers are true when positive.
    pub fn truth(&self, snapshot: &IndicatorSnapshot) -> bool {
        match self {
            StrategyNode::Compare { op, left, right } => {
                let l = left.value(snapshot);
                let r = right.value(snapshot);
                match op {
                    Comparator::Gt => l > r,
                    Comparator::Lt => l < r,
                    Comparator::Gte => l >= r,
                    Comparator::Lte => l <= r,
                    Comparator::Eq => (l - r).abs() < 0.5,
                }
            }
            StrategyNode::Logical { op, children } => match op {
                Logic::And => !children.is_empty() && children.iter().all(|c| c.truth(snapshot)),
                Logic::Or => children.iter().any(|c| c.truth(snapshot)),
                Logic::Not => !children.first().map(|c| c.truth(snapshot)).unwrap_or(false),
            },
            StrategyNode::Conditional { .. } | StrategyNode::Action { .. } => {
                self.decide(snapshot) == Action::Buy
            }
            _ => self.value(snapshot) > 0.0,
        }
    }

    /// Trading decision for one snapshot
    pub fn decide(&self, snapshot: &IndicatorSnapshot) -> Action {
        match self {
            StrategyNode::Action { action } => *action,
            StrategyNode::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                if condition.truth(snapshot) {
                    then_branch.decide(snapshot)
                } else {
                    else_branch.decide(snapshot)
                }
            }
            StrategyNode::Compare { .. } | StrategyNode::Logical { .. } => {
                if self.truth(snapshot) {
                    Action::Buy
                } else {
                    Action::Hold
                }
            }
            _ => {
                let v = self.value(snapshot);
                if v > 0.0 {
                    Action::Buy
                } else if v < 0.0 {
                    Action::Sell
                } else {
                    Action::Hold
                }
            }
        }
    }
}

impl fmt::Display for StrategyNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyNode::Indicator { kind } => write!(f, "{}", kind.label()),
            StrategyNode::Constant { value } => {
                if value.fract().abs() < 1e-9 {
                    write!(f, "{:.0}", value)
                } else {
                    write!(f, "{:.3}", value)
                }
            }
            StrategyNode::Arithmetic { op, left, right } => {
                let symbol = match op {
                    ArithOp::Add => "+",
                    ArithOp::Sub => "-",
                    ArithOp::Mul => "*",
                    ArithOp::Div => "/",
                };
                write!(f, "({} {} {})", left, symbol, right)
            }
            StrategyNode::Compare { op, left, right } => {
                let symbol = match op {
                    Comparator::Gt => ">",
                    Comparator::Lt => "<",
                    Comparator::Gte => ">=",
                    Comparator::Lte => "<=",
                    Comparator::Eq => "==",
                };
                write!(f, "({} {} {})", left, symbol, right)
            }
            StrategyNode::Logical { op: Logic::Not, children } => match children.first() {
                Some(child) => write!(f, "NOT {}", child),
                None => write!(f, "NOT ()"),
            },
            StrategyNode::Logical { op, children } => {
                let joiner = if *op == Logic::And { " AND " } else { " OR " };
                let parts: Vec<String> = children.iter().map(|c| c.to_string()).collect();
                write!(f, "({})", parts.join(joiner))
            }
            StrategyNode::Conditional {
                condition,
                then_branch,
                else_branch,
            } => write!(f, "IF {} THEN {} ELSE {}", condition, then_branch, else_branch),
            StrategyNode::Action { action } => {
                let label = match action {
                    Action::Buy => "BUY",
                    Action::Sell => "SELL",
                    Action::Hold => "HOLD",
                };
                write!(f, "{}", label)
            }
        }
    }
}

/// Grow a random tree of the given output type, never deeper than `max_depth`.
///
/// Boolean subtrees need depth 2 and conditionals depth 3, so requests below
/// that fall back to the simplest node of the type.
pub fn random_tree<R: Rng + ?Sized>(rng: &mut R, node_type: NodeType, max_depth: usize) -> StrategyNode {
    let depth = max_depth.max(1);
    match node_type {
        NodeType::Numeric => random_numeric(rng, depth),
        NodeType::Boolean => random_boolean(rng, depth.max(2)),
        NodeType::Action => random_action(rng, depth, false),
    }
}

/// Random strategy with a conditional root
pub fn random_strategy<R: Rng + ?Sized>(rng: &mut R, max_depth: usize) -> StrategyNode {
    random_action(rng, max_depth.max(3), true)
}

fn random_indicator<R: Rng + ?Sized>(rng: &mut R) -> IndicatorKind {
    // price is scale-dependent, so it is only drawn occasionally
    let weighted = [
        (IndicatorKind::Rsi, 4),
        (IndicatorKind::MacdHistogram, 3),
        (IndicatorKind::AtrPct, 2),
        (IndicatorKind::BollingerPosition, 3),
        (IndicatorKind::VolumeRatio, 2),
        (IndicatorKind::TrendStrength, 3),
        (IndicatorKind::Volatility, 2),
        (IndicatorKind::Price, 1),
        (IndicatorKind::RegimeCode, 1),
    ];
    weighted
        .choose_weighted(rng, |(_, w)| *w)
        .map(|(k, _)| *k)
        .unwrap_or(IndicatorKind::Rsi)
}

fn random_constant_for<R: Rng + ?Sized>(rng: &mut R, kind: IndicatorKind) -> f64 {
    if kind == IndicatorKind::RegimeCode {
        return rng.gen_range(0..6) as f64;
    }
    let (lo, hi) = kind.typical_range();
    let v = rng.gen_range(lo..hi);
    (v * 1000.0).round() / 1000.0
}

fn random_numeric<R: Rng + ?Sized>(rng: &mut R, depth: usize) -> StrategyNode {
    if depth <= 1 || rng.gen_bool(0.6) {
        if rng.gen_bool(0.8) {
            StrategyNode::indicator(random_indicator(rng))
        } else {
            StrategyNode::constant((rng.gen_range(-2.0..2.0) * 1000.0_f64).round() / 1000.0)
        }
    } else {
        let op = *[ArithOp::Add, ArithOp::Sub, ArithOp::Mul, ArithOp::Div]
            .choose(rng)
            .unwrap_or(&ArithOp::Add);
        StrategyNode::arithmetic(op, random_numeric(rng, depth - 1), random_numeric(rng, depth - 1))
    }
}

fn random_comparator<R: Rng + ?Sized>(rng: &mut R) -> Comparator {
    *[Comparator::Gt, Comparator::Lt, Comparator::Gte, Comparator::Lte]
        .choose(rng)
        .unwrap_or(&Comparator::Gt)
}

fn random_boolean<R: Rng + ?Sized>(rng: &mut R, depth: usize) -> StrategyNode {
    if depth <= 2 || rng.gen_bool(0.7) {
        let kind = random_indicator(rng);
        if kind == IndicatorKind::RegimeCode {
            return StrategyNode::threshold(kind, Comparator::Eq, random_constant_for(rng, kind));
        }
        let left = if depth > 2 && rng.gen_bool(0.2) {
            random_numeric(rng, depth - 1)
        } else {
            StrategyNode::indicator(kind)
        };
        StrategyNode::compare(
            random_comparator(rng),
            left,
            StrategyNode::constant(random_constant_for(rng, kind)),
        )
    } else if rng.gen_bool(0.2) {
        StrategyNode::not(random_boolean(rng, depth - 1))
    } else {
        let op = if rng.gen_bool(0.6) { Logic::And } else { Logic::Or };
        StrategyNode::Logical {
            op,
            children: vec![random_boolean(rng, depth - 1), random_boolean(rng, depth - 1)],
        }
    }
}

fn random_action_leaf<R: Rng + ?Sized>(rng: &mut R) -> StrategyNode {
    let action = *[Action::Buy, Action::Sell, Action::Hold]
        .choose(rng)
        .unwrap_or(&Action::Hold);
    StrategyNode::action(action)
}

fn random_action<R: Rng + ?Sized>(rng: &mut R, depth: usize, force_conditional: bool) -> StrategyNode {
    if depth < 3 || (!force_conditional && rng.gen_bool(0.4)) {
        return random_action_leaf(rng);
    }
    StrategyNode::conditional(
        random_boolean(rng, depth - 1),
        random_action(rng, depth - 1, false),
        random_action(rng, depth - 1, false),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Regime;

    fn rsi_strategy() -> StrategyNode {
        StrategyNode::conditional(
            StrategyNode::threshold(IndicatorKind::Rsi, Comparator::Lt, 30.0),
            StrategyNode::action(Action::Buy),
            StrategyNode::action(Action::Hold),
        )
    }

    #[test]
    fn test_display() {
        assert_eq!(rsi_strategy().to_string(), "IF (RSI < 30) THEN BUY ELSE HOLD");
    }

    #[test]
    fn test_decide() {
        let tree = rsi_strategy();
        let mut snapshot = IndicatorSnapshot::default();
        snapshot.rsi = 25.0;
        assert_eq!(tree.decide(&snapshot), Action::Buy);
        snapshot.rsi = 45.0;
        assert_eq!(tree.decide(&snapshot), Action::Hold);
    }

    #[test]
    fn test_protected_division() {
        let tree = StrategyNode::arithmetic(
            ArithOp::Div,
            StrategyNode::constant(5.0),
            StrategyNode::constant(0.0),
        );
        assert_eq!(tree.value(&IndicatorSnapshot::default()), 1.0);
    }

    #[test]
    fn test_regime_equality() {
        let tree = StrategyNode::threshold(IndicatorKind::RegimeCode, Comparator::Eq, Regime::Volatile.code());
        let mut snapshot = IndicatorSnapshot::default();
        snapshot.regime = Regime::Volatile;
        assert!(tree.truth(&snapshot));
        snapshot.regime = Regime::Breakout;
        assert!(!tree.truth(&snapshot));
    }

    #[test]
    fn test_shape_and_indexing() {
        let tree = rsi_strategy();
        assert_eq!(tree.depth(), 3);
        assert_eq!(tree.node_count(), 6);

        // pre-order: IF, <, RSI, 30, BUY, HOLD
        assert!(matches!(tree.subtree(2), Some(StrategyNode::Indicator { kind: IndicatorKind::Rsi })));
        assert!(matches!(tree.subtree(5), Some(StrategyNode::Action { action: Action::Hold })));
        assert!(tree.subtree(6).is_none());

        assert_eq!(tree.indices_of_type(NodeType::Action), vec![0, 4, 5]);
        assert_eq!(tree.indices_of_type(NodeType::Boolean), vec![1]);
        assert_eq!(tree.constant_indices(), vec![3]);
        assert_eq!(tree.constants(), vec![30.0]);
    }

    #[test]
    fn test_replace_subtree() {
        let tree = rsi_strategy();
        let replaced = tree.replace_subtree(5, StrategyNode::action(Action::Sell)).unwrap();
        assert_eq!(replaced.to_string(), "IF (RSI < 30) THEN BUY ELSE SELL");
        // original untouched
        assert_eq!(tree.to_string(), "IF (RSI < 30) THEN BUY ELSE HOLD");
        assert!(tree.replace_subtree(42, StrategyNode::constant(1.0)).is_none());
    }

    #[test]
    fn test_random_trees_respect_depth_and_type() {
        let mut rng = rand::thread_rng();
        for depth in 1..7 {
            for _ in 0..50 {
                let tree = random_tree(&mut rng, NodeType::Action, depth);
                assert_eq!(tree.output_type(), NodeType::Action);
                assert!(tree.depth() <= depth.max(1));

                let boolean = random_tree(&mut rng, NodeType::Boolean, depth);
                assert_eq!(boolean.output_type(), NodeType::Boolean);
                assert!(boolean.depth() <= depth.max(2));
            }
        }

        let strategy = random_strategy(&mut rng, 4);
        assert!(matches!(strategy, StrategyNode::Conditional { .. }));
        assert!(strategy.depth() <= 4);
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_value(rsi_strategy()).unwrap();
        assert_eq!(json["node"], "conditional");
        assert_eq!(json["condition"]["op"], "lt");
        let back: StrategyNode = serde_json::from_value(json).unwrap();
        assert_eq!(back, rsi_strategy());
    }
}
