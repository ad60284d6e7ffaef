//! Group-size and group-index lattices: finite subsets of a small integer
//! universe, so `union`/`intersect` are plain set operations and there is
//! no need for separate `Any`/`None` absorbing elements — the full
//! universe and the empty set already serve as top and bottom.

use std::collections::BTreeSet;
use std::rc::Rc;

use crate::consts::MAX_GROUP_SIZE;
use crate::instruction::{GlobalField, InstructionKind, TxnField};
use crate::stack_ast::StackValue;

use super::index_resolution::{resolve_field_read, TransactionIndex};
use super::FieldAnalysis;

pub type IntSet = BTreeSet<u64>;

fn group_size_universe() -> IntSet {
    (1..=MAX_GROUP_SIZE as u64).collect()
}

fn group_index_universe() -> IntSet {
    (0..MAX_GROUP_SIZE as u64).collect()
}

enum Comparator {
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
}

fn asserted_over_universe(universe: &IntSet, cmp: Comparator, c: u64, flipped: bool) -> (IntSet, IntSet) {
    let cmp = if flipped {
        match cmp {
            Comparator::Lt => Comparator::Gt,
            Comparator::Le => Comparator::Ge,
            Comparator::Gt => Comparator::Lt,
            Comparator::Ge => Comparator::Le,
            other @ (Comparator::Eq | Comparator::Neq) => other,
        }
    } else {
        cmp
    };
    let (true_set, false_set): (IntSet, IntSet) = match cmp {
        Comparator::Eq => (
            universe.iter().copied().filter(|x| *x == c).collect(),
            universe.iter().copied().filter(|x| *x != c).collect(),
        ),
        Comparator::Neq => (
            universe.iter().copied().filter(|x| *x != c).collect(),
            universe.iter().copied().filter(|x| *x == c).collect(),
        ),
        Comparator::Lt => (
            universe.iter().copied().filter(|x| *x < c).collect(),
            universe.iter().copied().filter(|x| *x >= c).collect(),
        ),
        Comparator::Le => (
            universe.iter().copied().filter(|x| *x <= c).collect(),
            universe.iter().copied().filter(|x| *x > c).collect(),
        ),
        Comparator::Gt => (
            universe.iter().copied().filter(|x| *x > c).collect(),
            universe.iter().copied().filter(|x| *x <= c).collect(),
        ),
        Comparator::Ge => (
            universe.iter().copied().filter(|x| *x >= c).collect(),
            universe.iter().copied().filter(|x| *x < c).collect(),
        ),
    };
    (true_set, false_set)
}

fn literal(value: &Rc<StackValue>) -> Option<u64> {
    match value.kind()? {
        InstructionKind::Int(n) | InstructionKind::PushInt(n) => Some(*n),
        _ => None,
    }
}

pub struct GroupSizeAnalysis;

impl FieldAnalysis for GroupSizeAnalysis {
    type Value = IntSet;

    fn universal() -> Self::Value {
        group_size_universe()
    }

    fn null() -> Self::Value {
        IntSet::new()
    }

    fn union(a: &Self::Value, b: &Self::Value) -> Self::Value {
        a.union(b).copied().collect()
    }

    fn intersect(a: &Self::Value, b: &Self::Value) -> Self::Value {
        a.intersection(b).copied().collect()
    }

    fn asserted(&self, value: &Rc<StackValue>, _for_index: TransactionIndex) -> Option<(Self::Value, Self::Value)> {
        let (cmp, lhs, rhs) = comparator_of(value)?;
        let is_group_size = |v: &Rc<StackValue>| matches!(v.kind(), Some(InstructionKind::Global(GlobalField::GroupSize)));
        let (literal_side, flipped) = if is_group_size(&lhs) {
            (rhs, false)
        } else if is_group_size(&rhs) {
            (lhs, true)
        } else {
            return None;
        };
        let c = literal(&literal_side)?;
        Some(asserted_over_universe(&group_size_universe(), cmp, c, flipped))
    }
}

pub struct GroupIndexAnalysis;

impl FieldAnalysis for GroupIndexAnalysis {
    type Value = IntSet;

    fn universal() -> Self::Value {
        group_index_universe()
    }

    fn null() -> Self::Value {
        IntSet::new()
    }

    fn union(a: &Self::Value, b: &Self::Value) -> Self::Value {
        a.union(b).copied().collect()
    }

    fn intersect(a: &Self::Value, b: &Self::Value) -> Self::Value {
        a.intersection(b).copied().collect()
    }

    fn asserted(&self, value: &Rc<StackValue>, for_index: TransactionIndex) -> Option<(Self::Value, Self::Value)> {
        let (cmp, lhs, rhs) = comparator_of(value)?;
        let is_group_index = |v: &Rc<StackValue>| match resolve_field_read(v) {
            Some((idx, TxnField::GroupIndex)) => idx.index_type == for_index.index_type && idx.value == for_index.value,
            _ => false,
        };
        let (literal_side, flipped) = if is_group_index(&lhs) {
            (rhs, false)
        } else if is_group_index(&rhs) {
            (lhs, true)
        } else {
            return None;
        };
        let c = literal(&literal_side)?;
        Some(asserted_over_universe(&group_index_universe(), cmp, c, flipped))
    }
}

fn comparator_of(value: &Rc<StackValue>) -> Option<(Comparator, Rc<StackValue>, Rc<StackValue>)> {
    let cmp = match value.kind()? {
        InstructionKind::Eq => Comparator::Eq,
        InstructionKind::Neq => Comparator::Neq,
        InstructionKind::Less => Comparator::Lt,
        InstructionKind::LessE => Comparator::Le,
        InstructionKind::Greater => Comparator::Gt,
        InstructionKind::GreaterE => Comparator::Ge,
        _ => return None,
    };
    Some((cmp, value.arg(0), value.arg(1)))
}

/// Clamp a computed group-index set down to what the group-size analysis
/// proved possible, per the post-analysis tightening the framework applies
/// once both analyses have converged.
pub fn clamp_to_group_sizes(indices: &IntSet, group_sizes: &IntSet) -> IntSet {
    let max_size = group_sizes.iter().max().copied().unwrap_or(MAX_GROUP_SIZE as u64);
    indices.iter().copied().filter(|i| *i < max_size).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Instruction;

    fn group_size_read() -> Rc<StackValue> {
        StackValue::known(
            Instruction { line: 1, kind: InstructionKind::Global(GlobalField::GroupSize), block: None },
            vec![],
        )
    }

    fn lit(n: u64) -> Rc<StackValue> {
        StackValue::known(Instruction { line: 2, kind: InstructionKind::Int(n), block: None }, vec![])
    }

    fn eq(lhs: Rc<StackValue>, rhs: Rc<StackValue>) -> Rc<StackValue> {
        StackValue::known(Instruction { line: 3, kind: InstructionKind::Eq, block: None }, vec![lhs, rhs])
    }

    #[test]
    fn groupsize_equals_three_pins_a_singleton() {
        let analysis = GroupSizeAnalysis;
        let expr = eq(group_size_read(), lit(3));
        let (t, f) = analysis.asserted(&expr, TransactionIndex::SELF).unwrap();
        assert_eq!(t, IntSet::from([3]));
        assert!(!f.contains(&3));
        assert_eq!(f.len(), group_size_universe().len() - 1);
    }

    #[test]
    fn clamp_drops_indices_at_or_above_max_group_size() {
        let indices: IntSet = (0..16).collect();
        let sizes = IntSet::from([3]);
        let clamped = clamp_to_group_sizes(&indices, &sizes);
        assert_eq!(clamped, IntSet::from([0, 1, 2]));
    }

    #[test]
    fn union_and_intersect_are_plain_set_ops() {
        let a = IntSet::from([1, 2]);
        let b = IntSet::from([2, 3]);
        assert_eq!(GroupSizeAnalysis::union(&a, &b), IntSet::from([1, 2, 3]));
        assert_eq!(GroupSizeAnalysis::intersect(&a, &b), IntSet::from([2]));
    }
}
