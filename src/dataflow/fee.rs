//! Fee-field lattice: an upper bound on `Fee`, since every fee detector
//! only cares whether the fee is provably bounded below the group's
//! worst-case cost.
//!
//! `Unknown` is the top element (no bound known — as permissive as
//! possible) and intersects away in favor of any concrete bound; a
//! concrete bound only ever loosens (via `union`, when merging across
//! branches) into `Unknown`, never into a looser concrete number, since
//! this analysis has no use for anything but "do we have a bound or not".

use std::rc::Rc;

use crate::instruction::{InstructionKind, TxnField};
use crate::stack_ast::StackValue;

use super::index_resolution::{resolve_field_read, TransactionIndex};
use super::FieldAnalysis;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeLattice {
    /// No known upper bound.
    Unknown,
    /// Provably no greater than this value.
    Bounded(u64),
}

pub struct FeeFieldAnalysis;

enum Comparator {
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl FeeFieldAnalysis {
    fn is_fee_read(&self, value: &Rc<StackValue>, for_index: TransactionIndex) -> bool {
        match resolve_field_read(value) {
            Some((idx, TxnField::Fee)) => idx.index_type == for_index.index_type && idx.value == for_index.value,
            _ => false,
        }
    }

    fn literal(&self, value: &Rc<StackValue>) -> Option<u64> {
        match value.kind()? {
            InstructionKind::Int(n) | InstructionKind::PushInt(n) => Some(*n),
            _ => None,
        }
    }
}

impl FieldAnalysis for FeeFieldAnalysis {
    type Value = FeeLattice;

    fn universal() -> Self::Value {
        FeeLattice::Unknown
    }

    fn null() -> Self::Value {
        FeeLattice::Bounded(0)
    }

    fn union(a: &Self::Value, b: &Self::Value) -> Self::Value {
        match (a, b) {
            (FeeLattice::Unknown, _) | (_, FeeLattice::Unknown) => FeeLattice::Unknown,
            (FeeLattice::Bounded(x), FeeLattice::Bounded(y)) => FeeLattice::Bounded(*x.max(y)),
        }
    }

    fn intersect(a: &Self::Value, b: &Self::Value) -> Self::Value {
        match (a, b) {
            (FeeLattice::Unknown, x) | (x, FeeLattice::Unknown) => *x,
            (FeeLattice::Bounded(x), FeeLattice::Bounded(y)) => FeeLattice::Bounded(*x.min(y)),
        }
    }

    fn asserted(
        &self,
        value: &Rc<StackValue>,
        for_index: TransactionIndex,
    ) -> Option<(Self::Value, Self::Value)> {
        let (cmp, field_is_lhs) = match value.kind()? {
            InstructionKind::Eq => (Comparator::Eq, true),
            InstructionKind::Neq => (Comparator::Neq, true),
            InstructionKind::Less => (Comparator::Lt, true),
            InstructionKind::LessE => (Comparator::Le, true),
            InstructionKind::Greater => (Comparator::Gt, true),
            InstructionKind::GreaterE => (Comparator::Ge, true),
            _ => return None,
        };
        let lhs = value.arg(0);
        let rhs = value.arg(1);

        let (field_side, literal_side, flipped) = if self.is_fee_read(&lhs, for_index) {
            (lhs, rhs, false)
        } else if self.is_fee_read(&rhs, for_index) {
            (rhs, lhs, true)
        } else {
            return None;
        };
        let _ = field_side;
        let c = self.literal(&literal_side)?;

        // `c OP fee` reads the same as `fee OP' c` for the flipped operator.
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
        let _ = field_is_lhs;

        Some(match cmp {
            Comparator::Eq => (FeeLattice::Bounded(c), FeeLattice::Unknown),
            Comparator::Neq => (FeeLattice::Unknown, FeeLattice::Bounded(c)),
            Comparator::Lt => (FeeLattice::Bounded(c.saturating_sub(1)), FeeLattice::Unknown),
            Comparator::Le => (FeeLattice::Bounded(c), FeeLattice::Unknown),
            Comparator::Gt => (FeeLattice::Unknown, FeeLattice::Bounded(c)),
            Comparator::Ge => (FeeLattice::Unknown, FeeLattice::Bounded(c.saturating_sub(1))),
        })
    }
}

impl FeeLattice {
    /// True if this bound guarantees the fee can never reach the group's
    /// worst-case inner-transaction cost.
    pub fn is_safely_bounded(&self) -> bool {
        match self {
            FeeLattice::Unknown => false,
            FeeLattice::Bounded(v) => *v < crate::consts::MAX_TRANSACTION_COST,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Instruction;

    fn fee_read() -> Rc<StackValue> {
        StackValue::known(
            Instruction { line: 1, kind: InstructionKind::Txn(TxnField::Fee), block: None },
            vec![],
        )
    }

    fn lit(n: u64) -> Rc<StackValue> {
        StackValue::known(Instruction { line: 2, kind: InstructionKind::Int(n), block: None }, vec![])
    }

    fn cmp(kind: InstructionKind, lhs: Rc<StackValue>, rhs: Rc<StackValue>) -> Rc<StackValue> {
        StackValue::known(Instruction { line: 3, kind, block: None }, vec![lhs, rhs])
    }

    #[test]
    fn less_than_narrows_true_branch_by_one_below() {
        let analysis = FeeFieldAnalysis;
        let expr = cmp(InstructionKind::Less, fee_read(), lit(1000));
        let (t, _f) = analysis.asserted(&expr, TransactionIndex::SELF).unwrap();
        assert_eq!(t, FeeLattice::Bounded(999));
    }

    #[test]
    fn greater_equal_narrows_false_branch_by_one_below() {
        let analysis = FeeFieldAnalysis;
        let expr = cmp(InstructionKind::GreaterE, fee_read(), lit(1000));
        let (_t, f) = analysis.asserted(&expr, TransactionIndex::SELF).unwrap();
        assert_eq!(f, FeeLattice::Bounded(999));
    }

    #[test]
    fn literal_on_left_flips_the_comparator() {
        let analysis = FeeFieldAnalysis;
        // `1000 > fee` reads the same as `fee < 1000`.
        let expr = cmp(InstructionKind::Greater, lit(1000), fee_read());
        let (t, _f) = analysis.asserted(&expr, TransactionIndex::SELF).unwrap();
        assert_eq!(t, FeeLattice::Bounded(999));
    }

    #[test]
    fn union_of_bounded_and_unknown_is_unknown() {
        assert_eq!(FeeFieldAnalysis::union(&FeeLattice::Bounded(5), &FeeLattice::Unknown), FeeLattice::Unknown);
    }

    #[test]
    fn intersect_takes_the_tighter_bound() {
        assert_eq!(FeeFieldAnalysis::intersect(&FeeLattice::Bounded(5), &FeeLattice::Bounded(9)), FeeLattice::Bounded(5));
    }

    #[test]
    fn bound_below_max_cost_is_safe() {
        assert!(FeeLattice::Bounded(1000).is_safely_bounded());
        assert!(!FeeLattice::Unknown.is_safely_bounded());
    }
}
