//! Address-field lattice: `RekeyTo`, `CloseRemainderTo`, `AssetCloseTo`,
//! `Sender`.
//!
//! The lattice element is a finite set of possible addresses, or the two
//! absorbing elements `Any` (no constraint known) and `None` (path is
//! unreachable / over-constrained). Concrete addresses are either the
//! all-zero address, the application creator, or an opaque "some address"
//! standing in for a value the analyzer can't resolve to a literal but can
//! still tell apart from other such values by the instruction that
//! produced it.

use std::collections::BTreeSet;
use std::rc::Rc;

use crate::consts::ZERO_ADDRESS;
use crate::instruction::{GlobalField, InstructionId, InstructionKind, TxnField};
use crate::stack_ast::StackValue;

use super::index_resolution::{resolve_field_read, TransactionIndex};
use super::FieldAnalysis;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AddressValue {
    Zero,
    Creator,
    /// Stands in for an address-producing value the builder can't resolve
    /// to a literal (e.g. `txn Accounts 0`, `arg 0`, `load 3`). Two reads
    /// of the same instruction are the same symbolic address; two
    /// different instructions are always distinct, even if they'd
    /// coincidentally evaluate to the same runtime address.
    Symbolic(InstructionId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AddressLattice {
    Any,
    None,
    Some(BTreeSet<AddressValue>),
}

pub struct AddressFieldAnalysis {
    pub field: TxnField,
}

impl AddressFieldAnalysis {
    pub fn new(field: TxnField) -> Self {
        AddressFieldAnalysis { field }
    }

    fn literal_value(&self, value: &Rc<StackValue>) -> Option<AddressValue> {
        match value.kind()? {
            InstructionKind::Addr(addr) if addr == ZERO_ADDRESS => Some(AddressValue::Zero),
            InstructionKind::Global(GlobalField::ZeroAddress) => Some(AddressValue::Zero),
            InstructionKind::Global(GlobalField::CreatorAddress) => Some(AddressValue::Creator),
            InstructionKind::Addr(_) => Some(AddressValue::Symbolic(value_instruction_id(value))),
            _ => Some(AddressValue::Symbolic(value_instruction_id(value))),
        }
    }

    fn matches_field(&self, value: &Rc<StackValue>, for_index: TransactionIndex) -> bool {
        match resolve_field_read(value) {
            Some((idx, field)) => *field == self.field && index_matches(idx, for_index),
            None => false,
        }
    }
}

fn value_instruction_id(value: &Rc<StackValue>) -> InstructionId {
    match value.as_ref() {
        StackValue::Known { instruction, .. } => instruction.id(),
        StackValue::Unknown => InstructionId(0),
    }
}

fn index_matches(resolved: TransactionIndex, for_index: TransactionIndex) -> bool {
    resolved.index_type == for_index.index_type && resolved.value == for_index.value
}

impl FieldAnalysis for AddressFieldAnalysis {
    type Value = AddressLattice;

    fn universal() -> Self::Value {
        AddressLattice::Any
    }

    fn null() -> Self::Value {
        AddressLattice::None
    }

    fn union(a: &Self::Value, b: &Self::Value) -> Self::Value {
        use AddressLattice::*;
        match (a, b) {
            (Any, _) | (_, Any) => Any,
            (None, x) | (x, None) => x.clone(),
            (Some(x), Some(y)) => Some(x.union(y).cloned().collect()),
        }
    }

    fn intersect(a: &Self::Value, b: &Self::Value) -> Self::Value {
        use AddressLattice::*;
        match (a, b) {
            (Any, x) | (x, Any) => x.clone(),
            (None, _) | (_, None) => None,
            (Some(x), Some(y)) => Some(x.intersection(y).cloned().collect()),
        }
    }

    fn asserted(
        &self,
        value: &Rc<StackValue>,
        for_index: TransactionIndex,
    ) -> Option<(Self::Value, Self::Value)> {
        let (lhs, rhs, is_eq) = match value.kind()? {
            InstructionKind::Eq => (value.arg(0), value.arg(1), true),
            InstructionKind::Neq => (value.arg(0), value.arg(1), false),
            _ => return None,
        };
        let (field_side, literal_side) = if self.matches_field(&lhs, for_index) {
            (lhs, rhs)
        } else if self.matches_field(&rhs, for_index) {
            (rhs, lhs)
        } else {
            return None;
        };
        let _ = field_side;
        let addr = self.literal_value(&literal_side)?;
        let mut singleton = BTreeSet::new();
        singleton.insert(addr);
        let restricted = AddressLattice::Some(singleton);
        if is_eq {
            Some((restricted, AddressLattice::Any))
        } else {
            Some((AddressLattice::Any, restricted))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zero_set() -> AddressLattice {
        let mut s = BTreeSet::new();
        s.insert(AddressValue::Zero);
        AddressLattice::Some(s)
    }

    #[test]
    fn union_with_any_absorbs() {
        assert_eq!(AddressFieldAnalysis::union(&AddressLattice::Any, &zero_set()), AddressLattice::Any);
    }

    #[test]
    fn union_with_none_is_identity() {
        assert_eq!(AddressFieldAnalysis::union(&AddressLattice::None, &zero_set()), zero_set());
    }

    #[test]
    fn intersect_with_none_absorbs() {
        assert_eq!(AddressFieldAnalysis::intersect(&AddressLattice::None, &zero_set()), AddressLattice::None);
    }

    #[test]
    fn intersect_with_any_is_identity() {
        assert_eq!(AddressFieldAnalysis::intersect(&AddressLattice::Any, &zero_set()), zero_set());
    }

    #[test]
    fn symbolic_addresses_from_distinct_instructions_are_distinct() {
        let a = Instruction {
            line: 1,
            kind: InstructionKind::Addr("SOMEADDR1".into()),
            block: None,
        };
        let b = Instruction {
            line: 2,
            kind: InstructionKind::Addr("SOMEADDR1".into()),
            block: None,
        };
        let analysis = AddressFieldAnalysis::new(TxnField::RekeyTo);
        let va = analysis.literal_value(&StackValue::known(a, vec![])).unwrap();
        let vb = analysis.literal_value(&StackValue::known(b, vec![])).unwrap();
        assert_ne!(va, vb, "two textually distinct address literals at different lines are distinct symbols");
    }

    #[test]
    fn asserted_eq_rekeyto_zero_narrows_true_branch_only() {
        let analysis = AddressFieldAnalysis::new(TxnField::RekeyTo);
        let read = StackValue::known(
            Instruction { line: 1, kind: InstructionKind::Txn(TxnField::RekeyTo), block: None },
            vec![],
        );
        let zero = StackValue::known(
            Instruction { line: 2, kind: InstructionKind::Global(GlobalField::ZeroAddress), block: None },
            vec![],
        );
        let eq = StackValue::known(
            Instruction { line: 3, kind: InstructionKind::Eq, block: None },
            vec![read, zero],
        );
        let (t, f) = analysis.asserted(&eq, TransactionIndex::SELF).unwrap();
        assert_eq!(t, zero_set());
        assert_eq!(f, AddressLattice::Any);
    }
}
