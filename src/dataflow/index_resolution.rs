//! Resolving which transaction in the group a field read targets.
//!
//! `txn F` always targets the executing transaction. `gtxn N F` names an
//! absolute index syntactically. `gtxns F` takes the index off the stack,
//! so the index itself has to be reconstructed from the stack-AST operand:
//! either a plain `Txn GroupIndex` read (relative offset zero, i.e. "this
//! transaction" spelled the indirect way), or an addition/subtraction of a
//! literal against `Txn GroupIndex` (a peer at a fixed relative offset), or
//! anything else, which resolves to `Unknown`.

use std::rc::Rc;

use crate::instruction::{InstructionKind, TxnField};
use crate::stack_ast::StackValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    /// The executing transaction itself (`txn`, or `gtxns` on an index
    /// expression equal to `Txn GroupIndex`).
    SelfIndex,
    /// A literal absolute index (`gtxn N`, or `gtxns` on a constant).
    Absolute,
    /// A fixed signed offset from the executing transaction's index
    /// (`gtxns` on `Txn GroupIndex + c` or `c + Txn GroupIndex`).
    Relative,
    /// The index couldn't be resolved to any of the above.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionIndex {
    pub index_type: IndexType,
    pub value: i64,
}

impl TransactionIndex {
    pub const SELF: TransactionIndex = TransactionIndex {
        index_type: IndexType::SelfIndex,
        value: 0,
    };
    pub const UNKNOWN: TransactionIndex = TransactionIndex {
        index_type: IndexType::Unknown,
        value: 0,
    };

    pub fn absolute(idx: i64) -> Self {
        TransactionIndex {
            index_type: IndexType::Absolute,
            value: idx,
        }
    }

    pub fn relative(offset: i64) -> Self {
        if offset == 0 {
            Self::SELF
        } else {
            TransactionIndex {
                index_type: IndexType::Relative,
                value: offset,
            }
        }
    }
}

/// A field read together with the resolved transaction index it targets,
/// if the stack-AST node is a `Txn`/`Gtxn`/`Gtxns` read at all.
pub fn resolve_field_read(value: &Rc<StackValue>) -> Option<(TransactionIndex, &TxnField)> {
    let instr = value.kind()?;
    match instr {
        InstructionKind::Txn(field) => Some((TransactionIndex::SELF, field)),
        InstructionKind::Gtxn { idx, field } => Some((TransactionIndex::absolute(*idx as i64), field)),
        InstructionKind::Gtxns(field) => {
            let index_expr = value.arg(0);
            Some((resolve_index_expr(&index_expr), field))
        }
        _ => None,
    }
}

fn resolve_index_expr(value: &Rc<StackValue>) -> TransactionIndex {
    match value.kind() {
        Some(InstructionKind::Txn(TxnField::GroupIndex)) => TransactionIndex::SELF,
        Some(InstructionKind::Int(n)) => TransactionIndex::absolute(*n as i64),
        Some(InstructionKind::Add) => resolve_offset_from_group_index(value, 1),
        Some(InstructionKind::Sub) => resolve_offset_from_group_index(value, -1),
        _ => TransactionIndex::UNKNOWN,
    }
}

/// Matches `Txn GroupIndex + int c`, `int c + Txn GroupIndex` (sign +1),
/// or `Txn GroupIndex - int c` (sign -1; subtraction is not commutative so
/// only the left-operand-is-GroupIndex form is meaningful).
fn resolve_offset_from_group_index(value: &Rc<StackValue>, sign: i64) -> TransactionIndex {
    let lhs = value.arg(0);
    let rhs = value.arg(1);
    let is_group_index = |v: &Rc<StackValue>| matches!(v.kind(), Some(InstructionKind::Txn(TxnField::GroupIndex)));
    let as_const = |v: &Rc<StackValue>| match v.kind() {
        Some(InstructionKind::Int(n)) => Some(*n as i64),
        _ => None,
    };

    if is_group_index(&lhs) {
        if let Some(c) = as_const(&rhs) {
            return TransactionIndex::relative(sign * c);
        }
    } else if sign > 0 && is_group_index(&rhs) {
        // Addition only: commutative, so `c + Txn GroupIndex` also counts.
        if let Some(c) = as_const(&lhs) {
            return TransactionIndex::relative(c);
        }
    }
    TransactionIndex::UNKNOWN
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Instruction;

    fn group_index() -> Rc<StackValue> {
        StackValue::known(
            Instruction { line: 1, kind: InstructionKind::Txn(TxnField::GroupIndex), block: None },
            vec![],
        )
    }

    fn lit(n: u64) -> Rc<StackValue> {
        StackValue::known(Instruction { line: 2, kind: InstructionKind::Int(n), block: None }, vec![])
    }

    #[test]
    fn gtxn_immediate_resolves_to_absolute() {
        let read = StackValue::known(
            Instruction { line: 1, kind: InstructionKind::Gtxn { idx: 2, field: TxnField::Fee }, block: None },
            vec![],
        );
        let (idx, field) = resolve_field_read(&read).unwrap();
        assert_eq!(idx, TransactionIndex::absolute(2));
        assert_eq!(*field, TxnField::Fee);
    }

    #[test]
    fn gtxns_on_group_index_plus_literal_resolves_relative() {
        let add = StackValue::known(
            Instruction { line: 3, kind: InstructionKind::Add, block: None },
            vec![group_index(), lit(1)],
        );
        let read = StackValue::known(
            Instruction { line: 4, kind: InstructionKind::Gtxns(TxnField::Sender), block: None },
            vec![add],
        );
        let (idx, _) = resolve_field_read(&read).unwrap();
        assert_eq!(idx, TransactionIndex::relative(1));
    }

    #[test]
    fn gtxns_on_group_index_minus_literal_resolves_negative_relative() {
        let sub = StackValue::known(
            Instruction { line: 3, kind: InstructionKind::Sub, block: None },
            vec![group_index(), lit(2)],
        );
        let read = StackValue::known(
            Instruction { line: 4, kind: InstructionKind::Gtxns(TxnField::Sender), block: None },
            vec![sub],
        );
        let (idx, _) = resolve_field_read(&read).unwrap();
        assert_eq!(idx, TransactionIndex::relative(-2));
    }

    #[test]
    fn gtxns_on_opaque_expression_is_unknown() {
        let opaque = StackValue::unknown();
        let read = StackValue::known(
            Instruction { line: 4, kind: InstructionKind::Gtxns(TxnField::Sender), block: None },
            vec![opaque],
        );
        let (idx, _) = resolve_field_read(&read).unwrap();
        assert_eq!(idx, TransactionIndex::UNKNOWN);
    }

    #[test]
    fn relative_offset_zero_collapses_to_self() {
        assert_eq!(TransactionIndex::relative(0), TransactionIndex::SELF);
    }
}
