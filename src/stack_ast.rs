//! Local stack-effect reconstruction.
//!
//! Replays a block's instructions over an abstract stack of [`StackValue`]
//! trees so that, e.g., `txn Sender; txn RekeyTo; ==` is recovered as
//! `Eq(Txn(Sender), Txn(RekeyTo))` rather than three disconnected
//! instructions. Reconstruction is purely local to a block — the
//! incoming stack is always assumed non-empty-but-unknown, matching the
//! framework's treatment of values that outlive a block boundary as
//! already-committed facts rather than stack slots.

use std::collections::HashMap;
use std::rc::Rc;

use crate::block::{BasicBlock, BlockId};
use crate::instruction::{Instruction, InstructionKind};

/// A reconstructed value: either a fully-known expression tree rooted at
/// the instruction that produced it, or a value this builder gave up on
/// (consumed from below an empty known stack, or produced by an opcode
/// with no semantic meaning to the dataflow layer).
#[derive(Debug, Clone, PartialEq)]
pub enum StackValue {
    Known {
        instruction: Instruction,
        args: Vec<Rc<StackValue>>,
    },
    Unknown,
}

impl StackValue {
    pub fn known(instruction: Instruction, args: Vec<Rc<StackValue>>) -> Rc<StackValue> {
        Rc::new(StackValue::Known { instruction, args })
    }

    pub fn unknown() -> Rc<StackValue> {
        Rc::new(StackValue::Unknown)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, StackValue::Unknown)
    }

    pub fn kind(&self) -> Option<&InstructionKind> {
        match self {
            StackValue::Known { instruction, .. } => Some(&instruction.kind),
            StackValue::Unknown => None,
        }
    }

    pub fn arg(&self, idx: usize) -> Rc<StackValue> {
        match self {
            StackValue::Known { args, .. } => args.get(idx).cloned().unwrap_or_else(StackValue::unknown),
            StackValue::Unknown => StackValue::unknown(),
        }
    }
}

/// One traced step: the instruction and the arguments it popped, whether
/// or not it pushed a value of its own.
pub type TraceStep = (Instruction, Vec<Rc<StackValue>>);

/// Replays one block's instructions, recording each instruction's
/// consumed operands — including zero-push instructions like `assert`
/// whose operand would otherwise vanish once popped.
///
/// Memoized by the caller keyed on [`BlockId`] since a block's local
/// stack effect never depends on which predecessor reached it.
pub fn build_block_trace(block: &BasicBlock) -> Vec<TraceStep> {
    let mut stack: Vec<Rc<StackValue>> = Vec::new();
    let mut trace = Vec::with_capacity(block.instructions.len());
    for instr in &block.instructions {
        let pops = instr.pop_arity();
        let mut args = Vec::with_capacity(pops);
        for _ in 0..pops {
            args.push(stack.pop().unwrap_or_else(StackValue::unknown));
        }
        args.reverse();
        let pushes = instr.push_arity();
        if pushes > 0 {
            let value = StackValue::known(instr.clone(), args.clone());
            for _ in 0..pushes {
                stack.push(value.clone());
            }
        }
        trace.push((instr.clone(), args));
    }
    trace
}

/// Per-contract memo table keyed by block id, since stack reconstruction
/// is pure given a block's instruction list.
#[derive(Default)]
pub struct StackAstCache {
    cache: HashMap<BlockId, Rc<Vec<TraceStep>>>,
}

impl StackAstCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trace(&mut self, block: &BasicBlock) -> Rc<Vec<TraceStep>> {
        self.cache
            .entry(block.id)
            .or_insert_with(|| Rc::new(build_block_trace(block)))
            .clone()
    }
}

/// The operand a block's terminal `assert`/`bz`/`bnz`/`return` consumes,
/// if its last instruction is one of those.
pub fn terminal_condition(block: &BasicBlock, cache: &mut StackAstCache) -> Option<Rc<StackValue>> {
    let trace = cache.trace(block);
    let (instr, args) = trace.last()?;
    match instr.kind {
        InstructionKind::Assert
        | InstructionKind::Bz(_)
        | InstructionKind::Bnz(_)
        | InstructionKind::Return => Some(args.first().cloned().unwrap_or_else(StackValue::unknown)),
        _ => None,
    }
}

/// Every `assert` operand within a block, in program order — including
/// ones that aren't the block's last instruction, since `assert` never
/// ends a basic block.
pub fn assert_conditions(block: &BasicBlock, cache: &mut StackAstCache) -> Vec<Rc<StackValue>> {
    let trace = cache.trace(block);
    trace
        .iter()
        .filter(|(instr, _)| matches!(instr.kind, InstructionKind::Assert))
        .map(|(_, args)| args.first().cloned().unwrap_or_else(StackValue::unknown))
        .collect()
}

/// Result of flattening a chain of same-connective `And`/`Or` nodes:
/// the list of non-connective leaf equations found, and whether any
/// operand along the way was an opaque `Unknown` value.
///
/// Grounded on the treatment of unknown operands in boolean connective
/// flattening: an `Unknown` leaf never contributes a known equation, but
/// it must still widen the connective's negated branch to universal,
/// which is why `has_unknown_value` is tracked separately from the
/// equation list rather than folded into it.
pub struct FlattenedConnective {
    pub equations: Vec<Rc<StackValue>>,
    pub has_unknown_value: bool,
}

/// Which connective is currently being flattened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connective {
    And,
    Or,
}

fn connective_of(kind: &InstructionKind) -> Option<Connective> {
    match kind {
        InstructionKind::And => Some(Connective::And),
        InstructionKind::Or => Some(Connective::Or),
        _ => None,
    }
}

/// Walk `value` collecting leaf equations, descending only through nodes
/// of the same connective as the root (stopping at a different
/// connective, which is itself a leaf equation, or at a non-connective
/// leaf).
pub fn flatten_connective(value: &Rc<StackValue>, root: Connective) -> FlattenedConnective {
    let mut equations = Vec::new();
    let mut has_unknown_value = false;
    let mut stack = vec![value.clone()];
    while let Some(v) = stack.pop() {
        match v.as_ref() {
            StackValue::Unknown => has_unknown_value = true,
            StackValue::Known { instruction, args } => {
                match connective_of(&instruction.kind) {
                    Some(c) if c == root => {
                        for a in args {
                            stack.push(a.clone());
                        }
                    }
                    _ => equations.push(v.clone()),
                }
            }
        }
    }
    FlattenedConnective {
        equations,
        has_unknown_value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::InstructionKind;

    fn instr(line: usize, kind: InstructionKind) -> Instruction {
        Instruction { line, kind, block: None }
    }

    fn eq_leaf(line: usize) -> Rc<StackValue> {
        StackValue::known(instr(line, InstructionKind::Eq), vec![StackValue::unknown(), StackValue::unknown()])
    }

    #[test]
    fn flatten_and_collects_nested_leaves_and_stops_at_or() {
        let leaf_a = eq_leaf(1);
        let leaf_b = eq_leaf(2);
        let or_leaf = StackValue::known(instr(3, InstructionKind::Or), vec![StackValue::unknown(), StackValue::unknown()]);
        let inner_and = StackValue::known(instr(4, InstructionKind::And), vec![leaf_a.clone(), or_leaf.clone()]);
        let outer_and = StackValue::known(instr(5, InstructionKind::And), vec![inner_and, leaf_b.clone()]);

        let flat = flatten_connective(&outer_and, Connective::And);
        assert!(!flat.has_unknown_value);
        assert_eq!(flat.equations.len(), 3);
        assert!(flat.equations.contains(&or_leaf));
    }

    #[test]
    fn flatten_reports_unknown_leaf_separately_from_equations() {
        let leaf_a = eq_leaf(1);
        let and = StackValue::known(instr(2, InstructionKind::And), vec![leaf_a.clone(), StackValue::unknown()]);

        let flat = flatten_connective(&and, Connective::And);
        assert!(flat.has_unknown_value);
        assert_eq!(flat.equations, vec![leaf_a]);
    }

    #[test]
    fn underflow_produces_unknown_args() {
        let block = crate::block::BasicBlock::new(
            crate::block::BlockId(0),
            vec![instr(1, InstructionKind::Assert)],
            crate::subroutine::SubroutineId::Main,
        );
        let trace = build_block_trace(&block);
        assert_eq!(trace.len(), 1);
        assert!(trace[0].1[0].is_unknown());
    }

    #[test]
    fn eq_of_two_txn_reads_builds_known_tree() {
        let block = crate::block::BasicBlock::new(
            crate::block::BlockId(0),
            vec![
                instr(1, InstructionKind::Txn(crate::instruction::TxnField::Sender)),
                instr(2, InstructionKind::Txn(crate::instruction::TxnField::RekeyTo)),
                instr(3, InstructionKind::Eq),
                instr(4, InstructionKind::Assert),
            ],
            crate::subroutine::SubroutineId::Main,
        );
        let mut cache = StackAstCache::new();
        let conds = assert_conditions(&block, &mut cache);
        assert_eq!(conds.len(), 1);
        match conds[0].as_ref() {
            StackValue::Known { instruction, args } => {
                assert_eq!(instruction.kind, InstructionKind::Eq);
                assert_eq!(args.len(), 2);
            }
            StackValue::Unknown => panic!("expected a known Eq node"),
        }
    }
}
