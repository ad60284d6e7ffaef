//! Control-flow graph construction.
//!
//! Four passes over the flat instruction list, mirroring how the teacher's
//! interpreter separates "decode" from "link":
//! 1. partition instructions into blocks at every label and every
//!    branch/return/err/retsub/callsub boundary;
//! 2. resolve labels to block ids;
//! 3. link sequential and branch successors/predecessors;
//! 4. walk forward from every `callsub` target to assign subroutine
//!    membership, starting `__main__` at the program's first block.

use std::collections::HashMap;

use crate::block::{BasicBlock, BlockId};
use crate::error::{SourceLine, StructuralError};
use crate::instruction::{Instruction, InstructionKind};
use crate::subroutine::{Subroutine, SubroutineId};

pub struct Cfg {
    pub blocks: Vec<BasicBlock>,
    pub entry: BlockId,
    pub subroutines: HashMap<SubroutineId, Subroutine>,
}

impl Cfg {
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.0]
    }

    pub fn subroutine_of(&self, id: BlockId) -> &Subroutine {
        &self.subroutines[&self.block(id).subroutine]
    }
}

/// Instructions whose mnemonic was a bare `label:` line, stashed by the
/// parser as a zero-arity `Generic` instruction. The CFG builder consumes
/// these to build the label table and then drops them from the block
/// instruction streams — they carry no stack effect.
fn is_label_marker(instr: &Instruction) -> Option<&str> {
    match &instr.kind {
        InstructionKind::Generic { mnemonic, .. } if mnemonic.ends_with(':') => {
            Some(&mnemonic[..mnemonic.len() - 1])
        }
        _ => None,
    }
}

pub fn build(instructions: Vec<Instruction>) -> Result<Cfg, StructuralError> {
    // Pass 0: strip label markers into a line->label and label->line table.
    let mut label_of_line: HashMap<usize, String> = HashMap::new();
    let mut line_of_label: HashMap<String, usize> = HashMap::new();
    let mut body = Vec::with_capacity(instructions.len());
    for instr in instructions {
        if let Some(label) = is_label_marker(&instr) {
            if line_of_label.contains_key(label) {
                return Err(StructuralError::DuplicateLabel {
                    line: SourceLine(instr.line),
                    label: label.to_string(),
                });
            }
            line_of_label.insert(label.to_string(), instr.line);
            label_of_line.insert(instr.line, label.to_string());
            continue;
        }
        body.push(instr);
    }
    if body.is_empty() {
        return Err(StructuralError::UndefinedLabel {
            line: SourceLine(0),
            label: "<no instructions>".to_string(),
        });
    }

    // Pass 1: partition into blocks. A new block starts at the first real
    // instruction after a label, and right after any transfer-of-control
    // instruction.
    let labeled_lines: std::collections::HashSet<usize> = line_of_label.values().copied().collect();
    let mut blocks_raw: Vec<Vec<Instruction>> = Vec::new();
    let mut current: Vec<Instruction> = Vec::new();
    for instr in body {
        let starts_new_block = labeled_lines.contains(&instr.line) && !current.is_empty();
        if starts_new_block {
            blocks_raw.push(std::mem::take(&mut current));
        }
        let ends_block = instr.kind.is_unconditional_transfer() || instr.kind.is_conditional_branch();
        current.push(instr);
        if ends_block {
            blocks_raw.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        blocks_raw.push(current);
    }

    // Map each instruction's line to the block that now contains it, and
    // each label to that block's id.
    let mut line_to_block: HashMap<usize, BlockId> = HashMap::new();
    for (idx, blk) in blocks_raw.iter().enumerate() {
        for instr in blk {
            line_to_block.insert(instr.line, BlockId(idx));
        }
    }
    let mut label_to_block: HashMap<String, BlockId> = HashMap::new();
    for (label, line) in &line_of_label {
        // A label may be attached to a line with no instruction (trailing
        // label at EOF is structurally invalid) — resolved via the first
        // instruction line at or after the label's line.
        if let Some(&bid) = line_to_block.get(line) {
            label_to_block.insert(label.clone(), bid);
        }
    }

    let mut blocks: Vec<BasicBlock> = blocks_raw
        .into_iter()
        .enumerate()
        .map(|(idx, instrs)| BasicBlock::new(BlockId(idx), instrs, SubroutineId::Main))
        .collect();

    // Pass 2 + 3: link successors/predecessors.
    let n = blocks.len();
    let mut edges: Vec<(BlockId, BlockId)> = Vec::new();
    let mut callsub_targets: Vec<(BlockId, BlockId)> = Vec::new(); // (caller block, callee entry)
    for idx in 0..n {
        let bid = BlockId(idx);
        let exit_kind = blocks[idx].exit_instruction().kind.clone();
        match &exit_kind {
            InstructionKind::B(label) => {
                let target = resolve_label(&label_to_block, label, &blocks[idx])?;
                edges.push((bid, target));
            }
            InstructionKind::Bz(label) | InstructionKind::Bnz(label) => {
                let target = resolve_label(&label_to_block, label, &blocks[idx])?;
                edges.push((bid, target));
                if idx + 1 < n {
                    edges.push((bid, BlockId(idx + 1)));
                }
            }
            InstructionKind::Callsub(label) => {
                let target = resolve_label(&label_to_block, label, &blocks[idx])?;
                callsub_targets.push((bid, target));
                edges.push((bid, target));
                if idx + 1 < n {
                    let rp = BlockId(idx + 1);
                    blocks[idx].sub_return_point = Some(rp);
                    blocks[rp.0].callsub_block = Some(bid);
                }
            }
            InstructionKind::Retsub => {
                blocks[idx].is_retsub = true;
            }
            InstructionKind::Err | InstructionKind::Return => {}
            _ => {
                if idx + 1 < n {
                    edges.push((bid, BlockId(idx + 1)));
                }
            }
        }
    }
    for (from, to) in &edges {
        blocks[to.0].predecessors.push(*from);
        blocks[from.0].successors.push(*to);
    }
    for (_, callee_entry) in &callsub_targets {
        blocks[callee_entry.0].is_callsub_entry = true;
    }

    // Pass 4: subroutine discovery by forward traversal from each distinct
    // callsub target; everything unreached by that stays in __main__.
    let entry = BlockId(0);
    let mut subroutines: HashMap<SubroutineId, Subroutine> = HashMap::new();
    let mut assigned: HashMap<BlockId, SubroutineId> = HashMap::new();

    let mut distinct_callees: Vec<BlockId> = callsub_targets.iter().map(|(_, t)| *t).collect();
    distinct_callees.sort_by_key(|b| b.0);
    distinct_callees.dedup();

    for (sub_idx, callee_entry) in distinct_callees.iter().enumerate() {
        let sid = SubroutineId::Named(sub_idx);
        let members = reachable_without_crossing_other_entries(&blocks, *callee_entry, &distinct_callees);
        let mut sub = Subroutine::new(sid, *callee_entry);
        sub.blocks = members.clone();
        for m in &members {
            assigned.insert(*m, sid);
            blocks[m.0].subroutine = sid;
            if blocks[m.0].is_retsub {
                sub.retsub_blocks.push(*m);
            }
        }
        subroutines.insert(sid, sub);
    }
    let mut main = Subroutine::new(SubroutineId::Main, entry);
    main.blocks = (0..n)
        .map(BlockId)
        .filter(|b| !assigned.contains_key(b))
        .collect();
    for m in &main.blocks {
        if blocks[m.0].is_retsub {
            main.retsub_blocks.push(*m);
        }
    }
    subroutines.insert(SubroutineId::Main, main);

    // A retsub reachable only as part of __main__ has no enclosing callsub.
    if let Some(&bad) = subroutines[&SubroutineId::Main].retsub_blocks.first() {
        return Err(StructuralError::UnscopedRetsub(SourceLine(
            blocks[bad.0].exit_instruction().line,
        )));
    }

    for (caller, callee_entry) in &callsub_targets {
        let callee_sid = blocks[callee_entry.0].subroutine;
        subroutines.get_mut(&callee_sid).unwrap().callers.push(*caller);
    }

    // Pass 5: lift `retsub` to the global CFG — every retsub block gets an
    // edge to the return-point block of every caller of its subroutine, so
    // inter-procedural traversal (detectors, the dataflow framework) can
    // walk through a `callsub`/`retsub` pair like any other edge.
    let mut retsub_edges: Vec<(BlockId, BlockId)> = Vec::new();
    for sub in subroutines.values() {
        if sub.retsub_blocks.is_empty() {
            continue;
        }
        for &caller in &sub.callers {
            let Some(rp) = blocks[caller.0].sub_return_point else {
                continue;
            };
            for &retsub_block in &sub.retsub_blocks {
                retsub_edges.push((retsub_block, rp));
            }
        }
    }
    for (from, to) in &retsub_edges {
        blocks[from.0].successors.push(*to);
        blocks[to.0].predecessors.push(*from);
    }

    for b in blocks.iter_mut() {
        b.is_leaf = b.successors.is_empty();
    }
    for sub in subroutines.values_mut() {
        sub.exit_blocks = sub
            .blocks
            .iter()
            .copied()
            .filter(|b| blocks[b.0].is_leaf)
            .collect();
    }

    Ok(Cfg {
        blocks,
        entry,
        subroutines,
    })
}

fn resolve_label(
    label_to_block: &HashMap<String, BlockId>,
    label: &str,
    from_block: &BasicBlock,
) -> Result<BlockId, StructuralError> {
    label_to_block
        .get(label)
        .copied()
        .ok_or_else(|| StructuralError::UndefinedLabel {
            line: SourceLine(from_block.exit_instruction().line),
            label: label.to_string(),
        })
}

/// Blocks reachable from `start` by following successor edges, without
/// crossing into another subroutine's declared entry block (so a callee's
/// body doesn't swallow a sibling subroutine reached only via callsub).
fn reachable_without_crossing_other_entries(
    blocks: &[BasicBlock],
    start: BlockId,
    other_entries: &[BlockId],
) -> Vec<BlockId> {
    let mut seen = vec![start];
    let mut stack = vec![start];
    while let Some(b) = stack.pop() {
        for &succ in &blocks[b.0].successors {
            if succ != start && other_entries.contains(&succ) {
                continue;
            }
            if !seen.contains(&succ) {
                seen.push(succ);
                stack.push(succ);
            }
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    fn build_src(src: &str) -> Cfg {
        let prog = parser::parse(src).unwrap();
        build(prog.instructions).unwrap()
    }

    #[test]
    fn single_block_program_has_one_block() {
        let cfg = build_src("#pragma version 6\nint 1\nreturn\n");
        assert_eq!(cfg.blocks.len(), 1);
        assert!(cfg.block(BlockId(0)).is_leaf);
    }

    #[test]
    fn branch_splits_into_three_blocks() {
        let cfg = build_src(
            "#pragma version 6\nint 1\nbz fail\nint 1\nreturn\nfail:\nerr\n",
        );
        // entry (ending in bz), the fallthrough success block, the fail block.
        assert_eq!(cfg.blocks.len(), 3);
        let entry = cfg.block(BlockId(0));
        assert_eq!(entry.successors.len(), 2);
    }

    #[test]
    fn undefined_label_is_structural_error() {
        let prog = parser::parse("#pragma version 6\nb nowhere\n").unwrap();
        let err = build(prog.instructions).unwrap_err();
        assert!(matches!(err, StructuralError::UndefinedLabel { .. }));
    }

    #[test]
    fn retsub_without_callsub_is_structural_error() {
        let prog = parser::parse("#pragma version 6\nretsub\n").unwrap();
        let err = build(prog.instructions).unwrap_err();
        assert!(matches!(err, StructuralError::UnscopedRetsub(_)));
    }

    #[test]
    fn callsub_links_to_callee_entry_and_retsub_lifts_to_return_point() {
        let cfg = build_src(
            "#pragma version 6\ncallsub sub\nint 1\nreturn\nsub:\nretsub\n",
        );
        // B0: callsub sub ; B1: int 1 / return ; B2 (sub): retsub
        assert_eq!(cfg.blocks.len(), 3);
        let callsub_block = cfg.block(BlockId(0));
        assert_eq!(callsub_block.sub_return_point, Some(BlockId(1)));
        let callee_entry = callsub_block.successors[0];
        assert!(cfg.block(callee_entry).is_callsub_entry);
        // The retsub block must have a global-CFG edge back to the
        // return point, not just a local successor.
        let retsub_block = cfg.blocks.iter().find(|b| b.is_retsub).unwrap();
        assert!(retsub_block.successors.contains(&BlockId(1)));
    }

    #[test]
    fn subroutine_called_twice_is_one_subroutine_with_two_callers() {
        let cfg = build_src(
            "#pragma version 6\ncallsub sub\ncallsub sub\nint 1\nreturn\nsub:\nretsub\n",
        );
        let named = cfg
            .subroutines
            .values()
            .find(|s| !s.is_main())
            .expect("one named subroutine");
        assert_eq!(named.callers.len(), 2);
    }
}
