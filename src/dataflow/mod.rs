//! Transaction-context dataflow framework.
//!
//! One instantiation of [`FieldAnalysis`] per tracked field; [`run`] drives
//! the shared phase A→B→C→D algorithm over any of them. Field-specific
//! semantics (what a comparison against this field proves) live in the
//! sibling `address`/`fee`/`group`/`txntype` modules; everything about
//! *how* those per-condition facts get propagated through a CFG with
//! subroutines lives here, once.

pub mod address;
pub mod fee;
pub mod group;
pub mod index_resolution;
pub mod txntype;

use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::consts::MAX_GROUP_SIZE;
use crate::contract::Contract;
use crate::instruction::InstructionKind;
use crate::stack_ast::{self, Connective, StackAstCache};

use index_resolution::TransactionIndex;

/// A field-specific lattice: the operations the dataflow engine needs to
/// merge facts across branches (`union`), narrow them along a single path
/// (`intersect`), and read off what a boolean condition proves about this
/// field (`asserted`).
pub trait FieldAnalysis {
    type Value: Clone + PartialEq;

    /// Top: no constraint known. Seeds the entry block in the forward pass.
    fn universal() -> Self::Value;

    /// Bottom: unreachable / fully vacuous. Seeds non-leaf blocks in the
    /// backward pass before their successors' facts are unioned in.
    fn null() -> Self::Value;

    /// Merge facts from alternative paths (OR): the result must hold
    /// given *either* input holds.
    fn union(a: &Self::Value, b: &Self::Value) -> Self::Value;

    /// Combine facts that must both hold (AND): the result is at least as
    /// strong as either input.
    fn intersect(a: &Self::Value, b: &Self::Value) -> Self::Value;

    /// What a boolean condition proves about this field, if anything,
    /// when read at `for_index`. Returns `(true_branch, false_branch)`:
    /// the value's constraint on this field given the condition evaluates
    /// true, and given it evaluates false. `None` if the condition says
    /// nothing about this field at this index.
    fn asserted(&self, value: &Rc<stack_ast::StackValue>, for_index: TransactionIndex) -> Option<(Self::Value, Self::Value)>;
}

/// `(true_branch, false_branch)` for an arbitrary boolean stack-AST node,
/// recursing through `And`/`Or`/`Not` per the flattening rules: `And`'s
/// true side is unaffected by unknown operands (intersecting only the
/// knowns), but its false side widens to universal if any operand was
/// unknown, since an unknown operand could have been what made the whole
/// expression false. `Or` mirrors this on the other branch.
pub fn get_asserted<A: FieldAnalysis>(
    analysis: &A,
    value: &Rc<stack_ast::StackValue>,
    for_index: TransactionIndex,
) -> (A::Value, A::Value) {
    match value.kind() {
        Some(InstructionKind::Not) => {
            let (t, f) = get_asserted(analysis, &value.arg(0), for_index);
            (f, t)
        }
        Some(InstructionKind::And) => {
            let flat = stack_ast::flatten_connective(value, Connective::And);
            let mut true_ctx = A::universal();
            let mut false_ctx = A::null();
            for eq in &flat.equations {
                let (t, f) = get_asserted(analysis, eq, for_index);
                true_ctx = A::intersect(&true_ctx, &t);
                false_ctx = A::union(&false_ctx, &f);
            }
            if flat.has_unknown_value {
                false_ctx = A::universal();
            }
            (true_ctx, false_ctx)
        }
        Some(InstructionKind::Or) => {
            let flat = stack_ast::flatten_connective(value, Connective::Or);
            let mut true_ctx = A::null();
            let mut false_ctx = A::universal();
            for eq in &flat.equations {
                let (t, f) = get_asserted(analysis, eq, for_index);
                true_ctx = A::union(&true_ctx, &t);
                false_ctx = A::intersect(&false_ctx, &f);
            }
            if flat.has_unknown_value {
                true_ctx = A::universal();
            }
            (true_ctx, false_ctx)
        }
        _ => analysis
            .asserted(value, for_index)
            .unwrap_or_else(|| (A::universal(), A::universal())),
    }
}

/// Per-block facts plus the per-edge refinements `bz`/`bnz` contribute,
/// computed once per target index and reused by both the forward and
/// backward passes.
struct LocalFacts<V> {
    block_local: HashMap<crate::block::BlockId, V>,
    path: HashMap<(crate::block::BlockId, crate::block::BlockId), V>,
}

fn compute_local_facts<A: FieldAnalysis>(
    contract: &Contract,
    analysis: &A,
    cache: &mut StackAstCache,
    for_index: TransactionIndex,
) -> LocalFacts<A::Value> {
    use crate::block::BlockId;
    let mut block_local = HashMap::new();
    let mut path = HashMap::new();

    for block in contract.blocks() {
        let mut local = A::universal();
        for cond in stack_ast::assert_conditions(block, cache) {
            let (t, _f) = get_asserted(analysis, &cond, for_index);
            local = A::intersect(&local, &t);
        }

        if matches!(block.exit_instruction().kind, InstructionKind::Err) {
            // `err` always rejects: no field value lets execution continue
            // past this block.
            local = A::null();
        }

        if let Some(terminal) = stack_ast::terminal_condition(block, cache) {
            match block.exit_instruction().kind {
                InstructionKind::Return => {
                    if is_literal_zero(&terminal) {
                        // `return 0` rejects unconditionally, same as `err`.
                        local = A::null();
                    } else {
                        let (t, _f) = get_asserted(analysis, &terminal, for_index);
                        local = A::intersect(&local, &t);
                    }
                }
                InstructionKind::Bz(_) | InstructionKind::Bnz(_) => {
                    let (t, f) = get_asserted(analysis, &terminal, for_index);
                    let bnz = matches!(block.exit_instruction().kind, InstructionKind::Bnz(_));
                    let (true_target, false_target) = branch_targets(block);
                    let (to_label, to_fallthrough) = if bnz { (t, f) } else { (f, t) };
                    if let Some(tgt) = true_target {
                        path.insert((block.id, tgt), to_label.clone());
                    }
                    if let Some(tgt) = false_target {
                        path.insert((block.id, tgt), to_fallthrough.clone());
                    }
                }
                _ => {}
            }
        }

        block_local.insert(block.id, local);
    }

    let _ = BlockId(0);
    LocalFacts { block_local, path }
}

/// True for a stack value that is literally the integer constant `0`
/// (`int 0`/`pushint 0`), per spec.md §4.3's `return(e)` special case:
/// `return 0` rejects unconditionally, the same as `err`, rather than
/// merely asserting the field takes some truthy-implied value.
fn is_literal_zero(value: &std::rc::Rc<stack_ast::StackValue>) -> bool {
    matches!(
        value.kind(),
        Some(InstructionKind::Int(0)) | Some(InstructionKind::PushInt(0))
    )
}

/// Returns `(label_target, fallthrough_target)` for a block ending in
/// `bz`/`bnz`: successors are recorded in CFG order (label first, then
/// fallthrough) by the builder.
fn branch_targets(block: &crate::block::BasicBlock) -> (Option<crate::block::BlockId>, Option<crate::block::BlockId>) {
    (block.successors.first().copied(), block.successors.get(1).copied())
}

/// Phase B: forward, reaching-definitions-style worklist.
///
/// `reach_in(entry) = universal`; every other block's `reach_in` is the
/// union, over its global predecessors, of that predecessor's `reach_out`
/// refined by the edge's path fact — and, when the block is a
/// sub-return-point, additionally intersected with the callsub block's own
/// `reach_out` (execution reaches the return point only if control reached
/// the callsite in the first place; the union-over-predecessors term alone
/// already captures "the callee actually returned", since a return point's
/// global predecessors, after the CFG builder lifts `retsub` to the global
/// CFG, are exactly the callee's `retsub` blocks).
fn run_phase_b<A: FieldAnalysis>(
    contract: &Contract,
    facts: &LocalFacts<A::Value>,
) -> HashMap<crate::block::BlockId, A::Value> {
    use crate::block::BlockId;

    let blocks = contract.blocks();
    let n = blocks.len();
    let entry = contract.entry_block();

    let mut out_ctx: HashMap<BlockId, A::Value> = blocks.iter().map(|b| (b.id, A::null())).collect();

    let mut queue: VecDeque<BlockId> = (0..n).map(BlockId).collect();
    let mut in_queue = vec![true; n];
    let max_iterations = n.saturating_mul(8).max(64);
    let mut iterations = 0usize;

    while let Some(b) = queue.pop_front() {
        in_queue[b.0] = false;
        iterations += 1;
        if iterations > max_iterations {
            tracing::debug!("forward worklist exceeded iteration budget, stopping early");
            break;
        }
        let block = contract.block(b);

        let new_in = if b == entry {
            A::universal()
        } else {
            let mut merged = A::null();
            for &pred in &block.predecessors {
                let pred_out = out_ctx.get(&pred).cloned().unwrap_or_else(A::null);
                let refined = match facts.path.get(&(pred, b)) {
                    Some(edge_fact) => A::intersect(&pred_out, edge_fact),
                    None => pred_out,
                };
                merged = A::union(&merged, &refined);
            }
            if let Some(callsub_block) = block.callsub_block {
                let caller_out = out_ctx.get(&callsub_block).cloned().unwrap_or_else(A::null);
                merged = A::intersect(&merged, &caller_out);
            }
            merged
        };

        let new_out = A::intersect(&new_in, &facts.block_local[&b]);
        let changed = out_ctx.get(&b).map(|v| v != &new_out).unwrap_or(true);
        out_ctx.insert(b, new_out);

        if changed {
            for &succ in &block.successors {
                if !in_queue[succ.0] {
                    queue.push_back(succ);
                    in_queue[succ.0] = true;
                }
            }
            // A callsub block's own out-context feeds its return point's
            // `reach_in` directly (see above), independent of any normal
            // successor edge.
            if let Some(rp) = block.sub_return_point {
                if !in_queue[rp.0] {
                    queue.push_back(rp);
                    in_queue[rp.0] = true;
                }
            }
        }
    }

    tracing::debug!(blocks = n, iterations, "phase B (forward) converged");
    out_ctx
}

/// Phase C: backward, live-variables-style worklist over phase B's result.
///
/// `live_out` starts at `block_ctx[B]` (phase B's `reach_out`) for leaf
/// blocks (no global successors) and `null` elsewhere; `live_in(B)` unions
/// `live_out` over global successors, additionally intersected with the
/// return point's `live_out` when `B` is a callsub block whose callee can
/// actually return (an empty `retsub_blocks` set means the callee never
/// returns, so the callsub block contributes nothing to its return point —
/// the degenerate case spec.md's boundary behaviors call out). The final
/// `live_out(B)` replaces `block_ctx[B]` and is what every field analysis
/// exposes to callers.
fn run_phase_c<A: FieldAnalysis>(
    contract: &Contract,
    post_b: &HashMap<crate::block::BlockId, A::Value>,
) -> HashMap<crate::block::BlockId, A::Value> {
    use crate::block::BlockId;

    let blocks = contract.blocks();
    let n = blocks.len();

    let mut live_out: HashMap<BlockId, A::Value> = blocks
        .iter()
        .map(|b| {
            let seed = if b.successors.is_empty() {
                post_b.get(&b.id).cloned().unwrap_or_else(A::null)
            } else {
                A::null()
            };
            (b.id, seed)
        })
        .collect();

    let mut queue: VecDeque<BlockId> = (0..n).rev().map(BlockId).collect();
    let mut in_queue = vec![true; n];
    let max_iterations = n.saturating_mul(8).max(64);
    let mut iterations = 0usize;

    while let Some(b) = queue.pop_front() {
        in_queue[b.0] = false;
        iterations += 1;
        if iterations > max_iterations {
            tracing::debug!("backward worklist exceeded iteration budget, stopping early");
            break;
        }
        let block = contract.block(b);

        let mut merged = A::null();
        for &succ in &block.successors {
            let succ_live = live_out.get(&succ).cloned().unwrap_or_else(A::null);
            merged = A::union(&merged, &succ_live);
        }
        if let Some(rp) = block.sub_return_point {
            let callee = contract.block(*block.successors.first().unwrap_or(&b)).subroutine;
            if contract.subroutine(callee).can_return() {
                let rp_live = live_out.get(&rp).cloned().unwrap_or_else(A::null);
                merged = A::intersect(&merged, &rp_live);
            }
        }

        let local = post_b.get(&b).cloned().unwrap_or_else(A::null);
        let new_live_out = if block.successors.is_empty() {
            local
        } else {
            A::intersect(&merged, &local)
        };
        let changed = live_out.get(&b).map(|v| v != &new_live_out).unwrap_or(true);
        live_out.insert(b, new_live_out);

        if changed {
            for &pred in &block.predecessors {
                if !in_queue[pred.0] {
                    queue.push_back(pred);
                    in_queue[pred.0] = true;
                }
            }
        }
    }

    tracing::debug!(blocks = n, iterations, "phase C (backward) converged");
    live_out
}

fn run_phases_bc<A: FieldAnalysis>(
    contract: &Contract,
    facts: &LocalFacts<A::Value>,
) -> HashMap<crate::block::BlockId, A::Value> {
    let post_b = run_phase_b::<A>(contract, facts);
    run_phase_c::<A>(contract, &post_b)
}

/// The self-relative analysis result, its sixteen absolute-index liftings,
/// and its thirty relative-offset liftings, produced by phase D.
pub struct AnalysisResult<V> {
    pub self_ctx: HashMap<crate::block::BlockId, V>,
    pub gtxn_ctx: Vec<HashMap<crate::block::BlockId, V>>,
    pub relative_ctx: HashMap<i64, HashMap<crate::block::BlockId, V>>,
}

/// Runs the full phase A→B→C→D algorithm for one field analysis.
///
/// Phase D lifts the self-relative result to its per-index and per-offset
/// variants by recomputing phases A-C under the assumption that the
/// executing transaction sits at that index/offset (every field analysis's
/// `asserted` takes the target index as a parameter for exactly this
/// reason), then zeroes each absolute-index context on blocks the
/// group-index analysis has already proven unreachable at that index —
/// the "gtxn lift" consistency invariant from spec.md §8. The caller
/// (`TransactionContext::build`) performs this zeroing once group-index
/// results are available, since this function runs standalone per field.
pub fn run<A: FieldAnalysis>(contract: &Contract, analysis: &A) -> AnalysisResult<A::Value> {
    let mut cache = StackAstCache::new();

    let self_facts = compute_local_facts(contract, analysis, &mut cache, TransactionIndex::SELF);
    let self_ctx = run_phases_bc::<A>(contract, &self_facts);

    let mut gtxn_ctx = Vec::with_capacity(MAX_GROUP_SIZE);
    for i in 0..MAX_GROUP_SIZE as i64 {
        let idx_facts = compute_local_facts(contract, analysis, &mut cache, TransactionIndex::absolute(i));
        gtxn_ctx.push(run_phases_bc::<A>(contract, &idx_facts));
    }

    let mut relative_ctx = HashMap::new();
    for offset in -(MAX_GROUP_SIZE as i64 - 1)..=(MAX_GROUP_SIZE as i64 - 1) {
        if offset == 0 {
            continue;
        }
        let rel_facts = compute_local_facts(contract, analysis, &mut cache, TransactionIndex::relative(offset));
        relative_ctx.insert(offset, run_phases_bc::<A>(contract, &rel_facts));
    }

    tracing::debug!(blocks = contract.blocks().len(), "dataflow analysis converged");
    AnalysisResult {
        self_ctx,
        gtxn_ctx,
        relative_ctx,
    }
}
