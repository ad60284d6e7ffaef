//! Vulnerable-path detectors: single-function DFS (`detect_missing`) and
//! the group-aware cross-transaction driver.
//!
//! A detector is parameterized over one field's `checks_field` predicate
//! rather than hardcoded per vulnerability class — `rekeyto()`,
//! `fee_check()`, and friends below are just different predicates over
//! the same traversal engine, mirroring how `dataflow::FieldAnalysis`
//! keeps one engine and many lattices.

use std::collections::HashMap;

use crate::block::BlockId;
use crate::context::{QueryIndex, TransactionContext};
use crate::contract::Function;
use crate::dataflow::address::AddressLattice;
use crate::dataflow::group::IntSet;
use crate::dataflow::txntype::TypeSet;
use crate::execution_model::GroupTransaction;
use crate::instruction::{InstructionKind, TxnTypeTag};
use crate::subroutine::SubroutineId;

/// Which contract modes a detector applies to (spec.md §4.7: "stateless
/// detectors skip non-logic-sig; stateful skip non-application").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorMode {
    Stateless,
    Stateful,
    Either,
}

/// A named vulnerability check: a predicate over a block's transaction
/// context, plus the metadata `ExecutionPaths` output carries alongside
/// every path it finds.
pub struct Detector<'a> {
    pub check: String,
    pub description: String,
    pub help: String,
    pub mode: DetectorMode,
    /// Restricts group-aware detection to transactions of these types;
    /// empty means no filter.
    pub type_filter: Vec<TxnTypeTag>,
    pub checks_field: Box<dyn Fn(&TransactionContext, BlockId, QueryIndex) -> bool + 'a>,
}

/// One recorded vulnerable execution path through a single function.
#[derive(Debug, Clone)]
pub struct VulnerablePath {
    pub blocks: Vec<BlockId>,
}

/// The result of a single-function run: every vulnerable path `detect_missing`
/// found, in left-to-right DFS order (spec.md §5: "paths are reported in
/// left-to-right DFS order").
pub struct ExecutionPaths {
    pub check: String,
    pub description: String,
    pub help: String,
    pub paths: Vec<VulnerablePath>,
}

impl VulnerablePath {
    /// The `"B0 -> B3 -> ..."` short form spec.md §6 specifies for output.
    pub fn short(&self) -> String {
        self.blocks
            .iter()
            .map(|b| b.to_string())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

/// One DFS frame: which subroutine we're in, the callsub block that
/// entered it (`None` for the outermost, `__main__`, frame), and the
/// blocks visited so far within *this* frame only — loop detection is
/// scoped per frame so a subroutine called twice sequentially on the same
/// path is never mistaken for a back-edge (spec.md §4.6 point 3, and the
/// scenario-6 regression test this guards against).
#[derive(Clone)]
struct Frame {
    subroutine: SubroutineId,
    callsub_block: Option<BlockId>,
    executed: Vec<BlockId>,
}

/// Snapshot of traversal state carried by one explicit-stack work item.
/// DFS is iterative (spec.md §9: "recursion-based DFS in detectors should
/// be converted to an explicit stack to avoid native-stack overflow on
/// large contracts") — each popped item owns its own path/call-stack
/// clone so branching never corrupts a sibling's state.
struct WorkItem {
    block: BlockId,
    path: Vec<BlockId>,
    call_stack: Vec<Frame>,
}

/// True iff `checks_field` holds for every view of `block` the field
/// could legitimately be read through: the Self view always; the
/// absolute-index view if the transaction's position is known; otherwise
/// every gtxn-at-index view the group-index analysis proved reachable at
/// this block (spec.md §4.6 point 5).
fn validated_in_block(
    ctx: &TransactionContext,
    block: BlockId,
    absolute_index: Option<usize>,
    checks_field: &dyn Fn(&TransactionContext, BlockId, QueryIndex) -> bool,
) -> bool {
    if checks_field(ctx, block, QueryIndex::SelfTxn) {
        return true;
    }
    if let Some(a) = absolute_index {
        if checks_field(ctx, block, QueryIndex::Absolute(a)) {
            return true;
        }
    }
    let reachable = ctx.group_index_at(block, QueryIndex::SelfTxn);
    if reachable.is_empty() {
        return false;
    }
    reachable
        .iter()
        .all(|&i| checks_field(ctx, block, QueryIndex::Absolute(i as usize)))
}

/// Single-function DFS: enumerates every path from `function`'s entry to
/// a terminal block on which the tracked field is never adequately
/// constrained (spec.md §4.6).
pub fn detect_missing(function: &Function<'_>, ctx: &TransactionContext, detector: &Detector<'_>) -> ExecutionPaths {
    detect_missing_with_index(function, ctx, detector, None)
}

/// As `detect_missing`, but with the transaction's absolute index known
/// (used by the group-aware driver so `validated_in_block` can use the
/// absolute-index view, not just Self and the gtxn-at-index fan-out).
pub fn detect_missing_with_index(
    function: &Function<'_>,
    ctx: &TransactionContext,
    detector: &Detector<'_>,
    absolute_index: Option<usize>,
) -> ExecutionPaths {
    let contract = function.contract;
    let entry = function.entry();
    let entry_subroutine = contract.block(entry).subroutine;

    let mut stack = vec![WorkItem {
        block: entry,
        path: Vec::new(),
        call_stack: vec![Frame {
            subroutine: entry_subroutine,
            callsub_block: None,
            executed: Vec::new(),
        }],
    }];

    let mut paths = Vec::new();

    while let Some(WorkItem {
        block,
        mut path,
        mut call_stack,
    }) = stack.pop()
    {
        let top = call_stack.last_mut().expect("call_stack always has the outer frame");
        if top.executed.contains(&block) {
            // Back-edge within this frame: a genuine loop, not a second
            // sequential call into the same subroutine.
            continue;
        }
        top.executed.push(block);
        path.push(block);

        if validated_in_block(ctx, block, absolute_index, &*detector.checks_field) {
            continue;
        }

        let bb = contract.block(block);

        if bb.is_retsub {
            let frame = call_stack.pop().expect("retsub always has an enclosing frame");
            match frame.callsub_block.and_then(|cs| contract.block(cs).sub_return_point) {
                Some(rp) if !call_stack.is_empty() => {
                    stack.push(WorkItem {
                        block: rp,
                        path,
                        call_stack,
                    });
                }
                _ => {
                    // Outermost frame's own retsub (the function view was
                    // rooted mid-subroutine) or a caller with no return
                    // point on record: nothing more to walk, report as a
                    // terminal.
                    paths.push(VulnerablePath { blocks: path });
                }
            }
            continue;
        }

        if bb.successors.is_empty() {
            paths.push(VulnerablePath { blocks: path });
            continue;
        }

        if let InstructionKind::Callsub(_) = bb.exit_instruction().kind {
            let callee_entry = bb.successors[0];
            let callee_sub = contract.block(callee_entry).subroutine;
            if call_stack.iter().any(|f| f.subroutine == callee_sub) {
                // Recursion: stop exploring rather than call forever.
                continue;
            }
            let mut new_call_stack = call_stack.clone();
            new_call_stack.push(Frame {
                subroutine: callee_sub,
                callsub_block: Some(block),
                executed: Vec::new(),
            });
            stack.push(WorkItem {
                block: callee_entry,
                path,
                call_stack: new_call_stack,
            });
            continue;
        }

        // Pushed in reverse so the first successor is explored first: the
        // stack pops LIFO, and spec.md §5 requires left-to-right DFS order.
        for &succ in bb.successors.iter().rev() {
            stack.push(WorkItem {
                block: succ,
                path: path.clone(),
                call_stack: call_stack.clone(),
            });
        }
    }

    ExecutionPaths {
        check: detector.check.clone(),
        description: detector.description.clone(),
        help: detector.help.clone(),
        paths,
    }
}

/// True iff every leaf block reachable from `function`'s entry is
/// validated (spec.md §4.7: "checks every leaf block of the given
/// function via `validated_in_block`"). Used by the group-aware driver to
/// decide self- and peer-protection without generating path output.
fn contract_checks_its_field(
    function: &Function<'_>,
    ctx: &TransactionContext,
    absolute_index: Option<usize>,
    checks_field: &dyn Fn(&TransactionContext, BlockId, QueryIndex) -> bool,
) -> bool {
    function
        .leaf_blocks()
        .into_iter()
        .all(|b| validated_in_block(ctx, b, absolute_index, checks_field))
}

/// As `contract_checks_its_field`, but the peer is checked purely through
/// an absolute-index or relative-offset view rather than its own Self
/// view (spec.md §4.7 points 4-5: `contract_checks_txn_at_absolute_index`
/// / `contract_checks_using_relative_index`).
fn contract_checks_peer_view(
    function: &Function<'_>,
    ctx: &TransactionContext,
    view: QueryIndex,
    checks_field: &dyn Fn(&TransactionContext, BlockId, QueryIndex) -> bool,
) -> bool {
    function.leaf_blocks().into_iter().all(|b| checks_field(ctx, b, view))
}

/// One vulnerable transaction in a group, and the contracts that ran for
/// it (spec.md §6: `GroupTransactionOutput`'s per-transaction contract
/// list).
pub struct VulnerableTransaction {
    pub txn_id: String,
    pub contracts: Vec<String>,
}

/// Output of one group-aware detector run: the operation name and every
/// transaction found vulnerable, each with the contracts it executed.
pub struct GroupTransactionOutput {
    pub operation: String,
    pub vulnerable: Vec<VulnerableTransaction>,
}

/// Context bundle for one bound contract function: the transaction
/// context built for it, alongside the function view itself so the
/// driver can re-query leaf blocks without recomputing anything.
pub struct BoundContext<'a> {
    pub function: Function<'a>,
    pub context: TransactionContext,
}

/// Runs the group-aware driver (spec.md §4.7) over one group transaction.
/// `contexts` supplies the already-built transaction-context table for
/// every bound `logic_sig`/`application` function in the group, keyed by
/// function name — building these is the caller's job (one table per
/// function view, per spec.md §4.8), since two transactions may share the
/// very same compiled function.
pub fn detect_group_vulnerability(
    group: &GroupTransaction<'_>,
    contexts: &HashMap<String, BoundContext<'_>>,
    detector: &Detector<'_>,
) -> GroupTransactionOutput {
    let mut vulnerable = Vec::new();

    for (pos, txn) in group.transactions.iter().enumerate() {
        if detector.mode == DetectorMode::Stateless && txn.logic_sig.is_none() {
            continue;
        }
        if detector.mode == DetectorMode::Stateful && txn.application.is_none() {
            continue;
        }
        if !detector.type_filter.is_empty() {
            let tag = txn_kind_tag(txn.kind);
            match tag {
                Some(tag) if detector.type_filter.contains(&tag) => {}
                _ => continue,
            }
        }

        let bound_functions: Vec<&str> = [txn.logic_sig.as_ref(), txn.application.as_ref()]
            .into_iter()
            .flatten()
            .map(|f| f.name())
            .collect();

        let self_protected = bound_functions.iter().any(|name| {
            contexts.get(*name).is_some_and(|bc| {
                contract_checks_its_field(&bc.function, &bc.context, txn.absolute_index, &*detector.checks_field)
            })
        });
        if self_protected {
            continue;
        }

        let mut peer_protected = false;

        if let Some(a) = txn.absolute_index {
            for (other_pos, other) in group.transactions.iter().enumerate() {
                if other_pos == pos {
                    continue;
                }
                let other_functions: Vec<&str> = [other.logic_sig.as_ref(), other.application.as_ref()]
                    .into_iter()
                    .flatten()
                    .map(|f| f.name())
                    .collect();
                if other_functions.iter().any(|name| {
                    contexts.get(*name).is_some_and(|bc| {
                        contract_checks_peer_view(&bc.function, &bc.context, QueryIndex::Absolute(a), &*detector.checks_field)
                    })
                }) {
                    peer_protected = true;
                    break;
                }
            }
        }

        if !peer_protected {
            for (other_pos, offset) in group.relative_peers(pos) {
                let other = &group.transactions[other_pos];
                let other_functions: Vec<&str> = [other.logic_sig.as_ref(), other.application.as_ref()]
                    .into_iter()
                    .flatten()
                    .map(|f| f.name())
                    .collect();
                if other_functions.iter().any(|name| {
                    contexts.get(*name).is_some_and(|bc| {
                        contract_checks_peer_view(&bc.function, &bc.context, QueryIndex::Relative(-offset), &*detector.checks_field)
                    })
                }) {
                    peer_protected = true;
                    break;
                }
            }
        }

        if peer_protected {
            continue;
        }

        vulnerable.push(VulnerableTransaction {
            txn_id: txn.txn_id.clone(),
            contracts: bound_functions.into_iter().map(String::from).collect(),
        });
    }

    GroupTransactionOutput {
        operation: group.operation.clone(),
        vulnerable,
    }
}

fn txn_kind_tag(kind: crate::execution_model::TransactionKind) -> Option<TxnTypeTag> {
    use crate::execution_model::TransactionKind as K;
    Some(match kind {
        K::Pay => TxnTypeTag::Pay,
        K::KeyReg => TxnTypeTag::KeyReg,
        K::Acfg => TxnTypeTag::Acfg,
        K::Axfer => TxnTypeTag::Axfer,
        K::Afrz => TxnTypeTag::Afrz,
        K::Appl => TxnTypeTag::Appl,
        K::Unspecified => return None,
    })
}

// ---------------------------------------------------------------------
// Concrete detectors (spec.md doesn't name these; they're the catalog a
// deployed analyzer needs `checks_field` predicates for).

fn address_never(lattice: &AddressLattice) -> bool {
    matches!(lattice, AddressLattice::None)
}

/// Missing-rekey: flags paths where `RekeyTo` could be anything other
/// than the zero address.
pub fn rekeyto<'a>() -> Detector<'a> {
    Detector {
        check: "rekeyto".to_string(),
        description: "RekeyTo is not constrained to the zero address".to_string(),
        help: "Assert `txn RekeyTo == global ZeroAddress` before any state-changing operation.".to_string(),
        mode: DetectorMode::Either,
        type_filter: Vec::new(),
        checks_field: Box::new(|ctx, block, idx| {
            let value = ctx.rekey_to_at(block, idx);
            match &value {
                AddressLattice::Some(set) => set.iter().all(|a| matches!(a, crate::dataflow::address::AddressValue::Zero)),
                _ => address_never(&value),
            }
        }),
    }
}

/// Can-close-account: flags paths where `CloseRemainderTo` could be
/// anything other than the zero address.
pub fn can_close_account<'a>() -> Detector<'a> {
    Detector {
        check: "can_close_account".to_string(),
        description: "CloseRemainderTo is not constrained to the zero address".to_string(),
        help: "Assert `txn CloseRemainderTo == global ZeroAddress` before allowing this path.".to_string(),
        mode: DetectorMode::Either,
        type_filter: Vec::new(),
        checks_field: Box::new(|ctx, block, idx| {
            let value = ctx.close_remainder_to_at(block, idx);
            match &value {
                AddressLattice::Some(set) => set.iter().all(|a| matches!(a, crate::dataflow::address::AddressValue::Zero)),
                _ => address_never(&value),
            }
        }),
    }
}

/// Can-close-asset: flags paths where `AssetCloseTo` could be anything
/// other than the zero address.
pub fn can_close_asset<'a>() -> Detector<'a> {
    Detector {
        check: "can_close_asset".to_string(),
        description: "AssetCloseTo is not constrained to the zero address".to_string(),
        help: "Assert `txn AssetCloseTo == global ZeroAddress` before allowing this path.".to_string(),
        mode: DetectorMode::Either,
        type_filter: Vec::new(),
        checks_field: Box::new(|ctx, block, idx| {
            let value = ctx.asset_close_to_at(block, idx);
            match &value {
                AddressLattice::Some(set) => set.iter().all(|a| matches!(a, crate::dataflow::address::AddressValue::Zero)),
                _ => address_never(&value),
            }
        }),
    }
}

/// Fee check: flags paths where the fee has no provable bound below
/// `MAX_TRANSACTION_COST`, the worst-case cost an inner-transaction-heavy
/// group can incur.
pub fn fee_check<'a>() -> Detector<'a> {
    Detector {
        check: "fee_check".to_string(),
        description: "Fee is not provably bounded below MAX_TRANSACTION_COST".to_string(),
        help: "Assert `txn Fee <= <bound>` before relying on this path.".to_string(),
        mode: DetectorMode::Either,
        type_filter: Vec::new(),
        checks_field: Box::new(|ctx, block, idx| ctx.fee_at(block, idx).is_safely_bounded()),
    }
}

/// Groupsize: flags paths where the group's size is not pinned to a
/// single known value.
pub fn groupsize<'a>() -> Detector<'a> {
    Detector {
        check: "groupsize".to_string(),
        description: "GroupSize is not pinned to a single expected value".to_string(),
        help: "Assert `global GroupSize == N` before relying on fixed transaction positions.".to_string(),
        mode: DetectorMode::Either,
        type_filter: Vec::new(),
        checks_field: Box::new(|ctx, block, idx| {
            let sizes: IntSet = ctx.group_size_at(block, idx);
            // An empty set means this view is unreachable, which is
            // vacuously safe — nothing to pin down.
            sizes.len() <= 1
        }),
    }
}

/// Is-updatable: flags paths where an application call could reach
/// `UpdateApplication` without the handler tree having ruled it out.
pub fn is_updatable<'a>() -> Detector<'a> {
    type_not_possible(
        "is_updatable",
        "An application-update call can reach this path",
        "Reject `OnCompletion == UpdateApplication` explicitly, or require `txn Sender == creator`.",
        TxnTypeTag::ApplUpdateApplication,
    )
}

/// Is-deletable: flags paths where an application call could reach
/// `DeleteApplication` without the handler tree having ruled it out.
pub fn is_deletable<'a>() -> Detector<'a> {
    type_not_possible(
        "is_deletable",
        "An application-delete call can reach this path",
        "Reject `OnCompletion == DeleteApplication` explicitly, or require `txn Sender == creator`.",
        TxnTypeTag::ApplDeleteApplication,
    )
}

fn type_not_possible<'a>(check: &str, description: &str, help: &str, tag: TxnTypeTag) -> Detector<'a> {
    Detector {
        check: check.to_string(),
        description: description.to_string(),
        help: help.to_string(),
        mode: DetectorMode::Stateful,
        type_filter: Vec::new(),
        checks_field: Box::new(move |ctx, block, idx| {
            let types: TypeSet = ctx.transaction_type_at(block, idx);
            !types.contains(&tag)
        }),
    }
}
