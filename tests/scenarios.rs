//! End-to-end scenarios: parse a small TEAL program, build its
//! transaction context, and check the detector output matches what a
//! human auditor would expect from reading the source.

use teal_txn_ctx_analyzer::prelude::*;

fn compile(source: &str) -> Contract {
    Contract::compile("scenario", source, ExecutionMode::Application).unwrap()
}

fn main_fn(contract: &Contract) -> Function<'_> {
    contract.function_at("main", contract.entry_block())
}

#[test]
fn fee_bounded_below_1000_is_not_flagged_but_rekey_is_never_checked() {
    let contract = compile(
        "#pragma version 6\n\
         txn Fee\n\
         int 1000\n\
         <\n\
         assert\n\
         int 1\n\
         return\n",
    );
    let ctx = TransactionContext::build(&contract);
    let function = main_fn(&contract);

    let fee_paths = detect_missing(&function, &ctx, &fee_check());
    assert!(fee_paths.paths.is_empty(), "fee is provably under 1000 microAlgos, well below the safe bound");

    let rekey_paths = detect_missing(&function, &ctx, &rekeyto());
    assert_eq!(rekey_paths.paths.len(), 1, "RekeyTo is never constrained on this path");
    assert_eq!(rekey_paths.paths[0].blocks, vec![contract.entry_block()]);
}

#[test]
fn closeto_checked_only_at_absolute_index_zero_protects_the_pinned_group_index_path() {
    // The branch on `txn GroupIndex == 0` narrows the group index to {0}
    // on the surviving path, and the assert only targets `gtxn 0`, but
    // since that is the only index reachable there, it is sufficient.
    let contract = compile(
        "#pragma version 6\n\
         txn GroupIndex\n\
         int 0\n\
         ==\n\
         bz fail\n\
         gtxn 0 CloseRemainderTo\n\
         global ZeroAddress\n\
         ==\n\
         assert\n\
         int 1\n\
         return\n\
         fail:\n\
         err\n",
    );
    let ctx = TransactionContext::build(&contract);
    let function = main_fn(&contract);

    let paths = detect_missing(&function, &ctx, &can_close_account());
    assert!(paths.paths.is_empty(), "the only reachable group index on this path is 0, and that index is checked");
}

#[test]
fn closeto_checked_only_at_index_zero_is_insufficient_once_other_indices_are_reachable() {
    // Group size is pinned to 3 (indices 0..=2 possible), but only index 0's
    // CloseRemainderTo is ever asserted: a transaction sitting at index 1 or
    // 2 reaches the same leaf block with no check at all.
    let contract = compile(
        "#pragma version 6\n\
         global GroupSize\n\
         int 3\n\
         ==\n\
         assert\n\
         gtxn 0 CloseRemainderTo\n\
         global ZeroAddress\n\
         ==\n\
         assert\n\
         int 1\n\
         return\n",
    );
    let ctx = TransactionContext::build(&contract);
    let function = main_fn(&contract);

    let paths = detect_missing(&function, &ctx, &can_close_account());
    assert_eq!(paths.paths.len(), 1, "indices 1 and 2 are reachable and unchecked");
}

#[test]
fn explicit_oncompletion_rejection_clears_is_updatable_but_its_absence_does_not() {
    let vulnerable = compile("#pragma version 6\nint 1\nreturn\n");
    let ctx = TransactionContext::build(&vulnerable);
    let function = main_fn(&vulnerable);
    let paths = detect_missing(&function, &ctx, &is_updatable());
    assert_eq!(paths.paths.len(), 1, "nothing rules out OnCompletion == UpdateApplication here");

    let safe = compile(
        "#pragma version 6\n\
         txn OnCompletion\n\
         int 4\n\
         !=\n\
         assert\n\
         int 1\n\
         return\n",
    );
    let ctx = TransactionContext::build(&safe);
    let function = main_fn(&safe);
    let paths = detect_missing(&function, &ctx, &is_updatable());
    assert!(paths.paths.is_empty(), "UpdateApplication is explicitly excluded before the terminal block");
}

#[test]
fn subroutine_called_twice_sequentially_is_not_mistaken_for_a_loop() {
    let contract = compile(
        "#pragma version 6\n\
         callsub sub\n\
         callsub sub\n\
         int 1\n\
         return\n\
         sub:\n\
         retsub\n",
    );
    let ctx = TransactionContext::build(&contract);
    let function = main_fn(&contract);

    // rekeyto is never checked anywhere, so the whole program is one
    // vulnerable path; what this test actually pins down is that the
    // second call into `sub` is walked rather than pruned as a back-edge.
    let paths = detect_missing(&function, &ctx, &rekeyto());
    assert_eq!(paths.paths.len(), 1);
    let blocks = &paths.paths[0].blocks;
    assert_eq!(blocks.len(), 5, "entry -> sub -> return-point-1 -> sub -> return-point-2 -> terminal");
    assert_eq!(blocks[1], blocks[3], "both callsub sites route through the very same subroutine entry block");
}
