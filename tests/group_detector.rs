//! The group-aware driver: a transaction with no check of its own can
//! still be cleared when a peer at a known absolute offset asserts the
//! field on its behalf.

use std::collections::HashMap;

use teal_txn_ctx_analyzer::prelude::*;

fn compile(source: &str, mode: ExecutionMode) -> Contract {
    Contract::compile("member", source, mode).unwrap()
}

#[test]
fn peer_checking_the_right_absolute_index_clears_an_unchecked_transaction() {
    // T0 (an application call) asserts `gtxn 1 RekeyTo == ZeroAddress`.
    // T1 (a bare payment, logic-sig-gated) asserts nothing about itself.
    let app = compile(
        "#pragma version 6\n\
         gtxn 1 RekeyTo\n\
         global ZeroAddress\n\
         ==\n\
         assert\n\
         int 1\n\
         return\n",
        ExecutionMode::Application,
    );
    let logic_sig = compile("#pragma version 6\nint 1\nreturn\n", ExecutionMode::LogicSignature);

    let app_fn_for_ctx = app.function_at("app", app.entry_block());
    let ls_fn_for_ctx = logic_sig.function_at("ls", logic_sig.entry_block());
    let app_ctx = TransactionContext::build(&app);
    let ls_ctx = TransactionContext::build(&logic_sig);

    let mut contexts = HashMap::new();
    contexts.insert("app".to_string(), BoundContext { function: app_fn_for_ctx, context: app_ctx });
    contexts.insert("ls".to_string(), BoundContext { function: ls_fn_for_ctx, context: ls_ctx });

    let t0 = Transaction::new("T0", TransactionKind::Appl)
        .with_application(app.function_at("app", app.entry_block()))
        .with_absolute_index(0);
    let t1 = Transaction::new("T1", TransactionKind::Pay)
        .with_logic_sig(logic_sig.function_at("ls", logic_sig.entry_block()))
        .with_absolute_index(1);
    let group = GroupTransaction::new("transfer", vec![t0, t1]);

    let output = detect_group_vulnerability(&group, &contexts, &rekeyto());
    assert!(
        output.vulnerable.iter().all(|v| v.txn_id != "T1"),
        "T1 is peer-protected by the application's check on gtxn 1"
    );
}

#[test]
fn a_peer_checking_only_its_own_index_does_not_clear_the_other_transaction() {
    // Same shape, but the application only ever asserts on `gtxn 0`
    // (itself), never on index 1 — T1 is genuinely unprotected.
    let app = compile(
        "#pragma version 6\n\
         gtxn 0 RekeyTo\n\
         global ZeroAddress\n\
         ==\n\
         assert\n\
         int 1\n\
         return\n",
        ExecutionMode::Application,
    );
    let logic_sig = compile("#pragma version 6\nint 1\nreturn\n", ExecutionMode::LogicSignature);

    let app_ctx = TransactionContext::build(&app);
    let ls_ctx = TransactionContext::build(&logic_sig);

    let mut contexts = HashMap::new();
    contexts.insert(
        "app".to_string(),
        BoundContext { function: app.function_at("app", app.entry_block()), context: app_ctx },
    );
    contexts.insert(
        "ls".to_string(),
        BoundContext { function: logic_sig.function_at("ls", logic_sig.entry_block()), context: ls_ctx },
    );

    let t0 = Transaction::new("T0", TransactionKind::Appl)
        .with_application(app.function_at("app", app.entry_block()))
        .with_absolute_index(0);
    let t1 = Transaction::new("T1", TransactionKind::Pay)
        .with_logic_sig(logic_sig.function_at("ls", logic_sig.entry_block()))
        .with_absolute_index(1);
    let group = GroupTransaction::new("transfer", vec![t0, t1]);

    let output = detect_group_vulnerability(&group, &contexts, &rekeyto());
    assert!(
        output.vulnerable.iter().any(|v| v.txn_id == "T1"),
        "the application never checked gtxn 1, so T1 has no protection at all"
    );
}
