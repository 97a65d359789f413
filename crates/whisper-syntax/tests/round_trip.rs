//! Tokenizer/parser round trips against a complete program, run through
//! `whisper-core` to check the tree this crate builds actually means what
//! the source text says — not just that parsing succeeds.

use std::rc::Rc;

use whisper_core::{create_runtime, interpret_source_file, make_global_scope, register_thread, EvalResult};
use whisper_syntax::build_packed_syntax_tree;

fn run(source: &str) -> EvalResult {
    let tree: Rc<_> = build_packed_syntax_tree(source).unwrap();
    let runtime = create_runtime();
    let mut ctx = register_thread(&runtime).unwrap();
    let global = make_global_scope(&mut ctx);
    let scope = global.current(&ctx);
    interpret_source_file(&mut ctx, tree.root(), scope)
}

#[test]
fn a_small_program_with_functions_and_control_flow() {
    let result = run(
        r"
        def choose(flag) {
            if (flag) {
                return 1;
            } else {
                return 2;
            }
        }
        var a = choose(0);
        var b = (x => x * 10)(a);
        b;
        ",
    );
    assert!(matches!(result, EvalResult::Value(v) if v.as_int32() == Some(20)));
}

#[test]
fn dotted_call_chain_parses_left_associatively() {
    let result = run("def one() { return 1; } var f = one; f().x.y;");
    // `f()` evaluates to 1, an Int32 with no `x` property to find.
    let EvalResult::Exc { .. } = result else {
        panic!("expected a property-lookup exception, got {result:?}");
    };
}

#[test]
fn malformed_source_is_a_parse_error_not_a_panic() {
    let err = build_packed_syntax_tree("def f( { }").unwrap_err();
    assert_eq!(err.line, 1);
}
