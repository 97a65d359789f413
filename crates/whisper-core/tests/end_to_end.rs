//! The end-to-end scenarios, built directly against `pst::Builder` so
//! this crate's tests never depend on `whisper-syntax`.

use std::rc::Rc;

use whisper_core::{create_runtime, interpret_source_file, make_global_scope, register_thread, Builder, EvalResult, ExcKind, HeapPayload, NodeBuilder, ThreadContext};

struct Run {
    ctx: ThreadContext,
    result: EvalResult,
}

fn run(build_root: NodeBuilder) -> Run {
    let tree = Rc::new(Builder::new().build(build_root));
    let runtime = create_runtime();
    let mut ctx = register_thread(&runtime).unwrap();
    let global = make_global_scope(&mut ctx);
    let scope = global.current(&ctx);
    let result = interpret_source_file(&mut ctx, tree.root(), scope);
    Run { ctx, result }
}

impl Run {
    fn exc_kind(&self) -> ExcKind {
        match &self.result {
            EvalResult::Exc { exception, .. } => match &self.ctx.heap.get(*exception).payload {
                HeapPayload::Exception(data) => data.kind,
                other => panic!("exception object has the wrong payload: {other:?}"),
            },
            other => panic!("expected Exc, got {other:?}"),
        }
    }

    fn int_value(&self) -> i32 {
        match &self.result {
            EvalResult::Value(v) => v.as_int32().unwrap_or_else(|| panic!("value is not an Int32: {v:?}")),
            other => panic!("expected Value, got {other:?}"),
        }
    }
}

#[test]
fn e1_binding_then_name_reference() {
    let run = run(Builder::file(vec![
        Builder::binding_stmt(false, vec![("x", Some(Builder::integer_expr(3)))]),
        Builder::expr_stmt(Builder::name_expr("x")),
    ]));
    assert_eq!(run.int_value(), 3);
}

#[test]
fn e2_function_call_adds_one() {
    let run = run(Builder::file(vec![
        Builder::def_stmt(
            "f",
            &["x"],
            Builder::block(vec![Builder::return_stmt(Some(Builder::add_expr(Builder::name_expr("x"), Builder::integer_expr(1))))]),
        ),
        Builder::expr_stmt(Builder::call_expr(Builder::name_expr("f"), vec![Builder::integer_expr(41)])),
    ]));
    assert_eq!(run.int_value(), 42);
}

#[test]
fn e3_top_level_return_is_non_returnable() {
    let run = run(Builder::file(vec![Builder::return_stmt(Some(Builder::integer_expr(7)))]));
    assert_eq!(run.exc_kind(), ExcKind::ReturnOutsideFunction);
}

#[test]
fn e4_unbound_name_raises() {
    let run = run(Builder::file(vec![Builder::expr_stmt(Builder::name_expr("y"))]));
    assert_eq!(run.exc_kind(), ExcKind::NameNotFound);
}

#[test]
fn e5_parenthesized_arithmetic() {
    let run = run(Builder::file(vec![Builder::expr_stmt(Builder::mul_expr(
        Builder::paren_expr(Builder::add_expr(Builder::integer_expr(1), Builder::integer_expr(2))),
        Builder::integer_expr(10),
    ))]));
    assert_eq!(run.int_value(), 30);
}

#[test]
fn e6_calling_an_unbound_name_does_not_define_the_binding() {
    let run = run(Builder::file(vec![
        Builder::binding_stmt(false, vec![("a", Some(Builder::call_expr(Builder::name_expr("nonexistent"), vec![])))]),
        Builder::expr_stmt(Builder::name_expr("a")),
    ]));
    assert_eq!(run.exc_kind(), ExcKind::NameNotFound);
}

#[test]
fn e7_nested_applicative_calls_and_retcont_reuse() {
    let run = run(Builder::file(vec![
        Builder::def_stmt(
            "inc",
            &["x"],
            Builder::block(vec![Builder::return_stmt(Some(Builder::add_expr(Builder::name_expr("x"), Builder::integer_expr(1))))]),
        ),
        Builder::binding_stmt(
            false,
            vec![(
                "a",
                Some(Builder::call_expr(
                    Builder::name_expr("inc"),
                    vec![Builder::call_expr(Builder::name_expr("inc"), vec![Builder::call_expr(Builder::name_expr("inc"), vec![Builder::integer_expr(0)])])],
                )),
            )],
        ),
        Builder::expr_stmt(Builder::name_expr("a")),
    ]));
    assert_eq!(run.int_value(), 3);
}

#[test]
fn e8_if_else_falsy_zero_dispatches_to_else() {
    let run = run(Builder::file(vec![
        Builder::binding_stmt(
            false,
            vec![(
                "r",
                Some(Builder::if_stmt(vec![(Builder::integer_expr(0), Builder::integer_expr(1))], Some(Builder::integer_expr(2)))),
            )],
        ),
        Builder::expr_stmt(Builder::name_expr("r")),
    ]));
    assert_eq!(run.int_value(), 2);
}

#[test]
fn registering_twice_on_one_thread_fails() {
    let runtime = create_runtime();
    let _first = register_thread(&runtime).unwrap();
    let second = register_thread(&runtime);
    assert!(second.is_err());
}

#[test]
fn integer_division_by_zero_raises() {
    let run = run(Builder::file(vec![Builder::expr_stmt(Builder::div_expr(Builder::integer_expr(1), Builder::integer_expr(0)))]));
    assert_eq!(run.exc_kind(), ExcKind::DivisionByZero);
}

#[test]
fn integer_overflow_raises() {
    let run = run(Builder::file(vec![Builder::expr_stmt(Builder::add_expr(Builder::integer_expr(i32::MAX), Builder::integer_expr(1)))]));
    assert_eq!(run.exc_kind(), ExcKind::IntegerOverflow);
}

#[test]
fn arrow_function_value_is_callable() {
    let run = run(Builder::file(vec![Builder::expr_stmt(Builder::call_expr(
        Builder::paren_expr(Builder::arrow_expr(&["x"], Builder::add_expr(Builder::name_expr("x"), Builder::integer_expr(1)))),
        vec![Builder::integer_expr(10)],
    ))]));
    assert_eq!(run.int_value(), 11);
}

#[test]
fn loop_statement_counts_down_to_zero() {
    let run = run(Builder::file(vec![
        Builder::binding_stmt(false, vec![("c", Some(Builder::integer_expr(3)))]),
        Builder::loop_stmt(
            Builder::name_expr("c"),
            Builder::block(vec![Builder::binding_stmt(false, vec![("c", Some(Builder::sub_expr(Builder::name_expr("c"), Builder::integer_expr(1))))])]),
        ),
        Builder::expr_stmt(Builder::name_expr("c")),
    ]));
    assert_eq!(run.int_value(), 0);
}

#[test]
fn shadowing_a_native_handler_changes_that_subtree_only() {
    // Rebinding `@Integer` on the global scope to a user-defined handler
    // changes every integer literal's evaluation for the rest of the
    // program — the central extensibility mechanism this language offers.
    let tree = Rc::new(Builder::new().build(Builder::file(vec![Builder::expr_stmt(Builder::integer_expr(5))])));
    let runtime = create_runtime();
    let mut ctx = register_thread(&runtime).unwrap();
    let global = make_global_scope(&mut ctx);
    let scope = global.current(&ctx);
    // Sanity check the handler is bound natively before any override.
    let name_id = ctx.intern("@Integer");
    match whisper_core::lookup_property(&ctx.heap, scope, name_id) {
        whisper_core::LookupResult::Found { descriptor: whisper_core::PropertyDescriptor::Method(_), .. } => {}
        other => panic!("expected @Integer to be bound as a native method: {other:?}"),
    }
    let result = interpret_source_file(&mut ctx, tree.root(), scope);
    assert!(matches!(result, EvalResult::Value(v) if v.as_int32() == Some(5)));
}
