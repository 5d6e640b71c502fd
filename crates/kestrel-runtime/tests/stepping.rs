//! Step in / next / out sequences.

mod common;

use common::*;
use kestrel_runtime::debugger::{DebugError, DebugEvent, StepAction};
use kestrel_runtime::{Isolate, Value};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::cell::Cell;
use std::rc::Rc;

const ABC: &str = "function a() {b();c();}\n\
                   function b() {c();}\n\
                   function c() {}";

const NESTED_CALLS: &str = "function a() {b(c(d()),d());c(d());d()}\n\
                            function b() {c();}\n\
                            function c() {}\n\
                            function d() {}";

/// Break at the start of `entry`, step with `action` and record the trace.
fn step_trace(source: &str, entry: &str, action: StepAction) -> String {
    init_tracing();
    let mut isolate = Isolate::new();
    let function = compile_function(&mut isolate, source, "test", entry);
    let trace = record_steps(&mut isolate, action);
    let id = isolate.set_function_breakpoint(&function, 0).unwrap();
    isolate.call(&function, &[]).unwrap();
    isolate.clear_breakpoint(id).unwrap();
    let result = trace.borrow().clone();
    result
}

#[rstest]
#[case(StepAction::In, "abcbaca")]
#[case(StepAction::Next, "aaa")]
#[case(StepAction::Out, "a")]
fn test_step_order(#[case] action: StepAction, #[case] expected: &str) {
    assert_eq!(step_trace(ABC, "a", action), expected);
}

#[rstest]
#[case(StepAction::In, "adacadabcbadacada")]
#[case(StepAction::Next, "aaaa")]
fn test_step_over_nested_calls(#[case] action: StepAction, #[case] expected: &str) {
    assert_eq!(step_trace(NESTED_CALLS, "a", action), expected);
}

#[test]
fn test_step_linear() {
    let trace = step_trace(
        "function foo() { var a = 1; var b = 2; var c = 3; }",
        "foo",
        StepAction::In,
    );
    assert_eq!(trace.len(), 4);
}

#[rstest]
#[case(true, 4)]
#[case(false, 5)]
fn test_step_if(#[case] flag: bool, #[case] expected: usize) {
    let source = "function foo(x) {\n\
                  \x20 a = 1;\n\
                  \x20 if (x) {\n\
                  \x20   b = 1;\n\
                  \x20 } else {\n\
                  \x20   c = 1;\n\
                  \x20   d = 1;\n\
                  \x20 }\n\
                  }";
    let mut isolate = Isolate::new();
    let foo = compile_function(&mut isolate, source, "test", "foo");
    let trace = record_steps(&mut isolate, StepAction::Next);
    isolate.set_function_breakpoint(&foo, 0).unwrap();
    isolate.call(&foo, &[Value::Bool(flag)]).unwrap();
    assert_eq!(trace.borrow().len(), expected);
}

#[test]
fn test_step_in_skips_natives() {
    let mut isolate = Isolate::new();
    isolate.register_native(kestrel_runtime::ContextId::DEFAULT, "nat", |_, args| {
        Ok(args.first().cloned().unwrap_or(Value::Undefined))
    });
    let foo = compile_function(
        &mut isolate,
        "function foo() { debugger; nat(1); }",
        "test",
        "foo",
    );
    let trace = record_steps(&mut isolate, StepAction::In);
    isolate.call(&foo, &[]).unwrap();
    assert_eq!(trace.borrow().as_str(), "fff");
}

#[test]
fn test_step_next_in_loop() {
    let source = "function foo() {\n\
                  \x20 var a = 0;\n\
                  \x20 for (var i = 0; i < 3; i++) {\n\
                  \x20   a = a + i;\n\
                  \x20 }\n\
                  }";
    let mut isolate = Isolate::new();
    let foo = compile_function(&mut isolate, source, "test", "foo");
    let lines: Rc<std::cell::RefCell<Vec<u32>>> = Rc::default();
    let sink = Rc::clone(&lines);
    isolate.set_debug_event_listener(move |event, state| {
        if event.event() == DebugEvent::Break {
            sink.borrow_mut().push(state.frame(0).unwrap().line);
            state.prepare_step(StepAction::Next).unwrap();
        }
    });
    isolate.set_function_breakpoint(&foo, 0).unwrap();
    isolate.call(&foo, &[]).unwrap();
    // var a; init; then (cond, body, update) x3; final cond; return
    assert_eq!(
        *lines.borrow(),
        vec![1, 2, 2, 3, 2, 2, 3, 2, 2, 3, 2, 2, 5]
    );
}

#[test]
fn test_stepping_cleared_when_embedder_call_returns() {
    let mut isolate = Isolate::new();
    let a = compile_function(&mut isolate, ABC, "test", "a");
    let b = global(&isolate, "b");
    let trace = record_steps(&mut isolate, StepAction::In);
    let id = isolate.set_function_breakpoint(&a, 0).unwrap();
    isolate.call(&a, &[]).unwrap();
    isolate.clear_breakpoint(id).unwrap();
    assert!(!isolate.is_stepping());

    trace.borrow_mut().clear();
    isolate.call(&b, &[]).unwrap();
    assert_eq!(trace.borrow().as_str(), "");
}

#[test]
fn test_prepare_step_outside_break_fails() {
    let mut isolate = Isolate::new();
    assert!(matches!(
        isolate.prepare_step(1, StepAction::In),
        Err(DebugError::NoActiveBreak)
    ));
}

#[test]
fn test_stale_break_id_is_rejected() {
    let mut isolate = Isolate::new();
    let foo = compile_function(&mut isolate, "function foo(){bar=0;}", "test", "foo");
    let last_id = Rc::new(Cell::new(0u64));
    let stale = Rc::new(Cell::new(false));
    let (ids, flag) = (Rc::clone(&last_id), Rc::clone(&stale));
    isolate.set_debug_event_listener(move |event, state| {
        if event.event() != DebugEvent::Break {
            return;
        }
        if ids.get() != 0 {
            let result = state.isolate().prepare_step(ids.get(), StepAction::In);
            flag.set(matches!(result, Err(DebugError::InvalidBreakId)));
        }
        ids.set(state.break_id());
    });
    isolate.set_function_breakpoint(&foo, 0).unwrap();
    isolate.call(&foo, &[]).unwrap();
    isolate.call(&foo, &[]).unwrap();
    assert!(stale.get());
}

#[test]
fn test_exception_event_clears_stepping() {
    let mut isolate = Isolate::new();
    let source = "function thrower() { throw 1; }\n\
                  function foo() {\n\
                  \x20 try { thrower(); } catch (e) {}\n\
                  \x20 x = 1;\n\
                  }";
    let foo = compile_function(&mut isolate, source, "test", "foo");
    isolate.set_break_on_exception(kestrel_runtime::debugger::ExceptionBreak::Caught, true);
    let events: Rc<std::cell::RefCell<Vec<DebugEvent>>> = Rc::default();
    let sink = Rc::clone(&events);
    isolate.set_debug_event_listener(move |event, state| {
        match event.event() {
            DebugEvent::Break => state.prepare_step(StepAction::In).unwrap(),
            DebugEvent::Exception => {}
            _ => return,
        }
        sink.borrow_mut().push(event.event());
    });
    isolate.set_function_breakpoint(&foo, 0).unwrap();
    isolate.call(&foo, &[]).unwrap();

    // foo's first statement, `throw 1;` in thrower, then the throw itself
    assert_eq!(
        *events.borrow(),
        vec![DebugEvent::Break, DebugEvent::Break, DebugEvent::Exception]
    );
    assert!(!isolate.is_stepping());
}

#[test]
fn test_step_next_follows_exception_into_catch() {
    let mut isolate = Isolate::new();
    let source = "function thrower() {\n\
                  \x20 throw 1;\n\
                  }\n\
                  function foo() {\n\
                  \x20 try { thrower(); } catch (e) {\n\
                  \x20   x = 1;\n\
                  \x20 }\n\
                  \x20 y = 2;\n\
                  }";
    let foo = compile_function(&mut isolate, source, "test", "foo");
    let thrower = global(&isolate, "thrower");
    let stops: Rc<std::cell::RefCell<Vec<(String, u32)>>> = Rc::default();
    let sink = Rc::clone(&stops);
    isolate.set_debug_event_listener(move |event, state| {
        if event.event() == DebugEvent::Break {
            let frame = state.frame(0).unwrap();
            sink.borrow_mut().push((frame.function_name, frame.line));
            state.prepare_step(StepAction::Next).unwrap();
        }
    });
    isolate.set_function_breakpoint(&thrower, 0).unwrap();
    isolate.call(&foo, &[]).unwrap();

    // the unwound thrower frame is skipped; the next stop is the handler body
    let stops = stops.borrow();
    assert_eq!(stops[0], ("thrower".to_string(), 1));
    assert_eq!(stops[1], ("foo".to_string(), 5));
    assert_eq!(stops[2], ("foo".to_string(), 7));
}
