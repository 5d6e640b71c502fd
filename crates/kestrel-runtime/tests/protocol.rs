//! JSON commands, responses and events end to end.

mod common;

use common::*;
use insta::assert_snapshot;
use kestrel_runtime::Isolate;
use pretty_assertions::assert_eq;
use serde_json::json;

const ONE: &str = "function f(x) {\n  y = x;\n  z = y;\n}";

/// Isolate with a message handler and `ONE` loaded as `one.js`.
fn setup() -> (Isolate, Messages) {
    init_tracing();
    let mut isolate = Isolate::new();
    let messages = record_messages(&mut isolate);
    isolate.compile_run(ONE, "one.js").unwrap();
    messages.borrow_mut().clear();
    (isolate, messages)
}

fn send(isolate: &Isolate, seq: u64, command: &str, arguments: serde_json::Value) {
    isolate
        .debug_handle()
        .send_command(request(seq, command, arguments), None);
}

/// Process queued commands and return the last response.
fn process(isolate: &mut Isolate, messages: &Messages) -> serde_json::Value {
    isolate.process_debug_messages();
    responses(messages).pop().expect("no response")
}

// ══════════════════════════════════════════════════════════════════════════════
// Envelopes
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_unknown_command_response() {
    let mut isolate = Isolate::new();
    let raw = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    let sink = std::rc::Rc::clone(&raw);
    isolate.set_message_handler(move |message| sink.borrow_mut().push(message.json().to_string()));
    send(&isolate, 7, "frobnicate", json!({}));
    isolate.process_debug_messages();

    assert_snapshot!(
        raw.borrow()[0],
        @r#"{"seq":1,"request_seq":7,"type":"response","command":"frobnicate","success":false,"message":"Unknown command 'frobnicate'","running":false}"#
    );
}

#[test]
fn test_malformed_request() {
    let (mut isolate, messages) = setup();
    isolate.debug_handle().send_command("not json", None);
    let response = process(&mut isolate, &messages);
    assert_eq!(response["success"], false);
    assert_eq!(response["request_seq"], 0);
    assert!(response["message"]
        .as_str()
        .is_some_and(|message| message.starts_with("Invalid JSON")));
}

#[test]
fn test_outgoing_seq_increases() {
    let (mut isolate, messages) = setup();
    for seq in 1..=3 {
        send(&isolate, seq, "scripts", json!({}));
    }
    isolate.process_debug_messages();
    let seqs: Vec<_> = responses(&messages)
        .iter()
        .map(|response| response["seq"].as_u64().unwrap())
        .collect();
    assert!(seqs.windows(2).all(|pair| pair[0] < pair[1]));
}

// ══════════════════════════════════════════════════════════════════════════════
// Breakpoint commands
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_pending_script_breakpoint_listed() {
    let (mut isolate, messages) = setup();
    send(
        &isolate,
        1,
        "setbreakpoint",
        json!({ "type": "script", "target": "later.js", "line": 3 }),
    );
    let response = process(&mut isolate, &messages);
    assert_snapshot!(
        response["body"].to_string(),
        @r#"{"actual_locations":[],"breakpoint":1,"type":"script"}"#
    );

    send(&isolate, 2, "listbreakpoints", json!({}));
    let response = process(&mut isolate, &messages);
    assert_snapshot!(
        response["body"].to_string(),
        @r#"{"breakOnExceptions":false,"breakOnUncaughtExceptions":false,"breakpoints":[{"active":true,"actualLocations":[],"condition":null,"hitCount":0,"ignoreCount":0,"line":3,"number":1,"scriptName":"later.js","type":"scriptName"}]}"#
    );
}

#[test]
fn test_change_and_clear_breakpoint() {
    let (mut isolate, messages) = setup();
    send(
        &isolate,
        1,
        "setbreakpoint",
        json!({ "type": "script", "target": "one.js", "line": 2, "condition": "x > 1" }),
    );
    let response = process(&mut isolate, &messages);
    assert_eq!(response["body"]["actual_locations"][0]["line"], 2);

    send(
        &isolate,
        2,
        "changebreakpoint",
        json!({ "breakpoint": 1, "enabled": false, "ignoreCount": 4 }),
    );
    assert_eq!(process(&mut isolate, &messages)["success"], true);
    let info = isolate.breakpoint(1).unwrap();
    assert!(!info.active);
    assert_eq!(info.ignore_count, 4);
    assert_eq!(info.condition.as_deref(), Some("x > 1"));

    send(&isolate, 3, "clearbreakpoint", json!({ "breakpoint": 1 }));
    assert_eq!(process(&mut isolate, &messages)["success"], true);
    assert!(isolate.breakpoints().is_empty());

    send(&isolate, 4, "clearbreakpoint", json!({ "breakpoint": 1 }));
    let response = process(&mut isolate, &messages);
    assert_eq!(response["success"], false);
    assert_eq!(response["message"], "Unknown breakpoint 1");

    send(&isolate, 5, "changebreakpoint", json!({ "breakpoint": 9, "enabled": true }));
    assert_eq!(process(&mut isolate, &messages)["message"], "Unknown breakpoint 9");
}

#[test]
fn test_out_of_range_breakpoint_arguments() {
    let (mut isolate, messages) = setup();
    send(
        &isolate,
        1,
        "setbreakpoint",
        json!({ "type": "function", "target": "f", "line": u32::MAX }),
    );
    let response = process(&mut isolate, &messages);
    assert_eq!(response["success"], false);
    assert_eq!(response["message"], format!("line {} is outside 'f'", u32::MAX));

    send(
        &isolate,
        2,
        "setbreakpoint",
        json!({ "type": "function", "target": "f", "column": u32::MAX }),
    );
    assert_eq!(process(&mut isolate, &messages)["success"], false);

    // A script breakpoint past the end of the line stays unresolved
    send(
        &isolate,
        3,
        "setbreakpoint",
        json!({ "type": "script", "target": "one.js", "line": 1, "column": u32::MAX }),
    );
    let response = process(&mut isolate, &messages);
    assert_eq!(response["success"], true);
    assert_eq!(response["body"]["actual_locations"], json!([]));
    assert_eq!(isolate.breakpoints().len(), 1);
}

#[test]
fn test_set_exception_break() {
    let (mut isolate, messages) = setup();
    send(&isolate, 1, "setexceptionbreak", json!({ "type": "all" }));
    assert_eq!(process(&mut isolate, &messages)["success"], true);
    let policy = isolate.exception_policy();
    assert!(policy.break_on_caught && policy.break_on_uncaught);

    send(
        &isolate,
        2,
        "setexceptionbreak",
        json!({ "type": "caught", "enabled": false }),
    );
    process(&mut isolate, &messages);
    send(&isolate, 3, "listbreakpoints", json!({}));
    let response = process(&mut isolate, &messages);
    assert_eq!(response["body"]["breakOnExceptions"], false);
    assert_eq!(response["body"]["breakOnUncaughtExceptions"], true);
}

// ══════════════════════════════════════════════════════════════════════════════
// Evaluate
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_evaluate_outside_break() {
    let (mut isolate, messages) = setup();
    send(&isolate, 1, "evaluate", json!({ "expression": "1 + 2", "global": true }));
    let response = process(&mut isolate, &messages);
    assert_snapshot!(response["body"].to_string(), @r#"{"text":"3","type":"number","value":3.0}"#);

    send(&isolate, 2, "evaluate", json!({ "expression": "nope" }));
    let response = process(&mut isolate, &messages);
    assert_eq!(response["success"], true);
    assert_snapshot!(
        response["body"].to_string(),
        @r#"{"exception":true,"text":"ReferenceError: nope is not defined","type":"object"}"#
    );

    send(&isolate, 3, "evaluate", json!({ "expression": "1 +" }));
    assert_eq!(process(&mut isolate, &messages)["success"], false);
}

#[test]
fn test_continue_outside_break_fails() {
    let (mut isolate, messages) = setup();
    send(&isolate, 1, "continue", json!({}));
    let response = process(&mut isolate, &messages);
    assert_eq!(response["success"], false);
    assert_eq!(response["message"], "Not in a break");
    assert_eq!(response["running"], false);
}

#[test]
fn test_scripts_lists_live_scripts() {
    let (mut isolate, messages) = setup();
    send(&isolate, 1, "scripts", json!({}));
    let response = process(&mut isolate, &messages);
    assert_snapshot!(
        response["body"].to_string(),
        @r#"[{"id":1,"lineCount":4,"lineOffset":0,"name":"one.js","sourceLength":35}]"#
    );
}

// ══════════════════════════════════════════════════════════════════════════════
// Breaks driven by commands
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_function_breakpoint_backtrace_and_continue() {
    let (mut isolate, messages) = setup();
    send(
        &isolate,
        1,
        "setbreakpoint",
        json!({ "type": "function", "target": "f", "line": 1 }),
    );
    assert_eq!(process(&mut isolate, &messages)["body"]["breakpoint"], 1);

    send(&isolate, 2, "backtrace", json!({}));
    send(&isolate, 3, "continue", json!({}));
    let f = global(&isolate, "f");
    isolate.call(&f, &[5.0.into()]).unwrap();

    let breaks = events(&messages, "break");
    assert_eq!(breaks.len(), 1);
    assert_snapshot!(
        breaks[0]["body"].to_string(),
        @r#"{"breakpoints":[1],"func":"f","script":{"id":1,"lineOffset":0,"name":"one.js"},"sourceColumn":2,"sourceLine":1,"sourceLineText":"  y = x;"}"#
    );

    let responses = responses(&messages);
    let backtrace = responses
        .iter()
        .find(|response| response["command"] == "backtrace")
        .unwrap();
    assert_snapshot!(
        backtrace["body"].to_string(),
        @r#"{"frames":[{"column":2,"func":"f","index":0,"line":1,"position":18,"scriptId":1,"scriptName":"one.js","sourceLineText":"  y = x;"}],"fromFrame":0,"toFrame":1,"totalFrames":1}"#
    );
    assert_eq!(responses.last().unwrap()["running"], true);
}

#[test]
fn test_continue_with_step_action() {
    let (mut isolate, messages) = setup();
    send(
        &isolate,
        1,
        "setbreakpoint",
        json!({ "type": "scriptId", "target": 1, "line": 1 }),
    );
    process(&mut isolate, &messages);

    send(&isolate, 2, "continue", json!({ "stepaction": "next" }));
    send(&isolate, 3, "continue", json!({}));
    let f = global(&isolate, "f");
    isolate.call(&f, &[1.0.into()]).unwrap();

    let lines: Vec<_> = events(&messages, "break")
        .iter()
        .map(|event| event["body"]["sourceLine"].as_u64().unwrap())
        .collect();
    assert_eq!(lines, vec![1, 2]);
    assert!(!isolate.is_stepping());
}

#[test]
fn test_evaluate_in_frame_during_break() {
    let (mut isolate, messages) = setup();
    let f = global(&isolate, "f");
    isolate.set_function_breakpoint(&f, 0).unwrap();

    send(&isolate, 1, "evaluate", json!({ "expression": "x * 10", "frame": 0 }));
    send(&isolate, 2, "evaluate", json!({ "expression": "x", "frame": 3 }));
    send(&isolate, 3, "continue", json!({}));
    isolate.call(&f, &[4.0.into()]).unwrap();

    let responses = responses(&messages);
    assert_eq!(responses[0]["body"]["text"], "40");
    assert_eq!(responses[1]["success"], false);
    assert_eq!(responses[1]["message"], "Frame 3 out of range (1 frames)");
}

#[test]
fn test_evaluate_in_far_frame_during_break() {
    let (mut isolate, messages) = setup();
    let f = global(&isolate, "f");
    isolate.set_function_breakpoint(&f, 0).unwrap();

    send(&isolate, 1, "evaluate", json!({ "expression": "x", "frame": usize::MAX }));
    send(&isolate, 2, "continue", json!({}));
    isolate.call(&f, &[4.0.into()]).unwrap();

    let responses = responses(&messages);
    assert_eq!(responses[0]["success"], false);
    assert_eq!(
        responses[0]["message"],
        format!("Frame {} out of range (1 frames)", usize::MAX)
    );
    assert_eq!(responses[1]["running"], true);
}

// ══════════════════════════════════════════════════════════════════════════════
// Compile events
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_compile_events_on_the_wire() {
    let (mut isolate, messages) = setup();
    isolate.compile_run("a = 1;", "two.js").unwrap();
    let compiled = events(&messages, "afterCompile");
    assert_eq!(compiled.len(), 1);
    assert_eq!(compiled[0]["body"]["script"]["name"], "two.js");

    assert!(isolate.compile_run("a = ;", "three.js").is_err());
    let errors = events(&messages, "compileError");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["body"]["script"]["name"], "three.js");
    assert_eq!(errors[0]["body"]["line"], 0);
}
