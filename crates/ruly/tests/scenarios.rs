use ruly::{
    accept_first, action, attempt, one_or_more, zero_or_more, CharClass, Expr, Grammar, Hooks,
    Parser, Status,
};

#[test]
fn digit_sequence_produces_one_node() {
    let mut g: Grammar = Grammar::new();
    let digit = CharClass::range(b'0', b'9').named("digit");
    let number = g.rule("number");
    g.define(number, one_or_more(digit));

    let (status, stop, result) = g.analyze_result(number, "532");
    assert!(status.accepted(), "status {status}");
    assert_eq!(stop, 3);

    let node = result.expect("top level capture");
    assert_eq!(&*node.name, "number");
    assert_eq!(node.text("532"), "532");
}

#[test]
fn alternation_commits_to_longest_match() {
    let mut g: Grammar = Grammar::new();
    let kw = g.rule("kw");
    g.define(kw, Expr::literal("if") | "ifeq");

    let (status, stop) = g.analyze(kw, "ifeq");
    assert!(status.accepted(), "status {status}");
    assert_eq!(stop, 4);
}

#[test]
fn accept_first_overrides_longest_match() {
    let mut g: Grammar = Grammar::new();
    let kw = g.rule("kw");
    g.define(kw, accept_first() | "if" | "ifeq");

    let (status, stop) = g.analyze(kw, "ifeq");
    assert!(status.contains(Status::OK));
    assert!(status.contains(Status::REST));
    assert_eq!(stop, 2);
}

#[test]
fn action_after_alternation_sees_the_committed_branch() {
    fn is_long_form(text: &str) -> bool {
        text == "ifeq"
    }
    let mut g: Grammar = Grammar::new();
    let kw = g.rule("kw");
    g.define(
        kw,
        (Expr::literal("ifeq") | "if") + action(is_long_form, "is_long_form"),
    );

    let (status, stop) = g.analyze(kw, "ifeq");
    assert!(status.accepted(), "status {status}");
    assert_eq!(stop, 4);
}

fn recover_at_end(src: &str, pos: usize) -> (Status, usize) {
    match src[pos..].find("end") {
        Some(i) => (Status::OK | Status::SYNTAX, pos + i),
        None => (Status::NONE, pos),
    }
}

#[test]
fn try_catch_recovers_a_failed_body() {
    let mut g: Grammar = Grammar::new();
    let block = g.rule("block");
    g.define(block, Expr::literal("begin") + attempt() + "payload" + "end");

    let input = "begin garbage end";
    let mut cx: Parser<'_, ()> = Parser::new(input);
    cx.set_hooks(Hooks {
        catch: recover_at_end,
        ..Hooks::default()
    });
    let status = g.analyze_in(block, &mut cx);
    assert!(status.accepted(), "status {status}");
    assert!(status.contains(Status::CATCH));
    assert!(status.contains(Status::SYNTAX));
    assert_eq!(cx.stop(), input.len());
}

#[test]
fn whitespace_rule_accepts_empty_and_blank_input() {
    let mut g: Grammar = Grammar::new();
    let ws = CharClass::chars(" \t\n\r").named("ws");
    let blank = g.rule("blank");
    g.define(blank, zero_or_more(ws));

    for input in ["", "   \t\n"] {
        let (status, _) = g.analyze(blank, input);
        assert!(status.accepted(), "input {input:?} -> {status}");
    }
}

#[test]
fn analyze_is_idempotent() {
    let mut g: Grammar = Grammar::new();
    let digit = CharClass::range(b'0', b'9').named("digit");
    let number = g.rule("number");
    g.define(number, one_or_more(digit));
    let sum = g.rule("sum");
    g.define(sum, number + "+" + number);

    let input = "12 + 34";
    let (first_status, first_stop, first_result) = g.analyze_result(sum, input);
    let (second_status, second_stop, second_result) = g.analyze_result(sum, input);

    assert_eq!(first_status, second_status);
    assert_eq!(first_stop, second_stop);
    let first = first_result.expect("capture");
    let second = second_result.expect("capture");
    assert_eq!(first.span, second.span);
    assert_eq!(first.name, second.name);
}
