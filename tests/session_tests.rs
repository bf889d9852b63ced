mod common;

use common::{autocorrect_session, diagnostic, replacing, reporting};
use hamlcop_lib::analyzer::AutocorrectMode;
use hamlcop_lib::document::TemplateDocument;
use hamlcop_lib::session::{LintSession, SessionError, SessionOptions, SessionState};
use pretty_assertions::assert_eq;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_broken_correction_is_rolled_back() {
    let mut session = autocorrect_session("%p{a: 1}\n");
    let analyzer = replacing(&[("WW(a: 1)", "WW(a: {1)")]);

    match session.run(&analyzer) {
        Err(SessionError::Parse(error)) => {
            assert_eq!(error.line, Some(1));
            assert_eq!(error.message, "<string>:1 - Unbalanced brackets.");
        }
        other => panic!("expected a parse error, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(session.document().current_text(), "%p{a: 1}\n");
    assert!(!session.document().was_changed());
}

#[test]
fn test_debug_mode_keeps_broken_text() {
    let document = TemplateDocument::new("%p{a: 1}\n", None).unwrap().keep_broken_text(true);
    let mut session = LintSession::new(
        document,
        SessionOptions {
            autocorrect: Some(AutocorrectMode::All),
            ignored_rules: Vec::new(),
        },
    );
    let analyzer = replacing(&[("WW(a: 1)", "WW(a: {1)")]);

    assert!(session.run(&analyzer).is_err());
    assert_eq!(session.document().current_text(), "%p{a: {1}\n");
}

#[test]
fn test_failed_session_can_run_again() {
    let mut session = autocorrect_session("%p{a: 1}\n- foo(bar , 42)\n");
    assert!(session.run(&replacing(&[("WW(a: 1)", "WW(a: {1)")])).is_err());
    assert_eq!(session.state(), SessionState::Failed);

    let report = session.run(&replacing(&[(" , ", ", ")])).unwrap();
    assert!(report.corrected);
    assert_eq!(session.state(), SessionState::Clean);
    assert_eq!(session.document().current_text(), "%p{a: 1}\n- foo(bar, 42)\n");
}

#[test]
fn test_diagnostics_map_to_template_lines() {
    let text = "%div\n  - if a\n    = foo(bar , 42)\n\n%p hello #{name}\n";
    let mut session = LintSession::new(TemplateDocument::new(text, None).unwrap(), SessionOptions::default());
    let extracted = {
        let (_, assembly) = common::assemble(text);
        assembly.source().to_string()
    };
    let lines: Vec<&str> = extracted.lines().collect();
    let line_of = |needle: &str| lines.iter().position(|line| line.contains(needle)).unwrap() + 1;

    let analyzer = reporting(vec![
        diagnostic(line_of("foo(bar , 42)"), "Layout/SpaceBeforeComma"),
        diagnostic(line_of("HL.out = name"), "Style/Interpolated"),
        diagnostic(line_of("if haml_lint_tag_indent"), "Style/Guard"),
        diagnostic(line_of("  end"), "Layout/EndAlignment"),
    ]);
    let report = session.run(&analyzer).unwrap();
    let found: Vec<(usize, &str)> = report
        .lints
        .iter()
        .map(|lint| (lint.line, lint.rule_name.as_deref().unwrap_or("")))
        .collect();
    assert_eq!(
        found,
        vec![
            (1, "Style/Guard"),
            (3, "Layout/SpaceBeforeComma"),
            (3, "Layout/EndAlignment"),
            (5, "Style/Interpolated"),
        ]
    );
}

#[test]
fn test_ignored_rules_are_dropped() {
    let mut session = LintSession::new(
        TemplateDocument::new("- foo\n", None).unwrap(),
        SessionOptions {
            autocorrect: None,
            ignored_rules: vec!["Lint/Void".to_string()],
        },
    );
    let analyzer = reporting(vec![diagnostic(2, "Lint/Void"), diagnostic(2, "Style/Other")]);
    let report = session.run(&analyzer).unwrap();
    assert_eq!(report.lints.len(), 1);
    assert_eq!(report.lints[0].rule_name.as_deref(), Some("Style/Other"));
}

#[test]
fn test_corrections_written_back_once() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("show.haml");
    fs::write(&path, "- foo(bar , 42)\n").unwrap();

    let document = TemplateDocument::load(&path).unwrap();
    let mut session = LintSession::new(
        document,
        SessionOptions {
            autocorrect: Some(AutocorrectMode::Safe),
            ignored_rules: Vec::new(),
        },
    );
    session.run(&replacing(&[(" , ", ", ")])).unwrap();

    let mut document = session.into_document();
    assert!(document.write_to_disk().unwrap());
    assert_eq!(fs::read_to_string(&path).unwrap(), "- foo(bar, 42)\n");
    assert!(!document.write_to_disk().unwrap());
}

#[test]
fn test_clean_document_is_not_written() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("show.haml");
    fs::write(&path, "- foo(bar, 42)\n").unwrap();

    let mut session = LintSession::new(TemplateDocument::load(&path).unwrap(), SessionOptions::default());
    session.run(&replacing(&[])).unwrap();
    assert!(!session.into_document().write_to_disk().unwrap());
}
