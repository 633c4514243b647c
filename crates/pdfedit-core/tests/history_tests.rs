//! Undo/redo behavior as seen through `EditorSession`

mod common;

use common::{build_pdf, init_tracing, FakeRasterizer};
use pdfedit_core::{Color, EditorConfig, EditorSession, Focus};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn session_with(config: EditorConfig) -> EditorSession {
    let rasterizer = FakeRasterizer::new(2);
    EditorSession::open(build_pdf(&["One", "Two"]), &rasterizer, 612.0, config).unwrap()
}

#[test]
fn draft_annotation_undo_redo() {
    init_tracing();
    let mut session = session_with(EditorConfig::default());
    let id = session
        .add_text_annotation(100.0, 500.0, "Draft", Some(24.0), Some(Color::rgb(220, 38, 38)))
        .unwrap();
    assert!(session.can_undo());
    assert!(!session.can_redo());

    assert!(session.undo());
    assert!(session.store().annotations().is_empty());
    assert_eq!(session.store().focus(), Focus::None);
    assert!(session.can_redo());

    assert!(session.redo());
    let annotation = session.store().annotation(id).unwrap();
    assert_eq!(annotation.text, "Draft");
    assert_eq!(annotation.font_size_pt, 24.0);
    assert!(!session.can_redo());
}

#[test]
fn new_action_clears_redo() {
    init_tracing();
    let mut session = session_with(EditorConfig::default());
    session.add_text_annotation(10.0, 10.0, "A", None, None).unwrap();
    session.undo();
    assert!(session.can_redo());
    session.add_text_annotation(20.0, 20.0, "B", None, None).unwrap();
    assert!(!session.can_redo());
    assert_eq!(session.store().annotations()[0].text, "B");
}

#[test]
fn history_is_bounded_by_config() {
    init_tracing();
    let config = EditorConfig {
        history_capacity: 3,
        ..EditorConfig::default()
    };
    let mut session = session_with(config);
    for i in 0..5 {
        session
            .add_text_annotation(10.0, 10.0 + i as f64 * 20.0, &format!("Note {}", i), None, None)
            .unwrap();
    }
    assert_eq!(session.action_count(), 3);

    while session.undo() {}
    // the two oldest additions fell off the history and stay
    let texts: Vec<_> = session.store().annotations().iter().map(|a| a.text.as_str()).collect();
    assert_eq!(texts, vec!["Note 0", "Note 1"]);
    assert!(!session.undo());
}

#[test]
fn invalid_targets_are_ignored() {
    init_tracing();
    let mut session = session_with(EditorConfig::default());
    assert!(!session.move_annotation(42, 1.0, 1.0));
    assert!(!session.remove_image(7));
    assert!(!session.resize_signature(100.0));
    assert!(session.add_text_annotation(1.0, 1.0, "   ", None, None).is_none());
    assert_eq!(session.action_count(), 0);
    assert!(!session.undo());
}

#[derive(Debug, Clone)]
enum Op {
    Add(f64, f64),
    Move(usize, f64, f64),
    Resize(usize, f64),
    Remove(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0.0..600.0f64, 0.0..780.0f64).prop_map(|(x, y)| Op::Add(x, y)),
        (0usize..8, 0.0..600.0f64, 0.0..780.0f64).prop_map(|(i, x, y)| Op::Move(i, x, y)),
        (0usize..8, 4.0..144.0f64).prop_map(|(i, s)| Op::Resize(i, s)),
        (0usize..8).prop_map(Op::Remove),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn undo_everything_restores_empty_store(ops in prop::collection::vec(op(), 1..40)) {
        let mut session = session_with(EditorConfig::default());
        for op in ops {
            let ids: Vec<_> = session.store().annotations().iter().map(|a| a.id).collect();
            let pick = |i: usize| ids.get(i % ids.len().max(1)).copied();
            match op {
                Op::Add(x, y) => {
                    session.add_text_annotation(x, y, "Note", None, None);
                }
                Op::Move(i, x, y) => {
                    if let Some(id) = pick(i) {
                        session.move_annotation(id, x, y);
                    }
                }
                Op::Resize(i, size) => {
                    if let Some(id) = pick(i) {
                        session.resize_annotation_font(id, size);
                    }
                }
                Op::Remove(i) => {
                    if let Some(id) = pick(i) {
                        session.remove_annotation(id);
                    }
                }
            }
        }

        let snapshot = session.store().annotations().to_vec();
        let recorded = session.action_count();
        while session.undo() {}
        prop_assert!(session.store().annotations().is_empty());

        for _ in 0..recorded {
            prop_assert!(session.redo());
        }
        prop_assert_eq!(session.store().annotations().to_vec(), snapshot);
    }
}
