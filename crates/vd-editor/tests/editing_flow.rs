//! An edit session end to end: hit-test a selection, snap a drag, paste a
//! copy, and unwind it all with undo.

use kurbo::Rect;
use pretty_assertions::assert_eq;
use vd_core::hit::{pointer_hit_test, rect_hit_test};
use vd_core::wire::parse_document;
use vd_core::{Prop, Properties};
use vd_editor::snap::{SnapEngine, SnapOptions};
use vd_editor::{copy, paste};
use std::collections::HashSet;

fn workspace() -> vd_core::Document {
    parse_document(
        r##"{ "version": "2.6", "children": [
            { "id": "left", "type": "rectangle",
              "x": 100, "y": 100, "width": 50, "height": 50, "fills": "#10B981" },
            { "id": "moving", "type": "rectangle",
              "x": 148, "y": 100, "width": 50, "height": 50, "fills": "#F59E0B" }
        ] }"##,
    )
    .unwrap()
}

#[test]
fn drag_snaps_then_commits_then_undoes() {
    let mut doc = workspace();
    let moving = doc.scene.node_by_path("moving").unwrap();

    // The pointer picks the dragged rectangle.
    let picked = pointer_hit_test(&doc.scene, false, &HashSet::new(), 160.0, 110.0);
    assert_eq!(picked, Some(moving));

    // Snap resolves a +2 correction onto the left neighbor's right edge.
    let mut engine = SnapEngine::new();
    let result = engine.snap_bounds(
        &doc,
        &[moving],
        doc.scene.world_bounds(moving),
        &SnapOptions::default(),
    );
    assert_eq!(result.delta.x, 2.0);

    // Apply the snapped position through a block.
    let before_x = doc.scene.node(moving).resolved.x;
    let mut block = doc.begin_update().unwrap();
    let mut delta = Properties::default();
    delta.x = Some(Prop::Value(before_x + result.delta.x));
    block.update(moving, &delta).unwrap();
    block.commit(true).unwrap();
    assert_eq!(doc.scene.node(moving).geometry.x, 150.0);

    assert!(doc.undo());
    assert_eq!(doc.scene.node(moving).geometry.x, 148.0);
}

#[test]
fn marquee_selection_feeds_the_clipboard() {
    let mut doc = workspace();
    let selected = rect_hit_test(&doc.scene, Rect::new(90.0, 90.0, 210.0, 160.0));
    assert_eq!(selected.len(), 2);

    let paths: Vec<String> = selected
        .iter()
        .map(|&n| doc.scene.path_of(n))
        .collect();
    let payload = copy(&doc, &paths, "session").unwrap();
    assert_eq!(payload.local_data, vec!["left", "moving"]);

    let vp = doc.scene.viewport();
    let pasted = paste(&mut doc, &payload, "session", vp).unwrap();
    assert_eq!(pasted.len(), 2);
    assert_eq!(doc.scene.children(vp).len(), 4);

    // One undo unwinds the whole paste.
    assert!(doc.undo());
    assert_eq!(doc.scene.children(vp).len(), 2);
}
