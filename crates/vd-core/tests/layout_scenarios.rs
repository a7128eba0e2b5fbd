//! End-to-end layout: wire documents parsed, committed, and laid out
//! through the document pipeline.

use pretty_assertions::assert_eq;
use vd_core::wire::parse_document;
use vd_core::{Document, Node, NodeId, NodeKind, Prop, Properties, SizeSpec};

#[test]
fn horizontal_row_from_the_wire() {
    // Frame at (0,0), horizontal, padding 10, spacing 5, two fixed
    // children 50×30 and 70×40 → outer 145×60, children at (10,10), (65,10).
    let doc = parse_document(
        r##"{ "version": "2.6", "children": [
            { "id": "row", "type": "frame", "x": 0, "y": 0,
              "width": "fit_content", "height": "fit_content",
              "mode": "horizontal", "padding": 10, "childSpacing": 5,
              "alignItems": "start",
              "children": [
                  { "id": "a", "type": "rectangle", "width": 50, "height": 30 },
                  { "id": "b", "type": "rectangle", "width": 70, "height": 40 }
              ] } ] }"##,
    )
    .unwrap();

    let row = doc.scene.node_by_path("row").unwrap();
    let a = doc.scene.node_by_path("row/a").unwrap();
    let b = doc.scene.node_by_path("row/b").unwrap();

    let g = doc.scene.node(row).geometry;
    assert_eq!((g.width, g.height), (145.0, 60.0));
    let ga = doc.scene.node(a).geometry;
    assert_eq!((ga.x, ga.y), (10.0, 10.0));
    let gb = doc.scene.node(b).geometry;
    assert_eq!((gb.x, gb.y), (65.0, 10.0));
}

#[test]
fn fill_children_divide_the_remainder() {
    // Fixed 200-wide row: fixed 40 child plus two fill children → 40/80/80.
    let doc = parse_document(
        r##"{ "version": "2.6", "children": [
            { "id": "row", "type": "frame", "width": 200, "height": 50,
              "mode": "horizontal",
              "children": [
                  { "id": "a", "type": "rectangle", "width": 40, "height": 50 },
                  { "id": "b", "type": "rectangle", "width": "fill_container", "height": 50 },
                  { "id": "c", "type": "rectangle", "width": "fill_container", "height": 50 }
              ] } ] }"##,
    )
    .unwrap();

    let width_of = |path: &str| {
        doc.scene
            .node(doc.scene.node_by_path(path).unwrap())
            .geometry
            .width
    };
    assert_eq!(width_of("row/a"), 40.0);
    assert_eq!(width_of("row/b"), 80.0);
    assert_eq!(width_of("row/c"), 80.0);
}

#[test]
fn commits_keep_layout_at_a_fixed_point() {
    let mut doc = parse_document(
        r##"{ "version": "2.6", "children": [
            { "id": "col", "type": "frame", "width": "fit_content",
              "height": "fit_content", "mode": "vertical", "childSpacing": 8,
              "children": [
                  { "id": "a", "type": "rectangle", "width": 90, "height": 20 },
                  { "id": "b", "type": "rectangle", "width": 120, "height": 30 }
              ] } ] }"##,
    )
    .unwrap();

    let col = doc.scene.node_by_path("col").unwrap();
    assert_eq!(doc.scene.node(col).geometry.width, 120.0);
    assert_eq!(doc.scene.node(col).geometry.height, 58.0);

    // An unrelated commit re-runs layout; nothing moves.
    let before: Vec<_> = doc
        .scene
        .descendants(doc.scene.viewport())
        .iter()
        .map(|&n| doc.scene.node(n).geometry)
        .collect();
    let mut block = doc.begin_update().unwrap();
    let mut delta = Properties::default();
    delta.opacity = Some(Prop::Value(0.9));
    block.update(col, &delta).unwrap();
    block.commit(true).unwrap();
    let after: Vec<_> = doc
        .scene
        .descendants(doc.scene.viewport())
        .iter()
        .map(|&n| doc.scene.node(n).geometry)
        .collect();
    assert_eq!(before, after);
}

#[test]
fn growing_a_child_reflows_the_fit_parent() {
    let mut doc = parse_document(
        r##"{ "version": "2.6", "children": [
            { "id": "col", "type": "frame", "width": "fit_content",
              "height": "fit_content", "mode": "vertical",
              "children": [
                  { "id": "a", "type": "rectangle", "width": 50, "height": 20 }
              ] } ] }"##,
    )
    .unwrap();
    let col = doc.scene.node_by_path("col").unwrap();
    let a = doc.scene.node_by_path("col/a").unwrap();
    assert_eq!(doc.scene.node(col).geometry.height, 20.0);

    let mut block = doc.begin_update().unwrap();
    let mut delta = Properties::default();
    delta.height = Some(SizeSpec::fixed(44.0));
    block.update(a, &delta).unwrap();
    block.commit(true).unwrap();
    assert_eq!(doc.scene.node(col).geometry.height, 44.0);

    assert!(doc.undo());
    assert_eq!(doc.scene.node(col).geometry.height, 20.0);
}

#[test]
fn text_column_wraps_against_the_settled_width() {
    // The column fixes the width before the vertical pass, so the text
    // wraps instead of overflowing sideways.
    let doc = parse_document(
        r##"{ "version": "2.6", "children": [
            { "id": "col", "type": "frame", "width": 120, "height": "fit_content",
              "mode": "vertical",
              "children": [
                  { "id": "body", "type": "text", "width": "fill_container",
                    "textGrowth": "fixed-width",
                    "content": "a fairly long paragraph that must wrap",
                    "fontSize": 10 }
              ] } ] }"##,
    )
    .unwrap();
    let body = doc.scene.node_by_path("col/body").unwrap();
    let g = doc.scene.node(body).geometry;
    assert_eq!(g.width, 120.0);
    // 38 chars × 6px ≈ 228 intrinsic; at 120 that is two wrapped lines.
    assert_eq!(g.height, 24.0);

    let col = doc.scene.node_by_path("col").unwrap();
    assert_eq!(doc.scene.node(col).geometry.height, 24.0);
}

#[test]
fn justify_and_align_position_children() {
    let doc = parse_document(
        r##"{ "version": "2.6", "children": [
            { "id": "row", "type": "frame", "width": 200, "height": 100,
              "mode": "horizontal", "justifyContent": "space_between",
              "alignItems": "center",
              "children": [
                  { "id": "a", "type": "rectangle", "width": 40, "height": 40 },
                  { "id": "b", "type": "rectangle", "width": 40, "height": 40 },
                  { "id": "c", "type": "rectangle", "width": 40, "height": 40 }
              ] } ] }"##,
    )
    .unwrap();

    let geo = |path: &str| doc.scene.node(doc.scene.node_by_path(path).unwrap()).geometry;
    // 200 − 120 = 80 free, 40 between each pair.
    assert_eq!(geo("row/a").x, 0.0);
    assert_eq!(geo("row/b").x, 80.0);
    assert_eq!(geo("row/c").x, 160.0);
    // Centered on the cross axis.
    assert_eq!(geo("row/a").y, 30.0);
}

#[test]
fn groups_scale_children_with_committed_size() {
    let mut doc = Document::new();
    let vp = doc.scene.viewport();
    let mut block = doc.begin_update().unwrap();
    let group = block
        .add_node(Node::new(NodeId::intern("g"), NodeKind::Group), vp, None)
        .unwrap();
    let mut inner = Node::new(NodeId::intern("inner"), NodeKind::Rectangle);
    inner.props.x = Some(Prop::Value(10.0));
    inner.props.y = Some(Prop::Value(0.0));
    inner.props.width = Some(SizeSpec::fixed(30.0));
    inner.props.height = Some(SizeSpec::fixed(20.0));
    let inner = block.add_node(inner, group, None).unwrap();
    block.commit(false).unwrap();

    // Group size derives from its children.
    assert_eq!(doc.scene.node(group).geometry.width, 40.0);

    vd_core::layout::commit_axis_size(&mut doc.scene, group, vd_core::Axis::X, 80.0);
    let g = doc.scene.node(inner).geometry;
    assert_eq!(g.x, 20.0);
    assert_eq!(g.width, 60.0);
}
