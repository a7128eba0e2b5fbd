//! Hit-testing: world-space point → node, rect → nodes.
//!
//! Recursion is back-to-front (last sibling paints on top, so it is tested
//! first). A frame ancestor normally captures hits on its descendants;
//! `direct_select` or membership in the allowed-nested set lets the hit
//! pass through to the child.

use crate::geom;
use crate::scene::{NodeKind, Scene};
use kurbo::{Point, Rect, Shape};
use petgraph::graph::NodeIndex;
use std::collections::HashSet;

/// Topmost node at `(x, y)` in viewport coordinates, after frame capture.
pub fn pointer_hit_test(
    scene: &Scene,
    direct_select: bool,
    allowed_nested: &HashSet<NodeIndex>,
    x: f64,
    y: f64,
) -> Option<NodeIndex> {
    let pt = Point::new(x, y);
    let raw = hit_node(scene, scene.viewport(), pt)?;
    if direct_select {
        return Some(raw);
    }

    // Outermost capturing frame between the viewport and the hit wins,
    // unless it has been explicitly allowed into.
    let mut chain = Vec::new();
    let mut cur = raw;
    while cur != scene.viewport() {
        chain.push(cur);
        cur = scene.parent(cur)?;
    }
    for &ancestor in chain.iter().rev() {
        if ancestor == raw {
            break;
        }
        if matches!(scene.node(ancestor).kind, NodeKind::Frame)
            && !allowed_nested.contains(&ancestor)
        {
            return Some(ancestor);
        }
    }
    Some(raw)
}

fn hit_node(scene: &Scene, idx: NodeIndex, pt: Point) -> Option<NodeIndex> {
    let node = scene.node(idx);
    if !matches!(node.kind, NodeKind::Viewport) && !node.resolved.enabled {
        return None;
    }
    for &child in scene.children(idx).iter().rev() {
        if let Some(hit) = hit_node(scene, child, pt) {
            return Some(hit);
        }
    }
    if matches!(node.kind, NodeKind::Viewport | NodeKind::Group) {
        return None; // transparent containers: only their children hit
    }
    contains_point(scene, idx, pt).then_some(idx)
}

/// Bounding-box containment, tightened to the actual outline for paths and
/// ellipses.
fn contains_point(scene: &Scene, idx: NodeIndex, world_pt: Point) -> bool {
    let inverse = scene.world_matrix(idx).inverse();
    let local = inverse * world_pt;
    let node = scene.node(idx);
    match &node.kind {
        NodeKind::Path { data } => data.contains(local),
        NodeKind::Ellipse => {
            let g = node.geometry;
            if g.width <= 0.0 || g.height <= 0.0 {
                return false;
            }
            let dx = (local.x - g.width / 2.0) / (g.width / 2.0);
            let dy = (local.y - g.height / 2.0) / (g.height / 2.0);
            dx * dx + dy * dy <= 1.0
        }
        _ => scene.local_bounds(idx).contains(local),
    }
}

/// All nodes whose world bounds intersect `rect`, in document order.
/// Rotated nodes use a separating-axis test against their oriented quad.
/// Used for marquee selection.
pub fn rect_hit_test(scene: &Scene, rect: Rect) -> Vec<NodeIndex> {
    let mut out = Vec::new();
    collect_intersecting(scene, scene.viewport(), rect, &mut out);
    out
}

fn collect_intersecting(scene: &Scene, idx: NodeIndex, rect: Rect, out: &mut Vec<NodeIndex>) {
    let node = scene.node(idx);
    if !matches!(node.kind, NodeKind::Viewport) {
        if !node.resolved.enabled {
            return;
        }
        let quad = geom::oriented_corners(scene.local_bounds(idx), scene.world_matrix(idx));
        if geom::sat_overlap(&quad, rect) {
            out.push(idx);
        }
    }
    for &child in scene.children(idx) {
        collect_intersecting(scene, child, rect, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::NodeId;
    use crate::model::SizeSpec;
    use crate::scene::{Geometry, Node};
    use crate::variable::{ThemeMap, VariableStore};

    fn refresh(scene: &mut Scene) {
        let vars = VariableStore::new();
        let theme = ThemeMap::new();
        scene.refresh_resolved_all(&vars, &theme, true);
    }

    fn place(scene: &mut Scene, idx: NodeIndex, x: f64, y: f64, w: f64, h: f64) {
        scene.node_mut(idx).geometry = Geometry { x, y, width: w, height: h };
    }

    fn rect_node(id: &str) -> Node {
        let mut n = Node::new(NodeId::intern(id), NodeKind::Rectangle);
        n.props.width = Some(SizeSpec::fixed(0.0));
        n.props.height = Some(SizeSpec::fixed(0.0));
        n
    }

    #[test]
    fn frames_capture_descendant_hits() {
        let mut scene = Scene::new();
        let vp = scene.viewport();
        let frame = scene.insert(Node::new(NodeId::intern("card"), NodeKind::Frame));
        let inner = scene.insert(rect_node("inner"));
        scene.attach(frame, vp, None).unwrap();
        scene.attach(inner, frame, None).unwrap();
        refresh(&mut scene);
        place(&mut scene, frame, 0.0, 0.0, 100.0, 100.0);
        place(&mut scene, inner, 10.0, 10.0, 50.0, 50.0);

        let none = HashSet::new();
        // Capture: the frame wins over the child it contains.
        assert_eq!(pointer_hit_test(&scene, false, &none, 20.0, 20.0), Some(frame));
        // Direct select pierces the frame.
        assert_eq!(pointer_hit_test(&scene, true, &none, 20.0, 20.0), Some(inner));
        // Allow-listing the frame also lets the hit through.
        let mut allowed = HashSet::new();
        allowed.insert(frame);
        assert_eq!(pointer_hit_test(&scene, false, &allowed, 20.0, 20.0), Some(inner));
    }

    #[test]
    fn later_siblings_hit_first() {
        let mut scene = Scene::new();
        let vp = scene.viewport();
        let below = scene.insert(rect_node("below"));
        let above = scene.insert(rect_node("above"));
        scene.attach(below, vp, None).unwrap();
        scene.attach(above, vp, None).unwrap();
        refresh(&mut scene);
        place(&mut scene, below, 0.0, 0.0, 40.0, 40.0);
        place(&mut scene, above, 20.0, 20.0, 40.0, 40.0);

        let none = HashSet::new();
        assert_eq!(pointer_hit_test(&scene, false, &none, 30.0, 30.0), Some(above));
        assert_eq!(pointer_hit_test(&scene, false, &none, 5.0, 5.0), Some(below));
        assert_eq!(pointer_hit_test(&scene, false, &none, 200.0, 200.0), None);
    }

    #[test]
    fn ellipse_hits_respect_the_outline() {
        let mut scene = Scene::new();
        let vp = scene.viewport();
        let ellipse = scene.insert(Node::new(NodeId::intern("dot"), NodeKind::Ellipse));
        scene.attach(ellipse, vp, None).unwrap();
        refresh(&mut scene);
        place(&mut scene, ellipse, 0.0, 0.0, 100.0, 50.0);

        let none = HashSet::new();
        // Center hits, bounding-box corner misses.
        assert_eq!(pointer_hit_test(&scene, false, &none, 50.0, 25.0), Some(ellipse));
        assert_eq!(pointer_hit_test(&scene, false, &none, 2.0, 2.0), None);
    }

    #[test]
    fn marquee_collects_intersecting_nodes() {
        let mut scene = Scene::new();
        let vp = scene.viewport();
        let a = scene.insert(rect_node("a"));
        let b = scene.insert(rect_node("b"));
        scene.attach(a, vp, None).unwrap();
        scene.attach(b, vp, None).unwrap();
        refresh(&mut scene);
        place(&mut scene, a, 0.0, 0.0, 30.0, 30.0);
        place(&mut scene, b, 100.0, 100.0, 30.0, 30.0);

        let hits = rect_hit_test(&scene, Rect::new(-10.0, -10.0, 50.0, 50.0));
        assert_eq!(hits, vec![a]);
        let hits = rect_hit_test(&scene, Rect::new(-10.0, -10.0, 200.0, 200.0));
        assert_eq!(hits, vec![a, b]);
    }
}
