//! Geometric snapping.
//!
//! While dragging or resizing, candidate points on the moving selection
//! (the bounding box's four corners plus center, or a single point) are
//! compared per axis against anchor points collected from the parent frame
//! and from non-selected siblings visible in the viewport. The smallest
//! delta within the zoom-scaled threshold wins; exact ties accumulate so
//! the host can draw every matching guide line.

use kurbo::{Point, Rect, Vec2};
use vd_core::geom::handle_points;
use vd_core::{Direction, Document, NodeIndex, NodeKind};

#[derive(Debug, Clone)]
pub struct SnapOptions {
    /// Global toggle; disabled snapping always returns a zero delta.
    pub enabled: bool,
    /// Screen-space snap distance; divided by zoom for world comparisons.
    pub threshold: f64,
    pub zoom: f64,
    /// Round anchor and candidate coordinates to integers first.
    pub round_to_pixels: bool,
    /// Which axes may snap (side-handle resizing of rotated objects
    /// restricts this to none unless the rotation is a multiple of 90°).
    pub axes: [bool; 2],
    /// Visible world rect; anchors outside it are ignored.
    pub viewport: Rect,
}

impl Default for SnapOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 5.0,
            zoom: 1.0,
            round_to_pixels: false,
            axes: [true, true],
            viewport: Rect::new(f64::MIN, f64::MIN, f64::MAX, f64::MAX),
        }
    }
}

/// One accepted (candidate, anchor) match on an axis.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedSnap {
    pub candidate: Point,
    pub anchor: Point,
    /// The coordinate being snapped to, along the snap axis.
    pub position: f64,
}

#[derive(Debug, Clone, Default)]
pub struct SnapResult {
    pub delta: Vec2,
    /// Matches per axis (x, then y) for guide rendering.
    pub recorded: [Vec<RecordedSnap>; 2],
}

#[derive(Debug, Default)]
pub struct SnapEngine {
    best: [f64; 2],
    recorded: [Vec<RecordedSnap>; 2],
}

impl SnapEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn reset(&mut self) {
        self.best = [f64::INFINITY, f64::INFINITY];
        self.recorded[0].clear();
        self.recorded[1].clear();
    }

    /// Snap a dragged bounding box: candidates are its four corners plus
    /// center.
    pub fn snap_bounds(
        &mut self,
        doc: &Document,
        selection: &[NodeIndex],
        bounds: Rect,
        options: &SnapOptions,
    ) -> SnapResult {
        self.snap_points(doc, selection, &handle_points(bounds), options)
    }

    /// Snap a single point (e.g. a vector pen vertex).
    pub fn snap_point(
        &mut self,
        doc: &Document,
        selection: &[NodeIndex],
        point: Point,
        options: &SnapOptions,
    ) -> SnapResult {
        self.snap_points(doc, selection, &[point], options)
    }

    pub fn snap_points(
        &mut self,
        doc: &Document,
        selection: &[NodeIndex],
        candidates: &[Point],
        options: &SnapOptions,
    ) -> SnapResult {
        self.reset();
        if !options.enabled {
            return SnapResult::default();
        }

        // The first selected node leads; snapping needs a parent to snap
        // within, and layout-managed selections never snap (layout owns
        // their position).
        let Some(&lead) = selection.first() else {
            return SnapResult::default();
        };
        let Some(parent) = doc.scene.parent(lead) else {
            return SnapResult::default();
        };
        for &node in selection {
            let managed = doc
                .scene
                .parent(node)
                .map_or(false, |p| doc.scene.node(p).resolved.direction != Direction::None)
                && doc.scene.node(node).resolved.enabled;
            if managed {
                return SnapResult::default();
            }
        }

        let mut anchors = Vec::new();
        if matches!(doc.scene.node(parent).kind, NodeKind::Frame) {
            anchors.extend(handle_points(doc.scene.world_bounds(parent)));
        }
        for &sibling in doc.scene.children(parent) {
            collect_anchors(doc, sibling, selection, options.viewport, &mut anchors);
        }

        let limit = options.threshold / options.zoom;
        for &candidate in candidates {
            for &anchor in &anchors {
                let (candidate, anchor) = if options.round_to_pixels {
                    (
                        Point::new(candidate.x.round(), candidate.y.round()),
                        Point::new(anchor.x.round(), anchor.y.round()),
                    )
                } else {
                    (candidate, anchor)
                };
                for axis in 0..2 {
                    if !options.axes[axis] {
                        continue;
                    }
                    let delta = match axis {
                        0 => anchor.x - candidate.x,
                        _ => anchor.y - candidate.y,
                    };
                    if delta.abs() >= limit || delta.abs() > self.best[axis].abs() {
                        continue;
                    }
                    let record = RecordedSnap {
                        candidate,
                        anchor,
                        position: if axis == 0 { anchor.x } else { anchor.y },
                    };
                    if (delta.abs() - self.best[axis].abs()).abs() < f64::EPSILON
                        && self.best[axis].is_finite()
                    {
                        self.recorded[axis].push(record);
                    } else {
                        self.best[axis] = delta;
                        self.recorded[axis] = vec![record];
                    }
                }
            }
        }

        let finite = |v: f64| if v.is_finite() { v } else { 0.0 };
        SnapResult {
            delta: Vec2::new(finite(self.best[0]), finite(self.best[1])),
            recorded: [self.recorded[0].clone(), self.recorded[1].clone()],
        }
    }
}

/// Anchor collection: groups are transparent (their children anchor
/// instead), everything else contributes its world-bounds handles when
/// visible.
fn collect_anchors(
    doc: &Document,
    node: NodeIndex,
    selection: &[NodeIndex],
    viewport: Rect,
    out: &mut Vec<Point>,
) {
    if selection.contains(&node) || !doc.scene.node(node).resolved.enabled {
        return;
    }
    if matches!(doc.scene.node(node).kind, NodeKind::Group) {
        for &child in doc.scene.children(node) {
            collect_anchors(doc, child, selection, viewport, out);
        }
        return;
    }
    let bounds = doc.scene.world_bounds(node);
    if bounds.intersect(viewport).is_zero_area() && !viewport.contains(bounds.origin()) {
        return;
    }
    out.extend(handle_points(bounds));
}

#[cfg(test)]
mod tests {
    use super::*;
    use vd_core::{Node, NodeId, Prop, SizeSpec};

    /// Two fixed rectangles and a dragged third; see that the dragged
    /// right edge at 198 snaps to the left rect's right edge at 150.
    fn fixture() -> (Document, NodeIndex) {
        let mut doc = Document::new();
        let vp = doc.scene.viewport();
        let mut block = doc.begin_update().unwrap();
        for (id, x) in [("left", 100.0), ("right", 300.0)] {
            let mut node = Node::new(NodeId::intern(id), vd_core::NodeKind::Rectangle);
            node.props.x = Some(Prop::Value(x));
            node.props.y = Some(Prop::Value(0.0));
            node.props.width = Some(SizeSpec::fixed(50.0));
            node.props.height = Some(SizeSpec::fixed(50.0));
            block.add_node(node, vp, None).unwrap();
        }
        let mut dragged = Node::new(NodeId::intern("dragged"), vd_core::NodeKind::Rectangle);
        dragged.props.x = Some(Prop::Value(148.0));
        dragged.props.y = Some(Prop::Value(0.0));
        dragged.props.width = Some(SizeSpec::fixed(50.0));
        dragged.props.height = Some(SizeSpec::fixed(50.0));
        let idx = block.add_node(dragged, vp, None).unwrap();
        block.commit(false).unwrap();
        (doc, idx)
    }

    #[test]
    fn snaps_to_nearest_sibling_edge() {
        let (doc, dragged) = fixture();
        let mut engine = SnapEngine::new();
        let bounds = doc.scene.world_bounds(dragged);
        let result = engine.snap_bounds(&doc, &[dragged], bounds, &SnapOptions::default());
        assert_eq!(result.delta.x, 2.0);
        assert_eq!(result.delta.y, 0.0);
    }

    #[test]
    fn disabled_engine_returns_zero() {
        let (doc, dragged) = fixture();
        let mut engine = SnapEngine::new();
        let bounds = doc.scene.world_bounds(dragged);
        let options = SnapOptions {
            enabled: false,
            ..Default::default()
        };
        let result = engine.snap_bounds(&doc, &[dragged], bounds, &options);
        assert_eq!(result.delta, Vec2::ZERO);
        assert!(result.recorded[0].is_empty());
    }

    #[test]
    fn threshold_scales_with_zoom() {
        let (doc, dragged) = fixture();
        let mut engine = SnapEngine::new();
        let bounds = doc.scene.world_bounds(dragged);
        // At zoom 4 the world threshold shrinks to 1.25 < 2.
        let options = SnapOptions {
            zoom: 4.0,
            ..Default::default()
        };
        let result = engine.snap_bounds(&doc, &[dragged], bounds, &options);
        assert_eq!(result.delta.x, 0.0);
    }

    #[test]
    fn restricted_axes_do_not_snap() {
        let (doc, dragged) = fixture();
        let mut engine = SnapEngine::new();
        let bounds = doc.scene.world_bounds(dragged);
        let options = SnapOptions {
            axes: [false, true],
            ..Default::default()
        };
        let result = engine.snap_bounds(&doc, &[dragged], bounds, &options);
        assert_eq!(result.delta.x, 0.0);
    }

    #[test]
    fn layout_managed_selection_never_snaps() {
        let mut doc = Document::new();
        let vp = doc.scene.viewport();
        let mut block = doc.begin_update().unwrap();
        let mut frame = Node::new(NodeId::intern("row"), vd_core::NodeKind::Frame);
        frame.props.direction = Some(vd_core::Direction::Horizontal);
        frame.props.width = Some(SizeSpec::fixed(300.0));
        frame.props.height = Some(SizeSpec::fixed(60.0));
        let frame_idx = block.add_node(frame, vp, None).unwrap();
        let mut child = Node::new(NodeId::intern("cell"), vd_core::NodeKind::Rectangle);
        child.props.width = Some(SizeSpec::fixed(40.0));
        child.props.height = Some(SizeSpec::fixed(40.0));
        let child_idx = block.add_node(child, frame_idx, None).unwrap();
        block.commit(false).unwrap();

        let mut engine = SnapEngine::new();
        let bounds = doc.scene.world_bounds(child_idx);
        let result = engine.snap_bounds(&doc, &[child_idx], bounds, &SnapOptions::default());
        assert_eq!(result.delta, Vec2::ZERO);
    }

    #[test]
    fn snapping_is_order_independent() {
        let (doc, dragged) = fixture();
        let bounds = doc.scene.world_bounds(dragged);
        let mut a = SnapEngine::new();
        let first = a.snap_bounds(&doc, &[dragged], bounds, &SnapOptions::default());
        let mut b = SnapEngine::new();
        let second = b.snap_bounds(&doc, &[dragged], bounds, &SnapOptions::default());
        assert_eq!(first.delta, second.delta);
        assert_eq!(first.recorded[0].len(), second.recorded[0].len());
    }

    #[test]
    fn pixel_rounding_applies_before_comparison() {
        let mut doc = Document::new();
        let vp = doc.scene.viewport();
        let mut block = doc.begin_update().unwrap();
        let mut anchor = Node::new(NodeId::intern("anchor"), vd_core::NodeKind::Rectangle);
        anchor.props.x = Some(Prop::Value(100.4));
        anchor.props.y = Some(Prop::Value(0.0));
        anchor.props.width = Some(SizeSpec::fixed(50.0));
        anchor.props.height = Some(SizeSpec::fixed(50.0));
        block.add_node(anchor, vp, None).unwrap();
        let mut dragged = Node::new(NodeId::intern("dragged"), vd_core::NodeKind::Rectangle);
        dragged.props.x = Some(Prop::Value(103.6));
        dragged.props.y = Some(Prop::Value(0.0));
        dragged.props.width = Some(SizeSpec::fixed(50.0));
        dragged.props.height = Some(SizeSpec::fixed(50.0));
        let idx = block.add_node(dragged, vp, None).unwrap();
        block.commit(false).unwrap();

        let mut engine = SnapEngine::new();
        let bounds = doc.scene.world_bounds(idx);
        let options = SnapOptions {
            round_to_pixels: true,
            ..Default::default()
        };
        let result = engine.snap_bounds(&doc, &[idx], bounds, &options);
        // Rounded: candidate 104 vs anchor 100.
        assert_eq!(result.delta.x, -4.0);
    }
}
