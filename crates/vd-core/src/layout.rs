//! Two-pass fit/fill layout.
//!
//! Sizing runs independently per axis, horizontal first so text wrapping
//! can react to a settled width before heights are computed. Each axis
//! gets a post-order *fit* pass (content-sized nodes grow to their
//! children) and a pre-order *fill* pass (remaining space divided among
//! fill children), then a single pre-order position pass applies
//! justify/align. Results are committed into `Node::geometry`; running
//! layout twice in a row is a fixed point.

use crate::model::{AlignItems, Direction, JustifyContent, SizingBehavior, TextGrowth};
use crate::scene::{NodeKind, Scene};
use kurbo::{Point, Size};
use petgraph::graph::NodeIndex;

/// Horizontal or vertical, in layout terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    fn of(direction: Direction) -> Option<Axis> {
        match direction {
            Direction::Horizontal => Some(Axis::X),
            Direction::Vertical => Some(Axis::Y),
            Direction::None => None,
        }
    }
}

/// Smallest size a commit will assign a group's children; keeps
/// proportional rescale invertible.
pub const MIN_GROUP_SIZE: f64 = 1e-6;

/// Smallest size a fill child receives.
const MIN_FILL_SIZE: f64 = 1.0;

// ─── Text measurement contract ───────────────────────────────────────────

/// Font shaping lives outside the core; layout only needs measured
/// paragraph extents. `max_width: None` measures intrinsic (unwrapped)
/// extents — fit sizing calls this first, then re-measures at the chosen
/// width so multi-line aligned text gets a correct box.
pub trait TextMeasurer {
    fn measure(
        &self,
        content: &str,
        font_family: &str,
        font_size: f64,
        line_height: f64,
        letter_spacing: f64,
        max_width: Option<f64>,
    ) -> Size;
}

/// Glyph-free fallback: average advance of 0.6 em, greedy wrap.
#[derive(Debug, Default)]
pub struct HeuristicMeasurer;

impl TextMeasurer for HeuristicMeasurer {
    fn measure(
        &self,
        content: &str,
        _font_family: &str,
        font_size: f64,
        line_height: f64,
        letter_spacing: f64,
        max_width: Option<f64>,
    ) -> Size {
        let line_height = if line_height > 0.0 {
            line_height
        } else {
            font_size * 1.2
        };
        let advance = font_size * 0.6 + letter_spacing;
        let mut widest = 0.0f64;
        let mut lines = 0usize;
        for line in content.split('\n') {
            let w = line.chars().count() as f64 * advance;
            match max_width {
                Some(max) if w > max && max > advance => {
                    lines += (w / max).ceil() as usize;
                    widest = widest.max(max);
                }
                _ => {
                    lines += 1;
                    widest = widest.max(w);
                }
            }
        }
        Size::new(widest, lines.max(1) as f64 * line_height)
    }
}

// ─── Entry point ─────────────────────────────────────────────────────────

/// Run the full pipeline over a subtree (normally the viewport).
pub fn run_layout(scene: &mut Scene, root: NodeIndex, measurer: &dyn TextMeasurer) {
    seed_geometry(scene, root);
    fit_pass(scene, root, Axis::X, measurer);
    fill_pass(scene, root, Axis::X);
    fit_pass(scene, root, Axis::Y, measurer);
    fill_pass(scene, root, Axis::Y);
    position_pass(scene, root);
}

/// Copy resolved positions and fixed/fallback sizes into committed
/// geometry. Fit/fill passes overwrite the managed axes afterwards.
fn seed_geometry(scene: &mut Scene, root: NodeIndex) {
    for idx in scene.descendants(root) {
        let node = scene.node_mut(idx);
        if matches!(node.kind, NodeKind::Viewport) {
            continue;
        }
        node.geometry.x = node.resolved.x;
        node.geometry.y = node.resolved.y;
        if !matches!(node.kind, NodeKind::Group) {
            node.geometry.width = node.resolved.width;
            node.geometry.height = node.resolved.height;
        }
    }
}

fn participates(scene: &Scene, idx: NodeIndex) -> bool {
    scene.node(idx).resolved.enabled
}

fn size_of(scene: &Scene, idx: NodeIndex, axis: Axis) -> f64 {
    let g = scene.node(idx).geometry;
    match axis {
        Axis::X => g.width,
        Axis::Y => g.height,
    }
}

/// Committed size plus stroke expansion when `includeStroke` is set.
fn outer_size(scene: &Scene, idx: NodeIndex, axis: Axis) -> f64 {
    let node = scene.node(idx);
    let mut size = size_of(scene, idx, axis);
    if node.resolved.include_stroke {
        if let Some(stroke) = &node.resolved.stroke {
            if let crate::model::Prop::Value(w) = stroke.width {
                size += 2.0 * stroke.outset(w);
            }
        }
    }
    size
}

fn sizing_of(scene: &Scene, idx: NodeIndex, axis: Axis) -> SizingBehavior {
    let r = &scene.node(idx).resolved;
    match axis {
        Axis::X => r.sizing_x,
        Axis::Y => r.sizing_y,
    }
}

/// Padding pair along an axis: (leading, trailing) — (left, right) on X,
/// (top, bottom) on Y. Stored order is top, right, bottom, left.
fn padding_pair(scene: &Scene, idx: NodeIndex, axis: Axis) -> (f64, f64) {
    let p = scene.node(idx).resolved.padding;
    match axis {
        Axis::X => (p[3], p[1]),
        Axis::Y => (p[0], p[2]),
    }
}

/// Layout children of a node: attached, enabled ones.
fn layout_children(scene: &Scene, idx: NodeIndex) -> Vec<NodeIndex> {
    scene
        .children(idx)
        .iter()
        .copied()
        .filter(|&c| participates(scene, c))
        .collect()
}

/// Commit a size on one axis. Groups never carry their own size: the
/// commit rescales all children proportionally, preserving relative
/// positions, with a floor so degenerate sizes stay invertible.
pub fn commit_axis_size(scene: &mut Scene, idx: NodeIndex, axis: Axis, size: f64) {
    if matches!(scene.node(idx).kind, NodeKind::Group) {
        let old = size_of(scene, idx, axis).max(MIN_GROUP_SIZE);
        let factor = size.max(MIN_GROUP_SIZE) / old;
        for child in scene.children(idx).to_vec() {
            scale_subtree(scene, child, axis, factor);
        }
    }
    let g = &mut scene.node_mut(idx).geometry;
    match axis {
        Axis::X => g.width = size,
        Axis::Y => g.height = size,
    }
}

fn scale_subtree(scene: &mut Scene, idx: NodeIndex, axis: Axis, factor: f64) {
    {
        let g = &mut scene.node_mut(idx).geometry;
        match axis {
            Axis::X => {
                g.x *= factor;
                g.width = (g.width * factor).max(MIN_GROUP_SIZE);
            }
            Axis::Y => {
                g.y *= factor;
                g.height = (g.height * factor).max(MIN_GROUP_SIZE);
            }
        }
    }
    for child in scene.children(idx).to_vec() {
        scale_subtree(scene, child, axis, factor);
    }
}

// ─── Fit pass (post-order) ───────────────────────────────────────────────

fn fit_pass(scene: &mut Scene, idx: NodeIndex, axis: Axis, measurer: &dyn TextMeasurer) {
    for child in scene.children(idx).to_vec() {
        fit_pass(scene, child, axis, measurer);
    }
    if !participates(scene, idx) {
        return;
    }
    match &scene.node(idx).kind {
        NodeKind::Viewport => {}
        NodeKind::Text => fit_text(scene, idx, axis, measurer),
        NodeKind::Group => {
            // Groups track the extent of their children on both axes.
            let mut extent = 0.0f64;
            for &child in scene.children(idx) {
                let g = scene.node(child).geometry;
                let end = match axis {
                    Axis::X => g.x + g.width,
                    Axis::Y => g.y + g.height,
                };
                extent = extent.max(end);
            }
            let g = &mut scene.node_mut(idx).geometry;
            match axis {
                Axis::X => g.width = extent,
                Axis::Y => g.height = extent,
            }
        }
        _ => {
            if sizing_of(scene, idx, axis) != SizingBehavior::FitContent {
                return;
            }
            let direction = scene.node(idx).resolved.direction;
            let Some(primary) = Axis::of(direction) else {
                return;
            };
            let kids = layout_children(scene, idx);
            let (lead, trail) = padding_pair(scene, idx, axis);
            if kids.is_empty() {
                commit_axis_size(scene, idx, axis, lead + trail);
                return;
            }
            let spacing = scene.node(idx).resolved.child_spacing;
            let content = if axis == primary {
                let sum: f64 = kids.iter().map(|&c| outer_size(scene, c, axis)).sum();
                sum + spacing * (kids.len() as f64 - 1.0)
            } else {
                kids.iter()
                    .map(|&c| outer_size(scene, c, axis))
                    .fold(0.0, f64::max)
            };
            commit_axis_size(scene, idx, axis, content + lead + trail);
        }
    }
}

/// Text sizing: fit shapes once unbounded to find the intrinsic width,
/// then again at that width, so aligned multi-line text gets the box its
/// lines actually occupy. Fixed-width growth shapes at the committed
/// width; fixed-width-height honors both axes.
fn fit_text(scene: &mut Scene, idx: NodeIndex, axis: Axis, measurer: &dyn TextMeasurer) {
    let r = scene.node(idx).resolved.clone();
    let measure = |max_width: Option<f64>| {
        measurer.measure(
            &r.content,
            &r.font_family,
            r.font_size,
            r.line_height,
            r.letter_spacing,
            max_width,
        )
    };
    match (axis, r.text_growth) {
        (Axis::X, TextGrowth::Auto) => {
            let intrinsic = measure(None);
            let shaped = measure(Some(intrinsic.width));
            scene.node_mut(idx).geometry.width = shaped.width.max(intrinsic.width);
        }
        (Axis::X, _) => {} // width stays committed
        (Axis::Y, TextGrowth::FixedWidthHeight) => {} // both stay committed
        (Axis::Y, _) => {
            let width = scene.node(idx).geometry.width;
            let shaped = measure(Some(width));
            scene.node_mut(idx).geometry.height = shaped.height;
        }
    }
}

// ─── Fill pass (pre-order) ───────────────────────────────────────────────

fn fill_pass(scene: &mut Scene, idx: NodeIndex, axis: Axis) {
    if participates(scene, idx) {
        if let Some(primary) = Axis::of(scene.node(idx).resolved.direction) {
            let kids = layout_children(scene, idx);
            if !kids.is_empty() {
                let (lead, trail) = padding_pair(scene, idx, axis);
                let inner = size_of(scene, idx, axis) - lead - trail;
                let fill: Vec<NodeIndex> = kids
                    .iter()
                    .copied()
                    .filter(|&c| sizing_of(scene, c, axis) == SizingBehavior::FillContainer)
                    .collect();
                if axis == primary {
                    if !fill.is_empty() {
                        let spacing = scene.node(idx).resolved.child_spacing;
                        let fixed: f64 = kids
                            .iter()
                            .filter(|c| !fill.contains(c))
                            .map(|&c| outer_size(scene, c, axis))
                            .sum();

                        let remainder =
                            inner - fixed - spacing * (kids.len() as f64 - 1.0);
                        let each = (remainder / fill.len() as f64).max(MIN_FILL_SIZE);
                        for &c in &fill {
                            commit_axis_size(scene, c, axis, each);
                        }
                    }
                } else {
                    for &c in &fill {
                        commit_axis_size(scene, c, axis, inner.max(MIN_FILL_SIZE));
                    }
                }
            }
        }
    }
    for child in scene.children(idx).to_vec() {
        fill_pass(scene, child, axis);
    }
}

// ─── Position pass (pre-order) ───────────────────────────────────────────

fn position_pass(scene: &mut Scene, idx: NodeIndex) {
    if participates(scene, idx) {
        if let Some(primary) = Axis::of(scene.node(idx).resolved.direction) {
            let kids = layout_children(scene, idx);
            if !kids.is_empty() {
                let cross = match primary {
                    Axis::X => Axis::Y,
                    Axis::Y => Axis::X,
                };
                let r = scene.node(idx).resolved.clone();
                let n = kids.len() as f64;
                let (lead_p, trail_p) = padding_pair(scene, idx, primary);
                let (lead_c, trail_c) = padding_pair(scene, idx, cross);
                let inner_p = size_of(scene, idx, primary) - lead_p - trail_p;
                let inner_c = size_of(scene, idx, cross) - lead_c - trail_c;
                let occupied: f64 = kids.iter().map(|&c| outer_size(scene, c, primary)).sum();
                let spacing_total = r.child_spacing * (n - 1.0);
                let free = inner_p - occupied - spacing_total;

                let (mut cursor, between) = match r.justify_content {
                    JustifyContent::Start => (lead_p, r.child_spacing),
                    JustifyContent::Center => (lead_p + free / 2.0, r.child_spacing),
                    JustifyContent::End => (lead_p + free, r.child_spacing),
                    JustifyContent::SpaceBetween => {
                        if kids.len() > 1 {
                            (lead_p, (inner_p - occupied) / (n - 1.0))
                        } else {
                            (lead_p, r.child_spacing)
                        }
                    }
                    JustifyContent::SpaceAround => {
                        (lead_p + free / (2.0 * n), r.child_spacing + free / n)
                    }
                };

                for &child in &kids {
                    let child_p = outer_size(scene, child, primary);
                    let child_c = outer_size(scene, child, cross);
                    let cross_pos = match r.align_items {
                        AlignItems::Start => lead_c,
                        AlignItems::Center => lead_c + (inner_c - child_c) / 2.0,
                        AlignItems::End => lead_c + inner_c - child_c,
                    };
                    let g = &mut scene.node_mut(child).geometry;
                    match primary {
                        Axis::X => {
                            g.x = cursor;
                            g.y = cross_pos;
                        }
                        Axis::Y => {
                            g.y = cursor;
                            g.x = cross_pos;
                        }
                    }
                    cursor += child_p + between;
                }
            }
        }
    }
    for child in scene.children(idx).to_vec() {
        position_pass(scene, child);
    }
}

// ─── Insertion index ─────────────────────────────────────────────────────

/// Where a point (in the parent's layout-local coordinates) would insert a
/// new child: the index of the first child whose mid-line on the primary
/// axis is past the point, or `children.len()`.
pub fn insertion_index(scene: &Scene, parent: NodeIndex, point: Point) -> usize {
    let Some(primary) = Axis::of(scene.node(parent).resolved.direction) else {
        return scene.children(parent).len();
    };
    let along = match primary {
        Axis::X => point.x,
        Axis::Y => point.y,
    };
    let kids = layout_children(scene, parent);
    for (i, &child) in kids.iter().enumerate() {
        let g = scene.node(child).geometry;
        let mid = match primary {
            Axis::X => g.x + g.width / 2.0,
            Axis::Y => g.y + g.height / 2.0,
        };
        if mid > along {
            return i;
        }
    }
    scene.children(parent).len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::NodeId;
    use crate::model::{Direction, Prop, SizeSpec};
    use crate::scene::Node;
    use crate::variable::{ThemeMap, VariableStore};

    fn fixed_rect(id: &str, w: f64, h: f64) -> Node {
        let mut n = Node::new(NodeId::intern(id), NodeKind::Rectangle);
        n.props.width = Some(SizeSpec::fixed(w));
        n.props.height = Some(SizeSpec::fixed(h));
        n
    }

    fn refresh(scene: &mut Scene) {
        let vars = VariableStore::new();
        let theme = ThemeMap::new();
        scene.refresh_resolved_all(&vars, &theme, true);
    }

    #[test]
    fn horizontal_frame_fits_and_positions() {
        // Frame: direction=Horizontal, padding 10 each side, spacing 5,
        // children 50×30 and 70×40. Expect 145×60, kids at (10,10), (65,10).
        let mut scene = Scene::new();
        let vp = scene.viewport();
        let frame = scene.insert(Node::new(NodeId::intern("row"), NodeKind::Frame));
        scene.attach(frame, vp, None).unwrap();
        {
            let p = &mut scene.node_mut(frame).props;
            p.direction = Some(Direction::Horizontal);
            p.width = Some(SizeSpec::fit_content(None));
            p.height = Some(SizeSpec::fit_content(None));
            p.padding = Some([
                Prop::Value(10.0),
                Prop::Value(10.0),
                Prop::Value(10.0),
                Prop::Value(10.0),
            ]);
            p.child_spacing = Some(Prop::Value(5.0));
        }
        let a = scene.insert(fixed_rect("a", 50.0, 30.0));
        let b = scene.insert(fixed_rect("b", 70.0, 40.0));
        scene.attach(a, frame, None).unwrap();
        scene.attach(b, frame, None).unwrap();
        refresh(&mut scene);

        run_layout(&mut scene, vp, &HeuristicMeasurer);

        let f = scene.node(frame).geometry;
        assert_eq!((f.width, f.height), (145.0, 60.0));
        let ga = scene.node(a).geometry;
        let gb = scene.node(b).geometry;
        assert_eq!((ga.x, ga.y), (10.0, 10.0));
        assert_eq!((gb.x, gb.y), (65.0, 10.0));
    }

    #[test]
    fn fill_children_share_remainder() {
        // Fixed 200 wide, one fixed 40 child, two fill children → 40/80/80.
        let mut scene = Scene::new();
        let vp = scene.viewport();
        let frame = scene.insert(Node::new(NodeId::intern("row"), NodeKind::Frame));
        scene.attach(frame, vp, None).unwrap();
        {
            let p = &mut scene.node_mut(frame).props;
            p.direction = Some(Direction::Horizontal);
            p.width = Some(SizeSpec::fixed(200.0));
            p.height = Some(SizeSpec::fixed(50.0));
        }
        let a = scene.insert(fixed_rect("a", 40.0, 50.0));
        let b = scene.insert(fixed_rect("b", 0.0, 50.0));
        let c = scene.insert(fixed_rect("c", 0.0, 50.0));
        scene.node_mut(b).props.width = Some(SizeSpec::fill_container(None));
        scene.node_mut(c).props.width = Some(SizeSpec::fill_container(None));
        for n in [a, b, c] {
            scene.attach(n, frame, None).unwrap();
        }
        refresh(&mut scene);

        run_layout(&mut scene, vp, &HeuristicMeasurer);

        assert_eq!(scene.node(a).geometry.width, 40.0);
        assert_eq!(scene.node(b).geometry.width, 80.0);
        assert_eq!(scene.node(c).geometry.width, 80.0);
    }

    #[test]
    fn empty_fit_content_is_padding_sum() {
        let mut scene = Scene::new();
        let vp = scene.viewport();
        let frame = scene.insert(Node::new(NodeId::intern("empty"), NodeKind::Frame));
        scene.attach(frame, vp, None).unwrap();
        {
            let p = &mut scene.node_mut(frame).props;
            p.direction = Some(Direction::Vertical);
            p.width = Some(SizeSpec::fit_content(None));
            p.height = Some(SizeSpec::fit_content(None));
            p.padding = Some([
                Prop::Value(4.0),
                Prop::Value(6.0),
                Prop::Value(8.0),
                Prop::Value(2.0),
            ]);
        }
        refresh(&mut scene);
        run_layout(&mut scene, vp, &HeuristicMeasurer);

        let g = scene.node(frame).geometry;
        assert_eq!(g.width, 6.0 + 2.0);
        assert_eq!(g.height, 4.0 + 8.0);
    }

    #[test]
    fn group_commit_rescales_children_proportionally() {
        let mut scene = Scene::new();
        let vp = scene.viewport();
        let group = scene.insert(Node::new(NodeId::intern("g"), NodeKind::Group));
        scene.attach(group, vp, None).unwrap();
        let a = scene.insert(fixed_rect("a", 10.0, 10.0));
        let b = scene.insert(fixed_rect("b", 20.0, 10.0));
        scene.attach(a, group, None).unwrap();
        scene.attach(b, group, None).unwrap();
        scene.node_mut(a).geometry = crate::scene::Geometry { x: 0.0, y: 0.0, width: 10.0, height: 10.0 };
        scene.node_mut(b).geometry = crate::scene::Geometry { x: 20.0, y: 0.0, width: 20.0, height: 10.0 };
        scene.node_mut(group).geometry.width = 40.0;

        commit_axis_size(&mut scene, group, Axis::X, 80.0);
        assert_eq!(scene.node(a).geometry.width, 20.0);
        assert_eq!(scene.node(b).geometry.x, 40.0);
        assert_eq!(scene.node(b).geometry.width, 40.0);

        // Zero commit floors children at the minimum, never 0.
        commit_axis_size(&mut scene, group, Axis::X, 0.0);
        assert!(scene.node(a).geometry.width >= MIN_GROUP_SIZE);
        assert!(scene.node(a).geometry.width < 1e-4);
    }

    #[test]
    fn space_between_single_child_behaves_like_start() {
        let mut scene = Scene::new();
        let vp = scene.viewport();
        let frame = scene.insert(Node::new(NodeId::intern("row"), NodeKind::Frame));
        scene.attach(frame, vp, None).unwrap();
        {
            let p = &mut scene.node_mut(frame).props;
            p.direction = Some(Direction::Horizontal);
            p.width = Some(SizeSpec::fixed(100.0));
            p.height = Some(SizeSpec::fixed(20.0));
            p.justify_content = Some(JustifyContent::SpaceBetween);
        }
        let a = scene.insert(fixed_rect("a", 30.0, 20.0));
        scene.attach(a, frame, None).unwrap();
        refresh(&mut scene);
        run_layout(&mut scene, vp, &HeuristicMeasurer);

        assert_eq!(scene.node(a).geometry.x, 0.0);
    }

    #[test]
    fn layout_is_a_fixed_point() {
        let mut scene = Scene::new();
        let vp = scene.viewport();
        let frame = scene.insert(Node::new(NodeId::intern("col"), NodeKind::Frame));
        scene.attach(frame, vp, None).unwrap();
        {
            let p = &mut scene.node_mut(frame).props;
            p.direction = Some(Direction::Vertical);
            p.width = Some(SizeSpec::fit_content(None));
            p.height = Some(SizeSpec::fit_content(None));
            p.child_spacing = Some(Prop::Value(12.0));
        }
        let a = scene.insert(fixed_rect("a", 80.0, 24.0));
        let b = scene.insert(fixed_rect("b", 120.0, 36.0));
        scene.attach(a, frame, None).unwrap();
        scene.attach(b, frame, None).unwrap();
        refresh(&mut scene);

        run_layout(&mut scene, vp, &HeuristicMeasurer);
        let first: Vec<_> = scene
            .descendants(vp)
            .iter()
            .map(|&n| scene.node(n).geometry)
            .collect();
        run_layout(&mut scene, vp, &HeuristicMeasurer);
        let second: Vec<_> = scene
            .descendants(vp)
            .iter()
            .map(|&n| scene.node(n).geometry)
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn insertion_index_uses_midlines() {
        let mut scene = Scene::new();
        let vp = scene.viewport();
        let frame = scene.insert(Node::new(NodeId::intern("row"), NodeKind::Frame));
        scene.attach(frame, vp, None).unwrap();
        {
            let p = &mut scene.node_mut(frame).props;
            p.direction = Some(Direction::Horizontal);
            p.width = Some(SizeSpec::fixed(300.0));
            p.height = Some(SizeSpec::fixed(40.0));
        }
        let a = scene.insert(fixed_rect("a", 100.0, 40.0));
        let b = scene.insert(fixed_rect("b", 100.0, 40.0));
        scene.attach(a, frame, None).unwrap();
        scene.attach(b, frame, None).unwrap();
        refresh(&mut scene);
        run_layout(&mut scene, vp, &HeuristicMeasurer);

        // a spans 0..100 (mid 50), b spans 100..200 (mid 150).
        assert_eq!(insertion_index(&scene, frame, Point::new(20.0, 0.0)), 0);
        assert_eq!(insertion_index(&scene, frame, Point::new(90.0, 0.0)), 1);
        assert_eq!(insertion_index(&scene, frame, Point::new(260.0, 0.0)), 2);
    }

    #[test]
    fn text_fit_measures_twice() {
        let mut scene = Scene::new();
        let vp = scene.viewport();
        let text = scene.insert(Node::new(NodeId::intern("label"), NodeKind::Text));
        scene.attach(text, vp, None).unwrap();
        {
            let p = &mut scene.node_mut(text).props;
            p.content = Some(Prop::Value("Sign in".to_string()));
            p.font_size = Some(Prop::Value(10.0));
        }
        refresh(&mut scene);
        run_layout(&mut scene, vp, &HeuristicMeasurer);

        let g = scene.node(text).geometry;
        assert!((g.width - 7.0 * 6.0).abs() < 1e-9); // 7 chars × 0.6 em
        assert!((g.height - 12.0).abs() < 1e-9); // one line at 1.2 em
    }

    #[test]
    fn disabled_children_are_skipped() {
        let mut scene = Scene::new();
        let vp = scene.viewport();
        let frame = scene.insert(Node::new(NodeId::intern("row"), NodeKind::Frame));
        scene.attach(frame, vp, None).unwrap();
        {
            let p = &mut scene.node_mut(frame).props;
            p.direction = Some(Direction::Horizontal);
            p.width = Some(SizeSpec::fit_content(None));
            p.height = Some(SizeSpec::fit_content(None));
        }
        let a = scene.insert(fixed_rect("a", 50.0, 20.0));
        let b = scene.insert(fixed_rect("b", 50.0, 20.0));
        scene.node_mut(b).props.enabled = Some(Prop::Value(false));
        scene.attach(a, frame, None).unwrap();
        scene.attach(b, frame, None).unwrap();
        refresh(&mut scene);
        run_layout(&mut scene, vp, &HeuristicMeasurer);

        assert_eq!(scene.node(frame).geometry.width, 50.0);
    }
}
