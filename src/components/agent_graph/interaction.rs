//! Pointer handling: drag pins, background pan and hover highlighting.
//!
//! The rendering adapter resolves raw pointer events to node/link ids and
//! calls the named methods here. The controller never stores positions; it
//! asks the [`LayoutEngine`] to pin and release.

use std::collections::BTreeSet;

use glam::DVec2;
use log::debug;

use super::layout::{LayoutEngine, LinkId, point_at_half_length};
use super::tooltip::{TOOLTIP_OFFSET, Tooltip, TooltipContent};
use super::types::{HighlightSet, ScreenRect};
use super::viewport::ViewportTransform;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeEmphasis {
	Active,
	Dimmed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkStyle {
	Normal,
	Highlighted,
}

#[derive(Clone, Debug, Default, PartialEq)]
enum Gesture {
	#[default]
	Idle,
	Dragging {
		node_id: String,
	},
	Panning {
		last: DVec2,
	},
}

#[derive(Debug, Default)]
pub struct InteractionController {
	gesture: Gesture,
	highlight: HighlightSet,
	highlighted_links: BTreeSet<LinkId>,
	tooltip: Option<Tooltip>,
}

impl InteractionController {
	pub fn new() -> Self {
		Self::default()
	}

	/// Starts dragging `node_id`, pinning it under the pointer.
	pub fn on_pointer_down(
		&mut self,
		node_id: &str,
		pointer: DVec2,
		engine: &mut LayoutEngine,
		viewport: &ViewportTransform,
	) -> bool {
		if !engine.pin_node(node_id, viewport.to_world(pointer)) {
			return false;
		}
		self.clear_hover();
		self.gesture = Gesture::Dragging {
			node_id: node_id.to_owned(),
		};
		true
	}

	pub fn on_background_down(&mut self, pointer: DVec2) {
		if self.gesture == Gesture::Idle {
			self.gesture = Gesture::Panning { last: pointer };
		}
	}

	pub fn on_pointer_move(
		&mut self,
		pointer: DVec2,
		engine: &mut LayoutEngine,
		viewport: &mut ViewportTransform,
	) {
		match &mut self.gesture {
			Gesture::Dragging { node_id } => {
				engine.pin_node(node_id, viewport.to_world(pointer));
			}
			Gesture::Panning { last } => {
				let delta = pointer - *last;
				viewport.apply_pan(delta.x, delta.y);
				*last = pointer;
			}
			Gesture::Idle => {}
		}
	}

	pub fn on_pointer_up(&mut self, engine: &mut LayoutEngine) {
		if let Gesture::Dragging { node_id } = std::mem::take(&mut self.gesture) {
			engine.release_node(&node_id);
		}
	}

	/// Highlights the node and its neighbours and shows its tooltip above
	/// `bounds`, the node's rendered box in screen space.
	pub fn on_node_enter(&mut self, node_id: &str, bounds: ScreenRect, engine: &LayoutEngine) {
		if self.is_dragging() {
			return;
		}
		let Some(node) = engine.node(node_id) else {
			return;
		};
		self.clear_hover();
		self.highlight = engine.neighbors(node_id);
		self.highlight.insert(node_id.to_owned());
		self.highlighted_links = engine.incident_links(node_id).collect();
		self.tooltip = Some(Tooltip {
			content: TooltipContent::for_node(&node.record),
			anchor: DVec2::new(bounds.center_x(), bounds.top - TOOLTIP_OFFSET),
		});
		debug!("hover {node_id}: {} active", self.highlight.len());
	}

	pub fn on_node_leave(&mut self) {
		self.clear_hover();
	}

	/// Highlights one link and shows its endpoints at the middle of its
	/// rendered path.
	pub fn on_link_enter(&mut self, link_id: LinkId, engine: &LayoutEngine, viewport: &ViewportTransform) {
		if self.is_dragging() {
			return;
		}
		let (Some(path), Some((source, target))) =
			(engine.link_path(link_id), engine.link_endpoints(link_id))
		else {
			return;
		};
		let Some(midpoint) = point_at_half_length(&path.points) else {
			return;
		};
		self.clear_hover();
		self.highlighted_links.insert(link_id);
		let anchor = viewport.to_screen(midpoint) - DVec2::new(0.0, TOOLTIP_OFFSET);
		self.tooltip = Some(Tooltip {
			content: TooltipContent::for_link(&source.record.label, &target.record.label),
			anchor,
		});
	}

	pub fn on_link_leave(&mut self) {
		self.clear_hover();
	}

	/// Drops hover state after the dataset changed. A drag survives if its
	/// node is still present.
	pub fn on_snapshot(&mut self, engine: &LayoutEngine) {
		self.clear_hover();
		if let Gesture::Dragging { node_id } = &self.gesture {
			if engine.node(node_id).is_none() {
				self.gesture = Gesture::Idle;
			}
		}
	}

	fn clear_hover(&mut self) {
		self.highlight.clear();
		self.highlighted_links.clear();
		self.tooltip = None;
	}

	pub fn highlight(&self) -> &HighlightSet {
		&self.highlight
	}

	pub fn node_emphasis(&self, node_id: &str) -> NodeEmphasis {
		if self.highlight.is_empty() || self.highlight.contains(node_id) {
			NodeEmphasis::Active
		} else {
			NodeEmphasis::Dimmed
		}
	}

	pub fn link_style(&self, link_id: LinkId) -> LinkStyle {
		if self.highlighted_links.contains(&link_id) {
			LinkStyle::Highlighted
		} else {
			LinkStyle::Normal
		}
	}

	pub fn tooltip(&self) -> Option<&Tooltip> {
		self.tooltip.as_ref()
	}

	pub fn is_dragging(&self) -> bool {
		self.dragged_node().is_some()
	}

	pub fn is_panning(&self) -> bool {
		matches!(self.gesture, Gesture::Panning { .. })
	}

	pub fn dragged_node(&self) -> Option<&str> {
		match &self.gesture {
			Gesture::Dragging { node_id } => Some(node_id),
			_ => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;
	use crate::components::agent_graph::layout::LayoutConfig;
	use crate::components::agent_graph::tooltip::{HISTORY_FALLBACK, HistoryView};
	use crate::components::agent_graph::types::{LinkRecord, NodeRecord, ViewportSize};

	const DT: f64 = 1.0 / 60.0;

	fn node(id: &str) -> NodeRecord {
		NodeRecord {
			id: id.into(),
			label: id.to_uppercase(),
			..Default::default()
		}
	}

	fn setup(nodes: &[&str], links: &[(&str, &str)]) -> (LayoutEngine, ViewportTransform) {
		let size = ViewportSize::new(800.0, 600.0);
		let mut engine = LayoutEngine::new(LayoutConfig::default(), size);
		let nodes: Vec<NodeRecord> = nodes.iter().map(|id| node(id)).collect();
		let links: Vec<LinkRecord> = links.iter().map(|(s, t)| LinkRecord::new(*s, *t)).collect();
		engine.seed(&nodes, &links, size);
		(engine, ViewportTransform::default())
	}

	fn bounds() -> ScreenRect {
		ScreenRect {
			left: 100.0,
			top: 200.0,
			width: 40.0,
			height: 40.0,
		}
	}

	fn ids(names: &[&str]) -> HighlightSet {
		names.iter().map(|s| s.to_string()).collect()
	}

	#[test]
	fn test_hover_chain() {
		let (engine, _) = setup(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
		let mut ctl = InteractionController::new();

		ctl.on_node_enter("b", bounds(), &engine);
		assert_eq!(ctl.highlight(), &ids(&["a", "b", "c"]));
		assert_eq!(ctl.link_style(0), LinkStyle::Highlighted);
		assert_eq!(ctl.link_style(1), LinkStyle::Highlighted);
		ctl.on_node_leave();
		assert!(ctl.highlight().is_empty());

		ctl.on_node_enter("a", bounds(), &engine);
		assert_eq!(ctl.highlight(), &ids(&["a", "b"]));
		assert_eq!(ctl.node_emphasis("c"), NodeEmphasis::Dimmed);
		assert_eq!(ctl.node_emphasis("b"), NodeEmphasis::Active);
		assert_eq!(ctl.link_style(0), LinkStyle::Highlighted);
		assert_eq!(ctl.link_style(1), LinkStyle::Normal);
		ctl.on_node_leave();

		ctl.on_node_enter("c", bounds(), &engine);
		assert_eq!(ctl.link_style(0), LinkStyle::Normal);
		ctl.on_node_leave();

		ctl.on_link_enter(0, &engine, &ViewportTransform::default());
		assert_eq!(ctl.link_style(0), LinkStyle::Highlighted);
		assert_eq!(ctl.link_style(1), LinkStyle::Normal);
		assert!(ctl.highlight().is_empty());
		ctl.on_link_leave();
		assert_eq!(ctl.link_style(0), LinkStyle::Normal);
	}

	#[test]
	fn test_isolated_node_highlights_itself() {
		let (engine, _) = setup(&["a", "lonely"], &[]);
		let mut ctl = InteractionController::new();
		ctl.on_node_enter("lonely", bounds(), &engine);
		assert_eq!(ctl.highlight(), &ids(&["lonely"]));
		assert_eq!(ctl.node_emphasis("a"), NodeEmphasis::Dimmed);
		ctl.on_node_leave();
		assert_eq!(ctl.node_emphasis("a"), NodeEmphasis::Active);
	}

	#[test]
	fn test_node_tooltip_anchor_and_fallback() {
		let size = ViewportSize::new(800.0, 600.0);
		let mut engine = LayoutEngine::new(LayoutConfig::default(), size);
		let mut broken = node("a");
		broken.data.agent_execution_history = Some(serde_json::Value::from("not json"));
		engine.seed(&[broken], &[], size);

		let mut ctl = InteractionController::new();
		ctl.on_node_enter("a", bounds(), &engine);
		let tooltip = ctl.tooltip().unwrap();
		assert_eq!(tooltip.anchor, DVec2::new(120.0, 190.0));
		let TooltipContent::Node(content) = &tooltip.content else {
			panic!("expected node tooltip");
		};
		assert_eq!(content.history, HistoryView::Unparseable);
		assert_eq!(content.timestamp, "N/A");
		assert_eq!(HISTORY_FALLBACK, "Unable to parse history");

		ctl.on_node_leave();
		assert!(ctl.tooltip().is_none());
	}

	#[test]
	fn test_link_tooltip_at_screen_midpoint() {
		let (mut engine, mut viewport) = setup(&["a", "b"], &[("a", "b")]);
		engine.pin_node("a", DVec2::new(100.0, 100.0));
		engine.pin_node("b", DVec2::new(300.0, 100.0));
		viewport.apply_zoom(-500.0, DVec2::new(50.0, 80.0));
		viewport.apply_pan(12.0, -7.0);

		let mut ctl = InteractionController::new();
		ctl.on_link_enter(0, &engine, &viewport);
		let tooltip = ctl.tooltip().unwrap();
		let expected = viewport.to_screen(DVec2::new(200.0, 100.0)) - DVec2::new(0.0, 10.0);
		assert!(tooltip.anchor.distance(expected) < 1e-9);
		assert_eq!(tooltip.content, TooltipContent::for_link("A", "B"));
	}

	#[test]
	fn test_drag_tracks_pointer_through_transform() {
		let (mut engine, mut viewport) = setup(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
		viewport.apply_zoom(-250.0, DVec2::new(400.0, 300.0));
		viewport.apply_pan(30.0, 15.0);
		let mut ctl = InteractionController::new();

		assert!(ctl.on_pointer_down("b", DVec2::new(400.0, 300.0), &mut engine, &viewport));
		assert!(ctl.is_dragging());

		let pointer = DVec2::new(420.0, 350.0);
		ctl.on_pointer_move(pointer, &mut engine, &mut viewport);
		let expected = viewport.to_world(pointer);
		assert_eq!(engine.node("b").unwrap().position, expected);
		engine.step(DT);
		assert_eq!(engine.node("b").unwrap().position, expected);

		ctl.on_pointer_up(&mut engine);
		assert!(!ctl.is_dragging());
		assert!(!engine.node("b").unwrap().is_pinned());
		for _ in 0..5 {
			engine.step(DT);
		}
		assert_ne!(engine.node("b").unwrap().position, expected);
	}

	#[test]
	fn test_hover_ignored_while_dragging() {
		let (mut engine, viewport) = setup(&["a", "b"], &[("a", "b")]);
		let mut ctl = InteractionController::new();
		ctl.on_pointer_down("a", DVec2::new(400.0, 300.0), &mut engine, &viewport);
		ctl.on_node_enter("b", bounds(), &engine);
		ctl.on_link_enter(0, &engine, &viewport);
		assert!(ctl.highlight().is_empty());
		assert!(ctl.tooltip().is_none());
		assert_eq!(ctl.link_style(0), LinkStyle::Normal);
	}

	#[test]
	fn test_rapid_enter_leave_leaves_nothing_behind() {
		let (engine, viewport) = setup(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
		let mut ctl = InteractionController::new();
		for _ in 0..10 {
			ctl.on_node_enter("b", bounds(), &engine);
			ctl.on_link_enter(1, &engine, &viewport);
			ctl.on_node_leave();
			ctl.on_link_leave();
		}
		assert!(ctl.highlight().is_empty());
		assert!(ctl.tooltip().is_none());
		assert_eq!(ctl.link_style(0), LinkStyle::Normal);
		assert_eq!(ctl.link_style(1), LinkStyle::Normal);
	}

	#[test]
	fn test_background_pan() {
		let (mut engine, mut viewport) = setup(&["a"], &[]);
		let mut ctl = InteractionController::new();
		ctl.on_background_down(DVec2::new(10.0, 10.0));
		assert!(ctl.is_panning());
		ctl.on_pointer_move(DVec2::new(25.0, 4.0), &mut engine, &mut viewport);
		ctl.on_pointer_move(DVec2::new(30.0, 0.0), &mut engine, &mut viewport);
		let t = viewport.current();
		assert_eq!((t.translate_x, t.translate_y), (20.0, -10.0));
		ctl.on_pointer_up(&mut engine);
		assert!(!ctl.is_panning());
	}

	#[test]
	fn test_unknown_node_is_not_dragged() {
		let (mut engine, viewport) = setup(&["a"], &[]);
		let mut ctl = InteractionController::new();
		assert!(!ctl.on_pointer_down("ghost", DVec2::ZERO, &mut engine, &viewport));
		assert!(!ctl.is_dragging());
	}

	#[test]
	fn test_snapshot_ends_drag_of_vanished_node() {
		let (mut engine, viewport) = setup(&["a", "b"], &[("a", "b")]);
		let mut ctl = InteractionController::new();
		ctl.on_pointer_down("a", DVec2::new(300.0, 300.0), &mut engine, &viewport);
		ctl.on_snapshot(&engine);
		assert_eq!(ctl.dragged_node(), Some("a"));

		engine.seed(&[node("x")], &[], ViewportSize::new(800.0, 600.0));
		ctl.on_snapshot(&engine);
		assert_eq!(ctl.dragged_node(), None);
	}
}
