use glam::DVec2;
use log::debug;

use super::config::GraphConfig;
use super::interaction::InteractionController;
use super::layout::{LayoutEngine, LinkId};
use super::tooltip::Tooltip;
use super::types::{GraphSnapshot, ScreenRect, ViewportSize};
use super::viewport::ViewportTransform;

pub const NODE_RADIUS: f64 = 20.0;
/// World-space, scales with zoom like nodes.
pub const HIT_RADIUS: f64 = NODE_RADIUS + 2.0;
/// Screen pixels, independent of zoom.
pub const LINK_HIT_TOLERANCE: f64 = 5.0;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HitTarget {
	Node(String),
	Link(LinkId),
}

/// Everything the canvas owns between frames.
pub struct GraphState {
	pub engine: LayoutEngine,
	pub viewport: ViewportTransform,
	pub interaction: InteractionController,
	pub size: ViewportSize,
	/// Eased 0..1 progress of the hover highlight, for fading.
	pub highlight_t: f64,
	hovered: Option<HitTarget>,
	framed: bool,
}

impl GraphState {
	pub fn new(config: &GraphConfig, size: ViewportSize) -> Self {
		Self {
			engine: LayoutEngine::new(config.layout.clone(), size),
			viewport: ViewportTransform::new(config.viewport.clone()),
			interaction: InteractionController::new(),
			size,
			highlight_t: 0.0,
			hovered: None,
			framed: false,
		}
	}

	/// Replaces the displayed dataset. The viewport is framed on the first
	/// load only; later pages keep the user's pan and zoom.
	pub fn load_snapshot(&mut self, snapshot: &GraphSnapshot) {
		self.engine.seed(&snapshot.nodes, &snapshot.links, self.size);
		self.interaction.on_snapshot(&self.engine);
		self.hovered = None;
		self.highlight_t = 0.0;
		if !self.framed {
			let scale = self.viewport.config().initial_scale;
			self.viewport.reset(scale, self.size.center(), self.size);
			self.framed = true;
		}
	}

	pub fn screen_to_graph(&self, screen: DVec2) -> DVec2 {
		self.viewport.to_world(screen)
	}

	/// Node under the pointer first, then the closest link.
	pub fn hit_test(&self, screen: DVec2) -> Option<HitTarget> {
		let world = self.screen_to_graph(screen);
		if let Some(node) = self.engine.node_at(world, HIT_RADIUS) {
			return Some(HitTarget::Node(node.id().to_owned()));
		}
		self.engine
			.link_at(world, LINK_HIT_TOLERANCE / self.viewport.scale())
			.map(HitTarget::Link)
	}

	/// Screen-space box of a drawn node.
	pub fn node_screen_bounds(&self, id: &str) -> Option<ScreenRect> {
		let node = self.engine.node(id)?;
		let center = self.viewport.to_screen(node.position);
		let r = NODE_RADIUS * self.viewport.scale();
		Some(ScreenRect {
			left: center.x - r,
			top: center.y - r,
			width: 2.0 * r,
			height: 2.0 * r,
		})
	}

	pub fn set_hover(&mut self, target: Option<HitTarget>) {
		if self.hovered == target {
			return;
		}
		match self.hovered.take() {
			Some(HitTarget::Node(_)) => self.interaction.on_node_leave(),
			Some(HitTarget::Link(_)) => self.interaction.on_link_leave(),
			None => {}
		}
		match &target {
			Some(HitTarget::Node(id)) => {
				if let Some(bounds) = self.node_screen_bounds(id) {
					self.interaction.on_node_enter(id, bounds, &self.engine);
				}
			}
			Some(HitTarget::Link(link)) => {
				self.interaction
					.on_link_enter(*link, &self.engine, &self.viewport);
			}
			None => {}
		}
		self.hovered = target;
	}

	pub fn hovered(&self) -> Option<&HitTarget> {
		self.hovered.as_ref()
	}

	pub fn pointer_down(&mut self, screen: DVec2) {
		match self.hit_test(screen) {
			Some(HitTarget::Node(id)) => {
				self.set_hover(None);
				self.interaction
					.on_pointer_down(&id, screen, &mut self.engine, &self.viewport);
			}
			_ => self.interaction.on_background_down(screen),
		}
	}

	pub fn pointer_move(&mut self, screen: DVec2) {
		if self.interaction.is_dragging() || self.interaction.is_panning() {
			self.interaction
				.on_pointer_move(screen, &mut self.engine, &mut self.viewport);
		} else {
			let target = self.hit_test(screen);
			self.set_hover(target);
		}
	}

	pub fn pointer_up(&mut self) {
		self.interaction.on_pointer_up(&mut self.engine);
	}

	pub fn pointer_leave(&mut self) {
		self.pointer_up();
		self.set_hover(None);
	}

	/// Wheel zoom about the pointer. Tooltips are anchored in screen space,
	/// so hover is dropped.
	pub fn zoom(&mut self, delta: f64, screen: DVec2) {
		self.viewport.apply_zoom(delta, screen);
		self.set_hover(None);
	}

	pub fn tooltip(&self) -> Option<&Tooltip> {
		self.interaction.tooltip()
	}

	pub fn cursor(&self) -> &'static str {
		if self.interaction.is_dragging() || self.interaction.is_panning() {
			"grabbing"
		} else if self.hovered().is_some() {
			"pointer"
		} else {
			"grab"
		}
	}

	pub fn needs_tick(&self) -> bool {
		!self.engine.is_settled()
	}

	pub fn tick(&mut self, dt: f64) {
		if self.needs_tick() {
			self.engine.step(dt);
			if self.engine.is_settled() {
				debug!(
					"layout settled after {} ticks at alpha {:.5} ({} divergences)",
					self.engine.ticks(),
					self.engine.alpha(),
					self.engine.diagnostics().divergences.len()
				);
			}
		}

		let target = if self.interaction.highlight().is_empty() && self.hovered.is_none() {
			0.0
		} else {
			1.0
		};
		self.highlight_t += (target - self.highlight_t) * (6.0 * dt).min(1.0);
		if (target - self.highlight_t).abs() < 0.01 {
			self.highlight_t = target;
		}
	}

	pub fn resize(&mut self, size: ViewportSize) {
		if self.size == size {
			return;
		}
		debug!("canvas resized to {}x{}", size.width, size.height);
		self.size = size;
		self.engine.resize(size);
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;
	use crate::components::agent_graph::interaction::{LinkStyle, NodeEmphasis};
	use crate::components::agent_graph::types::{LinkRecord, NodeRecord};

	fn snapshot() -> GraphSnapshot {
		let node = |id: &str| NodeRecord {
			id: id.into(),
			label: id.to_uppercase(),
			..Default::default()
		};
		GraphSnapshot {
			nodes: vec![node("a"), node("b"), node("c")],
			links: vec![LinkRecord::new("a", "b")],
			has_more: false,
			page_index: 1,
			total_pages: 1,
		}
	}

	/// Loads the snapshot and pins `a` and `b` far apart at known spots.
	fn loaded() -> GraphState {
		let mut state = GraphState::new(&GraphConfig::default(), ViewportSize::new(800.0, 600.0));
		state.load_snapshot(&snapshot());
		state.engine.pin_node("a", DVec2::new(200.0, 300.0));
		state.engine.pin_node("b", DVec2::new(600.0, 300.0));
		state.engine.pin_node("c", DVec2::new(400.0, 500.0));
		state
	}

	#[test]
	fn test_first_load_frames_viewport() {
		let state = loaded();
		assert_eq!(state.viewport.scale(), 0.8);
		assert!(
			state
				.viewport
				.to_screen(DVec2::new(400.0, 300.0))
				.distance(DVec2::new(400.0, 300.0))
				< 1e-9
		);
	}

	#[test]
	fn test_later_loads_keep_viewport() {
		let mut state = loaded();
		state.viewport.apply_pan(25.0, -10.0);
		let before = state.viewport.current();
		state.load_snapshot(&snapshot());
		assert_eq!(state.viewport.current(), before);
	}

	#[test]
	fn test_hit_test_nodes_then_links() {
		let state = loaded();
		let a = state.viewport.to_screen(DVec2::new(200.0, 300.0));
		assert_eq!(state.hit_test(a), Some(HitTarget::Node("a".into())));

		let mid = state.viewport.to_screen(DVec2::new(400.0, 302.0));
		assert_eq!(state.hit_test(mid), Some(HitTarget::Link(0)));

		assert_eq!(state.hit_test(DVec2::new(5.0, 5.0)), None);
	}

	#[test]
	fn test_hover_node_highlights_neighbours() {
		let mut state = loaded();
		let a = state.viewport.to_screen(DVec2::new(200.0, 300.0));
		state.pointer_move(a);

		assert_eq!(state.hovered(), Some(&HitTarget::Node("a".into())));
		assert_eq!(state.interaction.node_emphasis("b"), NodeEmphasis::Active);
		assert_eq!(state.interaction.node_emphasis("c"), NodeEmphasis::Dimmed);
		assert_eq!(state.interaction.link_style(0), LinkStyle::Highlighted);

		let bounds = state.node_screen_bounds("a").unwrap();
		let anchor = state.tooltip().unwrap().anchor;
		assert_eq!(anchor, DVec2::new(bounds.center_x(), bounds.top - 10.0));
		assert_eq!(state.cursor(), "pointer");

		state.pointer_move(DVec2::new(5.0, 5.0));
		assert_eq!(state.hovered(), None);
		assert!(state.tooltip().is_none());
		assert_eq!(state.interaction.node_emphasis("c"), NodeEmphasis::Active);
	}

	#[test]
	fn test_drag_moves_node_under_pointer() {
		let mut state = loaded();
		state.engine.release_node("c");
		let c = state.viewport.to_screen(DVec2::new(400.0, 500.0));
		state.pointer_down(c);
		assert_eq!(state.interaction.dragged_node(), Some("c"));
		assert_eq!(state.cursor(), "grabbing");

		let target = DVec2::new(300.0, 250.0);
		state.pointer_move(target);
		let world = state.screen_to_graph(target);
		assert_eq!(state.engine.node("c").unwrap().position, world);

		state.pointer_up();
		assert!(!state.engine.node("c").unwrap().is_pinned());
		assert!(!state.interaction.is_dragging());
	}

	#[test]
	fn test_background_drag_pans() {
		let mut state = loaded();
		let before = state.viewport.current();
		state.pointer_down(DVec2::new(5.0, 5.0));
		state.pointer_move(DVec2::new(45.0, 25.0));
		state.pointer_leave();
		let after = state.viewport.current();
		assert_eq!(after.translate_x, before.translate_x + 40.0);
		assert_eq!(after.translate_y, before.translate_y + 20.0);
		assert!(!state.interaction.is_panning());
	}

	#[test]
	fn test_zoom_drops_hover() {
		let mut state = loaded();
		let a = state.viewport.to_screen(DVec2::new(200.0, 300.0));
		state.pointer_move(a);
		state.zoom(-100.0, a);
		assert!(state.viewport.scale() > 0.8);
		assert!(state.tooltip().is_none());
	}

	#[test]
	fn test_highlight_fades() {
		let mut state = loaded();
		let a = state.viewport.to_screen(DVec2::new(200.0, 300.0));
		state.pointer_move(a);
		for _ in 0..120 {
			state.tick(1.0 / 60.0);
		}
		assert_eq!(state.highlight_t, 1.0);
		state.pointer_leave();
		for _ in 0..120 {
			state.tick(1.0 / 60.0);
		}
		assert_eq!(state.highlight_t, 0.0);
	}
}
