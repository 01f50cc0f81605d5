//! Force-directed layout engine.
//!
//! The engine owns every node's position, velocity and pin. It never runs on
//! its own: the render loop calls [`LayoutEngine::step`] at whatever cadence
//! it likes, which keeps the simulation deterministic under test.
//!
//! Forces, applied in this order on each tick:
//! - link springs toward `link_distance`
//! - many-body repulsion (Barnes-Hut over a [`QuadTree`])
//! - disc collision
//! - centering (mean shift plus weak per-axis pulls)

use std::collections::{BTreeSet, HashMap};

use glam::DVec2;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::error::{LayoutDivergenceError, UnknownLinkEndpointError};
use super::quadtree::QuadTree;
use super::types::{LinkRecord, NodeRecord, NodeStatus, ViewportSize};

/// Reference frame length; `step(dt)` integrates `dt / FRAME_SECONDS` of a frame.
const FRAME_SECONDS: f64 = 1.0 / 60.0;

/// Energy the simulation is held at while a node is dragged.
pub const PIN_ALPHA: f64 = 0.3;
/// Minimum energy after a node is released.
pub const RELEASE_ALPHA: f64 = 0.1;
/// Minimum energy after the viewport is resized.
pub const RESIZE_ALPHA: f64 = 0.3;

pub type LinkId = usize;

/// Segments per drawn link curve used for hit testing.
const CURVE_SAMPLES: usize = 24;

#[derive(Clone, Debug, PartialEq)]
pub struct LayoutConfig {
	/// Seed of the jitter source. Same seed and snapshot give the same trajectory.
	pub seed: u64,
	/// Half-width of the square new nodes are scattered in around the centre.
	pub seed_jitter: f64,
	pub link_distance: f64,
	/// `None` uses `1 / min(degree(source), degree(target))`.
	pub link_strength: Option<f64>,
	/// Negative values repel.
	pub charge_strength: f64,
	pub charge_distance_min: f64,
	/// `None` uses half of the smaller viewport side.
	pub charge_distance_max: Option<f64>,
	/// Barnes-Hut opening angle.
	pub theta: f64,
	pub collide_radius: f64,
	pub collide_iterations: usize,
	pub collide_strength: f64,
	pub center_strength: f64,
	pub axis_strength: f64,
	/// Inset of the clamping rectangle.
	pub padding: f64,
	pub alpha_min: f64,
	pub alpha_decay: f64,
	pub velocity_decay: f64,
	/// Gap between the bends of parallel links.
	pub parallel_spacing: f64,
	pub loop_radius: f64,
}

impl Default for LayoutConfig {
	fn default() -> Self {
		let alpha_min = 0.001;
		Self {
			seed: 0x5eed,
			seed_jitter: 30.0,
			link_distance: 200.0,
			link_strength: None,
			charge_strength: -2000.0,
			charge_distance_min: 100.0,
			charge_distance_max: None,
			theta: 0.9,
			collide_radius: 80.0,
			collide_iterations: 4,
			collide_strength: 1.0,
			center_strength: 1.0,
			axis_strength: 0.1,
			padding: 50.0,
			alpha_min,
			// Reaches alpha_min after roughly 300 frames.
			alpha_decay: 1.0 - alpha_min.powf(1.0 / 300.0),
			velocity_decay: 0.4,
			parallel_spacing: 40.0,
			loop_radius: 30.0,
		}
	}
}

#[derive(Clone, Debug)]
pub struct LayoutNode {
	pub record: NodeRecord,
	pub position: DVec2,
	pub velocity: DVec2,
	pub pin: Option<DVec2>,
}

impl LayoutNode {
	pub fn id(&self) -> &str {
		&self.record.id
	}

	pub fn is_pinned(&self) -> bool {
		self.pin.is_some()
	}
}

/// A link resolved to indices into the engine's node table, so its endpoints
/// always read live positions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayoutLink {
	pub id: LinkId,
	pub source: usize,
	pub target: usize,
	/// Offset index among links joining the same pair of nodes.
	lane: f64,
}

impl LayoutLink {
	pub fn is_loop(&self) -> bool {
		self.source == self.target
	}
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayoutDiagnostics {
	pub dropped_links: Vec<UnknownLinkEndpointError>,
	pub divergences: Vec<LayoutDivergenceError>,
}

impl LayoutDiagnostics {
	pub fn dropped_link_count(&self) -> usize {
		self.dropped_links.len()
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct NodePlacement {
	pub id: String,
	pub label: String,
	pub status: NodeStatus,
	pub x: f64,
	pub y: f64,
	pub pinned: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LinkPath {
	pub id: LinkId,
	pub source: String,
	pub target: String,
	pub points: Vec<DVec2>,
}

/// Everything a renderer needs to draw one frame, in world coordinates.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayoutFrame {
	pub nodes: Vec<NodePlacement>,
	pub links: Vec<LinkPath>,
}

pub struct LayoutEngine {
	config: LayoutConfig,
	nodes: Vec<LayoutNode>,
	links: Vec<LayoutLink>,
	index: HashMap<String, usize>,
	viewport: ViewportSize,
	alpha: f64,
	alpha_target: f64,
	rng: StdRng,
	diagnostics: LayoutDiagnostics,
	ticks: u64,
}

fn jiggle(rng: &mut StdRng) -> f64 {
	(rng.random::<f64>() - 0.5) * 1e-6
}

fn jiggle_zero_axes(delta: &mut DVec2, rng: &mut StdRng) {
	if delta.x == 0.0 {
		delta.x = jiggle(rng);
	}
	if delta.y == 0.0 {
		delta.y = jiggle(rng);
	}
}

fn clamp_axis(value: f64, extent: f64, padding: f64) -> f64 {
	if extent <= 2.0 * padding {
		extent / 2.0
	} else {
		value.clamp(padding, extent - padding)
	}
}

/// Shortest distance from `point` to the segment `a`-`b`.
pub fn distance_to_segment(point: DVec2, a: DVec2, b: DVec2) -> f64 {
	let ab = b - a;
	let len2 = ab.length_squared();
	if len2 == 0.0 {
		return point.distance(a);
	}
	let t = ((point - a).dot(ab) / len2).clamp(0.0, 1.0);
	point.distance(a + ab * t)
}

/// Control point of the quadratic curve from `start` to `end` that passes
/// through `mid` at its half-way parameter.
pub fn quadratic_control(start: DVec2, mid: DVec2, end: DVec2) -> DVec2 {
	mid * 2.0 - (start + end) * 0.5
}

/// The link as drawn: three-point paths become sampled quadratic curves,
/// anything else is already a polyline.
pub fn curve_points(points: &[DVec2]) -> Vec<DVec2> {
	let [start, mid, end] = points else {
		return points.to_vec();
	};
	let control = quadratic_control(*start, *mid, *end);
	(0..=CURVE_SAMPLES)
		.map(|i| {
			let t = i as f64 / CURVE_SAMPLES as f64;
			let u = 1.0 - t;
			*start * (u * u) + control * (2.0 * u * t) + *end * (t * t)
		})
		.collect()
}

/// The point half way along a polyline, measured by arc length.
pub fn point_at_half_length(points: &[DVec2]) -> Option<DVec2> {
	let first = *points.first()?;
	let total: f64 = points.windows(2).map(|w| w[0].distance(w[1])).sum();
	let mut remaining = total / 2.0;
	for w in points.windows(2) {
		let length = w[0].distance(w[1]);
		if length > 0.0 && remaining <= length {
			return Some(w[0].lerp(w[1], remaining / length));
		}
		remaining -= length;
	}
	Some(points.last().copied().unwrap_or(first))
}

impl LayoutEngine {
	pub fn new(config: LayoutConfig, viewport: ViewportSize) -> Self {
		Self {
			rng: StdRng::seed_from_u64(config.seed),
			config,
			nodes: Vec::new(),
			links: Vec::new(),
			index: HashMap::new(),
			viewport,
			alpha: 0.0,
			alpha_target: 0.0,
			diagnostics: LayoutDiagnostics::default(),
			ticks: 0,
		}
	}

	/// Replaces the dataset. Positions from the previous dataset are dropped,
	/// except for nodes that are still pinned under a drag.
	pub fn seed(&mut self, nodes: &[NodeRecord], links: &[LinkRecord], viewport: ViewportSize) {
		let pinned: HashMap<String, DVec2> = self
			.nodes
			.iter()
			.filter_map(|n| n.pin.map(|pin| (n.record.id.clone(), pin)))
			.collect();

		self.viewport = viewport;
		self.rng = StdRng::seed_from_u64(self.config.seed);
		self.nodes.clear();
		self.links.clear();
		self.index.clear();
		self.diagnostics = LayoutDiagnostics::default();
		self.ticks = 0;

		let (center, jitter) = (viewport.center(), self.config.seed_jitter.abs());
		for record in nodes {
			if self.index.contains_key(&record.id) {
				warn!("ignoring duplicate node id {}", record.id);
				continue;
			}
			let offset = DVec2::new(
				self.rng.random_range(-jitter..=jitter),
				self.rng.random_range(-jitter..=jitter),
			);
			let pin = pinned.get(&record.id).copied();
			self.index.insert(record.id.clone(), self.nodes.len());
			self.nodes.push(LayoutNode {
				record: record.clone(),
				position: pin.unwrap_or(center + offset),
				velocity: DVec2::ZERO,
				pin,
			});
		}

		for link in links {
			match (self.index.get(&link.source), self.index.get(&link.target)) {
				(Some(&source), Some(&target)) => self.links.push(LayoutLink {
					id: self.links.len(),
					source,
					target,
					lane: 0.0,
				}),
				(source, _) => {
					let missing = if source.is_none() {
						&link.source
					} else {
						&link.target
					};
					let err = UnknownLinkEndpointError {
						from: link.source.clone(),
						to: link.target.clone(),
						missing: missing.clone(),
					};
					warn!("dropping link: {err}");
					self.diagnostics.dropped_links.push(err);
				}
			}
		}
		self.assign_lanes();

		self.alpha = 1.0;
		self.alpha_target = if self.nodes.iter().any(LayoutNode::is_pinned) {
			PIN_ALPHA
		} else {
			0.0
		};
		info!(
			"seeded layout with {} nodes and {} links ({} dropped)",
			self.nodes.len(),
			self.links.len(),
			self.diagnostics.dropped_link_count()
		);
	}

	fn assign_lanes(&mut self) {
		let mut groups: HashMap<(usize, usize), Vec<usize>> = HashMap::new();
		for (i, link) in self.links.iter().enumerate() {
			let key = (link.source.min(link.target), link.source.max(link.target));
			groups.entry(key).or_default().push(i);
		}
		for ((a, b), members) in groups {
			let count = members.len() as f64;
			for (k, i) in members.into_iter().enumerate() {
				self.links[i].lane = if a == b {
					k as f64
				} else {
					k as f64 - (count - 1.0) / 2.0
				};
			}
		}
	}

	/// Advances the simulation by one tick of `dt` seconds. A `dt` longer
	/// than one frame is integrated as a single frame.
	pub fn step(&mut self, dt: f64) {
		if self.nodes.is_empty() {
			return;
		}
		let h = if dt.is_finite() {
			dt.clamp(0.0, FRAME_SECONDS) / FRAME_SECONDS
		} else {
			1.0
		};

		let decay = 1.0 - (1.0 - self.config.alpha_decay).powf(h);
		self.alpha += (self.alpha_target - self.alpha) * decay;
		let alpha = self.alpha;

		self.apply_link_force(alpha);
		self.apply_many_body_force(alpha);
		self.apply_collision_force();
		self.apply_center_force();
		self.apply_axis_force(alpha);
		self.integrate(h);
		self.recover_divergence();
		self.clamp_to_bounds();
		self.ticks += 1;
	}

	fn apply_link_force(&mut self, alpha: f64) {
		let mut degree = vec![0usize; self.nodes.len()];
		for link in &self.links {
			degree[link.source] += 1;
			degree[link.target] += 1;
		}

		for i in 0..self.links.len() {
			let link = self.links[i];
			if link.is_loop() {
				continue;
			}
			let (s, t) = (&self.nodes[link.source], &self.nodes[link.target]);
			// Share of the correction absorbed by the target.
			let bias = match (s.is_pinned(), t.is_pinned()) {
				(true, true) => continue,
				(true, false) => 1.0,
				(false, true) => 0.0,
				(false, false) => 0.5,
			};
			let strength = self
				.config
				.link_strength
				.unwrap_or_else(|| 1.0 / degree[link.source].min(degree[link.target]) as f64);

			let mut delta = (t.position + t.velocity) - (s.position + s.velocity);
			jiggle_zero_axes(&mut delta, &mut self.rng);
			let distance = delta.length();
			let correction =
				delta * ((distance - self.config.link_distance) / distance * alpha * strength);
			if !correction.is_finite() {
				continue;
			}

			self.nodes[link.target].velocity -= correction * bias;
			self.nodes[link.source].velocity += correction * (1.0 - bias);
		}
	}

	fn charge_distance_max(&self) -> f64 {
		let max = self
			.config
			.charge_distance_max
			.unwrap_or_else(|| self.viewport.width.min(self.viewport.height) / 2.0);
		if max > 0.0 { max } else { f64::INFINITY }
	}

	fn apply_many_body_force(&mut self, alpha: f64) {
		let positions: Vec<DVec2> = self.nodes.iter().map(|n| n.position).collect();
		let tree = QuadTree::build(&positions);
		let strength = self.config.charge_strength;
		let min2 = self.config.charge_distance_min.powi(2);
		let max2 = self.charge_distance_max().powi(2);
		let theta2 = self.config.theta.powi(2).max(f64::EPSILON);

		for i in 0..self.nodes.len() {
			if self.nodes[i].is_pinned() {
				continue;
			}
			let origin = positions[i];
			let mut force = DVec2::ZERO;
			let rng = &mut self.rng;

			tree.visit(|quad| {
				if quad.count == 0 {
					return true;
				}
				let mut delta = quad.center_of_mass - origin;
				let mut l = delta.length_squared();
				let width = quad.width();

				// Far enough away to stand in for everything it contains.
				if !quad.contains(origin) && width * width / theta2 < l {
					if l < max2 {
						jiggle_zero_axes(&mut delta, rng);
						l = delta.length_squared();
						if l < min2 {
							l = (min2 * l).sqrt();
						}
						force += delta * (strength * quad.count as f64 * alpha / l);
					}
					return true;
				}
				if !quad.is_leaf() {
					return false;
				}
				if l >= max2 && !quad.contains(origin) {
					return true;
				}
				for &j in &quad.points {
					if j == i {
						continue;
					}
					let mut delta = positions[j] - origin;
					jiggle_zero_axes(&mut delta, rng);
					let mut l = delta.length_squared();
					if l >= max2 {
						continue;
					}
					if l < min2 {
						l = (min2 * l).sqrt();
					}
					force += delta * (strength * alpha / l);
				}
				true
			});

			self.nodes[i].velocity += force;
		}
	}

	fn apply_collision_force(&mut self) {
		let radius = self.config.collide_radius;
		if radius <= 0.0 {
			return;
		}
		let reach = 2.0 * radius;
		let strength = self.config.collide_strength;

		for _ in 0..self.config.collide_iterations {
			let predicted: Vec<DVec2> = self
				.nodes
				.iter()
				.map(|n| n.position + n.velocity)
				.collect();
			let tree = QuadTree::build(&predicted);

			for i in 0..self.nodes.len() {
				let origin = predicted[i];
				let mut neighbors = tree.candidates_within(origin, reach);
				neighbors.retain(|&j| j > i);
				neighbors.sort_unstable();

				for j in neighbors {
					let (a, b) = (&self.nodes[i], &self.nodes[j]);
					let share_a = match (a.is_pinned(), b.is_pinned()) {
						(true, true) => continue,
						(true, false) => 0.0,
						(false, true) => 1.0,
						(false, false) => 0.5,
					};
					let mut delta = origin - (b.position + b.velocity);
					if delta.length_squared() >= reach * reach {
						continue;
					}
					jiggle_zero_axes(&mut delta, &mut self.rng);
					let distance = delta.length();
					let push = delta * ((reach - distance) / distance * strength);

					self.nodes[i].velocity += push * share_a;
					self.nodes[j].velocity -= push * (1.0 - share_a);
				}
			}
		}
	}

	fn apply_center_force(&mut self) {
		let (sum, count) = self
			.nodes
			.iter()
			.filter(|n| !n.is_pinned() && n.position.is_finite())
			.fold((DVec2::ZERO, 0usize), |(sum, count), n| {
				(sum + n.position, count + 1)
			});
		if count == 0 {
			return;
		}
		let shift = (sum / count as f64 - self.viewport.center()) * self.config.center_strength;
		for node in self.nodes.iter_mut().filter(|n| !n.is_pinned()) {
			node.position -= shift;
		}
	}

	fn apply_axis_force(&mut self, alpha: f64) {
		let (center, strength) = (self.viewport.center(), self.config.axis_strength * alpha);
		for node in self.nodes.iter_mut().filter(|n| !n.is_pinned()) {
			node.velocity += (center - node.position) * strength;
		}
	}

	fn integrate(&mut self, h: f64) {
		let retain = 1.0 - self.config.velocity_decay;
		for node in &mut self.nodes {
			match node.pin {
				Some(pin) => {
					node.position = pin;
					node.velocity = DVec2::ZERO;
				}
				None => {
					node.velocity *= retain;
					node.position += node.velocity * h;
				}
			}
		}
	}

	fn recover_divergence(&mut self) {
		let center = self.viewport.center();
		for node in &mut self.nodes {
			if node.position.is_finite() && node.velocity.is_finite() {
				continue;
			}
			let err = LayoutDivergenceError {
				node_id: node.record.id.clone(),
			};
			warn!("{err}");
			node.position = center;
			node.velocity = DVec2::ZERO;
			self.diagnostics.divergences.push(err);
		}
	}

	fn clamp_to_bounds(&mut self) {
		let (size, padding) = (self.viewport, self.config.padding);
		for node in &mut self.nodes {
			node.position = DVec2::new(
				clamp_axis(node.position.x, size.width, padding),
				clamp_axis(node.position.y, size.height, padding),
			);
		}
	}

	/// Fixes a node at `target` until [`release_node`](Self::release_node).
	/// The node moves there immediately.
	pub fn pin_node(&mut self, id: &str, target: DVec2) -> bool {
		if !target.is_finite() {
			warn!("refusing non-finite pin target for {id}");
			return false;
		}
		let Some(&i) = self.index.get(id) else {
			return false;
		};
		let node = &mut self.nodes[i];
		let newly_pinned = node.pin.is_none();
		node.pin = Some(target);
		node.position = target;
		node.velocity = DVec2::ZERO;
		if newly_pinned {
			debug!("pinned {id}");
			self.alpha_target = PIN_ALPHA;
			self.alpha = self.alpha.max(PIN_ALPHA);
		}
		true
	}

	pub fn release_node(&mut self, id: &str) -> bool {
		let Some(&i) = self.index.get(id) else {
			return false;
		};
		if self.nodes[i].pin.take().is_none() {
			return false;
		}
		debug!("released {id}");
		if !self.nodes.iter().any(LayoutNode::is_pinned) {
			self.alpha_target = 0.0;
		}
		self.alpha = self.alpha.max(RELEASE_ALPHA);
		true
	}

	/// Moves the centring target and clamping bounds. Nodes are not reseeded.
	pub fn resize(&mut self, viewport: ViewportSize) {
		if self.viewport == viewport {
			return;
		}
		debug!("layout resized to {}x{}", viewport.width, viewport.height);
		self.viewport = viewport;
		if !self.nodes.is_empty() {
			self.alpha = self.alpha.max(RESIZE_ALPHA);
		}
	}

	pub fn alpha(&self) -> f64 {
		self.alpha
	}

	pub fn is_settled(&self) -> bool {
		self.alpha < self.config.alpha_min && self.alpha_target < self.config.alpha_min
	}

	pub fn ticks(&self) -> u64 {
		self.ticks
	}

	pub fn diagnostics(&self) -> &LayoutDiagnostics {
		&self.diagnostics
	}

	pub fn node(&self, id: &str) -> Option<&LayoutNode> {
		self.index.get(id).map(|&i| &self.nodes[i])
	}

	pub fn link(&self, id: LinkId) -> Option<&LayoutLink> {
		self.links.get(id)
	}

	pub fn link_endpoints(&self, id: LinkId) -> Option<(&LayoutNode, &LayoutNode)> {
		let link = self.link(id)?;
		Some((&self.nodes[link.source], &self.nodes[link.target]))
	}

	/// Nodes joined to `id` by a link in either direction, excluding `id`
	/// itself unless it has a self-loop.
	pub fn neighbors(&self, id: &str) -> BTreeSet<String> {
		let Some(&i) = self.index.get(id) else {
			return BTreeSet::new();
		};
		self.links
			.iter()
			.filter_map(|link| match (link.source == i, link.target == i) {
				(true, _) => Some(link.target),
				(_, true) => Some(link.source),
				_ => None,
			})
			.map(|n| self.nodes[n].record.id.clone())
			.collect()
	}

	pub fn incident_links(&self, id: &str) -> impl Iterator<Item = LinkId> + '_ {
		let i = self.index.get(id).copied();
		self.links
			.iter()
			.filter(move |link| Some(link.source) == i || Some(link.target) == i)
			.map(|link| link.id)
	}

	/// Polyline of a link in world coordinates. Single links are
	/// `[source, midpoint, target]`; parallel links bend their midpoint apart
	/// and self-loops circle above the node.
	pub fn link_points(&self, link: &LayoutLink) -> Vec<DVec2> {
		let (s, t) = (
			self.nodes[link.source].position,
			self.nodes[link.target].position,
		);
		if link.is_loop() {
			let r = self.config.loop_radius * (1.0 + 0.5 * link.lane);
			return vec![
				s,
				s + DVec2::new(-r, -1.5 * r),
				s + DVec2::new(0.0, -2.2 * r),
				s + DVec2::new(r, -1.5 * r),
				s,
			];
		}
		let mut mid = (s + t) * 0.5;
		if link.lane != 0.0 {
			// Bend relative to a fixed orientation of the pair so A->B and
			// B->A land on opposite sides.
			let (a, b) = if link.source < link.target {
				(s, t)
			} else {
				(t, s)
			};
			mid += (b - a).perp().normalize_or_zero() * link.lane * self.config.parallel_spacing;
		}
		vec![s, mid, t]
	}

	pub fn link_path(&self, id: LinkId) -> Option<LinkPath> {
		let link = self.link(id)?;
		Some(LinkPath {
			id: link.id,
			source: self.nodes[link.source].record.id.clone(),
			target: self.nodes[link.target].record.id.clone(),
			points: self.link_points(link),
		})
	}

	pub fn frame(&self) -> LayoutFrame {
		LayoutFrame {
			nodes: self
				.nodes
				.iter()
				.map(|n| NodePlacement {
					id: n.record.id.clone(),
					label: n.record.label.clone(),
					status: n.record.status,
					x: n.position.x,
					y: n.position.y,
					pinned: n.is_pinned(),
				})
				.collect(),
			links: (0..self.links.len())
				.filter_map(|id| self.link_path(id))
				.collect(),
		}
	}

	/// Topmost node within `radius` of a world point.
	pub fn node_at(&self, world: DVec2, radius: f64) -> Option<&LayoutNode> {
		self.nodes
			.iter()
			.rev()
			.find(|n| n.position.distance(world) <= radius)
	}

	/// Closest link whose drawn curve passes within `tolerance` of a world point.
	pub fn link_at(&self, world: DVec2, tolerance: f64) -> Option<LinkId> {
		self.links
			.iter()
			.filter_map(|link| {
				let points = curve_points(&self.link_points(link));
				let distance = points
					.windows(2)
					.map(|w| distance_to_segment(world, w[0], w[1]))
					.fold(f64::INFINITY, f64::min);
				(distance <= tolerance).then_some((link.id, distance))
			})
			.min_by(|a, b| a.1.total_cmp(&b.1))
			.map(|(id, _)| id)
	}
}
