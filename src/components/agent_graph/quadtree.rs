//! Point-region quadtree over node positions.
//!
//! Rebuilt every tick. Internal cells carry the point count and centre of
//! mass so the many-body force can treat distant cells as a single body;
//! the collision force uses it as a neighbour index.

use glam::DVec2;

const MAX_DEPTH: usize = 32;

#[derive(Clone, Debug)]
pub struct Quad {
	pub min: DVec2,
	pub max: DVec2,
	pub center_of_mass: DVec2,
	pub count: usize,
	/// Indices stored in a leaf. Empty for internal cells.
	pub points: Vec<usize>,
	children: Option<Box<[Option<Quad>; 4]>>,
}

impl Quad {
	fn empty(min: DVec2, max: DVec2) -> Self {
		Self {
			min,
			max,
			center_of_mass: DVec2::ZERO,
			count: 0,
			points: Vec::new(),
			children: None,
		}
	}

	pub fn is_leaf(&self) -> bool {
		self.children.is_none()
	}

	pub fn width(&self) -> f64 {
		self.max.x - self.min.x
	}

	pub fn contains(&self, point: DVec2) -> bool {
		point.cmpge(self.min).all() && point.cmple(self.max).all()
	}

	pub fn intersects_circle(&self, center: DVec2, radius: f64) -> bool {
		let nearest = center.clamp(self.min, self.max);
		nearest.distance_squared(center) <= radius * radius
	}

	fn quadrant(&self, point: DVec2) -> usize {
		let mid = (self.min + self.max) * 0.5;
		(usize::from(point.y >= mid.y) << 1) | usize::from(point.x >= mid.x)
	}

	fn child_bounds(&self, slot: usize) -> (DVec2, DVec2) {
		let mid = (self.min + self.max) * 0.5;
		let (x0, x1) = if slot & 1 == 1 {
			(mid.x, self.max.x)
		} else {
			(self.min.x, mid.x)
		};
		let (y0, y1) = if slot & 2 == 2 {
			(mid.y, self.max.y)
		} else {
			(self.min.y, mid.y)
		};
		(DVec2::new(x0, y0), DVec2::new(x1, y1))
	}

	fn insert(&mut self, index: usize, positions: &[DVec2], depth: usize) {
		let point = positions[index];
		if self.is_leaf() {
			// Leaves only ever hold coincident points, unless the depth cap is hit.
			let coincident = self
				.points
				.first()
				.is_none_or(|&first| positions[first] == point);
			if coincident || depth >= MAX_DEPTH {
				self.points.push(index);
				return;
			}
			self.split(positions, depth);
		}

		let slot = self.quadrant(point);
		let (min, max) = self.child_bounds(slot);
		if let Some(children) = self.children.as_mut() {
			children[slot]
				.get_or_insert_with(|| Quad::empty(min, max))
				.insert(index, positions, depth + 1);
		}
	}

	fn split(&mut self, positions: &[DVec2], depth: usize) {
		let points = std::mem::take(&mut self.points);
		self.children = Some(Box::new([None, None, None, None]));
		for index in points {
			self.insert(index, positions, depth);
		}
	}

	fn summarize(&mut self, positions: &[DVec2]) {
		let (count, sum) = match self.children.as_mut() {
			Some(children) => children.iter_mut().flatten().fold(
				(0, DVec2::ZERO),
				|(count, sum), child| {
					child.summarize(positions);
					(
						count + child.count,
						sum + child.center_of_mass * child.count as f64,
					)
				},
			),
			None => (
				self.points.len(),
				self.points.iter().map(|&i| positions[i]).sum(),
			),
		};
		self.count = count;
		if count > 0 {
			self.center_of_mass = sum / count as f64;
		}
	}

	fn visit(&self, f: &mut impl FnMut(&Quad) -> bool) {
		if f(self) {
			return;
		}
		if let Some(children) = &self.children {
			for child in children.iter().flatten() {
				child.visit(f);
			}
		}
	}
}

#[derive(Clone, Debug, Default)]
pub struct QuadTree {
	root: Option<Quad>,
}

impl QuadTree {
	/// Builds a tree over `positions`. Non-finite points are left out.
	pub fn build(positions: &[DVec2]) -> Self {
		let mut finite = positions.iter().copied().filter(|p| p.is_finite());
		let Some(first) = finite.next() else {
			return Self::default();
		};
		let (min, max) = finite.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
		// Square cells keep the Barnes-Hut opening criterion isotropic.
		let extent = (max - min).max_element().max(1.0);
		let mut root = Quad::empty(min, min + DVec2::splat(extent));
		for (index, position) in positions.iter().enumerate() {
			if position.is_finite() {
				root.insert(index, positions, 0);
			}
		}
		root.summarize(positions);
		Self { root: Some(root) }
	}

	/// Pre-order traversal. Returning `true` from `f` skips the cell's children.
	pub fn visit(&self, mut f: impl FnMut(&Quad) -> bool) {
		if let Some(root) = &self.root {
			root.visit(&mut f);
		}
	}

	/// Indices of points whose cell intersects the circle.
	pub fn candidates_within(&self, center: DVec2, radius: f64) -> Vec<usize> {
		let mut found = Vec::new();
		self.visit(|quad| {
			if !quad.intersects_circle(center, radius) {
				return true;
			}
			found.extend_from_slice(&quad.points);
			false
		});
		found
	}
}
