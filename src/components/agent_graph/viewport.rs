use glam::DVec2;
use log::debug;

use super::types::ViewportSize;

/// Affine pan/zoom: `screen = world * scale + translate`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
	pub scale: f64,
	pub translate_x: f64,
	pub translate_y: f64,
}

impl Transform {
	pub const IDENTITY: Self = Self {
		scale: 1.0,
		translate_x: 0.0,
		translate_y: 0.0,
	};

	pub fn translation(&self) -> DVec2 {
		DVec2::new(self.translate_x, self.translate_y)
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct ViewportConfig {
	pub min_scale: f64,
	pub max_scale: f64,
	/// Scale applied by the first [`ViewportTransform::reset`] after a layout.
	pub initial_scale: f64,
	/// Wheel pixels per doubling of the scale, inverted.
	pub wheel_sensitivity: f64,
}

impl Default for ViewportConfig {
	fn default() -> Self {
		Self {
			min_scale: 0.1,
			max_scale: 4.0,
			initial_scale: 0.8,
			wheel_sensitivity: 0.002,
		}
	}
}

#[derive(Clone, Debug)]
pub struct ViewportTransform {
	config: ViewportConfig,
	transform: Transform,
}

impl ViewportTransform {
	pub fn new(config: ViewportConfig) -> Self {
		let scale = 1.0_f64.clamp(config.min_scale, config.max_scale);
		Self {
			config,
			transform: Transform {
				scale,
				..Transform::IDENTITY
			},
		}
	}

	pub fn current(&self) -> Transform {
		self.transform
	}

	pub fn scale(&self) -> f64 {
		self.transform.scale
	}

	pub fn config(&self) -> &ViewportConfig {
		&self.config
	}

	fn clamp_scale(&self, scale: f64) -> f64 {
		scale.clamp(self.config.min_scale, self.config.max_scale)
	}

	/// Zooms about `pointer` (screen space). Positive `delta` zooms out, as a
	/// wheel scrolled toward the user does.
	pub fn apply_zoom(&mut self, delta: f64, pointer: DVec2) {
		if !delta.is_finite() || !pointer.is_finite() {
			return;
		}
		let factor = 2f64.powf(-delta * self.config.wheel_sensitivity);
		let scale = self.clamp_scale(self.transform.scale * factor);
		if scale == self.transform.scale {
			return;
		}
		let anchor = self.to_world(pointer);
		let translation = pointer - anchor * scale;
		self.transform = Transform {
			scale,
			translate_x: translation.x,
			translate_y: translation.y,
		};
	}

	pub fn apply_pan(&mut self, dx: f64, dy: f64) {
		if !(dx.is_finite() && dy.is_finite()) {
			return;
		}
		self.transform.translate_x += dx;
		self.transform.translate_y += dy;
	}

	/// Puts the world point `centered_on` in the middle of the viewport at
	/// `initial_scale`.
	pub fn reset(&mut self, initial_scale: f64, centered_on: DVec2, viewport: ViewportSize) {
		let scale = self.clamp_scale(initial_scale);
		let translation = viewport.center() - centered_on * scale;
		debug!("viewport reset to scale {scale} around {centered_on}");
		self.transform = Transform {
			scale,
			translate_x: translation.x,
			translate_y: translation.y,
		};
	}

	pub fn to_screen(&self, world: DVec2) -> DVec2 {
		world * self.transform.scale + self.transform.translation()
	}

	pub fn to_world(&self, screen: DVec2) -> DVec2 {
		(screen - self.transform.translation()) / self.transform.scale
	}
}

impl Default for ViewportTransform {
	fn default() -> Self {
		Self::new(ViewportConfig::default())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn close(a: DVec2, b: DVec2) -> bool {
		a.distance(b) < 1e-9
	}

	#[test]
	fn test_zoom_keeps_pointer_fixed() {
		let mut viewport = ViewportTransform::default();
		viewport.apply_pan(40.0, -25.0);
		let pointer = DVec2::new(310.0, 120.0);
		let before = viewport.to_world(pointer);

		viewport.apply_zoom(-300.0, pointer);
		assert!(viewport.scale() > 1.0);
		assert!(close(viewport.to_world(pointer), before));

		viewport.apply_zoom(500.0, pointer);
		assert!(close(viewport.to_world(pointer), before));
	}

	#[test]
	fn test_zoom_is_clamped() {
		let mut viewport = ViewportTransform::default();
		for _ in 0..50 {
			viewport.apply_zoom(-1000.0, DVec2::new(10.0, 10.0));
		}
		assert_eq!(viewport.scale(), 4.0);
		for _ in 0..50 {
			viewport.apply_zoom(1000.0, DVec2::new(10.0, 10.0));
		}
		assert_eq!(viewport.scale(), 0.1);
	}

	#[test]
	fn test_pan_ignores_scale_bounds() {
		let mut viewport = ViewportTransform::default();
		viewport.apply_zoom(1.0e6, DVec2::ZERO);
		let before = viewport.current();
		viewport.apply_pan(1.0e5, -3.0);
		let after = viewport.current();
		assert_eq!(after.scale, before.scale);
		assert_eq!(after.translate_x, before.translate_x + 1.0e5);
		assert_eq!(after.translate_y, before.translate_y - 3.0);
	}

	#[test]
	fn test_reset_centers_point() {
		let mut viewport = ViewportTransform::default();
		let size = ViewportSize::new(800.0, 600.0);
		viewport.reset(0.8, size.center(), size);
		assert_eq!(viewport.scale(), 0.8);
		assert!(close(viewport.to_screen(size.center()), size.center()));
		assert!(close(
			viewport.to_screen(DVec2::new(500.0, 300.0)),
			DVec2::new(480.0, 300.0)
		));
	}

	#[test]
	fn test_inverse_round_trips() {
		let mut viewport = ViewportTransform::default();
		viewport.apply_zoom(-120.0, DVec2::new(33.0, 71.0));
		viewport.apply_pan(-14.5, 260.0);
		let world = DVec2::new(-120.25, 48.0);
		assert!(close(viewport.to_world(viewport.to_screen(world)), world));
	}
}
