use std::f64::consts::PI;

use glam::DVec2;
use web_sys::CanvasRenderingContext2d;

use super::interaction::{LinkStyle, NodeEmphasis};
use super::layout::{LinkPath, NodePlacement, point_at_half_length, quadratic_control};
use super::state::{GraphState, NODE_RADIUS};
use super::types::NodeStatus;

const BACKGROUND: &str = "#fafafa";
const LINK_COLOR: &str = "#2196F3";
const LINK_HIGHLIGHT_COLOR: &str = "#1565C0";
const LABEL_COLOR: &str = "#333333";
const ARROW_SIZE: f64 = 8.0;
const LABEL_OFFSET: f64 = 35.0;
/// Opacity of nodes and links outside the highlight set.
const DIMMED_ALPHA: f64 = 0.3;

pub fn status_color(status: NodeStatus) -> &'static str {
	match status {
		NodeStatus::Success => "#43A047",
		NodeStatus::Running => "#1E88E5",
		NodeStatus::Error => "#E53935",
		NodeStatus::Pending | NodeStatus::Unknown => "#FB8C00",
	}
}

fn ease_out_cubic(t: f64) -> f64 {
	1.0 - (1.0 - t).powi(3)
}

pub fn render(state: &GraphState, ctx: &CanvasRenderingContext2d) {
	ctx.set_fill_style_str(BACKGROUND);
	ctx.fill_rect(0.0, 0.0, state.size.width, state.size.height);
	ctx.save();
	let transform = state.viewport.current();
	let _ = ctx.translate(transform.translate_x, transform.translate_y);
	let _ = ctx.scale(transform.scale, transform.scale);
	let frame = state.engine.frame();
	draw_links(state, &frame.links, ctx);
	draw_nodes(state, &frame.nodes, ctx);
	ctx.restore();
}

fn dimmed_alpha(t: f64) -> f64 {
	1.0 - (1.0 - DIMMED_ALPHA) * t
}

fn draw_links(state: &GraphState, links: &[LinkPath], ctx: &CanvasRenderingContext2d) {
	let t = ease_out_cubic(state.highlight_t);
	let any_highlight = !state.interaction.highlight().is_empty();

	for link in links {
		let points = &link.points;
		let style = state.interaction.link_style(link.id);
		let (color, width, alpha) = match style {
			LinkStyle::Highlighted => (LINK_HIGHLIGHT_COLOR, 3.0, 1.0),
			LinkStyle::Normal if any_highlight => (LINK_COLOR, 2.0, dimmed_alpha(t)),
			LinkStyle::Normal => (LINK_COLOR, 2.0, 1.0),
		};

		ctx.set_global_alpha(alpha);
		ctx.set_stroke_style_str(color);
		ctx.set_fill_style_str(color);
		ctx.set_line_width(width);
		trace_path(ctx, points);
		ctx.stroke();
		draw_arrow(ctx, points);
	}
	ctx.set_global_alpha(1.0);
}

/// Three-point paths are drawn as a curve through the middle point.
fn trace_path(ctx: &CanvasRenderingContext2d, points: &[DVec2]) {
	let Some(first) = points.first() else {
		return;
	};
	ctx.begin_path();
	ctx.move_to(first.x, first.y);
	if let [start, mid, end] = points {
		let control = quadratic_control(*start, *mid, *end);
		ctx.quadratic_curve_to(control.x, control.y, end.x, end.y);
		return;
	}
	for p in &points[1..] {
		ctx.line_to(p.x, p.y);
	}
}

/// Filled arrowhead at the middle of the path, pointing toward the target.
fn draw_arrow(ctx: &CanvasRenderingContext2d, points: &[DVec2]) {
	let Some(tip) = point_at_half_length(points) else {
		return;
	};
	let direction = match points {
		[start, _, end] => *end - *start,
		_ => points
			.windows(2)
			.find(|w| {
				let (a, b) = (w[0], w[1]);
				(tip - a).dot(b - a) >= 0.0 && (tip - b).dot(a - b) >= 0.0
			})
			.map(|w| w[1] - w[0])
			.unwrap_or(DVec2::X),
	};
	let u = direction.normalize_or_zero();
	if u == DVec2::ZERO {
		return;
	}
	let back = tip - u * ARROW_SIZE;
	let side = u.perp() * ARROW_SIZE * 0.5;
	ctx.begin_path();
	ctx.move_to(tip.x + u.x * ARROW_SIZE * 0.5, tip.y + u.y * ARROW_SIZE * 0.5);
	ctx.line_to(back.x + side.x, back.y + side.y);
	ctx.line_to(back.x - side.x, back.y - side.y);
	ctx.close_path();
	ctx.fill();
}

fn draw_nodes(state: &GraphState, nodes: &[NodePlacement], ctx: &CanvasRenderingContext2d) {
	let t = ease_out_cubic(state.highlight_t);

	ctx.set_font("12px sans-serif");
	ctx.set_text_align("center");
	for node in nodes {
		let (x, y) = (node.x, node.y);
		let alpha = match state.interaction.node_emphasis(&node.id) {
			NodeEmphasis::Active => 1.0,
			NodeEmphasis::Dimmed => dimmed_alpha(t),
		};

		ctx.set_global_alpha(alpha);
		ctx.begin_path();
		let _ = ctx.arc(x, y, NODE_RADIUS, 0.0, 2.0 * PI);
		ctx.set_fill_style_str(status_color(node.status));
		ctx.fill();
		// Only a dragged node is pinned.
		ctx.set_stroke_style_str(if node.pinned {
			LINK_HIGHLIGHT_COLOR
		} else {
			"#ffffff"
		});
		ctx.set_line_width(2.0);
		ctx.stroke();

		ctx.set_fill_style_str(LABEL_COLOR);
		let _ = ctx.fill_text(&node.label, x, y + LABEL_OFFSET);
	}
	ctx.set_global_alpha(1.0);
}
