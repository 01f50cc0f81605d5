use std::cell::RefCell;
use std::rc::Rc;

use glam::DVec2;
use leptos::prelude::*;
use leptos::task::spawn_local;
use log::warn;
use wasm_bindgen::prelude::*;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, MouseEvent, WheelEvent, Window};

use super::api::PageSource;
use super::config::GraphConfig;
use super::pagination::{LoadOutcome, PageRequest, PaginationController, fetch};
use super::render;
use super::state::GraphState;
use super::tooltip::{HISTORY_FALLBACK, HistoryView, Tooltip, TooltipContent};
use super::types::HistoryEntry;
use super::types::ViewportSize;

type SharedState = Rc<RefCell<Option<GraphState>>>;

#[derive(Clone, Copy)]
struct PageSignals {
	page: RwSignal<u32>,
	total_pages: RwSignal<u32>,
	total_nodes: RwSignal<u32>,
	has_next: RwSignal<bool>,
	has_previous: RwSignal<bool>,
	loading: RwSignal<bool>,
	error: RwSignal<Option<String>>,
}

impl PageSignals {
	fn new() -> Self {
		Self {
			page: RwSignal::new(1),
			total_pages: RwSignal::new(1),
			total_nodes: RwSignal::new(0),
			has_next: RwSignal::new(false),
			has_previous: RwSignal::new(false),
			loading: RwSignal::new(false),
			error: RwSignal::new(None),
		}
	}

	fn sync(&self, pager: &PaginationController) {
		self.page.set(pager.current_page());
		self.total_pages.set(pager.total_pages());
		self.total_nodes.set(pager.total_nodes());
		self.has_next.set(pager.has_next());
		self.has_previous.set(pager.has_previous());
		self.loading.set(pager.is_loading());
		self.error.set(pager.last_error().map(ToString::to_string));
	}
}

/// Runs page fetches and feeds their results to the pager and the canvas.
#[derive(Clone)]
struct Loader {
	pager: Rc<RefCell<PaginationController>>,
	source: Rc<PageSource>,
	state: SharedState,
	signals: PageSignals,
	tooltip: RwSignal<Option<Tooltip>>,
}

impl Loader {
	fn first(&self) {
		let request = self.pager.borrow_mut().load_page(1);
		self.start(Some(request));
	}

	fn next(&self) {
		let request = self.pager.borrow_mut().next();
		self.start(request);
	}

	fn previous(&self) {
		let request = self.pager.borrow_mut().previous();
		self.start(request);
	}

	fn start(&self, request: Option<PageRequest>) {
		let Some(request) = request else {
			return;
		};
		self.signals.loading.set(true);
		let this = self.clone();
		spawn_local(async move {
			let result = fetch(this.source.as_ref(), &request).await;
			let outcome = this.pager.borrow_mut().complete(&request, result);
			match outcome {
				LoadOutcome::Stale => return,
				LoadOutcome::Loaded(snapshot) => {
					// Before the canvas mounts the pager keeps the snapshot for it.
					if let Some(s) = this.state.borrow_mut().as_mut() {
						s.load_snapshot(&snapshot);
					}
					this.tooltip.set(None);
				}
				LoadOutcome::Failed(_) => {}
			}
			this.signals.sync(&this.pager.borrow());
		});
	}
}

fn pointer_position(canvas_ref: NodeRef<leptos::html::Canvas>, ev: &MouseEvent) -> Option<DVec2> {
	let canvas: HtmlCanvasElement = canvas_ref.get()?.into();
	let rect = canvas.get_bounding_client_rect();
	Some(DVec2::new(
		ev.client_x() as f64 - rect.left(),
		ev.client_y() as f64 - rect.top(),
	))
}

fn window_size(window: &Window) -> Option<ViewportSize> {
	Some(ViewportSize::new(
		window.inner_width().ok()?.as_f64()?,
		window.inner_height().ok()?.as_f64()?,
	))
}

fn sync_tooltip(state: &GraphState, tooltip: RwSignal<Option<Tooltip>>) {
	if tooltip.with_untracked(|current| current.as_ref() != state.tooltip()) {
		tooltip.set(state.tooltip().cloned());
	}
}

/// "(gpt-4o, 812 tokens, Stop)", leaving out whatever the entry lacks.
fn entry_details(entry: &HistoryEntry) -> Option<String> {
	let parts: Vec<String> = [
		(!entry.model_id.is_empty()).then(|| entry.model_id.clone()),
		entry.total_tokens().map(|n| format!("{n} tokens")),
		entry.finish_reason().map(str::to_owned),
	]
	.into_iter()
	.flatten()
	.collect();
	(!parts.is_empty()).then(|| format!(" ({})", parts.join(", ")))
}

fn tooltip_body(content: TooltipContent) -> AnyView {
	let header = content.header().to_owned();
	match content {
		TooltipContent::Node(node) => {
			let history = match node.history {
				HistoryView::Absent => None,
				HistoryView::Unparseable => {
					Some(view! { <p class="history-error">{HISTORY_FALLBACK}</p> }.into_any())
				}
				HistoryView::Entries(entries) => Some(
					entries
						.into_iter()
						.map(|entry| {
							let details = entry_details(&entry);
							view! {
								<div class="history-entry">
									<strong>{entry.author}</strong>
									{details}
									<p>{entry.content}</p>
								</div>
							}
						})
						.collect_view()
						.into_any(),
				),
			};
			view! {
				<strong>{header}</strong>
				<p>"Status: " {node.status}</p>
				<p>"Run On: " {node.timestamp}</p>
				{node.description.map(|d| view! { <p>{d}</p> })}
				{history.map(|h| view! { <div class="history">{h}</div> })}
			}
			.into_any()
		}
		TooltipContent::Link { from, to } => view! {
			<strong>{header}</strong>
			<p>"From: " {from}</p>
			<p>"To: " {to}</p>
		}
		.into_any(),
	}
}

/// Canvas showing one page of executions at a time, with pagination
/// controls, hover tooltips, drag, pan and zoom.
#[component]
pub fn AgentGraphCanvas(
	/// Group, backend and layout settings.
	#[prop(optional)]
	config: GraphConfig,
	/// Where pages come from.
	source: PageSource,
	/// Fill the window and follow its size.
	#[prop(default = false)]
	fullscreen: bool,
	/// Fixed width in CSS pixels; defaults to the parent's width.
	#[prop(default = None)]
	width: Option<f64>,
	/// Fixed height in CSS pixels; defaults to the parent's height.
	#[prop(default = None)]
	height: Option<f64>,
) -> impl IntoView {
	let canvas_ref = NodeRef::<leptos::html::Canvas>::new();
	let state: SharedState = Rc::new(RefCell::new(None));
	let animate: Rc<RefCell<Option<Closure<dyn FnMut()>>>> = Rc::new(RefCell::new(None));
	let resize_cb: Rc<RefCell<Option<Closure<dyn FnMut()>>>> = Rc::new(RefCell::new(None));

	let signals = PageSignals::new();
	let tooltip = RwSignal::new(None::<Tooltip>);
	let cursor = RwSignal::new("grab");

	let loader = Loader {
		pager: Rc::new(RefCell::new(PaginationController::new(config.group_id.clone()))),
		source: Rc::new(source),
		state: state.clone(),
		signals,
		tooltip,
	};
	loader.first();

	let (state_init, animate_init, resize_cb_init, pager_init) = (
		state.clone(),
		animate.clone(),
		resize_cb.clone(),
		loader.pager.clone(),
	);
	Effect::new(move |_| {
		let Some(canvas) = canvas_ref.get() else {
			return;
		};
		let canvas: HtmlCanvasElement = canvas.into();
		let Some(window) = web_sys::window() else {
			return;
		};

		let size = if fullscreen {
			window_size(&window).unwrap_or_default()
		} else {
			let parent = canvas.parent_element();
			ViewportSize::new(
				width.unwrap_or_else(|| {
					parent.as_ref().map_or(800.0, |p| p.client_width() as f64)
				}),
				height.unwrap_or_else(|| {
					parent.as_ref().map_or(600.0, |p| p.client_height() as f64)
				}),
			)
		};
		canvas.set_width(size.width as u32);
		canvas.set_height(size.height as u32);

		let Ok(Some(ctx)) = canvas.get_context("2d") else {
			warn!("canvas has no 2d context");
			return;
		};
		let Ok(ctx) = ctx.dyn_into::<CanvasRenderingContext2d>() else {
			return;
		};

		let mut graph = GraphState::new(&config, size);
		if let Some(snapshot) = pager_init.borrow().snapshot() {
			graph.load_snapshot(snapshot);
		}
		*state_init.borrow_mut() = Some(graph);

		if fullscreen {
			let (state_resize, canvas_resize) = (state_init.clone(), canvas.clone());
			*resize_cb_init.borrow_mut() = Some(Closure::new(move || {
				let Some(size) = web_sys::window().as_ref().and_then(window_size) else {
					return;
				};
				canvas_resize.set_width(size.width as u32);
				canvas_resize.set_height(size.height as u32);
				if let Some(ref mut s) = *state_resize.borrow_mut() {
					s.resize(size);
				}
			}));
			if let Some(ref cb) = *resize_cb_init.borrow() {
				let _ =
					window.add_event_listener_with_callback("resize", cb.as_ref().unchecked_ref());
			}
		}

		let (state_anim, animate_inner) = (state_init.clone(), animate_init.clone());
		let mut last_frame = js_sys::Date::now();
		*animate_init.borrow_mut() = Some(Closure::new(move || {
			let now = js_sys::Date::now();
			let dt = ((now - last_frame) / 1000.0).max(0.0);
			last_frame = now;
			if let Some(ref mut s) = *state_anim.borrow_mut() {
				s.tick(dt);
				render::render(s, &ctx);
				if cursor.get_untracked() != s.cursor() {
					cursor.set(s.cursor());
				}
			}
			if let (Some(window), Some(cb)) = (web_sys::window(), animate_inner.borrow().as_ref()) {
				let _ = window.request_animation_frame(cb.as_ref().unchecked_ref());
			}
		}));
		if let Some(ref cb) = *animate_init.borrow() {
			let _ = window.request_animation_frame(cb.as_ref().unchecked_ref());
		}
	});

	let state_md = state.clone();
	let on_mousedown = move |ev: MouseEvent| {
		let Some(pointer) = pointer_position(canvas_ref, &ev) else {
			return;
		};
		if let Some(ref mut s) = *state_md.borrow_mut() {
			s.pointer_down(pointer);
			sync_tooltip(s, tooltip);
		}
	};

	let state_mm = state.clone();
	let on_mousemove = move |ev: MouseEvent| {
		let Some(pointer) = pointer_position(canvas_ref, &ev) else {
			return;
		};
		if let Some(ref mut s) = *state_mm.borrow_mut() {
			s.pointer_move(pointer);
			sync_tooltip(s, tooltip);
		}
	};

	let state_mu = state.clone();
	let on_mouseup = move |_: MouseEvent| {
		if let Some(ref mut s) = *state_mu.borrow_mut() {
			s.pointer_up();
		}
	};

	let state_ml = state.clone();
	let on_mouseleave = move |_: MouseEvent| {
		if let Some(ref mut s) = *state_ml.borrow_mut() {
			s.pointer_leave();
			sync_tooltip(s, tooltip);
		}
	};

	let state_wh = state.clone();
	let on_wheel = move |ev: WheelEvent| {
		ev.prevent_default();
		let Some(pointer) = pointer_position(canvas_ref, &ev) else {
			return;
		};
		if let Some(ref mut s) = *state_wh.borrow_mut() {
			s.zoom(ev.delta_y(), pointer);
			sync_tooltip(s, tooltip);
		}
	};

	let (loader_prev, loader_next) = (loader.clone(), loader);
	let PageSignals {
		page,
		total_pages,
		total_nodes,
		has_next,
		has_previous,
		loading,
		error,
	} = signals;

	view! {
		<div class="agent-graph" style="position: relative;">
			<canvas
				node_ref=canvas_ref
				class="agent-graph-canvas"
				on:mousedown=on_mousedown
				on:mousemove=on_mousemove
				on:mouseup=on_mouseup
				on:mouseleave=on_mouseleave
				on:wheel=on_wheel
				style=move || format!("display: block; cursor: {};", cursor.get())
			/>
			{move || {
				tooltip
					.get()
					.map(|tip| {
						let style = format!(
							"position: absolute; left: {}px; top: {}px; transform: translate(-50%, -100%); pointer-events: none;",
							tip.anchor.x,
							tip.anchor.y,
						);
						view! {
							<div class="agent-graph-tooltip" style=style>
								{tooltip_body(tip.content)}
							</div>
						}
					})
			}}
			<div class="agent-graph-controls">
				<button
					on:click=move |_| loader_prev.previous()
					disabled=move || !has_previous.get() || loading.get()
				>
					"Previous"
				</button>
				<span class="agent-graph-page">
					{move || format!("Page {} of {}", page.get(), total_pages.get())}
				</span>
				<button
					on:click=move |_| loader_next.next()
					disabled=move || !has_next.get() || loading.get()
				>
					"Next"
				</button>
				<span class="agent-graph-total">
					{move || format!("{} executions", total_nodes.get())}
				</span>
				{move || loading.get().then(|| view! { <span class="agent-graph-loading">"Loading..."</span> })}
			</div>
			{move || error.get().map(|e| view! { <div class="agent-graph-error">{e}</div> })}
		</div>
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;
	use crate::components::agent_graph::types::parse_history;

	#[test]
	fn test_entry_details() {
		let history = parse_history(
			r#"[
				{"AuthorName": "coder", "Content": "done", "ModelId": "gpt-4o",
				 "Metadata": {"Usage": {"TotalTokenCount": 812}, "FinishReason": "Stop"}},
				{"AuthorName": "user", "Content": "go", "ModelId": ""}
			]"#,
		)
		.unwrap();
		assert_eq!(
			entry_details(&history[0]).as_deref(),
			Some(" (gpt-4o, 812 tokens, Stop)")
		);
		assert_eq!(entry_details(&history[1]), None);
	}
}
