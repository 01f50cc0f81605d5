use leptos::prelude::*;
use leptos_router::hooks::use_query_map;

use crate::components::agent_graph::{AgentGraphCanvas, GraphConfig, PageSource};

/// Default Home Page
///
/// `?api=<base url>` points the graph at a backend, `?group=<id>` picks the
/// agent group. Without `api` the built-in sample executions are shown.
#[component]
pub fn Home() -> impl IntoView {
	let query = use_query_map();
	let (config, source) = query.with_untracked(|params| {
		let config = GraphConfig::default()
			.with_group(params.get("group").as_deref())
			.with_api_base_url(params.get("api").as_deref());
		let source = PageSource::from_base_url(config.api_base_url.as_deref());
		(config, source)
	});

	view! {
		<ErrorBoundary fallback=|errors| {
			view! {
				<h1>"Uh oh! Something went wrong!"</h1>

				<p>"Errors: "</p>
				<ul>
					{move || {
						errors
							.get()
							.into_iter()
							.map(|(_, e)| view! { <li>{e.to_string()}</li> })
							.collect_view()
					}}
				</ul>
			}
		}>

			<div class="fullscreen-graph">
				<AgentGraphCanvas config=config source=source fullscreen=true />
				<div class="graph-overlay">
					<h1>"Agent Executions"</h1>
					<p class="subtitle">
						"Hover a step for its history. Drag steps to reposition. Scroll to zoom. Drag background to pan."
					</p>
				</div>
			</div>
		</ErrorBoundary>
	}
}
