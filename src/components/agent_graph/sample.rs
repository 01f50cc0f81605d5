use log::debug;
use serde_json::Value;

use super::api::ExecutionSource;
use super::error::DataFetchError;
use super::types::{ExecutionPage, ExecutionPayload, LinkRecord, NodeRecord, NodeStatus};

const AGENTS: &[&str] = &[
	"Planner",
	"Researcher",
	"Coder",
	"Reviewer",
	"Tester",
	"Summarizer",
	"Router",
	"Critic",
];

const STATUSES: &[&str] = &["success", "running", "error", "pending"];

/// Deterministic pages of made-up executions, used when no backend is set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SampleSource {
	/// Number of pages before `has_more` turns false.
	pub pages: u32,
	/// Nodes per page.
	pub page_size: usize,
}

impl Default for SampleSource {
	fn default() -> Self {
		Self {
			pages: 3,
			page_size: 10,
		}
	}
}

/// Simple pseudo-random number generator (deterministic for consistency).
fn rand_simple(seed: usize) -> f64 {
	let x = ((seed + 1) * 9301 + 49297) % 233280;
	(x as f64) / 233280.0
}

fn history_json(agent: &str, step: usize) -> String {
	format!(
		r#"[{{"AuthorName":"user","Content":"Handle step {step}","ModelId":""}},{{"AuthorName":"{agent}","Content":"Step {step} handled by {agent}.","ModelId":"gpt-4o","Metadata":{{"Usage":{{"TotalTokenCount":{tokens}}},"FinishReason":"Stop"}}}}]"#,
		tokens = 200 + step * 37
	)
}

impl SampleSource {
	/// Builds page `page` (1-based). Pages outside `1..=pages` are invalid.
	pub fn page(&self, group_id: &str, page: u32) -> Result<ExecutionPage, DataFetchError> {
		if page == 0 || page > self.pages {
			return Err(DataFetchError::InvalidPage(format!(
				"page {page} is outside 1..={}",
				self.pages
			)));
		}
		let offset = (page as usize - 1) * self.page_size;
		let id = |i: usize| format!("exec-{}", offset + i);

		let nodes: Vec<NodeRecord> = (0..self.page_size)
			.map(|i| {
				let n = offset + i;
				let agent = AGENTS[n % AGENTS.len()];
				let status = STATUSES[(rand_simple(n * 7) * STATUSES.len() as f64) as usize];
				// One record per page carries a history the tooltip cannot parse.
				let history = if i == 3 {
					r#"[{"AuthorName": "broken""#.to_owned()
				} else {
					history_json(agent, n)
				};
				NodeRecord {
					id: id(i),
					label: format!("{agent} #{n}"),
					status: NodeStatus::from(status),
					order: n as i64,
					data: ExecutionPayload {
						id: Some(id(i)),
						agent_group_id: Some(group_id.to_owned()),
						agent_execution_history: Some(Value::from(history)),
						run_status: Some(status.to_owned()),
						run_on: Some(format!(
							"2024-06-{:02}T{:02}:{:02}:00Z",
							1 + n % 28,
							8 + n % 10,
							(n * 7) % 60
						)),
						description: (n % 2 == 0).then(|| format!("{agent} step {n}")),
						..Default::default()
					},
				}
			})
			.collect();

		let mut links: Vec<LinkRecord> = (1..self.page_size)
			.map(|i| {
				let parent = (rand_simple(offset + i) * i as f64) as usize;
				LinkRecord::new(id(parent), id(i))
			})
			.collect();
		if self.page_size > 2 {
			// A retry loop and a repeated hand-off.
			links.push(LinkRecord::new(id(2), id(2)));
			links.push(links[0].clone());
		}

		debug!("generated sample page {page} with {} nodes", nodes.len());
		Ok(ExecutionPage {
			nodes,
			links,
			has_more: page < self.pages,
			current_page: Some(page),
			total_pages: self.pages,
		})
	}
}

impl ExecutionSource for SampleSource {
	async fn fetch_execution_page(
		&self,
		group_id: &str,
		page: u32,
	) -> Result<ExecutionPage, DataFetchError> {
		self.page(group_id, page)
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashSet;

	use pretty_assertions::assert_eq;

	use super::*;
	use crate::components::agent_graph::tooltip::HistoryView;

	#[test]
	fn test_pages_are_deterministic() {
		let source = SampleSource::default();
		assert_eq!(source.page("g", 2).unwrap(), source.page("g", 2).unwrap());
		assert_ne!(
			source.page("g", 1).unwrap().nodes[0].id,
			source.page("g", 2).unwrap().nodes[0].id
		);
	}

	#[test]
	fn test_page_shape() {
		let source = SampleSource::default();
		let page = source.page("g", 1).unwrap();
		assert_eq!(page.nodes.len(), 10);
		assert!(page.has_more);
		assert_eq!(page.total_pages, 3);

		let ids: HashSet<_> = page.nodes.iter().map(|n| n.id.as_str()).collect();
		assert_eq!(ids.len(), 10);
		assert!(
			page.links
				.iter()
				.all(|l| ids.contains(l.source.as_str()) && ids.contains(l.target.as_str()))
		);
		assert!(page.links.iter().any(|l| l.source == l.target));

		let unparseable = page
			.nodes
			.iter()
			.filter(|n| {
				HistoryView::from_raw(n.data.agent_execution_history.as_ref())
					== HistoryView::Unparseable
			})
			.count();
		assert_eq!(unparseable, 1);

		assert!(!source.page("g", 3).unwrap().has_more);
	}

	#[test]
	fn test_out_of_range_page() {
		let source = SampleSource::default();
		assert!(matches!(source.page("g", 0), Err(DataFetchError::InvalidPage(_))));
		assert!(matches!(source.page("g", 4), Err(DataFetchError::InvalidPage(_))));
	}
}
