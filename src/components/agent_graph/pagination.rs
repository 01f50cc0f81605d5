use log::{debug, info, warn};

use super::api::ExecutionSource;
use super::error::DataFetchError;
use super::types::{ExecutionPage, GraphSnapshot};

/// Backend page size, used for the node total shown next to the controls.
pub const PAGE_SIZE: u32 = 10;

/// Ticket for one in-flight page fetch. Only the most recently issued
/// ticket can be completed; older ones come back as [`LoadOutcome::Stale`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageRequest {
	pub group_id: String,
	pub page: u32,
	generation: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum LoadOutcome {
	Loaded(GraphSnapshot),
	Failed(DataFetchError),
	Stale,
}

#[derive(Clone, Debug)]
pub struct PaginationController {
	group_id: String,
	current_page: u32,
	has_next: bool,
	total_pages: u32,
	generation: u64,
	in_flight: Option<u64>,
	snapshot: Option<GraphSnapshot>,
	last_error: Option<DataFetchError>,
}

impl PaginationController {
	pub fn new(group_id: impl Into<String>) -> Self {
		Self {
			group_id: group_id.into(),
			current_page: 1,
			has_next: false,
			total_pages: 1,
			generation: 0,
			in_flight: None,
			snapshot: None,
			last_error: None,
		}
	}

	/// Issues a request for exactly one page, superseding any fetch still in flight.
	pub fn load_page(&mut self, page: u32) -> PageRequest {
		self.generation += 1;
		self.in_flight = Some(self.generation);
		let page = page.max(1);
		debug!("requesting page {page} of group {}", self.group_id);
		PageRequest {
			group_id: self.group_id.clone(),
			page,
			generation: self.generation,
		}
	}

	/// Request for the following page, or `None` when there is none.
	pub fn next(&mut self) -> Option<PageRequest> {
		if !self.has_next {
			return None;
		}
		Some(self.load_page(self.current_page + 1))
	}

	/// Request for the preceding page, or `None` on page 1.
	pub fn previous(&mut self) -> Option<PageRequest> {
		if self.current_page <= 1 {
			return None;
		}
		Some(self.load_page(self.current_page - 1))
	}

	/// Applies the result of a fetch. Results for superseded requests are
	/// discarded; failures keep the current page and snapshot.
	pub fn complete(
		&mut self,
		request: &PageRequest,
		result: Result<ExecutionPage, DataFetchError>,
	) -> LoadOutcome {
		if self.in_flight != Some(request.generation) {
			debug!("discarding stale response for page {}", request.page);
			return LoadOutcome::Stale;
		}
		self.in_flight = None;

		match result {
			Ok(page) => {
				let snapshot = GraphSnapshot::from_page(page, request.page);
				info!(
					"loaded page {} ({} nodes, {} links, more: {})",
					request.page,
					snapshot.nodes.len(),
					snapshot.links.len(),
					snapshot.has_more
				);
				self.current_page = request.page;
				self.has_next = snapshot.has_more;
				self.total_pages = snapshot.total_pages;
				self.last_error = None;
				self.snapshot = Some(snapshot.clone());
				LoadOutcome::Loaded(snapshot)
			}
			Err(err) => {
				warn!("failed to load page {}: {err}", request.page);
				self.last_error = Some(err.clone());
				LoadOutcome::Failed(err)
			}
		}
	}

	pub fn current_page(&self) -> u32 {
		self.current_page
	}

	pub fn has_next(&self) -> bool {
		self.has_next
	}

	pub fn has_previous(&self) -> bool {
		self.current_page > 1
	}

	pub fn total_pages(&self) -> u32 {
		self.total_pages
	}

	pub fn total_nodes(&self) -> u32 {
		self.total_pages * PAGE_SIZE
	}

	pub fn is_loading(&self) -> bool {
		self.in_flight.is_some()
	}

	pub fn snapshot(&self) -> Option<&GraphSnapshot> {
		self.snapshot.as_ref()
	}

	pub fn last_error(&self) -> Option<&DataFetchError> {
		self.last_error.as_ref()
	}
}

/// Runs the fetch for `request` against `source`.
pub async fn fetch<S: ExecutionSource>(
	source: &S,
	request: &PageRequest,
) -> Result<ExecutionPage, DataFetchError> {
	source
		.fetch_execution_page(&request.group_id, request.page)
		.await
}
