//! Execution data sources.
//!
//! Uses web-sys fetch on wasm32 and reqwest on native targets.

use std::future::Future;

use log::{debug, info};

use super::error::DataFetchError;
use super::sample::SampleSource;
use super::types::ExecutionPage;

/// Anything that can produce one page of agent executions for a group.
pub trait ExecutionSource {
	/// Fetches page `page` (1-based) of the executions in `group_id`.
	fn fetch_execution_page(
		&self,
		group_id: &str,
		page: u32,
	) -> impl Future<Output = Result<ExecutionPage, DataFetchError>>;
}

/// Backend serving `GET {base_url}/api/agent-executions/{group_id}?page={page}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpExecutionSource {
	base_url: String,
}

impl HttpExecutionSource {
	/// Source rooted at `base_url`; trailing slashes are dropped.
	pub fn new(base_url: impl Into<String>) -> Self {
		let mut base_url = base_url.into();
		while base_url.ends_with('/') {
			base_url.pop();
		}
		Self { base_url }
	}

	/// Backend root without a trailing slash.
	pub fn base_url(&self) -> &str {
		&self.base_url
	}

	/// Full URL of one page of a group.
	pub fn page_url(&self, group_id: &str, page: u32) -> String {
		format!(
			"{}/api/agent-executions/{}?page={}",
			self.base_url, group_id, page
		)
	}

	#[cfg(target_arch = "wasm32")]
	async fn get_text(&self, url: &str) -> Result<String, DataFetchError> {
		use wasm_bindgen::JsCast;
		use wasm_bindgen_futures::JsFuture;
		use web_sys::{Request, RequestInit, RequestMode, Response};

		let opts = RequestInit::new();
		opts.set_method("GET");
		opts.set_mode(RequestMode::Cors);

		let request = Request::new_with_str_and_init(url, &opts)
			.map_err(|e| DataFetchError::Request(format!("{e:?}")))?;
		request
			.headers()
			.set("Accept", "application/json")
			.map_err(|e| DataFetchError::Request(format!("{e:?}")))?;

		let window =
			web_sys::window().ok_or_else(|| DataFetchError::Request("no window".into()))?;
		let resp_value = JsFuture::from(window.fetch_with_request(&request))
			.await
			.map_err(|e| DataFetchError::Request(format!("{e:?}")))?;
		let resp: Response = resp_value
			.dyn_into()
			.map_err(|_| DataFetchError::Request("response is not a Response".into()))?;

		if !resp.ok() {
			return Err(DataFetchError::Status(resp.status()));
		}

		let text = JsFuture::from(
			resp.text()
				.map_err(|e| DataFetchError::Decode(format!("{e:?}")))?,
		)
		.await
		.map_err(|e| DataFetchError::Decode(format!("{e:?}")))?;

		text.as_string()
			.ok_or_else(|| DataFetchError::Decode("response body is not text".into()))
	}

	#[cfg(not(target_arch = "wasm32"))]
	async fn get_text(&self, url: &str) -> Result<String, DataFetchError> {
		let response = reqwest::get(url)
			.await
			.map_err(|e| DataFetchError::Request(e.to_string()))?;
		let status = response.status();
		if !status.is_success() {
			return Err(DataFetchError::Status(status.as_u16()));
		}
		response
			.text()
			.await
			.map_err(|e| DataFetchError::Decode(e.to_string()))
	}
}

impl ExecutionSource for HttpExecutionSource {
	async fn fetch_execution_page(
		&self,
		group_id: &str,
		page: u32,
	) -> Result<ExecutionPage, DataFetchError> {
		let url = self.page_url(group_id, page);
		debug!("GET {url}");
		let body = self.get_text(&url).await?;
		ExecutionPage::from_json(&body)
	}
}

/// The sources the app can be pointed at.
#[derive(Clone, Debug)]
pub enum PageSource {
	/// A running backend.
	Http(HttpExecutionSource),
	/// Generated in the browser.
	Sample(SampleSource),
}

impl PageSource {
	/// HTTP when a base URL is given, the built-in sample data otherwise.
	pub fn from_base_url(base_url: Option<&str>) -> Self {
		match base_url.map(str::trim).filter(|url| !url.is_empty()) {
			Some(url) => {
				let source = HttpExecutionSource::new(url);
				info!("reading executions from {}", source.base_url());
				Self::Http(source)
			}
			None => {
				info!("no backend configured, showing sample executions");
				Self::Sample(SampleSource::default())
			}
		}
	}
}

impl ExecutionSource for PageSource {
	async fn fetch_execution_page(
		&self,
		group_id: &str,
		page: u32,
	) -> Result<ExecutionPage, DataFetchError> {
		match self {
			Self::Http(source) => source.fetch_execution_page(group_id, page).await,
			Self::Sample(source) => source.fetch_execution_page(group_id, page).await,
		}
	}
}

#[cfg(test)]
mod tests {
	use futures::executor::block_on;
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn test_page_url() {
		let source = HttpExecutionSource::new("https://agents.example.com//");
		assert_eq!(source.base_url(), "https://agents.example.com");
		assert_eq!(
			source.page_url("3D62EDA5-A2DD-4A23-98FF-AB1B758FDD9C", 2),
			"https://agents.example.com/api/agent-executions/3D62EDA5-A2DD-4A23-98FF-AB1B758FDD9C?page=2"
		);
	}

	#[test]
	fn test_source_selection() {
		assert!(matches!(
			PageSource::from_base_url(Some(" http://localhost:5000 ")),
			PageSource::Http(ref s) if s.base_url() == "http://localhost:5000"
		));
		assert!(matches!(PageSource::from_base_url(Some("  ")), PageSource::Sample(_)));
		assert!(matches!(PageSource::from_base_url(None), PageSource::Sample(_)));
	}

	#[test]
	fn test_sample_through_page_source() {
		let source = PageSource::from_base_url(None);
		let page = block_on(source.fetch_execution_page("group", 1)).unwrap();
		assert_eq!(page.nodes.len(), 10);
		assert!(page.has_more);
	}
}
