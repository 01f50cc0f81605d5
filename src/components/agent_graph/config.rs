use super::layout::LayoutConfig;
use super::viewport::ViewportConfig;

/// Agent group shown when none is given.
pub const DEFAULT_GROUP_ID: &str = "3D62EDA5-A2DD-4A23-98FF-AB1B758FDD9C";

/// Everything the canvas component needs besides its data source.
#[derive(Clone, Debug, PartialEq)]
pub struct GraphConfig {
	/// Agent group whose executions are shown.
	pub group_id: String,
	/// Backend root; `None` selects the built-in sample data.
	pub api_base_url: Option<String>,
	/// Force simulation parameters.
	pub layout: LayoutConfig,
	/// Zoom bounds and initial framing.
	pub viewport: ViewportConfig,
}

impl Default for GraphConfig {
	fn default() -> Self {
		Self {
			group_id: DEFAULT_GROUP_ID.to_owned(),
			api_base_url: None,
			layout: LayoutConfig::default(),
			viewport: ViewportConfig::default(),
		}
	}
}

impl GraphConfig {
	/// Replaces the group id unless `group_id` is missing or blank.
	pub fn with_group(mut self, group_id: Option<&str>) -> Self {
		if let Some(group_id) = group_id.map(str::trim).filter(|g| !g.is_empty()) {
			self.group_id = group_id.to_owned();
		}
		self
	}

	/// Sets the backend root; a missing or blank URL selects sample data.
	pub fn with_api_base_url(mut self, base_url: Option<&str>) -> Self {
		self.api_base_url = base_url
			.map(str::trim)
			.filter(|url| !url.is_empty())
			.map(str::to_owned);
		self
	}
}
