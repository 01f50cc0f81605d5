use std::collections::{BTreeSet, HashSet};

use glam::DVec2;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use super::error::{DataFetchError, MalformedHistoryError};

/// Node ids emphasised while the pointer rests on a node.
pub type HighlightSet = BTreeSet<String>;

/// Run state of an agent execution step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "Value")]
pub enum NodeStatus {
	Success,
	Running,
	Error,
	Pending,
	#[default]
	Unknown,
}

impl NodeStatus {
	pub fn display_name(self) -> &'static str {
		match self {
			Self::Success => "Success",
			Self::Running => "Running",
			Self::Error => "Error",
			Self::Pending => "Pending",
			Self::Unknown => "Unknown",
		}
	}
}

impl From<&str> for NodeStatus {
	fn from(raw: &str) -> Self {
		match raw.trim().to_ascii_lowercase().as_str() {
			"success" => Self::Success,
			"running" => Self::Running,
			"error" => Self::Error,
			"pending" => Self::Pending,
			_ => Self::Unknown,
		}
	}
}

/// Anything but a string, `null` included, is an unknown status.
impl From<Value> for NodeStatus {
	fn from(raw: Value) -> Self {
		raw.as_str().map(Self::from).unwrap_or_default()
	}
}

/// Execution record attached to a node. Keys the client does not know about
/// are kept in `extra`. A field of an unexpected type reads as absent, so one
/// odd record never rejects the page it is on.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ExecutionPayload {
	#[serde(default, deserialize_with = "lenient_string")]
	pub id: Option<String>,
	#[serde(default, deserialize_with = "lenient_string")]
	pub agent_group_id: Option<String>,
	/// Serialized history string or an already decoded list; see
	/// [`HistoryView`](super::tooltip::HistoryView).
	#[serde(default)]
	pub agent_execution_history: Option<Value>,
	#[serde(default, deserialize_with = "lenient_string")]
	pub app_insight_operation_id: Option<String>,
	#[serde(default, deserialize_with = "lenient_string")]
	pub run_status: Option<String>,
	#[serde(default, deserialize_with = "lenient_string")]
	pub run_on: Option<String>,
	/// Epoch milliseconds.
	#[serde(default, deserialize_with = "lenient_millis")]
	pub timestamp: Option<i64>,
	#[serde(default, deserialize_with = "lenient_string")]
	pub description: Option<String>,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
	Ok(match Value::deserialize(deserializer)? {
		Value::String(s) => Some(s),
		Value::Number(n) => Some(n.to_string()),
		Value::Bool(b) => Some(b.to_string()),
		_ => None,
	})
}

/// Integer or fractional milliseconds, or a numeric string. Fractions are
/// truncated.
fn lenient_millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
	let millis = match Value::deserialize(deserializer)? {
		Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
		Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f.trunc() as i64),
		_ => None,
	};
	Ok(millis)
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct NodeRecord {
	pub id: String,
	#[serde(default)]
	pub label: String,
	#[serde(default)]
	pub status: NodeStatus,
	#[serde(default)]
	pub data: ExecutionPayload,
	#[serde(default)]
	pub order: i64,
}

/// Directed edge between two node ids.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct LinkRecord {
	pub source: String,
	pub target: String,
}

impl LinkRecord {
	pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
		Self {
			source: source.into(),
			target: target.into(),
		}
	}
}

fn one() -> u32 {
	1
}

/// One page as returned by the execution data source.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPage {
	#[serde(default)]
	pub nodes: Vec<NodeRecord>,
	#[serde(default)]
	pub links: Vec<LinkRecord>,
	#[serde(default)]
	pub has_more: bool,
	#[serde(default)]
	pub current_page: Option<u32>,
	#[serde(default = "one")]
	pub total_pages: u32,
}

impl ExecutionPage {
	/// Decodes a response body and checks the invariants the layout relies on.
	pub fn from_json(body: &str) -> Result<Self, DataFetchError> {
		let page: Self =
			serde_json::from_str(body).map_err(|e| DataFetchError::Decode(e.to_string()))?;
		page.validate()?;
		Ok(page)
	}

	fn validate(&self) -> Result<(), DataFetchError> {
		let mut seen = HashSet::with_capacity(self.nodes.len());
		for node in &self.nodes {
			if node.id.is_empty() {
				return Err(DataFetchError::InvalidPage("node with empty id".into()));
			}
			if !seen.insert(node.id.as_str()) {
				return Err(DataFetchError::InvalidPage(format!(
					"duplicate node id {}",
					node.id
				)));
			}
		}
		Ok(())
	}
}

/// The dataset currently on screen. Each successful page load replaces it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GraphSnapshot {
	pub nodes: Vec<NodeRecord>,
	pub links: Vec<LinkRecord>,
	pub has_more: bool,
	pub page_index: u32,
	pub total_pages: u32,
}

impl GraphSnapshot {
	pub fn from_page(page: ExecutionPage, page_index: u32) -> Self {
		Self {
			total_pages: page.total_pages.max(page_index),
			nodes: page.nodes,
			links: page.links,
			has_more: page.has_more,
			page_index,
		}
	}
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
	Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct TokenUsage {
	#[serde(rename = "TotalTokenCount", default)]
	pub total_tokens: Option<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct HistoryMetadata {
	#[serde(rename = "Usage", default)]
	pub usage: Option<TokenUsage>,
	#[serde(rename = "FinishReason", default)]
	pub finish_reason: Option<String>,
}

/// One message in an agent's execution history.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct HistoryEntry {
	#[serde(rename = "AuthorName", default, deserialize_with = "null_as_empty")]
	pub author: String,
	#[serde(rename = "Content", default, deserialize_with = "null_as_empty")]
	pub content: String,
	#[serde(rename = "ModelId", default, deserialize_with = "null_as_empty")]
	pub model_id: String,
	#[serde(rename = "Metadata", default)]
	pub metadata: Option<HistoryMetadata>,
}

impl HistoryEntry {
	pub fn total_tokens(&self) -> Option<u64> {
		self.metadata.as_ref()?.usage.as_ref()?.total_tokens
	}

	pub fn finish_reason(&self) -> Option<&str> {
		self.metadata.as_ref()?.finish_reason.as_deref()
	}
}

/// Parses the serialized `agent_execution_history` field.
pub fn parse_history(raw: &str) -> Result<Vec<HistoryEntry>, MalformedHistoryError> {
	Ok(serde_json::from_str(raw)?)
}

/// Decodes a history that arrived as JSON rather than as a string.
pub fn parse_history_value(raw: &Value) -> Result<Vec<HistoryEntry>, MalformedHistoryError> {
	Ok(Vec::<HistoryEntry>::deserialize(raw)?)
}

/// Size of the drawing surface in CSS pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewportSize {
	pub width: f64,
	pub height: f64,
}

impl ViewportSize {
	pub fn new(width: f64, height: f64) -> Self {
		Self { width, height }
	}

	pub fn center(&self) -> DVec2 {
		DVec2::new(self.width / 2.0, self.height / 2.0)
	}
}

impl Default for ViewportSize {
	fn default() -> Self {
		Self::new(800.0, 600.0)
	}
}

/// Bounding box of a rendered element in screen space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScreenRect {
	pub left: f64,
	pub top: f64,
	pub width: f64,
	pub height: f64,
}

impl ScreenRect {
	pub fn center_x(&self) -> f64 {
		self.left + self.width / 2.0
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn test_page_decodes_wire_shape() {
		let body = r#"{
			"nodes": [
				{"id": "a", "label": "Planner", "status": "SUCCESS", "order": 1,
				 "data": {"id": "x1", "run_on": "2024-03-05T14:07:09Z", "run_status": "success",
				          "agent_execution_history": "[]", "tenant": "acme"}},
				{"id": "b", "label": "Coder", "status": "queued"}
			],
			"links": [{"source": "a", "target": "b"}],
			"hasMore": true,
			"totalPages": 4
		}"#;

		let page = ExecutionPage::from_json(body).unwrap();
		assert_eq!(page.nodes.len(), 2);
		assert_eq!(page.nodes[0].status, NodeStatus::Success);
		assert_eq!(page.nodes[1].status, NodeStatus::Unknown);
		assert_eq!(page.nodes[0].data.run_on.as_deref(), Some("2024-03-05T14:07:09Z"));
		assert_eq!(page.nodes[0].data.extra.get("tenant"), Some(&Value::from("acme")));
		assert_eq!(page.links, vec![LinkRecord::new("a", "b")]);
		assert!(page.has_more);
		assert_eq!(page.total_pages, 4);
	}

	#[test]
	fn test_odd_payload_fields_do_not_reject_the_page() {
		let body = r#"{
			"nodes": [
				{"id": "a", "data": {"agent_execution_history": [{"AuthorName": "planner", "Content": "hi"}]}},
				{"id": "b", "data": {"agent_execution_history": 42}},
				{"id": "c", "data": {"timestamp": 1717243200000.5}},
				{"id": "d", "status": null},
				{"id": "e", "status": 7, "data": {"run_on": false, "timestamp": "1717243200000", "description": {"x": 1}}}
			],
			"links": []
		}"#;

		let page = ExecutionPage::from_json(body).unwrap();
		assert_eq!(page.nodes.len(), 5);
		assert!(page.nodes[0].data.agent_execution_history.as_ref().unwrap().is_array());
		assert_eq!(page.nodes[1].data.agent_execution_history, Some(Value::from(42)));
		assert_eq!(page.nodes[2].data.timestamp, Some(1_717_243_200_000));
		assert_eq!(page.nodes[3].status, NodeStatus::Unknown);

		let e = &page.nodes[4];
		assert_eq!(e.status, NodeStatus::Unknown);
		assert_eq!(e.data.run_on.as_deref(), Some("false"));
		assert_eq!(e.data.timestamp, Some(1_717_243_200_000));
		assert_eq!(e.data.description, None);
	}

	#[test]
	fn test_page_defaults() {
		let page = ExecutionPage::from_json(r#"{"nodes": [], "links": []}"#).unwrap();
		assert!(!page.has_more);
		assert_eq!(page.total_pages, 1);
		assert_eq!(page.current_page, None);
	}

	#[test]
	fn test_page_rejects_duplicate_ids() {
		let body = r#"{"nodes": [{"id": "a"}, {"id": "a"}], "links": []}"#;
		assert!(matches!(
			ExecutionPage::from_json(body),
			Err(DataFetchError::InvalidPage(_))
		));
	}

	#[test]
	fn test_page_rejects_garbage() {
		assert!(matches!(
			ExecutionPage::from_json("<html>502</html>"),
			Err(DataFetchError::Decode(_))
		));
	}

	#[test]
	fn test_parse_history() {
		let raw = r#"[
			{"id": "1", "AuthorName": "planner", "Content": "Split the task", "ModelId": "gpt-4o",
			 "ToolCalls": [], "Metadata": {"Usage": {"TotalTokenCount": 812}, "FinishReason": "Stop"}},
			{"AuthorName": null, "Content": "ok", "ModelId": "gpt-4o-mini"}
		]"#;
		let history = parse_history(raw).unwrap();
		assert_eq!(history.len(), 2);
		assert_eq!(history[0].author, "planner");
		assert_eq!(history[0].total_tokens(), Some(812));
		assert_eq!(history[0].finish_reason(), Some("Stop"));
		assert_eq!(history[1].author, "");
		assert_eq!(history[1].total_tokens(), None);
	}

	#[test]
	fn test_parse_history_rejects_non_sequences() {
		assert!(parse_history("not json").is_err());
		assert!(parse_history(r#"{"AuthorName": "x"}"#).is_err());
		assert!(parse_history_value(&Value::from(42)).is_err());
	}

	#[test]
	fn test_parse_history_value() {
		let raw = serde_json::json!([{"AuthorName": "coder", "Content": "done", "ModelId": null}]);
		let history = parse_history_value(&raw).unwrap();
		assert_eq!(history[0].author, "coder");
		assert_eq!(history[0].model_id, "");
	}

	#[test]
	fn test_snapshot_from_page() {
		let page = ExecutionPage {
			nodes: vec![NodeRecord {
				id: "a".into(),
				..Default::default()
			}],
			has_more: true,
			total_pages: 1,
			..Default::default()
		};
		let snapshot = GraphSnapshot::from_page(page, 3);
		assert_eq!(snapshot.page_index, 3);
		assert_eq!(snapshot.total_pages, 3);
		assert!(snapshot.has_more);
	}
}
