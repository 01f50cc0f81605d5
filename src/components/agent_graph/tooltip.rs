use std::fmt::Display;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use glam::DVec2;
use log::debug;

use serde_json::Value;

use super::types::{HistoryEntry, NodeRecord, parse_history, parse_history_value};

pub const HISTORY_FALLBACK: &str = "Unable to parse history";
pub const LINK_HEADER: &str = "Connection Details";
pub const MISSING_TIMESTAMP: &str = "N/A";

/// Gap between the hovered element and the tooltip's bottom edge.
pub const TOOLTIP_OFFSET: f64 = 10.0;

const DISPLAY_FORMAT: &str = "%b %-d, %Y, %-I:%M:%S %p";
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

#[derive(Clone, Debug, PartialEq)]
pub enum HistoryView {
	Absent,
	Entries(Vec<HistoryEntry>),
	Unparseable,
}

impl HistoryView {
	/// A string is parsed as serialized history, a list is decoded as is and
	/// anything else is unparseable. Failures never leave the tooltip.
	pub fn from_raw(raw: Option<&Value>) -> Self {
		let parsed = match raw {
			None | Some(Value::Null) => return Self::Absent,
			Some(Value::String(s)) if s.trim().is_empty() => return Self::Absent,
			Some(Value::String(s)) => parse_history(s.trim()),
			Some(value @ Value::Array(_)) => parse_history_value(value),
			Some(other) => {
				debug!("history is neither a string nor a list: {other}");
				return Self::Unparseable;
			}
		};
		match parsed {
			Ok(entries) => Self::Entries(entries),
			Err(err) => {
				debug!("{err}");
				Self::Unparseable
			}
		}
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct NodeTooltip {
	pub label: String,
	pub status: String,
	pub timestamp: String,
	pub description: Option<String>,
	pub history: HistoryView,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TooltipContent {
	Node(NodeTooltip),
	Link { from: String, to: String },
}

impl TooltipContent {
	pub fn for_node(record: &NodeRecord) -> Self {
		Self::for_node_in(record, &Local)
	}

	pub fn for_node_in<Tz: TimeZone>(record: &NodeRecord, tz: &Tz) -> Self
	where
		Tz::Offset: Display,
	{
		let data = &record.data;
		Self::Node(NodeTooltip {
			label: record.label.clone(),
			status: record.status.display_name().to_owned(),
			timestamp: format_timestamp(data.run_on.as_deref(), data.timestamp, tz),
			description: data
				.description
				.as_deref()
				.map(str::trim)
				.filter(|d| !d.is_empty())
				.map(str::to_owned),
			history: HistoryView::from_raw(data.agent_execution_history.as_ref()),
		})
	}

	pub fn for_link(from: impl Into<String>, to: impl Into<String>) -> Self {
		Self::Link {
			from: from.into(),
			to: to.into(),
		}
	}

	pub fn header(&self) -> &str {
		match self {
			Self::Node(node) => &node.label,
			Self::Link { .. } => LINK_HEADER,
		}
	}
}

/// Tooltip content plus the screen point its bottom centre sits on.
#[derive(Clone, Debug, PartialEq)]
pub struct Tooltip {
	pub content: TooltipContent,
	pub anchor: DVec2,
}

/// Formats `run_on` in `tz`, falling back to the epoch-millisecond
/// `timestamp`, then to `N/A`.
pub fn format_timestamp<Tz: TimeZone>(run_on: Option<&str>, timestamp: Option<i64>, tz: &Tz) -> String
where
	Tz::Offset: Display,
{
	run_on
		.map(str::trim)
		.filter(|raw| !raw.is_empty())
		.and_then(|raw| parse_timestamp(raw, tz))
		.or_else(|| DateTime::from_timestamp_millis(timestamp?).map(|t| t.with_timezone(tz)))
		.map(|t| t.format(DISPLAY_FORMAT).to_string())
		.unwrap_or_else(|| MISSING_TIMESTAMP.to_owned())
}

fn parse_timestamp<Tz: TimeZone>(raw: &str, tz: &Tz) -> Option<DateTime<Tz>> {
	if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
		return Some(t.with_timezone(tz));
	}
	// Strings without an offset are wall-clock time in the viewer's zone.
	NAIVE_FORMATS
		.iter()
		.find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
		.and_then(|naive| tz.from_local_datetime(&naive).earliest())
}
