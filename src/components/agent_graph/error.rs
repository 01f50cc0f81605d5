use thiserror::Error;

/// Failure to obtain a page of execution data. Shown to the user; the
/// previous page stays on screen.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DataFetchError {
	#[error("request failed: {0}")]
	Request(String),

	#[error("server responded with HTTP {0}")]
	Status(u16),

	#[error("could not decode execution page: {0}")]
	Decode(String),

	#[error("invalid execution page: {0}")]
	InvalidPage(String),
}

/// The serialized execution history of a node is not a JSON list of entries.
#[derive(Debug, Error)]
#[error("malformed execution history: {0}")]
pub struct MalformedHistoryError(#[from] pub serde_json::Error);

/// A link names a node id that is not part of the current page.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("link {from} -> {to} references unknown node {missing}")]
pub struct UnknownLinkEndpointError {
	pub from: String,
	pub to: String,
	pub missing: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("node {node_id} left the finite plane and was reset to the viewport center")]
pub struct LayoutDivergenceError {
	pub node_id: String,
}
