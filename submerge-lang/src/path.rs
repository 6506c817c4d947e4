// A path designates either a collection (odd segment count) or a document
// (even segment count) within the hierarchical document tree (spec §4.A).

use std::fmt;
use submerge_base::{fault, fault_field, Code, FaultResult};

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, serde::Serialize, serde::Deserialize)]
pub struct Path(Vec<String>);

impl Path {
    /// Parses a path with no opinion on parity; callers that care use
    /// `parse_document`/`parse_collection`.
    pub fn parse_any(s: &str) -> FaultResult<Path> {
        if s.is_empty() {
            return Err(fault(Code::InvalidArgument, "path must not be empty"));
        }
        if s.starts_with('/') || s.ends_with('/') {
            return Err(fault(
                Code::InvalidArgument,
                "path must not have leading or trailing slashes",
            ));
        }
        let segments: Vec<String> = s.split('/').map(str::to_string).collect();
        if segments.iter().any(|seg| seg.is_empty()) {
            return Err(fault(Code::InvalidArgument, "path has an empty segment"));
        }
        Ok(Path(segments))
    }

    pub fn parse_document(s: &str) -> FaultResult<Path> {
        let p = Path::parse_any(s)?;
        if !p.is_document() {
            return Err(fault(
                Code::InvalidArgument,
                "document path must have an even number of segments",
            ));
        }
        Ok(p)
    }

    pub fn parse_collection(s: &str) -> FaultResult<Path> {
        let p = Path::parse_any(s)?;
        if !p.is_collection() {
            return Err(fault(
                Code::InvalidArgument,
                "collection path must have an odd number of segments",
            ));
        }
        Ok(p)
    }

    pub fn from_segments(segments: Vec<String>) -> Path {
        Path(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_document(&self) -> bool {
        !self.0.is_empty() && self.0.len() % 2 == 0
    }

    pub fn is_collection(&self) -> bool {
        self.0.len() % 2 == 1
    }

    /// The collection id a document lives in (second-to-last segment).
    pub fn collection_id(&self) -> Option<&str> {
        if !self.is_document() {
            return None;
        }
        self.0.get(self.0.len() - 2).map(String::as_str)
    }

    /// The trailing segment: the document id for a document path, the
    /// collection id for a collection path.
    pub fn last_id(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// The parent document path of a collection path, or the parent
    /// collection path of a document path. `None` for a root-level
    /// collection path (a single segment).
    pub fn parent(&self) -> Option<Path> {
        if self.0.len() <= 1 {
            return None;
        }
        Some(Path(self.0[..self.0.len() - 1].to_vec()))
    }

    pub fn child(&self, segment: impl Into<String>) -> Path {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Path(segments)
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_prefix_of(&self, other: &Path) -> bool {
        other.0.len() > self.0.len() && other.0[..self.0.len()] == self.0[..]
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

/// Whether a wire name is expected to resolve to a document or a
/// collection, for `to_internal_path`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PathKind {
    Document,
    Collection,
}

/// Formats the fully-qualified wire name `projects/{p}/databases/{d}/documents/{path}`.
pub fn format_wire_name(project: &str, database: &str, path: &Path) -> String {
    format!(
        "projects/{project}/databases/{database}/documents/{path}"
    )
}

/// Inverse of `format_wire_name`: strips the prefix and validates the kind.
pub fn to_internal_path(
    wire_name: &str,
    project: &str,
    database: &str,
    kind: PathKind,
) -> FaultResult<Path> {
    let prefix = format!("projects/{project}/databases/{database}/documents");
    let rest = wire_name.strip_prefix(&format!("{prefix}/")).ok_or_else(|| {
        fault_field(
            Code::InvalidArgument,
            format!("wire name {wire_name:?} does not start with {prefix:?}"),
            "name",
        )
    })?;
    if rest.is_empty() {
        return Err(fault(
            Code::InvalidArgument,
            "wire name does not name a document or collection",
        ));
    }
    match kind {
        PathKind::Document => Path::parse_document(rest),
        PathKind::Collection => Path::parse_collection(rest),
    }
}
