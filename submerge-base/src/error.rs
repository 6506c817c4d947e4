use std::borrow::Cow;

/// The subset of the managed service's RPC status codes the engine can
/// raise. Deliberately smaller than the real service's full set (spec §7,
/// "Error codes (subset)").
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Code {
    InvalidArgument,
    FailedPrecondition,
    NotFound,
    AlreadyExists,
    Aborted,
    DeadlineExceeded,
    Unavailable,
    PermissionDenied,
    /// Not part of the documented subset: covers storage/codec failures
    /// with no better home (e.g. a corrupt redb table), so callers still
    /// get a code rather than an opaque panic.
    Internal,
}

/// A coded, user-facing fault: it always has a [`Code`] and, for argument
/// errors, the offending field path (spec §7, "Propagation").
#[derive(Debug, Clone)]
pub struct Fault {
    pub code: Code,
    pub message: Cow<'static, str>,
    pub field_path: Option<String>,
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.field_path {
            Some(path) => write!(f, "{:?}: {} (field: {})", self.code, self.message, path),
            None => write!(f, "{:?}: {}", self.code, self.message),
        }
    }
}

impl std::error::Error for Fault {}

pub type FaultResult<T> = std::result::Result<T, Fault>;

pub fn fault(code: Code, msg: impl Into<Cow<'static, str>>) -> Fault {
    Fault {
        code,
        message: msg.into(),
        field_path: None,
    }
}

pub fn fault_field(
    code: Code,
    msg: impl Into<Cow<'static, str>>,
    field_path: impl Into<String>,
) -> Fault {
    Fault {
        code,
        message: msg.into(),
        field_path: Some(field_path.into()),
    }
}

/// Wraps an infrastructure error (serialization, storage) as a
/// [`Code::Internal`] fault, since those have no documented code of their
/// own.
pub fn internal(err: impl std::fmt::Display) -> Fault {
    fault(Code::Internal, err.to_string())
}

#[test]
fn test_fault_display_includes_field() {
    let f = fault_field(Code::InvalidArgument, "bad path", "name");
    assert!(format!("{f}").contains("name"));
}
