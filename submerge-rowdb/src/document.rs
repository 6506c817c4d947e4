use serde::{Deserialize, Serialize};
use submerge_lang::{Fields, Path, Timestamp};

/// A document as read back from the store (spec §3, "Document").
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub path: Path,
    pub fields: Fields,
    pub create_time: Timestamp,
    pub update_time: Timestamp,
    pub exists: bool,
    pub subcollections: Vec<String>,
}

impl Document {
    pub fn missing(path: Path) -> Document {
        Document {
            path,
            fields: Fields::new(),
            create_time: Timestamp::new(0, 0),
            update_time: Timestamp::new(0, 0),
            exists: false,
            subcollections: Vec::new(),
        }
    }
}

/// What's actually persisted per document path: the raw bytes are kept
/// separate from `subcollections`, which is derived from the `COLLECTIONS`
/// index table rather than stored redundantly.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct DocRecord {
    pub fields: Fields,
    pub create_time: Timestamp,
    pub update_time: Timestamp,
}
