mod codec;
mod path;
mod value;

pub use codec::{decode, decode_fields, encode, encode_fields};
pub use path::{format_wire_name, to_internal_path, Path, PathKind};
pub use value::{Fields, Flo, GeoPoint, Reference, Timestamp, Value};
