mod document;
mod store;

pub use document::Document;
pub use store::Store;
