pub mod document;
pub mod format;
pub mod request;

pub use document::{PaginationLinks, Response, CONTENT_TYPE};
pub use format::ResourceSerializer;
pub use request::{RequestContext, RequestContextBuilder, DEFAULT_PAGE_SIZE};
