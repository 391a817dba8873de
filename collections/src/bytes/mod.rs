mod bytes;
mod cursor;
mod inner;
mod rc;
mod slice;
mod store;

pub use bytes::Bytes;
pub use cursor::Cursor;
pub use slice::Slice;
pub use store::Store;
