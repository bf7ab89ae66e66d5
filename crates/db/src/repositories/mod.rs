pub mod request;

pub use request::SqlRequestStore;
