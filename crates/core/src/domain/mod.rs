pub mod comment;
pub mod period;
pub mod request;
