pub mod bulk;
pub mod error;
pub mod resumable;
