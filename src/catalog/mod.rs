pub mod access_url;
pub mod docs;
pub mod error;
pub mod search;
