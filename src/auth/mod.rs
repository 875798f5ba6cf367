pub mod authorizer;
pub mod error;
pub mod native_flow;
pub mod oauth;
pub mod session;
pub mod token_store;
