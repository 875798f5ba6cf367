pub mod assembler;
pub mod cf_time;
pub mod error;
pub mod extract;
pub mod grid;
pub mod member;
#[cfg(feature = "netcdf")]
pub mod netcdf_backend;
