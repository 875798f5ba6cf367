pub mod config;
pub mod file_record;
pub mod series;
pub mod token;
