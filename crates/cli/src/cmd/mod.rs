pub mod deploy;
pub mod summary;
