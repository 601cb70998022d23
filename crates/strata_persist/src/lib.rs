pub mod compression;
pub mod region;
pub mod versioning;
