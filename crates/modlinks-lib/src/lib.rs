pub mod manifest;
pub mod mirror;
pub mod naming;
