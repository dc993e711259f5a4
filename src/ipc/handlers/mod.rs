pub mod auth;
pub mod core;
pub mod navigation;
pub mod profile;
pub mod records;
