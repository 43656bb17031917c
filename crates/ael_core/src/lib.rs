pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod incidents;
pub mod normalize;
pub mod notify;
pub mod repo;
pub mod spec;
pub mod store;
pub mod validate;
