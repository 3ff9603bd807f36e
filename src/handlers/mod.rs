//! HTTP handlers for entity CRUD, login and schema introspection.

pub mod auth;
pub mod config;
pub mod entity;
