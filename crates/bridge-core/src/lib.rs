//! OpenAPI -> MCP bridge core.
//!
//! This crate contains everything transport-independent:
//! - [`spec`]: parse an `OpenAPI` 3.x document into operation descriptors
//! - [`registry`]: derive one MCP tool definition per operation
//! - [`mapper`]: validate raw tool arguments and map them onto an HTTP request
//! - [`executor`]: execute the mapped request against the configured base URL
//! - [`dispatch`]: the lookup -> map -> execute chain shared by all transports
//!
//! It intentionally contains **no** MCP wire-format logic and **no** server
//! state; transports live in `openapi-bridge-server`.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod mapper;
pub mod registry;
pub mod spec;
