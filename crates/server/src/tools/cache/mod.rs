//! Cache-related MCP tools.
//!
//! Both go through the control channel so clients observe the same
//! notifications as a `GET_CACHE_SIZE` or `CLEAR_CACHE` message.

pub mod clear;
pub mod size;

pub use clear::clear_impl;
pub use size::size_impl;
