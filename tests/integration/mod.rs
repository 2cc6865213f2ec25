//! Integration tests
//!
//! Each file drives the wired server state over in-memory stores.

mod flush_test;
mod gateway_test;
mod http_test;
mod marks_test;
