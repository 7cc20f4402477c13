//! End-to-end tests against a mock registry

mod crawl_tests;
mod session_tests;
mod support;
