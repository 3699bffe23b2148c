//! Integration tests against a local mock App Store Connect server.

mod integration;
