//! Integration tests for onemirror-graph
//!
//! Uses wiremock to simulate the Microsoft Graph API and the identity
//! provider, and verifies end-to-end behavior of the change feed, root
//! lookup, downloads and token refresh.

mod common;

mod test_auth;
mod test_delta;
mod test_download;
mod test_root;
