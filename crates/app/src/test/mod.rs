//! Shared support for service tests.

pub(crate) mod helpers;

pub(crate) use context::TestContext;
