//! Shared test fixtures for the OwnSpace workspace.
//!
//! Provides a single, shared PostgreSQL testcontainer per test process. Each
//! test carves its own database out of it with
//! [`PostgresFixture::create_database`], so retrofits run by different tests
//! never see each other's tables, roles or policies.
//!
//! The fixture is lazily initialized once per test process and automatically
//! cleaned up when the process exits. When Docker is unavailable it resolves
//! to `None` and callers skip.

mod fixtures;

pub use fixtures::*;
