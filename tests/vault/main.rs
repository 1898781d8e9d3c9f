//! Integration tests for the tenant vault.

mod common;
mod isolation;
mod migration;
mod rotation;
mod sqlite;
