//! Migration engine for drover.
//!
//! This crate provides the ordered, named, optionally-reversible migration
//! machinery:
//! - The [`Migration`] trait each migration module implements
//! - A [`Registry`] that orders migrations and rejects duplicate names
//! - A persisted [`Ledger`] of applied migrations
//! - The [`Runner`] that applies and reverts migrations sequentially
//!
//! Migrations are required to be idempotent: the ledger entry is written
//! strictly after a successful `up`, so a crash between the two results in
//! at most a harmless re-run.

mod error;
mod ledger;
mod migration;
mod registry;
mod runner;

pub use error::MigrateError;
pub use ledger::{AppliedMigration, Ledger, MIGRATIONS_COLLECTION};
pub use migration::Migration;
pub use registry::Registry;
pub use runner::{ApplyReport, FailedMigration, Runner, Status};
