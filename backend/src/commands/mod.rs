//! Subcommands of the `dirstore` binary.

pub mod import_ldif;
pub mod index_status;
pub mod rebuild_index;
