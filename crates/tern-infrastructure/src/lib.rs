//! Storage adapters for the Tern engine.
//!
//! Concrete implementations of the persistence traits defined in
//! `tern-core`, currently a TOML-file session store.

pub mod session_repository;

pub use session_repository::TomlSessionRepository;
