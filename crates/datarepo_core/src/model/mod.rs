//! Entity model and projection shapes.
//!
//! # Responsibility
//! - Define the study entities (`Member`, `Team`, `Item`) and their table mappings.
//! - Define projection shapes returned by partial-column queries.
//!
//! # Invariants
//! - Every entity is identified by its primary key.
//! - Relations are loaded explicitly, never on field access.

pub mod dto;
pub mod item;
pub mod member;
pub mod schema;
pub mod team;
