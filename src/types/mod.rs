//! Core types for type-safe vector spaces and transformations

pub mod gaussian;
pub mod spaces;
pub mod transforms;
