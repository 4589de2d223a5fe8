//! Type lattice over reference and primitive types

mod lattice;

pub use lattice::{ClassType, Nullability, PrimitiveType, TypeElement};
