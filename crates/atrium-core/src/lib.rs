//! Atrium Core - shared scene types for the Atrium engine
//!
//! Foundational types used across the engine crates:
//! - Mathematical primitives (re-exported from glam)
//! - Transform component for placing things in a scene
//! - Entity identity

pub mod types;

pub use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
pub use types::{EntityId, Transform};
