use nalgebra::{Point3, Vector3};

/// Scalar value produced by a surface function, and the unit of every coordinate.
pub type Value = f32;

/// A 3D point with [`Value`] components.
pub type Point = Point3<Value>;

/// A 3D vector with [`Value`] components.
pub type Vector = Vector3<Value>;

/// A surface function: maps `(x, z)` to the height `y`.
///
/// Called from rayon worker threads while a chunk is sampled, hence `Send + Sync`.
pub type SurfaceFunction = dyn Fn(Value, Value) -> Value + Send + Sync;
