pub mod buffer;
pub mod cell;
pub mod chunk;
pub mod config;
pub mod controller;
pub mod error;
pub mod graph;
pub mod mesh;
pub mod plugin;
pub mod scene;
pub mod style;
pub mod types;

pub use graph::Graph;
pub use plugin::FlyGraphPlugin;
