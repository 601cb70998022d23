pub mod block;
pub mod chunk;
pub mod config;
pub mod coords;
pub mod fluid;
pub mod lighting;
pub mod metadata;
pub mod physics;
pub mod shape;
pub mod structures;
pub mod world;
pub mod worldgen;
