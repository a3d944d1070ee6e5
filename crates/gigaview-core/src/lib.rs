pub mod config;
pub mod consts;
pub mod decoder;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod manager;
pub mod pool;
pub mod render;
pub mod scheduler;
pub mod tile;
pub mod view;
pub mod viewport;
