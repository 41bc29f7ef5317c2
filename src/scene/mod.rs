pub mod arena;
pub mod camera;
pub mod editor;
pub mod geometry;
pub mod layout;
pub mod manager;
pub mod particles;
