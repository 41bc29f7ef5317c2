pub mod api;
pub mod assistant;
pub mod gui;
pub mod persistence;
pub mod scene;
pub mod schema_utils;
