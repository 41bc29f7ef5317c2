pub mod assistant_widget;
pub mod frontend;
pub mod render;
