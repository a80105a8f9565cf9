//! Render submission requests. Rendering itself is an external collaborator;
//! the core only queues requests for the frame driver to drain into a sink.

use std::sync::Arc;

#[derive(Clone, Debug, PartialEq)]
pub struct SpriteRequest {
    pub image: Arc<str>,
    pub x: f32,
    pub y: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    /// Degrees.
    pub rotation: f32,
    pub pivot_x: f32,
    pub pivot_y: f32,
    pub sorting_order: i32,
    pub color: [u8; 4],
}
