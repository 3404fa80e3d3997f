use crate::message::{Delta, SnapshotImage};

/// The rendering surface the sync protocol paints on. Treated as a black
/// box that turns a delta into pixels and can serialize/deserialize the
/// whole raster as an opaque blob.
pub trait PaintSurface {
    fn size(&self) -> (u32, u32);
    fn draw(&mut self, delta: &Delta);
    fn capture(&self) -> SnapshotImage;
    fn restore(&mut self, image: &SnapshotImage);
}

/// Optional durable cache for the last known canvas. Best-effort:
/// implementations swallow failures, they are never fatal.
pub trait SnapshotCache {
    fn load(&self) -> Option<SnapshotImage>;
    fn store(&mut self, image: &SnapshotImage);
}
