/// Point on the unit square or disk
#[derive(Clone, Copy, Default, Debug, PartialEq)]
pub struct Vec2(pub f32, pub f32);

impl Vec2 {
    pub fn length(&self) -> f32 {
        self.0.hypot(self.1)
    }
}
