#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct FrameLimits {
    pub max_frame_bytes: usize,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            max_frame_bytes: 16 * 1024 * 1024,
        }
    }
}
