/// What a single byte did to the scanner state.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ScanStep {
    /// Byte lies outside any frame and was ignored.
    Skipped,
    /// Byte belongs to the frame currently being assembled.
    Inside,
    /// Byte is the closing brace of the current frame.
    Complete,
}

/// Byte-at-a-time brace-depth tracker.
///
/// Braces inside JSON string literals (including escaped quotes) do not move the depth, so a
/// value such as `"a}b"` never ends a frame early. Bytes seen while the depth is zero are skipped
/// until the next `{`.
#[derive(Debug, Clone, Default)]
pub struct FrameScanner {
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl FrameScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// True while a frame has been opened but not yet closed.
    pub fn in_frame(&self) -> bool {
        self.depth > 0
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn push(&mut self, byte: u8) -> ScanStep {
        if self.depth == 0 {
            if byte == b'{' {
                self.depth = 1;
                self.in_string = false;
                self.escaped = false;
                return ScanStep::Inside;
            }
            return ScanStep::Skipped;
        }

        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if byte == b'\\' {
                self.escaped = true;
            } else if byte == b'"' {
                self.in_string = false;
            }
            return ScanStep::Inside;
        }

        match byte {
            b'"' => self.in_string = true,
            b'{' => self.depth += 1,
            b'}' => {
                self.depth -= 1;
                if self.depth == 0 {
                    return ScanStep::Complete;
                }
            }
            _ => {}
        }
        ScanStep::Inside
    }
}
