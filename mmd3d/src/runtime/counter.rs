/// Looping frame clock owned by the playback driver. The solver itself takes
/// explicit frame numbers; this is only a convenience for driving it.
#[derive(Copy, Clone, Debug)]
pub struct FrameCounter {
    begin: u32,
    end: u32,
    current: u32,
}

impl FrameCounter {
    pub fn new(begin: u32, end: u32) -> Self {
        Self {
            begin,
            end,
            current: begin,
        }
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn advance(&mut self) {
        self.current += 1;
        if self.current >= self.end {
            self.current = self.begin;
        }
    }
}
