//! Frame counting for double buffering.

/// Number of frames in flight.
pub const FRAME_OVERLAP: usize = 2;

/// Monotonic frame counter.
///
/// The per-frame resource slot is `number % FRAME_OVERLAP`, so consecutive
/// frames alternate between slots and a slot is reused only after its
/// previous submission was waited on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameCounter {
    number: u64,
}

impl FrameCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames completed so far.
    pub fn number(self) -> u64 {
        self.number
    }

    /// Slot for the frame being recorded.
    #[allow(clippy::cast_possible_truncation)]
    pub fn slot(self) -> usize {
        (self.number % FRAME_OVERLAP as u64) as usize
    }

    pub fn advance(&mut self) {
        self.number += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_alternate() {
        let mut counter = FrameCounter::new();
        let slots: Vec<usize> = (0..6)
            .map(|_| {
                let slot = counter.slot();
                counter.advance();
                slot
            })
            .collect();

        assert_eq!(slots, vec![0, 1, 0, 1, 0, 1]);
        assert_eq!(counter.number(), 6);
    }
}
