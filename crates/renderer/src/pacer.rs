//! Frame slot cursor and phase bookkeeping.
//!
//! [`FramePacer`] is the GPU-free half of the frame state machine: it
//! tracks which slot the next frame uses and which phase the current
//! frame attempt is in. The coordinator consults it before every
//! synchronization step, which keeps the two invariants that matter
//! checkable without a device:
//!
//! - the cursor advances exactly once per *completed* frame; an attempt
//!   aborted by a stale surface retries the same slot, and
//! - phases are entered strictly in order, so a slot can never be
//!   re-entered without an intervening completion or recovery.
//!
//! Violating the phase order is a misuse of the state machine, not a
//! runtime condition, and fails loudly with a panic.

/// Phase of the current frame attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    /// No frame attempt in progress.
    Idle,
    /// Blocking on the slot's fence.
    WaitingForSlot,
    /// Requesting the next presentable image.
    Acquiring,
    /// Recording the slot's command buffer.
    Recording,
    /// Submitted to the graphics queue.
    Submitted,
    /// Queueing the image for presentation.
    Presenting,
    /// Rebuilding the presentation chain after a stale surface.
    Recovering,
}

/// Cursor over the frame slots plus the phase of the frame in progress.
#[derive(Debug)]
pub struct FramePacer {
    slot: usize,
    slot_count: usize,
    phase: FramePhase,
}

impl FramePacer {
    /// Creates a pacer over `slot_count` frame slots.
    ///
    /// # Panics
    ///
    /// Panics if `slot_count` is zero.
    pub fn new(slot_count: usize) -> Self {
        assert!(slot_count > 0, "frame pacer needs at least one slot");
        Self {
            slot: 0,
            slot_count,
            phase: FramePhase::Idle,
        }
    }

    /// The slot the current (or next) frame attempt uses.
    #[inline]
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Number of frame slots in the ring.
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Current phase.
    #[inline]
    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    /// Starts a frame attempt; returns the slot to use.
    pub fn begin_frame(&mut self) -> usize {
        self.expect(FramePhase::Idle, "begin_frame");
        self.phase = FramePhase::WaitingForSlot;
        self.slot
    }

    /// The slot's fence has signaled; its resources are reusable.
    pub fn slot_ready(&mut self) {
        self.expect(FramePhase::WaitingForSlot, "slot_ready");
        self.phase = FramePhase::Acquiring;
    }

    /// A presentable image was acquired.
    pub fn image_acquired(&mut self) {
        self.expect(FramePhase::Acquiring, "image_acquired");
        self.phase = FramePhase::Recording;
    }

    /// The slot's command buffer is recorded and executable.
    pub fn recorded(&mut self) {
        self.expect(FramePhase::Recording, "recorded");
        self.phase = FramePhase::Submitted;
    }

    /// The command buffer was handed to the graphics queue.
    pub fn submitted(&mut self) {
        self.expect(FramePhase::Submitted, "submitted");
        self.phase = FramePhase::Presenting;
    }

    /// The image was queued for presentation; the frame is complete and
    /// the cursor advances to the next slot.
    pub fn presented(&mut self) {
        self.expect(FramePhase::Presenting, "presented");
        self.slot = (self.slot + 1) % self.slot_count;
        self.phase = FramePhase::Idle;
    }

    /// The surface went stale during acquire or present.
    pub fn surface_stale(&mut self) {
        assert!(
            matches!(self.phase, FramePhase::Acquiring | FramePhase::Presenting),
            "surface_stale is only reachable while acquiring or presenting (phase: {:?})",
            self.phase
        );
        self.phase = FramePhase::Recovering;
    }

    /// The presentation chain was rebuilt. The aborted frame is dropped
    /// and the cursor does NOT advance: the next attempt retries the
    /// same slot.
    pub fn recovered(&mut self) {
        self.expect(FramePhase::Recovering, "recovered");
        self.phase = FramePhase::Idle;
    }

    fn expect(&self, expected: FramePhase, operation: &str) {
        assert!(
            self.phase == expected,
            "{} called in phase {:?} (expected {:?})",
            operation,
            self.phase,
            expected
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_successful_frame(pacer: &mut FramePacer) -> usize {
        let slot = pacer.begin_frame();
        pacer.slot_ready();
        pacer.image_acquired();
        pacer.recorded();
        pacer.submitted();
        pacer.presented();
        slot
    }

    #[test]
    fn three_frames_cycle_through_all_slots() {
        let mut pacer = FramePacer::new(3);
        assert_eq!(run_successful_frame(&mut pacer), 0);
        assert_eq!(run_successful_frame(&mut pacer), 1);
        assert_eq!(run_successful_frame(&mut pacer), 2);
        // Fourth frame wraps back to slot 0.
        assert_eq!(run_successful_frame(&mut pacer), 0);
    }

    #[test]
    fn stale_acquire_retries_the_same_slot() {
        let mut pacer = FramePacer::new(3);
        run_successful_frame(&mut pacer);
        assert_eq!(pacer.slot(), 1);

        // Frame attempt aborted while acquiring.
        let slot = pacer.begin_frame();
        assert_eq!(slot, 1);
        pacer.slot_ready();
        pacer.surface_stale();
        pacer.recovered();

        // The aborted frame is not counted; the cursor is unchanged and
        // the next attempt reuses the slot.
        assert_eq!(pacer.slot(), 1);
        assert_eq!(run_successful_frame(&mut pacer), 1);
        assert_eq!(pacer.slot(), 2);
    }

    #[test]
    fn stale_present_retries_the_same_slot() {
        let mut pacer = FramePacer::new(2);
        let slot = pacer.begin_frame();
        pacer.slot_ready();
        pacer.image_acquired();
        pacer.recorded();
        pacer.submitted();
        pacer.surface_stale();
        pacer.recovered();

        assert_eq!(pacer.slot(), slot);
        assert_eq!(pacer.phase(), FramePhase::Idle);
    }

    #[test]
    fn phases_progress_in_order() {
        let mut pacer = FramePacer::new(3);
        assert_eq!(pacer.phase(), FramePhase::Idle);
        pacer.begin_frame();
        assert_eq!(pacer.phase(), FramePhase::WaitingForSlot);
        pacer.slot_ready();
        assert_eq!(pacer.phase(), FramePhase::Acquiring);
        pacer.image_acquired();
        assert_eq!(pacer.phase(), FramePhase::Recording);
        pacer.recorded();
        assert_eq!(pacer.phase(), FramePhase::Submitted);
        pacer.submitted();
        assert_eq!(pacer.phase(), FramePhase::Presenting);
        pacer.presented();
        assert_eq!(pacer.phase(), FramePhase::Idle);
    }

    #[test]
    #[should_panic(expected = "begin_frame")]
    fn slot_cannot_be_reentered_mid_frame() {
        let mut pacer = FramePacer::new(3);
        pacer.begin_frame();
        // Re-entering without completing or recovering the frame is a
        // programmer error.
        pacer.begin_frame();
    }

    #[test]
    #[should_panic(expected = "presented")]
    fn presenting_without_submitting_panics() {
        let mut pacer = FramePacer::new(3);
        pacer.begin_frame();
        pacer.presented();
    }

    #[test]
    #[should_panic(expected = "surface_stale")]
    fn stale_is_unreachable_outside_acquire_and_present() {
        let mut pacer = FramePacer::new(3);
        pacer.begin_frame();
        pacer.surface_stale();
    }

    #[test]
    #[should_panic(expected = "at least one slot")]
    fn zero_slots_is_rejected() {
        let _ = FramePacer::new(0);
    }
}
