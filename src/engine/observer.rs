// Observability hook for the frame loop.
// The engine reports into a FrameObserver; the default does nothing.

use super::mood::Mood;

/// What happened during one `BlobEngine::step`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    pub mood: Mood,
    pub node_count: usize,
    pub vertex_count: usize,
    pub triangle_count: usize,
    /// The delta actually integrated, after clamping.
    pub dt: f32,
    /// The caller's delta was out of range and got clamped.
    pub dt_clamped: bool,
    /// Nodes whose non-finite state was reset this frame.
    pub repairs: usize,
    /// Engine time after this frame, in seconds.
    pub elapsed: f64,
}

pub trait FrameObserver {
    fn on_reset(&mut self, _mood: Mood, _node_count: usize) {}
    fn on_frame(&mut self, _stats: &FrameStats) {}
}

/// Default observer.
pub struct NoopObserver;

impl FrameObserver for NoopObserver {}

/// Running totals, handy for overlays and tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameCounters {
    pub frames: u64,
    pub resets: u64,
    pub clamped_frames: u64,
    pub repairs: u64,
    pub triangles: u64,
    pub last: Option<FrameStats>,
}

impl FrameObserver for FrameCounters {
    fn on_reset(&mut self, _mood: Mood, _node_count: usize) {
        self.resets += 1;
    }

    fn on_frame(&mut self, stats: &FrameStats) {
        self.frames += 1;
        self.clamped_frames += stats.dt_clamped as u64;
        self.repairs += stats.repairs as u64;
        self.triangles += stats.triangle_count as u64;
        self.last = Some(*stats);
    }
}
