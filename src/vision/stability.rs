//! Scene stability detection
//!
//! Frames are registered pairwise and the resulting translation is kept in a
//! short FIFO history. The scene counts as steady once the history is full
//! and its mean displacement is small, so a single still frame in the middle
//! of a pan never passes.

use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, trace};

use super::registration::ImageRegistration;
use crate::capture::Frame;

/// Displacements (not frames) required before a scene can be steady; the
/// first frame only sets the reference, so a still scene is steady on frame 16
pub const DEFAULT_HISTORY_LENGTH: usize = 15;

/// Mean |dx| + |dy| (pixels) below which a full history counts as steady
pub const DEFAULT_MAX_MEAN_DISPLACEMENT: f32 = 100.0;

/// Result of a stability assessment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilityState {
    Steady,
    NotSteady,
}

impl fmt::Display for StabilityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StabilityState::Steady => write!(f, "Steady"),
            StabilityState::NotSteady => write!(f, "Not Steady"),
        }
    }
}

/// Translation between two consecutive frames, in frame pixels
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Displacement {
    pub x: f32,
    pub y: f32,
}

impl Displacement {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// |x| + |y|
    pub fn manhattan(&self) -> f32 {
        self.x.abs() + self.y.abs()
    }
}

/// Bounded FIFO of recent frame-to-frame displacements
#[derive(Debug, Clone)]
pub struct TranspositionHistory {
    points: VecDeque<Displacement>,
    capacity: usize,
}

impl TranspositionHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a point, evicting the oldest beyond capacity
    pub fn record(&mut self, point: Displacement) {
        self.points.push_back(point);
        while self.points.len() > self.capacity {
            self.points.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.points.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Displacement> {
        self.points.iter()
    }

    /// Component-wise mean, or None when empty
    pub fn mean(&self) -> Option<Displacement> {
        if self.points.is_empty() {
            return None;
        }
        let n = self.points.len() as f32;
        let (sx, sy) = self
            .points
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        Some(Displacement::new(sx / n, sy / n))
    }
}

/// Stability detector settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
    /// Displacements kept (and required) before declaring a steady scene
    pub history_length: usize,
    /// Exclusive upper bound on |mean dx| + |mean dy|
    pub max_mean_displacement: f32,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            history_length: DEFAULT_HISTORY_LENGTH,
            max_mean_displacement: DEFAULT_MAX_MEAN_DISPLACEMENT,
        }
    }
}

/// Classifies consecutive frames as steady or not
pub struct StabilityDetector {
    config: StabilityConfig,
    registration: Box<dyn ImageRegistration>,
    history: TranspositionHistory,
    /// Luminance of the last successfully registered frame
    previous: Option<GrayImage>,
    frames_assessed: u64,
}

impl StabilityDetector {
    pub fn new(config: StabilityConfig, registration: Box<dyn ImageRegistration>) -> Self {
        let history = TranspositionHistory::new(config.history_length.max(1));
        Self {
            config,
            registration,
            history,
            previous: None,
            frames_assessed: 0,
        }
    }

    /// Assess a camera frame against the previous one
    pub fn assess(&mut self, frame: &Frame) -> StabilityState {
        match frame.luma() {
            Some(luma) => self.assess_luma(luma),
            None => {
                debug!("Frame buffer does not match its dimensions");
                StabilityState::NotSteady
            }
        }
    }

    /// Assess a luminance plane against the previous one
    pub fn assess_luma(&mut self, current: GrayImage) -> StabilityState {
        self.frames_assessed += 1;

        let Some(previous) = &self.previous else {
            self.restart_from(current);
            return StabilityState::NotSteady;
        };

        // A new frame size breaks continuity with the recorded motion
        if previous.dimensions() != current.dimensions() {
            debug!(
                "Frame size changed from {:?} to {:?}, restarting stability tracking",
                previous.dimensions(),
                current.dimensions()
            );
            self.restart_from(current);
            return StabilityState::NotSteady;
        }

        let displacement = match self.registration.register_translation(previous, &current) {
            Ok(displacement) => displacement,
            Err(e) => {
                debug!("Frame registration failed: {}", e);
                return StabilityState::NotSteady;
            }
        };

        self.previous = Some(current);
        self.history.record(displacement);
        trace!(
            "Frame {} displacement ({:.1}, {:.1}), history {}/{}",
            self.frames_assessed,
            displacement.x,
            displacement.y,
            self.history.len(),
            self.history.capacity()
        );

        if self.scene_stability_achieved() {
            StabilityState::Steady
        } else {
            StabilityState::NotSteady
        }
    }

    fn restart_from(&mut self, reference: GrayImage) {
        self.previous = Some(reference);
        self.history.clear();
    }

    /// Forget the reference frame and all recorded motion
    pub fn reset(&mut self) {
        self.previous = None;
        self.history.clear();
    }

    pub fn history(&self) -> &TranspositionHistory {
        &self.history
    }

    /// Whether a reference frame is available for the next assessment
    pub fn is_tracking(&self) -> bool {
        self.previous.is_some()
    }

    pub fn frames_assessed(&self) -> u64 {
        self.frames_assessed
    }

    fn scene_stability_achieved(&self) -> bool {
        if !self.history.is_full() {
            return false;
        }
        self.history
            .mean()
            .map(|mean| mean.manhattan() < self.config.max_mean_displacement)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistrationError;
    use crate::vision::registration::tests::textured;
    use crate::vision::BlockMatchRegistration;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Replays scripted registration results
    struct ScriptedRegistration {
        script: Arc<Mutex<VecDeque<Result<Displacement, ()>>>>,
    }

    impl ImageRegistration for ScriptedRegistration {
        fn register_translation(
            &mut self,
            _reference: &GrayImage,
            _current: &GrayImage,
        ) -> Result<Displacement, RegistrationError> {
            match self.script.lock().pop_front() {
                Some(Ok(d)) => Ok(d),
                Some(Err(())) => Err(RegistrationError::TooSmall { width: 0, height: 0 }),
                None => Ok(Displacement::default()),
            }
        }
    }

    fn detector(script: Vec<Result<Displacement, ()>>) -> StabilityDetector {
        let registration = ScriptedRegistration {
            script: Arc::new(Mutex::new(script.into())),
        };
        StabilityDetector::new(StabilityConfig::default(), Box::new(registration))
    }

    fn luma() -> GrayImage {
        GrayImage::new(4, 4)
    }

    #[test]
    fn test_first_frame_is_never_steady() {
        let mut detector = detector(vec![]);
        assert_eq!(detector.assess_luma(luma()), StabilityState::NotSteady);
        assert!(detector.history().is_empty());
        assert!(detector.is_tracking());
    }

    #[test]
    fn test_short_sequences_never_steady() {
        let mut detector = detector(vec![]);
        // First frame plus 14 registrations: history one short of the bound
        for _ in 0..15 {
            assert_eq!(detector.assess_luma(luma()), StabilityState::NotSteady);
        }
        assert_eq!(detector.history().len(), 14);
    }

    #[test]
    fn test_full_still_history_is_steady() {
        let mut detector = detector(vec![]);
        for _ in 0..15 {
            detector.assess_luma(luma());
        }
        assert_eq!(detector.assess_luma(luma()), StabilityState::Steady);
        assert_eq!(detector.history().len(), 15);
    }

    #[test]
    fn test_large_mean_displacement_not_steady() {
        let script = (0..15).map(|_| Ok(Displacement::new(60.0, -40.0))).collect();
        let mut detector = detector(script);
        for _ in 0..16 {
            assert_eq!(detector.assess_luma(luma()), StabilityState::NotSteady);
        }
        assert!(detector.history().is_full());
    }

    #[test]
    fn test_mean_just_below_threshold_is_steady() {
        let script = (0..15).map(|_| Ok(Displacement::new(50.0, 49.0))).collect();
        let mut detector = detector(script);
        let mut last = StabilityState::NotSteady;
        for _ in 0..16 {
            last = detector.assess_luma(luma());
        }
        assert_eq!(last, StabilityState::Steady);
    }

    #[test]
    fn test_registration_failure_leaves_history_untouched() {
        let mut detector = detector(vec![Ok(Displacement::new(1.0, 1.0)), Err(())]);
        detector.assess_luma(luma());
        detector.assess_luma(luma());
        assert_eq!(detector.history().len(), 1);

        assert_eq!(detector.assess_luma(luma()), StabilityState::NotSteady);
        assert_eq!(detector.history().len(), 1);
    }

    #[test]
    fn test_reset_requires_new_reference() {
        let mut detector = detector(vec![]);
        for _ in 0..16 {
            detector.assess_luma(luma());
        }
        detector.reset();
        assert!(detector.history().is_empty());
        assert!(!detector.is_tracking());
        assert_eq!(detector.assess_luma(luma()), StabilityState::NotSteady);
    }

    #[test]
    fn test_history_evicts_oldest_first() {
        let mut history = TranspositionHistory::new(15);
        for i in 0..16 {
            history.record(Displacement::new(i as f32, 0.0));
        }
        assert_eq!(history.len(), 15);
        assert_eq!(history.iter().next().unwrap().x, 1.0);
        assert_eq!(history.iter().last().unwrap().x, 15.0);
    }

    #[test]
    fn test_history_mean() {
        let mut history = TranspositionHistory::new(4);
        assert!(history.mean().is_none());
        history.record(Displacement::new(2.0, -4.0));
        history.record(Displacement::new(4.0, 0.0));
        let mean = history.mean().unwrap();
        assert!((mean.x - 3.0).abs() < 1e-6);
        assert!((mean.y + 2.0).abs() < 1e-6);
        assert!((mean.manhattan() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_frame_size_change_restarts_tracking() {
        let mut detector = detector(vec![]);
        for _ in 0..16 {
            detector.assess_luma(luma());
        }
        assert!(detector.history().is_full());

        let larger = GrayImage::new(8, 8);
        assert_eq!(detector.assess_luma(larger.clone()), StabilityState::NotSteady);
        assert!(detector.history().is_empty());
        assert!(detector.is_tracking());

        for _ in 0..14 {
            assert_eq!(detector.assess_luma(larger.clone()), StabilityState::NotSteady);
        }
        assert_eq!(detector.assess_luma(larger), StabilityState::Steady);
    }

    #[test]
    fn test_unreadable_frame_not_steady() {
        let mut detector = detector(vec![]);
        let frame = Frame::new(vec![0; 3], 4, 4);
        assert_eq!(detector.assess(&frame), StabilityState::NotSteady);
        assert!(!detector.is_tracking());
    }

    fn block_matching_detector() -> StabilityDetector {
        StabilityDetector::new(
            StabilityConfig::default(),
            Box::new(BlockMatchRegistration::default()),
        )
    }

    #[test]
    fn test_fast_pan_never_steady() {
        let mut detector = block_matching_detector();
        for i in 0..20 {
            let frame = textured(480, 360, 24, (60 * i, 60 * i));
            assert_eq!(
                detector.assess_luma(frame),
                StabilityState::NotSteady,
                "frame {}",
                i + 1
            );
        }
        let mean = detector.history().mean().unwrap();
        assert!(mean.manhattan() >= 100.0, "mean = {:?}", mean);
    }

    #[test]
    fn test_pan_beyond_search_range_never_steady() {
        let mut detector = block_matching_detector();
        for i in 0..20 {
            let frame = textured(480, 360, 24, (170 * i, -150 * i));
            assert_eq!(detector.assess_luma(frame), StabilityState::NotSteady);
        }
        assert!(detector.history().is_empty());
    }

    #[test]
    fn test_still_textured_scene_steady_after_resize() {
        let mut detector = block_matching_detector();
        let small = textured(480, 360, 24, (0, 0));
        let mut states = Vec::new();
        for _ in 0..16 {
            states.push(detector.assess_luma(small.clone()));
        }
        assert_eq!(states.last(), Some(&StabilityState::Steady));

        let large = textured(1280, 720, 64, (0, 0));
        let states: Vec<_> = (0..16)
            .map(|_| detector.assess_luma(large.clone()))
            .collect();
        assert!(states[..15].iter().all(|s| *s == StabilityState::NotSteady));
        assert_eq!(states[15], StabilityState::Steady);
    }
}
