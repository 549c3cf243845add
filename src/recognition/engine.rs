//! Per-frame recognition orchestration
//!
//! [`RecognitionEngine`] runs on the frame-delivery thread and owns the
//! stability detector, the voting queue and the perception capabilities.
//! [`EngineControls`] is the part the embedding application touches from
//! other threads: region of interest, active flag, restart requests and the
//! notification handler.

use crossbeam_channel::{unbounded, Sender};
use image::RgbaImage;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace};

use super::queue::{RecognitionQueue, RecognitionReliability};
use super::state::{RecognitionHandler, RecognitionState};
use crate::capture::{Frame, PreviewSurface};
use crate::error::CropError;
use crate::vision::{
    apply_preprocessing, BlockMatchRegistration, ImageCropper, ImageRegistration,
    OcrPreprocessing, PreviewCropper, RegionOfInterest, RegistrationConfig, StabilityConfig,
    StabilityDetector, StabilityState, TextRecognizer, VideoGravity,
};

/// Recognition engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Votes required before a result is reported
    pub reliability: RecognitionReliability,
    /// Deactivate recognition after each stable result
    pub pause_on_result: bool,
    /// Layout of frames inside the preview, for mapping the region of interest
    pub video_gravity: VideoGravity,
    pub stability: StabilityConfig,
    pub registration: RegistrationConfig,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            reliability: RecognitionReliability::default(),
            pause_on_result: true,
            video_gravity: VideoGravity::default(),
            stability: StabilityConfig::default(),
            registration: RegistrationConfig::default(),
        }
    }
}

/// State shared between the frame thread and the embedding application.
///
/// Every field is a whole-value replacement, so atomics and short
/// read/write locks are enough; nothing here is held across a frame.
/// Notifications are queued to a dedicated notifier thread, so the frame
/// thread never waits for the handler.
pub struct EngineControls {
    active: AtomicBool,
    restart_requested: AtomicBool,
    region_of_interest: RwLock<Option<RegionOfInterest>>,
    preview: RwLock<Option<PreviewSurface>>,
    handler: Arc<RwLock<Option<RecognitionHandler>>>,
    notifications: Sender<RecognitionState>,
    last_state: RwLock<RecognitionState>,
}

impl Default for EngineControls {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineControls {
    /// Controls with recognition active and no region set.
    ///
    /// Starts the notifier thread; it exits once the controls are dropped.
    pub fn new() -> Self {
        let handler: Arc<RwLock<Option<RecognitionHandler>>> = Arc::new(RwLock::new(None));
        let (notifications, pending) = unbounded::<RecognitionState>();

        let notifier_handler = handler.clone();
        std::thread::spawn(move || {
            trace!("Notifier thread starting...");
            for state in pending.iter() {
                // Clone out so the handler runs without holding the lock
                let handler = notifier_handler.read().clone();
                if let Some(handler) = handler {
                    handler(state);
                }
            }
            trace!("Notifier thread exiting...");
        });

        Self {
            active: AtomicBool::new(true),
            restart_requested: AtomicBool::new(false),
            region_of_interest: RwLock::new(None),
            preview: RwLock::new(None),
            handler,
            notifications,
            last_state: RwLock::new(RecognitionState::Unknown),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Pause or resume frame processing. The preview keeps running either way.
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    /// Discard all votes and motion history before the next frame
    pub fn request_restart(&self) {
        self.restart_requested.store(true, Ordering::Release);
    }

    fn take_restart_request(&self) -> bool {
        self.restart_requested.swap(false, Ordering::AcqRel)
    }

    pub fn region_of_interest(&self) -> Option<RegionOfInterest> {
        *self.region_of_interest.read()
    }

    pub fn set_region_of_interest(&self, region: Option<RegionOfInterest>) {
        *self.region_of_interest.write() = region;
    }

    /// Reference coordinate space of the region of interest
    pub fn preview(&self) -> Option<PreviewSurface> {
        *self.preview.read()
    }

    pub fn set_preview(&self, preview: Option<PreviewSurface>) {
        *self.preview.write() = preview;
    }

    pub fn set_handler(&self, handler: Option<RecognitionHandler>) {
        *self.handler.write() = handler;
    }

    /// Most recent notification, `Unknown` before the first one
    pub fn last_state(&self) -> RecognitionState {
        self.last_state.read().clone()
    }

    fn emit(&self, state: RecognitionState) {
        *self.last_state.write() = state.clone();
        if self.notifications.send(state).is_err() {
            debug!("Notifier thread gone, dropping notification");
        }
    }
}

/// Stability-gated OCR with confidence voting
pub struct RecognitionEngine {
    stability: StabilityDetector,
    stability_config: StabilityConfig,
    queue: RecognitionQueue<String>,
    cropper: Box<dyn ImageCropper>,
    recognizer: Box<dyn TextRecognizer>,
    preprocessing: OcrPreprocessing,
    pause_on_result: bool,
    controls: Arc<EngineControls>,
    frames_processed: u64,
}

impl RecognitionEngine {
    /// Create an engine with the block-matching registration and the
    /// gravity-aware preview cropper
    pub fn new(
        settings: &EngineSettings,
        recognizer: Box<dyn TextRecognizer>,
        controls: Arc<EngineControls>,
    ) -> Self {
        let registration = BlockMatchRegistration::new(settings.registration.clone());
        Self {
            stability: StabilityDetector::new(settings.stability.clone(), Box::new(registration)),
            stability_config: settings.stability.clone(),
            queue: RecognitionQueue::from_reliability(settings.reliability),
            cropper: Box::new(PreviewCropper::new(settings.video_gravity)),
            recognizer,
            preprocessing: OcrPreprocessing::default(),
            pause_on_result: settings.pause_on_result,
            controls,
            frames_processed: 0,
        }
    }

    /// Replace the registration capability
    pub fn with_registration(mut self, registration: Box<dyn ImageRegistration>) -> Self {
        self.stability = StabilityDetector::new(self.stability_config.clone(), registration);
        self
    }

    /// Replace the cropping capability
    pub fn with_cropper(mut self, cropper: Box<dyn ImageCropper>) -> Self {
        self.cropper = cropper;
        self
    }

    pub fn with_preprocessing(mut self, preprocessing: OcrPreprocessing) -> Self {
        self.preprocessing = preprocessing;
        self
    }

    pub fn controls(&self) -> Arc<EngineControls> {
        self.controls.clone()
    }

    pub fn queue(&self) -> &RecognitionQueue<String> {
        &self.queue
    }

    pub fn stability(&self) -> &StabilityDetector {
        &self.stability
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Run the per-frame protocol. Never fails: every perception failure
    /// just means this frame adds no information.
    pub fn process_frame(&mut self, frame: &Frame) {
        if self.controls.take_restart_request() {
            debug!("Recognition restarted");
            self.reset();
        }
        self.frames_processed += 1;

        let stability = self.stability.assess(frame);
        let active = self.controls.is_active();
        trace!("Frame {}: {} (active: {})", self.frames_processed, stability, active);

        match (stability, active) {
            (StabilityState::Steady, true) => self.perform_ocr(frame),
            (StabilityState::NotSteady, true) => self.controls.emit(RecognitionState::SceneUnstable),
            (_, false) => {}
        }
    }

    /// Clear the vote table and the motion history
    pub fn reset(&mut self) {
        self.queue.clear();
        self.stability.reset();
    }

    fn perform_ocr(&mut self, frame: &Frame) {
        let cropped = match self.convert_and_crop(frame) {
            Ok(image) => image,
            Err(e) => {
                trace!("Skipping OCR: {}", e);
                return;
            }
        };
        let image = apply_preprocessing(cropped, &self.preprocessing);

        if !self.controls.is_active() {
            return;
        }
        let text = match self.recognizer.recognize(&image) {
            Ok(text) => text,
            Err(e) => {
                debug!("OCR failed: {}", e);
                return;
            }
        };
        if !self.controls.is_active() {
            debug!("Recognition paused during OCR, discarding {:?}", text);
            return;
        }

        self.queue.enqueue(text);
        self.controls.emit(RecognitionState::Recognizing);
        self.evaluate_queue();
    }

    fn convert_and_crop(&self, frame: &Frame) -> Result<RgbaImage, CropError> {
        let region = self.controls.region_of_interest().ok_or(CropError::NoRegion)?;
        let image = frame.upright_image().ok_or(CropError::InvalidFrame)?;
        let (width, height) = image.dimensions();
        let preview = self
            .controls
            .preview()
            .unwrap_or_else(|| PreviewSurface::new(width as f32, height as f32));
        self.cropper.crop(&image, &region, &preview)
    }

    fn evaluate_queue(&mut self) {
        let Some(text) = self.queue.recognized_value().cloned() else {
            return;
        };

        info!("Stably recognized {:?}", text);
        self.reset();
        if self.pause_on_result {
            self.controls.set_active(false);
        }
        self.controls.emit(RecognitionState::StablyRecognized { text });
    }
}
