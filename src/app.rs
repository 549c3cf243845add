//! Real-time recognition coordinator
//!
//! Wires a camera to the recognition engine: the camera delivers frames
//! through a [`FrameSink`], a background thread runs the per-frame protocol,
//! and the embedding application drives everything through this facade.

use crossbeam_channel::{bounded, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

use crate::capture::{
    CameraQuality, CameraSource, DeviceOrientation, Frame, FrameSink, PreviewSurface,
    VideoOrientation,
};
use crate::config::AppConfig;
use crate::error::CaptureError;
use crate::recognition::{
    EngineControls, RecognitionEngine, RecognitionHandler, RecognitionState,
};
use crate::vision::{RegionOfInterest, TextRecognizer};

/// Camera plus recognition engine, running on its own thread
pub struct RealTimeEngine {
    camera: Box<dyn CameraSource>,
    controls: Arc<EngineControls>,
    /// Delivery channel into the recognition thread
    frame_tx: Option<Sender<Frame>>,
    /// Handle to recognition thread
    worker: Option<JoinHandle<()>>,
}

impl RealTimeEngine {
    /// Start the recognition thread and register it with the camera
    pub fn new(engine: RecognitionEngine, mut camera: Box<dyn CameraSource>) -> Self {
        let controls = engine.controls();
        // One slot: a frame arriving while the previous one is processed is dropped
        let (frame_tx, frame_rx) = bounded::<Frame>(1);
        camera.set_frame_sink(Some(FrameSink::new(frame_tx.clone())));

        let worker = std::thread::spawn(move || {
            info!("Recognition thread starting...");
            let mut engine = engine;
            for frame in frame_rx.iter() {
                engine.process_frame(&frame);
            }
            info!(
                "Recognition thread exiting after {} frames",
                engine.frames_processed()
            );
        });

        Self {
            camera,
            controls,
            frame_tx: Some(frame_tx),
            worker: Some(worker),
        }
    }

    /// Build the engine from configuration
    pub fn from_config(
        config: &AppConfig,
        camera: Box<dyn CameraSource>,
        recognizer: Box<dyn TextRecognizer>,
    ) -> Self {
        let controls = Arc::new(EngineControls::new());
        let engine = RecognitionEngine::new(&config.engine, recognizer, controls)
            .with_preprocessing(config.ocr.preprocessing.clone());

        let mut facade = Self::new(engine, camera);
        facade.set_region_of_interest(config.region);
        facade.set_device_orientation(config.capture.orientation);
        facade
    }

    /// Start the capture session
    pub fn start_preview(&mut self) -> Result<(), CaptureError> {
        self.camera.start()
    }

    /// Stop the capture session
    pub fn stop_preview(&mut self) -> Result<(), CaptureError> {
        self.camera.stop()
    }

    pub fn is_preview_running(&self) -> bool {
        self.camera.is_running()
    }

    /// Detach from the camera and stop it. No more frames are processed.
    pub fn tear_down(&mut self) -> Result<(), CaptureError> {
        debug!("Tearing down capture session");
        self.camera.set_frame_sink(None);
        self.camera.stop()
    }

    /// Attach the preview to a surface; its size becomes the region's coordinate space
    pub fn bind_preview(&mut self, surface: PreviewSurface) {
        self.camera.bind_preview(surface);
        self.controls.set_preview(Some(surface));
    }

    /// Set the area to read. The camera focuses on its center.
    pub fn set_region_of_interest(&mut self, region: Option<RegionOfInterest>) {
        self.controls.set_region_of_interest(region);
        if let Some(region) = region {
            self.camera.set_focus_point(region.mid_point());
        }
    }

    pub fn region_of_interest(&self) -> Option<RegionOfInterest> {
        self.controls.region_of_interest()
    }

    /// Pause or resume recognition; the preview keeps running
    pub fn set_recognition_active(&self, active: bool) {
        self.controls.set_active(active);
    }

    pub fn is_recognition_active(&self) -> bool {
        self.controls.is_active()
    }

    /// Forget all votes and motion history
    pub fn restart_recognition(&self) {
        self.controls.request_restart();
    }

    /// Register (or clear) the lifecycle handler
    pub fn set_handler(&self, handler: Option<RecognitionHandler>) {
        self.controls.set_handler(handler);
    }

    /// Last lifecycle notification
    pub fn current_state(&self) -> RecognitionState {
        self.controls.last_state()
    }

    pub fn camera_quality(&self) -> CameraQuality {
        self.camera.quality()
    }

    pub fn set_camera_quality(&mut self, quality: CameraQuality) -> Result<(), CaptureError> {
        self.camera.set_quality(quality)
    }

    /// Current zoom factor, 1.0 for cameras without zoom
    pub fn zoom_scale(&self) -> f32 {
        self.camera
            .as_zoomable()
            .map(|zoom| zoom.zoom_factor())
            .unwrap_or(1.0)
    }

    /// Request a zoom factor. Ignored without zoom support or outside its range.
    pub fn set_zoom_scale(&mut self, scale: f32) {
        match self.camera.as_zoomable_mut() {
            Some(zoom) => zoom.set_zoom_factor(scale),
            None => debug!("Camera has no zoom, ignoring scale {}", scale),
        }
    }

    /// Reconfigure the camera for the orientation the device is held in
    pub fn set_device_orientation(&mut self, orientation: DeviceOrientation) {
        match VideoOrientation::from_device(orientation) {
            Some(video) => self.camera.set_video_orientation(video),
            None => debug!("No video orientation for {:?}", orientation),
        }
    }

    /// Push a frame from outside the camera. Dropped if the engine is busy.
    pub fn submit_frame(&self, frame: Frame) -> bool {
        match &self.frame_tx {
            Some(tx) => FrameSink::new(tx.clone()).deliver(frame),
            None => false,
        }
    }

    pub fn controls(&self) -> Arc<EngineControls> {
        self.controls.clone()
    }

    pub fn camera(&self) -> &dyn CameraSource {
        self.camera.as_ref()
    }
}

impl Drop for RealTimeEngine {
    fn drop(&mut self) {
        if let Err(e) = self.tear_down() {
            warn!("Failed to stop camera: {}", e);
        }

        // Last sender gone: the recognition thread drains and exits
        self.frame_tx.take();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{ReplayConfig, ReplaySource};
    use crate::error::{OcrError, RegistrationError};
    use crate::recognition::{channel_handler, EngineSettings};
    use crate::vision::{Displacement, ImageRegistration};
    use crossbeam_channel::Receiver;
    use image::{GrayImage, Rgba, RgbaImage};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Debug, Default)]
    struct CameraLog {
        running: bool,
        sink: Option<FrameSink>,
        focus: Option<(f32, f32)>,
        orientation: Option<VideoOrientation>,
        quality: CameraQuality,
        preview: Option<PreviewSurface>,
    }

    /// Camera without zoom that records what it was asked to do
    struct FakeCamera(Arc<Mutex<CameraLog>>);

    impl CameraSource for FakeCamera {
        fn start(&mut self) -> Result<(), CaptureError> {
            self.0.lock().running = true;
            Ok(())
        }

        fn stop(&mut self) -> Result<(), CaptureError> {
            self.0.lock().running = false;
            Ok(())
        }

        fn is_running(&self) -> bool {
            self.0.lock().running
        }

        fn bind_preview(&mut self, surface: PreviewSurface) {
            self.0.lock().preview = Some(surface);
        }

        fn set_frame_sink(&mut self, sink: Option<FrameSink>) {
            self.0.lock().sink = sink;
        }

        fn quality(&self) -> CameraQuality {
            self.0.lock().quality
        }

        fn set_quality(&mut self, quality: CameraQuality) -> Result<(), CaptureError> {
            self.0.lock().quality = quality;
            Ok(())
        }

        fn set_video_orientation(&mut self, orientation: VideoOrientation) {
            self.0.lock().orientation = Some(orientation);
        }

        fn set_focus_point(&mut self, point: (f32, f32)) {
            self.0.lock().focus = Some(point);
        }
    }

    struct StillRegistration;

    impl ImageRegistration for StillRegistration {
        fn register_translation(
            &mut self,
            _reference: &GrayImage,
            _current: &GrayImage,
        ) -> Result<Displacement, RegistrationError> {
            Ok(Displacement::default())
        }
    }

    struct ScriptedOcr(VecDeque<String>);

    impl TextRecognizer for ScriptedOcr {
        fn recognize(&mut self, _image: &RgbaImage) -> Result<String, OcrError> {
            self.0.pop_front().ok_or(OcrError::NoText)
        }
    }

    fn engine_with(
        results: &[&str],
    ) -> (RealTimeEngine, Arc<Mutex<CameraLog>>, Receiver<RecognitionState>) {
        let log = Arc::new(Mutex::new(CameraLog::default()));
        let controls = Arc::new(EngineControls::new());
        let ocr = ScriptedOcr(results.iter().map(|s| s.to_string()).collect());
        let engine = RecognitionEngine::new(&EngineSettings::default(), Box::new(ocr), controls)
            .with_registration(Box::new(StillRegistration));

        let facade = RealTimeEngine::new(engine, Box::new(FakeCamera(log.clone())));
        let (handler, events) = channel_handler();
        facade.set_handler(Some(handler));
        (facade, log, events)
    }

    fn frame() -> Frame {
        Frame::from_image(RgbaImage::from_pixel(32, 32, Rgba([90, 90, 90, 255])))
    }

    fn next_event(events: &Receiver<RecognitionState>) -> RecognitionState {
        events.recv_timeout(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_registers_frame_sink() {
        let (mut facade, log, _events) = engine_with(&[]);
        assert!(log.lock().sink.is_some());

        facade.start_preview().unwrap();
        assert!(facade.is_preview_running());

        facade.tear_down().unwrap();
        assert!(log.lock().sink.is_none());
        assert!(!facade.is_preview_running());
    }

    #[test]
    fn test_camera_frames_reach_engine() {
        let (_facade, log, events) = engine_with(&[]);
        let sink = log.lock().sink.clone().unwrap();

        assert!(sink.deliver(frame()));
        assert_eq!(next_event(&events), RecognitionState::SceneUnstable);
    }

    #[test]
    fn test_end_to_end_noisy_recognition() {
        let (mut facade, _log, events) = engine_with(&["ABC", "ABD", "ABC", "ABC"]);
        facade.set_region_of_interest(Some(RegionOfInterest::new(0.0, 0.0, 16.0, 8.0)));
        assert_eq!(facade.current_state(), RecognitionState::Unknown);

        for _ in 0..15 {
            assert!(facade.submit_frame(frame()));
            assert_eq!(next_event(&events), RecognitionState::SceneUnstable);
        }
        for _ in 0..4 {
            assert!(facade.submit_frame(frame()));
            assert_eq!(next_event(&events), RecognitionState::Recognizing);
        }
        assert_eq!(
            next_event(&events),
            RecognitionState::StablyRecognized {
                text: "ABC".to_string()
            }
        );
        // Paused after the result until the host resumes
        assert!(!facade.is_recognition_active());
        assert!(facade.current_state().is_terminal());
    }

    #[test]
    fn test_region_moves_focus() {
        let (mut facade, log, _events) = engine_with(&[]);
        facade.set_region_of_interest(Some(RegionOfInterest::new(10.0, 20.0, 100.0, 40.0)));
        assert_eq!(log.lock().focus, Some((60.0, 40.0)));
        assert_eq!(
            facade.region_of_interest(),
            Some(RegionOfInterest::new(10.0, 20.0, 100.0, 40.0))
        );

        facade.set_region_of_interest(None);
        assert!(facade.region_of_interest().is_none());
    }

    #[test]
    fn test_bind_preview_updates_controls() {
        let (mut facade, log, _events) = engine_with(&[]);
        let surface = PreviewSurface::new(375.0, 667.0);
        facade.bind_preview(surface);
        assert_eq!(log.lock().preview, Some(surface));
        assert_eq!(facade.controls().preview(), Some(surface));
    }

    #[test]
    fn test_device_orientation() {
        let (mut facade, log, _events) = engine_with(&[]);
        facade.set_device_orientation(DeviceOrientation::LandscapeLeft);
        assert_eq!(log.lock().orientation, Some(VideoOrientation::LandscapeRight));

        // No video orientation for face up: camera left untouched
        facade.set_device_orientation(DeviceOrientation::FaceUp);
        assert_eq!(log.lock().orientation, Some(VideoOrientation::LandscapeRight));
    }

    #[test]
    fn test_quality_and_zoom_without_zoom_support() {
        let (mut facade, _log, _events) = engine_with(&[]);
        facade.set_camera_quality(CameraQuality::High).unwrap();
        assert_eq!(facade.camera_quality(), CameraQuality::High);

        assert_eq!(facade.zoom_scale(), 1.0);
        facade.set_zoom_scale(2.0);
        assert_eq!(facade.zoom_scale(), 1.0);
    }

    #[test]
    fn test_zoom_with_replay_camera() {
        let dir = TempDir::new().unwrap();
        RgbaImage::from_pixel(64, 48, Rgba([0, 0, 0, 255]))
            .save(dir.path().join("0001.png"))
            .unwrap();
        let camera = ReplaySource::open(ReplayConfig {
            directory: dir.path().to_path_buf(),
            ..Default::default()
        })
        .unwrap();

        let controls = Arc::new(EngineControls::new());
        let engine = RecognitionEngine::new(
            &EngineSettings::default(),
            Box::new(ScriptedOcr(VecDeque::new())),
            controls,
        );
        let mut facade = RealTimeEngine::new(engine, Box::new(camera));

        assert_eq!(facade.zoom_scale(), 1.0);
        facade.set_zoom_scale(2.5);
        assert_eq!(facade.zoom_scale(), 2.5);
        // Out of range: ignored
        facade.set_zoom_scale(10.0);
        assert_eq!(facade.zoom_scale(), 2.5);
        facade.set_zoom_scale(1.0);
        assert_eq!(facade.zoom_scale(), 2.5);
    }

    #[test]
    fn test_inactive_engine_is_silent() {
        let (mut facade, _log, events) = engine_with(&["A"]);
        facade.set_region_of_interest(Some(RegionOfInterest::new(0.0, 0.0, 8.0, 8.0)));
        facade.set_recognition_active(false);
        assert!(!facade.is_recognition_active());

        for _ in 0..5 {
            facade.submit_frame(frame());
        }
        assert!(events.recv_timeout(Duration::from_millis(200)).is_err());
        assert_eq!(facade.current_state(), RecognitionState::Unknown);
    }

    #[test]
    fn test_from_config_applies_region_and_orientation() {
        let log = Arc::new(Mutex::new(CameraLog::default()));
        let mut config = AppConfig::default();
        config.region = Some(RegionOfInterest::new(0.0, 0.0, 20.0, 10.0));
        config.capture.orientation = DeviceOrientation::PortraitUpsideDown;

        let facade = RealTimeEngine::from_config(
            &config,
            Box::new(FakeCamera(log.clone())),
            Box::new(ScriptedOcr(VecDeque::new())),
        );

        assert_eq!(facade.region_of_interest(), config.region);
        assert_eq!(log.lock().focus, Some((10.0, 5.0)));
        assert_eq!(
            log.lock().orientation,
            Some(VideoOrientation::PortraitUpsideDown)
        );
    }
}
