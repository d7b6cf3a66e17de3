use log::info;
use opencv::{
    core::{Mat, Rect, Size, Vector},
    imgproc,
    objdetect::{self, CascadeClassifier},
    prelude::*,
    videoio::{self, VideoCapture},
};

use rig_core::config::CameraConfig;
use rig_core::ports::{TargetLocator, VideoSource};
use rig_core::{Region, RigError, RigResult};

fn video_err(e: opencv::Error) -> RigError {
    RigError::VideoSource(e.to_string())
}

fn detector_err(e: opencv::Error) -> RigError {
    RigError::Detector(e.to_string())
}

pub struct CameraSource {
    cap: VideoCapture,
}

impl CameraSource {
    pub fn open(config: &CameraConfig) -> RigResult<Self> {
        let mut cap = VideoCapture::new(config.device_index, videoio::CAP_ANY).map_err(video_err)?;
        if !cap.is_opened().map_err(video_err)? {
            return Err(RigError::VideoSource(format!(
                "could not open camera {}",
                config.device_index
            )));
        }
        cap.set(videoio::CAP_PROP_FRAME_WIDTH, config.width as f64)
            .map_err(video_err)?;
        cap.set(videoio::CAP_PROP_FRAME_HEIGHT, config.height as f64)
            .map_err(video_err)?;

        info!(
            "Camera {} opened at {}x{}",
            config.device_index, config.width, config.height
        );
        Ok(Self { cap })
    }
}

impl VideoSource for CameraSource {
    type Frame = Mat;

    fn read_frame(&mut self) -> RigResult<Option<Mat>> {
        let mut frame = Mat::default();
        let grabbed = self.cap.read(&mut frame).map_err(video_err)?;
        if !grabbed || frame.empty() {
            return Ok(None);
        }
        Ok(Some(frame))
    }
}

/// Haar cascade face detector.
pub struct CascadeLocator {
    classifier: CascadeClassifier,
    scale_factor: f64,
    min_neighbors: i32,
    min_size: Size,
}

impl CascadeLocator {
    pub fn load(config: &CameraConfig) -> RigResult<Self> {
        let path = config.cascade_path.to_string_lossy();
        let classifier = CascadeClassifier::new(&path).map_err(detector_err)?;
        if classifier.empty().map_err(detector_err)? {
            return Err(RigError::Detector(format!(
                "could not load face cascade classifier [{}]",
                path
            )));
        }

        Ok(Self {
            classifier,
            scale_factor: config.scale_factor,
            min_neighbors: config.min_neighbors,
            min_size: Size::new(config.min_face_px, config.min_face_px),
        })
    }
}

impl TargetLocator<Mat> for CascadeLocator {
    fn locate(&mut self, frame: &Mat) -> RigResult<Vec<Region>> {
        let mut gray = Mat::default();
        imgproc::cvt_color_def(frame, &mut gray, imgproc::COLOR_BGR2GRAY).map_err(detector_err)?;
        let mut equalized = Mat::default();
        imgproc::equalize_hist(&gray, &mut equalized).map_err(detector_err)?;

        let mut faces: Vector<Rect> = Vector::new();
        self.classifier
            .detect_multi_scale(
                &equalized,
                &mut faces,
                self.scale_factor,
                self.min_neighbors,
                objdetect::CASCADE_SCALE_IMAGE,
                self.min_size,
                Size::new(0, 0),
            )
            .map_err(detector_err)?;

        Ok(faces
            .iter()
            .map(|r| Region::new(r.x, r.y, r.width, r.height))
            .collect())
    }
}
