//! Artwork catalog and background image loading.
//!
//! Every catalog record ends up as exactly one canvas: sized from its image once
//! the decode finishes, or a placeholder when there is no image or it fails.

use std::fmt;
use std::path::PathBuf;

use engine_core::image::{self, DecodedImage, ImageLoadError};
use engine_core::jobs::{JobError, Jobs, JobsConfig, JobsTelemetry};
use engine_core::logging;
use gallery_layout::{ArtworkRecord, FrameSpec};

const TARGET: &str = "artwork";

/// Placeholder colour for an image that failed to load (0x550000).
pub const FAILED_COLOR: [f32; 3] = [0x55 as f32 / 255.0, 0.0, 0.0];
/// Placeholder colour for a record with no image (0x333333).
pub const MISSING_COLOR: [f32; 3] = [0x33 as f32 / 255.0; 3];
/// Placeholder width as a fraction of the canvas height.
pub const PLACEHOLDER_ASPECT: f32 = 0.75;

/// Index into the catalog. Joins a hit object to its record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtworkId(pub usize);

impl fmt::Display for ArtworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
pub enum ArtworkLoadError {
    Image(ImageLoadError),
    Job(JobError),
}

impl fmt::Display for ArtworkLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtworkLoadError::Image(err) => write!(f, "{}", err),
            ArtworkLoadError::Job(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for ArtworkLoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ArtworkLoadError::Image(err) => Some(err),
            ArtworkLoadError::Job(err) => Some(err),
        }
    }
}

impl From<ImageLoadError> for ArtworkLoadError {
    fn from(err: ImageLoadError) -> Self {
        ArtworkLoadError::Image(err)
    }
}

impl From<JobError> for ArtworkLoadError {
    fn from(err: JobError) -> Self {
        ArtworkLoadError::Job(err)
    }
}

/// Immutable list of records built once at start-up.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    records: Vec<ArtworkRecord>,
}

impl Catalog {
    pub fn new(records: Vec<ArtworkRecord>) -> Self {
        Self { records }
    }

    pub fn get(&self, id: ArtworkId) -> Option<&ArtworkRecord> {
        self.records.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ArtworkId, &ArtworkRecord)> + '_ {
        self.records
            .iter()
            .enumerate()
            .map(|(index, record)| (ArtworkId(index), record))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CanvasKind {
    Image,
    LoadFailed,
    NoImage,
}

/// Final size, colour and image of one artwork's box.
#[derive(Clone, Debug, PartialEq)]
pub struct Canvas {
    pub artwork: ArtworkId,
    pub width: f32,
    pub height: f32,
    pub depth: f32,
    /// sRGB, 0..1. The image's mean colour when one loaded.
    pub color: [f32; 3],
    pub kind: CanvasKind,
    pub image: Option<DecodedImage>,
}

impl Canvas {
    pub fn from_image(artwork: ArtworkId, image: DecodedImage, frame: &FrameSpec) -> Self {
        Self {
            artwork,
            width: frame.height * image.aspect_ratio(),
            height: frame.height,
            depth: frame.depth,
            color: image.mean_rgb,
            kind: CanvasKind::Image,
            image: Some(image),
        }
    }

    pub fn load_failed(artwork: ArtworkId, frame: &FrameSpec) -> Self {
        Self::placeholder(artwork, frame, FAILED_COLOR, CanvasKind::LoadFailed)
    }

    pub fn no_image(artwork: ArtworkId, frame: &FrameSpec) -> Self {
        Self::placeholder(artwork, frame, MISSING_COLOR, CanvasKind::NoImage)
    }

    fn placeholder(artwork: ArtworkId, frame: &FrameSpec, color: [f32; 3], kind: CanvasKind) -> Self {
        Self {
            artwork,
            width: frame.height * PLACEHOLDER_ASPECT,
            height: frame.height,
            depth: frame.depth,
            color,
            kind,
            image: None,
        }
    }
}

type LoadResult = Result<DecodedImage, ImageLoadError>;

/// Decodes artwork images off the frame thread. Finished canvases are
/// collected with [`ArtworkLoader::poll`].
pub struct ArtworkLoader {
    jobs: Jobs<ArtworkId, LoadResult>,
    asset_root: PathBuf,
    frame: FrameSpec,
    pending: usize,
}

impl ArtworkLoader {
    pub fn new(config: JobsConfig, asset_root: impl Into<PathBuf>, frame: FrameSpec) -> Self {
        Self {
            jobs: Jobs::new(config),
            asset_root: asset_root.into(),
            frame,
            pending: 0,
        }
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn telemetry(&self) -> JobsTelemetry {
        self.jobs.telemetry()
    }

    /// Starts loading `record`'s image. A canvas is returned straight away when
    /// nothing needs loading or the job could not be queued.
    pub fn request(&mut self, artwork: ArtworkId, record: &ArtworkRecord) -> Option<Canvas> {
        let Some(image_ref) = record.image.as_deref() else {
            logging::debug(
                TARGET,
                format!("{} '{}' has no image, using placeholder", artwork, record.name),
            );
            return Some(Canvas::no_image(artwork, &self.frame));
        };
        let path = self.asset_root.join(image_ref);
        match self.jobs.submit(artwork, move || image::load_image(&path)) {
            Ok(()) => {
                self.pending += 1;
                None
            }
            Err(err) => {
                self.report_failure(artwork, &ArtworkLoadError::Job(err));
                Some(Canvas::load_failed(artwork, &self.frame))
            }
        }
    }

    /// Canvases for every load finished since the last poll.
    pub fn poll(&mut self) -> Vec<Canvas> {
        let completions = self.jobs.drain_completions();
        self.pending = self.pending.saturating_sub(completions.len());
        completions
            .into_iter()
            .map(|completion| {
                let artwork = completion.tag;
                let result = completion
                    .result
                    .map_err(ArtworkLoadError::from)
                    .and_then(|loaded| loaded.map_err(ArtworkLoadError::from));
                match result {
                    Ok(decoded) => {
                        logging::debug(
                            TARGET,
                            format!(
                                "{} loaded {}x{}",
                                artwork, decoded.width, decoded.height
                            ),
                        );
                        Canvas::from_image(artwork, decoded, &self.frame)
                    }
                    Err(err) => {
                        self.report_failure(artwork, &err);
                        Canvas::load_failed(artwork, &self.frame)
                    }
                }
            })
            .collect()
    }

    fn report_failure(&self, artwork: ArtworkId, err: &ArtworkLoadError) {
        logging::warn(
            TARGET,
            format!("{} image load failed, using placeholder: {}", artwork, err),
        );
    }
}
