//! Error types for the zoning pipeline

use fieldzones_cloud::CloudError;
use fieldzones_core::TimeWindow;
use thiserror::Error;

/// Broad category of a pipeline failure, used to pick the user-facing
/// message and the CLI exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unusable boundary upload
    Input,
    /// The imagery service returned nothing usable
    UpstreamEmpty,
    /// Bad zone count or sample data the classifier cannot use
    Parameter,
    /// Another run is in progress
    Busy,
    /// The imagery service failed
    Service,
    /// Report or raster could not be produced or written
    Output,
}

impl ErrorKind {
    /// Recoverable errors are reported as a message and the user may retry
    /// with different inputs.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ErrorKind::Input | ErrorKind::UpstreamEmpty | ErrorKind::Parameter | ErrorKind::Busy)
    }
}

/// Main error type for pipeline runs
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("cannot read boundary archive: {0}")]
    InvalidArchive(String),

    #[error("no boundary found: {0}")]
    NoBoundary(String),

    #[error("boundary has {0} polygons, expected exactly one")]
    MultiplePolygons(usize),

    #[error("invalid boundary: {0}")]
    InvalidBoundary(String),

    #[error("no imagery for {0}")]
    NoImagery(TimeWindow),

    #[error("no valid samples inside the boundary")]
    NoSamples,

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("another zoning run is in progress")]
    Busy,

    #[error("imagery service error: {0}")]
    Service(#[from] CloudError),

    #[error("output error: {0}")]
    Output(String),

    #[error(transparent)]
    Core(#[from] fieldzones_core::Error),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        use fieldzones_core::Error as CoreError;

        match self {
            PipelineError::InvalidArchive(_)
            | PipelineError::NoBoundary(_)
            | PipelineError::MultiplePolygons(_)
            | PipelineError::InvalidBoundary(_) => ErrorKind::Input,
            PipelineError::NoImagery(_) | PipelineError::NoSamples => ErrorKind::UpstreamEmpty,
            PipelineError::InvalidParameter { .. } => ErrorKind::Parameter,
            PipelineError::Busy => ErrorKind::Busy,
            PipelineError::Service(_) => ErrorKind::Service,
            PipelineError::Output(_) => ErrorKind::Output,
            PipelineError::Core(e) => match e {
                CoreError::InvalidGeometry(_)
                | CoreError::UnsupportedCrs(_)
                | CoreError::Archive(_)
                | CoreError::Shapefile(_) => ErrorKind::Input,
                CoreError::InvalidParameter { .. } | CoreError::Algorithm(_) => ErrorKind::Parameter,
                _ => ErrorKind::Output,
            },
        }
    }

    /// Short message suitable for showing to the person running the tool.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::InvalidArchive(detail) => {
                format!("The uploaded file is not a readable zip archive ({}).", detail)
            }
            PipelineError::NoBoundary(_) => {
                "No field boundary was found. Upload a zip containing a polygon shapefile (.shp with .shx, .dbf and .prj)."
                    .to_string()
            }
            PipelineError::MultiplePolygons(n) => format!(
                "The shapefile contains {} polygons. Upload a single field boundary.",
                n
            ),
            PipelineError::InvalidBoundary(detail) => format!("The field boundary is not valid: {}.", detail),
            PipelineError::NoImagery(window) => format!(
                "No satellite images cover the field between {}. Try a longer period.",
                window
            ),
            PipelineError::NoSamples => {
                "No cloud-free pixels were found inside the field. Try a different period.".to_string()
            }
            PipelineError::InvalidParameter { name, reason } => format!("Invalid {}: {}.", name, reason),
            PipelineError::Busy => "A zoning run is already in progress. Wait for it to finish.".to_string(),
            PipelineError::Service(e) => format!("The imagery service failed: {}.", e),
            PipelineError::Output(detail) => format!("Could not write the results: {}.", detail),
            PipelineError::Core(e) => match self.kind() {
                ErrorKind::Input => format!("The field boundary is not valid: {}.", e),
                ErrorKind::Parameter => format!("The samples cannot be zoned: {}.", e),
                _ => format!("Unexpected error: {}.", e),
            },
        }
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
