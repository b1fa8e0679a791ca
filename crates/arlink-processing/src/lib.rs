//! Arlink Processing Library
//!
//! Turns uploaded source photos into AR tracking markers and preview
//! thumbnails. The external compiling/scaling tools are injected behind the
//! `MarkerCompiler` and `MediaScaler` capability traits so the technology can
//! be swapped without touching the pipeline logic.

pub mod marker;
pub mod thumbnail;
pub mod validate;

pub use marker::{
    CliMarkerCompiler, MarkerCompiler, MarkerGenerator, MarkerGeneratorConfig, MarkerOutcome,
};
pub use thumbnail::{
    CliMediaScaler, MediaScaler, SourceKind, ThumbnailGenerator, ThumbnailGeneratorConfig,
};
pub use validate::validate_source_image;
