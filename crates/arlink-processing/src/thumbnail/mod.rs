pub mod generator;
pub mod scaler;

pub use generator::{SourceKind, ThumbnailGenerator, ThumbnailGeneratorConfig};
pub use scaler::{CliMediaScaler, MediaScaler};
