pub mod compiler;
pub mod generator;

pub use compiler::{CliMarkerCompiler, MarkerCompiler};
pub use generator::{MarkerGenerator, MarkerGeneratorConfig, MarkerOutcome};
