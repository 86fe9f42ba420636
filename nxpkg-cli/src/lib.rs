//! Pipeline driver and metadata patch passes for the `nxpkg` binary.

pub mod error;
pub mod nacp;
pub mod npdm;
pub mod pipeline;
pub mod settings;

pub use error::PipelineError;
pub use settings::BuildSettings;
