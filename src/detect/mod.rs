mod backend;
mod backends;
mod labels;
mod registry;
mod result;

pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use labels::coco_label;
pub use registry::{BackendRegistry, SharedBackend};
pub use result::Detection;
