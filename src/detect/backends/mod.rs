pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use stub::{StubBackend, DEMO_SCENE};

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;
