pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use stub::StubLocator;

#[cfg(feature = "backend-tract")]
pub use tract::TractLocator;
