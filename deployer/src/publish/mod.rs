//! Release publishing

pub mod host;
pub mod release;
pub mod upload;

pub use host::{ReleaseHost, UploadOutcome};
pub use release::{create_oci_image_release, Publisher, ReleaseRequest};
