//! Deployment module

pub mod docker;
pub mod download;
pub mod extract;
pub mod init;
pub mod packager;
pub mod shim;
pub mod spec;
