//! Deployer
//!
//! Deploys versioned services from packaged deployment specs: releases are
//! recorded in an event-sourced catalog, their spec packages are fetched from
//! wherever the artefacts live and the deploy command runs inside a container.

pub mod app;
pub mod catalog;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod logs;
pub mod publish;
pub mod resolver;
pub mod storage;
pub mod utils;
