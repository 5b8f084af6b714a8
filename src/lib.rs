//! Library crate for cert-archiver exposing reusable modules.
pub mod collector;
pub mod completion;
pub mod config;
pub mod extract;
pub mod fingerprint;
pub mod hosts;
pub mod logging;
pub mod net;
pub mod progress;
pub mod scanner;
pub mod store;
pub mod types;
