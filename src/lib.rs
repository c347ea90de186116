//! Image-to-text transform worker that drives an external OCR command-line
//! tool (Tesseract by default).
//!
//! [`worker::TransformWorker`] is the entry point a host pipeline talks to.

pub mod availability;
pub mod cli;
pub mod command;
pub mod config;
pub mod content;
pub mod error;
pub mod executor;
pub mod mimetype;
pub mod util;
pub mod worker;

pub use error::{ExecError, TemplateError, TransformError};
pub use worker::TransformWorker;
