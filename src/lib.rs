//! capdriver: CAPTCHA solving automation.
//!
//! Three layers, leaf-first:
//!
//! - [`solver`]: clients for third-party solving services (HTTP, persistent
//!   socket, 2Captcha-style JSON), plus the upload-then-poll decode loop.
//! - [`resolver`]: turns challenge screenshots into tap coordinates. It
//!   shrinks images to the service's byte budget, decodes coordinate-list
//!   answers, and rescales them back to screen space.
//! - [`ui`]: a WebDriver/Appium adapter and the iterative state walk that
//!   drives a live challenge (FunCaptcha or reCAPTCHA flavor) to completion.

pub mod config;
pub mod error;
pub mod resolver;
pub mod solver;
pub mod ui;

pub use config::Config;
pub use error::{CapdriverError, Result};
