//! Mobile UI automation: driver contract, Appium adapter, and the
//! challenge state walk.

pub mod appium;
pub mod driver;
pub mod locators;
pub mod walker;

pub use appium::AppiumClient;
pub use driver::{By, Locator, UiDriver, UiElement};
pub use locators::VariantSpec;
pub use walker::{ChallengeState, ChallengeWalker, WalkLimits};
