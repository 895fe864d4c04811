//! Locator tables and behavioral flags for the shipped challenge variants.
//!
//! The two flavors walk the same five states; they differ only in which
//! elements they probe and in a few textual checks.

use std::time::Duration;

use super::driver::Locator;

/// One challenge flavor: which elements to probe and how the walk behaves.
#[derive(Debug, Clone)]
pub struct VariantSpec {
    pub name: &'static str,

    /// Controls that start (or restart) the challenge, tried in order.
    pub start_controls: Vec<Locator>,
    /// Probe identifying the image-challenge page.
    pub challenge_probe: Locator,
    /// Element whose region is captured and sent to the oracle.
    pub challenge_image: Locator,
    /// Swaps the current image set for a new one.
    pub reload_control: Locator,
    /// "Try again" control on the wrong-result page, where the flavor has one.
    pub try_again_control: Option<Locator>,
    /// Rate-limit / cannot-contact dialog: probe plus its dismiss control.
    pub error_dialog: Option<(Locator, Locator)>,
    /// Transient checking/loading page probe.
    pub loading_probe: Option<Locator>,
    /// Control submitting the tapped selection.
    pub submit_control: Option<Locator>,
    /// Control finishing a verified challenge.
    pub continue_control: Option<Locator>,
    /// Tip element announcing another round of images.
    pub more_images_tip: Option<Locator>,

    /// Report an explicitly blank answer as incorrect (no skip control).
    pub report_blank: bool,
    pub tap_interval: Duration,
    /// Reduction factor applied before the first upload attempt.
    pub initial_reduction: f64,
    /// Walk result when no known page matches anymore.
    pub success_on_fallthrough: bool,
}

/// FunCaptcha-style image-grid challenge.
pub fn funcaptcha() -> VariantSpec {
    VariantSpec {
        name: "funcaptcha",
        start_controls: vec![
            Locator::xpath(r#"//android.view.View[@resource-id="home_children_button"]"#),
            Locator::xpath(r#"//android.widget.Button[@resource-id="home_children_button"]"#),
            Locator::xpath(r#"//android.widget.Button[@resource-id="verifyButton"]"#),
        ],
        challenge_probe: Locator::xpath(
            r#"//android.view.View[@resource-id="game_children_wrapper"]"#,
        ),
        challenge_image: Locator::xpath(
            r#"//android.view.View[@resource-id="game_children_wrapper"]"#,
        ),
        reload_control: Locator::xpath(
            r#"//android.view.View[@resource-id="fc-iframe-wrap"]/android.view.View/android.view.View/android.view.View[3]/android.view.View[2]/android.widget.Button[1]"#,
        ),
        try_again_control: Some(Locator::xpath(
            r#"//android.view.View[@resource-id="wrong_children_button"]"#,
        )),
        error_dialog: None,
        loading_probe: Some(Locator::xpath(
            r#"//android.widget.Image[@resource-id="checking_children_loadingImg"]"#,
        )),
        submit_control: None,
        continue_control: None,
        more_images_tip: None,
        report_blank: true,
        tap_interval: Duration::from_secs(2),
        initial_reduction: 1.0,
        success_on_fallthrough: true,
    }
}

/// reCAPTCHA-style single-image challenge with an optional sample.
pub fn recaptcha() -> VariantSpec {
    let form = r#"//android.view.View[@resource-id="rc-imageselect"]"#;

    VariantSpec {
        name: "recaptcha",
        start_controls: vec![Locator::xpath(
            r#"//android.widget.CheckBox[@resource-id="recaptcha-anchor"]"#,
        )],
        challenge_probe: Locator::xpath(
            r#"//android.widget.Button[@resource-id="recaptcha-verify-button"]"#,
        ),
        challenge_image: Locator::xpath(form),
        reload_control: Locator::xpath(
            r#"//android.widget.Button[@resource-id="recaptcha-reload-button"]"#,
        ),
        try_again_control: None,
        error_dialog: Some((
            Locator::id("android:id/alertTitle"),
            Locator::id("android:id/button1"),
        )),
        loading_probe: None,
        submit_control: Some(Locator::xpath(
            r#"//android.widget.Button[@resource-id="recaptcha-verify-button"]"#,
        )),
        continue_control: Some(Locator::xpath(
            r#"//android.widget.Button[@resource-id="continue_button"]"#,
        )),
        more_images_tip: Some(Locator::xpath(&format!(
            "{form}/android.view.View[3]/android.view.View"
        ))),
        report_blank: false,
        tap_interval: Duration::from_secs(4),
        initial_reduction: 2.0,
        success_on_fallthrough: false,
    }
}
