//! Tests for locator rendering and device profiles.

use rstest::rstest;

use super::{DeviceProfile, DriverError, Locator, MatchRule, Widget};

fn profile() -> DeviceProfile {
    DeviceProfile {
        platform: String::from("android"),
        device_name: String::from("device"),
        app_package: String::from("dji.go.v4"),
        app_activity: String::from("dji.pilot.main.activity.DJILauncherActivity"),
        app_wait_activity: String::from("dji.pilot2.main.activity.DJIMainFragmentActivity"),
        app_path: String::from("/opt/apps/pilot.apk"),
    }
}

#[rstest]
#[case(
    Locator::new(Widget::Button, MatchRule::TextEquals(String::from("Login"))),
    "//android.widget.Button[@text='Login']"
)]
#[case(
    Locator::new(
        Widget::EditText,
        MatchRule::TextContains(String::from("verification code"))
    ),
    "//android.widget.EditText[contains(@text, 'verification code')]"
)]
#[case(
    Locator::new(
        Widget::TextView,
        MatchRule::ResourceIdContains(String::from("dialog_title"))
    ),
    "//android.widget.TextView[contains(@resource-id, 'dialog_title')]"
)]
#[case(
    Locator::new(
        Widget::ImageView,
        MatchRule::ResourceIdEquals(String::from("dji.go.v4:id/main_device_more"))
    ),
    "//android.widget.ImageView[@resource-id='dji.go.v4:id/main_device_more']"
)]
fn locators_render_wire_xpath(#[case] locator: Locator, #[case] expected: &str) {
    assert_eq!(locator.to_xpath(), expected);
}

#[test]
fn empty_editable_locator_matches_blank_text() {
    let locator = Locator::new(Widget::EditText, MatchRule::TextEquals(String::new()));
    assert_eq!(locator.to_xpath(), "//android.widget.EditText[@text='']");
}

#[test]
fn valid_profile_passes_validation() {
    assert!(profile().validate().is_ok());
}

#[test]
fn blank_profile_field_is_named() {
    let mut broken = profile();
    broken.app_wait_activity = String::from("  ");
    let err = broken.validate().expect_err("blank field should fail");
    assert!(
        matches!(err, DriverError::Profile { ref field } if field == "app_wait_activity"),
        "unexpected error: {err}"
    );
}
