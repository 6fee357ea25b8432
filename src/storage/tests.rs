//! Unit tests for object storage helpers.

use rstest::rstest;
use s3::Region;

use super::*;
use crate::config::ScalewayConfig;

fn config(access_key: Option<&str>, zone: &str) -> ScalewayConfig {
    ScalewayConfig {
        access_key: access_key.map(str::to_owned),
        secret_key: String::from("secret"),
        default_organization_id: None,
        default_project_id: String::from("project"),
        default_zone: zone.to_owned(),
        default_instance_type: String::from("DEV1-S"),
        default_image: String::from("Ubuntu 24.04 Noble Numbat"),
        default_architecture: String::from("x86_64"),
    }
}

#[rstest]
#[case("fr-par-1", "fr-par")]
#[case("nl-ams-3", "nl-ams")]
#[case("pl-waw", "pl-waw")]
#[case("fr-par-x", "fr-par-x")]
fn region_strips_zone_number(#[case] zone: &str, #[case] expected: &str) {
    assert_eq!(region_for_zone(zone), expected);
}

#[test]
fn endpoint_targets_regional_host() {
    assert_eq!(endpoint_for("nl-ams"), "https://s3.nl-ams.scw.cloud");
}

#[test]
fn client_uses_region_of_default_zone() {
    let storage = ScalewayObjectStorage::from_config(&config(Some("SCWACCESS"), "nl-ams-1"))
        .expect("keys are present");

    assert_eq!(
        storage.region(),
        &Region::Custom {
            region: String::from("nl-ams"),
            endpoint: String::from("https://s3.nl-ams.scw.cloud"),
        }
    );
}

#[test]
fn client_requires_access_key() {
    let err = ScalewayObjectStorage::from_config(&config(None, "fr-par-1"))
        .expect_err("access key is missing");

    assert!(matches!(err, StorageError::Config(_)));
    assert!(err.to_string().contains("SCW_ACCESS_KEY"));
}
