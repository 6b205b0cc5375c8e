#![allow(dead_code)]

use fleetdesk::models::{InstallationRequest, Provider, ProviderLocation};
use fleetdesk::provision::{validate_install_form, RawInstallForm};

pub fn acme() -> Provider {
    Provider {
        id: 1,
        name: "Acme".into(),
    }
}

pub fn bucharest() -> ProviderLocation {
    ProviderLocation {
        id: 7,
        provider_id: 1,
        continent: "Europe".into(),
        country: "Romania".into(),
        country_code: "RO".into(),
        state: None,
        city: "Bucharest".into(),
        data_center: "BUH1".into(),
        latitude: 44.4268,
        longitude: 26.1025,
    }
}

pub fn valid_form() -> RawInstallForm {
    RawInstallForm {
        ipv4: Some("10.0.0.5".into()),
        ipv6: None,
        port: Some("22".into()),
        username: Some("root".into()),
        password: Some("x".into()),
        contact_person: Some("Ana Pop".into()),
        contact_phone: Some("0712345678".into()),
        address: Some("Str. Exemplu 1".into()),
        hardware_id: None,
    }
}

pub fn valid_request() -> InstallationRequest {
    validate_install_form(&valid_form(), Some(&acme()), Some(&bucharest()))
        .expect("fixture form is valid")
}
