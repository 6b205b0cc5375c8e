use std::net::{Ipv4Addr, Ipv6Addr};

use serde::Deserialize;

use crate::models::{
    Credentials, InstallationRequest, Provider, ProviderLocation, SiteContact, DEFAULT_SSH_PORT,
};

use super::error::ValidationError;

pub const CONTACT_PHONE_LEN: usize = 10;
pub const CONTACT_PERSON_MIN: usize = 2;
pub const CONTACT_PERSON_MAX: usize = 20;

/// Field values exactly as the operator typed them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawInstallForm {
    pub ipv4: Option<String>,
    pub ipv6: Option<String>,
    pub port: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub contact_person: Option<String>,
    pub contact_phone: Option<String>,
    pub address: Option<String>,
    pub hardware_id: Option<String>,
}

fn trimmed(value: &Option<String>) -> &str {
    value.as_deref().map(str::trim).unwrap_or("")
}

/// Strict dotted-quad: four decimal octets, no leading zeros, nothing else.
pub fn parse_strict_ipv4(raw: &str) -> Option<Ipv4Addr> {
    let parts: Vec<&str> = raw.split('.').collect();
    if parts.len() != 4 {
        return None;
    }
    let mut octets = [0u8; 4];
    for (slot, part) in octets.iter_mut().zip(&parts) {
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if part.len() > 1 && part.starts_with('0') {
            return None;
        }
        *slot = part.parse().ok()?;
    }
    Some(Ipv4Addr::from(octets))
}

pub fn parse_ipv6(raw: &str) -> Option<Ipv6Addr> {
    if raw.contains('%') {
        return None;
    }
    raw.parse().ok()
}

fn parse_port(raw: &Option<String>, errors: &mut ValidationError) -> u16 {
    let Some(value) = raw else {
        return DEFAULT_SSH_PORT;
    };
    let value = value.trim();
    if value.is_empty() {
        errors.insert("port", "Port is required");
        return DEFAULT_SSH_PORT;
    }
    if !value.bytes().all(|b| b.is_ascii_digit()) {
        errors.insert("port", "Port must be numeric");
        return DEFAULT_SSH_PORT;
    }
    match value.parse::<u16>() {
        Ok(p) if p > 0 => p,
        _ => {
            errors.insert("port", "Port must be between 1 and 65535");
            DEFAULT_SSH_PORT
        }
    }
}

/// Check every field and build a request, or report all failing fields.
///
/// Provider and location must already be resolved objects; a bare id is
/// never accepted here.
pub fn validate_install_form(
    form: &RawInstallForm,
    provider: Option<&Provider>,
    location: Option<&ProviderLocation>,
) -> Result<InstallationRequest, ValidationError> {
    let mut errors = ValidationError::default();

    let ipv4_raw = trimmed(&form.ipv4);
    let ipv4 = if ipv4_raw.is_empty() {
        errors.insert("ipv4", "IPv4 address is required");
        None
    } else {
        let parsed = parse_strict_ipv4(ipv4_raw);
        if parsed.is_none() {
            errors.insert("ipv4", "Invalid IPv4 address");
        }
        parsed
    };

    let ipv6_raw = trimmed(&form.ipv6);
    let ipv6 = if ipv6_raw.is_empty() {
        None
    } else {
        let parsed = parse_ipv6(ipv6_raw);
        if parsed.is_none() {
            errors.insert("ipv6", "Invalid IPv6 address");
        }
        parsed
    };

    let port = parse_port(&form.port, &mut errors);

    let username = trimmed(&form.username).to_string();
    if username.is_empty() {
        errors.insert("username", "Username is required");
    }
    // Passwords are taken as typed; only emptiness is checked.
    let password = form.password.clone().unwrap_or_default();
    if password.is_empty() {
        errors.insert("password", "Password is required");
    }

    if provider.is_none() {
        errors.insert("provider", "Provider is required");
    }
    match (provider, location) {
        (_, None) => errors.insert("location", "Provider location is required"),
        (Some(p), Some(l)) if l.provider_id != p.id => {
            errors.insert("location", "Location does not belong to the selected provider")
        }
        _ => {}
    }

    let contact_person = trimmed(&form.contact_person).to_string();
    let person_len = contact_person.chars().count();
    if !(CONTACT_PERSON_MIN..=CONTACT_PERSON_MAX).contains(&person_len) {
        errors.insert(
            "contact_person",
            format!(
                "Contact person must be between {} and {} characters",
                CONTACT_PERSON_MIN, CONTACT_PERSON_MAX
            ),
        );
    }

    let contact_phone = trimmed(&form.contact_phone).to_string();
    if contact_phone.chars().count() != CONTACT_PHONE_LEN {
        errors.insert(
            "contact_phone",
            format!("Contact phone must be exactly {} characters", CONTACT_PHONE_LEN),
        );
    }

    let hardware_raw = trimmed(&form.hardware_id);
    let hardware_id = if hardware_raw.is_empty() {
        None
    } else {
        match hardware_raw.parse::<u64>() {
            Ok(id) if id > 0 => Some(id),
            _ => {
                errors.insert("hardware_id", "Hardware id must be a positive number");
                None
            }
        }
    };

    if !errors.is_empty() {
        return Err(errors);
    }
    match (ipv4, provider, location) {
        (Some(ipv4), Some(provider), Some(location)) => Ok(InstallationRequest {
            ipv4,
            ipv6,
            port,
            credentials: Credentials { username, password },
            provider: provider.clone(),
            location: location.clone(),
            contact: SiteContact {
                person: contact_person,
                phone: contact_phone,
            },
            address: trimmed(&form.address).to_string(),
            hardware_id,
        }),
        _ => Err(errors),
    }
}
