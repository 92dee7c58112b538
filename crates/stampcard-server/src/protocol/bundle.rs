//! Pass bundle assembly: `pass.json`, the progress image and a manifest.

use serde::Serialize;
use serde_json::json;
use stampcard_core::config::{OfferDesign, ServerConfig};
use stampcard_core::db::base64_encode;
use stampcard_render::{RenderedImage, Rgb};

use super::manifest::{BundleFile, bundle_etag};
use crate::storage::{Pass, PassStatus, WalletKind};

pub const PASS_JSON: &str = "pass.json";
pub const MANIFEST_JSON: &str = "manifest.json";

/// Issuer identity stamped into every `pass.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassIdentity {
    pub pass_type_identifier: String,
    pub team_identifier: String,
    pub organization_name: String,
    pub web_service_url: String,
}

impl From<&ServerConfig> for PassIdentity {
    fn from(config: &ServerConfig) -> Self {
        Self {
            pass_type_identifier: config.pass_type_identifier.clone(),
            team_identifier: config.team_identifier.clone(),
            organization_name: config.organization_name.clone(),
            web_service_url: config.public_url.trim_end_matches('/').to_string(),
        }
    }
}

/// A built bundle and its validator.
#[derive(Debug, Clone)]
pub struct PassBundle {
    pub pass_id: String,
    /// Quoted content tag over every file except the manifest.
    pub etag: String,
    pub files: Vec<BundleFile>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BundleBody<'a> {
    serial_number: &'a str,
    etag: &'a str,
    files: Vec<BundleBodyFile<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BundleBodyFile<'a> {
    name: &'a str,
    data: String,
}

impl PassBundle {
    pub fn file(&self, name: &str) -> Option<&BundleFile> {
        self.files.iter().find(|f| f.name == name)
    }

    /// JSON response body; file contents are base64 encoded.
    pub fn to_json(&self) -> serde_json::Value {
        let body = BundleBody {
            serial_number: &self.pass_id,
            etag: &self.etag,
            files: self
                .files
                .iter()
                .map(|f| BundleBodyFile {
                    name: &f.name,
                    data: base64_encode(&f.bytes),
                })
                .collect(),
        };
        serde_json::to_value(body).unwrap_or_default()
    }
}

/// Assemble the bundle for `pass`.
///
/// The result depends only on its inputs, so an unchanged pass always
/// yields the same validator.
pub fn build_bundle(
    pass: &Pass,
    design: &OfferDesign,
    identity: &PassIdentity,
    image: &RenderedImage,
) -> PassBundle {
    let wallet = pass.wallet().unwrap_or(WalletKind::Apple);
    let pass_json = pass_json(pass, design, identity);
    let pass_json = serde_json::to_vec_pretty(&pass_json).unwrap_or_default();

    let mut files = vec![
        BundleFile::new(PASS_JSON, pass_json),
        BundleFile::new(wallet.image_name(), image.png.clone()),
    ];
    let etag = bundle_etag(&files);

    let manifest: serde_json::Map<String, serde_json::Value> = files
        .iter()
        .map(|f| (f.name.clone(), serde_json::Value::String(f.sha256_hex())))
        .collect();
    files.push(BundleFile::new(
        MANIFEST_JSON,
        serde_json::to_vec_pretty(&manifest).unwrap_or_default(),
    ));

    PassBundle {
        pass_id: pass.id.clone(),
        etag,
        files,
    }
}

fn pass_json(pass: &Pass, design: &OfferDesign, identity: &PassIdentity) -> serde_json::Value {
    let status = pass.status();
    let defaults = OfferDesign::default();
    let color = |value: &str, fallback: &str| {
        Rgb::parse_or(value, Rgb::parse_or(fallback, Rgb::BLACK)).to_pass_string()
    };

    let mut body = json!({
        "formatVersion": 1,
        "passTypeIdentifier": identity.pass_type_identifier,
        "serialNumber": pass.id,
        "teamIdentifier": identity.team_identifier,
        "organizationName": identity.organization_name,
        "description": design.title,
        "logoText": design.title,
        "webServiceURL": identity.web_service_url,
        "authenticationToken": pass.authentication_token,
        "backgroundColor": color(&design.background_color, &defaults.background_color),
        "foregroundColor": color(&design.foreground_color, &defaults.foreground_color),
        "labelColor": color(&design.label_color, &defaults.label_color),
        "storeCard": {
            "primaryFields": [{
                "key": "progress",
                "label": "Stamps",
                "value": format!("{} / {}", pass.earned_count, pass.required_count),
            }],
            "secondaryFields": [{
                "key": "status",
                "label": "Status",
                "value": status_label(status),
            }],
        },
        "voided": matches!(status, Some(PassStatus::Expired | PassStatus::Deleted)),
    });

    let expiration = pass.expired_at.or(pass.scheduled_expiration_at);
    if let (Some(at), Some(obj)) = (expiration, body.as_object_mut()) {
        obj.insert("expirationDate".to_string(), json!(format_rfc3339(at)));
    }

    body
}

const fn status_label(status: Option<PassStatus>) -> &'static str {
    match status {
        Some(PassStatus::Active) | None => "In progress",
        Some(PassStatus::Completed) => "Reward ready",
        Some(PassStatus::Expired) => "Expired",
        Some(PassStatus::Deleted) => "Removed",
    }
}

/// Minimal RFC 3339 formatter for unix seconds (avoids chrono dependency).
fn format_rfc3339(secs: i64) -> String {
    let days = secs.div_euclid(86_400);
    let rem = secs.rem_euclid(86_400);

    // Civil-from-days over 400-year eras.
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);

    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}Z",
        rem / 3_600,
        (rem % 3_600) / 60,
        rem % 60
    )
}
