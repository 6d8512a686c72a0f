//! Abuse-report intake and webhook delivery.
//!
//! Reports are validated here and handed to the admin webhook as one embed;
//! everything past the HTTP POST (retries, channel routing) belongs to the
//! receiving side.

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use shared::models::Hack;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Hateful,
    Harassment,
    Misleading,
    Stolen,
}

impl ReportKind {
    fn label(self) -> &'static str {
        match self {
            ReportKind::Hateful => "Hateful Content",
            ReportKind::Harassment => "Harassment",
            ReportKind::Misleading => "Misleading",
            ReportKind::Stolen => "My Hack Was Stolen",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReportRequest {
    pub kind: ReportKind,
    pub details: Option<String>,
    pub email: Option<String>,
    pub is_impersonating: Option<bool>,
}

/// Normalized report fields after the per-kind requirements passed.
#[derive(Debug)]
pub struct ValidatedReport {
    pub details: Option<String>,
    pub email: Option<String>,
}

const DETAILS_EMBED_LIMIT: usize = 1000;

pub fn validate_report(req: &ReportRequest) -> Result<ValidatedReport, &'static str> {
    let details = req
        .details
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string);

    match req.kind {
        ReportKind::Misleading if details.is_none() => {
            Err("Details are required for misleading reports")
        }
        ReportKind::Stolen => {
            let email = req
                .email
                .as_deref()
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .ok_or("Email is required for stolen hack reports")?
                .to_lowercase();
            if details.is_none() {
                return Err("Details are required for stolen hack reports");
            }
            if !is_plausible_email(&email) {
                return Err("Invalid email address");
            }
            Ok(ValidatedReport {
                details,
                email: Some(email),
            })
        }
        _ => Ok(ValidatedReport {
            details,
            email: None,
        }),
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && domain.len() > 2,
        None => false,
    }
}

/// Builds the webhook embed for one report.
pub fn build_embed(
    hack: &Hack,
    req: &ReportRequest,
    validated: &ValidatedReport,
    hack_url: &str,
) -> Value {
    let mut fields = vec![
        json!({ "name": "Report Type", "value": req.kind.label(), "inline": false }),
        json!({
            "name": "Hack",
            "value": format!("[{}]({})", hack.title, hack_url),
            "inline": false,
        }),
    ];

    if let Some(details) = &validated.details {
        let value = if details.len() > DETAILS_EMBED_LIMIT {
            let mut end = DETAILS_EMBED_LIMIT;
            while !details.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &details[..end])
        } else {
            details.clone()
        };
        fields.push(json!({ "name": "Details", "value": value, "inline": false }));
    }

    if req.kind == ReportKind::Stolen {
        if let Some(email) = &validated.email {
            fields.push(json!({ "name": "Contact Email", "value": email, "inline": false }));
        }
        if let Some(impersonating) = req.is_impersonating {
            fields.push(json!({
                "name": "Is Uploader Impersonating?",
                "value": if impersonating { "Yes" } else { "No" },
                "inline": true,
            }));
        }
    }

    json!({
        "title": "Hack Report",
        "description": format!("A new report has been submitted for [{}]({})", hack.title, hack_url),
        "color": 0xff6b6b,
        "fields": fields,
        "footer": { "text": format!("Hack Slug: {}", hack.slug) },
        "timestamp": Utc::now().to_rfc3339(),
    })
}

/// Fire-and-forget delivery of report embeds to the admin webhook.
pub struct ReportSink {
    webhook_url: Option<String>,
    site_base: String,
    http: reqwest::Client,
}

impl ReportSink {
    pub fn new(webhook_url: Option<String>, site_base: String) -> Self {
        Self {
            webhook_url,
            site_base: site_base.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> Self {
        let webhook_url = std::env::var("REPORT_WEBHOOK_URL")
            .ok()
            .filter(|url| !url.is_empty());
        if webhook_url.is_none() {
            tracing::warn!("REPORT_WEBHOOK_URL not set; hack reports are validated but dropped");
        }
        let site_base = std::env::var("SITE_BASE_URL").unwrap_or_default();
        Self::new(webhook_url, site_base)
    }

    pub fn hack_url(&self, slug: &str) -> String {
        if self.site_base.is_empty() {
            format!("/hack/{slug}")
        } else {
            format!("{}/hack/{}", self.site_base, slug)
        }
    }

    /// Delivers one embed. Failures surface so the caller can tell the
    /// reporter to retry.
    pub async fn send(&self, embed: Value) -> anyhow::Result<()> {
        let Some(url) = &self.webhook_url else {
            return Ok(());
        };
        self.http
            .post(url)
            .json(&json!({ "embeds": [embed] }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
