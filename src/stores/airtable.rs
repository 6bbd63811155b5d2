use crate::stores::{LeadStore, Lead, StoreResult, StoreError};
use crate::config;

use std::fmt::Display;
use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use log;

/// Airtable lead store: one record per lead, a single Email field
pub struct Airtable {
    client: reqwest::Client,
    settings: config::Airtable,
}

#[derive(Serialize)]
struct LeadFields<'a> {
    #[serde(rename = "Email")]
    email: &'a str,
}

#[derive(Serialize)]
struct NewRecord<'a> {
    fields: LeadFields<'a>,
}

#[derive(Serialize)]
struct CreateRecords<'a> {
    records: Vec<NewRecord<'a>>,
}

#[derive(Deserialize)]
struct CreatedRecord {
    id: String,
}

#[derive(Deserialize)]
struct CreatedRecords {
    records: Vec<CreatedRecord>,
}

/// Airtable sends either {"error": {"type": ..., "message": ...}} or {"error": "TYPE"}
#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Detailed {
        #[serde(rename = "type", default)]
        kind: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
    Bare(String),
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

impl ErrorDetail {
    fn describe(self) -> String {
        match self {
            ErrorDetail::Detailed { message: Some(m), .. } => m,
            ErrorDetail::Detailed { kind: Some(k), .. } => k,
            ErrorDetail::Detailed { .. } => String::from("unknown error"),
            ErrorDetail::Bare(kind) => kind,
        }
    }
}

impl Airtable {
    pub fn new(settings: config::Airtable) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
        }
    }

    /// True if both the API key and the base ID are known
    pub fn is_configured(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().map(|s| !s.is_empty()).unwrap_or(false);
        present(&self.settings.api_key) && present(&self.settings.base_id)
    }

    /// The create-records endpoint: {api_url}/{base}/{table}
    fn table_url(&self, base_id: &str) -> Result<Url, StoreError> {
        let mut url = Url::parse(&self.settings.api_url)
            .map_err(|e| StoreError::Connectivity(format!("{}: {}", self.settings.api_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| StoreError::Connectivity(format!("{}: not a base URL", self.settings.api_url)))?
            .pop_if_empty()
            .push(base_id)
            .push(&self.settings.table);
        Ok(url)
    }
}

#[async_trait]
impl LeadStore for Airtable {
    /// Creates the record, fails without any network call if credentials are missing
    async fn create_lead(&self, lead: &Lead) -> StoreResult {
        let api_key = self.settings.api_key.as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(StoreError::MissingConfiguration("api_key"))?;
        let base_id = self.settings.base_id.as_deref()
            .filter(|b| !b.is_empty())
            .ok_or(StoreError::MissingConfiguration("base_id"))?;

        let body = CreateRecords {
            records: vec!(NewRecord { fields: LeadFields { email: &lead.email } }),
        };

        log::debug!("creating record in airtable table {}", self.settings.table);
        let response = self.client.post(self.table_url(base_id)?)
            .bearer_auth(api_key)
            .json(&body)
            .send().await
            .map_err(|e| StoreError::Connectivity(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.json::<ErrorBody>().await
                .map(|b| b.error.describe())
                .unwrap_or(status.to_string());
            return Err(StoreError::Rejected(status.as_u16(), message));
        }

        let created: CreatedRecords = response.json().await
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;
        created.records.into_iter()
            .next()
            .map(|record| record.id)
            .ok_or(StoreError::InvalidResponse(String::from("no record in response")))
    }
}

impl Display for Airtable {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
        write!(f, "airtable:{}", self.settings.table)
    }
}
