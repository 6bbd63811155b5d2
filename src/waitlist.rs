/* hushlist - a small waitlist backend with deduplicated conversion reporting
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>. */

use crate::conversions::{ConversionsApi, DispatchResult};
use crate::events::attribution::{EventName, UserData};
use crate::events::hashing::generate_event_id;
use crate::middleware::RequestContext;
use crate::stores::{Lead, LeadStore, StoreError};

use std::sync::Arc;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio;
use log;

/// Record ID returned in testing mode, where nothing is stored
pub const TEST_RECORD_ID: &str = "test-id";

lazy_static! {
    static ref EMAIL_PATTERN: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
}

/// A waitlist signup, as posted to /v1/waitlist
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct WaitlistSubmission {
    #[serde(default)]
    pub email: String,
    /// Event ID the browser pixel used for Lead
    #[serde(default)]
    pub event_id: Option<String>,
    /// Event ID the browser pixel used for CompleteRegistration, if different
    #[serde(default)]
    pub complete_registration_event_id: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub click_id: Option<String>,
    #[serde(default)]
    pub browser_id: Option<String>,
    #[serde(default)]
    pub external_id: Option<String>,
}

/// A server-side page view, as posted to /v1/page-view
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct PageVisit {
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub click_id: Option<String>,
    #[serde(default)]
    pub browser_id: Option<String>,
}

/// Event IDs the browser pixel should reuse
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventIds {
    pub lead: String,
    pub complete_registration: String,
}

/// A successful signup
#[derive(Debug, Clone)]
pub struct Registration {
    /// The store's record ID
    pub id: String,
    pub event_ids: EventIds,
}

/// Why a signup was refused; the display strings are shown to the user
#[derive(Error, Debug)]
pub enum WaitlistError {
    #[error("Please enter your email")]
    MissingEmail,
    #[error("Please enter a valid email")]
    InvalidEmail,
    #[error("Failed to add to waitlist")]
    Store(#[source] StoreError),
}

/// What the landing page gets back
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct WaitlistResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_ids: Option<EventIds>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Result<Registration, WaitlistError>> for WaitlistResponse {
    fn from(result: &Result<Registration, WaitlistError>) -> Self {
        match result {
            Ok(registration) => Self {
                success: true,
                id: Some(registration.id.clone()),
                event_ids: Some(registration.event_ids.clone()),
                error: None,
            },
            Err(e) => Self {
                success: false,
                id: None,
                event_ids: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Outcome of a server-side page view
#[derive(Debug)]
pub struct PageViewReceipt {
    pub event_id: String,
    pub outcome: DispatchResult,
}

/// Empty identifiers count as missing
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Trims the email and checks it looks like one
fn validate_email(email: &str) -> Result<String, WaitlistError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(WaitlistError::MissingEmail);
    }
    match EMAIL_PATTERN.is_match(email) {
        true => Ok(email.to_string()),
        false => Err(WaitlistError::InvalidEmail),
    }
}

/// The waitlist: stores leads, then reports them as conversions
pub struct WaitlistService {
    store: Arc<dyn LeadStore>,
    conversions: Arc<ConversionsApi>,
    /// Nothing is stored or reported when set
    testing: bool,
}

impl WaitlistService {
    pub fn new(store: Arc<dyn LeadStore>, conversions: Arc<ConversionsApi>, testing: bool) -> Self {
        Self { store, conversions, testing }
    }

    /// Adds someone to the waitlist
    /// Conversion reporting failures are logged and never fail the signup
    pub async fn add_to_waitlist(&self, submission: WaitlistSubmission, context: &RequestContext) -> Result<Registration, WaitlistError> {
        let rid = context.rid();
        let email = validate_email(&submission.email)?;

        let lead_event_id = non_empty(submission.event_id).unwrap_or_else(generate_event_id);
        let event_ids = EventIds {
            complete_registration: non_empty(submission.complete_registration_event_id)
                .unwrap_or_else(|| lead_event_id.clone()),
            lead: lead_event_id,
        };

        if self.testing {
            log::info!(rid = rid; "testing mode, lead not stored, events {} and {} not reported", event_ids.lead, event_ids.complete_registration);
            return Ok(Registration { id: TEST_RECORD_ID.into(), event_ids });
        }

        let id = self.store.create_lead(&Lead { email: email.clone() }).await.map_err(|e| {
            log::error!(rid = rid; "failed to store lead in {}: {}", self.store, e);
            WaitlistError::Store(e)
        })?;
        log::info!(rid = rid; "lead stored in {} as {}", self.store, id);

        let user_data = UserData {
            email: Some(email),
            ip_address: context.client_ip.clone(),
            user_agent: context.user_agent.clone(),
            click_id: non_empty(submission.click_id),
            browser_id: non_empty(submission.browser_id),
            external_id: non_empty(submission.external_id),
        };
        let source_url = non_empty(submission.source_url);

        /* Both reports run to completion, whatever happens to the other one */
        let (lead, registration) = tokio::join!(
            self.conversions.send_lead_event(&event_ids.lead, user_data.clone(), source_url.clone()),
            self.conversions.send_complete_registration_event(&event_ids.complete_registration, user_data, source_url),
        );

        for (event_name, result) in [(EventName::Lead, lead), (EventName::CompleteRegistration, registration)] {
            if let Err(e) = result {
                log::warn!(rid = rid; "{} conversion not reported for {}: {}", event_name, id, e);
            }
        }

        Ok(Registration { id, event_ids })
    }

    /// Reports a page view server-side, under the ID the pixel used (or a new one)
    pub async fn report_page_view(&self, visit: PageVisit, context: &RequestContext) -> PageViewReceipt {
        let event_id = non_empty(visit.event_id).unwrap_or_else(generate_event_id);

        if self.testing {
            log::info!(rid = context.rid(); "testing mode, page view {} not reported", event_id);
            return PageViewReceipt { event_id, outcome: Ok(()) };
        }

        let user_data = UserData {
            ip_address: context.client_ip.clone(),
            user_agent: context.user_agent.clone(),
            click_id: non_empty(visit.click_id),
            browser_id: non_empty(visit.browser_id),
            ..UserData::default()
        };

        let outcome = self.conversions.send_page_view_event(&event_id, user_data, non_empty(visit.source_url)).await;
        if let Err(e) = &outcome {
            log::warn!(rid = context.rid(); "page view {} not reported: {}", event_id, e);
        }
        PageViewReceipt { event_id, outcome }
    }
}
