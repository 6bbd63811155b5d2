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

use crate::config;
use crate::events::attribution::{AttributionEvent, EventName, UserData, funnel_custom_data};
use crate::events::payload::{EventsPayload, GraphResponse};

use chrono::Utc;
use thiserror::Error;
use log;

/// Message used when the API rejects an event without saying why
const GENERIC_REJECTION: &str = "Failed to send event";

/// Enum used to report conversion dispatch failures
/// The display strings are what internal callers get back, keep them stable
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Pixel ID or access token not configured, nothing was sent
    #[error("Missing Facebook configuration")]
    MissingConfiguration,

    /// The API answered with an error status
    #[error("{0}")]
    Rejected(String),

    /// The request never completed, or its answer could not be read
    #[error("Failed to send event to Facebook")]
    Transport(#[source] reqwest::Error),
}

/// Convenience type: dispatch result
pub type DispatchResult = Result<(), DispatchError>;

/// Conversions API client, shared by all requests
pub struct ConversionsApi {
    client: reqwest::Client,
    settings: config::Facebook,
}

impl ConversionsApi {
    pub fn new(settings: config::Facebook) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
        }
    }

    /// Pixel ID and access token, if both are set
    fn credentials(&self) -> Option<(&str, &str)> {
        let pixel_id = self.settings.pixel_id.as_deref().filter(|p| !p.is_empty())?;
        let access_token = self.settings.access_token.as_deref().filter(|t| !t.is_empty())?;
        Some((pixel_id, access_token))
    }

    /// True if events can be sent at all
    pub fn is_configured(&self) -> bool {
        self.credentials().is_some()
    }

    /// Sends a single event, PII hashed on the way out
    pub async fn send_event(&self, event: &AttributionEvent) -> DispatchResult {
        let (pixel_id, access_token) = match self.credentials() {
            Some(c) => c,
            None => {
                log::error!("missing Facebook configuration, {} event {} not sent", event.event_name, event.event_id);
                return Err(DispatchError::MissingConfiguration);
            }
        };

        let url = format!(
            "{}/{}/{}/events",
            self.settings.graph_url.trim_end_matches('/'),
            self.settings.api_version,
            pixel_id,
        );
        let payload = EventsPayload::single(event, self.settings.test_event_code.as_deref());

        let response = self.client.post(&url)
            .query(&[("access_token", access_token)])
            .json(&payload)
            .send().await
            .map_err(|e| {
                log::warn!("error sending {} event {}: {}", event.event_name, event.event_id, e);
                DispatchError::Transport(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.json::<GraphResponse>().await.ok()
                .and_then(|r| r.error)
                .and_then(|e| e.message)
                .filter(|m| !m.is_empty())
                .unwrap_or(String::from(GENERIC_REJECTION));
            log::warn!("conversions API rejected {} event {} ({}): {}", event.event_name, event.event_id, status.as_u16(), message);
            return Err(DispatchError::Rejected(message));
        }

        let result: GraphResponse = response.json().await.map_err(|e| {
            log::warn!("unreadable answer for {} event {}: {}", event.event_name, event.event_id, e);
            DispatchError::Transport(e)
        })?;

        log::info!(
            "{} event {} sent, {} event(s) received",
            event.event_name,
            event.event_id,
            result.events_received.map(|n| n.to_string()).unwrap_or("?".into()),
        );
        Ok(())
    }

    /// Builds a funnel event stamped with the current time and sends it
    async fn send_funnel_event(
        &self,
        event_name: EventName,
        content_name: &str,
        event_id: &str,
        user_data: UserData,
        source_url: Option<String>,
    ) -> DispatchResult {
        let event = AttributionEvent {
            event_name,
            event_time: Utc::now().timestamp(),
            event_id: event_id.to_string(),
            user_data,
            custom_data: Some(funnel_custom_data(content_name)),
            source_url,
        };
        self.send_event(&event).await
    }

    /// Someone joined the waitlist
    pub async fn send_lead_event(&self, event_id: &str, user_data: UserData, source_url: Option<String>) -> DispatchResult {
        self.send_funnel_event(EventName::Lead, "Email Waitlist", event_id, user_data, source_url).await
    }

    /// Someone's waitlist signup went through
    pub async fn send_complete_registration_event(&self, event_id: &str, user_data: UserData, source_url: Option<String>) -> DispatchResult {
        self.send_funnel_event(EventName::CompleteRegistration, "Email Waitlist Completed", event_id, user_data, source_url).await
    }

    /// Someone landed on the page, anonymous: email and external ID are dropped
    pub async fn send_page_view_event(&self, event_id: &str, user_data: UserData, source_url: Option<String>) -> DispatchResult {
        let anonymous = UserData { email: None, external_id: None, ..user_data };
        self.send_funnel_event(EventName::PageView, "Landing Page", event_id, anonymous, source_url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::hashing::hash_identifier;
    use crate::testing::{FakeUpstream, unreachable_url};
    use serde_json::json;
    use warp::http::StatusCode;

    fn settings(graph_url: &str) -> config::Facebook {
        config::Facebook {
            pixel_id: Some("1234".into()),
            access_token: Some("secret-token".into()),
            test_event_code: None,
            graph_url: graph_url.into(),
            api_version: "v18.0".into(),
        }
    }

    fn visitor() -> UserData {
        UserData {
            email: Some("Jane@Example.com ".into()),
            ip_address: Some("203.0.113.7".into()),
            user_agent: Some("Mozilla/5.0".into()),
            click_id: None,
            browser_id: Some("fb.1.1700000000.123".into()),
            external_id: None,
        }
    }

    #[tokio::test]
    async fn lead_event_is_posted_to_the_pixel() {
        let upstream = FakeUpstream::start(StatusCode::OK, json!({"events_received": 1, "fbtrace_id": "x"})).await;
        let api = ConversionsApi::new(settings(&upstream.url));

        api.send_lead_event("aaaabbbbccccddddeeeeffff00001111", visitor(), Some("https://example.com/".into())).await.unwrap();

        let requests = upstream.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].path, "/v18.0/1234/events");
        assert_eq!(requests[0].query, "access_token=secret-token");

        let sent = &requests[0].body["data"][0];
        assert_eq!(requests[0].body["data"].as_array().unwrap().len(), 1);
        assert_eq!(sent["event_name"], "Lead");
        assert_eq!(sent["event_id"], "aaaabbbbccccddddeeeeffff00001111");
        assert_eq!(sent["action_source"], "website");
        assert_eq!(sent["event_source_url"], "https://example.com/");
        assert_eq!(sent["user_data"]["em"], hash_identifier("jane@example.com"));
        assert_eq!(sent["user_data"]["fbp"], "fb.1.1700000000.123");
        assert!(sent["user_data"].get("fbc").is_none());
        assert_eq!(sent["custom_data"], json!({"content_name": "Email Waitlist", "currency": "USD", "value": 0.0}));
        assert!(sent["event_time"].as_i64().unwrap() > 1_700_000_000);
        assert!(requests[0].body.get("test_event_code").is_none());
    }

    #[tokio::test]
    async fn test_event_code_is_attached_when_configured() {
        let upstream = FakeUpstream::start(StatusCode::OK, json!({"events_received": 1})).await;
        let mut with_code = settings(&upstream.url);
        with_code.test_event_code = Some("TEST4242".into());
        let api = ConversionsApi::new(with_code);

        api.send_complete_registration_event("id", visitor(), None).await.unwrap();

        let body = &upstream.requests()[0].body;
        assert_eq!(body["test_event_code"], "TEST4242");
        assert_eq!(body["data"][0]["event_name"], "CompleteRegistration");
        assert_eq!(body["data"][0]["custom_data"]["content_name"], "Email Waitlist Completed");
    }

    #[tokio::test]
    async fn page_view_carries_no_pii() {
        let upstream = FakeUpstream::start(StatusCode::OK, json!({"events_received": 1})).await;
        let api = ConversionsApi::new(settings(&upstream.url));

        api.send_page_view_event("pv", visitor(), None).await.unwrap();

        let sent = &upstream.requests()[0].body["data"][0];
        assert_eq!(sent["event_name"], "PageView");
        assert!(sent["user_data"].get("em").is_none());
        assert_eq!(sent["user_data"]["client_ip_address"], "203.0.113.7");
    }

    #[tokio::test]
    async fn missing_configuration_fails_without_network() {
        let upstream = FakeUpstream::start(StatusCode::OK, json!({"events_received": 1})).await;
        let mut no_token = settings(&upstream.url);
        no_token.access_token = Some(String::new());
        let api = ConversionsApi::new(no_token);

        let err = api.send_lead_event("id", visitor(), None).await.unwrap_err();
        assert!(matches!(err, DispatchError::MissingConfiguration));
        assert_eq!(err.to_string(), "Missing Facebook configuration");
        assert!(!api.is_configured());
        assert!(upstream.requests().is_empty());
    }

    #[tokio::test]
    async fn rejection_message_comes_from_the_body() {
        let upstream = FakeUpstream::start(StatusCode::BAD_REQUEST, json!({
            "error": {"message": "Invalid parameter", "type": "OAuthException", "code": 100}
        })).await;
        let api = ConversionsApi::new(settings(&upstream.url));

        let err = api.send_lead_event("id", visitor(), None).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid parameter");
    }

    #[tokio::test]
    async fn rejection_without_message_is_generic() {
        let upstream = FakeUpstream::start(StatusCode::INTERNAL_SERVER_ERROR, json!({})).await;
        let api = ConversionsApi::new(settings(&upstream.url));

        let err = api.send_lead_event("id", visitor(), None).await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to send event");
    }

    #[tokio::test]
    async fn empty_rejection_message_is_generic() {
        let upstream = FakeUpstream::start(StatusCode::BAD_REQUEST, json!({"error": {"message": ""}})).await;
        let api = ConversionsApi::new(settings(&upstream.url));

        let err = api.send_lead_event("id", visitor(), None).await.unwrap_err();
        assert!(matches!(err, DispatchError::Rejected(_)));
        assert_eq!(err.to_string(), "Failed to send event");
    }

    #[tokio::test]
    async fn transport_failure_is_reported() {
        let api = ConversionsApi::new(settings(&unreachable_url()));

        let err = api.send_lead_event("id", visitor(), None).await.unwrap_err();
        assert!(matches!(err, DispatchError::Transport(_)));
        assert_eq!(err.to_string(), "Failed to send event to Facebook");
    }
}
