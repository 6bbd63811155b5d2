//! Conversions API wire format

use crate::events::attribution::{AttributionEvent, CustomData, EventName, UserData};
use crate::events::hashing::hash_identifier;

use serde::{Deserialize, Serialize};

/// Every event we send originates from the website
pub const ACTION_SOURCE: &str = "website";

/// User data as sent to the API: only present fields, PII hashed
#[derive(Serialize, Debug, Default, PartialEq)]
pub struct WireUserData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub em: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fbc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fbp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
}

impl From<&UserData> for WireUserData {
    fn from(user_data: &UserData) -> Self {
        Self {
            client_ip_address: user_data.ip_address.clone(),
            client_user_agent: user_data.user_agent.clone(),
            em: user_data.email.as_deref().map(hash_identifier),
            fbc: user_data.click_id.clone(),
            fbp: user_data.browser_id.clone(),
            external_id: user_data.external_id.as_deref().map(hash_identifier),
        }
    }
}

/// A single server event
#[derive(Serialize, Debug)]
pub struct ServerEvent<'a> {
    pub event_name: EventName,
    pub event_time: i64,
    pub event_id: &'a str,
    pub action_source: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_source_url: Option<&'a str>,
    pub user_data: WireUserData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_data: Option<&'a CustomData>,
}

/// The request body: a list of events, possibly flagged for the test tab
#[derive(Serialize, Debug)]
pub struct EventsPayload<'a> {
    pub data: Vec<ServerEvent<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_event_code: Option<&'a str>,
}

impl<'a> EventsPayload<'a> {
    /// Wraps a single event into a payload
    pub fn single(event: &'a AttributionEvent, test_event_code: Option<&'a str>) -> Self {
        let server_event = ServerEvent {
            event_name: event.event_name,
            event_time: event.event_time,
            event_id: &event.event_id,
            action_source: ACTION_SOURCE,
            event_source_url: event.source_url.as_deref(),
            user_data: WireUserData::from(&event.user_data),
            custom_data: event.custom_data.as_ref(),
        };
        Self { data: vec!(server_event), test_event_code }
    }
}

/// Error details in an API response
#[derive(Deserialize, Debug)]
pub struct GraphError {
    #[serde(default)]
    pub message: Option<String>,
}

/// Whatever the API answers, success or not
#[derive(Deserialize, Debug)]
pub struct GraphResponse {
    #[serde(default)]
    pub events_received: Option<u64>,
    #[serde(default)]
    pub error: Option<GraphError>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::attribution::funnel_custom_data;
    use serde_json::json;

    fn lead_event() -> AttributionEvent {
        AttributionEvent {
            event_name: EventName::Lead,
            event_time: 1_700_000_000,
            event_id: "0123456789abcdef0123456789abcdef".into(),
            user_data: UserData {
                email: Some(" Jane@Example.com".into()),
                ip_address: Some("203.0.113.7".into()),
                user_agent: Some("Mozilla/5.0".into()),
                click_id: Some("fb.1.1700000000.abc".into()),
                browser_id: Some("fb.1.1700000000.123".into()),
                external_id: Some("USER-42".into()),
            },
            custom_data: Some(funnel_custom_data("Email Waitlist")),
            source_url: Some("https://example.com/".into()),
        }
    }

    #[test]
    fn full_event_matches_wire_shape() {
        let event = lead_event();
        let payload = serde_json::to_value(EventsPayload::single(&event, Some("TEST123"))).unwrap();

        assert_eq!(payload, json!({
            "data": [{
                "event_name": "Lead",
                "event_time": 1_700_000_000,
                "event_id": "0123456789abcdef0123456789abcdef",
                "action_source": "website",
                "event_source_url": "https://example.com/",
                "user_data": {
                    "client_ip_address": "203.0.113.7",
                    "client_user_agent": "Mozilla/5.0",
                    "em": hash_identifier("jane@example.com"),
                    "fbc": "fb.1.1700000000.abc",
                    "fbp": "fb.1.1700000000.123",
                    "external_id": hash_identifier("user-42"),
                },
                "custom_data": {
                    "content_name": "Email Waitlist",
                    "currency": "USD",
                    "value": 0.0,
                },
            }],
            "test_event_code": "TEST123",
        }));
    }

    #[test]
    fn raw_pii_never_reaches_the_wire() {
        let event = lead_event();
        let body = serde_json::to_string(&EventsPayload::single(&event, None)).unwrap();
        assert!(!body.to_lowercase().contains("jane@example.com"));
        assert!(!body.to_lowercase().contains("user-42"));
        assert!(!body.contains("test_event_code"));
    }

    #[test]
    fn absent_fields_are_omitted() {
        let event = AttributionEvent {
            event_name: EventName::PageView,
            event_time: 1,
            event_id: "id".into(),
            user_data: UserData::default(),
            custom_data: None,
            source_url: None,
        };
        let payload = serde_json::to_value(EventsPayload::single(&event, None)).unwrap();
        let sent = &payload["data"][0];
        assert_eq!(sent["user_data"], json!({}));
        assert!(sent.get("custom_data").is_none());
        assert!(sent.get("event_source_url").is_none());
    }

    #[test]
    fn error_response_is_understood() {
        let response: GraphResponse = serde_json::from_str(
            r#"{"error": {"message": "Invalid OAuth access token.", "type": "OAuthException", "code": 190}}"#
        ).unwrap();
        assert_eq!(response.error.and_then(|e| e.message).as_deref(), Some("Invalid OAuth access token."));
        assert!(response.events_received.is_none());
    }
}
