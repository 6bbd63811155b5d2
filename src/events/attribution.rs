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

use std::collections::BTreeMap;
use std::fmt::Display;
use serde::Serialize;

/// Standard event names understood by the pixel and the Conversions API
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventName {
    Lead,
    CompleteRegistration,
    PageView,
}

impl Display for EventName {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
        f.write_str(match self {
            EventName::Lead => "Lead",
            EventName::CompleteRegistration => "CompleteRegistration",
            EventName::PageView => "PageView",
        })
    }
}

/// A custom data value: text, number or flag
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum CustomValue {
    Flag(bool),
    Number(f64),
    Text(String),
}

/// Convenience type: custom data attached to an event
pub type CustomData = BTreeMap<String, CustomValue>;

/// What we know about the user behind an event, in clear
/// Email and external ID are hashed when the event is put on the wire
#[derive(Debug, Clone, Default)]
pub struct UserData {
    pub email: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    /// Click ID, the _fbc cookie
    pub click_id: Option<String>,
    /// Browser ID, the _fbp cookie
    pub browser_id: Option<String>,
    pub external_id: Option<String>,
}

/// A conversion event, built for a single dispatch and then dropped
#[derive(Debug, Clone)]
pub struct AttributionEvent {
    pub event_name: EventName,
    /// Unix timestamp, in seconds
    pub event_time: i64,
    /// Deduplication key, shared with the browser pixel
    pub event_id: String,
    pub user_data: UserData,
    pub custom_data: Option<CustomData>,
    pub source_url: Option<String>,
}

/// Builds the fixed custom data block attached to funnel events
pub fn funnel_custom_data(content_name: &str) -> CustomData {
    BTreeMap::from([
        ("content_name".into(), CustomValue::Text(content_name.into())),
        ("currency".into(), CustomValue::Text("USD".into())),
        ("value".into(), CustomValue::Number(0.0)),
    ])
}
