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

use serde::{Serialize, Deserialize};
use std::net::IpAddr;
use std::fs::File;
use std::path::{Path, PathBuf};
use directories::ProjectDirs;
use serde_with::{NoneAsEmptyString, serde_as};
use byte_unit::Byte as ByteSize;
use serde_yaml;
use log;

/// Configuration defaults
pub mod defaults {
    use std::net::{IpAddr, Ipv4Addr};
    use byte_unit::Byte as ByteSize;

    pub fn server_ip() -> IpAddr { IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)) }
    pub fn server_port() -> u16 { 8080 }
    pub fn server_payload_size_limit() -> ByteSize { ByteSize::from_u64(64 * 1024) }

    pub fn logging_level() -> log::LevelFilter { log::LevelFilter::Info }

    pub fn airtable_table() -> String { String::from("Waitlist") }
    pub fn airtable_api_url() -> String { String::from("https://api.airtable.com/v0") }

    pub fn facebook_graph_url() -> String { String::from("https://graph.facebook.com") }
    pub fn facebook_api_version() -> String { String::from("v18.0") }
}

/// Server block
#[derive(Serialize, Deserialize)]
pub struct Server {
    /// The IP we're going to bind to
    #[serde(default = "defaults::server_ip")]
    pub ip: IpAddr,
    /// The port we're going to listen on
    #[serde(default = "defaults::server_port")]
    pub port: u16,
    /// Largest accepted request body
    #[serde(default = "defaults::server_payload_size_limit")]
    pub payload_size_limit: ByteSize,
    /// A list of allowed origins (CORS)
    #[serde(default)]
    pub origins: Vec<String>,
}

impl Default for Server {
    /// Builds a default server block in case none is provided
    fn default() -> Self {
        return Self {
            ip: defaults::server_ip(),
            port: defaults::server_port(),
            payload_size_limit: defaults::server_payload_size_limit(),
            origins: vec!(),
        }
    }
}

/// Logging block
#[derive(Serialize, Deserialize)]
pub struct Logging {
    #[serde(default = "defaults::logging_level")]
    pub level: log::LevelFilter,
    /// When set, log lines are also written to files in this directory
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl Default for Logging {
    /// Builds a default logging block in case none is provided
    fn default() -> Self {
        return Self {
            level: defaults::logging_level(),
            directory: None,
        }
    }
}

/// Airtable block: where leads are stored
#[serde_as]
#[derive(Serialize, Deserialize, Clone)]
pub struct Airtable {
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub base_id: Option<String>,
    /// Table receiving one record per lead
    #[serde(default = "defaults::airtable_table")]
    pub table: String,
    #[serde(default = "defaults::airtable_api_url")]
    pub api_url: String,
}

impl Default for Airtable {
    fn default() -> Self {
        return Self {
            api_key: None,
            base_id: None,
            table: defaults::airtable_table(),
            api_url: defaults::airtable_api_url(),
        }
    }
}

/// Facebook block: where conversion events go
#[serde_as]
#[derive(Serialize, Deserialize, Clone)]
pub struct Facebook {
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub pixel_id: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub access_token: Option<String>,
    /// Routes events to the Events Manager test tab when set
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub test_event_code: Option<String>,
    #[serde(default = "defaults::facebook_graph_url")]
    pub graph_url: String,
    #[serde(default = "defaults::facebook_api_version")]
    pub api_version: String,
}

impl Default for Facebook {
    fn default() -> Self {
        return Self {
            pixel_id: None,
            access_token: None,
            test_event_code: None,
            graph_url: defaults::facebook_graph_url(),
            api_version: defaults::facebook_api_version(),
        }
    }
}

/// The overall configuration file
#[derive(Serialize, Deserialize, Default)]
pub struct Configuration {
    /// A server block
    #[serde(default)]
    pub server: Server,
    /// A logging block
    #[serde(default)]
    pub logging: Logging,
    /// Lead storage
    #[serde(default)]
    pub airtable: Airtable,
    /// Conversion reporting
    #[serde(default)]
    pub facebook: Facebook,
    /// Test mode: nothing leaves the process
    #[serde(default)]
    pub testing: bool,
}

impl Configuration {
    /// Overrides secrets and switches with environment variables, given a lookup function
    pub fn apply_environment<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        /* Empty variables count as unset, same as in the file */
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(v) = var("AIRTABLE_API_KEY") { self.airtable.api_key = Some(v); }
        if let Some(v) = var("AIRTABLE_BASE_ID") { self.airtable.base_id = Some(v); }
        if let Some(v) = var("FACEBOOK_PIXEL_ID") { self.facebook.pixel_id = Some(v); }
        if let Some(v) = var("FACEBOOK_ACCESS_TOKEN") { self.facebook.access_token = Some(v); }
        if let Some(v) = var("FACEBOOK_TEST_EVENT_CODE") { self.facebook.test_event_code = Some(v); }
        if let Some(v) = var("TESTING") { self.testing = v == "true"; }
    }
}

/// Parse a configuration file given a path
fn parse_configuration_file(path: &Path) -> Result<Configuration, String> {
    let path_str = path.display();
    let file = File::open(path).map_err(|e| format!("{}: {}", path_str, e))?;
    let configuration = serde_yaml::from_reader(file).map_err(|e| format!("{}: {}", path_str, e))?;
    Ok(configuration)
}

/// Locates and parses the configuration file, then applies the environment
pub fn get_configuration(cmd_arg: Option<&PathBuf>) -> Result<Configuration, String> {
    let given_location = cmd_arg
        .map(|p| p.clone())
        .or(std::env::var("HUSHLIST_CONFIG").map(|s| PathBuf::from(s)).ok());

    let mut configuration = match given_location {
        /* If a path was given, ignore all other options */
        Some(path) => parse_configuration_file(path.as_path())?,
        None => {
            /* Otherwise, try and guess */
            let xdg_dirs = ProjectDirs::from("com", "hushlist", "hushlist");
            let inferred_locations = [
                Some(PathBuf::from("/etc/hushlist/hushlist.yml")),
                Some(PathBuf::from("/etc/hushlist/hushlist.yaml")),
                xdg_dirs.as_ref().map(|dirs| PathBuf::from(dirs.config_dir()).join("hushlist.yml")),
                xdg_dirs.as_ref().map(|dirs| PathBuf::from(dirs.config_dir()).join("hushlist.yaml")),
                std::env::current_dir().map(|p| p.join("hushlist.yml")).ok(),
                std::env::current_dir().map(|p| p.join("hushlist.yaml")).ok(),
            ];

            let found = inferred_locations.iter()
                .flatten()
                .find(|p| p.as_path().is_file());

            match found {
                Some(path) => parse_configuration_file(path)?,
                /* Environment-only deployments are fine */
                None => Configuration::default(),
            }
        }
    };

    configuration.apply_environment(|name| std::env::var(name).ok());
    Ok(configuration)
}
