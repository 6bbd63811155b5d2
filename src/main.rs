mod config;
mod conversions;
mod events;
mod logging;
mod middleware;
mod routes;
mod stores;
mod waitlist;

#[cfg(test)]
mod testing;

use crate::conversions::ConversionsApi;
use crate::stores::airtable::Airtable;
use crate::waitlist::WaitlistService;

use clap::Parser;
use tokio;
use log;
use warp;
use warp::Filter;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

/// Waitlist backend: stores leads, reports conversions
#[derive(Parser)]
#[command(version, about)]
struct Arguments {
    /// Path to the configuration file (defaults to $HUSHLIST_CONFIG, then well-known locations)
    config: Option<PathBuf>,
}

/// hushlist's entry point: welcome!
#[tokio::main]
async fn main() {
    /* Set a panic hook: we want a task panic to crash the whole process */
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_panic(info);
        std::process::exit(1);
    }));

    /* Locate and parse the configuration file, see config.rs */
    let arguments = Arguments::parse();
    let configuration = match config::get_configuration(arguments.config.as_ref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to process configuration file: {}", e);
            std::process::exit(1);
        }
    };

    /* Keep the handle around, dropping it stops the logger */
    let _logger = match logging::init_logger(&configuration.logging) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("failed to start logger: {}", e);
            std::process::exit(1);
        }
    };

    let store = Airtable::new(configuration.airtable.clone());
    let conversions = Arc::new(ConversionsApi::new(configuration.facebook.clone()));

    if configuration.testing {
        log::warn!("testing mode: leads are not stored and conversions are not reported");
    } else {
        if !store.is_configured() {
            log::warn!("airtable is not configured, every signup will fail");
        }
        if !conversions.is_configured() {
            log::warn!("facebook is not configured, conversions will not be reported");
        }
    }

    let service = Arc::new(WaitlistService::new(Arc::new(store), conversions, configuration.testing));
    let api = routes::api(service, configuration.server.payload_size_limit)
        .with(middleware::cors(&configuration.server.origins))
        .recover(middleware::handle_rejection)
        .with(warp::log::custom(middleware::request_logger));

    let address = SocketAddr::new(configuration.server.ip, configuration.server.port);
    log::info!("listening on {}", address);
    warp::serve(api).run(address).await;
}
