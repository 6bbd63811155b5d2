use crate::middleware::{RequestContext, content_length_filter, request_context};
use crate::waitlist::{PageVisit, WaitlistError, WaitlistResponse, WaitlistService, WaitlistSubmission};

use std::sync::Arc;
use byte_unit::Byte as ByteSize;
use serde_json;
use warp;
use warp::Filter;
use warp::http::StatusCode;

fn with_service(service: Arc<WaitlistService>) -> impl Filter<Extract = (Arc<WaitlistService>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || service.clone())
}

/// Waitlist route: store the lead, report conversions, hand the event IDs back to the page
pub async fn join_waitlist(service: Arc<WaitlistService>, context: RequestContext, submission: WaitlistSubmission) -> Result<impl warp::Reply, warp::Rejection> {
    let result = service.add_to_waitlist(submission, &context).await;
    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(WaitlistError::MissingEmail) | Err(WaitlistError::InvalidEmail) => StatusCode::BAD_REQUEST,
        Err(WaitlistError::Store(_)) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    Ok(warp::reply::with_status(warp::reply::json(&WaitlistResponse::from(&result)), status))
}

/// Page view route: report server-side under the pixel's event ID
pub async fn page_view(service: Arc<WaitlistService>, context: RequestContext, visit: PageVisit) -> Result<impl warp::Reply, warp::Rejection> {
    let receipt = service.report_page_view(visit, &context).await;
    let (status, response) = match receipt.outcome {
        Ok(()) => (StatusCode::OK, serde_json::json!({
            "success": true,
            "eventId": receipt.event_id,
        })),
        Err(e) => (StatusCode::BAD_GATEWAY, serde_json::json!({
            "success": false,
            "eventId": receipt.event_id,
            "error": e.to_string(),
        })),
    };
    Ok(warp::reply::with_status(warp::reply::json(&response), status))
}

/// All routes, without CORS, rejection handling or logging
pub fn api(service: Arc<WaitlistService>, payload_size_limit: ByteSize) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    /* Ping route for monitoring */
    let ping_route = warp::path::end()
        .and(warp::get())
        .map(|| "OK");

    let waitlist_route = warp::path!("v1" / "waitlist")
        .and(warp::post())
        .and(content_length_filter(payload_size_limit))
        .and(with_service(service.clone()))
        .and(request_context())
        .and(warp::body::json())
        .and_then(join_waitlist);

    let page_view_route = warp::path!("v1" / "page-view")
        .and(warp::post())
        .and(content_length_filter(payload_size_limit))
        .and(with_service(service))
        .and(request_context())
        .and(warp::body::json())
        .and_then(page_view);

    ping_route.or(waitlist_route).or(page_view_route)
}
