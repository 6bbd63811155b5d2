use warp;
use warp::Filter;
use warp::http::Method;
use byte_unit::Byte as ByteSize;
use std::convert::Infallible;
use std::net::SocketAddr;


#[derive(Debug)]
pub struct PayloadTooLarge;
impl warp::reject::Reject for PayloadTooLarge {}

pub fn content_length_filter(size_limit: ByteSize) -> impl Filter<Extract = (), Error = warp::Rejection> + Clone {
    warp::header("content-length").and_then(move |length: u64| async move {
        let bytes_max = size_limit.as_u64();
        match bytes_max != 0 && length > bytes_max {
            true => Err(warp::reject::custom(PayloadTooLarge)),
            false => Ok(())
        }
    }).untuple_one()
}


pub fn cors(origins: &Vec<String>) -> warp::cors::Builder {
    warp::cors()
        .allow_methods(&[Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(["content-type", "x-request-id"])
        .allow_origins(origins.iter().map(|s| s.as_str()))
}


/// What the handlers get to know about the caller
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub request_id: Option<String>,
}

impl RequestContext {
    /// The request ID for log lines, "?" if the proxy did not set one
    pub fn rid(&self) -> &str {
        self.request_id.as_deref().unwrap_or("?")
    }
}

/// First X-Forwarded-For entry, then X-Real-IP, then the TCP peer
fn infer_client_ip(x_forwarded_for: Option<String>, x_real_ip: Option<String>, remote_addr: Option<SocketAddr>) -> Option<String> {
    x_forwarded_for
        .map(|forwarded_for| forwarded_for.split(',').next().map(|s| s.trim().to_string())).flatten()
        .filter(|ip| !ip.is_empty())
        .or(x_real_ip.map(|ip| ip.trim().to_string()).filter(|ip| !ip.is_empty()))
        .or(remote_addr.map(|addr| addr.ip().to_string()))
}

pub fn request_context() -> impl Filter<Extract = (RequestContext,), Error = warp::Rejection> + Clone {
    warp::header::optional("x-forwarded-for")
        .and(warp::header::optional("x-real-ip"))
        .and(warp::addr::remote())
        .and(warp::header::optional("user-agent"))
        .and(warp::header::optional("x-request-id"))
        .map(|forwarded_for, real_ip, remote_addr, user_agent, request_id| RequestContext {
            client_ip: infer_client_ip(forwarded_for, real_ip, remote_addr),
            user_agent,
            request_id,
        })
}


pub fn request_logger(request_info: warp::log::Info) {
    if request_info.path() == "/" {
        /* Do not log the ping route, as this could get very verbose with active monitoring */
        return;
    }

    let headers = request_info.request_headers();
    let header = |name: &str| headers.get(name).map(|v| v.to_str().map(|s| String::from(s)).ok()).flatten();
    let request_id = header("x-request-id").unwrap_or(String::from("?"));
    let client_ip = infer_client_ip(header("x-forwarded-for"), header("x-real-ip"), request_info.remote_addr())
        .unwrap_or(String::from("?"));
    let content_length = header("content-length").unwrap_or(String::from("0"));

    log::info!(
        rid = request_id.as_str();
        "[request] {} {} {:?} from {} length {} status {}",
        request_info.method(),
        request_info.path(),
        request_info.version(),
        client_ip,
        content_length,
        request_info.status().as_u16(),
    );
}


pub async fn handle_rejection(rejection: warp::Rejection) -> Result<impl warp::Reply, Infallible> {
    log::debug!("rejecting request: {:?}", rejection);

    if rejection.is_not_found() {
        Ok(warp::reply::with_status("KO", warp::http::StatusCode::NOT_FOUND))
    } else if let Some(PayloadTooLarge) = rejection.find() {
        Ok(warp::reply::with_status("KO", warp::http::StatusCode::PAYLOAD_TOO_LARGE))
    } else {
        Ok(warp::reply::with_status("KO", warp::http::StatusCode::BAD_REQUEST))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarded_for_wins() {
        let ip = infer_client_ip(
            Some("198.51.100.1, 10.0.0.1".into()),
            Some("10.0.0.2".into()),
            Some("127.0.0.1:4000".parse().unwrap()),
        );
        assert_eq!(ip.as_deref(), Some("198.51.100.1"));
    }

    #[test]
    fn real_ip_then_peer() {
        assert_eq!(
            infer_client_ip(None, Some("10.0.0.2".into()), Some("127.0.0.1:4000".parse().unwrap())).as_deref(),
            Some("10.0.0.2")
        );
        assert_eq!(
            infer_client_ip(Some(" ".into()), None, Some("127.0.0.1:4000".parse().unwrap())).as_deref(),
            Some("127.0.0.1")
        );
        assert_eq!(infer_client_ip(None, None, None), None);
    }

    #[tokio::test]
    async fn context_is_read_from_headers() {
        let context = warp::test::request()
            .header("x-forwarded-for", "203.0.113.7")
            .header("user-agent", "Mozilla/5.0")
            .header("x-request-id", "req-1")
            .filter(&request_context())
            .await
            .unwrap();

        assert_eq!(context.client_ip.as_deref(), Some("203.0.113.7"));
        assert_eq!(context.user_agent.as_deref(), Some("Mozilla/5.0"));
        assert_eq!(context.rid(), "req-1");
    }

    #[tokio::test]
    async fn oversized_payload_is_rejected() {
        let filter = content_length_filter(ByteSize::from_u64(10));
        assert!(warp::test::request().header("content-length", "5").filter(&filter).await.is_ok());
        assert!(warp::test::request().header("content-length", "11").filter(&filter).await.is_err());
    }
}
