use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::error;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::config::ServiceConfig;
use crate::service::{self, ErrorBody, TestConfigRequest};

pub fn routes(
    config: Arc<RwLock<ServiceConfig>>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["POST", "OPTIONS"])
        .allow_headers(vec!["content-type"]);

    let with_config = warp::any().map(move || config.clone());

    let submit = warp::post()
        .and(warp::body::json())
        .and(with_config)
        .and_then(handle_test_config);

    // Plain OPTIONS without preflight headers still gets a 200
    let options = warp::options().map(warp::reply);

    let test_config = warp::path!("api" / "test-config").and(submit.or(options));

    let healthz = warp::path!("healthz").and(warp::get()).map(|| "ok");

    test_config
        .or(healthz)
        .recover(handle_rejection)
        .with(cors)
}

pub async fn serve(addr: SocketAddr, config: Arc<RwLock<ServiceConfig>>) {
    warp::serve(routes(config)).run(addr).await;
}

async fn handle_test_config(
    request: TestConfigRequest,
    config: Arc<RwLock<ServiceConfig>>,
) -> Result<warp::reply::Response, Infallible> {
    let timeout_ms = config.read().await.default_timeout_ms;

    let reply = match service::test_config(request, timeout_ms).await {
        Ok(reply) => warp::reply::with_status(warp::reply::json(&reply), StatusCode::OK),
        Err(e) => {
            let status = if e.is_client_error() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            warp::reply::with_status(warp::reply::json(&ErrorBody::from(&e)), status)
        }
    };
    Ok(reply.into_response())
}

async fn handle_rejection(err: Rejection) -> Result<warp::reply::Response, Infallible> {
    // A bad body only happens on POST, so it wins over the method
    // mismatch the OPTIONS branch adds to the same rejection.
    let (status, message) = if err.find::<warp::filters::body::BodyDeserializeError>().is_some()
        || err.find::<warp::reject::UnsupportedMediaType>().is_some()
    {
        (StatusCode::BAD_REQUEST, "Invalid request body.")
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not Found")
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
    } else {
        error!("unhandled rejection: {:?}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
    };

    let body = ErrorBody {
        message: message.to_string(),
        error: None,
    };
    Ok(warp::reply::with_status(warp::reply::json(&body), status).into_response())
}
