//! Response builders, cookie/identity extraction, and the error-to-response
//! mapping.

use bytes::Bytes;
use http::{header, Request, Response, StatusCode};
use http_body_util::Full;
use kickflip_checkout::CheckoutError;
use kickflip_core::Id;
use serde::Serialize;

pub type HttpResponse = Response<Full<Bytes>>;

pub const SESSION_COOKIE: &str = "sid";
pub const USER_HEADER: &str = "x-user-id";

pub fn json<T: Serialize>(status: StatusCode, value: &T) -> HttpResponse {
    let body = serde_json::to_vec(value).unwrap_or_else(|_| b"{}".to_vec());
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

pub fn message(status: StatusCode, text: &str) -> HttpResponse {
    json(status, &serde_json::json!({ "message": text }))
}

/// `303 See Other` with the user-facing message carried as a `msg` query
/// parameter, standing in for a flash message.
pub fn see_other(location: &str, msg: Option<&str>) -> HttpResponse {
    let location = match msg {
        Some(msg) => {
            let encoded =
                serde_urlencoded::to_string([("msg", msg)]).unwrap_or_default();
            let sep = if location.contains('?') { '&' } else { '?' };
            format!("{location}{sep}{encoded}")
        }
        None => location.to_string(),
    };

    Response::builder()
        .status(StatusCode::SEE_OTHER)
        .header(header::LOCATION, location)
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

pub fn not_found() -> HttpResponse {
    message(StatusCode::NOT_FOUND, "not found")
}

/// The visitor's session id from the `sid` cookie, or a freshly minted one.
/// The second element says whether the caller must set the cookie on the
/// response.
pub fn session_id<B>(req: &Request<B>) -> (String, bool) {
    let from_cookie = req
        .headers()
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|cookies| {
            cookies.split(';').find_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                (name == SESSION_COOKIE && !value.is_empty()).then(|| value.to_string())
            })
        });

    match from_cookie {
        Some(sid) => (sid, false),
        None => (uuid::Uuid::new_v4().to_string(), true),
    }
}

/// Attach the session cookie when the session is new.
pub fn with_session(mut response: HttpResponse, sid: &str, is_new: bool) -> HttpResponse {
    if is_new {
        if let Ok(value) =
            http::HeaderValue::from_str(&format!("{SESSION_COOKIE}={sid}; Path=/; HttpOnly"))
        {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
    response
}

/// The authenticated user from the trusted `x-user-id` header.
pub fn user_id<B>(req: &Request<B>) -> Option<Id> {
    req.headers()
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

pub fn unauthorized() -> HttpResponse {
    message(StatusCode::UNAUTHORIZED, "sign in to continue")
}

/// Map a pipeline error to its user-facing response.
///
/// Nothing here is fatal: validation problems re-render with a message,
/// not-found and provider problems redirect to a known-good page.
pub fn checkout_error(err: &CheckoutError) -> HttpResponse {
    match err {
        CheckoutError::EmptyCart => see_other("/cart", Some("Your cart is empty.")),
        CheckoutError::AddressRequired
        | CheckoutError::InvalidAddress(_)
        | CheckoutError::Cart(_) => {
            json(
                StatusCode::UNPROCESSABLE_ENTITY,
                &serde_json::json!({ "error": err.to_string() }),
            )
        }
        CheckoutError::ProductNotFound(_) | CheckoutError::InsufficientStock { .. } => see_other(
            "/cart",
            Some(&format!("Checkout could not be completed: {err}")),
        ),
        CheckoutError::UnknownOrder(_) => not_found(),
        CheckoutError::Forbidden => message(StatusCode::FORBIDDEN, "not your order"),
        CheckoutError::NotPayable(_) | CheckoutError::Status(_) => {
            message(StatusCode::CONFLICT, &err.to_string())
        }
        CheckoutError::MalformedBuyOrder(_) => see_other(
            "/panel",
            Some("There was a problem confirming your payment."),
        ),
        CheckoutError::Payment(e) => {
            tracing::error!(error = %e, "payment provider error");
            see_other("/panel", Some("Could not reach the payment provider."))
        }
        CheckoutError::Store(e) => {
            tracing::error!(error = %e, "storage error");
            message(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
        CheckoutError::Session(e) => {
            tracing::error!(error = %e, "session error");
            message(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}
