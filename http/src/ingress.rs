//! Route table and Hyper serve loop.
//!
//! Exact-and-parameter routing on `matchit`; one `info_span` per request
//! carrying method, path, and a generated request id.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use kickflip_core::Id;
use tokio::net::TcpListener;
use tracing::Instrument;

use crate::handlers;
use crate::respond::{self, not_found, with_session, HttpResponse};
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Products,
    Cart,
    CartAdd,
    CartRemove,
    CartQuantity,
    Checkout,
    PayInit,
    PayConfirm,
    OrderDetail,
}

/// The application's route table plus shared state.
pub struct AppRouter {
    state: AppState,
    routes: matchit::Router<Route>,
}

impl AppRouter {
    pub fn new(state: AppState) -> Result<Self, matchit::InsertError> {
        let mut routes = matchit::Router::new();
        routes.insert("/products", Route::Products)?;
        routes.insert("/cart", Route::Cart)?;
        routes.insert("/cart/add", Route::CartAdd)?;
        routes.insert("/cart/remove", Route::CartRemove)?;
        routes.insert("/cart/quantity", Route::CartQuantity)?;
        routes.insert("/checkout", Route::Checkout)?;
        routes.insert("/pay/confirm", Route::PayConfirm)?;
        routes.insert("/pay/{order_id}", Route::PayInit)?;
        routes.insert("/orders/{id}", Route::OrderDetail)?;
        Ok(Self { state, routes })
    }

    /// Resolve and run one request.
    pub async fn dispatch(&self, req: Request<Incoming>) -> HttpResponse {
        let (sid, new_session) = respond::session_id(&req);
        let user = respond::user_id(&req);
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let query = req.uri().query().unwrap_or("").to_string();

        let (route, order_id) = match self.routes.at(&path) {
            Ok(hit) => {
                let param: Option<Id> = hit
                    .params
                    .iter()
                    .next()
                    .and_then(|(_, value)| value.parse().ok());
                (*hit.value, param)
            }
            Err(_) => return with_session(not_found(), &sid, new_session),
        };

        let body = match req.into_body().collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read request body");
                return respond::message(StatusCode::BAD_REQUEST, "unreadable request body");
            }
        };

        let response = self
            .run(route, &method, &sid, user, order_id, &query, &body)
            .await;
        with_session(response, &sid, new_session)
    }

    #[allow(clippy::too_many_arguments)]
    async fn run(
        &self,
        route: Route,
        method: &Method,
        sid: &str,
        user: Option<Id>,
        order_id: Option<Id>,
        query: &str,
        body: &Bytes,
    ) -> HttpResponse {
        let state = &self.state;

        match (route, method) {
            (Route::Products, &Method::GET) => handlers::products(state).await,

            (Route::Cart, &Method::GET) => handlers::view_cart(state, sid).await,
            (Route::CartAdd, &Method::POST) => match form(body) {
                Ok(form) => handlers::add_to_cart(state, sid, form).await,
                Err(res) => res,
            },
            (Route::CartRemove, &Method::POST) => match form(body) {
                Ok(form) => handlers::remove_from_cart(state, sid, form).await,
                Err(res) => res,
            },
            (Route::CartQuantity, &Method::POST) => match form(body) {
                Ok(form) => handlers::set_quantity(state, sid, form).await,
                Err(res) => res,
            },

            (Route::Checkout, &Method::GET) => match user {
                Some(user) => handlers::checkout_form(state, sid, user).await,
                None => respond::unauthorized(),
            },
            (Route::Checkout, &Method::POST) => match user {
                Some(user) => match form(body) {
                    Ok(form) => handlers::place_order(state, sid, user, form).await,
                    Err(res) => res,
                },
                None => respond::unauthorized(),
            },

            (Route::PayInit, &Method::GET) => match (user, order_id) {
                (Some(user), Some(order_id)) => handlers::pay_init(state, user, order_id).await,
                (None, _) => respond::unauthorized(),
                (_, None) => not_found(),
            },
            // The provider may come back with GET (query) or POST (form).
            (Route::PayConfirm, &Method::GET) => {
                let params = serde_urlencoded::from_str(query).unwrap_or_default();
                handlers::pay_confirm(state, sid, params).await
            }
            (Route::PayConfirm, &Method::POST) => {
                let params = serde_urlencoded::from_bytes(body).unwrap_or_default();
                handlers::pay_confirm(state, sid, params).await
            }

            (Route::OrderDetail, &Method::GET) => match (user, order_id) {
                (Some(user), Some(order_id)) => {
                    handlers::order_detail(state, user, order_id).await
                }
                (None, _) => respond::unauthorized(),
                (_, None) => not_found(),
            },

            _ => respond::message(StatusCode::METHOD_NOT_ALLOWED, "method not allowed"),
        }
    }
}

fn form<T: serde::de::DeserializeOwned>(body: &Bytes) -> Result<T, HttpResponse> {
    serde_urlencoded::from_bytes(body)
        .map_err(|e| respond::message(StatusCode::BAD_REQUEST, &format!("bad form: {e}")))
}

/// Bind and serve until the process is stopped.
pub async fn serve(
    addr: SocketAddr,
    state: AppState,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let router = Arc::new(AppRouter::new(state)?);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("kickflip HTTP ingress listening on http://{addr}");

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let router = router.clone();

        tokio::task::spawn(async move {
            let service = service_fn(move |req: Request<Incoming>| {
                let router = router.clone();
                async move {
                    let request_id = uuid::Uuid::new_v4().to_string();
                    let span = tracing::info_span!(
                        "HTTPRequest",
                        http.method = %req.method(),
                        http.path = %req.uri().path(),
                        http.request_id = %request_id
                    );
                    Ok::<_, std::convert::Infallible>(router.dispatch(req).instrument(span).await)
                }
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                tracing::error!("error serving connection: {err:?}");
            }
        });
    }
}
