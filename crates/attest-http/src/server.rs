//! The `/assertions` HTTP surface.
//!
//! Two routes over a shared [`Database`]: POST `/assertions` submits one
//! encoded assertion, GET `/assertions/{type}` returns the matching
//! assertions as a bundle. Database calls are synchronous and run inside
//! blocking tasks.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use bytes::Bytes;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use attest_core::{decode_assertion, encode_bundle};
use attest_db::{Database, DbError};

use crate::error::Result;

/// Response header carrying the number of assertions in a bundle.
pub const ASSERTIONS_COUNT_HEADER: &str = "x-ubuntu-assertions-count";
/// Content type of an assertion bundle.
pub const BUNDLE_CONTENT_TYPE: &str = "application/x.ubuntu.assertion; bundle=y";

/// Build the router serving the assertions API.
pub fn router(db: Arc<Database>) -> Router {
    Router::new()
        .route("/assertions", post(submit_assertion))
        .route("/assertions/:assert_type", get(find_assertions))
        .with_state(db)
}

/// Bind and serve the API until the listener fails.
pub async fn serve(listener: TcpListener, db: Arc<Database>) -> Result<()> {
    info!(addr = %listener.local_addr()?, "serving assertions API");
    axum::serve(listener, router(db)).await?;
    Ok(())
}

async fn submit_assertion(State(db): State<Arc<Database>>, body: Bytes) -> Response {
    let result = tokio::task::spawn_blocking(move || {
        let assertion = decode_assertion(&body, db.registry())
            .map_err(|e| {
                debug!(error = %e, "undecodable assertion submitted");
                bad_request("cannot decode request body into an assertion")
            })?;
        db.add(&assertion).map_err(|e| match e {
            DbError::Storage(e) => {
                error!(error = %e, "storage failure while adding assertion");
                internal_error()
            }
            e => bad_request(&format!("assert failed: {e}")),
        })?;
        Ok::<_, Response>(())
    })
    .await;

    match result {
        Ok(Ok(())) => StatusCode::OK.into_response(),
        Ok(Err(response)) => response,
        Err(e) => {
            error!(error = %e, "assertion task panicked");
            internal_error()
        }
    }
}

async fn find_assertions(
    State(db): State<Arc<Database>>,
    Path(assert_type): Path<String>,
    Query(filters): Query<HashMap<String, String>>,
) -> Response {
    let result = tokio::task::spawn_blocking(move || {
        if db.registry().find(&assert_type).is_none() {
            return Err(bad_request("invalid assert type"));
        }
        let filters: Vec<(String, String)> = filters.into_iter().collect();
        match db.find_many(&assert_type, &filters) {
            Ok(found) => Ok(found),
            Err(DbError::Storage(e)) => {
                error!(error = %e, "storage failure while searching assertions");
                Err(internal_error())
            }
            Err(e) => Err(bad_request(&e.to_string())),
        }
    })
    .await;

    match result {
        Ok(Ok(found)) => bundle_response(&found),
        Ok(Err(response)) => response,
        Err(e) => {
            error!(error = %e, "assertion task panicked");
            internal_error()
        }
    }
}

fn bundle_response(found: &[attest_core::Assertion]) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static(BUNDLE_CONTENT_TYPE),
    );
    headers.insert(
        ASSERTIONS_COUNT_HEADER,
        header::HeaderValue::from(found.len() as u64),
    );
    (StatusCode::OK, headers, encode_bundle(found)).into_response()
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, message.to_string()).into_response()
}

fn internal_error() -> Response {
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}
