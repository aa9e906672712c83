//! Permission updates and the live change stream.

use std::convert::Infallible;
use std::time::Duration;

use axum::Json;
use axum::extract::{Extension, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::{Stream, StreamExt};
use solari_core::models::permissions::PermissionUpdate;
use tracing::{debug, warn};

use crate::AppState;
use crate::error::AppResult;
use crate::extract::ApiJson;
use crate::middleware::auth::AuthenticatedCaller;
use crate::models::PermissionsResponse;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// `POST /permissions/update`
pub async fn update_permissions_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedCaller(actor)): Extension<AuthenticatedCaller>,
    ApiJson(update): ApiJson<PermissionUpdate>,
) -> AppResult<Json<PermissionsResponse>> {
    let resp = state.gateway.update_permissions(update, &actor).await?;
    Ok(Json(resp))
}

/// `GET /permissions/stream`: Server-Sent Events, one `permissions` event per
/// update. The observer is deregistered when the client disconnects.
pub async fn stream_permissions_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedCaller(caller)): Extension<AuthenticatedCaller>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!(observer = %caller.sub, "permission stream opened");
    let events = state
        .gateway
        .subscribe_permissions()
        .filter_map(|event| async move {
            match Event::default().event("permissions").json_data(event.as_ref()) {
                Ok(sse) => Some(Ok(sse)),
                Err(e) => {
                    warn!("failed to encode permission event: {e}");
                    None
                }
            }
        });
    Sse::new(events).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
}
