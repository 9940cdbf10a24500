use futures::{SinkExt, Stream, StreamExt};
use lefacade_core::{
    FacadeError, FacadeStatus, LeAclData, LeAclFacade, LeConnectionMsg, LeHandleMsg, SimOptions,
    SimulatedController, StatusCode as RpcStatus,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use warp::http::StatusCode;
use warp::reply::Response;
use warp::ws::{Message, WebSocket, Ws};
use warp::{Filter, Reply};

// ============================================================================
// SERVER CONTEXT
// ============================================================================

/// Shared state behind every route
pub struct ServerContext {
    pub facade: LeAclFacade,
    pub controller: Arc<SimulatedController>,
    pub start_time: Instant,
}

// ============================================================================
// API RESPONSE TYPES
// ============================================================================

#[derive(Serialize, Deserialize, Debug)]
struct ErrorBody {
    status: RpcStatus,
    message: String,
}

#[derive(Serialize, Deserialize, Debug)]
struct OkBody {
    status: RpcStatus,
}

#[derive(Serialize)]
struct StatusResponse {
    version: String,
    uptime_seconds: u64,
    facade: FacadeStatus,
    simulator: SimOptions,
}

// ============================================================================
// SERVER START
// ============================================================================

pub fn routes(
    ctx: Arc<ServerContext>,
) -> impl Filter<Extract = (Response,), Error = warp::Rejection> + Clone {
    let ctx_filter = warp::any().map(move || ctx.clone());

    // 1. CreateConnection stream
    let connect_route = warp::path!("ws" / "connect")
        .and(warp::get())
        .and(warp::query::<LeConnectionMsg>())
        .and(warp::ws())
        .and(ctx_filter.clone())
        .map(|request: LeConnectionMsg, ws: Ws, ctx: Arc<ServerContext>| {
            match ctx.facade.create_connection(&request) {
                Ok(stream) => ws
                    .on_upgrade(move |socket| forward_stream(socket, stream, "connect"))
                    .into_response(),
                Err(e) => error_reply(&e),
            }
        });

    // 2. FetchIncomingConnection stream
    let incoming_route = warp::path!("ws" / "incoming")
        .and(warp::get())
        .and(warp::ws())
        .and(ctx_filter.clone())
        .map(|ws: Ws, ctx: Arc<ServerContext>| match ctx.facade.fetch_incoming_connection() {
            Ok(stream) => ws
                .on_upgrade(move |socket| forward_stream(socket, stream, "incoming"))
                .into_response(),
            Err(e) => error_reply(&e),
        });

    // 3. FetchAclData stream
    let data_route = warp::path!("ws" / "data")
        .and(warp::get())
        .and(warp::ws())
        .and(ctx_filter.clone())
        .map(|ws: Ws, ctx: Arc<ServerContext>| match ctx.facade.fetch_acl_data() {
            Ok(stream) => ws
                .on_upgrade(move |socket| forward_stream(socket, stream, "data"))
                .into_response(),
            Err(e) => error_reply(&e),
        });

    // 4. Disconnect
    let disconnect_route = warp::path!("api" / "disconnect")
        .and(warp::post())
        .and(warp::body::json::<LeHandleMsg>())
        .and(ctx_filter.clone())
        .map(|request: LeHandleMsg, ctx: Arc<ServerContext>| {
            result_reply(ctx.facade.disconnect(&request))
        });

    // 5. SendAclData
    let send_route = warp::path!("api" / "send")
        .and(warp::post())
        .and(warp::body::json::<LeAclData>())
        .and(ctx_filter.clone())
        .and_then(handle_send);

    // 6. Status
    let status_route = warp::path!("api" / "status")
        .and(warp::get())
        .and(ctx_filter)
        .map(|ctx: Arc<ServerContext>| {
            let response = StatusResponse {
                version: lefacade_core::VERSION.to_string(),
                uptime_seconds: ctx.start_time.elapsed().as_secs(),
                facade: ctx.facade.status(),
                simulator: ctx.controller.options(),
            };
            warp::reply::json(&response).into_response()
        });

    connect_route
        .or(incoming_route)
        .unify()
        .or(data_route)
        .unify()
        .or(disconnect_route)
        .unify()
        .or(send_route)
        .unify()
        .or(status_route)
        .unify()
}

/// Serve until the process exits
pub async fn serve(port: u16, ctx: Arc<ServerContext>) {
    info!("Starting WebSocket + HTTP server on 0.0.0.0:{}", port);
    let cors = warp::cors().allow_any_origin();
    warp::serve(routes(ctx).with(cors)).run(([0, 0, 0, 0], port)).await;
}

// ============================================================================
// API HANDLERS
// ============================================================================

async fn handle_send(
    request: LeAclData,
    ctx: Arc<ServerContext>,
) -> Result<Response, warp::Rejection> {
    debug!(
        "Send {} bytes to handle 0x{:03x}",
        request.payload.len(),
        request.handle
    );
    Ok(result_reply(ctx.facade.send_acl_data(request).await))
}

/// HTTP status for an RPC status
pub fn http_status(status: RpcStatus) -> StatusCode {
    match status {
        RpcStatus::Ok => StatusCode::OK,
        RpcStatus::InvalidArgument => StatusCode::BAD_REQUEST,
        RpcStatus::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
        RpcStatus::Aborted => StatusCode::CONFLICT,
        RpcStatus::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        RpcStatus::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn error_reply(err: &FacadeError) -> Response {
    let status = err.status();
    warn!("Request failed: {} ({})", err, status);
    let body = ErrorBody {
        status,
        message: err.to_string(),
    };
    warp::reply::with_status(warp::reply::json(&body), http_status(status)).into_response()
}

fn result_reply(result: Result<(), FacadeError>) -> Response {
    match result {
        Ok(()) => warp::reply::json(&OkBody {
            status: RpcStatus::Ok,
        })
        .into_response(),
        Err(e) => error_reply(&e),
    }
}

// ============================================================================
// WEBSOCKET FORWARDING
// ============================================================================

/// Push every stream item to the socket as JSON. Closing the socket drops
/// the stream, which cancels a still-pending request.
async fn forward_stream<S>(ws: WebSocket, mut events: S, label: &'static str)
where
    S: Stream + Unpin,
    S::Item: Serialize,
{
    let (mut ws_tx, mut ws_rx) = ws.split();
    debug!("{} stream opened", label);

    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(event) => {
                    let json = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!("{} stream: failed to encode event: {}", label, e);
                            continue;
                        }
                    };
                    if ws_tx.send(Message::text(json)).await.is_err() {
                        break;
                    }
                }
                None => {
                    let _ = ws_tx.send(Message::close()).await;
                    break;
                }
            },
            incoming = ws_rx.next() => match incoming {
                Some(Ok(msg)) if !msg.is_close() => {}
                _ => break,
            },
        }
    }

    debug!("{} stream closed", label);
}
