//! HTTP layer over the process runtime

use actix_web::{get, post, web, HttpResponse, Responder, Result as ActixResult};
use actix_ws::Message;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;
use workcore::{EngineError, ProcessError, ProcessStatus, Value};
use workruntime::{HandlerRegistry, ProcessOutcome, ProcessRuntime, RuntimeConfig};

/// Application state shared across handlers
pub struct AppState {
    pub runtime: Arc<ProcessRuntime>,
}

/// Error response
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

impl ErrorResponse {
    fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: None,
        }
    }
}

/// Runtime with the standard handlers and built-in processes registered.
/// Must be called from within a Tokio runtime.
pub async fn build_runtime(config: RuntimeConfig) -> anyhow::Result<Arc<ProcessRuntime>> {
    let registry = Arc::new(HandlerRegistry::new());
    workhandlers::register_all(&registry)?;

    let runtime = ProcessRuntime::new(registry, config);
    workhandlers::register_processes(&runtime).await?;
    Ok(Arc::new(runtime))
}

/// Register every route; the process catch-all goes last.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health_check)
        .service(list_handlers)
        .service(list_processes)
        .service(abort_work_item)
        .service(websocket_events)
        .service(start_process);
}

/// Health check endpoint
#[get("/health")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "workengine"
    }))
}

/// List registered work item handlers
#[get("/api/handlers")]
async fn list_handlers(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    let registry = data.runtime.registry();

    let handlers: Vec<_> = registry
        .list_types()
        .iter()
        .map(|work_item_type| {
            let metadata = registry.metadata(work_item_type).unwrap_or_default();
            let parameters: Vec<_> = metadata
                .parameters
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "name": p.name,
                        "description": p.description,
                        "required": p.required,
                    })
                })
                .collect();
            serde_json::json!({
                "type": work_item_type,
                "description": metadata.description,
                "category": metadata.category,
                "parameters": parameters,
            })
        })
        .collect();

    Ok(HttpResponse::Ok().json(handlers))
}

/// List registered process definitions
#[get("/api/processes")]
async fn list_processes(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    let processes: Vec<_> = data
        .runtime
        .definitions()
        .await
        .iter()
        .map(|d| {
            serde_json::json!({
                "id": d.id,
                "name": d.name,
                "description": d.description,
                "tasks": d.tasks.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
                "outputs": d.outputs,
            })
        })
        .collect();

    Ok(HttpResponse::Ok().json(processes))
}

/// Request cancellation of an in-flight work item
#[post("/api/work-items/{id}/abort")]
async fn abort_work_item(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> ActixResult<impl Responder> {
    let work_item_id = path.into_inner();

    match data.runtime.engine().abort_work_item(work_item_id) {
        Ok(()) => {
            info!("Abort requested for work item {}", work_item_id);
            Ok(HttpResponse::Accepted().json(serde_json::json!({
                "id": work_item_id,
                "message": "Abort requested"
            })))
        }
        Err(e) => Ok(HttpResponse::NotFound().json(ErrorResponse::new(e.to_string()))),
    }
}

/// WebSocket endpoint for real-time work item events
#[get("/api/events")]
async fn websocket_events(
    req: actix_web::HttpRequest,
    stream: web::Payload,
    data: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let (res, mut session, mut msg_stream) = actix_ws::handle(&req, stream)?;

    info!("WebSocket client connected");

    let mut events = data.runtime.subscribe_events();

    actix_web::rt::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Ok(event) => {
                            if let Ok(json) = serde_json::to_string(&event) {
                                if session.text(json).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("WebSocket client lagged, {} events skipped", skipped);
                        }
                        Err(_) => break,
                    }
                }

                Some(Ok(msg)) = msg_stream.recv() => {
                    match msg {
                        Message::Ping(bytes) => {
                            if session.pong(&bytes).await.is_err() {
                                break;
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }

                else => break,
            }
        }

        info!("WebSocket client disconnected");
        let _ = session.close(None).await;
    });

    Ok(res)
}

/// Run a process instance to completion.
///
/// Each top-level key of the body becomes a process variable. Replies `201`
/// with the output variables on completion, `500` on an uncaught fault and
/// `409` when the instance was aborted.
#[post("/{process_id}")]
async fn start_process(
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<HashMap<String, serde_json::Value>>,
) -> ActixResult<impl Responder> {
    let process_id = path.into_inner();
    let variables: HashMap<String, Value> = body
        .into_inner()
        .into_iter()
        .map(|(k, v)| (k, Value::from(v)))
        .collect();

    info!("Starting process: {}", process_id);

    let outcome = match data.runtime.run_process(&process_id, variables).await {
        Ok(outcome) => outcome,
        Err(EngineError::Process(ProcessError::NotFound(_))) => {
            return Ok(HttpResponse::NotFound().json(ErrorResponse::new(format!(
                "Process {} not found",
                process_id
            ))));
        }
        Err(e) => {
            error!("Process {} could not run: {}", process_id, e);
            return Ok(HttpResponse::ServiceUnavailable().json(ErrorResponse::new(e.to_string())));
        }
    };

    Ok(outcome_response(&process_id, outcome))
}

/// Map a finished instance onto the response for `POST /{process_id}`
fn outcome_response(process_id: &str, outcome: ProcessOutcome) -> HttpResponse {
    match outcome.status {
        ProcessStatus::Completed => {
            let mut body = serde_json::Map::new();
            body.insert("id".to_string(), serde_json::json!(outcome.instance_id));
            for (name, value) in &outcome.variables {
                body.insert(name.clone(), value.to_json());
            }
            HttpResponse::Created().json(serde_json::Value::Object(body))
        }
        ProcessStatus::Failed => {
            let (message, code) = match &outcome.fault {
                Some(fault) => (fault.signal.message.clone(), Some(fault.code().to_string())),
                None => ("process failed".to_string(), None),
            };
            error!("Process {} failed: {}", process_id, message);
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: message,
                code,
            })
        }
        ProcessStatus::Active => {
            error!("Process {} returned while still active", process_id);
            HttpResponse::InternalServerError().json(ErrorResponse::new(
                "process returned without reaching a terminal state",
            ))
        }
        ProcessStatus::Aborted => {
            let reason = outcome
                .abort_reason
                .map(|r| r.to_string())
                .unwrap_or_else(|| "process aborted".to_string());
            warn!("Process {} aborted: {}", process_id, reason);
            HttpResponse::Conflict().json(ErrorResponse::new(reason))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{body::to_bytes, http::StatusCode};
    use workcore::AbortReason;

    fn outcome(status: ProcessStatus, abort_reason: Option<AbortReason>) -> ProcessOutcome {
        ProcessOutcome {
            instance_id: Uuid::new_v4(),
            process_id: "hello".to_string(),
            status,
            variables: HashMap::new(),
            fault: None,
            abort_reason,
        }
    }

    #[actix_web::test]
    async fn active_status_is_a_server_error_not_an_abort() {
        let resp = outcome_response("hello", outcome(ProcessStatus::Active, None));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(resp.into_body()).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(!body["error"].as_str().unwrap().contains("abort"));
    }

    #[actix_web::test]
    async fn aborted_status_is_a_conflict() {
        let resp = outcome_response(
            "hello",
            outcome(ProcessStatus::Aborted, Some(AbortReason::Requested)),
        );
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }
}
