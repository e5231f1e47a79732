use serde::Serialize;

use super::prelude::*;

fn json_event<T: Serialize>(name: &str, payload: &T) -> Event {
    Event::default()
        .event(name)
        .json_data(payload)
        .unwrap_or_else(|_| Event::default().event("error").data("encode_failed"))
}

/// Streams an execution's new log lines and status changes until it
/// reaches a terminal state.
pub async fn sse_execution_events(
    State(app_state): State<AppState>,
    _session: AuthSession,
    Path(id): Path<Uuid>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let state = app_state.clone();
    let s = stream! {
        let mut sent_logs = 0usize;
        let mut last_status = None;
        let mut intv = tokio::time::interval(Duration::from_millis(800));
        loop {
            intv.tick().await;
            let execution = match state.workflows.get_execution(id).await {
                Ok(execution) => execution,
                Err(AppError::NotFound(_)) => {
                    yield Ok::<Event, Infallible>(Event::default().event("error").data("not_found"));
                    break;
                }
                Err(_) => {
                    yield Ok::<Event, Infallible>(Event::default().event("error").data("fetch_failed"));
                    continue;
                }
            };

            for log in execution.logs.iter().skip(sent_logs) {
                yield Ok::<Event, Infallible>(json_event("log", log));
            }
            sent_logs = execution.logs.len();

            if last_status != Some(execution.status) {
                last_status = Some(execution.status);
                yield Ok::<Event, Infallible>(json_event("status", &json!({
                    "status": execution.status,
                    "currentStep": execution.current_step,
                    "error": execution.error,
                })));
            }

            if execution.status.is_terminal() {
                break;
            }
        }
    };

    Sse::new(s).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(10))
            .text("keepalive"),
    )
}
