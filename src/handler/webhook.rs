use crate::{
    app::AppState,
    auditlog::CallSummary,
    callflow::{resolve_sid, CallEvent, CallLeg, CallNotice, TwimlResponse},
    config::Prompt,
    error::{CallFlowError, Result},
    notify::{format_body, Notification},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};

/// Form fields posted by the call-control provider. Every callback sends a
/// different subset, so all of them are optional here and checked per route.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallbackForm {
    pub call_sid: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub digits: Option<String>,
    pub dial_call_status: Option<String>,
    pub call_status: Option<String>,
    pub call_duration: Option<String>,
    pub body: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ParentQuery {
    pub parent: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

const DEFAULT_PAGE_SIZE: u64 = 20;
const MAX_PAGE_SIZE: u64 = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/call/start", post(call_start))
        .route("/call/gathered", post(call_gathered))
        .route("/call/gather_failed", post(call_gather_failed))
        .route("/call/human/{seed}/{index}", post(human_dial))
        .route("/call/human/{seed}/{index}/pickup", post(human_pickup))
        .route("/call/human/{seed}/{index}/ended", post(human_ended))
        .route("/call/forward/pickup", post(forward_pickup))
        .route("/call/forward/ended", post(forward_ended))
        .route("/call/status", post(call_status))
        .route("/call/fallback", post(call_fallback))
        .route("/sms", post(sms))
        .route("/heartbeat", get(heartbeat))
        .route("/web.json", get(web_json))
        .route("/calls", get(list_calls))
}

fn required(value: Option<String>, name: &'static str) -> Result<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(CallFlowError::MissingParameter(name))
}

fn caller_sid(form: &CallbackForm) -> Result<String> {
    resolve_sid(CallLeg::Caller, form.call_sid.as_deref(), None)
}

fn dialed_party_sid(form: &CallbackForm, query: &ParentQuery) -> Result<String> {
    resolve_sid(
        CallLeg::DialedParty,
        form.call_sid.as_deref(),
        query.parent.as_deref(),
    )
}

/// Runs one callback: transition, persist its audit lines atomically, then
/// hand the finished call to the notifier.
async fn dispatch(state: &AppState, sid: String, event: CallEvent) -> Result<TwimlResponse> {
    let transition = state
        .flow
        .handle(&sid, event, state.directory.as_ref(), Utc::now())
        .await?;
    let call_id = state.audit.record(&sid, &transition.log).await?;
    for line in &transition.log {
        info!(sid = %sid, call_id, "{}", line);
    }
    if let Some(notice) = transition.notice {
        notify(state, call_id, notice).await;
    }
    Ok(transition.response)
}

async fn notify(state: &AppState, call_id: i64, notice: CallNotice) {
    let lines = match state.audit.read_all(call_id).await {
        Ok(lines) => lines,
        Err(e) => {
            warn!(call_id, "notification skipped, audit log unreadable: {}", e);
            return;
        }
    };
    let notification = Notification {
        subject: notice.subject,
        body: format_body(&notice.summary, &lines),
    };
    if let Err(e) = state.notifier.send(notification) {
        warn!(call_id, "notification not queued: {}", e);
    }
}

async fn call_start(
    State(state): State<AppState>,
    Form(form): Form<CallbackForm>,
) -> Result<TwimlResponse> {
    let sid = caller_sid(&form)?;
    let event = CallEvent::Start {
        from: required(form.from, "From")?,
        to: form
            .to
            .filter(|to| !to.trim().is_empty())
            .unwrap_or_else(|| "-".to_string()),
    };
    dispatch(&state, sid, event).await
}

async fn call_gathered(
    State(state): State<AppState>,
    Form(form): Form<CallbackForm>,
) -> Result<TwimlResponse> {
    let sid = caller_sid(&form)?;
    let event = CallEvent::Gathered {
        digits: required(form.digits, "Digits")?,
    };
    dispatch(&state, sid, event).await
}

async fn call_gather_failed(
    State(state): State<AppState>,
    Form(form): Form<CallbackForm>,
) -> Result<TwimlResponse> {
    let sid = caller_sid(&form)?;
    dispatch(&state, sid, CallEvent::GatherFailed).await
}

async fn human_dial(
    State(state): State<AppState>,
    Path((seed, index)): Path<(u64, usize)>,
    Form(form): Form<CallbackForm>,
) -> Result<TwimlResponse> {
    let sid = caller_sid(&form)?;
    dispatch(&state, sid, CallEvent::DialHuman { seed, index }).await
}

async fn human_pickup(
    State(state): State<AppState>,
    Path((seed, index)): Path<(u64, usize)>,
    Query(query): Query<ParentQuery>,
    Form(form): Form<CallbackForm>,
) -> Result<TwimlResponse> {
    let sid = dialed_party_sid(&form, &query)?;
    dispatch(&state, sid, CallEvent::HumanPickup { seed, index }).await
}

async fn human_ended(
    State(state): State<AppState>,
    Path((seed, index)): Path<(u64, usize)>,
    Form(form): Form<CallbackForm>,
) -> Result<TwimlResponse> {
    let sid = caller_sid(&form)?;
    let event = CallEvent::HumanEnded {
        seed,
        index,
        status: required(form.dial_call_status, "DialCallStatus")?,
    };
    dispatch(&state, sid, event).await
}

async fn forward_pickup(
    State(state): State<AppState>,
    Query(query): Query<ParentQuery>,
    Form(form): Form<CallbackForm>,
) -> Result<TwimlResponse> {
    let sid = dialed_party_sid(&form, &query)?;
    dispatch(&state, sid, CallEvent::ForwardPickup).await
}

async fn forward_ended(
    State(state): State<AppState>,
    Form(form): Form<CallbackForm>,
) -> Result<TwimlResponse> {
    let sid = caller_sid(&form)?;
    let event = CallEvent::ForwardEnded {
        status: required(form.dial_call_status, "DialCallStatus")?,
    };
    dispatch(&state, sid, event).await
}

async fn call_status(
    State(state): State<AppState>,
    Form(form): Form<CallbackForm>,
) -> Result<TwimlResponse> {
    let sid = caller_sid(&form)?;
    let event = CallEvent::Terminated {
        from: required(form.from, "From")?,
        status: required(form.call_status, "CallStatus")?,
        duration: required(form.call_duration, "CallDuration")?,
    };
    dispatch(&state, sid, event).await
}

/// Target of the provider's fallback URL after a callback failed. Touches no
/// storage so it still answers while the database is down.
async fn call_fallback(State(state): State<AppState>) -> TwimlResponse {
    warn!("fallback instruction requested");
    TwimlResponse::new()
        .with(state.flow.prompt(&state.config.voice.fallback))
        .hangup()
}

async fn sms(Form(form): Form<CallbackForm>) -> TwimlResponse {
    info!(
        from = form.from.as_deref().unwrap_or("-"),
        body = form.body.as_deref().unwrap_or(""),
        "inbound sms"
    );
    TwimlResponse::new()
}

async fn heartbeat(State(state): State<AppState>) -> Response {
    match state.audit.ping().await {
        Ok(()) => (StatusCode::OK, "alive").into_response(),
        Err(e) => {
            warn!("heartbeat failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable").into_response()
        }
    }
}

async fn web_json(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let feed = match state.directory.active_message(Utc::now()).await? {
        Some(message) => serde_json::json!({
            "short": message.web_short_text,
            "long": message.web_long_text,
        }),
        None => {
            let short = match &state.config.voice.no_launch {
                Prompt::Say { text } => text.clone(),
                Prompt::Play { .. } => String::new(),
            };
            serde_json::json!({ "short": short, "long": "" })
        }
    };
    Ok(Json(feed))
}

async fn list_calls(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<CallSummary>>> {
    let limit = page
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let calls = state
        .audit
        .read_first_lines(page.offset.unwrap_or(0), limit)
        .await?;
    Ok(Json(calls))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_rejects_blank_values() {
        assert_eq!(required(Some("+441234".to_string()), "From").unwrap(), "+441234");
        assert!(matches!(
            required(Some("   ".to_string()), "From"),
            Err(CallFlowError::MissingParameter("From"))
        ));
        assert!(matches!(
            required(None, "CallDuration"),
            Err(CallFlowError::MissingParameter("CallDuration"))
        ));
    }

    #[test]
    fn test_callback_form_uses_provider_names() {
        let form: CallbackForm = serde_json::from_value(serde_json::json!({
            "CallSid": "CA1",
            "DialCallStatus": "busy",
            "CallDuration": "12",
        }))
        .unwrap();
        assert_eq!(form.call_sid.as_deref(), Some("CA1"));
        assert_eq!(form.dial_call_status.as_deref(), Some("busy"));
        assert_eq!(form.call_duration.as_deref(), Some("12"));
        assert!(form.digits.is_none());
    }
}
