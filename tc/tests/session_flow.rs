//! End-to-end session tests
//!
//! These drive a full controller against the in-memory transport, playing the
//! backend side of the protocol by hand.

use std::time::Duration;

use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use tripclient::agents::AgentStatus;
use tripclient::connection::{ABNORMAL_CLOSURE, ConnectionSettings, ConnectionStatus, MemoryTransport, NORMAL_CLOSURE};
use tripclient::controller::{ControllerHandle, ControllerSettings, SessionController};
use tripclient::protocol::Answers;
use tripclient::session::{Phase, Rejection, SessionView};

const QUERY: &str = "Plan a 5-day trip to Rajasthan, mid budget";

fn spawn(transport: &MemoryTransport) -> (ControllerHandle, JoinHandle<()>) {
    let settings = ControllerSettings::new(ConnectionSettings::new("ws://planner.test/ws/plan"));
    let controller = SessionController::new(Box::new(transport.clone()), settings);
    let handle = controller.handle();
    (handle, tokio::spawn(controller.run()))
}

async fn until(handle: &ControllerHandle, predicate: impl FnMut(&SessionView) -> bool) -> SessionView {
    tokio::time::timeout(Duration::from_secs(30), handle.wait_for(predicate))
        .await
        .expect("Timed out waiting for view")
        .expect("Controller stopped")
}

async fn running_session() -> (ControllerHandle, JoinHandle<()>, MemoryTransport) {
    let transport = MemoryTransport::auto_accepting();
    let (handle, task) = spawn(&transport);
    until(&handle, |v| v.is_connected()).await;
    let transition = handle.start_planning(QUERY).await.unwrap();
    assert!(transition.is_accepted());
    (handle, task, transport)
}

/// Sent frames as JSON, keepalive pings excluded
fn sent_messages(transport: &MemoryTransport) -> Vec<Value> {
    transport
        .sent_frames()
        .iter()
        .map(|f| serde_json::from_str::<Value>(f).unwrap())
        .filter(|v| v["type"] != "ping")
        .collect()
}

fn frame(value: Value) -> String {
    value.to_string()
}

#[tokio::test(start_paused = true)]
async fn test_full_planning_session() {
    let (handle, task, transport) = running_session().await;

    transport.push_frame(frame(json!({"type": "connected", "session_id": "5f0c"})));
    transport.push_frame(frame(json!({"type": "agent_start", "agent": "clarification"})));
    transport.push_frame(frame(json!({
        "type": "questions",
        "questions": [
            {"question_id": "origin", "question_text": "Where are you starting from?", "question_type": "origin_city"},
            {"question_id": "budget", "question_text": "Budget?", "options": ["budget", "mid-range", "luxury"]}
        ]
    })));

    let view = until(&handle, |v| v.phase == Phase::Questions).await;
    assert_eq!(view.questions.len(), 2);
    assert!(view.active_agent.is_none());

    let answers: Answers = [("origin", "Delhi"), ("budget", "mid-range")].into_iter().collect();
    assert!(handle.submit_answers(answers).await.unwrap().is_accepted());
    assert_eq!(handle.snapshot().await.unwrap().phase, Phase::Progress);

    for agent in ["process_answers", "planner", "geography"] {
        transport.push_frame(frame(json!({"type": "agent_start", "agent": agent})));
        transport.push_frame(frame(json!({
            "type": "agent_complete",
            "agent": agent,
            "summary": format!("{} done", agent)
        })));
    }
    let view = until(&handle, |v| v.completed == 3).await;
    assert!((view.progress - 0.3).abs() < 1e-9);
    let planner = view.agents.iter().find(|r| r.descriptor.id == "planner").unwrap();
    assert_eq!(planner.status, AgentStatus::Complete);
    assert_eq!(
        planner.payload.as_ref().and_then(|p| p.summary.as_deref()),
        Some("planner done")
    );

    transport.push_frame(frame(json!({
        "type": "planning_complete",
        "itinerary": {"trip_title": "Rajasthan Royal Circuit", "total_days": 5}
    })));
    let view = until(&handle, |v| v.phase == Phase::Result).await;
    assert_eq!(
        view.itinerary.as_ref().and_then(|i| i.trip_title()),
        Some("Rajasthan Royal Circuit")
    );
    assert!(view.active_agent.is_none());
    assert!(view.error.is_none());

    let sent = sent_messages(&transport);
    assert_eq!(
        sent,
        vec![
            json!({"type": "start_planning", "request": QUERY}),
            json!({"type": "answer_questions", "answers": {"budget": "mid-range", "origin": "Delhi"}}),
        ]
    );

    handle.shutdown().await.unwrap();
    task.await.unwrap();
    assert_eq!(transport.client_close_code(), Some(NORMAL_CLOSURE));
}

#[tokio::test(start_paused = true)]
async fn test_short_query_is_rejected_locally() {
    let transport = MemoryTransport::auto_accepting();
    let (handle, _task) = spawn(&transport);
    until(&handle, |v| v.is_connected()).await;

    let transition = handle.start_planning("Plan a trip").await.unwrap();

    assert!(matches!(transition.rejected, Some(Rejection::QueryTooShort { .. })));
    let view = handle.snapshot().await.unwrap();
    assert_eq!(view.phase, Phase::Input);
    assert!(view.error.is_some());
    assert!(sent_messages(&transport).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_backend_error_overlays_current_phase() {
    let (handle, _task, transport) = running_session().await;
    transport.push_frame(frame(json!({"type": "agent_start", "agent": "research"})));
    transport.push_frame(frame(json!({"type": "error", "error": "Planning error: upstream timeout"})));

    let view = until(&handle, |v| v.error.is_some()).await;
    assert_eq!(view.phase, Phase::Progress);
    assert!(view.active_agent.is_none());

    handle.dismiss_error().await.unwrap();
    let view = until(&handle, |v| v.error.is_none()).await;
    assert_eq!(view.phase, Phase::Progress);
    assert_eq!(sent_messages(&transport).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_bad_frames_do_not_disturb_session() {
    let (handle, _task, transport) = running_session().await;
    transport.push_frame("{definitely not json");
    transport.push_frame(frame(json!({"type": "weather", "temp": 31})));
    transport.push_frame(frame(json!({"type": "ping"})));
    transport.push_frame(frame(json!({"type": "agent_start", "agent": "planner"})));

    let view = until(&handle, |v| v.active_agent.as_deref() == Some("planner")).await;
    assert_eq!(view.phase, Phase::Progress);
    assert!(view.error.is_none());

    let stats = handle.stats().await.unwrap();
    assert_eq!(stats.received, 4);
    assert_eq!(stats.dropped, 1);
    assert_eq!(stats.ignored, 1);
    assert_eq!(stats.keepalive, 1);
}

#[tokio::test(start_paused = true)]
async fn test_abnormal_close_reconnects_after_delay() {
    let transport = MemoryTransport::auto_accepting();
    let (handle, _task) = spawn(&transport);
    until(&handle, |v| v.is_connected()).await;

    let dropped_at = Instant::now();
    transport.close_latest(Some(ABNORMAL_CLOSURE));
    until(&handle, |v| v.connection == ConnectionStatus::Disconnected).await;

    until(&handle, |v| v.is_connected()).await;
    assert!(Instant::now() - dropped_at >= Duration::from_secs(2));
    assert_eq!(transport.open_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_connection_drop_keeps_planning_progress() {
    let (handle, _task, transport) = running_session().await;
    transport.push_frame(frame(json!({"type": "agent_complete", "agent": "clarification"})));
    transport.push_frame(frame(json!({"type": "agent_start", "agent": "planner"})));
    until(&handle, |v| v.completed == 1 && v.active_agent.is_some()).await;

    transport.close_latest(Some(ABNORMAL_CLOSURE));
    let view = until(&handle, |v| v.connection == ConnectionStatus::Disconnected).await;
    assert_eq!(view.phase, Phase::Progress);
    assert_eq!(view.completed, 1);

    let view = until(&handle, |v| v.is_connected()).await;
    assert_eq!(transport.open_count(), 2);
    assert_eq!(view.phase, Phase::Progress);
    assert_eq!(view.completed, 1);
    assert_eq!(view.query, QUERY);
    assert_eq!(view.active_agent.as_deref(), Some("planner"));
    assert!(view.error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_back_to_back_question_sets_are_distinct() {
    let (handle, _task, transport) = running_session().await;
    let questions = json!({
        "type": "questions",
        "questions": [{"question_id": "pace", "question_text": "Preferred pace?"}]
    });
    transport.push_frame(frame(questions.clone()));
    transport.push_frame(frame(questions));

    let view = until(&handle, |v| v.question_round == 2).await;
    assert!(view.awaiting_answers(1));

    let answers: Answers = [("pace", "relaxed")].into_iter().collect();
    assert!(handle.submit_answers(answers).await.unwrap().is_accepted());
    let view = handle.snapshot().await.unwrap();
    assert!(!view.awaiting_answers(1));
}

#[tokio::test(start_paused = true)]
async fn test_normal_close_stays_down() {
    let transport = MemoryTransport::auto_accepting();
    let (handle, _task) = spawn(&transport);
    until(&handle, |v| v.is_connected()).await;

    transport.close_latest(Some(NORMAL_CLOSURE));
    until(&handle, |v| v.connection == ConnectionStatus::Disconnected).await;

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(transport.open_count(), 1);
    assert_eq!(handle.snapshot().await.unwrap().connection, ConnectionStatus::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_elapsed_time_ticks_then_freezes() {
    let (handle, _task, transport) = running_session().await;

    let view = until(&handle, |v| v.elapsed_seconds >= 5).await;
    assert_eq!(view.phase, Phase::Progress);

    transport.push_frame(frame(json!({"type": "planning_complete", "itinerary": {}})));
    let done = until(&handle, |v| v.phase == Phase::Result).await;

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(handle.snapshot().await.unwrap().elapsed_seconds, done.elapsed_seconds);
}

#[tokio::test(start_paused = true)]
async fn test_reset_returns_to_initial_view() {
    let (handle, _task, transport) = running_session().await;
    transport.push_frame(frame(json!({"type": "agent_complete", "agent": "planner"})));
    until(&handle, |v| v.completed == 1).await;

    handle.reset().await.unwrap();
    let view = until(&handle, |v| v.phase == Phase::Input).await;

    assert_eq!(view.completed, 0);
    assert!(view.query.is_empty());
    assert!(view.started_at.is_none());
    assert_eq!(view.elapsed_seconds, 0);
    assert!(view.is_connected());
}
