use super::*;
use crate::services::coordinator::{CLEAR_CANVAS, DRAW_LINE, LOAD_CANVAS, REDRAW_CANVAS, UPDATE_USERS, USER_JOINED};
use crate::services::history::Stroke;
use crate::state::test_helpers::{self, dummy_stroke};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::time::{Duration, timeout};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

fn frame_text(syscall: &str, data: serde_json::Value) -> String {
    json!({"syscall": syscall, "data": data}).to_string()
}

fn stroke_json() -> serde_json::Value {
    json!({"points": [{"x": 0, "y": 0}, {"x": 10, "y": 10}], "color": "#000000", "width": 5})
}

async fn recv_frame(rx: &mut mpsc::Receiver<Frame>) -> Frame {
    timeout(Duration::from_millis(500), rx.recv())
        .await
        .expect("frame receive timed out")
        .expect("channel closed unexpectedly")
}

async fn assert_no_frame(rx: &mut mpsc::Receiver<Frame>) {
    assert!(
        timeout(Duration::from_millis(80), rx.recv()).await.is_err(),
        "expected no frame"
    );
}

/// Connect a fake client through the coordinator and drain its snapshot.
async fn connect_fake(state: &AppState) -> (Uuid, mpsc::Receiver<Frame>) {
    let id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::channel(32);
    coordinator::connect(state, id, tx).await;
    assert_eq!(recv_frame(&mut rx).await.syscall, LOAD_CANVAS);
    (id, rx)
}

// =============================================================================
// DISPATCH
// =============================================================================

#[tokio::test]
async fn invalid_json_returns_gateway_error() {
    let state = test_helpers::test_app_state();
    let replies = process_inbound_text(&state, Uuid::new_v4(), "{not json").await;

    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].syscall, crate::frame::GATEWAY_ERROR);
    assert_eq!(replies[0].status, Status::Error);
    assert_eq!(replies[0].data.get("code").and_then(|v| v.as_str()), Some("E_INVALID_JSON"));
}

#[tokio::test]
async fn unknown_event_returns_error_to_sender_only() {
    let state = test_helpers::test_app_state();
    let (a, _rx_a) = connect_fake(&state).await;
    let (_b, mut rx_b) = connect_fake(&state).await;

    let replies = process_inbound_text(&state, a, &frame_text("paint", json!({}))).await;

    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].data.get("code").and_then(|v| v.as_str()), Some("E_UNKNOWN_EVENT"));
    assert_no_frame(&mut rx_b).await;
}

#[tokio::test]
async fn draw_line_reaches_peers_not_sender() {
    let state = test_helpers::test_app_state();
    let (a, mut rx_a) = connect_fake(&state).await;
    let (_b, mut rx_b) = connect_fake(&state).await;

    let replies = process_inbound_text(&state, a, &frame_text(DRAW_LINE, stroke_json())).await;

    assert!(replies.is_empty());
    let frame = recv_frame(&mut rx_b).await;
    assert_eq!(frame.syscall, DRAW_LINE);
    assert_eq!(frame.from, Some(a.to_string()));
    assert_no_frame(&mut rx_a).await;
}

#[tokio::test]
async fn spoofed_from_is_overwritten() {
    let state = test_helpers::test_app_state();
    let (a, _rx_a) = connect_fake(&state).await;
    let (_b, mut rx_b) = connect_fake(&state).await;

    let text = json!({"syscall": DRAW_LINE, "from": "someone-else", "data": stroke_json()}).to_string();
    process_inbound_text(&state, a, &text).await;

    assert_eq!(recv_frame(&mut rx_b).await.from, Some(a.to_string()));
}

#[tokio::test]
async fn malformed_draw_line_is_dropped_without_reply() {
    let state = test_helpers::test_app_state();
    let (a, mut rx_a) = connect_fake(&state).await;
    let (_b, mut rx_b) = connect_fake(&state).await;

    let shape_error = process_inbound_text(&state, a, &frame_text(DRAW_LINE, json!({"points": 3}))).await;
    let one_point = process_inbound_text(
        &state,
        a,
        &frame_text(DRAW_LINE, json!({"points": [{"x": 1, "y": 1}], "color": "#000", "width": 2})),
    )
    .await;

    assert!(shape_error.is_empty());
    assert!(one_point.is_empty());
    assert_no_frame(&mut rx_a).await;
    assert_no_frame(&mut rx_b).await;
    assert!(coordinator::snapshot(&state).await.strokes.is_empty());
}

#[tokio::test]
async fn join_room_then_clear_round_trip() {
    let state = test_helpers::test_app_state();
    let (a, mut rx_a) = connect_fake(&state).await;
    let (_b, mut rx_b) = connect_fake(&state).await;

    process_inbound_text(&state, a, &frame_text("join_room", json!({"name": "Ada", "color": "#f00"}))).await;
    assert_eq!(recv_frame(&mut rx_a).await.syscall, UPDATE_USERS);
    assert_no_frame(&mut rx_a).await;
    assert_eq!(recv_frame(&mut rx_b).await.syscall, UPDATE_USERS);
    let joined = recv_frame(&mut rx_b).await;
    assert_eq!(joined.syscall, USER_JOINED);
    assert_eq!(joined.data.get("name").and_then(|v| v.as_str()), Some("Ada"));

    process_inbound_text(&state, a, &frame_text("clear", json!({}))).await;
    assert_eq!(recv_frame(&mut rx_a).await.syscall, CLEAR_CANVAS);
    assert_eq!(recv_frame(&mut rx_b).await.syscall, CLEAR_CANVAS);
}

#[tokio::test]
async fn drawing_move_is_relayed_to_peers() {
    let state = test_helpers::test_app_state();
    let (a, mut rx_a) = connect_fake(&state).await;
    let (_b, mut rx_b) = connect_fake(&state).await;

    let segment = json!({"from": {"x": 0, "y": 0}, "to": {"x": 4, "y": 4}, "color": "#00f", "width": 3});
    process_inbound_text(&state, a, &frame_text(DRAWING_MOVE, segment)).await;

    let relayed = recv_frame(&mut rx_b).await;
    assert_eq!(relayed.syscall, DRAWING_MOVE);
    assert_eq!(relayed.data.get("color").and_then(|v| v.as_str()), Some("#00f"));
    assert_no_frame(&mut rx_a).await;
    assert!(coordinator::snapshot(&state).await.strokes.is_empty());
}

#[test]
fn connection_future_is_send() {
    fn require_send<T: Send>(_: T) {}
    let _check: fn(WebSocket, AppState) = |socket, state| require_send(run_ws(socket, state));
}

// =============================================================================
// END TO END
// =============================================================================

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server() -> std::net::SocketAddr {
    spawn_server_with_state(test_helpers::test_app_state()).await
}

async fn spawn_server_with_state(state: AppState) -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, crate::routes::app(state))
            .await
            .expect("test server failed");
    });
    addr
}

async fn next_frame(ws: &mut Client, wait: Duration) -> Option<Frame> {
    loop {
        let msg = timeout(wait, ws.next()).await.ok()??.ok()?;
        if msg.is_text() {
            let text = msg.to_text().expect("text frame");
            return Some(serde_json::from_str(text).expect("server sends valid frames"));
        }
    }
}

async fn expect_frame(ws: &mut Client) -> Frame {
    next_frame(ws, Duration::from_millis(1000))
        .await
        .expect("expected a frame from server")
}

/// Swallow everything until the server goes quiet.
async fn drain(ws: &mut Client) {
    while next_frame(ws, Duration::from_millis(150)).await.is_some() {}
}

async fn send(ws: &mut Client, syscall: &str, data: serde_json::Value) {
    ws.send(WsMessage::text(frame_text(syscall, data)))
        .await
        .expect("client send");
}

/// Connect, check the welcome + snapshot handshake, and join.
async fn join(addr: std::net::SocketAddr, name: &str) -> (Client, Vec<Stroke>) {
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("ws connect");

    let welcome = expect_frame(&mut ws).await;
    assert_eq!(welcome.syscall, SESSION_CONNECTED);
    assert!(welcome.data.contains_key("connection_id"));

    let load = expect_frame(&mut ws).await;
    assert_eq!(load.syscall, LOAD_CANVAS);
    let strokes: Vec<Stroke> = serde_json::from_value(load.data["strokes"].clone()).expect("strokes");

    send(&mut ws, "join_room", json!({"name": name, "color": "#123456"})).await;
    (ws, strokes)
}

fn strokes_in(frame: &Frame) -> Vec<Stroke> {
    serde_json::from_value(frame.data["strokes"].clone()).expect("strokes payload")
}

#[tokio::test]
async fn three_clients_draw_undo_redo_over_websocket() {
    let addr = spawn_server().await;
    let (mut a, _) = join(addr, "A").await;
    drain(&mut a).await;
    let (mut b, _) = join(addr, "B").await;
    drain(&mut b).await;
    let (mut c, _) = join(addr, "C").await;
    for ws in [&mut a, &mut b, &mut c] {
        drain(ws).await;
    }

    send(&mut a, DRAW_LINE, stroke_json()).await;
    for ws in [&mut b, &mut c] {
        let frame = expect_frame(ws).await;
        assert_eq!(frame.syscall, DRAW_LINE);
        let stroke: Stroke = serde_json::from_value(serde_json::to_value(&frame.data).unwrap()).unwrap();
        assert_eq!(stroke, dummy_stroke(0.0));
    }
    assert!(next_frame(&mut a, Duration::from_millis(150)).await.is_none());

    send(&mut a, "undo", json!({})).await;
    for ws in [&mut a, &mut b, &mut c] {
        let frame = expect_frame(ws).await;
        assert_eq!(frame.syscall, REDRAW_CANVAS);
        assert!(strokes_in(&frame).is_empty());
    }

    send(&mut c, "redo", json!({})).await;
    for ws in [&mut a, &mut b, &mut c] {
        let frame = expect_frame(ws).await;
        assert_eq!(frame.syscall, REDRAW_CANVAS);
        assert_eq!(strokes_in(&frame), vec![dummy_stroke(0.0)]);
    }
}

#[tokio::test]
async fn late_joiner_gets_snapshot_and_closing_updates_users() {
    let addr = spawn_server().await;
    let (mut a, _) = join(addr, "A").await;
    send(&mut a, DRAW_LINE, stroke_json()).await;
    drain(&mut a).await;

    let (mut b, snapshot) = join(addr, "B").await;
    assert_eq!(snapshot, vec![dummy_stroke(0.0)]);
    drain(&mut a).await;
    drain(&mut b).await;

    a.close(None).await.expect("close");
    let frame = expect_frame(&mut b).await;
    assert_eq!(frame.syscall, UPDATE_USERS);
    let users = frame.data["users"].as_array().expect("users array");
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["name"], "B");
}

#[tokio::test]
async fn hub_eviction_closes_socket_and_updates_users() {
    let state = test_helpers::test_app_state();
    let addr = spawn_server_with_state(state.clone()).await;
    let (mut a, _) = join(addr, "A").await;
    drain(&mut a).await;

    let (mut b, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("ws connect");
    let welcome = expect_frame(&mut b).await;
    let b_id: Uuid = welcome.data["connection_id"]
        .as_str()
        .and_then(|s| s.parse().ok())
        .expect("connection id");
    assert_eq!(expect_frame(&mut b).await.syscall, LOAD_CANVAS);
    send(&mut b, "join_room", json!({"name": "B", "color": "#654321"})).await;
    drain(&mut a).await;
    drain(&mut b).await;

    state.hub.unregister(b_id).await;

    let frame = expect_frame(&mut a).await;
    assert_eq!(frame.syscall, UPDATE_USERS);
    let users = frame.data["users"].as_array().expect("users array");
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["name"], "A");
    assert!(next_frame(&mut b, Duration::from_millis(500)).await.is_none(), "evicted socket is closed");
}

#[tokio::test]
async fn client_dropping_after_bad_frame_is_disconnected() {
    let addr = spawn_server().await;
    let (mut a, _) = join(addr, "A").await;
    let (mut b, _) = join(addr, "B").await;
    drain(&mut a).await;
    drain(&mut b).await;

    b.send(WsMessage::text("{not json")).await.expect("client send");
    drop(b);

    let frame = expect_frame(&mut a).await;
    assert_eq!(frame.syscall, UPDATE_USERS);
    assert_eq!(frame.data["users"].as_array().map(Vec::len), Some(1));
}
