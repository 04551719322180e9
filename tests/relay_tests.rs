// Integration tests for the relay over TCP

use chatrelay::relay::*;
use futures::StreamExt;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

fn test_config() -> RelayConfig {
    RelayConfig {
        grace_period_ms: 300,
        heartbeat_interval_ms: 60_000,
        stats_interval_ms: 0,
        ..RelayConfig::default()
    }
}

async fn start(config: RelayConfig) -> (RelayServer, RelayClient) {
    let server = RelayServer::start("127.0.0.1:0", config).await.unwrap();
    let client = RelayClient::new(server.local_addr().to_string());
    (server, client)
}

async fn join(client: &RelayClient, name: &str) -> EventStream {
    let id = client.authorize(name).await.unwrap();
    let mut events = client.connect(id).await.unwrap();
    wait_for(&mut events, &Event::join(name)).await;
    events
}

/// Read events until `expected` shows up; returns everything read before it
async fn wait_for(events: &mut EventStream, expected: &Event) -> Vec<Event> {
    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(2), events.next_event())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {:?}, saw {:?}", expected, seen))
            .expect("stream closed");
        if &event == expected {
            return seen;
        }
        seen.push(event);
    }
}

/// Everything that arrives within a short quiet window
async fn drain(events: &mut EventStream) -> Vec<Event> {
    let mut seen = Vec::new();
    while let Ok(Some(event)) =
        tokio::time::timeout(Duration::from_millis(150), events.next_event()).await
    {
        seen.push(event);
    }
    seen
}

fn remote_kind(err: &anyhow::Error) -> Option<&str> {
    err.downcast_ref::<RemoteError>().map(|e| e.kind.as_str())
}

#[tokio::test]
async fn test_alice_says_hi_to_bob() {
    let (server, client) = start(test_config()).await;

    let sid_a = client.authorize("alice").await.unwrap();
    let sid_b = client.authorize("bob").await.unwrap();
    assert_ne!(sid_a, sid_b);

    let (alice, bob) = tokio::join!(client.connect(sid_a), client.connect(sid_b));
    let mut alice = alice.unwrap();
    let mut bob = bob.unwrap();
    wait_for(&mut alice, &Event::join("bob")).await;
    wait_for(&mut bob, &Event::join("alice")).await;

    assert!(client.say("alice", "bob", "hi").await.unwrap());

    wait_for(&mut bob, &Event::log("alice", "hi")).await;
    let alice_events = drain(&mut alice).await;
    assert!(
        !alice_events.iter().any(|e| matches!(e, Event::Log { .. })),
        "alice saw {:?}",
        alice_events
    );

    server.shutdown();
}

#[tokio::test]
async fn test_second_connect_rejected() {
    let (server, client) = start(test_config()).await;

    let id = client.authorize("alice").await.unwrap();
    let _stream = client.connect(id).await.unwrap();

    let err = client.connect(id).await.err().unwrap();
    assert_eq!(remote_kind(&err), Some("already_connected"));

    server.shutdown();
}

#[tokio::test]
async fn test_unconnected_session_expires() {
    let (server, client) = start(test_config()).await;

    let id = client.authorize("late").await.unwrap();
    tokio::time::sleep(Duration::from_millis(600)).await;

    let err = client.connect(id).await.err().unwrap();
    assert_eq!(remote_kind(&err), Some("not_authorized"));
    assert_eq!(server.service().registry().session_count().await, 0);

    server.shutdown();
}

#[tokio::test]
async fn test_connected_session_outlives_grace_period() {
    let (server, client) = start(test_config()).await;

    let mut alice = join(&client, "alice").await;
    let _bob = join(&client, "bob").await;
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert!(client.say("bob", "alice", "still here").await.unwrap());
    wait_for(&mut alice, &Event::log("bob", "still here")).await;

    server.shutdown();
}

#[tokio::test]
async fn test_join_counts_per_stream() {
    let (server, client) = start(test_config()).await;

    let mut b = join(&client, "b").await;
    let mut c = join(&client, "c").await;
    wait_for(&mut b, &Event::join("c")).await;

    let id = client.authorize("a").await.unwrap();
    let mut a = client.connect(id).await.unwrap();

    for stream in [&mut a, &mut b, &mut c] {
        let events = drain(stream).await;
        assert_eq!(
            events.iter().filter(|e| **e == Event::join("a")).count(),
            1,
            "events: {:?}",
            events
        );
    }

    server.shutdown();
}

#[tokio::test]
async fn test_closing_stream_broadcasts_leave() {
    let (server, client) = start(test_config()).await;

    let mut alice = join(&client, "alice").await;
    let bob = join(&client, "bob").await;
    wait_for(&mut alice, &Event::join("bob")).await;

    drop(bob);

    wait_for(&mut alice, &Event::leave("bob")).await;
    let rest = drain(&mut alice).await;
    assert!(!rest.contains(&Event::leave("bob")), "double leave: {:?}", rest);

    assert_eq!(server.service().registry().session_count().await, 1);
    let err = client.say("bob", "alice", "ghost").await.err().unwrap();
    assert_eq!(remote_kind(&err), Some("not_authorized"));

    server.shutdown();
}

#[tokio::test]
async fn test_say_requires_connected_source() {
    let (server, client) = start(test_config()).await;

    let _bob = join(&client, "bob").await;
    client.authorize("alice").await.unwrap();

    let err = client.say("alice", "bob", "hi").await.err().unwrap();
    assert_eq!(remote_kind(&err), Some("not_authorized"));

    server.shutdown();
}

#[tokio::test]
async fn test_say_to_unknown_target_acknowledged() {
    let (server, client) = start(test_config()).await;

    let _alice = join(&client, "alice").await;
    assert!(!client.say("alice", "nobody", "hi").await.unwrap());

    server.shutdown();
}

#[tokio::test]
async fn test_invalid_names() {
    let (server, client) = start(test_config()).await;

    let err = client.authorize("").await.err().unwrap();
    assert_eq!(remote_kind(&err), Some("invalid_name"));

    let err = client.authorize(&"n".repeat(21)).await.err().unwrap();
    assert_eq!(remote_kind(&err), Some("invalid_name"));

    server.shutdown();
}

#[tokio::test]
async fn test_heartbeats_on_idle_stream() {
    let (server, client) = start(RelayConfig {
        heartbeat_interval_ms: 50,
        ..test_config()
    })
    .await;

    let mut alice = join(&client, "alice").await;
    wait_for(&mut alice, &Event::Heartbeat).await;
    wait_for(&mut alice, &Event::Heartbeat).await;

    server.shutdown();
}

#[tokio::test]
async fn test_malformed_requests() {
    let (server, _client) = start(test_config()).await;

    let stream = TcpStream::connect(server.local_addr()).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    write_half.write_all(b"not json\n").await.unwrap();
    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    assert!(line.contains(r#""kind":"bad_request""#), "got {}", line);

    write_half
        .write_all(b"{\"type\":\"connect\",\"session_id\":\"zz\"}\n")
        .await
        .unwrap();
    line.clear();
    reader.read_line(&mut line).await.unwrap();
    assert!(line.contains(r#""kind":"bad_request""#), "got {}", line);

    // the connection keeps serving after errors
    write_half
        .write_all(b"{\"type\":\"authorize\",\"name\":\"raw\"}\n")
        .await
        .unwrap();
    line.clear();
    reader.read_line(&mut line).await.unwrap();
    assert!(line.contains(r#""type":"authorized""#), "got {}", line);

    server.shutdown();
}

#[tokio::test]
async fn test_shutdown_closes_streams() {
    let (server, client) = start(test_config()).await;

    let mut alice = join(&client, "alice").await;
    server.shutdown();

    let closed = tokio::time::timeout(Duration::from_secs(2), async {
        while alice.next_event().await.is_some() {}
    })
    .await;
    assert!(closed.is_ok());
}

#[tokio::test]
async fn test_event_stream_as_futures_stream() {
    let (server, client) = start(test_config()).await;

    let id = client.authorize("alice").await.unwrap();
    let mut events = client.connect(id).await.unwrap();

    let first = tokio::time::timeout(Duration::from_secs(2), events.next())
        .await
        .unwrap();
    assert_eq!(first, Some(Event::join("alice")));

    assert!(client.say("alice", "alice", "echo").await.unwrap());
    let logged: Vec<Event> = tokio::time::timeout(
        Duration::from_secs(2),
        (&mut events)
            .filter(|e| futures::future::ready(matches!(e, Event::Log { .. })))
            .take(1)
            .collect(),
    )
    .await
    .unwrap();
    assert_eq!(logged, vec![Event::log("alice", "echo")]);

    server.shutdown();
    let rest = tokio::time::timeout(Duration::from_secs(2), events.collect::<Vec<_>>()).await;
    assert!(rest.is_ok(), "stream did not end after shutdown");
}
