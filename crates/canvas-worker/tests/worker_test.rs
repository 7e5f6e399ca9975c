use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::mpsc;

use canvas_db::Database;
use canvas_types::envelope::{Envelope, Operation, Reply};
use canvas_types::models::{LiveChatInsert, PlaceChatInsert};
use canvas_worker::worker::{self, WorkerChannels};
use canvas_worker::{Dispatcher, WorkerClient, WorkerError};

const SLOW_FLUSH: Duration = Duration::from_secs(3600);

/// Run the worker loop on the test runtime and hand back its raw channels.
fn start_raw(db: Database, flush_interval: Duration) -> WorkerChannels {
    let (call_tx, call_rx) = mpsc::unbounded_channel();
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();
    tokio::spawn(worker::run(Dispatcher::new(db), call_rx, reply_tx, flush_interval));
    WorkerChannels {
        calls: call_tx,
        replies: reply_rx,
    }
}

fn start_client(flush_interval: Duration) -> WorkerClient {
    let db = Database::open_in_memory().unwrap();
    WorkerClient::new(start_raw(db, flush_interval))
}

fn live(message_id: i64, sender: i64) -> LiveChatInsert {
    LiveChatInsert {
        message_id,
        message: format!("message {}", message_id),
        send_date: 1_700_000_000.0 + message_id as f64,
        channel: "en".to_string(),
        sender_int_id: sender,
        replies_to: None,
    }
}

#[tokio::test]
async fn replies_once_per_call_in_order_with_handles_echoed() {
    let mut channels = start_raw(Database::open_in_memory().unwrap(), SLOW_FLUSH);

    let handles = vec![json!("a"), json!(7), json!({ "id": "x-1" }), json!(null)];
    let calls = ["getMaxLiveChatId", "noSuchCall", "getMaxPlaceChatId", "exec"];
    for (call, handle) in calls.iter().zip(&handles) {
        channels
            .calls
            .send(Envelope {
                call: call.to_string(),
                handle: handle.clone(),
                data: Value::Null,
            })
            .unwrap();
    }

    let mut replies = Vec::new();
    for _ in 0..handles.len() {
        replies.push(channels.replies.recv().await.unwrap());
    }

    assert_eq!(
        replies,
        vec![
            Reply { handle: json!("a"), data: json!(0) },
            Reply { handle: json!(7), data: Value::Null },
            Reply { handle: json!({ "id": "x-1" }), data: json!(0) },
            Reply { handle: Value::Null, data: Value::Null },
        ]
    );

    // nothing extra was sent
    assert!(channels.replies.try_recv().is_err());
}

#[tokio::test]
async fn same_token_two_ips() {
    let client = start_client(SLOW_FLUSH);

    let first = client.authenticate_user("tok", "10.0.0.1").await.unwrap();
    let second = client.authenticate_user("tok", "10.0.0.1").await.unwrap();
    let third = client.authenticate_user("tok", "10.0.0.2").await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first, third);

    let rows = client
        .exec("SELECT ip FROM KnownIps WHERE userIntId = ?1 ORDER BY ip", json!([first]))
        .await
        .unwrap()
        .unwrap();
    let ips: Vec<&Value> = rows.iter().map(|r| &r["ip"]).collect();
    assert_eq!(ips, vec![&json!("10.0.0.1"), &json!("10.0.0.2")]);
}

#[tokio::test]
async fn concurrent_callers_each_get_their_own_reply() {
    let client = start_client(SLOW_FLUSH);

    let mut tasks = Vec::new();
    for n in 0..20 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            let token = format!("tok-{}", n);
            let id = client.authenticate_user(&token, "10.0.0.1").await.unwrap();
            client.set_user_chat_name(id, Some(token.as_str())).await.unwrap();
            (id, token, client.get_user_chat_name(id).await.unwrap())
        }));
    }

    let mut ids = Vec::new();
    for task in tasks {
        let (id, token, name) = task.await.unwrap();
        assert_eq!(name.as_deref(), Some(token.as_str()));
        ids.push(id);
    }
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 20);
}

#[tokio::test]
async fn timer_flushes_buffered_writes() {
    let client = start_client(Duration::from_millis(50));
    let id = client.authenticate_user("tok", "10.0.0.1").await.unwrap();

    for _ in 0..5 {
        client.update_pixel_place(id).await.unwrap();
    }
    for message_id in [3, 7, 2] {
        client.insert_live_chat(&live(message_id, id)).await.unwrap();
    }

    let mut max_id = 0;
    for _ in 0..40 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        max_id = client.max_live_chat_id().await.unwrap();
        if max_id != 0 {
            break;
        }
    }
    assert_eq!(max_id, 7);

    let rows = client
        .exec("SELECT pixelsPlaced FROM Users WHERE intId = ?1", json!([id]))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rows[0]["pixelsPlaced"], json!(5));
}

#[tokio::test]
async fn reads_do_not_see_unflushed_inserts() {
    let client = start_client(SLOW_FLUSH);
    let id = client.authenticate_user("tok", "10.0.0.1").await.unwrap();

    client.insert_live_chat(&live(12, id)).await.unwrap();
    client
        .insert_place_chat(&PlaceChatInsert {
            message_id: 4,
            message: "here".to_string(),
            send_date: 1_700_000_000.0,
            sender_int_id: id,
            x: 10,
            y: 11,
        })
        .await
        .unwrap();

    assert_eq!(client.max_live_chat_id().await.unwrap(), 0);
    assert_eq!(client.max_place_chat_id().await.unwrap(), 0);
}

#[tokio::test]
async fn exec_failure_is_null_not_error() {
    let client = start_client(SLOW_FLUSH);
    assert_eq!(client.exec("this is not sql", json!([])).await.unwrap(), None);
    // worker is still serving
    assert_eq!(client.max_live_chat_id().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn commit_shutdown_persists_everything() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("server.db");

    let db = Database::open(&path).unwrap();
    let (channels, thread) = worker::spawn(db, SLOW_FLUSH).unwrap();
    let client = WorkerClient::new(channels);

    let id = client.authenticate_user("tok", "10.0.0.1").await.unwrap();
    for _ in 0..3 {
        client.update_pixel_place(id).await.unwrap();
    }
    client.insert_live_chat(&live(1, id)).await.unwrap();
    client
        .insert_live_chat(&LiveChatInsert {
            replies_to: Some(1),
            ..live(2, id)
        })
        .await
        .unwrap();
    client
        .insert_place_chat(&PlaceChatInsert {
            message_id: 9,
            message: "look".to_string(),
            send_date: 1_700_000_000.0,
            sender_int_id: id,
            x: 1,
            y: 2,
        })
        .await
        .unwrap();

    client.commit_shutdown().await.unwrap();

    // handle released: storage calls now answer null
    assert!(matches!(
        client.max_live_chat_id().await,
        Err(WorkerError::Decode(_))
    ));
    assert_eq!(client.exec("SELECT 1", Value::Null).await.unwrap(), None);

    drop(client);
    tokio::task::spawn_blocking(move || thread.join().unwrap())
        .await
        .unwrap();

    let db = Database::open(&path).unwrap();
    assert_eq!(db.get_user(id).unwrap().unwrap().pixels_placed, 3);
    assert_eq!(db.max_live_chat_id().unwrap(), 2);
    assert_eq!(db.max_place_chat_id().unwrap(), 9);
    let rows = db
        .exec("SELECT repliesTo FROM LiveChatMessages WHERE messageId = 2", &Value::Null)
        .unwrap();
    assert_eq!(rows[0]["repliesTo"], json!(1));
}

#[tokio::test]
async fn calls_after_worker_stops_fail_closed() {
    let (call_tx, call_rx) = mpsc::unbounded_channel::<Envelope>();
    let (_reply_tx, reply_rx) = mpsc::unbounded_channel::<Reply>();
    drop(call_rx);

    let client = WorkerClient::new(WorkerChannels {
        calls: call_tx,
        replies: reply_rx,
    });
    assert!(matches!(
        client.max_live_chat_id().await,
        Err(WorkerError::Closed)
    ));
}

#[tokio::test]
async fn short_insert_payloads_never_reach_storage() {
    let client = start_client(Duration::from_millis(50));

    for payload in [json!([1, "hi", 1700000000, "en"]), json!("nope"), json!([])] {
        let reply = client.call(Operation::InsertLiveChat, payload).await.unwrap();
        assert_eq!(reply, Value::Null);
    }
    client
        .call(Operation::InsertPlaceChat, json!([1, "hi", 1700000000, 1, 2]))
        .await
        .unwrap();
    client
        .call(Operation::InsertLiveChat, json!([5, "kept", 1700000000, "en", 1]))
        .await
        .unwrap();

    let mut max_id = 0;
    for _ in 0..40 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        max_id = client.max_live_chat_id().await.unwrap();
        if max_id != 0 {
            break;
        }
    }
    assert_eq!(max_id, 5);

    let rows = client
        .exec(
            "SELECT (SELECT COUNT(*) FROM LiveChatMessages) AS live, (SELECT COUNT(*) FROM PlaceChatMessages) AS place",
            Value::Null,
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rows[0]["live"], json!(1));
    assert_eq!(rows[0]["place"], json!(0));
}
