use once_cell::sync::Lazy;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use std::net::TcpListener;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct LogBathResponse {
    inserted: bool,
    record: Value,
}

#[derive(Debug, Deserialize)]
struct StatsResponse {
    days_completed: u32,
    total_baths: u64,
    longest_bath: String,
    challenge_progress: u32,
}

struct TestServer {
    base_url: String,
    child: Child,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

static SERVER: Lazy<Mutex<Option<Arc<TestServer>>>> = Lazy::new(|| Mutex::new(None));

#[cfg(unix)]
mod cleanup {
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Once;

    static REGISTER: Once = Once::new();
    static PID: AtomicI32 = AtomicI32::new(0);

    pub fn register(pid: u32) {
        REGISTER.call_once(|| {
            PID.store(pid as i32, Ordering::SeqCst);
            unsafe {
                libc::atexit(on_exit);
            }
        });
    }

    extern "C" fn on_exit() {
        let pid = PID.load(Ordering::SeqCst);
        if pid > 0 {
            unsafe {
                libc::kill(pid, libc::SIGTERM);
            }
        }
    }
}

fn pick_free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind random port");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

fn unique_data_path() -> String {
    let mut path = std::env::temp_dir();
    path.push(format!("isbad_http_{}_{}.json", std::process::id(), Uuid::new_v4()));
    path.to_string_lossy().to_string()
}

async fn wait_until_ready(base_url: &str) {
    let client = Client::new();
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        if let Ok(resp) = client.get(format!("{base_url}/api/leaderboard")).send().await {
            if resp.status().is_success() {
                return;
            }
        }
        if Instant::now() > deadline {
            panic!("server did not become ready");
        }
        sleep(Duration::from_millis(100)).await;
    }
}

async fn spawn_server() -> TestServer {
    let port = pick_free_port();
    let child = Command::new(env!("CARGO_BIN_EXE_isbad_challenge"))
        .env("PORT", port.to_string())
        .env("APP_DATA_PATH", unique_data_path())
        .env("APP_UTC_OFFSET", "+00:00")
        .env("RUST_LOG", "info")
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .expect("failed to spawn server");

    #[cfg(unix)]
    cleanup::register(child.id());

    let base_url = format!("http://127.0.0.1:{port}");
    wait_until_ready(&base_url).await;

    TestServer { base_url, child }
}

async fn shared_server() -> Arc<TestServer> {
    let mut guard = SERVER.lock().await;
    if let Some(server) = guard.as_ref() {
        return Arc::clone(server);
    }
    let server = Arc::new(spawn_server().await);
    *guard = Some(Arc::clone(&server));
    server
}

async fn new_user(client: &Client, base_url: &str, name: &str) -> Uuid {
    let id = Uuid::new_v4();
    let response = client
        .post(format!("{base_url}/api/profile"))
        .header("x-user-id", id.to_string())
        .json(&json!({ "display_name": name, "email": format!("{name}-{id}@example.com") }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    id
}

#[tokio::test]
async fn http_requires_caller_identity() {
    let server = shared_server().await;
    let client = Client::new();

    let response = client
        .get(format!("{}/api/stats", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = client
        .get(format!("{}/api/stats", server.base_url))
        .header("x-user-id", Uuid::new_v4().to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn http_log_bath_is_idempotent_and_feeds_stats() {
    let server = shared_server().await;
    let client = Client::new();
    let user = new_user(&client, &server.base_url, "frost").await;

    let body = json!({
        "idempotency_key": "dialog-1",
        "duration": "2:30",
        "feeling": "🥶",
        "type": "tub"
    });
    let first = client
        .post(format!("{}/api/baths", server.base_url))
        .header("x-user-id", user.to_string())
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    let first: LogBathResponse = first.json().await.unwrap();
    assert!(first.inserted);

    let second: LogBathResponse = client
        .post(format!("{}/api/baths", server.base_url))
        .header("x-user-id", user.to_string())
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(!second.inserted);
    assert_eq!(first.record["id"], second.record["id"]);

    let invalid = client
        .post(format!("{}/api/baths", server.base_url))
        .header("x-user-id", user.to_string())
        .json(&json!({
            "idempotency_key": "dialog-2",
            "duration": "2:99",
            "feeling": "🥶",
            "type": "tub"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

    let started = client
        .post(format!("{}/api/challenge/start", server.base_url))
        .header("x-user-id", user.to_string())
        .json(&json!({ "days": 30 }))
        .send()
        .await
        .unwrap();
    assert!(started.status().is_success());

    let stats: StatsResponse = client
        .get(format!("{}/api/stats", server.base_url))
        .header("x-user-id", user.to_string())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats.total_baths, 1);
    assert_eq!(stats.days_completed, 1);
    assert_eq!(stats.longest_bath, "2:30");
    assert_eq!(stats.challenge_progress, 1);

    let status: Value = client
        .post(format!("{}/api/challenge/refresh", server.base_url))
        .header("x-user-id", user.to_string())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["outcome"], Value::Null);
    assert_eq!(status["challenge"]["active"], true);
}

#[tokio::test]
async fn http_invite_then_pairing_conflict_flow() {
    let server = shared_server().await;
    let client = Client::new();
    let base = &server.base_url;
    let host = new_user(&client, base, "host").await;
    let guest = new_user(&client, base, "guest").await;
    let third = new_user(&client, base, "third").await;

    let guest_email: Value = client
        .get(format!("{base}/api/profile"))
        .header("x-user-id", guest.to_string())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let uninvited = client
        .post(format!("{base}/api/invites/accept"))
        .header("x-user-id", guest.to_string())
        .json(&json!({ "inviter_id": third }))
        .send()
        .await
        .unwrap();
    assert_eq!(uninvited.status(), StatusCode::NOT_FOUND);

    for inviter_of_guest in [host, third] {
        let invite = client
            .post(format!("{base}/api/invites"))
            .header("x-user-id", inviter_of_guest.to_string())
            .json(&json!({ "email": guest_email["email"] }))
            .send()
            .await
            .unwrap();
        assert_eq!(invite.status(), StatusCode::CREATED);

        let accepted = client
            .post(format!("{base}/api/invites/accept"))
            .header("x-user-id", guest.to_string())
            .json(&json!({ "inviter_id": inviter_of_guest }))
            .send()
            .await
            .unwrap();
        assert_eq!(accepted.status(), StatusCode::NO_CONTENT);
    }

    let friends: Vec<Value> = client
        .get(format!("{base}/api/friends"))
        .header("x-user-id", guest.to_string())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(friends.len(), 2);

    let paired: Value = client
        .post(format!("{base}/api/friends/{host}/challenge"))
        .header("x-user-id", guest.to_string())
        .json(&json!({ "days": 30, "force": false }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(paired["status"], "started");

    let pending: Value = client
        .post(format!("{base}/api/friends/{third}/challenge"))
        .header("x-user-id", guest.to_string())
        .json(&json!({ "days": 30, "force": false }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(pending["status"], "needs_confirmation");

    let forced: Value = client
        .post(format!("{base}/api/friends/{third}/challenge"))
        .header("x-user-id", guest.to_string())
        .json(&json!({ "days": 30, "force": true }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(forced["status"], "started");

    let removed = client
        .delete(format!("{base}/api/friends/{third}"))
        .header("x-user-id", guest.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(removed.status(), StatusCode::NO_CONTENT);

    let profile: Value = client
        .get(format!("{base}/api/profile"))
        .header("x-user-id", third.to_string())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(profile["challenge"]["active"], false);
}
