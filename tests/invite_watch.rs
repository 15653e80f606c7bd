//! End-to-end invite monitor cycles against a mocked forum

mod test_utils;

use chrono::{Duration, Local};
use forumwatch::config::InviteConfig;
use forumwatch::data::{format_stamp, parse_stamp, NotificationKind, PendingReviews};
use forumwatch::error::CycleError;
use forumwatch::integrations::flarum::FlarumClient;
use forumwatch::jobs::invites::{self, check_invites, run_cycle};
use forumwatch::scheduler::Trigger;
use forumwatch::store::{self, KvStore, MemoryStore};
use serde_json::json;
use test_utils::{http_client, RecordingNotifier};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> InviteConfig {
    InviteConfig {
        enabled: true,
        base_url: server.uri(),
        username: "alice".to_string(),
        password: "secret".to_string(),
        retry_interval_secs: 0,
        use_proxy: false,
        ..InviteConfig::default()
    }
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "flarum_session=s1; Path=/; HttpOnly")
                .set_body_string(r#"<script>app.load({"csrfToken":"tok","userId":0})</script>"#),
        )
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/login"))
        .and(header("x-csrf-token", "tok"))
        .and(body_partial_json(json!({"identification": "alice", "remember": true})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "flarum_remember=r1; Path=/; HttpOnly"),
        )
        .mount(server)
        .await;
}

fn invite_list(ids: &[&str]) -> serde_json::Value {
    let data: Vec<_> = ids
        .iter()
        .map(|id| {
            json!({
                "type": "invites",
                "id": id,
                "attributes": {"user": "inviter", "email": format!("{}@example.com", id)}
            })
        })
        .collect();
    json!({ "data": data })
}

#[tokio::test]
async fn test_new_invite_is_reported_and_stamped() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/store/invite/list"))
        .and(header("cookie", "flarum_remember=r1; flarum_session=s1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(invite_list(&["7"])))
        .expect(1)
        .mount(&server)
        .await;

    let store = MemoryStore::new();
    let notifier = RecordingNotifier::new();
    let client = FlarumClient::new(http_client(), server.uri());

    let before = Local::now().naive_local();
    let outcome = check_invites(&config_for(&server), &client, &store, &notifier, Trigger::Manual)
        .await
        .expect("cycle should succeed");
    assert_eq!(outcome.to_notify().len(), 1);

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, NotificationKind::SiteMessage);
    assert!(sent[0].text.contains("(new)"));
    assert!(sent[0].text.contains("7@example.com"));

    let state: PendingReviews = store::load(&store, invites::STATE_KEY).unwrap().unwrap();
    let stamp = parse_stamp(&state["7"]).unwrap();
    assert!(stamp >= before - Duration::seconds(1));
    assert!(stamp <= Local::now().naive_local());
}

#[tokio::test]
async fn test_unchanged_invite_is_quiet() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/store/invite/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(invite_list(&["7"])))
        .mount(&server)
        .await;

    let store = MemoryStore::new();
    let stamp = format_stamp(Local::now().naive_local() - Duration::hours(1));
    store.set(invites::STATE_KEY, json!({ "7": stamp })).unwrap();

    let notifier = RecordingNotifier::new();
    let client = FlarumClient::new(http_client(), server.uri());
    check_invites(&config_for(&server), &client, &store, &notifier, Trigger::Scheduled).await;

    assert!(notifier.sent().is_empty());
    assert_eq!(store.get(invites::STATE_KEY).unwrap().unwrap(), json!({ "7": stamp }));
}

async fn failing_list_server() -> MockServer {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/store/invite/list"))
        .respond_with(ResponseTemplate::new(500))
        .expect(4)
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_server_errors_exhaust_retries() {
    let server = failing_list_server().await;
    let store = MemoryStore::new();
    let client = FlarumClient::new(http_client(), server.uri());
    let config = config_for(&server);
    assert_eq!(config.retry_count, 3);

    let err = run_cycle(&config, &client, &store, Local::now().naive_local())
        .await
        .unwrap_err();
    match err {
        CycleError::Fetch(e) => {
            assert_eq!(e.attempts, 4);
            assert_eq!(e.reason, "HTTP 500 Internal Server Error");
        }
        other => panic!("expected fetch error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_exhausted_retries_send_one_failure_notification() {
    let server = failing_list_server().await;
    let store = MemoryStore::new();
    store.set(invites::STATE_KEY, json!({ "1": "2024-01-01T00:00:00" })).unwrap();

    let notifier = RecordingNotifier::new();
    let client = FlarumClient::new(http_client(), server.uri());
    check_invites(&config_for(&server), &client, &store, &notifier, Trigger::Scheduled).await;

    assert_eq!(notifier.kinds(), vec![NotificationKind::Failure]);
    assert!(notifier.sent()[0].text.contains("after 4 attempt(s)"));

    // A failed cycle leaves the state untouched
    assert_eq!(
        store.get(invites::STATE_KEY).unwrap().unwrap(),
        json!({ "1": "2024-01-01T00:00:00" })
    );
}

#[tokio::test]
async fn test_rejected_login_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "flarum_session=s1; Path=/")
                .set_body_string(r#"{"csrfToken":"tok"}"#),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/store/invite/list"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = MemoryStore::new();
    let notifier = RecordingNotifier::new();
    let client = FlarumClient::new(http_client(), server.uri());
    check_invites(&config_for(&server), &client, &store, &notifier, Trigger::Manual).await;

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].title, "Forum invite monitor failed");
    assert!(sent[0].text.contains("Problem: Login rejected"));
    assert!(store.get(invites::STATE_KEY).unwrap().is_none());
}

#[tokio::test]
async fn test_notify_flag_silences_reports() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/store/invite/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(invite_list(&["1", "2"])))
        .mount(&server)
        .await;

    let store = MemoryStore::new();
    let notifier = RecordingNotifier::new();
    let client = FlarumClient::new(http_client(), server.uri());
    let config = InviteConfig {
        notify: false,
        ..config_for(&server)
    };
    check_invites(&config, &client, &store, &notifier, Trigger::Manual).await;

    assert!(notifier.sent().is_empty());
    let state: PendingReviews = store::load(&store, invites::STATE_KEY).unwrap().unwrap();
    assert_eq!(state.len(), 2);
}
