use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use campus_core::backend::{
    Backend, ConversationStore, MemoryBackend, MessageRecord, NewMessage, ParticipantRecord,
    PushChannel, PushEvent, PushSubscription,
};
use campus_core::error::StoreError;
use campus_core::{App, AppAction, AppUpdate, ChannelState, Reconciler, SessionState};
use tempfile::{tempdir, TempDir};

fn wait_until(what: &str, timeout: Duration, mut f: impl FnMut() -> bool) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("{what}: condition not met within {timeout:?}");
}

fn settle() {
    // Give in-flight actor work a beat to land (for "nothing happens" checks).
    std::thread::sleep(Duration::from_millis(150));
}

struct TestReconciler {
    updates: Arc<Mutex<Vec<AppUpdate>>>,
}

impl TestReconciler {
    fn new() -> (Self, Arc<Mutex<Vec<AppUpdate>>>) {
        let updates = Arc::new(Mutex::new(vec![]));
        (
            Self {
                updates: updates.clone(),
            },
            updates,
        )
    }
}

impl Reconciler for TestReconciler {
    fn reconcile(&self, update: AppUpdate) {
        self.updates.lock().unwrap().push(update);
    }
}

/// Store wrapper that delegates to [`MemoryBackend`] with switchable failures
/// and an optional delay on inserts.
struct TestStore {
    mem: Arc<MemoryBackend>,
    fail_participants: bool,
    fail_history: bool,
    fail_insert: bool,
    insert_delay: Duration,
}

impl TestStore {
    fn passthrough(mem: Arc<MemoryBackend>) -> Self {
        Self {
            mem,
            fail_participants: false,
            fail_history: false,
            fail_insert: false,
            insert_delay: Duration::ZERO,
        }
    }
}

#[async_trait]
impl ConversationStore for TestStore {
    async fn participants(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<ParticipantRecord>, StoreError> {
        if self.fail_participants {
            return Err(StoreError::Unavailable("participants offline".into()));
        }
        self.mem.participants(conversation_id).await
    }

    async fn messages(&self, conversation_id: &str) -> Result<Vec<MessageRecord>, StoreError> {
        if self.fail_history {
            return Err(StoreError::Unavailable("history offline".into()));
        }
        self.mem.messages(conversation_id).await
    }

    async fn insert_message(&self, message: NewMessage) -> Result<(), StoreError> {
        if !self.insert_delay.is_zero() {
            tokio::time::sleep(self.insert_delay).await;
        }
        if self.fail_insert {
            return Err(StoreError::Backend("insert rejected".into()));
        }
        self.mem.insert_message(message).await
    }
}

/// Channel wrapper whose subscribe acknowledgment lags, so the attach races
/// the load path.
struct SlowChannel {
    mem: Arc<MemoryBackend>,
    subscribe_delay: Duration,
}

#[async_trait]
impl PushChannel for SlowChannel {
    async fn subscribe(
        &self,
        conversation_id: &str,
    ) -> Result<Box<dyn PushSubscription>, StoreError> {
        tokio::time::sleep(self.subscribe_delay).await;
        self.mem.subscribe(conversation_id).await
    }
}

fn seeded_backend() -> Arc<MemoryBackend> {
    let mem = Arc::new(MemoryBackend::new());
    mem.set_session("me");
    mem.add_participant("c1", "me", Some("Riley"));
    mem.add_participant("c1", "friend", Some("Jordan"));
    mem
}

fn start_app(backend: Backend) -> (TempDir, Arc<App>, Arc<Mutex<Vec<AppUpdate>>>) {
    let dir = tempdir().unwrap();
    let app = App::new(dir.path().to_str().unwrap(), backend);
    let (reconciler, updates) = TestReconciler::new();
    app.listen_for_updates(Box::new(reconciler));
    (dir, app, updates)
}

fn start_app_with(mem: &Arc<MemoryBackend>) -> (TempDir, Arc<App>, Arc<Mutex<Vec<AppUpdate>>>) {
    start_app(Backend::from_parts(mem.clone()))
}

fn start_app_with_store(
    mem: &Arc<MemoryBackend>,
    store: TestStore,
) -> (TempDir, Arc<App>, Arc<Mutex<Vec<AppUpdate>>>) {
    start_app(Backend {
        sessions: mem.clone(),
        store: Arc::new(store),
        channel: mem.clone(),
    })
}

fn open(app: &App, conversation_id: &str) {
    app.dispatch(AppAction::OpenConversation {
        conversation_id: conversation_id.to_string(),
    });
}

fn wait_loaded(app: &App) {
    wait_until("conversation loaded", Duration::from_secs(5), || {
        app.state()
            .conversation
            .map(|c| !c.loading)
            .unwrap_or(false)
    });
}

fn wait_attached(app: &App) {
    wait_until("channel attached", Duration::from_secs(5), || {
        app.state()
            .conversation
            .map(|c| c.channel == ChannelState::Attached)
            .unwrap_or(false)
    });
}

#[test]
fn open_seeds_history_in_order_and_resolves_names() {
    let mem = seeded_backend();
    mem.seed_message("c1", "friend", "hey");
    mem.seed_message("c1", "me", "hi back");
    mem.seed_message("c1", "friend", "lunch?");

    let (_dir, app, _updates) = start_app_with(&mem);
    open(&app, "c1");
    wait_loaded(&app);
    wait_attached(&app);

    let view = app.state().conversation.unwrap();
    assert_eq!(view.conversation_id, "c1");
    assert_eq!(view.counterpart_name, "Jordan");
    let bodies: Vec<&str> = view.messages.iter().map(|m| m.body.as_str()).collect();
    assert_eq!(bodies, vec!["hey", "hi back", "lunch?"]);
    assert_eq!(view.messages[0].author_name, "Jordan");
    assert!(!view.messages[0].is_mine);
    assert!(view.messages[1].is_mine);
    assert!(view
        .messages
        .windows(2)
        .all(|w| w[0].sent_at <= w[1].sent_at));
    assert_eq!(app.state().session, SessionState::Authenticated {
        user_id: "me".to_string()
    });
}

#[test]
fn live_insert_appends_and_redelivery_is_a_noop() {
    let mem = seeded_backend();
    let (_dir, app, _updates) = start_app_with(&mem);
    open(&app, "c1");
    wait_loaded(&app);
    wait_attached(&app);

    let record = mem.insert("c1", "friend", "you there?").unwrap();
    wait_until("live message visible", Duration::from_secs(5), || {
        app.state()
            .conversation
            .map(|c| c.messages.iter().any(|m| m.id == record.id))
            .unwrap_or(false)
    });

    // The channel may redeliver; the timeline must not grow.
    mem.publish(
        "c1",
        PushEvent::MessageInserted {
            message: record.clone(),
        },
    );
    settle();
    let view = app.state().conversation.unwrap();
    assert_eq!(
        view.messages.iter().filter(|m| m.id == record.id).count(),
        1
    );
    assert_eq!(view.messages.len(), 1);
}

#[test]
fn mis_tagged_channel_payloads_are_dropped() {
    let mem = seeded_backend();
    mem.add_participant("c2", "me", Some("Riley"));
    mem.add_participant("c2", "other", Some("Sam"));
    let (_dir, app, _updates) = start_app_with(&mem);

    open(&app, "c1");
    wait_loaded(&app);
    open(&app, "c2");
    wait_until("switched to c2", Duration::from_secs(5), || {
        app.state()
            .conversation
            .map(|c| {
                c.conversation_id == "c2" && !c.loading && c.channel == ChannelState::Attached
            })
            .unwrap_or(false)
    });

    // An event delivered on c2's channel but tagged for c1 must not render.
    let stray = mem.seed_message("c1", "friend", "wrong room");
    mem.publish("c2", PushEvent::MessageInserted { message: stray });
    settle();

    let view = app.state().conversation.unwrap();
    assert_eq!(view.conversation_id, "c2");
    assert!(view.messages.is_empty());
}

#[test]
fn open_without_session_requires_sign_in() {
    let mem = Arc::new(MemoryBackend::new());
    mem.add_conversation("c1");
    let (_dir, app, updates) = start_app_with(&mem);

    open(&app, "c1");
    wait_until("sign-in required", Duration::from_secs(5), || {
        updates
            .lock()
            .unwrap()
            .iter()
            .any(|u| matches!(u, AppUpdate::SignInRequired { .. }))
    });

    let state = app.state();
    assert_eq!(state.session, SessionState::Unauthenticated);
    assert!(state.conversation.is_none());
}

#[test]
fn blank_send_inserts_nothing() {
    let mem = seeded_backend();
    let (_dir, app, _updates) = start_app_with(&mem);
    open(&app, "c1");
    wait_loaded(&app);

    app.dispatch(AppAction::SendMessage {
        body: "   \n".to_string(),
    });
    settle();

    assert_eq!(mem.message_count("c1"), 0);
    let view = app.state().conversation.unwrap();
    assert!(!view.sending);
    assert!(view.send_error.is_none());
}

#[test]
fn send_success_clears_draft_and_echo_lands_once() {
    let mem = seeded_backend();
    let (_dir, app, _updates) = start_app_with(&mem);
    open(&app, "c1");
    wait_loaded(&app);
    wait_attached(&app);

    app.dispatch(AppAction::UpdateDraft {
        draft: "see you at noon".to_string(),
    });
    app.dispatch(AppAction::SendMessage {
        body: "see you at noon".to_string(),
    });

    wait_until("echo visible", Duration::from_secs(5), || {
        app.state()
            .conversation
            .map(|c| c.messages.iter().any(|m| m.body == "see you at noon"))
            .unwrap_or(false)
    });
    wait_until("send settled", Duration::from_secs(5), || {
        app.state()
            .conversation
            .map(|c| !c.sending && c.draft.is_empty())
            .unwrap_or(false)
    });

    assert_eq!(mem.message_count("c1"), 1);
    let view = app.state().conversation.unwrap();
    assert_eq!(view.messages.len(), 1);
    assert!(view.messages[0].is_mine);
    assert_eq!(view.messages[0].author_name, "Riley");
    assert!(view.send_error.is_none());
}

#[test]
fn send_failure_preserves_draft() {
    let mem = seeded_backend();
    let store = TestStore {
        fail_insert: true,
        ..TestStore::passthrough(mem.clone())
    };
    let (_dir, app, _updates) = start_app_with_store(&mem, store);
    open(&app, "c1");
    wait_loaded(&app);

    app.dispatch(AppAction::UpdateDraft {
        draft: "important note".to_string(),
    });
    app.dispatch(AppAction::SendMessage {
        body: "important note".to_string(),
    });

    wait_until("send failed", Duration::from_secs(5), || {
        app.state()
            .conversation
            .map(|c| c.send_error.is_some() && !c.sending)
            .unwrap_or(false)
    });

    let view = app.state().conversation.unwrap();
    assert_eq!(view.draft, "important note");
    assert_eq!(mem.message_count("c1"), 0);
}

#[test]
fn only_one_send_runs_at_a_time() {
    let mem = seeded_backend();
    let store = TestStore {
        insert_delay: Duration::from_millis(200),
        ..TestStore::passthrough(mem.clone())
    };
    let (_dir, app, _updates) = start_app_with_store(&mem, store);
    open(&app, "c1");
    wait_loaded(&app);
    wait_attached(&app);

    app.dispatch(AppAction::SendMessage {
        body: "first".to_string(),
    });
    // Dispatched while the first insert is still sleeping in the store.
    app.dispatch(AppAction::SendMessage {
        body: "second".to_string(),
    });

    wait_until("first send visible", Duration::from_secs(5), || {
        app.state()
            .conversation
            .map(|c| c.messages.iter().any(|m| m.body == "first") && !c.sending)
            .unwrap_or(false)
    });
    settle();
    assert_eq!(mem.message_count("c1"), 1);
}

#[test]
fn history_failure_shows_error_and_detaches_channel() {
    let mem = seeded_backend();
    mem.seed_message("c1", "friend", "unreachable");
    let store = TestStore {
        fail_history: true,
        ..TestStore::passthrough(mem.clone())
    };
    let (_dir, app, _updates) = start_app_with_store(&mem, store);
    open(&app, "c1");

    wait_until("history error surfaced", Duration::from_secs(5), || {
        app.state()
            .conversation
            .map(|c| !c.loading && c.load_error.is_some())
            .unwrap_or(false)
    });
    wait_until("channel released", Duration::from_secs(5), || {
        mem.subscriber_count("c1") == 0
    });

    let view = app.state().conversation.unwrap();
    assert!(view.messages.is_empty());
    assert_eq!(view.channel, ChannelState::Detached);
}

#[test]
fn late_attach_after_history_failure_stays_detached() {
    let mem = seeded_backend();
    let store = TestStore {
        fail_history: true,
        ..TestStore::passthrough(mem.clone())
    };
    // Subscribe acknowledges only after the history failure has already torn
    // the channel down; the late acknowledgment must not resurface as
    // Attached.
    let (_dir, app, _updates) = start_app(Backend {
        sessions: mem.clone(),
        store: Arc::new(store),
        channel: Arc::new(SlowChannel {
            mem: mem.clone(),
            subscribe_delay: Duration::from_millis(300),
        }),
    });
    open(&app, "c1");

    wait_until("history error surfaced", Duration::from_secs(5), || {
        app.state()
            .conversation
            .map(|c| !c.loading && c.load_error.is_some())
            .unwrap_or(false)
    });
    assert_eq!(
        app.state().conversation.unwrap().channel,
        ChannelState::Detached
    );

    // Let the delayed subscribe land and the released task run to completion.
    std::thread::sleep(Duration::from_millis(500));
    let view = app.state().conversation.unwrap();
    assert_eq!(view.channel, ChannelState::Detached);
    assert!(view.load_error.is_some());
    assert_eq!(mem.subscriber_count("c1"), 0);
}

#[test]
fn participant_failure_keeps_placeholder_and_banners() {
    let mem = seeded_backend();
    mem.seed_message("c1", "friend", "hello");
    let store = TestStore {
        fail_participants: true,
        ..TestStore::passthrough(mem.clone())
    };
    let (_dir, app, _updates) = start_app_with_store(&mem, store);
    open(&app, "c1");
    wait_loaded(&app);

    wait_until("banner shown", Duration::from_secs(5), || {
        app.state().banner.is_some()
    });
    let view = app.state().conversation.unwrap();
    assert_eq!(view.counterpart_name, "Conversation");
    assert_eq!(view.messages.len(), 1);
    assert_eq!(view.messages[0].author_name, "Community member");

    app.dispatch(AppAction::ClearBanner);
    wait_until("banner cleared", Duration::from_secs(5), || {
        app.state().banner.is_none()
    });
}

#[test]
fn lost_channel_degrades_and_banners() {
    let mem = seeded_backend();
    let (_dir, app, _updates) = start_app_with(&mem);
    open(&app, "c1");
    wait_loaded(&app);
    wait_attached(&app);

    mem.drop_subscribers("c1");
    wait_until("channel degraded", Duration::from_secs(5), || {
        app.state()
            .conversation
            .map(|c| matches!(c.channel, ChannelState::Degraded { .. }))
            .unwrap_or(false)
    });
    assert!(app.state().banner.is_some());
}

#[test]
fn close_releases_the_subscription() {
    let mem = seeded_backend();
    let (_dir, app, _updates) = start_app_with(&mem);
    open(&app, "c1");
    wait_loaded(&app);
    wait_attached(&app);
    assert_eq!(mem.subscriber_count("c1"), 1);

    app.dispatch(AppAction::CloseConversation);
    wait_until("subscription closed", Duration::from_secs(5), || {
        mem.subscriber_count("c1") == 0
    });
    assert!(app.state().conversation.is_none());
}

#[test]
fn update_revisions_have_no_gaps() {
    let mem = seeded_backend();
    mem.seed_message("c1", "friend", "one");
    let (_dir, app, updates) = start_app_with(&mem);

    open(&app, "c1");
    wait_loaded(&app);
    wait_attached(&app);
    app.dispatch(AppAction::UpdateDraft {
        draft: "x".to_string(),
    });
    app.dispatch(AppAction::SendMessage {
        body: "x".to_string(),
    });
    wait_until("send settled", Duration::from_secs(5), || {
        app.state()
            .conversation
            .map(|c| !c.sending && c.draft.is_empty())
            .unwrap_or(false)
    });
    settle();

    let updates = updates.lock().unwrap();
    assert!(!updates.is_empty());
    assert_eq!(updates[0].rev(), 1);
    for pair in updates.windows(2) {
        assert_eq!(
            pair[1].rev(),
            pair[0].rev() + 1,
            "rev gap between {:?} and {:?}",
            pair[0],
            pair[1]
        );
    }
}

#[test]
fn history_limit_config_keeps_newest_messages() {
    let mem = seeded_backend();
    for i in 0..5 {
        mem.seed_message("c1", "friend", &format!("msg {i}"));
    }

    let dir = tempdir().unwrap();
    std::fs::write(
        dir.path().join("campus_config.json"),
        r#"{"history_limit": 2}"#,
    )
    .unwrap();
    let app = App::new(dir.path().to_str().unwrap(), Backend::from_parts(mem.clone()));
    let (reconciler, _updates) = TestReconciler::new();
    app.listen_for_updates(Box::new(reconciler));

    open(&app, "c1");
    wait_loaded(&app);

    let view = app.state().conversation.unwrap();
    let bodies: Vec<&str> = view.messages.iter().map(|m| m.body.as_str()).collect();
    assert_eq!(bodies, vec!["msg 3", "msg 4"]);
}
