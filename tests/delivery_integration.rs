//! Delivery sequence integration tests
//!
//! These tests drive the engine with recording fakes for the renderer and
//! the mail transport. Time is paused so backoff delays can be asserted
//! deterministically without slowing the suite down.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

use lms_notification_service::config::DeliveryConfig;
use lms_notification_service::mail::{MailError, Mailer};
use lms_notification_service::notification::{
    DeliveryOutcome, NewNotification, Notification, NotificationEngine, NotificationStatus,
};
use lms_notification_service::store::{MemoryNotificationStore, NotificationStore, StoreError};
use lms_notification_service::template::{
    Template, TemplateError, TemplateRenderer, TemplateResult, TemplateStore,
};

#[derive(Debug, Clone)]
struct SentMail {
    to: String,
    subject: String,
    body: String,
    at: Instant,
}

/// Mailer that fails a scripted number of times before accepting messages
struct RecordingMailer {
    failures_remaining: AtomicU32,
    calls: Mutex<Vec<SentMail>>,
}

impl RecordingMailer {
    fn failing(times: u32) -> Arc<Self> {
        Arc::new(Self {
            failures_remaining: AtomicU32::new(times),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn healthy() -> Arc<Self> {
        Self::failing(0)
    }

    fn always_failing() -> Arc<Self> {
        Self::failing(u32::MAX)
    }

    fn calls(&self) -> Vec<SentMail> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), MailError> {
        self.calls.lock().unwrap().push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: html_body.to_string(),
            at: Instant::now(),
        });

        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != u32::MAX {
                self.failures_remaining.fetch_sub(1, Ordering::SeqCst);
            }
            return Err(MailError::Transport("connection refused".to_string()));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Renderer that fails a scripted number of times, then renders from a
/// real template store
struct ScriptedRenderer {
    failures_remaining: AtomicU32,
    renders_blank: bool,
    calls: AtomicU32,
    last_variables: Mutex<Option<Map<String, Value>>>,
    templates: TemplateStore,
}

impl ScriptedRenderer {
    fn failing(times: u32) -> Arc<Self> {
        Arc::new(Self {
            failures_remaining: AtomicU32::new(times),
            renders_blank: false,
            calls: AtomicU32::new(0),
            last_variables: Mutex::new(None),
            templates: TemplateStore::with_defaults(),
        })
    }

    fn healthy() -> Arc<Self> {
        Self::failing(0)
    }

    /// Renders whitespace-only output for every template
    fn blank() -> Arc<Self> {
        Arc::new(Self {
            failures_remaining: AtomicU32::new(0),
            renders_blank: true,
            calls: AtomicU32::new(0),
            last_variables: Mutex::new(None),
            templates: TemplateStore::with_defaults(),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_variables(&self) -> Option<Map<String, Value>> {
        self.last_variables.lock().unwrap().clone()
    }
}

impl TemplateRenderer for ScriptedRenderer {
    fn render(&self, template_name: &str, variables: &Map<String, Value>) -> TemplateResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_variables.lock().unwrap() = Some(variables.clone());

        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != u32::MAX {
                self.failures_remaining.fetch_sub(1, Ordering::SeqCst);
            }
            return Err(TemplateError::SubstitutionFailed("renderer offline".to_string()));
        }
        if self.renders_blank {
            return Ok("   ".to_string());
        }
        self.templates.render(template_name, variables)
    }
}

/// Paused time advances in whole timer ticks; allow for one tick of rounding.
fn assert_gap(actual: Duration, expected: Duration) {
    assert!(
        actual >= expected && actual <= expected + Duration::from_millis(5),
        "expected a gap of {:?}, got {:?}",
        expected,
        actual
    );
}

struct Harness {
    engine: NotificationEngine,
    store: Arc<MemoryNotificationStore>,
    renderer: Arc<ScriptedRenderer>,
    mailer: Arc<RecordingMailer>,
}

fn harness(
    renderer: Arc<ScriptedRenderer>,
    mailer: Arc<RecordingMailer>,
    config: DeliveryConfig,
) -> Harness {
    let store = Arc::new(MemoryNotificationStore::new());
    let engine = NotificationEngine::new(store.clone(), renderer.clone(), mailer.clone(), config);
    Harness {
        engine,
        store,
        renderer,
        mailer,
    }
}

fn course_update() -> NewNotification {
    NewNotification::new(
        "Course Update: CS101",
        "Lecture 4 slides are online",
        "a@b.com",
        "COURSE_UPDATE",
    )
}

async fn persisted(h: &Harness, request: NewNotification) -> Notification {
    h.store
        .save(Notification::from_request(request))
        .await
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_create_returns_pending_before_delivery() {
    let h = harness(
        ScriptedRenderer::healthy(),
        RecordingMailer::always_failing(),
        DeliveryConfig::default(),
    );

    let created = assert_ok!(h.engine.create(course_update()).await);

    assert_eq!(created.status, NotificationStatus::Pending);
    assert!(!created.read);
    assert!(h.mailer.calls().is_empty());

    // Let the background sequence run to exhaustion
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(h.mailer.calls().len(), 3);
    let stored = h.store.find_by_id(created.id).await.unwrap().unwrap();
    assert_eq!(stored.status, NotificationStatus::Pending);
    assert_eq!(h.engine.stats().exhausted, 1);
}

#[tokio::test(start_paused = true)]
async fn test_blank_title_or_recipient_skips_delivery() {
    let h = harness(
        ScriptedRenderer::healthy(),
        RecordingMailer::healthy(),
        DeliveryConfig::default(),
    );

    for request in [
        NewNotification::new("", "M", "a@b.com", "GENERAL"),
        NewNotification::new("Title", "M", "", "GENERAL"),
    ] {
        let notification = persisted(&h, request).await;
        let outcome = h.engine.deliver(notification.clone()).await;

        assert!(matches!(outcome, DeliveryOutcome::Skipped { .. }));
        let stored = h.store.find_by_id(notification.id).await.unwrap().unwrap();
        assert_eq!(stored.status, NotificationStatus::Pending);
    }

    assert_eq!(h.renderer.calls(), 0);
    assert!(h.mailer.calls().is_empty());
    assert_eq!(h.engine.stats().skipped, 2);
}

#[tokio::test(start_paused = true)]
async fn test_whitespace_title_is_still_delivered() {
    let h = harness(
        ScriptedRenderer::healthy(),
        RecordingMailer::healthy(),
        DeliveryConfig::default(),
    );
    let notification = persisted(&h, NewNotification::new("   ", "M", "a@b.com", "GENERAL")).await;

    let outcome = h.engine.deliver(notification).await;

    assert_eq!(
        outcome,
        DeliveryOutcome::Sent {
            attempts: 1,
            used_fallback: false
        }
    );
    let calls = h.mailer.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].subject, "   ");
    assert_eq!(h.engine.stats().skipped, 0);
}

#[tokio::test(start_paused = true)]
async fn test_always_failing_mailer_is_bounded_with_linear_backoff() {
    let h = harness(
        ScriptedRenderer::healthy(),
        RecordingMailer::always_failing(),
        DeliveryConfig::default(),
    );
    let notification = persisted(&h, course_update()).await;

    let outcome = h.engine.deliver(notification).await;

    match outcome {
        DeliveryOutcome::Exhausted { attempts, last_error } => {
            assert_eq!(attempts, 3);
            assert!(last_error.contains("connection refused"));
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    let calls = h.mailer.calls();
    assert_eq!(calls.len(), 3);
    assert_gap(calls[1].at - calls[0].at, Duration::from_secs(1));
    assert_gap(calls[2].at - calls[1].at, Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_backoff_follows_configuration() {
    let config = DeliveryConfig {
        max_retry_attempts: 4,
        retry_delay_ms: 250,
        ..DeliveryConfig::default()
    };
    let h = harness(ScriptedRenderer::healthy(), RecordingMailer::always_failing(), config);
    let notification = persisted(&h, course_update()).await;

    h.engine.deliver(notification).await;

    let calls = h.mailer.calls();
    assert_eq!(calls.len(), 4);
    for (pair, expected_ms) in calls.windows(2).zip([250, 500, 750]) {
        assert_gap(pair[1].at - pair[0].at, Duration::from_millis(expected_ms));
    }
}

#[tokio::test(start_paused = true)]
async fn test_failing_renderer_falls_back_on_final_attempt() {
    let h = harness(
        ScriptedRenderer::failing(u32::MAX),
        RecordingMailer::healthy(),
        DeliveryConfig::default(),
    );
    let notification = persisted(&h, course_update()).await;

    let outcome = h.engine.deliver(notification).await;

    assert_eq!(
        outcome,
        DeliveryOutcome::Sent {
            attempts: 3,
            used_fallback: true
        }
    );
    assert_eq!(h.renderer.calls(), 3);

    let calls = h.mailer.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].body,
        "<html><body><h1>Course Update: CS101</h1><p>Lecture 4 slides are online</p></body></html>"
    );
    assert_eq!(h.engine.stats().fallbacks, 1);
}

#[tokio::test(start_paused = true)]
async fn test_blank_render_is_retried_then_falls_back() {
    let h = harness(
        ScriptedRenderer::blank(),
        RecordingMailer::healthy(),
        DeliveryConfig::default(),
    );
    let notification = persisted(&h, course_update()).await;
    let start = Instant::now();

    let outcome = h.engine.deliver(notification).await;

    assert_eq!(
        outcome,
        DeliveryOutcome::Sent {
            attempts: 3,
            used_fallback: true
        }
    );
    assert_eq!(h.renderer.calls(), 3);

    // Both backoff sleeps ran before the single send
    let calls = h.mailer.calls();
    assert_eq!(calls.len(), 1);
    assert_gap(calls[0].at - start, Duration::from_secs(3));
    assert_eq!(
        calls[0].body,
        "<html><body><h1>Course Update: CS101</h1><p>Lecture 4 slides are online</p></body></html>"
    );
    assert_eq!(h.engine.stats().fallbacks, 1);
}

#[tokio::test(start_paused = true)]
async fn test_renderer_recovers_before_final_attempt() {
    let h = harness(
        ScriptedRenderer::failing(1),
        RecordingMailer::healthy(),
        DeliveryConfig::default(),
    );
    let notification = persisted(&h, course_update()).await;

    let outcome = h.engine.deliver(notification).await;

    assert_eq!(
        outcome,
        DeliveryOutcome::Sent {
            attempts: 2,
            used_fallback: false
        }
    );
    let calls = h.mailer.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].body.contains("Course Update: CS101"));
    assert!(calls[0].body.contains("Lecture 4 slides are online"));
}

#[tokio::test(start_paused = true)]
async fn test_invalid_template_data_uses_base_variables() {
    let h = harness(
        ScriptedRenderer::healthy(),
        RecordingMailer::healthy(),
        DeliveryConfig::default(),
    );
    let notification = persisted(&h, course_update().template_data("{not valid json")).await;

    let outcome = h.engine.deliver(notification).await;

    assert!(outcome.is_sent());
    let variables = h.renderer.last_variables().unwrap();
    let mut keys: Vec<&String> = variables.keys().collect();
    keys.sort();
    assert_eq!(keys, vec!["message", "title"]);
}

#[tokio::test(start_paused = true)]
async fn test_named_template_receives_template_data() {
    let renderer = ScriptedRenderer::healthy();
    assert_ok!(renderer.templates.create(Template::new(
        "assignment-due",
        "Assignment due",
        "<p>{{assignment}} for {{course}} is due in {{days}} days</p>",
    )));
    let h = harness(renderer, RecordingMailer::healthy(), DeliveryConfig::default());

    let request = course_update()
        .template_name("assignment-due")
        .template_data_from(&json!({
            "assignment": "Homework 3",
            "course": "CS101",
            "days": 2
        }))
        .unwrap();
    let notification = persisted(&h, request).await;

    h.engine.deliver(notification).await;

    let calls = h.mailer.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].to, "a@b.com");
    assert_eq!(calls[0].subject, "Course Update: CS101");
    assert_eq!(calls[0].body, "<p>Homework 3 for CS101 is due in 2 days</p>");
}

#[tokio::test(start_paused = true)]
async fn test_unknown_template_uses_fallback_after_retries() {
    let h = harness(
        ScriptedRenderer::healthy(),
        RecordingMailer::healthy(),
        DeliveryConfig::default(),
    );
    let notification = persisted(&h, course_update().template_name("does-not-exist")).await;

    let outcome = h.engine.deliver(notification).await;

    assert_eq!(
        outcome,
        DeliveryOutcome::Sent {
            attempts: 3,
            used_fallback: true
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_mailer_fails_twice_then_succeeds() {
    let h = harness(
        ScriptedRenderer::healthy(),
        RecordingMailer::failing(2),
        DeliveryConfig::default(),
    );
    let notification = persisted(&h, course_update()).await;
    let start = Instant::now();

    let outcome = h.engine.deliver(notification.clone()).await;

    assert_eq!(
        outcome,
        DeliveryOutcome::Sent {
            attempts: 3,
            used_fallback: false
        }
    );
    assert_gap(start.elapsed(), Duration::from_secs(3));
    assert_eq!(h.renderer.calls(), 3);

    let calls = h.mailer.calls();
    assert_eq!(calls.len(), 3);
    assert_gap(calls[1].at - calls[0].at, Duration::from_secs(1));
    assert_gap(calls[2].at - calls[1].at, Duration::from_secs(2));

    // Success leaves the status untouched by default
    let stored = h.store.find_by_id(notification.id).await.unwrap().unwrap();
    assert_eq!(stored.status, NotificationStatus::Pending);
}

#[tokio::test(start_paused = true)]
async fn test_mark_sent_on_success() {
    let config = DeliveryConfig {
        mark_sent_on_success: true,
        ..DeliveryConfig::default()
    };
    let h = harness(ScriptedRenderer::healthy(), RecordingMailer::healthy(), config);
    let notification = persisted(&h, course_update()).await;

    assert!(h.engine.deliver(notification.clone()).await.is_sent());

    let stored = h.store.find_by_id(notification.id).await.unwrap().unwrap();
    assert_eq!(stored.status, NotificationStatus::Sent);
    assert!(!stored.read);
}

#[tokio::test(start_paused = true)]
async fn test_mark_sent_keeps_newer_status() {
    let config = DeliveryConfig {
        mark_sent_on_success: true,
        ..DeliveryConfig::default()
    };
    let h = harness(ScriptedRenderer::healthy(), RecordingMailer::failing(1), config);
    let notification = persisted(&h, course_update()).await;

    let handle = h.engine.spawn_delivery(notification.clone());
    // First attempt fails; read the record during the backoff sleep
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_ok!(h.engine.mark_as_read(notification.id).await);

    assert!(handle.await.unwrap().is_sent());
    let stored = h.store.find_by_id(notification.id).await.unwrap().unwrap();
    assert_eq!(stored.status, NotificationStatus::Read);
}

/// Memory store whose conditional status write takes a while to land
struct SlowStatusWriteStore {
    inner: MemoryNotificationStore,
    delay: Duration,
}

#[async_trait]
impl NotificationStore for SlowStatusWriteStore {
    fn backend_type(&self) -> &'static str {
        "slow-status-write"
    }

    async fn save(&self, notification: Notification) -> Result<Notification, StoreError> {
        self.inner.save(notification).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Notification>, StoreError> {
        self.inner.find_by_id(id).await
    }

    async fn find_all(&self) -> Result<Vec<Notification>, StoreError> {
        self.inner.find_all().await
    }

    async fn delete_all(&self, notifications: &[Notification]) -> Result<usize, StoreError> {
        self.inner.delete_all(notifications).await
    }

    async fn update_status_if(
        &self,
        id: Uuid,
        expected: NotificationStatus,
        status: NotificationStatus,
    ) -> Result<bool, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.update_status_if(id, expected, status).await
    }

    async fn mark_all_read(&self, recipient_email: &str) -> Result<usize, StoreError> {
        self.inner.mark_all_read(recipient_email).await
    }

    async fn update_status_by_recipient(
        &self,
        recipient_email: &str,
        from: NotificationStatus,
        to: NotificationStatus,
    ) -> Result<usize, StoreError> {
        self.inner
            .update_status_by_recipient(recipient_email, from, to)
            .await
    }
}

#[tokio::test(start_paused = true)]
async fn test_read_during_sent_write_back_is_not_lost() {
    let store = Arc::new(SlowStatusWriteStore {
        inner: MemoryNotificationStore::new(),
        delay: Duration::from_millis(50),
    });
    let engine = NotificationEngine::new(
        store.clone(),
        ScriptedRenderer::healthy(),
        RecordingMailer::healthy(),
        DeliveryConfig {
            mark_sent_on_success: true,
            ..DeliveryConfig::default()
        },
    );
    let notification = store
        .save(Notification::from_request(course_update()))
        .await
        .unwrap();

    let handle = engine.spawn_delivery(notification.clone());
    // The send has completed and the SENT write-back is still in flight
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_ok!(engine.mark_as_read(notification.id).await);

    assert!(handle.await.unwrap().is_sent());
    let stored = store.find_by_id(notification.id).await.unwrap().unwrap();
    assert_eq!(stored.status, NotificationStatus::Read);
    assert!(stored.read);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_backoff() {
    let h = harness(
        ScriptedRenderer::healthy(),
        RecordingMailer::always_failing(),
        DeliveryConfig::default(),
    );
    let notification = persisted(&h, course_update()).await;

    let handle = h.engine.spawn_delivery(notification);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.mailer.calls().len(), 1);

    h.engine.shutdown();

    assert_eq!(
        handle.await.unwrap(),
        DeliveryOutcome::Interrupted { attempt: 1 }
    );
    assert_eq!(h.mailer.calls().len(), 1);
    assert_eq!(h.engine.stats().interrupted, 1);
}

#[tokio::test(start_paused = true)]
async fn test_delivery_after_shutdown_stops_at_first_backoff() {
    let h = harness(
        ScriptedRenderer::healthy(),
        RecordingMailer::always_failing(),
        DeliveryConfig::default(),
    );
    h.engine.shutdown();
    let notification = persisted(&h, course_update()).await;

    let outcome = h.engine.deliver(notification).await;

    assert_eq!(outcome, DeliveryOutcome::Interrupted { attempt: 1 });
    assert_eq!(h.mailer.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_store_failure_is_reported_and_nothing_dispatched() {
    struct UnavailableStore;

    #[async_trait]
    impl NotificationStore for UnavailableStore {
        fn backend_type(&self) -> &'static str {
            "unavailable"
        }

        async fn save(
            &self,
            _notification: Notification,
        ) -> Result<Notification, StoreError> {
            Err(StoreError::Unavailable(
                "database down".to_string(),
            ))
        }

        async fn find_by_id(
            &self,
            _id: Uuid,
        ) -> Result<Option<Notification>, StoreError> {
            Ok(None)
        }

        async fn find_all(
            &self,
        ) -> Result<Vec<Notification>, StoreError> {
            Ok(Vec::new())
        }

        async fn delete_all(
            &self,
            _notifications: &[Notification],
        ) -> Result<usize, StoreError> {
            Ok(0)
        }

        async fn update_status_if(
            &self,
            _id: Uuid,
            _expected: NotificationStatus,
            _status: NotificationStatus,
        ) -> Result<bool, StoreError> {
            Ok(false)
        }

        async fn mark_all_read(
            &self,
            _recipient_email: &str,
        ) -> Result<usize, StoreError> {
            Ok(0)
        }

        async fn update_status_by_recipient(
            &self,
            _recipient_email: &str,
            _from: NotificationStatus,
            _to: NotificationStatus,
        ) -> Result<usize, StoreError> {
            Ok(0)
        }
    }

    let mailer = RecordingMailer::healthy();
    let engine = NotificationEngine::new(
        Arc::new(UnavailableStore),
        ScriptedRenderer::healthy(),
        mailer.clone(),
        DeliveryConfig::default(),
    );

    let error = assert_err!(engine.create(course_update()).await);
    assert_eq!(error.code(), "STORE_ERROR");

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(mailer.calls().is_empty());
    assert_eq!(engine.stats().created, 0);
}
