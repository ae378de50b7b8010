//! Integration tests for the full quiz conversation.
//!
//! Each test drives a `QuizAgent` through a recording channel that keeps
//! every outgoing message, so the tests see exactly what the user and the
//! operator would receive.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

use readiness_quiz::agent::{HELP_TEXT, QuizAgent, WELCOME_MESSAGE};
use readiness_quiz::channels::{
    Channel, EventStream, EventUser, InboundEvent, OutgoingMessage,
};
use readiness_quiz::config::QuizConfig;
use readiness_quiz::error::{ChannelError, RESTART_APOLOGY, START_HINT};
use readiness_quiz::quiz::report::{HIGH_READINESS_MESSAGE, LOW_READINESS_MESSAGE};
use readiness_quiz::quiz::{Answer, Category, QUESTION_COUNT, UserId, UserProfile};
use readiness_quiz::retry::RetryPolicy;

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

const OPERATOR: i64 = 1000;
const USER: i64 = 42;
const LINK: &str = "https://t.me/+test_channel";

/// Channel stub that records sends instead of talking to a platform.
#[derive(Default)]
struct RecordingChannel {
    sent: Mutex<Vec<(i64, OutgoingMessage)>>,
    /// Sends to this chat fail permanently while set.
    failing_chat: Mutex<Option<i64>>,
    /// Sends to this chat succeed this many more times, then fail.
    send_budget: Mutex<Option<(i64, usize)>>,
    profile_unavailable: bool,
}

impl RecordingChannel {
    fn without_profiles() -> Self {
        Self {
            profile_unavailable: true,
            ..Self::default()
        }
    }

    fn fail_sends_to(&self, chat: Option<i64>) {
        *self.failing_chat.lock().unwrap() = chat;
    }

    fn allow_sends_to(&self, chat: i64, count: usize) {
        *self.send_budget.lock().unwrap() = Some((chat, count));
    }

    fn clear_failures(&self) {
        *self.failing_chat.lock().unwrap() = None;
        *self.send_budget.lock().unwrap() = None;
    }

    fn sent_to(&self, chat: i64) -> Vec<OutgoingMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == chat)
            .map(|(_, m)| m.clone())
            .collect()
    }

    fn texts_to(&self, chat: i64) -> Vec<String> {
        self.sent_to(chat).into_iter().map(|m| m.text).collect()
    }

    fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        Ok(Box::pin(futures::stream::empty()))
    }

    async fn send_message(
        &self,
        chat_id: i64,
        message: OutgoingMessage,
    ) -> Result<(), ChannelError> {
        if *self.failing_chat.lock().unwrap() == Some(chat_id) {
            return Err(ChannelError::SendFailed {
                name: "recording".into(),
                reason: "bot was blocked by the user".into(),
            });
        }
        if let Some((budget_chat, remaining)) = self.send_budget.lock().unwrap().as_mut()
            && *budget_chat == chat_id
        {
            if *remaining == 0 {
                return Err(ChannelError::SendFailed {
                    name: "recording".into(),
                    reason: "chat not found".into(),
                });
            }
            *remaining -= 1;
        }
        self.sent.lock().unwrap().push((chat_id, message));
        Ok(())
    }

    async fn resolve_profile(&self, user_id: UserId) -> Result<UserProfile, ChannelError> {
        if self.profile_unavailable {
            return Err(ChannelError::ProfileLookup {
                user_id,
                reason: "chat not found".into(),
            });
        }
        Ok(UserProfile {
            first_name: Some("Alice".into()),
            last_name: Some("Smith".into()),
        })
    }
}

fn config() -> QuizConfig {
    QuizConfig {
        operator_id: UserId(OPERATOR),
        channel_link: LINK.into(),
        // Small enough that the detailed answers need several messages.
        max_message_len: 400,
        ..QuizConfig::default()
    }
}

fn agent(channel: Arc<RecordingChannel>) -> QuizAgent {
    QuizAgent::new(config(), channel).with_retry_policy(RetryPolicy::immediate(2))
}

fn alice() -> Option<EventUser> {
    Some(EventUser {
        id: UserId(USER),
        handle: Some("alice".into()),
    })
}

fn text(body: &str) -> InboundEvent {
    InboundEvent::message("recording", USER, alice(), body)
}

fn press(payload: &str) -> InboundEvent {
    InboundEvent::button(
        "recording",
        USER,
        alice(),
        Some("cb".into()),
        Some(payload.into()),
    )
}

fn answer(step: usize, category: Category) -> InboundEvent {
    press(&Answer::payload(step, category))
}

async fn answer_all(agent: &QuizAgent, category: Category) {
    for step in 0..QUESTION_COUNT {
        agent.handle_event(&answer(step, category)).await;
    }
}

#[tokio::test]
async fn full_quiz_delivers_result_and_report() {
    timeout(TEST_TIMEOUT, async {
        let channel = Arc::new(RecordingChannel::default());
        let agent = agent(Arc::clone(&channel));

        agent.handle_event(&text("/start")).await;
        let to_user = channel.sent_to(USER);
        assert_eq!(to_user.len(), 2);
        assert_eq!(to_user[0].text, WELCOME_MESSAGE);
        assert!(to_user[1].text.starts_with("1. "));
        let payloads: Vec<_> = to_user[1].buttons.iter().map(|b| b.payload.as_str()).collect();
        assert_eq!(payloads, ["0:a", "0:b", "0:c"]);

        answer_all(&agent, Category::C).await;

        let to_user = channel.texts_to(USER);
        // welcome + 10 questions + result
        assert_eq!(to_user.len(), 12);
        assert!(to_user[10].starts_with("10. "));
        assert_eq!(
            to_user.last().unwrap(),
            &format!("{HIGH_READINESS_MESSAGE}\n{LINK}")
        );

        let report = channel.texts_to(OPERATOR);
        assert!(report.len() >= 2, "report should be split: {report:?}");
        assert!(report[0].starts_with("New participant completed the quiz:"));
        assert!(report[0].contains("Name: Alice Smith"));
        assert!(report[0].contains("Username: @alice"));
        assert!(report[0].contains("Profile: https://t.me/alice"));
        assert!(report[0].contains("Answers c: 10"));
        assert!(report[1].starts_with("Detailed answers:"));
        assert!(report.iter().all(|chunk| chunk.chars().count() <= 400));
        let entries: usize = report.iter().map(|c| c.matches("   Answer: C) ").count()).sum();
        assert_eq!(entries, QUESTION_COUNT);

        assert!(agent.engine().store().is_empty().await);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn press_after_completion_prompts_start() {
    timeout(TEST_TIMEOUT, async {
        let channel = Arc::new(RecordingChannel::default());
        let agent = agent(Arc::clone(&channel));

        agent.handle_event(&text("/start")).await;
        answer_all(&agent, Category::A).await;
        assert_eq!(
            channel.texts_to(USER).last().unwrap(),
            &format!("{LOW_READINESS_MESSAGE}\n{LINK}")
        );
        channel.clear();

        agent.handle_event(&answer(9, Category::A)).await;
        assert_eq!(channel.texts_to(USER), [START_HINT]);
        assert!(channel.texts_to(OPERATOR).is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn answer_without_session_prompts_start() {
    timeout(TEST_TIMEOUT, async {
        let channel = Arc::new(RecordingChannel::default());
        let agent = agent(Arc::clone(&channel));

        agent.handle_event(&press("c")).await;
        assert_eq!(channel.texts_to(USER), [START_HINT]);
        assert!(agent.engine().store().is_empty().await);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn restart_resets_progress() {
    timeout(TEST_TIMEOUT, async {
        let channel = Arc::new(RecordingChannel::default());
        let agent = agent(Arc::clone(&channel));

        agent.handle_event(&text("/start")).await;
        agent.handle_event(&answer(0, Category::B)).await;
        agent.handle_event(&answer(1, Category::B)).await;
        agent.handle_event(&text("/start")).await;

        let session = agent.engine().store().get(UserId(USER)).await.unwrap();
        assert_eq!(session.step(), 0);
        assert_eq!(session.tally().total(), 0);
        assert!(channel.texts_to(USER).last().unwrap().starts_with("1. "));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn stale_press_is_ignored() {
    timeout(TEST_TIMEOUT, async {
        let channel = Arc::new(RecordingChannel::default());
        let agent = agent(Arc::clone(&channel));

        agent.handle_event(&text("/start")).await;
        agent.handle_event(&answer(0, Category::C)).await;
        let before = channel.sent_to(USER).len();

        agent.handle_event(&answer(0, Category::C)).await;
        assert_eq!(channel.sent_to(USER).len(), before);

        let session = agent.engine().store().get(UserId(USER)).await.unwrap();
        assert_eq!(session.step(), 1);
        assert_eq!(session.tally().c, 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn malformed_payload_apologizes_without_mutation() {
    timeout(TEST_TIMEOUT, async {
        let channel = Arc::new(RecordingChannel::default());
        let agent = agent(Arc::clone(&channel));

        agent.handle_event(&text("/start")).await;
        channel.clear();

        agent.handle_event(&press("0:z")).await;
        assert_eq!(channel.texts_to(USER), [RESTART_APOLOGY]);

        let session = agent.engine().store().get(UserId(USER)).await.unwrap();
        assert_eq!(session.step(), 0);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn event_without_sender_apologizes() {
    timeout(TEST_TIMEOUT, async {
        let channel = Arc::new(RecordingChannel::default());
        let agent = agent(Arc::clone(&channel));

        let event = InboundEvent::button("recording", 77, None, None, Some("0:a".into()));
        agent.handle_event(&event).await;

        assert_eq!(channel.texts_to(77), [RESTART_APOLOGY]);
        assert!(agent.engine().store().is_empty().await);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn help_and_free_text() {
    timeout(TEST_TIMEOUT, async {
        let channel = Arc::new(RecordingChannel::default());
        let agent = agent(Arc::clone(&channel));

        agent.handle_event(&text("/help")).await;
        assert_eq!(channel.texts_to(USER), [HELP_TEXT]);
        channel.clear();

        agent.handle_event(&text("what is this?")).await;
        assert!(channel.texts_to(USER).is_empty());
        assert!(agent.engine().store().is_empty().await);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn failed_result_delivery_is_retried_on_next_press() {
    timeout(TEST_TIMEOUT, async {
        let channel = Arc::new(RecordingChannel::default());
        let agent = agent(Arc::clone(&channel));

        agent.handle_event(&text("/start")).await;
        for step in 0..QUESTION_COUNT - 1 {
            agent.handle_event(&answer(step, Category::C)).await;
        }

        channel.fail_sends_to(Some(USER));
        agent.handle_event(&answer(QUESTION_COUNT - 1, Category::C)).await;

        let report_len = channel.texts_to(OPERATOR).len();
        assert!(report_len >= 2);
        let kept = agent.engine().store().get(UserId(USER)).await.unwrap();
        assert!(kept.is_complete());
        assert!(kept.delivery.operator_reported);
        assert!(!kept.delivery.user_notified);

        channel.fail_sends_to(None);
        agent.handle_event(&answer(QUESTION_COUNT - 1, Category::C)).await;

        assert_eq!(
            channel.texts_to(USER).last().unwrap(),
            &format!("{HIGH_READINESS_MESSAGE}\n{LINK}")
        );
        // The operator report is not sent a second time.
        assert_eq!(channel.texts_to(OPERATOR).len(), report_len);
        assert!(agent.engine().store().is_empty().await);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn operator_failure_keeps_session_until_report_retry() {
    timeout(TEST_TIMEOUT, async {
        let channel = Arc::new(RecordingChannel::default());
        let agent = agent(Arc::clone(&channel));
        channel.fail_sends_to(Some(OPERATOR));

        agent.handle_event(&text("/start")).await;
        answer_all(&agent, Category::B).await;

        assert!(channel.texts_to(OPERATOR).is_empty());
        assert!(channel.texts_to(USER).last().unwrap().ends_with(LINK));
        let kept = agent.engine().store().get(UserId(USER)).await.unwrap();
        assert!(kept.delivery.user_notified);
        assert!(!kept.delivery.operator_reported);

        // Still failing: nothing is lost.
        agent.retry_operator_reports().await;
        assert!(agent.engine().store().contains(UserId(USER)).await);

        channel.clear_failures();
        agent.retry_operator_reports().await;

        let report = channel.texts_to(OPERATOR);
        assert!(report[0].starts_with("New participant completed the quiz:"));
        assert!(report[0].contains("Answers b: 10"));
        assert!(agent.engine().store().is_empty().await);
        // The user is not sent the result twice.
        let results = channel
            .texts_to(USER)
            .iter()
            .filter(|t| t.ends_with(LINK))
            .count();
        assert_eq!(results, 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn partial_operator_report_resumes_without_repeats() {
    timeout(TEST_TIMEOUT, async {
        let channel = Arc::new(RecordingChannel::default());
        let agent = agent(Arc::clone(&channel));

        agent.handle_event(&text("/start")).await;
        for step in 0..QUESTION_COUNT - 1 {
            agent.handle_event(&answer(step, Category::C)).await;
        }

        // Header goes through, the next report message fails, and so does
        // the user's result.
        channel.allow_sends_to(OPERATOR, 1);
        channel.fail_sends_to(Some(USER));
        agent.handle_event(&answer(QUESTION_COUNT - 1, Category::C)).await;

        assert_eq!(channel.texts_to(OPERATOR).len(), 1);
        let kept = agent.engine().store().get(UserId(USER)).await.unwrap();
        assert_eq!(kept.delivery.operator_chunks_sent, 1);
        assert!(!kept.delivery.operator_reported);

        channel.clear_failures();
        agent.handle_event(&answer(QUESTION_COUNT - 1, Category::C)).await;

        let report = channel.texts_to(OPERATOR);
        let headers = report
            .iter()
            .filter(|c| c.starts_with("New participant completed the quiz:"))
            .count();
        assert_eq!(headers, 1, "header sent more than once: {report:?}");
        assert_eq!(
            report.iter().filter(|c| c.starts_with("Detailed answers:")).count(),
            1
        );
        let entries: usize = report.iter().map(|c| c.matches("   Answer: C) ").count()).sum();
        assert_eq!(entries, QUESTION_COUNT);
        assert_eq!(
            channel.texts_to(USER).last().unwrap(),
            &format!("{HIGH_READINESS_MESSAGE}\n{LINK}")
        );
        assert!(agent.engine().store().is_empty().await);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn press_after_result_flushes_report_and_prompts_start() {
    timeout(TEST_TIMEOUT, async {
        let channel = Arc::new(RecordingChannel::default());
        let agent = agent(Arc::clone(&channel));
        channel.fail_sends_to(Some(OPERATOR));

        agent.handle_event(&text("/start")).await;
        answer_all(&agent, Category::A).await;
        channel.clear_failures();
        channel.clear();

        agent.handle_event(&answer(QUESTION_COUNT - 1, Category::A)).await;

        assert!(!channel.texts_to(OPERATOR).is_empty());
        assert_eq!(channel.texts_to(USER), [START_HINT]);
        assert!(agent.engine().store().is_empty().await);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn restart_flushes_pending_report() {
    timeout(TEST_TIMEOUT, async {
        let channel = Arc::new(RecordingChannel::default());
        let agent = agent(Arc::clone(&channel));
        channel.fail_sends_to(Some(OPERATOR));

        agent.handle_event(&text("/start")).await;
        answer_all(&agent, Category::C).await;
        channel.clear_failures();

        agent.handle_event(&text("/start")).await;

        assert!(channel.texts_to(OPERATOR)[0].contains("Answers c: 10"));
        let session = agent.engine().store().get(UserId(USER)).await.unwrap();
        assert_eq!(session.step(), 0);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn group_chat_errors_reply_privately() {
    timeout(TEST_TIMEOUT, async {
        let channel = Arc::new(RecordingChannel::default());
        let agent = agent(Arc::clone(&channel));
        let group = -100_123;

        agent.handle_event(&text("/start")).await;
        let event = InboundEvent::button("recording", group, alice(), None, Some("0:z".into()));
        agent.handle_event(&event).await;
        agent
            .handle_event(&InboundEvent::message("recording", group, alice(), "/help"))
            .await;

        assert!(channel.texts_to(group).is_empty());
        let to_user = channel.texts_to(USER);
        assert!(to_user.contains(&RESTART_APOLOGY.to_string()));
        assert_eq!(to_user.last().unwrap(), HELP_TEXT);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn profile_failure_uses_fallback_header() {
    timeout(TEST_TIMEOUT, async {
        let channel = Arc::new(RecordingChannel::without_profiles());
        let agent = agent(Arc::clone(&channel));

        agent.handle_event(&text("/start")).await;
        answer_all(&agent, Category::B).await;

        let report = channel.texts_to(OPERATOR);
        assert!(report[0].starts_with("Quiz results from https://t.me/alice"));
        assert!(report[0].contains("Answers b: 10"));
        assert!(channel.texts_to(USER).last().unwrap().ends_with(LINK));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn abandoned_quiz_sends_nothing_to_operator() {
    timeout(TEST_TIMEOUT, async {
        let channel = Arc::new(RecordingChannel::default());
        let agent = agent(Arc::clone(&channel));

        agent.handle_event(&text("/start")).await;
        for step in 0..3 {
            agent.handle_event(&answer(step, Category::A)).await;
        }

        assert!(channel.texts_to(OPERATOR).is_empty());
        let session = agent.engine().store().get(UserId(USER)).await.unwrap();
        assert_eq!(session.step(), 3);
        assert_eq!(session.transcript().len(), 3);
    })
    .await
    .expect("test timed out");
}
