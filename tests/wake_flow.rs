//! End-to-end wake decision flow
//!
//! Drives the engine through the public API with a recording sink,
//! using short real merge windows and explicit sweep calls so the
//! timing paths are exercised without a background task.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use wakegate::{
    Batch, ConfigHandle, ConversationKey, MessageEvent, SuppressReason, Verdict, VerdictSink,
    WakeConfig, WakeEngine, WakeReason,
};

/// Sink that records every delivery for assertions
#[derive(Default)]
struct RecordingSink {
    verdicts: Mutex<Vec<(String, String, Verdict)>>,
    idle_wakes: Mutex<Vec<ConversationKey>>,
}

impl RecordingSink {
    fn verdicts(&self) -> Vec<(String, String, Verdict)> {
        self.verdicts.lock().unwrap().clone()
    }

    fn idle_wakes(&self) -> Vec<ConversationKey> {
        self.idle_wakes.lock().unwrap().clone()
    }
}

#[async_trait]
impl VerdictSink for RecordingSink {
    async fn on_verdict(&self, batch: &Batch, verdict: &Verdict) {
        self.verdicts.lock().unwrap().push((
            batch.user.to_string(),
            batch.merged_text(),
            *verdict,
        ));
    }

    async fn on_idle_wake(&self, conversation: &ConversationKey) {
        self.idle_wakes.lock().unwrap().push(conversation.clone());
    }
}

fn engine_with(config: WakeConfig) -> (Arc<WakeEngine>, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let handle = ConfigHandle::new(config).unwrap();
    (Arc::new(WakeEngine::new(handle, sink.clone())), sink)
}

/// A short real merge window the tests can sleep past
const WINDOW: f64 = 0.05;

async fn sleep_past_window() {
    tokio::time::sleep(Duration::from_millis(80)).await;
}

#[tokio::test]
async fn rapid_messages_merge_into_one_question_wake() {
    let (engine, sink) = engine_with(WakeConfig {
        merge_window_secs: WINDOW,
        ..Default::default()
    });

    engine.handle_event(MessageEvent::new("g1", "u1", "hey")).await;
    engine.handle_event(MessageEvent::new("g1", "u1", "quick thing")).await;
    engine
        .handle_event(MessageEvent::new("g1", "u1", "can someone help me?"))
        .await;
    assert!(sink.verdicts().is_empty(), "nothing flushes inside the window");

    sleep_past_window().await;
    engine.sweep().await;

    let verdicts = sink.verdicts();
    assert_eq!(verdicts.len(), 1, "exactly one verdict per batch");
    assert_eq!(verdicts[0].1, "hey\nquick thing\ncan someone help me?");
    assert_eq!(
        verdicts[0].2,
        Verdict::Wake {
            mode: wakegate::WakeMode::Forward,
            reason: WakeReason::Question
        }
    );
}

#[tokio::test]
async fn cooldown_suppresses_but_conversations_stay_isolated() {
    let (engine, sink) = engine_with(WakeConfig {
        merge_window_secs: 0.0,
        bot_nicknames: vec!["orin".to_string()],
        question_markers: vec![],
        cooldown_secs: 60.0,
        extend_on_activity: false,
        ..Default::default()
    });

    engine.handle_event(MessageEvent::new("g1", "u1", "orin hello")).await;
    engine.handle_event(MessageEvent::new("g1", "u1", "just chatting")).await;
    // A different conversation is untouched by g1's cooldown
    engine.handle_event(MessageEvent::new("g2", "u1", "orin hello")).await;

    let verdicts = sink.verdicts();
    assert_eq!(verdicts.len(), 3);
    assert!(verdicts[0].2.is_wake());
    assert_eq!(
        verdicts[1].2,
        Verdict::Suppress {
            reason: SuppressReason::OnCooldown
        }
    );
    assert!(verdicts[2].2.is_wake());
}

#[tokio::test]
async fn insult_mute_expires_after_its_window() {
    let (engine, sink) = engine_with(WakeConfig {
        merge_window_secs: 0.0,
        bot_nicknames: vec!["orin".to_string()],
        insult_phrases: vec!["useless bot".to_string()],
        mute_duration_on_insult_secs: 0.05,
        cooldown_secs: 0.0,
        ..Default::default()
    });

    engine
        .handle_event(MessageEvent::new("g1", "u1", "orin you useless bot"))
        .await;
    engine.handle_event(MessageEvent::new("g1", "u1", "orin hello")).await;

    tokio::time::sleep(Duration::from_millis(80)).await;
    engine.handle_event(MessageEvent::new("g1", "u1", "orin still there?")).await;

    let verdicts = sink.verdicts();
    assert_eq!(verdicts.len(), 3);
    assert!(verdicts[0].2.is_wake(), "the trigger itself still wakes");
    assert_eq!(
        verdicts[1].2,
        Verdict::Suppress {
            reason: SuppressReason::Muted
        }
    );
    assert!(verdicts[2].2.is_wake(), "mute expired");
}

#[tokio::test]
async fn blocked_phrase_beats_every_positive_signal() {
    let (engine, sink) = engine_with(WakeConfig {
        merge_window_secs: 0.0,
        bot_nicknames: vec!["orin".to_string()],
        blocked_phrases: vec!["ignore this".to_string()],
        wake_probability: 1.0,
        ..Default::default()
    });

    engine
        .handle_event(MessageEvent::new("g1", "u1", "orin please ignore this?"))
        .await;

    assert_eq!(
        sink.verdicts()[0].2,
        Verdict::Suppress {
            reason: SuppressReason::BlockedPhrase
        }
    );
}

#[tokio::test]
async fn each_positive_signal_wakes_on_its_own() {
    // Mention
    let (engine, sink) = engine_with(WakeConfig {
        merge_window_secs: 0.0,
        bot_nicknames: vec!["orin".to_string()],
        question_markers: vec![],
        cooldown_secs: 0.0,
        ..Default::default()
    });
    engine.handle_event(MessageEvent::new("g1", "u1", "orin morning")).await;
    assert_eq!(
        sink.verdicts()[0].2,
        Verdict::Wake {
            mode: wakegate::WakeMode::Forward,
            reason: WakeReason::Mention
        }
    );

    // Question
    let (engine, sink) = engine_with(WakeConfig {
        merge_window_secs: 0.0,
        ..Default::default()
    });
    engine.handle_event(MessageEvent::new("g1", "u1", "what time is it?")).await;
    assert_eq!(
        sink.verdicts()[0].2,
        Verdict::Wake {
            mode: wakegate::WakeMode::Forward,
            reason: WakeReason::Question
        }
    );

    // Probability
    let (engine, sink) = engine_with(WakeConfig {
        merge_window_secs: 0.0,
        question_markers: vec![],
        wake_probability: 1.0,
        ..Default::default()
    });
    engine.handle_event(MessageEvent::new("g1", "u1", "nothing special")).await;
    assert_eq!(
        sink.verdicts()[0].2,
        Verdict::Wake {
            mode: wakegate::WakeMode::Forward,
            reason: WakeReason::Probability
        }
    );

    // Topic relevance, seeded by a recorded bot reply
    let (engine, sink) = engine_with(WakeConfig {
        merge_window_secs: 0.0,
        question_markers: vec![],
        topic_relevance_threshold: 0.05,
        cooldown_secs: 0.0,
        ..Default::default()
    });
    let conv = ConversationKey::new("g1");
    engine.record_bot_reply(&conv, "the borrow checker enforces aliasing rules strictly");
    engine
        .handle_event(MessageEvent::new(
            "g1",
            "u1",
            "so the borrow checker rejects aliasing like that",
        ))
        .await;
    match sink.verdicts()[0].2 {
        Verdict::Wake {
            reason: WakeReason::Relevance { score },
            ..
        } => assert!(score >= 0.05, "score {score}"),
        other => panic!("expected relevance wake, got {other:?}"),
    }
}

#[tokio::test]
async fn idle_conversation_gets_a_boredom_wake_from_the_sweep() {
    let (engine, sink) = engine_with(WakeConfig {
        merge_window_secs: 0.0,
        question_markers: vec![],
        boredom_threshold_secs: 0.05,
        ..Default::default()
    });

    engine.handle_event(MessageEvent::new("g1", "u1", "last human message")).await;
    tokio::time::sleep(Duration::from_millis(80)).await;
    engine.sweep().await;

    assert_eq!(sink.idle_wakes(), vec![ConversationKey::new("g1")]);

    // The wake re-armed the threshold; an immediate second sweep is quiet
    engine.sweep().await;
    assert_eq!(sink.idle_wakes().len(), 1);
}

#[tokio::test]
async fn muted_conversation_gets_no_boredom_wakes() {
    let (engine, sink) = engine_with(WakeConfig {
        merge_window_secs: 0.0,
        question_markers: vec![],
        shutup_phrases: vec!["be quiet".to_string()],
        unmute_phrases: vec!["speak again".to_string()],
        boredom_threshold_secs: 0.05,
        ..Default::default()
    });

    engine.handle_event(MessageEvent::new("g1", "u1", "be quiet")).await;
    tokio::time::sleep(Duration::from_millis(80)).await;
    engine.sweep().await;
    assert!(sink.idle_wakes().is_empty(), "mute dominates boredom");

    // The threshold stayed armed, so unmuting lets the next sweep fire
    engine.handle_event(MessageEvent::new("g1", "u1", "speak again")).await;
    engine.sweep().await;
    assert_eq!(sink.idle_wakes(), vec![ConversationKey::new("g1")]);
}

#[tokio::test]
async fn no_signal_means_silence() {
    let (engine, sink) = engine_with(WakeConfig {
        merge_window_secs: 0.0,
        question_markers: vec![],
        ..Default::default()
    });

    engine.handle_event(MessageEvent::new("g1", "u1", "plain statement")).await;
    assert_eq!(
        sink.verdicts()[0].2,
        Verdict::Suppress {
            reason: SuppressReason::NoSignal
        }
    );
}

#[tokio::test]
async fn shutdown_drains_every_sender() {
    let (engine, sink) = engine_with(WakeConfig {
        merge_window_secs: 60.0,
        ..Default::default()
    });

    engine.handle_event(MessageEvent::new("g1", "u1", "still typing")).await;
    engine.handle_event(MessageEvent::new("g2", "u2", "me too?")).await;
    engine.shutdown().await;

    let verdicts = sink.verdicts();
    assert_eq!(verdicts.len(), 2, "every buffered message got a verdict");
}

#[tokio::test]
async fn sweeper_task_flushes_without_explicit_calls() {
    let (engine, sink) = engine_with(WakeConfig {
        merge_window_secs: WINDOW,
        sweep_interval_ms: 10,
        ..Default::default()
    });

    let sweeper = engine.spawn_sweeper();
    engine.handle_event(MessageEvent::new("g1", "u1", "anyone home?")).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(sink.verdicts().len(), 1);
    assert!(sink.verdicts()[0].2.is_wake());

    engine.shutdown().await;
    sweeper.await.unwrap();
}

#[tokio::test]
async fn state_snapshot_carries_a_buffered_batch_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let config = WakeConfig {
        merge_window_secs: WINDOW,
        ..Default::default()
    };

    let (first, first_sink) = engine_with(config.clone());
    first.handle_event(MessageEvent::new("g1", "u1", "did you catch that?")).await;
    first.save_state(&path).await.unwrap();
    assert!(first_sink.verdicts().is_empty());
    drop(first);

    let (second, second_sink) = engine_with(config);
    second.load_state(&path).await.unwrap();

    sleep_past_window().await;
    second.sweep().await;

    let verdicts = second_sink.verdicts();
    assert_eq!(verdicts.len(), 1);
    assert_eq!(verdicts[0].1, "did you catch that?");
    assert!(verdicts[0].2.is_wake());
}

#[tokio::test]
async fn state_snapshot_preserves_an_active_cooldown() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let config = WakeConfig {
        merge_window_secs: 0.0,
        bot_nicknames: vec!["orin".to_string()],
        question_markers: vec![],
        cooldown_secs: 60.0,
        extend_on_activity: false,
        ..Default::default()
    };

    let (first, first_sink) = engine_with(config.clone());
    first.handle_event(MessageEvent::new("g1", "u1", "orin hi")).await;
    assert!(first_sink.verdicts()[0].2.is_wake());
    first.save_state(&path).await.unwrap();
    drop(first);

    let (second, second_sink) = engine_with(config);
    second.load_state(&path).await.unwrap();
    second.handle_event(MessageEvent::new("g1", "u1", "chatting away")).await;

    assert_eq!(
        second_sink.verdicts()[0].2,
        Verdict::Suppress {
            reason: SuppressReason::OnCooldown
        }
    );
}

#[tokio::test]
async fn reload_swaps_atomically_for_new_messages() {
    let (engine, sink) = engine_with(WakeConfig {
        merge_window_secs: 0.0,
        question_markers: vec![],
        ..Default::default()
    });

    engine.handle_event(MessageEvent::new("g1", "u1", "hello orin")).await;
    assert!(sink.verdicts()[0].2.is_suppress());

    engine
        .reload(WakeConfig {
            merge_window_secs: 0.0,
            bot_nicknames: vec!["orin".to_string()],
            ..Default::default()
        })
        .unwrap();

    engine.handle_event(MessageEvent::new("g2", "u1", "hello orin")).await;
    assert!(sink.verdicts()[1].2.is_wake());
}
