use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use chorus::client::mock::{Call, MockClient, Stall};
use chorus::client::{ChannelRef, MessageId, MessagingClient};
use chorus::engine::Engine;
use chorus::engine::chorus::{ChorusEngine, EngineConfig, RunSummary};
use chorus::engine::pacing::{Pacing, Vocabulary};
use chorus::error::StartupError;
use chorus::events::{Event, Phase, drain};

const VOCAB: [&str; 3] = ["👍", "🔥", "❤️"];

fn config(backlog_limit: usize) -> EngineConfig {
    EngineConfig {
        channel: ChannelRef::Name("@news".to_string()),
        vocabulary: Vocabulary::new(VOCAB).unwrap(),
        backlog_limit,
        pacing: Pacing::default(),
    }
}

fn build(sessions: &[Arc<MockClient>], config: EngineConfig) -> Arc<ChorusEngine> {
    let sessions = sessions
        .iter()
        .map(|s| Arc::clone(s) as Arc<dyn MessagingClient>)
        .collect();
    Arc::new(ChorusEngine::new(sessions, config))
}

async fn wait_for(rx: &mut broadcast::Receiver<Event>, wanted: Event) {
    loop {
        match rx.recv().await {
            Ok(event) if event == wanted => return,
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => panic!("bus closed before {wanted:?}"),
        }
    }
}

/// Start the engine, let it reach LIVE, idle for `live_for`, then shut down.
async fn run_until_live(engine: Arc<ChorusEngine>, live_for: Duration) -> RunSummary {
    let mut rx = engine.events().subscribe();
    let token = CancellationToken::new();
    let run = {
        let engine = Arc::clone(&engine);
        let token = token.clone();
        tokio::spawn(async move { engine.run(token).await })
    };

    wait_for(&mut rx, Event::PhaseChanged(Phase::Live)).await;
    tokio::time::sleep(live_for).await;
    token.cancel();
    run.await.unwrap().unwrap()
}

fn submitted_for(session: &MockClient, id: i64) -> Vec<String> {
    session
        .submissions()
        .into_iter()
        .filter(|(m, _)| *m == MessageId(id))
        .map(|(_, s)| s)
        .collect()
}

fn phases(events: &[Event]) -> Vec<Phase> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::PhaseChanged(p) => Some(*p),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn backlog_of_three_across_two_sessions() {
    let a = Arc::new(MockClient::new("a").with_history(&[101, 102, 103]));
    let b = Arc::new(MockClient::new("b"));
    let engine = build(&[Arc::clone(&a), Arc::clone(&b)], config(3));
    let mut rx = engine.events().subscribe();

    let summary = run_until_live(Arc::clone(&engine), Duration::from_secs(1)).await;

    let processed: BTreeSet<MessageId> = [101, 102, 103].into_iter().map(MessageId).collect();
    assert_eq!(engine.ledger().snapshot(), processed);
    assert_eq!(summary.stats.messages, 3);
    assert_eq!(summary.backlog.dispatched, 3);

    let started = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, Event::DispatchStarted { .. }))
        .count();
    assert_eq!(started, 3);

    for session in [&a, &b] {
        for id in [101, 102, 103] {
            let symbols = submitted_for(session, id);
            assert!((1..=2).contains(&symbols.len()), "{symbols:?}");
            assert!(symbols.iter().all(|s| VOCAB.contains(&s.as_str())));
        }
    }

    assert!(a.calls().contains(&Call::FetchHistory { limit: 3 }));
    assert!(!b.calls().iter().any(|c| matches!(c, Call::FetchHistory { .. })));
}

#[tokio::test(start_paused = true)]
async fn live_copy_of_backlog_message_sends_nothing_more() {
    let a = Arc::new(MockClient::new("a").with_history(&[101]).with_live(&[101]));
    let engine = build(&[Arc::clone(&a)], config(100));
    let mut rx = engine.events().subscribe();

    run_until_live(Arc::clone(&engine), Duration::from_secs(60)).await;

    let events = drain(&mut rx);
    assert!(events.contains(&Event::DuplicateSkipped {
        message: MessageId(101)
    }));
    let sent = events
        .iter()
        .filter(|e| matches!(e, Event::ReactionSent { .. }))
        .count();
    assert_eq!(submitted_for(&a, 101).len(), sent);
    assert!((1..=2).contains(&sent));
}

#[tokio::test(start_paused = true)]
async fn live_messages_wait_for_the_backlog() {
    let a = Arc::new(MockClient::new("a").with_history(&[1, 2]).with_live(&[3]));
    let b = Arc::new(MockClient::new("b").with_live(&[3]));
    let engine = build(&[Arc::clone(&a), Arc::clone(&b)], config(100));

    run_until_live(engine, Duration::from_secs(60)).await;

    for session in [&a, &b] {
        let calls = session.calls();
        let subscribed_at = calls.iter().position(|c| *c == Call::Subscribe).unwrap();
        for (i, call) in calls.iter().enumerate() {
            if let Call::Submit { message, .. } = call {
                if *message == MessageId(3) {
                    assert!(i > subscribed_at);
                } else {
                    assert!(i < subscribed_at);
                }
            }
        }
        assert!(!submitted_for(session, 3).is_empty());
    }
}

#[tokio::test(start_paused = true)]
async fn resolution_failure_stops_before_backfill_and_releases_sessions() {
    let a = Arc::new(MockClient::new("a").failing_resolution().with_history(&[1]));
    let b = Arc::new(MockClient::new("b"));
    let engine = build(&[Arc::clone(&a), Arc::clone(&b)], config(100));
    let mut rx = engine.events().subscribe();

    let result = engine.run(CancellationToken::new()).await;

    assert!(matches!(result, Err(StartupError::Resolution(_))));
    assert_eq!(phases(&drain(&mut rx)), vec![Phase::Init, Phase::Shutdown]);
    for session in [&a, &b] {
        assert!(!session.is_open());
        assert!(session.calls().contains(&Call::Close));
        assert!(!session.calls().contains(&Call::Subscribe));
    }
    assert!(a.submissions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn malformed_channel_is_fatal_without_network() {
    let a = Arc::new(MockClient::new("a"));
    let mut config = config(100);
    config.channel = ChannelRef::Name("news".to_string());
    let engine = build(&[Arc::clone(&a)], config);

    let result = engine.run(CancellationToken::new()).await;

    assert!(matches!(result, Err(StartupError::Resolution(_))));
    assert_eq!(a.calls(), vec![Call::Open, Call::Close]);
}

#[tokio::test(start_paused = true)]
async fn no_usable_session_is_fatal() {
    let a = Arc::new(MockClient::new("a").failing_open());
    let engine = build(&[Arc::clone(&a)], config(100));

    let result = engine.run(CancellationToken::new()).await;

    assert!(matches!(result, Err(StartupError::NoSessions)));
    assert_eq!(a.calls(), vec![Call::Open]);
}

#[tokio::test(start_paused = true)]
async fn session_that_fails_to_open_is_left_out() {
    let a = Arc::new(MockClient::new("a").failing_open().with_history(&[1]));
    let b = Arc::new(MockClient::new("b").with_history(&[7]));
    let engine = build(&[Arc::clone(&a), Arc::clone(&b)], config(100));

    let summary = run_until_live(engine, Duration::from_secs(1)).await;

    assert_eq!(summary.sessions, 1);
    assert_eq!(a.calls(), vec![Call::Open]);
    assert!(b.calls().contains(&Call::FetchHistory { limit: 100 }));
    assert!(!submitted_for(&b, 7).is_empty());
}

#[tokio::test(start_paused = true)]
async fn retrieval_failure_still_goes_live() {
    let a = Arc::new(MockClient::new("a").failing_history().with_live(&[5]));
    let engine = build(&[Arc::clone(&a)], config(100));

    let summary = run_until_live(Arc::clone(&engine), Duration::from_secs(60)).await;

    assert!(summary.backlog.error.is_some());
    assert!(engine.ledger().already_processed(MessageId(5)));
    assert!(!submitted_for(&a, 5).is_empty());
}

#[tokio::test(start_paused = true)]
async fn always_failing_session_does_not_block_the_other() {
    let a = Arc::new(MockClient::new("a").failing_submissions().with_history(&[9]));
    let b = Arc::new(MockClient::new("b"));
    let engine = build(&[Arc::clone(&a), Arc::clone(&b)], config(100));

    let summary = run_until_live(engine, Duration::from_secs(1)).await;

    assert_eq!(submitted_for(&a, 9).len(), 3);
    assert!((1..=2).contains(&submitted_for(&b, 9).len()));
    assert_eq!(summary.stats.exhausted, 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_releases_every_session_even_if_one_fails() {
    let a = Arc::new(MockClient::new("a").failing_close());
    let b = Arc::new(MockClient::new("b"));
    let engine = build(&[Arc::clone(&a), Arc::clone(&b)], config(100));

    run_until_live(engine, Duration::from_secs(1)).await;

    assert!(a.calls().contains(&Call::Close));
    assert!(b.calls().contains(&Call::Close));
    assert!(!b.is_open());
}

#[tokio::test(start_paused = true)]
async fn interrupt_during_backfill_skips_live() {
    let history: Vec<i64> = (1..=50).collect();
    let a = Arc::new(MockClient::new("a").with_history(&history));
    let engine = build(&[Arc::clone(&a)], config(100));
    let mut rx = engine.events().subscribe();
    let token = CancellationToken::new();

    let run = {
        let engine = Arc::clone(&engine);
        let token = token.clone();
        tokio::spawn(async move { engine.run(token).await })
    };
    wait_for(&mut rx, Event::PhaseChanged(Phase::Backfill)).await;
    tokio::time::sleep(Duration::from_secs(30)).await;
    token.cancel();
    let summary = run.await.unwrap().unwrap();

    assert!(summary.backlog.interrupted);
    assert!(summary.stats.messages < 50);
    assert!(!a.calls().contains(&Call::Subscribe));
    assert!(a.calls().contains(&Call::Close));
    assert!(!phases(&drain(&mut rx)).contains(&Phase::Live));
}

#[tokio::test(start_paused = true)]
async fn skipped_backlog_goes_straight_to_live() {
    let a = Arc::new(MockClient::new("a").with_history(&[1, 2]).with_live(&[3]));
    let engine = build(&[Arc::clone(&a)], config(0));

    let summary = run_until_live(Arc::clone(&engine), Duration::from_secs(60)).await;

    assert_eq!(summary.backlog.retrieved, 0);
    assert!(!a.calls().iter().any(|c| matches!(c, Call::FetchHistory { .. })));
    let processed: Vec<MessageId> = engine.ledger().snapshot().into_iter().collect();
    assert_eq!(processed, vec![MessageId(3)]);
}

async fn run_and_interrupt(engine: Arc<ChorusEngine>, after: Duration) -> RunSummary {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        trigger.cancel();
    });
    tokio::time::timeout(Duration::from_secs(60), engine.run(token))
        .await
        .expect("run ignored shutdown")
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn interrupt_during_hung_open_stops_promptly() {
    let a = Arc::new(MockClient::new("a").stalling(Stall::Open));
    let b = Arc::new(MockClient::new("b"));
    let engine = build(&[Arc::clone(&a), Arc::clone(&b)], config(100));
    let mut rx = engine.events().subscribe();

    let summary = run_and_interrupt(Arc::clone(&engine), Duration::from_secs(1)).await;

    assert_eq!(summary.sessions, 0);
    assert_eq!(a.calls(), vec![Call::Open]);
    assert!(b.calls().is_empty());
    assert_eq!(phases(&drain(&mut rx)), vec![Phase::Init, Phase::Shutdown]);
}

#[tokio::test(start_paused = true)]
async fn interrupt_during_hung_resolution_releases_sessions() {
    let a = Arc::new(MockClient::new("a").stalling(Stall::Resolve).with_history(&[1]));
    let engine = build(&[Arc::clone(&a)], config(100));

    let summary = run_and_interrupt(Arc::clone(&engine), Duration::from_secs(1)).await;

    assert_eq!(summary.sessions, 1);
    assert_eq!(summary.channel, None);
    assert!(a.calls().contains(&Call::Close));
    assert!(!a.calls().iter().any(|c| matches!(c, Call::FetchHistory { .. })));
}
