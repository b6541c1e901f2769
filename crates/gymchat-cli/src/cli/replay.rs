use std::sync::{mpsc as std_mpsc, Arc};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use gymchat_core::{
    ConversationSummary, CoreConfig, CoreEvent, Gym, InMemoryBackend, SessionController,
};

use super::script::{document_fields, Script, Step};

/// Work that has to run on the owner context rather than the delivery thread
#[derive(Debug, Clone, PartialEq)]
enum OwnerAction {
    SignIn,
    SignOut,
    Reopen,
    UpdateGym(i64),
    ListGymMates,
}

struct OwnerCommand {
    action: OwnerAction,
    done: std_mpsc::Sender<()>,
}

/// Outcome of a replay, for callers and tests
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReplayReport {
    pub final_ids: Vec<String>,
    /// Last message text of each final conversation, same order as `final_ids`
    pub final_texts: Vec<String>,
    pub list_changes: usize,
    pub errors: Vec<String>,
}

/// One line per conversation, front first.
pub fn render_summaries(summaries: &[ConversationSummary], now: DateTime<Utc>) -> Vec<String> {
    summaries
        .iter()
        .enumerate()
        .map(|(i, s)| {
            format!(
                "{:>2}. {:<16} {:<40} {}",
                i + 1,
                s.display_name(),
                s.last_message_text,
                s.time_ago(now)
            )
        })
        .collect()
}

/// Drive a session through `script`.
///
/// Backend writes run on a separate delivery thread, like a real SDK
/// callback thread. The session lives on this task and only sees those
/// writes when the tick loop pumps it.
pub async fn run_replay(script: Script, config: CoreConfig, tick: Duration) -> Result<ReplayReport> {
    let backend = InMemoryBackend::new();
    for (uid, fields) in &script.users {
        backend.set_document(&config.users_collection, uid, fields.clone());
    }
    backend.sign_in(script.identity.clone());

    let mut session = SessionController::new(Arc::new(backend.clone()), config.clone());
    let mut report = ReplayReport::default();

    if let Err(e) = session.start_session() {
        println!("! {}", e);
    }
    handle_events(&mut session, &mut report);

    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<OwnerCommand>();
    let delivery = std::thread::spawn(move || deliver_steps(script, config, backend, cmd_tx));

    let mut tick_interval = tokio::time::interval(tick);
    loop {
        tokio::select! {
            _ = tick_interval.tick() => {
                handle_events(&mut session, &mut report);
            }
            command = cmd_rx.recv() => {
                let Some(OwnerCommand { action, done }) = command else {
                    handle_events(&mut session, &mut report);
                    break;
                };
                // Apply whatever was delivered before this step
                handle_events(&mut session, &mut report);
                run_action(&mut session, action);
                handle_events(&mut session, &mut report);
                let _ = done.send(());
            }
        }
    }

    if delivery.join().is_err() {
        anyhow::bail!("delivery thread panicked");
    }

    for summary in session.summaries() {
        report.final_ids.push(summary.conversation_id.clone());
        report.final_texts.push(summary.last_message_text.clone());
    }
    Ok(report)
}

fn deliver_steps(
    script: Script,
    config: CoreConfig,
    backend: InMemoryBackend,
    cmd_tx: mpsc::UnboundedSender<OwnerCommand>,
) {
    let uid = script.identity.uid.clone();
    let owner = |action: OwnerAction| {
        let (done_tx, done_rx) = std_mpsc::channel();
        if cmd_tx.send(OwnerCommand { action, done: done_tx }).is_ok() {
            let _ = done_rx.recv();
        }
    };

    for step in script.steps {
        match step {
            Step::Set {
                feed,
                id,
                fields,
                age_secs,
            } => match feed.collection(&config, &uid) {
                Some(collection) => {
                    let doc = document_fields(&fields, age_secs, Utc::now());
                    backend.set_document(&collection, &id, doc);
                }
                None => tracing::warn!(?feed, "feed disabled in config, skipping set"),
            },
            Step::Delete { feed, id } => {
                if let Some(collection) = feed.collection(&config, &uid) {
                    backend.delete_document(&collection, &id);
                }
            }
            Step::FeedError { feed, message } => {
                if let Some(collection) = feed.collection(&config, &uid) {
                    backend.inject_feed_error(&collection, &message);
                }
            }
            Step::Sleep { ms } => std::thread::sleep(Duration::from_millis(ms)),
            Step::Reopen => owner(OwnerAction::Reopen),
            Step::SignOut => owner(OwnerAction::SignOut),
            Step::SignIn => {
                backend.sign_in(script.identity.clone());
                owner(OwnerAction::SignIn);
            }
            Step::UpdateGym { gym } => owner(OwnerAction::UpdateGym(gym)),
            Step::ListGymMates => owner(OwnerAction::ListGymMates),
        }
    }
}

fn run_action(session: &mut SessionController, action: OwnerAction) {
    tracing::debug!(?action, "running owner action");
    let result = match action {
        OwnerAction::SignIn => session.start_session(),
        OwnerAction::SignOut => {
            session.sign_out();
            Ok(())
        }
        OwnerAction::Reopen => session.reopen_failed_feeds().map(|n| {
            println!("~ reopened {} feed(s)", n);
        }),
        OwnerAction::UpdateGym(gym) => session.update_gym_for_current_user(gym).map(|()| {
            let name = Gym::from_id(gym).map(Gym::name).unwrap_or("unknown gym");
            println!("~ gym set to {}", name);
        }),
        OwnerAction::ListGymMates => session.users_at_same_gym().map(|users| {
            println!("~ {} user(s) at the same gym", users.len());
            for user in users {
                println!("   {}", user.email);
            }
        }),
    };
    if let Err(e) = result {
        tracing::warn!(error = %e, "owner action failed");
    }
}

fn handle_events(session: &mut SessionController, report: &mut ReplayReport) {
    for event in session.pump() {
        match event {
            CoreEvent::StateChanged(state) => println!("* state: {:?}", state),
            CoreEvent::ProfileLoaded(user) => println!("* signed in as {}", user.header_name()),
            CoreEvent::SummariesChanged { len, .. } => {
                report.list_changes += 1;
                println!("# {} conversation(s)", len);
                for line in render_summaries(session.summaries(), Utc::now()) {
                    println!("{}", line);
                }
            }
            CoreEvent::FeedError { scope, message } => {
                println!("! {} feed failed: {}", scope, message);
                report.errors.push(message);
            }
            CoreEvent::Error(message) => {
                println!("! {}", message);
                report.errors.push(message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use gymchat_core::RawFields;
    use serde_json::json;

    fn script(steps: serde_json::Value) -> Script {
        serde_json::from_value(json!({
            "identity": {"uid": "me"},
            "users": {
                "me": {"uid": "me", "email": "me@gmail.com", "selectedGym": 2},
                "anna": {"uid": "anna", "email": "anna@gmail.com", "selectedGym": 2},
            },
            "steps": steps,
        }))
        .unwrap()
    }

    #[test]
    fn test_render_summaries() {
        let now = Utc.timestamp_opt(10_000, 0).single().unwrap();
        let data = json!({
            "text": "leg day?",
            "email": "anna@gmail.com",
            "timestamp": {"seconds": 10_000 - 120},
        });
        let summary = ConversationSummary::from_fields("A", data.as_object().unwrap());
        let lines = render_summaries(&[summary], now);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with(" 1. anna"));
        assert!(lines[0].contains("leg day?"));
        assert!(lines[0].ends_with("2 min. ago"));
        assert!(render_summaries(&[] as &[ConversationSummary], now).is_empty());
    }

    #[tokio::test]
    async fn test_replay_orders_by_arrival() {
        let script = script(json!([
            {"op": "set", "feed": "personal", "id": "A", "fields": {"text": "one"}, "ageSecs": 10},
            {"op": "set", "feed": "personal", "id": "B", "fields": {"text": "two"}, "ageSecs": 500},
            {"op": "set", "feed": "shared", "id": "A", "fields": {"text": "three"}},
        ]));
        let report = run_replay(script, CoreConfig::default(), Duration::from_millis(5))
            .await
            .unwrap();
        assert_eq!(report.final_ids, vec!["A", "B"]);
        assert!(report.list_changes >= 1);
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn test_replay_interleaves_feeds_by_arrival() {
        let script = script(json!([
            {"op": "set", "feed": "shared", "id": "Z", "fields": {"text": "z"}},
            {"op": "set", "feed": "personal", "id": "B", "fields": {"text": "b"}},
            {"op": "set", "feed": "shared", "id": "A", "fields": {"text": "old"}},
            {"op": "set", "feed": "personal", "id": "A", "fields": {"text": "new"}},
        ]));
        // A long tick leaves every write queued for the final drain
        let report = run_replay(script, CoreConfig::default(), Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(report.final_ids, vec!["A", "B", "Z"]);
        assert_eq!(report.final_texts, vec!["new", "b", "z"]);
    }

    #[tokio::test]
    async fn test_replay_sign_out_and_back_in() {
        let script = script(json!([
            {"op": "set", "feed": "personal", "id": "A"},
            {"op": "signOut"},
            {"op": "delete", "feed": "personal", "id": "A"},
            {"op": "signIn"},
            {"op": "set", "feed": "personal", "id": "C"},
        ]));
        let report = run_replay(script, CoreConfig::default(), Duration::from_millis(5))
            .await
            .unwrap();
        assert_eq!(report.final_ids, vec!["C"]);
    }

    #[tokio::test]
    async fn test_replay_reports_feed_errors() {
        let script = script(json!([
            {"op": "feedError", "feed": "shared", "message": "lost"},
            {"op": "reopen"},
            {"op": "set", "feed": "shared", "id": "S"},
        ]));
        let report = run_replay(script, CoreConfig::default(), Duration::from_millis(5))
            .await
            .unwrap();
        assert_eq!(report.errors, vec!["lost".to_string()]);
        assert_eq!(report.final_ids, vec!["S"]);
    }

    #[tokio::test]
    async fn test_replay_surfaces_missing_profile() {
        let script: Script = serde_json::from_value(json!({
            "identity": {"uid": "ghost"},
            "steps": [],
        }))
        .unwrap();
        let report = run_replay(script, CoreConfig::default(), Duration::from_millis(5))
            .await
            .unwrap();
        assert_eq!(report.errors.len(), 1);
        assert!(report.final_ids.is_empty());
    }

    #[test]
    fn test_document_fields_passthrough() {
        let mut fields = RawFields::new();
        fields.insert("text".to_string(), json!("x"));
        let doc = document_fields(&fields, None, Utc::now());
        assert_eq!(doc, fields);
    }
}
