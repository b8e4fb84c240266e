//! The `run` command — a scripted two-screen lesson against the in-memory
//! stack, streaming every event to stdout.
//!
//! This exercises the full public surface (start, submit, hint, complete)
//! without a real generation backend, which makes it useful both as a demo
//! and as a smoke test of the wiring.

use anyhow::Context;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

use chrono::Utc;
use mentora_config::AppConfig;
use mentora_core::event::InteractionEvent;
use mentora_core::interaction::InteractionId;
use mentora_core::profile::InstructorProfile;
use mentora_core::screen::{ScreenPhase, ScreenState, ScreenType};
use mentora_core::session::{LearnerId, Session};
use mentora_core::storage::StoragePort;
use mentora_orchestrator::{ScriptedGenerator, SessionOrchestrator};
use mentora_storage::MemoryStore;

pub async fn run(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = match config_path {
        Some(path) => AppConfig::load(&path).context("loading config")?,
        None => AppConfig::load_default().context("loading default config")?,
    };

    let storage = Arc::new(MemoryStore::new());
    let generator = Arc::new(demo_generator());

    let (session, concepts_screen, practice_screen) = seed_lesson(storage.as_ref()).await?;

    let orchestrator = SessionOrchestrator::new(storage.clone(), generator)
        .with_config((&config).into());

    println!("Lesson: \"for loops\" — learner {}", session.learner_id);

    // Screen 1: concept introduction
    orchestrator
        .start_screen(&session.id, &concepts_screen.id)
        .await?;
    submit_and_print(
        &orchestrator,
        &session,
        &concepts_screen,
        "What is a for loop actually doing under the hood?",
    )
    .await?;
    let outcome = orchestrator
        .complete_screen(&session.id, &concepts_screen.id)
        .await?;
    println!(
        "Screen 1 complete (mastery: {}) — next: {:?}",
        outcome.mastery_achieved, outcome.next_screen_id
    );

    // Screen 2: practice, with a hint along the way
    orchestrator
        .start_screen(&session.id, &practice_screen.id)
        .await?;
    let hint = orchestrator
        .request_hint(&session.id, &practice_screen.id, 1)
        .await?;
    println!("Hint (level {}): {}", hint.level, hint.text);
    submit_and_print(
        &orchestrator,
        &session,
        &practice_screen,
        "I think the loop runs one time too many?",
    )
    .await?;
    let outcome = orchestrator
        .complete_screen(&session.id, &practice_screen.id)
        .await?;
    println!(
        "Screen 2 complete (mastery: {})",
        outcome.mastery_achieved
    );

    let memory = storage.load_memory(&session.learner_id).await?;
    println!("\nLearner memory after the lesson:");
    for concept in &memory.concepts {
        println!("  {} — level {}/5", concept.concept, concept.mastery_level);
    }
    for marker in &memory.progress_markers {
        println!("  milestone: {}", marker.label);
    }

    info!("Demo lesson finished");
    Ok(())
}

async fn submit_and_print(
    orchestrator: &SessionOrchestrator,
    session: &Session,
    screen: &ScreenState,
    text: &str,
) -> anyhow::Result<()> {
    println!("\nLearner: {text}");
    let rx = orchestrator
        .submit_interaction(&session.id, &screen.id, &InteractionId::new(), text)
        .await?;

    let mut events = ReceiverStream::new(rx);
    while let Some(event) = events.next().await {
        match event {
            InteractionEvent::Started { epoch, .. } => {
                println!("  [started, epoch {epoch}]");
            }
            InteractionEvent::Chunk { content } => print!("{content}"),
            InteractionEvent::Validated { action, violations } => {
                println!("\n  [validated: {action:?}, {violations} violations]");
            }
            InteractionEvent::Committed { score, .. } => {
                println!("  [committed, score {score:.2}]");
            }
            InteractionEvent::Fallback { text, reason, .. } => {
                println!("Instructor: {text}");
                println!("  [fallback: {reason:?}]");
            }
        }
    }
    Ok(())
}

/// Seed one session with a concept screen and a practice screen.
async fn seed_lesson(
    storage: &MemoryStore,
) -> anyhow::Result<(Session, ScreenState, ScreenState)> {
    let now = Utc::now();
    let profile = InstructorProfile::default_profile().snapshot(now);
    let session = Session::new(LearnerId::from("demo-learner"), profile, now);

    let mut concepts = ScreenState::new(session.id.clone(), ScreenType::Concept, "for loops");
    concepts.phase = ScreenPhase::Unlocked;
    concepts.concepts = vec!["iteration".into(), "loop condition".into()];

    let mut practice = ScreenState::new(session.id.clone(), ScreenType::Practice, "for loops");
    practice.prerequisite_screen_ids = vec![concepts.id.clone()];
    practice.concepts = vec!["iteration".into(), "off-by-one".into()];

    storage.save_session(&session).await?;
    storage.save_screen(&concepts).await?;
    storage.save_screen(&practice).await?;
    Ok((session, concepts, practice))
}

/// A scripted backend with teaching-shaped responses that pass the default
/// validation tiers. Steps are consumed in call order: concept submission,
/// then the hint, then the practice submission.
fn demo_generator() -> ScriptedGenerator {
    ScriptedGenerator::new()
        .push_response(
            vec![
                "A for loop repeats its body once per value of the loop condition. ",
                "Picture a counter walking through a range of values — ",
                "what do you think decides when the iteration stops?",
            ],
            Duration::from_millis(50),
        )
        .push_response(
            vec!["Start by writing out the first three values of the counter by hand."],
            Duration::from_millis(20),
        )
        .push_response(
            vec![
                "Good instinct — an extra pass usually points at the loop boundary. ",
                "Look closely at the iteration range: ",
                "is the final value included or excluded?",
            ],
            Duration::from_millis(50),
        )
        .with_default_text(
            "Let's keep exploring the iteration together — what would you try next?",
            Duration::from_millis(20),
        )
}
