//! Application entry point — guided-session console demo.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Create the [`tokio`] runtime.
//! 4. Wire the providers (script, synthesizer, reviewer, output) from config.
//! 5. Spawn the session engine for the configured default context.
//! 6. Confirm the plan, start playback and print lifecycle events until the
//!    session ends.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use guided_session::{
    config::AppConfig,
    narration::{ApiSynthesizer, PacedSpeechOutput},
    plan::SessionContext,
    review::ApiReviewer,
    script::ApiScriptProvider,
    session::{SessionEngine, SessionEvent, SessionHandle, SessionProviders, SessionState},
};

fn main() -> Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("guided-session starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to create tokio runtime");

    rt.block_on(run_session(config))
}

async fn run_session(config: AppConfig) -> Result<()> {
    // 4. Providers
    let providers = SessionProviders {
        script: Arc::new(ApiScriptProvider::from_config(&config.script)),
        synthesizer: Arc::new(ApiSynthesizer::from_config(&config.synth)),
        reviewer: Arc::new(ApiReviewer::from_config(&config.reviewer)),
        output: Arc::new(PacedSpeechOutput::new()),
    };

    // 5. Session engine
    let context = SessionContext::new(&config.session.goal, &config.session.ego_state);
    log::info!(
        "starting session (goal: '{}', ego state: '{}')",
        context.goal,
        context.ego_state
    );
    let session = SessionEngine::spawn(context, config, providers);
    let mut events = session.subscribe();

    // 6. Drive the session to completion.
    let state = wait_for(&session, "script", |s| s.is_initialized).await?;
    if let Some(plan) = state.plan.as_ref() {
        println!("Plan: {} ({} steps)", plan.summary, plan.steps.len());
        for step in &plan.steps {
            println!(
                "  {}. [{}] {}",
                step.index + 1,
                step.step_type.as_str(),
                step.title
            );
        }
    }

    session.confirm_plan().await;
    wait_for(&session, "confirmation", |s| !s.awaiting_plan_confirmation).await?;
    println!("Plan confirmed; starting narration.\n");

    wait_for(&session, "first segment", |s| {
        s.segments.first().map(|seg| seg.resolved).unwrap_or(false)
    })
    .await?;
    session.play().await;

    loop {
        match events.recv().await {
            Ok(SessionEvent::Play) => println!("playing"),
            Ok(SessionEvent::Pause) => println!("paused"),
            Ok(SessionEvent::AudioElement { segment_id }) => {
                println!("  audio ready for segment '{segment_id}'");
            }
            Ok(SessionEvent::FeedbackRequired(step)) => {
                println!("  reviewing '{}'", step.title);
            }
            Ok(SessionEvent::StateChange(state)) => {
                if let Some(id) = state.current_segment_id.as_deref() {
                    log::debug!(
                        "segment {}/{} ({id}), {} buffered ahead",
                        state.current_segment_index + 1,
                        state.total_segments,
                        state.buffered_ahead
                    );
                }
            }
            Ok(SessionEvent::End) => {
                println!("\nSession finished.");
                break;
            }
            Ok(_) => {}
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                log::warn!("event stream lagged, {n} events skipped");
            }
            Err(e) => bail!("session event stream closed unexpectedly: {e}"),
        }
    }

    session.complete_wrap_up().await;
    let state = wait_for(&session, "step approvals", |s| {
        s.plan
            .as_ref()
            .map(|p| p.all_segment_steps_complete())
            .unwrap_or(false)
    })
    .await?;
    if let Some(plan) = state.plan.as_ref() {
        println!("All {} segments complete.", plan.play_step_count());
    }

    session.dispose().await;
    Ok(())
}

/// Poll the session snapshot until `predicate` holds.
async fn wait_for(
    session: &SessionHandle,
    what: &str,
    predicate: impl Fn(&SessionState) -> bool,
) -> Result<SessionState> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(60);
    loop {
        let state = session.state();
        if predicate(&state) {
            return Ok(state);
        }
        if let Some(error) = state.error.as_deref() {
            bail!("session error while waiting for {what}: {error}");
        }
        if tokio::time::Instant::now() > deadline {
            bail!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
