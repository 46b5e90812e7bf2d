//! # Todo Timer Demo
//!
//! Two reducers combined under one root, a timer effector that sleeps and
//! answers with follow-up actions, and a logging effector in front of it.
//!
//! Run with `RUST_LOG=debug cargo run -p todo-timer-demo` to watch the
//! store's own logging as well.

use anyhow::Result;
use serde_json::{json, Value};
use sidefx::{
    combine_reducers, create_store, effector_fn, reducer, reducer_map, CustomEffect, FollowUp,
    Opaque, Reducer, ReducerResult, SideEffect, SideEffects,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type Effect = SideEffect<Value>;

const TICK_MS: u64 = 100;

// ============================================================================
// Effects
// ============================================================================

fn remind(text: &str, ms: u64) -> Effect {
    SideEffect::custom(Opaque::new("remind").with("text", text).with("ms", ms))
}

fn tick() -> Effect {
    SideEffect::custom(Opaque::new("tick").with("ms", TICK_MS))
}

// ============================================================================
// Reducers
// ============================================================================

/// `ADD_TODO` appends an open todo and schedules a reminder for it;
/// `REMINDED` marks the todo as reminded.
fn todos() -> Reducer<Value, Value> {
    reducer(|state: &Value, action: &Value| {
        let mut todos = state.as_array().cloned().unwrap_or_default();
        match action["type"].as_str() {
            Some("ADD_TODO") => {
                let text = action["text"].as_str().unwrap_or_default();
                let ms = action["remindInMs"].as_u64().unwrap_or(250);
                todos.push(json!({"text": text, "reminded": false}));
                ReducerResult::WithEffect(Value::Array(todos), remind(text, ms))
            }
            Some("REMINDED") => {
                for todo in todos.iter_mut().filter(|t| t["text"] == action["text"]) {
                    todo["reminded"] = json!(true);
                }
                ReducerResult::State(Value::Array(todos))
            }
            _ => ReducerResult::State(state.clone()),
        }
    })
}

/// `START_TIMER` arms the timer for `ticks` ticks. Every `TICK` re-arms it
/// until the target is reached, then `TIMER_DONE` is dispatched.
fn timer() -> Reducer<Value, Value> {
    reducer(|state: &Value, action: &Value| {
        let elapsed = state["elapsed"].as_u64().unwrap_or_default();
        let target = state["target"].as_u64().unwrap_or_default();
        match action["type"].as_str() {
            Some("START_TIMER") => ReducerResult::WithEffect(
                json!({"elapsed": 0, "target": action["ticks"], "running": true}),
                tick(),
            ),
            Some("TICK") if state["running"] == json!(true) => {
                let elapsed = elapsed + 1;
                if elapsed < target {
                    ReducerResult::WithEffect(
                        json!({"elapsed": elapsed, "target": target, "running": true}),
                        tick(),
                    )
                } else {
                    ReducerResult::WithEffect(
                        json!({"elapsed": elapsed, "target": target, "running": false}),
                        SideEffect::dispatch_action([json!({"type": "TIMER_DONE"})]),
                    )
                }
            }
            _ => ReducerResult::State(state.clone()),
        }
    })
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let root = combine_reducers(vec![reducer_map! {
        "todos" => todos(),
        "timer" => timer(),
    }
    .into()]);

    let log_effects = effector_fn(|effect: Effect| async move {
        if effect.is_custom() {
            info!(tag = effect.tag(), "effect");
        }
        Ok(FollowUp::None)
    })
    .named("log");

    let timer_effector = effector_fn(|effect: Effect| async move {
        let Some(custom) = effect.as_custom() else {
            return Ok(FollowUp::None);
        };
        let ms = custom.get("ms").and_then(Value::as_u64).unwrap_or_default();
        match custom.tag() {
            "tick" => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(FollowUp::Action(json!({"type": "TICK"})))
            }
            "remind" => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                let text = custom.get("text").cloned().unwrap_or(Value::Null);
                info!(%text, "reminder");
                Ok(FollowUp::Action(json!({"type": "REMINDED", "text": text})))
            }
            _ => Ok(FollowUp::None),
        }
    })
    .named("timer");

    let store = SideEffects::new()
        .named("todo-timer")
        .with_effector(log_effects)
        .with_effector(timer_effector)
        .enhance(create_store, root, json!({}));

    let changes = Arc::new(AtomicUsize::new(0));
    store.subscribe({
        let changes = Arc::clone(&changes);
        Arc::new(move || {
            changes.fetch_add(1, Ordering::Relaxed);
        })
    });

    // Both dispatches run concurrently; each resolves once its cascade is quiet.
    let (added, timed) = tokio::join!(
        store.dispatch(json!({"type": "ADD_TODO", "text": "water the plants", "remindInMs": 250})),
        store.dispatch(json!({"type": "START_TIMER", "ticks": 3})),
    );
    added?;
    timed?;

    info!(
        state = %store.state(),
        changes = changes.load(Ordering::Relaxed),
        "settled"
    );

    Ok(())
}
