//! Integration tests for the enhanced store: dispatch, effect capture,
//! effector ordering and follow-up cascades.

use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use anyhow::Result;
use serde_json::{json, Value};
use sidefx::{
    async_trait, combine_reducers, create_store, effector_fn, install_side_effects, reducer,
    reducer_map, EffectStore, Effector, FollowUp, Opaque, ReducerResult, SideEffect, SideEffects,
    SideFxError, Store,
};
use sidefx_testing::{
    shared_latch, wait, DelayEffector, FailingEffector, RecordingEffector, ReplyEffector,
};

type Effect = SideEffect<Value>;
type TodoStore = EffectStore<Value, Value>;

// ---------------------------------------------------------------------------
// Test reducers
// ---------------------------------------------------------------------------

fn test_effect() -> Effect {
    SideEffect::custom(Opaque::new("TEST_EFFECT"))
}

/// `ADD_TODO` appends to `todos` and emits `effect`.
fn todo_reducer(effect: Effect) -> sidefx::Reducer<Value, Value> {
    reducer(move |state: &Value, action: &Value| {
        if action["type"] == "ADD_TODO" {
            let mut next = state.clone();
            if let Some(todos) = next["todos"].as_array_mut() {
                todos.push(json!({"text": action["text"]}));
            }
            ReducerResult::WithEffect(next, effect.clone())
        } else {
            ReducerResult::State(state.clone())
        }
    })
}

/// `TRIGGER` emits `effect`; any other action is appended to `log`.
fn trigger_reducer(effect: Effect) -> sidefx::Reducer<Value, Value> {
    reducer(move |state: &Value, action: &Value| match action["type"].as_str() {
        Some("TRIGGER") => ReducerResult::WithEffect(state.clone(), effect.clone()),
        Some(other) => {
            let mut next = state.clone();
            if let Some(log) = next["log"].as_array_mut() {
                log.push(json!(other));
            }
            ReducerResult::State(next)
        }
        None => ReducerResult::State(state.clone()),
    })
}

fn add_todo(text: &str) -> Value {
    json!({"type": "ADD_TODO", "text": text})
}

// ---------------------------------------------------------------------------
// Dispatch and effect delivery
// ---------------------------------------------------------------------------

/// Checks that the todo is already committed when the effect arrives.
struct CommittedStateCheck {
    store: Arc<OnceLock<TodoStore>>,
    calls: Arc<Mutex<Vec<(String, usize)>>>,
}

#[async_trait]
impl Effector<Value> for CommittedStateCheck {
    async fn apply(&self, effect: &Effect) -> Result<FollowUp<Value>> {
        let committed = self
            .store
            .get()
            .and_then(|store| store.state()["todos"].as_array().map(Vec::len))
            .unwrap_or_default();
        self.calls
            .lock()
            .unwrap()
            .push((effect.tag().to_string(), committed));
        Ok(FollowUp::Action(json!({"type": "DUMMY"})))
    }
}

#[tokio::test]
async fn test_effector_runs_once_after_state_is_committed() {
    let handle = Arc::new(OnceLock::new());
    let calls = Arc::new(Mutex::new(Vec::new()));

    let store = SideEffects::new()
        .with_effector(CommittedStateCheck {
            store: Arc::clone(&handle),
            calls: Arc::clone(&calls),
        })
        .enhance(create_store, todo_reducer(test_effect()), json!({"todos": []}));
    handle.set(store.clone()).unwrap();

    store.dispatch(add_todo("hello, world")).await.unwrap();

    assert_eq!(*calls.lock().unwrap(), vec![("TEST_EFFECT".to_string(), 1)]);
    assert_eq!(store.state()["todos"], json!([{"text": "hello, world"}]));
}

#[tokio::test]
async fn test_batch_reaches_effectors_then_each_child() {
    let recorder = RecordingEffector::new();
    let store = SideEffects::new()
        .with_effector(recorder.clone())
        .enhance(
            create_store,
            todo_reducer(SideEffect::multiple([test_effect(), test_effect()], false)),
            json!({"todos": []}),
        );

    store.dispatch(add_todo("hello, world")).await.unwrap();

    assert_eq!(recorder.tags(), vec!["multiple", "TEST_EFFECT", "TEST_EFFECT"]);
    assert_eq!(store.state()["todos"], json!([{"text": "hello, world"}]));
}

#[tokio::test]
async fn test_action_without_effect_skips_the_chain() {
    let recorder = RecordingEffector::new();
    let store = SideEffects::new()
        .with_effector(recorder.clone())
        .enhance(create_store, todo_reducer(test_effect()), json!({"todos": []}));

    store.dispatch(json!({"type": "NOTHING"})).await.unwrap();

    assert_eq!(recorder.count(), 0);
}

#[tokio::test]
async fn test_effectors_run_in_registration_order() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let step = |label: &'static str, delay: u64| {
        let order = Arc::clone(&order);
        Arc::new(effector_fn(move |_: Effect| {
            let order = Arc::clone(&order);
            async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                order.lock().unwrap().push(label);
                Ok(FollowUp::None)
            }
        })) as Arc<dyn Effector<Value>>
    };

    let store = install_side_effects([step("slow", 40), step("fast", 0), step("medium", 10)])
        .enhance(create_store, todo_reducer(test_effect()), json!({"todos": []}));

    store.dispatch(add_todo("x")).await.unwrap();

    assert_eq!(*order.lock().unwrap(), vec!["slow", "fast", "medium"]);
}

// ---------------------------------------------------------------------------
// Serial and parallel batches
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_serial_batch_waits_in_order() {
    let delays = DelayEffector::new();
    let store = SideEffects::new()
        .with_effector(delays.clone())
        .enhance(
            create_store,
            trigger_reducer(SideEffect::multiple([wait(300), wait(150), wait(200)], true)),
            json!({"log": []}),
        );

    store.dispatch(json!({"type": "TRIGGER"})).await.unwrap();

    assert_eq!(delays.completed(), vec![300, 150, 200]);
}

#[tokio::test]
async fn test_parallel_batch_finishes_by_duration() {
    let delays = DelayEffector::new();
    let store = SideEffects::new()
        .with_effector(delays.clone())
        .enhance(
            create_store,
            trigger_reducer(SideEffect::multiple([wait(300), wait(150), wait(200)], false)),
            json!({"log": []}),
        );

    let started = tokio::time::Instant::now();
    store.dispatch(json!({"type": "TRIGGER"})).await.unwrap();

    assert_eq!(delays.completed(), vec![150, 200, 300]);
    assert!(started.elapsed() < Duration::from_millis(600));
}

// ---------------------------------------------------------------------------
// Follow-up cascades
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_follow_up_settles_before_dispatch_resolves() {
    let delays =
        DelayEffector::new().with_reply(|ms| Some(json!({"type": format!("WAITED_{ms}")})));
    let store = SideEffects::new()
        .with_effector(delays)
        .enhance(
            create_store,
            trigger_reducer(SideEffect::multiple([wait(30), wait(10)], true)),
            json!({"log": []}),
        );

    store.dispatch(json!({"type": "TRIGGER"})).await.unwrap();

    assert_eq!(store.state()["log"], json!(["WAITED_30", "WAITED_10"]));
}

#[tokio::test]
async fn test_dispatch_action_effect_feeds_back() {
    let store = SideEffects::<Value>::new().enhance(
        create_store,
        trigger_reducer(SideEffect::dispatch_action([
            json!({"type": "FIRST"}),
            json!({"type": "SECOND"}),
        ])),
        json!({"log": []}),
    );

    store.dispatch(json!({"type": "TRIGGER"})).await.unwrap();

    assert_eq!(store.state()["log"], json!(["FIRST", "SECOND"]));
}

#[tokio::test]
async fn test_reply_effector_cascade() {
    let recorder = RecordingEffector::only("TEST_EFFECT");
    let store = SideEffects::new()
        .with_effector(ReplyEffector::on("TEST_EFFECT", [json!({"type": "REPLIED"})]))
        .with_effector(recorder.clone())
        .enhance(create_store, trigger_reducer(test_effect()), json!({"log": []}));

    store.dispatch(json!({"type": "TRIGGER"})).await.unwrap();

    assert_eq!(store.state()["log"], json!(["REPLIED"]));
    assert_eq!(recorder.count(), 1);
}

#[tokio::test]
async fn test_later_effector_is_not_held_up_by_follow_up_cascade() {
    let log = Arc::new(Mutex::new(Vec::new()));

    // Answers `e` with `X`; `X` produces `slow`, which this effector also performs.
    let first = effector_fn({
        let log = Arc::clone(&log);
        move |effect: Effect| {
            let log = Arc::clone(&log);
            async move {
                if effect.has_tag("e") {
                    return Ok(FollowUp::Action(json!({"type": "X"})));
                }
                if effect.has_tag("slow") {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    log.lock().unwrap().push("slow done".to_string());
                }
                Ok(FollowUp::None)
            }
        }
    });
    let second = effector_fn({
        let log = Arc::clone(&log);
        move |effect: Effect| {
            let log = Arc::clone(&log);
            async move {
                if effect.is_custom() {
                    log.lock().unwrap().push(format!("second saw {}", effect.tag()));
                }
                Ok(FollowUp::None)
            }
        }
    });

    let store = SideEffects::new()
        .with_effector(first)
        .with_effector(second)
        .enhance(
            create_store,
            reducer(|state: &Value, action: &Value| match action["type"].as_str() {
                Some("START") => {
                    ReducerResult::WithEffect(state.clone(), SideEffect::custom(Opaque::new("e")))
                }
                Some("X") => {
                    ReducerResult::WithEffect(json!("x"), SideEffect::custom(Opaque::new("slow")))
                }
                _ => ReducerResult::State(state.clone()),
            }),
            Value::Null,
        );

    store.dispatch(json!({"type": "START"})).await.unwrap();

    assert_eq!(store.state(), json!("x"));
    assert_eq!(
        *log.lock().unwrap(),
        vec!["second saw e", "slow done", "second saw slow"]
    );
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_effector_failure_rejects_dispatch_but_keeps_state() {
    let failing = FailingEffector::on("TEST_EFFECT", "disk full");
    let after = RecordingEffector::new();
    let store = SideEffects::new()
        .with_effector(failing.clone())
        .with_effector(after.clone())
        .enhance(create_store, todo_reducer(test_effect()), json!({"todos": []}));

    let err = store.dispatch(add_todo("kept")).await.unwrap_err();

    assert_eq!(err.to_string(), "disk full");
    assert_eq!(failing.failures(), 1);
    assert_eq!(after.count(), 0);
    assert_eq!(store.state()["todos"], json!([{"text": "kept"}]));
}

#[tokio::test]
async fn test_serial_batch_stops_at_first_failure() {
    let delays = DelayEffector::new();
    let store = SideEffects::new()
        .with_effector(FailingEffector::on("boom", "exploded"))
        .with_effector(delays.clone())
        .enhance(
            create_store,
            trigger_reducer(SideEffect::multiple(
                [wait(5), SideEffect::custom(Opaque::new("boom")), wait(5)],
                true,
            )),
            json!({"log": []}),
        );

    let err = store.dispatch(json!({"type": "TRIGGER"})).await.unwrap_err();

    assert_eq!(err.to_string(), "exploded");
    assert_eq!(delays.completed(), vec![5]);
}

#[tokio::test]
async fn test_parallel_failure_lets_siblings_finish() {
    let delays = DelayEffector::new();
    let store = SideEffects::new()
        .with_effector(FailingEffector::on("boom", "exploded"))
        .with_effector(delays.clone())
        .enhance(
            create_store,
            trigger_reducer(SideEffect::multiple(
                [wait(20), SideEffect::custom(Opaque::new("boom"))],
                false,
            )),
            json!({"log": []}),
        );

    let err = store.dispatch(json!({"type": "TRIGGER"})).await.unwrap_err();

    assert_eq!(err.to_string(), "exploded");
    assert_eq!(delays.completed(), vec![20]);
}

#[tokio::test]
async fn test_failed_follow_up_does_not_cancel_other_follow_ups() {
    let delays = DelayEffector::new()
        .with_reply(|ms| Some(json!({"type": "TRIGGER", "after": ms})));
    let store = SideEffects::new()
        .with_effector(FailingEffector::on("boom", "exploded"))
        .with_effector(delays.clone())
        .enhance(
            create_store,
            reducer(|state: &Value, action: &Value| match action["type"].as_str() {
                Some("START") => ReducerResult::WithEffect(
                    state.clone(),
                    SideEffect::multiple([wait(1), SideEffect::custom(Opaque::new("boom"))], false),
                ),
                // The follow-up of the first wait starts a longer one.
                Some("TRIGGER") if action["after"] == 1 => {
                    ReducerResult::WithEffect(state.clone(), wait(30))
                }
                _ => ReducerResult::State(state.clone()),
            }),
            Value::Null,
        );

    let err = store.dispatch(json!({"type": "START"})).await.unwrap_err();

    assert_eq!(err.to_string(), "exploded");
    assert_eq!(delays.completed(), vec![1, 30]);
}

#[tokio::test]
async fn test_panicking_effector_surfaces_as_error() {
    let store = SideEffects::new()
        .with_effector(effector_fn(|effect: Effect| async move {
            if effect.has_tag("TEST_EFFECT") {
                panic!("effector bug");
            }
            Ok(FollowUp::None)
        }))
        .enhance(create_store, todo_reducer(test_effect()), json!({"todos": []}));

    let err = store.dispatch(add_todo("x")).await.unwrap_err();

    match err.downcast_ref::<SideFxError>() {
        Some(SideFxError::TaskPanicked { message, .. }) => assert_eq!(message, "effector bug"),
        other => panic!("expected a panic error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_dropped_store_rejects_follow_ups() {
    let store = SideEffects::<Value>::new().enhance(
        create_store,
        trigger_reducer(SideEffect::dispatch_action([json!({"type": "LATE"})])),
        json!({"log": []}),
    );

    let pending = store.dispatch(json!({"type": "TRIGGER"}));
    drop(store);

    let err = pending.await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SideFxError>(),
        Some(SideFxError::StoreDropped)
    ));
}

// ---------------------------------------------------------------------------
// Store surface
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_replace_reducer_wraps_new_reducer() {
    let recorder = RecordingEffector::new();
    let store = SideEffects::new()
        .with_effector(recorder.clone())
        .enhance(create_store, todo_reducer(test_effect()), json!({"todos": []}));

    store.replace_reducer(todo_reducer(SideEffect::custom(Opaque::new("REPLACED"))));
    store.dispatch(add_todo("x")).await.unwrap();

    assert_eq!(recorder.tags(), vec!["REPLACED"]);
}

#[tokio::test]
async fn test_listeners_fire_for_follow_ups() {
    let latch = shared_latch(3);
    let store = SideEffects::<Value>::new().enhance(
        create_store,
        trigger_reducer(SideEffect::dispatch_action([
            json!({"type": "A"}),
            json!({"type": "B"}),
        ])),
        json!({"log": []}),
    );

    let id = store.subscribe({
        let latch = Arc::clone(&latch);
        Arc::new(move || latch.arrive())
    });

    store.dispatch(json!({"type": "TRIGGER"})).await.unwrap();
    assert!(latch.await_all_within(Duration::from_secs(5)).await);

    assert!(store.unsubscribe(id));
    assert_eq!(store.base_store().listener_count(), 0);
    assert_eq!(Store::state(store.base_store())["log"], json!(["A", "B"]));
}

#[tokio::test]
async fn test_combined_reducers_end_to_end() {
    let recorder = RecordingEffector::new();

    let todos = reducer(|state: &Value, action: &Value| {
        let mut todos = state.as_array().cloned().unwrap_or_default();
        if action["type"] == "ADD_TODO" {
            todos.push(action["text"].clone());
            return ReducerResult::WithEffect(
                Value::Array(todos),
                SideEffect::custom(Opaque::new("save")),
            );
        }
        ReducerResult::State(Value::Array(todos))
    });
    let count = reducer(|state: &Value, action: &Value| {
        let n = state.as_u64().unwrap_or_default();
        if action["type"] == "ADD_TODO" {
            ReducerResult::WithEffect(json!(n + 1), SideEffect::custom(Opaque::new("count")))
        } else {
            ReducerResult::State(json!(n))
        }
    });

    let store = SideEffects::new()
        .with_effector(recorder.clone())
        .enhance(
            create_store,
            combine_reducers(vec![reducer_map! {
                "todos" => todos,
                "count" => count,
            }
            .into()]),
            Value::Null,
        );

    store.dispatch(add_todo("hello")).await.unwrap();

    assert_eq!(store.state(), json!({"todos": ["hello"], "count": 1}));
    assert_eq!(recorder.tags(), vec!["multiple", "save", "count"]);
}
