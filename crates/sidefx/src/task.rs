//! Ordered task lists with a serial or concurrent run mode.
//!
//! A [`TaskList`] holds deferred computations. Nothing runs until
//! [`TaskList::run`] is awaited, and the results always come back in the
//! order the tasks were given, whatever order they finish in.
//!
//! # Modes
//!
//! - **Serial**: one task at a time. Each task settles before the next one
//!   is started. The first error aborts the run; later tasks never start and
//!   earlier results are discarded.
//! - **Parallel**: every task is started up front and all of them are polled
//!   concurrently. A failing task never cancels its siblings: the run keeps
//!   polling until every task has settled, then fails with the error of the
//!   earliest failed task in input order.
//!
//! # Panics
//!
//! A task that panics while being started, or while being polled, fails
//! exactly like a task that returned an error. The panic surfaces as
//! [`SideFxError::TaskPanicked`].

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::Result;
use futures::future::{self, BoxFuture, FutureExt};
use tracing::{error, trace};

use crate::error::{panic_message, SideFxError};

/// A started task.
pub type TaskFuture<T> = BoxFuture<'static, Result<T>>;

/// A deferred computation producing a `T`.
pub struct Task<T> {
    start: Box<dyn FnOnce() -> TaskFuture<T> + Send>,
}

impl<T: Send + 'static> Task<T> {
    /// Create a task from a closure returning a future.
    ///
    /// The closure runs when the task is started, not before.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            start: Box::new(move || f().boxed()),
        }
    }

    /// A task that immediately succeeds with `value`.
    pub fn ready(value: T) -> Self {
        Self {
            start: Box::new(move || future::ready(Ok(value)).boxed()),
        }
    }

    /// Invoke the task, converting panics into errors.
    fn start(self, index: usize) -> TaskFuture<T> {
        match catch_unwind(AssertUnwindSafe(self.start)) {
            Ok(running) => AssertUnwindSafe(running)
                .catch_unwind()
                .map(move |outcome| match outcome {
                    Ok(result) => result,
                    Err(payload) => Err(panicked(index, payload)),
                })
                .boxed(),
            Err(payload) => future::ready(Err(panicked(index, payload))).boxed(),
        }
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").finish_non_exhaustive()
    }
}

fn panicked(index: usize, payload: Box<dyn Any + Send>) -> anyhow::Error {
    let message = panic_message(payload.as_ref());
    error!(index, panic = %message, "task panicked");
    SideFxError::TaskPanicked { index, message }.into()
}

/// An ordered list of tasks plus the mode to run them in.
pub struct TaskList<T> {
    tasks: Vec<Task<T>>,
    serial: bool,
}

impl<T: Send + 'static> TaskList<T> {
    pub fn new(tasks: Vec<Task<T>>, serial: bool) -> Self {
        Self { tasks, serial }
    }

    /// Tasks that run one after another.
    pub fn serial(tasks: Vec<Task<T>>) -> Self {
        Self::new(tasks, true)
    }

    /// Tasks that run concurrently.
    pub fn parallel(tasks: Vec<Task<T>>) -> Self {
        Self::new(tasks, false)
    }

    pub fn is_serial(&self) -> bool {
        self.serial
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Run every task and collect the results in input order.
    pub async fn run(self) -> Result<Vec<T>> {
        let Self { tasks, serial } = self;
        let total = tasks.len();

        if serial {
            let mut results = Vec::with_capacity(total);
            for (index, task) in tasks.into_iter().enumerate() {
                match task.start(index).await {
                    Ok(value) => results.push(value),
                    Err(e) => {
                        trace!(index, skipped = total - index - 1, "serial task failed");
                        return Err(e);
                    }
                }
            }
            Ok(results)
        } else {
            let running: Vec<_> = tasks
                .into_iter()
                .enumerate()
                .map(|(index, task)| task.start(index))
                .collect();
            let settled = future::join_all(running).await;
            let failed = settled.iter().filter(|result| result.is_err()).count();
            if failed > 0 {
                trace!(failed, total, "parallel tasks failed");
            }
            settled.into_iter().collect()
        }
    }

    /// Pipe every task's result through `f`.
    ///
    /// Returns a new list with the same mode. Nothing is executed.
    pub fn map<U, F>(self, f: F) -> TaskList<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let tasks = self
            .tasks
            .into_iter()
            .map(|task| {
                let f = Arc::clone(&f);
                TaskList::<U>::wrap(move || {
                    (task.start)()
                        .map(move |result| result.map(|value| (*f)(value)))
                        .boxed()
                })
            })
            .collect();

        TaskList {
            tasks,
            serial: self.serial,
        }
    }

    /// Chain an asynchronous, fallible step after every task.
    ///
    /// The step is part of the task: in serial mode the next task starts only
    /// after the previous task's step settled.
    pub fn and_then<U, F, Fut>(self, f: F) -> TaskList<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<U>> + Send + 'static,
    {
        let f = Arc::new(f);
        let tasks = self
            .tasks
            .into_iter()
            .map(|task| {
                let f = Arc::clone(&f);
                TaskList::<U>::wrap(move || {
                    let running = (task.start)();
                    async move {
                        let value = running.await?;
                        (*f)(value).await
                    }
                    .boxed()
                })
            })
            .collect();

        TaskList {
            tasks,
            serial: self.serial,
        }
    }

    fn wrap<F>(start: F) -> Task<T>
    where
        F: FnOnce() -> TaskFuture<T> + Send + 'static,
    {
        Task {
            start: Box::new(start),
        }
    }
}

impl<T> fmt::Debug for TaskList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskList")
            .field("len", &self.tasks.len())
            .field("serial", &self.serial)
            .finish()
    }
}
