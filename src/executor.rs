use futures::{
    future::{BoxFuture, FutureExt},
    task::{waker_ref, ArcWake, Context, Poll},
};
use futures_channel::oneshot;
use queues::{IsQueue, Queue};
use std::{
    cell::RefCell,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
};

use crate::error::{TbError, TbResult};

thread_local! {
    static READY_QUEUE: RefCell<Queue<Arc<Task>>> = RefCell::new(Queue::new());
}

pub fn schedule_task(task: Arc<Task>) {
    READY_QUEUE.with(|q| {
        // unbounded queue, add can't fail
        let _ = q.borrow_mut().add(task);
    });
}

fn next_task() -> Option<Arc<Task>> {
    READY_QUEUE.with(|q| q.borrow_mut().remove().ok())
}

pub(crate) fn clear_ready_queue() {
    READY_QUEUE.with(|q| *q.borrow_mut() = Queue::new());
}

/// Polls ready tasks until none are left.
#[inline]
pub fn run_once() {
    while let Some(task) = next_task() {
        process_task(task);
    }
}

#[inline]
fn process_task(task: Arc<Task>) {
    if task.is_cancelled() {
        // do not execute if cancelled, will be dropped once all references disappear
        return;
    }

    let mut fut_slot = match task.future.lock() {
        Ok(slot) => slot,
        Err(_) => return,
    };
    let Some(mut fut) = fut_slot.take() else {
        // woken again after completion
        log::trace!("Ignoring wake of finished task {:?}", task.name);
        return;
    };
    let waker = waker_ref(&task);
    let context = &mut Context::from_waker(&*waker);
    match fut.as_mut().poll(context) {
        Poll::Pending => {
            // the task may have cancelled itself while running
            if !task.is_cancelled() {
                *fut_slot = Some(fut);
            }
        }
        Poll::Ready(result) => {
            log::trace!("Task {:?} complete", task.name);
            // a cancelled task has no sender left and its result is moot
            let unclaimed = task.take_join_tx().and_then(|tx| tx.send(result).err());
            // nobody joins this task, its error ends the running test
            if let Some(Err(e)) = unclaimed {
                drop(fut_slot);
                log::error!("Task {:?} failed: {}", task.name, e);
                crate::fail_test(&format!("task '{}' failed: {}", task.name, e));
            }
        }
    }
}

#[derive(PartialEq, Debug)]
enum TaskState {
    Pending,
    Cancelled,
}

pub struct Task {
    future: Mutex<Option<BoxFuture<'static, TbResult>>>,
    state: Mutex<TaskState>,
    name: String,
    join_tx: Mutex<Option<oneshot::Sender<TbResult>>>,
}

impl Task {
    /// Runs `future` concurrently with the caller.
    pub fn fork(future: impl Future<Output = TbResult> + Send + 'static) -> JoinHandle {
        Task::spawn_from_future(future, "forked")
    }

    pub fn spawn_from_future(
        future: impl Future<Output = TbResult> + Send + 'static,
        name: &str,
    ) -> JoinHandle {
        let (task, join_handle) = Task::new(future.boxed(), name);
        schedule_task(task);
        join_handle
    }

    fn new(fut: BoxFuture<'static, TbResult>, name: &str) -> (Arc<Self>, JoinHandle) {
        let (tx, rx) = oneshot::channel::<TbResult>();
        let task = Arc::new(Self {
            future: Mutex::new(Some(fut)),
            state: Mutex::new(TaskState::Pending),
            name: name.to_string(),
            join_tx: Mutex::new(Some(tx)),
        });
        let join_handle = JoinHandle {
            join_rx: rx,
            awaited_task: Some(task.clone()),
        };
        (task, join_handle)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Marks the task cancelled. It is never polled again and whoever joins
    /// it receives `TbError::Cancelled`.
    pub fn cancel(&self) {
        if let Ok(mut state) = self.state.lock() {
            *state = TaskState::Cancelled;
        }
        // dropping the sender releases joiners
        drop(self.take_join_tx());
    }

    pub fn is_cancelled(&self) -> bool {
        self.state
            .lock()
            .map(|s| *s == TaskState::Cancelled)
            .unwrap_or(true)
    }

    fn take_join_tx(&self) -> Option<oneshot::Sender<TbResult>> {
        self.join_tx.lock().ok().and_then(|mut tx| tx.take())
    }
}

impl ArcWake for Task {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        schedule_task(arc_self.clone());
    }
}

pub struct JoinHandle {
    awaited_task: Option<Arc<Task>>,
    join_rx: oneshot::Receiver<TbResult>,
}

impl JoinHandle {
    pub fn get_task(&self) -> Option<&Arc<Task>> {
        self.awaited_task.as_ref()
    }

    pub fn cancel(mut self) {
        if let Some(task) = self.awaited_task.take() {
            task.cancel();
        }
    }
}

impl Future for JoinHandle {
    type Output = TbResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.join_rx.poll_unpin(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(TbError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Val;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn joined_task_returns_result() {
        clear_ready_queue();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_inner = seen.clone();
        Task::spawn_from_future(
            async move {
                let child = Task::fork(async { Ok(Val::String("child".into())) });
                let val = child.await?;
                assert_eq!(val, Val::String("child".into()));
                seen_inner.fetch_add(1, Ordering::SeqCst);
                Ok(Val::None)
            },
            "parent",
        );
        run_once();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancelled_task_releases_joiner() {
        clear_ready_queue();
        let result = Arc::new(Mutex::new(None));
        let result_inner = result.clone();
        let victim = Task::fork(futures::future::pending());
        let task = victim.get_task().unwrap().clone();
        Task::spawn_from_future(
            async move {
                let r = victim.await;
                *result_inner.lock().unwrap() = Some(r.is_err());
                Ok(Val::None)
            },
            "joiner",
        );
        run_once();
        assert!(result.lock().unwrap().is_none());
        task.cancel();
        run_once();
        assert_eq!(*result.lock().unwrap(), Some(true));
    }

    #[test]
    fn cancelled_task_is_not_polled() {
        clear_ready_queue();
        let polled = Arc::new(AtomicUsize::new(0));
        let polled_inner = polled.clone();
        let handle = Task::fork(async move {
            polled_inner.fetch_add(1, Ordering::SeqCst);
            Ok(Val::None)
        });
        handle.cancel();
        run_once();
        assert_eq!(polled.load(Ordering::SeqCst), 0);
    }
}
