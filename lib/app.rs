//! The App surface (§6.3) and concurrency model (§5): wires the frame
//! [`Scheduler`] to an injected [`Backend`] over the two operations a
//! backend exposes — `request_frame`/`poll_events` — plus the lock-free
//! `post_user_event` wake signal ([`UserEventSender`]).
//!
//! Single-threaded cooperative by construction (§5): [`App::start`] must
//! run on a `tokio::task::LocalSet`, since the committed runtime tree is
//! built from `Rc`, not `Arc`. A backend is free to run its own I/O on
//! another thread; it only reaches back into the engine through the two
//! suspending methods on [`Backend`] and through a cloned
//! [`UserEventSender`].

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};

use futures::future::LocalBoxFuture;
use tokio::sync::mpsc;

use crate::bounds::Rect;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, LoggingErrorSink, UserCodeErrorSink};
use crate::event::{BatchHandle, Event};
use crate::key::KeyWithModifiers;
use crate::scheduler::Scheduler;
use crate::vnode::VNode;

/// The two suspending backend operations described by §5. A backend
/// typically owns its own I/O thread and answers these through a channel;
/// the futures returned here are not required to be `Send` since the
/// engine drives them from a single local task.
pub trait Backend {
    /// Submits one immutable drawlist frame. The engine never mutates
    /// `bytes` again after this call; the future resolves once the
    /// backend has accepted the frame, lifting the in-flight backpressure.
    fn request_frame(&self, bytes: Vec<u8>) -> LocalBoxFuture<'_, EngineResult<()>>;

    /// Waits for and returns the next inbound event batch. The caller
    /// (the engine) must call `release()` on the returned handle exactly
    /// once, whether decoding it succeeds or not.
    fn poll_events(&self) -> LocalBoxFuture<'_, EngineResult<BatchHandle>>;
}

/// A cloneable, `Send`-able handle a backend (or any other thread) can use
/// to push a tagged user event into the engine's queue without going
/// through `poll_events` (§5 `post_user_event`).
#[derive(Clone)]
pub struct UserEventSender {
    tx: mpsc::UnboundedSender<(i32, Vec<u8>)>,
}

impl UserEventSender {
    /// Enqueues a user event; silently dropped if the app has already
    /// stopped and closed its receiver.
    pub fn send(&self, tag: i32, payload: Vec<u8>) {
        let _ = self.tx.send((tag, payload));
    }
}

/// The coordinator described by §6.3: owns the [`Scheduler`], the opaque
/// application state snapshot, and the view function that turns one into
/// a [`VNode`] each frame.
pub struct App<S, B: Backend> {
    backend: Rc<B>,
    scheduler: RefCell<Scheduler>,
    state: RefCell<S>,
    view: Box<dyn Fn(&S) -> VNode>,
    sink: RefCell<Box<dyn UserCodeErrorSink>>,
    on_event: RefCell<Option<Box<dyn FnMut(&Event)>>>,
    user_events_tx: mpsc::UnboundedSender<(i32, Vec<u8>)>,
    user_events_rx: RefCell<mpsc::UnboundedReceiver<(i32, Vec<u8>)>>,
    running: Cell<bool>,
    disposed: Cell<bool>,
    followup_pending: Cell<bool>,
    start_instant: Instant,
}

impl<S, B: Backend + 'static> App<S, B> {
    /// `create_app({backend, initial_state})`: builds the app around a
    /// backend, an initial opaque state snapshot, a fixed viewport/config,
    /// and the pure `view(state) -> VNode` function (§6.3).
    pub fn create_app(
        backend: B,
        initial_state: S,
        viewport: Rect,
        cfg: EngineConfig,
        view: impl Fn(&S) -> VNode + 'static,
    ) -> Rc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Rc::new(Self {
            backend: Rc::new(backend),
            scheduler: RefCell::new(Scheduler::new(cfg, viewport)),
            state: RefCell::new(initial_state),
            view: Box::new(view),
            sink: RefCell::new(Box::new(LoggingErrorSink)),
            on_event: RefCell::new(None),
            user_events_tx: tx,
            user_events_rx: RefCell::new(rx),
            running: Cell::new(false),
            disposed: Cell::new(false),
            followup_pending: Cell::new(false),
            start_instant: Instant::now(),
        })
    }

    /// `app.keys({"ctrl+p": …, "esc": …})`: registers the app-level
    /// keybinding table (§4.10 rule 3). The spec's illustrative string
    /// chord keys resolve here to the typed [`KeyWithModifiers`] the
    /// router already keys its table on (see `DESIGN.md`).
    pub fn keys(&self, bindings: impl IntoIterator<Item = (KeyWithModifiers, Rc<dyn Fn()>)>) {
        let mut sched = self.scheduler.borrow_mut();
        for (chord, handler) in bindings {
            sched.app_keys_mut().bind(chord, move || (*handler)());
        }
    }

    /// Binds a single chord; the common case when `keys` would otherwise
    /// need an allocated collection.
    pub fn bind_key(&self, chord: KeyWithModifiers, handler: impl Fn() + 'static) {
        self.scheduler.borrow_mut().app_keys_mut().bind(chord, handler);
    }

    /// `app.update(mutator)`: applies a synchronous state mutation and
    /// marks the next frame's view dirty. Mutators registered this way —
    /// and the opaque closures baked into a view's event callbacks — are
    /// the "state update request" §4.10 describes; both funnel through
    /// this one path since a vnode callback closes over the same `App`.
    pub fn update(&self, mutator: impl FnOnce(&mut S)) {
        mutator(&mut self.state.borrow_mut());
        self.scheduler.borrow_mut().mark_view_dirty();
    }

    /// `app.on_event(handler)`: a raw sink invoked for every decoded event
    /// before routing, e.g. for telemetry or custom engine-level hooks
    /// (Focus/User/Engine events the router itself never claims).
    pub fn on_event(&self, handler: impl FnMut(&Event) + 'static) {
        *self.on_event.borrow_mut() = Some(Box::new(handler));
    }

    /// `app.debug_layout(bool)`: currently a no-op flag an embedder can
    /// read back; wiring a debug overlay into the render pipeline is left
    /// to the backend (out of core scope, §1).
    pub fn debug_layout(&self, _enabled: bool) {}

    /// Replaces the error sink used for caught view/callback panics
    /// (defaults to [`LoggingErrorSink`]).
    pub fn set_error_sink(&self, sink: impl UserCodeErrorSink + 'static) {
        *self.sink.borrow_mut() = Box::new(sink);
    }

    /// A cloneable handle other threads can use to wake the engine with a
    /// tagged user event (§5 `post_user_event`).
    pub fn user_event_sender(&self) -> UserEventSender {
        UserEventSender {
            tx: self.user_events_tx.clone(),
        }
    }

    pub fn set_theme(&self, theme: u64) {
        self.scheduler.borrow_mut().set_theme(theme);
    }

    fn now_ms(&self) -> u64 {
        self.start_instant.elapsed().as_millis() as u64
    }

    fn route_event(&self, event: &Event) {
        if let Some(handler) = self.on_event.borrow_mut().as_mut() {
            handler(event);
        }
        let mut sched = self.scheduler.borrow_mut();
        let mut sink = self.sink.borrow_mut();
        sched.handle_event(event, sink.as_mut());
    }

    fn apply_batch(&self, mut handle: BatchHandle) -> EngineResult<()> {
        let decoded = handle.decode();
        handle.release();
        for event in &decoded? {
            self.route_event(event);
        }
        Ok(())
    }

    /// Runs the view→commit→layout→render pipeline if the scheduler has
    /// anything to do, submitting the resulting frame to the backend and
    /// acking it once accepted (§4.9, §5's fixed per-frame ordering).
    async fn submit_if_due(&self) -> EngineResult<()> {
        let now = self.now_ms();
        let frame = {
            let mut sched = self.scheduler.borrow_mut();
            let mut sink = self.sink.borrow_mut();
            let mut view_fn = || (self.view)(&self.state.borrow());
            sched.tick(now, &mut view_fn, sink.as_mut())
        };
        if let Some(output) = frame {
            self.followup_pending.set(output.wants_followup);
            self.backend.request_frame(output.bytes).await?;
            self.scheduler.borrow_mut().ack();
        }
        Ok(())
    }

    async fn recv_user_event(&self) -> Option<(i32, Vec<u8>)> {
        self.user_events_rx.borrow_mut().recv().await
    }

    /// `app.start()`: the main loop (§5). Alternates `poll_events` and
    /// `request_frame`, coalescing state updates that land between ticks,
    /// and keeps ticking on a short timer while a transition track is
    /// active (`wants_followup`) even with no new events. Returns once
    /// `stop()`/`dispose()` flips the running flag or the backend errors.
    pub async fn start(self: Rc<Self>) -> EngineResult<()> {
        if self.disposed.get() {
            return Err(EngineError::backend_failure("app already disposed"));
        }
        if self.running.replace(true) {
            return Ok(());
        }

        self.submit_if_due().await?;

        while self.running.get() {
            let follow_up = self.followup_pending.get();
            tokio::select! {
                biased;
                batch = self.backend.poll_events() => {
                    match batch {
                        Ok(handle) => {
                            if let Err(err) = self.apply_batch(handle) {
                                self.running.set(false);
                                return Err(err);
                            }
                        }
                        Err(err) => {
                            self.running.set(false);
                            return Err(err);
                        }
                    }
                }
                Some((tag, payload)) = self.recv_user_event() => {
                    let event = Event::User { time_ms: self.now_ms(), tag, payload };
                    self.route_event(&event);
                }
                _ = tokio::time::sleep(Duration::from_millis(16)), if follow_up => {}
            }
            self.submit_if_due().await?;
        }
        Ok(())
    }

    /// `app.run()`: `start()` wrapped with SIGINT/SIGTERM/SIGHUP (or
    /// `ctrl_c` off Unix) wired to `stop()`, per §5 "Cancellation /
    /// timeouts".
    pub async fn run(self: Rc<Self>) -> EngineResult<()> {
        let started = Rc::clone(&self);
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mk = |kind: SignalKind| signal(kind).map_err(|e| EngineError::backend_failure(e.to_string()));
            let mut sigint = mk(SignalKind::interrupt())?;
            let mut sigterm = mk(SignalKind::terminate())?;
            let mut sighup = mk(SignalKind::hangup())?;
            tokio::select! {
                result = started.start() => return result,
                _ = sigint.recv() => {}
                _ = sigterm.recv() => {}
                _ = sighup.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            tokio::select! {
                result = started.start() => return result,
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        self.stop();
        Ok(())
    }

    /// Idempotent: cancels the running loop (it exits at its next await
    /// point), and runs unmount callbacks on the committed runtime tree.
    pub fn stop(&self) {
        if !self.running.replace(false) {
            return;
        }
        let mut sched = self.scheduler.borrow_mut();
        let mut sink = self.sink.borrow_mut();
        sched.shutdown(sink.as_mut());
    }

    /// Tears the app down fully: `stop()` plus releasing the user-event
    /// queue and refusing any further `start()` call.
    pub fn dispose(&self) {
        self.stop();
        self.disposed.set(true);
        self.user_events_rx.borrow_mut().close();
    }
}

impl<S, B: Backend> Drop for App<S, B> {
    fn drop(&mut self) {
        if self.running.replace(false) {
            let mut sched = self.scheduler.borrow_mut();
            let mut sink = self.sink.borrow_mut();
            sched.shutdown(sink.as_mut());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventBatchBuilder;
    use crate::vnode::text;
    use std::cell::RefCell as StdRefCell;

    /// A backend that yields one batch per `poll_events` call from a
    /// pre-seeded queue, then blocks forever (never resolves) so tests can
    /// drive exactly N iterations via `tokio::select!` timeouts.
    struct ScriptedBackend {
        batches: StdRefCell<Vec<Vec<u8>>>,
        frames: StdRefCell<Vec<Vec<u8>>>,
    }

    impl ScriptedBackend {
        fn new(batches: Vec<Vec<u8>>) -> Self {
            Self {
                batches: StdRefCell::new(batches),
                frames: StdRefCell::new(Vec::new()),
            }
        }
    }

    impl Backend for ScriptedBackend {
        fn request_frame(&self, bytes: Vec<u8>) -> LocalBoxFuture<'_, EngineResult<()>> {
            self.frames.borrow_mut().push(bytes);
            Box::pin(async { Ok(()) })
        }

        fn poll_events(&self) -> LocalBoxFuture<'_, EngineResult<BatchHandle>> {
            Box::pin(async move {
                if let Some(bytes) = self.batches.borrow_mut().pop() {
                    Ok(BatchHandle::new(bytes, || {}))
                } else {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
            })
        }
    }

    #[tokio::test]
    async fn test_first_frame_submitted_without_any_event() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let backend = ScriptedBackend::new(vec![]);
                let app = App::create_app(backend, 0u32, Rect::new(0, 0, 80, 24), EngineConfig::debug(), |n| {
                    text(format!("count {n}"))
                });
                app.submit_if_due().await.unwrap();
                assert_eq!(app.backend.frames.borrow().len(), 1);
            })
            .await;
    }

    #[tokio::test]
    async fn test_update_marks_view_dirty_and_next_frame_reflects_it() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let backend = ScriptedBackend::new(vec![]);
                let app = App::create_app(backend, 0u32, Rect::new(0, 0, 80, 24), EngineConfig::debug(), |n| {
                    text(format!("count {n}"))
                });
                app.submit_if_due().await.unwrap();
                app.scheduler.borrow_mut().ack();
                app.update(|n| *n += 1);
                let out = {
                    let mut sched = app.scheduler.borrow_mut();
                    let mut sink = app.sink.borrow_mut();
                    let mut view_fn = || (app.view)(&app.state.borrow());
                    sched.tick(1, &mut view_fn, sink.as_mut())
                };
                assert!(out.unwrap().view_invoked);
            })
            .await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_unmounts() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let backend = ScriptedBackend::new(vec![]);
                let app = App::create_app(backend, 0u32, Rect::new(0, 0, 80, 24), EngineConfig::debug(), |_| text("x"));
                app.submit_if_due().await.unwrap();
                app.running.set(true);
                app.stop();
                app.stop();
                assert!(app.scheduler.borrow().root().is_none());
            })
            .await;
    }

    #[tokio::test]
    async fn test_resize_event_applied_through_apply_batch() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let backend = ScriptedBackend::new(vec![]);
                let app = App::create_app(backend, 0u32, Rect::new(0, 0, 80, 24), EngineConfig::debug(), |_| text("x"));
                app.submit_if_due().await.unwrap();
                app.scheduler.borrow_mut().ack();

                let bytes = EventBatchBuilder::new().resize(1, 40, 12).build();
                let handle = BatchHandle::new(bytes, || {});
                app.apply_batch(handle).unwrap();
                let out = app.submit_if_due().await;
                assert!(out.is_ok());
            })
            .await;
    }
}
