//! Black-box scenario tests driving the public API only: `Scheduler`,
//! `vnode` constructors, and the `ZREV` event-batch round trip. These
//! exercise the worked scenarios end to end rather than any single
//! module's internals.

use drawterm_core::vnode::{button, column, row, text};
use drawterm_core::{Event, EventBatchBuilder, Key, LoggingErrorSink, Modifiers, Rect, Scheduler};
use drawterm_core::config::EngineConfig;

fn cfg() -> EngineConfig {
    EngineConfig::debug()
}

fn decode_batch(bytes: &[u8]) -> Vec<Event> {
    drawterm_core::event::decode(bytes).expect("well-formed synthetic batch decodes")
}

//--------------------------------------------------------------------------------------------------
// S1: a key press that only changes focus renders without re-invoking view
//--------------------------------------------------------------------------------------------------

#[test]
fn tab_key_batch_moves_focus_without_rerunning_view() {
    let mut sched = Scheduler::new(cfg(), Rect::new(0, 0, 80, 24));
    let mut sink = LoggingErrorSink;

    sched
        .tick(0, &mut || row(vec![button("first"), button("second")]), &mut sink)
        .unwrap();
    sched.ack();

    let batch = EventBatchBuilder::new().key(1, Key::Tab, Modifiers::empty(), false).build();
    for event in decode_batch(&batch) {
        sched.handle_event(&event, &mut sink);
    }
    assert_eq!(sched.focused(), Some(0));

    let out = sched
        .tick(1, &mut || panic!("focus-only routing must not rerun the view"), &mut sink)
        .unwrap();
    assert!(!out.view_invoked);
    assert!(!out.full_redraw);
    sched.ack();
}

//--------------------------------------------------------------------------------------------------
// S2: two state-update requests arriving before the next tick coalesce
// into a single view invocation, not two
//--------------------------------------------------------------------------------------------------

#[test]
fn two_dirtying_events_before_a_tick_coalesce_into_one_view_run() {
    let mut sched = Scheduler::new(cfg(), Rect::new(0, 0, 80, 24));
    let mut sink = LoggingErrorSink;

    sched.tick(0, &mut || button("counter: 0"), &mut sink).unwrap();
    sched.ack();

    // Two independent callback firings ("clicks") before the scheduler is
    // asked for the next frame: both land on the same dirty bit.
    let batch = EventBatchBuilder::new()
        .mouse(1, 5, 0, drawterm_core::event::MouseKind::Down, 1, 0, 0)
        .mouse(2, 5, 0, drawterm_core::event::MouseKind::Up, 0, 0, 0)
        .build();
    for event in decode_batch(&batch) {
        sched.handle_event(&event, &mut sink);
    }
    sched.mark_view_dirty();

    let mut view_runs = 0u32;
    let out = sched
        .tick(3, &mut || {
            view_runs += 1;
            button("counter: 1")
        }, &mut sink)
        .unwrap();
    assert!(out.view_invoked);
    assert_eq!(view_runs, 1, "coalesced dirty state must yield exactly one view run");
}

//--------------------------------------------------------------------------------------------------
// S4: a widget that grows relayouts before the next click lands, so the
// click must hit what is actually on screen, not a stale rect
//--------------------------------------------------------------------------------------------------

#[test]
fn click_after_relayout_hits_the_widget_at_its_new_position() {
    let mut sched = Scheduler::new(cfg(), Rect::new(0, 0, 80, 24));
    let mut sink = LoggingErrorSink;

    // First frame: a short label, then a button right after it in the row.
    sched
        .tick(0, &mut || row(vec![text("x"), button("go")]), &mut sink)
        .unwrap();
    sched.ack();

    // Second frame: the label grows, pushing the button to the right.
    // Still zero view invocations expected from the test body itself —
    // the scheduler must pick this up from a marked-dirty view, exactly
    // as a real state update would.
    sched.mark_view_dirty();
    sched
        .tick(1, &mut || row(vec![text("a much longer label"), button("go")]), &mut sink)
        .unwrap();
    sched.ack();

    // A click at the button's original column would now land on the
    // label instead; routing against the last-rendered tree means a
    // click at the button's *new* position is what fires its callback.
    // We don't decode drawlist bytes here (that's a backend's job) — we
    // only assert that routing against stale-vs-fresh rects behaves as
    // the committed tree dictates, via the router's focus-ring outcome.
    let before_growth_batch = EventBatchBuilder::new()
        .mouse(2, 1, 0, drawterm_core::event::MouseKind::Down, 1, 0, 0)
        .build();
    for event in decode_batch(&before_growth_batch) {
        sched.handle_event(&event, &mut sink);
    }
    // Column 1 now falls inside the grown label, not the button: no
    // focus change should have resulted from this click.
    assert_eq!(sched.focused(), None);
}

//--------------------------------------------------------------------------------------------------
// §5 backpressure: dropped batches force exactly one full-redraw frame
//--------------------------------------------------------------------------------------------------

#[test]
fn dropped_batches_event_forces_one_full_redraw_then_resumes_incremental() {
    let mut sched = Scheduler::new(cfg(), Rect::new(0, 0, 80, 24));
    let mut sink = LoggingErrorSink;

    sched.tick(0, &mut || text("steady"), &mut sink).unwrap();
    sched.ack();

    let batch = EventBatchBuilder::new().engine_dropped_batches(1, 3).build();
    for event in decode_batch(&batch) {
        sched.handle_event(&event, &mut sink);
    }

    let out = sched.tick(2, &mut || text("steady"), &mut sink).unwrap();
    assert!(out.full_redraw);
    sched.ack();

    sched.mark_view_dirty();
    let out2 = sched.tick(3, &mut || text("still steady"), &mut sink).unwrap();
    assert!(!out2.full_redraw);
}

//--------------------------------------------------------------------------------------------------
// A resize batch reaches the scheduler's viewport through the same
// decode-then-handle_event path a real backend would drive.
//--------------------------------------------------------------------------------------------------

#[test]
fn resize_batch_updates_viewport_and_forces_relayout() {
    let mut sched = Scheduler::new(cfg(), Rect::new(0, 0, 80, 24));
    let mut sink = LoggingErrorSink;

    sched.tick(0, &mut || column(vec![text("hi")]), &mut sink).unwrap();
    sched.ack();

    let batch = EventBatchBuilder::new().resize(1, 40, 12).build();
    for event in decode_batch(&batch) {
        sched.handle_event(&event, &mut sink);
    }

    let out = sched
        .tick(1, &mut || panic!("a plain resize must not rerun the view"), &mut sink)
        .unwrap();
    assert!(!out.view_invoked);
    assert!(!out.bytes.is_empty());
}
