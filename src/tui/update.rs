//! Dashboard state transitions

use std::time::Instant;

use crate::models::TestStatus;
use crate::protocol::{EventKind, ProtocolEvent};

use super::keys::{self, Action};
use super::messages::{Effect, Message};
use super::model::{DisplayModel, ErrorEntry, Notice, Panel, RunPhase, TestNode, WorkerNode, PAGE_STEP};

/// Fold one message into the model
pub fn update(model: &mut DisplayModel, message: Message) -> Option<Effect> {
    match message {
        Message::WorkerStarted {
            worker_id,
            test_count,
        } => {
            let worker = worker(model, worker_id);
            worker.files = test_count;
            if !worker.has_count {
                worker.total = test_count;
            }
            None
        }
        Message::Protocol(event) => {
            apply_event(model, event);
            None
        }
        Message::WorkerCompleted { worker_id, error } => {
            worker_completed(model, worker_id, error);
            None
        }
        Message::CleanupProgress { completed, total } => {
            if model.phase == RunPhase::Running {
                model.phase = RunPhase::Cleanup;
                model.ended = Some(Instant::now());
                if model.panel == Panel::Running {
                    model.panel = Panel::Workers;
                }
            }
            if model.phase == RunPhase::Cleanup {
                model.cleanup = (completed, total);
            }
            None
        }
        Message::Finish => {
            if model.phase.is_live() {
                model.phase = RunPhase::Complete;
                model.ended.get_or_insert_with(Instant::now);
                model.panel = Panel::Errors;
            }
            if model.cancel_requested {
                Some(Effect::Quit)
            } else {
                Some(Effect::StopTicker)
            }
        }
        Message::Shutdown => Some(Effect::Quit),
        Message::CopyNoticeExpired(id) => {
            if model.notice.as_ref().is_some_and(|n| n.id == id) {
                model.notice = None;
            }
            None
        }
        Message::CopyFailed { notice, error } => {
            if let Some(n) = model.notice.as_mut().filter(|n| n.id == notice) {
                n.text = format!("Copy failed: {error}");
            }
            None
        }
        Message::Key(key) => keys::action(&key).and_then(|action| handle_action(model, action)),
        Message::Tick | Message::Resize => None,
    }
}

fn worker(model: &mut DisplayModel, worker_id: usize) -> &mut WorkerNode {
    model
        .workers
        .entry(worker_id)
        .or_insert_with(|| WorkerNode::new(worker_id))
}

fn apply_event(model: &mut DisplayModel, event: ProtocolEvent) {
    let worker_id = event.worker_id;

    match event.kind {
        EventKind::TestStarted { key, display_name } => {
            let worker = worker(model, worker_id);
            match worker.test_mut(&key) {
                Some(test) if !test.status.is_terminal() => test.status = TestStatus::Running,
                // Same method name in another class
                _ => worker
                    .tests
                    .push(TestNode::new(&key, &display_name, TestStatus::Running)),
            }
        }
        EventKind::TestFinished { key } => {
            if settle(model, worker_id, &key, TestStatus::Passed).is_some() {
                model.completed += 1;
                worker(model, worker_id).completed += 1;
            }
        }
        EventKind::TestFailed {
            key,
            message,
            details,
        } => {
            let Some(name) = settle(model, worker_id, &key, TestStatus::Failed) else {
                return;
            };
            if let Some(test) = worker(model, worker_id).test_mut(&key) {
                test.message = message.clone();
                test.details = details.clone();
            }
            model.completed += 1;
            model.failed += 1;
            let worker = worker(model, worker_id);
            worker.completed += 1;
            worker.failed += 1;
            model.errors.push(ErrorEntry {
                worker_id,
                name,
                message,
                details,
                expanded: false,
            });
        }
        EventKind::TestSkipped { key, message } => {
            if settle(model, worker_id, &key, TestStatus::Skipped).is_none() {
                return;
            }
            if let Some(test) = worker(model, worker_id).test_mut(&key) {
                test.message = message;
            }
            model.completed += 1;
            model.skipped += 1;
            let worker = worker(model, worker_id);
            worker.completed += 1;
            worker.skipped += 1;
        }
        EventKind::CountReported { count } => {
            let worker = worker(model, worker_id);
            let prior = worker.total;
            worker.total = count;
            worker.has_count = true;
            model.test_count = model.test_count.saturating_sub(prior) + count;
            model.has_count = true;
        }
        EventKind::SuiteStarted { .. } | EventKind::SuiteFinished { .. } => {}
    }
}

/// Move a test into a terminal status, creating it when unseen.
///
/// Applies to the latest test with this key. Returns its display name, or
/// `None` when it was already terminal and nothing changed.
fn settle(model: &mut DisplayModel, worker_id: usize, key: &str, status: TestStatus) -> Option<String> {
    let worker = worker(model, worker_id);
    match worker.test_mut(key) {
        Some(test) if test.status.is_terminal() => None,
        Some(test) => {
            test.status = status;
            Some(test.name.clone())
        }
        None => {
            worker.tests.push(TestNode::new(key, key, status));
            Some(key.to_string())
        }
    }
}

fn worker_completed(model: &mut DisplayModel, worker_id: usize, error: Option<String>) {
    let worker = worker(model, worker_id);
    worker.finished = true;

    let Some(error) = error else {
        return;
    };
    let explained = worker.failed > 0;
    worker.error = Some(error.clone());

    if !explained {
        let (message, details) = match error.split_once('\n') {
            Some((first, rest)) => (first.to_string(), rest.to_string()),
            None => (error, String::new()),
        };
        model.errors.push(ErrorEntry {
            worker_id,
            name: format!("Worker {worker_id}"),
            message,
            details,
            expanded: false,
        });
    }
}

fn handle_action(model: &mut DisplayModel, action: Action) -> Option<Effect> {
    if action.is_navigation() && model.phase == RunPhase::Complete {
        model.phase = RunPhase::Exploring;
    }

    match action {
        Action::Interrupt => {
            if model.phase.is_live() {
                model.cancel_requested = true;
                Some(Effect::Cancel)
            } else {
                Some(Effect::Quit)
            }
        }
        Action::Quit => (!model.phase.is_live()).then_some(Effect::Quit),
        Action::NextPanel => {
            model.panel = next_panel(model.panel, model.phase);
            None
        }
        Action::Up => {
            move_cursor(model, -1);
            None
        }
        Action::Down => {
            move_cursor(model, 1);
            None
        }
        Action::PageUp => {
            move_cursor(model, -(PAGE_STEP as isize));
            None
        }
        Action::PageDown => {
            move_cursor(model, PAGE_STEP as isize);
            None
        }
        Action::Toggle => {
            if model.panel == Panel::Errors {
                if let Some(entry) = model.errors.get_mut(model.error_cursor) {
                    entry.expanded = !entry.expanded;
                }
            }
            None
        }
        Action::Copy => copy(model),
    }
}

fn next_panel(panel: Panel, phase: RunPhase) -> Panel {
    match (panel, phase) {
        (Panel::Running, _) => Panel::Workers,
        (Panel::Workers, _) => Panel::Errors,
        (Panel::Errors, RunPhase::Running) => Panel::Running,
        (Panel::Errors, _) => Panel::Workers,
    }
}

fn clamp(cursor: usize, delta: isize, len: usize) -> usize {
    cursor
        .saturating_add_signed(delta)
        .min(len.saturating_sub(1))
}

fn move_cursor(model: &mut DisplayModel, delta: isize) {
    match model.panel {
        Panel::Running => {
            let len = model.running_tests().len();
            model.running_cursor = clamp(model.running_cursor, delta, len);
        }
        Panel::Workers => {
            model.worker_page = clamp(model.worker_page, delta, model.worker_pages);
        }
        Panel::Errors => {
            model.error_cursor = clamp(model.error_cursor, delta, model.errors.len());
        }
    }
}

fn copy(model: &mut DisplayModel) -> Option<Effect> {
    if model.panel != Panel::Errors {
        return None;
    }
    let text = model.errors.get(model.error_cursor)?.clipboard_text();

    model.next_notice += 1;
    let id = model.next_notice;
    model.notice = Some(Notice {
        id,
        text: "Copied to clipboard!".to_string(),
    });

    Some(Effect::Copy { text, notice: id })
}
