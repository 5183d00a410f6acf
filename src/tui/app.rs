//! Interactive dashboard output
//!
//! [`DashboardOutput`] forwards run progress over a channel to a single
//! display task that owns the model and the terminal.

use std::io::{self, Stdout};
use std::sync::{mpsc as std_mpsc, Arc, Mutex, OnceLock};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use arboard::Clipboard;
use crossterm::{
    event::{Event, EventStream, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures::future::BoxFuture;
use futures::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::WorkerError;
use crate::output::{Output, StartOptions};
use crate::protocol;

use super::messages::{Effect, Message};
use super::model::{DisplayModel, NOTICE_DURATION};
use super::{update, view};

const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Longest wait for the terminal to be restored before exiting
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Output that renders a live dashboard on the terminal
pub struct DashboardOutput {
    tx: UnboundedSender<Message>,
    rx: Mutex<Option<UnboundedReceiver<Message>>>,
    cancel: Arc<OnceLock<CancellationToken>>,
    display: Mutex<Option<JoinHandle<()>>>,
    /// Cancelled once the display task has released the terminal
    closed: CancellationToken,
}

impl Default for DashboardOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl DashboardOutput {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            cancel: Arc::new(OnceLock::new()),
            display: Mutex::new(None),
            closed: CancellationToken::new(),
        }
    }

    fn send(&self, message: Message) {
        // The display task may already be gone after a quit
        let _ = self.tx.send(message);
    }
}

impl Output for DashboardOutput {
    fn start(&self, options: &StartOptions) {
        let Some(rx) = self.rx.lock().unwrap_or_else(|p| p.into_inner()).take() else {
            warn!("Dashboard already started");
            return;
        };

        let display = Display {
            model: DisplayModel::new(options),
            rx,
            tx: self.tx.clone(),
            cancel: self.cancel.clone(),
            ticker: CancellationToken::new(),
            clipboard: None,
        };
        let closed = self.closed.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = display.run().await {
                error!("Dashboard failed: {:#}", e);
            }
            closed.cancel();
        });
        *self.display.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle);
    }

    fn worker_started(&self, worker_id: usize, test_count: usize) {
        self.send(Message::WorkerStarted {
            worker_id,
            test_count,
        });
    }

    fn worker_line(&self, worker_id: usize, line: &str) {
        if let Some(event) = protocol::decode(worker_id, line) {
            self.send(Message::Protocol(event));
        }
    }

    fn worker_completed(&self, worker_id: usize, error: Option<&WorkerError>) {
        self.send(Message::WorkerCompleted {
            worker_id,
            error: error.map(|e| e.to_string()),
        });
    }

    fn cleanup_progress(&self, completed: usize, total: usize) {
        self.send(Message::CleanupProgress { completed, total });
    }

    /// Resolves once the user leaves the dashboard
    fn finish(&self) -> BoxFuture<'_, ()> {
        self.send(Message::Finish);
        let handle = self.display.lock().unwrap_or_else(|p| p.into_inner()).take();

        Box::pin(async move {
            if let Some(handle) = handle {
                if let Err(e) = handle.await {
                    warn!("Dashboard task ended abnormally: {}", e);
                }
            }
        })
    }

    fn set_cancel_hook(&self, token: CancellationToken) {
        if self.cancel.set(token).is_err() {
            debug!("Cancel hook already set");
        }
    }

    /// Resolves once the terminal is restored, or after a short grace period
    fn shutdown(&self) -> BoxFuture<'_, ()> {
        let started = self.rx.lock().unwrap_or_else(|p| p.into_inner()).is_none();
        self.send(Message::Shutdown);

        Box::pin(async move {
            if !started {
                return;
            }
            if tokio::time::timeout(SHUTDOWN_GRACE, self.closed.cancelled())
                .await
                .is_err()
            {
                warn!("Dashboard did not close in time");
            }
        })
    }
}

/// Puts the terminal in raw mode on the alternate screen, restoring it on drop
struct TerminalGuard {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl TerminalGuard {
    fn enter() -> Result<Self> {
        enable_raw_mode().context("Failed to enable raw mode")?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen).context("Failed to enter alternate screen")?;

        let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        terminal.clear()?;
        terminal.hide_cursor()?;
        Ok(Self { terminal })
    }

    fn draw(&mut self, model: &mut DisplayModel) -> Result<()> {
        self.terminal
            .draw(|frame| view::render(frame, model))
            .context("Failed to draw dashboard")?;
        Ok(())
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(self.terminal.backend_mut(), LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}

/// The display task's state
struct Display {
    model: DisplayModel,
    rx: UnboundedReceiver<Message>,
    tx: UnboundedSender<Message>,
    cancel: Arc<OnceLock<CancellationToken>>,
    ticker: CancellationToken,
    clipboard: Option<std_mpsc::Sender<(String, u64)>>,
}

impl Display {
    async fn run(mut self) -> Result<()> {
        let mut terminal = TerminalGuard::enter()?;

        tokio::spawn(tick(self.tx.clone(), self.ticker.clone()));
        let input = tokio::spawn(read_input(self.tx.clone()));

        let result = self.event_loop(&mut terminal).await;

        self.ticker.cancel();
        input.abort();
        result
    }

    async fn event_loop(&mut self, terminal: &mut TerminalGuard) -> Result<()> {
        terminal.draw(&mut self.model)?;

        while let Some(message) = self.rx.recv().await {
            let redraw = !matches!(message, Message::Tick) || self.model.phase.is_live();

            if let Some(effect) = update::update(&mut self.model, message) {
                if !self.apply(effect) {
                    return Ok(());
                }
            }
            if redraw {
                terminal.draw(&mut self.model)?;
            }
        }
        Ok(())
    }

    /// Perform an effect; false means leave the dashboard
    fn apply(&mut self, effect: Effect) -> bool {
        match effect {
            Effect::Quit => return false,
            Effect::Cancel => match self.cancel.get() {
                Some(token) => token.cancel(),
                None => warn!("No run to cancel"),
            },
            Effect::StopTicker => {
                self.ticker.cancel();
                // Cancelled by a signal rather than from the dashboard
                if self.cancel.get().is_some_and(CancellationToken::is_cancelled) {
                    return false;
                }
            }
            Effect::Copy { text, notice } => {
                let clipboard = self
                    .clipboard
                    .get_or_insert_with(|| spawn_clipboard(self.tx.clone()));
                if clipboard.send((text, notice)).is_err() {
                    warn!("Clipboard thread has stopped");
                }
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(NOTICE_DURATION).await;
                    let _ = tx.send(Message::CopyNoticeExpired(notice));
                });
            }
        }
        true
    }
}

/// Serve clipboard writes from a dedicated thread that owns the clipboard
/// for the rest of the session. Failures come back as messages.
fn spawn_clipboard(tx: UnboundedSender<Message>) -> std_mpsc::Sender<(String, u64)> {
    let (requests, rx) = std_mpsc::channel::<(String, u64)>();

    thread::spawn(move || {
        let mut clipboard: Option<Clipboard> = None;
        for (text, notice) in rx {
            let result = match clipboard.take() {
                Some(existing) => Ok(existing),
                None => Clipboard::new(),
            }
            .and_then(|existing| clipboard.insert(existing).set_text(text));

            if let Err(e) = result {
                let _ = tx.send(Message::CopyFailed {
                    notice,
                    error: e.to_string(),
                });
            }
        }
    });

    requests
}

async fn tick(tx: UnboundedSender<Message>, stop: CancellationToken) {
    let mut interval = tokio::time::interval(TICK_INTERVAL);
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = interval.tick() => {
                if tx.send(Message::Tick).is_err() {
                    break;
                }
            }
        }
    }
}

async fn read_input(tx: UnboundedSender<Message>) {
    let mut events = EventStream::new();

    while let Some(event) = events.next().await {
        let message = match event {
            Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => Message::Key(key),
            Ok(Event::Resize(..)) => Message::Resize,
            Ok(_) => continue,
            Err(e) => {
                warn!("Failed to read terminal input: {}", e);
                break;
            }
        };
        if tx.send(message).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_are_decoded_before_sending() {
        let output = DashboardOutput::new();
        output.worker_line(2, "PHPUnit 11.0.0 by Sebastian Bergmann and contributors.");
        output.worker_line(2, "##teamcity[testCount count='4' flowId='1']");
        output.cleanup_progress(0, 2);

        let mut rx = output.rx.lock().unwrap().take().unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            Message::Protocol(protocol::ProtocolEvent {
                worker_id: 2,
                kind: protocol::EventKind::CountReported { count: 4 },
            })
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            Message::CleanupProgress {
                completed: 0,
                total: 2
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_cancel_hook_set_once() {
        let output = DashboardOutput::new();
        let first = CancellationToken::new();
        output.set_cancel_hook(first.clone());
        output.set_cancel_hook(CancellationToken::new());

        output.cancel.get().unwrap().cancel();
        assert!(first.is_cancelled());
    }

    #[tokio::test]
    async fn test_finish_without_start_returns() {
        let output = DashboardOutput::new();
        output.finish().await;
        output.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_display_to_close() {
        let output = DashboardOutput::new();

        // Stand in for a running display task
        let mut rx = output.rx.lock().unwrap().take().unwrap();
        let closed = output.closed.clone();
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if message == Message::Shutdown {
                    closed.cancel();
                }
            }
        });

        output.shutdown().await;
        assert!(output.closed.is_cancelled());
    }
}
