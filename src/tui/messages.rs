//! Messages consumed by the dashboard loop

use crossterm::event::KeyEvent;

use crate::protocol::ProtocolEvent;

/// Everything the display task reacts to arrives as one of these
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    WorkerStarted {
        worker_id: usize,
        test_count: usize,
    },
    Protocol(ProtocolEvent),
    WorkerCompleted {
        worker_id: usize,
        error: Option<String>,
    },
    CleanupProgress {
        completed: usize,
        total: usize,
    },
    Finish,
    /// The process is about to exit
    Shutdown,
    Tick,
    Key(KeyEvent),
    Resize,
    /// The copy notice with this id has been shown long enough
    CopyNoticeExpired(u64),
    CopyFailed {
        notice: u64,
        error: String,
    },
}

/// Side effect requested by an update, performed by the display task
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Cancel the run
    Cancel,
    /// Leave the dashboard
    Quit,
    /// Put text on the clipboard; `notice` identifies the notice to expire
    Copy { text: String, notice: u64 },
    /// The run is over, ticks are no longer needed
    StopTicker,
}
