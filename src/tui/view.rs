//! Dashboard rendering

use std::time::Duration;

use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use crate::models::TestStatus;
use crate::utils::format_duration;

use super::keys;
use super::model::{DisplayModel, Panel, RunPhase, WorkerNode};

const PASSED: Color = Color::Green;
const FAILED: Color = Color::Red;
const SKIPPED: Color = Color::Yellow;
const RUNNING: Color = Color::Cyan;

fn dim() -> Style {
    Style::default().fg(Color::DarkGray)
}

fn bold() -> Style {
    Style::default().add_modifier(Modifier::BOLD)
}

fn cursor() -> Style {
    Style::default().add_modifier(Modifier::REVERSED)
}

fn panel(title: String, active: bool) -> Block<'static> {
    let border = if active {
        Style::default().fg(RUNNING)
    } else {
        dim()
    };
    Block::default()
        .title(Span::styled(title, bold()))
        .borders(Borders::ALL)
        .border_style(border)
}

/// Draw the whole dashboard
pub fn render(frame: &mut Frame, model: &mut DisplayModel) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // header
            Constraint::Length(1), // overall progress
            Constraint::Length(1), // progress bar
            Constraint::Min(6),    // panels
            Constraint::Length(1), // help
        ])
        .split(frame.area());

    frame.render_widget(Paragraph::new(header(model)), rows[0]);
    frame.render_widget(Paragraph::new(overall(model)), rows[1]);
    frame.render_widget(
        Paragraph::new(progress_bar(
            model.completed,
            model.failed,
            model.test_count,
            rows[2].width.saturating_sub(2) as usize,
            false,
        )),
        rows[2],
    );

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(rows[3]);

    let workers_height = workers_height(model, columns[0].height);
    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(workers_height)])
        .split(columns[0]);

    if model.phase == RunPhase::Running {
        render_running(frame, model, left[0]);
    } else {
        render_summary(frame, model, left[0]);
    }
    render_workers(frame, model, left[1]);
    render_errors(frame, model, columns[1]);

    let help = match &model.notice {
        Some(notice) => Line::from(Span::styled(notice.text.clone(), Style::default().fg(PASSED))),
        None => Line::from(Span::styled(keys::help(model.phase), dim())),
    };
    frame.render_widget(Paragraph::new(help), rows[4]);
}

fn header(model: &DisplayModel) -> Line<'static> {
    let elapsed = Duration::from_secs(model.elapsed().as_secs());

    let status = match model.phase {
        RunPhase::Running => Span::styled("Running", Style::default().fg(RUNNING)),
        RunPhase::Cleanup => Span::styled(
            format!(
                "Cleaning up workers... {}/{}",
                model.cleanup.0, model.cleanup.1
            ),
            Style::default().fg(RUNNING),
        ),
        RunPhase::Complete | RunPhase::Exploring if model.is_failed() => {
            Span::styled("Complete - FAILED", Style::default().fg(FAILED))
        }
        RunPhase::Complete | RunPhase::Exploring => {
            Span::styled("Complete - PASSED", Style::default().fg(PASSED))
        }
    };

    let mut spans = vec![
        Span::styled("PHPUnit Parallel", bold().fg(Color::Magenta)),
        Span::raw(" - "),
        status,
        Span::raw(format!(" ({} elapsed)", format_duration(elapsed))),
    ];

    if !model.selectors.is_empty() {
        let args = model.selectors.to_args().join(" ");
        spans.push(Span::styled(format!("  {args}"), dim()));
    }
    Line::from(spans)
}

fn overall(model: &DisplayModel) -> Line<'static> {
    let mut spans = Vec::new();

    if model.has_count {
        let percent = (model.completed * 100)
            .checked_div(model.test_count)
            .unwrap_or(0);
        spans.push(Span::raw(format!(
            "Overall: {}/{} ({}%)",
            model.completed, model.test_count, percent
        )));
    } else {
        spans.push(Span::raw(format!("Overall: {} test files", model.test_count)));
    }

    if model.failed > 0 {
        spans.push(Span::styled(
            format!(" {} failed", model.failed),
            Style::default().fg(FAILED),
        ));
    }

    if let Some((remaining, total)) = model.eta() {
        spans.push(Span::styled(
            format!(
                "  ETA: {} remaining (est. {} total)",
                format_duration(remaining),
                format_duration(total)
            ),
            dim(),
        ));
    } else if model.phase != RunPhase::Running {
        spans.push(Span::styled(
            format!("  Completed in {}", format_duration(model.elapsed())),
            dim(),
        ));
    }

    Line::from(spans)
}

/// `[███░░░]` with passed in green and failed in red
pub fn progress_bar(completed: usize, failed: usize, total: usize, width: usize, dimmed: bool) -> Line<'static> {
    let width = width.max(10);
    if total == 0 {
        return Line::from(Span::styled(format!("[{}]", "░".repeat(width)), dim()));
    }

    let filled = if completed >= total {
        width
    } else {
        completed * width / total
    };
    let mut failed_width = (failed * filled).checked_div(completed).unwrap_or(0);
    if failed > 0 && failed_width == 0 && filled > 0 {
        failed_width = 1;
    }
    let passed_width = filled - failed_width;

    let passed_style = if dimmed { dim() } else { Style::default().fg(PASSED) };
    Line::from(vec![
        Span::styled("[", dim()),
        Span::styled("█".repeat(passed_width), passed_style),
        Span::styled("█".repeat(failed_width), Style::default().fg(FAILED)),
        Span::styled(format!("{}]", "░".repeat(width - filled)), dim()),
    ])
}

/// Rows for the workers panel: two lines per worker, up to half the column
fn workers_height(model: &DisplayModel, available: u16) -> u16 {
    let max_rows = (available / 2).saturating_sub(2).max(2);
    let max_workers = (max_rows / 2).max(1) as usize;
    let shown = model.workers.len().min(max_workers) as u16;
    let mut height = shown * 2 + 2;
    if model.workers.len() > max_workers {
        height += 1;
    }
    height.max(5)
}

fn render_running(frame: &mut Frame, model: &mut DisplayModel, area: Rect) {
    // The list shrinks as tests finish
    let count = model.running_tests().len();
    model.running_cursor = model.running_cursor.min(count.saturating_sub(1));

    let running = model.running_tests();
    let active = model.panel == Panel::Running;
    let width = area.width.saturating_sub(4) as usize;

    let lines: Vec<Line> = if running.is_empty() {
        vec![Line::from(Span::styled("Waiting...", dim()))]
    } else {
        running
            .iter()
            .enumerate()
            .map(|(i, test)| {
                let line = Line::from(vec![
                    Span::styled(TestStatus::Running.symbol(), Style::default().fg(RUNNING)),
                    Span::raw(" "),
                    Span::raw(truncate(&test.name, width)),
                ]);
                if active && i == model.running_cursor {
                    line.style(cursor())
                } else {
                    line
                }
            })
            .collect()
    };

    let visible = area.height.saturating_sub(2) as usize;
    let scroll = scroll_offset(model.running_cursor, model.running_cursor, visible);
    let block = panel(format!("Running ({})", running.len()), active);

    frame.render_widget(
        Paragraph::new(lines).block(block).scroll((scroll as u16, 0)),
        area,
    );
}

fn render_summary(frame: &mut Frame, model: &DisplayModel, area: Rect) {
    let width = area.width.saturating_sub(2) as usize;
    let elapsed = model.elapsed();
    let rate = if elapsed.as_secs_f64() > 0.0 {
        model.completed as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    };

    let row = |label: &str, value: String, style: Style| {
        let spacing = width.saturating_sub(label.len() + value.chars().count()).max(1);
        Line::from(vec![
            Span::raw(label.to_string()),
            Span::raw(" ".repeat(spacing)),
            Span::styled(value, style),
        ])
    };

    let verdict = if model.is_failed() {
        Span::styled("  FAILED  ", bold().fg(Color::White).bg(FAILED))
    } else {
        Span::styled("  PASSED  ", bold().fg(Color::Black).bg(PASSED))
    };

    let mut lines = vec![
        Line::default(),
        Line::from(verdict).alignment(Alignment::Center),
        Line::default(),
        row("Duration:", format_duration(elapsed), Style::default()),
        row(
            "Cumulative:",
            format_duration(elapsed * model.worker_count as u32),
            Style::default(),
        ),
        row("Rate:", format!("{rate:.1} tests/sec"), Style::default()),
        Line::default(),
        row("Total:", format!("{} tests", model.completed), Style::default()),
        row("Passed:", model.passed().to_string(), Style::default().fg(PASSED)),
    ];
    if model.failed > 0 {
        lines.push(row("Failed:", model.failed.to_string(), Style::default().fg(FAILED)));
    }
    if model.skipped > 0 {
        lines.push(row("Skipped:", model.skipped.to_string(), Style::default().fg(SKIPPED)));
    }
    lines.push(Line::default());
    lines.push(row("Workers:", model.worker_count.to_string(), dim()));

    frame.render_widget(
        Paragraph::new(lines).block(panel("Summary".to_string(), false)),
        area,
    );
}

fn worker_lines(worker: &WorkerNode, bar_width: usize) -> [Line<'static>; 2] {
    let done = worker.is_done();
    let style = if done { dim() } else { Style::default() };

    let mut stats = if worker.has_count {
        let percent = (worker.completed * 100)
            .checked_div(worker.total)
            .unwrap_or(0);
        vec![Span::styled(
            format!(
                "Worker {}: {}/{} ({}%)",
                worker.id, worker.completed, worker.total, percent
            ),
            style,
        )]
    } else {
        vec![Span::styled(
            format!("Worker {}: {} files", worker.id, worker.files),
            style,
        )]
    };
    if worker.failed > 0 {
        stats.push(Span::styled(
            format!(" {} failed", worker.failed),
            Style::default().fg(FAILED),
        ));
    }
    if worker.error.is_some() && worker.failed == 0 {
        stats.push(Span::styled(" error", Style::default().fg(FAILED)));
    }

    let bar = if worker.has_count {
        progress_bar(worker.completed, worker.failed, worker.total, bar_width, done)
    } else {
        progress_bar(0, 0, 0, bar_width, done)
    };

    [Line::from(stats), bar]
}

fn render_workers(frame: &mut Frame, model: &mut DisplayModel, area: Rect) {
    let bar_width = area.width.saturating_sub(4) as usize;
    let mut visible = area.height.saturating_sub(2).max(2) as usize;

    // Unfinished workers first
    let (busy, done): (Vec<&WorkerNode>, Vec<&WorkerNode>) =
        model.workers.values().partition(|w| !w.is_done());
    let ordered: Vec<&WorkerNode> = busy.into_iter().chain(done).collect();

    let mut per_page = (visible / 2).max(1);
    let mut pages = ordered.len().div_ceil(per_page).max(1);
    if pages > 1 {
        visible -= 1;
        per_page = (visible / 2).max(1);
        pages = ordered.len().div_ceil(per_page).max(1);
    }
    let page = model.worker_page.min(pages - 1);

    let mut lines: Vec<Line> = ordered
        .iter()
        .skip(page * per_page)
        .take(per_page)
        .flat_map(|w| worker_lines(w, bar_width))
        .collect();
    if pages > 1 {
        lines.push(Line::from(Span::styled(
            format!("Page {}/{} (↑↓)", page + 1, pages),
            dim(),
        )));
    }

    let active = model.panel == Panel::Workers;
    frame.render_widget(
        Paragraph::new(lines).block(panel("Workers".to_string(), active)),
        area,
    );

    model.worker_pages = pages;
    model.worker_page = page;
}

fn render_errors(frame: &mut Frame, model: &DisplayModel, area: Rect) {
    let active = model.panel == Panel::Errors;
    let width = area.width.saturating_sub(4) as usize;
    let block = panel(format!("Errors ({})", model.errors.len()), active);

    if model.errors.is_empty() {
        frame.render_widget(
            Paragraph::new(Line::from(Span::styled("No errors", dim()))).block(block),
            area,
        );
        return;
    }

    let mut lines: Vec<Line> = Vec::new();
    let mut cursor_span = (0, 0);

    for (i, entry) in model.errors.iter().enumerate() {
        let selected = i == model.error_cursor;
        if selected {
            cursor_span.0 = lines.len();
        }

        let icon = if entry.expanded { "▼" } else { "▶" };
        let line = Line::from(vec![
            Span::raw(format!("{icon} ")),
            Span::styled(truncate(&entry.name, width), Style::default().fg(FAILED)),
        ]);
        lines.push(if active && selected { line.style(cursor()) } else { line });

        if entry.expanded {
            for chunk in wrap(&entry.message, width) {
                lines.push(Line::from(Span::styled(
                    format!("  {chunk}"),
                    Style::default().fg(Color::LightRed),
                )));
            }
            for detail in entry.details.lines().filter(|l| !l.is_empty()) {
                lines.push(Line::from(Span::styled(
                    format!("  {}", truncate(detail, width)),
                    dim(),
                )));
            }
        }

        if selected {
            cursor_span.1 = lines.len() - 1;
        }
    }

    let visible = area.height.saturating_sub(2) as usize;
    let scroll = scroll_offset(cursor_span.0, cursor_span.1, visible);

    frame.render_widget(
        Paragraph::new(lines).block(block).scroll((scroll as u16, 0)),
        area,
    );
}

/// First visible row so that the selected rows fit, keeping their first
/// row visible when they do not
fn scroll_offset(first: usize, last: usize, visible: usize) -> usize {
    if visible == 0 || last < visible {
        return 0;
    }
    (last + 1 - visible).min(first)
}

/// Shorten to `max` characters, marking the cut with `...`
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    if max <= 3 {
        return text.chars().take(max).collect();
    }
    let mut out: String = text.chars().take(max - 3).collect();
    out.push_str("...");
    out
}

fn wrap(text: &str, width: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let width = width.max(10);
    text.lines()
        .flat_map(|line| {
            let chars: Vec<char> = line.chars().collect();
            if chars.is_empty() {
                return vec![String::new()];
            }
            chars
                .chunks(width)
                .map(|chunk| chunk.iter().collect())
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Selectors;
    use crate::output::StartOptions;
    use crate::protocol::{EventKind, ProtocolEvent};
    use crate::tui::messages::Message;
    use crate::tui::update::update;
    use ratatui::{backend::TestBackend, Terminal};

    fn screen(model: &mut DisplayModel, width: u16, height: u16) -> String {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
        terminal.draw(|frame| render(frame, model)).unwrap();

        let buffer = terminal.backend().buffer().clone();
        let mut out = String::new();
        for y in 0..height {
            for x in 0..width {
                out.push_str(buffer[(x, y)].symbol());
            }
            out.push('\n');
        }
        out
    }

    fn model(workers: usize) -> DisplayModel {
        let mut model = DisplayModel::new(&StartOptions {
            test_count: workers * 2,
            worker_count: workers,
            selectors: Selectors {
                group: Some("slow".into()),
                ..Default::default()
            },
        });
        for worker_id in 0..workers {
            update(
                &mut model,
                Message::WorkerStarted {
                    worker_id,
                    test_count: 2,
                },
            );
        }
        model
    }

    fn event(model: &mut DisplayModel, worker_id: usize, kind: EventKind) {
        update(model, Message::Protocol(ProtocolEvent { worker_id, kind }));
    }

    #[test]
    fn test_running_screen() {
        let mut m = model(2);
        event(
            &mut m,
            0,
            EventKind::TestStarted {
                key: "testAdd".into(),
                display_name: "testAdd".into(),
            },
        );

        let out = screen(&mut m, 100, 30);
        assert!(out.contains("PHPUnit Parallel - Running"));
        assert!(out.contains("--group slow"));
        assert!(out.contains("Overall: 4 test files"));
        assert!(out.contains("Running (1)"));
        assert!(out.contains("testAdd"));
        assert!(out.contains("Worker 0: 2 files"));
        assert!(out.contains("No errors"));
        assert!(out.contains("[Ctrl+C] Cancel"));
    }

    #[test]
    fn test_complete_screen_with_failure() {
        let mut m = model(1);
        event(&mut m, 0, EventKind::CountReported { count: 2 });
        event(
            &mut m,
            0,
            EventKind::TestFailed {
                key: "testDivide".into(),
                message: "Division by zero".into(),
                details: "/app/tests/MathTest.php:30".into(),
            },
        );
        event(&mut m, 0, EventKind::TestFinished { key: "testOk".into() });
        update(&mut m, Message::Finish);
        update(
            &mut m,
            Message::Key(crossterm::event::KeyEvent::new(
                crossterm::event::KeyCode::Enter,
                crossterm::event::KeyModifiers::NONE,
            )),
        );

        let out = screen(&mut m, 100, 30);
        assert!(out.contains("Complete - FAILED"));
        assert!(out.contains("Overall: 2/2 (100%) 1 failed"));
        assert!(out.contains("Completed in"));
        assert!(out.contains("Errors (1)"));
        assert!(out.contains("▼ testDivide"));
        assert!(out.contains("Division by zero"));
        assert!(out.contains("/app/tests/MathTest.php:30"));
        assert!(out.contains("FAILED"));
        assert!(out.contains("[q] Quit"));
    }

    #[test]
    fn test_workers_are_paged() {
        let mut m = model(12);
        let out = screen(&mut m, 80, 24);
        assert!(out.contains("Page 1/"));
        assert!(m.worker_pages > 1);

        m.worker_page = 99;
        let out = screen(&mut m, 80, 24);
        assert!(out.contains(&format!("Page {}/{}", m.worker_pages, m.worker_pages)));
        assert_eq!(m.worker_page, m.worker_pages - 1);
    }

    #[test]
    fn test_running_cursor_follows_shrinking_list() {
        let mut m = model(1);
        for i in 0..20 {
            let name = format!("t{i}");
            event(
                &mut m,
                0,
                EventKind::TestStarted {
                    key: name.clone(),
                    display_name: name,
                },
            );
        }
        m.panel = Panel::Running;
        m.running_cursor = 19;

        for i in 0..17 {
            event(&mut m, 0, EventKind::TestFinished { key: format!("t{i}") });
        }

        let out = screen(&mut m, 100, 30);
        assert!(out.contains("Running (3)"));
        assert!(out.contains("t17"));
        assert!(out.contains("t19"));
        assert_eq!(m.running_cursor, 2);
    }

    #[test]
    fn test_notice_replaces_help() {
        let mut m = model(1);
        m.notice = Some(crate::tui::model::Notice {
            id: 1,
            text: "Copied to clipboard!".into(),
        });
        let out = screen(&mut m, 80, 24);
        assert!(out.contains("Copied to clipboard!"));
        assert!(!out.contains("[Tab] Panel"));
    }

    #[test]
    fn test_progress_bar_widths() {
        let text = |line: Line| -> String { line.spans.iter().map(|s| s.content.as_ref()).collect() };

        assert_eq!(text(progress_bar(0, 0, 0, 10, false)), "[░░░░░░░░░░]");
        assert_eq!(text(progress_bar(5, 0, 10, 10, false)), "[█████░░░░░]");
        assert_eq!(text(progress_bar(10, 10, 10, 10, false)), "[██████████]");

        let bar = progress_bar(1, 1, 100, 10, false);
        assert_eq!(bar.spans[2].content.chars().count(), 0);
    }

    #[test]
    fn test_scroll_offset() {
        assert_eq!(scroll_offset(2, 2, 10), 0);
        assert_eq!(scroll_offset(12, 12, 10), 3);
        assert_eq!(scroll_offset(12, 30, 10), 12);
    }

    #[test]
    fn test_truncate_and_wrap() {
        assert_eq!(truncate("testSomethingLong", 10), "testSom...");
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 2), "ab");
        assert_eq!(wrap("abcdefghijklmnop", 10), vec!["abcdefghij", "klmnop"]);
        assert!(wrap("", 10).is_empty());
    }
}
