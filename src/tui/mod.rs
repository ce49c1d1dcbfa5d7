mod export;
mod help;
mod state;

use crate::backend::Services;
use crate::engine::CancelOutcome;
use crate::model::{Feature, HubConfig};
use crate::orchestrator::{Hub, PageInput};
use anyhow::{Context, Result};
use crossterm::{
    event::{
        self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyCode, KeyEvent,
        KeyEventKind, KeyModifiers,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Tabs, Wrap},
    Terminal,
};
use state::{push_wrapped_status_kv, PageUi, UiState};
use std::{io, time::Duration, time::Instant};
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::{info, warn};

const HELP_TAB: usize = 3;
const TAB_COUNT: usize = 4;

pub async fn run(cfg: HubConfig, services: Services) -> Result<()> {
    // The hub and every page live on the UI thread; blocking terminal I/O and the
    // bounded shutdown wait stay out of the Tokio runtime.
    let ui_handle = std::thread::Builder::new()
        .name("tui".into())
        .spawn(move || run_threaded(cfg, services))
        .context("spawn TUI thread")?;

    match tokio::task::spawn_blocking(move || ui_handle.join()).await {
        Ok(Ok(res)) => res,
        Ok(Err(_)) => Err(anyhow::anyhow!("TUI thread panicked")),
        Err(e) => Err(anyhow::anyhow!("TUI join failed: {e}")),
    }
}

/// Run the TUI loop on a dedicated thread.
pub fn run_threaded(cfg: HubConfig, services: Services) -> Result<()> {
    let model = services.chat.model().to_string();
    let mut hub = Hub::new(services, cfg.event_capacity);
    let mut state = UiState::new(&model);

    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    let tick_rate = Duration::from_millis(100);
    let mut last_tick: Option<Instant> = None;

    loop {
        // Drain page events without blocking; each page's channel is bounded per run.
        for ev in hub.dispatch() {
            state
                .page_mut(ev.feature)
                .apply(ev.task_id, &ev.event, finished_stamp);
        }

        if last_tick.map_or(true, |t| t.elapsed() >= tick_rate) {
            let now = Instant::now();
            for feature in Feature::ALL {
                let busy = hub.page(feature).is_busy();
                state.page_mut(feature).tick(now, busy);
            }
            terminal.draw(|f| draw(f.area(), f, &state, &hub)).ok();
            last_tick = Some(now);
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            match event::read() {
                Ok(Event::Key(k)) if k.kind == KeyEventKind::Press => {
                    if handle_key(k, &mut state, &mut hub) {
                        break;
                    }
                }
                Ok(Event::Paste(text)) => {
                    if let Some(feature) = state.current_feature() {
                        state.page_mut(feature).input.push_str(&text);
                    }
                }
                _ => {}
            }
        }
    }

    if hub.any_busy() {
        state.info = "Shutting down: cancelling running tasks…".into();
        terminal.draw(|f| draw(f.area(), f, &state, &hub)).ok();
    }
    let reports = hub.shutdown(cfg.shutdown_timeout);
    for r in &reports {
        if r.outcome == CancelOutcome::Abandoned {
            warn!(page = %r.feature, task = r.task_id, "exiting with task still in flight");
        }
    }
    info!(tasks = reports.len(), "UI closed");

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, DisableBracketedPaste, LeaveAlternateScreen).ok();
    Ok(())
}

fn finished_stamp() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_default()
}

/// Apply one key press. Returns true when the UI should quit.
fn handle_key(k: KeyEvent, state: &mut UiState, hub: &mut Hub) -> bool {
    let ctrl = k.modifiers.contains(KeyModifiers::CONTROL);
    match k.code {
        KeyCode::Char('c') | KeyCode::Char('q') if ctrl => return true,
        KeyCode::Tab => state.tab = (state.tab + 1) % TAB_COUNT,
        KeyCode::BackTab => state.tab = (state.tab + TAB_COUNT - 1) % TAB_COUNT,
        KeyCode::F(1) => state.tab = HELP_TAB,
        _ => {}
    }
    let Some(feature) = state.current_feature() else {
        return false;
    };

    match k.code {
        KeyCode::Enter => submit(feature, state, hub),
        KeyCode::Char('x') if ctrl => {
            if hub.page(feature).request_cancel() {
                state.page_mut(feature).on_cancel_requested(Instant::now());
            } else {
                state.info = "Nothing to cancel.".into();
            }
        }
        KeyCode::Char('y') if ctrl => {
            let output = state.page(feature).output.clone();
            state.info = if output.trim().is_empty() {
                "No output to copy yet.".into()
            } else {
                match export::copy_to_clipboard(&output) {
                    Ok(()) => "✓ Copied output to clipboard".into(),
                    Err(e) => format!("Clipboard copy failed: {e:#}"),
                }
            };
        }
        KeyCode::Char('s') if ctrl => {
            let output = state.page(feature).output.clone();
            state.info = match export::export_output_here(feature, &output) {
                Ok(p) => format!("Saved: {}", p.display()),
                Err(e) => format!("Save failed: {e:#}"),
            };
        }
        KeyCode::Char('u') if ctrl => state.page_mut(feature).input.clear(),
        KeyCode::Char('n') if ctrl => {
            if feature != Feature::VideoSummarize {
                state.page_mut(feature).input.push('\n');
            }
        }
        KeyCode::Char(c) if !ctrl && !k.modifiers.contains(KeyModifiers::ALT) => {
            state.page_mut(feature).input.push(c);
        }
        KeyCode::Backspace => {
            state.page_mut(feature).input.pop();
        }
        KeyCode::Left if feature == Feature::Translate => state.page_mut(feature).cycle_target(false),
        KeyCode::Right if feature == Feature::Translate => state.page_mut(feature).cycle_target(true),
        _ => {}
    }
    false
}

fn submit(feature: Feature, state: &mut UiState, hub: &mut Hub) {
    let ui = state.page(feature);
    let input = match feature {
        Feature::Translate => PageInput::translation(ui.input.clone(), ui.target_label()),
        Feature::Summarize | Feature::VideoSummarize => PageInput::text(ui.input.clone()),
    };
    match hub.page_mut(feature).submit(input) {
        Ok(id) => state.page_mut(feature).on_submitted(id),
        Err(e) => state.page_mut(feature).on_rejected(&e),
    }
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState, hub: &Hub) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)].as_ref())
        .split(area);

    let mut titles: Vec<Line> = Feature::ALL
        .iter()
        .map(|&feature| {
            if hub.page(feature).is_busy() {
                Line::from(format!("{feature} •"))
            } else {
                Line::from(feature.to_string())
            }
        })
        .collect();
    titles.push(Line::from("Help"));

    let tabs = Tabs::new(titles)
        .select(state.tab)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("llm-hub (model: {})", state.model)),
        )
        .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    match state.current_feature() {
        Some(feature) => draw_page(chunks[1], f, state, hub, feature),
        None => help::draw_help(chunks[1], f, &state.model),
    }
}

fn draw_page(area: Rect, f: &mut ratatui::Frame, state: &UiState, hub: &Hub, feature: Feature) {
    let ui = state.page(feature);
    let page = hub.page(feature);

    let mut constraints = Vec::new();
    if feature == Feature::VideoSummarize {
        constraints.push(Constraint::Length(4)); // rate-limit warning
    }
    if feature == Feature::Translate {
        constraints.push(Constraint::Length(3)); // target + detected language
    }
    constraints.push(match feature {
        Feature::VideoSummarize => Constraint::Length(3),
        _ => Constraint::Percentage(35),
    });
    constraints.push(Constraint::Min(5));
    constraints.push(Constraint::Length(5));
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(area);
    let mut row = rows.iter().copied();
    let mut next = || row.next().unwrap_or_default();

    if feature == Feature::VideoSummarize {
        let warning = Paragraph::new(
            "⚠ Warning: fetching transcripts relies on an external API (YouTube). \
             Avoid sending rapid, repeated requests to prevent temporary rate limits.",
        )
        .style(Style::default().fg(Color::Yellow))
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL));
        f.render_widget(warning, next());
    }

    if feature == Feature::Translate {
        draw_language_row(next(), f, ui);
    }

    let action_style = if page.affordance_enabled() {
        Style::default().fg(Color::Green)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let input_block = Block::default().borders(Borders::ALL).title(Line::from(vec![
        Span::raw("Input "),
        Span::styled(format!("[Enter] {}", feature.action_label()), action_style),
    ]));
    let input = if ui.input.is_empty() {
        Paragraph::new(placeholder(feature)).style(Style::default().fg(Color::DarkGray))
    } else {
        Paragraph::new(format!("{}▏", ui.input))
    };
    f.render_widget(input.wrap(Wrap { trim: false }).block(input_block), next());

    let output_title = match feature {
        Feature::Translate => "Translation",
        Feature::Summarize => "Summary",
        Feature::VideoSummarize => "Video Summary",
    };
    let output = if ui.output.is_empty() {
        Paragraph::new(output_placeholder(feature)).style(Style::default().fg(Color::DarkGray))
    } else {
        Paragraph::new(ui.output.as_str())
    };
    f.render_widget(
        output
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title(output_title)),
        next(),
    );

    let status_area = next();
    let mut lines = Vec::new();
    let status = if page.is_busy() {
        format!("{} ({:?})", ui.status, page.status())
    } else {
        ui.status.clone()
    };
    push_wrapped_status_kv(&mut lines, "Status", &status, status_area.width);
    if let Some(at) = ui.finished_at.as_deref() {
        push_wrapped_status_kv(&mut lines, "Finished", at, status_area.width);
    }
    push_wrapped_status_kv(&mut lines, "Info", &state.info, status_area.width);
    let status = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Status (Ctrl-X cancel · Ctrl-Y copy · F1 help)"),
    );
    f.render_widget(status, status_area);
}

fn draw_language_row(area: Rect, f: &mut ratatui::Frame, ui: &PageUi) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)].as_ref())
        .split(area);

    let target = Paragraph::new(Line::from(vec![
        Span::raw("◀ "),
        Span::styled(
            ui.target_label(),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw(" ▶"),
    ]))
    .block(Block::default().borders(Borders::ALL).title("Target language (←/→)"));
    f.render_widget(target, cols[0]);

    let detected = Paragraph::new(Span::styled(
        ui.detected.clone().unwrap_or_else(|| "-".into()),
        Style::default().add_modifier(Modifier::BOLD),
    ))
    .block(Block::default().borders(Borders::ALL).title("Language detected"));
    f.render_widget(detected, cols[1]);
}

fn placeholder(feature: Feature) -> &'static str {
    match feature {
        Feature::Translate => "Type or paste the text to translate...",
        Feature::Summarize => "Paste the text to summarize...",
        Feature::VideoSummarize => "Paste video URL (e.g., YouTube) here...",
    }
}

fn output_placeholder(feature: Feature) -> &'static str {
    match feature {
        Feature::Translate => "The translation will appear here.",
        Feature::Summarize => "The summary will appear here.",
        Feature::VideoSummarize => "Summary of the video content will appear here.",
    }
}
