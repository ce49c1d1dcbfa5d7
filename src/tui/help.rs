use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

fn key_line(key: &'static str, pad: usize, action: &'static str) -> Line<'static> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(key, Style::default().fg(Color::Magenta)),
        Span::raw(format!("{}{action}", " ".repeat(pad))),
    ])
}

pub fn draw_help(area: Rect, f: &mut Frame, model: &str) {
    let p = Paragraph::new(vec![
        Line::from("Keybinds:"),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("Ctrl-Q", Style::default().fg(Color::Magenta)),
            Span::raw(" / "),
            Span::styled("Ctrl-C", Style::default().fg(Color::Magenta)),
            Span::raw("  Quit (cancels running tasks)"),
        ]),
        key_line("Tab", 9, "Next page"),
        key_line("Shift-Tab", 3, "Previous page"),
        key_line("F1", 10, "Show this help"),
        Line::from(""),
        Line::from("On a page:"),
        key_line("Enter", 7, "Run (Translate / Summarize / Fetch and Summarize Video)"),
        key_line("Ctrl-N", 6, "Insert a newline"),
        key_line("Ctrl-U", 6, "Clear the input"),
        key_line("Ctrl-X", 6, "Cancel the running task"),
        key_line("Ctrl-Y", 6, "Copy the output to the clipboard"),
        key_line("Ctrl-S", 6, "Save the output to a text file"),
        key_line("←/→", 9, "Change target language (Translator)"),
        Line::from(""),
        Line::from("A cancel takes effect between steps; a request already sent to the"),
        Line::from("model or to YouTube finishes first."),
        Line::from(""),
        Line::from(vec![
            Span::raw("Model: "),
            Span::styled(model.to_string(), Style::default().fg(Color::Cyan)),
        ]),
    ])
    .wrap(Wrap { trim: false })
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}
