use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use unicode_width::UnicodeWidthChar;

use crate::app::{App, ChatRole, InputMode};

/// Parse a line of text and convert **bold** markdown to styled spans.
/// Only used when the config opts in; the default is literal text.
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.char_indices().peekable();
    let mut current_text = String::new();

    while let Some((_, c)) = chars.next() {
        if c == '*' {
            // Check for ** (bold)
            if chars.peek().map(|(_, c)| *c) == Some('*') {
                chars.next();

                if !current_text.is_empty() {
                    spans.push(Span::raw(std::mem::take(&mut current_text)));
                }

                // Find closing **
                let mut bold_text = String::new();
                let mut found_close = false;

                while let Some((_, c)) = chars.next() {
                    if c == '*' && chars.peek().map(|(_, c)| *c) == Some('*') {
                        chars.next();
                        found_close = true;
                        break;
                    }
                    bold_text.push(c);
                }

                if found_close && !bold_text.is_empty() {
                    spans.push(Span::styled(
                        bold_text,
                        Style::default().add_modifier(Modifier::BOLD),
                    ));
                } else {
                    // No closing **, treat as literal
                    current_text.push_str("**");
                    current_text.push_str(&bold_text);
                }
            } else {
                current_text.push(c);
            }
        } else {
            current_text.push(c);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, chat log, input box, footer
    let [header_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_chat(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(
            format!(" {} ", app.config.bot_name()),
            Style::default().fg(Color::Cyan).bold(),
        ),
        Span::styled(
            app.client.base_url().to_string(),
            Style::default().fg(Color::DarkGray),
        ),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    // Store chat area dimensions for scroll calculations (inner size minus borders)
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Chat ");

    let chat_text = if app.messages.is_empty() && !app.reply_loading {
        Text::from(Span::styled(
            "Say something to start the conversation...",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let mut lines: Vec<Line> = Vec::new();

        for msg in &app.messages {
            match msg.role {
                ChatRole::User => {
                    lines.push(Line::from(Span::styled(
                        "You:",
                        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                    )));
                    for line in msg.content.lines() {
                        lines.push(Line::from(line.to_string()));
                    }
                    lines.push(Line::default());
                }
                ChatRole::Bot => {
                    lines.push(Line::from(Span::styled(
                        format!("{}:", app.config.bot_name()),
                        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                    )));
                    // Newlines become line breaks; everything else is shown
                    // literally unless markdown styling was opted into.
                    for line in msg.content.lines() {
                        if app.config.render_markdown() {
                            lines.push(parse_markdown_line(line));
                        } else {
                            lines.push(Line::from(line.to_string()));
                        }
                    }
                    lines.push(Line::default());
                }
            }
        }

        if app.reply_loading {
            lines.push(Line::from(Span::styled(
                format!("{}:", app.config.bot_name()),
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )));
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("typing{}", dots),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )));
        }

        Text::from(lines)
    };

    let chat = Paragraph::new(chat_text)
        .block(chat_block)
        .wrap(Wrap { trim: true })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let (border_color, title) = if app.input_locked() {
        (Color::DarkGray, " Message (waiting for reply...) ")
    } else if app.input_mode == InputMode::Editing {
        (Color::Yellow, " Message (Enter to send) ")
    } else {
        (Color::DarkGray, " Message (i to type) ")
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Window the input onto the inner width (total minus borders), measured
    // in display cells so wide glyphs scroll and position correctly
    let inner_width = area.width.saturating_sub(2) as usize;
    let (visible_text, cursor_x) = input_window(&app.input, app.cursor, inner_width);

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);

    frame.render_widget(input, area);

    // Show cursor when the box is editable
    if app.input_mode == InputMode::Editing && !app.input_locked() {
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

/// Horizontal scrolling for the one-line input box. Returns the slice of
/// `input` that fits in `inner_width` display cells with the cursor in view,
/// and the cursor's column within that window. `cursor` is a char index.
fn input_window(input: &str, cursor: usize, inner_width: usize) -> (String, u16) {
    if inner_width == 0 {
        return (String::new(), 0);
    }

    // Cursor position in display cells; a CJK glyph occupies two
    let cursor_col: usize = input
        .chars()
        .take(cursor)
        .map(|c| c.width().unwrap_or(0))
        .sum();

    let scroll_offset = if cursor_col >= inner_width {
        cursor_col - inner_width + 1
    } else {
        0
    };

    let mut visible = String::new();
    let mut col = 0usize;
    for c in input.chars() {
        let w = c.width().unwrap_or(0);
        if col < scroll_offset {
            col += w;
            continue;
        }
        if col + w > scroll_offset + inner_width {
            break;
        }
        visible.push(c);
        col += w;
    }

    let cursor_x = (cursor_col - scroll_offset).min(inner_width - 1) as u16;
    (visible, cursor_x)
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints = if app.input_locked() {
        vec![
            Span::styled(" Esc ", key_style),
            Span::styled(" scroll ", label_style),
            Span::styled(" Ctrl+C ", key_style),
            Span::styled(" quit ", label_style),
        ]
    } else if app.input_mode == InputMode::Editing {
        vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" send ", label_style),
            Span::styled(" Shift+Enter ", key_style),
            Span::styled(" newline ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" scroll ", label_style),
        ]
    } else {
        vec![
            Span::styled(" j/k ", key_style),
            Span::styled(" scroll ", label_style),
            Span::styled(" s ", key_style),
            Span::styled(" speak reply ", label_style),
            Span::styled(" i ", key_style),
            Span::styled(" message ", label_style),
            Span::styled(" q ", key_style),
            Span::styled(" quit ", label_style),
        ]
    };

    let footer = Paragraph::new(Line::from(hints));
    frame.render_widget(footer, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ChatMessage;
    use crate::config::Config;
    use ratatui::{backend::TestBackend, Terminal};

    fn test_app() -> App {
        let mut config = Config::new();
        config.server_url = Some("http://127.0.0.1:1".to_string());
        config.bot_name = Some("Bot".to_string());
        App::new(config)
    }

    fn draw(app: &mut App, width: u16, height: u16) -> Vec<String> {
        let backend = TestBackend::new(width, height);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal.draw(|frame| render(app, frame)).unwrap();

        let buffer = terminal.backend().buffer().clone();
        (0..height)
            .map(|y| {
                (0..width)
                    .map(|x| buffer[(x, y)].symbol().to_string())
                    .collect::<String>()
            })
            .collect()
    }

    #[test]
    fn newlines_render_as_line_breaks() {
        let mut app = test_app();
        app.messages.push(ChatMessage {
            role: ChatRole::Bot,
            content: "Line1\nLine2".to_string(),
        });

        let rows = draw(&mut app, 40, 12);

        let line1_row = rows.iter().position(|r| r.contains("Line1")).unwrap();
        let line2_row = rows.iter().position(|r| r.contains("Line2")).unwrap();
        assert_eq!(line2_row, line1_row + 1);
        assert!(!rows.iter().any(|r| r.contains("\\n")));
    }

    #[test]
    fn markup_is_shown_literally_by_default() {
        let mut app = test_app();
        app.messages.push(ChatMessage {
            role: ChatRole::Bot,
            content: "**hi** <b>there</b>".to_string(),
        });

        let rows = draw(&mut app, 40, 12);
        assert!(rows.iter().any(|r| r.contains("**hi** <b>there</b>")));
    }

    #[test]
    fn typing_indicator_appears_while_loading() {
        let mut app = test_app();
        app.reply_loading = true;
        app.animation_frame = 2;

        let rows = draw(&mut app, 40, 12);
        assert!(rows.iter().any(|r| r.contains("typing...")));
    }

    #[test]
    fn log_follows_the_latest_entry() {
        let mut app = test_app();
        // First draw records the real chat dimensions
        draw(&mut app, 40, 12);

        for i in 0..20 {
            app.messages.push(ChatMessage {
                role: ChatRole::User,
                content: format!("note number {i}"),
            });
            app.scroll_chat_to_bottom();
        }

        let rows = draw(&mut app, 40, 12);
        assert!(rows.iter().any(|r| r.contains("note number 19")));
        assert!(!rows.iter().any(|r| r.contains("note number 0 ")));
    }

    #[test]
    fn cjk_log_follows_the_latest_entry() {
        let mut app = test_app();
        // First draw records the real chat dimensions
        draw(&mut app, 40, 12);

        // A long unbroken CJK reply wraps into twice as many rows as its
        // char count suggests; the newest entry must still end up on screen.
        app.messages.push(ChatMessage {
            role: ChatRole::Bot,
            content: "暖".repeat(300),
        });
        app.scroll_chat_to_bottom();
        app.messages.push(ChatMessage {
            role: ChatRole::Bot,
            content: "最新訊息END".to_string(),
        });
        app.scroll_chat_to_bottom();

        let rows = draw(&mut app, 40, 12);
        assert!(rows.iter().any(|r| r.contains("END")));
    }

    #[test]
    fn markdown_opt_in_consumes_markers_and_bolds_the_text() {
        let mut app = test_app();
        app.config.render_markdown = Some(true);
        app.messages.push(ChatMessage {
            role: ChatRole::Bot,
            content: "**hi** there".to_string(),
        });

        let backend = TestBackend::new(40, 12);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal.draw(|frame| render(&mut app, frame)).unwrap();
        let buffer = terminal.backend().buffer().clone();

        // The ** markers are consumed, not rendered
        for y in 0..12u16 {
            for x in 0..40u16 {
                assert_ne!(buffer[(x, y)].symbol(), "*");
            }
        }

        // The text between the markers carries the bold modifier
        let mut found_bold = false;
        for y in 0..12u16 {
            for x in 0..38u16 {
                if buffer[(x, y)].symbol() == "h"
                    && buffer[(x + 1, y)].symbol() == "i"
                    && buffer[(x + 2, y)].symbol() == " "
                {
                    assert!(buffer[(x, y)].style().add_modifier.contains(Modifier::BOLD));
                    assert!(buffer[(x + 1, y)].style().add_modifier.contains(Modifier::BOLD));
                    found_bold = true;
                }
            }
        }
        assert!(found_bold);
    }

    #[test]
    fn input_window_passes_short_ascii_through() {
        let (visible, cursor_x) = input_window("hello", 2, 10);
        assert_eq!(visible, "hello");
        assert_eq!(cursor_x, 2);
    }

    #[test]
    fn input_window_counts_wide_glyphs_as_two_cells() {
        let (visible, cursor_x) = input_window("暖心", 2, 10);
        assert_eq!(visible, "暖心");
        assert_eq!(cursor_x, 4);
    }

    #[test]
    fn input_window_keeps_the_cursor_inside_a_wide_line() {
        // Ten CJK glyphs are 20 cells; with 8 cells of room the window slides
        // so the cursor column stays inside it.
        let input = "暖".repeat(10);
        let (visible, cursor_x) = input_window(&input, 10, 8);
        assert_eq!(visible, "暖暖暖");
        assert_eq!(cursor_x, 7);
    }
}
