use anyhow::{Result, anyhow};
use tokio::task::JoinHandle;
use unicode_width::UnicodeWidthStr;

use crate::audio::{self, AudioPlayer};
use crate::client::{ChatClient, ChatReply};
use crate::config::Config;

/// Shown in place of a reply when the request fails for any reason.
pub const CONNECTION_APOLOGY: &str = "抱歉，連線出了點問題 😣";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Bot,
}

pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,

    // Input box state
    pub input: String,
    pub cursor: usize, // char index into `input`

    // Chat log: appended to on send and on reply, never mutated or removed
    pub messages: Vec<ChatMessage>,
    pub reply_loading: bool,
    pub chat_scroll: u16,
    pub chat_height: u16, // inner chat area, updated during render
    pub chat_width: u16,

    // Animation state
    pub animation_frame: u8, // 0-2 for the typing-indicator ellipsis

    pub reply_task: Option<JoinHandle<Result<ChatReply>>>,

    pub client: ChatClient,
    pub audio: Option<AudioPlayer>,
    pub config: Config,
}

impl App {
    pub fn new(config: Config) -> Self {
        let client = ChatClient::new(&config.server_url());

        Self {
            should_quit: false,
            input_mode: InputMode::Editing,

            input: String::new(),
            cursor: 0,

            messages: Vec::new(),
            reply_loading: false,
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,

            animation_frame: 0,

            reply_task: None,

            client,
            audio: AudioPlayer::new(),
            config,
        }
    }

    /// True while one request is outstanding. Typing and sending are refused
    /// for the duration, which is what serializes requests.
    pub fn input_locked(&self) -> bool {
        self.reply_loading
    }

    /// Sends the current input box content. Whitespace-only input and an
    /// in-flight request are both quiet no-ops.
    pub fn send_message(&mut self) {
        if self.input_locked() {
            return;
        }
        let text = self.input.trim();
        if text.is_empty() {
            return;
        }
        let text = text.to_string();

        self.reply_loading = true;
        self.messages.push(ChatMessage {
            role: ChatRole::User,
            content: text.clone(),
        });
        self.input.clear();
        self.cursor = 0;
        self.scroll_chat_to_bottom();

        let client = self.client.clone();
        self.reply_task = Some(tokio::spawn(async move { client.send(&text).await }));
    }

    /// Reaps the in-flight request once it has finished. Called on every pass
    /// of the event loop; does nothing while the request is still running.
    pub async fn poll_reply(&mut self) {
        let done = self.reply_task.as_ref().is_some_and(|t| t.is_finished());
        if !done {
            return;
        }
        if let Some(task) = self.reply_task.take() {
            let result = match task.await {
                Ok(result) => result,
                Err(e) => Err(anyhow!("reply task aborted: {e}")),
            };
            self.finish_reply(result);
        }
    }

    /// Settles the session after a request: renders the outcome, then always
    /// unlocks the input and puts focus back in the input box.
    pub fn finish_reply(&mut self, result: Result<ChatReply>) {
        self.reply_loading = false;

        match result {
            Ok(reply) => {
                self.messages.push(ChatMessage {
                    role: ChatRole::Bot,
                    content: reply.response,
                });
                if let Some(payload) = reply.audio.as_deref() {
                    self.play_reply_audio(payload);
                }
            }
            Err(e) => {
                tracing::error!("chat request failed: {e:#}");
                self.messages.push(ChatMessage {
                    role: ChatRole::Bot,
                    content: CONNECTION_APOLOGY.to_string(),
                });
            }
        }

        self.input_mode = InputMode::Editing;
        self.scroll_chat_to_bottom();
    }

    /// A reply that cannot be heard is still a reply; failures here are
    /// logged and nothing more.
    fn play_reply_audio(&self, payload: &str) {
        let bytes = match audio::decode_payload(payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("bad audio in reply: {e:#}");
                return;
            }
        };

        match &self.audio {
            Some(player) => {
                if let Err(e) = player.play(bytes, self.config.volume()) {
                    tracing::warn!("audio playback failed: {e:#}");
                }
            }
            None => tracing::debug!("skipping reply audio: no output device"),
        }
    }

    pub fn last_bot_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::Bot)
            .map(|m| m.content.as_str())
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.reply_loading {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    /// Total rendered height of the chat log at the current wrap width,
    /// including role labels, blank separators, and the typing indicator.
    fn chat_total_lines(&self) -> u16 {
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;

        for msg in &self.messages {
            total_lines += 1; // role line
            for line in msg.content.lines() {
                // Display cells, not chars: wrapping breaks by rendered
                // width, and CJK glyphs occupy two cells each
                let cell_count = line.width();
                if cell_count == 0 {
                    total_lines += 1;
                } else {
                    total_lines += ((cell_count / wrap_width) + 1) as u16;
                }
            }
            total_lines += 1; // blank line after message
        }

        if self.reply_loading {
            total_lines += 2; // role line + "typing..."
        }

        total_lines
    }

    /// Scroll so the newest entry (or the typing indicator) is visible.
    pub fn scroll_chat_to_bottom(&mut self) {
        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };
        self.chat_scroll = self.chat_total_lines().saturating_sub(visible_height);
    }

    pub fn scroll_down(&mut self) {
        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };
        let max_scroll = self.chat_total_lines().saturating_sub(visible_height);
        self.chat_scroll = self.chat_scroll.saturating_add(1).min(max_scroll);
    }

    pub fn scroll_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    pub fn scroll_to_top(&mut self) {
        self.chat_scroll = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_app(server_url: &str) -> App {
        let mut config = Config::new();
        config.server_url = Some(server_url.to_string());
        App::new(config)
    }

    async fn settle(app: &mut App) {
        while app.reply_task.is_some() {
            app.poll_reply().await;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn whitespace_input_is_a_no_op() {
        let mut app = test_app("http://127.0.0.1:1");
        app.input = "   \n\t ".to_string();
        app.send_message();

        assert!(app.messages.is_empty());
        assert!(app.reply_task.is_none());
        assert!(!app.input_locked());
    }

    #[tokio::test]
    async fn send_locks_input_and_appends_user_message() {
        let mut app = test_app("http://127.0.0.1:1");
        app.input = "  Hello  ".to_string();
        app.cursor = app.input.chars().count();
        app.send_message();

        assert!(app.input_locked());
        assert_eq!(app.messages.len(), 1);
        assert_eq!(app.messages[0].role, ChatRole::User);
        assert_eq!(app.messages[0].content, "Hello");
        assert!(app.input.is_empty());
        assert_eq!(app.cursor, 0);
        assert!(app.reply_task.is_some());
    }

    #[tokio::test]
    async fn second_send_is_refused_while_in_flight() {
        let mut app = test_app("http://127.0.0.1:1");
        app.input = "first".to_string();
        app.send_message();

        app.input = "second".to_string();
        app.send_message();

        // Only the first made it into the log; the second stays in the box.
        assert_eq!(app.messages.len(), 1);
        assert_eq!(app.input, "second");
    }

    #[tokio::test]
    async fn happy_path_appends_user_then_bot() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "Hi there"})))
            .mount(&server)
            .await;

        let mut app = test_app(&server.uri());
        app.input = "Hello".to_string();
        app.send_message();
        settle(&mut app).await;

        assert!(!app.input_locked());
        assert_eq!(app.input_mode, InputMode::Editing);
        assert_eq!(app.messages.len(), 2);
        assert_eq!(app.messages[0].content, "Hello");
        assert_eq!(app.messages[1].role, ChatRole::Bot);
        assert_eq!(app.messages[1].content, "Hi there");
    }

    #[tokio::test]
    async fn reply_with_audio_still_appends_the_message() {
        let server = MockServer::start().await;
        // Not a playable MP3, but a valid base64 payload; the decode attempt
        // happens and the playback failure is swallowed.
        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"response": "Hi", "audio": "SGVsbG8="})),
            )
            .mount(&server)
            .await;

        let mut app = test_app(&server.uri());
        app.input = "Hello".to_string();
        app.send_message();
        settle(&mut app).await;

        assert_eq!(app.messages.len(), 2);
        assert_eq!(app.messages[1].content, "Hi");
        assert!(!app.input_locked());
    }

    #[tokio::test]
    async fn failed_request_settles_with_the_apology() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let mut app = test_app(&server.uri());
        app.input = "Hello".to_string();
        app.send_message();
        settle(&mut app).await;

        assert!(!app.input_locked());
        assert_eq!(app.input_mode, InputMode::Editing);
        assert_eq!(app.messages.len(), 2);
        assert_eq!(app.messages[1].role, ChatRole::Bot);
        assert_eq!(app.messages[1].content, CONNECTION_APOLOGY);
    }

    #[tokio::test]
    async fn refused_connection_settles_with_the_apology() {
        let mut app = test_app("http://127.0.0.1:1");
        app.input = "Hello".to_string();
        app.send_message();
        settle(&mut app).await;

        assert!(!app.input_locked());
        assert_eq!(app.messages.last().unwrap().content, CONNECTION_APOLOGY);
    }

    #[test]
    fn finish_reply_always_unlocks() {
        let mut app = test_app("http://127.0.0.1:1");
        app.reply_loading = true;
        app.input_mode = InputMode::Normal;

        app.finish_reply(Ok(ChatReply {
            response: "Hi".to_string(),
            audio: None,
        }));

        assert!(!app.input_locked());
        assert_eq!(app.input_mode, InputMode::Editing);
    }

    #[test]
    fn last_bot_message_skips_user_entries() {
        let mut app = test_app("http://127.0.0.1:1");
        app.messages.push(ChatMessage {
            role: ChatRole::Bot,
            content: "first".to_string(),
        });
        app.messages.push(ChatMessage {
            role: ChatRole::User,
            content: "question".to_string(),
        });
        assert_eq!(app.last_bot_message(), Some("first"));
    }

    #[test]
    fn appends_leave_the_log_scrolled_to_the_bottom() {
        let mut app = test_app("http://127.0.0.1:1");
        app.chat_height = 5;
        app.chat_width = 20;

        for i in 0..10 {
            app.messages.push(ChatMessage {
                role: ChatRole::Bot,
                content: format!("message {i}"),
            });
            app.scroll_chat_to_bottom();
        }

        // 10 messages * (label + one content line + blank) = 30 lines
        assert_eq!(app.chat_scroll, 30 - 5);
    }

    #[test]
    fn wide_glyphs_scroll_by_display_width() {
        let mut app = test_app("http://127.0.0.1:1");
        app.chat_height = 5;
        app.chat_width = 19;

        // 20 CJK glyphs span 40 display cells: three wrapped rows at width
        // 19, the same as 40 ASCII characters would take.
        app.messages.push(ChatMessage {
            role: ChatRole::Bot,
            content: "暖".repeat(20),
        });
        app.scroll_chat_to_bottom();
        // label + 3 wrapped rows + blank exactly fills the 5 visible rows
        assert_eq!(app.chat_scroll, 0);

        app.messages.push(ChatMessage {
            role: ChatRole::Bot,
            content: "好".repeat(20),
        });
        app.scroll_chat_to_bottom();
        assert_eq!(app.chat_scroll, 5);
    }

    #[test]
    fn animation_only_advances_while_loading() {
        let mut app = test_app("http://127.0.0.1:1");
        app.tick_animation();
        assert_eq!(app.animation_frame, 0);

        app.reply_loading = true;
        app.tick_animation();
        assert_eq!(app.animation_frame, 1);
        app.tick_animation();
        app.tick_animation();
        assert_eq!(app.animation_frame, 0);
    }
}
