//! Message formatting for display on Discord.
//!
//! Handles placeholder substitution in bridge format strings, markdown
//! escaping of Telegram text and splitting of long messages.
//! Supports placeholders: %user, %message

use crate::bridge::{Bridge, DEFAULT_FORMAT};

/// Discord rejects messages longer than this many characters.
pub const DISCORD_MAX_MESSAGE_LENGTH: usize = 2000;

/// Largest file uploaded to Discord. Servers without boosts reject anything bigger.
pub const DISCORD_MAX_UPLOAD_BYTES: u32 = 10 * 1024 * 1024;

/// Message formatter that substitutes placeholders in format strings.
#[derive(Debug, Clone)]
pub struct MessageFormatter {
    format: String,
}

impl MessageFormatter {
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
        }
    }

    /// Formatter using a bridge's configured template.
    pub fn for_bridge(bridge: &Bridge) -> Self {
        Self::new(bridge.options.format.as_str())
    }

    /// Substitute `%user` and `%message`.
    pub fn format(&self, ctx: &FormatContext) -> String {
        self.format
            .replace("%user", &ctx.user)
            .replace("%message", &ctx.message)
    }
}

impl Default for MessageFormatter {
    fn default() -> Self {
        Self::new(DEFAULT_FORMAT)
    }
}

/// Context for message formatting.
#[derive(Debug, Clone, Default)]
pub struct FormatContext {
    /// The sender's name.
    pub user: String,
    /// The message content.
    pub message: String,
}

impl FormatContext {
    pub fn new(user: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            message: message.into(),
        }
    }
}

/// Render a relayed body for one bridge.
///
/// The author is only shown when the bridge sends usernames and the message
/// has one; otherwise the body goes out as is.
pub fn render(bridge: &Bridge, author: Option<&str>, body: &str) -> String {
    match author {
        Some(author) if bridge.options.send_usernames => {
            MessageFormatter::for_bridge(bridge).format(&FormatContext::new(author, body))
        }
        _ => body.to_string(),
    }
}

/// Escape Discord markdown special characters.
///
/// Applied to everything that comes from Telegram users so their names and
/// text render literally inside the bridge's own markup.
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '\\' | '`' | '*' | '_' | '~' | '|') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Split a message into chunks of at most `max_chars` characters.
///
/// Prefers breaking at a newline, then at a space, as long as the chunk stays
/// more than half full. Never splits in the middle of a multi-byte UTF-8
/// character. Always returns at least one chunk.
pub fn split_message(message: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut remaining = message;

    loop {
        // Byte offset of the first character past the limit
        let Some((limit, _)) = remaining.char_indices().nth(max_chars) else {
            break;
        };
        let window = &remaining[..limit];

        // Only break early when the chunk stays more than half full
        let keeps_half = |&i: &usize| i > limit / 2;
        let boundary = window
            .rfind('\n')
            .filter(keeps_half)
            .or_else(|| window.rfind(' ').filter(keeps_half));

        match boundary {
            Some(i) => {
                chunks.push(window[..i].to_string());
                // Drop the separator itself
                remaining = &remaining[i + 1..];
            }
            None => {
                chunks.push(window.to_string());
                remaining = &remaining[limit..];
            }
        }
    }

    if !remaining.is_empty() || chunks.is_empty() {
        chunks.push(remaining.to_string());
    }
    chunks
}

/// Cut a message down to `max_chars` characters, marking the cut with an ellipsis.
///
/// Never splits in the middle of a multi-byte UTF-8 character.
pub fn truncate(message: &str, max_chars: usize) -> String {
    if message.chars().count() <= max_chars {
        return message.to_string();
    }

    // Byte offset of the first character that no longer fits
    let end = message
        .char_indices()
        .nth(max_chars.saturating_sub(1))
        .map(|(i, _)| i)
        .unwrap_or(message.len());

    let mut truncated = message[..end].to_string();
    truncated.push('…');
    truncated
}
