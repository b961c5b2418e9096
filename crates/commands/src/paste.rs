use async_trait::async_trait;

/// Out-of-band storage for text too long to send inline.
#[async_trait]
pub trait Paste: Send + Sync {
    /// Store `text` and return a short reference (usually a URL) to it.
    async fn paste(&self, text: &str) -> anyhow::Result<String>;
}

/// Shorten `text` to at most `max_chars` characters, marking the cut with an
/// ellipsis.
#[must_use]
pub fn cutoff(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    cut.push('…');
    cut
}
