//! Stdout-backed transport for the console harness.

use std::{
    collections::HashSet,
    path::PathBuf,
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
};

use {
    async_trait::async_trait,
    herald_channels::{Error, OutgoingMessage, Result, Transport},
    herald_commands::Paste,
    herald_common::{ChannelId, MessageId},
};

/// Bot message ids start here so they never collide with trigger ids.
const FIRST_BOT_MESSAGE: u64 = 1_000_000;

/// Prints every send, edit and delete. Tracks which bot messages still
/// exist so deletes of vanished messages report `NotFound`.
pub struct ConsoleTransport {
    next_id: AtomicU64,
    live: Mutex<HashSet<MessageId>>,
}

impl ConsoleTransport {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(FIRST_BOT_MESSAGE),
            live: Mutex::new(HashSet::new()),
        }
    }

    fn live(&self) -> MutexGuard<'_, HashSet<MessageId>> {
        self.live.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// One-line rendering of an outgoing message.
pub fn render(message: &OutgoingMessage) -> String {
    let mut out = Vec::new();
    if let Some(reference) = message.reference {
        out.push(format!("(reply to {reference})"));
    }
    if let Some(content) = &message.content {
        out.push(content.clone());
    }
    if let Some(rich) = &message.rich_content {
        let title = rich.title.as_deref().unwrap_or_default();
        out.push(format!("[rich: {title}]"));
    }
    if let Some(attachment) = &message.attachment {
        out.push(format!(
            "[file: {} ({} bytes)]",
            attachment.filename,
            attachment.data.len()
        ));
    }
    if let Some(owner) = message.delete_owner() {
        out.push(format!("[delete: {owner}]"));
    }
    out.join(" ")
}

#[async_trait]
impl Transport for ConsoleTransport {
    async fn send_message(&self, channel: ChannelId, message: &OutgoingMessage) -> Result<MessageId> {
        let id = MessageId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.live().insert(id);
        println!("#{channel} <{id}> {}", render(message));
        Ok(id)
    }

    async fn edit_message(
        &self,
        channel: ChannelId,
        message_id: MessageId,
        message: &OutgoingMessage,
    ) -> Result<()> {
        if !self.live().contains(&message_id) {
            return Err(Error::not_found(format!("message {message_id}")));
        }
        println!("#{channel} <{message_id}> (edited) {}", render(message));
        Ok(())
    }

    async fn delete_messages(&self, channel: ChannelId, message_ids: &[MessageId]) -> Result<()> {
        let mut live = self.live();
        if let Some(missing) = message_ids.iter().find(|id| !live.contains(id)) {
            return Err(Error::not_found(format!("message {missing}")));
        }
        for id in message_ids {
            live.remove(id);
        }
        drop(live);
        let ids: Vec<String> = message_ids.iter().map(ToString::to_string).collect();
        println!("#{channel} deleted {}", ids.join(", "));
        Ok(())
    }

    async fn delete_message(&self, channel: ChannelId, message_id: MessageId) -> Result<()> {
        if !self.live().remove(&message_id) {
            return Err(Error::not_found(format!("message {message_id}")));
        }
        println!("#{channel} deleted {message_id}");
        Ok(())
    }
}

/// Writes long content to files under the system temp dir.
pub struct FilePaste {
    dir: PathBuf,
    next: AtomicU64,
}

impl FilePaste {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            next: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl Paste for FilePaste {
    async fn paste(&self, text: &str) -> anyhow::Result<String> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        let path = self
            .dir
            .join(format!("paste-{}-{n}.txt", std::process::id()));
        tokio::fs::write(&path, text).await?;
        Ok(format!("file://{}", path.display()))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, herald_channels::Attachment, herald_common::UserId};

    #[tokio::test]
    async fn deleting_twice_reports_not_found() {
        let transport = ConsoleTransport::new();
        let id = transport
            .send_message(ChannelId(1), &OutgoingMessage::text("hi"))
            .await
            .unwrap();
        transport.delete_message(ChannelId(1), id).await.unwrap();
        let err = transport.delete_message(ChannelId(1), id).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(
            transport
                .edit_message(ChannelId(1), id, &OutgoingMessage::text("again"))
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[test]
    fn render_shows_reference_attachment_and_owner() {
        let message = OutgoingMessage {
            content: Some("hello".into()),
            attachment: Some(Attachment::new("a.txt", b"abc".to_vec())),
            reference: Some(MessageId(4)),
            components: vec![herald_channels::Component::DeleteButton { owner: UserId(9) }],
            ..Default::default()
        };
        assert_eq!(
            render(&message),
            "(reply to 4) hello [file: a.txt (3 bytes)] [delete: 9]"
        );
    }

    #[tokio::test]
    async fn file_paste_writes_content() {
        let dir = std::env::temp_dir().join(format!("herald-paste-test-{}", std::process::id()));
        let paste = FilePaste::new(dir.clone());
        let url = paste.paste("long text").await.unwrap();
        let path = url.strip_prefix("file://").unwrap();
        assert_eq!(tokio::fs::read_to_string(path).await.unwrap(), "long text");
        tokio::fs::remove_dir_all(dir).await.unwrap();
    }
}
