//! Console input lines.

use {anyhow::Context, herald_common::{MessageId, UserId}};

/// One parsed stdin line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// A new trigger message, optionally posted as another user.
    Message { author: Option<UserId>, content: String },
    /// `:edit <id> <text>` replaces the content of an earlier trigger.
    Edit { trigger: MessageId, content: String },
    /// `:delete <id>` deletes an earlier trigger.
    Delete { trigger: MessageId },
    Quit,
    Blank,
}

pub fn parse_line(line: &str) -> anyhow::Result<Input> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Ok(Input::Blank);
    }
    let Some(directive) = line.strip_prefix(':') else {
        return Ok(Input::Message {
            author: None,
            content: line.to_string(),
        });
    };

    let (verb, rest) = directive.split_once(' ').unwrap_or((directive, ""));
    match verb {
        "quit" | "q" => Ok(Input::Quit),
        "delete" => Ok(Input::Delete {
            trigger: parse_id(rest.trim())?,
        }),
        "edit" => {
            let (id, content) = rest.split_once(' ').context("usage: :edit <id> <text>")?;
            Ok(Input::Edit {
                trigger: parse_id(id)?,
                content: content.to_string(),
            })
        },
        "as" => {
            let (user, content) = rest.split_once(' ').context("usage: :as <user> <text>")?;
            Ok(Input::Message {
                author: Some(UserId(user.parse().context("user must be a number")?)),
                content: content.to_string(),
            })
        },
        other => anyhow::bail!("unknown directive :{other}"),
    }
}

fn parse_id(raw: &str) -> anyhow::Result<MessageId> {
    raw.parse::<u64>()
        .map(MessageId)
        .with_context(|| format!("invalid message id: {raw:?}"))
}
