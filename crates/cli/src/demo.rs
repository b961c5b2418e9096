//! Demo commands registered by the console harness.

use std::time::Duration;

use {
    futures::Stream,
    herald_channels::{Attachment, RichContent},
    herald_commands::{
        Command, CommandRegistry, Handler, InvocationContext, Output, OutputPart, Result,
    },
};

/// Most lines `count` will stream.
const MAX_COUNT: u32 = 10;

pub fn register_all(registry: &mut CommandRegistry) -> Result<()> {
    registry.register(
        Command::builder("ping", Handler::single(ping)).description("Replies with pong"),
    )?;
    registry.register(
        Command::builder("echo", Handler::single(echo))
            .alias("say")
            .description("Repeats the arguments with a delete button"),
    )?;
    registry.register(
        Command::builder("count", Handler::stream(count))
            .description("Counts to N, one message per second"),
    )?;
    registry.register(
        Command::builder("upload", Handler::single(upload))
            .description("Sends the arguments back as a file"),
    )?;
    registry.register(
        Command::builder("long", Handler::single(long))
            .no_cooldown()
            .description("Sends a message too long to fit inline"),
    )?;
    registry.register(
        Command::builder("info", Handler::single(info)).description("Shows invocation details"),
    )?;
    Ok(())
}

async fn ping(_ctx: InvocationContext) -> anyhow::Result<Output> {
    Ok(("pong", OutputPart::Reply).into())
}

async fn echo(ctx: InvocationContext) -> anyhow::Result<Output> {
    if ctx.args.is_empty() {
        anyhow::bail!("nothing to echo");
    }
    Ok((ctx.args, OutputPart::Deletable).into())
}

fn count(ctx: InvocationContext) -> impl Stream<Item = anyhow::Result<String>> {
    async_stream::try_stream! {
        let n = match ctx.args.trim() {
            "" => 3,
            raw => raw.parse::<u32>()?.min(MAX_COUNT),
        };
        for i in 1..=n {
            if i > 1 {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            yield format!("{i}/{n}");
        }
    }
}

async fn upload(ctx: InvocationContext) -> anyhow::Result<Output> {
    let body = if ctx.args.is_empty() {
        format!("invoked as {}", ctx.invoked_with)
    } else {
        ctx.args.clone()
    };
    Ok((
        "here is your file",
        Attachment::new("upload.txt", body.into_bytes()),
    )
        .into())
}

async fn long(ctx: InvocationContext) -> anyhow::Result<Output> {
    let word = if ctx.args.is_empty() { "lorem" } else { ctx.args.as_str() };
    let text = std::iter::repeat_n(word, 600).collect::<Vec<_>>().join(" ");
    Ok((text, OutputPart::SafeSend).into())
}

async fn info(ctx: InvocationContext) -> anyhow::Result<Output> {
    let rich = RichContent::titled(format!("!{}", ctx.invoked_with))
        .field("user", ctx.author().to_string(), true)
        .field("channel", ctx.channel().to_string(), true)
        .field("edited", ctx.trigger.edited.to_string(), true);
    Ok(Output::from(rich).with(OutputPart::Deletable))
}
