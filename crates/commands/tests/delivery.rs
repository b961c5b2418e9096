//! Edited and deleted triggers against their recorded replies.
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod support;

use std::sync::Arc;

use {
    herald_channels::Attachment,
    herald_commands::{
        CascadeOutcome, Command, CommandRegistry, DeleteButtonPress, DeletePress, Delivered,
        DeliveryStore, Handler, InvocationContext, OutputPart,
    },
    herald_common::{MessageId, UserId},
};

use support::{CHANNEL, Call, Harness, config_without_cooldown, harness, trigger};

/// `!say a b c` replies with one message per word; `!file x` attaches a file.
fn commands() -> CommandRegistry {
    let say = Handler::stream(|ctx: InvocationContext| {
        async_stream::stream! {
            let words: Vec<String> = ctx.arg_list().map(str::to_string).collect();
            for word in words {
                tokio::task::yield_now().await;
                yield anyhow::Ok(word);
            }
        }
    });
    let echo = Handler::single(|ctx: InvocationContext| async move { anyhow::Ok(ctx.args) });
    let file = Handler::single(|ctx: InvocationContext| async move {
        anyhow::Ok((ctx.args, Attachment::new("out.txt", b"payload".to_vec())))
    });
    let bye = Handler::single(|_| async { anyhow::Ok(("bye", OutputPart::Deletable)) });

    let mut registry = CommandRegistry::new(&config_without_cooldown()).unwrap();
    for builder in [
        Command::builder("say", say).no_concurrency_limit(),
        Command::builder("echo", echo).no_concurrency_limit(),
        Command::builder("file", file),
        Command::builder("bye", bye),
    ] {
        registry.register(builder).unwrap();
    }
    registry
}

async fn dispatch(h: &Harness, trigger: herald_commands::Trigger) -> Vec<Delivered> {
    h.dispatcher
        .dispatch(trigger)
        .await
        .unwrap()
        .unwrap()
        .deliveries
}

// ── Edited triggers ──────────────────────────────────────────────────────────

#[tokio::test]
async fn edited_trigger_edits_single_reply_in_place() {
    let h = harness(commands());
    let mut t = trigger(1, 7, "!echo first");
    let [Delivered::Sent(m1)] = dispatch(&h, t.clone()).await[..] else {
        panic!("expected a send");
    };

    t.edit("!echo second");
    let deliveries = dispatch(&h, t).await;

    assert_eq!(deliveries, vec![Delivered::Edited(m1)]);
    assert_eq!(
        h.transport.message(m1).unwrap().content.as_deref(),
        Some("second")
    );
    assert_eq!(h.store.lookup(MessageId(1)).await.unwrap(), vec![m1]);
    assert_eq!(h.transport.sent_contents(), vec!["first"]);
}

#[tokio::test]
async fn edited_trigger_with_attachment_sends_and_appends() {
    let h = harness(commands());
    let mut t = trigger(1, 7, "!file one");
    let m1 = dispatch(&h, t.clone()).await[0].message_id();

    t.edit("!file two");
    let [Delivered::Sent(m2)] = dispatch(&h, t).await[..] else {
        panic!("attachments cannot be edited in, expected a send");
    };

    assert_ne!(m1, m2);
    assert_eq!(h.store.lookup(MessageId(1)).await.unwrap(), vec![m1, m2]);
    assert!(h.transport.is_live(m1));
}

#[tokio::test]
async fn edited_trigger_whose_reply_vanished_sends_a_new_one() {
    let h = harness(commands());
    let mut t = trigger(1, 7, "!echo first");
    let m1 = dispatch(&h, t.clone()).await[0].message_id();
    h.transport.vanish(m1);

    t.edit("!echo again");
    let [Delivered::Sent(m2)] = dispatch(&h, t).await[..] else {
        panic!("expected a fresh send");
    };

    assert_eq!(h.store.lookup(MessageId(1)).await.unwrap(), vec![m2]);
    assert!(
        h.transport
            .calls()
            .iter()
            .any(|call| matches!(call, Call::Edit(id, _) if *id == m1))
    );
}

#[tokio::test]
async fn edited_trigger_with_several_replies_appends() {
    let h = harness(commands());
    let mut t = trigger(1, 7, "!say a b");
    let first = dispatch(&h, t.clone()).await;
    assert_eq!(first.len(), 2);

    t.edit("!echo c");
    let [Delivered::Sent(m3)] = dispatch(&h, t).await[..] else {
        panic!("expected a send");
    };
    let mut expected: Vec<_> = first.iter().map(|d| d.message_id()).collect();
    expected.push(m3);
    assert_eq!(h.store.lookup(MessageId(1)).await.unwrap(), expected);
}

#[tokio::test]
async fn invocations_of_one_trigger_deliver_in_order() {
    let h = harness(commands());
    let original = trigger(1, 7, "!say A B C");
    let mut edited = original.clone();
    edited.edit("!say X Y Z");

    let first = {
        let dispatcher = Arc::clone(&h.dispatcher);
        tokio::spawn(async move { dispatcher.dispatch(original).await })
    };
    let second = {
        let dispatcher = Arc::clone(&h.dispatcher);
        tokio::spawn(async move { dispatcher.dispatch(edited).await })
    };
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    assert_eq!(h.transport.sent_contents(), vec!["A", "B", "C", "X", "Y", "Z"]);
    assert_eq!(h.store.lookup(MessageId(1)).await.unwrap().len(), 6);
}

// ── Deleted triggers ─────────────────────────────────────────────────────────

#[tokio::test]
async fn deleting_trigger_deletes_every_reply() {
    let h = harness(commands());
    let replies: Vec<_> = dispatch(&h, trigger(1, 7, "!say a b c"))
        .await
        .iter()
        .map(|d| d.message_id())
        .collect();

    let outcome = h.dispatcher.on_trigger_deleted(CHANNEL, MessageId(1)).await;

    assert_eq!(outcome, CascadeOutcome {
        deleted: 3,
        already_gone: 0,
        failed: 0
    });
    assert!(replies.iter().all(|id| !h.transport.is_live(*id)));
    assert!(h.transport.calls().contains(&Call::BulkDelete(replies)));
    assert!(h.store.lookup(MessageId(1)).await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_bulk_delete_falls_back_to_single_deletes() {
    let h = harness(commands());
    let replies: Vec<_> = dispatch(&h, trigger(1, 7, "!say a b c"))
        .await
        .iter()
        .map(|d| d.message_id())
        .collect();
    h.transport.fail_bulk_deletes();
    h.transport.vanish(replies[1]);

    let outcome = h.dispatcher.on_trigger_deleted(CHANNEL, MessageId(1)).await;

    assert_eq!(outcome, CascadeOutcome {
        deleted: 2,
        already_gone: 1,
        failed: 0
    });
    let singles = h
        .transport
        .calls()
        .into_iter()
        .filter(|call| matches!(call, Call::Delete(_)))
        .count();
    assert_eq!(singles, 3);
    assert!(h.store.lookup(MessageId(1)).await.unwrap().is_empty());
}

#[tokio::test]
async fn deleting_trigger_mid_send_removes_the_reply_that_landed() {
    let h = harness(commands());
    let gate = h.transport.hold_sends();

    let task = {
        let dispatcher = Arc::clone(&h.dispatcher);
        tokio::spawn(async move { dispatcher.dispatch(trigger(1, 7, "!echo hi")).await })
    };
    while !h
        .transport
        .calls()
        .iter()
        .any(|call| matches!(call, Call::Send(..)))
    {
        tokio::task::yield_now().await;
    }
    let [Call::Send(reply, _)] = h.transport.calls()[..] else {
        panic!("expected exactly one send");
    };

    let cascade = {
        let dispatcher = Arc::clone(&h.dispatcher);
        tokio::spawn(async move { dispatcher.on_trigger_deleted(CHANNEL, MessageId(1)).await })
    };
    tokio::task::yield_now().await;
    gate.notify_one();

    let outcome = cascade.await.unwrap();
    let _dispatched = task.await.unwrap();
    assert_eq!(outcome, CascadeOutcome {
        deleted: 1,
        already_gone: 0,
        failed: 0
    });
    assert!(!h.transport.is_live(reply));
    assert!(h.transport.calls().contains(&Call::Delete(reply)));
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn deleting_unknown_trigger_is_a_no_op() {
    let h = harness(commands());
    let outcome = h.dispatcher.on_trigger_deleted(CHANNEL, MessageId(99)).await;
    assert_eq!(outcome, CascadeOutcome::default());
    assert!(h.transport.calls().is_empty());
}

#[tokio::test]
async fn bulk_trigger_deletion_covers_every_trigger() {
    let h = harness(commands());
    dispatch(&h, trigger(1, 7, "!echo one")).await;
    dispatch(&h, trigger(2, 8, "!say two three")).await;

    let outcome = h
        .dispatcher
        .on_triggers_deleted(CHANNEL, &[MessageId(1), MessageId(2)])
        .await;

    assert_eq!(outcome.deleted, 3);
    assert!(h.store.is_empty());
}

// ── Delete affordance ────────────────────────────────────────────────────────

#[tokio::test]
async fn delete_button_only_works_for_its_owner() {
    let h = harness(commands());
    let reply = dispatch(&h, trigger(1, 7, "!bye")).await[0].message_id();
    let owner = h.transport.message(reply).unwrap().delete_owner().unwrap();
    assert_eq!(owner, UserId(7));

    let press = |presser| DeleteButtonPress {
        channel_id: CHANNEL,
        message_id: reply,
        owner,
        presser: UserId(presser),
        trigger_id: Some(MessageId(1)),
    };

    assert_eq!(
        h.dispatcher.on_delete_pressed(press(8)).await.unwrap(),
        DeletePress::NotOwner
    );
    assert!(h.transport.is_live(reply));

    assert_eq!(
        h.dispatcher.on_delete_pressed(press(7)).await.unwrap(),
        DeletePress::Deleted
    );
    assert!(!h.transport.is_live(reply));
    assert!(h.store.lookup(MessageId(1)).await.unwrap().is_empty());

    assert_eq!(
        h.dispatcher.on_delete_pressed(press(7)).await.unwrap(),
        DeletePress::AlreadyGone
    );
}
