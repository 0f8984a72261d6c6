//! The send pipeline end to end: live push to attached sessions, durable
//! notification records for everyone else, and the failure modes that must
//! not take a persisted message down with them.

mod common;

use std::sync::Arc;

use common::{
    attach_session, backend_with_sink, backend_with_users, drain_events, next_event,
    CollectingSink, FailingSink,
};
use matchday_chat::error::AppError;
use uuid::Uuid;

#[tokio::test]
async fn live_recipient_gets_the_full_message() {
    let (ana, ben) = (Uuid::new_v4(), Uuid::new_v4());
    let backend = backend_with_users(&[ana, ben]).await;
    let conversation = backend.conversations.create(ana, &[ben]).await.unwrap();
    let (_, mut ben_rx) = attach_session(&backend.registry, ben);

    let sent = backend
        .delivery
        .send(conversation.id, ana, "golazo!", None)
        .await
        .unwrap();

    let event = next_event(&mut ben_rx);
    assert_eq!(event["type"], "message.created");
    assert_eq!(event["conversation_id"], conversation.id.to_string());
    assert_eq!(event["user_id"], ana.to_string());
    assert_eq!(event["message"]["id"], sent.id.to_string());
    assert_eq!(event["message"]["content"], "golazo!");
    assert_eq!(event["message"]["seq"], 1);

    // Live delivery means no notification record.
    assert!(backend.sink.sent().is_empty());
}

#[tokio::test]
async fn absent_recipient_gets_a_notification_record() {
    let (ana, ben) = (Uuid::new_v4(), Uuid::new_v4());
    let backend = backend_with_users(&[ana, ben]).await;
    let conversation = backend.conversations.create(ana, &[ben]).await.unwrap();

    backend
        .delivery
        .send(conversation.id, ana, "kickoff moved to 7", None)
        .await
        .unwrap();

    let sent = backend.sink.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient_id, ben);
    assert_eq!(sent[0].actor_id, ana);
    assert_eq!(sent[0].conversation_id, conversation.id);
    assert_eq!(sent[0].preview, "kickoff moved to 7");
}

#[tokio::test]
async fn notification_preview_is_truncated() {
    let (ana, ben) = (Uuid::new_v4(), Uuid::new_v4());
    let backend = backend_with_users(&[ana, ben]).await;
    let conversation = backend.conversations.create(ana, &[ben]).await.unwrap();

    let essay = "a".repeat(300);
    backend
        .delivery
        .send(conversation.id, ana, &essay, None)
        .await
        .unwrap();

    let sent = backend.sink.sent();
    assert_eq!(sent[0].preview.chars().count(), 83);
    assert!(sent[0].preview.ends_with("..."));
}

#[tokio::test]
async fn sender_never_receives_their_own_message_event() {
    let (ana, ben) = (Uuid::new_v4(), Uuid::new_v4());
    let backend = backend_with_users(&[ana, ben]).await;
    let conversation = backend.conversations.create(ana, &[ben]).await.unwrap();
    let (_, mut ana_rx) = attach_session(&backend.registry, ana);

    backend
        .delivery
        .send(conversation.id, ana, "did you see that save", None)
        .await
        .unwrap();

    let events = drain_events(&mut ana_rx);
    assert!(events.iter().all(|e| e["type"] != "message.created"));
    // And the sender gets no notification either.
    assert!(backend.sink.sent().iter().all(|n| n.recipient_id != ana));
}

#[tokio::test]
async fn mixed_live_and_absent_recipients_in_a_group() {
    let (ana, ben, cleo) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let backend = backend_with_users(&[ana, ben, cleo]).await;
    let conversation = backend.conversations.create(ana, &[ben, cleo]).await.unwrap();
    let (_, mut ben_rx) = attach_session(&backend.registry, ben);

    backend
        .delivery
        .send(conversation.id, ana, "team photo after the game", None)
        .await
        .unwrap();

    // Ben was live and got the push.
    assert_eq!(next_event(&mut ben_rx)["type"], "message.created");
    // Cleo was not, so only Cleo gets a record.
    let sent = backend.sink.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient_id, cleo);
}

#[tokio::test]
async fn send_survives_a_failing_notifier() {
    let (ana, ben) = (Uuid::new_v4(), Uuid::new_v4());
    let backend = backend_with_sink(
        &[ana, ben],
        Arc::new(FailingSink),
        CollectingSink::default(),
    )
    .await;
    let conversation = backend.conversations.create(ana, &[ben]).await.unwrap();

    let sent = backend
        .delivery
        .send(conversation.id, ana, "this still goes through", None)
        .await
        .unwrap();
    assert_eq!(sent.seq, 1);

    let history = backend.messages.list(conversation.id, ana, None).await.unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn reply_carries_its_snapshot_into_the_live_event() {
    let (ana, ben) = (Uuid::new_v4(), Uuid::new_v4());
    let backend = backend_with_users(&[ana, ben]).await;
    let conversation = backend.conversations.create(ana, &[ben]).await.unwrap();

    let original = backend
        .delivery
        .send(conversation.id, ana, "who has the pump?", None)
        .await
        .unwrap();

    let (_, mut ana_rx) = attach_session(&backend.registry, ana);
    backend
        .delivery
        .send(conversation.id, ben, "in my bag", Some(original.id))
        .await
        .unwrap();

    let event = next_event(&mut ana_rx);
    assert_eq!(event["type"], "message.created");
    let snapshot = &event["message"]["reply_to"];
    assert_eq!(snapshot["message_id"], original.id.to_string());
    assert_eq!(snapshot["sender_label"], "player0");
    assert_eq!(snapshot["content"], "who has the pump?");
}

#[tokio::test]
async fn reply_to_a_deleted_message_snapshots_the_marker() {
    let (ana, ben) = (Uuid::new_v4(), Uuid::new_v4());
    let backend = backend_with_users(&[ana, ben]).await;
    let conversation = backend.conversations.create(ana, &[ben]).await.unwrap();

    let original = backend
        .delivery
        .send(conversation.id, ana, "ignore this", None)
        .await
        .unwrap();
    backend.reactions.delete(original.id, ana).await.unwrap();

    let reply = backend
        .delivery
        .send(conversation.id, ben, "too late, seen it", Some(original.id))
        .await
        .unwrap();
    assert_eq!(reply.reply_to.unwrap().content, "[deleted]");
}

#[tokio::test]
async fn cross_conversation_reply_is_rejected_without_side_effects() {
    let (ana, ben, cleo) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let backend = backend_with_users(&[ana, ben, cleo]).await;
    let with_ben = backend.conversations.create(ana, &[ben]).await.unwrap();
    let with_cleo = backend.conversations.create(ana, &[cleo]).await.unwrap();

    let elsewhere = backend
        .delivery
        .send(with_cleo.id, ana, "separate thread", None)
        .await
        .unwrap();

    let (_, mut ben_rx) = attach_session(&backend.registry, ben);
    let err = backend
        .delivery
        .send(with_ben.id, ana, "quoting across", Some(elsewhere.id))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::CrossConversationReply));
    assert!(backend.messages.list(with_ben.id, ana, None).await.unwrap().is_empty());
    assert!(drain_events(&mut ben_rx).is_empty());
}

#[tokio::test]
async fn blank_content_is_rejected_before_anything_happens() {
    let (ana, ben) = (Uuid::new_v4(), Uuid::new_v4());
    let backend = backend_with_users(&[ana, ben]).await;
    let conversation = backend.conversations.create(ana, &[ben]).await.unwrap();
    let (_, mut ben_rx) = attach_session(&backend.registry, ben);

    let err = backend
        .delivery
        .send(conversation.id, ana, "   ", None)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::BadRequest(_)));
    assert!(drain_events(&mut ben_rx).is_empty());
    assert!(backend.sink.sent().is_empty());
}

#[tokio::test]
async fn outsider_send_changes_nothing() {
    let (ana, ben) = (Uuid::new_v4(), Uuid::new_v4());
    let outsider = Uuid::new_v4();
    let backend = backend_with_users(&[ana, ben, outsider]).await;
    let conversation = backend.conversations.create(ana, &[ben]).await.unwrap();

    let err = backend
        .delivery
        .send(conversation.id, outsider, "let me in", None)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::NotParticipant));
    assert!(backend.messages.list(conversation.id, ana, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn displaced_session_stops_receiving() {
    let (ana, ben) = (Uuid::new_v4(), Uuid::new_v4());
    let backend = backend_with_users(&[ana, ben]).await;
    let conversation = backend.conversations.create(ana, &[ben]).await.unwrap();

    // Ben reconnects; the first session is displaced by the second.
    let (_, mut stale_rx) = attach_session(&backend.registry, ben);
    let (_, mut fresh_rx) = attach_session(&backend.registry, ben);

    backend
        .delivery
        .send(conversation.id, ana, "are you getting these?", None)
        .await
        .unwrap();

    assert_eq!(next_event(&mut fresh_rx)["type"], "message.created");
    // The stale channel was dropped on displacement: recv yields the
    // disconnect, not an event.
    assert!(drain_events(&mut stale_rx).is_empty());
    assert!(backend.sink.sent().is_empty());
}
