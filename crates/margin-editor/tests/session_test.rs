//! Editor session behaviour on virtual time.

use std::sync::Arc;
use std::time::Duration;

use margin_core::{AppContext, ClientConfig, ClientEvent, DocumentId, Error, EventEnvelope, UserId};
use margin_editor::{
    Block, BlockKind, EditorHandle, EditorSession, EditorVariant, Format, Position, Range, SaveOutcome,
    SaveStatus,
};
use margin_gateway::{MemoryGateway, Operation};
use tokio::sync::broadcast;
use tokio::time::sleep;

fn context(gateway: &MemoryGateway) -> AppContext {
    let shared = Arc::new(gateway.clone());
    AppContext::new(
        shared.clone(),
        shared.clone(),
        shared.clone(),
        shared,
        ClientConfig::default(),
    )
}

fn drain(rx: &mut broadcast::Receiver<EventEnvelope>) -> Vec<ClientEvent> {
    let mut events = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        events.push(envelope.payload);
    }
    events
}

async fn mount(gateway: &MemoryGateway, content: &str) -> (AppContext, EditorHandle) {
    let user = UserId::from("u1");
    gateway.insert_document(&user, "d1", "Notes", content);
    let ctx = context(gateway);
    let handle = EditorSession::mount(&ctx, DocumentId::from("d1"), user, EditorVariant::Plain)
        .await
        .unwrap();
    (ctx, handle)
}

#[tokio::test(start_paused = true)]
async fn test_typing_saves_once_after_debounce() {
    let gateway = MemoryGateway::new();
    let (_ctx, editor) = mount(&gateway, "").await;

    editor.insert_text(Position::new(0, 0), "Hello").await.unwrap();
    assert_eq!(editor.status().await.unwrap(), SaveStatus::Pending);

    sleep(Duration::from_millis(400)).await;
    assert_eq!(gateway.call_count(Operation::SaveDocument), 0);

    sleep(Duration::from_millis(200)).await;
    assert_eq!(gateway.calls_to(Operation::SaveDocument), vec!["<p>Hello</p>"]);
    assert_eq!(editor.status().await.unwrap(), SaveStatus::Saved);
    assert_eq!(gateway.document_content("d1").unwrap(), "<p>Hello</p>");
}

#[tokio::test(start_paused = true)]
async fn test_edits_within_window_coalesce() {
    let gateway = MemoryGateway::new();
    let (_ctx, editor) = mount(&gateway, "").await;

    let cursor = editor.insert_text(Position::new(0, 0), "Hello").await.unwrap();
    sleep(Duration::from_millis(100)).await;
    editor.insert_text(cursor, "World").await.unwrap();
    sleep(Duration::from_millis(600)).await;

    assert_eq!(
        gateway.calls_to(Operation::SaveDocument),
        vec!["<p>HelloWorld</p>"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_edit_during_save_triggers_follow_up() {
    let gateway = MemoryGateway::new().with_latency(Duration::from_millis(200));
    let (_ctx, editor) = mount(&gateway, "").await;

    let cursor = editor.insert_text(Position::new(0, 0), "a").await.unwrap();
    // Save starts at 500ms and is in flight until 700ms.
    sleep(Duration::from_millis(600)).await;
    assert_eq!(editor.status().await.unwrap(), SaveStatus::Saving);
    editor.insert_text(cursor, "b").await.unwrap();

    sleep(Duration::from_millis(1000)).await;
    assert_eq!(
        gateway.calls_to(Operation::SaveDocument),
        vec!["<p>a</p>", "<p>ab</p>"]
    );
    assert_eq!(gateway.document_content("d1").unwrap(), "<p>ab</p>");
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_content_is_not_saved() {
    let gateway = MemoryGateway::new();
    let (_ctx, editor) = mount(&gateway, "<p>draft</p>").await;

    editor.insert_text(Position::new(0, 5), "x").await.unwrap();
    editor
        .delete_range(Range::new(Position::new(0, 5), Position::new(0, 6)))
        .await
        .unwrap();
    sleep(Duration::from_millis(600)).await;

    assert_eq!(gateway.call_count(Operation::SaveDocument), 0);
    assert_eq!(editor.status().await.unwrap(), SaveStatus::Saved);
}

#[tokio::test(start_paused = true)]
async fn test_save_failure_keeps_buffer_and_reports() {
    let gateway = MemoryGateway::new();
    let (ctx, editor) = mount(&gateway, "").await;
    let mut events = ctx.events.subscribe();
    gateway.fail(Operation::SaveDocument);

    editor.insert_text(Position::new(0, 0), "keep me").await.unwrap();
    sleep(Duration::from_millis(600)).await;

    assert_eq!(editor.plain_text().await.unwrap(), "keep me");
    assert_eq!(editor.status().await.unwrap(), SaveStatus::Unsaved);
    let failures: Vec<_> = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, ClientEvent::SaveFailed { .. }))
        .collect();
    assert_eq!(failures.len(), 1);

    gateway.recover(Operation::SaveDocument);
    assert_eq!(
        editor.flush().await.unwrap(),
        SaveOutcome::Saved { revision: 1 }
    );
    assert_eq!(gateway.document_content("d1").unwrap(), "<p>keep me</p>");
}

#[tokio::test(start_paused = true)]
async fn test_flush_skips_debounce() {
    let gateway = MemoryGateway::new();
    let (ctx, editor) = mount(&gateway, "<p>one</p>").await;
    let mut events = ctx.events.subscribe();

    editor.split_block(Position::new(0, 3)).await.unwrap();
    editor.insert_text(Position::new(1, 0), "two").await.unwrap();
    editor
        .apply(
            Range::new(Position::new(1, 0), Position::new(1, 3)),
            Format::Bold,
        )
        .await
        .unwrap();

    let outcome = editor.flush().await.unwrap();
    assert_eq!(outcome, SaveOutcome::Saved { revision: 1 });
    assert_eq!(
        gateway.calls_to(Operation::SaveDocument),
        vec!["<p>one</p><p><strong>two</strong></p>"]
    );
    assert!(drain(&mut events)
        .iter()
        .any(|e| matches!(e, ClientEvent::DocumentSaved { revision: Some(1), .. })));

    // Nothing new to save, and the cancelled timer does not fire later.
    assert_eq!(editor.flush().await.unwrap(), SaveOutcome::Unchanged);
    sleep(Duration::from_millis(600)).await;
    assert_eq!(gateway.call_count(Operation::SaveDocument), 1);
}

#[tokio::test(start_paused = true)]
async fn test_flush_waits_for_follow_up_save() {
    let gateway = MemoryGateway::new().with_latency(Duration::from_millis(200));
    let (_ctx, editor) = mount(&gateway, "").await;

    let cursor = editor.insert_text(Position::new(0, 0), "a").await.unwrap();
    let flushing = editor.clone();
    let flush = tokio::spawn(async move { flushing.flush().await });
    sleep(Duration::from_millis(50)).await;
    editor.insert_text(cursor, "b").await.unwrap();

    let outcome = flush.await.unwrap().unwrap();
    assert_eq!(outcome, SaveOutcome::Saved { revision: 2 });
    assert_eq!(
        gateway.calls_to(Operation::SaveDocument),
        vec!["<p>a</p>", "<p>ab</p>"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_mount_missing_document_fails() {
    let gateway = MemoryGateway::new();
    let ctx = context(&gateway);
    let mut events = ctx.events.subscribe();

    let result = EditorSession::mount(
        &ctx,
        DocumentId::from("nope"),
        UserId::from("u1"),
        EditorVariant::Plain,
    )
    .await;

    assert!(matches!(result, Err(Error::NotFound(_))));
    let events = drain(&mut events);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], ClientEvent::LoadFailed { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_malformed_content_degrades_to_plain_text() {
    let gateway = MemoryGateway::new();
    let user = UserId::from("u1");
    gateway.insert_document(&user, "d1", "Broken", "<p>a</em></p>");
    let ctx = context(&gateway);
    let mut events = ctx.events.subscribe();

    let editor = EditorSession::mount(&ctx, DocumentId::from("d1"), user, EditorVariant::Plain)
        .await
        .unwrap();

    assert_eq!(editor.plain_text().await.unwrap(), "<p>a</em></p>");
    let events = drain(&mut events);
    assert!(matches!(events[0], ClientEvent::ContentDegraded { .. }));
    assert!(matches!(
        events[1],
        ClientEvent::DocumentLoaded { degraded: true, .. }
    ));

    // Mounting alone never writes back.
    sleep(Duration::from_millis(600)).await;
    assert_eq!(gateway.call_count(Operation::SaveDocument), 0);
}

#[tokio::test(start_paused = true)]
async fn test_titled_editor_gets_leading_heading() {
    let gateway = MemoryGateway::new();
    let user = UserId::from("u1");
    gateway.insert_document(&user, "d1", "Notes", "<p>body</p>");
    let ctx = context(&gateway);

    let editor = EditorSession::mount(&ctx, DocumentId::from("d1"), user, EditorVariant::Titled)
        .await
        .unwrap();
    editor.insert_text(Position::new(0, 0), "Cells").await.unwrap();

    let snapshot = editor.snapshot().await.unwrap();
    assert!(matches!(
        snapshot.content.blocks()[0].kind,
        BlockKind::Heading { level: 1 }
    ));
    assert_eq!(snapshot.title(EditorVariant::Titled), "Cells");
}

#[tokio::test(start_paused = true)]
async fn test_titled_editor_keeps_title_first() {
    let gateway = MemoryGateway::new();
    let user = UserId::from("u1");
    gateway.insert_document(&user, "d1", "Lecture", "<h1>Lecture</h1><p>body</p>");
    let ctx = context(&gateway);
    let editor = EditorSession::mount(&ctx, DocumentId::from("d1"), user, EditorVariant::Titled)
        .await
        .unwrap();

    let at = editor
        .insert_node(
            Position::new(0, 0),
            Block::image("https://img.example/cell.png", "cell"),
        )
        .await
        .unwrap();
    assert_eq!(at, Position::new(1, 0));

    let title = Range::new(Position::new(0, 0), Position::new(0, 7));
    editor.apply(title, Format::Paragraph).await.unwrap();
    editor.apply(title, Format::Heading(1)).await.unwrap();

    let snapshot = editor.snapshot().await.unwrap();
    let blocks = snapshot.content.blocks();
    assert_eq!(blocks.len(), 3);
    assert!(matches!(blocks[0].kind, BlockKind::Heading { level: 1 }));
    assert!(blocks[1].kind.is_image());
    assert_eq!(blocks[2].text(), "body");
    assert_eq!(snapshot.title(EditorVariant::Titled), "Lecture");
}

#[tokio::test(start_paused = true)]
async fn test_unmount_cancels_pending_save() {
    let gateway = MemoryGateway::new();
    let (_ctx, editor) = mount(&gateway, "").await;

    editor.insert_text(Position::new(0, 0), "lost").await.unwrap();
    editor.unmount().await.unwrap();
    sleep(Duration::from_millis(1000)).await;

    assert_eq!(gateway.call_count(Operation::SaveDocument), 0);
    assert!(editor.is_closed());
    assert!(matches!(
        editor.insert_text(Position::new(0, 0), "x").await,
        Err(Error::Closed(_))
    ));
    // Idempotent.
    editor.unmount().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_invalid_position_is_rejected_without_save() {
    let gateway = MemoryGateway::new();
    let (_ctx, editor) = mount(&gateway, "<p>ab</p>").await;

    let result = editor.insert_text(Position::new(3, 0), "x").await;
    assert!(matches!(result, Err(Error::InvalidInput(_))));
    sleep(Duration::from_millis(600)).await;
    assert_eq!(gateway.call_count(Operation::SaveDocument), 0);
}
