//! Image embed pipeline against the in-memory asset host.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use margin_core::{AppContext, ClientConfig, ClientEvent, DocumentId, Error, Result, UserId};
use margin_editor::{
    BlockKind, EditorHandle, EditorSession, EditorVariant, EmbedOutcome, FilePicker,
    ImageEmbedPipeline, PickedFile, Position, Range,
};
use margin_gateway::{MemoryGateway, Operation};

const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];

struct StaticPicker(Option<PickedFile>);

#[async_trait]
impl FilePicker for StaticPicker {
    async fn pick_file(&self) -> Result<Option<PickedFile>> {
        Ok(self.0.clone())
    }
}

fn picked(name: &str, bytes: &[u8]) -> Option<PickedFile> {
    Some(PickedFile {
        name: name.to_string(),
        bytes: bytes.to_vec(),
    })
}

async fn setup(gateway: &MemoryGateway) -> (AppContext, EditorHandle) {
    let user = UserId::from("u1");
    gateway.insert_document(&user, "d1", "Notes", "<p>intro</p>");
    let shared = Arc::new(gateway.clone());
    let ctx = AppContext::new(
        shared.clone(),
        shared.clone(),
        shared.clone(),
        shared,
        ClientConfig::default(),
    );
    let editor = EditorSession::mount(&ctx, DocumentId::from("d1"), user, EditorVariant::Plain)
        .await
        .unwrap();
    (ctx, editor)
}

#[tokio::test(start_paused = true)]
async fn test_embed_inserts_image_and_saves() {
    let gateway = MemoryGateway::new();
    let (ctx, editor) = setup(&gateway).await;
    let mut events = ctx.events.subscribe();
    let pipeline = ImageEmbedPipeline::new(
        ctx.clone(),
        Arc::new(StaticPicker(picked("diagram.png", PNG))),
    );

    let outcome = pipeline.embed(&editor, Position::new(0, 5)).await.unwrap();
    let url = match outcome {
        EmbedOutcome::Inserted(url) => url,
        other => panic!("expected an inserted image, got {:?}", other),
    };
    assert!(url.as_str().starts_with("https://assets.invalid/"));
    assert!(url.as_str().ends_with(".png"));

    let snapshot = editor.snapshot().await.unwrap();
    let blocks = snapshot.content.blocks();
    assert_eq!(blocks.len(), 2);
    match &blocks[1].kind {
        BlockKind::Image { src, alt } => {
            assert_eq!(src, url.as_str());
            assert_eq!(alt, "diagram");
        }
        other => panic!("expected image block, got {:?}", other),
    }

    let envelope = events.try_recv().unwrap();
    assert!(matches!(envelope.payload, ClientEvent::ImageInserted { .. }));

    tokio::time::sleep(Duration::from_millis(600)).await;
    let saves = gateway.calls_to(Operation::SaveDocument);
    assert_eq!(saves.len(), 1);
    assert!(saves[0].contains(&format!("<img src=\"{}\" alt=\"diagram\">", url)));
}

#[tokio::test(start_paused = true)]
async fn test_upload_failure_inserts_nothing() {
    let gateway = MemoryGateway::new();
    let (ctx, editor) = setup(&gateway).await;
    let mut events = ctx.events.subscribe();
    gateway.fail(Operation::UploadAsset);
    let pipeline = ImageEmbedPipeline::new(
        ctx.clone(),
        Arc::new(StaticPicker(picked("diagram.png", PNG))),
    );

    let result = pipeline.embed(&editor, Position::new(0, 5)).await;
    assert!(matches!(result, Err(Error::Upload(_))));

    assert_eq!(editor.snapshot().await.unwrap().content.len(), 1);
    let envelope = events.try_recv().unwrap();
    assert!(matches!(envelope.payload, ClientEvent::UploadFailed { .. }));
    assert!(events.try_recv().is_err());

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(gateway.call_count(Operation::SaveDocument), 0);
}

#[tokio::test(start_paused = true)]
async fn test_non_image_is_rejected_before_upload() {
    let gateway = MemoryGateway::new();
    let (ctx, editor) = setup(&gateway).await;
    let mut events = ctx.events.subscribe();
    let pipeline = ImageEmbedPipeline::new(
        ctx.clone(),
        Arc::new(StaticPicker(picked("notes.txt", b"plain words"))),
    );

    let result = pipeline.embed(&editor, Position::new(0, 0)).await;
    assert!(matches!(result, Err(Error::Upload(_))));
    assert_eq!(gateway.call_count(Operation::UploadAsset), 0);
    assert!(matches!(
        events.try_recv().unwrap().payload,
        ClientEvent::UploadFailed { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_pick_does_nothing() {
    let gateway = MemoryGateway::new();
    let (ctx, editor) = setup(&gateway).await;
    let mut events = ctx.events.subscribe();
    let pipeline = ImageEmbedPipeline::new(ctx.clone(), Arc::new(StaticPicker(None)));

    let outcome = pipeline.embed(&editor, Position::new(0, 0)).await.unwrap();
    assert_eq!(outcome, EmbedOutcome::Cancelled);
    assert_eq!(gateway.call_count(Operation::UploadAsset), 0);
    assert!(events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_editing_continues_during_upload() {
    let gateway = MemoryGateway::new().with_latency(Duration::from_millis(300));
    let (ctx, editor) = setup(&gateway).await;
    let pipeline = ImageEmbedPipeline::new(
        ctx.clone(),
        Arc::new(StaticPicker(picked("diagram.png", PNG))),
    );

    let embedding = editor.clone();
    let embed = tokio::spawn(async move { pipeline.embed(&embedding, Position::new(0, 0)).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    editor.insert_text(Position::new(0, 5), "!").await.unwrap();

    let outcome = embed.await.unwrap().unwrap();
    assert!(matches!(outcome, EmbedOutcome::Inserted(_)));

    let snapshot = editor.snapshot().await.unwrap();
    assert!(snapshot.content.blocks()[0].kind.is_image());
    assert_eq!(snapshot.content.blocks()[1].text(), "intro!");
}

#[tokio::test(start_paused = true)]
async fn test_stale_cursor_after_upload_is_clamped() {
    let gateway = MemoryGateway::new().with_latency(Duration::from_millis(300));
    let (ctx, editor) = setup(&gateway).await;
    let pipeline = ImageEmbedPipeline::new(
        ctx.clone(),
        Arc::new(StaticPicker(picked("diagram.png", PNG))),
    );

    let embedding = editor.clone();
    let embed = tokio::spawn(async move { pipeline.embed(&embedding, Position::new(0, 5)).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    editor
        .delete_range(Range::new(Position::new(0, 0), Position::new(0, 5)))
        .await
        .unwrap();

    let outcome = embed.await.unwrap().unwrap();
    assert!(matches!(outcome, EmbedOutcome::Inserted(_)));

    let snapshot = editor.snapshot().await.unwrap();
    assert_eq!(snapshot.content.len(), 2);
    assert!(snapshot.content.blocks()[0].is_empty());
    assert!(snapshot.content.blocks()[1].kind.is_image());
}
