//! Subcommand implementations.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context as _};
use async_trait::async_trait;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use margin_chat::{CapturePipeline, ChatEngine};
use margin_core::{
    AppContext, Asset, AssetUploader, AssetUrl, AssistantBackend, ClientConfig, ContextId,
    DocumentId, Error, NoticeLevel, Result, SelectionCapture, UserId,
};
use margin_editor::content::serialize;
use margin_editor::{
    EditorHandle, EditorSession, EditorVariant, EmbedOutcome, FilePicker, Format,
    ImageEmbedPipeline, PickedFile, Position, Range, SaveOutcome, SaveStatus,
};
use margin_gateway::{ImageHostUploader, MemoryGateway, RestGateway};
use margin_inference::{OllamaAssistant, StaticContext};

use crate::{AssistantChoice, Cli, Command};

const SAMPLE_DOCUMENT: &str = "<h1>Welcome</h1>\
<p>This note lives in memory and is gone when <strong>margin</strong> exits.</p>\
<ul data-type=\"taskList\"><li data-checked=\"false\">Ask the assistant something</li></ul>";

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = ClientConfig::from_env();
    if let Some(url) = &cli.api_url {
        config = config.with_api_url(url.trim_end_matches('/'));
    }
    let user = UserId::from(cli.user.as_str());
    let ctx = build_context(&cli, &user, config)?;
    let notices = spawn_notice_logger(&ctx);

    let result = match cli.command {
        Command::Show {
            document,
            markup,
            titled,
        } => show(&ctx, &user, document, markup, titled).await,
        Command::Edit {
            document,
            text,
            heading,
            bold,
            flush,
        } => edit(&ctx, &user, document, &text, heading, bold, flush).await,
        Command::Image { document, path } => image(&ctx, &user, document, path).await,
        Command::List => list(&ctx, &user).await,
        Command::Create { title } => create(&ctx, &user, &title).await,
        Command::Ask { context, question } => ask(&ctx, &user, context, &question).await,
        Command::Capture {
            document,
            context,
            text,
            selection,
        } => capture(&ctx, &user, document, context, text, selection).await,
    };

    // Let queued notices reach the log before exiting.
    tokio::task::yield_now().await;
    notices.abort();
    result
}

// =============================================================================
// CONTEXT
// =============================================================================

fn build_context(cli: &Cli, user: &UserId, config: ClientConfig) -> anyhow::Result<AppContext> {
    let assistant: Option<Arc<dyn AssistantBackend>> = match cli.assistant {
        AssistantChoice::Gateway => None,
        AssistantChoice::Ollama => {
            let mut ollama = OllamaAssistant::from_env();
            if let Some(path) = &cli.context_file {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read context file {}", path.display()))?;
                ollama =
                    ollama.with_context_source(Arc::new(StaticContext::new().with_fallback(text)));
            }
            Some(Arc::new(ollama))
        }
    };

    if cli.offline {
        warn!("Offline mode: changes are kept in memory and discarded on exit");
        let gateway = MemoryGateway::new();
        gateway.insert_document(user, "welcome", "Welcome", SAMPLE_DOCUMENT);
        let shared = Arc::new(gateway);
        let fallback: Arc<dyn AssistantBackend> = shared.clone();
        return Ok(AppContext::new(
            shared.clone(),
            shared.clone(),
            assistant.unwrap_or(fallback),
            shared,
            config,
        ));
    }

    let rest = Arc::new(RestGateway::from_config(&config).with_query_user(user.clone()));
    let assets: Arc<dyn AssetUploader> = match ImageHostUploader::from_env() {
        Some(uploader) => Arc::new(uploader),
        None => Arc::new(UploadsDisabled),
    };
    let fallback: Arc<dyn AssistantBackend> = rest.clone();
    info!(api_url = %config.api_url, "Using notes API");
    Ok(AppContext::new(
        rest.clone(),
        rest,
        assistant.unwrap_or(fallback),
        assets,
        config,
    ))
}

/// Stand-in uploader when no image host is configured.
struct UploadsDisabled;

#[async_trait]
impl AssetUploader for UploadsDisabled {
    async fn upload_asset(&self, _asset: Asset) -> Result<AssetUrl> {
        Err(Error::Upload(
            "IMGBB_API_KEY is not set; image uploads are disabled".into(),
        ))
    }
}

/// Reads the picked file from a path given on the command line.
struct PathPicker {
    path: PathBuf,
}

#[async_trait]
impl FilePicker for PathPicker {
    async fn pick_file(&self) -> Result<Option<PickedFile>> {
        let bytes = std::fs::read(&self.path)?;
        let name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image")
            .to_string();
        Ok(Some(PickedFile { name, bytes }))
    }
}

fn spawn_notice_logger(ctx: &AppContext) -> JoinHandle<()> {
    let mut events = ctx.events.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(envelope) => match envelope.level {
                    NoticeLevel::Info => {
                        info!(event_type = %envelope.event_type, entity_id = %envelope.entity_id, "Notice")
                    }
                    NoticeLevel::Transient => {
                        warn!(event_type = %envelope.event_type, entity_id = %envelope.entity_id, "Notice")
                    }
                    NoticeLevel::Blocking => {
                        error!(event_type = %envelope.event_type, entity_id = %envelope.entity_id, "Notice")
                    }
                },
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Notice log lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

// =============================================================================
// DOCUMENTS
// =============================================================================

async fn open(
    ctx: &AppContext,
    user: &UserId,
    document: String,
    variant: EditorVariant,
) -> anyhow::Result<EditorHandle> {
    EditorSession::mount(ctx, DocumentId::from(document), user.clone(), variant)
        .await
        .context("Failed to open document")
}

async fn show(
    ctx: &AppContext,
    user: &UserId,
    document: String,
    markup: bool,
    titled: bool,
) -> anyhow::Result<()> {
    let variant = if titled {
        EditorVariant::Titled
    } else {
        EditorVariant::Plain
    };
    let editor = open(ctx, user, document, variant).await?;
    let snapshot = editor.snapshot().await?;
    editor.unmount().await?;

    info!(title = %snapshot.title(variant), revision = snapshot.revision, "Document opened");
    if markup {
        println!("{}", serialize(&snapshot.content));
    } else {
        println!("{}", snapshot.content.plain_text());
    }
    Ok(())
}

/// Start a new block at the end of the document. An empty last block is
/// reused.
async fn append_block(editor: &EditorHandle) -> anyhow::Result<Position> {
    let snapshot = editor.snapshot().await?;
    let end = snapshot.content.end();
    let last_is_empty = snapshot
        .content
        .block(end.block)
        .map(|b| b.is_empty() && !b.kind.is_image())
        .unwrap_or(false);
    if last_is_empty {
        Ok(end)
    } else {
        Ok(editor.split_block(end).await?)
    }
}

async fn edit(
    ctx: &AppContext,
    user: &UserId,
    document: String,
    text: &str,
    heading: Option<u8>,
    bold: bool,
    flush: bool,
) -> anyhow::Result<()> {
    let editor = open(ctx, user, document, EditorVariant::Plain).await?;

    let start = append_block(&editor).await?;
    let end = editor.insert_text(start, text).await?;
    let range = Range::new(start, end);
    if let Some(level) = heading {
        editor.apply(range, Format::Heading(level)).await?;
    }
    if bold {
        editor.apply(range, Format::Bold).await?;
    }

    let result = if flush {
        match editor.flush().await? {
            SaveOutcome::Saved { revision } => {
                println!("saved (revision {})", revision);
                Ok(())
            }
            SaveOutcome::Unchanged => {
                println!("unchanged");
                Ok(())
            }
            SaveOutcome::Failed { error } => Err(anyhow!("Save failed: {}", error)),
        }
    } else {
        wait_for_autosave(ctx, &editor).await
    };

    editor.unmount().await?;
    result
}

async fn wait_for_autosave(ctx: &AppContext, editor: &EditorHandle) -> anyhow::Result<()> {
    tokio::time::sleep(ctx.config.autosave_debounce()).await;
    loop {
        match editor.status().await? {
            SaveStatus::Pending | SaveStatus::Saving => {
                tokio::time::sleep(Duration::from_millis(50)).await
            }
            SaveStatus::Saved => {
                println!("autosaved");
                return Ok(());
            }
            SaveStatus::Unsaved => bail!("Autosave failed; the edit was not stored"),
        }
    }
}

async fn image(
    ctx: &AppContext,
    user: &UserId,
    document: String,
    path: PathBuf,
) -> anyhow::Result<()> {
    let editor = open(ctx, user, document, EditorVariant::Plain).await?;
    let pipeline = ImageEmbedPipeline::new(ctx.clone(), Arc::new(PathPicker { path }));

    let cursor = editor.snapshot().await?.content.end();
    let outcome = pipeline.embed(&editor, cursor).await;
    let result = match outcome {
        Ok(EmbedOutcome::Inserted(url)) => match editor.flush().await? {
            SaveOutcome::Failed { error } => Err(anyhow!("Image inserted but save failed: {}", error)),
            _ => {
                println!("{}", url);
                Ok(())
            }
        },
        Ok(EmbedOutcome::Cancelled) => Ok(()),
        Err(e) => Err(anyhow!("Image upload failed: {}", e)),
    };
    editor.unmount().await?;
    result
}

async fn list(ctx: &AppContext, user: &UserId) -> anyhow::Result<()> {
    let documents = ctx
        .documents
        .list_documents(user)
        .await
        .context("Failed to list documents")?;
    for doc in documents {
        println!("{}\t{}", doc.id, doc.title);
    }
    Ok(())
}

async fn create(ctx: &AppContext, user: &UserId, title: &str) -> anyhow::Result<()> {
    let pipeline = CapturePipeline::new(ctx.clone());
    let created = pipeline.create_target(user, title).await?;
    println!("{}\t{}", created.id, created.title);
    Ok(())
}

// =============================================================================
// CHAT
// =============================================================================

async fn ask(
    ctx: &AppContext,
    user: &UserId,
    context: String,
    question: &str,
) -> anyhow::Result<()> {
    let mut chat = ChatEngine::new(ctx.clone(), user.clone(), ContextId::from(context));
    chat.mount().await.context("Chat unavailable")?;

    let report = chat.send(question).await?;
    if let Some(reply) = report.assistant_entry.and_then(|id| chat.entry(id)) {
        println!("{}", reply.message.text);
    }
    match report.failure {
        None => Ok(()),
        Some(failure) => Err(anyhow!(
            "Send failed at {:?}: {}",
            failure.stage,
            failure.error
        )),
    }
}

async fn capture(
    ctx: &AppContext,
    user: &UserId,
    document: String,
    context: Option<String>,
    text: Option<String>,
    selection: Option<String>,
) -> anyhow::Result<()> {
    let pipeline = CapturePipeline::new(ctx.clone());
    let target = DocumentId::from(document);

    let ack = match (text, context) {
        (Some(text), _) => pipeline.append_text(user, &text, &target).await?,
        (None, Some(context)) => {
            let mut chat = ChatEngine::new(ctx.clone(), user.clone(), ContextId::from(context));
            chat.mount().await.context("Chat unavailable")?;
            let reply = chat
                .transcript()
                .into_iter()
                .rev()
                .find(|e| e.message.sender.is_assistant())
                .ok_or_else(|| anyhow!("No assistant reply to capture"))?;
            let selected = selection.unwrap_or_else(|| reply.message.text.clone());
            let request = SelectionCapture::from_entry(&reply, &selected, target)?;
            pipeline.capture(user, &request).await?
        }
        (None, None) => bail!("Nothing to capture"),
    };

    match ack.revision {
        Some(revision) => println!("captured (revision {})", revision),
        None => println!("captured"),
    }
    Ok(())
}
