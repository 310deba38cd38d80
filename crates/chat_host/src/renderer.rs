//! Typewriter reveal of streamed model text.
//!
//! Each character is appended to the message's accumulated text, the whole
//! text is rescanned for tags (the dispatcher drops repeats), re-rendered to
//! HTML, and pushed to the UI as a [`RenderEvent`].

use anyhow::{anyhow, Result};
use futures::future::{AbortHandle, Abortable, Aborted};
use parking_lot::Mutex;
use shared::command_tags::{scan_with, TagSyntax};
use shared::events::RenderEvent;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::dispatcher::Dispatcher;
use crate::highlight::render_text_content_with;
use crate::SharedSettings;

struct ActiveReveal {
    generation: u64,
    abort: AbortHandle,
}

#[derive(Clone)]
pub struct StreamingRenderer {
    inner: Arc<RendererInner>,
}

struct RendererInner {
    dispatcher: Dispatcher,
    settings: SharedSettings,
    events: UnboundedSender<RenderEvent>,
    active: Mutex<HashMap<String, ActiveReveal>>,
    generation: AtomicU64,
}

/// A running reveal. Dropping it does not stop the reveal.
pub struct RevealHandle {
    message_id: String,
    task: JoinHandle<Result<String, Aborted>>,
}

impl RevealHandle {
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Final text, or `None` if the reveal was cancelled or restarted
    pub async fn finished(self) -> Option<String> {
        match self.task.await {
            Ok(Ok(text)) => Some(text),
            Ok(Err(Aborted)) => None,
            Err(e) => {
                tracing::warn!("Reveal task for {} failed: {}", self.message_id, e);
                None
            }
        }
    }
}

impl StreamingRenderer {
    pub fn new(
        dispatcher: Dispatcher,
        settings: SharedSettings,
        events: UnboundedSender<RenderEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(RendererInner {
                dispatcher,
                settings,
                events,
                active: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Reveal `chunks` into `message_id`, restarting any reveal already running for it.
    pub fn reveal(
        &self,
        message_id: &str,
        character_id: Option<String>,
        chunks: UnboundedReceiver<String>,
    ) -> Result<RevealHandle> {
        let runtime =
            Handle::try_current().map_err(|e| anyhow!("No async runtime for reveal: {}", e))?;

        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let (abort, registration) = AbortHandle::new_pair();
        {
            let mut active = self.inner.active.lock();
            if let Some(previous) = active.insert(
                message_id.to_string(),
                ActiveReveal { generation, abort },
            ) {
                previous.abort.abort();
                self.inner.emit(RenderEvent::Cancelled {
                    message_id: message_id.to_string(),
                });
                tracing::debug!("Restarting reveal of {}", message_id);
            }
            // Restart: every tag in the message may fire again.
            self.inner.dispatcher.session().clear_message(message_id);
        }

        let inner = self.inner.clone();
        let id = message_id.to_string();
        let reveal = async move { inner.run(id, character_id, chunks, generation).await };
        let task = runtime.spawn(Abortable::new(reveal, registration));
        Ok(RevealHandle {
            message_id: message_id.to_string(),
            task,
        })
    }

    /// Reveal a complete string, e.g. when replaying a stored message
    pub fn reveal_text(
        &self,
        message_id: &str,
        character_id: Option<String>,
        text: &str,
    ) -> Result<RevealHandle> {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(text.to_string());
        drop(tx);
        self.reveal(message_id, character_id, rx)
    }

    /// Stop a running reveal. Returns false if none was running.
    pub fn cancel(&self, message_id: &str) -> bool {
        let Some(active) = self.inner.active.lock().remove(message_id) else {
            return false;
        };
        active.abort.abort();
        self.inner.emit(RenderEvent::Cancelled {
            message_id: message_id.to_string(),
        });
        tracing::debug!("Cancelled reveal of {}", message_id);
        true
    }

    pub fn is_revealing(&self, message_id: &str) -> bool {
        self.inner.active.lock().contains_key(message_id)
    }
}

impl RendererInner {
    fn emit(&self, event: RenderEvent) {
        // Receiver gone means the UI closed; nothing to do.
        let _ = self.events.send(event);
    }

    fn delay(&self) -> Duration {
        Duration::from_millis(self.settings.read().typewriter_delay_ms)
    }

    async fn run(
        &self,
        message_id: String,
        character_id: Option<String>,
        mut chunks: UnboundedReceiver<String>,
        generation: u64,
    ) -> String {
        let pattern = TagSyntax::from_settings(&self.settings.read()).pattern();
        let mut text = String::new();

        self.emit(RenderEvent::Started {
            message_id: message_id.clone(),
        });

        while let Some(chunk) = chunks.recv().await {
            for c in chunk.chars() {
                text.push(c);

                let tags = scan_with(&text, &pattern);
                self.dispatcher
                    .dispatch_all(&tags, &message_id, character_id.as_deref());

                self.emit(RenderEvent::Revealed {
                    message_id: message_id.clone(),
                    text: text.clone(),
                    html: render_text_content_with(&text, &pattern),
                });

                let delay = self.delay();
                if delay.is_zero() {
                    tokio::task::yield_now().await;
                } else {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        {
            let mut active = self.active.lock();
            if active
                .get(&message_id)
                .is_some_and(|a| a.generation == generation)
            {
                active.remove(&message_id);
            }
        }
        self.emit(RenderEvent::Finished {
            message_id,
            text: text.clone(),
        });
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::TagSession;
    use crate::test_support::{image, FakeAssets, FakeSurface};
    use crate::transient::TransientRegistry;
    use parking_lot::RwLock;
    use shared::settings::AppSettings;

    struct Harness {
        renderer: StreamingRenderer,
        events: UnboundedReceiver<RenderEvent>,
        assets: Arc<FakeAssets>,
        surface: Arc<FakeSurface>,
    }

    fn harness() -> Harness {
        let mut settings = AppSettings::default();
        settings.typewriter_delay_ms = 0;
        let settings: SharedSettings = Arc::new(RwLock::new(settings));

        let session = Arc::new(TagSession::new());
        session.replace_character_tags(Some("c1".into()), vec!["char_happy".to_string()]);
        let assets = Arc::new(FakeAssets::with(vec![image("a1", &["char_happy"])]));
        let surface = Arc::new(FakeSurface::default());
        let dispatcher = Dispatcher::new(
            session,
            assets.clone(),
            surface.clone(),
            settings.clone(),
            TransientRegistry::new(),
        );
        let (tx, rx) = mpsc::unbounded_channel();
        Harness {
            renderer: StreamingRenderer::new(dispatcher, settings, tx),
            events: rx,
            assets,
            surface,
        }
    }

    fn drain(rx: &mut UnboundedReceiver<RenderEvent>) -> Vec<RenderEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    /// Let spawned lookups finish
    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn reveals_one_character_at_a_time() {
        let mut h = harness();
        let text = h
            .renderer
            .reveal_text("m1", Some("c1".into()), "Hey")
            .unwrap()
            .finished()
            .await;
        assert_eq!(text.as_deref(), Some("Hey"));

        let events = drain(&mut h.events);
        assert_eq!(
            events.first(),
            Some(&RenderEvent::Started {
                message_id: "m1".into()
            })
        );
        let revealed: Vec<String> = events
            .iter()
            .filter_map(|e| match e {
                RenderEvent::Revealed { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(revealed, vec!["H", "He", "Hey"]);
        assert!(matches!(events.last(), Some(RenderEvent::Finished { text, .. }) if text == "Hey"));
        assert!(!h.renderer.is_revealing("m1"));
    }

    #[tokio::test]
    async fn streamed_chunks_dispatch_tag_once() {
        let h = harness();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = h.renderer.reveal("m1", Some("c1".into()), rx).unwrap();
        for chunk in ["Hello [hap", "py] there", " friend"] {
            tx.send(chunk.to_string()).unwrap();
        }
        drop(tx);
        handle.finished().await.unwrap();
        settle().await;

        assert_eq!(h.assets.search_count(), 1);
        assert_eq!(*h.surface.swaps.lock(), vec!["a1".to_string()]);
    }

    #[tokio::test]
    async fn html_highlights_tags() {
        let mut h = harness();
        h.renderer
            .reveal_text("m1", None, "[happy]")
            .unwrap()
            .finished()
            .await;
        let last_html = drain(&mut h.events)
            .into_iter()
            .filter_map(|e| match e {
                RenderEvent::Revealed { html, .. } => Some(html),
                _ => None,
            })
            .last()
            .unwrap();
        assert!(last_html.contains("command-tag"));
        // No character: nothing dispatched
        assert_eq!(h.assets.search_count(), 0);
    }

    #[tokio::test]
    async fn replay_retriggers_tags() {
        let h = harness();
        for _ in 0..2 {
            h.renderer
                .reveal_text("m1", Some("c1".into()), "[happy]")
                .unwrap()
                .finished()
                .await
                .unwrap();
            settle().await;
        }
        assert_eq!(h.assets.search_count(), 2);
    }

    #[tokio::test]
    async fn restart_aborts_running_reveal() {
        let mut h = harness();
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        let first = h.renderer.reveal("m1", Some("c1".into()), rx).unwrap();
        tx.send("partial".into()).unwrap();
        settle().await;

        let second = h
            .renderer
            .reveal_text("m1", Some("c1".into()), "fresh")
            .unwrap();
        assert!(first.finished().await.is_none());
        assert_eq!(second.finished().await.as_deref(), Some("fresh"));

        let events = drain(&mut h.events);
        assert!(events.contains(&RenderEvent::Cancelled {
            message_id: "m1".into()
        }));
        drop(tx);
    }

    #[tokio::test]
    async fn cancel_stops_reveal() {
        let mut h = harness();
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        let handle = h.renderer.reveal("m1", None, rx).unwrap();
        assert!(h.renderer.is_revealing("m1"));

        assert!(h.renderer.cancel("m1"));
        assert!(!h.renderer.cancel("m1"));
        assert!(handle.finished().await.is_none());
        assert!(drain(&mut h.events)
            .iter()
            .all(|e| !matches!(e, RenderEvent::Finished { .. })));
        drop(tx);
    }

    #[test]
    fn reveal_without_runtime_fails() {
        let h = harness();
        assert!(h.renderer.reveal_text("m1", None, "x").is_err());
    }
}
