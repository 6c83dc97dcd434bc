use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use once_cell::sync::Lazy;
use pagelens_common::{ConversationEntry, ConversationKey, Result};
use pagelens_context::create_question_prompt;
use pagelens_providers::ChatBackend;
use pagelens_store::ConversationStore;
use pagelens_tasks::extract_tasks;
use regex::Regex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::bus::{HostBus, HostEvent, ScreenshotCapture};
use crate::request::{PageState, Request, Response};

/// Questions about what the page looks like get a screenshot attached when a
/// capturer is wired up.
static VISUAL_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(look|see|image|screenshot|visual|picture|screen)\b").unwrap()
});

/// Orchestrates one host request end to end: page context in, prompt out to
/// the provider, reply into the conversation log, tasks scanned from the
/// reply.
///
/// The runtime holds no per-conversation locks; serializing concurrent turns
/// for the same key is the host's responsibility.
pub struct AssistantRuntime {
    store: ConversationStore,
    backend: Arc<dyn ChatBackend>,
    bus: Option<Arc<dyn HostBus>>,
    screenshots: Option<Arc<dyn ScreenshotCapture>>,
    page_states: Mutex<HashMap<ConversationKey, PageState>>,
}

impl AssistantRuntime {
    pub fn new(store: ConversationStore, backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            store,
            backend,
            bus: None,
            screenshots: None,
            page_states: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_bus(mut self, bus: Arc<dyn HostBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_screenshots(mut self, screenshots: Arc<dyn ScreenshotCapture>) -> Self {
        self.screenshots = Some(screenshots);
        self
    }

    /// Dispatch one request. The match is exhaustive over the closed
    /// [`Request`] surface.
    pub async fn handle(&self, request: Request) -> Result<Response> {
        match request {
            Request::GetPageContext { key } => {
                let state = self.page_states.lock().unwrap().get(&key).cloned();
                Ok(Response::PageState { state })
            }
            Request::SendChatMessage { key, question, context } => {
                self.send_chat(key, question, context).await
            }
            Request::StreamChatMessage { key, question, context } => {
                self.stream_chat(key, question, context).await
            }
            Request::DetectTasks { text } => Ok(Response::Tasks {
                tasks: extract_tasks(&text),
            }),
            Request::GetConversation { key } => Ok(Response::Conversation {
                entries: self.store.get_all(&key).await?,
            }),
            Request::ClearConversation { key } => {
                self.store.clear(&key).await?;
                info!("cleared conversation {key}");
                Ok(Response::Cleared)
            }
            Request::PageContextUpdated { key, context } => {
                let state = PageState {
                    url: context.url.clone(),
                    timestamp: Utc::now().timestamp_millis(),
                };
                self.page_states.lock().unwrap().insert(key, state);
                Ok(Response::Acknowledged)
            }
        }
    }

    async fn send_chat(
        &self,
        key: ConversationKey,
        question: String,
        context: Option<pagelens_common::PageContext>,
    ) -> Result<Response> {
        let screenshot = self.maybe_capture(&question).await;
        let prompt = create_question_prompt(&question, context.as_ref());

        // The user turn is recorded before the provider call so it survives a
        // failed request.
        self.store
            .append(&key, ConversationEntry::user(&question))
            .await?;

        let reply = self.backend.send(&prompt, screenshot.as_deref()).await?;

        self.store
            .append(&key, ConversationEntry::assistant(&reply))
            .await?;

        let tasks = extract_tasks(&reply);
        self.notify(HostEvent::AssistantReply {
            key,
            reply: reply.clone(),
            tasks: tasks.clone(),
        })
        .await;

        Ok(Response::ChatReply { reply, tasks })
    }

    async fn stream_chat(
        &self,
        key: ConversationKey,
        question: String,
        context: Option<pagelens_common::PageContext>,
    ) -> Result<Response> {
        let screenshot = self.maybe_capture(&question).await;
        let prompt = create_question_prompt(&question, context.as_ref());

        self.store
            .append(&key, ConversationEntry::user(&question))
            .await?;

        let reply = match &self.bus {
            Some(bus) => {
                // Deltas hop through a channel: the chunk callback is
                // synchronous, the bus is not.
                let (tx, mut rx) = mpsc::unbounded_channel::<String>();
                let bus = bus.clone();
                let chunk_key = key.clone();
                let forward = tokio::spawn(async move {
                    while let Some(delta) = rx.recv().await {
                        let event = HostEvent::StreamChunk {
                            key: chunk_key.clone(),
                            delta,
                        };
                        if let Err(e) = bus.emit(event).await {
                            debug!("host bus unavailable, dropping stream chunk: {e}");
                        }
                    }
                });

                let result = self
                    .backend
                    .stream(&prompt, screenshot.as_deref(), &mut |chunk: &str| {
                        let _ = tx.send(chunk.to_string());
                    })
                    .await;

                drop(tx);
                let _ = forward.await;
                result?
            }
            None => {
                self.backend
                    .stream(&prompt, screenshot.as_deref(), &mut |_chunk: &str| {})
                    .await?
            }
        };

        self.store
            .append(&key, ConversationEntry::assistant(&reply))
            .await?;

        let tasks = extract_tasks(&reply);
        self.notify(HostEvent::StreamComplete {
            key,
            reply: reply.clone(),
            tasks: tasks.clone(),
        })
        .await;

        Ok(Response::ChatReply { reply, tasks })
    }

    /// Attach a screenshot when the question sounds visual and a capturer is
    /// available. Capture failure degrades to a text-only turn.
    async fn maybe_capture(&self, question: &str) -> Option<String> {
        let capturer = self.screenshots.as_ref()?;
        if !VISUAL_KEYWORDS.is_match(question) {
            return None;
        }
        match capturer.capture_visible_page().await {
            Ok(data_url) => {
                debug!("attached screenshot to visual question");
                Some(data_url)
            }
            Err(e) => {
                warn!("screenshot capture failed, continuing text-only: {e}");
                None
            }
        }
    }

    /// Push an event to the host; a missing or unreachable bus drops it.
    async fn notify(&self, event: HostEvent) {
        if let Some(bus) = &self.bus
            && let Err(e) = bus.emit(event).await
        {
            debug!("host bus unavailable, skipping update: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pagelens_common::{Error, PageContext, PageText, Role};
    use pagelens_store::MemoryKeyValueStore;

    struct MockBackend {
        reply: String,
        calls: Mutex<Vec<(String, Option<String>)>>,
    }

    impl MockBackend {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn recorded(&self) -> Vec<(String, Option<String>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatBackend for MockBackend {
        async fn send(&self, prompt: &str, image_data: Option<&str>) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((prompt.to_string(), image_data.map(String::from)));
            Ok(self.reply.clone())
        }

        async fn stream(
            &self,
            prompt: &str,
            image_data: Option<&str>,
            on_chunk: &mut (dyn for<'a> FnMut(&'a str) + Send),
        ) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((prompt.to_string(), image_data.map(String::from)));
            let mid = self.reply.len() / 2;
            on_chunk(&self.reply[..mid]);
            on_chunk(&self.reply[mid..]);
            Ok(self.reply.clone())
        }
    }

    #[derive(Default)]
    struct RecordingBus {
        events: Mutex<Vec<HostEvent>>,
    }

    #[async_trait]
    impl HostBus for RecordingBus {
        async fn emit(&self, event: HostEvent) -> Result<()> {
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }

    struct DeadBus;

    #[async_trait]
    impl HostBus for DeadBus {
        async fn emit(&self, _event: HostEvent) -> Result<()> {
            Err(Error::HostUnavailable("panel closed".to_string()))
        }
    }

    struct FixedCapture {
        result: Result<String>,
    }

    #[async_trait]
    impl ScreenshotCapture for FixedCapture {
        async fn capture_visible_page(&self) -> Result<String> {
            match &self.result {
                Ok(data) => Ok(data.clone()),
                Err(_) => Err(Error::HostUnavailable("no active tab".to_string())),
            }
        }
    }

    fn store() -> ConversationStore {
        ConversationStore::new(Arc::new(MemoryKeyValueStore::new()))
    }

    fn page_context(url: &str) -> PageContext {
        PageContext {
            url: url.to_string(),
            title: "Example".to_string(),
            text: PageText::default(),
            links: vec![],
            images: vec![],
            timestamp: 0,
        }
    }

    fn key(s: &str) -> ConversationKey {
        ConversationKey::new(s)
    }

    #[tokio::test]
    async fn send_appends_user_then_assistant_and_returns_tasks() {
        let backend = MockBackend::new("Done. TODO: water the plants");
        let runtime = AssistantRuntime::new(store(), backend.clone());

        let response = runtime
            .handle(Request::SendChatMessage {
                key: key("tab-1"),
                question: "What should I do?".to_string(),
                context: None,
            })
            .await
            .unwrap();

        match response {
            Response::ChatReply { reply, tasks } => {
                assert_eq!(reply, "Done. TODO: water the plants");
                assert_eq!(tasks.len(), 1);
                assert_eq!(tasks[0].text, "water the plants");
            }
            other => panic!("expected chat reply, got {other:?}"),
        }

        let entries = runtime.store.get_all(&key("tab-1")).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].role, Role::User);
        assert_eq!(entries[0].content, "What should I do?");
        assert_eq!(entries[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn question_prompt_carries_page_context() {
        let backend = MockBackend::new("answer");
        let runtime = AssistantRuntime::new(store(), backend.clone());

        runtime
            .handle(Request::SendChatMessage {
                key: key("tab-1"),
                question: "What is this?".to_string(),
                context: Some(page_context("https://example.com/tea")),
            })
            .await
            .unwrap();

        let calls = backend.recorded();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].0.contains("URL: https://example.com/tea"));
        assert!(calls[0].0.contains("User Question: What is this?"));
    }

    #[tokio::test]
    async fn visual_question_attaches_screenshot() {
        let backend = MockBackend::new("a page");
        let capture = Arc::new(FixedCapture {
            result: Ok("data:image/png;base64,AAAA".to_string()),
        });
        let runtime = AssistantRuntime::new(store(), backend.clone()).with_screenshots(capture);

        runtime
            .handle(Request::SendChatMessage {
                key: key("tab-1"),
                question: "What do you see on this page?".to_string(),
                context: None,
            })
            .await
            .unwrap();

        let calls = backend.recorded();
        assert_eq!(calls[0].1.as_deref(), Some("data:image/png;base64,AAAA"));
    }

    #[tokio::test]
    async fn non_visual_question_skips_capture() {
        let backend = MockBackend::new("sure");
        let capture = Arc::new(FixedCapture {
            result: Ok("data:image/png;base64,AAAA".to_string()),
        });
        let runtime = AssistantRuntime::new(store(), backend.clone()).with_screenshots(capture);

        runtime
            .handle(Request::SendChatMessage {
                key: key("tab-1"),
                question: "Summarize the article".to_string(),
                context: None,
            })
            .await
            .unwrap();

        assert_eq!(backend.recorded()[0].1, None);
    }

    #[tokio::test]
    async fn capture_failure_degrades_to_text_only() {
        let backend = MockBackend::new("text only");
        let capture = Arc::new(FixedCapture {
            result: Err(Error::HostUnavailable("x".to_string())),
        });
        let runtime = AssistantRuntime::new(store(), backend.clone()).with_screenshots(capture);

        let response = runtime
            .handle(Request::SendChatMessage {
                key: key("tab-1"),
                question: "Look at this screenshot".to_string(),
                context: None,
            })
            .await
            .unwrap();

        assert!(matches!(response, Response::ChatReply { .. }));
        assert_eq!(backend.recorded()[0].1, None);
    }

    #[tokio::test]
    async fn streaming_emits_chunks_then_completion() {
        let backend = MockBackend::new("Hello World");
        let bus = Arc::new(RecordingBus::default());
        let runtime = AssistantRuntime::new(store(), backend).with_bus(bus.clone());

        let response = runtime
            .handle(Request::StreamChatMessage {
                key: key("tab-3"),
                question: "hi".to_string(),
                context: None,
            })
            .await
            .unwrap();

        let Response::ChatReply { reply, .. } = response else {
            panic!("expected chat reply");
        };
        assert_eq!(reply, "Hello World");

        let events = bus.events.lock().unwrap().clone();
        let mut streamed = String::new();
        let mut completed = None;
        for event in events {
            match event {
                HostEvent::StreamChunk { delta, .. } => streamed.push_str(&delta),
                HostEvent::StreamComplete { reply, .. } => completed = Some(reply),
                HostEvent::AssistantReply { .. } => panic!("blocking event on stream path"),
            }
        }
        assert_eq!(streamed, "Hello World");
        assert_eq!(completed.as_deref(), Some("Hello World"));
    }

    #[tokio::test]
    async fn dead_bus_is_not_fatal() {
        let backend = MockBackend::new("still works");
        let runtime = AssistantRuntime::new(store(), backend).with_bus(Arc::new(DeadBus));

        let response = runtime
            .handle(Request::StreamChatMessage {
                key: key("tab-4"),
                question: "hi".to_string(),
                context: None,
            })
            .await
            .unwrap();

        let Response::ChatReply { reply, .. } = response else {
            panic!("expected chat reply");
        };
        assert_eq!(reply, "still works");

        // The turn is still recorded even though no event was delivered.
        let entries = runtime.store.get_all(&key("tab-4")).await.unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn page_state_tracked_per_conversation() {
        let backend = MockBackend::new("ok");
        let runtime = AssistantRuntime::new(store(), backend);

        let before = runtime
            .handle(Request::GetPageContext { key: key("tab-5") })
            .await
            .unwrap();
        assert!(matches!(before, Response::PageState { state: None }));

        runtime
            .handle(Request::PageContextUpdated {
                key: key("tab-5"),
                context: page_context("https://example.com/a"),
            })
            .await
            .unwrap();

        let after = runtime
            .handle(Request::GetPageContext { key: key("tab-5") })
            .await
            .unwrap();
        match after {
            Response::PageState { state: Some(state) } => {
                assert_eq!(state.url, "https://example.com/a");
                assert!(state.timestamp > 0);
            }
            other => panic!("expected page state, got {other:?}"),
        }

        let unrelated = runtime
            .handle(Request::GetPageContext { key: key("tab-6") })
            .await
            .unwrap();
        assert!(matches!(unrelated, Response::PageState { state: None }));
    }

    #[tokio::test]
    async fn detect_tasks_and_conversation_management() {
        let backend = MockBackend::new("ok");
        let runtime = AssistantRuntime::new(store(), backend);
        let k = key("tab-7");

        let tasks = runtime
            .handle(Request::DetectTasks {
                text: "- [ ] File the report".to_string(),
            })
            .await
            .unwrap();
        match tasks {
            Response::Tasks { tasks } => {
                assert_eq!(tasks.len(), 1);
                assert_eq!(tasks[0].text, "File the report");
            }
            other => panic!("expected tasks, got {other:?}"),
        }

        runtime
            .handle(Request::SendChatMessage {
                key: k.clone(),
                question: "hello".to_string(),
                context: None,
            })
            .await
            .unwrap();

        let conversation = runtime
            .handle(Request::GetConversation { key: k.clone() })
            .await
            .unwrap();
        match conversation {
            Response::Conversation { entries } => assert_eq!(entries.len(), 2),
            other => panic!("expected conversation, got {other:?}"),
        }

        let cleared = runtime
            .handle(Request::ClearConversation { key: k.clone() })
            .await
            .unwrap();
        assert!(matches!(cleared, Response::Cleared));

        match runtime.handle(Request::GetConversation { key: k }).await.unwrap() {
            Response::Conversation { entries } => assert!(entries.is_empty()),
            other => panic!("expected conversation, got {other:?}"),
        }
    }
}
