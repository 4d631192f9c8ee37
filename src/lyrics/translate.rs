//! On-demand translation of displayed lyrics.
//!
//! Every line is translated on its own task. A failed translation is never an
//! error for the caller: the line just keeps its original text.

use anyhow::Context;
use lru::LruCache;
use parking_lot::Mutex;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Remote text translation with automatic source-language detection.
pub trait Translator: Send + Sync + 'static {
    fn translate(
        &self,
        text: &str,
        target_language: &str,
    ) -> impl Future<Output = anyhow::Result<String>> + Send;
}

impl<T: Translator> Translator for Arc<T> {
    fn translate(
        &self,
        text: &str,
        target_language: &str,
    ) -> impl Future<Output = anyhow::Result<String>> + Send {
        (**self).translate(text, target_language)
    }
}

/// Google Translate's public `translate_a/single` endpoint.
#[derive(Debug, Clone)]
pub struct GoogleTranslator {
    client: reqwest::Client,
    base_url: String,
}

impl GoogleTranslator {
    pub const DEFAULT_BASE_URL: &'static str = "https://translate.googleapis.com";

    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build translate client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl Translator for GoogleTranslator {
    async fn translate(&self, text: &str, target_language: &str) -> anyhow::Result<String> {
        let url = format!(
            "{}/translate_a/single?client=gtx&sl=auto&tl={}&dt=t&q={}",
            self.base_url,
            urlencoding::encode(target_language),
            urlencoding::encode(text)
        );

        let v: serde_json::Value = self
            .client
            .get(&url)
            .send()
            .await
            .context("send translate request")?
            .error_for_status()
            .context("translate http status")?
            .json()
            .await
            .context("parse translate json")?;

        parse_translation(&v).context("translate response has no sentences")
    }
}

/// Response shape: `[[["translated", "original", ...], ...], null, "detected-lang", ...]`
fn parse_translation(v: &serde_json::Value) -> Option<String> {
    let sentences = v.get(0)?.as_array()?;
    let text: String = sentences
        .iter()
        .filter_map(|s| s.get(0).and_then(|t| t.as_str()))
        .collect();
    (!sentences.is_empty()).then_some(text)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translation {
    Pending,
    /// Translated text, or the original if translation failed
    Done(String),
}

/// Translation running in the background. Dropping it aborts the request.
pub struct PendingTranslation {
    original: String,
    state: watch::Receiver<Translation>,
    task: Option<JoinHandle<()>>,
}

impl PendingTranslation {
    fn ready(text: String) -> Self {
        let (_, state) = watch::channel(Translation::Done(text.clone()));
        Self {
            original: text,
            state,
            task: None,
        }
    }

    pub fn current(&self) -> Translation {
        self.state.borrow().clone()
    }

    pub fn is_pending(&self) -> bool {
        matches!(*self.state.borrow(), Translation::Pending)
    }

    /// Final text; the original if the task went away without an answer.
    pub async fn wait(&mut self) -> String {
        match self
            .state
            .wait_for(|t| matches!(t, Translation::Done(_)))
            .await
        {
            Ok(state) => match &*state {
                Translation::Done(text) => text.clone(),
                Translation::Pending => self.original.clone(),
            },
            Err(_) => self.original.clone(),
        }
    }
}

impl Drop for PendingTranslation {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

type CacheKey = (String, String);

/// Pass-through translator that falls back to the original text and caches
/// successful results.
pub struct TranslationRelay<T> {
    translator: Arc<T>,
    cache: Arc<Mutex<LruCache<CacheKey, String>>>,
}

impl<T> Clone for TranslationRelay<T> {
    fn clone(&self) -> Self {
        Self {
            translator: self.translator.clone(),
            cache: self.cache.clone(),
        }
    }
}

impl<T: Translator> TranslationRelay<T> {
    pub fn new(translator: T, cache_size: usize) -> Self {
        let capacity = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            translator: Arc::new(translator),
            cache: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    /// Translated text, or `text` unchanged on any failure.
    pub async fn translate(&self, text: &str, target_language: &str) -> String {
        if text.trim().is_empty() {
            return text.to_string();
        }

        let key = (target_language.to_string(), text.to_string());
        if let Some(hit) = self.cache.lock().get(&key) {
            return hit.clone();
        }

        match self.translator.translate(text, target_language).await {
            Ok(translated) => {
                self.cache.lock().put(key, translated.clone());
                translated
            }
            Err(e) => {
                tracing::debug!("translation to {target_language} failed, keeping original: {e:#}");
                text.to_string()
            }
        }
    }

    /// Start translating `text` without waiting for it.
    pub fn request(&self, text: &str, target_language: &str) -> PendingTranslation {
        if text.trim().is_empty() {
            return PendingTranslation::ready(text.to_string());
        }

        let (tx, state) = watch::channel(Translation::Pending);
        let relay = self.clone();
        let original = text.to_string();
        let target = target_language.to_string();
        let task = tokio::spawn({
            let original = original.clone();
            async move {
                let translated = relay.translate(&original, &target).await;
                tx.send_replace(Translation::Done(translated));
            }
        });

        PendingTranslation {
            original,
            state,
            task: Some(task),
        }
    }
}

/// Displayed lyric lines with a translation toggle.
pub struct TranslatedLyrics<T> {
    relay: TranslationRelay<T>,
    target_language: String,
    lines: Vec<String>,
    enabled: bool,
    /// One entry per line while translation is on, empty while off
    translations: Vec<PendingTranslation>,
}

impl<T: Translator> TranslatedLyrics<T> {
    pub fn new(relay: TranslationRelay<T>, target_language: &str, lines: Vec<String>) -> Self {
        Self {
            relay,
            target_language: target_language.to_string(),
            lines,
            enabled: false,
            translations: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Turning translation off drops in-flight requests and shows the
    /// originals straight away.
    pub fn set_enabled(&mut self, enabled: bool) {
        if !enabled {
            self.translations.clear();
        } else if !self.enabled {
            self.translations = self
                .lines
                .iter()
                .map(|line| self.relay.request(line, &self.target_language))
                .collect();
        }
        self.enabled = enabled;
    }

    pub fn toggle(&mut self) -> bool {
        let enabled = !self.is_enabled();
        self.set_enabled(enabled);
        enabled
    }

    /// Text for line `index`; `None` while its translation is pending.
    pub fn line(&self, index: usize) -> Option<String> {
        let original = self.lines.get(index)?;
        match self.translations.get(index).map(PendingTranslation::current) {
            None => Some(original.clone()),
            Some(Translation::Pending) => None,
            Some(Translation::Done(text)) => Some(text),
        }
    }

    /// Whether any line is still waiting for its translation.
    pub fn is_pending(&self) -> bool {
        self.translations.iter().any(PendingTranslation::is_pending)
    }

    /// Wait for every requested translation to finish.
    pub async fn ready(&mut self) {
        for translation in &mut self.translations {
            translation.wait().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockTranslator {
        calls: AtomicUsize,
        gate: watch::Sender<bool>,
    }

    impl MockTranslator {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                gate: watch::channel(true).0,
            })
        }
    }

    impl Translator for MockTranslator {
        async fn translate(&self, text: &str, target_language: &str) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut gate = self.gate.subscribe();
            let _ = gate.wait_for(|open| *open).await;
            match (text, target_language) {
                ("hola", "en") => Ok("hello".into()),
                ("adiós", "en") => Ok("goodbye".into()),
                _ => anyhow::bail!("unsupported language"),
            }
        }
    }

    fn lyrics(translator: &Arc<MockTranslator>, lines: &[&str]) -> TranslatedLyrics<Arc<MockTranslator>> {
        let relay = TranslationRelay::new(translator.clone(), 16);
        TranslatedLyrics::new(relay, "en", lines.iter().map(|l| l.to_string()).collect())
    }

    #[tokio::test]
    async fn test_translate_falls_back_to_original() {
        let translator = MockTranslator::new();
        let relay = TranslationRelay::new(translator.clone(), 16);
        assert_eq!(relay.translate("hola", "en").await, "hello");
        assert_eq!(relay.translate("hola", "xx").await, "hola");
        assert_eq!(relay.translate("  ", "en").await, "  ");
        assert_eq!(translator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_repeated_lines_hit_cache() {
        let translator = MockTranslator::new();
        let relay = TranslationRelay::new(translator.clone(), 16);
        for _ in 0..3 {
            assert_eq!(relay.translate("hola", "en").await, "hello");
        }
        assert_eq!(translator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_toggle_on_then_off_while_pending() {
        let translator = MockTranslator::new();
        translator.gate.send_replace(false);
        let mut lines = lyrics(&translator, &["hola"]);
        assert_eq!(lines.line(0).as_deref(), Some("hola"));

        assert!(lines.toggle());
        assert_eq!(lines.line(0), None);
        assert!(lines.is_pending());

        assert!(!lines.toggle());
        assert_eq!(lines.line(0).as_deref(), Some("hola"));
        assert!(!lines.is_pending());

        lines.set_enabled(true);
        translator.gate.send_replace(true);
        lines.ready().await;
        assert_eq!(lines.line(0).as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_each_line_degrades_independently() {
        let translator = MockTranslator::new();
        let mut lines = lyrics(&translator, &["hola", "", "no entiendo", "adiós"]);
        lines.set_enabled(true);
        lines.ready().await;
        assert_eq!(lines.line(0).as_deref(), Some("hello"));
        assert_eq!(lines.line(1).as_deref(), Some(""));
        assert_eq!(lines.line(2).as_deref(), Some("no entiendo"));
        assert_eq!(lines.line(3).as_deref(), Some("goodbye"));
        assert_eq!(lines.line(4), None);
        assert_eq!(translator.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_parse_translation() {
        let v = json!([[["Hello ", "Hola ", null, null, 10], ["world", "mundo", null, null, 10]], null, "es"]);
        assert_eq!(parse_translation(&v).as_deref(), Some("Hello world"));
        assert_eq!(parse_translation(&json!({})), None);
        assert_eq!(parse_translation(&json!([[]])), None);
    }
}
