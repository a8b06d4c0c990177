//! Translation gateway.
//!
//! Providers are tried as an ordered chain of steps sharing one interface;
//! an error or empty output from one step moves on to the next. The chain
//! composition follows the model-name family convention: a `gemini*`
//! primary gets the OpenAI fallback appended, anything else is a
//! single-step OpenAI chain.

use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::config::TranslationConfig;
use crate::llm::{
    ChatRequest, GeminiProvider, LLMProvider, Message, OpenAICompatibleProvider, Role,
};

/// Low temperature keeps the output deterministic across redeliveries.
const TRANSLATION_TEMPERATURE: f32 = 0.2;

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("no translation provider is configured")]
    NoProvider,

    #[error("all translation providers failed: {0}")]
    Exhausted(String),
}

/// One provider attempt in the chain: a label for logs, the model to
/// request, and the provider that serves it.
pub struct ProviderStep {
    pub label: &'static str,
    pub model: String,
    pub provider: Arc<dyn LLMProvider>,
}

/// Ordered provider chain plus the shared system prompt.
pub struct Translator {
    steps: Vec<ProviderStep>,
    system_prompt: String,
}

impl Translator {
    pub fn new(system_prompt: String, steps: Vec<ProviderStep>) -> Self {
        Self {
            steps,
            system_prompt,
        }
    }

    /// Labels of the configured steps, in order. Used for startup logging
    /// and the `/model` status reply.
    pub fn step_labels(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.label).collect()
    }

    /// Translate `text` into `target_language`.
    ///
    /// Steps are attempted in order; an empty trimmed output counts as a
    /// failure. Fails only when every step failed (or none is configured).
    pub async fn translate(
        &self,
        target_language: &str,
        text: &str,
    ) -> Result<String, TranslateError> {
        if self.steps.is_empty() {
            return Err(TranslateError::NoProvider);
        }

        let mut failures = Vec::new();
        for step in &self.steps {
            let request = ChatRequest {
                model: step.model.clone(),
                messages: vec![
                    Message {
                        role: Role::System,
                        content: self.system_prompt.clone(),
                    },
                    Message {
                        role: Role::User,
                        content: instruction(target_language, text),
                    },
                ],
                temperature: Some(TRANSLATION_TEMPERATURE),
                max_tokens: None,
            };

            match step.provider.chat(request).await {
                Ok(response) => {
                    let out = response.text();
                    if out.is_empty() {
                        warn!(step = step.label, model = %step.model,
                              "provider returned empty translation, trying next");
                        failures.push(format!("{}: empty output", step.label));
                        continue;
                    }
                    return Ok(out.to_string());
                }
                Err(e) => {
                    warn!(step = step.label, model = %step.model, error = %e,
                          "translation attempt failed, trying next");
                    failures.push(format!("{}: {}", step.label, e));
                }
            }
        }

        Err(TranslateError::Exhausted(failures.join("; ")))
    }
}

fn instruction(target_language: &str, text: &str) -> String {
    format!(
        "Translate the following text into {target_language}. \
         If it's already in that language, return it naturally. \
         Do not add quotes or extra commentary.\n\n{text}"
    )
}

/// Whether a model name belongs to the Gemini family.
pub fn is_gemini_model(model: &str) -> bool {
    model.starts_with("gemini")
}

/// Build the default translator and, when the OpenAI key is present, the
/// forced-fallback translator used by the per-chat `/model 2` override.
pub fn build_translators(cfg: &TranslationConfig) -> (Translator, Option<Translator>) {
    let gemini: Option<Arc<dyn LLMProvider>> = cfg
        .gemini_api_key
        .clone()
        .map(|key| Arc::new(GeminiProvider::new(key)) as Arc<dyn LLMProvider>);
    let openai: Option<Arc<dyn LLMProvider>> = cfg
        .openai_api_key
        .clone()
        .map(|key| Arc::new(OpenAICompatibleProvider::openai(key)) as Arc<dyn LLMProvider>);

    let mut steps = Vec::new();
    if is_gemini_model(&cfg.model) {
        if let Some(provider) = gemini {
            steps.push(ProviderStep {
                label: "gemini",
                model: cfg.model.clone(),
                provider,
            });
        }
        if let Some(provider) = openai.clone() {
            steps.push(ProviderStep {
                label: "openai-fallback",
                model: cfg.fallback_model.clone(),
                provider,
            });
        }
    } else if let Some(provider) = openai.clone() {
        // Legacy single-provider path: a non-Gemini primary goes straight
        // to OpenAI with no fallback layer.
        steps.push(ProviderStep {
            label: "openai",
            model: cfg.model.clone(),
            provider,
        });
    }

    let forced = openai.map(|provider| {
        Translator::new(
            cfg.system_prompt.clone(),
            vec![ProviderStep {
                label: "openai-forced",
                model: cfg.fallback_model.clone(),
                provider,
            }],
        )
    });

    (Translator::new(cfg.system_prompt.clone(), steps), forced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatResponse, Choice, LLMError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedProvider {
        reply: &'static str,
        calls: AtomicUsize,
    }

    impl FixedProvider {
        fn new(reply: &'static str) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LLMProvider for FixedProvider {
        async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, LLMError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ChatResponse {
                choices: vec![Choice {
                    message: Message {
                        role: Role::Assistant,
                        content: self.reply.to_string(),
                    },
                }],
            })
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl LLMProvider for FailingProvider {
        async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, LLMError> {
            Err(LLMError::Api {
                status: 429,
                message: "quota exceeded".to_string(),
            })
        }
    }

    fn step(label: &'static str, provider: Arc<dyn LLMProvider>) -> ProviderStep {
        ProviderStep {
            label,
            model: "test-model".to_string(),
            provider,
        }
    }

    fn translator(steps: Vec<ProviderStep>) -> Translator {
        Translator::new("system".to_string(), steps)
    }

    #[tokio::test]
    async fn test_primary_success_skips_fallback() {
        let fallback = FixedProvider::new("fallback");
        let t = translator(vec![
            step("primary", FixedProvider::new("  translated  ")),
            step("fallback", fallback.clone()),
        ]);

        let out = t.translate("Khmer", "안녕").await.unwrap();
        assert_eq!(out, "translated");
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fallback_on_primary_error() {
        let t = translator(vec![
            step("primary", Arc::new(FailingProvider)),
            step("fallback", FixedProvider::new("OK")),
        ]);

        let out = t.translate("Khmer", "안녕").await.unwrap();
        assert_eq!(out, "OK");
    }

    #[tokio::test]
    async fn test_fallback_on_empty_output() {
        let t = translator(vec![
            step("primary", FixedProvider::new("   ")),
            step("fallback", FixedProvider::new("OK")),
        ]);

        let out = t.translate("Khmer", "안녕").await.unwrap();
        assert_eq!(out, "OK");
    }

    #[tokio::test]
    async fn test_exhausted_names_every_step() {
        let t = translator(vec![
            step("primary", Arc::new(FailingProvider)),
            step("fallback", FixedProvider::new("")),
        ]);

        let err = t.translate("Khmer", "안녕").await.unwrap_err();
        let text = err.to_string();
        assert!(text.contains("primary"));
        assert!(text.contains("fallback"));
    }

    #[tokio::test]
    async fn test_no_provider() {
        let t = translator(Vec::new());
        assert!(matches!(
            t.translate("Khmer", "안녕").await,
            Err(TranslateError::NoProvider)
        ));
    }

    #[test]
    fn test_gemini_family_convention() {
        assert!(is_gemini_model("gemini-2.0-flash"));
        assert!(is_gemini_model("gemini-2.5-pro"));
        assert!(!is_gemini_model("gpt-4o-mini"));
    }

    #[test]
    fn test_chain_composition_gemini_primary() {
        let cfg = TranslationConfig {
            gemini_api_key: Some("g".into()),
            openai_api_key: Some("o".into()),
            ..Default::default()
        };
        let (default, forced) = build_translators(&cfg);
        assert_eq!(default.step_labels(), vec!["gemini", "openai-fallback"]);
        assert_eq!(forced.unwrap().step_labels(), vec!["openai-forced"]);
    }

    #[test]
    fn test_chain_composition_gemini_only() {
        let cfg = TranslationConfig {
            gemini_api_key: Some("g".into()),
            ..Default::default()
        };
        let (default, forced) = build_translators(&cfg);
        assert_eq!(default.step_labels(), vec!["gemini"]);
        assert!(forced.is_none());
    }

    #[test]
    fn test_chain_composition_legacy_openai() {
        let cfg = TranslationConfig {
            openai_api_key: Some("o".into()),
            model: "gpt-4o".into(),
            ..Default::default()
        };
        let (default, _) = build_translators(&cfg);
        assert_eq!(default.step_labels(), vec!["openai"]);
    }
}
