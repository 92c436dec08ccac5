// ============================================================================
// File: src/orchestrator.rs
// Routes each tool action through throttle, model, normalizer and formatter
// ============================================================================

use std::sync::Arc;
use tracing::{info, warn};

use crate::blob_store::BlobStore;
use crate::config::{Config, ModelSet};
use crate::error::ToolError;
use crate::formatter::Document;
use crate::llm_client::InferenceClient;
use crate::models::{
    LanguagePreference, NormalizedOutput, RawModelResult, TaskKind, ToolFamily, ToolResponse,
};
use crate::normalizer::normalize;
use crate::prompts::GenerationRequest;
use crate::throttle::{AdThrottle, PromoLauncher};
use crate::transcoder::{validate_wav, AudioFile, Transcoder};

/// How formatted text is handed back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStyle {
    Html,
    Terminal,
}

/// One client per credential partition
pub struct ToolClients {
    pub grammar: Arc<dyn InferenceClient>,
    pub math: Arc<dyn InferenceClient>,
    pub media: Arc<dyn InferenceClient>,
}

impl ToolClients {
    fn for_family(&self, family: ToolFamily) -> &dyn InferenceClient {
        match family {
            ToolFamily::Grammar => &*self.grammar,
            ToolFamily::Math => &*self.math,
            ToolFamily::Media => &*self.media,
        }
    }
}

pub struct ToolOrchestrator {
    clients: ToolClients,
    models: ModelSet,
    throttle: Arc<AdThrottle>,
    launcher: Box<dyn PromoLauncher>,
    ad_link: String,
    blobs: BlobStore,
    transcoder: Box<dyn Transcoder>,
    style: RenderStyle,
}

impl ToolOrchestrator {
    pub fn new(
        config: &Config,
        clients: ToolClients,
        throttle: Arc<AdThrottle>,
        launcher: Box<dyn PromoLauncher>,
        transcoder: Box<dyn Transcoder>,
    ) -> Self {
        Self {
            clients,
            models: config.models.clone(),
            throttle,
            launcher,
            ad_link: config.ad_link.clone(),
            blobs: BlobStore::new(),
            transcoder,
            style: RenderStyle::Html,
        }
    }

    pub fn with_style(mut self, style: RenderStyle) -> Self {
        self.style = style;
        self
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    // ---- grammar -------------------------------------------------------

    pub async fn grammar_rule(&self, rule_name: &str) -> ToolResponse {
        self.run(GenerationRequest::new(TaskKind::Rule, rule_name)).await
    }

    pub async fn correct_grammar(&self, text: &str) -> ToolResponse {
        self.run(GenerationRequest::new(TaskKind::Correction, text)).await
    }

    pub async fn explain_grammar(&self, sentence: &str) -> ToolResponse {
        self.run(GenerationRequest::new(TaskKind::Explanation, sentence)).await
    }

    pub async fn grammar_exercise(&self, topic: &str, level: Option<&str>) -> ToolResponse {
        self.run(GenerationRequest::new(TaskKind::Exercise, topic).with_level(level))
            .await
    }

    // ---- math ----------------------------------------------------------

    pub async fn solve_math(&self, question: &str, language: LanguagePreference) -> ToolResponse {
        self.run(GenerationRequest::new(TaskKind::Solve, question).with_language(language))
            .await
    }

    pub async fn explain_math_concept(&self, concept: &str, language: LanguagePreference) -> ToolResponse {
        self.run(GenerationRequest::new(TaskKind::Concept, concept).with_language(language))
            .await
    }

    pub async fn math_practice(
        &self,
        topic: &str,
        level: Option<&str>,
        language: LanguagePreference,
    ) -> ToolResponse {
        let request = GenerationRequest::new(TaskKind::Practice, topic)
            .with_level(level)
            .with_language(language);
        self.run(request).await
    }

    pub async fn quick_math_solve(&self, question: &str) -> ToolResponse {
        self.run(GenerationRequest::new(TaskKind::QuickSolve, question)).await
    }

    // ---- media ---------------------------------------------------------

    pub async fn generate_music(&self, prompt: &str) -> ToolResponse {
        self.run(GenerationRequest::new(TaskKind::MusicGen, prompt)).await
    }

    pub async fn generate_image(&self, prompt: &str) -> ToolResponse {
        self.run(GenerationRequest::new(TaskKind::ImageGen, prompt)).await
    }

    /// Validates the upload, counts the call, then runs the local encoder.
    /// The MP3 comes back as a `blob:` URI.
    pub async fn convert_wav_to_mp3(&self, file: &AudioFile) -> ToolResponse {
        if let Err(e) = validate_wav(&file.name, file.mime.as_deref(), file.size()) {
            return ToolResponse::failed(e);
        }
        self.count_call();

        match self.transcoder.wav_to_mp3(&file.bytes).await {
            Ok(mp3) if !mp3.is_empty() => {
                info!("converted {} ({} bytes) to MP3 ({} bytes)", file.name, file.size(), mp3.len());
                ToolResponse::ok(self.blobs.insert(mp3, "audio/mpeg"))
            }
            Ok(_) => ToolResponse::failed(ToolError::Transcode("Failed to convert audio file".to_string())),
            Err(e) => {
                warn!("WAV to MP3 conversion error: {}", e);
                ToolResponse::failed(e)
            }
        }
    }

    // ---- pipeline ------------------------------------------------------

    async fn run(&self, request: GenerationRequest) -> ToolResponse {
        let language = request.target_language();
        let outcome = self.execute(&request).await;
        if let Err(e) = &outcome {
            if e.is_local() {
                info!("{:?} rejected locally: {}", request.kind, e);
            } else {
                warn!("{:?} failed: {}", request.kind, e);
            }
        }
        let response = match outcome {
            Ok(result) => ToolResponse::ok(result),
            Err(e) => ToolResponse::failed(e),
        };
        response.with_language(language)
    }

    async fn execute(&self, request: &GenerationRequest) -> Result<String, ToolError> {
        request.validate()?;
        self.count_call();

        let family = request.kind.family();
        let model = self.model_for(request.kind);
        let raw = self
            .clients
            .for_family(family)
            .run(model, &request.model_input())
            .await?;

        match normalize(&raw, request.kind.output_kind(), &self.blobs) {
            NormalizedOutput::Failure(message) => match raw {
                RawModelResult::Error(_) => Err(ToolError::Remote(message)),
                _ => Err(ToolError::Extraction(no_output_message(request.kind).to_string())),
            },
            NormalizedOutput::Media { uri, .. } => Ok(uri),
            NormalizedOutput::Text(text) => {
                let document = Document::parse(&prepare_text(family, &text));
                if document.is_empty() {
                    return Err(ToolError::Extraction(no_output_message(request.kind).to_string()));
                }
                Ok(match self.style {
                    RenderStyle::Html => document.render_html(),
                    RenderStyle::Terminal => document.render_terminal(),
                })
            }
        }
    }

    /// Counts one generation call and opens the promotional link when due.
    fn count_call(&self) {
        if self.throttle.check_and_update().should_fire {
            if let Err(e) = self.launcher.launch(&self.ad_link) {
                warn!("Error opening ad: {:#}", e);
            }
        }
    }

    fn model_for(&self, kind: TaskKind) -> &str {
        match kind {
            TaskKind::MusicGen | TaskKind::AudioConvert => &self.models.music,
            TaskKind::ImageGen => &self.models.image,
            _ => match kind.family() {
                ToolFamily::Math => &self.models.math,
                _ => &self.models.grammar,
            },
        }
    }
}

fn no_output_message(kind: TaskKind) -> &'static str {
    match kind {
        TaskKind::MusicGen => "No audio received from API",
        TaskKind::ImageGen => "No image received from API",
        _ => "No output received from API",
    }
}

/// Keeps meaning that sanitizing would destroy: list bullets everywhere, and
/// multiplication signs in math answers.
fn prepare_text(family: ToolFamily, text: &str) -> String {
    let bulleted = text
        .lines()
        .map(|line| {
            let indent = line.len() - line.trim_start().len();
            let rest = &line[indent..];
            match rest.strip_prefix("* ").or_else(|| rest.strip_prefix("- ")) {
                Some(item) => format!("{}\u{2022} {}", &line[..indent], item),
                None => line.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    match family {
        ToolFamily::Math => multiplication_signs(&bulleted),
        _ => bulleted,
    }
}

/// Turns a lone `*` between two operands into `×`. Runs like `**bold**` are
/// left for sanitizing to strip.
fn multiplication_signs(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    chars
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            if c == '*' && is_operator_star(&chars, i) {
                '\u{00D7}'
            } else {
                c
            }
        })
        .collect()
}

fn is_operator_star(chars: &[char], i: usize) -> bool {
    if (i > 0 && chars[i - 1] == '*') || chars.get(i + 1) == Some(&'*') {
        return false;
    }
    let inline_space = |c: &&char| **c == ' ' || **c == '\t';
    let left = chars[..i].iter().rev().find(|c| !inline_space(c));
    let right = chars[i + 1..].iter().find(|c| !inline_space(c));
    matches!(left, Some(c) if c.is_alphanumeric() || matches!(*c, ')' | ']'))
        && matches!(right, Some(c) if c.is_alphanumeric() || matches!(*c, '(' | '['))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelInput;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays one scripted result and records every call.
    struct ScriptedClient {
        reply: Result<RawModelResult, ToolError>,
        calls: Mutex<Vec<(String, ModelInput)>>,
    }

    impl ScriptedClient {
        fn new(reply: Result<RawModelResult, ToolError>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(String, ModelInput)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl InferenceClient for ScriptedClient {
        async fn run(&self, model: &str, input: &ModelInput) -> Result<RawModelResult, ToolError> {
            self.calls.lock().unwrap().push((model.to_string(), input.clone()));
            self.reply.clone()
        }
    }

    #[derive(Default)]
    struct CountingTranscoder {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl Transcoder for Arc<CountingTranscoder> {
        async fn wav_to_mp3(&self, wav: &[u8]) -> Result<Vec<u8>, ToolError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok([b"ID3".as_slice(), wav].concat())
        }
    }

    #[derive(Default)]
    struct RecordingLauncher {
        opened: Mutex<Vec<String>>,
        fail: bool,
    }

    impl PromoLauncher for Arc<RecordingLauncher> {
        fn launch(&self, url: &str) -> anyhow::Result<()> {
            self.opened.lock().unwrap().push(url.to_string());
            if self.fail {
                anyhow::bail!("no browser");
            }
            Ok(())
        }
    }

    struct Harness {
        orchestrator: ToolOrchestrator,
        client: Arc<ScriptedClient>,
        throttle: Arc<AdThrottle>,
        launcher: Arc<RecordingLauncher>,
        transcoder: Arc<CountingTranscoder>,
    }

    fn harness(reply: Result<RawModelResult, ToolError>) -> Harness {
        harness_with(reply, RecordingLauncher::default())
    }

    fn harness_with(reply: Result<RawModelResult, ToolError>, launcher: RecordingLauncher) -> Harness {
        let client = ScriptedClient::new(reply);
        let throttle = Arc::new(AdThrottle::in_memory());
        let launcher = Arc::new(launcher);
        let transcoder = Arc::new(CountingTranscoder::default());
        let clients = ToolClients {
            grammar: client.clone(),
            math: client.clone(),
            media: client.clone(),
        };
        let orchestrator = ToolOrchestrator::new(
            &Config::default(),
            clients,
            throttle.clone(),
            Box::new(launcher.clone()),
            Box::new(transcoder.clone()),
        );
        Harness {
            orchestrator,
            client,
            throttle,
            launcher,
            transcoder,
        }
    }

    fn text_reply(text: &str) -> Result<RawModelResult, ToolError> {
        Ok(RawModelResult::Json(json!(text)))
    }

    #[tokio::test]
    async fn grammar_rule_happy_path() {
        let h = harness(text_reply("Definition: a tense for completed actions. Example: I have eaten."));
        let response = h.orchestrator.grammar_rule("Present Perfect Tense").await;

        assert!(response.success, "{:?}", response);
        assert_eq!(response.error, None);
        assert!(response.result.contains("Definition: a tense for completed actions."));

        let calls = h.client.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "openai/gpt-4.1");
        match &calls[0].1 {
            ModelInput::Messages(messages) => {
                assert_eq!(messages.len(), 1);
                assert!(messages[0].content.contains("\"Present Perfect Tense\""));
            }
            other => panic!("expected chat input, got {:?}", other),
        }
        assert_eq!(h.throttle.peek().click_count, 1);
    }

    #[tokio::test]
    async fn result_is_sanitized() {
        let h = harness(text_reply("## Rule\n**Important**: don't `mix` tenses"));
        let response = h.orchestrator.correct_grammar("he go").await;
        assert!(response.success);
        for c in ['#', '*', '\'', '`'] {
            assert!(!response.result.contains(c));
        }
    }

    #[tokio::test]
    async fn empty_input_never_reaches_the_network() {
        let h = harness(text_reply("unused"));
        let responses = vec![
            h.orchestrator.grammar_rule("").await,
            h.orchestrator.explain_grammar("   ").await,
            h.orchestrator.grammar_exercise("", Some("class-9")).await,
            h.orchestrator.solve_math("", LanguagePreference::Auto).await,
            h.orchestrator.quick_math_solve("").await,
            h.orchestrator.generate_music("").await,
        ];
        for response in responses {
            assert!(!response.success);
            assert!(response.error.unwrap().starts_with("Please"));
        }
        assert!(h.client.calls().is_empty());
        assert_eq!(h.throttle.peek().click_count, 0);
    }

    #[tokio::test]
    async fn remote_error_is_prefixed_and_still_counted() {
        let h = harness(Ok(RawModelResult::Error("model unavailable".to_string())));
        let response = h.orchestrator.explain_grammar("She sings.").await;
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("Error: model unavailable"));
        assert_eq!(h.throttle.peek().click_count, 1);
    }

    #[tokio::test]
    async fn transport_failure_is_reported() {
        let h = harness(Err(ToolError::transport("")));
        let response = h.orchestrator.quick_math_solve("2+2").await;
        assert_eq!(response.error.as_deref(), Some("Service error: Unknown error"));
        assert_eq!(h.throttle.peek().click_count, 1);
    }

    #[tokio::test]
    async fn unusable_reply_is_an_extraction_failure() {
        let h = harness(Ok(RawModelResult::Json(json!(null))));
        let response = h.orchestrator.grammar_rule("Articles").await;
        assert_eq!(response.error.as_deref(), Some("No output received from API"));
    }

    #[tokio::test]
    async fn bangla_question_resolves_language() {
        let h = harness(text_reply("উত্তর: ৪"));
        let response = h.orchestrator.solve_math("২ + ২ কত", LanguagePreference::Auto).await;
        assert!(response.success);
        assert_eq!(response.language, Some(crate::models::TargetLanguage::Bangla));
        match &h.client.calls()[0].1 {
            ModelInput::Messages(messages) => {
                assert!(messages[0].content.contains("Please respond in Bangla language."));
            }
            other => panic!("expected chat input, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn math_keeps_multiplication() {
        let h = harness(text_reply("Answer\n3 * 4 = 12"));
        let response = h.orchestrator.solve_math("3 times 4", LanguagePreference::English).await;
        assert!(response.result.contains("3 \u{00D7} 4 = 12"));
    }

    #[tokio::test]
    async fn promo_fires_on_first_and_fourth_calls() {
        let h = harness(text_reply("Some answer here"));
        for _ in 0..4 {
            h.orchestrator.grammar_rule("Articles").await;
        }
        let opened = h.launcher.opened.lock().unwrap().clone();
        assert_eq!(opened.len(), 2);
        assert!(opened.iter().all(|url| url == "https://omg10.com/4/10649293"));
    }

    #[tokio::test]
    async fn launcher_failure_does_not_fail_the_call() {
        let launcher = RecordingLauncher {
            fail: true,
            ..RecordingLauncher::default()
        };
        let h = harness_with(text_reply("Fine answer"), launcher);
        let response = h.orchestrator.grammar_rule("Articles").await;
        assert!(response.success);
    }

    #[tokio::test]
    async fn music_returns_playable_uri() {
        let h = harness(Ok(RawModelResult::Json(json!({ "audio": "UklGRg==" }))));
        let response = h.orchestrator.generate_music("calm piano").await;
        assert!(response.success);
        assert_eq!(response.result, "data:audio/wav;base64,UklGRg==");
        assert_eq!(h.client.calls()[0].0, "facebook/musicgen-melody");
        assert_eq!(h.client.calls()[0].1, ModelInput::Text("calm piano".to_string()));
    }

    #[tokio::test]
    async fn binary_image_is_registered_as_blob() {
        let h = harness(Ok(RawModelResult::Binary {
            bytes: vec![137, 80, 78, 71],
            mime: Some("image/png".to_string()),
        }));
        let response = h.orchestrator.generate_image("a red fox").await;
        assert!(response.result.starts_with("blob:"));
        assert_eq!(h.orchestrator.blobs().get(&response.result).unwrap().bytes, vec![137, 80, 78, 71]);
    }

    #[tokio::test]
    async fn missing_media_reports_kind_specific_message() {
        let h = harness(Ok(RawModelResult::Json(json!({ "status": "ok" }))));
        let response = h.orchestrator.generate_music("drums").await;
        assert_eq!(response.error.as_deref(), Some("No audio received from API"));
    }

    #[tokio::test]
    async fn oversized_wav_is_rejected_before_transcoding() {
        let h = harness(text_reply("unused"));
        let file = AudioFile {
            name: "huge.wav".to_string(),
            mime: Some("audio/wav".to_string()),
            bytes: vec![0u8; 150 * 1024 * 1024],
        };
        let response = h.orchestrator.convert_wav_to_mp3(&file).await;
        assert!(!response.success);
        assert!(response.error.unwrap().contains("too large"));
        assert_eq!(h.transcoder.runs.load(Ordering::SeqCst), 0);
        assert_eq!(h.throttle.peek().click_count, 0);
    }

    #[tokio::test]
    async fn wrong_type_is_rejected_before_transcoding() {
        let h = harness(text_reply("unused"));
        let file = AudioFile {
            name: "song.mp3".to_string(),
            mime: Some("audio/mpeg".to_string()),
            bytes: vec![1, 2, 3],
        };
        let response = h.orchestrator.convert_wav_to_mp3(&file).await;
        assert!(response.error.unwrap().contains("valid WAV"));
        assert_eq!(h.transcoder.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn wav_conversion_yields_mp3_blob() {
        let h = harness(text_reply("unused"));
        let file = AudioFile {
            name: "take.wav".to_string(),
            mime: None,
            bytes: b"RIFF".to_vec(),
        };
        let response = h.orchestrator.convert_wav_to_mp3(&file).await;
        assert!(response.success);
        let blob = h.orchestrator.blobs().get(&response.result).unwrap();
        assert_eq!(blob.mime, "audio/mpeg");
        assert_eq!(blob.bytes, b"ID3RIFF".to_vec());
        assert_eq!(h.transcoder.runs.load(Ordering::SeqCst), 1);
        assert!(h.client.calls().is_empty());
    }

    #[test]
    fn bullets_survive_sanitizing() {
        assert_eq!(prepare_text(ToolFamily::Grammar, "* one\n  - two"), "\u{2022} one\n  \u{2022} two");
        assert_eq!(prepare_text(ToolFamily::Math, "2*3"), "2\u{00D7}3");
        assert_eq!(prepare_text(ToolFamily::Math, "(a + b) * [c]"), "(a + b) \u{00D7} [c]");
    }

    #[test]
    fn math_bold_markers_are_not_multiplication() {
        let prepared = prepare_text(ToolFamily::Math, "**Step 1:** Multiply 3 * 4\n**Answer:** 12");
        assert_eq!(prepared, "**Step 1:** Multiply 3 \u{00D7} 4\n**Answer:** 12");
        assert_eq!(prepare_text(ToolFamily::Math, "*Hint:* try 5"), "*Hint:* try 5");
    }

    #[tokio::test]
    async fn math_answer_label_survives_as_heading() {
        let h = harness(text_reply("Solving the product\n**Answer:**\n3 * 4 = 12"));
        let response = h.orchestrator.solve_math("3 times 4", LanguagePreference::English).await;
        assert!(response.success);
        assert!(!response.result.contains("\u{00D7}\u{00D7}"));
        assert!(response.result.contains("<h3>Answer:</h3>"));
        assert!(response.result.contains("<p>3 \u{00D7} 4 = 12</p>"));
    }
}
