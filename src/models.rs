// ============================================================================
// File: src/models.rs
// API request and response models
// ============================================================================

use serde::{Deserialize, Serialize};

/// Chat message sent to the inference API
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Message {
    pub role: String,  // "system", "user", or "assistant"
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// What a single model invocation receives
#[derive(Debug, Clone, PartialEq)]
pub enum ModelInput {
    /// Chat-style tasks: a structured message list
    Messages(Vec<Message>),
    /// Media-generation tasks: a raw prompt string
    Text(String),
}

/// Request body for the inference API
#[derive(Debug, Serialize)]
pub struct InferenceRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<&'a [Message]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<&'a str>,
    pub stream: bool,
}

impl<'a> From<&'a ModelInput> for InferenceRequest<'a> {
    fn from(input: &'a ModelInput) -> Self {
        match input {
            ModelInput::Messages(messages) => Self {
                messages: Some(messages),
                text: None,
                stream: false,
            },
            ModelInput::Text(text) => Self {
                messages: None,
                text: Some(text),
                stream: false,
            },
        }
    }
}

/// JSON envelope returned by the inference API
#[derive(Debug, Deserialize)]
pub struct InferenceResponse {
    #[serde(default)]
    pub error: Option<serde_json::Value>,
    #[serde(default)]
    pub output: serde_json::Value,
}

/// Untrusted result of one model call, before normalization
#[derive(Debug, Clone, PartialEq)]
pub enum RawModelResult {
    /// The service reported an error of its own
    Error(String),
    /// Any JSON shape: string, object, array of chunks, base64 payload...
    Json(serde_json::Value),
    /// A binary body such as generated audio or an image
    Binary { bytes: Vec<u8>, mime: Option<String> },
}

/// What the caller expects a model call to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Text,
    Image,
    Audio,
}

impl OutputKind {
    pub fn default_mime(&self) -> &'static str {
        match self {
            OutputKind::Text => "text/plain",
            OutputKind::Image => "image/png",
            OutputKind::Audio => "audio/wav",
        }
    }
}

/// Canonical, renderable result of a model call
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedOutput {
    Text(String),
    Media { uri: String, mime: String },
    Failure(String),
}

/// Every task the tools can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Rule,
    Correction,
    Explanation,
    Exercise,
    Solve,
    Concept,
    Practice,
    QuickSolve,
    MusicGen,
    ImageGen,
    AudioConvert,
}

/// Credential partition a task is billed against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolFamily {
    Grammar,
    Math,
    Media,
}

impl TaskKind {
    pub fn family(&self) -> ToolFamily {
        match self {
            TaskKind::Rule | TaskKind::Correction | TaskKind::Explanation | TaskKind::Exercise => {
                ToolFamily::Grammar
            }
            TaskKind::Solve | TaskKind::Concept | TaskKind::Practice | TaskKind::QuickSolve => {
                ToolFamily::Math
            }
            TaskKind::MusicGen | TaskKind::ImageGen | TaskKind::AudioConvert => ToolFamily::Media,
        }
    }

    pub fn output_kind(&self) -> OutputKind {
        match self {
            TaskKind::MusicGen | TaskKind::AudioConvert => OutputKind::Audio,
            TaskKind::ImageGen => OutputKind::Image,
            _ => OutputKind::Text,
        }
    }
}

/// Language selector offered by the math tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LanguagePreference {
    English,
    Bangla,
    #[default]
    Auto,
}

/// Language a reply is requested in, after auto-detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetLanguage {
    English,
    Bangla,
}

impl TargetLanguage {
    pub fn name(&self) -> &'static str {
        match self {
            TargetLanguage::English => "English",
            TargetLanguage::Bangla => "Bangla",
        }
    }
}

/// Uniform result envelope handed back to the caller
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolResponse {
    pub success: bool,
    pub result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<TargetLanguage>,
}

impl ToolResponse {
    pub fn ok(result: String) -> Self {
        Self {
            success: true,
            result,
            error: None,
            language: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            result: String::new(),
            error: Some(error.to_string()),
            language: None,
        }
    }

    pub fn with_language(mut self, language: Option<TargetLanguage>) -> Self {
        self.language = language;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn chat_input_serializes_messages_only() {
        let input = ModelInput::Messages(vec![Message::user("hi")]);
        let body = serde_json::to_value(InferenceRequest::from(&input)).unwrap();
        assert_eq!(
            body,
            json!({ "messages": [{ "role": "user", "content": "hi" }], "stream": false })
        );
    }

    #[test]
    fn text_input_serializes_text_only() {
        let input = ModelInput::Text("calm piano".to_string());
        let body = serde_json::to_value(InferenceRequest::from(&input)).unwrap();
        assert_eq!(body, json!({ "text": "calm piano", "stream": false }));
    }

    #[test]
    fn failed_envelope_omits_language_when_unset() {
        let body = serde_json::to_value(ToolResponse::failed("nope")).unwrap();
        assert_eq!(body, json!({ "success": false, "result": "", "error": "nope" }));
    }

    #[test]
    fn task_families_partition_credentials() {
        assert_eq!(TaskKind::Exercise.family(), ToolFamily::Grammar);
        assert_eq!(TaskKind::QuickSolve.family(), ToolFamily::Math);
        assert_eq!(TaskKind::MusicGen.family(), ToolFamily::Media);
        assert_eq!(TaskKind::MusicGen.output_kind(), OutputKind::Audio);
        assert_eq!(TaskKind::ImageGen.output_kind(), OutputKind::Image);
    }
}
