// ============================================================================
// File: src/prompts.rs
// Task requests: input validation, prompt templates and language steering
// ============================================================================

use crate::error::ToolError;
use crate::models::{LanguagePreference, Message, ModelInput, TargetLanguage, TaskKind};

pub const DEFAULT_LEVEL: &str = "class-10";

pub const LEVELS: [&str; 5] = ["class-9", "class-10", "class-11", "class-12", "university"];

/// Bangla when the text contains anything from the Bengali block, otherwise
/// English.
pub fn detect_language(text: &str) -> TargetLanguage {
    if text.chars().any(|c| ('\u{0980}'..='\u{09FF}').contains(&c)) {
        TargetLanguage::Bangla
    } else {
        TargetLanguage::English
    }
}

pub fn resolve_language(preference: LanguagePreference, text: &str) -> TargetLanguage {
    match preference {
        LanguagePreference::English => TargetLanguage::English,
        LanguagePreference::Bangla => TargetLanguage::Bangla,
        LanguagePreference::Auto => detect_language(text),
    }
}

fn language_instruction(language: TargetLanguage) -> String {
    format!("Please respond in {} language.", language.name())
}

/// One immutable task request, built per call
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub kind: TaskKind,
    pub primary_text: String,
    pub level: Option<String>,
    pub language: Option<LanguagePreference>,
}

impl GenerationRequest {
    pub fn new(kind: TaskKind, primary_text: &str) -> Self {
        Self {
            kind,
            primary_text: primary_text.trim().to_string(),
            level: None,
            language: None,
        }
    }

    pub fn with_level(mut self, level: Option<&str>) -> Self {
        self.level = level.map(|l| l.trim().to_string()).filter(|l| !l.is_empty());
        self
    }

    pub fn with_language(mut self, language: LanguagePreference) -> Self {
        self.language = Some(language);
        self
    }

    pub fn level(&self) -> &str {
        self.level.as_deref().unwrap_or(DEFAULT_LEVEL)
    }

    /// Rejects empty input before anything leaves the process.
    pub fn validate(&self) -> Result<(), ToolError> {
        if !self.primary_text.is_empty() {
            return Ok(());
        }
        let message = match self.kind {
            TaskKind::Rule => "Please enter a grammar rule name",
            TaskKind::Correction => "Please enter text to correct",
            TaskKind::Explanation => "Please enter a sentence to explain",
            TaskKind::Exercise => "Please enter a grammar topic",
            TaskKind::Solve | TaskKind::QuickSolve => "Please enter a math problem",
            TaskKind::Concept => "Please enter a math concept",
            TaskKind::Practice => "Please enter a math topic",
            TaskKind::MusicGen => "Please enter a music description",
            TaskKind::ImageGen => "Please enter an image description",
            TaskKind::AudioConvert => "Please select a WAV file",
        };
        Err(ToolError::Validation(message.to_string()))
    }

    /// Language the reply is requested in; `None` for tasks without one.
    pub fn target_language(&self) -> Option<TargetLanguage> {
        match self.kind {
            TaskKind::Solve | TaskKind::Concept | TaskKind::Practice => Some(resolve_language(
                self.language.unwrap_or_default(),
                &self.primary_text,
            )),
            TaskKind::QuickSolve => Some(detect_language(&self.primary_text)),
            _ => None,
        }
    }

    /// What gets sent to the model: a single user message for chat tasks, the
    /// bare prompt for media generation.
    pub fn model_input(&self) -> ModelInput {
        match self.kind {
            TaskKind::MusicGen | TaskKind::ImageGen | TaskKind::AudioConvert => {
                ModelInput::Text(self.primary_text.clone())
            }
            _ => ModelInput::Messages(vec![Message::user(self.prompt())]),
        }
    }

    pub fn prompt(&self) -> String {
        let text = &self.primary_text;
        match self.kind {
            TaskKind::Rule => format!(
                "As a professional English grammar teacher, explain the grammar rule: \"{}\"\n\n\
                 Please provide:\n\
                 1. Definition of the rule\n\
                 2. 3-5 detailed examples showing correct usage\n\
                 3. Common mistakes to avoid\n\
                 4. Tips for remembering the rule\n\n\
                 Format the response clearly with sections and examples.",
                text
            ),
            TaskKind::Correction => format!(
                "As a professional English grammar editor, analyze and correct the following text:\n\n\
                 Text: \"{}\"\n\n\
                 Please provide:\n\
                 1. The corrected version of the text\n\
                 2. A list of mistakes found with explanations\n\
                 3. Grammar rules applied\n\
                 4. Overall assessment\n\n\
                 Be professional and helpful in your response.",
                text
            ),
            TaskKind::Explanation => format!(
                "As a professional English grammar teacher, provide a detailed explanation of the grammar in this sentence:\n\n\
                 Sentence: \"{}\"\n\n\
                 Please explain:\n\
                 1. The sentence structure (subject, verb, object, etc.)\n\
                 2. Tenses and their usage\n\
                 3. Any special grammar rules applied\n\
                 4. Why the sentence is correct or incorrect\n\
                 5. Similar example sentences\n\n\
                 Be clear and educational.",
                text
            ),
            TaskKind::Exercise => format!(
                "As a professional English grammar teacher, create a grammar exercise for {} level students on the topic: \"{}\"\n\n\
                 Please provide:\n\
                 1. 5-10 practice questions\n\
                 2. Different types: fill-in-the-blank, sentence correction, multiple choice\n\
                 3. Answer key with explanations\n\
                 4. Tips for solving each type\n\n\
                 Make it educational and helpful.",
                self.level(),
                text
            ),
            TaskKind::Solve => format!(
                "You are a professional mathematics tutor. Solve this math problem step by step.\n\n\
                 Problem: \"{}\"\n\n\
                 {}\n\n\
                 Please provide:\n\
                 1. Understanding the problem\n\
                 2. Step-by-step solution with clear explanations\n\
                 3. Verification of the answer\n\
                 4. Alternative methods if applicable\n\
                 5. Tips for similar problems\n\n\
                 Be clear, professional, and educational. Show all working and calculations.",
                text,
                self.language_line()
            ),
            TaskKind::Concept => format!(
                "You are a professional mathematics teacher. Explain this mathematical concept in detail.\n\n\
                 Concept: \"{}\"\n\n\
                 {}\n\n\
                 Please provide:\n\
                 1. Definition and core idea\n\
                 2. Historical context or origin\n\
                 3. 4-5 practical examples\n\
                 4. Real-world applications\n\
                 5. Common misconceptions and how to avoid them\n\
                 6. Practice problems\n\n\
                 Be thorough, clear, and educational.",
                text,
                self.language_line()
            ),
            TaskKind::Practice => format!(
                "You are a professional mathematics teacher. Create practice problems for {} level students on the topic: \"{}\"\n\n\
                 {}\n\n\
                 Please provide:\n\
                 1. 8-10 practice problems of increasing difficulty\n\
                 2. Different types: calculation, problem-solving, proof-based\n\
                 3. Complete solution with step-by-step explanations\n\
                 4. Difficulty rating for each problem\n\
                 5. Tips for approaching each type of problem\n\n\
                 Make them challenging but educational.",
                self.level(),
                text,
                self.language_line()
            ),
            TaskKind::QuickSolve => format!(
                "Solve this math problem quickly and provide the answer with brief working:\n\n\
                 Problem: \"{}\"\n\n\
                 Just give the answer with 2-3 lines of working. Keep it concise.",
                text
            ),
            TaskKind::MusicGen | TaskKind::ImageGen | TaskKind::AudioConvert => text.clone(),
        }
    }

    fn language_line(&self) -> String {
        language_instruction(self.target_language().unwrap_or(TargetLanguage::English))
    }
}
