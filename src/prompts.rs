//! System prompt loader
//!
//! Prompts live as Markdown files in a `prompts/` directory next to the
//! binary; every prompt also ships as a built-in default so the server
//! runs without the directory present.

use std::path::PathBuf;

use crate::error::{Error, Result};

/// Clinical assistant system prompt. The six-section response format and
/// the constraints below are a fixed contract with the frontend; keep
/// them intact when editing.
pub const CLINICAL_SYSTEM_PROMPT: &str = r#"
You are a highly knowledgeable AI medical assistant integrated with a clinical backend.

Your goal is to assist healthcare professionals by retrieving accurate information from a medical knowledge graph and returning well-structured, medically sound responses.

Respond to the user's query using the context below. Your answer **must follow a structured clinical format** when appropriate and **align with clinical communication standards**.

Format:
1. **Clinical Overview** – Summarize the topic or question concisely.
2. **Relevant Findings** – Use the context to expand on the user query with references to known diseases, treatments, or patient symptoms.
3. **Clinical Recommendations** – Where appropriate, offer medically accurate suggestions (not diagnoses), always framed as potential advice a physician may consider.
4. **Graph Context** – If Cypher or knowledge graph data contributes to the answer, refer to it clearly but in plain English.
5. **Example or Use Case** – Give an example scenario (clinical or patient-facing).
6. **Conclusion** – Recap key points clearly.

Always:
- Use medically accurate terminology.
- Avoid speculative advice.
- Do not hallucinate if context is insufficient.
- Maintain professionalism and follow clinical communication standards.

Context: {context}
"#;

/// Available prompts.
#[derive(Debug, Clone, Copy)]
pub enum Prompt {
    /// Clinical QA assistant (structured six-section answers).
    ClinicalAssistant,
}

impl Prompt {
    /// Prompt file name (Markdown).
    pub fn filename(&self) -> &'static str {
        match self {
            Prompt::ClinicalAssistant => "clinical_assistant.md",
        }
    }

    fn default_text(&self) -> &'static str {
        match self {
            Prompt::ClinicalAssistant => CLINICAL_SYSTEM_PROMPT,
        }
    }

    /// Load the prompt, preferring a file override over the built-in text.
    pub fn load(&self) -> String {
        load_prompt(self.filename()).unwrap_or_else(|_| self.default_text().to_string())
    }
}

/// Load a prompt by file name.
pub fn load_prompt(filename: &str) -> Result<String> {
    let path = prompts_dir().join(filename);
    std::fs::read_to_string(&path)
        .map_err(|e| Error::InvalidArgument(format!("Failed to load prompt {}: {}", filename, e)))
}

/// Path to the prompts directory.
pub fn prompts_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("PROMPTS_DIR") {
        return PathBuf::from(dir);
    }

    // Look for prompts/ relative to the working directory or its parent
    let candidates = [PathBuf::from("prompts"), PathBuf::from("../prompts")];

    for path in candidates {
        if path.exists() {
            return path;
        }
    }

    // Fallback
    PathBuf::from("prompts")
}

/// Render the clinical system prompt with the retrieved context filled in.
pub fn render_system_prompt(context: &str) -> String {
    Prompt::ClinicalAssistant.load().replace("{context}", context)
}
