//! Prompts for the LLM-backed summariser.
//!
//! Keeping every prompt here means the default behaviour (bullet count,
//! tone, table handling) changes in exactly one place, and unit tests can
//! inspect the prompts without a live model.
//!
//! Callers can override the system prompt via
//! [`crate::config::GenerationConfig::system_prompt`].

/// Default system prompt: condense one chunk of a paper into slide bullets.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a scientific assistant that turns passages of research papers into presentation slides.

Summarise the passage you are given into NO MORE THAN 5 short bullet points:
- Each bullet starts with the • symbol (U+2022) and sits on its own line.
- Use plain English and short, clear sentences.
- Focus on the main contributions, methods, or findings. Each bullet conveys one unique idea.
- Only write as many bullets as the content supports; do not pad to 5.
- Do not include math notation, LaTeX, or code. Describe what an equation expresses instead.
- Do not refer to images or tables explicitly.

Equations in the passage are tagged [E1], [E2], and so on. If a bullet relies on one,
end that bullet with its tag in this form: (Equation: E1). Only annotate relevant equations.

If the passage is a table (rows of cells separated by |), summarise its main results instead,
naming the best-performing rows and quoting the key numbers.

Output ONLY the bullets. Do NOT include titles, explanations, or any other text.
Do NOT wrap the output in code fences."#;

/// System prompt for the one-sentence caption under a figure or table.
pub const CAPTION_SYSTEM_PROMPT: &str = r#"You write captions for presentation slides made from research papers.

You are given the caption printed in the paper for a figure or a table, and some text around it.
Write ONE short sentence of 5 to 15 words that says what the figure shows or what the table finds.
Use plain English. Do not start with "Figure" or "Table". Do not restate numbering.

Output ONLY the caption sentence."#;

/// User message for a caption request.
pub fn caption_message(context: &str) -> String {
    format!(
        "{}\n\nWrite the slide caption now.",
        context.trim()
    )
}

/// Wrap a chunk's text in the user message sent alongside the system prompt.
pub fn user_message(chunk_text: &str) -> String {
    format!(
        "Passage:\n\"\"\"\n{}\n\"\"\"\n\nWrite the summary bullets now.",
        chunk_text.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_prompt_limits_bullets() {
        assert!(DEFAULT_SYSTEM_PROMPT.contains("NO MORE THAN 5"));
        assert!(DEFAULT_SYSTEM_PROMPT.contains('•'));
    }

    #[test]
    fn default_prompt_explains_equation_tags() {
        assert!(DEFAULT_SYSTEM_PROMPT.contains("[E1]"));
        assert!(DEFAULT_SYSTEM_PROMPT.contains("(Equation: E1)"));
    }

    #[test]
    fn caption_prompt_asks_for_one_sentence() {
        assert!(CAPTION_SYSTEM_PROMPT.contains("5 to 15 words"));
        assert!(caption_message("Figure caption: Figure 1: The Transformer.\n").ends_with("caption now."));
    }

    #[test]
    fn user_message_quotes_passage() {
        let msg = user_message("  3 Model\nThe encoder has six layers.\n");
        assert!(msg.starts_with("Passage:\n\"\"\"\n3 Model\nThe encoder"));
        assert!(msg.contains("six layers.\n\"\"\""));
    }
}
