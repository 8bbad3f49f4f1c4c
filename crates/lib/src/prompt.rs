//! Grounded prompt construction: literal template substitution.

/// Fixed prompt template with `{context}` and `{question}` placeholders.
///
/// Substitution is a single pass over the template: placeholder tokens that
/// appear inside the substituted values are copied literally, never expanded.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

const CONTEXT_PLACEHOLDER: &str = "{context}";
const QUESTION_PLACEHOLDER: &str = "{question}";

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Substitute `{context}` and `{question}` into the template. Pure; no I/O.
    pub fn build(&self, context: &str, question: &str) -> String {
        let mut out = String::with_capacity(self.template.len() + context.len() + question.len());
        let mut rest = self.template.as_str();
        while let Some(i) = rest.find('{') {
            out.push_str(&rest[..i]);
            let tail = &rest[i..];
            if tail.starts_with(CONTEXT_PLACEHOLDER) {
                out.push_str(context);
                rest = &tail[CONTEXT_PLACEHOLDER.len()..];
            } else if tail.starts_with(QUESTION_PLACEHOLDER) {
                out.push_str(question);
                rest = &tail[QUESTION_PLACEHOLDER.len()..];
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        out
    }
}
