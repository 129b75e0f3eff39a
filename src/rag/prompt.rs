//! Prompt template for grounded answers.

/// What the model must answer when the context does not cover the question.
pub const REFUSAL_MESSAGE: &str = "I cannot find the answer in the provided document.";

/// Renders the instruction prompt for `question` over the retrieved chunk
/// texts. Chunks are placed in the context block verbatim, in the given
/// order, separated by blank lines.
pub fn compose_prompt<S: AsRef<str>>(document_title: &str, chunks: &[S], question: &str) -> String {
    let context = chunks
        .iter()
        .map(|chunk| chunk.as_ref())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are a helpful legal assistant specializing in {title}.\n\
         \n\
         Instructions:\n\
         1. Answer questions based ONLY on the provided context\n\
         2. If the answer is in the context, provide a clear, comprehensive answer\n\
         3. If the answer cannot be found in the context, respond with: \"{refusal}\"\n\
         4. Always be precise and cite relevant sections when possible\n\
         5. Use professional legal language but keep it accessible\n\
         \n\
         CONTEXT:\n\
         {context}\n\
         \n\
         QUESTION: {question}\n\
         \n\
         ANSWER:\n",
        title = document_title,
        refusal = REFUSAL_MESSAGE,
        context = context,
        question = question.trim(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const TITLE: &str = "India's Information Technology Act, 2000";

    #[test]
    fn mandates_the_refusal_string() {
        let prompt = compose_prompt(TITLE, &["Who won the cricket match?"], "Who won?");
        assert!(prompt.contains(&format!("respond with: \"{}\"", REFUSAL_MESSAGE)));
        assert!(prompt.contains("ONLY on the provided context"));
        assert!(prompt.starts_with(
            "You are a helpful legal assistant specializing in India's Information Technology Act, 2000."
        ));
    }

    #[test]
    fn context_keeps_chunks_verbatim_and_in_order() {
        let chunks = vec![
            "43. Penalty for damage to computer, computer system, etc.".to_string(),
            "66. Computer related offences.\n  If any person, dishonestly...".to_string(),
        ];
        let prompt = compose_prompt(TITLE, &chunks, "  What is section 66?  ");

        let context_start = prompt.find("CONTEXT:\n").unwrap();
        let question_start = prompt.find("QUESTION:").unwrap();
        let context = &prompt[context_start + "CONTEXT:\n".len()..question_start];
        assert_eq!(context.trim_end(), chunks.join("\n\n"));

        assert!(prompt.contains("QUESTION: What is section 66?\n"));
        assert!(prompt.ends_with("ANSWER:\n"));
    }

    #[test]
    fn empty_context_still_renders() {
        let prompt = compose_prompt::<&str>(TITLE, &[], "Anything?");
        assert!(prompt.contains("CONTEXT:\n\n\nQUESTION: Anything?"));
    }

    #[test]
    fn is_deterministic() {
        let chunks = ["a", "b"];
        assert_eq!(
            compose_prompt(TITLE, &chunks, "q"),
            compose_prompt(TITLE, &chunks, "q")
        );
    }
}
