//! Token-stream sentence accumulation
//!
//! Streamed completion tokens are chunked into sentences as they arrive so
//! synthesis can start before the full reply exists. A sentence closes on
//! a newline token or on a short token that starts with sentence-level
//! punctuation (the punctuation set covers CJK forms since the voice can
//! reply multilingually).

use std::sync::LazyLock;

use regex::Regex;

/// Punctuation that ends a spoken sentence
pub const SENTENCE_PUNCTUATION: &[char] =
    &['.', '?', '!', ':', ';', '。', '？', '！', '：', '；'];

/// Citation markers like `[doc1]` injected by grounded completions
static DOC_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[doc(\d+)\]").unwrap_or_else(|_| unreachable!("static pattern"))
});

/// Strip `[docN]` citation markers from display/spoken text
#[must_use]
pub fn scrub_doc_refs(text: &str) -> String {
    if DOC_REF.is_match(text) {
        DOC_REF.replace_all(text, "").trim().to_string()
    } else {
        text.to_string()
    }
}

/// Truncate a reply to at most `cap` words, appending an ellipsis when cut
#[must_use]
pub fn cap_words(text: &str, cap: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if cap == 0 || words.len() <= cap {
        return text.to_string();
    }
    let mut capped = words[..cap].join(" ");
    capped.push_str("...");
    capped
}

/// Incremental sentence splitter over streamed tokens
#[derive(Default)]
pub struct SentenceSplitter {
    buffer: String,
}

impl SentenceSplitter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one token; returns a completed sentence when one closes.
    ///
    /// Newline tokens act as hard sentence breaks and are not buffered.
    /// Tokens of one or two characters starting with sentence punctuation
    /// close the buffered sentence; longer tokens never do, since a token
    /// like "Dr." mid-stream is usually not a sentence end.
    pub fn push(&mut self, token: &str) -> Option<String> {
        if token == "\n" || token == "\n\n" {
            return self.flush();
        }
        let cleaned = token.replace('\n', "");
        self.buffer.push_str(&cleaned);

        let is_short = cleaned.chars().count() <= 2 && !cleaned.is_empty();
        if is_short
            && cleaned
                .chars()
                .next()
                .is_some_and(|c| SENTENCE_PUNCTUATION.contains(&c))
        {
            return self.flush();
        }
        None
    }

    /// Flush whatever is buffered, if anything
    pub fn flush(&mut self) -> Option<String> {
        let sentence = self.buffer.trim().to_string();
        self.buffer.clear();
        if sentence.is_empty() { None } else { Some(sentence) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split_all(tokens: &[&str]) -> Vec<String> {
        let mut splitter = SentenceSplitter::new();
        let mut sentences: Vec<String> =
            tokens.iter().filter_map(|t| splitter.push(t)).collect();
        if let Some(rest) = splitter.flush() {
            sentences.push(rest);
        }
        sentences
    }

    #[test]
    fn punctuation_token_closes_sentence() {
        let sentences = split_all(&["Hello", " there", ".", " How", " are", " you", "?"]);
        assert_eq!(sentences, vec!["Hello there.", "How are you?"]);
    }

    #[test]
    fn newline_token_is_a_hard_break() {
        let sentences = split_all(&["First line", "\n", "Second line"]);
        assert_eq!(sentences, vec!["First line", "Second line"]);
    }

    #[test]
    fn embedded_newline_is_stripped() {
        let sentences = split_all(&["Hel", "lo\nworld", "."]);
        assert_eq!(sentences, vec!["Helloworld."]);
    }

    #[test]
    fn cjk_punctuation_closes_sentence() {
        let sentences = split_all(&["你好", "。", "再见"]);
        assert_eq!(sentences, vec!["你好。", "再见"]);
    }

    #[test]
    fn long_token_with_period_does_not_close() {
        let sentences = split_all(&["See Dr.", " Smith today", "."]);
        assert_eq!(sentences, vec!["See Dr. Smith today."]);
    }

    #[test]
    fn doc_refs_are_scrubbed() {
        assert_eq!(scrub_doc_refs("Take Meclizine [doc1]"), "Take Meclizine");
        assert_eq!(scrub_doc_refs("no refs here"), "no refs here");
    }

    #[test]
    fn word_cap_truncates_with_ellipsis() {
        let text = "one two three four five";
        assert_eq!(cap_words(text, 3), "one two three...");
        assert_eq!(cap_words(text, 5), text);
        assert_eq!(cap_words(text, 0), text);
    }
}
