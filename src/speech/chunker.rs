//! Incremental sentence detection over streamed tokens.

use std::sync::LazyLock;

use regex::Regex;

/// A sentence ends at terminal punctuation followed by whitespace or the end
/// of the buffer. The end-of-buffer case makes "3." split before "5" arrives,
/// which is accepted to get the first sentence out as early as possible.
static SENTENCE_END: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)^(.+?[.!?])(\s|$)").expect("sentence pattern is valid"));

/// Splits a token stream into speakable sentences as soon as they complete.
#[derive(Debug, Default)]
pub struct SentenceChunker {
    buffer: String,
}

impl SentenceChunker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a token and return every sentence it completed, in order.
    pub fn push(&mut self, token: &str) -> Vec<String> {
        self.buffer.push_str(token);

        let mut sentences = Vec::new();
        while let Some(caps) = SENTENCE_END.captures(&self.buffer) {
            let consumed = caps.get(0).map_or(0, |m| m.end());
            let sentence = caps.get(1).map_or("", |m| m.as_str()).trim().to_string();
            self.buffer.drain(..consumed);
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
        }
        sentences
    }

    /// End of stream: return the trailing fragment if it has any content.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let rest = rest.trim();
        (!rest.is_empty()).then(|| rest.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(tokens: &[&str]) -> Vec<String> {
        let mut chunker = SentenceChunker::new();
        let mut out: Vec<String> = tokens.iter().flat_map(|t| chunker.push(t)).collect();
        out.extend(chunker.finish());
        out
    }

    #[test]
    fn test_sentence_emitted_as_soon_as_complete() {
        let mut chunker = SentenceChunker::new();
        assert!(chunker.push("Drink plenty").is_empty());
        assert_eq!(chunker.push(" of water."), vec!["Drink plenty of water."]);
        assert_eq!(chunker.finish(), None);
    }

    #[test]
    fn test_multiple_sentences_in_one_token() {
        let mut chunker = SentenceChunker::new();
        let out = chunker.push("Rest well. Take paracetamol! Feeling better? Good");
        assert_eq!(out, vec!["Rest well.", "Take paracetamol!", "Feeling better?"]);
        assert_eq!(chunker.finish(), Some("Good".to_string()));
    }

    #[test]
    fn test_trailing_whitespace_is_not_an_utterance() {
        assert_eq!(stream(&["Hello", ".", "  \n"]), vec!["Hello."]);
    }

    #[test]
    fn test_decimal_split_is_accepted() {
        // "37." is complete when the token ends, before ".5" arrives
        assert_eq!(stream(&["Your temperature is 37.", "5 degrees."]), vec!["Your temperature is 37.", "5 degrees."]);
        // In a single token the dot is not followed by whitespace, so no split
        assert_eq!(stream(&["Your temperature is 37.5 degrees."]), vec!["Your temperature is 37.5 degrees."]);
    }

    #[test]
    fn test_newlines_stay_inside_sentence() {
        assert_eq!(stream(&["First line\nsecond line. Next"]), vec!["First line\nsecond line.", "Next"]);
    }

    #[test]
    fn test_boundary_count_matches_utterance_count() {
        let text = "You may have a cold. Drink warm fluids. Rest for two days. Does your throat hurt";
        let boundaries = 3;
        let splits: [&[usize]; 4] = [&[], &[1, 2, 3], &[5, 19, 20, 40], &[7, 30, 55, 70]];

        for cuts in splits {
            let mut tokens = Vec::new();
            let mut last = 0;
            for &cut in cuts {
                tokens.push(&text[last..cut]);
                last = cut;
            }
            tokens.push(&text[last..]);

            let utterances = stream(&tokens);
            assert_eq!(utterances.len(), boundaries + 1, "cuts {:?} -> {:?}", cuts, utterances);
            assert_eq!(utterances.last().map(String::as_str), Some("Does your throat hurt"));
        }

        assert_eq!(stream(&["One. Two. Three."]).len(), 3);
    }

    #[test]
    fn test_empty_stream_yields_nothing() {
        assert!(stream(&[]).is_empty());
        assert!(stream(&["", "   "]).is_empty());
    }
}
