use std::sync::OnceLock;

use regex::Regex;

/// One sentence of the cleaned article text. Offsets index into the cleaned
/// text the span was produced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentenceSpan {
    pub index: usize,
    pub start: usize,
    pub end: usize,
}

/// Paragraph span, delimited by one or more blank lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParagraphSpan {
    pub index: usize,
    pub start: usize,
    pub end: usize,
}

/// Capability seam for sentence segmentation: both the NER auditor and the
/// position tracker depend on it, and a regex implementation keeps the
/// pipeline correct when no model-backed segmenter is wired in.
pub trait SentenceSegmenter: Send + Sync {
    fn sentences(&self, text: &str) -> Vec<SentenceSpan>;
}

/// Deterministic segmenter: a sentence ends at `.`, `?` or `!` (plus closing
/// quotes/brackets) followed by whitespace, unless the next letter is
/// lowercase or the terminator belongs to a known abbreviation.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegexSegmenter;

// Title abbreviations that end with a period mid-sentence.
const ABBREVIATIONS: &[&str] = &[
    "Mr", "Mrs", "Ms", "Dr", "Gov", "Sen", "Rep", "Hon", "Rev", "Prof", "Gen", "Lt", "Sgt", "St",
    "Jr", "Sr", "Inc", "Corp", "Co", "Ltd", "Dept", "Univ", "vs", "etc", "U.S", "a.m", "p.m",
];

fn boundary_regex() -> &'static Regex {
    static BOUNDARY: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    BOUNDARY.get_or_init(|| {
        Regex::new(r#"[.!?]+[)\]"']*\s+"#).expect("sentence boundary pattern is valid")
    })
}

impl RegexSegmenter {
    fn is_abbreviation(text: &str, terminator_start: usize) -> bool {
        let head = &text[..terminator_start];
        ABBREVIATIONS
            .iter()
            .any(|abbr| head.ends_with(abbr) && !head[..head.len() - abbr.len()].ends_with(char::is_alphabetic))
    }

    fn next_alpha_is_lowercase(text: &str, from: usize) -> bool {
        text[from..]
            .chars()
            .find(|c| c.is_alphabetic())
            .is_some_and(char::is_lowercase)
    }
}

impl SentenceSegmenter for RegexSegmenter {
    fn sentences(&self, text: &str) -> Vec<SentenceSpan> {
        let mut spans = Vec::new();
        let mut start = 0usize;

        for m in boundary_regex().find_iter(text) {
            if Self::is_abbreviation(text, m.start()) {
                continue;
            }
            if Self::next_alpha_is_lowercase(text, m.end()) {
                continue;
            }

            let end = m.start() + terminator_len(&text[m.start()..m.end()]);
            if text[start..end].trim().is_empty() {
                start = m.end();
                continue;
            }

            spans.push(SentenceSpan {
                index: spans.len(),
                start: start + leading_whitespace(&text[start..end]),
                end,
            });
            start = m.end();
        }

        if !text[start..].trim().is_empty() {
            spans.push(SentenceSpan {
                index: spans.len(),
                start: start + leading_whitespace(&text[start..]),
                end: text.trim_end().len(),
            });
        }

        spans
    }
}

fn terminator_len(matched: &str) -> usize {
    matched.trim_end().len()
}

fn leading_whitespace(s: &str) -> usize {
    s.len() - s.trim_start().len()
}

/// Paragraphs are separated by one or more blank lines.
pub fn paragraph_spans(text: &str) -> Vec<ParagraphSpan> {
    static BLANK_LINE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    let splitter =
        BLANK_LINE.get_or_init(|| Regex::new(r"\n[ \t]*\n+").expect("blank line pattern is valid"));

    let mut spans = Vec::new();
    let mut start = 0usize;

    for gap in splitter.find_iter(text) {
        if !text[start..gap.start()].trim().is_empty() {
            spans.push(ParagraphSpan {
                index: spans.len(),
                start,
                end: gap.start(),
            });
        }
        start = gap.end();
    }

    if !text[start..].trim().is_empty() {
        spans.push(ParagraphSpan {
            index: spans.len(),
            start,
            end: text.len(),
        });
    }

    spans
}

/// Sentence index covering the given offset, if any.
pub fn sentence_index_at(spans: &[SentenceSpan], offset: usize) -> Option<usize> {
    spans
        .iter()
        .find(|s| offset >= s.start && offset < s.end)
        .map(|s| s.index)
}

/// Paragraph index covering the given offset, if any.
pub fn paragraph_index_at(spans: &[ParagraphSpan], offset: usize) -> Option<usize> {
    spans
        .iter()
        .find(|p| offset >= p.start && offset < p.end)
        .map(|p| p.index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_simple_sentences() {
        let text = "Governor Phil Scott signed H.100 on Tuesday. The Vermont Legislature passed it unanimously.";
        let spans = RegexSegmenter.sentences(text);

        assert_eq!(spans.len(), 2);
        assert_eq!(
            &text[spans[0].start..spans[0].end],
            "Governor Phil Scott signed H.100 on Tuesday."
        );
        assert_eq!(
            &text[spans[1].start..spans[1].end],
            "The Vermont Legislature passed it unanimously."
        );
    }

    #[test]
    fn test_honorific_does_not_split() {
        let text = "Sen. Baruth spoke first. Rep. Krowinski followed.";
        let spans = RegexSegmenter.sentences(text);

        assert_eq!(spans.len(), 2);
        assert_eq!(&text[spans[0].start..spans[0].end], "Sen. Baruth spoke first.");
    }

    #[test]
    fn test_lowercase_continuation_does_not_split() {
        let text = "The project cost $4.5 million. it was over budget.";
        let spans = RegexSegmenter.sentences(text);

        // "million. it" continues because the next letter is lowercase.
        assert_eq!(spans.len(), 1);
    }

    #[test]
    fn test_question_and_exclamation_terminate() {
        let text = "Will the bill pass? Supporters say yes! The vote is Friday.";
        let spans = RegexSegmenter.sentences(text);

        assert_eq!(spans.len(), 3);
        assert_eq!(&text[spans[1].start..spans[1].end], "Supporters say yes!");
    }

    #[test]
    fn test_trailing_text_without_terminator() {
        let text = "First sentence. A trailing fragment";
        let spans = RegexSegmenter.sentences(text);

        assert_eq!(spans.len(), 2);
        assert_eq!(&text[spans[1].start..spans[1].end], "A trailing fragment");
    }

    #[test]
    fn test_empty_text_yields_no_spans() {
        assert!(RegexSegmenter.sentences("").is_empty());
        assert!(RegexSegmenter.sentences("   \n ").is_empty());
    }

    #[test]
    fn test_paragraph_spans() {
        let text = "First paragraph line one.\nLine two.\n\nSecond paragraph.\n\n\nThird.";
        let paragraphs = paragraph_spans(text);

        assert_eq!(paragraphs.len(), 3);
        assert!(text[paragraphs[0].start..paragraphs[0].end].contains("Line two."));
        assert_eq!(&text[paragraphs[2].start..paragraphs[2].end], "Third.");
    }

    #[test]
    fn test_index_lookups() {
        let text = "One sentence here. Another one follows.";
        let sentences = RegexSegmenter.sentences(text);

        assert_eq!(sentence_index_at(&sentences, 0), Some(0));
        let second_start = sentences[1].start;
        assert_eq!(sentence_index_at(&sentences, second_start), Some(1));
        assert_eq!(sentence_index_at(&sentences, text.len() + 5), None);
    }
}
