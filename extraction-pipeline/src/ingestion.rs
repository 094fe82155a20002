use std::sync::OnceLock;

use common::error::AppError;
use regex::Regex;

use crate::nlp::segmenter::{SentenceSegmenter, SentenceSpan};

/// Chunking bounds, counted in whitespace tokens.
#[derive(Debug, Clone, Copy)]
pub struct ChunkingOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            chunk_size: 200,
            chunk_overlap: 50,
        }
    }
}

/// A sentence-aligned slice of the cleaned text. Transient; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub char_start: usize,
    pub char_end: usize,
    /// Inclusive range of sentence indices this chunk covers.
    pub sentence_start: usize,
    pub sentence_end: usize,
}

#[derive(Debug, Clone)]
pub struct CleanedArticle {
    pub text: String,
    pub chunks: Vec<Chunk>,
    pub sentences: Vec<SentenceSpan>,
}

// Fragments that mark feed boilerplate rather than article prose.
const BOILERPLATE_SENTINELS: &[&str] = &[
    "ADVERTISEMENT",
    "Advertisement",
    "Read more:",
    "Sign up for our newsletter",
    "Subscribe to our newsletter",
    "Click here to subscribe",
    "Related coverage:",
];

fn tag_regex() -> &'static Regex {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    TAGS.get_or_init(|| Regex::new(r"(?is)<script.*?</script>|<style.*?</style>|<[^>]+>").expect("tag pattern is valid"))
}

fn horizontal_ws_regex() -> &'static Regex {
    static WS: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    WS.get_or_init(|| Regex::new(r"[ \t\r\x0b\x0c]+").expect("whitespace pattern is valid"))
}

fn blank_lines_regex() -> &'static Regex {
    static BLANKS: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    BLANKS.get_or_init(|| Regex::new(r"\n{3,}").expect("blank line pattern is valid"))
}

/// Strips markup and boilerplate, normalizes whitespace (paragraph breaks
/// survive as blank lines), and splits the result into sentence-aligned
/// chunks. Fails when nothing is left after cleaning.
pub fn clean_and_chunk(
    raw: &str,
    options: &ChunkingOptions,
    segmenter: &dyn SentenceSegmenter,
) -> Result<CleanedArticle, AppError> {
    let text = clean_text(raw);
    if text.is_empty() {
        return Err(AppError::Input(
            "article text is empty after cleaning".to_string(),
        ));
    }

    let sentences = segmenter.sentences(&text);
    let chunks = chunk_sentences(&text, &sentences, options);

    Ok(CleanedArticle {
        text,
        chunks,
        sentences,
    })
}

pub fn clean_text(raw: &str) -> String {
    let without_tags = tag_regex().replace_all(raw, " ");

    let decoded = without_tags
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");

    let mut cleaned = decoded;
    for sentinel in BOILERPLATE_SENTINELS {
        cleaned = cleaned.replace(sentinel, " ");
    }

    let collapsed = horizontal_ws_regex().replace_all(&cleaned, " ");
    let lines: Vec<&str> = collapsed.split('\n').map(str::trim).collect();
    let rejoined = lines.join("\n");
    blank_lines_regex()
        .replace_all(&rejoined, "\n\n")
        .trim()
        .to_string()
}

fn token_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn chunk_sentences(
    text: &str,
    sentences: &[SentenceSpan],
    options: &ChunkingOptions,
) -> Vec<Chunk> {
    if sentences.is_empty() {
        return vec![Chunk {
            text: text.to_string(),
            char_start: 0,
            char_end: text.len(),
            sentence_start: 0,
            sentence_end: 0,
        }];
    }

    let chunk_size = options.chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut current: Vec<&SentenceSpan> = Vec::new();
    let mut current_tokens = 0usize;

    let flush = |chunks: &mut Vec<Chunk>, current: &[&SentenceSpan]| {
        if current.is_empty() {
            return;
        }
        let start = current[0].start;
        let end = current[current.len() - 1].end;
        chunks.push(Chunk {
            text: text[start..end].to_string(),
            char_start: start,
            char_end: end,
            sentence_start: current[0].index,
            sentence_end: current[current.len() - 1].index,
        });
    };

    for sentence in sentences {
        let tokens = token_count(&text[sentence.start..sentence.end]);

        // A lone oversize sentence becomes its own chunk rather than being
        // split mid-sentence.
        if tokens >= chunk_size && current.is_empty() {
            flush(&mut chunks, &[sentence]);
            continue;
        }

        if current_tokens + tokens > chunk_size && !current.is_empty() {
            flush(&mut chunks, &current);

            // Carry trailing sentences into the next chunk as overlap.
            let mut overlap: Vec<&SentenceSpan> = Vec::new();
            let mut overlap_tokens = 0usize;
            for span in current.iter().rev().copied() {
                let span_tokens = token_count(&text[span.start..span.end]);
                if overlap_tokens + span_tokens > options.chunk_overlap {
                    break;
                }
                overlap_tokens += span_tokens;
                overlap.push(span);
            }
            overlap.reverse();
            current = overlap;
            current_tokens = overlap_tokens;

            if tokens >= chunk_size {
                flush(&mut chunks, &[sentence]);
                current.clear();
                current_tokens = 0;
                continue;
            }
        }

        current.push(sentence);
        current_tokens += tokens;
    }

    flush(&mut chunks, &current);

    // An overlap-only tail that duplicates the previous chunk adds nothing.
    if chunks.len() > 1 {
        let last = &chunks[chunks.len() - 1];
        let prev = &chunks[chunks.len() - 2];
        if last.char_start >= prev.char_start && last.char_end <= prev.char_end {
            chunks.pop();
        }
    }

    chunks
}

/// Sentence-aligned extraction input under a token budget: the prompt text
/// ends at the last chunk boundary that still fits. Local reporting almost
/// always fits whole; this bounds the pathological tail.
pub fn extraction_input<'a>(cleaned: &'a CleanedArticle, max_tokens: usize) -> &'a str {
    if token_count(&cleaned.text) <= max_tokens {
        return &cleaned.text;
    }

    let mut end = cleaned
        .chunks
        .first()
        .map_or(cleaned.text.len(), |c| c.char_end);

    for chunk in &cleaned.chunks {
        if token_count(&cleaned.text[..chunk.char_end]) > max_tokens {
            break;
        }
        end = chunk.char_end;
    }

    &cleaned.text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlp::segmenter::RegexSegmenter;

    fn chunk(raw: &str, size: usize, overlap: usize) -> CleanedArticle {
        clean_and_chunk(
            raw,
            &ChunkingOptions {
                chunk_size: size,
                chunk_overlap: overlap,
            },
            &RegexSegmenter,
        )
        .expect("clean and chunk")
    }

    #[test]
    fn test_empty_after_cleaning_is_an_input_error() {
        let result = clean_and_chunk(
            "<div><script>var x = 1;</script></div>",
            &ChunkingOptions::default(),
            &RegexSegmenter,
        );

        assert!(matches!(result, Err(AppError::Input(_))));
    }

    #[test]
    fn test_html_is_stripped_and_entities_decoded() {
        let cleaned = clean_text("<p>Budget &amp; taxes rose.</p><style>p{}</style>");
        assert_eq!(cleaned, "Budget & taxes rose.");
    }

    #[test]
    fn test_boilerplate_sentinels_removed() {
        let cleaned = clean_text("The board met. ADVERTISEMENT Sign up for our newsletter now.");
        assert!(!cleaned.contains("ADVERTISEMENT"));
        assert!(!cleaned.contains("newsletter"));
        assert!(cleaned.contains("The board met."));
    }

    #[test]
    fn test_paragraph_breaks_survive_cleaning() {
        let cleaned = clean_text("First paragraph.\n\n\n\nSecond paragraph.");
        assert_eq!(cleaned, "First paragraph.\n\nSecond paragraph.");
    }

    #[test]
    fn test_sentences_never_straddle_chunks() {
        let raw = "One two three four five. Six seven eight nine ten. \
                   Eleven twelve thirteen fourteen fifteen. Sixteen seventeen eighteen nineteen twenty.";
        let article = chunk(raw, 10, 5);

        assert!(article.chunks.len() > 1);
        for c in &article.chunks {
            assert!(
                c.text.trim_end().ends_with('.'),
                "chunk should end on a sentence boundary: {:?}",
                c.text
            );
        }
    }

    #[test]
    fn test_chunks_overlap_by_trailing_sentences() {
        let raw = "Alpha beta gamma delta epsilon. Zeta eta theta iota kappa. \
                   Lambda mu nu xi omicron. Pi rho sigma tau upsilon.";
        let article = chunk(raw, 10, 5);

        assert!(article.chunks.len() >= 2);
        // The second chunk starts with the sentence that closed the first.
        assert_eq!(article.chunks[1].sentence_start, article.chunks[0].sentence_end);
    }

    #[test]
    fn test_oversize_sentence_gets_its_own_chunk() {
        let long_sentence = (0..50).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" ");
        let raw = format!("Short one. {long_sentence}. Short two.");
        let article = chunk(&raw, 10, 3);

        let oversize = article
            .chunks
            .iter()
            .find(|c| c.text.contains("word42"))
            .expect("oversize chunk present");
        assert_eq!(oversize.sentence_start, oversize.sentence_end);
    }

    #[test]
    fn test_short_article_is_one_chunk() {
        let article = chunk("A single short sentence.", 200, 50);
        assert_eq!(article.chunks.len(), 1);
        assert_eq!(article.chunks[0].text, "A single short sentence.");
    }

    #[test]
    fn test_extraction_input_fits_whole_short_article() {
        let article = chunk("A single short sentence.", 200, 50);
        assert_eq!(extraction_input(&article, 6000), article.text);
    }

    #[test]
    fn test_extraction_input_truncates_at_chunk_boundary() {
        let raw = "Alpha beta gamma delta epsilon. Zeta eta theta iota kappa. \
                   Lambda mu nu xi omicron. Pi rho sigma tau upsilon.";
        let article = chunk(raw, 10, 5);

        let input = extraction_input(&article, 12);
        assert!(input.len() < article.text.len());
        assert!(input.trim_end().ends_with('.'), "must end on a sentence boundary");
    }
}
