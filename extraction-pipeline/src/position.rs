use common::storage::types::fact::MentionPosition;
use regex::Regex;
use tracing::{debug, warn};

use crate::{
    extractor::EntityMention,
    nlp::segmenter::{
        paragraph_index_at, paragraph_spans, sentence_index_at, SentenceSegmenter,
    },
};

/// Assigns sentence/paragraph/character positions to every entity mention.
///
/// Each textual occurrence becomes its own mention record so relationship
/// generation sees one row per co-occurrence site. If segmentation yields
/// nothing the mentions pass through unpositioned and the article simply
/// contributes no relationships.
pub fn locate(
    text: &str,
    entities: Vec<EntityMention>,
    segmenter: &dyn SentenceSegmenter,
) -> Vec<EntityMention> {
    let sentences = segmenter.sentences(text);
    if sentences.is_empty() {
        warn!("sentence segmentation produced no spans; mentions stay unpositioned");
        return entities;
    }
    let paragraphs = paragraph_spans(text);

    let mut located = Vec::with_capacity(entities.len());

    for mention in entities {
        let occurrences = find_occurrences(text, &mention.surface);

        if occurrences.is_empty() {
            debug!(
                surface = %mention.surface,
                "entity surface not found in article text; keeping it unpositioned"
            );
            located.push(mention);
            continue;
        }

        let mut positioned_any = false;
        for (start, end) in occurrences {
            let Some(sentence_index) = sentence_index_at(&sentences, start) else {
                continue;
            };
            let paragraph_index = paragraph_index_at(&paragraphs, start).unwrap_or(0);

            let mut positioned = mention.clone();
            positioned.position = Some(MentionPosition {
                sentence_index,
                paragraph_index,
                char_start: start,
                char_end: end,
            });
            located.push(positioned);
            positioned_any = true;
        }

        // A match that falls outside every sentence span keeps the mention
        // itself, just without a position.
        if !positioned_any {
            located.push(mention);
        }
    }

    located
}

/// Whole-word case-insensitive matching by default; surfaces with internal
/// punctuation (like bill numbers) fall back to case-sensitive substring
/// search because word boundaries misfire on them.
fn find_occurrences(text: &str, surface: &str) -> Vec<(usize, usize)> {
    let trimmed = surface.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let has_inner_punctuation = trimmed
        .chars()
        .any(|c| !c.is_alphanumeric() && !c.is_whitespace());

    if has_inner_punctuation && trimmed.contains(' ') {
        return text
            .match_indices(trimmed)
            .map(|(start, matched)| (start, start + matched.len()))
            .collect();
    }

    let pattern = format!(r"(?i)\b{}\b", regex::escape(trimmed));
    match Regex::new(&pattern) {
        Ok(re) => re
            .find_iter(text)
            .map(|m| (m.start(), m.end()))
            .collect(),
        Err(_) => text
            .match_indices(trimmed)
            .map(|(start, matched)| (start, start + matched.len()))
            .collect(),
    }
}
