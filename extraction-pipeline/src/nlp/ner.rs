use std::sync::OnceLock;

use common::storage::types::fact::EntityType;
use regex::Regex;

use super::segmenter::SentenceSegmenter;

/// One entity surface recognized by the deterministic auditor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NerEntity {
    pub surface: String,
    pub entity_type: EntityType,
}

/// Rule-based named-entity recognizer. It scans capitalized token runs per
/// sentence and classifies them with suffix/keyword/context tables. Accuracy
/// is deliberately modest; determinism is the requirement, since this is the
/// audit baseline for the generative ensemble.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleBasedNer;

// Words that start a person mention when they precede a capitalized run.
const PERSON_TITLES: &[&str] = &[
    "Mr.",
    "Mrs.",
    "Ms.",
    "Dr.",
    "Gov.",
    "Sen.",
    "Rep.",
    "Hon.",
    "Rev.",
    "Prof.",
    "Governor",
    "Senator",
    "Representative",
    "Mayor",
    "President",
    "Secretary",
    "Chief",
    "Judge",
    "Sheriff",
];

// A capitalized run ending in one of these is an organization.
const ORG_SUFFIXES: &[&str] = &[
    "Inc.",
    "Inc",
    "Corp.",
    "Corp",
    "Co.",
    "LLC",
    "Ltd.",
    "Legislature",
    "Senate",
    "House",
    "Council",
    "Committee",
    "Commission",
    "Department",
    "Agency",
    "Board",
    "Authority",
    "University",
    "College",
    "School",
    "District",
    "Association",
    "Society",
    "Union",
    "Police",
    "Company",
    "Bank",
    "Hospital",
    "Church",
];

// A capitalized run ending in one of these reads as a place.
const LOCATION_SUFFIXES: &[&str] = &[
    "County", "City", "Town", "Village", "Street", "Avenue", "Road", "River", "Creek", "Lake",
    "Mountain", "Park", "Valley",
];

// Prepositions that mark the following capitalized run as a location.
const LOCATION_CUES: &[&str] = &["in", "at", "near", "from", "outside", "across"];

const US_STATES: &[&str] = &[
    "Alabama", "Alaska", "Arizona", "Arkansas", "California", "Colorado", "Connecticut",
    "Delaware", "Florida", "Georgia", "Hawaii", "Idaho", "Illinois", "Indiana", "Iowa", "Kansas",
    "Kentucky", "Louisiana", "Maine", "Maryland", "Massachusetts", "Michigan", "Minnesota",
    "Mississippi", "Missouri", "Montana", "Nebraska", "Nevada", "Ohio", "Oklahoma", "Oregon",
    "Pennsylvania", "Tennessee", "Texas", "Utah", "Vermont", "Virginia", "Washington",
    "Wisconsin", "Wyoming",
];

// Event-ish trailing words: "Town Meeting Day", "Maple Festival".
const EVENT_SUFFIXES: &[&str] = &[
    "Festival", "Election", "Hearing", "Meeting", "Parade", "Fair", "Summit", "Storm",
    "Hurricane", "Flood",
];

// Sentence-leading words that look capitalized but are plain prose.
const STOPWORDS: &[&str] = &[
    "The", "A", "An", "This", "That", "These", "Those", "It", "He", "She", "They", "We", "But",
    "And", "Or", "On", "In", "At", "By", "For", "With", "After", "Before", "When", "While",
    "According", "Meanwhile", "However", "Officials", "Residents", "Last", "Next", "Earlier",
    "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday", "January",
    "February", "March", "April", "May", "June", "July", "August", "September", "October",
    "November", "December",
];

#[derive(Debug, Clone)]
struct Token<'a> {
    text: &'a str,
    start: usize,
}

fn token_regex() -> &'static Regex {
    static TOKENS: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    TOKENS.get_or_init(|| Regex::new(r"[A-Za-z][\w.'-]*|\d[\w.]*").expect("token pattern is valid"))
}

fn bill_regex() -> &'static Regex {
    static BILL: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    BILL.get_or_init(|| Regex::new(r"\b[HS]\.\s?\d+\b").expect("bill pattern is valid"))
}

impl RuleBasedNer {
    pub fn recognize(
        &self,
        text: &str,
        segmenter: &dyn SentenceSegmenter,
    ) -> Vec<NerEntity> {
        let mut entities = Vec::new();

        for span in segmenter.sentences(text) {
            let sentence = &text[span.start..span.end];
            Self::scan_sentence(sentence, &mut entities);
        }

        // Bill designators are not capitalized runs, so they get their own pass.
        for m in bill_regex().find_iter(text) {
            entities.push(NerEntity {
                surface: m.as_str().to_string(),
                entity_type: EntityType::Event,
            });
        }

        dedup_in_order(entities)
    }

    fn scan_sentence(sentence: &str, out: &mut Vec<NerEntity>) {
        let tokens: Vec<Token> = token_regex()
            .find_iter(sentence)
            .map(|m| Token {
                text: m.as_str(),
                start: m.start(),
            })
            .collect();

        let mut i = 0;
        while i < tokens.len() {
            if !is_capitalized(tokens[i].text) || STOPWORDS.contains(&tokens[i].text) {
                i += 1;
                continue;
            }

            // Extend the run over consecutive capitalized tokens. Any
            // punctuation between tokens (a comma, a dash) ends the run.
            let mut j = i;
            while j + 1 < tokens.len()
                && is_capitalized(tokens[j + 1].text)
                && !PERSON_TITLES.contains(&tokens[j + 1].text)
                && only_whitespace_between(sentence, &tokens[j], &tokens[j + 1])
            {
                j += 1;
            }

            let run: Vec<&str> = tokens[i..=j].iter().map(|t| t.text).collect();
            let preceding = i.checked_sub(1).map(|p| tokens[p].text);
            let at_sentence_start = tokens[i].start == 0 && i == 0;

            if let Some(entity) = classify_run(&run, preceding, at_sentence_start) {
                out.push(entity);
            }

            i = j + 1;
        }
    }
}

fn is_capitalized(token: &str) -> bool {
    token.chars().next().is_some_and(char::is_uppercase)
}

fn only_whitespace_between(sentence: &str, left: &Token, right: &Token) -> bool {
    let gap = &sentence[left.start + left.text.len()..right.start];
    gap.chars().all(char::is_whitespace)
}

fn classify_run(
    run: &[&str],
    preceding: Option<&str>,
    at_sentence_start: bool,
) -> Option<NerEntity> {
    let last = *run.last()?;
    let preceded_by_title = preceding.is_some_and(|p| PERSON_TITLES.contains(&p));
    let title_leads_run = PERSON_TITLES.contains(&run[0]);

    // Titles inside the run mark a person: "Gov. Phil Scott".
    let (surface_tokens, is_person_by_title) = if title_leads_run && run.len() > 1 {
        (&run[1..], true)
    } else {
        (run, preceded_by_title)
    };
    let surface = surface_tokens.join(" ");

    if ORG_SUFFIXES.contains(&last) {
        return Some(NerEntity {
            surface: run.join(" "),
            entity_type: EntityType::Organization,
        });
    }

    if EVENT_SUFFIXES.contains(&last) && run.len() > 1 {
        return Some(NerEntity {
            surface: run.join(" "),
            entity_type: EntityType::Event,
        });
    }

    if LOCATION_SUFFIXES.contains(&last) || US_STATES.contains(&last) && run.len() == 1 {
        return Some(NerEntity {
            surface: run.join(" "),
            entity_type: EntityType::Location,
        });
    }

    if is_person_by_title {
        return Some(NerEntity {
            surface,
            entity_type: EntityType::Person,
        });
    }

    if preceding.is_some_and(|p| LOCATION_CUES.contains(&p)) {
        return Some(NerEntity {
            surface: run.join(" "),
            entity_type: EntityType::Location,
        });
    }

    // Bare multi-word capitalized runs mid-sentence default to person; a
    // single capitalized word at sentence start is just prose.
    if run.len() >= 2 && !at_sentence_start {
        return Some(NerEntity {
            surface,
            entity_type: EntityType::Person,
        });
    }

    if run.len() >= 2 {
        return Some(NerEntity {
            surface,
            entity_type: EntityType::Other,
        });
    }

    None
}

fn dedup_in_order(entities: Vec<NerEntity>) -> Vec<NerEntity> {
    let mut seen = std::collections::HashSet::new();
    entities
        .into_iter()
        .filter(|e| seen.insert((e.surface.to_lowercase(), e.entity_type)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlp::segmenter::RegexSegmenter;

    fn recognize(text: &str) -> Vec<NerEntity> {
        RuleBasedNer.recognize(text, &RegexSegmenter)
    }

    fn has(entities: &[NerEntity], surface: &str, ty: EntityType) -> bool {
        entities
            .iter()
            .any(|e| e.surface == surface && e.entity_type == ty)
    }

    #[test]
    fn test_recognizes_titled_person() {
        let entities =
            recognize("Governor Phil Scott signed the bill. Sen. Becca Balint agreed.");

        assert!(has(&entities, "Phil Scott", EntityType::Person), "{entities:?}");
        assert!(has(&entities, "Becca Balint", EntityType::Person), "{entities:?}");
    }

    #[test]
    fn test_recognizes_organization_suffix() {
        let entities = recognize("The Vermont Legislature passed it unanimously.");

        assert!(
            has(&entities, "Vermont Legislature", EntityType::Organization),
            "{entities:?}"
        );
    }

    #[test]
    fn test_recognizes_bill_designator_as_event() {
        let entities = recognize("Governor Phil Scott signed H.100 on Tuesday.");

        assert!(has(&entities, "H.100", EntityType::Event), "{entities:?}");
    }

    #[test]
    fn test_recognizes_location_after_cue() {
        let entities = recognize("The meeting was held in Montpelier on Thursday.");

        assert!(has(&entities, "Montpelier", EntityType::Location), "{entities:?}");
    }

    #[test]
    fn test_recognizes_location_suffix() {
        let entities = recognize("Crews repaired the bridge over Otter Creek in Addison County.");

        assert!(has(&entities, "Addison County", EntityType::Location), "{entities:?}");
    }

    #[test]
    fn test_is_deterministic() {
        let text = "Governor Phil Scott signed H.100 on Tuesday. The Vermont Legislature passed it unanimously.";
        assert_eq!(recognize(text), recognize(text));
    }

    #[test]
    fn test_sentence_leading_prose_is_not_an_entity() {
        let entities = recognize("Officials said the road would reopen soon.");

        assert!(entities.is_empty(), "{entities:?}");
    }
}
