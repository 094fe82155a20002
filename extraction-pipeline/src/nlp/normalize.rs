use common::storage::types::fact::EntityType;

// Honorific prefixes stripped from person surfaces.
const HONORIFICS: &[&str] = &[
    "Mr.", "Mrs.", "Ms.", "Dr.", "Gov.", "Sen.", "Rep.", "Hon.", "Rev.", "Prof.",
];

// Generational/role suffixes stripped from person surfaces.
const ROLE_SUFFIXES: &[&str] = &["Jr.", "Jr", "Sr.", "Sr", "III", "II", "IV"];

const LOCATION_PREFIXES: &[&str] = &["City of ", "Town of "];

/// Strips type-specific affixes but keeps the original casing. This is the
/// surface persisted on facts, so relationship keys stay consistent across
/// differently-decorated mentions.
pub fn display_surface(surface: &str, entity_type: &EntityType) -> String {
    let trimmed = surface.trim();

    match entity_type {
        EntityType::Person => {
            let mut rest = trimmed;
            loop {
                let mut stripped = false;
                for honorific in HONORIFICS {
                    if let Some(tail) = rest.strip_prefix(honorific) {
                        rest = tail.trim_start();
                        stripped = true;
                    }
                }
                if !stripped {
                    break;
                }
            }
            for suffix in ROLE_SUFFIXES {
                if let Some(head) = rest.strip_suffix(suffix) {
                    rest = head.trim_end().trim_end_matches(',').trim_end();
                    break;
                }
            }
            rest.to_string()
        }
        EntityType::Location => {
            let mut rest = trimmed;
            for prefix in LOCATION_PREFIXES {
                if let Some(tail) = rest.strip_prefix(prefix) {
                    rest = tail.trim_start();
                    break;
                }
            }
            rest.to_string()
        }
        EntityType::Organization => trimmed
            .strip_prefix("The ")
            .map_or_else(|| trimmed.to_string(), |tail| tail.trim_start().to_string()),
        EntityType::Event | EntityType::Other => trimmed.to_string(),
    }
}

/// Canonical comparison key: affix-stripped and case-folded. Two mentions of
/// the same type with equal canonical surfaces are the same entity.
pub fn canonical_surface(surface: &str, entity_type: &EntityType) -> String {
    display_surface(surface, entity_type).to_lowercase()
}
