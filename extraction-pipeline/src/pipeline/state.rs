use state_machines::state_machine;

state_machine! {
    name: ArticleMachine,
    state: ArticleState,
    initial: Ready,
    states: [Ready, Ingested, Extracted, Validated, Audited, Located, Enriched, Persisted, Failed],
    events {
        ingest { transition: { from: Ready, to: Ingested } }
        extract { transition: { from: Ingested, to: Extracted } }
        validate { transition: { from: Extracted, to: Validated } }
        audit { transition: { from: Validated, to: Audited } }
        locate { transition: { from: Audited, to: Located } }
        enrich { transition: { from: Located, to: Enriched } }
        persist { transition: { from: Enriched, to: Persisted } }
        abort {
            transition: { from: Ready, to: Failed }
            transition: { from: Ingested, to: Failed }
            transition: { from: Extracted, to: Failed }
            transition: { from: Validated, to: Failed }
            transition: { from: Audited, to: Failed }
            transition: { from: Located, to: Failed }
            transition: { from: Enriched, to: Failed }
            transition: { from: Persisted, to: Failed }
        }
    }
}

pub fn ready() -> ArticleMachine<(), Ready> {
    ArticleMachine::new(())
}
