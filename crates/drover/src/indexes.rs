//! Declared indexes for every entity kind.
//!
//! `drover sync-indexes` reconciles the store to exactly this set: indexes
//! listed here are created if missing, anything else is dropped.

use drover_store::{EntityIndexes, IndexDefinition};

pub fn declared() -> EntityIndexes {
    EntityIndexes::new()
        .entity(
            "users",
            vec![
                IndexDefinition::ascending(&["email"]).unique(),
                IndexDefinition::ascending(&["slug"]).unique(),
            ],
        )
        .entity(
            "lists",
            vec![
                IndexDefinition::ascending(&["user"]),
                IndexDefinition::ascending(&["user", "slug"]),
            ],
        )
        .entity(
            "resources",
            vec![
                IndexDefinition::ascending(&["user"]),
                IndexDefinition::ascending(&["user", "list"]),
            ],
        )
}
