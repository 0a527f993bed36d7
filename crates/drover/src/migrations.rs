//! The shipped migration set.
//!
//! Each migration is written for at-least-once execution: the runner records
//! a ledger entry only after a successful `up`, so a crash in between simply
//! re-runs the migration. Conditional inserts and updates keep those re-runs
//! harmless.

use async_trait::async_trait;
use chrono::Utc;
use futures_util::TryStreamExt;
use serde_json::json;

use drover_migrate::{MigrateError, Migration};
use drover_store::{Document, DocumentStore, Filter, Update};

/// Every shipped migration. Order here is irrelevant; the registry sorts by
/// sequence key.
pub fn available_migrations() -> Vec<Box<dyn Migration>> {
    vec![Box::new(CreateUsers), Box::new(AddResourceTags)]
}

const SEED_USER_IDS: [&str; 2] = ["000000000000000000000000", "000000000000000000000001"];

// bcrypt of "Password1".
const SEED_PASSWORD: &str = "$2b$12$hSPUUa/umLEgIA4nCOs7N.GUoL.Oj3s6Ou6bf7orNLr4Zii4g4CcC";

fn seed_users() -> Vec<Document> {
    let now = Utc::now();
    let seeds = [
        (
            SEED_USER_IDS[0],
            "nicolas.delvalle@gmail.com",
            "ndelvalle",
            "Nicolas Del Valle",
        ),
        (
            SEED_USER_IDS[1],
            "gillchristiang@gmail.com",
            "gillchristian",
            "Christian Gill",
        ),
    ];

    seeds
        .into_iter()
        .map(|(id, email, slug, name)| {
            Document::new(
                id,
                json!({
                    "email": email,
                    "password": SEED_PASSWORD,
                    "slug": slug,
                    "name": name,
                    "avatar": null,
                    "verification_token": null,
                    "created_at": now,
                    "updated_at": now,
                    "verified_at": now,
                }),
            )
        })
        .collect()
}

/// Seeds the base application users under fixed ids.
struct CreateUsers;

#[async_trait]
impl Migration for CreateUsers {
    fn name(&self) -> &'static str {
        "create-users"
    }

    fn sequence_key(&self) -> &'static str {
        "20201129-172729-00"
    }

    fn description(&self) -> &'static str {
        "Creates the base users"
    }

    async fn up(&self, store: &dyn DocumentStore) -> Result<(), MigrateError> {
        // Insert each user only if its fixed id is absent, so a re-run never
        // trips the unique email index.
        for user in seed_users() {
            let present = store
                .find_one("users", Filter::new().id(&user.id))
                .await?
                .is_some();
            if !present {
                store.insert_many("users", vec![user]).await?;
            }
        }
        Ok(())
    }

    async fn down(&self, store: &dyn DocumentStore) -> Result<(), MigrateError> {
        for id in SEED_USER_IDS {
            store.delete_many("users", Filter::new().id(id)).await?;
        }
        Ok(())
    }
}

/// Gives every resource an explicit, possibly empty, tag list.
struct AddResourceTags;

#[async_trait]
impl Migration for AddResourceTags {
    fn name(&self) -> &'static str {
        "add-resource-tags"
    }

    fn sequence_key(&self) -> &'static str {
        "20210124-235540-00"
    }

    fn description(&self) -> &'static str {
        "Adds a tags attribute to resources"
    }

    fn reversible(&self) -> bool {
        false
    }

    async fn up(&self, store: &dyn DocumentStore) -> Result<(), MigrateError> {
        let candidates: Vec<Document> = store
            .find("resources", Filter::new().missing("tags"))
            .await?
            .try_collect()
            .await?;

        for doc in candidates {
            // Conditional on the field still being absent, so tags written by
            // a concurrent writer are never clobbered.
            store
                .update_one(
                    "resources",
                    Filter::new().id(&doc.id).missing("tags"),
                    Update::new().set("tags", json!([])),
                )
                .await?;
        }
        Ok(())
    }
}
