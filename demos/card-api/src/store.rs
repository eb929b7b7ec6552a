//! In-memory card storage.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use kanto::core::BoxFuture;
use kanto::prelude::*;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A trading card.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Card {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub hp: u32,
    pub created_at: DateTime<Utc>,
}

/// Payload for creating a card.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewCard {
    pub name: String,
    pub kind: String,
    pub hp: u32,
}

/// Card store, seeded on start.
#[derive(Debug, Default)]
pub struct CardStore {
    cards: RwLock<IndexMap<String, Card>>,
}

impl CardStore {
    pub fn list(&self, kind: Option<&str>) -> Vec<Card> {
        self.cards
            .read()
            .values()
            .filter(|card| kind.map_or(true, |k| card.kind.eq_ignore_ascii_case(k)))
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<Card> {
        self.cards.read().get(id).cloned()
    }

    pub fn insert(&self, new: NewCard) -> Result<Card, KantoError> {
        let mut cards = self.cards.write();
        if cards.values().any(|card| card.name.eq_ignore_ascii_case(&new.name)) {
            return Err(KantoError::conflict(format!(
                "card '{}' already exists",
                new.name
            )));
        }
        let card = Card {
            id: Uuid::now_v7().to_string(),
            name: new.name,
            kind: new.kind,
            hp: new.hp,
            created_at: Utc::now(),
        };
        cards.insert(card.id.clone(), card.clone());
        Ok(card)
    }

    pub fn remove(&self, id: &str) -> bool {
        self.cards.write().shift_remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.cards.read().len()
    }
}

impl Lifecycle for CardStore {
    fn start(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            for (name, kind, hp) in [("Pikachu", "electric", 60), ("Bulbasaur", "grass", 70)] {
                self.insert(NewCard {
                    name: name.to_string(),
                    kind: kind.to_string(),
                    hp,
                })
                .map_err(|e| anyhow::anyhow!("seeding {name}: {e}"))?;
            }
            tracing::info!(cards = self.len(), "card store seeded");
            Ok(())
        })
    }

    fn stop(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            tracing::info!(cards = self.len(), "card store closed");
            Ok(())
        })
    }
}
