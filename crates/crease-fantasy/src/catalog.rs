// Typed reads of the shared public collections: teams, players, matches and
// contests.

use std::sync::Arc;

use crease_core::{Document, DocumentStore, Namespace, StoreError};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::contest::{Contest, Match, Team};
use crate::error::CatalogError;
use crate::player::Player;

pub const TEAMS: &str = "teams";
pub const PLAYERS: &str = "players";
pub const MATCHES: &str = "matches";
pub const CONTESTS: &str = "contests";
pub const LEADERBOARDS: &str = "leaderboards";

/// Types whose id lives in the document path rather than the body.
pub trait Keyed {
    fn set_id(&mut self, id: &str);
}

macro_rules! keyed {
    ($($ty:ty),*) => {
        $(impl Keyed for $ty {
            fn set_id(&mut self, id: &str) {
                if self.id.is_empty() {
                    self.id = id.to_string();
                }
            }
        })*
    };
}

keyed!(Team, Player, Match, Contest);

/// Decode a document, taking the id from the path when the body has none.
pub fn decode_keyed<T: DeserializeOwned + Keyed>(doc: &Document) -> Result<T, StoreError> {
    let mut value: T = doc.decode()?;
    value.set_id(doc.id());
    Ok(value)
}

/// Read access to the public catalog of one application.
pub struct Catalog {
    store: Arc<dyn DocumentStore>,
    public: Namespace,
}

impl Catalog {
    pub fn new(store: Arc<dyn DocumentStore>, app_id: &str) -> Result<Self, CatalogError> {
        Ok(Catalog {
            store,
            public: Namespace::public(app_id)?,
        })
    }

    /// Load every document in `collection`, skipping ones that fail to decode.
    async fn load_all<T: DeserializeOwned + Keyed>(
        &self,
        collection: &str,
    ) -> Result<Vec<T>, CatalogError> {
        let coll = self.public.collection(collection)?;
        let docs = self.store.list(&coll).await?;
        let mut out = Vec::with_capacity(docs.len());
        for doc in &docs {
            match decode_keyed(doc) {
                Ok(value) => out.push(value),
                Err(e) => warn!("Skipping malformed document {}: {}", doc.path, e),
            }
        }
        Ok(out)
    }

    pub async fn teams(&self) -> Result<Vec<Team>, CatalogError> {
        self.load_all(TEAMS).await
    }

    pub async fn players(&self) -> Result<Vec<Player>, CatalogError> {
        self.load_all(PLAYERS).await
    }

    /// Matches in start-time order.
    pub async fn matches(&self) -> Result<Vec<Match>, CatalogError> {
        let mut matches: Vec<Match> = self.load_all(MATCHES).await?;
        matches.sort_by(|a, b| a.starts_at.cmp(&b.starts_at).then_with(|| a.id.cmp(&b.id)));
        Ok(matches)
    }

    pub async fn contests(&self) -> Result<Vec<Contest>, CatalogError> {
        self.load_all(CONTESTS).await
    }

    pub async fn open_contests(&self) -> Result<Vec<Contest>, CatalogError> {
        let mut contests = self.contests().await?;
        contests.retain(Contest::is_open);
        Ok(contests)
    }

    /// Look up one contest. `None` if it is missing or malformed.
    pub async fn contest(&self, id: &str) -> Result<Option<Contest>, CatalogError> {
        let path = match self.public.doc(CONTESTS, id) {
            Ok(path) => path,
            Err(_) => return Ok(None),
        };
        match self.store.get(&path).await {
            Ok(doc) => match decode_keyed(&doc) {
                Ok(contest) => Ok(Some(contest)),
                Err(e) => {
                    warn!("Contest {} is malformed: {}", id, e);
                    Ok(None)
                }
            },
            Err(StoreError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn match_by_id(&self, id: &str) -> Result<Option<Match>, CatalogError> {
        Ok(self.matches().await?.into_iter().find(|m| m.id == id))
    }

    /// Players from either side of the given match.
    pub async fn players_for_match(&self, match_id: &str) -> Result<Vec<Player>, CatalogError> {
        let Some(fixture) = self.match_by_id(match_id).await? else {
            return Ok(Vec::new());
        };
        let mut players = self.players().await?;
        players.retain(|p| fixture.involves(&p.team));
        Ok(players)
    }
}
