//! MongoDB-backed quest store.
//!
//! The `complete_active_quest` operation maps the engine's check-then-transition
//! requirement onto a single `findOneAndUpdate` filtered on `status: running`,
//! so the database decides the finish/expire race even with several server
//! replicas sharing one cluster.

use std::{sync::Arc, time::SystemTime};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::doc,
    options::{IndexOptions, ReturnDocument},
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoActiveQuestDocument, MongoQuestDocument, MongoTeamDocument, doc_id, uuid_as_binary,
    },
};
use crate::dao::{
    models::{ActiveQuestEntity, ActiveQuestStatus, QuestEntity, TeamEntity, TeamStatus},
    quest_store::QuestStore,
    storage::{StorageError, StorageResult},
};

const QUEST_COLLECTION_NAME: &str = "quests";
const TEAM_COLLECTION_NAME: &str = "teams";
const ACTIVE_QUEST_COLLECTION_NAME: &str = "active_quests";

/// Quest store backed by a MongoDB database.
#[derive(Clone)]
pub struct MongoQuestStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoQuestStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let collection = self.active_quest_collection().await;

        // Reconciliation scans by status; assignment and history lookups scan
        // by team.
        let status_index = IndexModel::builder()
            .keys(doc! {"status": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("active_quest_status_idx".to_owned()))
                    .build(),
            )
            .build();
        collection
            .create_index(status_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: ACTIVE_QUEST_COLLECTION_NAME,
                index: "status",
                source,
            })?;

        let team_index = IndexModel::builder()
            .keys(doc! {"team_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("active_quest_team_idx".to_owned()))
                    .build(),
            )
            .build();
        collection
            .create_index(team_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: ACTIVE_QUEST_COLLECTION_NAME,
                index: "team_id",
                source,
            })?;

        Ok(())
    }

    async fn quest_collection(&self) -> Collection<MongoQuestDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoQuestDocument>(QUEST_COLLECTION_NAME)
    }

    async fn team_collection(&self) -> Collection<MongoTeamDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoTeamDocument>(TEAM_COLLECTION_NAME)
    }

    async fn active_quest_collection(&self) -> Collection<MongoActiveQuestDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoActiveQuestDocument>(ACTIVE_QUEST_COLLECTION_NAME)
    }

    async fn find_team_document(&self, id: Uuid) -> MongoResult<Option<MongoTeamDocument>> {
        let collection = self.team_collection().await;
        collection
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadTeam { id, source })
    }
}

impl QuestStore for MongoQuestStore {
    fn save_quest(&self, quest: QuestEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let id = quest.id;
            let document: MongoQuestDocument = quest.into();
            let collection = store.quest_collection().await;
            collection
                .replace_one(doc_id(id), &document)
                .upsert(true)
                .await
                .map_err(|source| MongoDaoError::SaveQuest { id, source })?;
            Ok(())
        })
    }

    fn find_quest(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<QuestEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let collection = store.quest_collection().await;
            let document = collection
                .find_one(doc_id(id))
                .await
                .map_err(|source| MongoDaoError::LoadQuests { source })?;
            Ok(document.map(Into::into))
        })
    }

    fn list_quests(&self) -> BoxFuture<'static, StorageResult<Vec<QuestEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let collection = store.quest_collection().await;
            let documents: Vec<MongoQuestDocument> = collection
                .find(doc! {})
                .await
                .map_err(|source| MongoDaoError::LoadQuests { source })?
                .try_collect()
                .await
                .map_err(|source| MongoDaoError::LoadQuests { source })?;
            Ok(documents.into_iter().map(Into::into).collect())
        })
    }

    fn save_team(&self, team: TeamEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let id = team.id;
            let document: MongoTeamDocument = team.into();
            let collection = store.team_collection().await;
            collection
                .replace_one(doc_id(id), &document)
                .upsert(true)
                .await
                .map_err(|source| MongoDaoError::SaveTeam { id, source })?;
            Ok(())
        })
    }

    fn find_team(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<TeamEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let document = store.find_team_document(id).await?;
            Ok(document.map(Into::into))
        })
    }

    fn team_members(&self, team_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<Uuid>>> {
        let store = self.clone();
        Box::pin(async move {
            let team: Option<TeamEntity> =
                store.find_team_document(team_id).await?.map(Into::into);
            team.map(|team| team.members).ok_or(StorageError::Missing {
                entity: "team",
                id: team_id,
            })
        })
    }

    fn add_team_xp(&self, team_id: Uuid, amount: i64) -> BoxFuture<'static, StorageResult<i64>> {
        let store = self.clone();
        Box::pin(async move {
            let collection = store.team_collection().await;
            let updated = collection
                .find_one_and_update(
                    doc_id(team_id),
                    doc! {
                        "$inc": { "xp": amount },
                        "$currentDate": { "updated_at": true },
                    },
                )
                .return_document(ReturnDocument::After)
                .await
                .map_err(|source| MongoDaoError::UpdateTeam {
                    id: team_id,
                    source,
                })?;

            let team: TeamEntity = updated
                .ok_or(StorageError::Missing {
                    entity: "team",
                    id: team_id,
                })?
                .into();
            Ok(team.xp)
        })
    }

    fn set_team_status(
        &self,
        team_id: Uuid,
        status: TeamStatus,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let status_value = match status {
                TeamStatus::Playing => "playing",
                TeamStatus::Finished => "finished",
            };
            let collection = store.team_collection().await;
            let result = collection
                .update_one(
                    doc_id(team_id),
                    doc! {
                        "$set": { "status": status_value },
                        "$currentDate": { "updated_at": true },
                    },
                )
                .await
                .map_err(|source| MongoDaoError::UpdateTeam {
                    id: team_id,
                    source,
                })?;

            if result.matched_count == 0 {
                return Err(StorageError::Missing {
                    entity: "team",
                    id: team_id,
                });
            }
            Ok(())
        })
    }

    fn create_active_quest(
        &self,
        quest_id: Uuid,
        team_id: Uuid,
        ends_at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<ActiveQuestEntity>> {
        let store = self.clone();
        Box::pin(async move {
            let now = SystemTime::now();
            let record = ActiveQuestEntity {
                id: Uuid::new_v4(),
                quest_id,
                team_id,
                ends_at,
                status: ActiveQuestStatus::Running,
                validated: false,
                created_at: now,
                updated_at: now,
            };
            let document: MongoActiveQuestDocument = record.clone().into();
            let collection = store.active_quest_collection().await;
            collection
                .insert_one(&document)
                .await
                .map_err(|source| MongoDaoError::CreateActiveQuest { team_id, source })?;
            Ok(record)
        })
    }

    fn find_active_quest(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ActiveQuestEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let collection = store.active_quest_collection().await;
            let document = collection
                .find_one(doc_id(id))
                .await
                .map_err(|source| MongoDaoError::LoadActiveQuests { source })?;
            Ok(document.map(Into::into))
        })
    }

    fn list_active_quests_by_team(
        &self,
        team_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ActiveQuestEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let collection = store.active_quest_collection().await;
            let documents: Vec<MongoActiveQuestDocument> = collection
                .find(doc! { "team_id": uuid_as_binary(team_id) })
                .await
                .map_err(|source| MongoDaoError::LoadActiveQuests { source })?
                .try_collect()
                .await
                .map_err(|source| MongoDaoError::LoadActiveQuests { source })?;
            Ok(documents.into_iter().map(Into::into).collect())
        })
    }

    fn list_active_quests_by_status(
        &self,
        status: ActiveQuestStatus,
    ) -> BoxFuture<'static, StorageResult<Vec<ActiveQuestEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let collection = store.active_quest_collection().await;
            let documents: Vec<MongoActiveQuestDocument> = collection
                .find(doc! { "status": status.as_str() })
                .await
                .map_err(|source| MongoDaoError::LoadActiveQuests { source })?
                .try_collect()
                .await
                .map_err(|source| MongoDaoError::LoadActiveQuests { source })?;
            Ok(documents.into_iter().map(Into::into).collect())
        })
    }

    fn complete_active_quest(
        &self,
        id: Uuid,
        validated: bool,
    ) -> BoxFuture<'static, StorageResult<Option<ActiveQuestEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let collection = store.active_quest_collection().await;
            // Filtering on the running status makes the update a conditional
            // write: the first of concurrent finish/expire callers matches,
            // later callers get `None`.
            let filter = doc! {
                "_id": uuid_as_binary(id),
                "status": ActiveQuestStatus::Running.as_str(),
            };
            let update = doc! {
                "$set": {
                    "status": ActiveQuestStatus::Finished.as_str(),
                    "validated": validated,
                },
                "$currentDate": { "updated_at": true },
            };
            let updated = collection
                .find_one_and_update(filter, update)
                .return_document(ReturnDocument::After)
                .await
                .map_err(|source| MongoDaoError::CompleteActiveQuest { id, source })?;
            Ok(updated.map(Into::into))
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
