use mongodb::bson::{Binary, DateTime, Document, doc, spec::BinarySubtype};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::{
    ActiveQuestEntity, ActiveQuestStatus, QuestEntity, TeamEntity, TeamStatus,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoQuestDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    name: String,
    place: String,
    clue: String,
    lore: String,
    time_limit_minutes: u32,
    xp_reward: i64,
    proctor_id: Option<Uuid>,
    created_at: DateTime,
    updated_at: DateTime,
}

impl From<QuestEntity> for MongoQuestDocument {
    fn from(value: QuestEntity) -> Self {
        Self {
            id: value.id,
            name: value.name,
            place: value.place,
            clue: value.clue,
            lore: value.lore,
            time_limit_minutes: value.time_limit_minutes,
            xp_reward: value.xp_reward,
            proctor_id: value.proctor_id,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl From<MongoQuestDocument> for QuestEntity {
    fn from(value: MongoQuestDocument) -> Self {
        Self {
            id: value.id,
            name: value.name,
            place: value.place,
            clue: value.clue,
            lore: value.lore,
            time_limit_minutes: value.time_limit_minutes,
            xp_reward: value.xp_reward,
            proctor_id: value.proctor_id,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoTeamDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    name: String,
    members: Vec<Uuid>,
    xp: i64,
    status: TeamStatus,
    created_at: DateTime,
    updated_at: DateTime,
}

impl From<TeamEntity> for MongoTeamDocument {
    fn from(value: TeamEntity) -> Self {
        Self {
            id: value.id,
            name: value.name,
            members: value.members,
            xp: value.xp,
            status: value.status,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl From<MongoTeamDocument> for TeamEntity {
    fn from(value: MongoTeamDocument) -> Self {
        Self {
            id: value.id,
            name: value.name,
            members: value.members,
            xp: value.xp,
            status: value.status,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoActiveQuestDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    quest_id: Uuid,
    team_id: Uuid,
    ends_at: DateTime,
    status: ActiveQuestStatus,
    validated: bool,
    created_at: DateTime,
    updated_at: DateTime,
}

impl From<ActiveQuestEntity> for MongoActiveQuestDocument {
    fn from(value: ActiveQuestEntity) -> Self {
        Self {
            id: value.id,
            quest_id: value.quest_id,
            team_id: value.team_id,
            ends_at: DateTime::from_system_time(value.ends_at),
            status: value.status,
            validated: value.validated,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl From<MongoActiveQuestDocument> for ActiveQuestEntity {
    fn from(value: MongoActiveQuestDocument) -> Self {
        Self {
            id: value.id,
            quest_id: value.quest_id,
            team_id: value.team_id,
            ends_at: value.ends_at.to_system_time(),
            status: value.status,
            validated: value.validated,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        }
    }
}

pub fn uuid_as_binary(id: Uuid) -> Binary {
    Binary {
        subtype: BinarySubtype::Uuid,
        bytes: id.into_bytes().to_vec(),
    }
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": uuid_as_binary(id)}
}
