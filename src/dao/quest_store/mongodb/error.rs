use thiserror::Error;
use uuid::Uuid;

pub type MongoResult<T> = Result<T, MongoDaoError>;

/// Errors raised by the MongoDB-backed quest store.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("invalid MongoDB URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: mongodb::error::Error,
    },
    #[error("missing environment variable {var}")]
    MissingEnvVar { var: &'static str },
    #[error("failed to construct MongoDB client")]
    ClientConstruction {
        #[source]
        source: mongodb::error::Error,
    },
    #[error("MongoDB did not answer the initial ping after {attempts} attempts")]
    InitialPing {
        attempts: u32,
        #[source]
        source: mongodb::error::Error,
    },
    #[error("MongoDB health ping failed")]
    HealthPing {
        #[source]
        source: mongodb::error::Error,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: mongodb::error::Error,
    },
    #[error("failed to save quest `{id}`")]
    SaveQuest {
        id: Uuid,
        #[source]
        source: mongodb::error::Error,
    },
    #[error("failed to load quest(s)")]
    LoadQuests {
        #[source]
        source: mongodb::error::Error,
    },
    #[error("failed to save team `{id}`")]
    SaveTeam {
        id: Uuid,
        #[source]
        source: mongodb::error::Error,
    },
    #[error("failed to load team `{id}`")]
    LoadTeam {
        id: Uuid,
        #[source]
        source: mongodb::error::Error,
    },
    #[error("failed to update team `{id}`")]
    UpdateTeam {
        id: Uuid,
        #[source]
        source: mongodb::error::Error,
    },
    #[error("failed to create active quest for team `{team_id}`")]
    CreateActiveQuest {
        team_id: Uuid,
        #[source]
        source: mongodb::error::Error,
    },
    #[error("failed to load active quest(s)")]
    LoadActiveQuests {
        #[source]
        source: mongodb::error::Error,
    },
    #[error("failed to complete active quest `{id}`")]
    CompleteActiveQuest {
        id: Uuid,
        #[source]
        source: mongodb::error::Error,
    },
}
