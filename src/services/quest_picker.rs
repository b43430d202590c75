//! Random selection of the next quest for a team.

use std::collections::HashSet;
use std::sync::Arc;

use rand::seq::IndexedRandom;
use uuid::Uuid;

use crate::{
    dao::{
        models::{ActiveQuestEntity, QuestEntity},
        quest_store::QuestStore,
    },
    error::ServiceError,
};

/// Result of a quest pick.
#[derive(Debug)]
pub enum PickOutcome {
    /// A quest the team has not attempted yet.
    Candidate(QuestEntity),
    /// Every catalog quest already has a record for this team.
    Exhausted,
}

/// Select an unattempted quest for the team, uniformly at random.
///
/// Reads only; callers are responsible for ensuring the team has no running
/// record before acting on the outcome.
pub async fn pick_next(
    store: &Arc<dyn QuestStore>,
    team_id: Uuid,
) -> Result<PickOutcome, ServiceError> {
    let attempted = store.list_active_quests_by_team(team_id).await?;
    let catalog = store.list_quests().await?;
    Ok(pick_among(&attempted, catalog))
}

/// Pure selection step: catalog minus attempted, then a uniform choice.
fn pick_among(attempted: &[ActiveQuestEntity], catalog: Vec<QuestEntity>) -> PickOutcome {
    let attempted_ids: HashSet<Uuid> = attempted.iter().map(|record| record.quest_id).collect();
    let candidates: Vec<QuestEntity> = catalog
        .into_iter()
        .filter(|quest| !attempted_ids.contains(&quest.id))
        .collect();

    match candidates.choose(&mut rand::rng()) {
        Some(quest) => PickOutcome::Candidate(quest.clone()),
        None => PickOutcome::Exhausted,
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::dao::models::ActiveQuestStatus;

    fn quest(name: &str) -> QuestEntity {
        let now = SystemTime::now();
        QuestEntity {
            id: Uuid::new_v4(),
            name: name.to_string(),
            place: "somewhere".into(),
            clue: "look around".into(),
            lore: String::new(),
            time_limit_minutes: 15,
            xp_reward: 50,
            proctor_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn record_for(quest_id: Uuid, status: ActiveQuestStatus) -> ActiveQuestEntity {
        let now = SystemTime::now();
        ActiveQuestEntity {
            id: Uuid::new_v4(),
            quest_id,
            team_id: Uuid::new_v4(),
            ends_at: now,
            status,
            validated: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn attempted_quests_are_never_selected() {
        let done = quest("done");
        let running = quest("running");
        let fresh = quest("fresh");
        let attempted = vec![
            record_for(done.id, ActiveQuestStatus::Finished),
            record_for(running.id, ActiveQuestStatus::Running),
        ];

        // Selection is random; membership is the contract, not order.
        for _ in 0..200 {
            match pick_among(&attempted, vec![done.clone(), running.clone(), fresh.clone()]) {
                PickOutcome::Candidate(picked) => assert_eq!(picked.id, fresh.id),
                PickOutcome::Exhausted => panic!("a candidate was available"),
            }
        }
    }

    #[test]
    fn selection_covers_all_candidates_over_many_trials() {
        let catalog: Vec<QuestEntity> = (0..3).map(|i| quest(&format!("q{i}"))).collect();
        let mut seen = HashSet::new();

        for _ in 0..200 {
            if let PickOutcome::Candidate(picked) = pick_among(&[], catalog.clone()) {
                seen.insert(picked.id);
            }
        }

        assert_eq!(seen.len(), catalog.len(), "every candidate should be reachable");
    }

    #[test]
    fn exhausted_when_every_quest_was_attempted() {
        let first = quest("first");
        let second = quest("second");
        let attempted = vec![
            record_for(first.id, ActiveQuestStatus::Finished),
            record_for(second.id, ActiveQuestStatus::Finished),
        ];

        assert!(matches!(
            pick_among(&attempted, vec![first, second]),
            PickOutcome::Exhausted
        ));
    }

    #[test]
    fn empty_catalog_is_exhausted() {
        assert!(matches!(pick_among(&[], Vec::new()), PickOutcome::Exhausted));
    }
}
