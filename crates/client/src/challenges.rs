//! Gamified listening challenges.
//!
//! A user joins a challenge once (the backend enforces one participation per
//! user/challenge pair) and accumulates progress toward its goal. Completion
//! is sticky: once reached, further progress is ignored.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument};

use lullwave_core::{ChallengeId, ParticipationId, UserId};

use crate::backend::{BackendClient, BackendError, OnConflict, Order, Query};

#[derive(Debug, Error)]
pub enum ChallengeError {
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("challenge not found: {0}")]
    NotFound(ChallengeId),

    #[error("challenge has ended: {0}")]
    Ended(ChallengeId),

    #[error("not participating in challenge {0}")]
    NotJoined(ChallengeId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: ChallengeId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub goal_value: i32,
    #[serde(default)]
    pub reward_badge: Option<String>,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
}

impl Challenge {
    #[must_use]
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.ends_at.is_some_and(|end| end <= now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participation {
    pub id: ParticipationId,
    pub user_id: UserId,
    pub challenge_id: ChallengeId,
    pub progress: i32,
    pub completed: bool,
    pub joined_at: DateTime<Utc>,
}

/// Outcome of [`ChallengeBoard::record_progress`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub progress: i32,
    /// True only for the update that reached the goal.
    pub completed_now: bool,
    /// Badge awarded by this update.
    pub badge: Option<String>,
}

pub trait ChallengeBackend: Send + Sync {
    /// Challenges open for joining, soonest ending first.
    fn list_challenges(&self) -> impl Future<Output = Result<Vec<Challenge>, BackendError>> + Send;

    fn list_participations(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Vec<Participation>, BackendError>> + Send;

    /// Join, or return the existing participation.
    fn join(
        &self,
        user_id: UserId,
        challenge_id: ChallengeId,
    ) -> impl Future<Output = Result<Participation, BackendError>> + Send;

    fn update_progress(
        &self,
        participation_id: ParticipationId,
        progress: i32,
        completed: bool,
    ) -> impl Future<Output = Result<Participation, BackendError>> + Send;
}

#[derive(Serialize)]
struct JoinRow {
    user_id: UserId,
    challenge_id: ChallengeId,
    progress: i32,
    completed: bool,
}

#[derive(Serialize)]
struct ProgressPatch {
    progress: i32,
    completed: bool,
}

impl ChallengeBackend for BackendClient {
    async fn list_challenges(&self) -> Result<Vec<Challenge>, BackendError> {
        let query = Query::new().order("ends_at", Order::Asc);
        self.select("challenges", &query).await
    }

    async fn list_participations(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Participation>, BackendError> {
        self.select("challenge_participants", &Query::new().eq("user_id", user_id))
            .await
    }

    async fn join(
        &self,
        user_id: UserId,
        challenge_id: ChallengeId,
    ) -> Result<Participation, BackendError> {
        let row = JoinRow {
            user_id,
            challenge_id,
            progress: 0,
            completed: false,
        };
        let inserted: Option<Participation> = self
            .upsert(
                "challenge_participants",
                &row,
                "user_id,challenge_id",
                OnConflict::Ignore,
            )
            .await?;
        if let Some(participation) = inserted {
            return Ok(participation);
        }

        // Duplicate ignored; read back the existing row
        let query = Query::new()
            .eq("user_id", user_id)
            .eq("challenge_id", challenge_id)
            .limit(1);
        let mut rows: Vec<Participation> = self.select("challenge_participants", &query).await?;
        rows.pop().ok_or_else(|| {
            BackendError::NotFound(format!("participation in challenge {challenge_id}"))
        })
    }

    async fn update_progress(
        &self,
        participation_id: ParticipationId,
        progress: i32,
        completed: bool,
    ) -> Result<Participation, BackendError> {
        let mut rows: Vec<Participation> = self
            .update(
                "challenge_participants",
                &Query::new().eq("id", participation_id),
                &ProgressPatch {
                    progress,
                    completed,
                },
            )
            .await?;
        rows.pop()
            .ok_or_else(|| BackendError::NotFound(format!("participation {participation_id}")))
    }
}

/// Challenges and the user's participation in them.
pub struct ChallengeBoard<B: ChallengeBackend> {
    backend: B,
    user_id: UserId,
    challenges: Vec<Challenge>,
    participations: HashMap<ChallengeId, Participation>,
}

impl<B: ChallengeBackend> ChallengeBoard<B> {
    pub fn new(backend: B, user_id: UserId) -> Self {
        Self {
            backend,
            user_id,
            challenges: Vec::new(),
            participations: HashMap::new(),
        }
    }

    /// Fetch challenges and the user's participations.
    ///
    /// # Errors
    ///
    /// Returns an error if either query fails.
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn load(&mut self) -> Result<(), ChallengeError> {
        self.challenges = self.backend.list_challenges().await?;
        self.participations = self
            .backend
            .list_participations(self.user_id)
            .await?
            .into_iter()
            .map(|p| (p.challenge_id, p))
            .collect();
        debug!(
            challenges = self.challenges.len(),
            joined = self.participations.len(),
            "Challenges loaded"
        );
        Ok(())
    }

    #[must_use]
    pub fn challenges(&self) -> &[Challenge] {
        &self.challenges
    }

    #[must_use]
    pub fn participation(&self, challenge_id: ChallengeId) -> Option<&Participation> {
        self.participations.get(&challenge_id)
    }

    /// Badges from completed challenges.
    #[must_use]
    pub fn badges(&self) -> Vec<&str> {
        self.challenges
            .iter()
            .filter(|c| self.participations.get(&c.id).is_some_and(|p| p.completed))
            .filter_map(|c| c.reward_badge.as_deref())
            .collect()
    }

    fn challenge(&self, challenge_id: ChallengeId) -> Result<&Challenge, ChallengeError> {
        self.challenges
            .iter()
            .find(|c| c.id == challenge_id)
            .ok_or(ChallengeError::NotFound(challenge_id))
    }

    /// Join a challenge. Joining twice returns the same participation.
    ///
    /// # Errors
    ///
    /// Returns an error if the challenge is unknown or over, or the backend
    /// write fails.
    #[instrument(skip(self))]
    pub async fn join(&mut self, challenge_id: ChallengeId) -> Result<&Participation, ChallengeError> {
        if self.participations.contains_key(&challenge_id) {
            return self
                .participations
                .get(&challenge_id)
                .ok_or(ChallengeError::NotJoined(challenge_id));
        }
        if self.challenge(challenge_id)?.has_ended(Utc::now()) {
            return Err(ChallengeError::Ended(challenge_id));
        }

        let participation = self.backend.join(self.user_id, challenge_id).await?;
        info!(challenge_id = %challenge_id, "Joined challenge");
        Ok(self
            .participations
            .entry(challenge_id)
            .or_insert(participation))
    }

    /// Add `amount` toward the goal, clamped to the goal value.
    ///
    /// # Errors
    ///
    /// Returns an error if the user hasn't joined or the backend write fails.
    #[instrument(skip(self))]
    pub async fn record_progress(
        &mut self,
        challenge_id: ChallengeId,
        amount: u32,
    ) -> Result<ProgressUpdate, ChallengeError> {
        let challenge = self.challenge(challenge_id)?;
        let goal = challenge.goal_value.max(0);
        let badge = challenge.reward_badge.clone();
        let current = self
            .participations
            .get(&challenge_id)
            .ok_or(ChallengeError::NotJoined(challenge_id))?;

        if current.completed {
            return Ok(ProgressUpdate {
                progress: current.progress,
                completed_now: false,
                badge: None,
            });
        }

        let amount = i32::try_from(amount).unwrap_or(i32::MAX);
        let progress = current.progress.saturating_add(amount).min(goal);
        let completed = progress >= goal;

        let updated = self
            .backend
            .update_progress(current.id, progress, completed)
            .await?;
        let completed_now = updated.completed;
        let progress = updated.progress;
        self.participations.insert(challenge_id, updated);

        if completed_now {
            info!(challenge_id = %challenge_id, "Challenge completed");
        }
        Ok(ProgressUpdate {
            progress,
            completed_now,
            badge: if completed_now { badge } else { None },
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{Arc, Mutex};

    use chrono::Duration;

    use super::*;

    #[derive(Clone, Default)]
    struct FakeBackend {
        challenges: Vec<Challenge>,
        rows: Arc<Mutex<Vec<Participation>>>,
        join_calls: Arc<Mutex<usize>>,
    }

    impl ChallengeBackend for FakeBackend {
        async fn list_challenges(&self) -> Result<Vec<Challenge>, BackendError> {
            Ok(self.challenges.clone())
        }

        async fn list_participations(
            &self,
            user_id: UserId,
        ) -> Result<Vec<Participation>, BackendError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|p| p.user_id == user_id)
                .cloned()
                .collect())
        }

        async fn join(
            &self,
            user_id: UserId,
            challenge_id: ChallengeId,
        ) -> Result<Participation, BackendError> {
            *self.join_calls.lock().unwrap() += 1;
            let mut rows = self.rows.lock().unwrap();
            if let Some(existing) = rows
                .iter()
                .find(|p| p.user_id == user_id && p.challenge_id == challenge_id)
            {
                return Ok(existing.clone());
            }
            let row = Participation {
                id: ParticipationId::new(),
                user_id,
                challenge_id,
                progress: 0,
                completed: false,
                joined_at: Utc::now(),
            };
            rows.push(row.clone());
            Ok(row)
        }

        async fn update_progress(
            &self,
            participation_id: ParticipationId,
            progress: i32,
            completed: bool,
        ) -> Result<Participation, BackendError> {
            let mut rows = self.rows.lock().unwrap();
            let row = rows
                .iter_mut()
                .find(|p| p.id == participation_id)
                .ok_or_else(|| BackendError::NotFound(participation_id.to_string()))?;
            row.progress = progress;
            row.completed = completed;
            Ok(row.clone())
        }
    }

    fn challenge(goal: i32, ends_at: Option<DateTime<Utc>>) -> Challenge {
        Challenge {
            id: ChallengeId::new(),
            title: "Seven nights of rain".to_string(),
            description: String::new(),
            goal_value: goal,
            reward_badge: Some("rain-dancer".to_string()),
            starts_at: None,
            ends_at,
        }
    }

    async fn board_with(challenges: Vec<Challenge>) -> (ChallengeBoard<FakeBackend>, FakeBackend) {
        let backend = FakeBackend {
            challenges,
            ..FakeBackend::default()
        };
        let mut board = ChallengeBoard::new(backend.clone(), UserId::new());
        board.load().await.unwrap();
        (board, backend)
    }

    #[tokio::test]
    async fn test_join_is_idempotent() {
        let c = challenge(7, None);
        let (mut board, backend) = board_with(vec![c.clone()]).await;

        let first = board.join(c.id).await.unwrap().id;
        let second = board.join(c.id).await.unwrap().id;

        assert_eq!(first, second);
        assert_eq!(*backend.join_calls.lock().unwrap(), 1);
        assert_eq!(backend.rows.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejoin_after_reload_reuses_row() {
        let c = challenge(7, None);
        let (mut board, backend) = board_with(vec![c.clone()]).await;
        board.join(c.id).await.unwrap();

        let mut fresh = ChallengeBoard::new(backend.clone(), board.user_id);
        fresh.load().await.unwrap();
        assert!(fresh.participation(c.id).is_some());
        fresh.join(c.id).await.unwrap();
        assert_eq!(backend.rows.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_progress_clamps_and_completes_once() {
        let c = challenge(7, None);
        let (mut board, _) = board_with(vec![c.clone()]).await;
        board.join(c.id).await.unwrap();

        let update = board.record_progress(c.id, 5).await.unwrap();
        assert_eq!(update.progress, 5);
        assert!(!update.completed_now);

        let update = board.record_progress(c.id, 5).await.unwrap();
        assert_eq!(update.progress, 7);
        assert!(update.completed_now);
        assert_eq!(update.badge.as_deref(), Some("rain-dancer"));

        let update = board.record_progress(c.id, 1).await.unwrap();
        assert_eq!(update.progress, 7);
        assert!(!update.completed_now);
        assert!(update.badge.is_none());
        assert_eq!(board.badges(), vec!["rain-dancer"]);
    }

    #[tokio::test]
    async fn test_progress_requires_join() {
        let c = challenge(3, None);
        let (mut board, _) = board_with(vec![c.clone()]).await;
        assert!(matches!(
            board.record_progress(c.id, 1).await,
            Err(ChallengeError::NotJoined(_))
        ));
    }

    #[tokio::test]
    async fn test_cannot_join_ended_or_unknown() {
        let ended = challenge(3, Some(Utc::now() - Duration::days(1)));
        let (mut board, _) = board_with(vec![ended.clone()]).await;
        assert!(matches!(
            board.join(ended.id).await,
            Err(ChallengeError::Ended(_))
        ));
        assert!(matches!(
            board.join(ChallengeId::new()).await,
            Err(ChallengeError::NotFound(_))
        ));
    }
}
