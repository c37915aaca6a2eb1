use crate::{
    error::{BanneriaError, GenerationError, Result},
    models::{Caller, Reservation, TierLimits, UserIdentity},
    storage::ProfileStore,
};
use std::sync::Arc;

/// What to do when the profile store cannot answer a quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuotaFailurePolicy {
    /// Admit the request and count the generation after it is saved.
    #[default]
    FailOpen,
    /// Refuse the request until the store is reachable again.
    FailClosed,
}

/// How a request was let through the quota gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Anonymous callers and callers without identity.
    Unmetered,
    /// One slot was taken atomically from the user's counter.
    Reserved(String),
    /// The store was unreachable; the counter is bumped after a successful save.
    Unverified(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaDecision {
    Allow(Admission),
    Deny { limit: u32, current: u32 },
}

pub struct QuotaEvaluator {
    profiles: Arc<dyn ProfileStore>,
    tiers: TierLimits,
    policy: QuotaFailurePolicy,
}

impl QuotaEvaluator {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        tiers: TierLimits,
        policy: QuotaFailurePolicy,
    ) -> Self {
        Self {
            profiles,
            tiers,
            policy,
        }
    }

    pub async fn check(&self, caller: &Caller) -> std::result::Result<QuotaDecision, GenerationError> {
        let user = match caller {
            Caller::User(user) if user.is_admin => {
                log::debug!("Admin {} bypasses generation limits", user.id);
                return Ok(QuotaDecision::Allow(self.reserve_unlimited(user).await));
            }
            Caller::User(user) => user,
            Caller::Anonymous(_) | Caller::Nobody => {
                return Ok(QuotaDecision::Allow(Admission::Unmetered))
            }
        };

        match self.reserve(user).await {
            Ok(decision) => Ok(decision),
            Err(e) => match self.policy {
                QuotaFailurePolicy::FailOpen => {
                    log::error!(
                        "Quota lookup failed for {}, admitting without a reservation: {}",
                        user.id,
                        e
                    );
                    Ok(QuotaDecision::Allow(Admission::Unverified(user.id.clone())))
                }
                QuotaFailurePolicy::FailClosed => {
                    log::error!("Quota lookup failed for {}, refusing: {}", user.id, e);
                    Err(GenerationError::QuotaUnavailable(e))
                }
            },
        }
    }

    async fn reserve(&self, user: &UserIdentity) -> Result<QuotaDecision> {
        let profile = self
            .profiles
            .get_profile(&user.id)
            .await?
            .ok_or_else(|| BanneriaError::StorageError(format!("profile {} not found", user.id)))?;

        let limit = self.tiers.limit_for(profile.subscription_tier.as_deref());
        match self.profiles.reserve_generation(&user.id, limit).await? {
            Reservation::Reserved { count } => {
                log::debug!(
                    "Reserved generation {} of {} for {}",
                    count,
                    limit.map_or_else(|| "unlimited".to_string(), |l| l.to_string()),
                    user.id
                );
                Ok(QuotaDecision::Allow(Admission::Reserved(user.id.clone())))
            }
            Reservation::Exhausted { current } => {
                log::info!("User {} reached the generation limit ({})", user.id, current);
                Ok(QuotaDecision::Deny {
                    limit: limit.unwrap_or(current),
                    current,
                })
            }
        }
    }

    /// Admins are never refused, but their generations still count.
    async fn reserve_unlimited(&self, user: &UserIdentity) -> Admission {
        match self.profiles.reserve_generation(&user.id, None).await {
            Ok(Reservation::Reserved { .. }) => Admission::Reserved(user.id.clone()),
            Ok(Reservation::Exhausted { current }) => {
                log::warn!("Unlimited reservation for {} refused at {}", user.id, current);
                Admission::Unverified(user.id.clone())
            }
            Err(e) => {
                log::error!("Could not reserve for admin {}, counting after save: {}", user.id, e);
                Admission::Unverified(user.id.clone())
            }
        }
    }

    /// Guard that gives the reservation back unless it is committed.
    pub fn guard(&self, admission: &Admission) -> ReservationGuard {
        let user_id = match admission {
            Admission::Reserved(user_id) => Some(user_id.clone()),
            _ => None,
        };
        ReservationGuard {
            profiles: self.profiles.clone(),
            user_id,
        }
    }
}

/// Releases a reserved slot on failure, including when the request future is dropped.
pub struct ReservationGuard {
    profiles: Arc<dyn ProfileStore>,
    user_id: Option<String>,
}

impl ReservationGuard {
    /// The generation succeeded; the slot stays taken.
    pub fn commit(mut self) {
        self.user_id = None;
    }

    pub async fn release(mut self) {
        if let Some(user_id) = self.user_id.take() {
            release(self.profiles.clone(), user_id).await;
        }
    }
}

async fn release(profiles: Arc<dyn ProfileStore>, user_id: String) {
    match profiles.release_generation(&user_id).await {
        Ok(()) => log::debug!("Released generation reservation for {}", user_id),
        Err(e) => log::error!("Failed to release reservation for {}: {}", user_id, e),
    }
}

impl Drop for ReservationGuard {
    fn drop(&mut self) {
        let Some(user_id) = self.user_id.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                log::warn!("Generation for {} was cancelled, releasing its reservation", user_id);
                handle.spawn(release(self.profiles.clone(), user_id));
            }
            Err(_) => log::error!("No runtime to release reservation for {}", user_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn evaluator(store: Arc<MemoryStore>, policy: QuotaFailurePolicy) -> QuotaEvaluator {
        QuotaEvaluator::new(store, TierLimits::default(), policy)
    }

    fn user(id: &str) -> Caller {
        Caller::User(UserIdentity::new(id))
    }

    #[tokio::test]
    async fn denies_when_limit_reached() {
        let store = Arc::new(MemoryStore::new());
        store.add_profile("u1", "free", 5).await;
        let quota = evaluator(store.clone(), QuotaFailurePolicy::FailOpen);

        assert_eq!(
            quota.check(&user("u1")).await.unwrap(),
            QuotaDecision::Deny {
                limit: 5,
                current: 5
            }
        );
        assert_eq!(store.usage("u1").await, Some(5));
    }

    #[tokio::test]
    async fn allows_and_reserves_under_limit() {
        let store = Arc::new(MemoryStore::new());
        store.add_profile("u1", "pro", 19).await;
        let quota = evaluator(store.clone(), QuotaFailurePolicy::FailOpen);

        assert_eq!(
            quota.check(&user("u1")).await.unwrap(),
            QuotaDecision::Allow(Admission::Reserved("u1".into()))
        );
        assert_eq!(store.usage("u1").await, Some(20));
    }

    #[tokio::test]
    async fn admins_bypass_limits_but_are_counted() {
        let store = Arc::new(MemoryStore::new());
        store.add_profile("boss", "free", 99).await;
        let quota = evaluator(store.clone(), QuotaFailurePolicy::FailClosed);

        let admin = Caller::User(UserIdentity::new("boss").admin());
        assert_eq!(
            quota.check(&admin).await.unwrap(),
            QuotaDecision::Allow(Admission::Reserved("boss".into()))
        );
        assert_eq!(store.usage("boss").await, Some(100));
    }

    #[tokio::test]
    async fn admins_are_admitted_when_the_store_is_down() {
        let store = Arc::new(MemoryStore::new());
        store.add_profile("boss", "free", 99).await;
        store.set_profiles_unavailable(true);
        let quota = evaluator(store, QuotaFailurePolicy::FailClosed);

        let admin = Caller::User(UserIdentity::new("boss").admin());
        assert_eq!(
            quota.check(&admin).await.unwrap(),
            QuotaDecision::Allow(Admission::Unverified("boss".into()))
        );
    }

    #[tokio::test]
    async fn anonymous_callers_are_unmetered() {
        let quota = evaluator(Arc::new(MemoryStore::new()), QuotaFailurePolicy::FailClosed);
        assert_eq!(
            quota.check(&Caller::Anonymous("tok".into())).await.unwrap(),
            QuotaDecision::Allow(Admission::Unmetered)
        );
        assert_eq!(
            quota.check(&Caller::Nobody).await.unwrap(),
            QuotaDecision::Allow(Admission::Unmetered)
        );
    }

    #[tokio::test]
    async fn store_failure_follows_policy() {
        let store = Arc::new(MemoryStore::new());
        store.add_profile("u1", "free", 0).await;
        store.set_profiles_unavailable(true);

        let open = evaluator(store.clone(), QuotaFailurePolicy::FailOpen);
        assert_eq!(
            open.check(&user("u1")).await.unwrap(),
            QuotaDecision::Allow(Admission::Unverified("u1".into()))
        );

        let closed = evaluator(store, QuotaFailurePolicy::FailClosed);
        assert!(matches!(
            closed.check(&user("u1")).await,
            Err(GenerationError::QuotaUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn missing_profile_is_a_lookup_failure() {
        let quota = evaluator(Arc::new(MemoryStore::new()), QuotaFailurePolicy::FailOpen);
        assert_eq!(
            quota.check(&user("ghost")).await.unwrap(),
            QuotaDecision::Allow(Admission::Unverified("ghost".into()))
        );
    }

    #[tokio::test]
    async fn guard_releases_unless_committed() {
        let store = Arc::new(MemoryStore::new());
        store.add_profile("u1", "free", 0).await;
        let quota = evaluator(store.clone(), QuotaFailurePolicy::FailOpen);

        quota.check(&user("u1")).await.unwrap();
        let admission = Admission::Reserved("u1".into());
        quota.guard(&admission).release().await;
        assert_eq!(store.usage("u1").await, Some(0));

        quota.check(&user("u1")).await.unwrap();
        quota.guard(&admission).commit();
        assert_eq!(store.usage("u1").await, Some(1));
    }

    #[tokio::test]
    async fn dropped_guard_releases_in_background() {
        let store = Arc::new(MemoryStore::new());
        store.add_profile("u1", "free", 0).await;
        let quota = evaluator(store.clone(), QuotaFailurePolicy::FailOpen);

        quota.check(&user("u1")).await.unwrap();
        drop(quota.guard(&Admission::Reserved("u1".into())));

        for _ in 0..50 {
            if store.usage("u1").await == Some(0) {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(store.usage("u1").await, Some(0));
    }
}
