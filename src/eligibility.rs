// Entry gate for the ranked queue and for issuing challenges.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::RankedPolicy;
use crate::db::{Career, PlayerId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntryDenied {
    #[error("ranked rating is suspended for this account")]
    Suspended,
    #[error("trust score {score} is below {threshold}")]
    LowTrust { score: i32, threshold: i32 },
    #[error("account must be at least {min_days} days old")]
    AccountTooNew { min_days: u32 },
}

/// Source of platform account ages, when the host has one.
#[async_trait]
pub trait AccountAgeVerifier: Send + Sync {
    /// Account age in whole days, or `None` if unknown.
    async fn account_age_days(&self, player_id: PlayerId) -> Option<u32>;
}

pub struct EntryGate {
    suspend_trust_threshold: i32,
    age_check: Option<(Arc<dyn AccountAgeVerifier>, u32)>,
}

impl EntryGate {
    pub fn new(policy: &RankedPolicy, verifier: Option<Arc<dyn AccountAgeVerifier>>) -> Self {
        let age_check = if policy.account_age_check_enabled {
            verifier.map(|v| (v, policy.min_account_age_days))
        } else {
            None
        };
        Self {
            suspend_trust_threshold: policy.suspend_trust_threshold,
            age_check,
        }
    }

    pub async fn check(&self, career: &Career) -> Result<(), EntryDenied> {
        if career.rating_suspended {
            return Err(EntryDenied::Suspended);
        }
        if career.trust_score < self.suspend_trust_threshold {
            return Err(EntryDenied::LowTrust {
                score: career.trust_score,
                threshold: self.suspend_trust_threshold,
            });
        }
        if let Some((verifier, min_days)) = &self.age_check {
            // Unknown ages are let through
            if let Some(days) = verifier.account_age_days(career.player_id).await {
                if days < *min_days {
                    return Err(EntryDenied::AccountTooNew { min_days: *min_days });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedAge(Option<u32>);

    #[async_trait]
    impl AccountAgeVerifier for FixedAge {
        async fn account_age_days(&self, _player_id: PlayerId) -> Option<u32> {
            self.0
        }
    }

    fn career(trust: i32, suspended: bool) -> Career {
        let mut c = Career::new(1, 0);
        c.trust_score = trust;
        c.rating_suspended = suspended;
        c
    }

    #[tokio::test]
    async fn test_default_gate() {
        let gate = EntryGate::new(&RankedPolicy::default(), None);
        assert_eq!(gate.check(&career(50, false)).await, Ok(()));
        assert_eq!(gate.check(&career(20, false)).await, Ok(()));
        assert_eq!(
            gate.check(&career(19, false)).await,
            Err(EntryDenied::LowTrust {
                score: 19,
                threshold: 20
            })
        );
        assert_eq!(
            gate.check(&career(90, true)).await,
            Err(EntryDenied::Suspended)
        );
    }

    #[tokio::test]
    async fn test_age_check_only_when_enabled() {
        let young: Arc<dyn AccountAgeVerifier> = Arc::new(FixedAge(Some(3)));

        let off = EntryGate::new(&RankedPolicy::default(), Some(young.clone()));
        assert!(off.check(&career(50, false)).await.is_ok());

        let policy = RankedPolicy {
            account_age_check_enabled: true,
            ..RankedPolicy::default()
        };
        let on = EntryGate::new(&policy, Some(young));
        assert_eq!(
            on.check(&career(50, false)).await,
            Err(EntryDenied::AccountTooNew { min_days: 30 })
        );

        let unknown = EntryGate::new(&policy, Some(Arc::new(FixedAge(None))));
        assert!(unknown.check(&career(50, false)).await.is_ok());
    }
}
