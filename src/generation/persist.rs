use super::quota::Admission;
use crate::{
    models::{Artifact, Caller, GenerationRequest, NewAnonymousBanner, NewBanner},
    storage::{BannerStore, ProfileStore},
};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved { id: String },
    /// Nobody to attribute the banner to.
    Skipped,
    /// The write failed; already logged.
    Failed,
}

/// Best-effort gallery writer. Never fails the request.
#[derive(Clone)]
pub struct PersistenceSink {
    banners: Arc<dyn BannerStore>,
    profiles: Arc<dyn ProfileStore>,
}

impl PersistenceSink {
    pub fn new(banners: Arc<dyn BannerStore>, profiles: Arc<dyn ProfileStore>) -> Self {
        Self { banners, profiles }
    }

    pub async fn save(
        &self,
        artifact: &Artifact,
        request: &GenerationRequest,
        admission: &Admission,
    ) -> SaveOutcome {
        let inserted = match &request.caller {
            Caller::User(user) => {
                let banner = NewBanner {
                    user_id: user.id.clone(),
                    image_url: artifact.to_data_url(),
                    prompt: request.briefing.clone(),
                    size: request.size.as_str().to_string(),
                    model: artifact.model.clone(),
                };
                self.banners.insert_banner(banner).await
            }
            Caller::Anonymous(token) => {
                let banner = NewAnonymousBanner {
                    session_token: token.clone(),
                    image_url: artifact.to_data_url(),
                    prompt: request.briefing.clone(),
                    size: request.size.as_str().to_string(),
                    model: artifact.model.clone(),
                };
                self.banners.insert_anonymous_banner(banner).await
            }
            Caller::Nobody => {
                log::warn!("Generated banner has no owner, nothing is saved");
                return SaveOutcome::Skipped;
            }
        };

        let inserted = match inserted {
            Ok(result) => result,
            Err(e) => {
                log::error!("Failed to save generated banner: {}", e);
                return SaveOutcome::Failed;
            }
        };
        log::info!("Saved banner {} ({})", inserted.id, artifact.model);

        if let Admission::Unverified(user_id) = admission {
            match self.profiles.increment_generations(user_id).await {
                Ok(count) => log::debug!("Usage for {} is now {}", user_id, count),
                Err(e) => log::error!("Failed to count generation for {}: {}", user_id, e),
            }
        }

        SaveOutcome::Saved { id: inserted.id }
    }
}
