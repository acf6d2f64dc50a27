//! Applications and the API keys that identify them.

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use torque_core::{
    ApiKeyId, ApplicationId, DomainError, DomainResult, Entity, LifecycleManaged,
    LifecycleState, RecordMeta, Versioned,
};

pub const MAX_APPLICATION_NAME_LEN: usize = 96;
pub const API_KEY_LEN: usize = 40;

/// Owner of tasks and API keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    meta: RecordMeta<ApplicationId>,
    lifecycle: LifecycleState,
    name: String,
}

impl Application {
    pub fn create(id: ApplicationId, name: impl Into<String>, now: DateTime<Utc>) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("application name cannot be empty"));
        }
        if name.chars().count() > MAX_APPLICATION_NAME_LEN {
            return Err(DomainError::validation(format!(
                "application name exceeds {MAX_APPLICATION_NAME_LEN} characters"
            )));
        }

        Ok(Self {
            meta: RecordMeta::new(id, now),
            lifecycle: LifecycleState::new(),
            name,
        })
    }

    pub fn id_typed(&self) -> ApplicationId {
        *self.meta.id()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn meta(&self) -> &RecordMeta<ApplicationId> {
        &self.meta
    }
}

impl Entity for Application {
    type Id = ApplicationId;
    const KIND: &'static str = "application";

    fn id(&self) -> &Self::Id {
        self.meta.id()
    }
}

impl Versioned for Application {
    fn version(&self) -> u64 {
        self.meta.version()
    }
}

impl LifecycleManaged for Application {
    fn lifecycle(&self) -> &LifecycleState {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut LifecycleState {
        &mut self.lifecycle
    }

    fn on_lifecycle_change(&mut self, now: DateTime<Utc>) {
        self.meta.touch(now);
    }
}

/// Source of fresh API key values.
pub trait KeyGenerator: Send + Sync {
    /// Must return exactly [`API_KEY_LEN`] characters.
    fn generate(&self) -> String;
}

/// 20 random bytes, hex encoded.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomKeyGenerator;

impl KeyGenerator for RandomKeyGenerator {
    fn generate(&self) -> String {
        let mut bytes = [0_u8; API_KEY_LEN / 2];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }
}

/// Credential belonging to exactly one application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    meta: RecordMeta<ApiKeyId>,
    lifecycle: LifecycleState,
    app_id: ApplicationId,
    value: String,
}

impl ApiKey {
    pub fn issue(
        id: ApiKeyId,
        app_id: ApplicationId,
        generator: &dyn KeyGenerator,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let value = generator.generate();
        if value.chars().count() != API_KEY_LEN {
            return Err(DomainError::validation(format!(
                "api key must be {API_KEY_LEN} characters"
            )));
        }

        Ok(Self {
            meta: RecordMeta::new(id, now),
            lifecycle: LifecycleState::new(),
            app_id,
            value,
        })
    }

    pub fn id_typed(&self) -> ApiKeyId {
        *self.meta.id()
    }

    pub fn app_id(&self) -> ApplicationId {
        self.app_id
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl Entity for ApiKey {
    type Id = ApiKeyId;
    const KIND: &'static str = "api_key";

    fn id(&self) -> &Self::Id {
        self.meta.id()
    }
}

impl Versioned for ApiKey {
    fn version(&self) -> u64 {
        self.meta.version()
    }
}

impl LifecycleManaged for ApiKey {
    fn lifecycle(&self) -> &LifecycleState {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut LifecycleState {
        &mut self.lifecycle
    }

    fn on_lifecycle_change(&mut self, now: DateTime<Utc>) {
        self.meta.touch(now);
    }
}
