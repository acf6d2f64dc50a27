//! Application and API key operations.

use tracing::info;

use torque_core::{
    ApiKeyId, ApplicationId, Clock, LifecycleManaged, LifecyclePredicate, LifecycleTransition,
    SystemClock, Versioned,
};
use torque_tasks::{ApiKey, Application, KeyGenerator, RandomKeyGenerator};

use crate::service::ServiceError;
use crate::store::{ApplicationStore, CascadeReport};

pub struct ApplicationService<S, C = SystemClock> {
    store: S,
    clock: C,
    keys: Box<dyn KeyGenerator>,
}

impl<S> ApplicationService<S, SystemClock> {
    pub fn new(store: S) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<S, C> ApplicationService<S, C> {
    pub fn with_clock(store: S, clock: C) -> Self {
        Self {
            store,
            clock,
            keys: Box::new(RandomKeyGenerator),
        }
    }

    pub fn with_key_generator(mut self, keys: impl KeyGenerator + 'static) -> Self {
        self.keys = Box::new(keys);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S, C> ApplicationService<S, C>
where
    S: ApplicationStore,
    C: Clock,
{
    pub fn create(&self, name: impl Into<String>) -> Result<Application, ServiceError> {
        let id = self.store.next_application_id()?;
        let app = Application::create(id, name, self.clock.now())?;
        self.store.insert_application(app.clone())?;
        info!(app_id = %id, name = app.name(), "application created");
        Ok(app)
    }

    pub fn get(&self, id: ApplicationId) -> Result<Application, ServiceError> {
        self.store.load_application(id)?.ok_or(ServiceError::NotFound)
    }

    /// Applications passing the active clauses.
    pub fn list_active(&self) -> Result<Vec<Application>, ServiceError> {
        Ok(self.store.query_applications(LifecyclePredicate::active())?)
    }

    pub fn transition(
        &self,
        id: ApplicationId,
        transition: LifecycleTransition,
    ) -> Result<Application, ServiceError> {
        let mut app = self.get(id)?;
        let expected = app.expected_version();
        if app.transition(transition, self.clock.now()) {
            self.store.update_application_if_version(&app, expected)?;
        }
        Ok(app)
    }

    /// Physically remove the application with all its tasks and keys.
    pub fn destroy(&self, id: ApplicationId) -> Result<CascadeReport, ServiceError> {
        let report = self.store.delete_application(id)?;
        info!(
            app_id = %id,
            tasks_removed = report.tasks_removed,
            api_keys_removed = report.api_keys_removed,
            "application destroyed"
        );
        Ok(report)
    }

    pub fn issue_key(&self, app_id: ApplicationId) -> Result<ApiKey, ServiceError> {
        let id = self.store.next_api_key_id()?;
        let key = ApiKey::issue(id, app_id, self.keys.as_ref(), self.clock.now())?;
        self.store.insert_api_key(key.clone())?;
        info!(app_id = %app_id, key_id = %id, "api key issued");
        Ok(key)
    }

    pub fn transition_key(
        &self,
        id: ApiKeyId,
        transition: LifecycleTransition,
    ) -> Result<ApiKey, ServiceError> {
        let mut key = self.store.load_api_key(id)?.ok_or(ServiceError::NotFound)?;
        let expected = key.expected_version();
        if key.transition(transition, self.clock.now()) {
            self.store.update_api_key_if_version(&key, expected)?;
        }
        Ok(key)
    }

    /// Active key with this value whose owning application is active too.
    ///
    /// Lookup only; deciding what the caller may do is left to the
    /// authorization layer.
    pub fn find_active_key(&self, value: &str) -> Result<Option<ApiKey>, ServiceError> {
        let Some(key) = self.store.find_api_key_by_value(value)? else {
            return Ok(None);
        };
        let owner_active = self
            .store
            .load_application(key.app_id())?
            .is_some_and(|app| LifecyclePredicate::active().matches(app.lifecycle()));
        Ok(owner_active.then_some(key))
    }

    pub fn keys_for(&self, app_id: ApplicationId) -> Result<Vec<ApiKey>, ServiceError> {
        Ok(self.store.api_keys_for(app_id, LifecyclePredicate::active())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use torque_core::FixedClock;
    use torque_tasks::{NewTask, SchedulePolicy};

    use crate::service::TaskService;
    use crate::store::{InMemoryStore, TaskQuery};

    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 9, 9, 9, 0, 0).unwrap()))
    }

    #[test]
    fn destroy_cascades_to_tasks_and_keys() {
        let store = InMemoryStore::arc();
        let apps = ApplicationService::with_clock(store.clone(), clock());
        let tasks = TaskService::with_clock(store.clone(), SchedulePolicy::default(), clock());

        let app = apps.create("billing").unwrap();
        apps.issue_key(app.id_typed()).unwrap();
        tasks
            .create(NewTask::new("https://example.com/a", 5).with_app(app.id_typed()))
            .unwrap();
        let unowned = tasks.create(NewTask::new("https://example.com/b", 5)).unwrap();

        let report = apps.destroy(app.id_typed()).unwrap();
        assert_eq!(report.tasks_removed, 1);
        assert_eq!(report.api_keys_removed, 1);

        let left = tasks.list(&TaskQuery::all()).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id_typed(), unowned.id_typed());
        assert!(apps.keys_for(app.id_typed()).unwrap().is_empty());
    }

    #[test]
    fn key_of_deactivated_application_is_not_found() {
        let apps = ApplicationService::with_clock(InMemoryStore::arc(), clock());
        let app = apps.create("billing").unwrap();
        let key = apps.issue_key(app.id_typed()).unwrap();

        assert!(apps.find_active_key(key.value()).unwrap().is_some());

        apps.transition(app.id_typed(), LifecycleTransition::Deactivated)
            .unwrap();
        assert!(apps.find_active_key(key.value()).unwrap().is_none());
        assert!(apps.list_active().unwrap().is_empty());
    }

    #[test]
    fn deleted_key_is_not_found() {
        let apps = ApplicationService::with_clock(InMemoryStore::arc(), clock());
        let app = apps.create("billing").unwrap();
        let key = apps.issue_key(app.id_typed()).unwrap();

        let deleted = apps
            .transition_key(key.id_typed(), LifecycleTransition::Deleted)
            .unwrap();
        assert_eq!(deleted.version(), 2);
        assert!(apps.find_active_key(key.value()).unwrap().is_none());

        // Deleting again is a no-op.
        let again = apps
            .transition_key(key.id_typed(), LifecycleTransition::Deleted)
            .unwrap();
        assert_eq!(again.version(), 2);
    }

    #[test]
    fn issuing_for_unknown_application_fails() {
        let apps = ApplicationService::with_clock(InMemoryStore::arc(), clock());
        assert_eq!(
            apps.issue_key(ApplicationId::new(3)).unwrap_err(),
            ServiceError::NotFound
        );
    }
}
