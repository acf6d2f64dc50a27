use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use torque_core::{
    ApiKeyId, ApplicationId, Entity, ExpectedVersion, LifecycleManaged, LifecyclePredicate,
    TaskId, Versioned,
};
use torque_tasks::{ApiKey, Application, Task};

use super::r#trait::{ApplicationStore, CascadeReport, StoreError, TaskQuery, TaskStore};

#[derive(Debug, Default)]
struct Tables {
    tasks: HashMap<TaskId, Task>,
    applications: HashMap<ApplicationId, Application>,
    api_keys: HashMap<ApiKeyId, ApiKey>,
}

/// In-memory store for tests/dev.
///
/// All tables sit behind one lock so cascade deletes and conditional writes are
/// atomic. Not optimized for performance.
#[derive(Debug)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    task_seq: AtomicU64,
    application_seq: AtomicU64,
    api_key_seq: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            task_seq: AtomicU64::new(0),
            application_seq: AtomicU64::new(0),
            api_key_seq: AtomicU64::new(0),
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn next(seq: &AtomicU64) -> u64 {
    seq.fetch_add(1, Ordering::SeqCst) + 1
}

/// Compare-and-swap of one record keyed by its id.
fn replace_if_version<T>(
    table: &mut HashMap<T::Id, T>,
    record: &T,
    expected: ExpectedVersion,
    numeric_id: u64,
) -> Result<(), StoreError>
where
    T: Entity + Versioned + Clone,
{
    let stored = table.get_mut(record.id()).ok_or(StoreError::NotFound {
        kind: T::KIND,
        id: numeric_id,
    })?;

    let actual = stored.version();
    if !expected.matches(actual) {
        return Err(StoreError::VersionConflict {
            kind: T::KIND,
            id: numeric_id,
            expected,
            actual,
        });
    }

    *stored = record.clone();
    Ok(())
}

impl TaskStore for InMemoryStore {
    fn next_task_id(&self) -> Result<TaskId, StoreError> {
        Ok(TaskId::new(next(&self.task_seq)))
    }

    fn insert_task(&self, task: Task) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let id = task.id_typed();
        if tables.tasks.contains_key(&id) {
            return Err(StoreError::AlreadyExists {
                kind: Task::KIND,
                id: id.get(),
            });
        }
        if let Some(app_id) = task.app_id() {
            if !tables.applications.contains_key(&app_id) {
                return Err(StoreError::NotFound {
                    kind: Application::KIND,
                    id: app_id.get(),
                });
            }
        }
        tables.tasks.insert(id, task);
        Ok(())
    }

    fn load_task(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.read()?.tasks.get(&id).cloned())
    }

    fn update_task_if_version(
        &self,
        task: &Task,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        replace_if_version(&mut tables.tasks, task, expected, task.id_typed().get())
    }

    fn query_tasks(&self, query: &TaskQuery) -> Result<Vec<Task>, StoreError> {
        let tables = self.read()?;
        let mut result: Vec<Task> = tables
            .tasks
            .values()
            .filter(|t| query.matches(t))
            .cloned()
            .collect();

        result.sort_by_key(|t| (t.due(), t.id_typed()));
        if let Some(limit) = query.limit {
            result.truncate(limit);
        }
        Ok(result)
    }
}

impl ApplicationStore for InMemoryStore {
    fn next_application_id(&self) -> Result<ApplicationId, StoreError> {
        Ok(ApplicationId::new(next(&self.application_seq)))
    }

    fn insert_application(&self, app: Application) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let id = app.id_typed();
        if tables.applications.contains_key(&id) {
            return Err(StoreError::AlreadyExists {
                kind: Application::KIND,
                id: id.get(),
            });
        }
        tables.applications.insert(id, app);
        Ok(())
    }

    fn load_application(&self, id: ApplicationId) -> Result<Option<Application>, StoreError> {
        Ok(self.read()?.applications.get(&id).cloned())
    }

    fn update_application_if_version(
        &self,
        app: &Application,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        replace_if_version(&mut tables.applications, app, expected, app.id_typed().get())
    }

    fn query_applications(
        &self,
        predicate: LifecyclePredicate,
    ) -> Result<Vec<Application>, StoreError> {
        let tables = self.read()?;
        let mut result: Vec<Application> = tables
            .applications
            .values()
            .filter(|a| predicate.matches(a.lifecycle()))
            .cloned()
            .collect();
        result.sort_by_key(|a| a.id_typed());
        Ok(result)
    }

    fn delete_application(&self, id: ApplicationId) -> Result<CascadeReport, StoreError> {
        let mut tables = self.write()?;
        if tables.applications.remove(&id).is_none() {
            return Err(StoreError::NotFound {
                kind: Application::KIND,
                id: id.get(),
            });
        }

        let tasks_before = tables.tasks.len();
        tables.tasks.retain(|_, t| t.app_id() != Some(id));
        let keys_before = tables.api_keys.len();
        tables.api_keys.retain(|_, k| k.app_id() != id);

        let report = CascadeReport {
            tasks_removed: tasks_before - tables.tasks.len(),
            api_keys_removed: keys_before - tables.api_keys.len(),
        };
        debug!(
            app_id = %id,
            tasks_removed = report.tasks_removed,
            api_keys_removed = report.api_keys_removed,
            "application deleted with cascade"
        );
        Ok(report)
    }

    fn next_api_key_id(&self) -> Result<ApiKeyId, StoreError> {
        Ok(ApiKeyId::new(next(&self.api_key_seq)))
    }

    fn insert_api_key(&self, key: ApiKey) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let id = key.id_typed();
        if tables.api_keys.contains_key(&id) {
            return Err(StoreError::AlreadyExists {
                kind: ApiKey::KIND,
                id: id.get(),
            });
        }
        if !tables.applications.contains_key(&key.app_id()) {
            return Err(StoreError::NotFound {
                kind: Application::KIND,
                id: key.app_id().get(),
            });
        }
        if tables.api_keys.values().any(|k| k.value() == key.value()) {
            return Err(StoreError::DuplicateKeyValue);
        }
        tables.api_keys.insert(id, key);
        Ok(())
    }

    fn load_api_key(&self, id: ApiKeyId) -> Result<Option<ApiKey>, StoreError> {
        Ok(self.read()?.api_keys.get(&id).cloned())
    }

    fn update_api_key_if_version(
        &self,
        key: &ApiKey,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        replace_if_version(&mut tables.api_keys, key, expected, key.id_typed().get())
    }

    fn find_api_key_by_value(&self, value: &str) -> Result<Option<ApiKey>, StoreError> {
        let active = LifecyclePredicate::active();
        Ok(self
            .read()?
            .api_keys
            .values()
            .find(|k| k.value() == value && active.matches(k.lifecycle()))
            .cloned())
    }

    fn api_keys_for(
        &self,
        app_id: ApplicationId,
        predicate: LifecyclePredicate,
    ) -> Result<Vec<ApiKey>, StoreError> {
        let tables = self.read()?;
        let mut result: Vec<ApiKey> = tables
            .api_keys
            .values()
            .filter(|k| k.app_id() == app_id && predicate.matches(k.lifecycle()))
            .cloned()
            .collect();
        result.sort_by_key(|k| k.id_typed());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use torque_tasks::{NewTask, RandomKeyGenerator, SchedulePolicy, TaskStatus};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 2, 10, 0, 0).unwrap()
    }

    fn seed_task(store: &InMemoryStore, new: NewTask) -> Task {
        let id = store.next_task_id().unwrap();
        let task = Task::create(id, new, &SchedulePolicy::default(), now()).unwrap();
        store.insert_task(task.clone()).unwrap();
        task
    }

    fn seed_app(store: &InMemoryStore, name: &str) -> Application {
        let id = store.next_application_id().unwrap();
        let app = Application::create(id, name, now()).unwrap();
        store.insert_application(app.clone()).unwrap();
        app
    }

    fn seed_key(store: &InMemoryStore, app: &Application) -> ApiKey {
        let id = store.next_api_key_id().unwrap();
        let key = ApiKey::issue(id, app.id_typed(), &RandomKeyGenerator, now()).unwrap();
        store.insert_api_key(key.clone()).unwrap();
        key
    }

    #[test]
    fn ids_are_sequential() {
        let store = InMemoryStore::new();
        assert_eq!(store.next_task_id().unwrap(), TaskId::new(1));
        assert_eq!(store.next_task_id().unwrap(), TaskId::new(2));
        assert_eq!(store.next_application_id().unwrap(), ApplicationId::new(1));
    }

    #[test]
    fn conditional_update_rejects_stale_version() {
        let store = InMemoryStore::new();
        let task = seed_task(&store, NewTask::new("https://example.com/a", 10));

        let mut first = task.clone();
        first.advance_retry(&SchedulePolicy::default(), now()).unwrap();
        store
            .update_task_if_version(&first, task.expected_version())
            .unwrap();

        let mut second = task.clone();
        second.advance_retry(&SchedulePolicy::default(), now()).unwrap();
        let err = store
            .update_task_if_version(&second, task.expected_version())
            .unwrap_err();

        assert!(matches!(err, StoreError::VersionConflict { actual: 2, .. }));
        let stored = store.load_task(task.id_typed()).unwrap().unwrap();
        assert_eq!(stored.retry_count(), 1);
    }

    #[test]
    fn update_of_unknown_task_is_not_found() {
        let store = InMemoryStore::new();
        let task = Task::create(
            TaskId::new(77),
            NewTask::new("https://example.com/a", 10),
            &SchedulePolicy::default(),
            now(),
        )
        .unwrap();

        assert!(matches!(
            store.update_task_if_version(&task, ExpectedVersion::Any),
            Err(StoreError::NotFound { kind: "task", id: 77 })
        ));
    }

    #[test]
    fn due_query_honors_status_lifecycle_and_time() {
        let store = InMemoryStore::new();
        let soon = seed_task(&store, NewTask::new("https://example.com/soon", 5));
        let later = seed_task(&store, NewTask::new("https://example.com/later", 500));

        let mut hidden = seed_task(&store, NewTask::new("https://example.com/hidden", 5));
        let expected = hidden.expected_version();
        hidden.deactivate(now());
        store.update_task_if_version(&hidden, expected).unwrap();

        let mut done = seed_task(&store, NewTask::new("https://example.com/done", 5));
        let expected = done.expected_version();
        done.mark_completed(now()).unwrap();
        store.update_task_if_version(&done, expected).unwrap();

        let at = now() + Duration::seconds(60);
        let due = store.query_tasks(&TaskQuery::due(at)).unwrap();
        let ids: Vec<_> = due.iter().map(|t| t.id_typed()).collect();
        assert_eq!(ids, vec![soon.id_typed()]);

        let visible = store.query_tasks(&TaskQuery::visible()).unwrap();
        assert_eq!(visible.len(), 3);
        assert_eq!(visible.last().unwrap().id_typed(), later.id_typed());

        let completed = store
            .query_tasks(&TaskQuery::all().with_statuses([TaskStatus::Completed]))
            .unwrap();
        assert_eq!(completed.len(), 1);
    }

    #[test]
    fn task_insert_requires_existing_application() {
        let store = InMemoryStore::new();
        let id = store.next_task_id().unwrap();
        let task = Task::create(
            id,
            NewTask::new("https://example.com/a", 10).with_app(ApplicationId::new(404)),
            &SchedulePolicy::default(),
            now(),
        )
        .unwrap();

        assert!(matches!(
            store.insert_task(task),
            Err(StoreError::NotFound { kind: "application", id: 404 })
        ));
    }

    #[test]
    fn deleting_application_cascades_only_to_owned_rows() {
        let store = InMemoryStore::new();
        let billing = seed_app(&store, "billing");
        let shipping = seed_app(&store, "shipping");

        seed_task(&store, NewTask::new("https://example.com/1", 10).with_app(billing.id_typed()));
        seed_task(&store, NewTask::new("https://example.com/2", 10).with_app(billing.id_typed()));
        let kept = seed_task(
            &store,
            NewTask::new("https://example.com/3", 10).with_app(shipping.id_typed()),
        );
        let unowned = seed_task(&store, NewTask::new("https://example.com/4", 10));
        seed_key(&store, &billing);
        let shipping_key = seed_key(&store, &shipping);

        let report = store.delete_application(billing.id_typed()).unwrap();
        assert_eq!(
            report,
            CascadeReport {
                tasks_removed: 2,
                api_keys_removed: 1
            }
        );

        let remaining: Vec<_> = store
            .query_tasks(&TaskQuery::all())
            .unwrap()
            .iter()
            .map(|t| t.id_typed())
            .collect();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.contains(&kept.id_typed()));
        assert!(remaining.contains(&unowned.id_typed()));
        assert!(store.load_application(billing.id_typed()).unwrap().is_none());
        assert!(store.load_api_key(shipping_key.id_typed()).unwrap().is_some());

        assert!(matches!(
            store.delete_application(billing.id_typed()),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn key_lookup_ignores_inactive_keys() {
        let store = InMemoryStore::new();
        let app = seed_app(&store, "billing");
        let mut key = seed_key(&store, &app);

        let found = store.find_api_key_by_value(key.value()).unwrap();
        assert_eq!(found.as_ref().map(|k| k.id_typed()), Some(key.id_typed()));

        let expected = key.expected_version();
        key.deactivate(now());
        store.update_api_key_if_version(&key, expected).unwrap();

        assert!(store.find_api_key_by_value(key.value()).unwrap().is_none());
        assert_eq!(
            store
                .api_keys_for(app.id_typed(), LifecyclePredicate::any())
                .unwrap()
                .len(),
            1
        );
    }
}
