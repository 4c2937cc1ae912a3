//! In-memory provider for handler and router tests.

use super::{IdentityProvider, NewUser, ProviderError, ProviderFuture, ProviderUser, UserProfile};
use secrecy::{ExposeSecret, SecretString};
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Mutex, PoisonError,
};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create(String),
    Update(Uuid),
    Delete(Uuid),
    Upsert(String),
}

#[derive(Debug, Default)]
pub struct MemoryProvider {
    users: Mutex<Vec<(ProviderUser, String)>>,
    profiles: Mutex<Vec<UserProfile>>,
    calls: Mutex<Vec<Call>>,
    list_calls: AtomicUsize,
    fail_create: AtomicBool,
    fail_upsert: AtomicBool,
}

impl MemoryProvider {
    pub fn insert(&self, email: &str) -> Uuid {
        let id = Uuid::new_v4();
        let user = ProviderUser {
            id,
            email: Some(email.to_string()),
        };
        lock(&self.users).push((user, String::new()));
        id
    }

    pub fn fail_create(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    pub fn fail_upsert(&self) {
        self.fail_upsert.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn password_of(&self, email: &str) -> Option<String> {
        lock(&self.users)
            .iter()
            .find(|(user, _)| user.email.as_deref() == Some(email))
            .map(|(_, password)| password.clone())
    }

    pub fn has_user(&self, email: &str) -> bool {
        lock(&self.users)
            .iter()
            .any(|(user, _)| user.email.as_deref() == Some(email))
    }

    pub fn profiles(&self) -> Vec<UserProfile> {
        lock(&self.profiles).clone()
    }

    fn record(&self, call: Call) {
        lock(&self.calls).push(call);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn rejected(message: &str) -> ProviderError {
    ProviderError::Api {
        status: 500,
        message: message.to_string(),
    }
}

impl IdentityProvider for MemoryProvider {
    fn create_user<'a>(&'a self, user: &'a NewUser) -> ProviderFuture<'a, ProviderUser> {
        Box::pin(async move {
            self.record(Call::Create(user.email.clone()));
            if self.fail_create.load(Ordering::SeqCst) || self.has_user(&user.email) {
                return Err(rejected("create rejected"));
            }
            let created = ProviderUser {
                id: Uuid::new_v4(),
                email: Some(user.email.clone()),
            };
            lock(&self.users).push((created.clone(), user.password.expose_secret().to_string()));
            Ok(created)
        })
    }

    fn list_users(&self, page: u32, per_page: u32) -> ProviderFuture<'_, Vec<ProviderUser>> {
        Box::pin(async move {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            let skip = (page.saturating_sub(1) * per_page) as usize;
            Ok(lock(&self.users)
                .iter()
                .skip(skip)
                .take(per_page as usize)
                .map(|(user, _)| user.clone())
                .collect())
        })
    }

    fn update_password<'a>(
        &'a self,
        user_id: Uuid,
        password: &'a SecretString,
    ) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            self.record(Call::Update(user_id));
            let mut users = lock(&self.users);
            let entry = users
                .iter_mut()
                .find(|(user, _)| user.id == user_id)
                .ok_or_else(|| rejected("user not found"))?;
            entry.1 = password.expose_secret().to_string();
            Ok(())
        })
    }

    fn delete_user(&self, user_id: Uuid) -> ProviderFuture<'_, ()> {
        Box::pin(async move {
            self.record(Call::Delete(user_id));
            lock(&self.users).retain(|(user, _)| user.id != user_id);
            Ok(())
        })
    }

    fn upsert_profile<'a>(&'a self, profile: &'a UserProfile) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            self.record(Call::Upsert(profile.name.clone()));
            if self.fail_upsert.load(Ordering::SeqCst) {
                return Err(rejected("upsert rejected"));
            }
            let mut profiles = lock(&self.profiles);
            profiles.retain(|existing| existing.name != profile.name);
            profiles.push(profile.clone());
            Ok(())
        })
    }
}
