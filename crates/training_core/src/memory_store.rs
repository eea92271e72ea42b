//! crates/training_core/src/memory_store.rs
//!
//! An in-process implementation of the store ports. It keeps the store's
//! observable behavior (generated ids, timestamps, relation checks, filtering,
//! sorting, paging and expansion) so the workflows can run against it unchanged.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{AuthSession, User};
use crate::ports::{AuthService, Collection, PortError, PortResult, Record, RecordPage, RecordStore};
use crate::query::ListQuery;

const ID_LEN: usize = 15;
const TOKEN_TTL_DAYS: i64 = 14;

#[derive(Default)]
pub struct MemoryRecordStore {
    collections: Mutex<HashMap<Collection, Vec<Record>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held in `collection`.
    pub async fn len(&self, collection: Collection) -> usize {
        self.collections
            .lock()
            .await
            .get(&collection)
            .map_or(0, Vec::len)
    }
}

//=========================================================================================
// Record helpers
//=========================================================================================

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()[..ID_LEN].to_string()
}

fn timestamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S%.3fZ").to_string()
}

fn into_fields(fields: Value) -> PortResult<Map<String, Value>> {
    match fields {
        Value::Object(map) => Ok(map),
        other => Err(PortError::Validation(format!(
            "Expected an object of fields, got {}",
            other
        ))),
    }
}

fn find<'a>(
    data: &'a HashMap<Collection, Vec<Record>>,
    collection: Collection,
    id: &str,
) -> Option<&'a Record> {
    data.get(&collection)?.iter().find(|r| r.id == id)
}

fn hash_password(password: &str) -> PortResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PortError::Unexpected(format!("Failed to hash password: {}", e)))
}

fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Replaces a plaintext `password` field of a `users` write with its hash.
fn hash_password_field(collection: Collection, fields: &mut Map<String, Value>) -> PortResult<()> {
    if collection != Collection::Users {
        return Ok(());
    }
    if let Some(confirm) = fields.remove("passwordConfirm") {
        if fields.get("password") != Some(&confirm) {
            return Err(PortError::Validation("Passwords do not match".to_string()));
        }
    }
    if let Some(Value::String(password)) = fields.get("password") {
        let hash = hash_password(password)?;
        fields.insert("password".to_string(), Value::String(hash));
    }
    Ok(())
}

/// Rejects writes whose relation fields point at records that do not exist.
fn check_relations(
    data: &HashMap<Collection, Vec<Record>>,
    collection: Collection,
    fields: &Map<String, Value>,
) -> PortResult<()> {
    for (field, value) in fields {
        let Some(target) = collection.relation(field) else {
            continue;
        };
        let ids: Vec<&str> = match value {
            Value::String(id) => vec![id.as_str()],
            Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        for id in ids.into_iter().filter(|id| !id.is_empty()) {
            if find(data, target, id).is_none() {
                return Err(PortError::Validation(format!(
                    "{}.{} references missing {} record {}",
                    collection, field, target, id
                )));
            }
        }
    }
    Ok(())
}

/// The record as a client sees it: secrets stripped and relations expanded.
fn present(
    data: &HashMap<Collection, Vec<Record>>,
    collection: Collection,
    record: &Record,
    expand: &[String],
) -> Record {
    let mut out = scrub(collection, record);
    for key in expand {
        if let Some(value) = expand_one(data, collection, record, key) {
            out.expand.insert(key.clone(), value);
        }
    }
    out
}

fn scrub(collection: Collection, record: &Record) -> Record {
    let mut out = record.clone();
    if collection == Collection::Users {
        out.fields.remove("password");
    }
    out
}

fn expand_one(
    data: &HashMap<Collection, Vec<Record>>,
    collection: Collection,
    record: &Record,
    key: &str,
) -> Option<Value> {
    // Back-relation: `other_collection(field_pointing_here)`.
    if let Some((name, field)) = key
        .strip_suffix(')')
        .and_then(|s| s.split_once('('))
    {
        let source = Collection::from_name(name)?;
        let items: Vec<Value> = data
            .get(&source)
            .into_iter()
            .flatten()
            .filter(|r| match r.fields.get(field) {
                Some(Value::String(id)) => *id == record.id,
                Some(Value::Array(ids)) => ids.iter().any(|id| id.as_str() == Some(record.id.as_str())),
                _ => false,
            })
            .map(|r| scrub(source, r).to_value())
            .collect();
        return (!items.is_empty()).then_some(Value::Array(items));
    }

    let target = collection.relation(key)?;
    match record.fields.get(key)? {
        Value::String(id) => find(data, target, id).map(|r| scrub(target, r).to_value()),
        Value::Array(ids) => {
            let items: Vec<Value> = ids
                .iter()
                .filter_map(Value::as_str)
                .filter_map(|id| find(data, target, id))
                .map(|r| scrub(target, r).to_value())
                .collect();
            (!items.is_empty()).then_some(Value::Array(items))
        }
        _ => None,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
        (None, None) => Ordering::Equal,
    }
}

fn field_of<'a>(record: &'a Record, field: &str) -> Option<&'a Value> {
    if field == "id" {
        None
    } else {
        record.fields.get(field)
    }
}

//=========================================================================================
// `RecordStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn create(&self, collection: Collection, fields: Value) -> PortResult<Record> {
        let mut fields = into_fields(fields)?;
        hash_password_field(collection, &mut fields)?;
        let mut data = self.collections.lock().await;

        let id = match fields.remove("id") {
            Some(Value::String(id)) if !id.is_empty() => id,
            _ => new_id(),
        };
        if find(&data, collection, &id).is_some() {
            return Err(PortError::Validation(format!(
                "{} record {} already exists",
                collection, id
            )));
        }
        check_relations(&data, collection, &fields)?;

        let now = Value::String(timestamp());
        fields.insert("created".to_string(), now.clone());
        fields.insert("updated".to_string(), now);
        let record = Record {
            id,
            expand: Map::new(),
            fields,
        };
        data.entry(collection).or_default().push(record.clone());
        Ok(scrub(collection, &record))
    }

    async fn update(&self, collection: Collection, id: &str, fields: Value) -> PortResult<Record> {
        let mut fields = into_fields(fields)?;
        fields.remove("id");
        hash_password_field(collection, &mut fields)?;
        let mut data = self.collections.lock().await;
        check_relations(&data, collection, &fields)?;

        let record = data
            .get_mut(&collection)
            .and_then(|records| records.iter_mut().find(|r| r.id == id))
            .ok_or_else(|| PortError::NotFound(format!("{} record {} not found", collection, id)))?;
        record.fields.extend(fields);
        record
            .fields
            .insert("updated".to_string(), Value::String(timestamp()));
        Ok(scrub(collection, record))
    }

    async fn delete(&self, collection: Collection, id: &str) -> PortResult<()> {
        let mut data = self.collections.lock().await;
        let records = data.entry(collection).or_default();
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return Err(PortError::NotFound(format!(
                "{} record {} not found",
                collection, id
            )));
        }
        Ok(())
    }

    async fn get_one(
        &self,
        collection: Collection,
        id: &str,
        expand: &[&str],
    ) -> PortResult<Record> {
        let data = self.collections.lock().await;
        let record = find(&data, collection, id)
            .ok_or_else(|| PortError::NotFound(format!("{} record {} not found", collection, id)))?;
        let expand: Vec<String> = expand.iter().map(|s| s.to_string()).collect();
        Ok(present(&data, collection, record, &expand))
    }

    async fn get_list(&self, collection: Collection, query: &ListQuery) -> PortResult<RecordPage> {
        let data = self.collections.lock().await;
        let mut matching: Vec<&Record> = data
            .get(&collection)
            .into_iter()
            .flatten()
            .filter(|r| query.filter.as_ref().map_or(true, |f| f.matches(&r.fields)))
            .collect();

        for key in query.sort.iter().rev() {
            matching.sort_by(|a, b| {
                let ord = if key.field == "id" {
                    a.id.cmp(&b.id)
                } else {
                    compare_values(field_of(a, &key.field), field_of(b, &key.field))
                };
                if key.descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }

        let total_items = matching.len() as u32;
        let skip = (query.page.max(1) - 1) as usize * query.per_page as usize;
        let items = matching
            .into_iter()
            .skip(skip)
            .take(query.per_page as usize)
            .map(|r| present(&data, collection, r, &query.expand))
            .collect();

        Ok(RecordPage {
            page: query.page,
            per_page: query.per_page,
            total_items,
            items,
        })
    }
}

#[async_trait]
impl AuthService for MemoryRecordStore {
    async fn authenticate(&self, identity: &str, secret: &str) -> PortResult<AuthSession> {
        let record = {
            let data = self.collections.lock().await;
            data.get(&Collection::Users)
                .into_iter()
                .flatten()
                .find(|r| r.str_field("email") == Some(identity))
                .cloned()
                .ok_or(PortError::Unauthorized)?
        };
        let stored = record.str_field("password").unwrap_or_default();
        if !verify_password(secret, stored) {
            return Err(PortError::Unauthorized);
        }

        let user: User = scrub(Collection::Users, &record).decode()?;
        Ok(AuthSession {
            token: format!("memory-{}", Uuid::new_v4().simple()),
            user,
            expires_at: Utc::now() + Duration::days(TOKEN_TTL_DAYS),
        })
    }
}
