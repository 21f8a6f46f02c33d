use futures_util::TryStreamExt;
use mongodb::{
    Database,
    bson::{DateTime, Document, doc, oid::ObjectId},
    error::{ErrorKind, WriteFailure},
    options::ReturnDocument,
};

use super::models::{Analysis, User, UserProfilePatch};
use crate::error::ApiError;

const USERS: &str = "users";
const ANALYSES: &str = "analyses";

/// Projection that strips the credential before a record leaves the store.
fn redacted() -> Document {
    doc! { "passwordHash": 0 }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        *err.kind,
        ErrorKind::Write(WriteFailure::WriteError(ref write)) if write.code == 11000
    )
}

/// Persist a new user. The unique email index is the source of truth for
/// uniqueness: a duplicate-key write error surfaces as a conflict, which
/// is how two concurrent registrations for the same address settle.
pub async fn create_user(db: &Database, user: &User) -> Result<ObjectId, ApiError> {
    let collection = db.collection::<User>(USERS);
    let result = collection.insert_one(user).await.map_err(|err| {
        if is_duplicate_key(&err) {
            ApiError::conflict("User already exists")
        } else {
            err.into()
        }
    })?;
    result
        .inserted_id
        .as_object_id()
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("inserted user id is not an ObjectId")))
}

/// Full record, credential included; the login path needs the hash.
pub async fn find_user_by_email(db: &Database, email: &str) -> Result<Option<User>, ApiError> {
    let user = db
        .collection::<User>(USERS)
        .find_one(doc! { "email": email })
        .await?;
    Ok(user)
}

/// Redacted record for profile reads.
pub async fn find_user_by_id(db: &Database, id: ObjectId) -> Result<Option<User>, ApiError> {
    let user = db
        .collection::<User>(USERS)
        .find_one(doc! { "_id": id })
        .projection(redacted())
        .await?;
    Ok(user)
}

/// `$set` document for a partial profile update. Only supplied fields are
/// written; `updatedAt` always is.
fn profile_set_document(patch: &UserProfilePatch) -> Document {
    let mut set = doc! { "updatedAt": DateTime::now() };
    if let Some(v) = &patch.full_name {
        set.insert("fullName", v.as_str());
    }
    if let Some(v) = &patch.doctor_id {
        set.insert("doctorId", v.as_str());
    }
    if let Some(v) = &patch.hospital_name {
        set.insert("hospitalName", v.as_str());
    }
    if let Some(v) = &patch.area {
        set.insert("area", v.as_str());
    }
    if let Some(v) = &patch.profile_picture {
        set.insert("profilePicture", v.as_str());
    }
    set
}

/// Apply a partial profile update and return the updated, redacted record.
/// `None` means the id does not resolve.
pub async fn update_user_profile(
    db: &Database,
    id: ObjectId,
    patch: &UserProfilePatch,
) -> Result<Option<User>, ApiError> {
    let updated = db
        .collection::<User>(USERS)
        .find_one_and_update(doc! { "_id": id }, doc! { "$set": profile_set_document(patch) })
        .return_document(ReturnDocument::After)
        .projection(redacted())
        .await?;
    Ok(updated)
}

/// Insert one completed analysis. The diagnosis gate lives in the handler;
/// by the time a record reaches this point it is ready to persist as-is.
pub async fn insert_analysis(db: &Database, analysis: &Analysis) -> Result<ObjectId, ApiError> {
    let result = db
        .collection::<Analysis>(ANALYSES)
        .insert_one(analysis)
        .await?;
    result.inserted_id.as_object_id().ok_or_else(|| {
        ApiError::Internal(anyhow::anyhow!("inserted analysis id is not an ObjectId"))
    })
}

/// Filter restricting a query to its owning user. Every analysis query
/// goes through this; it is what keeps one owner's records invisible to
/// another.
fn owner_filter(owner: ObjectId) -> Document {
    doc! { "userId": owner }
}

/// Newest first, with `_id` as the secondary key so the order stays total
/// when two inserts land in the same millisecond.
fn history_sort() -> Document {
    doc! { "createdAt": -1, "_id": -1 }
}

/// Documents to skip for a 1-based page. Saturates so an absurd page
/// number yields a valid (empty) query instead of overflowing.
fn skip_for(page: i64, limit: i64) -> u64 {
    (page - 1).saturating_mul(limit) as u64
}

/// One page of an owner's history, newest first, with the owner's total.
pub async fn find_analyses_page(
    db: &Database,
    owner: ObjectId,
    page: i64,
    limit: i64,
) -> Result<(Vec<Analysis>, u64), ApiError> {
    let collection = db.collection::<Analysis>(ANALYSES);
    let filter = owner_filter(owner);

    let analyses = collection
        .find(filter.clone())
        .sort(history_sort())
        .skip(skip_for(page, limit))
        .limit(limit)
        .await?
        .try_collect()
        .await?;

    let total = collection.count_documents(filter).await?;
    Ok((analyses, total))
}

pub async fn count_analyses(db: &Database, owner: ObjectId) -> Result<u64, ApiError> {
    let count = db
        .collection::<Analysis>(ANALYSES)
        .count_documents(owner_filter(owner))
        .await?;
    Ok(count)
}

/// Records created at or after `since`. Callers compute the rolling
/// window boundary at query time; nothing is stored.
pub async fn count_analyses_since(
    db: &Database,
    owner: ObjectId,
    since: DateTime,
) -> Result<u64, ApiError> {
    let mut filter = owner_filter(owner);
    filter.insert("createdAt", doc! { "$gte": since });

    let count = db
        .collection::<Analysis>(ANALYSES)
        .count_documents(filter)
        .await?;
    Ok(count)
}

/// Case-insensitive alternation over a fixed keyword list, matched as
/// substrings of the diagnosis text.
pub fn keyword_pattern(keywords: &[&str]) -> String {
    keywords.join("|")
}

pub async fn count_analyses_matching_diagnosis(
    db: &Database,
    owner: ObjectId,
    keywords: &[&str],
) -> Result<u64, ApiError> {
    let mut filter = owner_filter(owner);
    filter.insert(
        "results.diagnosis",
        doc! { "$regex": keyword_pattern(keywords), "$options": "i" },
    );

    let count = db
        .collection::<Analysis>(ANALYSES)
        .count_documents(filter)
        .await?;
    Ok(count)
}
