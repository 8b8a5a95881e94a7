use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::db::{DbPool, StoreError, StoreResult, new_record_id};

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Serialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ContactStage {
    #[default]
    New,
    Contacted,
    Qualified,
    Proposal,
    Closed,
}

#[derive(Clone, Debug, Deserialize, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub source: Option<String>,
    pub stage: ContactStage,
    pub value: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewContact {
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub stage: ContactStage,
    #[serde(default)]
    pub value: i64,
}

/// Partial update; absent fields keep their stored value.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactChanges {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub source: Option<String>,
    pub stage: Option<ContactStage>,
    pub value: Option<i64>,
}

impl Contact {
    #[must_use]
    pub fn create(tenant_id: &str, new_contact: NewContact, now: DateTime<Utc>) -> Self {
        Self {
            id: new_record_id(),
            tenant_id: tenant_id.to_string(),
            name: new_contact.name,
            phone: new_contact.phone,
            email: new_contact.email,
            company: new_contact.company,
            source: new_contact.source,
            stage: new_contact.stage,
            value: new_contact.value,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, changes: ContactChanges, now: DateTime<Utc>) {
        if let Some(name) = changes.name {
            self.name = name;
        }
        if let Some(phone) = changes.phone {
            self.phone = Some(phone);
        }
        if let Some(email) = changes.email {
            self.email = Some(email);
        }
        if let Some(company) = changes.company {
            self.company = Some(company);
        }
        if let Some(source) = changes.source {
            self.source = Some(source);
        }
        if let Some(stage) = changes.stage {
            self.stage = stage;
        }
        if let Some(value) = changes.value {
            self.value = value;
        }
        self.updated_at = now;
    }
}

const CONTACT_COLUMNS: &str = "id, tenant_id, name, phone, email, company, source, stage, value, created_at, updated_at";

pub async fn insert_contact(db: &DbPool, contact: &Contact) -> StoreResult<()> {
    sqlx::query(
        r"
        INSERT INTO contacts (id, tenant_id, name, phone, email, company, source, stage, value, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ",
    )
    .bind(&contact.id)
    .bind(&contact.tenant_id)
    .bind(&contact.name)
    .bind(&contact.phone)
    .bind(&contact.email)
    .bind(&contact.company)
    .bind(&contact.source)
    .bind(contact.stage)
    .bind(contact.value)
    .bind(contact.created_at)
    .bind(contact.updated_at)
    .execute(db)
    .await
    .map_err(|e| StoreError::from(e).entity("Contact"))?;
    Ok(())
}

/// Inserts the contact unless the tenant already has one with the same phone.
/// A single statement, so concurrent deliveries cannot both succeed.
pub async fn insert_contact_unless_phone_exists(db: &DbPool, contact: &Contact) -> StoreResult<()> {
    let result = sqlx::query(
        r"
        INSERT INTO contacts (id, tenant_id, name, phone, email, company, source, stage, value, created_at, updated_at)
        SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
        WHERE NOT EXISTS (SELECT 1 FROM contacts WHERE tenant_id = ? AND phone = ?)
        ",
    )
    .bind(&contact.id)
    .bind(&contact.tenant_id)
    .bind(&contact.name)
    .bind(&contact.phone)
    .bind(&contact.email)
    .bind(&contact.company)
    .bind(&contact.source)
    .bind(contact.stage)
    .bind(contact.value)
    .bind(contact.created_at)
    .bind(contact.updated_at)
    .bind(&contact.tenant_id)
    .bind(&contact.phone)
    .execute(db)
    .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::Conflict("Contact"));
    }
    Ok(())
}

pub async fn select_contacts(db: &DbPool, tenant_id: &str) -> StoreResult<Vec<Contact>> {
    let sql = format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE tenant_id = ? ORDER BY created_at, rowid");
    let contacts = sqlx::query_as::<_, Contact>(&sql)
        .bind(tenant_id)
        .fetch_all(db)
        .await?;
    Ok(contacts)
}

pub async fn select_contact(db: &DbPool, tenant_id: &str, id: &str) -> StoreResult<Contact> {
    let sql = format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE tenant_id = ? AND id = ?");
    sqlx::query_as::<_, Contact>(&sql)
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or(StoreError::NotFound("Contact"))
}

pub async fn select_contact_by_phone(db: &DbPool, tenant_id: &str, phone: &str) -> StoreResult<Option<Contact>> {
    let sql = format!(
        "SELECT {CONTACT_COLUMNS} FROM contacts WHERE tenant_id = ? AND phone = ? ORDER BY created_at, rowid LIMIT 1"
    );
    let contact = sqlx::query_as::<_, Contact>(&sql)
        .bind(tenant_id)
        .bind(phone)
        .fetch_optional(db)
        .await?;
    Ok(contact)
}

pub async fn update_contact_row(db: &DbPool, contact: &Contact) -> StoreResult<()> {
    let result = sqlx::query(
        r"
        UPDATE contacts
        SET name = ?, phone = ?, email = ?, company = ?, source = ?, stage = ?, value = ?, updated_at = ?
        WHERE tenant_id = ? AND id = ?
        ",
    )
    .bind(&contact.name)
    .bind(&contact.phone)
    .bind(&contact.email)
    .bind(&contact.company)
    .bind(&contact.source)
    .bind(contact.stage)
    .bind(contact.value)
    .bind(contact.updated_at)
    .bind(&contact.tenant_id)
    .bind(&contact.id)
    .execute(db)
    .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound("Contact"));
    }
    Ok(())
}

pub async fn delete_contact_row(db: &DbPool, tenant_id: &str, id: &str) -> StoreResult<()> {
    let result = sqlx::query("DELETE FROM contacts WHERE tenant_id = ? AND id = ?")
        .bind(tenant_id)
        .bind(id)
        .execute(db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound("Contact"));
    }
    Ok(())
}
