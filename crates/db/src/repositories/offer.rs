use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use tafel_core::domain::history::{HistoryEntryId, OfferHistoryEntry};
use tafel_core::domain::inquiry::{Inquiry, InquiryId, InquiryStatus, OfferFields};
use tafel_core::domain::menu::MenuSelection;
use tafel_core::domain::option::{OfferOption, OptionId, OptionLabel, PaymentLink};
use tafel_core::domain::package::PackageId;
use tafel_core::store::{OfferStore, StoreError};

use super::RepositoryError;
use crate::DbPool;

pub struct SqlOfferStore {
    pool: DbPool,
}

impl SqlOfferStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OfferStore for SqlOfferStore {
    async fn load_inquiry(&self, id: &InquiryId) -> Result<Option<Inquiry>, StoreError> {
        let row = sqlx::query(
            "SELECT id, customer_name, customer_email, event_date, guest_count,
                    preselected_packages, status, offer_sent_at, offer_sent_by,
                    current_offer_version, email_draft
             FROM inquiry WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        row.map(|row| decode_inquiry(&row)).transpose().map_err(Into::into)
    }

    async fn list_by_inquiry(&self, id: &InquiryId) -> Result<Vec<OfferOption>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, package_id, package_name, label, is_active, guest_count,
                    menu_selection, total_amount, payment_link_id, payment_link_url,
                    offer_version, sort_order
             FROM offer_option WHERE inquiry_id = ? ORDER BY sort_order",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        rows.iter().map(decode_option).collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    async fn delete_by_inquiry(&self, id: &InquiryId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM offer_option WHERE inquiry_id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        Ok(())
    }

    async fn insert_option(
        &self,
        inquiry_id: &InquiryId,
        option: &OfferOption,
    ) -> Result<(), StoreError> {
        let menu_json = serde_json::to_string(&option.menu)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        sqlx::query(
            "INSERT INTO offer_option (id, inquiry_id, package_id, package_name, label,
                                       is_active, guest_count, menu_selection, total_amount,
                                       payment_link_id, payment_link_url, offer_version, sort_order)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&option.id.0)
        .bind(&inquiry_id.0)
        .bind(option.package_id.as_ref().map(|package| package.0.as_str()))
        .bind(&option.package_name)
        .bind(option.label.as_str())
        .bind(option.is_active)
        .bind(i64::from(option.guest_count))
        .bind(menu_json)
        .bind(option.total_amount.to_string())
        .bind(option.payment_link.as_ref().map(|link| link.id.as_str()))
        .bind(option.payment_link.as_ref().map(|link| link.url.as_str()))
        .bind(i64::from(option.offer_version))
        .bind(i64::from(option.sort_order))
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;
        Ok(())
    }

    async fn list_history(&self, id: &InquiryId) -> Result<Vec<OfferHistoryEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, version, sent_at, sent_by, email_content, pdf_url, options_snapshot
             FROM offer_history WHERE inquiry_id = ? ORDER BY version DESC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        rows.iter().map(decode_history).collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    async fn insert_history(
        &self,
        inquiry_id: &InquiryId,
        entry: &OfferHistoryEntry,
    ) -> Result<(), StoreError> {
        let snapshot_json = serde_json::to_string(&entry.options_snapshot)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        sqlx::query(
            "INSERT INTO offer_history (id, inquiry_id, version, sent_at, sent_by,
                                        email_content, pdf_url, options_snapshot)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id.0)
        .bind(&inquiry_id.0)
        .bind(i64::from(entry.version))
        .bind(entry.sent_at)
        .bind(entry.sent_by.as_deref())
        .bind(entry.email_content.as_deref())
        .bind(entry.pdf_url.as_deref())
        .bind(snapshot_json)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;
        Ok(())
    }

    async fn update_offer_fields(
        &self,
        id: &InquiryId,
        fields: &OfferFields,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE inquiry
             SET offer_sent_at = ?, offer_sent_by = ?, current_offer_version = ?, email_draft = ?
             WHERE id = ?",
        )
        .bind(fields.offer_sent_at)
        .bind(fields.offer_sent_by.as_deref())
        .bind(i64::from(fields.current_offer_version))
        .bind(fields.email_draft.as_deref())
        .bind(&id.0)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("inquiry `{}`", id.0)));
        }
        Ok(())
    }

    async fn update_status(&self, id: &InquiryId, status: InquiryStatus) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE inquiry SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("inquiry `{}`", id.0)));
        }
        Ok(())
    }

    async fn stamp_last_edited(
        &self,
        id: &InquiryId,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE inquiry SET last_edited_by = ?, last_edited_at = ? WHERE id = ?")
            .bind(actor)
            .bind(at)
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("inquiry `{}`", id.0)));
        }
        Ok(())
    }
}

fn decode_inquiry(row: &SqliteRow) -> Result<Inquiry, RepositoryError> {
    let preselected_raw: String = row.get("preselected_packages");
    let preselected: Vec<String> = serde_json::from_str(&preselected_raw)
        .map_err(|error| RepositoryError::Decode(format!("preselected_packages: {error}")))?;

    let status_raw: String = row.get("status");
    let status = InquiryStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown inquiry status `{status_raw}`")))?;

    Ok(Inquiry {
        id: InquiryId(row.get("id")),
        customer_name: row.get("customer_name"),
        customer_email: row.get("customer_email"),
        event_date: row.get::<Option<NaiveDate>, _>("event_date"),
        guest_count: decode_u32(row, "guest_count")?,
        preselected_packages: preselected.into_iter().map(PackageId).collect(),
        status,
        offer_sent_at: row.get("offer_sent_at"),
        offer_sent_by: row.get("offer_sent_by"),
        current_offer_version: decode_u32(row, "current_offer_version")?,
        email_draft: row.get("email_draft"),
    })
}

fn decode_option(row: &SqliteRow) -> Result<OfferOption, RepositoryError> {
    let label_raw: String = row.get("label");
    let label = OptionLabel::parse(&label_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown option label `{label_raw}`")))?;

    let menu_raw: String = row.get("menu_selection");
    let menu: MenuSelection = serde_json::from_str(&menu_raw)
        .map_err(|error| RepositoryError::Decode(format!("menu_selection: {error}")))?;

    let total_raw: String = row.get("total_amount");
    let total_amount = Decimal::from_str(&total_raw)
        .map_err(|error| RepositoryError::Decode(format!("total_amount: {error}")))?;

    let payment_link = match (
        row.get::<Option<String>, _>("payment_link_id"),
        row.get::<Option<String>, _>("payment_link_url"),
    ) {
        (Some(id), Some(url)) => Some(PaymentLink { id, url }),
        _ => None,
    };

    Ok(OfferOption {
        id: OptionId(row.get("id")),
        package_id: row.get::<Option<String>, _>("package_id").map(PackageId),
        package_name: row.get("package_name"),
        label,
        is_active: row.get("is_active"),
        guest_count: decode_u32(row, "guest_count")?,
        menu,
        total_amount,
        payment_link,
        offer_version: decode_u32(row, "offer_version")?,
        sort_order: decode_u32(row, "sort_order")?,
    })
}

fn decode_history(row: &SqliteRow) -> Result<OfferHistoryEntry, RepositoryError> {
    let snapshot_raw: String = row.get("options_snapshot");
    let options_snapshot: Vec<OfferOption> = serde_json::from_str(&snapshot_raw)
        .map_err(|error| RepositoryError::Decode(format!("options_snapshot: {error}")))?;

    Ok(OfferHistoryEntry {
        id: HistoryEntryId(row.get("id")),
        version: decode_u32(row, "version")?,
        sent_at: row.get("sent_at"),
        sent_by: row.get("sent_by"),
        email_content: row.get("email_content"),
        pdf_url: row.get("pdf_url"),
        options_snapshot,
    })
}

fn decode_u32(row: &SqliteRow, column: &str) -> Result<u32, RepositoryError> {
    let value: i64 = row.get(column);
    u32::try_from(value)
        .map_err(|_| RepositoryError::Decode(format!("column `{column}` out of range: {value}")))
}
