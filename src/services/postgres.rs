//! Postgres persistence of card links.
//!
//! Attaching a card is one transaction: update the working table
//! `insurance_fresh`, then append to the history table `insurance`. Either
//! both rows are written or neither is.

use crate::config::{DatabaseSettings, DbCredentials};
use crate::error::ScanError;
use crate::output::InsuranceType;
use crate::services::RecordSink;
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use tracing::{debug, info, warn};

/// `channel` value of interaction records written by this crate.
pub const INTERACTION_CHANNEL: &str = "insurance_card_upload";

/// [`RecordSink`] over a Postgres pool.
#[derive(Clone)]
pub struct PgRecordSink {
    pool: PgPool,
    interaction_from_id: i64,
}

fn update_sql(insurance_type: InsuranceType) -> String {
    format!(
        "UPDATE insurance_fresh SET {} = $1 WHERE insurance_id = $2",
        insurance_type.card_column()
    )
}

fn insert_sql(insurance_type: InsuranceType) -> String {
    format!(
        "INSERT INTO insurance (insurance_id, {}) VALUES ($1, $2)",
        insurance_type.card_column()
    )
}

const INTERACTION_SQL: &str = "INSERT INTO interaction \
     (channel, timestamp, length, from_id, to_id, attachment, raw_content) \
     VALUES ($1, $2, 0, $3, NULL, $4, $5)";

fn connect_options(creds: &DbCredentials) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&creds.host)
        .port(creds.port)
        .username(&creds.user)
        .password(&creds.password)
        .database(&creds.database)
}

impl PgRecordSink {
    pub fn new(pool: PgPool, interaction_from_id: i64) -> Self {
        Self {
            pool,
            interaction_from_id,
        }
    }

    /// Build a pool that connects on first use.
    pub fn connect_lazy(
        settings: &DatabaseSettings,
        interaction_from_id: i64,
    ) -> Result<Self, ScanError> {
        let options = PgPoolOptions::new().max_connections(5);
        let pool = match settings {
            DatabaseSettings::Url(url) => options.connect_lazy(url)?,
            DatabaseSettings::Credentials(creds) => options.connect_lazy_with(connect_options(creds)),
        };
        Ok(Self::new(pool, interaction_from_id))
    }

    async fn write_card(
        tx: &mut Transaction<'_, Postgres>,
        insurance_id: i64,
        insurance_type: InsuranceType,
        url: &str,
    ) -> Result<(), sqlx::Error> {
        let updated = sqlx::query(&update_sql(insurance_type))
            .bind(url)
            .bind(insurance_id)
            .execute(&mut **tx)
            .await?;
        debug!("insurance_fresh: {} row(s) updated", updated.rows_affected());

        sqlx::query(&insert_sql(insurance_type))
            .bind(insurance_id)
            .bind(url)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl RecordSink for PgRecordSink {
    async fn attach_card(
        &self,
        insurance_id: i64,
        insurance_type: InsuranceType,
        url: &str,
    ) -> Result<(), ScanError> {
        let mut tx = self.pool.begin().await?;
        if let Err(e) = Self::write_card(&mut tx, insurance_id, insurance_type, url).await {
            warn!("Rolling back card update for insurance {}: {}", insurance_id, e);
            if let Err(rb) = tx.rollback().await {
                warn!("Rollback failed: {}", rb);
            }
            return Err(e.into());
        }
        tx.commit().await?;
        info!(
            "Attached {} card to insurance {}",
            insurance_type, insurance_id
        );
        Ok(())
    }

    async fn record_interaction(
        &self,
        url: &str,
        insurance_type: InsuranceType,
    ) -> Result<(), ScanError> {
        sqlx::query(INTERACTION_SQL)
            .bind(INTERACTION_CHANNEL)
            .bind(chrono::Utc::now().naive_utc())
            .bind(self.interaction_from_id)
            .bind(url)
            .bind(insurance_type.as_str())
            .execute(&self.pool)
            .await?;
        debug!("Recorded interaction for {}", url);
        Ok(())
    }
}
