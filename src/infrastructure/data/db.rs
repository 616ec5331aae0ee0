// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::common::parsing::{parse_address_hex, parse_wei_amount};
use crate::domain::error::AppError;
use crate::domain::types::SnipeBid;
use alloy::primitives::Address;
use sqlx::{
    Pool, Row, Sqlite,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::str::FromStr;

#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

#[derive(Clone, Debug)]
pub struct WalletRecord {
    pub user_id: String,
    pub address: Address,
    pub private_key: String,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AppError::Initialization(format!("DB Connect failed: {}", e)))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| AppError::Initialization(format!("DB Connect failed: {}", e)))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| AppError::Initialization(format!("DB Migration failed: {}", e)))?;

        Ok(Self { pool })
    }

    pub async fn create_wallet(
        &self,
        user_id: &str,
        address: Address,
        private_key: &str,
    ) -> Result<i64, AppError> {
        let row = sqlx::query(
            r#"
            INSERT INTO wallets (user_id, address, private_key)
            VALUES (?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(format!("{:#x}", address))
        .bind(private_key)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Store(format!("wallet insert failed: {e}")))?;

        Ok(row.get("id"))
    }

    pub async fn wallet_for_user(&self, user_id: &str) -> Result<Option<WalletRecord>, AppError> {
        let row = sqlx::query(
            r#"
            SELECT user_id, address, private_key FROM wallets WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Store(format!("wallet lookup failed: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let address_raw: String = row.get("address");
        let address = parse_address_hex(&address_raw)
            .ok_or_else(|| AppError::InvalidAddress(address_raw.clone()))?;
        Ok(Some(WalletRecord {
            user_id: row.get("user_id"),
            address,
            private_key: row.get("private_key"),
        }))
    }

    pub async fn insert_bid(&self, bid: &SnipeBid) -> Result<i64, AppError> {
        let row = sqlx::query(
            r#"
            INSERT INTO snipe_bids (user_id, token_address, swap_amount_wei, bribe_amount_wei, wallet_address, status)
            VALUES (?, ?, ?, ?, ?, 'pending')
            RETURNING id
            "#,
        )
        .bind(&bid.user_id)
        .bind(format!("{:#x}", bid.token))
        .bind(bid.swap_amount.to_string())
        .bind(bid.bribe_amount.to_string())
        .bind(format!("{:#x}", bid.wallet))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Store(format!("bid insert failed: {e}")))?;

        Ok(row.get("id"))
    }

    /// Pending bids for one token, bribe-descending with insertion order as
    /// the tie-break. Rows with unparsable amounts or a missing wallet are
    /// skipped individually, never fatal to the read.
    pub async fn pending_bids_for_token(
        &self,
        token: Address,
    ) -> Result<Vec<(i64, SnipeBid)>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT b.id, b.user_id, b.token_address, b.swap_amount_wei, b.bribe_amount_wei,
                   b.wallet_address, w.private_key
            FROM snipe_bids b
            JOIN wallets w ON w.user_id = b.user_id
            WHERE b.token_address = ? AND b.status = 'pending'
            ORDER BY CAST(b.bribe_amount_wei AS DECIMAL(38,0)) DESC, b.id ASC
            "#,
        )
        .bind(format!("{:#x}", token))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Store(format!("pending bid read failed: {e}")))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.get("id");
            let user_id: String = row.get("user_id");
            let swap_raw: String = row.get("swap_amount_wei");
            let bribe_raw: String = row.get("bribe_amount_wei");
            let wallet_raw: String = row.get("wallet_address");

            let (Some(swap_amount), Some(bribe_amount), Some(wallet)) = (
                parse_wei_amount(&swap_raw),
                parse_wei_amount(&bribe_raw),
                parse_address_hex(&wallet_raw),
            ) else {
                tracing::warn!(
                    target: "db",
                    bid_id = id,
                    user = %user_id,
                    "Skipping bid row with unparsable amount or wallet"
                );
                continue;
            };

            out.push((
                id,
                SnipeBid {
                    user_id,
                    token,
                    swap_amount,
                    bribe_amount,
                    wallet,
                    credential: row.get("private_key"),
                },
            ));
        }
        Ok(out)
    }

    pub async fn mark_bids(&self, ids: &[i64], status: &str) -> Result<(), AppError> {
        for id in ids {
            sqlx::query("UPDATE snipe_bids SET status = ? WHERE id = ?")
                .bind(status)
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::Store(format!("bid status update failed: {e}")))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::U256;

    async fn memory_db() -> Database {
        Database::new("sqlite::memory:").await.expect("db")
    }

    fn bid(user: &str, token: Address, bribe: u64) -> SnipeBid {
        SnipeBid {
            user_id: user.to_string(),
            token,
            swap_amount: U256::from(1_000u64),
            bribe_amount: U256::from(bribe),
            wallet: Address::from([0x11; 20]),
            credential: String::new(),
        }
    }

    #[tokio::test]
    async fn pending_bids_come_back_bribe_ordered() {
        let db = memory_db().await;
        let token = Address::from([0xaa; 20]);
        db.create_wallet("u1", Address::from([0x11; 20]), "ab")
            .await
            .expect("wallet");
        db.create_wallet("u2", Address::from([0x22; 20]), "cd")
            .await
            .expect("wallet");

        db.insert_bid(&bid("u1", token, 100)).await.expect("bid");
        db.insert_bid(&bid("u2", token, 300)).await.expect("bid");

        let pending = db.pending_bids_for_token(token).await.expect("read");
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].1.user_id, "u2");
        assert_eq!(pending[1].1.user_id, "u1");
    }

    #[tokio::test]
    async fn marked_bids_leave_the_pending_set() {
        let db = memory_db().await;
        let token = Address::from([0xbb; 20]);
        db.create_wallet("u1", Address::from([0x11; 20]), "ab")
            .await
            .expect("wallet");
        let id = db.insert_bid(&bid("u1", token, 10)).await.expect("bid");

        db.mark_bids(&[id], "submitted").await.expect("mark");
        let pending = db.pending_bids_for_token(token).await.expect("read");
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn wallet_roundtrip_preserves_address() {
        let db = memory_db().await;
        let addr = Address::from([0x42; 20]);
        db.create_wallet("u9", addr, "deadbeef").await.expect("wallet");
        let record = db
            .wallet_for_user("u9")
            .await
            .expect("lookup")
            .expect("present");
        assert_eq!(record.address, addr);
        assert_eq!(record.private_key, "deadbeef");
    }
}
