//! # Unit of Work
//!
//! One `ServiceUnitOfWork` per module invocation. It owns a single
//! transaction and hands out per-entity services that all execute on it, so
//! an operation record, its counter decrement and the completion flip land
//! atomically. Commit on clean exit, rollback on error.

use chrono::{NaiveDateTime, Utc};
use sqlx::sqlite::SqlitePool;
use sqlx::{Sqlite, Transaction};
use tracing::debug;

use crate::errors::StoreError;
use crate::storage::entities::{
    redact_key, Account, Bridge, Mint, NewAccount, NewBridge, NewMint, NewStake, NewSwap,
    OperationKind, Stake, Swap,
};

pub struct ServiceUnitOfWork {
    tx: Transaction<'static, Sqlite>,
}

impl ServiceUnitOfWork {
    pub async fn begin(pool: &SqlitePool) -> Result<Self, StoreError> {
        let tx = pool.begin().await?;
        Ok(Self { tx })
    }

    pub async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    /// Explicit rollback; dropping the unit of work rolls back as well.
    pub async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }

    pub fn accounts(&mut self) -> AccountService<'_> {
        AccountService { tx: &mut self.tx }
    }

    pub fn bridges(&mut self) -> BridgeService<'_> {
        BridgeService { tx: &mut self.tx }
    }

    pub fn swaps(&mut self) -> SwapService<'_> {
        SwapService { tx: &mut self.tx }
    }

    pub fn mints(&mut self) -> MintService<'_> {
        MintService { tx: &mut self.tx }
    }

    pub fn stakes(&mut self) -> StakeService<'_> {
        StakeService { tx: &mut self.tx }
    }
}

fn map_account_insert_err(e: sqlx::Error, address: &str, key: &str) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StoreError::AccountExists {
                address: address.to_string(),
                key_redacted: redact_key(key),
            };
        }
    }
    StoreError::Db(e)
}

pub struct AccountService<'a> {
    tx: &'a mut Transaction<'static, Sqlite>,
}

impl AccountService<'_> {
    pub async fn add(&mut self, new: &NewAccount) -> Result<Account, StoreError> {
        sqlx::query_as::<_, Account>(
            r#"INSERT INTO accounts
               (account_name, evm_private_key, evm_address,
                planned_swaps_count, planned_mints_count,
                planned_bridges_count, planned_stakes_count)
               VALUES (?, ?, ?, ?, ?, ?, ?)
               RETURNING *"#,
        )
        .bind(&new.account_name)
        .bind(&new.evm_private_key)
        .bind(&new.evm_address)
        .bind(new.planned_swaps_count)
        .bind(new.planned_mints_count)
        .bind(new.planned_bridges_count)
        .bind(new.planned_stakes_count)
        .fetch_one(&mut **self.tx)
        .await
        .map_err(|e| map_account_insert_err(e, &new.evm_address, &new.evm_private_key))
    }

    pub async fn add_all(&mut self, news: &[NewAccount]) -> Result<Vec<Account>, StoreError> {
        let mut out = Vec::with_capacity(news.len());
        for new in news {
            out.push(self.add(new).await?);
        }
        Ok(out)
    }

    pub async fn get_by_id(&mut self, id: i64) -> Result<Account, StoreError> {
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut **self.tx)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("account id {id}")))
    }

    pub async fn get_one(&mut self) -> Result<Option<Account>, StoreError> {
        Ok(
            sqlx::query_as::<_, Account>("SELECT * FROM accounts ORDER BY id LIMIT 1")
                .fetch_optional(&mut **self.tx)
                .await?,
        )
    }

    pub async fn get_all(&mut self) -> Result<Vec<Account>, StoreError> {
        Ok(sqlx::query_as::<_, Account>("SELECT * FROM accounts ORDER BY id")
            .fetch_all(&mut **self.tx)
            .await?)
    }

    /// Accounts eligible for work right now.
    pub async fn get_all_ready(
        &mut self,
        now: NaiveDateTime,
    ) -> Result<Vec<Account>, StoreError> {
        Ok(sqlx::query_as::<_, Account>(
            r#"SELECT * FROM accounts
               WHERE completed = 0
                 AND (next_action_time IS NULL OR next_action_time <= ?)
               ORDER BY id"#,
        )
        .bind(now)
        .fetch_all(&mut **self.tx)
        .await?)
    }

    pub async fn get_by_evm_private_key(
        &mut self,
        key: &str,
    ) -> Result<Option<Account>, StoreError> {
        Ok(
            sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE evm_private_key = ?")
                .bind(key)
                .fetch_optional(&mut **self.tx)
                .await?,
        )
    }

    pub async fn update(&mut self, account: &Account) -> Result<(), StoreError> {
        sqlx::query(
            r#"UPDATE accounts SET
                 account_name = ?, next_action_time = ?,
                 planned_swaps_count = ?, planned_mints_count = ?,
                 planned_bridges_count = ?, planned_stakes_count = ?,
                 completed = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(&account.account_name)
        .bind(account.next_action_time)
        .bind(account.planned_swaps_count)
        .bind(account.planned_mints_count)
        .bind(account.planned_bridges_count)
        .bind(account.planned_stakes_count)
        .bind(account.completed)
        .bind(Utc::now().naive_utc())
        .bind(account.id)
        .execute(&mut **self.tx)
        .await?;
        Ok(())
    }

    pub async fn set_next_action_time(
        &mut self,
        id: i64,
        when: NaiveDateTime,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE accounts SET next_action_time = ?, updated_at = ? WHERE id = ?")
            .bind(when)
            .bind(Utc::now().naive_utc())
            .bind(id)
            .execute(&mut **self.tx)
            .await?;
        Ok(())
    }

    /// Decrements one planned counter (never below zero) and flips
    /// `completed` when every counter has reached zero. The flip is one-way.
    pub async fn decrement_planned(
        &mut self,
        id: i64,
        kind: OperationKind,
    ) -> Result<Account, StoreError> {
        let column = kind.counter_column();
        // Column name comes from a closed enum, not user input.
        let sql = format!(
            "UPDATE accounts SET {column} = MAX({column} - 1, 0), updated_at = ? WHERE id = ?"
        );
        sqlx::query(&sql)
            .bind(Utc::now().naive_utc())
            .bind(id)
            .execute(&mut **self.tx)
            .await?;

        let account = self.get_by_id(id).await?;
        if !account.completed && account.all_counters_zero() {
            sqlx::query("UPDATE accounts SET completed = 1, updated_at = ? WHERE id = ?")
                .bind(Utc::now().naive_utc())
                .bind(id)
                .execute(&mut **self.tx)
                .await?;
            debug!(target: "storage", account = id, "all planned counters spent");
            return self.get_by_id(id).await;
        }
        Ok(account)
    }

    pub async fn delete(&mut self, id: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(id)
            .execute(&mut **self.tx)
            .await?;
        Ok(())
    }

    pub async fn delete_all(&mut self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM accounts")
            .execute(&mut **self.tx)
            .await?;
        Ok(())
    }
}

pub struct BridgeService<'a> {
    tx: &'a mut Transaction<'static, Sqlite>,
}

impl BridgeService<'_> {
    pub async fn add(&mut self, new: &NewBridge) -> Result<Bridge, StoreError> {
        Ok(sqlx::query_as::<_, Bridge>(
            r#"INSERT INTO bridges
               (account_id, from_network, to_network, src_amount, src_token,
                dst_amount, dst_token, volume_usd, fee, fee_in_usd, platform, tx_hash)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               RETURNING *"#,
        )
        .bind(new.account_id)
        .bind(&new.from_network)
        .bind(&new.to_network)
        .bind(&new.src_amount)
        .bind(&new.src_token)
        .bind(&new.dst_amount)
        .bind(&new.dst_token)
        .bind(new.volume_usd)
        .bind(&new.fee)
        .bind(new.fee_in_usd)
        .bind(&new.platform)
        .bind(&new.tx_hash)
        .fetch_one(&mut **self.tx)
        .await?)
    }

    pub async fn get_all_by_account_id(
        &mut self,
        account_id: i64,
    ) -> Result<Vec<Bridge>, StoreError> {
        Ok(
            sqlx::query_as::<_, Bridge>("SELECT * FROM bridges WHERE account_id = ? ORDER BY id")
                .bind(account_id)
                .fetch_all(&mut **self.tx)
                .await?,
        )
    }

    pub async fn count(&mut self, account_id: i64) -> Result<i64, StoreError> {
        Ok(
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM bridges WHERE account_id = ?")
                .bind(account_id)
                .fetch_one(&mut **self.tx)
                .await?,
        )
    }

    pub async fn count_volume(&mut self, account_id: i64) -> Result<f64, StoreError> {
        Ok(sqlx::query_scalar::<_, f64>(
            "SELECT COALESCE(SUM(volume_usd), 0.0) FROM bridges WHERE account_id = ?",
        )
        .bind(account_id)
        .fetch_one(&mut **self.tx)
        .await?)
    }

    pub async fn delete_all(&mut self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM bridges")
            .execute(&mut **self.tx)
            .await?;
        Ok(())
    }
}

pub struct SwapService<'a> {
    tx: &'a mut Transaction<'static, Sqlite>,
}

impl SwapService<'_> {
    pub async fn add(&mut self, new: &NewSwap) -> Result<Swap, StoreError> {
        Ok(sqlx::query_as::<_, Swap>(
            r#"INSERT INTO swaps
               (account_id, network, src_amount, src_token, dst_amount, dst_token,
                volume_usd, fee, fee_in_usd, platform, tx_hash)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               RETURNING *"#,
        )
        .bind(new.account_id)
        .bind(&new.network)
        .bind(&new.src_amount)
        .bind(&new.src_token)
        .bind(&new.dst_amount)
        .bind(&new.dst_token)
        .bind(new.volume_usd)
        .bind(&new.fee)
        .bind(new.fee_in_usd)
        .bind(&new.platform)
        .bind(&new.tx_hash)
        .fetch_one(&mut **self.tx)
        .await?)
    }

    pub async fn get_all_by_account_id(
        &mut self,
        account_id: i64,
    ) -> Result<Vec<Swap>, StoreError> {
        Ok(
            sqlx::query_as::<_, Swap>("SELECT * FROM swaps WHERE account_id = ? ORDER BY id")
                .bind(account_id)
                .fetch_all(&mut **self.tx)
                .await?,
        )
    }

    pub async fn delete_all(&mut self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM swaps")
            .execute(&mut **self.tx)
            .await?;
        Ok(())
    }
}

pub struct MintService<'a> {
    tx: &'a mut Transaction<'static, Sqlite>,
}

impl MintService<'_> {
    pub async fn add(&mut self, new: &NewMint) -> Result<Mint, StoreError> {
        Ok(sqlx::query_as::<_, Mint>(
            r#"INSERT INTO mints
               (account_id, nft, quantity, mint_price, mint_price_usd, platform, tx_hash)
               VALUES (?, ?, ?, ?, ?, ?, ?)
               RETURNING *"#,
        )
        .bind(new.account_id)
        .bind(&new.nft)
        .bind(new.quantity)
        .bind(&new.mint_price)
        .bind(new.mint_price_usd)
        .bind(&new.platform)
        .bind(&new.tx_hash)
        .fetch_one(&mut **self.tx)
        .await?)
    }

    pub async fn get_all_by_account_id(
        &mut self,
        account_id: i64,
    ) -> Result<Vec<Mint>, StoreError> {
        Ok(
            sqlx::query_as::<_, Mint>("SELECT * FROM mints WHERE account_id = ? ORDER BY id")
                .bind(account_id)
                .fetch_all(&mut **self.tx)
                .await?,
        )
    }
}

pub struct StakeService<'a> {
    tx: &'a mut Transaction<'static, Sqlite>,
}

impl StakeService<'_> {
    pub async fn add(&mut self, new: &NewStake) -> Result<Stake, StoreError> {
        Ok(sqlx::query_as::<_, Stake>(
            r#"INSERT INTO stakes
               (account_id, token, amount, unfreeze_date, platform, tx_hash)
               VALUES (?, ?, ?, ?, ?, ?)
               RETURNING *"#,
        )
        .bind(new.account_id)
        .bind(&new.token)
        .bind(&new.amount)
        .bind(new.unfreeze_date)
        .bind(&new.platform)
        .bind(&new.tx_hash)
        .fetch_one(&mut **self.tx)
        .await?)
    }

    pub async fn get_all_by_account_id(
        &mut self,
        account_id: i64,
    ) -> Result<Vec<Stake>, StoreError> {
        Ok(
            sqlx::query_as::<_, Stake>("SELECT * FROM stakes WHERE account_id = ? ORDER BY id")
                .bind(account_id)
                .fetch_all(&mut **self.tx)
                .await?,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::db::memory_pool;

    fn sample_account(n: u8) -> NewAccount {
        let key = format!("0x{:064x}", n as u64 + 1);
        let addr = format!("0x{:040x}", n as u64 + 1);
        NewAccount::new(&key, &addr)
            .unwrap()
            .with_planned(2, 0, 1, 0)
    }

    #[tokio::test]
    async fn duplicate_account_maps_to_domain_error() {
        let pool = memory_pool().await;
        let mut uow = ServiceUnitOfWork::begin(&pool).await.unwrap();
        let new = sample_account(1);
        uow.accounts().add(&new).await.unwrap();
        let err = uow.accounts().add(&new).await.unwrap_err();
        match err {
            StoreError::AccountExists { address, key_redacted } => {
                assert_eq!(address, new.evm_address);
                assert!(!key_redacted.contains(&new.evm_private_key[10..30]));
            }
            other => panic!("expected AccountExists, got {other}"),
        }
    }

    #[tokio::test]
    async fn decrement_flips_completed_exactly_once() {
        let pool = memory_pool().await;
        let mut uow = ServiceUnitOfWork::begin(&pool).await.unwrap();
        let account = uow.accounts().add(&sample_account(2)).await.unwrap();

        let a = uow
            .accounts()
            .decrement_planned(account.id, OperationKind::Swap)
            .await
            .unwrap();
        assert_eq!(a.planned_swaps_count, 1);
        assert!(!a.completed);

        let a = uow
            .accounts()
            .decrement_planned(account.id, OperationKind::Swap)
            .await
            .unwrap();
        assert!(!a.completed, "bridge counter still pending");

        let a = uow
            .accounts()
            .decrement_planned(account.id, OperationKind::Bridge)
            .await
            .unwrap();
        assert!(a.completed);
        assert!(a.all_counters_zero());

        // Never below zero, never un-completed.
        let a = uow
            .accounts()
            .decrement_planned(account.id, OperationKind::Swap)
            .await
            .unwrap();
        assert_eq!(a.planned_swaps_count, 0);
        assert!(a.completed);
        uow.commit().await.unwrap();
    }

    #[tokio::test]
    async fn rollback_discards_the_insert() {
        let pool = memory_pool().await;
        let new = sample_account(3);
        {
            let mut uow = ServiceUnitOfWork::begin(&pool).await.unwrap();
            uow.accounts().add(&new).await.unwrap();
            uow.rollback().await.unwrap();
        }
        let mut uow = ServiceUnitOfWork::begin(&pool).await.unwrap();
        assert!(uow
            .accounts()
            .get_by_evm_private_key(&new.evm_private_key)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn account_delete_cascades_into_operations() {
        let pool = memory_pool().await;
        let mut uow = ServiceUnitOfWork::begin(&pool).await.unwrap();
        let account = uow.accounts().add(&sample_account(4)).await.unwrap();
        uow.bridges()
            .add(&NewBridge {
                account_id: account.id,
                from_network: "Polygon".into(),
                to_network: "Arbitrum".into(),
                src_amount: "5.0".into(),
                src_token: "USDC".into(),
                dst_amount: "4.975".into(),
                dst_token: "USDC".into(),
                volume_usd: 5.0,
                fee: "0.0021".into(),
                fee_in_usd: 0.8,
                platform: "Stargate".into(),
                tx_hash: "0xabc".into(),
            })
            .await
            .unwrap();
        assert_eq!(uow.bridges().count(account.id).await.unwrap(), 1);
        assert!(uow.bridges().count_volume(account.id).await.unwrap() > 4.9);

        uow.accounts().delete(account.id).await.unwrap();
        assert_eq!(uow.bridges().count(account.id).await.unwrap(), 0);
        uow.commit().await.unwrap();
    }
}
