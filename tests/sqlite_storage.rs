//! Wallet persistence through the SQLite backend

#[cfg(feature = "storage")]
mod common;

#[cfg(feature = "storage")]
mod sqlite_tests {
    use std::sync::Arc;

    use anon_wallet_libs::{
        storage::{SqliteStorage, WalletStorage},
        wallet::{EncryptionStatus, ScanFrom, UnspentFilter},
        OutputKind, PaymentRecipient, TransferRequest, WalletError,
    };
    use tempfile::TempDir;

    use crate::common::*;

    async fn open_file(dir: &TempDir) -> Arc<dyn WalletStorage> {
        Arc::new(
            SqliteStorage::new(dir.path().join("wallet.db"))
                .await
                .expect("database should open"),
        )
    }

    #[tokio::test]
    async fn test_wallet_state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let harness = Harness::new();
        let other = harness.wallet(MNEMONIC_B).await;

        let wallet = harness
            .wallet_with_storage(MNEMONIC_A, open_file(&dir).await, ScanFrom::Tip)
            .await;
        let mining = wallet.new_stealth_address(Some("mining")).await.unwrap();
        harness.mine_to(&mining, 10 * COIN, &[&wallet]).await;
        harness.mine_to(&mining, 5 * COIN, &[&wallet]).await;
        let sent = wallet
            .send(
                TransferRequest::new(OutputKind::Plain, OutputKind::Confidential)
                    .with_recipient(PaymentRecipient::new(change_address(&other).await, COIN))
                    .with_comment("rent"),
            )
            .await
            .unwrap();
        harness.mine(&[&wallet]).await;

        let unspent = wallet.list_unspent(UnspentFilter::new()).await.unwrap();
        let locked = unspent[0].outref;
        wallet.lock_output(locked, true).await.unwrap();
        wallet.encrypt_wallet("pw").await.unwrap();
        let expected = wallet.get_wallet_info().await.unwrap();
        let account_id = wallet.account_id().await;
        drop(wallet);

        let wallet = harness.reopen(open_file(&dir).await).await;
        assert_eq!(wallet.account_id().await, account_id);

        let info = wallet.get_wallet_info().await.unwrap();
        assert_eq!(info.encryption_status, EncryptionStatus::Locked);
        assert_eq!(info.plain_balance, expected.plain_balance);
        assert_eq!(info.locked_balance, expected.locked_balance);
        assert_eq!(info.scanned_height, Some(3));

        let addresses = wallet.list_addresses().await;
        assert_eq!(addresses.len(), 2);
        assert_eq!(addresses[1].label.as_deref(), Some("mining"));

        let locks = wallet.list_locked().await;
        assert_eq!(locks.len(), 1);
        assert_eq!(locks[0].outref, locked);

        let history = wallet.list_transactions(None).await.unwrap();
        let record = history.iter().find(|r| r.txid == sent.txid).unwrap();
        assert_eq!(record.comment.as_deref(), Some("rent"));
        assert_eq!(record.height, Some(3));

        wallet.unlock_wallet("pw", Some(0)).await.unwrap();
        wallet.new_stealth_address(None).await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_status_code_is_reported() {
        let dir = TempDir::new().unwrap();
        let harness = Harness::new();
        let wallet = harness
            .wallet_with_storage(MNEMONIC_A, open_file(&dir).await, ScanFrom::Tip)
            .await;
        harness
            .mine_to(&change_address(&wallet).await, COIN, &[&wallet])
            .await;
        drop(wallet);

        let conn = rusqlite::Connection::open(dir.path().join("wallet.db")).unwrap();
        conn.execute("UPDATE outputs SET status = 9", []).unwrap();
        drop(conn);

        let storage = open_file(&dir).await;
        let err = storage.get_outputs(None).await.unwrap_err();
        assert!(matches!(err, WalletError::StorageError(_)));
    }
}
