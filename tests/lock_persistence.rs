//! Output locks across wallet restarts

mod common;

use std::sync::Arc;

use anon_wallet_libs::{
    storage::{MemoryStorage, WalletStorage},
    wallet::{ScanFrom, UnspentFilter},
    OutputKind, PaymentRecipient, ResourceError, StateError, TransferRequest, WalletError,
};
use common::*;

#[tokio::test]
async fn test_permanent_locks_survive_restart() {
    let harness = Harness::new();
    let storage = MemoryStorage::new();
    let wallet = harness
        .wallet_with_storage(MNEMONIC_A, Arc::new(storage.clone()), ScanFrom::Tip)
        .await;
    let address = change_address(&wallet).await;
    for _ in 0..3 {
        harness.mine_to(&address, 2 * COIN, &[&wallet]).await;
    }

    let unspent = wallet.list_unspent(UnspentFilter::new()).await.unwrap();
    assert_eq!(unspent.len(), 3);
    for output in &unspent {
        wallet.lock_output(output.outref, true).await.unwrap();
    }
    drop(wallet);

    let storage: Arc<dyn WalletStorage> = Arc::new(storage);
    let wallet = harness.reopen(storage).await;
    assert!(wallet
        .list_unspent(UnspentFilter::new())
        .await
        .unwrap()
        .is_empty());

    let locked = wallet.list_locked().await;
    assert_eq!(locked.len(), 3);
    assert!(locked.iter().all(|lock| lock.permanent));
    for output in &unspent {
        assert!(locked.iter().any(|lock| lock.outref == output.outref));
    }

    let info = wallet.get_wallet_info().await.unwrap();
    assert_eq!(info.locked_balance, 6 * COIN);
    assert_eq!(info.plain_balance, 0);
}

#[tokio::test]
async fn test_temporary_locks_do_not_survive_restart() {
    let harness = Harness::new();
    let storage = MemoryStorage::new();
    let wallet = harness
        .wallet_with_storage(MNEMONIC_A, Arc::new(storage.clone()), ScanFrom::Tip)
        .await;
    harness
        .mine_to(&change_address(&wallet).await, COIN, &[&wallet])
        .await;
    let outref = wallet.list_unspent(UnspentFilter::new()).await.unwrap()[0].outref;
    wallet.lock_output(outref, false).await.unwrap();
    assert_eq!(wallet.list_locked().await.len(), 1);
    drop(wallet);

    let wallet = harness.reopen(Arc::new(storage)).await;
    assert!(wallet.list_locked().await.is_empty());
    assert_eq!(
        wallet.list_unspent(UnspentFilter::new()).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_lock_rules() {
    let harness = Harness::new();
    let wallet = harness.wallet(MNEMONIC_A).await;
    harness
        .mine_to(&change_address(&wallet).await, COIN, &[&wallet])
        .await;
    let outref = wallet.list_unspent(UnspentFilter::new()).await.unwrap()[0].outref;

    wallet.lock_output(outref, true).await.unwrap();
    let err = wallet.lock_output(outref, false).await.unwrap_err();
    assert!(matches!(
        err,
        WalletError::State(StateError::AlreadyLocked(o)) if o == outref
    ));

    // Locked value is reported separately from missing funds
    let to = change_address(&wallet).await;
    let err = wallet
        .send(
            TransferRequest::new(OutputKind::Plain, OutputKind::Plain)
                .with_recipient(PaymentRecipient::new(to, COIN / 2)),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WalletError::Resource(ResourceError::LockedInputsOnly)
    ));

    let err = wallet
        .send(
            TransferRequest::new(OutputKind::Plain, OutputKind::Plain)
                .with_recipient(PaymentRecipient::new(to, COIN / 2))
                .with_inputs(vec![outref]),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WalletError::State(StateError::OutputLocked(_))
    ));

    wallet.unlock_output(outref).await.unwrap();
    let err = wallet.unlock_output(outref).await.unwrap_err();
    assert!(matches!(
        err,
        WalletError::State(StateError::NotLocked(_))
    ));
}

#[tokio::test]
async fn test_unlock_all_keeps_permanent_locks_unless_asked() {
    let harness = Harness::new();
    let wallet = harness.wallet(MNEMONIC_A).await;
    let address = change_address(&wallet).await;
    harness.mine_to(&address, COIN, &[&wallet]).await;
    harness.mine_to(&address, COIN, &[&wallet]).await;
    let unspent = wallet.list_unspent(UnspentFilter::new()).await.unwrap();
    wallet.lock_output(unspent[0].outref, true).await.unwrap();
    wallet.lock_output(unspent[1].outref, false).await.unwrap();

    wallet.unlock_all(false).await.unwrap();
    let locked = wallet.list_locked().await;
    assert_eq!(locked.len(), 1);
    assert_eq!(locked[0].outref, unspent[0].outref);

    wallet.unlock_all(true).await.unwrap();
    assert!(wallet.list_locked().await.is_empty());
}

#[tokio::test]
async fn test_locking_unknown_output_fails() {
    let harness = Harness::new();
    let wallet = harness.wallet(MNEMONIC_A).await;
    let outref = anon_wallet_libs::OutputRef::new(anon_wallet_libs::TxId([7u8; 32]), 0);
    let err = wallet.lock_output(outref, true).await.unwrap_err();
    assert!(matches!(
        err,
        WalletError::State(StateError::UnknownOutput(_))
    ));
}

#[tokio::test]
async fn test_failed_lock_write_leaves_locks_in_place() {
    let harness = Harness::new();
    let storage = FlakyStorage::new(MemoryStorage::new());
    let wallet = harness
        .wallet_with_storage(MNEMONIC_A, Arc::new(storage.clone()), ScanFrom::Tip)
        .await;
    let address = change_address(&wallet).await;
    harness.mine_to(&address, COIN, &[&wallet]).await;
    harness.mine_to(&address, COIN, &[&wallet]).await;
    let unspent = wallet.list_unspent(UnspentFilter::new()).await.unwrap();
    wallet.lock_output(unspent[0].outref, true).await.unwrap();
    wallet.lock_output(unspent[1].outref, true).await.unwrap();

    storage.fail_writes(true);
    let err = wallet.unlock_all(true).await.unwrap_err();
    assert!(matches!(err, WalletError::StorageError(_)));
    let err = wallet.unlock_output(unspent[0].outref).await.unwrap_err();
    assert!(matches!(err, WalletError::StorageError(_)));
    assert_eq!(wallet.list_locked().await.len(), 2);
    assert!(wallet
        .list_unspent(UnspentFilter::new())
        .await
        .unwrap()
        .is_empty());

    storage.fail_writes(false);
    assert_eq!(storage.get_permanent_locks().await.unwrap().len(), 2);
    wallet.unlock_all(true).await.unwrap();
    assert!(wallet.list_locked().await.is_empty());
    assert!(storage.get_permanent_locks().await.unwrap().is_empty());
}
