use eventfs::quota::{OwnerId, QuotaEntry, QuotaTable};
use eventfs::{Credentials, Error};

use super::common::{kill, spawn_sleeper, Fixture};

fn table_for(id: OwnerId, entry: QuotaEntry) -> QuotaTable {
    let mut table = QuotaTable::new();
    table.set(id, entry);
    table
}

fn generous() -> QuotaEntry {
    QuotaEntry { max_files: 1024, max_dirs: 128, max_files_per_dir: 128, max_bytes: 1 << 20 }
}

#[tokio::test]
async fn file_quota_refuses_then_recovers_after_the_implicit_reap() {
    let cred = Credentials::current();
    let user_quotas =
        table_for(cred.uid as OwnerId, QuotaEntry { max_files: 2, ..generous() });
    let fixture = Fixture::with_quotas(user_quotas, QuotaTable::new());

    let mut child = spawn_sleeper();
    fixture.fs.mkdir("/theirs", 0o755, &fixture.cred_of(&child)).await.expect("mkdir theirs");
    fixture.mkdir("/q").await;

    fixture.produce("/theirs/x", b"x").await;
    fixture.produce("/q/a", b"a").await;

    // Third file trips the caller's file quota and schedules a reap,
    // but nothing is dead yet.
    assert_eq!(
        fixture.fs.create("/q/b", 0o644, &fixture.cred).await.unwrap_err(),
        Error::OverQuota
    );
    fixture.fs.quiesce().await;
    assert_eq!(
        fixture.fs.create("/q/b", 0o644, &fixture.cred).await.unwrap_err(),
        Error::OverQuota
    );

    // Once the other creator dies, the reap scheduled by the refusal
    // frees its file and the create goes through.
    kill(&mut child);
    assert_eq!(
        fixture.fs.create("/q/b", 0o644, &fixture.cred).await.unwrap_err(),
        Error::OverQuota
    );
    fixture.fs.quiesce().await;

    fixture.fs.create("/q/b", 0o644, &fixture.cred).await.expect("create after reap");
}

#[tokio::test]
async fn dir_quota_refuses_then_recovers_after_the_implicit_reap() {
    let cred = Credentials::current();
    let user_quotas = table_for(cred.uid as OwnerId, QuotaEntry { max_dirs: 1, ..generous() });
    let fixture = Fixture::with_quotas(user_quotas, QuotaTable::new());

    let mut child = spawn_sleeper();
    fixture.fs.mkdir("/theirs", 0o755, &fixture.cred_of(&child)).await.expect("mkdir theirs");

    assert_eq!(
        fixture.fs.mkdir("/mine", 0o755, &fixture.cred).await.unwrap_err(),
        Error::OverQuota
    );

    kill(&mut child);
    let _ = fixture.fs.mkdir("/mine", 0o755, &fixture.cred).await;
    fixture.fs.quiesce().await;

    fixture.fs.mkdir("/mine2", 0o755, &fixture.cred).await.expect("mkdir after reap");
}

#[tokio::test]
async fn per_directory_limit_caps_the_queue_length() {
    let cred = Credentials::current();
    let user_quotas =
        table_for(cred.uid as OwnerId, QuotaEntry { max_files_per_dir: 2, ..generous() });
    let fixture = Fixture::with_quotas(user_quotas, QuotaTable::new());

    fixture.mkdir("/q").await;
    fixture.produce("/q/a", b"").await;
    fixture.produce("/q/b", b"").await;
    assert_eq!(
        fixture.fs.create("/q/c", 0o644, &fixture.cred).await.unwrap_err(),
        Error::OverQuota
    );

    // Draining one slot reopens the queue.
    fixture.fs.unlink("/q/head").await.expect("unlink head");
    fixture.fs.create("/q/c", 0o644, &fixture.cred).await.expect("create after drain");
}

#[tokio::test]
async fn group_per_directory_limit_holds_even_with_a_user_entry() {
    let cred = Credentials::current();
    // The owner has a user quota entry, but the stricter group limit
    // must still be enforced independently.
    let user_quotas = table_for(cred.uid as OwnerId, generous());
    let group_quotas =
        table_for(cred.gid as OwnerId, QuotaEntry { max_files_per_dir: 1, ..generous() });
    let fixture = Fixture::with_quotas(user_quotas, group_quotas);

    fixture.mkdir("/q").await;
    fixture.produce("/q/a", b"").await;
    assert_eq!(
        fixture.fs.create("/q/b", 0o644, &fixture.cred).await.unwrap_err(),
        Error::OverQuota
    );
}

#[tokio::test]
async fn defaults_apply_when_no_quota_entry_matches() {
    let fixture = Fixture::new();
    fixture.mkdir("/q").await;

    // 128 directories-worth of headroom in the fixture defaults; a
    // couple of files must sail through.
    fixture.produce("/q/a", b"x").await;
    fixture.produce("/q/b", b"y").await;
}
