use eventfs::quota::{OwnerId, QuotaEntry, QuotaTable};
use eventfs::{Credentials, Error};

use super::common::Fixture;

fn byte_limited(limit: u64) -> Fixture {
    let cred = Credentials::current();
    let mut user_quotas = QuotaTable::new();
    user_quotas.set(
        cred.uid as OwnerId,
        QuotaEntry { max_files: 1024, max_dirs: 128, max_files_per_dir: 128, max_bytes: limit },
    );
    Fixture::with_quotas(user_quotas, QuotaTable::new())
}

#[tokio::test]
async fn byte_quota_admits_exactly_the_budget() {
    let fixture = byte_limited(10);
    fixture.mkdir("/q").await;
    fixture.produce("/q/a", b"").await;

    fixture.fs.write("/q/a", 0, b"0123456789").await.expect("write to the limit");
    assert_eq!(fixture.fs.write("/q/a", 10, b"x").await.unwrap_err(), Error::OverQuota);

    // Shrinking returns budget; the next write fits again.
    fixture.fs.truncate("/q/a", 0).await.expect("truncate");
    fixture.fs.write("/q/a", 0, b"x").await.expect("write after truncate");
}

#[tokio::test]
async fn overwrite_in_place_needs_no_budget() {
    let fixture = byte_limited(10);
    fixture.mkdir("/q").await;
    fixture.produce("/q/a", b"0123456789").await;

    fixture.fs.write("/q/a", 0, b"aaaaaaaaaa").await.expect("overwrite");
    assert_eq!(fixture.fs.read("/q/a", 0, 16).await.expect("read"), b"aaaaaaaaaa");
}

#[tokio::test]
async fn truncate_extension_counts_against_the_budget() {
    let fixture = byte_limited(10);
    fixture.mkdir("/q").await;
    fixture.produce("/q/a", b"12345").await;

    assert_eq!(fixture.fs.truncate("/q/a", 64).await.unwrap_err(), Error::OverQuota);
    fixture.fs.truncate("/q/a", 10).await.expect("extend within budget");
    assert_eq!(fixture.fs.stat("/q/a").await.expect("stat").size, 10);
}

#[tokio::test]
async fn truncate_to_current_size_is_a_no_op() {
    let fixture = byte_limited(10);
    fixture.mkdir("/q").await;
    fixture.produce("/q/a", b"0123456789").await;

    fixture.fs.truncate("/q/a", 10).await.expect("no-op truncate");
    assert_eq!(fixture.fs.read("/q/a", 0, 16).await.expect("read"), b"0123456789");
}

#[tokio::test]
async fn shrink_zeroes_the_tail_and_regrowth_stays_zero() {
    let fixture = Fixture::new();
    fixture.mkdir("/q").await;
    fixture.produce("/q/a", b"abcdef").await;

    fixture.fs.truncate("/q/a", 3).await.expect("shrink");
    assert_eq!(fixture.fs.read("/q/a", 0, 16).await.expect("read"), b"abc");

    fixture.fs.truncate("/q/a", 6).await.expect("regrow");
    assert_eq!(fixture.fs.read("/q/a", 0, 16).await.expect("read"), b"abc\0\0\0");
}

#[tokio::test]
async fn unlink_returns_the_bytes_to_the_budget() {
    let fixture = byte_limited(10);
    fixture.mkdir("/q").await;
    fixture.produce("/q/a", b"0123456789").await;
    fixture.produce("/q/b", b"").await;

    assert_eq!(fixture.fs.write("/q/b", 0, b"y").await.unwrap_err(), Error::OverQuota);

    fixture.fs.unlink("/q/a").await.expect("unlink");
    fixture.fs.write("/q/b", 0, b"y").await.expect("write after unlink");
}
