use eventfs::quota::QuotaTable;
use eventfs::Error;

use super::common::{kill, spawn_sleeper, Fixture};

#[tokio::test]
async fn stat_reaps_a_directory_whose_creator_died() {
    let fixture = Fixture::new();
    let mut child = spawn_sleeper();

    fixture.fs.mkdir("/q", 0o755, &fixture.cred_of(&child)).await.expect("mkdir");
    fixture.produce("/q/a", b"payload").await;
    assert!(fixture.fs.stat("/q").await.is_ok());

    kill(&mut child);

    assert_eq!(fixture.fs.stat("/q").await.unwrap_err(), Error::NotFound);
    fixture.fs.quiesce().await;
    assert!(!fixture.names("/").await.contains(&"q".to_owned()));
}

#[tokio::test]
async fn root_listing_omits_and_reaps_dead_directories() {
    let fixture = Fixture::new();
    let mut child = spawn_sleeper();

    fixture.fs.mkdir("/dead", 0o755, &fixture.cred_of(&child)).await.expect("mkdir dead");
    fixture.mkdir("/alive").await;
    fixture.produce("/dead/a", b"x").await;

    kill(&mut child);

    let names = fixture.names("/").await;
    assert!(names.contains(&"alive".to_owned()));
    assert!(!names.contains(&"dead".to_owned()));

    fixture.fs.quiesce().await;
    assert_eq!(fixture.names("/").await, vec!["alive".to_owned()]);
}

#[tokio::test]
async fn marked_directory_is_opaque_until_reclaimed() {
    // Worker not started: the directory stays in the marked state.
    let fixture = Fixture::stopped(QuotaTable::new(), QuotaTable::new());
    let mut child = spawn_sleeper();

    fixture.fs.mkdir("/q", 0o755, &fixture.cred_of(&child)).await.expect("mkdir");
    fixture.produce("/q/a", b"x").await;
    kill(&mut child);

    assert_eq!(fixture.fs.stat("/q").await.unwrap_err(), Error::NotFound);

    // Every operation on the directory and its children now misses,
    // even though the worker has not detached it yet.
    assert_eq!(fixture.fs.stat("/q").await.unwrap_err(), Error::NotFound);
    assert_eq!(fixture.fs.read("/q/a", 0, 16).await.unwrap_err(), Error::NotFound);
    assert_eq!(fixture.fs.readdir("/q").await.unwrap_err(), Error::NotFound);
    assert_eq!(fixture.fs.readlink("/q/head").await.unwrap_err(), Error::NotFound);
    assert_eq!(
        fixture.fs.create("/q/b", 0o644, &fixture.cred).await.unwrap_err(),
        Error::NotFound
    );
    assert_eq!(fixture.fs.rmdir("/q").await.unwrap_err(), Error::NotFound);

    // The name disappears once the worker gets to run.
    fixture.fs.start();
    fixture.fs.quiesce().await;
    assert!(fixture.names("/").await.is_empty());
}

#[tokio::test]
async fn surviving_directories_are_untouched_by_the_sweep() {
    let fixture = Fixture::new();
    let mut child = spawn_sleeper();

    fixture.mkdir("/mine").await;
    fixture.produce("/mine/a", b"keep").await;
    fixture.fs.mkdir("/theirs", 0o755, &fixture.cred_of(&child)).await.expect("mkdir");

    kill(&mut child);
    fixture.names("/").await;
    fixture.fs.quiesce().await;

    assert_eq!(fixture.names("/").await, vec!["mine".to_owned()]);
    assert_eq!(fixture.fs.read("/mine/a", 0, 16).await.expect("read"), b"keep");
    assert_eq!(fixture.readlink("/mine/head").await, "a");
}
