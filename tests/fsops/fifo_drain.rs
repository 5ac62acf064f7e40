use eventfs::Error;

use super::common::Fixture;

#[tokio::test]
async fn unlinking_head_drains_oldest_first() {
    let fixture = Fixture::new();
    fixture.mkdir("/q").await;
    fixture.produce("/q/a", b"1").await;
    fixture.produce("/q/b", b"2").await;
    fixture.produce("/q/c", b"3").await;

    assert_eq!(fixture.readlink("/q/head").await, "a");
    assert_eq!(fixture.readlink("/q/tail").await, "c");

    fixture.fs.unlink("/q/head").await.expect("unlink head");
    assert_eq!(fixture.readlink("/q/head").await, "b");
    assert_eq!(fixture.readlink("/q/tail").await, "c");
    assert_eq!(fixture.fs.stat("/q/a").await.unwrap_err(), Error::NotFound);

    fixture.fs.unlink("/q/tail").await.expect("unlink tail");
    assert_eq!(fixture.readlink("/q/head").await, "b");
    assert_eq!(fixture.readlink("/q/tail").await, "b");
    assert_eq!(fixture.fs.stat("/q/c").await.unwrap_err(), Error::NotFound);

    fixture.fs.unlink("/q/b").await.expect("unlink last");
    assert_eq!(fixture.fs.readlink("/q/head").await.unwrap_err(), Error::NotFound);
    assert_eq!(fixture.fs.readlink("/q/tail").await.unwrap_err(), Error::NotFound);
    assert!(fixture.names("/q").await.is_empty());
}

#[tokio::test]
async fn middle_removal_preserves_queue_order() {
    let fixture = Fixture::new();
    fixture.mkdir("/q").await;
    for name in ["a", "b", "c", "d"] {
        fixture.produce(&format!("/q/{name}"), b"x").await;
    }

    fixture.fs.unlink("/q/b").await.expect("unlink middle");
    fixture.fs.unlink("/q/c").await.expect("unlink middle");

    assert_eq!(fixture.readlink("/q/head").await, "a");
    assert_eq!(fixture.readlink("/q/tail").await, "d");
    assert_eq!(fixture.names("/q").await, vec!["a", "d", "head", "tail"]);
}

#[tokio::test]
async fn queue_refills_after_draining_empty() {
    let fixture = Fixture::new();
    fixture.mkdir("/q").await;
    fixture.produce("/q/a", b"x").await;
    fixture.fs.unlink("/q/head").await.expect("drain");
    assert!(fixture.names("/q").await.is_empty());

    fixture.produce("/q/z", b"y").await;
    assert_eq!(fixture.readlink("/q/head").await, "z");
    assert_eq!(fixture.readlink("/q/tail").await, "z");
}

#[tokio::test]
async fn unlinking_single_file_removes_both_anchors() {
    let fixture = Fixture::new();
    fixture.mkdir("/q").await;
    fixture.produce("/q/only", b"x").await;

    fixture.fs.unlink("/q/head").await.expect("unlink head");

    assert_eq!(fixture.fs.stat("/q/only").await.unwrap_err(), Error::NotFound);
    assert!(fixture.names("/q").await.is_empty());
    assert!(fixture.fs.stat("/q").await.is_ok());
}

#[tokio::test]
async fn concurrent_producers_lose_nothing() {
    let fixture = Fixture::new();
    fixture.mkdir("/q").await;

    let mut producers = tokio::task::JoinSet::new();
    for i in 0..24 {
        let fs = fixture.fs.clone();
        let cred = fixture.cred;
        producers.spawn(async move {
            fs.create(&format!("/q/p{i:02}"), 0o644, &cred).await.expect("create");
        });
    }
    while producers.join_next().await.is_some() {}

    // Whatever order the creates serialised into, the deque holds
    // every file exactly once and the anchors track its ends.
    let mut drained = Vec::new();
    while let Ok(oldest) = fixture.fs.readlink("/q/head").await {
        assert!(!fixture.fs.readlink("/q/tail").await.expect("tail").is_empty());
        drained.push(oldest);
        fixture.fs.unlink("/q/head").await.expect("unlink head");
    }

    let mut sorted = drained.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), 24);
    assert_eq!(drained.len(), 24);
}

#[tokio::test]
async fn serialised_producers_define_the_order() {
    let fixture = Fixture::new();
    fixture.mkdir("/q").await;

    for i in 0..16 {
        fixture.produce(&format!("/q/e{i:02}"), b"x").await;
    }

    let mut drained = Vec::new();
    while let Ok(oldest) = fixture.fs.readlink("/q/head").await {
        drained.push(oldest);
        fixture.fs.unlink("/q/head").await.expect("unlink head");
    }

    let expected: Vec<String> = (0..16).map(|i| format!("e{i:02}")).collect();
    assert_eq!(drained, expected);
}
