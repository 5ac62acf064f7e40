use eventfs::{Error, Vfs};

use super::common::Fixture;

#[tokio::test]
async fn mkdir_below_depth_one_is_refused() {
    let fixture = Fixture::new();
    fixture.mkdir("/q").await;

    assert_eq!(
        fixture.fs.mkdir("/q/nested", 0o755, &fixture.cred).await.unwrap_err(),
        Error::NotPermitted
    );
}

#[tokio::test]
async fn duplicate_mkdir_already_exists() {
    let fixture = Fixture::new();
    fixture.mkdir("/q").await;

    assert_eq!(
        fixture.fs.mkdir("/q", 0o755, &fixture.cred).await.unwrap_err(),
        Error::Exists
    );
}

#[tokio::test]
async fn anchor_names_are_reserved() {
    let fixture = Fixture::new();
    fixture.mkdir("/q").await;

    for name in ["head", "tail"] {
        assert_eq!(
            fixture.fs.create(&format!("/q/{name}"), 0o644, &fixture.cred).await.unwrap_err(),
            Error::NotPermitted
        );
    }

    fixture.produce("/q/a", b"x").await;
    assert_eq!(
        fixture.fs.create("/q/head", 0o644, &fixture.cred).await.unwrap_err(),
        Error::NotPermitted
    );
}

#[tokio::test]
async fn rename_is_permanently_disabled() {
    let fixture = Fixture::new();
    fixture.mkdir("/q").await;
    fixture.produce("/q/a", b"x").await;

    assert_eq!(fixture.fs.rename("/q/a", "/q/z").await.unwrap_err(), Error::NotPermitted);
    assert_eq!(fixture.fs.rename("/q/head", "/q/z").await.unwrap_err(), Error::NotPermitted);
}

#[tokio::test]
async fn files_cannot_live_in_the_root() {
    let fixture = Fixture::new();
    assert_eq!(
        fixture.fs.create("/loose", 0o644, &fixture.cred).await.unwrap_err(),
        Error::Io
    );
}

#[tokio::test]
async fn rmdir_refuses_a_populated_queue() {
    let fixture = Fixture::new();
    fixture.mkdir("/q").await;
    fixture.produce("/q/a", b"x").await;

    assert_eq!(fixture.fs.rmdir("/q").await.unwrap_err(), Error::NotEmpty);

    fixture.fs.unlink("/q/a").await.expect("drain");
    fixture.fs.rmdir("/q").await.expect("rmdir empty");
    assert_eq!(fixture.fs.stat("/q").await.unwrap_err(), Error::NotFound);
}

#[tokio::test]
async fn link_appends_to_the_target_queue() {
    let fixture = Fixture::new();
    fixture.mkdir("/q").await;
    fixture.mkdir("/r").await;
    fixture.produce("/q/a", b"shared").await;
    fixture.produce("/r/first", b"x").await;

    fixture.fs.link("/q/a", "/r/z").await.expect("link");

    assert_eq!(fixture.readlink("/r/tail").await, "z");
    assert_eq!(fixture.readlink("/r/head").await, "first");
    assert_eq!(fixture.fs.read("/r/z", 0, 16).await.expect("read"), b"shared");

    // Both names reach the same bytes.
    fixture.fs.write("/r/z", 0, b"SHARED").await.expect("write");
    assert_eq!(fixture.fs.read("/q/a", 0, 16).await.expect("read"), b"SHARED");
}

#[tokio::test]
async fn link_refuses_anchor_names_and_duplicates() {
    let fixture = Fixture::new();
    fixture.mkdir("/q").await;
    fixture.mkdir("/r").await;
    fixture.produce("/q/a", b"x").await;
    fixture.produce("/r/b", b"y").await;

    assert_eq!(fixture.fs.link("/q/a", "/r/head").await.unwrap_err(), Error::NotPermitted);
    assert_eq!(fixture.fs.link("/q/a", "/r/b").await.unwrap_err(), Error::Exists);
}

#[tokio::test]
async fn wrong_kind_operations_are_typed_errors() {
    let fixture = Fixture::new();
    fixture.mkdir("/q").await;
    fixture.produce("/q/a", b"x").await;

    assert_eq!(fixture.fs.read("/q", 0, 16).await.unwrap_err(), Error::IsDir);
    assert_eq!(fixture.fs.write("/q", 0, b"x").await.unwrap_err(), Error::IsDir);
    assert_eq!(fixture.fs.readlink("/q/a").await.unwrap_err(), Error::InvalidArgument);
    assert_eq!(fixture.fs.readdir("/q/a").await.unwrap_err(), Error::NotDir);
    assert_eq!(fixture.fs.unlink("/q").await.unwrap_err(), Error::IsDir);
    assert_eq!(fixture.fs.rmdir("/q/a").await.unwrap_err(), Error::NotDir);
}

#[tokio::test]
async fn missing_paths_miss() {
    let fixture = Fixture::new();
    fixture.mkdir("/q").await;

    assert_eq!(fixture.fs.stat("/ghost").await.unwrap_err(), Error::NotFound);
    assert_eq!(fixture.fs.read("/q/ghost", 0, 4).await.unwrap_err(), Error::NotFound);
    assert_eq!(fixture.fs.unlink("/q/ghost").await.unwrap_err(), Error::NotFound);
    assert_eq!(fixture.fs.readlink("/q/head").await.unwrap_err(), Error::NotFound);
}

#[tokio::test]
async fn adapter_can_route_through_the_trait_object() {
    let fixture = Fixture::new();
    let vfs: &dyn Vfs = fixture.fs.as_ref();

    vfs.mkdir("/q", 0o755, &fixture.cred).await.expect("mkdir");
    vfs.create("/q/a", 0o644, &fixture.cred).await.expect("create");
    vfs.write("/q/a", 0, b"routed").await.expect("write");

    assert_eq!(vfs.readlink("/q/head").await.expect("readlink"), "a");
    assert_eq!(vfs.read("/q/a", 0, 16).await.expect("read"), b"routed");
    assert_eq!(vfs.rename("/q/a", "/q/b").await.unwrap_err(), Error::NotPermitted);
}

#[tokio::test]
async fn status_codes_round_trip_errno_values() {
    assert_eq!(Error::NotFound.status(), -libc::ENOENT);
    assert_eq!(Error::OverQuota.status(), -libc::EDQUOT);
    assert_eq!(Error::from_status(-libc::EPERM), Some(Error::NotPermitted));
    assert_eq!(Error::from_status(0), None);
}
